//! Audio file producer
//!
//! Decodes a file with symphonia on a background thread and feeds planar
//! blocks into a [`MessageSender`], paced to real time so the offload buffer
//! is kept topped up without being flooded.

use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use symphonia::core::audio::{AudioBufferRef, Signal};
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::{FormatOptions, FormatReader};
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use symphonia::core::units::TimeBase;
use thiserror::Error;

use super::port::MessageSender;
use super::processor::AudioMessage;

/// Errors that can occur during audio file operations
#[derive(Error, Debug)]
pub enum FileError {
    #[error("Failed to open file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Failed to probe audio format: {0}")]
    ProbeError(String),

    #[error("No audio tracks found")]
    NoTracks,

    #[error("Decoder error: {0}")]
    DecoderError(String),
}

/// Audio file metadata
#[derive(Debug, Clone)]
pub struct AudioFileInfo {
    pub path: PathBuf,
    pub filename: String,
    pub duration: Duration,
    pub sample_rate: u32,
    pub channels: u32,
    pub format: String,
}

/// How the decode thread feeds the port
#[derive(Debug, Clone, Copy)]
pub struct StreamOptions {
    /// Buffer lanes to fill; file channels past this are ignored
    pub lanes: usize,
    /// Rate the output consumes frames at
    pub output_rate: u32,
    /// Maximum frames to run ahead of real time
    pub lead_frames: u64,
    pub volume: f32,
}

/// Background decoder feeding an offload buffer
pub struct FileStreamer {
    pub info: AudioFileInfo,
    is_running: Arc<AtomicBool>,
    /// Frames sent to the port so far
    position: Arc<AtomicU64>,
    thread_handle: Option<thread::JoinHandle<Result<(), FileError>>>,
}

impl FileStreamer {
    /// Probe a file and read its track info
    pub fn open(path: impl AsRef<Path>) -> Result<Self, FileError> {
        let path = path.as_ref();
        let format = open_format(path)?;

        let track = format
            .tracks()
            .iter()
            .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
            .ok_or(FileError::NoTracks)?;

        let codec_params = &track.codec_params;
        let sample_rate = codec_params.sample_rate.unwrap_or(44100);
        let channels = codec_params.channels.map(|c| c.count() as u32).unwrap_or(2);

        let duration = match codec_params.n_frames {
            Some(n_frames) => {
                let time_base = codec_params.time_base.unwrap_or(TimeBase::new(1, sample_rate));
                let time = time_base.calc_time(n_frames);
                Duration::from_secs_f64(time.seconds as f64 + time.frac)
            }
            None => Duration::ZERO,
        };

        let filename = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("Unknown")
            .to_string();

        let info = AudioFileInfo {
            path: path.to_path_buf(),
            filename,
            duration,
            sample_rate,
            channels,
            format: format!("{:?}", codec_params.codec).replace("CODEC_TYPE_", ""),
        };
        log::info!("Loaded audio file: {:?}", info);

        Ok(Self {
            info,
            is_running: Arc::new(AtomicBool::new(false)),
            position: Arc::new(AtomicU64::new(0)),
            thread_handle: None,
        })
    }

    /// Start decoding into `sender`
    pub fn start(&mut self, sender: MessageSender, options: StreamOptions) {
        if self.thread_handle.is_some() {
            return;
        }

        if self.info.sample_rate != options.output_rate {
            log::warn!(
                "File rate {} Hz differs from output rate {} Hz; playing without resampling",
                self.info.sample_rate,
                options.output_rate
            );
        }

        self.is_running.store(true, Ordering::Relaxed);
        self.position.store(0, Ordering::Relaxed);

        let path = self.info.path.clone();
        let is_running = Arc::clone(&self.is_running);
        let position = Arc::clone(&self.position);

        self.thread_handle = Some(thread::spawn(move || {
            let result = stream_thread(&path, sender, options, &is_running, &position);
            is_running.store(false, Ordering::Relaxed);
            if let Err(ref e) = result {
                log::error!("Playback error: {}", e);
            }
            result
        }));
    }

    pub fn is_running(&self) -> bool {
        self.is_running.load(Ordering::Relaxed)
    }

    /// Frames handed to the port so far
    pub fn frames_sent(&self) -> u64 {
        self.position.load(Ordering::Relaxed)
    }

    /// Ask the decode thread to stop and wait for it
    pub fn stop(&mut self) {
        self.is_running.store(false, Ordering::Relaxed);
        let _ = self.wait();
    }

    /// Wait for the decode thread to finish on its own
    pub fn wait(&mut self) -> Result<(), FileError> {
        match self.thread_handle.take() {
            Some(handle) => handle
                .join()
                .unwrap_or_else(|_| Err(FileError::DecoderError("decode thread panicked".into()))),
            None => Ok(()),
        }
    }
}

impl Drop for FileStreamer {
    fn drop(&mut self) {
        self.stop();
    }
}

fn open_format(path: &Path) -> Result<Box<dyn FormatReader>, FileError> {
    let file = File::open(path)?;
    let mss = MediaSourceStream::new(Box::new(file), Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
        hint.with_extension(ext);
    }

    let probed = symphonia::default::get_probe()
        .format(
            &hint,
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .map_err(|e| FileError::ProbeError(e.to_string()))?;

    Ok(probed.format)
}

/// Write a decoded buffer into `message` as planar lanes
///
/// Lanes with no source channel are left as `None`. Allocations already held
/// by `message` are reused.
fn fill_message(buffer: &AudioBufferRef<'_>, message: &mut AudioMessage, lanes: usize, volume: f32) {
    message.channels.resize_with(lanes, || None);

    macro_rules! planar {
        ($buf:expr, $scale:expr) => {{
            let buf = $buf;
            let channels = buf.spec().channels.count();
            for (ch, lane) in message.channels.iter_mut().enumerate() {
                if ch >= channels {
                    *lane = None;
                    continue;
                }
                let out = lane.get_or_insert_with(Vec::new);
                out.clear();
                out.extend(buf.chan(ch).iter().map(|&s| $scale(s) * volume));
            }
        }};
    }

    match buffer {
        AudioBufferRef::F32(buf) => planar!(buf, |s: f32| s),
        AudioBufferRef::S16(buf) => planar!(buf, |s: i16| s as f32 / 32768.0),
        AudioBufferRef::S32(buf) => planar!(buf, |s: i32| s as f32 / 2147483648.0),
        _ => message.clear(),
    }
}

/// Next message to fill: the spare first, then one from the port's budget
///
/// Waits while every message is in flight; `None` if asked to stop meanwhile.
fn acquire_message(
    sender: &mut MessageSender,
    spare: &mut Option<AudioMessage>,
    is_running: &AtomicBool,
    wait: Duration,
) -> Option<AudioMessage> {
    if let Some(message) = spare.take() {
        return Some(message);
    }
    loop {
        if let Some(message) = sender.take_message() {
            return Some(message);
        }
        if !is_running.load(Ordering::Relaxed) {
            return None;
        }
        thread::sleep(wait);
    }
}

fn stream_thread(
    path: &Path,
    mut sender: MessageSender,
    options: StreamOptions,
    is_running: &AtomicBool,
    position: &AtomicU64,
) -> Result<(), FileError> {
    let mut format = open_format(path)?;

    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or(FileError::NoTracks)?;

    let track_id = track.id;

    let mut decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .map_err(|e| FileError::DecoderError(e.to_string()))?;

    // Poll interval while waiting for the output to catch up
    let packet_sleep = Duration::from_millis(5);
    let rate = options.output_rate.max(1) as f64;
    let started = Instant::now();
    let mut frames_sent: u64 = 0;
    // Filled-but-unsent message kept for the next packet
    let mut spare: Option<AudioMessage> = None;

    while is_running.load(Ordering::Relaxed) {
        let packet = match format.next_packet() {
            Ok(p) => p,
            Err(SymphoniaError::IoError(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                break;
            }
            Err(e) => return Err(FileError::DecoderError(e.to_string())),
        };

        if packet.track_id() != track_id {
            continue;
        }

        let decoded = match decoder.decode(&packet) {
            Ok(d) => d,
            Err(SymphoniaError::DecodeError(e)) => {
                log::warn!("Skipping undecodable packet: {}", e);
                continue;
            }
            Err(e) => return Err(FileError::DecoderError(e.to_string())),
        };

        let Some(mut message) = acquire_message(&mut sender, &mut spare, is_running, packet_sleep) else {
            return Ok(());
        };
        fill_message(&decoded, &mut message, options.lanes, options.volume);
        message.timestamp = Some(frames_sent as f64 / rate);
        let frames = message.frames() as u64;
        if frames == 0 {
            spare = Some(message);
            continue;
        }

        // Stay at most `lead_frames` ahead of what the output has consumed
        loop {
            let consumed = (started.elapsed().as_secs_f64() * rate) as u64;
            if frames_sent + frames <= consumed + options.lead_frames {
                break;
            }
            if !is_running.load(Ordering::Relaxed) {
                return Ok(());
            }
            thread::sleep(packet_sleep);
        }

        // Port full: wait for the render side to pick messages up
        while let Err(back) = sender.send(message) {
            if !is_running.load(Ordering::Relaxed) {
                return Ok(());
            }
            message = back;
            thread::sleep(packet_sleep);
        }

        frames_sent += frames;
        position.store(frames_sent, Ordering::Relaxed);
    }

    log::info!("Finished streaming {} frames from {}", frames_sent, path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::port::message_port;
    use symphonia::core::audio::{AudioBuffer, Channels, SignalSpec};

    fn stereo_s16(frames: usize) -> AudioBuffer<i16> {
        let spec = SignalSpec::new(48000, Channels::FRONT_LEFT | Channels::FRONT_RIGHT);
        let mut buf = AudioBuffer::<i16>::new(frames as u64, spec);
        buf.render_reserved(Some(frames));
        for (i, s) in buf.chan_mut(0).iter_mut().enumerate() {
            *s = (i as i16) * 8192;
        }
        buf.chan_mut(1).fill(-16384);
        buf
    }

    #[test]
    fn test_fill_message_converts_and_scales() {
        let buf = stereo_s16(3);
        let mut message = AudioMessage::default();
        fill_message(&AudioBufferRef::S16(std::borrow::Cow::Borrowed(&buf)), &mut message, 2, 0.5);

        assert_eq!(message.frames(), 3);
        assert_eq!(message.channels[0], Some(vec![0.0, 0.125, 0.25]));
        assert_eq!(message.channels[1], Some(vec![-0.25; 3]));
    }

    #[test]
    fn test_fill_message_leaves_extra_lanes_empty() {
        let buf = stereo_s16(2);
        let mut message = AudioMessage::new(vec![None, None, Some(vec![1.0; 8]), None], None);
        fill_message(&AudioBufferRef::S16(std::borrow::Cow::Borrowed(&buf)), &mut message, 3, 1.0);

        assert_eq!(message.channels.len(), 3);
        assert!(message.channels[0].is_some());
        assert!(message.channels[1].is_some());
        assert_eq!(message.channels[2], None);
    }

    #[test]
    fn test_spare_message_is_reused() {
        let (mut tx, _rx) = message_port(1);
        let running = AtomicBool::new(true);
        let wait = Duration::from_millis(1);

        let mut spare = None;
        let first = acquire_message(&mut tx, &mut spare, &running, wait).unwrap();
        assert_eq!(tx.allocated(), 1);

        // An empty decode hands the message back as the spare
        spare = Some(first);
        assert!(acquire_message(&mut tx, &mut spare, &running, wait).is_some());
        assert!(spare.is_none());
        assert_eq!(tx.allocated(), 1);
    }

    #[test]
    fn test_acquire_stops_when_budget_is_spent() {
        let (mut tx, _rx) = message_port(1);
        let running = AtomicBool::new(true);
        let wait = Duration::from_millis(1);

        let mut spare = None;
        let held = acquire_message(&mut tx, &mut spare, &running, wait).unwrap();

        running.store(false, Ordering::Relaxed);
        assert!(acquire_message(&mut tx, &mut spare, &running, wait).is_none());
        assert_eq!(tx.allocated(), 1);
        drop(held);
    }

    #[test]
    fn test_open_missing_file() {
        let result = FileStreamer::open("/nonexistent/offload-rs-test.wav");
        assert!(matches!(result, Err(FileError::IoError(_))));
    }
}

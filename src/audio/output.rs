//! Audio output host
//!
//! Opens the default output device with cpal and runs an [`OffloadProcessor`]
//! inside the device callback. Each callback:
//!
//! 1. applies every message waiting on the port, recycling it afterwards
//! 2. renders the device buffer in fixed quanta into planar scratch lanes
//! 3. interleaves the lanes into the device buffer

use std::sync::Arc;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use thiserror::Error;

use super::config::{ConfigError, RingBufferConfig};
use super::port::MessageReceiver;
use super::processor::{OffloadProcessor, ProcessorStats, RenderCallback};

/// Frames rendered per processor call
pub const RENDER_QUANTUM_FRAMES: usize = 128;

/// Errors that can occur while opening the output stream
#[derive(Error, Debug)]
pub enum OutputError {
    #[error("No output device available")]
    NoDevice,

    #[error("Failed to query output config: {0}")]
    Config(String),

    #[error("Unsupported sample format: {0}")]
    UnsupportedFormat(String),

    #[error("Failed to build output stream: {0}")]
    Build(String),

    #[error("Failed to start output stream: {0}")]
    Play(String),

    #[error("Invalid buffer config: {0}")]
    Buffer(#[from] ConfigError),
}

/// Running output stream
pub struct AudioOutput {
    /// Kept alive for as long as playback should run
    _stream: cpal::Stream,
    config: RingBufferConfig,
    stats: Arc<ProcessorStats>,
    pub device_name: String,
}

impl AudioOutput {
    /// Open the default output device and start rendering from `receiver`
    ///
    /// The buffer takes the device's channel count and sample rate; only
    /// the target latency comes from the caller.
    pub fn start(latency_ms: f64, receiver: MessageReceiver) -> Result<Self, OutputError> {
        log::info!("Starting audio output...");

        let host = cpal::default_host();
        let device = host.default_output_device().ok_or(OutputError::NoDevice)?;
        let device_name = device.name().unwrap_or_else(|_| "Unknown".to_string());
        log::info!("Using output device: {}", device_name);

        let supported = device
            .default_output_config()
            .map_err(|e| OutputError::Config(e.to_string()))?;
        log::info!("Audio config: {:?}", supported);

        if supported.sample_format() != cpal::SampleFormat::F32 {
            return Err(OutputError::UnsupportedFormat(format!(
                "{:?}",
                supported.sample_format()
            )));
        }

        let channels = supported.channels() as usize;
        let config = RingBufferConfig::new(channels, supported.sample_rate().0 as f64, latency_ms)?;
        log::info!(
            "Offload buffer: {} channel(s), {} frames ({} ms)",
            config.channel_count(),
            config.capacity_frames(),
            config.latency_ms()
        );

        let processor = OffloadProcessor::new(config);
        let stats = processor.stats();
        let mut render = RenderLoop::new(processor, receiver, channels);

        let stream = device
            .build_output_stream(
                &supported.config(),
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| render.fill(data),
                |err| log::error!("Audio output error: {}", err),
                None,
            )
            .map_err(|e| OutputError::Build(e.to_string()))?;

        stream.play().map_err(|e| OutputError::Play(e.to_string()))?;
        log::info!("Output started");

        Ok(Self {
            _stream: stream,
            config,
            stats,
            device_name,
        })
    }

    pub fn config(&self) -> &RingBufferConfig {
        &self.config
    }

    pub fn stats(&self) -> Arc<ProcessorStats> {
        Arc::clone(&self.stats)
    }
}

/// State moved into the device callback
struct RenderLoop<P> {
    processor: P,
    receiver: MessageReceiver,
    /// One block of planar lanes, capacity fixed at [`RENDER_QUANTUM_FRAMES`]
    scratch: Vec<Vec<Vec<f32>>>,
    channels: usize,
    running: bool,
}

impl<P: RenderCallback> RenderLoop<P> {
    fn new(processor: P, receiver: MessageReceiver, channels: usize) -> Self {
        let channels = channels.max(1);
        Self {
            processor,
            receiver,
            scratch: vec![(0..channels)
                .map(|_| Vec::with_capacity(RENDER_QUANTUM_FRAMES))
                .collect()],
            channels,
            running: true,
        }
    }

    /// Fill one interleaved device buffer
    fn fill(&mut self, data: &mut [f32]) {
        while let Some(message) = self.receiver.recv() {
            self.processor.on_message(&message);
            self.receiver.recycle(message);
        }

        for chunk in data.chunks_mut(self.channels * RENDER_QUANTUM_FRAMES) {
            let frames = chunk.len() / self.channels;

            // Pre-zero so unfilled frames play as silence; stays within capacity
            for lane in self.scratch[0].iter_mut() {
                lane.clear();
                lane.resize(frames, 0.0);
            }

            if self.running {
                self.running = self.processor.render(&mut self.scratch);
            }

            for (i, frame) in chunk.chunks_mut(self.channels).enumerate() {
                for (ch, sample) in frame.iter_mut().enumerate() {
                    *sample = self.scratch[0][ch].get(i).copied().unwrap_or(0.0);
                }
            }
        }
    }
}

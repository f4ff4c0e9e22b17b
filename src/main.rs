//! offload-rs - play an audio file through the offload buffer
//!
//! A decode thread pushes blocks through the message port; the output
//! device's callback renders them from the offload buffer.

use std::process::ExitCode;
use std::thread;
use std::time::Duration;

use offload_rs::audio::{message_port, AudioOutput, FileStreamer, StreamOptions};
use offload_rs::settings::AppSettings;

fn main() -> ExitCode {
    env_logger::init();
    log::info!("Starting offload-rs");

    let Some(path) = std::env::args().nth(1) else {
        eprintln!("usage: offload-rs <audio file>");
        return ExitCode::from(2);
    };

    let settings = AppSettings::load();

    match run(&path, &settings) {
        Ok(()) => {
            settings.save();
            ExitCode::SUCCESS
        }
        Err(e) => {
            log::error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(path: &str, settings: &AppSettings) -> Result<(), Box<dyn std::error::Error>> {
    let mut streamer = FileStreamer::open(path)?;
    let (sender, receiver) = message_port(settings.port_capacity);

    let output = AudioOutput::start(settings.latency_ms, receiver)?;
    let config = *output.config();
    let output_rate = config.sample_rate() as u32;

    streamer.start(
        sender,
        StreamOptions {
            lanes: config.channel_count(),
            output_rate,
            lead_frames: settings.lead_frames(output_rate),
            volume: settings.volume,
        },
    );

    log::info!(
        "Playing {} ({:.1}s) on {}",
        streamer.info.filename,
        streamer.info.duration.as_secs_f64(),
        output.device_name
    );

    streamer.wait()?;

    // Let the last buffered window play out
    thread::sleep(Duration::from_secs_f64(config.latency_ms() / 1000.0));

    let stats = output.stats().snapshot();
    log::info!(
        "Done: {} frames sent, {} rendered, {} dropped, {} underruns",
        streamer.frames_sent(),
        stats.frames_rendered,
        stats.frames_dropped,
        stats.underruns
    );

    Ok(())
}

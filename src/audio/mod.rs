//! Audio module - offload buffer and the host glue around it
//!
//! This module provides:
//! - Fixed-capacity multi-channel offload buffer
//! - Render callback and producer message types
//! - Bounded message port between producer and render contexts
//! - cpal output host and symphonia file producer

mod buffer;
mod config;
mod file;
mod output;
mod port;
mod processor;

pub use buffer::OffloadBuffer;
pub use config::{ConfigError, RingBufferConfig, RingBufferOptions, MAX_CAPACITY_FRAMES};
pub use file::{AudioFileInfo, FileError, FileStreamer, StreamOptions};
pub use output::{AudioOutput, OutputError, RENDER_QUANTUM_FRAMES};
pub use port::{message_port, MessageReceiver, MessageSender};
pub use processor::{AudioMessage, OffloadProcessor, ProcessorStats, RenderCallback, StatsSnapshot};

//! Render callback wrapping the offload buffer
//!
//! A host (an output stream, a test harness) drives an [`OffloadProcessor`]
//! through the [`RenderCallback`] trait: it forwards producer messages with
//! `on_message` and asks for one quantum at a time with `render`. The
//! processor knows nothing about how messages travel or where rendered
//! samples go.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use super::buffer::OffloadBuffer;
use super::config::RingBufferConfig;

/// Callback surface a real-time host registers
///
/// `render` is generic over the output container so hosts can pass owned
/// `Vec` lanes or borrowed slices without copying, which makes the trait
/// static-dispatch only: hosts hold the callback as a type parameter
/// (`RenderLoop<P: RenderCallback>` in the output host), not as
/// `dyn RenderCallback`.
pub trait RenderCallback {
    /// Handle one inbound producer message
    fn on_message(&mut self, message: &AudioMessage);

    /// Fill one quantum of output blocks; `false` asks the host to stop calling
    fn render<B, C>(&mut self, outputs: &mut [B]) -> bool
    where
        B: AsMut<[C]>,
        C: AsMut<[f32]>;
}

/// A block of planar samples from the producer
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AudioMessage {
    /// One entry per channel; `None` marks a channel with no data
    pub channels: Vec<Option<Vec<f32>>>,
    /// Producer-side capture time in seconds. Carried through, not used.
    pub timestamp: Option<f64>,
}

impl AudioMessage {
    pub fn new(channels: Vec<Option<Vec<f32>>>, timestamp: Option<f64>) -> Self {
        Self { channels, timestamp }
    }

    /// Frame count, taken from the first channel
    pub fn frames(&self) -> usize {
        match self.channels.first() {
            Some(Some(first)) => first.len(),
            _ => 0,
        }
    }

    /// Empty every lane while keeping its allocation, for reuse
    pub fn clear(&mut self) {
        for lane in self.channels.iter_mut().flatten() {
            lane.clear();
        }
        self.timestamp = None;
    }
}

/// Counters shared between the render side and whoever reports on it
///
/// Updated with relaxed atomics from the render context; values are for
/// diagnostics only.
#[derive(Debug, Default)]
pub struct ProcessorStats {
    messages: AtomicU64,
    frames_received: AtomicU64,
    frames_rendered: AtomicU64,
    frames_dropped: AtomicU64,
    underruns: AtomicU64,
}

/// Point-in-time copy of [`ProcessorStats`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub messages: u64,
    pub frames_received: u64,
    pub frames_rendered: u64,
    pub frames_dropped: u64,
    /// Quanta that could not be completely filled
    pub underruns: u64,
}

impl ProcessorStats {
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            messages: self.messages.load(Ordering::Relaxed),
            frames_received: self.frames_received.load(Ordering::Relaxed),
            frames_rendered: self.frames_rendered.load(Ordering::Relaxed),
            frames_dropped: self.frames_dropped.load(Ordering::Relaxed),
            underruns: self.underruns.load(Ordering::Relaxed),
        }
    }
}

/// [`RenderCallback`] backed by an [`OffloadBuffer`]
pub struct OffloadProcessor {
    buffer: OffloadBuffer,
    stats: Arc<ProcessorStats>,
}

impl OffloadProcessor {
    pub fn new(config: RingBufferConfig) -> Self {
        Self {
            buffer: OffloadBuffer::new(config),
            stats: Arc::new(ProcessorStats::default()),
        }
    }

    /// Handle for reading counters from another thread
    pub fn stats(&self) -> Arc<ProcessorStats> {
        Arc::clone(&self.stats)
    }

    pub fn buffer(&self) -> &OffloadBuffer {
        &self.buffer
    }
}

impl RenderCallback for OffloadProcessor {
    fn on_message(&mut self, message: &AudioMessage) {
        // TODO: use `message.timestamp` for drift compensation once producers
        // stamp blocks against a shared clock
        let frames = message.frames();
        if frames == 0 {
            return;
        }

        let dropped = self.buffer.append(&message.channels);

        self.stats.messages.fetch_add(1, Ordering::Relaxed);
        self.stats
            .frames_received
            .fetch_add(frames as u64, Ordering::Relaxed);
        if dropped > 0 {
            self.stats.frames_dropped.fetch_add(dropped, Ordering::Relaxed);
        }
    }

    fn render<B, C>(&mut self, outputs: &mut [B]) -> bool
    where
        B: AsMut<[C]>,
        C: AsMut<[f32]>,
    {
        let requested = outputs
            .first_mut()
            .and_then(|block| block.as_mut().first_mut().map(|c| c.as_mut().len()))
            .unwrap_or(0);

        let before = self.buffer.buffered_frames();
        let keep_running = self.buffer.drain(outputs);
        let rendered = before - self.buffer.buffered_frames();

        if rendered > 0 {
            self.stats
                .frames_rendered
                .fetch_add(rendered as u64, Ordering::Relaxed);
        }
        if rendered < requested {
            self.stats.underruns.fetch_add(1, Ordering::Relaxed);
        }

        keep_running
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn processor(channels: usize, frames: usize) -> OffloadProcessor {
        OffloadProcessor::new(RingBufferConfig::new(channels, 1000.0, frames as f64).unwrap())
    }

    #[test]
    fn test_message_frames() {
        let message = AudioMessage::new(vec![Some(vec![0.0; 5]), None], Some(1.5));
        assert_eq!(message.frames(), 5);
        assert_eq!(AudioMessage::new(vec![None, Some(vec![0.0; 5])], None).frames(), 0);
        assert_eq!(AudioMessage::default().frames(), 0);
    }

    #[test]
    fn test_clear_keeps_lanes() {
        let mut message = AudioMessage::new(vec![Some(vec![1.0; 64]), None], Some(2.0));
        message.clear();

        assert_eq!(message.channels.len(), 2);
        assert_eq!(message.frames(), 0);
        assert!(message.channels[0].as_ref().unwrap().capacity() >= 64);
        assert_eq!(message.timestamp, None);
    }

    #[test]
    fn test_message_then_render() {
        let mut processor = processor(2, 8);
        processor.on_message(&AudioMessage::new(
            vec![Some(vec![1.0, 2.0, 3.0]), Some(vec![4.0, 5.0, 6.0])],
            Some(0.0),
        ));

        let mut out = vec![vec![vec![0.0; 3]; 2]];
        assert!(processor.render(&mut out));
        assert_eq!(out[0][0], vec![1.0, 2.0, 3.0]);
        assert_eq!(out[0][1], vec![4.0, 5.0, 6.0]);

        let stats = processor.stats().snapshot();
        assert_eq!(stats.messages, 1);
        assert_eq!(stats.frames_received, 3);
        assert_eq!(stats.frames_rendered, 3);
        assert_eq!(stats.underruns, 0);
    }

    #[test]
    fn test_stats_count_drops_and_underruns() {
        let mut processor = processor(1, 4);
        processor.on_message(&AudioMessage::new(vec![Some(vec![1.0; 6])], None));

        let mut out = vec![vec![vec![0.0; 3]]];
        processor.render(&mut out);
        processor.render(&mut out);
        processor.render(&mut out);

        let stats = processor.stats().snapshot();
        assert_eq!(stats.frames_dropped, 2);
        assert_eq!(stats.frames_rendered, 4);
        // Second quantum was short, third was empty
        assert_eq!(stats.underruns, 2);
    }

    /// Minimal host holding the callback by type parameter
    struct Host<P> {
        callback: P,
        lanes: Vec<Vec<Vec<f32>>>,
    }

    impl<P: RenderCallback> Host<P> {
        fn quantum(&mut self, message: Option<&AudioMessage>) -> bool {
            if let Some(message) = message {
                self.callback.on_message(message);
            }
            for lane in self.lanes[0].iter_mut() {
                lane.fill(0.0);
            }
            self.callback.render(&mut self.lanes)
        }
    }

    #[test]
    fn test_generic_host_drives_processor() {
        let mut host = Host {
            callback: processor(2, 8),
            lanes: vec![vec![vec![0.0; 2]; 2]],
        };

        let message = AudioMessage::new(vec![Some(vec![1.0, 2.0, 3.0]), None], None);
        assert!(host.quantum(Some(&message)));
        assert_eq!(host.lanes[0][0], vec![1.0, 2.0]);
        assert_eq!(host.lanes[0][1], vec![0.0, 0.0]);

        assert!(host.quantum(None));
        assert_eq!(host.lanes[0][0], vec![3.0, 0.0]);
        assert_eq!(host.callback.stats().snapshot().underruns, 1);
    }

    #[test]
    fn test_empty_message_is_ignored() {
        let mut processor = processor(1, 4);
        processor.on_message(&AudioMessage::default());
        processor.on_message(&AudioMessage::new(vec![Some(Vec::new())], None));

        assert_eq!(processor.stats().snapshot(), StatsSnapshot::default());
        assert!(processor.buffer().is_empty());
    }
}

//! Fixed-capacity offload buffer between a bursty producer and a render callback
//!
//! The producer appends multi-channel sample blocks whenever they arrive; the
//! render callback drains one quantum at a time. Neither side ever waits:
//!
//! - When the producer outruns the consumer, the oldest buffered frames are
//!   discarded so the newest block always fits (latest data wins).
//! - When the consumer outruns the producer, drain copies whatever is
//!   available (possibly nothing) and leaves the rest of the output alone.
//!
//! ## Layout
//!
//! Each channel has its own lane of `capacity` samples, allocated once.
//! Two logical cursors count frames written and frames read; the physical
//! index of logical frame `i` is `i % capacity`. Cursors are pulled back by
//! `capacity` once the read side completes a lap so they never grow without
//! bound.
//!
//! The buffer itself is a plain `&mut self` structure. It is meant to be owned
//! by the render context; see [`super::port`] for how the producer context
//! hands blocks across.

use super::config::RingBufferConfig;

/// Multi-channel circular sample store with drop-oldest overflow
#[derive(Debug)]
pub struct OffloadBuffer {
    config: RingBufferConfig,
    /// One lane per channel, each `capacity` samples long
    channels: Vec<Box<[f32]>>,
    capacity: usize,
    /// Frames written (logical)
    write_cursor: u64,
    /// Frames consumed or discarded (logical)
    read_cursor: u64,
}

impl OffloadBuffer {
    /// Allocate zeroed lanes sized from the config
    pub fn new(config: RingBufferConfig) -> Self {
        let capacity = config.capacity_frames();
        let channels = (0..config.channel_count())
            .map(|_| vec![0.0; capacity].into_boxed_slice())
            .collect();

        Self {
            config,
            channels,
            capacity,
            write_cursor: 0,
            read_cursor: 0,
        }
    }

    pub fn config(&self) -> &RingBufferConfig {
        &self.config
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    pub fn capacity_frames(&self) -> usize {
        self.capacity
    }

    /// Frames currently buffered and not yet drained
    pub fn buffered_frames(&self) -> usize {
        (self.write_cursor - self.read_cursor) as usize
    }

    pub fn is_empty(&self) -> bool {
        self.write_cursor == self.read_cursor
    }

    #[inline]
    fn is_ready(&self) -> bool {
        self.capacity > 0 && !self.channels.is_empty()
    }

    /// Append one block of per-channel samples
    ///
    /// The frame count comes from the first channel. Absent channels are
    /// written as silence, short channels are padded with silence, and extra
    /// source channels are ignored. An empty block (or an empty or absent
    /// first channel) is a no-op.
    ///
    /// Returns the number of frames discarded to make room. Never blocks and
    /// never allocates.
    pub fn append<S: AsRef<[f32]>>(&mut self, block: &[Option<S>]) -> u64 {
        let n = match block.first() {
            Some(Some(first)) => first.as_ref().len(),
            _ => return 0,
        };
        if n == 0 || !self.is_ready() {
            return 0;
        }

        let capacity = self.capacity as u64;
        let frames = n as u64;

        // Make room before writing
        let buffered = self.write_cursor - self.read_cursor;
        let dropped = (buffered + frames).saturating_sub(capacity);
        self.read_cursor += dropped;

        // Only the newest `capacity` frames of an oversized block survive
        let skip = n.saturating_sub(self.capacity);
        let len = n - skip;
        let start = ((self.write_cursor + skip as u64) % capacity) as usize;

        for (index, lane) in self.channels.iter_mut().enumerate() {
            match block.get(index).and_then(Option::as_ref) {
                Some(source) => {
                    let source = source.as_ref();
                    let present = source.len().min(n);
                    let from = skip.min(present);
                    let copied = present - from;

                    write_wrapped(lane, start, &source[from..present]);
                    fill_wrapped(lane, (start + copied) % self.capacity, len - copied);
                }
                None => fill_wrapped(lane, start, len),
            }
        }

        self.write_cursor += frames;
        dropped
    }

    /// Drain up to one quantum into caller-supplied output blocks
    ///
    /// The quantum length is the length of the first output channel of the
    /// first block. Every block receives the same window of frames starting at
    /// offset 0; output lanes with no matching buffer lane are silenced.
    /// Frames beyond what is buffered are left untouched, so callers should
    /// pre-zero their outputs.
    ///
    /// Always returns `true` (keep rendering).
    pub fn drain<B, C>(&mut self, outputs: &mut [B]) -> bool
    where
        B: AsMut<[C]>,
        C: AsMut<[f32]>,
    {
        let requested = match outputs.first_mut() {
            Some(block) => match block.as_mut().first_mut() {
                Some(channel) => channel.as_mut().len(),
                None => return true,
            },
            None => return true,
        };
        if requested == 0 || !self.is_ready() {
            return true;
        }

        let available = self.write_cursor - self.read_cursor;
        let to_copy = available.min(requested as u64) as usize;
        if to_copy == 0 {
            return true;
        }

        let start = (self.read_cursor % self.capacity as u64) as usize;

        for block in outputs.iter_mut() {
            for (index, output) in block.as_mut().iter_mut().enumerate() {
                let output = output.as_mut();
                let len = to_copy.min(output.len());
                match self.channels.get(index) {
                    Some(lane) => read_wrapped(lane, start, &mut output[..len]),
                    None => output[..len].fill(0.0),
                }
            }
        }

        self.read_cursor += to_copy as u64;

        // A full lap has been consumed: shift logical time back one lap
        let capacity = self.capacity as u64;
        if self.read_cursor >= capacity {
            self.read_cursor -= capacity;
            self.write_cursor -= capacity;
        }

        true
    }
}

/// Copy `src` into `lane` starting at `start`, wrapping to index 0.
/// `src` must not be longer than `lane`.
#[inline]
fn write_wrapped(lane: &mut [f32], start: usize, src: &[f32]) {
    let first = src.len().min(lane.len() - start);
    lane[start..start + first].copy_from_slice(&src[..first]);
    lane[..src.len() - first].copy_from_slice(&src[first..]);
}

#[inline]
fn fill_wrapped(lane: &mut [f32], start: usize, len: usize) {
    let first = len.min(lane.len() - start);
    lane[start..start + first].fill(0.0);
    lane[..len - first].fill(0.0);
}

#[inline]
fn read_wrapped(lane: &[f32], start: usize, dst: &mut [f32]) {
    let first = dst.len().min(lane.len() - start);
    dst[..first].copy_from_slice(&lane[start..start + first]);
    let rest = dst.len() - first;
    dst[first..].copy_from_slice(&lane[..rest]);
}

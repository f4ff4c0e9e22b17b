//! offload-rs - audio offload buffer
//!
//! A fixed-capacity, multi-channel circular buffer that sits between a
//! producer delivering sample blocks at irregular times and a real-time
//! render callback pulling fixed quanta. Overflow drops the oldest frames,
//! starvation renders nothing; neither side blocks.
//!
//! ```
//! use offload_rs::audio::{OffloadBuffer, RingBufferConfig};
//!
//! let config = RingBufferConfig::new(2, 48000.0, 50.0).unwrap();
//! let mut buffer = OffloadBuffer::new(config);
//! assert_eq!(buffer.capacity_frames(), 2400);
//!
//! buffer.append(&[Some(vec![1.0, 2.0, 3.0]), Some(vec![4.0, 5.0, 6.0])]);
//!
//! let mut out = vec![vec![vec![0.0; 3]; 2]];
//! assert!(buffer.drain(&mut out));
//! assert_eq!(out[0][0], vec![1.0, 2.0, 3.0]);
//! ```

pub mod audio;
pub mod settings;

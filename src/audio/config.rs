//! Offload buffer configuration
//!
//! Options arrive from the host untyped and possibly incomplete, so every
//! field of [`RingBufferOptions`] is optional. [`RingBufferConfig`] is the
//! validated form; once one exists the buffer can be sized.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Largest lane length accepted, in frames
pub const MAX_CAPACITY_FRAMES: usize = u32::MAX as usize;

/// Errors raised while validating buffer options
///
/// These are the only errors the offload buffer produces. Everything on the
/// data path (starvation, overflow, missing channels) is handled silently.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("No buffer options provided")]
    MissingOptions,

    #[error("Invalid channel count: {0:?}")]
    InvalidChannelCount(Option<i64>),

    #[error("Invalid sample rate: {0:?}")]
    InvalidSampleRate(Option<f64>),

    #[error("Invalid latency (ms): {0:?}")]
    InvalidLatency(Option<f64>),
}

/// Raw construction options, as a host would send them
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RingBufferOptions {
    pub channel_count: Option<i64>,
    pub sample_rate: Option<f64>,
    pub latency_ms: Option<f64>,
}

/// Validated, immutable buffer parameters
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RingBufferConfig {
    channel_count: usize,
    sample_rate: f64,
    latency_ms: f64,
    capacity_frames: usize,
}

impl RingBufferConfig {
    /// Validate explicit parameters
    pub fn new(channel_count: usize, sample_rate: f64, latency_ms: f64) -> Result<Self, ConfigError> {
        Self::from_options(Some(&RingBufferOptions {
            channel_count: i64::try_from(channel_count).ok(),
            sample_rate: Some(sample_rate),
            latency_ms: Some(latency_ms),
        }))
    }

    /// Validate host options
    ///
    /// Checks run in order (channel count, sample rate, latency) and the first
    /// failure is returned.
    pub fn from_options(options: Option<&RingBufferOptions>) -> Result<Self, ConfigError> {
        let options = options.ok_or(ConfigError::MissingOptions)?;

        let channel_count = match options.channel_count {
            Some(c) if c > 0 => c as usize,
            other => return Err(ConfigError::InvalidChannelCount(other)),
        };

        let sample_rate = match options.sample_rate {
            Some(r) if r > 0.0 && r.is_finite() => r,
            other => return Err(ConfigError::InvalidSampleRate(other)),
        };

        let latency_ms = match options.latency_ms {
            Some(l) if l > 0.0 && l.is_finite() => l,
            other => return Err(ConfigError::InvalidLatency(other)),
        };

        let frames = (sample_rate * latency_ms / 1000.0).ceil();
        if !frames.is_finite() || frames > MAX_CAPACITY_FRAMES as f64 {
            return Err(ConfigError::InvalidLatency(Some(latency_ms)));
        }

        Ok(Self {
            channel_count,
            sample_rate,
            latency_ms,
            capacity_frames: frames as usize,
        })
    }

    pub fn channel_count(&self) -> usize {
        self.channel_count
    }

    pub fn sample_rate(&self) -> f64 {
        self.sample_rate
    }

    pub fn latency_ms(&self) -> f64 {
        self.latency_ms
    }

    /// Length of every per-channel lane: `ceil(sample_rate * latency_ms / 1000)`
    ///
    /// Computed once during validation and never above [`MAX_CAPACITY_FRAMES`].
    pub fn capacity_frames(&self) -> usize {
        self.capacity_frames
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn options(channels: Option<i64>, rate: Option<f64>, latency: Option<f64>) -> RingBufferOptions {
        RingBufferOptions {
            channel_count: channels,
            sample_rate: rate,
            latency_ms: latency,
        }
    }

    #[test]
    fn test_capacity_from_rate_and_latency() {
        let config = RingBufferConfig::new(2, 48000.0, 50.0).unwrap();
        assert_eq!(config.capacity_frames(), 2400);

        // Fractional frame counts round up
        let config = RingBufferConfig::new(1, 44100.0, 0.01).unwrap();
        assert_eq!(config.capacity_frames(), 1);
    }

    #[test]
    fn test_missing_options() {
        assert_eq!(
            RingBufferConfig::from_options(None),
            Err(ConfigError::MissingOptions)
        );
    }

    #[test]
    fn test_invalid_channel_count() {
        for channels in [None, Some(0), Some(-2)] {
            let result = RingBufferConfig::from_options(Some(&options(channels, Some(48000.0), Some(20.0))));
            assert_eq!(result, Err(ConfigError::InvalidChannelCount(channels)));
        }
    }

    #[test]
    fn test_invalid_sample_rate() {
        for rate in [None, Some(0.0), Some(-48000.0), Some(f64::NAN), Some(f64::INFINITY)] {
            let result = RingBufferConfig::from_options(Some(&options(Some(2), rate, Some(20.0))));
            assert!(matches!(result, Err(ConfigError::InvalidSampleRate(_))));
        }
    }

    #[test]
    fn test_invalid_latency() {
        for latency in [None, Some(0.0), Some(-5.0)] {
            let result = RingBufferConfig::from_options(Some(&options(Some(2), Some(48000.0), latency)));
            assert_eq!(result, Err(ConfigError::InvalidLatency(latency)));
        }
    }

    #[test]
    fn test_oversized_capacity_is_rejected() {
        let result = RingBufferConfig::from_options(Some(&options(Some(2), Some(1e12), Some(1e12))));
        assert_eq!(result, Err(ConfigError::InvalidLatency(Some(1e12))));

        // Product overflows f64 to infinity
        let result = RingBufferConfig::new(1, f64::MAX, f64::MAX);
        assert_eq!(result, Err(ConfigError::InvalidLatency(Some(f64::MAX))));

        // Largest accepted lane still validates
        let config = RingBufferConfig::new(1, MAX_CAPACITY_FRAMES as f64, 1000.0).unwrap();
        assert_eq!(config.capacity_frames(), MAX_CAPACITY_FRAMES);
    }

    #[test]
    fn test_validation_order() {
        // Every field is bad; the channel count is reported first
        let result = RingBufferConfig::from_options(Some(&options(Some(0), Some(0.0), Some(0.0))));
        assert_eq!(result, Err(ConfigError::InvalidChannelCount(Some(0))));

        let result = RingBufferConfig::from_options(Some(&options(Some(1), None, None)));
        assert_eq!(result, Err(ConfigError::InvalidSampleRate(None)));
    }

    #[test]
    fn test_options_from_json() {
        let parsed: RingBufferOptions =
            serde_json::from_str(r#"{"channelCount": 2, "sampleRate": 48000, "latencyMs": 50}"#).unwrap();
        let config = RingBufferConfig::from_options(Some(&parsed)).unwrap();
        assert_eq!(config.channel_count(), 2);
        assert_eq!(config.capacity_frames(), 2400);

        let partial: RingBufferOptions = serde_json::from_str(r#"{"channelCount": 2}"#).unwrap();
        assert_eq!(
            RingBufferConfig::from_options(Some(&partial)),
            Err(ConfigError::InvalidSampleRate(None))
        );
    }
}

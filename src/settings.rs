use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Returns the path to the settings file: `~/.config/offload-rs/settings.json`
fn settings_path() -> PathBuf {
    let mut path = dirs::config_dir().unwrap_or_else(|| PathBuf::from("."));
    path.push("offload-rs");
    path.push("settings.json");
    path
}

/// Persisted player settings.
///
/// Serialized as JSON to the platform config directory.
/// Fields use `#[serde(default)]` so that adding new settings
/// won't break existing config files.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppSettings {
    /// Target buffering window of the offload buffer
    pub latency_ms: f64,
    /// Gain applied by the producer
    pub volume: f32,
    /// In-flight messages allowed on the port
    pub port_capacity: usize,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            latency_ms: 100.0,
            volume: 1.0,
            port_capacity: 64,
        }
    }
}

impl AppSettings {
    /// Load settings from disk, falling back to defaults on any error.
    pub fn load() -> Self {
        let path = settings_path();
        match std::fs::read_to_string(&path) {
            Ok(contents) => match serde_json::from_str(&contents) {
                Ok(settings) => {
                    log::info!("Loaded settings from {}", path.display());
                    settings
                }
                Err(e) => {
                    log::warn!("Failed to parse settings ({}), using defaults", e);
                    Self::default()
                }
            },
            Err(e) => {
                log::info!("No settings file found ({}), using defaults", e);
                Self::default()
            }
        }
    }

    /// Save settings to disk as pretty JSON.
    pub fn save(&self) {
        let path = settings_path();
        if let Some(parent) = path.parent() {
            if let Err(e) = std::fs::create_dir_all(parent) {
                log::warn!("Failed to create config directory: {}", e);
                return;
            }
        }
        match serde_json::to_string_pretty(self) {
            Ok(json) => {
                if let Err(e) = std::fs::write(&path, json) {
                    log::warn!("Failed to write settings: {}", e);
                }
            }
            Err(e) => {
                log::warn!("Failed to serialize settings: {}", e);
            }
        }
    }

    /// Frames the producer may run ahead of playback: half the buffer window
    pub fn lead_frames(&self, sample_rate: u32) -> u64 {
        (sample_rate as f64 * self.latency_ms / 2000.0).ceil() as u64
    }
}

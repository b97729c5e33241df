//! Session configuration
//!
//! Stored as JSON. Missing fields take their defaults so older files keep
//! loading.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{MultitakeError, Result};

/// Default file name used when exporting into a directory
pub const DEFAULT_EXPORT_FILE_NAME: &str = "combined-audio.wav";

/// Tunables for a recording session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Play the most recent take back as a cue while recording a new one
    pub monitor_last_take: bool,

    /// Drift magnitude (ms) above which playback drift is logged as a warning
    pub drift_tolerance_ms: f64,

    /// File name used by `export_to` when given a directory
    pub export_file_name: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            monitor_last_take: true,
            drift_tolerance_ms: 20.0,
            export_file_name: DEFAULT_EXPORT_FILE_NAME.to_string(),
        }
    }
}

impl SessionConfig {
    /// Load and validate a JSON config file
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let config: SessionConfig = serde_json::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    /// Write the config as pretty JSON
    pub fn save(&self, path: &Path) -> Result<()> {
        self.validate()?;
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    /// Reject values the session cannot work with
    pub fn validate(&self) -> Result<()> {
        if !self.drift_tolerance_ms.is_finite() || self.drift_tolerance_ms < 0.0 {
            return Err(MultitakeError::Config {
                reason: format!(
                    "drift_tolerance_ms must be a non-negative number, got {}",
                    self.drift_tolerance_ms
                ),
            });
        }

        let name = self.export_file_name.trim();
        if name.is_empty() || name.contains('/') || name.contains('\\') {
            return Err(MultitakeError::Config {
                reason: format!(
                    "export_file_name must be a plain file name, got {:?}",
                    self.export_file_name
                ),
            });
        }

        Ok(())
    }

    pub fn drift_tolerance(&self) -> Duration {
        Duration::from_secs_f64(self.drift_tolerance_ms / 1000.0)
    }
}

use crate::scope::TrackingScope;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration for snapshot comparison and debouncing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    /// Quiet period after the last interim edit before comparing (milliseconds)
    pub debounce_ms: u64,

    /// Count meaningful lines (true) or raw line count changes (false)
    pub meaningful_lines_only: bool,

    /// Which files are tracked at all
    pub scope: TrackingScope,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            debounce_ms: 500,
            meaningful_lines_only: true,
            scope: TrackingScope::AllFiles,
        }
    }
}

impl DetectorConfig {
    pub const fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        if let TrackingScope::Extensions { extensions } = &self.scope {
            if extensions.is_empty() {
                return Err("tracking scope extension list must not be empty".to_string());
            }
        }
        Ok(())
    }
}

use crate::{Result, UnlockError};
use codeplay_tracker::DetectorConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Thresholds and credit amounts for the unlock state machine
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UnlockConfig {
    /// Credits granted on first registration (0 = start locked)
    pub initial_play_credits: u32,

    /// Accumulated lines needed to unlock
    pub lines_required_to_unlock: u64,

    /// Credits granted each time the threshold is reached
    pub play_credits_granted_per_unlock: u32,

    /// Count meaningful lines (true) or raw line changes (false)
    pub meaningful_lines_only: bool,
}

impl Default for UnlockConfig {
    fn default() -> Self {
        Self {
            initial_play_credits: 5,
            lines_required_to_unlock: 50,
            play_credits_granted_per_unlock: 5,
            meaningful_lines_only: true,
        }
    }
}

impl UnlockConfig {
    /// Validate configuration
    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.lines_required_to_unlock == 0 {
            return Err("lines_required_to_unlock must be > 0".to_string());
        }
        if self.play_credits_granted_per_unlock == 0 {
            return Err("play_credits_granted_per_unlock must be > 0".to_string());
        }
        Ok(())
    }
}

/// Whether unlock state is kept per game or shared by all games.
///
/// Fixed for the lifetime of an engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum StateScope {
    #[default]
    PerGame,
    Global,
}

/// Top-level configuration file (`codeplay.toml`)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct CodeplayConfig {
    pub state_scope: StateScope,
    pub unlock: UnlockConfig,
    pub detector: DetectorConfig,
}

impl CodeplayConfig {
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let config: Self =
            toml::from_str(raw).map_err(|e| UnlockError::invalid_config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            UnlockError::invalid_config(format!("read {}: {e}", path.display()))
        })?;
        Self::from_toml_str(&raw)
    }

    pub fn validate(&self) -> Result<()> {
        self.unlock.validate().map_err(UnlockError::invalid_config)?;
        self.detector.validate().map_err(UnlockError::invalid_config)?;
        Ok(())
    }

    /// Detector settings with the counting policy taken from the unlock section
    pub fn detector_config(&self) -> DetectorConfig {
        DetectorConfig {
            meaningful_lines_only: self.unlock.meaningful_lines_only,
            ..self.detector.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use codeplay_tracker::TrackingScope;
    use pretty_assertions::assert_eq;

    #[test]
    fn defaults_match_shipped_settings() {
        let config = CodeplayConfig::default();
        assert_eq!(config.unlock.initial_play_credits, 5);
        assert_eq!(config.unlock.lines_required_to_unlock, 50);
        assert_eq!(config.unlock.play_credits_granted_per_unlock, 5);
        assert!(config.unlock.meaningful_lines_only);
        assert_eq!(config.state_scope, StateScope::PerGame);
        assert_eq!(config.detector.debounce_ms, 500);
    }

    #[test]
    fn parses_partial_toml() {
        let config = CodeplayConfig::from_toml_str(
            r#"
            state_scope = "global"

            [unlock]
            lines_required_to_unlock = 20
            meaningful_lines_only = false

            [detector]
            debounce_ms = 250
            scope = { mode = "extensions", extensions = ["rs", "ts"] }
            "#,
        )
        .expect("config");
        assert_eq!(config.state_scope, StateScope::Global);
        assert_eq!(config.unlock.lines_required_to_unlock, 20);
        assert_eq!(config.unlock.initial_play_credits, 5);
        assert_eq!(
            config.detector.scope,
            TrackingScope::extensions(["rs", "ts"])
        );
        assert!(!config.detector_config().meaningful_lines_only);
        assert_eq!(config.detector_config().debounce_ms, 250);
    }

    #[test]
    fn rejects_zero_threshold() {
        let err = CodeplayConfig::from_toml_str("[unlock]\nlines_required_to_unlock = 0\n")
            .expect_err("zero threshold");
        assert!(matches!(err, UnlockError::InvalidConfig(_)));
    }
}

use thiserror::Error;

pub type Result<T> = std::result::Result<T, TrackerError>;

#[derive(Error, Debug)]
pub enum TrackerError {
    #[error("Invalid snapshot for {unit_id}: {reason}")]
    InvalidSnapshot { unit_id: String, reason: String },

    #[error("Tokio runtime unavailable: {0}")]
    Runtime(String),

    #[error("{0}")]
    Other(String),
}

impl TrackerError {
    pub fn invalid_snapshot(unit_id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidSnapshot {
            unit_id: unit_id.into(),
            reason: reason.into(),
        }
    }
}

use thiserror::Error;

pub type Result<T> = std::result::Result<T, UnlockError>;

/// Errors returned by the unlock engine and its stores
#[derive(Error, Debug)]
pub enum UnlockError {
    /// Referenced game was never registered
    #[error("Unknown game: {game_id}")]
    NotFound { game_id: String },

    /// Play attempted while locked
    #[error("{game_name} is locked. Write {lines_remaining} more lines of code to unlock it")]
    Locked {
        game_id: String,
        game_name: String,
        lines_remaining: u64,
    },

    /// Play attempted with zero credits left
    #[error(
        "No plays remaining for {game_name}. Write {lines_remaining} more lines of code to unlock it again"
    )]
    NoCreditsRemaining {
        game_id: String,
        game_name: String,
        lines_remaining: u64,
    },

    /// Underlying store rejected a read or write
    #[error("Persistence failure (retry later): {0}")]
    PersistenceFailure(String),

    /// Import payload failed to parse or was not a flat namespaced object
    #[error("Malformed import: {0}")]
    MalformedImport(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl UnlockError {
    pub fn persistence(msg: impl Into<String>) -> Self {
        Self::PersistenceFailure(msg.into())
    }

    pub fn malformed_import(msg: impl Into<String>) -> Self {
        Self::MalformedImport(msg.into())
    }

    pub fn invalid_config(msg: impl Into<String>) -> Self {
        Self::InvalidConfig(msg.into())
    }

    /// Expected gameplay outcomes, shown to the user but never logged as errors
    pub const fn is_expected(&self) -> bool {
        matches!(
            self,
            Self::NotFound { .. } | Self::Locked { .. } | Self::NoCreditsRemaining { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn locked_message_states_remaining_lines() {
        let err = UnlockError::Locked {
            game_id: "snake".into(),
            game_name: "Snake".into(),
            lines_remaining: 12,
        };
        assert_eq!(
            err.to_string(),
            "Snake is locked. Write 12 more lines of code to unlock it"
        );
        assert!(err.is_expected());
        assert!(!UnlockError::persistence("disk full").is_expected());
    }

    #[test]
    fn exhausted_credits_message_states_lines_needed() {
        let err = UnlockError::NoCreditsRemaining {
            game_id: "snake".into(),
            game_name: "Snake".into(),
            lines_remaining: 50,
        };
        assert_eq!(
            err.to_string(),
            "No plays remaining for Snake. Write 50 more lines of code to unlock it again"
        );
        assert!(err.is_expected());
    }
}

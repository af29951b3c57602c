use crate::UnlockConfig;
use serde::{Deserialize, Serialize};

/// Persistent unlock state.
///
/// Progress only exists while locked and credits only while unlocked, so
/// every transition starts the other counter from zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum UnlockState {
    Locked { progress_lines: u64 },
    Unlocked { plays_remaining: u32 },
}

impl UnlockState {
    /// State for a freshly registered game (or after a reset)
    pub const fn initial(config: &UnlockConfig) -> Self {
        if config.initial_play_credits > 0 {
            Self::Unlocked {
                plays_remaining: config.initial_play_credits,
            }
        } else {
            Self::locked()
        }
    }

    pub const fn locked() -> Self {
        Self::Locked { progress_lines: 0 }
    }

    pub const fn is_unlocked(&self) -> bool {
        matches!(self, Self::Unlocked { .. })
    }

    pub const fn plays_remaining(&self) -> u32 {
        match self {
            Self::Unlocked { plays_remaining } => *plays_remaining,
            Self::Locked { .. } => 0,
        }
    }

    pub const fn progress_lines(&self) -> u64 {
        match self {
            Self::Locked { progress_lines } => *progress_lines,
            Self::Unlocked { .. } => 0,
        }
    }

    /// Lines still needed under `lines_required`; zero while unlocked
    pub const fn lines_remaining(&self, lines_required: u64) -> u64 {
        match self {
            Self::Locked { progress_lines } => lines_required.saturating_sub(*progress_lines),
            Self::Unlocked { .. } => 0,
        }
    }
}

/// Static registration record for a mini-game
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayableUnit {
    pub id: String,
    pub display_name: String,
    pub description: String,
}

impl PlayableUnit {
    pub fn new(
        id: impl Into<String>,
        display_name: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            display_name: display_name.into(),
            description: description.into(),
        }
    }
}

/// Games shipped with the extension
pub fn builtin_games() -> Vec<PlayableUnit> {
    vec![
        PlayableUnit::new(
            "snake",
            "Snake",
            "Guide the snake to food, grow longer, and avoid hitting your own tail.",
        ),
        PlayableUnit::new(
            "whack-a-mole",
            "Whack-a-Mole",
            "Hit the moles as they pop up before the timer runs out.",
        ),
    ]
}

/// Per-game play statistics
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct GameStats {
    pub high_score: u64,
    pub total_plays: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_played_unix_ms: Option<u64>,
}

impl GameStats {
    pub(crate) fn record_play(&mut self, score: Option<u64>, now_unix_ms: u64) {
        self.total_plays += 1;
        if let Some(score) = score {
            self.high_score = self.high_score.max(score);
        }
        self.last_played_unix_ms = Some(now_unix_ms);
    }
}

/// Everything the sidebar and status bar show for one game
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GameStatus {
    pub game: PlayableUnit,
    pub state: UnlockState,
    pub stats: GameStats,
    pub lines_required: u64,
    pub lines_remaining: u64,
}

/// Result of finishing a play session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PlayOutcome {
    pub state: UnlockState,
    pub stats: GameStats,
    /// The session consumed the last credit
    pub locked: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn initial_state_follows_initial_credits() {
        let config = UnlockConfig::default();
        assert_eq!(
            UnlockState::initial(&config),
            UnlockState::Unlocked { plays_remaining: 5 }
        );

        let config = UnlockConfig {
            initial_play_credits: 0,
            ..UnlockConfig::default()
        };
        assert_eq!(UnlockState::initial(&config), UnlockState::locked());
    }

    #[test]
    fn serializes_with_status_tag() {
        let json = serde_json::to_value(UnlockState::Locked { progress_lines: 7 }).expect("json");
        assert_eq!(json, serde_json::json!({"status": "locked", "progress_lines": 7}));

        let state: UnlockState =
            serde_json::from_value(serde_json::json!({"status": "unlocked", "plays_remaining": 3}))
                .expect("state");
        assert_eq!(state.plays_remaining(), 3);
        assert_eq!(state.progress_lines(), 0);
    }

    #[test]
    fn stats_keep_highest_score() {
        let mut stats = GameStats::default();
        stats.record_play(Some(40), 1);
        stats.record_play(Some(10), 2);
        stats.record_play(None, 3);
        assert_eq!(stats.high_score, 40);
        assert_eq!(stats.total_plays, 3);
        assert_eq!(stats.last_played_unix_ms, Some(3));
    }

    #[test]
    fn lines_remaining_saturates() {
        assert_eq!(UnlockState::Locked { progress_lines: 60 }.lines_remaining(50), 0);
        assert_eq!(UnlockState::Locked { progress_lines: 20 }.lines_remaining(50), 30);
        assert_eq!(UnlockState::Unlocked { plays_remaining: 1 }.lines_remaining(50), 0);
    }
}

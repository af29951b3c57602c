use crate::{PlayOutcome, Result, UnlockEngine, UnlockState};
use log::{debug, error, info, warn};
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;

const KNOWN_MESSAGE_TYPES: &[&str] = &["gameOver", "log", "error", "ready"];

/// Messages a game window may post back to the host
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum GameMessage {
    GameOver { score: u64 },
    Log { text: String },
    Error { text: String },
    Ready,
}

impl GameMessage {
    /// Validate a raw webview payload.
    ///
    /// Unknown or malformed messages are logged and ignored.
    pub fn parse(raw: &str) -> Option<Self> {
        let value: Value = match serde_json::from_str(raw) {
            Ok(value) => value,
            Err(err) => {
                warn!("Ignoring unparsable game message: {err}");
                return None;
            }
        };
        let Some(kind) = value.get("type").and_then(Value::as_str).map(str::to_string) else {
            warn!("Ignoring game message without a type tag");
            return None;
        };
        if !KNOWN_MESSAGE_TYPES.contains(&kind.as_str()) {
            warn!("Ignoring unknown game message type {kind:?}");
            return None;
        }
        match serde_json::from_value(value) {
            Ok(message) => Some(message),
            Err(err) => {
                warn!("Ignoring malformed {kind:?} game message: {err}");
                None
            }
        }
    }
}

/// One play session of a game window.
///
/// Starting a session checks credits; the credit is charged when the game
/// reports `gameOver`. Dropping or aborting a session before that is free.
pub struct GameSession {
    engine: Arc<UnlockEngine>,
    game_id: String,
    outcome: Option<PlayOutcome>,
}

impl GameSession {
    pub async fn begin(engine: Arc<UnlockEngine>, game_id: &str) -> Result<Self> {
        engine.attempt_play(game_id).await?;
        info!("Started {game_id} session");
        Ok(Self {
            engine,
            game_id: game_id.to_string(),
            outcome: None,
        })
    }

    pub fn game_id(&self) -> &str {
        &self.game_id
    }

    pub fn outcome(&self) -> Option<&PlayOutcome> {
        self.outcome.as_ref()
    }

    /// Handle a raw message from the game window.
    ///
    /// Returns the play outcome when this message finished the session.
    pub async fn handle_message(&mut self, raw: &str) -> Result<Option<PlayOutcome>> {
        let Some(message) = GameMessage::parse(raw) else {
            return Ok(None);
        };
        match message {
            GameMessage::Ready => {
                debug!("{} window ready", self.game_id);
                Ok(None)
            }
            GameMessage::Log { text } => {
                info!("[{}] {text}", self.game_id);
                Ok(None)
            }
            GameMessage::Error { text } => {
                error!("[{}] game error: {text}", self.game_id);
                Ok(None)
            }
            GameMessage::GameOver { score } => {
                if self.outcome.is_some() {
                    warn!("{} reported game over twice; ignoring", self.game_id);
                    return Ok(None);
                }
                let outcome = self.engine.end_play(&self.game_id, Some(score)).await?;
                self.outcome = Some(outcome);
                Ok(Some(outcome))
            }
        }
    }

    /// Close the window without charging a credit (when no game over was reported)
    pub async fn abort(self) -> Result<UnlockState> {
        if self.outcome.is_none() {
            debug!("{} session aborted before game over", self.game_id);
        }
        self.engine.state(&self.game_id).await
    }
}

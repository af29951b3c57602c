//! # Codeplay Unlock
//!
//! Persistent play-credit state machine fed by detected code changes.
//!
//! ## States
//!
//! ```text
//!            progress >= lines_required
//!   Locked{progress} ─────────────────────> Unlocked{plays}
//!          ^                                     │
//!          └──────── end_play uses last play ────┘
//! ```
//!
//! Progress only accrues while locked. Credits are checked by
//! [`UnlockEngine::attempt_play`] and charged by [`UnlockEngine::end_play`].
//! State lives in a [`KeyValueStore`], either per game or shared by all games
//! ([`StateScope`]).
//!
//! ## Example
//!
//! ```no_run
//! use codeplay_unlock::{builtin_games, MemoryStore, StateScope, UnlockConfig, UnlockEngine};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> codeplay_unlock::Result<()> {
//!     let engine = UnlockEngine::new(
//!         Arc::new(MemoryStore::new()),
//!         StateScope::PerGame,
//!         UnlockConfig::default(),
//!     )?;
//!     engine.events().subscribe(|event| println!("{}", event.name()));
//!     for game in builtin_games() {
//!         engine.register_game(game).await?;
//!     }
//!
//!     engine.attempt_play("snake").await?;
//!     let outcome = engine.end_play("snake", Some(120)).await?;
//!     println!("{} plays left", outcome.state.plays_remaining());
//!     Ok(())
//! }
//! ```

mod config;
mod engine;
mod error;
mod events;
pub mod keys;
mod session;
mod state;
mod store;

pub use config::{CodeplayConfig, StateScope, UnlockConfig};
pub use engine::UnlockEngine;
pub use error::{Result, UnlockError};
pub use events::{EngineEvent, EventBus, EventScope, SubscriptionId};
pub use session::{GameMessage, GameSession};
pub use state::{builtin_games, GameStats, GameStatus, PlayOutcome, PlayableUnit, UnlockState};
pub use store::{JsonFileStore, KeyValueStore, MemoryStore, WriteBatch};

use crate::keys::{self, CONFIG_KEY, NAMESPACE, TOTAL_LINES_KEY};
use crate::{
    EngineEvent, EventBus, EventScope, GameStats, GameStatus, KeyValueStore, PlayOutcome,
    PlayableUnit, Result, StateScope, UnlockConfig, UnlockError, UnlockState, WriteBatch,
};
use codeplay_tracker::ChangeDelta;
use log::{debug, info, warn};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};
use std::time::SystemTime;
use tokio::sync::{Mutex as TokioMutex, OwnedMutexGuard};

const MILESTONE_RATIO: f64 = 0.75;
// Progress must land inside [0.75, 0.76) for the milestone to fire.
const MILESTONE_WINDOW: f64 = 0.01;

/// Persistent Locked/Unlocked state machine for play credits.
///
/// Every transition runs "read → compute → write → emit" while holding the
/// locks of every key it touches. Each transition is one store write, and
/// nothing is emitted before the store acknowledges it.
pub struct UnlockEngine {
    store: Arc<dyn KeyValueStore>,
    scope: StateScope,
    config: RwLock<UnlockConfig>,
    catalog: RwLock<Vec<PlayableUnit>>,
    events: EventBus,
    key_locks: KeyLocks,
}

#[derive(Default)]
struct KeyLocks {
    locks: Mutex<HashMap<String, Arc<TokioMutex<()>>>>,
}

impl KeyLocks {
    async fn acquire(&self, key: &str) -> OwnedMutexGuard<()> {
        let lock = {
            let mut guard = match self.locks.lock() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            guard
                .entry(key.to_string())
                .or_insert_with(|| Arc::new(TokioMutex::new(())))
                .clone()
        };
        lock.lock_owned().await
    }

    /// Lock several keys, always in sorted order so overlapping callers
    /// cannot deadlock.
    async fn acquire_all<I>(&self, keys: I) -> Vec<OwnedMutexGuard<()>>
    where
        I: IntoIterator<Item = String>,
    {
        let mut keys: Vec<String> = keys.into_iter().collect();
        keys.sort();
        keys.dedup();
        let mut guards = Vec::with_capacity(keys.len());
        for key in &keys {
            guards.push(self.acquire(key).await);
        }
        guards
    }
}

impl UnlockEngine {
    pub fn new(
        store: Arc<dyn KeyValueStore>,
        scope: StateScope,
        config: UnlockConfig,
    ) -> Result<Self> {
        config.validate().map_err(UnlockError::invalid_config)?;
        Ok(Self {
            store,
            scope,
            config: RwLock::new(config),
            catalog: RwLock::new(Vec::new()),
            events: EventBus::new(),
            key_locks: KeyLocks::default(),
        })
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub const fn scope(&self) -> StateScope {
        self.scope
    }

    pub fn config(&self) -> UnlockConfig {
        match self.config.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn games(&self) -> Vec<PlayableUnit> {
        match self.catalog.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn game(&self, game_id: &str) -> Option<PlayableUnit> {
        self.games().into_iter().find(|game| game.id == game_id)
    }

    /// Add or refresh a catalog entry; persisted state is only created when absent.
    pub async fn register_game(&self, game: PlayableUnit) -> Result<UnlockState> {
        let key = keys::state_key(self.scope, &game.id);
        let _guard = self.key_locks.acquire(&key).await;

        let state = match self.load::<UnlockState>(&key).await? {
            Some(existing) => existing,
            None => {
                let initial = UnlockState::initial(&self.config());
                self.save(&key, &initial).await?;
                info!("Registered {} with initial state {initial:?}", game.id);
                initial
            }
        };

        let mut catalog = self
            .catalog
            .write()
            .map_err(|_| UnlockError::persistence("catalog lock poisoned"))?;
        match catalog.iter_mut().find(|existing| existing.id == game.id) {
            Some(existing) => *existing = game,
            None => catalog.push(game),
        }
        Ok(state)
    }

    /// Restore the unlock config persisted by a previous session, if any.
    pub async fn restore_config(&self) -> Result<bool> {
        let Some(config) = self.load::<UnlockConfig>(CONFIG_KEY).await? else {
            return Ok(false);
        };
        config.validate().map_err(UnlockError::invalid_config)?;
        self.swap_config(config)?;
        Ok(true)
    }

    /// Swap the config used by future comparisons; accumulated progress is
    /// not re-evaluated until the next delta arrives.
    pub async fn update_config(&self, config: UnlockConfig) -> Result<()> {
        config.validate().map_err(UnlockError::invalid_config)?;
        let _guard = self.key_locks.acquire(CONFIG_KEY).await;
        self.save(CONFIG_KEY, &config).await?;
        self.swap_config(config)
    }

    pub async fn state(&self, game_id: &str) -> Result<UnlockState> {
        self.require_game(game_id)?;
        self.load_state(&keys::state_key(self.scope, game_id)).await
    }

    pub async fn stats(&self, game_id: &str) -> Result<GameStats> {
        self.require_game(game_id)?;
        Ok(self
            .load::<GameStats>(&keys::stats_key(game_id))
            .await?
            .unwrap_or_default())
    }

    pub async fn total_lines_written(&self) -> Result<u64> {
        Ok(self.load::<u64>(TOTAL_LINES_KEY).await?.unwrap_or(0))
    }

    /// Status of every registered game, in registration order
    pub async fn game_statuses(&self) -> Result<Vec<GameStatus>> {
        let lines_required = self.config().lines_required_to_unlock;
        let mut statuses = Vec::new();
        for game in self.games() {
            let state = self.load_state(&keys::state_key(self.scope, &game.id)).await?;
            let stats = self
                .load::<GameStats>(&keys::stats_key(&game.id))
                .await?
                .unwrap_or_default();
            statuses.push(GameStatus {
                lines_remaining: state.lines_remaining(lines_required),
                game,
                state,
                stats,
                lines_required,
            });
        }
        Ok(statuses)
    }

    /// Account a detected change. Progress only accrues while locked.
    ///
    /// The total counter and every affected state are written together, so a
    /// failed write leaves nothing behind and the delta can be retried.
    pub async fn on_delta(&self, delta: &ChangeDelta) -> Result<()> {
        let config = self.config();
        let counted = delta.counted_change(config.meaningful_lines_only);
        if counted <= 0 {
            debug!("Ignoring non-positive change from {}", delta.unit_id);
            return Ok(());
        }
        let counted = counted as u64;

        let targets = self.progress_targets();
        let _guards = self
            .key_locks
            .acquire_all(
                targets
                    .iter()
                    .map(|(key, _)| key.clone())
                    .chain([TOTAL_LINES_KEY.to_string()]),
            )
            .await;

        let total = self.load::<u64>(TOTAL_LINES_KEY).await?.unwrap_or(0);
        let mut batch = WriteBatch::new();
        batch.put(TOTAL_LINES_KEY, encode(&total.saturating_add(counted))?);
        let mut events = vec![EngineEvent::CodeWritten {
            scope: EventScope::Global,
            delta: delta.clone(),
        }];

        for (key, scope) in targets {
            let state = self.load_state(&key).await?;
            let Some((next, progress_events)) = advance_progress(state, counted, &config, scope)
            else {
                debug!("{key} already unlocked; not accruing progress");
                continue;
            };
            batch.put(key, encode(&next)?);
            events.extend(progress_events);
        }

        self.store.apply(batch).await?;
        for event in &events {
            self.events.emit(event);
        }
        Ok(())
    }

    /// Check whether a session may start. Credits are charged in [`end_play`](Self::end_play).
    pub async fn attempt_play(&self, game_id: &str) -> Result<UnlockState> {
        let game = self.require_game(game_id)?;
        let key = keys::state_key(self.scope, game_id);
        let _guard = self.key_locks.acquire(&key).await;

        let state = self.load_state(&key).await?;
        match state {
            UnlockState::Locked { .. } => {
                let lines_remaining = state.lines_remaining(self.config().lines_required_to_unlock);
                debug!("{game_id} is locked ({lines_remaining} lines remaining)");
                Err(UnlockError::Locked {
                    game_id: game.id,
                    game_name: game.display_name,
                    lines_remaining,
                })
            }
            UnlockState::Unlocked { plays_remaining: 0 } => {
                debug!("{game_id} has no credits left");
                Err(UnlockError::NoCreditsRemaining {
                    game_id: game.id,
                    game_name: game.display_name,
                    lines_remaining: self.config().lines_required_to_unlock,
                })
            }
            UnlockState::Unlocked { .. } => {
                self.events.emit(&EngineEvent::PlayStarted {
                    scope: EventScope::Game(game.id),
                    state,
                });
                Ok(state)
            }
        }
    }

    /// Finish a session: charge one credit, lock on the last one, record stats.
    pub async fn end_play(&self, game_id: &str, score: Option<u64>) -> Result<PlayOutcome> {
        self.require_game(game_id)?;
        let state_key = keys::state_key(self.scope, game_id);
        let stats_key = keys::stats_key(game_id);
        let _guards = self
            .key_locks
            .acquire_all([state_key.clone(), stats_key.clone()])
            .await;

        let state = self.load_state(&state_key).await?;
        let (next, locked) = match state {
            UnlockState::Unlocked { plays_remaining } => match plays_remaining.saturating_sub(1) {
                0 => (UnlockState::locked(), true),
                left => (
                    UnlockState::Unlocked {
                        plays_remaining: left,
                    },
                    false,
                ),
            },
            UnlockState::Locked { .. } => (state, false),
        };

        let mut stats = self
            .load::<GameStats>(&stats_key)
            .await?
            .unwrap_or_default();
        stats.record_play(score, current_unix_ms());

        self.store
            .set_many(vec![
                (state_key, encode(&next)?),
                (stats_key, encode(&stats)?),
            ])
            .await?;

        if locked {
            info!("{game_id}: last play used, locking");
            self.events.emit(&EngineEvent::Locked {
                scope: self.state_scope(game_id),
                state: next,
            });
        }
        self.events.emit(&EngineEvent::PlayEnded {
            scope: EventScope::Game(game_id.to_string()),
            score,
        });

        Ok(PlayOutcome {
            state: next,
            stats,
            locked,
        })
    }

    pub async fn force_unlock(&self, game_id: &str) -> Result<UnlockState> {
        self.require_game(game_id)?;
        let state = UnlockState::Unlocked {
            plays_remaining: self.config().play_credits_granted_per_unlock,
        };
        self.overwrite_state(game_id, state).await?;
        Ok(state)
    }

    pub async fn force_lock(&self, game_id: &str) -> Result<UnlockState> {
        self.require_game(game_id)?;
        let state = UnlockState::locked();
        self.overwrite_state(game_id, state).await?;
        Ok(state)
    }

    /// Back to fresh-registration defaults, including the game's statistics.
    pub async fn reset_state(&self, game_id: &str) -> Result<UnlockState> {
        self.require_game(game_id)?;
        let state = UnlockState::initial(&self.config());
        let state_key = keys::state_key(self.scope, game_id);
        let stats_key = keys::stats_key(game_id);
        let _guards = self
            .key_locks
            .acquire_all([state_key.clone(), stats_key.clone()])
            .await;

        let mut batch = WriteBatch::new();
        batch.remove(stats_key);
        batch.put(state_key, encode(&state)?);
        self.store.apply(batch).await?;

        self.emit_transition(self.state_scope(game_id), state);
        Ok(state)
    }

    /// Clear every stored state, statistic and counter, then re-seed registered games.
    pub async fn reset_all_state(&self) -> Result<()> {
        let cleared: Vec<String> = self
            .store
            .list_keys(NAMESPACE)
            .await?
            .into_iter()
            .filter(|key| key != CONFIG_KEY)
            .collect();

        let mut seeded: Vec<(String, EventScope)> = Vec::new();
        for game in self.games() {
            let key = keys::state_key(self.scope, &game.id);
            if !seeded.iter().any(|(existing, _)| *existing == key) {
                seeded.push((key, self.state_scope(&game.id)));
            }
        }

        let _guards = self
            .key_locks
            .acquire_all(
                cleared
                    .iter()
                    .cloned()
                    .chain(seeded.iter().map(|(key, _)| key.clone())),
            )
            .await;

        let initial = UnlockState::initial(&self.config());
        let encoded = encode(&initial)?;
        let mut batch = WriteBatch::new();
        for key in &cleared {
            batch.remove(key.clone());
        }
        for (key, _) in &seeded {
            batch.put(key.clone(), encoded.clone());
        }
        self.store.apply(batch).await?;
        info!("Cleared {} stored keys", cleared.len());

        for (_, scope) in seeded {
            self.emit_transition(scope, initial);
        }
        Ok(())
    }

    /// Flat object of every namespaced key and its stored value
    pub async fn export_state_json(&self) -> Result<String> {
        let mut out = Map::new();
        for key in self.store.list_keys(NAMESPACE).await? {
            if let Some(value) = self.store.get(&key).await? {
                out.insert(key, value);
            }
        }
        serde_json::to_string_pretty(&Value::Object(out))
            .map_err(|e| UnlockError::persistence(format!("encode export: {e}")))
    }

    /// Write every entry of an exported object, or nothing at all.
    ///
    /// Returns the number of keys written.
    pub async fn import_state_json(&self, raw: &str) -> Result<usize> {
        let entries = parse_import(raw)?;
        let count = entries.len();
        {
            let _guards = self
                .key_locks
                .acquire_all(entries.iter().map(|(key, _)| key.clone()))
                .await;
            self.store.set_many(entries).await?;
        }
        info!("Imported {count} keys");

        if let Err(err) = self.restore_config().await {
            warn!("Imported config was not applied: {err}");
        }
        Ok(count)
    }

    async fn overwrite_state(&self, game_id: &str, state: UnlockState) -> Result<()> {
        let key = keys::state_key(self.scope, game_id);
        let _guard = self.key_locks.acquire(&key).await;
        self.save(&key, &state).await?;
        self.emit_transition(self.state_scope(game_id), state);
        Ok(())
    }

    fn emit_transition(&self, scope: EventScope, state: UnlockState) {
        let event = if state.is_unlocked() {
            EngineEvent::Unlocked { scope, state }
        } else {
            EngineEvent::Locked { scope, state }
        };
        self.events.emit(&event);
    }

    fn progress_targets(&self) -> Vec<(String, EventScope)> {
        match self.scope {
            StateScope::Global => {
                if self.games().is_empty() {
                    Vec::new()
                } else {
                    vec![(keys::GLOBAL_STATE_KEY.to_string(), EventScope::Global)]
                }
            }
            StateScope::PerGame => self
                .games()
                .into_iter()
                .map(|game| {
                    (
                        keys::state_key(StateScope::PerGame, &game.id),
                        EventScope::Game(game.id),
                    )
                })
                .collect(),
        }
    }

    fn state_scope(&self, game_id: &str) -> EventScope {
        match self.scope {
            StateScope::PerGame => EventScope::Game(game_id.to_string()),
            StateScope::Global => EventScope::Global,
        }
    }

    fn require_game(&self, game_id: &str) -> Result<PlayableUnit> {
        self.game(game_id).ok_or_else(|| UnlockError::NotFound {
            game_id: game_id.to_string(),
        })
    }

    fn swap_config(&self, config: UnlockConfig) -> Result<()> {
        let mut guard = self
            .config
            .write()
            .map_err(|_| UnlockError::persistence("config lock poisoned"))?;
        *guard = config;
        Ok(())
    }

    /// Missing state (e.g. after a partial import) reads as registration defaults.
    async fn load_state(&self, key: &str) -> Result<UnlockState> {
        Ok(self
            .load::<UnlockState>(key)
            .await?
            .unwrap_or_else(|| UnlockState::initial(&self.config())))
    }

    async fn load<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        let Some(value) = self.store.get(key).await? else {
            return Ok(None);
        };
        serde_json::from_value(value)
            .map(Some)
            .map_err(|e| UnlockError::persistence(format!("corrupt value at {key}: {e}")))
    }

    async fn save<T: Serialize>(&self, key: &str, value: &T) -> Result<()> {
        self.store.set(key, encode(value)?).await
    }
}

/// Next state and events for a locked state gaining `counted` lines.
///
/// `None` when the state is unlocked, since progress does not accrue then.
fn advance_progress(
    state: UnlockState,
    counted: u64,
    config: &UnlockConfig,
    scope: EventScope,
) -> Option<(UnlockState, Vec<EngineEvent>)> {
    let UnlockState::Locked { progress_lines } = state else {
        return None;
    };
    let required = config.lines_required_to_unlock;
    let written = progress_lines.saturating_add(counted);

    if written >= required {
        let next = UnlockState::Unlocked {
            plays_remaining: config.play_credits_granted_per_unlock,
        };
        info!("{scope:?} unlocked after {written} lines");
        return Some((next, vec![EngineEvent::Unlocked { scope, state: next }]));
    }

    let next = UnlockState::Locked {
        progress_lines: written,
    };
    let previous_ratio = progress_lines as f64 / required as f64;
    let ratio = written as f64 / required as f64;
    let mut events = vec![EngineEvent::ProgressUpdated {
        scope: scope.clone(),
        lines_written: written,
        lines_required: required,
        ratio,
    }];
    if crosses_milestone(previous_ratio, ratio) {
        events.push(EngineEvent::MilestoneReached {
            scope,
            lines_written: written,
            lines_required: required,
            lines_remaining: required - written,
        });
    }
    Some((next, events))
}

fn crosses_milestone(previous_ratio: f64, ratio: f64) -> bool {
    previous_ratio < MILESTONE_RATIO
        && ratio >= MILESTONE_RATIO
        && ratio < MILESTONE_RATIO + MILESTONE_WINDOW
}

fn encode<T: Serialize>(value: &T) -> Result<Value> {
    serde_json::to_value(value).map_err(|e| UnlockError::persistence(format!("encode: {e}")))
}

fn parse_import(raw: &str) -> Result<Vec<(String, Value)>> {
    let value: Value =
        serde_json::from_str(raw).map_err(|e| UnlockError::malformed_import(e.to_string()))?;
    let Value::Object(map) = value else {
        return Err(UnlockError::malformed_import(
            "expected a flat JSON object of key/value pairs",
        ));
    };
    if let Some(foreign) = map.keys().find(|key| !keys::is_namespaced(key)) {
        return Err(UnlockError::malformed_import(format!(
            "key {foreign:?} is outside the {NAMESPACE} namespace"
        )));
    }
    Ok(map.into_iter().collect())
}

fn current_unix_ms() -> u64 {
    SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .ok()
        .and_then(|dur| u64::try_from(dur.as_millis()).ok())
        .unwrap_or(0)
}

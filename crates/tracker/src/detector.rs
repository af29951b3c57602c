use crate::{ChangeDelta, DetectorConfig, Result, TrackerError};
use log::{debug, warn};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock, Weak};
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time;

/// Receiving end of the detector's delta stream
pub type DeltaReceiver = mpsc::UnboundedReceiver<ChangeDelta>;

/// Turns editor snapshots into [`ChangeDelta`]s.
///
/// Interim edits (`notify_changed`) are coalesced per unit: each one resets
/// that unit's debounce timer and replaces its pending snapshot, so a burst
/// of edits produces at most one comparison against the cached text. Saves
/// (`notify_saved`) cancel the unit's timer and compare immediately.
#[derive(Clone)]
pub struct ChangeDetector {
    inner: Arc<DetectorInner>,
}

struct DetectorInner {
    config: RwLock<DetectorConfig>,
    units: Mutex<HashMap<String, TrackedUnit>>,
    delta_tx: mpsc::UnboundedSender<ChangeDelta>,
    runtime: Handle,
    next_generation: AtomicU64,
}

struct TrackedUnit {
    text: String,
    pending: Option<PendingCheck>,
}

struct PendingCheck {
    generation: u64,
    language_tag: String,
    text: String,
    handle: JoinHandle<()>,
}

impl PendingCheck {
    fn cancel(self) {
        self.handle.abort();
    }
}

impl ChangeDetector {
    /// Create a detector bound to the current Tokio runtime.
    pub fn start(config: DetectorConfig) -> Result<(Self, DeltaReceiver)> {
        config
            .validate()
            .map_err(|e| TrackerError::Other(format!("invalid detector config: {e}")))?;
        let runtime = Handle::try_current().map_err(|e| TrackerError::Runtime(e.to_string()))?;
        let (delta_tx, delta_rx) = mpsc::unbounded_channel();

        let detector = Self {
            inner: Arc::new(DetectorInner {
                config: RwLock::new(config),
                units: Mutex::new(HashMap::new()),
                delta_tx,
                runtime,
                next_generation: AtomicU64::new(1),
            }),
        };
        Ok((detector, delta_rx))
    }

    /// Interim edit: debounced.
    pub fn notify_changed(&self, unit_id: &str, language_tag: &str, full_text: &str) {
        if let Err(err) = self.handle_changed(unit_id, language_tag, full_text) {
            warn!("Dropping interim snapshot: {err}");
        }
    }

    /// Explicit save: compares immediately, superseding any pending interim snapshot.
    pub fn notify_saved(&self, unit_id: &str, language_tag: &str, full_text: &str) {
        if let Err(err) = self.handle_saved(unit_id, language_tag, full_text) {
            warn!("Dropping saved snapshot: {err}");
        }
    }

    /// Save signal for hosts that only have raw file bytes.
    pub fn notify_saved_bytes(&self, unit_id: &str, language_tag: &str, bytes: &[u8]) {
        match std::str::from_utf8(bytes) {
            Ok(text) => self.notify_saved(unit_id, language_tag, text),
            Err(err) => warn!("Dropping saved snapshot: {unit_id} is not valid UTF-8: {err}"),
        }
    }

    /// Stop tracking a unit (document closed). Any pending comparison is cancelled.
    pub fn forget(&self, unit_id: &str) {
        let Ok(mut units) = self.inner.units.lock() else {
            warn!("detector unit table lock poisoned");
            return;
        };
        if let Some(mut unit) = units.remove(unit_id) {
            if let Some(pending) = unit.pending.take() {
                pending.cancel();
            }
            debug!("Stopped tracking {unit_id}");
        }
    }

    /// Swap the configuration used for future snapshots
    pub fn update_config(&self, config: DetectorConfig) -> Result<()> {
        config
            .validate()
            .map_err(|e| TrackerError::Other(format!("invalid detector config: {e}")))?;
        let mut guard = self
            .inner
            .config
            .write()
            .map_err(|_| TrackerError::Other("detector config lock poisoned".to_string()))?;
        *guard = config;
        Ok(())
    }

    #[must_use]
    pub fn config(&self) -> DetectorConfig {
        self.inner.config_snapshot()
    }

    #[must_use]
    pub fn tracked_units(&self) -> usize {
        self.inner.units.lock().map(|units| units.len()).unwrap_or(0)
    }

    #[must_use]
    pub fn pending_checks(&self) -> usize {
        self.inner
            .units
            .lock()
            .map(|units| units.values().filter(|u| u.pending.is_some()).count())
            .unwrap_or(0)
    }

    fn handle_changed(&self, unit_id: &str, language_tag: &str, full_text: &str) -> Result<()> {
        let config = self.inner.config_snapshot();
        if !config.scope.accepts(unit_id) {
            return Ok(());
        }
        validate_snapshot(unit_id, full_text)?;

        let mut units = self.inner.lock_units()?;
        let Some(unit) = units.get_mut(unit_id) else {
            units.insert(unit_id.to_string(), TrackedUnit::seed(full_text));
            debug!("Seeded {unit_id} ({language_tag})");
            return Ok(());
        };

        if let Some(previous) = unit.pending.take() {
            previous.cancel();
        }

        let generation = self.inner.next_generation.fetch_add(1, Ordering::Relaxed);
        let handle = spawn_debounce(
            &self.inner.runtime,
            Arc::downgrade(&self.inner),
            unit_id.to_string(),
            generation,
            config.debounce(),
        );
        unit.pending = Some(PendingCheck {
            generation,
            language_tag: language_tag.to_string(),
            text: full_text.to_string(),
            handle,
        });
        Ok(())
    }

    fn handle_saved(&self, unit_id: &str, language_tag: &str, full_text: &str) -> Result<()> {
        let config = self.inner.config_snapshot();
        if !config.scope.accepts(unit_id) {
            return Ok(());
        }
        validate_snapshot(unit_id, full_text)?;

        let mut units = self.inner.lock_units()?;
        let Some(unit) = units.get_mut(unit_id) else {
            units.insert(unit_id.to_string(), TrackedUnit::seed(full_text));
            debug!("Seeded {unit_id} ({language_tag}) on save");
            return Ok(());
        };

        if let Some(pending) = unit.pending.take() {
            pending.cancel();
        }
        self.inner.compare_and_emit(
            unit_id,
            unit,
            language_tag,
            full_text.to_string(),
            config.meaningful_lines_only,
        );
        Ok(())
    }
}

impl DetectorInner {
    fn config_snapshot(&self) -> DetectorConfig {
        match self.config.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    fn lock_units(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, TrackedUnit>>> {
        self.units
            .lock()
            .map_err(|_| TrackerError::Other("detector unit table lock poisoned".to_string()))
    }

    fn fire_pending(&self, unit_id: &str, generation: u64) {
        let meaningful_lines_only = self.config_snapshot().meaningful_lines_only;
        let Ok(mut units) = self.lock_units() else {
            warn!("detector unit table lock poisoned");
            return;
        };
        let Some(unit) = units.get_mut(unit_id) else {
            return;
        };
        // A newer snapshot or a save may have replaced this check after the timer woke.
        let is_current = unit
            .pending
            .as_ref()
            .is_some_and(|pending| pending.generation == generation);
        if !is_current {
            return;
        }
        let Some(pending) = unit.pending.take() else {
            return;
        };
        self.compare_and_emit(
            unit_id,
            unit,
            &pending.language_tag,
            pending.text,
            meaningful_lines_only,
        );
    }

    fn compare_and_emit(
        &self,
        unit_id: &str,
        unit: &mut TrackedUnit,
        language_tag: &str,
        new_text: String,
        meaningful_lines_only: bool,
    ) {
        let delta = ChangeDelta::between(unit_id, language_tag, &unit.text, &new_text);
        unit.text = new_text;

        if !delta.should_emit(meaningful_lines_only) {
            debug!(
                "No countable change in {unit_id} (raw {:+}, meaningful {:+})",
                delta.net_raw_change, delta.net_meaningful_change
            );
            return;
        }

        debug!(
            "Detected {:+} meaningful lines in {unit_id}",
            delta.net_meaningful_change
        );
        if self.delta_tx.send(delta).is_err() {
            debug!("Delta receiver dropped; discarding change for {unit_id}");
        }
    }
}

impl TrackedUnit {
    fn seed(text: &str) -> Self {
        Self {
            text: text.to_string(),
            pending: None,
        }
    }
}

fn spawn_debounce(
    runtime: &Handle,
    inner: Weak<DetectorInner>,
    unit_id: String,
    generation: u64,
    debounce: time::Duration,
) -> JoinHandle<()> {
    runtime.spawn(async move {
        time::sleep(debounce).await;
        if let Some(inner) = inner.upgrade() {
            inner.fire_pending(&unit_id, generation);
        }
    })
}

fn validate_snapshot(unit_id: &str, text: &str) -> Result<()> {
    if unit_id.trim().is_empty() {
        return Err(TrackerError::invalid_snapshot("<empty>", "empty unit id"));
    }
    if text.contains('\0') {
        return Err(TrackerError::invalid_snapshot(unit_id, "binary content"));
    }
    Ok(())
}

use crate::UnlockState;
use codeplay_tracker::ChangeDelta;
use log::warn;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

/// Which state an event refers to
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EventScope {
    Game(String),
    /// Shared state under the global policy, or engine-wide facts
    Global,
}

/// Notifications for presentation observers
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum EngineEvent {
    Unlocked {
        scope: EventScope,
        state: UnlockState,
    },
    Locked {
        scope: EventScope,
        state: UnlockState,
    },
    PlayStarted {
        scope: EventScope,
        state: UnlockState,
    },
    PlayEnded {
        scope: EventScope,
        score: Option<u64>,
    },
    ProgressUpdated {
        scope: EventScope,
        lines_written: u64,
        lines_required: u64,
        ratio: f64,
    },
    /// Progress just landed in the 75% band
    MilestoneReached {
        scope: EventScope,
        lines_written: u64,
        lines_required: u64,
        lines_remaining: u64,
    },
    CodeWritten {
        scope: EventScope,
        delta: ChangeDelta,
    },
}

impl EngineEvent {
    pub fn scope(&self) -> &EventScope {
        match self {
            EngineEvent::Unlocked { scope, .. }
            | EngineEvent::Locked { scope, .. }
            | EngineEvent::PlayStarted { scope, .. }
            | EngineEvent::PlayEnded { scope, .. }
            | EngineEvent::ProgressUpdated { scope, .. }
            | EngineEvent::MilestoneReached { scope, .. }
            | EngineEvent::CodeWritten { scope, .. } => scope,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            EngineEvent::Unlocked { .. } => "unlocked",
            EngineEvent::Locked { .. } => "locked",
            EngineEvent::PlayStarted { .. } => "play_started",
            EngineEvent::PlayEnded { .. } => "play_ended",
            EngineEvent::ProgressUpdated { .. } => "progress_updated",
            EngineEvent::MilestoneReached { .. } => "milestone_reached",
            EngineEvent::CodeWritten { .. } => "code_written",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type Listener = Arc<dyn Fn(&EngineEvent) + Send + Sync>;

/// Synchronous publish/subscribe channel.
///
/// Listeners run on the emitting task, in registration order.
#[derive(Default)]
pub struct EventBus {
    listeners: Mutex<Vec<(SubscriptionId, Listener)>>,
    next_id: AtomicU64,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe<F>(&self, listener: F) -> SubscriptionId
    where
        F: Fn(&EngineEvent) + Send + Sync + 'static,
    {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        match self.listeners.lock() {
            Ok(mut guard) => guard.push((id, Arc::new(listener))),
            Err(_) => warn!("event bus lock poisoned; listener not registered"),
        }
        id
    }

    /// Returns false when the id was not registered
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let Ok(mut guard) = self.listeners.lock() else {
            return false;
        };
        let before = guard.len();
        guard.retain(|(existing, _)| *existing != id);
        guard.len() != before
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.lock().map(|guard| guard.len()).unwrap_or(0)
    }

    pub fn emit(&self, event: &EngineEvent) {
        // Snapshot so listeners may (un)subscribe while being notified.
        let listeners: Vec<Listener> = match self.listeners.lock() {
            Ok(guard) => guard.iter().map(|(_, l)| Arc::clone(l)).collect(),
            Err(_) => {
                warn!("event bus lock poisoned; dropping {} event", event.name());
                return;
            }
        };
        for listener in listeners {
            listener(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn ended() -> EngineEvent {
        EngineEvent::PlayEnded {
            scope: EventScope::Game("snake".into()),
            score: Some(3),
        }
    }

    #[test]
    fn listeners_run_in_registration_order() {
        let bus = EventBus::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        for tag in ["first", "second", "third"] {
            let seen = seen.clone();
            bus.subscribe(move |_| seen.lock().expect("lock").push(tag));
        }
        bus.emit(&ended());
        assert_eq!(*seen.lock().expect("lock"), vec!["first", "second", "third"]);
    }

    #[test]
    fn unsubscribe_removes_only_that_listener() {
        let bus = EventBus::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let a = {
            let seen = seen.clone();
            bus.subscribe(move |e| seen.lock().expect("lock").push(format!("a:{}", e.name())))
        };
        {
            let seen = seen.clone();
            bus.subscribe(move |e| seen.lock().expect("lock").push(format!("b:{}", e.name())));
        }
        assert!(bus.unsubscribe(a));
        assert!(!bus.unsubscribe(a));
        bus.emit(&ended());
        assert_eq!(*seen.lock().expect("lock"), vec!["b:play_ended".to_string()]);
        assert_eq!(bus.listener_count(), 1);
    }

    #[test]
    fn events_serialize_with_scope() {
        let json = serde_json::to_value(EngineEvent::Locked {
            scope: EventScope::Global,
            state: UnlockState::locked(),
        })
        .expect("json");
        assert_eq!(
            json,
            serde_json::json!({
                "event": "locked",
                "scope": "global",
                "state": {"status": "locked", "progress_lines": 0}
            })
        );
    }
}

//! Store key layout.
//!
//! Every key lives under [`NAMESPACE`] so prefix enumeration can export or
//! clear the engine's data without touching unrelated entries.

use crate::StateScope;

pub const NAMESPACE: &str = "codeplay.";

pub const CONFIG_KEY: &str = "codeplay.config";
pub const TOTAL_LINES_KEY: &str = "codeplay.total_lines";
pub const GLOBAL_STATE_KEY: &str = "codeplay.global_state";

const STATE_PREFIX: &str = "codeplay.state.";
const STATS_PREFIX: &str = "codeplay.stats.";

pub fn state_key(scope: StateScope, game_id: &str) -> String {
    match scope {
        StateScope::PerGame => format!("{STATE_PREFIX}{game_id}"),
        StateScope::Global => GLOBAL_STATE_KEY.to_string(),
    }
}

pub fn stats_key(game_id: &str) -> String {
    format!("{STATS_PREFIX}{game_id}")
}

pub fn is_namespaced(key: &str) -> bool {
    key.len() > NAMESPACE.len() && key.starts_with(NAMESPACE)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_are_namespaced() {
        assert_eq!(state_key(StateScope::PerGame, "snake"), "codeplay.state.snake");
        assert_eq!(state_key(StateScope::Global, "snake"), GLOBAL_STATE_KEY);
        assert_eq!(stats_key("snake"), "codeplay.stats.snake");
        for key in [CONFIG_KEY, TOTAL_LINES_KEY, GLOBAL_STATE_KEY] {
            assert!(is_namespaced(key));
        }
        assert!(!is_namespaced("codeplay."));
        assert!(!is_namespaced("other.state"));
    }
}

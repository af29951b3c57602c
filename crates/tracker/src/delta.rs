use codeplay_lines::{count_meaningful_lines, split_lines};
use serde::{Deserialize, Serialize};
use std::time::SystemTime;

/// Line-count difference between two snapshots of one tracked unit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeDelta {
    pub unit_id: String,
    pub language_tag: String,
    pub lines_added: u64,
    pub lines_deleted: u64,
    pub net_raw_change: i64,
    pub net_meaningful_change: i64,
    /// `net_meaningful_change > 0`
    pub is_meaningful: bool,
    pub timestamp_unix_ms: u64,
}

impl ChangeDelta {
    /// Compare two full-text snapshots.
    pub fn between(unit_id: &str, language_tag: &str, old_text: &str, new_text: &str) -> Self {
        let old_lines = line_count(old_text);
        let new_lines = line_count(new_text);
        let old_meaningful = count_meaningful_lines(old_text, language_tag) as i64;
        let new_meaningful = count_meaningful_lines(new_text, language_tag) as i64;

        let net_raw_change = new_lines - old_lines;
        let net_meaningful_change = new_meaningful - old_meaningful;

        Self {
            unit_id: unit_id.to_string(),
            language_tag: language_tag.to_string(),
            lines_added: net_raw_change.max(0) as u64,
            lines_deleted: (-net_raw_change).max(0) as u64,
            net_raw_change,
            net_meaningful_change,
            is_meaningful: net_meaningful_change > 0,
            timestamp_unix_ms: current_unix_ms(),
        }
    }

    /// The change that counts toward unlock progress under the given policy
    pub const fn counted_change(&self, meaningful_lines_only: bool) -> i64 {
        if meaningful_lines_only {
            self.net_meaningful_change
        } else {
            self.net_raw_change
        }
    }

    /// Deletions and no-ops are never forwarded to the unlock engine.
    pub const fn should_emit(&self, meaningful_lines_only: bool) -> bool {
        self.is_meaningful && self.counted_change(meaningful_lines_only) > 0
    }
}

fn line_count(text: &str) -> i64 {
    split_lines(text).count() as i64
}

pub(crate) fn current_unix_ms() -> u64 {
    SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .ok()
        .and_then(|dur| u64::try_from(dur.as_millis()).ok())
        .unwrap_or(0)
}

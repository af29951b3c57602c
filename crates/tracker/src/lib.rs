//! # Codeplay Tracker
//!
//! Debounced line-change detection for editor documents.
//!
//! ## Pipeline
//!
//! ```text
//! Editor snapshot (unit id, language tag, full text)
//!     │
//!     ├──> Tracking scope (untitled / vendored / extension allow-list)
//!     │
//!     ├──> Per-unit debounce table (interim edits) ─┐
//!     │                                             │
//!     ├──> Immediate path (save) ───────────────────┤
//!     │                                             ▼
//!     └──> Compare cached text vs new text ──> ChangeDelta (positive changes only)
//! ```
//!
//! ## Example
//!
//! ```no_run
//! use codeplay_tracker::{ChangeDetector, DetectorConfig};
//!
//! #[tokio::main]
//! async fn main() -> codeplay_tracker::Result<()> {
//!     let (detector, mut deltas) = ChangeDetector::start(DetectorConfig::default())?;
//!     detector.notify_saved("/repo/src/lib.rs", "rust", "fn a() {}");
//!     detector.notify_saved("/repo/src/lib.rs", "rust", "fn a() {}\nfn b() {}");
//!
//!     if let Some(delta) = deltas.recv().await {
//!         println!("+{} meaningful lines", delta.net_meaningful_change);
//!     }
//!     Ok(())
//! }
//! ```

mod config;
mod delta;
mod detector;
mod error;
mod scope;

pub use config::DetectorConfig;
pub use delta::ChangeDelta;
pub use detector::{ChangeDetector, DeltaReceiver};
pub use error::{Result, TrackerError};
pub use scope::{extension_of, is_untitled, TrackingScope};

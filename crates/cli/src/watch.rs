use crate::app::App;
use crate::report::print_stdout;
use anyhow::{Context as AnyhowContext, Result};
use codeplay_lines::LanguageFamily;
use codeplay_tracker::{extension_of, ChangeDetector, DetectorConfig, TrackingScope};
use codeplay_unlock::UnlockError;
use ignore::WalkBuilder;
use log::{debug, info, warn};
use notify::{Config as NotifyConfig, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use tokio::sync::mpsc;

// Larger files are almost always generated or data; they are not tracked.
const MAX_FILE_BYTES: u64 = 2 * 1024 * 1024;

pub struct WatchOptions {
    pub root: PathBuf,
    pub extensions: Vec<String>,
    pub debounce_ms: Option<u64>,
}

/// Watch a directory tree, feeding file saves through the change detector
/// into the unlock engine. Engine events are printed as JSON lines.
pub async fn run(app: &App, options: WatchOptions) -> Result<()> {
    let root = options
        .root
        .canonicalize()
        .with_context(|| format!("Invalid watch path {}", options.root.display()))?;

    let detector_config = watch_detector_config(app.config.detector_config(), &options);
    let scope = detector_config.scope.clone();
    let (detector, mut deltas) =
        ChangeDetector::start(detector_config).context("Failed to start change detector")?;

    let seeded = seed_snapshots(&detector, &root, &scope);
    info!("Watching {} ({seeded} files tracked)", root.display());

    let subscription = app.engine.events().subscribe(|event| {
        match serde_json::to_string(event) {
            Ok(line) => {
                if let Err(err) = print_stdout(&line) {
                    warn!("Failed to print {} event: {err}", event.name());
                }
            }
            Err(err) => warn!("Failed to encode {} event: {err}", event.name()),
        }
    });

    let (event_tx, mut event_rx) = mpsc::channel(1024);
    let mut watcher = RecommendedWatcher::new(
        move |res| {
            let _ = event_tx.blocking_send(res);
        },
        NotifyConfig::default(),
    )
    .context("watcher init failed")?;
    watcher
        .watch(&root, RecursiveMode::Recursive)
        .with_context(|| format!("Failed to watch {}", root.display()))?;

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    let outcome = loop {
        tokio::select! {
            Some(event) = event_rx.recv() => handle_fs_event(&detector, &scope, event).await,
            Some(delta) = deltas.recv() => {
                debug!(
                    "{}: +{} meaningful lines",
                    delta.unit_id, delta.net_meaningful_change
                );
                match app.engine.on_delta(&delta).await {
                    Ok(()) => {}
                    // The store may come back; keep watching.
                    Err(err @ UnlockError::PersistenceFailure(_)) => warn!("{err}"),
                    Err(err) => break Err(err.into()),
                }
            }
            _ = &mut shutdown => {
                info!("Stopping watch");
                break Ok(());
            }
        }
    };

    app.engine.events().unsubscribe(subscription);
    drop(watcher);
    outcome
}

fn watch_detector_config(mut config: DetectorConfig, options: &WatchOptions) -> DetectorConfig {
    if !options.extensions.is_empty() {
        config.scope = TrackingScope::extensions(options.extensions.iter().cloned());
    }
    if let Some(debounce_ms) = options.debounce_ms {
        config.debounce_ms = debounce_ms;
    }
    config
}

/// Record the current contents of every tracked file so the first save
/// compares against what was on disk when watching started.
fn seed_snapshots(detector: &ChangeDetector, root: &Path, scope: &TrackingScope) -> usize {
    let mut seeded = 0usize;
    for entry in WalkBuilder::new(root).build() {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => {
                debug!("Skipping unreadable entry: {err}");
                continue;
            }
        };
        if !entry.file_type().is_some_and(|kind| kind.is_file()) {
            continue;
        }
        let path = entry.path();
        let unit_id = unit_id(path);
        if !scope.accepts(&unit_id) || too_large(path) {
            continue;
        }
        match std::fs::read(path) {
            Ok(bytes) => {
                let tag = language_tag(&unit_id);
                debug!(
                    "Seeding {unit_id} ({} comments)",
                    LanguageFamily::from_tag(&tag).as_str()
                );
                detector.notify_saved_bytes(&unit_id, &tag, &bytes);
                seeded += 1;
            }
            Err(err) => debug!("Skipping {}: {err}", path.display()),
        }
    }
    seeded
}

async fn handle_fs_event(
    detector: &ChangeDetector,
    scope: &TrackingScope,
    event: notify::Result<Event>,
) {
    let event = match event {
        Ok(event) => event,
        Err(err) => {
            warn!("Watcher error: {err}");
            return;
        }
    };
    match event.kind {
        EventKind::Create(_) | EventKind::Modify(_) => {
            for path in &event.paths {
                observe_file(detector, scope, path).await;
            }
        }
        EventKind::Remove(_) => {
            for path in &event.paths {
                detector.forget(&unit_id(path));
            }
        }
        _ => {}
    }
}

async fn observe_file(detector: &ChangeDetector, scope: &TrackingScope, path: &Path) {
    let unit_id = unit_id(path);
    if !scope.accepts(&unit_id) || !path.is_file() || too_large(path) {
        return;
    }
    match tokio::fs::read(path).await {
        Ok(bytes) => detector.notify_saved_bytes(&unit_id, &language_tag(&unit_id), &bytes),
        Err(err) => debug!("Skipping {}: {err}", path.display()),
    }
}

fn unit_id(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

fn too_large(path: &Path) -> bool {
    std::fs::metadata(path)
        .map(|meta| meta.len() > MAX_FILE_BYTES)
        .unwrap_or(false)
}

/// Editor language id for a file, falling back to the bare extension
pub fn language_tag(unit_id: &str) -> String {
    let ext = extension_of(unit_id).unwrap_or_default();
    LanguageFamily::tag_for_extension(ext)
        .map(str::to_string)
        .unwrap_or_else(|| ext.to_ascii_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn language_tag_prefers_known_ids() {
        assert_eq!(language_tag("/repo/src/main.rs"), "rust");
        assert_eq!(language_tag("/repo/app/models.py"), "python");
        assert_eq!(language_tag("/repo/notes.weird"), "weird");
        assert_eq!(language_tag("/repo/Makefile"), "");
    }

    #[test]
    fn watch_flags_override_config() {
        let options = WatchOptions {
            root: PathBuf::from("."),
            extensions: vec!["rs".into(), "py".into()],
            debounce_ms: Some(50),
        };
        let config = watch_detector_config(DetectorConfig::default(), &options);
        assert_eq!(config.scope, TrackingScope::extensions(["rs", "py"]));
        assert_eq!(config.debounce_ms, 50);
        assert!(config.meaningful_lines_only);

        let untouched = watch_detector_config(
            DetectorConfig::default(),
            &WatchOptions {
                root: PathBuf::from("."),
                extensions: Vec::new(),
                debounce_ms: None,
            },
        );
        assert_eq!(untouched, DetectorConfig::default());
    }

    #[tokio::test]
    async fn seeding_respects_scope() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::write(dir.path().join("lib.rs"), "fn main() {}\n").expect("write");
        std::fs::write(dir.path().join("notes.txt"), "hello\n").expect("write");

        let (detector, _deltas) =
            ChangeDetector::start(DetectorConfig::default()).expect("detector");
        let seeded = seed_snapshots(
            &detector,
            dir.path(),
            &TrackingScope::extensions(["rs"]),
        );
        assert_eq!(seeded, 1);
        assert_eq!(detector.tracked_units(), 1);
    }
}

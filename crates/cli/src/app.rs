use anyhow::{Context as AnyhowContext, Result};
use codeplay_unlock::{builtin_games, CodeplayConfig, JsonFileStore, UnlockEngine};
use log::{debug, info};
use std::path::{Path, PathBuf};
use std::sync::Arc;

const CONFIG_FILE_NAME: &str = "codeplay.toml";

/// Where state and configuration come from for this process
#[derive(Debug, Clone)]
pub struct Settings {
    pub store_path: PathBuf,
    /// Explicit or discovered config file; `None` means defaults plus whatever
    /// config the store persisted last time
    pub config_path: Option<PathBuf>,
}

impl Settings {
    pub fn resolve(store: Option<PathBuf>, config: Option<PathBuf>) -> Result<Self> {
        let store_path = match store {
            Some(path) => path,
            None => JsonFileStore::default_path()
                .context("No data directory on this platform; pass --store <path>")?,
        };
        let config_path = config.or_else(|| default_config_path().filter(|path| path.is_file()));
        Ok(Self {
            store_path,
            config_path,
        })
    }
}

/// `<config dir>/codeplay/codeplay.toml`
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("codeplay").join(CONFIG_FILE_NAME))
}

pub struct App {
    pub engine: Arc<UnlockEngine>,
    pub config: CodeplayConfig,
}

impl App {
    /// Open the store, settle the active config and register the built-in games.
    pub async fn open(settings: &Settings) -> Result<Self> {
        let config = match &settings.config_path {
            Some(path) => load_config(path)?,
            None => CodeplayConfig::default(),
        };

        let store = Arc::new(JsonFileStore::new(&settings.store_path));
        let store_path = store.path().to_path_buf();
        let engine = UnlockEngine::new(store, config.state_scope, config.unlock.clone())
            .context("Failed to create unlock engine")?;

        // A config file wins over the persisted copy; without one the last
        // persisted settings stay in effect.
        if settings.config_path.is_some() {
            engine
                .update_config(config.unlock.clone())
                .await
                .context("Failed to persist unlock config")?;
        } else if engine
            .restore_config()
            .await
            .context("Failed to restore unlock config")?
        {
            debug!("Restored persisted unlock config");
        }

        for game in builtin_games() {
            engine
                .register_game(game)
                .await
                .context("Failed to register built-in games")?;
        }
        info!(
            "Using {} ({} games)",
            store_path.display(),
            engine.games().len()
        );

        let config = CodeplayConfig {
            unlock: engine.config(),
            ..config
        };
        Ok(Self {
            engine: Arc::new(engine),
            config,
        })
    }
}

fn load_config(path: &Path) -> Result<CodeplayConfig> {
    CodeplayConfig::load(path).with_context(|| format!("Invalid config {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use codeplay_unlock::StateScope;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn explicit_paths_are_kept() {
        let settings = Settings::resolve(
            Some(PathBuf::from("/tmp/state.json")),
            Some(PathBuf::from("/tmp/codeplay.toml")),
        )
        .expect("settings");
        assert_eq!(settings.store_path, PathBuf::from("/tmp/state.json"));
        assert_eq!(
            settings.config_path,
            Some(PathBuf::from("/tmp/codeplay.toml"))
        );
    }

    #[tokio::test]
    async fn config_file_is_persisted_and_restored() {
        let dir = tempdir().expect("tempdir");
        let store_path = dir.path().join("state.json");
        let config_path = dir.path().join(CONFIG_FILE_NAME);
        fs::write(
            &config_path,
            "state_scope = \"global\"\n[unlock]\nlines_required_to_unlock = 12\n",
        )
        .expect("write config");

        let app = App::open(&Settings {
            store_path: store_path.clone(),
            config_path: Some(config_path),
        })
        .await
        .expect("open");
        assert_eq!(app.engine.scope(), StateScope::Global);
        assert_eq!(app.config.unlock.lines_required_to_unlock, 12);

        let reopened = App::open(&Settings {
            store_path,
            config_path: None,
        })
        .await
        .expect("reopen");
        assert_eq!(reopened.config.unlock.lines_required_to_unlock, 12);
        assert_eq!(reopened.engine.games().len(), 2);
    }
}

//! Hot reload of the configuration file.
//!
//! A reload builds the configuration exactly as startup does: the file is
//! read again and the `BREAKER_*` overrides are laid on top, so a file edit
//! never undoes a value pinned through the environment.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use notify::{Config, Event, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::{broadcast, mpsc};

use crate::config::loader::{load_config_with_lookup, ConfigError};
use crate::config::schema::GlobalConfig;
use crate::lifecycle::wait_for_shutdown;
use crate::resilience::{ConfigureOptions, ConnectionManager};

type EnvLookup = Arc<dyn Fn(&str) -> Option<String> + Send + Sync>;

/// Poll interval for backends that cannot deliver native notifications.
const POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Reloads the configuration when its file changes and publishes the result.
pub struct ConfigWatcher {
    path: PathBuf,
    env: EnvLookup,
    updates: mpsc::UnboundedSender<GlobalConfig>,
}

impl fmt::Debug for ConfigWatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConfigWatcher").field("path", &self.path).finish_non_exhaustive()
    }
}

impl ConfigWatcher {
    /// Watch `path`, overlaying the process environment on every reload.
    pub fn new(path: &Path) -> (Self, mpsc::UnboundedReceiver<GlobalConfig>) {
        Self::with_env(path, |var| std::env::var(var).ok())
    }

    /// Watch `path`, reading overrides through `env` instead of the process
    /// environment.
    pub fn with_env<F>(path: &Path, env: F) -> (Self, mpsc::UnboundedReceiver<GlobalConfig>)
    where
        F: Fn(&str) -> Option<String> + Send + Sync + 'static,
    {
        let (updates, rx) = mpsc::unbounded_channel();
        let watcher = Self {
            path: path.to_path_buf(),
            env: Arc::new(env),
            updates,
        };
        (watcher, rx)
    }

    /// Effective configuration as it stands on disk and in the environment.
    pub fn reload(&self) -> Result<GlobalConfig, ConfigError> {
        load_config_with_lookup(Some(self.path.as_path()), |var| (self.env)(var))
    }

    fn on_event(&self, event: notify::Result<Event>) {
        let event = match event {
            Ok(event) => event,
            Err(e) => {
                tracing::error!(path = %self.path.display(), error = %e, "Config watch error");
                return;
            }
        };
        if !(event.kind.is_modify() || event.kind.is_create()) {
            return;
        }

        match self.reload() {
            Ok(config) => {
                tracing::info!(
                    path = %self.path.display(),
                    max_attempts = ?config.max_attempts,
                    expiry_ms = config.expiry_ms,
                    "Config file changed, reloaded"
                );
                if self.updates.send(config).is_err() {
                    tracing::debug!("No consumer for config updates");
                }
            }
            Err(e) => {
                tracing::error!(
                    path = %self.path.display(),
                    error = %e,
                    "Config reload failed, keeping current configuration"
                );
            }
        }
    }

    /// Start watching on notify's background thread.
    ///
    /// Updates stop once the returned handle is dropped.
    pub fn run(self) -> Result<RecommendedWatcher, notify::Error> {
        let path = self.path.clone();
        let mut watcher = RecommendedWatcher::new(
            move |event: notify::Result<Event>| self.on_event(event),
            Config::default().with_poll_interval(POLL_INTERVAL),
        )?;
        watcher.watch(&path, RecursiveMode::NonRecursive)?;

        tracing::info!(path = %path.display(), "Config watcher started");
        Ok(watcher)
    }
}

/// Merge every reloaded configuration into the running manager until the
/// update channel closes, the manager stops or shutdown fires.
pub async fn apply_config_updates(
    manager: ConnectionManager,
    mut updates: mpsc::UnboundedReceiver<GlobalConfig>,
    mut shutdown: Option<broadcast::Receiver<()>>,
) {
    loop {
        tokio::select! {
            update = updates.recv() => {
                let Some(config) = update else { break };
                if let Err(e) = manager.configure(None, ConfigureOptions::from(&config)).await {
                    tracing::error!(error = %e, "Failed to apply reloaded configuration");
                    break;
                }
                tracing::info!("Reloaded configuration applied");
            }
            _ = wait_for_shutdown(&mut shutdown) => break,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::loader::MAX_ATTEMPTS_ENV_VAR;
    use notify::event::{AccessKind, EventKind, ModifyKind};
    use std::fs;

    fn pinned_attempts(var: &str) -> Option<String> {
        (var == MAX_ATTEMPTS_ENV_VAR).then(|| "9".to_string())
    }

    #[tokio::test]
    async fn test_updates_reach_manager() {
        let manager = ConnectionManager::spawn(GlobalConfig::default());
        let (tx, rx) = mpsc::unbounded_channel();
        let forwarder = tokio::spawn(apply_config_updates(manager.clone(), rx, None));

        tx.send(GlobalConfig {
            max_attempts: Some(9),
            inactive_threshold_ms: 1_000,
            ..GlobalConfig::default()
        })
        .unwrap();
        drop(tx);
        forwarder.await.unwrap();

        let config = manager.global_config().await.unwrap();
        assert_eq!(config.max_attempts, Some(9));
        assert_eq!(config.inactive_threshold_ms, 1_000);
    }

    #[test]
    fn test_reload_keeps_env_overrides() {
        let path = std::env::temp_dir().join("breaker_watcher_env.toml");
        fs::write(&path, "max_attempts = 3\nexpiry_ms = 4000\n").unwrap();

        let (watcher, mut rx) = ConfigWatcher::with_env(&path, pinned_attempts);
        watcher.on_event(Ok(Event::new(EventKind::Modify(ModifyKind::Any))));

        let config = rx.try_recv().unwrap();
        assert_eq!(config.max_attempts, Some(9));
        assert_eq!(config.expiry_ms, 4_000);

        fs::remove_file(&path).unwrap_or_default();
    }

    #[test]
    fn test_only_writes_trigger_reload() {
        let path = std::env::temp_dir().join("breaker_watcher_access.toml");
        fs::write(&path, "max_attempts = 3\n").unwrap();

        let (watcher, mut rx) = ConfigWatcher::with_env(&path, |_| None);
        watcher.on_event(Ok(Event::new(EventKind::Access(AccessKind::Any))));
        assert!(rx.try_recv().is_err());

        fs::remove_file(&path).unwrap_or_default();
    }

    #[test]
    fn test_invalid_reload_keeps_current() {
        let path = std::env::temp_dir().join("breaker_watcher_invalid.toml");
        fs::write(&path, "cleanup_interval_ms = 0\n").unwrap();

        let (watcher, mut rx) = ConfigWatcher::with_env(&path, |_| None);
        watcher.on_event(Ok(Event::new(EventKind::Modify(ModifyKind::Any))));
        assert!(rx.try_recv().is_err());

        fs::remove_file(&path).unwrap_or_default();
    }

    #[tokio::test]
    async fn test_reloaded_file_reaches_manager_with_env_applied() {
        let path = std::env::temp_dir().join("breaker_watcher_manager.toml");
        fs::write(&path, "max_attempts = 3\n").unwrap();

        let manager = ConnectionManager::spawn(GlobalConfig::default());
        let (watcher, rx) = ConfigWatcher::with_env(&path, pinned_attempts);
        watcher.on_event(Ok(Event::new(EventKind::Create(notify::event::CreateKind::File))));
        drop(watcher);

        apply_config_updates(manager.clone(), rx, None).await;
        assert_eq!(manager.global_config().await.unwrap().max_attempts, Some(9));

        fs::remove_file(&path).unwrap_or_default();
    }

    #[test]
    fn test_watch_missing_file_fails() {
        let (watcher, _rx) = ConfigWatcher::new(Path::new("/nonexistent/breaker.toml"));
        assert!(watcher.run().is_err());
    }
}

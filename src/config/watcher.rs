//! Configuration file watcher for hot reload.
//!
//! Watches the file's directory rather than the file itself, so editors that
//! save by writing a temp file and renaming it over the original are seen.
//! Only content that parses, validates and differs from the last accepted
//! version is forwarded.

use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use notify::{Config, Event, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;

use crate::config::loader::{parse_config, ConfigError};
use crate::config::schema::ClientConfig;

/// Result of re-reading the watched file.
#[derive(Debug)]
pub enum Reload {
    Updated(ClientConfig),
    Unchanged,
    Rejected(ConfigError),
}

/// Follows one config file and emits validated configurations.
pub struct ConfigWatcher {
    path: PathBuf,
    last_accepted: Option<String>,
    update_tx: mpsc::UnboundedSender<ClientConfig>,
}

impl ConfigWatcher {
    /// Returns the watcher and the receiving end for accepted configurations.
    pub fn new(path: &Path) -> (Self, mpsc::UnboundedReceiver<ClientConfig>) {
        let (update_tx, update_rx) = mpsc::unbounded_channel();
        let watcher = Self {
            path: path.to_path_buf(),
            last_accepted: fs::read_to_string(path).ok(),
            update_tx,
        };
        (watcher, update_rx)
    }

    /// Re-read the file and decide what to do with it.
    pub fn reload(&mut self) -> Reload {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) => return Reload::Rejected(ConfigError::Io(e)),
        };
        if self.last_accepted.as_deref() == Some(content.as_str()) {
            return Reload::Unchanged;
        }
        match parse_config(&content) {
            Ok(config) => {
                self.last_accepted = Some(content);
                Reload::Updated(config)
            }
            Err(e) => Reload::Rejected(e),
        }
    }

    fn on_event(&mut self, event: Event) {
        if !(event.kind.is_modify() || event.kind.is_create()) {
            return;
        }
        let file_name = self.path.file_name().map(OsString::from);
        if !event.paths.iter().any(|p| p.file_name().map(OsString::from) == file_name) {
            return;
        }

        match self.reload() {
            Reload::Updated(config) => {
                tracing::info!(path = ?self.path, services = config.services.len(), "Config file changed, reloading");
                let _ = self.update_tx.send(config);
            }
            Reload::Unchanged => tracing::trace!(path = ?self.path, "Config file touched, content unchanged"),
            Reload::Rejected(ConfigError::Validation(errors)) => {
                for error in &errors {
                    tracing::error!(path = ?self.path, error = %error, "Invalid config value");
                }
                tracing::error!(errors = errors.len(), "Config reload rejected, keeping current configuration");
            }
            Reload::Rejected(e) => {
                tracing::error!(path = ?self.path, error = %e, "Config reload failed, keeping current configuration");
            }
        }
    }

    /// Start watching. Keep the returned watcher alive for as long as updates
    /// are wanted.
    pub fn run(mut self) -> Result<RecommendedWatcher, notify::Error> {
        let path = self.path.clone();
        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };

        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| match res {
                Ok(event) => self.on_event(event),
                Err(e) => tracing::error!(error = ?e, "Watch error"),
            },
            Config::default().with_poll_interval(Duration::from_secs(2)),
        )?;
        watcher.watch(&dir, RecursiveMode::NonRecursive)?;

        tracing::info!(path = ?path, "Config watcher started");
        Ok(watcher)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_config(content: &str) -> PathBuf {
        let path = std::env::temp_dir().join(format!("fleet-{}.toml", uuid::Uuid::new_v4()));
        fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn test_reload_only_forwards_new_valid_content() {
        let path = temp_config("[services.orders]\ncandidates = [\"10.0.0.1:80\"]\n");
        let (mut watcher, _rx) = ConfigWatcher::new(&path);

        // Same content as at startup
        assert!(matches!(watcher.reload(), Reload::Unchanged));

        fs::write(&path, "[services.orders]\ncandidates = [\"10.0.0.2:80\"]\n").unwrap();
        match watcher.reload() {
            Reload::Updated(config) => assert_eq!(config.services["orders"].candidates, vec!["10.0.0.2:80"]),
            other => panic!("unexpected reload: {other:?}"),
        }
        assert!(matches!(watcher.reload(), Reload::Unchanged));

        fs::write(&path, "[services.orders]\ncandidates = [\"no-port\"]\n").unwrap();
        assert!(matches!(watcher.reload(), Reload::Rejected(ConfigError::Validation(_))));

        fs::remove_file(&path).unwrap();
        assert!(matches!(watcher.reload(), Reload::Rejected(ConfigError::Io(_))));
    }
}

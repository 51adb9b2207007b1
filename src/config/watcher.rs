//! Hot reload of the configuration file.
//!
//! # Reload Rules
//! - The file's directory is watched, so editors that replace the file
//!   (write to temp + rename) are still noticed
//! - A file that fails to load or validate keeps the live configuration
//! - A reload identical to the live configuration is not published
//! - Settings bound at startup (listener, chat path, logging, metrics
//!   exporter) are reported when they change; they take effect on restart

use notify::{Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::mpsc;

use crate::config::loader::load_config;
use crate::config::schema::GatewayConfig;

/// Settings that only apply when the process starts.
///
/// Returns the dotted names of every such field that differs.
pub fn restart_only_changes(live: &GatewayConfig, reloaded: &GatewayConfig) -> Vec<&'static str> {
    let checks = [
        (
            "listener.bind_address",
            live.listener.bind_address != reloaded.listener.bind_address,
        ),
        ("chat.path", live.chat.path != reloaded.chat.path),
        (
            "observability.log_level",
            live.observability.log_level != reloaded.observability.log_level,
        ),
        (
            "observability.metrics_enabled",
            live.observability.metrics_enabled != reloaded.observability.metrics_enabled,
        ),
        (
            "observability.metrics_address",
            live.observability.metrics_address != reloaded.observability.metrics_address,
        ),
    ];
    checks
        .into_iter()
        .filter_map(|(field, changed)| changed.then_some(field))
        .collect()
}

/// Reload state shared by every file event.
struct Reloader {
    path: PathBuf,
    live: GatewayConfig,
    updates: mpsc::UnboundedSender<GatewayConfig>,
}

impl Reloader {
    fn concerns(&self, event: &Event) -> bool {
        matches!(
            event.kind,
            EventKind::Modify(_) | EventKind::Create(_)
        ) && event
            .paths
            .iter()
            .any(|p| p.file_name() == self.path.file_name())
    }

    /// Load the file and publish it if it differs from the live config.
    ///
    /// Returns `true` when a new configuration was published.
    fn reload(&mut self) -> bool {
        let reloaded = match load_config(&self.path) {
            Ok(config) => config,
            Err(e) => {
                tracing::error!(
                    path = %self.path.display(),
                    error = %e,
                    "Config reload rejected, keeping live configuration"
                );
                return false;
            }
        };
        if reloaded == self.live {
            tracing::debug!(path = %self.path.display(), "Config file unchanged");
            return false;
        }

        for field in restart_only_changes(&self.live, &reloaded) {
            tracing::warn!(field, "Changed setting takes effect only after a restart");
        }
        self.live = reloaded.clone();
        self.updates.send(reloaded).is_ok()
    }
}

/// Watches the configuration file and publishes validated changes.
pub struct ConfigWatcher {
    reloader: Reloader,
}

impl ConfigWatcher {
    /// Create a watcher for `path`, starting from the `live` configuration.
    ///
    /// Returns the watcher and a receiver for reloaded configurations.
    pub fn new(path: &Path, live: GatewayConfig) -> (Self, mpsc::UnboundedReceiver<GatewayConfig>) {
        let (updates, rx) = mpsc::unbounded_channel();
        let reloader = Reloader {
            path: path.to_path_buf(),
            live,
            updates,
        };
        (Self { reloader }, rx)
    }

    /// Start watching on notify's background thread.
    ///
    /// Reloads stop when the returned watcher is dropped.
    pub fn run(self) -> Result<RecommendedWatcher, notify::Error> {
        let mut reloader = self.reloader;
        let dir = match reloader.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        let path = reloader.path.clone();

        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| match res {
                Ok(event) if reloader.concerns(&event) => {
                    if reloader.reload() {
                        tracing::info!("Configuration change published");
                    }
                }
                Ok(_) => {}
                Err(e) => tracing::error!(error = %e, "Config watch error"),
            },
            Config::default().with_poll_interval(Duration::from_secs(2)),
        )?;
        watcher.watch(&dir, RecursiveMode::NonRecursive)?;

        tracing::info!(path = %path.display(), "Config watcher started");
        Ok(watcher)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use notify::event::{CreateKind, ModifyKind, RemoveKind};
    use std::fs;

    fn scratch_path(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!(
            "swindon-chat-watch-{}-{}.toml",
            name,
            std::process::id()
        ))
    }

    fn reloader(path: &Path) -> (Reloader, mpsc::UnboundedReceiver<GatewayConfig>) {
        let (updates, rx) = mpsc::unbounded_channel();
        let reloader = Reloader {
            path: path.to_path_buf(),
            live: GatewayConfig::default(),
            updates,
        };
        (reloader, rx)
    }

    #[test]
    fn backend_changes_need_no_restart() {
        let live = GatewayConfig::default();
        let mut reloaded = live.clone();
        reloaded.backend.base_url = "http://10.0.0.2:9000".to_string();
        reloaded.chat.max_in_flight = 8;
        reloaded.listener.max_connections = 10;

        assert!(restart_only_changes(&live, &reloaded).is_empty());
    }

    #[test]
    fn startup_bound_settings_are_reported() {
        let live = GatewayConfig::default();
        let mut reloaded = live.clone();
        reloaded.listener.bind_address = "127.0.0.1:9999".to_string();
        reloaded.chat.path = "/chat".to_string();
        reloaded.observability.metrics_enabled = true;

        assert_eq!(
            restart_only_changes(&live, &reloaded),
            vec!["listener.bind_address", "chat.path", "observability.metrics_enabled"]
        );
    }

    #[test]
    fn reload_publishes_changed_config_once() {
        let path = scratch_path("publish");
        fs::write(&path, "[backend]\nbase_url = \"http://10.0.0.3:7000\"\n").unwrap();
        let (mut reloader, mut rx) = reloader(&path);

        assert!(reloader.reload());
        assert_eq!(rx.try_recv().unwrap().backend.base_url, "http://10.0.0.3:7000");

        // Same content again: nothing new to publish.
        assert!(!reloader.reload());
        assert!(rx.try_recv().is_err());
        fs::remove_file(path).ok();
    }

    #[test]
    fn invalid_file_keeps_live_config() {
        let path = scratch_path("invalid");
        fs::write(&path, "[chat]\nmax_in_flight = 0\n").unwrap();
        let (mut reloader, mut rx) = reloader(&path);

        assert!(!reloader.reload());
        assert!(rx.try_recv().is_err());
        assert_eq!(reloader.live, GatewayConfig::default());
        fs::remove_file(path).ok();
    }

    #[test]
    fn only_events_for_the_config_file_count() {
        let path = scratch_path("events");
        let (reloader, _rx) = reloader(&path);
        let sibling = path.with_file_name("other.toml");

        let modify = Event::new(EventKind::Modify(ModifyKind::Any)).add_path(path.clone());
        let create = Event::new(EventKind::Create(CreateKind::File)).add_path(path.clone());
        let remove = Event::new(EventKind::Remove(RemoveKind::File)).add_path(path.clone());
        let other = Event::new(EventKind::Modify(ModifyKind::Any)).add_path(sibling);

        assert!(reloader.concerns(&modify));
        assert!(reloader.concerns(&create));
        assert!(!reloader.concerns(&remove));
        assert!(!reloader.concerns(&other));
    }
}

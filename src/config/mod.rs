use crate::models::{CONFIG_VERSION, ConfigError, HideConfig};
use camino::{Utf8Path, Utf8PathBuf};
use std::fs;
use std::io;
use std::sync::{Arc, PoisonError, RwLock};
use tokio::sync::broadcast;

/// Outcome of [`ConfigStore::load`]. Only `Loaded` replaces the default.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadOutcome {
    Loaded,
    Missing,
    VersionMismatch { found: u32, expected: u32 },
    Invalid(String),
}

/// Why a synced payload was not applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncRejection {
    Parse(String),
    VersionMismatch { found: u32, expected: u32 },
}

/// Outcome of [`ConfigStore::sync`].
#[derive(Debug, Clone)]
pub enum SyncOutcome {
    /// The payload is now the active configuration.
    Applied(Arc<HideConfig>),

    /// The payload was persisted but not applied. It takes effect (or fails
    /// again) only after the host process restarts.
    RestartRequired(SyncRejection),
}

impl SyncOutcome {
    pub fn is_applied(&self) -> bool {
        matches!(self, SyncOutcome::Applied(_))
    }
}

/// Events broadcast to [`ConfigStore::subscribe`] receivers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigEvent {
    /// The persisted configuration was accepted at startup
    Loaded { version: u32 },

    /// A sync replaced the active configuration
    Applied { version: u32, callers: usize },

    /// A sync was persisted but rejected
    Rejected(SyncRejection),
}

/// Holder of the active [`HideConfig`] and its persisted copy.
///
/// The active configuration is an `Arc` snapshot behind an `RwLock`. Readers
/// clone the `Arc` and release the lock immediately, writers swap in a whole
/// new `Arc`; nobody ever observes a partially updated configuration.
///
/// Writes to the persisted file are expected to happen under the
/// [`ConfigLock`](crate::state::ConfigLock), which the caller holds.
#[derive(Debug)]
pub struct ConfigStore {
    path: Utf8PathBuf,
    expected_version: u32,
    current: RwLock<Arc<HideConfig>>,
    events: broadcast::Sender<ConfigEvent>,
}

impl ConfigStore {
    /// Create a store backed by `path`, holding the default configuration.
    pub fn new<P: AsRef<Utf8Path>>(path: P) -> Self {
        Self::with_expected_version(path, CONFIG_VERSION)
    }

    /// Like [`new`](Self::new) with an explicit schema version.
    pub fn with_expected_version<P: AsRef<Utf8Path>>(path: P, expected_version: u32) -> Self {
        let (events, _) = broadcast::channel(16);
        Self {
            path: path.as_ref().to_path_buf(),
            expected_version,
            current: RwLock::new(Arc::new(HideConfig::default())),
            events,
        }
    }

    /// Load the persisted configuration, keeping the default on any failure.
    pub fn load(&self) -> LoadOutcome {
        let text = match fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                tracing::info!("Config file not found");
                return LoadOutcome::Missing;
            }
            Err(source) => {
                let e = ConfigError::Read {
                    path: self.path.to_string(),
                    source,
                };
                tracing::error!("{}", e);
                return LoadOutcome::Invalid(e.to_string());
            }
        };

        let loaded = match HideConfig::parse(&text) {
            Ok(config) => config,
            Err(e) => {
                tracing::error!("Failed to parse {}: {}", self.path, e);
                return LoadOutcome::Invalid(e.to_string());
            }
        };

        if loaded.config_version != self.expected_version {
            tracing::warn!(
                "Config version mismatch ({} != {}), need to reload",
                loaded.config_version,
                self.expected_version
            );
            return LoadOutcome::VersionMismatch {
                found: loaded.config_version,
                expected: self.expected_version,
            };
        }

        let version = loaded.config_version;
        self.publish(loaded);
        let _ = self.events.send(ConfigEvent::Loaded { version });
        tracing::info!("Config loaded");
        LoadOutcome::Loaded
    }

    /// Persist `raw` and, if it is a valid current-version document, apply it.
    ///
    /// The payload is written before it is validated, so a rejected payload
    /// also fails to load on the next start.
    pub fn sync(&self, raw: &str) -> Result<SyncOutcome, ConfigError> {
        fs::write(&self.path, raw).map_err(|source| ConfigError::Write {
            path: self.path.to_string(),
            source,
        })?;

        let rejection = match HideConfig::parse(raw) {
            Ok(config) if config.config_version == self.expected_version => {
                for (caller, name) in config.dangling_templates() {
                    tracing::warn!("Template {} applied to {} does not exist", name, caller);
                }
                let event = ConfigEvent::Applied {
                    version: config.config_version,
                    callers: config.scope.len(),
                };
                let snapshot = self.publish(config);
                let _ = self.events.send(event);
                return Ok(SyncOutcome::Applied(snapshot));
            }
            Ok(config) => SyncRejection::VersionMismatch {
                found: config.config_version,
                expected: self.expected_version,
            },
            Err(e) => SyncRejection::Parse(e.to_string()),
        };

        tracing::warn!("Sync config rejected ({:?}), need reboot", rejection);
        let _ = self.events.send(ConfigEvent::Rejected(rejection.clone()));
        Ok(SyncOutcome::RestartRequired(rejection))
    }

    /// The active configuration.
    pub fn snapshot(&self) -> Arc<HideConfig> {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Subscribe to load/sync events.
    pub fn subscribe(&self) -> broadcast::Receiver<ConfigEvent> {
        self.events.subscribe()
    }

    pub fn path(&self) -> &Utf8Path {
        &self.path
    }

    fn publish(&self, config: HideConfig) -> Arc<HideConfig> {
        let snapshot = Arc::new(config);
        *self.current.write().unwrap_or_else(PoisonError::into_inner) = Arc::clone(&snapshot);
        snapshot
    }
}

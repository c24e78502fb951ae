use indexmap::{IndexMap, IndexSet};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Schema version this build accepts. A persisted or synced document carrying
/// any other `configVersion` is rejected as a whole.
pub const CONFIG_VERSION: u32 = 90;

/// Default diagnostic log budget in KiB.
pub const DEFAULT_MAX_LOG_SIZE_KIB: u64 = 512;

/// Errors produced while decoding or persisting a [`HideConfig`].
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Failed to read config {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write config {path}: {source}")]
    Write {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Visibility policy document, persisted as `config.json`.
///
/// Instances are never edited once published; a change produces a new value
/// that replaces the old one wholesale (see [`crate::config::ConfigStore`]).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct HideConfig {
    pub config_version: u32,

    /// Diagnostic log rotation threshold in KiB.
    #[serde(alias = "maxLogSizeKiB")]
    pub max_log_size: u64,

    /// Whether DEBUG events reach the diagnostic log.
    pub detail_log: bool,

    /// Callers under policy control. Callers absent here are never filtered.
    pub scope: IndexMap<String, AppConfig>,

    pub templates: IndexMap<String, Template>,
}

/// Rules applied to one caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AppConfig {
    /// `false`: listed apps are hidden. `true`: only listed apps are visible.
    pub use_whitelist: bool,

    /// Whitelist mode only: platform-provided apps always stay visible.
    pub exclude_system_apps: bool,

    /// Template names, evaluated in declaration order.
    pub apply_templates: IndexSet<String>,

    pub extra_app_list: IndexSet<String>,
}

/// Named app list shared by several [`AppConfig`]s.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Template {
    /// Which mode the template was authored for. Informational only.
    pub is_whitelist: bool,

    pub app_list: IndexSet<String>,
}

impl Default for HideConfig {
    fn default() -> Self {
        Self {
            config_version: CONFIG_VERSION,
            max_log_size: DEFAULT_MAX_LOG_SIZE_KIB,
            detail_log: true,
            scope: IndexMap::new(),
            templates: IndexMap::new(),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            use_whitelist: false,
            exclude_system_apps: true,
            apply_templates: IndexSet::new(),
            extra_app_list: IndexSet::new(),
        }
    }
}

impl HideConfig {
    /// Decode a JSON document. Version checking is left to the caller.
    pub fn parse(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn to_json(&self) -> Result<String, ConfigError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// True when this document was written for the running schema.
    pub fn is_current_version(&self) -> bool {
        self.config_version == CONFIG_VERSION
    }

    /// Whether any rule applies to `package` as a caller.
    pub fn is_hook_enabled(&self, package: &str) -> bool {
        self.scope.contains_key(package)
    }

    /// Template names referenced from `scope` that have no definition.
    ///
    /// Such references contribute nothing to a decision; this is only used to
    /// surface them in the log when a document is accepted.
    pub fn dangling_templates(&self) -> Vec<(&str, &str)> {
        self.scope
            .iter()
            .flat_map(|(caller, app)| {
                app.apply_templates
                    .iter()
                    .filter(|name| !self.templates.contains_key(name.as_str()))
                    .map(move |name| (caller.as_str(), name.as_str()))
            })
            .collect()
    }
}

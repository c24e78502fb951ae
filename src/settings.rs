use anyhow::{Context, Result};
use camino::{Utf8Path, Utf8PathBuf};
use config::{Config, Environment, File, FileFormat};
use serde::Deserialize;

/// Prefix of environment overrides, e.g. `HMA_PLATFORM_LEVEL=34`.
pub const ENV_PREFIX: &str = "HMA";

/// Process-level settings of the service (not the visibility policy).
///
/// Layered from defaults, an optional YAML file, and `HMA_*` environment
/// variables, later sources winning.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ServiceSettings {
    /// Directory scanned for the service's data dir.
    pub storage_root: Utf8PathBuf,

    /// Name prefix of the data dir.
    pub dir_prefix: String,

    /// Locations used by older releases, removed on start.
    pub legacy_dirs: Vec<Utf8PathBuf>,

    /// Capability level of the platform's interception points (API level).
    pub platform_level: u32,

    /// `EnvFilter` directive for console output.
    pub console_log: String,
}

impl Default for ServiceSettings {
    fn default() -> Self {
        Self {
            storage_root: Utf8PathBuf::from("/data/system"),
            dir_prefix: "h_m_a".to_string(),
            legacy_dirs: vec![Utf8PathBuf::from("/data/misc/hide_my_applist")],
            platform_level: 0,
            console_log: "info".to_string(),
        }
    }
}

impl ServiceSettings {
    /// Load settings from `path` (if given and present) and the environment.
    pub fn load(path: Option<&Utf8Path>) -> Result<Self> {
        let mut builder = Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(File::new(path.as_str(), FileFormat::Yaml).required(false));
        }
        builder = builder.add_source(Environment::with_prefix(ENV_PREFIX).try_parsing(true));

        let settings: Self = builder
            .build()
            .context("Failed to assemble service settings")?
            .try_deserialize()
            .context("Failed to parse service settings")?;

        tracing::debug!("Service settings: {:?}", settings);
        Ok(settings)
    }

    /// Settings rooted at `storage_root`, with no legacy cleanup.
    pub fn with_storage_root<P: AsRef<Utf8Path>>(storage_root: P) -> Self {
        Self {
            storage_root: storage_root.as_ref().to_path_buf(),
            legacy_dirs: Vec::new(),
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let settings = ServiceSettings::default();
        assert_eq!(settings.storage_root, Utf8PathBuf::from("/data/system"));
        assert_eq!(settings.dir_prefix, "h_m_a");
        assert_eq!(settings.platform_level, 0);
    }

    #[test]
    fn test_load_without_file_uses_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let path = Utf8PathBuf::try_from(temp_dir.path().join("absent.yaml")).unwrap();

        let settings = ServiceSettings::load(Some(&path)).unwrap();
        assert_eq!(settings.dir_prefix, "h_m_a");
    }

    #[test]
    fn test_load_yaml_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = Utf8PathBuf::try_from(temp_dir.path().join("settings.yaml")).unwrap();
        fs::write(
            &path,
            "storage_root: /tmp/hma\nplatform_level: 33\nlegacy_dirs: []\n",
        )
        .unwrap();

        let settings = ServiceSettings::load(Some(&path)).unwrap();
        assert_eq!(settings.storage_root, Utf8PathBuf::from("/tmp/hma"));
        assert_eq!(settings.platform_level, 33);
        assert!(settings.legacy_dirs.is_empty());
        assert_eq!(settings.console_log, "info");
    }
}

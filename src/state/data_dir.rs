use anyhow::{Context, Result};
use camino::{Utf8Path, Utf8PathBuf};
use rand::Rng;
use rand::distributions::Alphanumeric;
use std::fs;

/// Length of the random suffix of a freshly created storage directory.
const RANDOM_SUFFIX_LEN: usize = 16;

/// Durable storage location of the service.
///
/// Layout:
/// - `config.json`: persisted policy document
/// - `filter_count`: usage counter, plain integer text
/// - `log/runtime.log`, `log/old.log`: diagnostic log and its backup
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataDir {
    root: Utf8PathBuf,
}

impl DataDir {
    /// Find or create the storage directory under `storage_root`.
    ///
    /// Every directory whose name starts with `prefix` is a candidate. The
    /// first one in lexicographic order is kept and all others are deleted. If
    /// there is none, a new directory with a random suffix is created so the
    /// path cannot be guessed. Each path in `legacy_dirs` is removed first.
    ///
    /// Failing to remove a legacy or stale path is logged and does not stop
    /// the service from starting.
    pub fn locate(storage_root: &Utf8Path, prefix: &str, legacy_dirs: &[Utf8PathBuf]) -> Result<Self> {
        for legacy in legacy_dirs {
            if legacy.exists() {
                match remove_path(legacy) {
                    Ok(()) => tracing::info!("Removed legacy data dir {}", legacy),
                    Err(e) => tracing::warn!("Failed to remove legacy data dir: {:#}", e),
                }
            }
        }

        fs::create_dir_all(storage_root)
            .with_context(|| format!("Failed to create storage root: {}", storage_root))?;

        let mut candidates: Vec<Utf8PathBuf> = storage_root
            .read_dir_utf8()
            .with_context(|| format!("Failed to list storage root: {}", storage_root))?
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_name().starts_with(prefix))
            .map(|entry| entry.into_path())
            .collect();
        candidates.sort();

        let mut candidates = candidates.into_iter();
        let root = match candidates.next() {
            Some(kept) => {
                for stale in candidates {
                    tracing::warn!("Removing stale data dir {}", stale);
                    if let Err(e) = remove_path(&stale) {
                        tracing::warn!("Failed to remove stale data dir: {:#}", e);
                    }
                }
                kept
            }
            None => storage_root.join(format!("{}_{}", prefix, random_suffix())),
        };

        let dir = Self { root };
        fs::create_dir_all(dir.log_dir())
            .with_context(|| format!("Failed to create log directory: {}", dir.log_dir()))?;
        Ok(dir)
    }

    /// Wrap an existing directory without scanning. Used by tests and tools.
    pub fn at<P: AsRef<Utf8Path>>(root: P) -> Result<Self> {
        let dir = Self {
            root: root.as_ref().to_path_buf(),
        };
        fs::create_dir_all(dir.log_dir())
            .with_context(|| format!("Failed to create log directory: {}", dir.log_dir()))?;
        Ok(dir)
    }

    pub fn root(&self) -> &Utf8Path {
        &self.root
    }

    pub fn config_file(&self) -> Utf8PathBuf {
        self.root.join("config.json")
    }

    pub fn filter_count_file(&self) -> Utf8PathBuf {
        self.root.join("filter_count")
    }

    pub fn log_dir(&self) -> Utf8PathBuf {
        self.root.join("log")
    }

    pub fn log_file(&self) -> Utf8PathBuf {
        self.log_dir().join("runtime.log")
    }

    pub fn old_log_file(&self) -> Utf8PathBuf {
        self.log_dir().join("old.log")
    }

    /// Delete the whole directory. Irreversible.
    pub fn wipe(&self) -> Result<()> {
        if self.root.exists() {
            fs::remove_dir_all(&self.root)
                .with_context(|| format!("Failed to remove data dir: {}", self.root))?;
        }
        Ok(())
    }
}

fn remove_path(path: &Utf8Path) -> Result<()> {
    let removed = if path.is_dir() {
        fs::remove_dir_all(path)
    } else {
        fs::remove_file(path)
    };
    removed.with_context(|| format!("Failed to remove {}", path))
}

fn random_suffix() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(RANDOM_SUFFIX_LEN)
        .map(char::from)
        .collect()
}

// Usage metrics
//
// Tracks how many queries the hooks have filtered, with amortized persistence.

use crate::state::ConfigLock;
use camino::{Utf8Path, Utf8PathBuf};
use std::fs;
use std::sync::atomic::{AtomicU64, Ordering};

/// The counter is written to disk every this many increments.
pub const FLUSH_INTERVAL: u64 = 100;

/// Count of filtered queries, persisted across restarts.
///
/// Increments are lock-free atomics. Every [`FLUSH_INTERVAL`]th value is written
/// to `filter_count` under the [`ConfigLock`], so up to `FLUSH_INTERVAL - 1`
/// increments can be lost on a crash. Flushes racing on different threads
/// never move the persisted value backwards.
#[derive(Debug)]
pub struct UsageCounter {
    /// Total queries filtered
    count: AtomicU64,

    /// Plain-text backing file
    path: Utf8PathBuf,

    /// Last value written to `path`, only changed under `lock`
    flushed: AtomicU64,

    lock: ConfigLock,
}

impl UsageCounter {
    /// Create a counter starting at zero. Call [`load`](Self::load) to restore.
    pub fn new<P: AsRef<Utf8Path>>(path: P, lock: ConfigLock) -> Self {
        Self {
            count: AtomicU64::new(0),
            path: path.as_ref().to_path_buf(),
            flushed: AtomicU64::new(0),
            lock,
        }
    }

    /// Restore the persisted value.
    ///
    /// A missing file leaves the counter at zero. An unreadable or corrupt file
    /// is reset to `0` on disk.
    pub fn load(&self) -> u64 {
        if !self.path.exists() {
            return self.get();
        }

        let parsed = fs::read_to_string(&self.path)
            .map_err(|e| e.to_string())
            .and_then(|text| text.trim().parse::<u64>().map_err(|e| e.to_string()));

        match parsed {
            Ok(value) => {
                self.count.store(value, Ordering::Relaxed);
                self.flushed.store(value, Ordering::Relaxed);
                tracing::debug!("Filter count restored: {}", value);
            }
            Err(e) => {
                tracing::warn!("Failed to load filter count, set to 0: {}", e);
                self.count.store(0, Ordering::Relaxed);
                self.flushed.store(0, Ordering::Relaxed);
                self.persist(0);
            }
        }
        self.get()
    }

    /// Record one filtered query and return the new total.
    pub fn increment(&self) -> u64 {
        let value = self.count.fetch_add(1, Ordering::Relaxed) + 1;
        if value % FLUSH_INTERVAL == 0 {
            self.flush(value);
        }
        value
    }

    pub fn get(&self) -> u64 {
        self.count.load(Ordering::Relaxed)
    }

    pub fn path(&self) -> &Utf8Path {
        &self.path
    }

    /// Write `value` unless a larger one has already been written.
    fn flush(&self, value: u64) {
        let _guard = self.lock.enter();
        if value <= self.flushed.load(Ordering::Relaxed) {
            return;
        }
        self.persist(value);
        self.flushed.store(value, Ordering::Relaxed);
    }

    fn persist(&self, value: u64) {
        if let Err(e) = fs::write(&self.path, value.to_string()) {
            tracing::warn!("Failed to persist filter count to {}: {}", self.path, e);
        }
    }
}

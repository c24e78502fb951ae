use crate::models::DEFAULT_MAX_LOG_SIZE_KIB;
use camino::{Utf8Path, Utf8PathBuf};
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Append-only diagnostic log with one backup generation.
///
/// All file operations run under a single mutex (the log domain). The log
/// starts detached: until [`open`](Self::open) points it at its files, and after
/// [`set_available(false)`](Self::set_available), appends are dropped.
///
/// This type never emits `tracing` events itself, because it is the sink the
/// [`DiagnosticLayer`](crate::logging::DiagnosticLayer) writes into.
#[derive(Debug)]
pub struct DiagnosticLog {
    inner: Mutex<LogInner>,
    max_size_kib: AtomicU64,
    detail: AtomicBool,
}

#[derive(Debug, Default)]
struct LogInner {
    files: Option<LogFiles>,
    available: bool,
}

#[derive(Debug)]
struct LogFiles {
    active: Utf8PathBuf,
    backup: Utf8PathBuf,
}

impl DiagnosticLog {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(LogInner::default()),
            max_size_kib: AtomicU64::new(DEFAULT_MAX_LOG_SIZE_KIB),
            detail: AtomicBool::new(true),
        }
    }

    /// Attach to `active`/`backup` and start accepting writes.
    ///
    /// The previous run's active log becomes the backup, so each process
    /// lifetime starts with an empty log.
    pub fn open(&self, active: &Utf8Path, backup: &Utf8Path) -> io::Result<()> {
        let mut inner = self.lock();
        let files = LogFiles {
            active: active.to_path_buf(),
            backup: backup.to_path_buf(),
        };
        if files.active.exists() {
            fs::rename(&files.active, &files.backup)?;
        }
        fs::File::create(&files.active)?;
        inner.files = Some(files);
        inner.available = true;
        Ok(())
    }

    /// Append `message`, rotating first if the active log is over budget.
    pub fn append(&self, message: &str) -> io::Result<()> {
        let inner = self.lock();
        if !inner.available {
            return Ok(());
        }
        let Some(files) = inner.files.as_ref() else {
            return Ok(());
        };

        let size = match fs::metadata(&files.active) {
            Ok(meta) => meta.len(),
            Err(e) if e.kind() == io::ErrorKind::NotFound => 0,
            Err(e) => return Err(e),
        };
        if size / 1024 > self.max_size_kib() {
            files.rotate()?;
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&files.active)?;
        file.write_all(message.as_bytes())
    }

    /// Full contents of the active log. Empty while detached.
    pub fn read(&self) -> io::Result<String> {
        let inner = self.lock();
        let Some(files) = inner.files.as_ref() else {
            return Ok(String::new());
        };
        match fs::read_to_string(&files.active) {
            Ok(text) => Ok(text),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(String::new()),
            Err(e) => Err(e),
        }
    }

    /// Drop the backup, move the active log into its place and start empty.
    pub fn rotate(&self) -> io::Result<()> {
        let inner = self.lock();
        match inner.files.as_ref() {
            Some(files) => files.rotate(),
            None => Ok(()),
        }
    }

    pub fn set_available(&self, available: bool) {
        self.lock().available = available;
    }

    pub fn is_available(&self) -> bool {
        self.lock().available
    }

    /// Apply the log-related fields of the current configuration.
    pub fn set_limits(&self, max_size_kib: u64, detail: bool) {
        self.max_size_kib.store(max_size_kib, Ordering::Relaxed);
        self.detail.store(detail, Ordering::Relaxed);
    }

    pub fn max_size_kib(&self) -> u64 {
        self.max_size_kib.load(Ordering::Relaxed)
    }

    /// Whether DEBUG-level events should be recorded.
    pub fn detail_enabled(&self) -> bool {
        self.detail.load(Ordering::Relaxed)
    }

    fn lock(&self) -> MutexGuard<'_, LogInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for DiagnosticLog {
    fn default() -> Self {
        Self::new()
    }
}

impl LogFiles {
    fn rotate(&self) -> io::Result<()> {
        ignore_missing(fs::remove_file(&self.backup))?;
        ignore_missing(fs::rename(&self.active, &self.backup))?;
        fs::File::create(&self.active)?;
        Ok(())
    }
}

fn ignore_missing(result: io::Result<()>) -> io::Result<()> {
    match result {
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn open_log() -> (TempDir, DiagnosticLog, Utf8PathBuf, Utf8PathBuf) {
        let temp_dir = TempDir::new().unwrap();
        let dir = Utf8PathBuf::try_from(temp_dir.path().to_path_buf()).unwrap();
        let active = dir.join("runtime.log");
        let backup = dir.join("old.log");
        let log = DiagnosticLog::new();
        log.open(&active, &backup).unwrap();
        (temp_dir, log, active, backup)
    }

    #[test]
    fn test_detached_log_drops_writes() {
        let log = DiagnosticLog::new();
        assert!(!log.is_available());
        log.append("lost\n").unwrap();
        assert_eq!(log.read().unwrap(), "");
        log.rotate().unwrap();
    }

    #[test]
    fn test_append_and_read() {
        let (_temp_dir, log, _, _) = open_log();
        log.append("first\n").unwrap();
        log.append("second\n").unwrap();
        assert_eq!(log.read().unwrap(), "first\nsecond\n");
    }

    #[test]
    fn test_open_moves_previous_log_to_backup() {
        let (_temp_dir, log, active, backup) = open_log();
        log.append("previous boot\n").unwrap();

        let next = DiagnosticLog::new();
        next.open(&active, &backup).unwrap();

        assert_eq!(next.read().unwrap(), "");
        assert_eq!(fs::read_to_string(&backup).unwrap(), "previous boot\n");
    }

    #[test]
    fn test_unavailable_log_ignores_appends() {
        let (_temp_dir, log, _, _) = open_log();
        log.append("kept\n").unwrap();
        log.set_available(false);
        log.append("dropped\n").unwrap();
        assert_eq!(log.read().unwrap(), "kept\n");
    }

    #[test]
    fn test_rotate_is_idempotent() {
        let (_temp_dir, log, active, backup) = open_log();
        log.append("data\n").unwrap();

        log.rotate().unwrap();
        assert_eq!(fs::read_to_string(&backup).unwrap(), "data\n");
        assert_eq!(fs::read_to_string(&active).unwrap(), "");

        log.rotate().unwrap();
        assert_eq!(fs::read_to_string(&backup).unwrap(), "");
        assert_eq!(fs::read_to_string(&active).unwrap(), "");
    }

    #[test]
    fn test_limits_are_stored() {
        let log = DiagnosticLog::new();
        assert_eq!(log.max_size_kib(), DEFAULT_MAX_LOG_SIZE_KIB);
        log.set_limits(16, false);
        assert_eq!(log.max_size_kib(), 16);
        assert!(!log.detail_enabled());
    }
}

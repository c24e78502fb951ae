// Durable service state
//
// This module owns everything the service keeps on disk between restarts
// (storage directory, diagnostic log) together with the lock that serializes
// configuration-side mutations.

pub mod data_dir;
pub mod diagnostic_log;

pub use data_dir::DataDir;
pub use diagnostic_log::DiagnosticLog;

use std::marker::PhantomData;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, ThreadId};

/// The configuration mutual-exclusion domain.
///
/// Held while the persisted configuration is written and replaced, while hooks
/// are installed or unloaded, and while the usage counter is flushed. Cloning
/// shares the same underlying lock.
///
/// The domain is reentrant: the thread that holds it may enter again, so a
/// hook that records a filtered query from inside `load` or
/// `on_config_changed` flushes the counter without blocking on itself.
///
/// # Related Types
///
/// - [`crate::config::ConfigStore`]: synced under this lock
/// - [`crate::hooks::HookRegistry`]: installed and unloaded under this lock
/// - [`crate::metrics::UsageCounter`]: flushes under this lock
#[derive(Debug, Clone, Default)]
pub struct ConfigLock {
    inner: Arc<Domain>,
}

#[derive(Debug, Default)]
struct Domain {
    owner: Mutex<Owner>,
    released: Condvar,
}

#[derive(Debug, Default)]
struct Owner {
    thread: Option<ThreadId>,
    depth: usize,
}

impl ConfigLock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enter the domain, blocking while another thread holds it.
    pub fn enter(&self) -> ConfigGuard<'_> {
        let current = thread::current().id();
        let mut owner = self.inner.owner();
        while owner.thread.is_some_and(|holder| holder != current) {
            owner = self
                .inner
                .released
                .wait(owner)
                .unwrap_or_else(PoisonError::into_inner);
        }
        owner.acquire(current);
        ConfigGuard::new(&self.inner)
    }

    /// Enter the domain only if no other thread holds it.
    pub fn try_enter(&self) -> Option<ConfigGuard<'_>> {
        let current = thread::current().id();
        let mut owner = self.inner.owner();
        if owner.thread.is_some_and(|holder| holder != current) {
            return None;
        }
        owner.acquire(current);
        Some(ConfigGuard::new(&self.inner))
    }
}

impl Domain {
    /// The owner record only holds plain counters, so a panic while it was
    /// locked leaves nothing half-updated.
    fn owner(&self) -> MutexGuard<'_, Owner> {
        self.owner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Owner {
    fn acquire(&mut self, thread: ThreadId) {
        self.thread = Some(thread);
        self.depth += 1;
    }
}

/// Proof of being inside the [`ConfigLock`] domain. Leaving the outermost
/// guard releases it.
#[must_use]
#[derive(Debug)]
pub struct ConfigGuard<'a> {
    domain: &'a Domain,
    // Released by the thread that entered
    _not_send: PhantomData<*const ()>,
}

impl<'a> ConfigGuard<'a> {
    fn new(domain: &'a Domain) -> Self {
        Self {
            domain,
            _not_send: PhantomData,
        }
    }
}

impl Drop for ConfigGuard<'_> {
    fn drop(&mut self) {
        let mut owner = self.domain.owner();
        owner.depth = owner.depth.saturating_sub(1);
        if owner.depth == 0 {
            owner.thread = None;
            drop(owner);
            self.domain.released.notify_one();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;
    use std::time::Duration;

    #[test]
    fn test_config_lock_is_shared_between_clones() {
        let lock = ConfigLock::new();
        let other = lock.clone();

        let guard = lock.enter();
        thread::scope(|s| {
            s.spawn(|| assert!(other.try_enter().is_none()));
        });
        drop(guard);
        thread::scope(|s| {
            s.spawn(|| assert!(other.try_enter().is_some()));
        });
    }

    #[test]
    fn test_config_lock_is_reentrant() {
        let lock = ConfigLock::new();

        let outer = lock.enter();
        let inner = lock.enter();
        assert!(lock.try_enter().is_some());
        drop(inner);

        // Still held by this thread after the inner guard is gone
        thread::scope(|s| {
            s.spawn(|| assert!(lock.try_enter().is_none()));
        });
        drop(outer);
        thread::scope(|s| {
            s.spawn(|| assert!(lock.try_enter().is_some()));
        });
    }

    #[test]
    fn test_config_lock_wakes_waiting_thread() {
        let lock = ConfigLock::new();
        let waiter = lock.clone();
        let (tx, rx) = mpsc::channel();

        let guard = lock.enter();
        let handle = thread::spawn(move || {
            let _guard = waiter.enter();
            tx.send(()).unwrap();
        });

        assert!(rx.recv_timeout(Duration::from_millis(50)).is_err());
        drop(guard);
        rx.recv_timeout(Duration::from_secs(5)).unwrap();
        handle.join().unwrap();
    }

    #[test]
    fn test_config_lock_survives_panicking_holder() {
        let lock = ConfigLock::new();
        let poisoner = lock.clone();

        let _ = thread::spawn(move || {
            let _guard = poisoner.enter();
            panic!("panic while holding the lock");
        })
        .join();

        let _guard = lock.enter();
    }
}

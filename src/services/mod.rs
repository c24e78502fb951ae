//! The visibility service.
//!
//! [`HmaService`] composes every other component:
//!
//! - [`DataDir`]: durable storage, located (or created) at startup
//! - [`ConfigStore`]: the active policy snapshot and its persisted copy
//! - [`SystemApps`]: frozen platform-provided package set
//! - [`HookRegistry`]: installed interception adapters
//! - [`UsageCounter`] and [`DiagnosticLog`]: bookkeeping
//! - [`CallRelay`]: re-dispatch of wrapped calls
//!
//! The service is an explicitly owned object. The embedding process keeps the
//! `Arc` returned by [`HmaService::start`] and hands it to whatever entry points
//! need it; there is no process-wide instance.
//!
//! # Locking
//!
//! Configuration sync, hook (un)installation and counter flushes run inside
//! the [`ConfigLock`]; log access runs inside the log's own mutex. Decisions
//! take neither.

pub mod admin;

pub use admin::{ADMIN_DESCRIPTOR, AdminCode};

use crate::config::{ConfigStore, SyncOutcome};
use crate::hooks::{HookContext, HookFactory, HookRegistry};
use crate::metrics::UsageCounter;
use crate::models::{ConfigError, PackageSource, SystemApps};
use crate::relay::{CallRelay, CallTarget, Parcel, TransactError};
use crate::settings::ServiceSettings;
use crate::state::{ConfigLock, DataDir, DiagnosticLog};
use anyhow::{Context, Result};
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use thiserror::Error;

/// Version reported to the management app.
pub const SERVICE_VERSION: u32 = 91;

/// Errors returned by administrative operations.
#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("Service has been stopped")]
    Stopped,

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Diagnostic log error: {0}")]
    Log(#[from] io::Error),

    #[error("Failed to clean runtime environment: {0:#}")]
    Cleanup(anyhow::Error),
}

/// The running service.
pub struct HmaService {
    data_dir: DataDir,
    store: Arc<ConfigStore>,
    system_apps: Arc<SystemApps>,
    counter: Arc<UsageCounter>,
    log: Arc<DiagnosticLog>,
    config_lock: ConfigLock,
    hooks: Mutex<HookRegistry>,
    relay: CallRelay,
    stopped: AtomicBool,
}

impl HmaService {
    /// Bring the service up.
    ///
    /// 1. Locate the data dir and open the diagnostic log in it
    /// 2. Restore the usage counter and the persisted configuration
    /// 3. Capture the system-app set from `packages`
    /// 4. Install the hooks selected for `settings.platform_level`
    ///
    /// Missing or unusable persisted state falls back to defaults. Only storage
    /// that cannot be created at all is an error.
    pub fn start(
        settings: &ServiceSettings,
        log: Arc<DiagnosticLog>,
        packages: &dyn PackageSource,
        factory: &dyn HookFactory,
    ) -> Result<Arc<Self>> {
        let data_dir = DataDir::locate(
            &settings.storage_root,
            &settings.dir_prefix,
            &settings.legacy_dirs,
        )?;
        log.open(&data_dir.log_file(), &data_dir.old_log_file())
            .with_context(|| format!("Failed to open diagnostic log in {}", data_dir.log_dir()))?;
        tracing::info!("Data dir: {}", data_dir.root());

        let config_lock = ConfigLock::new();
        let counter = Arc::new(UsageCounter::new(
            data_dir.filter_count_file(),
            config_lock.clone(),
        ));
        counter.load();

        let store = Arc::new(ConfigStore::new(data_dir.config_file()));
        store.load();
        let config = store.snapshot();
        log.set_limits(config.max_log_size, config.detail_log);

        let system_apps = Arc::new(SystemApps::capture(packages));

        let service = Self {
            data_dir,
            store,
            system_apps,
            counter,
            log,
            config_lock,
            hooks: Mutex::new(HookRegistry::new()),
            relay: CallRelay::new(),
            stopped: AtomicBool::new(false),
        };

        {
            let _guard = service.config_lock.enter();
            service
                .hooks()
                .install(settings.platform_level, factory, &service.hook_context());
        }

        tracing::info!("HMA service initialized");
        Ok(Arc::new(service))
    }

    /// Handle passed to hook adapters.
    pub fn hook_context(&self) -> HookContext {
        HookContext::new(
            Arc::clone(&self.store),
            Arc::clone(&self.system_apps),
            Arc::clone(&self.counter),
        )
    }

    pub fn should_hide(&self, caller: Option<&str>, query: Option<&str>) -> bool {
        self.hook_context().should_hide(caller, query)
    }

    pub fn config_store(&self) -> &ConfigStore {
        &self.store
    }

    pub fn data_dir(&self) -> &DataDir {
        &self.data_dir
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    /// Persist and apply a configuration pushed by the management app.
    ///
    /// A rejected payload is reported as [`SyncOutcome::RestartRequired`]; it is
    /// still written to disk.
    pub fn sync_config(&self, json: &str) -> Result<SyncOutcome, ServiceError> {
        self.ensure_running()?;
        let outcome = {
            let _guard = self.config_lock.enter();
            let outcome = self.store.sync(json)?;
            if let SyncOutcome::Applied(config) = &outcome {
                self.log.set_limits(config.max_log_size, config.detail_log);
                self.hooks().notify_config_changed(config);
            }
            outcome
        };
        if outcome.is_applied() {
            tracing::debug!("Config synced");
        }
        Ok(outcome)
    }

    pub fn get_logs(&self) -> Result<String, ServiceError> {
        self.ensure_running()?;
        Ok(self.log.read()?)
    }

    pub fn clear_logs(&self) -> Result<(), ServiceError> {
        self.ensure_running()?;
        Ok(self.log.rotate()?)
    }

    pub fn filter_count(&self) -> u64 {
        self.counter.get()
    }

    pub fn service_version(&self) -> u32 {
        SERVICE_VERSION
    }

    /// Name of the installed primary hook variant.
    pub fn hook_type(&self) -> &'static str {
        self.hooks().hook_type()
    }

    /// Stop the service. Irreversible.
    ///
    /// Disables the diagnostic log, unloads every hook and, with `clean_env`,
    /// deletes the data dir. Calls after the first are no-ops.
    pub fn stop_service(&self, clean_env: bool) -> Result<(), ServiceError> {
        if self.stopped.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        tracing::info!("Stop service");
        self.log.set_available(false);

        let _guard = self.config_lock.enter();
        self.hooks().unload_all();
        if clean_env {
            tracing::info!("Clean runtime environment");
            self.data_dir.wipe().map_err(ServiceError::Cleanup)?;
        }
        Ok(())
    }

    /// Entry point for calls on the service's remote-call surface.
    ///
    /// Wrapped calls go to the [`CallRelay`]; everything else to the admin
    /// dispatcher. Returns `Ok(false)` for unknown codes and after stop.
    pub fn on_transact(
        &self,
        code: u32,
        data: &mut Parcel,
        reply: Option<&mut Parcel>,
        flags: u32,
    ) -> Result<bool, TransactError> {
        if self.is_stopped() {
            return Ok(false);
        }
        if self.relay.handles(code) {
            return self.relay.relay(data, reply);
        }
        admin::dispatch(self, code, data, reply, flags)
    }

    fn ensure_running(&self) -> Result<(), ServiceError> {
        if self.is_stopped() {
            return Err(ServiceError::Stopped);
        }
        Ok(())
    }

    fn hooks(&self) -> MutexGuard<'_, HookRegistry> {
        self.hooks.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl CallTarget for HmaService {
    fn transact(
        &self,
        code: u32,
        data: &mut Parcel,
        reply: Option<&mut Parcel>,
        flags: u32,
    ) -> Result<bool, TransactError> {
        self.on_transact(code, data, reply, flags)
    }

    fn describe(&self) -> String {
        "HMAService".to_string()
    }
}

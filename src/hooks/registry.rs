use super::{FrameworkHook, HookContext, HookFactory, HookKind, select_hooks};
use crate::models::HideConfig;

/// Lifecycle of one adapter. `Uninstalled` after `Installed` is terminal:
/// unloaded adapters are dropped from the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookState {
    Uninstalled,
    Installed,
}

struct Entry {
    kind: HookKind,
    hook: Box<dyn FrameworkHook>,
    state: HookState,
}

/// Owns the active adapters.
///
/// Not synchronized itself: the service keeps it behind a mutex and only
/// touches it while inside the [`ConfigLock`](crate::state::ConfigLock).
#[derive(Default)]
pub struct HookRegistry {
    entries: Vec<Entry>,
    primary: Option<HookKind>,
}

impl HookRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create and load the adapters selected for `level`.
    ///
    /// Every adapter is loaded independently. One that fails to load is still
    /// kept so that [`unload_all`](Self::unload_all) reaches it.
    pub fn install(&mut self, level: u32, factory: &dyn HookFactory, context: &HookContext) {
        for kind in select_hooks(level) {
            let hook = factory.create(kind, context.clone());
            let state = match hook.load() {
                Ok(()) => {
                    tracing::info!("Hook {} loaded", hook.name());
                    HookState::Installed
                }
                Err(e) => {
                    tracing::error!("{}", e);
                    HookState::Uninstalled
                }
            };
            if kind.is_primary() {
                self.primary = Some(kind);
            }
            self.entries.push(Entry { kind, hook, state });
        }
        tracing::info!("Hooks installed");
    }

    /// Tell every adapter that `config` is now active.
    pub fn notify_config_changed(&self, config: &HideConfig) {
        for entry in &self.entries {
            entry.hook.on_config_changed(config);
        }
    }

    /// Unload every adapter and forget them.
    pub fn unload_all(&mut self) {
        for entry in self.entries.drain(..) {
            entry.hook.unload();
            tracing::info!("Hook {} unloaded", entry.hook.name());
        }
    }

    /// Name of the selected primary variant, or `"unknown"` before install.
    pub fn hook_type(&self) -> &'static str {
        self.primary.map_or("unknown", HookKind::name)
    }

    pub fn kinds(&self) -> Vec<HookKind> {
        self.entries.iter().map(|e| e.kind).collect()
    }

    pub fn state_of(&self, kind: HookKind) -> Option<HookState> {
        self.entries.iter().find(|e| e.kind == kind).map(|e| e.state)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConfigStore;
    use crate::hooks::HookError;
    use crate::metrics::UsageCounter;
    use crate::models::SystemApps;
    use crate::state::ConfigLock;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    #[derive(Default)]
    struct Calls {
        loads: AtomicUsize,
        unloads: AtomicUsize,
        notifies: AtomicUsize,
    }

    struct CountingHook {
        name: &'static str,
        fail: bool,
        calls: Arc<Calls>,
    }

    impl FrameworkHook for CountingHook {
        fn name(&self) -> &'static str {
            self.name
        }

        fn load(&self) -> Result<(), HookError> {
            self.calls.loads.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(HookError::InstallFailed {
                    hook: self.name,
                    reason: "symbol not found".to_string(),
                });
            }
            Ok(())
        }

        fn unload(&self) {
            self.calls.unloads.fetch_add(1, Ordering::SeqCst);
        }

        fn on_config_changed(&self, _config: &HideConfig) {
            self.calls.notifies.fetch_add(1, Ordering::SeqCst);
        }
    }

    struct CountingFactory {
        calls: Arc<Calls>,
        failing: Option<HookKind>,
        created: Mutex<Vec<HookKind>>,
    }

    impl HookFactory for CountingFactory {
        fn create(&self, kind: HookKind, _context: HookContext) -> Box<dyn FrameworkHook> {
            self.created.lock().unwrap().push(kind);
            Box::new(CountingHook {
                name: kind.name(),
                fail: self.failing == Some(kind),
                calls: self.calls.clone(),
            })
        }
    }

    fn context() -> (tempfile::TempDir, HookContext) {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let dir = camino::Utf8PathBuf::try_from(temp_dir.path().to_path_buf()).unwrap();
        let ctx = HookContext::new(
            Arc::new(ConfigStore::new(dir.join("config.json"))),
            Arc::new(SystemApps::default()),
            Arc::new(UsageCounter::new(dir.join("filter_count"), ConfigLock::new())),
        );
        (temp_dir, ctx)
    }

    fn factory(failing: Option<HookKind>) -> CountingFactory {
        CountingFactory {
            calls: Arc::new(Calls::default()),
            failing,
            created: Mutex::new(Vec::new()),
        }
    }

    #[test]
    fn test_install_loads_selected_hooks() {
        let (_temp_dir, ctx) = context();
        let factory = factory(None);
        let mut registry = HookRegistry::new();
        assert_eq!(registry.hook_type(), "unknown");

        registry.install(33, &factory, &ctx);

        assert_eq!(registry.kinds(), vec![HookKind::PmsTarget33, HookKind::ZygoteArgs]);
        assert_eq!(factory.calls.loads.load(Ordering::SeqCst), 2);
        assert_eq!(registry.hook_type(), "PmsHookTarget33");
        assert_eq!(registry.state_of(HookKind::ZygoteArgs), Some(HookState::Installed));
    }

    #[test]
    fn test_failed_load_does_not_block_others() {
        let (_temp_dir, ctx) = context();
        let factory = factory(Some(HookKind::PmsTarget30));
        let mut registry = HookRegistry::new();

        registry.install(30, &factory, &ctx);

        assert_eq!(registry.len(), 2);
        assert_eq!(registry.state_of(HookKind::PmsTarget30), Some(HookState::Uninstalled));
        assert_eq!(registry.state_of(HookKind::ZygoteArgs), Some(HookState::Installed));

        // Failed adapters are still unloaded.
        registry.unload_all();
        assert_eq!(factory.calls.unloads.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_notify_and_unload_all() {
        let (_temp_dir, ctx) = context();
        let factory = factory(None);
        let mut registry = HookRegistry::new();
        registry.install(28, &factory, &ctx);

        registry.notify_config_changed(&HideConfig::default());
        registry.notify_config_changed(&HideConfig::default());
        assert_eq!(factory.calls.notifies.load(Ordering::SeqCst), 2);

        registry.unload_all();
        assert!(registry.is_empty());
        assert_eq!(factory.calls.unloads.load(Ordering::SeqCst), 1);

        // Nothing left to notify.
        registry.notify_config_changed(&HideConfig::default());
        assert_eq!(factory.calls.notifies.load(Ordering::SeqCst), 2);
    }
}

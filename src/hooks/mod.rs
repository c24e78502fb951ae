//! Interception hooks.
//!
//! The platform-specific adapters live outside this crate. They implement
//! [`FrameworkHook`], are built by a [`HookFactory`] supplied by the embedding
//! process, and are driven by the [`HookRegistry`]. Each adapter receives a
//! [`HookContext`], the handle through which it asks for decisions and records
//! filtered queries.
//!
//! # Selection
//!
//! Exactly one primary adapter is chosen by platform capability level (the
//! highest variant the platform supports), plus [`HookKind::ZygoteArgs`] when
//! the level is at least [`SECONDARY_MIN_LEVEL`]:
//!
//! | level   | adapters                      |
//! |---------|-------------------------------|
//! | ≥ 33    | `PmsTarget33`, `ZygoteArgs`   |
//! | 30..=32 | `PmsTarget30`, `ZygoteArgs`   |
//! | 28..=29 | `PmsTarget28`                 |
//! | < 28    | `PmsLegacy`                   |

pub mod registry;

pub use registry::{HookRegistry, HookState};

use crate::config::ConfigStore;
use crate::metrics::UsageCounter;
use crate::models::{HideConfig, SystemApps};
use crate::policy::{self, Decision};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Minimum capability level for the secondary adapter.
pub const SECONDARY_MIN_LEVEL: u32 = 30;

/// Errors reported by an adapter's `load`.
#[derive(Error, Debug)]
pub enum HookError {
    #[error("Failed to install {hook}: {reason}")]
    InstallFailed { hook: &'static str, reason: String },
}

/// The fixed family of adapter variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HookKind {
    PmsTarget33,
    PmsTarget30,
    PmsTarget28,
    PmsLegacy,
    ZygoteArgs,
}

impl HookKind {
    /// Primary variants, highest capability first.
    pub const PRIMARY: [HookKind; 4] = [
        HookKind::PmsTarget33,
        HookKind::PmsTarget30,
        HookKind::PmsTarget28,
        HookKind::PmsLegacy,
    ];

    /// Lowest platform level on which this variant can be installed.
    pub fn min_level(self) -> u32 {
        match self {
            HookKind::PmsTarget33 => 33,
            HookKind::PmsTarget30 => 30,
            HookKind::PmsTarget28 => 28,
            HookKind::PmsLegacy => 0,
            HookKind::ZygoteArgs => SECONDARY_MIN_LEVEL,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            HookKind::PmsTarget33 => "PmsHookTarget33",
            HookKind::PmsTarget30 => "PmsHookTarget30",
            HookKind::PmsTarget28 => "PmsHookTarget28",
            HookKind::PmsLegacy => "PmsHookLegacy",
            HookKind::ZygoteArgs => "ZygoteArgsHook",
        }
    }

    pub fn is_primary(self) -> bool {
        self != HookKind::ZygoteArgs
    }
}

impl fmt::Display for HookKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Adapters to install on a platform at capability `level`, primary first.
pub fn select_hooks(level: u32) -> Vec<HookKind> {
    let primary = HookKind::PRIMARY
        .into_iter()
        .find(|kind| level >= kind.min_level())
        .unwrap_or(HookKind::PmsLegacy);

    let mut kinds = vec![primary];
    if level >= HookKind::ZygoteArgs.min_level() {
        kinds.push(HookKind::ZygoteArgs);
    }
    kinds
}

/// One installed interception point.
pub trait FrameworkHook: Send + Sync {
    fn name(&self) -> &'static str;

    /// Install the interception.
    fn load(&self) -> Result<(), HookError>;

    /// Remove the interception. Must be safe even if `load` failed or never ran.
    fn unload(&self);

    /// Best-effort notification that a new configuration is active.
    fn on_config_changed(&self, _config: &HideConfig) {}
}

/// Builds the platform adapter for a [`HookKind`].
pub trait HookFactory {
    fn create(&self, kind: HookKind, context: HookContext) -> Box<dyn FrameworkHook>;
}

/// Service handle given to adapters.
///
/// Cheap to clone. Decisions read the current configuration snapshot and the
/// frozen system-app set without taking the configuration lock.
#[derive(Clone)]
pub struct HookContext {
    store: Arc<ConfigStore>,
    system_apps: Arc<SystemApps>,
    counter: Arc<UsageCounter>,
}

impl HookContext {
    pub fn new(
        store: Arc<ConfigStore>,
        system_apps: Arc<SystemApps>,
        counter: Arc<UsageCounter>,
    ) -> Self {
        Self {
            store,
            system_apps,
            counter,
        }
    }

    /// Full decision for `query` as seen by `caller`.
    pub fn decide(&self, caller: Option<&str>, query: Option<&str>) -> Decision {
        let config = self.store.snapshot();
        let decision = policy::decide(caller, query, &config, &self.system_apps);
        tracing::debug!(
            "{} -> {}: {}",
            caller.unwrap_or("?"),
            query.unwrap_or("?"),
            decision
        );
        decision
    }

    pub fn should_hide(&self, caller: Option<&str>, query: Option<&str>) -> bool {
        self.decide(caller, query).hidden
    }

    /// Whether any rule applies to `package` as a caller.
    pub fn is_hook_enabled(&self, package: &str) -> bool {
        self.store.snapshot().is_hook_enabled(package)
    }

    /// Count one filtered query. Returns the new total.
    pub fn record_filtered(&self) -> u64 {
        self.counter.increment()
    }

    pub fn config(&self) -> Arc<HideConfig> {
        self.store.snapshot()
    }

    pub fn system_apps(&self) -> &SystemApps {
        &self.system_apps
    }
}

impl fmt::Debug for HookContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HookContext")
            .field("config", &self.store.path())
            .field("system_apps", &self.system_apps.len())
            .field("filter_count", &self.counter.get())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_select_hooks_by_level() {
        assert_eq!(
            select_hooks(34),
            vec![HookKind::PmsTarget33, HookKind::ZygoteArgs]
        );
        assert_eq!(
            select_hooks(33),
            vec![HookKind::PmsTarget33, HookKind::ZygoteArgs]
        );
        assert_eq!(
            select_hooks(31),
            vec![HookKind::PmsTarget30, HookKind::ZygoteArgs]
        );
        assert_eq!(select_hooks(29), vec![HookKind::PmsTarget28]);
        assert_eq!(select_hooks(28), vec![HookKind::PmsTarget28]);
        assert_eq!(select_hooks(27), vec![HookKind::PmsLegacy]);
        assert_eq!(select_hooks(0), vec![HookKind::PmsLegacy]);
    }

    #[test]
    fn test_exactly_one_primary_selected() {
        for level in 0..40 {
            let primaries = select_hooks(level)
                .into_iter()
                .filter(|kind| kind.is_primary())
                .count();
            assert_eq!(primaries, 1, "level {}", level);
        }
    }

    #[test]
    fn test_kind_names() {
        assert_eq!(HookKind::PmsTarget33.to_string(), "PmsHookTarget33");
        assert_eq!(HookKind::ZygoteArgs.name(), "ZygoteArgsHook");
    }
}

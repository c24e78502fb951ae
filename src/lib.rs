// HMA service - app visibility decision service
//
// This library runs inside a privileged host process. It decides, for every
// intercepted query, whether one app may see another, keeps the policy
// configuration hot-reloadable, and relays wrapped calls on behalf of callers.

pub mod config;
pub mod hooks;
pub mod logging;
pub mod metrics;
pub mod models;
pub mod policy;
pub mod relay;
pub mod services;
pub mod settings;
pub mod state;

// Re-export commonly used types for convenience
pub use config::{ConfigEvent, ConfigStore, LoadOutcome, SyncOutcome, SyncRejection};
pub use hooks::{FrameworkHook, HookContext, HookError, HookFactory, HookKind, HookRegistry};
pub use metrics::UsageCounter;
pub use models::{AppConfig, CONFIG_VERSION, HideConfig, PackageInfo, PackageSource, SystemApps, Template};
pub use policy::{Decision, Reason, decide, should_hide};
pub use relay::{CallRelay, CallTarget, Parcel, TransactError};
pub use services::{HmaService, SERVICE_VERSION, ServiceError};
pub use settings::ServiceSettings;
pub use state::{ConfigLock, DataDir, DiagnosticLog};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Crate name
pub const APP_NAME: &str = env!("CARGO_PKG_NAME");

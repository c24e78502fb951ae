//! Data models for the visibility service.
//!
//! - [`HideConfig`]: the versioned policy document (`config.json`), holding the
//!   per-caller [`AppConfig`] rules and the shared [`Template`] lists
//! - [`SystemApps`]: the frozen set of platform-provided packages captured from a
//!   [`PackageSource`] at startup
//!
//! All config structs derive `Serialize`/`Deserialize` with camelCase keys so
//! the document written by the management app is read back unchanged.

pub mod config;
pub mod system_apps;

pub use config::{
    AppConfig, CONFIG_VERSION, ConfigError, DEFAULT_MAX_LOG_SIZE_KIB, HideConfig, Template,
};
pub use system_apps::{FLAG_SYSTEM, PackageInfo, PackageSource, SystemApps};

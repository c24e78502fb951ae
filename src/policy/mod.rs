//! Visibility decision engine.
//!
//! [`decide`] is a pure function over a configuration snapshot and the frozen
//! system-app set. It takes no locks and performs no I/O, so hook adapters can
//! call it on every intercepted query.

use crate::models::{HideConfig, SystemApps};
use std::fmt;

/// Package name of the controlling (management) application.
pub const APP_PACKAGE_NAME: &str = "com.tsng.hidemyapplist";

pub const GMS_PACKAGE_NAME: &str = "com.google.android.gms";
pub const GSF_PACKAGE_NAME: &str = "com.google.android.gsf";

/// Identifiers that are never filtered, as caller or as query.
pub const PROTECTED_PACKAGES: &[&str] = &[
    "android",
    "android.media",
    "android.uid.system",
    "android.uid.shell",
    "android.uid.systemui",
    "com.android.permissioncontroller",
    "com.android.providers.downloads",
    "com.android.providers.downloads.ui",
    "com.android.providers.media",
    "com.android.providers.media.module",
    "com.android.providers.settings",
    "com.google.android.webview",
    "com.google.android.providers.media.module",
    APP_PACKAGE_NAME,
];

pub fn is_protected(package: &str) -> bool {
    PROTECTED_PACKAGES.contains(&package)
}

/// Why a [`Decision`] came out the way it did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reason {
    /// Caller or query missing.
    Unknown,
    Protected,
    /// Play services must keep seeing the management app.
    PlatformExemption,
    OutOfScope,
    SystemApp,
    ExtraList,
    Template(String),
    Default,
}

/// Result of one visibility check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decision {
    pub hidden: bool,
    pub reason: Reason,
}

impl Decision {
    fn visible(reason: Reason) -> Self {
        Self {
            hidden: false,
            reason,
        }
    }
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let verdict = if self.hidden { "hidden" } else { "visible" };
        match &self.reason {
            Reason::Unknown => write!(f, "{verdict} (unknown caller or query)"),
            Reason::Protected => write!(f, "{verdict} (protected package)"),
            Reason::PlatformExemption => write!(f, "{verdict} (platform exemption)"),
            Reason::OutOfScope => write!(f, "{verdict} (caller not in scope)"),
            Reason::SystemApp => write!(f, "{verdict} (system app excluded)"),
            Reason::ExtraList => write!(f, "{verdict} (extra app list)"),
            Reason::Template(name) => write!(f, "{verdict} (template {name})"),
            Reason::Default => write!(f, "{verdict} (mode default)"),
        }
    }
}

/// Decide whether `query` is hidden from `caller`.
pub fn decide(
    caller: Option<&str>,
    query: Option<&str>,
    config: &HideConfig,
    system_apps: &SystemApps,
) -> Decision {
    let (caller, query) = match (caller, query) {
        (Some(c), Some(q)) if !c.is_empty() && !q.is_empty() => (c, q),
        _ => return Decision::visible(Reason::Unknown),
    };

    if is_protected(caller) || is_protected(query) {
        return Decision::visible(Reason::Protected);
    }

    // Hiding the management app from Play services makes it crash.
    if (caller == GMS_PACKAGE_NAME || caller == GSF_PACKAGE_NAME) && query == APP_PACKAGE_NAME {
        return Decision::visible(Reason::PlatformExemption);
    }

    let Some(app) = config.scope.get(caller) else {
        return Decision::visible(Reason::OutOfScope);
    };

    if app.use_whitelist && app.exclude_system_apps && system_apps.contains(query) {
        return Decision::visible(Reason::SystemApp);
    }

    if app.extra_app_list.contains(query) {
        return Decision {
            hidden: !app.use_whitelist,
            reason: Reason::ExtraList,
        };
    }

    for name in &app.apply_templates {
        let listed = config
            .templates
            .get(name)
            .is_some_and(|tpl| tpl.app_list.contains(query));
        if listed {
            return Decision {
                hidden: !app.use_whitelist,
                reason: Reason::Template(name.clone()),
            };
        }
    }

    Decision {
        hidden: app.use_whitelist,
        reason: Reason::Default,
    }
}

/// Shorthand for `decide(..).hidden`.
pub fn should_hide(
    caller: Option<&str>,
    query: Option<&str>,
    config: &HideConfig,
    system_apps: &SystemApps,
) -> bool {
    decide(caller, query, config, system_apps).hidden
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AppConfig, Template};

    fn config_with(caller: &str, app: AppConfig) -> HideConfig {
        let mut config = HideConfig::default();
        config.scope.insert(caller.to_string(), app);
        config
    }

    fn listing(use_whitelist: bool, apps: &[&str]) -> AppConfig {
        AppConfig {
            use_whitelist,
            exclude_system_apps: false,
            extra_app_list: apps.iter().map(|s| s.to_string()).collect(),
            ..AppConfig::default()
        }
    }

    #[test]
    fn test_blacklisted_query_is_hidden() {
        let config = config_with("com.app.a", listing(false, &["com.app.b"]));
        let d = decide(Some("com.app.a"), Some("com.app.b"), &config, &SystemApps::default());
        assert_eq!(
            d,
            Decision {
                hidden: true,
                reason: Reason::ExtraList
            }
        );
    }

    #[test]
    fn test_whitelisted_query_is_visible() {
        let config = config_with("com.app.a", listing(true, &["com.app.b"]));
        assert!(!should_hide(
            Some("com.app.a"),
            Some("com.app.b"),
            &config,
            &SystemApps::default()
        ));
    }

    #[test]
    fn test_caller_out_of_scope_is_never_filtered() {
        let config = config_with("com.app.a", listing(true, &[]));
        let d = decide(Some("com.app.x"), Some("com.app.b"), &config, &SystemApps::default());
        assert!(!d.hidden);
        assert_eq!(d.reason, Reason::OutOfScope);
    }

    #[test]
    fn test_missing_or_empty_identifiers() {
        let config = config_with("com.app.a", listing(true, &[]));
        let apps = SystemApps::default();
        assert!(!should_hide(None, Some("com.app.b"), &config, &apps));
        assert!(!should_hide(Some("com.app.a"), None, &config, &apps));
        assert!(!should_hide(Some("com.app.a"), Some(""), &config, &apps));
    }

    #[test]
    fn test_protected_packages_bypass_policy() {
        let config = config_with("com.app.a", listing(true, &[]));
        let apps = SystemApps::default();
        let d = decide(Some("com.app.a"), Some("android"), &config, &apps);
        assert_eq!(d.reason, Reason::Protected);
        assert!(!should_hide(Some("com.app.a"), Some(APP_PACKAGE_NAME), &config, &apps));
    }

    #[test]
    fn test_play_services_always_see_management_app() {
        let mut config = config_with(GMS_PACKAGE_NAME, listing(true, &[]));
        config
            .scope
            .insert(GSF_PACKAGE_NAME.to_string(), listing(true, &[]));
        let apps = SystemApps::default();

        for caller in [GMS_PACKAGE_NAME, GSF_PACKAGE_NAME] {
            let d = decide(Some(caller), Some(APP_PACKAGE_NAME), &config, &apps);
            assert!(!d.hidden);
        }
        // Other queries from GMS are still filtered.
        assert!(should_hide(Some(GMS_PACKAGE_NAME), Some("com.app.b"), &config, &apps));
    }

    #[test]
    fn test_system_app_carve_out_precedes_lists() {
        let mut app = listing(true, &[]);
        app.exclude_system_apps = true;
        let config = config_with("com.app.a", app);
        let apps: SystemApps = ["com.android.phone"].into_iter().collect();

        let d = decide(Some("com.app.a"), Some("com.android.phone"), &config, &apps);
        assert_eq!(d.reason, Reason::SystemApp);
        assert!(!d.hidden);
    }

    #[test]
    fn test_system_app_carve_out_ignored_in_blacklist_mode() {
        let mut app = listing(false, &["com.android.phone"]);
        app.exclude_system_apps = true;
        let config = config_with("com.app.a", app);
        let apps: SystemApps = ["com.android.phone"].into_iter().collect();

        assert!(should_hide(Some("com.app.a"), Some("com.android.phone"), &config, &apps));
    }

    #[test]
    fn test_template_membership() {
        let mut app = listing(false, &[]);
        app.apply_templates.insert("missing".to_string());
        app.apply_templates.insert("banks".to_string());
        let mut config = config_with("com.app.a", app);
        config.templates.insert(
            "banks".to_string(),
            Template {
                is_whitelist: false,
                app_list: ["com.bank.one".to_string()].into_iter().collect(),
            },
        );
        let apps = SystemApps::default();

        let d = decide(Some("com.app.a"), Some("com.bank.one"), &config, &apps);
        assert!(d.hidden);
        assert_eq!(d.reason, Reason::Template("banks".to_string()));
        assert!(!should_hide(Some("com.app.a"), Some("com.bank.two"), &config, &apps));
    }

    #[test]
    fn test_mode_defaults() {
        let apps = SystemApps::default();
        let black = config_with("com.app.a", listing(false, &[]));
        let white = config_with("com.app.a", listing(true, &[]));

        assert!(!should_hide(Some("com.app.a"), Some("com.app.q"), &black, &apps));
        assert!(should_hide(Some("com.app.a"), Some("com.app.q"), &white, &apps));
    }

    #[test]
    fn test_decision_display() {
        let d = Decision {
            hidden: true,
            reason: Reason::Template("banks".to_string()),
        };
        assert_eq!(d.to_string(), "hidden (template banks)");
    }
}

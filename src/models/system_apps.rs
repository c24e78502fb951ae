use std::collections::HashSet;

/// Application flag marking a platform-provided package.
pub const FLAG_SYSTEM: u32 = 1;

/// Minimal view of an installed package, as reported by the platform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageInfo {
    pub name: String,
    pub flags: u32,
}

impl PackageInfo {
    pub fn new(name: impl Into<String>, flags: u32) -> Self {
        Self {
            name: name.into(),
            flags,
        }
    }

    pub fn is_system(&self) -> bool {
        self.flags & FLAG_SYSTEM != 0
    }
}

/// Enumerates installed packages. Implemented by the embedding process.
pub trait PackageSource: Send + Sync {
    fn installed_packages(&self) -> anyhow::Result<Vec<PackageInfo>>;
}

/// Frozen set of platform-provided package names.
///
/// Built once at startup and shared behind an `Arc`; there is no mutating API.
#[derive(Debug, Clone, Default)]
pub struct SystemApps {
    packages: HashSet<String>,
}

impl SystemApps {
    /// Capture the system packages from `source`.
    ///
    /// Enumeration failure is not fatal: the service then runs with an empty
    /// set, which only weakens the whitelist carve-out.
    pub fn capture(source: &dyn PackageSource) -> Self {
        match source.installed_packages() {
            Ok(packages) => {
                let apps: Self = packages
                    .into_iter()
                    .filter(PackageInfo::is_system)
                    .map(|p| p.name)
                    .collect();
                tracing::info!("Captured {} system apps", apps.len());
                apps
            }
            Err(e) => {
                tracing::error!("Failed to enumerate installed packages: {:#}", e);
                Self::default()
            }
        }
    }

    pub fn contains(&self, package: &str) -> bool {
        self.packages.contains(package)
    }

    pub fn len(&self) -> usize {
        self.packages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.packages.is_empty()
    }
}

impl<S: Into<String>> FromIterator<S> for SystemApps {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self {
            packages: iter.into_iter().map(Into::into).collect(),
        }
    }
}

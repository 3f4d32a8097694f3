//! Caller classification.
//!
//! Maps the platform-reported caller uid to a [`CallerClass`]. The class is
//! attached to every log line of a request and decides whether the caller
//! may receive look-ahead (previous-utterance) audio.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use crate::error::TtsError;

pub const ROOT_UID: u32 = 0;
pub const SYSTEM_UID: u32 = 1000;
/// Uids below this belong to the operating system and its services.
pub const FIRST_APPLICATION_UID: u32 = 10_000;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CallerClass {
    System,
    Root,
    SystemService,
    /// An ordinary application, by package name (or `uid_<uid>` when unknown).
    Package(String),
    Unknown,
}

impl CallerClass {
    /// Privileged callers must hear exactly what they asked for.
    pub fn is_privileged(&self) -> bool {
        matches!(
            self,
            CallerClass::System | CallerClass::Root | CallerClass::SystemService
        )
    }

    pub fn label(&self) -> &str {
        match self {
            CallerClass::System => "system",
            CallerClass::Root => "root",
            CallerClass::SystemService => "system_service",
            CallerClass::Package(name) => name,
            CallerClass::Unknown => "unknown",
        }
    }
}

impl fmt::Display for CallerClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Resolves application uids to package names.
pub trait PackageResolver: Send + Sync {
    fn package_for_uid(&self, uid: u32) -> Option<String>;
}

/// Resolver for hosts with no package registry.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoPackages;

impl PackageResolver for NoPackages {
    fn package_for_uid(&self, _uid: u32) -> Option<String> {
        None
    }
}

/// Fixed uid -> package table, parsed from `uid=name,uid=name`.
#[derive(Debug, Default, Clone)]
pub struct StaticPackages {
    names: HashMap<u32, String>,
}

impl StaticPackages {
    pub fn new(names: HashMap<u32, String>) -> Self {
        Self { names }
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

impl PackageResolver for StaticPackages {
    fn package_for_uid(&self, uid: u32) -> Option<String> {
        self.names.get(&uid).cloned()
    }
}

impl FromStr for StaticPackages {
    type Err = TtsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut names = HashMap::new();
        for entry in s.split(',').map(str::trim).filter(|e| !e.is_empty()) {
            let (uid, name) = entry
                .split_once('=')
                .ok_or_else(|| TtsError::Settings(format!("expected uid=name, got '{entry}'")))?;
            let uid: u32 = uid
                .trim()
                .parse()
                .map_err(|_| TtsError::Settings(format!("invalid uid in '{entry}'")))?;
            names.insert(uid, name.trim().to_string());
        }
        Ok(Self { names })
    }
}

/// Classify a caller by uid. Pure apart from the package lookup.
pub fn classify(uid: Option<u32>, resolver: &dyn PackageResolver) -> CallerClass {
    match uid {
        None => CallerClass::Unknown,
        Some(SYSTEM_UID) => CallerClass::System,
        Some(ROOT_UID) => CallerClass::Root,
        Some(uid) if uid < FIRST_APPLICATION_UID => CallerClass::SystemService,
        Some(uid) => CallerClass::Package(
            resolver
                .package_for_uid(uid)
                .unwrap_or_else(|| format!("uid_{uid}")),
        ),
    }
}

use anyhow::{Context, Result};
use std::collections::HashMap;
use std::fs::{self, File};
use std::path::{Path, PathBuf};

use crate::config::SshConfig;

pub const PREF_PRIVATE_KEY: &str = "gerrit.private_key";
pub const PREF_USERNAME: &str = "gerrit.username";

/// Identity file plus login name for one SSH session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credential {
    pub identity_file: PathBuf,
    pub username: String,
}

impl Credential {
    pub fn new(identity_file: impl Into<PathBuf>, username: impl Into<String>) -> Self {
        Self {
            identity_file: identity_file.into(),
            username: username.into(),
        }
    }

    /// Both fields set and the identity file is a readable regular file.
    pub fn is_valid(&self) -> bool {
        !self.username.is_empty()
            && !self.identity_file.as_os_str().is_empty()
            && is_readable_file(&self.identity_file)
    }
}

fn is_readable_file(path: &Path) -> bool {
    path.is_file() && File::open(path).is_ok()
}

/// Caller-scoped key/value preferences.
pub trait PreferenceStore {
    fn get_string(&self, key: &str) -> Result<Option<String>>;
}

#[derive(Debug, Clone, Default)]
pub struct MemoryPreferences {
    values: HashMap<String, String>,
}

impl MemoryPreferences {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: &str, value: impl Into<String>) -> Self {
        self.values.insert(key.to_string(), value.into());
        self
    }
}

impl PreferenceStore for MemoryPreferences {
    fn get_string(&self, key: &str) -> Result<Option<String>> {
        Ok(self.values.get(key).cloned())
    }
}

/// Preferences backed by a TOML file. Dotted keys walk nested tables, so
/// `gerrit.username` reads `username` under `[gerrit]`.
#[derive(Debug, Clone)]
pub struct TomlPreferences {
    table: toml::Table,
}

impl TomlPreferences {
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read preferences {}", path.display()))?;
        Self::parse(&content)
            .with_context(|| format!("Failed to parse preferences {}", path.display()))
    }

    pub fn parse(content: &str) -> Result<Self> {
        let table: toml::Table = toml::from_str(content)?;
        Ok(Self { table })
    }
}

impl PreferenceStore for TomlPreferences {
    fn get_string(&self, key: &str) -> Result<Option<String>> {
        let mut parts = key.split('.').peekable();
        let mut table = &self.table;
        while let Some(part) = parts.next() {
            let Some(value) = table.get(part) else {
                return Ok(None);
            };
            if parts.peek().is_none() {
                return match value {
                    toml::Value::String(s) => Ok(Some(s.clone())),
                    other => anyhow::bail!("preference '{}' is not a string: {}", key, other),
                };
            }
            table = value
                .as_table()
                .with_context(|| format!("preference '{}' crosses a non-table value", key))?;
        }
        Ok(None)
    }
}

/// Which source a resolved credential came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolvedCredential {
    PerCaller(Credential),
    Default(Credential),
}

impl ResolvedCredential {
    pub fn credential(&self) -> &Credential {
        match self {
            Self::PerCaller(c) | Self::Default(c) => c,
        }
    }

    pub fn into_credential(self) -> Credential {
        match self {
            Self::PerCaller(c) | Self::Default(c) => c,
        }
    }

    pub fn is_per_caller(&self) -> bool {
        matches!(self, Self::PerCaller(_))
    }
}

/// Read the per-caller credential. `Ok(None)` when fields are missing or the
/// identity file is unusable; `Err` only when the store itself fails.
pub fn per_caller_credential(store: &dyn PreferenceStore) -> Result<Option<Credential>> {
    let private_key = store.get_string(PREF_PRIVATE_KEY)?;
    let username = store.get_string(PREF_USERNAME)?;

    let (Some(private_key), Some(username)) = (private_key, username) else {
        return Ok(None);
    };
    let credential = Credential::new(private_key, username);
    Ok(credential.is_valid().then_some(credential))
}

/// Pick the credential for a dispatch: per-caller first, system default otherwise.
///
/// Never fails. Anything wrong with the per-caller preferences means "no
/// per-caller credential".
pub fn resolve_credential(
    store: Option<&dyn PreferenceStore>,
    defaults: &SshConfig,
) -> ResolvedCredential {
    if let Some(store) = store {
        match per_caller_credential(store) {
            Ok(Some(credential)) => {
                tracing::debug!(
                    username = %credential.username,
                    identity_file = %credential.identity_file.display(),
                    "using per-user credential"
                );
                return ResolvedCredential::PerCaller(credential);
            }
            Ok(None) => tracing::debug!("no usable per-user credential"),
            Err(e) => tracing::debug!(error = %e, "failed to read per-user credential"),
        }
    }

    let credential = Credential::new(defaults.private_key.clone(), defaults.username.clone());
    if !credential.is_valid() {
        tracing::warn!(
            username = %credential.username,
            identity_file = %credential.identity_file.display(),
            "default credential is incomplete or unreadable"
        );
    }
    ResolvedCredential::Default(credential)
}

//! Secret resolution.
//!
//! Configuration only names secrets (connection strings, hash salt, backup
//! key); a [`SecretProvider`] resolves those names to values at runtime.

use std::collections::HashMap;
use std::fmt;

use secrecy::SecretString;

use crate::error::{Result, SyncError};

/// Resolve secret values by name.
pub trait SecretProvider: Send + Sync {
    /// Look up a secret, failing with a configuration error if it is absent.
    fn get(&self, name: &str) -> Result<SecretString>;
}

/// Secrets read from the process environment.
#[derive(Debug, Default, Clone, Copy)]
pub struct EnvSecrets;

impl SecretProvider for EnvSecrets {
    fn get(&self, name: &str) -> Result<SecretString> {
        match std::env::var(name) {
            Ok(value) if !value.is_empty() => Ok(SecretString::from(value)),
            _ => Err(SyncError::Config(format!(
                "secret '{}' is not set in the environment",
                name
            ))),
        }
    }
}

/// Secrets held in memory, for embedding and tests.
#[derive(Default, Clone)]
pub struct StaticSecrets {
    values: HashMap<String, String>,
}

impl StaticSecrets {
    /// Create an empty provider.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a secret.
    pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.values.insert(name.into(), value.into());
        self
    }
}

impl fmt::Debug for StaticSecrets {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<&String> = self.values.keys().collect();
        names.sort();
        f.debug_struct("StaticSecrets")
            .field("names", &names)
            .finish()
    }
}

impl SecretProvider for StaticSecrets {
    fn get(&self, name: &str) -> Result<SecretString> {
        self.values
            .get(name)
            .map(|v| SecretString::from(v.clone()))
            .ok_or_else(|| SyncError::Config(format!("secret '{}' is not configured", name)))
    }
}

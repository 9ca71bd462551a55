//! Runtime secret resolution.
//!
//! Config stores only env var NAMES (e.g. `database.url_env: PKD_DATABASE_URL`).
//! Values are read here, once, at startup. Error messages reference the NAME,
//! never the value, and `Debug` output is redacted.

use anyhow::{bail, Result};

use crate::EngineConfig;

#[derive(Clone)]
pub struct DatabaseUrl(String);

impl DatabaseUrl {
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for DatabaseUrl {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("DatabaseUrl(<REDACTED>)")
    }
}

/// Resolve a named environment variable.
/// Returns `None` if the variable is unset or its value is blank.
fn resolve_env(var_name: &str) -> Option<String> {
    match std::env::var(var_name) {
        Ok(v) if !v.trim().is_empty() => Some(v),
        _ => None,
    }
}

/// Read the Postgres URL from the env var named by `database.url_env`.
pub fn resolve_database_url(cfg: &EngineConfig) -> Result<DatabaseUrl> {
    match resolve_env(&cfg.database_url_env) {
        Some(v) => Ok(DatabaseUrl(v)),
        None => bail!(
            "SECRETS_MISSING: required env var '{}' (database url) is not set or empty",
            cfg.database_url_env
        ),
    }
}

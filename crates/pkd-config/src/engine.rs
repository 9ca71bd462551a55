//! Typed engine settings extracted from the merged config JSON.

use anyhow::{bail, Result};
use serde_json::Value;
use std::time::Duration;

pub const DEFAULT_DATABASE_URL_ENV: &str = "PKD_DATABASE_URL";

/// Remote status tags published on each local transition. `None` means the
/// transition is not mirrored to the commerce platform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteStatusTags {
    pub on_preparing: Option<String>,
    pub on_waiting: Option<String>,
    pub on_completed: Option<String>,
    pub on_cancelled: Option<String>,
}

impl Default for RemoteStatusTags {
    fn default() -> Self {
        Self {
            on_preparing: None,
            on_waiting: None,
            on_completed: Some("completed".to_string()),
            on_cancelled: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Remote status tags that make an order eligible for claiming.
    pub open_status_tags: Vec<String>,
    /// Upper bound on candidate insert attempts per claim call.
    pub max_claim_attempts: usize,
    /// Move `assigned -> preparing` right after a successful claim.
    pub auto_start: bool,
    pub remote_status: RemoteStatusTags,
    pub remote_timeout: Duration,
    pub refresh_interval: Duration,
    pub sync_retry_interval: Duration,
    /// NAME of the env var holding the Postgres URL.
    pub database_url_env: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            open_status_tags: vec!["processing".to_string()],
            max_claim_attempts: 16,
            auto_start: true,
            remote_status: RemoteStatusTags::default(),
            remote_timeout: Duration::from_millis(5_000),
            refresh_interval: Duration::from_secs(60),
            sync_retry_interval: Duration::from_secs(300),
            database_url_env: DEFAULT_DATABASE_URL_ENV.to_string(),
        }
    }
}

impl EngineConfig {
    /// Extract settings from a merged config document. Absent keys keep their
    /// defaults; present keys with the wrong type are rejected.
    pub fn from_config_json(config: &Value) -> Result<Self> {
        let mut cfg = Self::default();

        if let Some(v) = config.pointer("/claim/open_status_tags") {
            let Some(arr) = v.as_array() else {
                bail!("CONFIG_INVALID /claim/open_status_tags: expected a list of strings");
            };
            let mut tags = Vec::with_capacity(arr.len());
            for t in arr {
                match t.as_str().map(str::trim) {
                    Some(s) if !s.is_empty() => tags.push(s.to_string()),
                    _ => bail!("CONFIG_INVALID /claim/open_status_tags: blank or non-string tag"),
                }
            }
            if tags.is_empty() {
                bail!("CONFIG_INVALID /claim/open_status_tags: at least one tag required");
            }
            cfg.open_status_tags = tags;
        }

        if let Some(n) = read_u64(config, "/claim/max_attempts")? {
            if n == 0 {
                bail!("CONFIG_INVALID /claim/max_attempts: must be >= 1");
            }
            cfg.max_claim_attempts = n as usize;
        }

        if let Some(v) = config.pointer("/claim/auto_start") {
            let Some(b) = v.as_bool() else {
                bail!("CONFIG_INVALID /claim/auto_start: expected bool");
            };
            cfg.auto_start = b;
        }

        cfg.remote_status.on_preparing = read_tag(
            config,
            "/remote_status/on_preparing",
            cfg.remote_status.on_preparing.take(),
        )?;
        cfg.remote_status.on_waiting =
            read_tag(config, "/remote_status/on_waiting", cfg.remote_status.on_waiting.take())?;
        cfg.remote_status.on_completed = read_tag(
            config,
            "/remote_status/on_completed",
            cfg.remote_status.on_completed.take(),
        )?;
        cfg.remote_status.on_cancelled = read_tag(
            config,
            "/remote_status/on_cancelled",
            cfg.remote_status.on_cancelled.take(),
        )?;

        if let Some(ms) = read_u64(config, "/remote_status/timeout_ms")? {
            cfg.remote_timeout = Duration::from_millis(ms);
        }
        if let Some(s) = read_interval_secs(config, "/refresh/interval_secs")? {
            cfg.refresh_interval = s;
        }
        if let Some(s) = read_interval_secs(config, "/refresh/sync_retry_interval_secs")? {
            cfg.sync_retry_interval = s;
        }

        if let Some(v) = config.pointer("/database/url_env") {
            match v.as_str().map(str::trim) {
                Some(s) if !s.is_empty() => cfg.database_url_env = s.to_string(),
                _ => bail!("CONFIG_INVALID /database/url_env: expected env var name"),
            }
        }

        Ok(cfg)
    }
}

fn read_u64(config: &Value, pointer: &str) -> Result<Option<u64>> {
    match config.pointer(pointer) {
        None | Some(Value::Null) => Ok(None),
        Some(v) => match v.as_u64() {
            Some(n) => Ok(Some(n)),
            None => bail!("CONFIG_INVALID {pointer}: expected non-negative integer"),
        },
    }
}

/// `null` disables a tag explicitly; absent keeps `default`.
/// Periodic tick periods must be non-zero.
fn read_interval_secs(config: &Value, pointer: &str) -> Result<Option<Duration>> {
    match read_u64(config, pointer)? {
        Some(0) => bail!("CONFIG_INVALID {pointer}: must be >= 1"),
        other => Ok(other.map(Duration::from_secs)),
    }
}

fn read_tag(config: &Value, pointer: &str, default: Option<String>) -> Result<Option<String>> {
    match config.pointer(pointer) {
        None => Ok(default),
        Some(Value::Null) => Ok(None),
        Some(Value::String(s)) if !s.trim().is_empty() => Ok(Some(s.trim().to_string())),
        Some(_) => bail!("CONFIG_INVALID {pointer}: expected non-empty string or null"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn empty_document_yields_defaults() {
        let cfg = EngineConfig::from_config_json(&json!({})).unwrap();
        assert_eq!(cfg, EngineConfig::default());
        assert_eq!(cfg.remote_status.on_completed.as_deref(), Some("completed"));
    }

    #[test]
    fn explicit_null_disables_completion_sync() {
        let cfg =
            EngineConfig::from_config_json(&json!({"remote_status": {"on_completed": null}}))
                .unwrap();
        assert!(cfg.remote_status.on_completed.is_none());
    }

    #[test]
    fn zero_attempts_rejected() {
        let err = EngineConfig::from_config_json(&json!({"claim": {"max_attempts": 0}}))
            .unwrap_err();
        assert!(err.to_string().contains("/claim/max_attempts"));
    }

    #[test]
    fn zero_refresh_intervals_rejected() {
        for ptr in ["interval_secs", "sync_retry_interval_secs"] {
            let err = EngineConfig::from_config_json(&json!({"refresh": {ptr: 0}}))
                .unwrap_err();
            let msg = err.to_string();
            assert!(msg.starts_with("CONFIG_INVALID"), "{msg}");
            assert!(msg.contains(&format!("/refresh/{ptr}")), "{msg}");
        }

        let cfg = EngineConfig::from_config_json(&json!({
            "refresh": {"interval_secs": 1, "sync_retry_interval_secs": 2}
        }))
        .unwrap();
        assert_eq!(cfg.refresh_interval, Duration::from_secs(1));
        assert_eq!(cfg.sync_retry_interval, Duration::from_secs(2));
    }

    #[test]
    fn wrong_type_rejected() {
        assert!(EngineConfig::from_config_json(&json!({"claim": {"auto_start": "yes"}})).is_err());
        assert!(
            EngineConfig::from_config_json(&json!({"claim": {"open_status_tags": []}})).is_err()
        );
    }
}

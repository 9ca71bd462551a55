//! Command handler modules for pkd-cli.
//!
//! Shared wiring (config, database, engine) lives here. Command-specific
//! logic lives in the submodules.

pub mod admin;
pub mod stock;
pub mod work;

use std::sync::Arc;

use anyhow::{Context, Result};
use pkd_config::{report_unused_keys, EngineConfig, UnusedKeyPolicy};
use pkd_db::PgStore;
use pkd_engine::{BulkReport, Engine, FileOrderSource};
use serde::Serialize;
use uuid::Uuid;

/// Global options shared by every engine command.
#[derive(Debug, Clone, Default)]
pub struct GlobalOpts {
    pub config_paths: Vec<String>,
    pub feed: Option<String>,
}

// ---------------------------------------------------------------------------
// Shared helpers
// ---------------------------------------------------------------------------

/// Merge config layers (if any) and extract engine settings. Unused keys are
/// reported, not fatal.
pub fn load_engine_config(paths: &[String]) -> Result<EngineConfig> {
    if paths.is_empty() {
        return Ok(EngineConfig::default());
    }
    let path_refs: Vec<&str> = paths.iter().map(|s| s.as_str()).collect();
    let loaded = pkd_config::load_layered_yaml(&path_refs)?;

    let report = report_unused_keys(&loaded.config_json, UnusedKeyPolicy::Warn)?;
    if !report.is_clean() {
        eprintln!(
            "WARN: CONFIG_UNUSED_KEYS unused_leaf_keys={}",
            report.unused_leaf_pointers.len()
        );
        for p in report.unused_leaf_pointers.iter().take(50) {
            eprintln!("  unused={}", p);
        }
    }

    tracing::debug!(config_hash = %loaded.config_hash, "config loaded");
    EngineConfig::from_config_json(&loaded.config_json)
}

pub async fn connect_store(cfg: &EngineConfig) -> Result<PgStore> {
    let url = pkd_config::secrets::resolve_database_url(cfg)?;
    let pool = pkd_db::connect(url.expose()).await?;
    Ok(PgStore::new(pool))
}

/// Engine over Postgres. Without `--feed` the order source is empty, which
/// is enough for every command that does not read the platform.
pub async fn build_engine(opts: &GlobalOpts) -> Result<Engine> {
    let cfg = load_engine_config(&opts.config_paths)?;
    let store = Arc::new(connect_store(&cfg).await?);
    let source = match &opts.feed {
        Some(path) => FileOrderSource::load(path)?,
        None => FileOrderSource::default(),
    };
    Ok(Engine::new(store.clone(), Arc::new(source), cfg).with_locations(store))
}

pub fn parse_ids(raw: &[String]) -> Result<Vec<Uuid>> {
    raw.iter()
        .map(|s| Uuid::parse_str(s).with_context(|| format!("invalid assignment id: {s}")))
        .collect()
}

pub fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Print a bulk report and fail the command if any item failed.
pub fn finish_bulk(op: &str, report: &BulkReport) -> Result<()> {
    for key in &report.succeeded {
        println!("{op}=ok key={key}");
    }
    for f in &report.failed {
        println!("{op}=failed key={} code={} error={}", f.key, f.code, f.error);
    }
    if !report.all_succeeded() {
        anyhow::bail!("{op}: {} of {} failed", report.failed.len(), report.failed.len() + report.succeeded.len());
    }
    Ok(())
}

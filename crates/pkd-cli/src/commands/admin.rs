//! Supervisor commands: bulk operations, priority, notes.

use anyhow::{Context, Result};
use pkd_engine::RemoveSelector;
use pkd_schemas::WorkerRef;
use uuid::Uuid;

use super::{build_engine, finish_bulk, parse_ids, print_json, GlobalOpts};

pub async fn reassign(
    opts: &GlobalOpts,
    ids: Vec<String>,
    worker_id: String,
    worker_name: String,
) -> Result<()> {
    let engine = build_engine(opts).await?;
    let ids = parse_ids(&ids)?;
    let target = WorkerRef::new(worker_id, worker_name);
    let report = engine.reassign(&ids, &target).await;
    finish_bulk("reassign", &report)
}

pub async fn reopen(opts: &GlobalOpts, ids: Vec<String>) -> Result<()> {
    let engine = build_engine(opts).await?;
    let ids = parse_ids(&ids)?;
    let report = engine.reopen(&ids).await;
    finish_bulk("reopen", &report)
}

/// Positional keys are assignment ids, or order ids with `--orders`.
pub async fn remove(opts: &GlobalOpts, keys: Vec<String>, by_order: bool) -> Result<()> {
    let engine = build_engine(opts).await?;
    let selector = if by_order {
        RemoveSelector::Orders(keys)
    } else {
        RemoveSelector::Assignments(parse_ids(&keys)?)
    };
    let report = engine.remove(&selector).await;
    finish_bulk("remove", &report)
}

pub async fn release(opts: &GlobalOpts, ids: Vec<String>, reason: String) -> Result<()> {
    if reason.trim().is_empty() {
        anyhow::bail!("release requires a non-empty --reason");
    }
    let engine = build_engine(opts).await?;
    let ids = parse_ids(&ids)?;
    let report = engine.release(&ids, &reason).await;
    finish_bulk("release", &report)
}

// ---------------------------------------------------------------------------
// priority
// ---------------------------------------------------------------------------

pub async fn priority_mark(
    opts: &GlobalOpts,
    order_id: String,
    reason: String,
    notes: Option<String>,
) -> Result<()> {
    let engine = build_engine(opts).await?;
    let mark = engine.mark_priority(&order_id, &reason, notes).await?;
    println!(
        "marked=true order_id={} created_at_utc={}",
        mark.order_id,
        mark.created_at_utc.to_rfc3339()
    );
    Ok(())
}

pub async fn priority_unmark(opts: &GlobalOpts, order_id: String) -> Result<()> {
    let engine = build_engine(opts).await?;
    let removed = engine.unmark_priority(&order_id).await?;
    println!("unmarked={} order_id={}", removed, order_id);
    Ok(())
}

pub async fn priority_list(opts: &GlobalOpts) -> Result<()> {
    let engine = build_engine(opts).await?;
    print_json(&engine.list_priority().await?)
}

/// `reason = None` clears the flag.
pub async fn priority_set(
    opts: &GlobalOpts,
    assignment_id: String,
    reason: Option<String>,
) -> Result<()> {
    let engine = build_engine(opts).await?;
    let id = Uuid::parse_str(&assignment_id).context("invalid assignment id")?;
    let a = engine.set_assignment_priority(id, reason).await?;
    println!(
        "assignment_id={} is_high_priority={}",
        a.assignment_id, a.is_high_priority
    );
    Ok(())
}

pub async fn notes(opts: &GlobalOpts, assignment_id: String, text: Option<String>) -> Result<()> {
    let engine = build_engine(opts).await?;
    let id = Uuid::parse_str(&assignment_id).context("invalid assignment id")?;
    let a = engine.set_notes(id, text).await?;
    println!(
        "assignment_id={} has_notes={}",
        a.assignment_id,
        a.notes.is_some()
    );
    Ok(())
}

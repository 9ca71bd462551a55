//! Worker-facing commands and background maintenance.

use anyhow::{Context, Result};
use pkd_engine::{
    spawn_remote_sync_retry, spawn_snapshot_refresh, ClaimOutcome, StoredAssignment,
    TransitionRequest,
};
use pkd_schemas::{AssignmentState, WorkerRef};
use uuid::Uuid;

use super::{build_engine, print_json, GlobalOpts};

// ---------------------------------------------------------------------------
// claim / transition
// ---------------------------------------------------------------------------

pub async fn claim(opts: &GlobalOpts, worker_id: String, worker_name: String) -> Result<()> {
    let engine = build_engine(opts).await?;
    let worker = WorkerRef::new(worker_id, worker_name);

    match engine.claim_next(&worker).await? {
        ClaimOutcome::Claimed { assignment, warnings } => {
            for w in &warnings {
                eprintln!("WARN: REMOTE_SYNC_PENDING order_id={} status={} error={}", w.order_id, w.status_tag, w.error);
            }
            println!("claimed=true");
            print_json(&assignment)?;
        }
        ClaimOutcome::NoOrdersAvailable => println!("claimed=false reason=NO_ORDERS_AVAILABLE"),
    }
    Ok(())
}

pub struct TransitionArgs {
    pub assignment_id: String,
    pub to: String,
    pub worker_id: Option<String>,
    pub skip_remote_sync: bool,
    pub note: Option<String>,
}

pub async fn transition(opts: &GlobalOpts, args: TransitionArgs) -> Result<()> {
    let engine = build_engine(opts).await?;
    let id = Uuid::parse_str(&args.assignment_id).context("invalid assignment id")?;
    let target = AssignmentState::parse(&args.to.trim().to_ascii_lowercase())?;

    let mut request = match args.worker_id {
        Some(w) => TransitionRequest::by_worker(w, target),
        None => TransitionRequest::by_admin(target),
    }
    .skip_remote_sync(args.skip_remote_sync);
    if let Some(note) = args.note {
        request = request.with_note(note);
    }

    let outcome = engine.transition(id, request).await?;
    for w in &outcome.warnings {
        eprintln!("WARN: REMOTE_SYNC_PENDING order_id={} status={} error={}", w.order_id, w.status_tag, w.error);
    }
    println!(
        "assignment_id={} state={} archived={}",
        outcome.assignment.assignment_id, outcome.assignment.state, outcome.archived
    );
    if let Some(secs) = outcome.duration_secs {
        println!("duration_secs={}", secs);
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// read queries
// ---------------------------------------------------------------------------

pub async fn show(opts: &GlobalOpts, assignment_id: String) -> Result<()> {
    let engine = build_engine(opts).await?;
    let id = Uuid::parse_str(&assignment_id).context("invalid assignment id")?;
    let stored = engine.get(id).await?;
    let where_ = match &stored {
        StoredAssignment::Active(_) => "active",
        StoredAssignment::Archived(_) => "archived",
    };
    println!("storage={}", where_);
    print_json(&stored)
}

pub async fn active(opts: &GlobalOpts, worker_id: Option<String>) -> Result<()> {
    let engine = build_engine(opts).await?;
    match worker_id {
        Some(w) => match engine.active_for_worker(&w).await? {
            Some(a) => print_json(&a),
            None => {
                println!("active=none worker_id={}", w);
                Ok(())
            }
        },
        None => print_json(&engine.list_active().await?),
    }
}

pub async fn stats(opts: &GlobalOpts) -> Result<()> {
    let engine = build_engine(opts).await?;
    print_json(&engine.stats().await?)
}

// ---------------------------------------------------------------------------
// maintenance
// ---------------------------------------------------------------------------

pub async fn refresh(opts: &GlobalOpts, assignment_id: Option<String>) -> Result<()> {
    let engine = build_engine(opts).await?;
    match assignment_id {
        Some(raw) => {
            let id = Uuid::parse_str(&raw).context("invalid assignment id")?;
            let a = engine.refresh_snapshot(id).await?;
            println!("refreshed=true assignment_id={}", a.assignment_id);
        }
        None => {
            let report = engine.refresh_all_active().await?;
            println!("refreshed={} failed={}", report.refreshed, report.failed.len());
            for f in &report.failed {
                println!("  failed key={} code={} error={}", f.key, f.code, f.error);
            }
        }
    }
    Ok(())
}

pub async fn retry_syncs(opts: &GlobalOpts, limit: usize) -> Result<()> {
    let engine = build_engine(opts).await?;
    let r = engine.retry_remote_syncs(limit).await?;
    println!(
        "attempted={} synced={} superseded={} still_failing={}",
        r.attempted, r.synced, r.superseded, r.still_failing
    );
    Ok(())
}

/// Run snapshot refresh and sync retry on their timers until Ctrl-C.
pub async fn watch(opts: &GlobalOpts, batch: usize) -> Result<()> {
    let engine = build_engine(opts).await?;
    let cfg = engine.config().clone();

    let refresh = spawn_snapshot_refresh(engine.clone(), cfg.refresh_interval);
    let retry = spawn_remote_sync_retry(engine, cfg.sync_retry_interval, batch);
    tracing::info!(
        refresh_secs = cfg.refresh_interval.as_secs(),
        retry_secs = cfg.sync_retry_interval.as_secs(),
        "background refresh running"
    );

    tokio::signal::ctrl_c().await.context("wait for ctrl-c")?;
    refresh.abort();
    retry.abort();
    tracing::info!("background refresh stopped");
    Ok(())
}

//! Background refresh.
//!
//! Both loops run on their own timers and never block a claim or a
//! transition: they go through the same compare-and-set writes as everything
//! else. Stop them by aborting the returned handle.

use std::time::Duration;

use pkd_schemas::{Assignment, OrderSnapshot};
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::admin::BulkFailure;
use crate::engine::Engine;
use crate::error::EngineError;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefreshReport {
    pub refreshed: usize,
    pub failed: Vec<BulkFailure>,
}

impl Engine {
    /// Re-read the order from the platform and replace the snapshot of an
    /// active assignment.
    pub async fn refresh_snapshot(&self, assignment_id: Uuid) -> Result<Assignment, EngineError> {
        let current = self.fetch_active(assignment_id).await?;
        let order = self.source.get_order(&current.order_id).await?;
        let snapshot = OrderSnapshot::capture(order, self.now());

        let a = self
            .update_fields(assignment_id, |a| {
                a.order_number = snapshot.order.order_number.clone();
                a.order_snapshot = snapshot.clone();
            })
            .await?;
        debug!(assignment_id = %assignment_id, order_id = %a.order_id, "snapshot refreshed");
        Ok(a)
    }

    pub async fn refresh_all_active(&self) -> Result<RefreshReport, EngineError> {
        let mut report = RefreshReport::default();
        for a in self.store.list_active().await? {
            match self.refresh_snapshot(a.assignment_id).await {
                Ok(_) => report.refreshed += 1,
                // Finished between listing and refreshing.
                Err(EngineError::AssignmentAlreadyClosed { .. })
                | Err(EngineError::AssignmentNotFound(_)) => {}
                Err(e) => report.failed.push(BulkFailure {
                    key: a.assignment_id.to_string(),
                    code: e.code().to_string(),
                    error: e.to_string(),
                }),
            }
        }
        Ok(report)
    }
}

/// Refresh every active snapshot each `interval`.
pub fn spawn_snapshot_refresh(engine: Engine, interval: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            match engine.refresh_all_active().await {
                Ok(report) if report.failed.is_empty() => {
                    debug!(refreshed = report.refreshed, "snapshot refresh tick");
                }
                Ok(report) => {
                    warn!(
                        refreshed = report.refreshed,
                        failed = report.failed.len(),
                        "snapshot refresh tick had failures"
                    );
                }
                Err(e) => warn!(error = %e, "snapshot refresh tick failed"),
            }
        }
    })
}

/// Drain the remote sync outbox, `batch` items each `interval`.
pub fn spawn_remote_sync_retry(engine: Engine, interval: Duration, batch: usize) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            match engine.retry_remote_syncs(batch).await {
                Ok(report) if report.attempted == 0 => {}
                Ok(report) => info!(
                    attempted = report.attempted,
                    synced = report.synced,
                    superseded = report.superseded,
                    still_failing = report.still_failing,
                    "remote sync retry tick"
                ),
                Err(e) => warn!(error = %e, "remote sync retry tick failed"),
            }
        }
    })
}

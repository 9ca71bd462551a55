//! Remote status sync.
//!
//! Local state is authoritative. A transition is written first and only the
//! writer that won the compare-and-set pushes its tag. A push that fails or
//! times out leaves the row unsynced with a note, and queues the tag in the
//! outbox for [`Engine::retry_remote_syncs`]. Queued tags that no longer match
//! the stored row are dropped, never pushed.

use pkd_schemas::{Assignment, AssignmentState};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::engine::{append_note, Engine};
use crate::error::{EngineError, RemoteError, SyncWarning};
use crate::ports::{PendingSync, StoredAssignment};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncRetryReport {
    pub attempted: usize,
    pub synced: usize,
    /// Dropped without pushing: the assignment was removed or has since
    /// recorded a newer tag.
    pub superseded: usize,
    pub still_failing: usize,
}

impl Engine {
    fn status_tag_for(&self, state: AssignmentState) -> Option<&str> {
        let tags = &self.config.remote_status;
        match state {
            AssignmentState::Assigned => None,
            AssignmentState::Preparing => tags.on_preparing.as_deref(),
            AssignmentState::Waiting => tags.on_waiting.as_deref(),
            AssignmentState::Completed => tags.on_completed.as_deref(),
            AssignmentState::Cancelled => tags.on_cancelled.as_deref(),
        }
    }

    pub(crate) async fn push_remote_status(
        &self,
        order_id: &str,
        status_tag: &str,
    ) -> Result<(), RemoteError> {
        let timeout = self.config.remote_timeout;
        match tokio::time::timeout(timeout, self.source.set_remote_status(order_id, status_tag))
            .await
        {
            Ok(res) => res,
            Err(_) => Err(RemoteError::Timeout(timeout.as_millis() as u64)),
        }
    }

    /// Stamp the configured tag for `a.state` before the transition is
    /// written. Returns the tag still to be pushed: `None` when the state has
    /// no tag or the caller skipped the push.
    pub(crate) fn stamp_remote_status(&self, a: &mut Assignment, skip: bool) -> Option<String> {
        let tag = self.status_tag_for(a.state)?.to_string();
        a.remote_status = Some(tag.clone());
        a.remote_status_synced = skip;
        if skip {
            None
        } else {
            Some(tag)
        }
    }

    /// Push `tag` for a transition that is already persisted and record the
    /// outcome on the stored row. `a` is updated to match what was recorded.
    pub(crate) async fn deliver_remote_status(
        &self,
        a: &mut Assignment,
        tag: &str,
        archived: bool,
    ) -> Vec<SyncWarning> {
        match self.push_remote_status(&a.order_id, tag).await {
            Ok(()) => {
                a.remote_status_synced = true;
                self.record_sync_outcome(a, tag, archived, None).await;
                Vec::new()
            }
            Err(e) => {
                let line = format!("remote status '{tag}' not synced: {e}");
                a.remote_status_synced = false;
                append_note(&mut a.notes, &line);
                warn!(
                    assignment_id = %a.assignment_id,
                    order_id = %a.order_id,
                    status_tag = %tag,
                    error = %e,
                    "remote status sync failed; queued for retry"
                );
                let sync_id = self.enqueue_sync(a, tag, &e).await;
                self.record_sync_outcome(a, tag, archived, Some(&line)).await;
                vec![SyncWarning {
                    order_id: a.order_id.clone(),
                    status_tag: tag.to_string(),
                    error: e.to_string(),
                    sync_id,
                }]
            }
        }
    }

    /// Write the synced flag (and a failure note) back to the stored row,
    /// only while that row still carries `tag`.
    async fn record_sync_outcome(
        &self,
        a: &Assignment,
        tag: &str,
        archived: bool,
        failure_note: Option<&str>,
    ) {
        let synced = a.remote_status_synced;
        let res = if archived {
            self.store
                .record_archived_sync(a.assignment_id, tag, synced, a.notes.as_deref())
                .await
                .map(|_| ())
                .map_err(EngineError::from)
        } else {
            self.update_fields(a.assignment_id, |row| {
                if row.remote_status.as_deref() == Some(tag) {
                    row.remote_status_synced = synced;
                    if let Some(line) = failure_note {
                        append_note(&mut row.notes, line);
                    }
                }
            })
            .await
            .map(|_| ())
        };

        match res {
            Ok(()) => {}
            // Moved on concurrently; the newer transition owns the sync fields.
            Err(EngineError::AssignmentAlreadyClosed { .. }) | Err(EngineError::AssignmentNotFound(_)) => {
                debug!(assignment_id = %a.assignment_id, "sync outcome not recorded; assignment moved on");
            }
            Err(e) => {
                warn!(assignment_id = %a.assignment_id, error = %e, "could not record remote sync outcome");
            }
        }
    }

    async fn enqueue_sync(&self, a: &Assignment, tag: &str, err: &RemoteError) -> Option<Uuid> {
        let item = PendingSync {
            sync_id: Uuid::new_v4(),
            assignment_id: a.assignment_id,
            order_id: a.order_id.clone(),
            status_tag: tag.to_string(),
            last_error: err.to_string(),
            attempts: 1,
            enqueued_at_utc: self.now(),
        };
        match self.outbox.enqueue_sync(&item).await {
            Ok(()) => Some(item.sync_id),
            Err(e) => {
                warn!(order_id = %a.order_id, error = %e, "failed to queue remote sync retry");
                None
            }
        }
    }

    /// Drain up to `limit` queued syncs, oldest first.
    pub async fn retry_remote_syncs(&self, limit: usize) -> Result<SyncRetryReport, EngineError> {
        let mut report = SyncRetryReport::default();

        for item in self.outbox.list_pending_syncs(limit).await? {
            report.attempted += 1;

            let stored = self.store.fetch(item.assignment_id).await?;
            let recorded = stored
                .as_ref()
                .and_then(|s| s.assignment().remote_status.as_deref());
            if recorded != Some(item.status_tag.as_str()) {
                // Removed, or a newer tag was recorded since this one failed.
                self.outbox.mark_sync_done(item.sync_id).await?;
                report.superseded += 1;
                debug!(
                    order_id = %item.order_id,
                    status_tag = %item.status_tag,
                    "queued remote sync superseded"
                );
                continue;
            }

            match self.push_remote_status(&item.order_id, &item.status_tag).await {
                Ok(()) => {
                    self.outbox.mark_sync_done(item.sync_id).await?;
                    report.synced += 1;
                    info!(order_id = %item.order_id, status_tag = %item.status_tag, "queued remote sync delivered");
                    if let Some(found) = &stored {
                        let mut a = found.assignment().clone();
                        a.remote_status_synced = true;
                        let archived = matches!(found, StoredAssignment::Archived(_));
                        self.record_sync_outcome(&a, &item.status_tag, archived, None)
                            .await;
                    }
                }
                Err(e) => {
                    self.outbox
                        .mark_sync_failed(item.sync_id, &e.to_string())
                        .await?;
                    report.still_failing += 1;
                    warn!(
                        order_id = %item.order_id,
                        status_tag = %item.status_tag,
                        attempts = item.attempts + 1,
                        error = %e,
                        "queued remote sync still failing"
                    );
                }
            }
        }

        Ok(report)
    }
}

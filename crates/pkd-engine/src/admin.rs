//! Administrative operations.
//!
//! Bulk operations process ids in the order given and report per item; one
//! failing id never aborts the rest.

use pkd_schemas::{Assignment, AssignmentState, PriorityMark, WorkerRef};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::engine::Engine;
use crate::error::EngineError;
use crate::ports::{ReassignOutcome, StoredAssignment};
use crate::prep::TransitionRequest;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoveSelector {
    Assignments(Vec<Uuid>),
    Orders(Vec<String>),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BulkFailure {
    /// Assignment id or order id as supplied.
    pub key: String,
    pub code: String,
    pub error: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BulkReport {
    pub succeeded: Vec<String>,
    pub failed: Vec<BulkFailure>,
}

impl BulkReport {
    fn record(&mut self, key: String, result: Result<(), EngineError>) {
        match result {
            Ok(()) => self.succeeded.push(key),
            Err(e) => self.failed.push(BulkFailure {
                key,
                code: e.code().to_string(),
                error: e.to_string(),
            }),
        }
    }

    pub fn all_succeeded(&self) -> bool {
        self.failed.is_empty()
    }
}

impl Engine {
    // -----------------------------------------------------------------------
    // Reassign
    // -----------------------------------------------------------------------

    /// Move active assignments to `target`. State and timestamps are kept.
    ///
    /// The per-worker constraint decides conflicts: if `target` is free the
    /// first id in the list wins it and the rest fail with `TargetWorkerBusy`.
    pub async fn reassign(&self, assignment_ids: &[Uuid], target: &WorkerRef) -> BulkReport {
        let mut report = BulkReport::default();
        for id in assignment_ids {
            let res = self.reassign_one(*id, target).await;
            report.record(id.to_string(), res);
        }
        report
    }

    async fn reassign_one(&self, assignment_id: Uuid, target: &WorkerRef) -> Result<(), EngineError> {
        let current = self.fetch_active(assignment_id).await?;
        if current.worker_id == target.worker_id {
            debug!(assignment_id = %assignment_id, worker_id = %target.worker_id, "reassign is a no-op");
            return Ok(());
        }

        match self.store.reassign(assignment_id, target).await? {
            ReassignOutcome::Reassigned => {
                info!(
                    assignment_id = %assignment_id,
                    order_id = %current.order_id,
                    from_worker = %current.worker_id,
                    to_worker = %target.worker_id,
                    "assignment reassigned"
                );
                Ok(())
            }
            ReassignOutcome::WorkerBusy => {
                warn!(assignment_id = %assignment_id, worker_id = %target.worker_id, "reassign rejected: target busy");
                Err(EngineError::TargetWorkerBusy {
                    worker_id: target.worker_id.clone(),
                })
            }
            // Closed between our read and the write.
            ReassignOutcome::NotActive => self.fetch_active(assignment_id).await.map(|_| ()),
        }
    }

    // -----------------------------------------------------------------------
    // Reopen
    // -----------------------------------------------------------------------

    /// Drop the claim lock of archived assignments so their orders can be
    /// claimed again. History is kept.
    pub async fn reopen(&self, assignment_ids: &[Uuid]) -> BulkReport {
        let mut report = BulkReport::default();
        for id in assignment_ids {
            let res = self.reopen_one(*id).await;
            report.record(id.to_string(), res);
        }
        report
    }

    async fn reopen_one(&self, assignment_id: Uuid) -> Result<(), EngineError> {
        let archived = match self.store.fetch(assignment_id).await? {
            Some(StoredAssignment::Archived(h)) => h,
            Some(StoredAssignment::Active(a)) => {
                return Err(EngineError::AssignmentNotArchived {
                    assignment_id,
                    state: a.state,
                })
            }
            None => return Err(EngineError::AssignmentNotFound(assignment_id.to_string())),
        };

        if self.store.release_claim(assignment_id).await? {
            info!(
                assignment_id = %assignment_id,
                order_id = %archived.assignment.order_id,
                "order reopened"
            );
        } else {
            debug!(assignment_id = %assignment_id, "claim lock already released");
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Remove
    // -----------------------------------------------------------------------

    /// Delete active assignments outright and return their orders to the
    /// pool. Archived records are protected. Queued remote syncs of a removed
    /// assignment are discarded.
    ///
    /// Order ids resolve through the claim lock. An order whose archived
    /// assignment was already reopened holds no lock, so it reports
    /// `ASSIGNMENT_NOT_FOUND` rather than `REMOVAL_PROTECTED`.
    pub async fn remove(&self, selector: &RemoveSelector) -> BulkReport {
        let mut report = BulkReport::default();
        match selector {
            RemoveSelector::Assignments(ids) => {
                for id in ids {
                    let res = match self.store.fetch(*id).await {
                        Ok(found) => self.remove_found(id.to_string(), found).await,
                        Err(e) => Err(e.into()),
                    };
                    report.record(id.to_string(), res);
                }
            }
            RemoveSelector::Orders(order_ids) => {
                for order_id in order_ids {
                    let res = match self.store.fetch_by_order(order_id).await {
                        Ok(found) => self.remove_found(order_id.clone(), found).await,
                        Err(e) => Err(e.into()),
                    };
                    report.record(order_id.clone(), res);
                }
            }
        }
        report
    }

    async fn remove_found(
        &self,
        key: String,
        found: Option<StoredAssignment>,
    ) -> Result<(), EngineError> {
        let a = match found {
            None => return Err(EngineError::AssignmentNotFound(key)),
            Some(StoredAssignment::Archived(h)) => {
                return Err(EngineError::RemovalProtected {
                    assignment_id: h.assignment.assignment_id,
                    state: h.assignment.state,
                })
            }
            Some(StoredAssignment::Active(a)) => a,
        };

        if self.store.remove_active(a.assignment_id).await? {
            info!(
                assignment_id = %a.assignment_id,
                order_id = %a.order_id,
                worker_id = %a.worker_id,
                "assignment removed"
            );
            match self.outbox.discard_syncs(a.assignment_id).await {
                Ok(0) => {}
                Ok(n) => debug!(assignment_id = %a.assignment_id, discarded = n, "queued syncs discarded"),
                // The retry drops them anyway once the row is gone.
                Err(e) => warn!(assignment_id = %a.assignment_id, error = %e, "failed to discard queued syncs"),
            }
            return Ok(());
        }

        // Archived concurrently.
        match self.store.fetch(a.assignment_id).await? {
            Some(other) => Err(EngineError::RemovalProtected {
                assignment_id: a.assignment_id,
                state: other.state(),
            }),
            None => Err(EngineError::AssignmentNotFound(key)),
        }
    }

    // -----------------------------------------------------------------------
    // Release
    // -----------------------------------------------------------------------

    /// Administrative cancel. The reason is kept in the archived notes.
    pub async fn release(&self, assignment_ids: &[Uuid], reason: &str) -> BulkReport {
        let mut report = BulkReport::default();
        for id in assignment_ids {
            let request = TransitionRequest::by_admin(AssignmentState::Cancelled)
                .with_note(format!("released: {reason}"));
            let res = self.transition(*id, request).await.map(|outcome| {
                for w in &outcome.warnings {
                    warn!(order_id = %w.order_id, error = %w.error, "release sync warning");
                }
            });
            report.record(id.to_string(), res);
        }
        report
    }

    // -----------------------------------------------------------------------
    // Priority
    // -----------------------------------------------------------------------

    /// Mark an unclaimed order as high priority. Re-marking updates the
    /// reason and notes but keeps the queue position.
    pub async fn mark_priority(
        &self,
        order_id: &str,
        reason: &str,
        notes: Option<String>,
    ) -> Result<PriorityMark, EngineError> {
        if self.store.fetch_by_order(order_id).await?.is_some() {
            return Err(EngineError::OrderAlreadyClaimed(order_id.to_string()));
        }
        let mark = PriorityMark {
            order_id: order_id.to_string(),
            reason: reason.to_string(),
            notes,
            created_at_utc: self.now(),
        };
        let stored = self.overlay.upsert_mark(&mark).await?;
        info!(order_id = %order_id, reason = %reason, "priority mark set");
        Ok(stored)
    }

    pub async fn unmark_priority(&self, order_id: &str) -> Result<bool, EngineError> {
        let removed = self.overlay.delete_mark(order_id).await?;
        if removed {
            info!(order_id = %order_id, "priority mark removed");
        }
        Ok(removed)
    }

    /// Marks in queue order.
    pub async fn list_priority(&self) -> Result<Vec<PriorityMark>, EngineError> {
        let mut marks = self.overlay.list_marks().await?;
        marks.sort_by(|a, b| {
            a.created_at_utc
                .cmp(&b.created_at_utc)
                .then_with(|| a.order_id.cmp(&b.order_id))
        });
        Ok(marks)
    }

    /// Flag (or unflag, with `None`) an already claimed assignment.
    pub async fn set_assignment_priority(
        &self,
        assignment_id: Uuid,
        reason: Option<String>,
    ) -> Result<Assignment, EngineError> {
        let a = self
            .update_fields(assignment_id, |a| {
                a.is_high_priority = reason.is_some();
                a.priority_reason = reason.clone();
            })
            .await?;
        info!(assignment_id = %assignment_id, high_priority = a.is_high_priority, "assignment priority updated");
        Ok(a)
    }

    pub async fn set_notes(
        &self,
        assignment_id: Uuid,
        notes: Option<String>,
    ) -> Result<Assignment, EngineError> {
        let a = self
            .update_fields(assignment_id, |a| a.notes = notes.clone())
            .await?;
        debug!(assignment_id = %assignment_id, "assignment notes updated");
        Ok(a)
    }
}

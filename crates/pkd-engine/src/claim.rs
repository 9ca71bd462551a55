//! Claim engine.
//!
//! Candidate order: every priority-marked order (earliest mark first) before
//! any normal order (oldest order first). Ties break on `order_id` so two
//! workers looking at the same pool agree on the sequence.
//!
//! The claim itself is a constrained insert. Losing a race on an order is
//! not an error: the order is skipped and the next candidate is tried, up to
//! `claim.max_attempts` inserts per call.

use std::collections::{HashMap, HashSet};

use pkd_schemas::{Assignment, Order, PriorityMark, WorkerRef};
use tracing::{debug, info, warn};

use crate::engine::Engine;
use crate::error::{EngineError, SyncWarning};
use crate::ports::InsertOutcome;

#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub order: Order,
    pub priority: Option<PriorityMark>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ClaimOutcome {
    Claimed {
        assignment: Assignment,
        warnings: Vec<SyncWarning>,
    },
    /// Empty candidate pool, or every candidate was taken by someone else.
    NoOrdersAvailable,
}

/// Order the claimable pool. Pure; no IO.
///
/// `exclude` holds order ids that already carry a claim lock or lost a race
/// earlier in the same call. Duplicate order ids in `open` keep the first
/// occurrence.
pub fn order_candidates(
    open: &[Order],
    marks: &[PriorityMark],
    exclude: &HashSet<String>,
) -> Vec<Candidate> {
    let by_order: HashMap<&str, &PriorityMark> =
        marks.iter().map(|m| (m.order_id.as_str(), m)).collect();

    let mut seen: HashSet<&str> = HashSet::new();
    let mut priority = Vec::new();
    let mut normal = Vec::new();

    for order in open {
        if exclude.contains(&order.order_id) || !seen.insert(order.order_id.as_str()) {
            continue;
        }
        let candidate = Candidate {
            order: order.clone(),
            priority: by_order.get(order.order_id.as_str()).map(|m| (*m).clone()),
        };
        if candidate.priority.is_some() {
            priority.push(candidate);
        } else {
            normal.push(candidate);
        }
    }

    priority.sort_by(|a, b| {
        let (ma, mb) = (a.priority.as_ref(), b.priority.as_ref());
        ma.map(|m| m.created_at_utc)
            .cmp(&mb.map(|m| m.created_at_utc))
            .then_with(|| a.order.order_id.cmp(&b.order.order_id))
    });
    normal.sort_by(|a, b| {
        a.order
            .created_at_utc
            .cmp(&b.order.created_at_utc)
            .then_with(|| a.order.order_id.cmp(&b.order.order_id))
    });

    priority.extend(normal);
    priority
}

impl Engine {
    /// Hand the next eligible order to `worker`.
    pub async fn claim_next(&self, worker: &WorkerRef) -> Result<ClaimOutcome, EngineError> {
        if let Some(existing) = self.store.active_for_worker(&worker.worker_id).await? {
            warn!(
                worker_id = %worker.worker_id,
                assignment_id = %existing.assignment_id,
                "claim rejected: worker already holds an active assignment"
            );
            return Err(EngineError::WorkerAlreadyHasActiveOrder {
                worker_id: worker.worker_id.clone(),
                assignment_id: Some(existing.assignment_id),
            });
        }

        let open = self
            .source
            .list_open_orders(&self.config.open_status_tags)
            .await?;
        let marks = self.overlay.list_marks().await?;

        let mut lost: HashSet<String> = HashSet::new();
        let mut attempts = 0usize;

        loop {
            let mut exclude = self.store.claimed_order_ids().await?;
            exclude.extend(lost.iter().cloned());

            let Some(candidate) = order_candidates(&open, &marks, &exclude).into_iter().next()
            else {
                info!(worker_id = %worker.worker_id, attempts, "no orders available");
                return Ok(ClaimOutcome::NoOrdersAvailable);
            };

            if attempts >= self.config.max_claim_attempts {
                warn!(
                    worker_id = %worker.worker_id,
                    attempts,
                    "claim attempts exhausted under contention"
                );
                return Ok(ClaimOutcome::NoOrdersAvailable);
            }
            attempts += 1;

            let order_id = candidate.order.order_id.clone();
            let assignment = Assignment::claimed(
                candidate.order,
                worker,
                candidate.priority.as_ref(),
                self.now(),
            );

            match self.store.insert_claimed(&assignment).await? {
                InsertOutcome::Inserted => {
                    info!(
                        worker_id = %worker.worker_id,
                        order_id = %order_id,
                        assignment_id = %assignment.assignment_id,
                        high_priority = assignment.is_high_priority,
                        attempts,
                        "order claimed"
                    );
                    self.spend_priority_mark(&order_id).await;
                    return Ok(self.after_claim(assignment).await);
                }
                InsertOutcome::OrderTaken => {
                    debug!(worker_id = %worker.worker_id, order_id = %order_id, "claim conflict; trying next candidate");
                    lost.insert(order_id);
                }
                InsertOutcome::WorkerBusy => {
                    // Lost a race against a concurrent claim by the same worker.
                    warn!(worker_id = %worker.worker_id, "claim rejected by per-worker constraint");
                    return Err(EngineError::WorkerAlreadyHasActiveOrder {
                        worker_id: worker.worker_id.clone(),
                        assignment_id: None,
                    });
                }
            }
        }
    }

    /// The mark is spent once its order is claimed. Deleting it is not part of
    /// the claim itself: a failure here leaves a stale mark that is ignored
    /// because the order is excluded by its claim lock.
    async fn spend_priority_mark(&self, order_id: &str) {
        if let Err(e) = self.overlay.delete_mark(order_id).await {
            warn!(order_id = %order_id, error = %e, "failed to delete spent priority mark");
        }
    }

    async fn after_claim(&self, assignment: Assignment) -> ClaimOutcome {
        if !self.config.auto_start {
            return ClaimOutcome::Claimed {
                assignment,
                warnings: Vec::new(),
            };
        }

        match self.ensure_started(assignment.assignment_id).await {
            Ok(Some(started)) => ClaimOutcome::Claimed {
                assignment: started.assignment,
                warnings: started.warnings,
            },
            Ok(None) => ClaimOutcome::Claimed {
                assignment,
                warnings: Vec::new(),
            },
            Err(e) => {
                // The claim stands; the worker can start explicitly.
                warn!(
                    assignment_id = %assignment.assignment_id,
                    error = %e,
                    "auto-start after claim failed"
                );
                ClaimOutcome::Claimed {
                    assignment,
                    warnings: Vec::new(),
                }
            }
        }
    }
}

//! Preparation lifecycle.
//!
//! Every transition runs the same pipeline:
//! 1. load the assignment; closed or unknown assignments are rejected
//! 2. check ownership (admins bypass)
//! 3. apply the pure state machine and stamp the configured remote tag
//! 4. persist with compare-and-set on the state we read; terminal states
//!    are archived and the active row deleted in the same write
//! 5. push the tag (best effort, bounded by timeout) and record the outcome
//!
//! A lost compare-and-set reloads and retries from step 1 without having
//! touched the platform.

pub mod state_machine;

use pkd_schemas::{ArchivedAssignment, Assignment, AssignmentState};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use uuid::Uuid;

use crate::engine::{append_note, Engine, CAS_ATTEMPTS};
use crate::error::{EngineError, SyncWarning};
use crate::ports::StoredAssignment;

pub use state_machine::{apply_transition, duration_secs, is_legal, TransitionError};

/// Who is asking for a transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Actor {
    /// Must own the assignment.
    Worker(String),
    /// Administrative override; ownership is not checked.
    Admin,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransitionRequest {
    pub actor: Actor,
    pub target: AssignmentState,
    /// The remote status was already updated by another path: record the
    /// configured tag as synced without calling the platform.
    pub skip_remote_sync: bool,
    pub note: Option<String>,
}

impl TransitionRequest {
    pub fn by_worker(worker_id: impl Into<String>, target: AssignmentState) -> Self {
        Self {
            actor: Actor::Worker(worker_id.into()),
            target,
            skip_remote_sync: false,
            note: None,
        }
    }

    pub fn by_admin(target: AssignmentState) -> Self {
        Self {
            actor: Actor::Admin,
            target,
            skip_remote_sync: false,
            note: None,
        }
    }

    pub fn skip_remote_sync(mut self, skip: bool) -> Self {
        self.skip_remote_sync = skip;
        self
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.note = Some(note.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TransitionOutcome {
    pub assignment: Assignment,
    /// Set on completion.
    pub duration_secs: Option<i64>,
    /// The assignment moved to history.
    pub archived: bool,
    pub warnings: Vec<SyncWarning>,
}

impl Engine {
    pub async fn transition(
        &self,
        assignment_id: Uuid,
        request: TransitionRequest,
    ) -> Result<TransitionOutcome, EngineError> {
        for _ in 0..CAS_ATTEMPTS {
            let current = self.fetch_active(assignment_id).await?;

            if let Actor::Worker(worker_id) = &request.actor {
                if *worker_id != current.worker_id {
                    return Err(EngineError::NotAssignmentOwner {
                        assignment_id,
                        worker_id: worker_id.clone(),
                    });
                }
            }

            if let Some(outcome) = self.try_apply(&current, &request).await? {
                return Ok(outcome);
            }
            debug!(assignment_id = %assignment_id, "transition lost a concurrent update; reloading");
        }
        Err(EngineError::ConcurrentUpdate(assignment_id))
    }

    /// Move `assigned -> preparing` iff the persisted row has never been
    /// started. Safe to call repeatedly and from several processes: only the
    /// caller that wins the compare-and-set performs the transition.
    pub async fn ensure_started(
        &self,
        assignment_id: Uuid,
    ) -> Result<Option<TransitionOutcome>, EngineError> {
        let current = match self.store.fetch(assignment_id).await? {
            Some(StoredAssignment::Active(a)) => a,
            Some(StoredAssignment::Archived(_)) => return Ok(None),
            None => return Err(EngineError::AssignmentNotFound(assignment_id.to_string())),
        };
        if current.state != AssignmentState::Assigned || current.started_at_utc.is_some() {
            return Ok(None);
        }
        let request = TransitionRequest::by_admin(AssignmentState::Preparing);
        self.try_apply(&current, &request).await
    }

    /// `Ok(None)` when the row changed between read and write. Nothing is
    /// pushed to the platform in that case.
    async fn try_apply(
        &self,
        current: &Assignment,
        request: &TransitionRequest,
    ) -> Result<Option<TransitionOutcome>, EngineError> {
        let mut next = apply_transition(current, request.target, self.now())?;
        if let Some(note) = request.note.as_deref() {
            append_note(&mut next.notes, note);
        }
        let pending_tag = self.stamp_remote_status(&mut next, request.skip_remote_sync);

        let archived = next.state.is_terminal();
        let duration = duration_secs(&next);

        let written = if archived {
            let closed_at = next
                .completed_at_utc
                .unwrap_or_else(|| state_machine::monotonic_now(&next, self.now()));
            let record = ArchivedAssignment {
                assignment: next.clone(),
                closed_at_utc: closed_at,
                duration_secs: duration,
            };
            self.store.archive(&record, current.state).await?
        } else {
            self.store.update_active(&next, current.state).await?
        };

        if !written {
            return Ok(None);
        }

        let warnings = match pending_tag {
            Some(tag) => self.deliver_remote_status(&mut next, &tag, archived).await,
            None => Vec::new(),
        };

        info!(
            assignment_id = %next.assignment_id,
            order_id = %next.order_id,
            worker_id = %next.worker_id,
            from = %current.state,
            to = %next.state,
            remote_synced = next.remote_status_synced,
            "assignment transitioned"
        );

        Ok(Some(TransitionOutcome {
            assignment: next,
            duration_secs: duration,
            archived,
            warnings,
        }))
    }
}

//! Error taxonomy.
//!
//! - Precondition violations (`WorkerAlreadyHasActiveOrder`, `TargetWorkerBusy`,
//!   `InvalidCount`) are surfaced verbatim and never retried.
//! - Claim contention is retried internally and never appears here; an
//!   exhausted claim is `ClaimOutcome::NoOrdersAvailable`, not an error.
//! - Remote failures during status sync are [`SyncWarning`]s attached to
//!   results. Only reads that cannot proceed without the remote
//!   (candidate listing, snapshot refresh) return [`EngineError::Remote`].
//! - Not-found / already-closed conditions are terminal for the call.

use pkd_reconcile::InvalidCount;
use pkd_schemas::AssignmentState;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::prep::TransitionError;

/// Storage layer failure. Constraint conflicts are NOT errors; they are typed
/// outcomes on the store traits.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error(transparent)]
    Backend(#[from] anyhow::Error),
}

/// Failure talking to the commerce platform.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RemoteError {
    #[error("remote unreachable: {0}")]
    Unreachable(String),
    #[error("remote rejected request: {0}")]
    Rejected(String),
    #[error("remote order not found: {0}")]
    OrderNotFound(String),
    #[error("remote call timed out after {0}ms")]
    Timeout(u64),
}

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("WORKER_ALREADY_HAS_ACTIVE_ORDER: worker {worker_id} already holds an active assignment")]
    WorkerAlreadyHasActiveOrder {
        worker_id: String,
        assignment_id: Option<Uuid>,
    },

    #[error("TARGET_WORKER_BUSY: worker {worker_id} already holds an active assignment")]
    TargetWorkerBusy { worker_id: String },

    #[error(transparent)]
    InvalidCount(#[from] InvalidCount),

    #[error("ASSIGNMENT_NOT_FOUND: {0}")]
    AssignmentNotFound(String),

    #[error("ASSIGNMENT_ALREADY_CLOSED: {assignment_id} is {state}")]
    AssignmentAlreadyClosed {
        assignment_id: Uuid,
        state: AssignmentState,
    },

    #[error("ASSIGNMENT_NOT_ARCHIVED: {assignment_id} is still {state}")]
    AssignmentNotArchived {
        assignment_id: Uuid,
        state: AssignmentState,
    },

    #[error("REMOVAL_PROTECTED: {assignment_id} is {state}; settled history cannot be removed")]
    RemovalProtected {
        assignment_id: Uuid,
        state: AssignmentState,
    },

    #[error("NOT_ASSIGNMENT_OWNER: {assignment_id} does not belong to worker {worker_id}")]
    NotAssignmentOwner {
        assignment_id: Uuid,
        worker_id: String,
    },

    #[error(transparent)]
    IllegalTransition(#[from] TransitionError),

    #[error("ORDER_ALREADY_CLAIMED: order {0} is held by an assignment")]
    OrderAlreadyClaimed(String),

    #[error("CONCURRENT_UPDATE: {0} kept changing under concurrent writers")]
    ConcurrentUpdate(Uuid),

    #[error(transparent)]
    Remote(#[from] RemoteError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl EngineError {
    /// Stable machine-readable code for CLI output and logs.
    pub fn code(&self) -> &'static str {
        match self {
            EngineError::WorkerAlreadyHasActiveOrder { .. } => "WORKER_ALREADY_HAS_ACTIVE_ORDER",
            EngineError::TargetWorkerBusy { .. } => "TARGET_WORKER_BUSY",
            EngineError::InvalidCount(_) => "INVALID_COUNT",
            EngineError::AssignmentNotFound(_) => "ASSIGNMENT_NOT_FOUND",
            EngineError::AssignmentAlreadyClosed { .. } => "ASSIGNMENT_ALREADY_CLOSED",
            EngineError::AssignmentNotArchived { .. } => "ASSIGNMENT_NOT_ARCHIVED",
            EngineError::RemovalProtected { .. } => "REMOVAL_PROTECTED",
            EngineError::NotAssignmentOwner { .. } => "NOT_ASSIGNMENT_OWNER",
            EngineError::IllegalTransition(_) => "ILLEGAL_TRANSITION",
            EngineError::OrderAlreadyClaimed(_) => "ORDER_ALREADY_CLAIMED",
            EngineError::ConcurrentUpdate(_) => "CONCURRENT_UPDATE",
            EngineError::Remote(_) => "REMOTE_UNAVAILABLE",
            EngineError::Store(_) => "STORE_UNAVAILABLE",
        }
    }
}

impl From<anyhow::Error> for EngineError {
    fn from(e: anyhow::Error) -> Self {
        EngineError::Store(StoreError::Backend(e))
    }
}

/// Soft warning: a remote status sync did not go through. The local change
/// stands; the sync was queued for out-of-band retry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncWarning {
    pub order_id: String,
    pub status_tag: String,
    pub error: String,
    /// Outbox row queued for retry, if enqueueing succeeded.
    pub sync_id: Option<Uuid>,
}

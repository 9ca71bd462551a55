//! Collaborator seams.
//!
//! The engine never talks to Postgres or to the commerce platform directly;
//! it goes through these traits. `pkd-db` implements the store traits on
//! Postgres, `pkd-testkit` implements all of them in memory.
//!
//! Store contract: uniqueness is enforced by the store, not by the caller.
//! - One claim lock per `order_id`, held by an active or archived assignment
//!   until reopened or removed.
//! - At most one non-terminal assignment per `worker_id`.
//! Writes that would break either rule return a conflict outcome instead of
//! mutating anything.

use std::collections::{BTreeMap, HashSet};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use pkd_schemas::{ArchivedAssignment, Assignment, AssignmentState, Order, PriorityMark, WorkerRef};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{RemoteError, StoreError};

pub type StoreResult<T> = Result<T, StoreError>;

// ---------------------------------------------------------------------------
// OrderSource (remote commerce platform)
// ---------------------------------------------------------------------------

#[async_trait]
pub trait OrderSource: Send + Sync {
    /// Orders whose remote status tag is in `status_filter`.
    async fn list_open_orders(&self, status_filter: &[String]) -> Result<Vec<Order>, RemoteError>;

    async fn get_order(&self, order_id: &str) -> Result<Order, RemoteError>;

    async fn set_remote_status(&self, order_id: &str, status_tag: &str) -> Result<(), RemoteError>;
}

// ---------------------------------------------------------------------------
// AssignmentStore
// ---------------------------------------------------------------------------

/// An assignment as found in storage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "storage", content = "record", rename_all = "snake_case")]
pub enum StoredAssignment {
    Active(Assignment),
    Archived(ArchivedAssignment),
}

impl StoredAssignment {
    pub fn assignment(&self) -> &Assignment {
        match self {
            StoredAssignment::Active(a) => a,
            StoredAssignment::Archived(h) => &h.assignment,
        }
    }

    pub fn state(&self) -> AssignmentState {
        self.assignment().state
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted,
    /// Another assignment holds the order's claim lock.
    OrderTaken,
    /// The worker already holds a non-terminal assignment.
    WorkerBusy,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReassignOutcome {
    Reassigned,
    /// The assignment is no longer an active row.
    NotActive,
    /// The target worker already holds a non-terminal assignment.
    WorkerBusy,
}

#[async_trait]
pub trait AssignmentStore: Send + Sync {
    /// Order ids currently holding a claim lock (active or archived).
    async fn claimed_order_ids(&self) -> StoreResult<HashSet<String>>;

    /// Atomically take the claim lock for `a.order_id` and insert `a` as an
    /// active row.
    async fn insert_claimed(&self, a: &Assignment) -> StoreResult<InsertOutcome>;

    async fn fetch(&self, assignment_id: Uuid) -> StoreResult<Option<StoredAssignment>>;

    /// The assignment currently holding the claim lock for `order_id`.
    async fn fetch_by_order(&self, order_id: &str) -> StoreResult<Option<StoredAssignment>>;

    async fn active_for_worker(&self, worker_id: &str) -> StoreResult<Option<Assignment>>;

    async fn list_active(&self) -> StoreResult<Vec<Assignment>>;

    /// Overwrite the mutable fields of an active row (state, timestamps,
    /// remote sync fields, snapshot, priority, notes) iff its state is still
    /// `expected`. Worker fields are not touched. Returns false on mismatch.
    async fn update_active(&self, a: &Assignment, expected: AssignmentState) -> StoreResult<bool>;

    /// Move an active assignment to `worker` under the per-worker constraint.
    async fn reassign(&self, assignment_id: Uuid, worker: &WorkerRef) -> StoreResult<ReassignOutcome>;

    /// Delete the active row (iff still in `expected`) and insert the history
    /// record, in one transaction. The claim lock is kept.
    async fn archive(&self, record: &ArchivedAssignment, expected: AssignmentState) -> StoreResult<bool>;

    /// Record the outcome of a status push made after the assignment was
    /// archived: sets the synced flag and notes of the history row iff its
    /// `remote_status` is still `tag`. State and timestamps are never written.
    async fn record_archived_sync(
        &self,
        assignment_id: Uuid,
        tag: &str,
        synced: bool,
        notes: Option<&str>,
    ) -> StoreResult<bool>;

    /// Drop the claim lock held by an archived assignment. Returns false if the
    /// lock was already gone.
    async fn release_claim(&self, assignment_id: Uuid) -> StoreResult<bool>;

    /// Delete an active row and its claim lock. Returns false if the row was
    /// not active.
    async fn remove_active(&self, assignment_id: Uuid) -> StoreResult<bool>;

    /// Sum of `sku` quantities across all active assignment snapshots.
    async fn pending_quantity(&self, sku: &str) -> StoreResult<i64>;

    async fn count_archived_by_state(&self) -> StoreResult<BTreeMap<AssignmentState, i64>>;
}

// ---------------------------------------------------------------------------
// PriorityOverlay
// ---------------------------------------------------------------------------

#[async_trait]
pub trait PriorityOverlay: Send + Sync {
    async fn list_marks(&self) -> StoreResult<Vec<PriorityMark>>;

    /// Insert a mark, or update reason/notes of an existing one. An existing
    /// mark keeps its original `created_at_utc` so re-marking does not move
    /// it in the queue. Returns the stored mark.
    async fn upsert_mark(&self, mark: &PriorityMark) -> StoreResult<PriorityMark>;

    async fn delete_mark(&self, order_id: &str) -> StoreResult<bool>;
}

// ---------------------------------------------------------------------------
// RemoteSyncOutbox
// ---------------------------------------------------------------------------

/// A remote status change that failed and awaits retry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingSync {
    pub sync_id: Uuid,
    pub assignment_id: Uuid,
    pub order_id: String,
    pub status_tag: String,
    pub last_error: String,
    pub attempts: i32,
    pub enqueued_at_utc: DateTime<Utc>,
}

#[async_trait]
pub trait RemoteSyncOutbox: Send + Sync {
    async fn enqueue_sync(&self, item: &PendingSync) -> StoreResult<()>;

    /// Oldest first.
    async fn list_pending_syncs(&self, limit: usize) -> StoreResult<Vec<PendingSync>>;

    async fn mark_sync_done(&self, sync_id: Uuid) -> StoreResult<()>;

    async fn mark_sync_failed(&self, sync_id: Uuid, error: &str) -> StoreResult<()>;

    /// Close every undelivered item queued for `assignment_id`. Returns how
    /// many were closed.
    async fn discard_syncs(&self, assignment_id: Uuid) -> StoreResult<u64>;
}

// ---------------------------------------------------------------------------
// ProductLocationIndex
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BinLocation {
    pub sku: String,
    pub bin: String,
    pub updated_at_utc: DateTime<Utc>,
}

#[async_trait]
pub trait ProductLocationIndex: Send + Sync {
    async fn lookup_bin(&self, sku: &str) -> StoreResult<Option<BinLocation>>;
}

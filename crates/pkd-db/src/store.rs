use std::collections::{BTreeMap, HashSet};

use async_trait::async_trait;
use pkd_engine::{
    AssignmentStore, BinLocation, InsertOutcome, PendingSync, PriorityOverlay,
    ProductLocationIndex, ReassignOutcome, RemoteSyncOutbox, StoreResult, StoredAssignment,
};
use pkd_schemas::{ArchivedAssignment, Assignment, AssignmentState, PriorityMark, WorkerRef};
use sqlx::PgPool;
use uuid::Uuid;

/// Postgres-backed store for the engine. Clones share the pool.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl AssignmentStore for PgStore {
    async fn claimed_order_ids(&self) -> StoreResult<HashSet<String>> {
        Ok(crate::claimed_order_ids(&self.pool).await?)
    }

    async fn insert_claimed(&self, a: &Assignment) -> StoreResult<InsertOutcome> {
        Ok(crate::insert_claimed(&self.pool, a).await?)
    }

    async fn fetch(&self, assignment_id: Uuid) -> StoreResult<Option<StoredAssignment>> {
        Ok(crate::fetch_assignment(&self.pool, assignment_id).await?)
    }

    async fn fetch_by_order(&self, order_id: &str) -> StoreResult<Option<StoredAssignment>> {
        Ok(crate::fetch_assignment_by_order(&self.pool, order_id).await?)
    }

    async fn active_for_worker(&self, worker_id: &str) -> StoreResult<Option<Assignment>> {
        Ok(crate::active_for_worker(&self.pool, worker_id).await?)
    }

    async fn list_active(&self) -> StoreResult<Vec<Assignment>> {
        Ok(crate::list_active(&self.pool).await?)
    }

    async fn update_active(&self, a: &Assignment, expected: AssignmentState) -> StoreResult<bool> {
        Ok(crate::update_active(&self.pool, a, expected).await?)
    }

    async fn reassign(&self, assignment_id: Uuid, worker: &WorkerRef) -> StoreResult<ReassignOutcome> {
        Ok(crate::reassign_assignment(&self.pool, assignment_id, worker).await?)
    }

    async fn archive(&self, record: &ArchivedAssignment, expected: AssignmentState) -> StoreResult<bool> {
        Ok(crate::archive_assignment(&self.pool, record, expected).await?)
    }

    async fn record_archived_sync(
        &self,
        assignment_id: Uuid,
        tag: &str,
        synced: bool,
        notes: Option<&str>,
    ) -> StoreResult<bool> {
        Ok(crate::record_archived_sync(&self.pool, assignment_id, tag, synced, notes).await?)
    }

    async fn release_claim(&self, assignment_id: Uuid) -> StoreResult<bool> {
        Ok(crate::release_claim(&self.pool, assignment_id).await?)
    }

    async fn remove_active(&self, assignment_id: Uuid) -> StoreResult<bool> {
        Ok(crate::remove_active(&self.pool, assignment_id).await?)
    }

    async fn pending_quantity(&self, sku: &str) -> StoreResult<i64> {
        Ok(crate::pending_quantity(&self.pool, sku).await?)
    }

    async fn count_archived_by_state(&self) -> StoreResult<BTreeMap<AssignmentState, i64>> {
        Ok(crate::count_archived_by_state(&self.pool).await?)
    }
}

#[async_trait]
impl PriorityOverlay for PgStore {
    async fn list_marks(&self) -> StoreResult<Vec<PriorityMark>> {
        Ok(crate::list_marks(&self.pool).await?)
    }

    async fn upsert_mark(&self, mark: &PriorityMark) -> StoreResult<PriorityMark> {
        Ok(crate::upsert_mark(&self.pool, mark).await?)
    }

    async fn delete_mark(&self, order_id: &str) -> StoreResult<bool> {
        Ok(crate::delete_mark(&self.pool, order_id).await?)
    }
}

#[async_trait]
impl RemoteSyncOutbox for PgStore {
    async fn enqueue_sync(&self, item: &PendingSync) -> StoreResult<()> {
        Ok(crate::enqueue_sync(&self.pool, item).await?)
    }

    async fn list_pending_syncs(&self, limit: usize) -> StoreResult<Vec<PendingSync>> {
        Ok(crate::list_pending_syncs(&self.pool, limit).await?)
    }

    async fn mark_sync_done(&self, sync_id: Uuid) -> StoreResult<()> {
        Ok(crate::mark_sync_done(&self.pool, sync_id).await?)
    }

    async fn mark_sync_failed(&self, sync_id: Uuid, error: &str) -> StoreResult<()> {
        Ok(crate::mark_sync_failed(&self.pool, sync_id, error).await?)
    }

    async fn discard_syncs(&self, assignment_id: Uuid) -> StoreResult<u64> {
        Ok(crate::discard_syncs(&self.pool, assignment_id).await?)
    }
}

#[async_trait]
impl ProductLocationIndex for PgStore {
    async fn lookup_bin(&self, sku: &str) -> StoreResult<Option<BinLocation>> {
        Ok(crate::lookup_bin(&self.pool, sku).await?)
    }
}

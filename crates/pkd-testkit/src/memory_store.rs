use std::collections::{BTreeMap, HashSet};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use pkd_engine::{
    AssignmentStore, BinLocation, InsertOutcome, PendingSync, PriorityOverlay,
    ProductLocationIndex, ReassignOutcome, RemoteSyncOutbox, StoreResult, StoredAssignment,
};
use pkd_schemas::{ArchivedAssignment, Assignment, AssignmentState, PriorityMark, WorkerRef};
use tokio::sync::Mutex;
use uuid::Uuid;

#[derive(Default)]
struct Inner {
    active: BTreeMap<Uuid, Assignment>,
    history: BTreeMap<Uuid, ArchivedAssignment>,
    /// order_id -> assignment_id holding the claim lock.
    claims: BTreeMap<String, Uuid>,
    marks: BTreeMap<String, PriorityMark>,
    /// (item, delivered)
    outbox: Vec<(PendingSync, bool)>,
    locations: BTreeMap<String, BinLocation>,
}

impl Inner {
    fn worker_busy(&self, worker_id: &str, except: Option<Uuid>) -> bool {
        self.active
            .values()
            .any(|a| a.worker_id == worker_id && Some(a.assignment_id) != except)
    }
}

/// In-memory store. Mirrors the Postgres schema: active rows, history, claim
/// locks, priority marks, remote sync outbox, product locations.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Place a mark with an explicit timestamp.
    pub async fn insert_mark(&self, order_id: &str, reason: &str, created_at_utc: DateTime<Utc>) {
        let mark = PriorityMark {
            order_id: order_id.to_string(),
            reason: reason.to_string(),
            notes: None,
            created_at_utc,
        };
        self.inner
            .lock()
            .await
            .marks
            .insert(order_id.to_string(), mark);
    }

    pub async fn set_bin(&self, sku: &str, bin: &str) {
        let loc = BinLocation {
            sku: sku.to_string(),
            bin: bin.to_string(),
            updated_at_utc: Utc::now(),
        };
        self.inner.lock().await.locations.insert(sku.to_string(), loc);
    }

    pub async fn active_count(&self) -> usize {
        self.inner.lock().await.active.len()
    }

    pub async fn history_count(&self) -> usize {
        self.inner.lock().await.history.len()
    }

    pub async fn archived(&self, assignment_id: Uuid) -> Option<ArchivedAssignment> {
        self.inner.lock().await.history.get(&assignment_id).cloned()
    }

    /// Every outbox item ever queued, delivered or not.
    pub async fn outbox_items(&self) -> Vec<(PendingSync, bool)> {
        self.inner.lock().await.outbox.clone()
    }
}

#[async_trait]
impl AssignmentStore for MemoryStore {
    async fn claimed_order_ids(&self) -> StoreResult<HashSet<String>> {
        Ok(self.inner.lock().await.claims.keys().cloned().collect())
    }

    async fn insert_claimed(&self, a: &Assignment) -> StoreResult<InsertOutcome> {
        // Let concurrent claimers interleave between their reads and this write.
        tokio::task::yield_now().await;

        let mut g = self.inner.lock().await;
        if g.claims.contains_key(&a.order_id) {
            return Ok(InsertOutcome::OrderTaken);
        }
        if g.worker_busy(&a.worker_id, None) {
            return Ok(InsertOutcome::WorkerBusy);
        }
        g.claims.insert(a.order_id.clone(), a.assignment_id);
        g.active.insert(a.assignment_id, a.clone());
        Ok(InsertOutcome::Inserted)
    }

    async fn fetch(&self, assignment_id: Uuid) -> StoreResult<Option<StoredAssignment>> {
        let g = self.inner.lock().await;
        if let Some(a) = g.active.get(&assignment_id) {
            return Ok(Some(StoredAssignment::Active(a.clone())));
        }
        Ok(g
            .history
            .get(&assignment_id)
            .cloned()
            .map(StoredAssignment::Archived))
    }

    async fn fetch_by_order(&self, order_id: &str) -> StoreResult<Option<StoredAssignment>> {
        let holder = self.inner.lock().await.claims.get(order_id).copied();
        match holder {
            Some(id) => self.fetch(id).await,
            None => Ok(None),
        }
    }

    async fn active_for_worker(&self, worker_id: &str) -> StoreResult<Option<Assignment>> {
        let g = self.inner.lock().await;
        Ok(g.active.values().find(|a| a.worker_id == worker_id).cloned())
    }

    async fn list_active(&self) -> StoreResult<Vec<Assignment>> {
        Ok(self.inner.lock().await.active.values().cloned().collect())
    }

    async fn update_active(&self, a: &Assignment, expected: AssignmentState) -> StoreResult<bool> {
        let mut g = self.inner.lock().await;
        let Some(row) = g.active.get_mut(&a.assignment_id) else {
            return Ok(false);
        };
        if row.state != expected {
            return Ok(false);
        }
        let (worker_id, worker_name) = (row.worker_id.clone(), row.worker_name.clone());
        *row = a.clone();
        row.worker_id = worker_id;
        row.worker_name = worker_name;
        Ok(true)
    }

    async fn reassign(&self, assignment_id: Uuid, worker: &WorkerRef) -> StoreResult<ReassignOutcome> {
        let mut g = self.inner.lock().await;
        if !g.active.contains_key(&assignment_id) {
            return Ok(ReassignOutcome::NotActive);
        }
        if g.worker_busy(&worker.worker_id, Some(assignment_id)) {
            return Ok(ReassignOutcome::WorkerBusy);
        }
        if let Some(row) = g.active.get_mut(&assignment_id) {
            row.worker_id = worker.worker_id.clone();
            row.worker_name = worker.worker_name.clone();
        }
        Ok(ReassignOutcome::Reassigned)
    }

    async fn archive(&self, record: &ArchivedAssignment, expected: AssignmentState) -> StoreResult<bool> {
        let id = record.assignment.assignment_id;
        let mut g = self.inner.lock().await;
        match g.active.get(&id) {
            Some(row) if row.state == expected => {}
            _ => return Ok(false),
        }
        g.active.remove(&id);
        g.history.insert(id, record.clone());
        Ok(true)
    }

    async fn record_archived_sync(
        &self,
        assignment_id: Uuid,
        tag: &str,
        synced: bool,
        notes: Option<&str>,
    ) -> StoreResult<bool> {
        let mut g = self.inner.lock().await;
        match g.history.get_mut(&assignment_id) {
            Some(h) if h.assignment.remote_status.as_deref() == Some(tag) => {
                h.assignment.remote_status_synced = synced;
                h.assignment.notes = notes.map(str::to_string);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn release_claim(&self, assignment_id: Uuid) -> StoreResult<bool> {
        let mut g = self.inner.lock().await;
        if g.active.contains_key(&assignment_id) {
            return Ok(false);
        }
        let before = g.claims.len();
        g.claims.retain(|_, holder| *holder != assignment_id);
        Ok(g.claims.len() != before)
    }

    async fn remove_active(&self, assignment_id: Uuid) -> StoreResult<bool> {
        let mut g = self.inner.lock().await;
        if g.active.remove(&assignment_id).is_none() {
            return Ok(false);
        }
        g.claims.retain(|_, holder| *holder != assignment_id);
        Ok(true)
    }

    async fn pending_quantity(&self, sku: &str) -> StoreResult<i64> {
        let g = self.inner.lock().await;
        Ok(g.active
            .values()
            .flat_map(|a| a.order_snapshot.order.line_items.iter())
            .filter(|li| li.sku == sku)
            .map(|li| li.quantity.max(0))
            .sum())
    }

    async fn count_archived_by_state(&self) -> StoreResult<BTreeMap<AssignmentState, i64>> {
        let g = self.inner.lock().await;
        let mut out = BTreeMap::new();
        for h in g.history.values() {
            *out.entry(h.assignment.state).or_default() += 1;
        }
        Ok(out)
    }
}

#[async_trait]
impl PriorityOverlay for MemoryStore {
    async fn list_marks(&self) -> StoreResult<Vec<PriorityMark>> {
        Ok(self.inner.lock().await.marks.values().cloned().collect())
    }

    async fn upsert_mark(&self, mark: &PriorityMark) -> StoreResult<PriorityMark> {
        let mut g = self.inner.lock().await;
        let stored = g
            .marks
            .entry(mark.order_id.clone())
            .and_modify(|m| {
                m.reason = mark.reason.clone();
                m.notes = mark.notes.clone();
            })
            .or_insert_with(|| mark.clone());
        Ok(stored.clone())
    }

    async fn delete_mark(&self, order_id: &str) -> StoreResult<bool> {
        Ok(self.inner.lock().await.marks.remove(order_id).is_some())
    }
}

#[async_trait]
impl RemoteSyncOutbox for MemoryStore {
    async fn enqueue_sync(&self, item: &PendingSync) -> StoreResult<()> {
        self.inner.lock().await.outbox.push((item.clone(), false));
        Ok(())
    }

    async fn list_pending_syncs(&self, limit: usize) -> StoreResult<Vec<PendingSync>> {
        let g = self.inner.lock().await;
        let mut pending: Vec<PendingSync> = g
            .outbox
            .iter()
            .filter(|(_, done)| !done)
            .map(|(item, _)| item.clone())
            .collect();
        pending.sort_by(|a, b| {
            a.enqueued_at_utc
                .cmp(&b.enqueued_at_utc)
                .then_with(|| a.sync_id.cmp(&b.sync_id))
        });
        pending.truncate(limit);
        Ok(pending)
    }

    async fn mark_sync_done(&self, sync_id: Uuid) -> StoreResult<()> {
        let mut g = self.inner.lock().await;
        if let Some((_, done)) = g.outbox.iter_mut().find(|(i, _)| i.sync_id == sync_id) {
            *done = true;
        }
        Ok(())
    }

    async fn mark_sync_failed(&self, sync_id: Uuid, error: &str) -> StoreResult<()> {
        let mut g = self.inner.lock().await;
        if let Some((item, _)) = g.outbox.iter_mut().find(|(i, _)| i.sync_id == sync_id) {
            item.attempts += 1;
            item.last_error = error.to_string();
        }
        Ok(())
    }

    async fn discard_syncs(&self, assignment_id: Uuid) -> StoreResult<u64> {
        let mut g = self.inner.lock().await;
        let mut n = 0;
        for (item, done) in g.outbox.iter_mut() {
            if item.assignment_id == assignment_id && !*done {
                *done = true;
                n += 1;
            }
        }
        Ok(n)
    }
}

#[async_trait]
impl ProductLocationIndex for MemoryStore {
    async fn lookup_bin(&self, sku: &str) -> StoreResult<Option<BinLocation>> {
        Ok(self.inner.lock().await.locations.get(sku).cloned())
    }
}

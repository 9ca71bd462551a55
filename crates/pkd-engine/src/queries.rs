use std::collections::BTreeMap;

use pkd_schemas::{Assignment, AssignmentState};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::engine::Engine;
use crate::error::EngineError;
use crate::ports::StoredAssignment;

/// Dashboard counters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stats {
    pub active_by_state: BTreeMap<AssignmentState, i64>,
    pub archived_by_state: BTreeMap<AssignmentState, i64>,
    pub active_by_worker: BTreeMap<String, i64>,
    pub priority_marks: usize,
}

impl Stats {
    pub fn total_active(&self) -> i64 {
        self.active_by_state.values().sum()
    }
}

impl Engine {
    /// Active or archived.
    pub async fn get(&self, assignment_id: Uuid) -> Result<StoredAssignment, EngineError> {
        self.store
            .fetch(assignment_id)
            .await?
            .ok_or_else(|| EngineError::AssignmentNotFound(assignment_id.to_string()))
    }

    /// Oldest claim first.
    pub async fn list_active(&self) -> Result<Vec<Assignment>, EngineError> {
        let mut active = self.store.list_active().await?;
        active.sort_by(|a, b| {
            a.assigned_at_utc
                .cmp(&b.assigned_at_utc)
                .then_with(|| a.order_id.cmp(&b.order_id))
        });
        Ok(active)
    }

    pub async fn active_for_worker(&self, worker_id: &str) -> Result<Option<Assignment>, EngineError> {
        Ok(self.store.active_for_worker(worker_id).await?)
    }

    pub async fn stats(&self) -> Result<Stats, EngineError> {
        let mut stats = Stats::default();
        for a in self.store.list_active().await? {
            *stats.active_by_state.entry(a.state).or_default() += 1;
            *stats.active_by_worker.entry(a.worker_id).or_default() += 1;
        }
        stats.archived_by_state = self.store.count_archived_by_state().await?;
        stats.priority_marks = self.overlay.list_marks().await?.len();
        Ok(stats)
    }
}

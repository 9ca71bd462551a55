use std::sync::Arc;

use chrono::{DateTime, Utc};
use pkd_config::EngineConfig;
use pkd_schemas::Assignment;
use uuid::Uuid;

use crate::error::EngineError;
use crate::ports::{
    AssignmentStore, OrderSource, PriorityOverlay, ProductLocationIndex, RemoteSyncOutbox,
    StoredAssignment,
};

/// Entry point for every exposed operation.
///
/// Cheap to clone: all collaborators are shared behind `Arc`, so background
/// tasks can own their own handle.
#[derive(Clone)]
pub struct Engine {
    pub(crate) store: Arc<dyn AssignmentStore>,
    pub(crate) overlay: Arc<dyn PriorityOverlay>,
    pub(crate) outbox: Arc<dyn RemoteSyncOutbox>,
    pub(crate) source: Arc<dyn OrderSource>,
    pub(crate) locations: Option<Arc<dyn ProductLocationIndex>>,
    pub(crate) config: EngineConfig,
}

/// Bound on compare-and-set retries when a concurrent writer moved an
/// assignment between our read and our write.
pub(crate) const CAS_ATTEMPTS: usize = 3;

impl Engine {
    /// `store` provides assignments, priority marks and the remote sync
    /// outbox; both bundled implementations (`pkd-db`, `pkd-testkit`) do.
    pub fn new<S>(store: Arc<S>, source: Arc<dyn OrderSource>, config: EngineConfig) -> Self
    where
        S: AssignmentStore + PriorityOverlay + RemoteSyncOutbox + 'static,
    {
        Self {
            store: store.clone(),
            overlay: store.clone(),
            outbox: store,
            source,
            locations: None,
            config,
        }
    }

    pub fn with_locations(mut self, locations: Arc<dyn ProductLocationIndex>) -> Self {
        self.locations = Some(locations);
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub(crate) fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    /// Fetch an assignment that must still be active.
    pub(crate) async fn fetch_active(&self, assignment_id: Uuid) -> Result<Assignment, EngineError> {
        match self.store.fetch(assignment_id).await? {
            Some(StoredAssignment::Active(a)) if !a.state.is_terminal() => Ok(a),
            Some(other) => Err(EngineError::AssignmentAlreadyClosed {
                assignment_id,
                state: other.state(),
            }),
            None => Err(EngineError::AssignmentNotFound(assignment_id.to_string())),
        }
    }

    /// Read-modify-write on an active assignment's mutable fields, retried
    /// when a concurrent transition changes its state underneath.
    pub(crate) async fn update_fields<F>(
        &self,
        assignment_id: Uuid,
        mut edit: F,
    ) -> Result<Assignment, EngineError>
    where
        F: FnMut(&mut Assignment),
    {
        for _ in 0..CAS_ATTEMPTS {
            let current = self.fetch_active(assignment_id).await?;
            let mut next = current.clone();
            edit(&mut next);
            if self.store.update_active(&next, current.state).await? {
                return Ok(next);
            }
        }
        Err(EngineError::ConcurrentUpdate(assignment_id))
    }
}

/// Append `line` to free-form notes, one entry per line.
pub(crate) fn append_note(notes: &mut Option<String>, line: &str) {
    match notes {
        Some(existing) if !existing.is_empty() => {
            existing.push('\n');
            existing.push_str(line);
        }
        _ => *notes = Some(line.to_string()),
    }
}

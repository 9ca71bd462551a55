//! pkd-engine
//!
//! Order assignment and fulfillment orchestration.
//!
//! - `claim`: hands exactly one open order to one worker; priority marks
//!   jump the queue, everything else is first-in-first-out.
//! - `prep`: drives an assignment through its preparation state machine and
//!   mirrors state changes to the commerce platform on a best-effort basis.
//! - `admin`: reassign, reopen, remove, release, priority administration.
//! - `stock`: physical count reconciliation against pending quantities.
//! - `sync` / `refresh`: out-of-band remote retry and snapshot refresh.
//!
//! Uniqueness (one claim per order, one active assignment per worker) is
//! enforced by the store behind [`AssignmentStore`]. The engine never holds a
//! lock across a remote call; contention surfaces as typed store outcomes and
//! is retried here.

mod admin;
mod claim;
mod engine;
mod error;
mod queries;
mod refresh;
mod source;
mod stock;
mod sync;

pub mod ports;
pub mod prep;

pub use admin::{BulkFailure, BulkReport, RemoveSelector};
pub use claim::{order_candidates, Candidate, ClaimOutcome};
pub use engine::Engine;
pub use error::{EngineError, RemoteError, StoreError, SyncWarning};
pub use ports::{
    AssignmentStore, BinLocation, InsertOutcome, OrderSource, PendingSync, PriorityOverlay,
    ProductLocationIndex, ReassignOutcome, RemoteSyncOutbox, StoreResult, StoredAssignment,
};
pub use prep::{Actor, TransitionError, TransitionOutcome, TransitionRequest};
pub use queries::Stats;
pub use refresh::{spawn_remote_sync_retry, spawn_snapshot_refresh, RefreshReport};
pub use source::FileOrderSource;
pub use stock::ReconcileView;
pub use sync::SyncRetryReport;

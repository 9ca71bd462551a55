//! pkd-testkit
//!
//! Deterministic collaborators for engine scenario tests:
//! - [`MemoryStore`]: every store trait in memory. All uniqueness checks run
//!   under one lock, standing in for the Postgres constraints.
//! - [`ScriptedOrderSource`]: an order feed whose status endpoint can be told
//!   to accept, fail, or hang.
//! - fixtures for orders, workers and a ready-made engine.

mod fixtures;
mod memory_store;
mod scripted_source;

pub use fixtures::{engine, engine_with, order, t, test_config, worker};
pub use memory_store::MemoryStore;
pub use scripted_source::{ScriptedOrderSource, StatusBehavior};

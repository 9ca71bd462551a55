//! pkd-reconcile
//!
//! Stock reconciliation calculator.
//!
//! Converts a worker's physical count into the quantity to publish to the
//! commerce platform, accounting for units already earmarked by in-flight
//! (claimed, unfinished) orders.
//!
//! Deterministic, pure logic. No IO. The caller supplies the freshly computed
//! pending quantity and is responsible for pushing the resulting delta.

mod engine;
mod types;

pub use engine::{normalize_count, reconcile_stock};
pub use types::*;

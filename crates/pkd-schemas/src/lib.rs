//! pkd-schemas
//!
//! Shared data model for the fulfillment engine. Orders are owned by the
//! remote commerce platform and are read-only here; assignments are owned by
//! the engine while active and archived to history once closed.
//!
//! Money is carried as fixed-point `i64` micros (1e-6). No floats cross this
//! boundary.

use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Micros scale (1e-6) used for monetary amounts.
pub const MICROS_SCALE: i64 = 1_000_000;

// ---------------------------------------------------------------------------
// Order (remote, read-only)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineItem {
    pub sku: String,
    pub quantity: i64,
    pub name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomerSummary {
    pub name: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub city: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderTotals {
    pub currency: String,
    pub total_micros: i64,
    #[serde(default)]
    pub shipping_micros: i64,
}

/// An order as published by the commerce platform.
///
/// `raw` is the platform's payload kept as an opaque blob; only the typed
/// fields above it are read by the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub order_id: String,
    pub order_number: String,
    /// Remote status tag (e.g. "processing").
    pub status: String,
    pub created_at_utc: DateTime<Utc>,
    pub line_items: Vec<LineItem>,
    #[serde(default)]
    pub customer: CustomerSummary,
    #[serde(default)]
    pub totals: OrderTotals,
    #[serde(default)]
    pub raw: Value,
}

impl Order {
    /// Total quantity of `sku` across all line items of this order.
    pub fn quantity_of(&self, sku: &str) -> i64 {
        self.line_items
            .iter()
            .filter(|li| li.sku == sku)
            .map(|li| li.quantity)
            .sum()
    }
}

/// Denormalized copy of an [`Order`] captured into an assignment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderSnapshot {
    pub captured_at_utc: DateTime<Utc>,
    pub order: Order,
}

impl OrderSnapshot {
    pub fn capture(order: Order, now: DateTime<Utc>) -> Self {
        Self {
            captured_at_utc: now,
            order,
        }
    }
}

// ---------------------------------------------------------------------------
// Assignment
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssignmentState {
    Assigned,
    Preparing,
    Waiting,
    Completed,
    Cancelled,
}

impl AssignmentState {
    pub const ALL: [AssignmentState; 5] = [
        AssignmentState::Assigned,
        AssignmentState::Preparing,
        AssignmentState::Waiting,
        AssignmentState::Completed,
        AssignmentState::Cancelled,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AssignmentState::Assigned => "assigned",
            AssignmentState::Preparing => "preparing",
            AssignmentState::Waiting => "waiting",
            AssignmentState::Completed => "completed",
            AssignmentState::Cancelled => "cancelled",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "assigned" => Ok(AssignmentState::Assigned),
            "preparing" => Ok(AssignmentState::Preparing),
            "waiting" => Ok(AssignmentState::Waiting),
            "completed" => Ok(AssignmentState::Completed),
            "cancelled" => Ok(AssignmentState::Cancelled),
            other => Err(anyhow!("invalid assignment state: {}", other)),
        }
    }

    /// Returns `true` if no further transitions are possible.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled)
    }
}

impl std::fmt::Display for AssignmentState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The worker an assignment is bound to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WorkerRef {
    pub worker_id: String,
    pub worker_name: String,
}

impl WorkerRef {
    pub fn new(worker_id: impl Into<String>, worker_name: impl Into<String>) -> Self {
        Self {
            worker_id: worker_id.into(),
            worker_name: worker_name.into(),
        }
    }
}

/// The durable record binding one order to one worker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Assignment {
    pub assignment_id: Uuid,
    pub order_id: String,
    pub order_number: String,
    pub worker_id: String,
    pub worker_name: String,
    pub state: AssignmentState,
    pub assigned_at_utc: DateTime<Utc>,
    pub started_at_utc: Option<DateTime<Utc>>,
    pub waiting_at_utc: Option<DateTime<Utc>>,
    pub completed_at_utc: Option<DateTime<Utc>>,
    /// Last remote status tag this assignment attempted to publish.
    pub remote_status: Option<String>,
    pub remote_status_synced: bool,
    pub order_snapshot: OrderSnapshot,
    pub is_high_priority: bool,
    pub priority_reason: Option<String>,
    pub notes: Option<String>,
}

impl Assignment {
    /// Build a freshly claimed assignment in the `assigned` state.
    pub fn claimed(
        order: Order,
        worker: &WorkerRef,
        priority: Option<&PriorityMark>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            assignment_id: Uuid::new_v4(),
            order_id: order.order_id.clone(),
            order_number: order.order_number.clone(),
            worker_id: worker.worker_id.clone(),
            worker_name: worker.worker_name.clone(),
            state: AssignmentState::Assigned,
            assigned_at_utc: now,
            started_at_utc: None,
            waiting_at_utc: None,
            completed_at_utc: None,
            remote_status: None,
            // Nothing to publish yet.
            remote_status_synced: true,
            order_snapshot: OrderSnapshot::capture(order, now),
            is_high_priority: priority.is_some(),
            priority_reason: priority.map(|m| m.reason.clone()),
            notes: None,
        }
    }

    pub fn quantity_of(&self, sku: &str) -> i64 {
        self.order_snapshot.order.quantity_of(sku)
    }

    pub fn is_active(&self) -> bool {
        !self.state.is_terminal()
    }
}

/// An assignment relocated to history after reaching a terminal state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArchivedAssignment {
    pub assignment: Assignment,
    pub closed_at_utc: DateTime<Utc>,
    /// `completed_at - (started_at ?? assigned_at)`; `None` for cancellations.
    pub duration_secs: Option<i64>,
}

// ---------------------------------------------------------------------------
// PriorityMark
// ---------------------------------------------------------------------------

/// Administrative flag that moves a not-yet-claimed order to the front of the
/// queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriorityMark {
    pub order_id: String,
    pub reason: String,
    pub notes: Option<String>,
    pub created_at_utc: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

//! Preparation state machine.
//!
//! Pure transition logic for a single assignment. Persistence, ownership and
//! remote sync live in [`super`]; this module only decides whether a move is
//! legal and which timestamps it stamps.
//!
//! ```text
//!   claim        start                park
//!   ─────► Assigned ─────► Preparing ─────► Waiting
//!             │              │  ▲              │
//!             │              │  └──── resume ──┤
//!             │              │                 │
//!             │           complete          complete
//!             │              ▼                 │
//!             │         Completed (term.) ◄────┘
//!             │
//!             └──── cancel (from any live state) ────► Cancelled (term.)
//! ```
//!
//! Nothing re-enters `Assigned`, and nothing leaves a terminal state.
//! Timestamps are stamped once and never move backwards: a clock reading
//! older than the latest stamp is lifted to that stamp.

use chrono::{DateTime, Utc};
use pkd_schemas::{Assignment, AssignmentState};

/// Returned when a transition is not in the table above.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("ILLEGAL_TRANSITION: {from} -> {to}")]
pub struct TransitionError {
    pub from: AssignmentState,
    pub to: AssignmentState,
}

pub fn is_legal(from: AssignmentState, to: AssignmentState) -> bool {
    use AssignmentState::*;

    matches!(
        (from, to),
        (Assigned, Preparing)
            | (Preparing, Waiting)
            | (Waiting, Preparing)
            | (Preparing | Waiting, Completed)
            | (Assigned | Preparing | Waiting, Cancelled)
    )
}

/// Apply `to` to a copy of `a`, stamping timestamps with `now`.
pub fn apply_transition(
    a: &Assignment,
    to: AssignmentState,
    now: DateTime<Utc>,
) -> Result<Assignment, TransitionError> {
    if !is_legal(a.state, to) {
        return Err(TransitionError { from: a.state, to });
    }

    let now = monotonic_now(a, now);
    let mut next = a.clone();
    next.state = to;

    match to {
        AssignmentState::Preparing => {
            // Resuming from Waiting keeps the original start.
            if next.started_at_utc.is_none() {
                next.started_at_utc = Some(now);
            }
        }
        AssignmentState::Waiting => {
            if next.waiting_at_utc.is_none() {
                next.waiting_at_utc = Some(now);
            }
        }
        AssignmentState::Completed => {
            next.completed_at_utc = Some(now);
        }
        AssignmentState::Cancelled | AssignmentState::Assigned => {}
    }

    Ok(next)
}

/// Latest timestamp already stamped on `a`.
pub fn latest_stamp(a: &Assignment) -> DateTime<Utc> {
    [a.started_at_utc, a.waiting_at_utc, a.completed_at_utc]
        .into_iter()
        .flatten()
        .fold(a.assigned_at_utc, DateTime::max)
}

pub fn monotonic_now(a: &Assignment, now: DateTime<Utc>) -> DateTime<Utc> {
    now.max(latest_stamp(a))
}

/// `completed_at - (started_at ?? assigned_at)` in whole seconds.
pub fn duration_secs(a: &Assignment) -> Option<i64> {
    let end = a.completed_at_utc?;
    let begin = a.started_at_utc.unwrap_or(a.assigned_at_utc);
    Some((end - begin).num_seconds())
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------

use std::collections::{BTreeMap, HashSet};

use anyhow::{anyhow, Context, Result};
use pkd_engine::{InsertOutcome, ReassignOutcome, StoredAssignment};
use pkd_schemas::{ArchivedAssignment, Assignment, AssignmentState, WorkerRef};
use serde_json::Value;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use tracing::debug;
use uuid::Uuid;

use crate::is_unique_constraint_violation;

const ASSIGNMENT_COLUMNS: &str = r#"
    assignment_id, order_id, order_number, worker_id, worker_name, state,
    assigned_at_utc, started_at_utc, waiting_at_utc, completed_at_utc,
    remote_status, remote_status_synced, order_snapshot,
    is_high_priority, priority_reason, notes
"#;

fn assignment_from_row(row: &PgRow) -> Result<Assignment> {
    let snapshot: Value = row.try_get("order_snapshot")?;
    Ok(Assignment {
        assignment_id: row.try_get("assignment_id")?,
        order_id: row.try_get("order_id")?,
        order_number: row.try_get("order_number")?,
        worker_id: row.try_get("worker_id")?,
        worker_name: row.try_get("worker_name")?,
        state: AssignmentState::parse(&row.try_get::<String, _>("state")?)?,
        assigned_at_utc: row.try_get("assigned_at_utc")?,
        started_at_utc: row.try_get("started_at_utc")?,
        waiting_at_utc: row.try_get("waiting_at_utc")?,
        completed_at_utc: row.try_get("completed_at_utc")?,
        remote_status: row.try_get("remote_status")?,
        remote_status_synced: row.try_get("remote_status_synced")?,
        order_snapshot: serde_json::from_value(snapshot).context("decode order_snapshot")?,
        is_high_priority: row.try_get("is_high_priority")?,
        priority_reason: row.try_get("priority_reason")?,
        notes: row.try_get("notes")?,
    })
}

fn archived_from_row(row: &PgRow) -> Result<ArchivedAssignment> {
    Ok(ArchivedAssignment {
        assignment: assignment_from_row(row)?,
        closed_at_utc: row.try_get("closed_at_utc")?,
        duration_secs: row.try_get("duration_secs")?,
    })
}

fn snapshot_json(a: &Assignment) -> Result<Value> {
    serde_json::to_value(&a.order_snapshot).context("encode order_snapshot")
}

/// Order ids holding a claim lock.
pub async fn claimed_order_ids(pool: &PgPool) -> Result<HashSet<String>> {
    let rows: Vec<(String,)> = sqlx::query_as("select order_id from order_claims")
        .fetch_all(pool)
        .await
        .context("claimed_order_ids failed")?;
    Ok(rows.into_iter().map(|(id,)| id).collect())
}

/// Take the claim lock and insert the active row in one transaction.
pub async fn insert_claimed(pool: &PgPool, a: &Assignment) -> Result<InsertOutcome> {
    let mut tx = pool.begin().await.context("insert_claimed begin failed")?;

    let lock = sqlx::query(
        r#"
        insert into order_claims (order_id, assignment_id, claimed_at_utc)
        values ($1, $2, $3)
        "#,
    )
    .bind(&a.order_id)
    .bind(a.assignment_id)
    .bind(a.assigned_at_utc)
    .execute(&mut *tx)
    .await;

    if let Err(e) = lock {
        if is_unique_constraint_violation(&e, "pk_order_claims") {
            debug!(order_id = %a.order_id, "claim lock already held");
            return Ok(InsertOutcome::OrderTaken);
        }
        return Err(anyhow::Error::new(e).context("insert order_claims failed"));
    }

    let res = sqlx::query(
        r#"
        insert into assignments (
          assignment_id, order_id, order_number, worker_id, worker_name, state,
          assigned_at_utc, started_at_utc, waiting_at_utc, completed_at_utc,
          remote_status, remote_status_synced, order_snapshot,
          is_high_priority, priority_reason, notes
        ) values (
          $1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16
        )
        "#,
    )
    .bind(a.assignment_id)
    .bind(&a.order_id)
    .bind(&a.order_number)
    .bind(&a.worker_id)
    .bind(&a.worker_name)
    .bind(a.state.as_str())
    .bind(a.assigned_at_utc)
    .bind(a.started_at_utc)
    .bind(a.waiting_at_utc)
    .bind(a.completed_at_utc)
    .bind(&a.remote_status)
    .bind(a.remote_status_synced)
    .bind(snapshot_json(a)?)
    .bind(a.is_high_priority)
    .bind(&a.priority_reason)
    .bind(&a.notes)
    .execute(&mut *tx)
    .await;

    match res {
        Ok(_) => {
            tx.commit().await.context("insert_claimed commit failed")?;
            Ok(InsertOutcome::Inserted)
        }
        // Dropping `tx` rolls back the claim lock as well.
        Err(e) if is_unique_constraint_violation(&e, "uq_assignments_worker_active") => {
            Ok(InsertOutcome::WorkerBusy)
        }
        Err(e) if is_unique_constraint_violation(&e, "uq_assignments_order") => {
            Ok(InsertOutcome::OrderTaken)
        }
        Err(e) => Err(anyhow::Error::new(e).context("insert assignment failed")),
    }
}

pub async fn fetch_assignment(pool: &PgPool, assignment_id: Uuid) -> Result<Option<StoredAssignment>> {
    let active = sqlx::query(&format!(
        "select {ASSIGNMENT_COLUMNS} from assignments where assignment_id = $1"
    ))
    .bind(assignment_id)
    .fetch_optional(pool)
    .await
    .context("fetch active assignment failed")?;

    if let Some(row) = active {
        return Ok(Some(StoredAssignment::Active(assignment_from_row(&row)?)));
    }

    let archived = sqlx::query(&format!(
        "select {ASSIGNMENT_COLUMNS}, closed_at_utc, duration_secs
         from assignment_history where assignment_id = $1"
    ))
    .bind(assignment_id)
    .fetch_optional(pool)
    .await
    .context("fetch archived assignment failed")?;

    archived
        .map(|row| archived_from_row(&row).map(StoredAssignment::Archived))
        .transpose()
}

/// The assignment holding the claim lock for `order_id`.
pub async fn fetch_assignment_by_order(
    pool: &PgPool,
    order_id: &str,
) -> Result<Option<StoredAssignment>> {
    let holder: Option<(Uuid,)> =
        sqlx::query_as("select assignment_id from order_claims where order_id = $1")
            .bind(order_id)
            .fetch_optional(pool)
            .await
            .context("fetch claim lock failed")?;

    match holder {
        Some((assignment_id,)) => fetch_assignment(pool, assignment_id).await,
        None => Ok(None),
    }
}

pub async fn active_for_worker(pool: &PgPool, worker_id: &str) -> Result<Option<Assignment>> {
    let row = sqlx::query(&format!(
        "select {ASSIGNMENT_COLUMNS} from assignments where worker_id = $1 limit 1"
    ))
    .bind(worker_id)
    .fetch_optional(pool)
    .await
    .context("active_for_worker failed")?;

    row.map(|r| assignment_from_row(&r)).transpose()
}

pub async fn list_active(pool: &PgPool) -> Result<Vec<Assignment>> {
    let rows = sqlx::query(&format!(
        "select {ASSIGNMENT_COLUMNS} from assignments order by assigned_at_utc asc, order_id asc"
    ))
    .fetch_all(pool)
    .await
    .context("list_active failed")?;

    rows.iter().map(assignment_from_row).collect()
}

/// Compare-and-set on `state`. Worker fields are owned by
/// [`reassign_assignment`] and are not written here.
pub async fn update_active(pool: &PgPool, a: &Assignment, expected: AssignmentState) -> Result<bool> {
    let res = sqlx::query(
        r#"
        update assignments
        set state = $3,
            started_at_utc = $4,
            waiting_at_utc = $5,
            completed_at_utc = $6,
            remote_status = $7,
            remote_status_synced = $8,
            order_number = $9,
            order_snapshot = $10,
            is_high_priority = $11,
            priority_reason = $12,
            notes = $13,
            updated_at_utc = now()
        where assignment_id = $1
          and state = $2
        "#,
    )
    .bind(a.assignment_id)
    .bind(expected.as_str())
    .bind(a.state.as_str())
    .bind(a.started_at_utc)
    .bind(a.waiting_at_utc)
    .bind(a.completed_at_utc)
    .bind(&a.remote_status)
    .bind(a.remote_status_synced)
    .bind(&a.order_number)
    .bind(snapshot_json(a)?)
    .bind(a.is_high_priority)
    .bind(&a.priority_reason)
    .bind(&a.notes)
    .execute(pool)
    .await
    .context("update_active failed")?;

    Ok(res.rows_affected() == 1)
}

pub async fn reassign_assignment(
    pool: &PgPool,
    assignment_id: Uuid,
    worker: &WorkerRef,
) -> Result<ReassignOutcome> {
    let res = sqlx::query(
        r#"
        update assignments
        set worker_id = $2,
            worker_name = $3,
            updated_at_utc = now()
        where assignment_id = $1
        "#,
    )
    .bind(assignment_id)
    .bind(&worker.worker_id)
    .bind(&worker.worker_name)
    .execute(pool)
    .await;

    match res {
        Ok(r) if r.rows_affected() == 1 => Ok(ReassignOutcome::Reassigned),
        Ok(_) => Ok(ReassignOutcome::NotActive),
        Err(e) if is_unique_constraint_violation(&e, "uq_assignments_worker_active") => {
            Ok(ReassignOutcome::WorkerBusy)
        }
        Err(e) => Err(anyhow::Error::new(e).context("reassign_assignment failed")),
    }
}

/// Move a closed assignment to history. The claim lock stays.
pub async fn archive_assignment(
    pool: &PgPool,
    record: &ArchivedAssignment,
    expected: AssignmentState,
) -> Result<bool> {
    let a = &record.assignment;
    if !a.state.is_terminal() {
        return Err(anyhow!(
            "archive_assignment: {} is not terminal ({})",
            a.assignment_id,
            a.state
        ));
    }

    let mut tx = pool.begin().await.context("archive begin failed")?;

    let deleted = sqlx::query("delete from assignments where assignment_id = $1 and state = $2")
        .bind(a.assignment_id)
        .bind(expected.as_str())
        .execute(&mut *tx)
        .await
        .context("archive delete active failed")?;

    if deleted.rows_affected() != 1 {
        return Ok(false);
    }

    sqlx::query(
        r#"
        insert into assignment_history (
          assignment_id, order_id, order_number, worker_id, worker_name, state,
          assigned_at_utc, started_at_utc, waiting_at_utc, completed_at_utc,
          remote_status, remote_status_synced, order_snapshot,
          is_high_priority, priority_reason, notes,
          closed_at_utc, duration_secs
        ) values (
          $1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18
        )
        "#,
    )
    .bind(a.assignment_id)
    .bind(&a.order_id)
    .bind(&a.order_number)
    .bind(&a.worker_id)
    .bind(&a.worker_name)
    .bind(a.state.as_str())
    .bind(a.assigned_at_utc)
    .bind(a.started_at_utc)
    .bind(a.waiting_at_utc)
    .bind(a.completed_at_utc)
    .bind(&a.remote_status)
    .bind(a.remote_status_synced)
    .bind(snapshot_json(a)?)
    .bind(a.is_high_priority)
    .bind(&a.priority_reason)
    .bind(&a.notes)
    .bind(record.closed_at_utc)
    .bind(record.duration_secs)
    .execute(&mut *tx)
    .await
    .context("archive insert history failed")?;

    tx.commit().await.context("archive commit failed")?;
    Ok(true)
}

/// Record a status push made after archiving. Only the sync bookkeeping of
/// a history row is written, and only while it still carries `tag`.
pub async fn record_archived_sync(
    pool: &PgPool,
    assignment_id: Uuid,
    tag: &str,
    synced: bool,
    notes: Option<&str>,
) -> Result<bool> {
    let res = sqlx::query(
        r#"
        update assignment_history
        set remote_status_synced = $3,
            notes = $4
        where assignment_id = $1
          and remote_status = $2
        "#,
    )
    .bind(assignment_id)
    .bind(tag)
    .bind(synced)
    .bind(notes)
    .execute(pool)
    .await
    .context("record_archived_sync failed")?;

    Ok(res.rows_affected() == 1)
}

/// Drop the claim lock of an archived assignment.
pub async fn release_claim(pool: &PgPool, assignment_id: Uuid) -> Result<bool> {
    let res = sqlx::query(
        r#"
        delete from order_claims c
        where c.assignment_id = $1
          and not exists (select 1 from assignments a where a.assignment_id = $1)
        "#,
    )
    .bind(assignment_id)
    .execute(pool)
    .await
    .context("release_claim failed")?;

    Ok(res.rows_affected() > 0)
}

/// Delete an active row together with its claim lock.
pub async fn remove_active(pool: &PgPool, assignment_id: Uuid) -> Result<bool> {
    let mut tx = pool.begin().await.context("remove_active begin failed")?;

    let deleted = sqlx::query("delete from assignments where assignment_id = $1")
        .bind(assignment_id)
        .execute(&mut *tx)
        .await
        .context("remove_active delete failed")?;

    if deleted.rows_affected() != 1 {
        return Ok(false);
    }

    sqlx::query("delete from order_claims where assignment_id = $1")
        .bind(assignment_id)
        .execute(&mut *tx)
        .await
        .context("remove_active release claim failed")?;

    tx.commit().await.context("remove_active commit failed")?;
    Ok(true)
}

/// Units of `sku` held by active assignments. Computed from the snapshot
/// line items on every call.
pub async fn pending_quantity(pool: &PgPool, sku: &str) -> Result<i64> {
    let (n,): (i64,) = sqlx::query_as(
        r#"
        select coalesce(sum(greatest((li->>'quantity')::bigint, 0)), 0)::bigint
        from assignments a
        cross join lateral jsonb_array_elements(a.order_snapshot->'order'->'line_items') li
        where li->>'sku' = $1
        "#,
    )
    .bind(sku)
    .fetch_one(pool)
    .await
    .context("pending_quantity failed")?;

    Ok(n)
}

pub async fn count_archived_by_state(pool: &PgPool) -> Result<BTreeMap<AssignmentState, i64>> {
    let rows: Vec<(String, i64)> = sqlx::query_as(
        "select state, count(*)::bigint from assignment_history group by state",
    )
    .fetch_all(pool)
    .await
    .context("count_archived_by_state failed")?;

    let mut out = BTreeMap::new();
    for (state, n) in rows {
        out.insert(AssignmentState::parse(&state)?, n);
    }
    Ok(out)
}

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use pkd_engine::PendingSync;
use sqlx::PgPool;
use uuid::Uuid;

pub async fn enqueue_sync(pool: &PgPool, item: &PendingSync) -> Result<()> {
    sqlx::query(
        r#"
        insert into remote_sync_outbox (
          sync_id, assignment_id, order_id, status_tag, last_error, attempts, enqueued_at_utc
        ) values (
          $1, $2, $3, $4, $5, $6, $7
        )
        "#,
    )
    .bind(item.sync_id)
    .bind(item.assignment_id)
    .bind(&item.order_id)
    .bind(&item.status_tag)
    .bind(&item.last_error)
    .bind(item.attempts)
    .bind(item.enqueued_at_utc)
    .execute(pool)
    .await
    .context("enqueue_sync failed")?;
    Ok(())
}

type SyncRow = (Uuid, Uuid, String, String, String, i32, DateTime<Utc>);

/// Undelivered items, oldest first.
pub async fn list_pending_syncs(pool: &PgPool, limit: usize) -> Result<Vec<PendingSync>> {
    let rows: Vec<SyncRow> = sqlx::query_as(
        r#"
        select sync_id, assignment_id, order_id, status_tag, last_error, attempts, enqueued_at_utc
        from remote_sync_outbox
        where done_at_utc is null
        order by enqueued_at_utc asc, sync_id asc
        limit $1
        "#,
    )
    .bind(i64::try_from(limit).unwrap_or(i64::MAX))
    .fetch_all(pool)
    .await
    .context("list_pending_syncs failed")?;

    Ok(rows
        .into_iter()
        .map(
            |(sync_id, assignment_id, order_id, status_tag, last_error, attempts, enqueued_at_utc)| {
                PendingSync {
                    sync_id,
                    assignment_id,
                    order_id,
                    status_tag,
                    last_error,
                    attempts,
                    enqueued_at_utc,
                }
            },
        )
        .collect())
}

pub async fn mark_sync_done(pool: &PgPool, sync_id: Uuid) -> Result<()> {
    sqlx::query(
        r#"
        update remote_sync_outbox
        set done_at_utc = now(),
            last_attempt_at_utc = now()
        where sync_id = $1
          and done_at_utc is null
        "#,
    )
    .bind(sync_id)
    .execute(pool)
    .await
    .context("mark_sync_done failed")?;
    Ok(())
}

pub async fn mark_sync_failed(pool: &PgPool, sync_id: Uuid, error: &str) -> Result<()> {
    sqlx::query(
        r#"
        update remote_sync_outbox
        set attempts = attempts + 1,
            last_error = $2,
            last_attempt_at_utc = now()
        where sync_id = $1
          and done_at_utc is null
        "#,
    )
    .bind(sync_id)
    .bind(error)
    .execute(pool)
    .await
    .context("mark_sync_failed failed")?;
    Ok(())
}

/// Close undelivered items of an assignment that no longer exists.
pub async fn discard_syncs(pool: &PgPool, assignment_id: Uuid) -> Result<u64> {
    let res = sqlx::query(
        r#"
        update remote_sync_outbox
        set done_at_utc = now(),
            last_error = 'discarded: assignment removed'
        where assignment_id = $1
          and done_at_utc is null
        "#,
    )
    .bind(assignment_id)
    .execute(pool)
    .await
    .context("discard_syncs failed")?;
    Ok(res.rows_affected())
}

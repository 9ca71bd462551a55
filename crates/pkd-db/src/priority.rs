use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use pkd_schemas::PriorityMark;
use sqlx::PgPool;

type MarkRow = (String, String, Option<String>, DateTime<Utc>);

fn mark_from_row((order_id, reason, notes, created_at_utc): MarkRow) -> PriorityMark {
    PriorityMark {
        order_id,
        reason,
        notes,
        created_at_utc,
    }
}

pub async fn list_marks(pool: &PgPool) -> Result<Vec<PriorityMark>> {
    let rows: Vec<MarkRow> = sqlx::query_as(
        r#"
        select order_id, reason, notes, created_at_utc
        from priority_marks
        order by created_at_utc asc, order_id asc
        "#,
    )
    .fetch_all(pool)
    .await
    .context("list_marks failed")?;

    Ok(rows.into_iter().map(mark_from_row).collect())
}

/// Insert or update reason/notes. `created_at_utc` of an existing mark is
/// left alone so its queue position holds.
pub async fn upsert_mark(pool: &PgPool, mark: &PriorityMark) -> Result<PriorityMark> {
    let row: MarkRow = sqlx::query_as(
        r#"
        insert into priority_marks (order_id, reason, notes, created_at_utc)
        values ($1, $2, $3, $4)
        on conflict (order_id) do update
          set reason = excluded.reason,
              notes = excluded.notes
        returning order_id, reason, notes, created_at_utc
        "#,
    )
    .bind(&mark.order_id)
    .bind(&mark.reason)
    .bind(&mark.notes)
    .bind(mark.created_at_utc)
    .fetch_one(pool)
    .await
    .context("upsert_mark failed")?;

    Ok(mark_from_row(row))
}

pub async fn delete_mark(pool: &PgPool, order_id: &str) -> Result<bool> {
    let res = sqlx::query("delete from priority_marks where order_id = $1")
        .bind(order_id)
        .execute(pool)
        .await
        .context("delete_mark failed")?;
    Ok(res.rows_affected() > 0)
}

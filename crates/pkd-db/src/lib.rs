//! pkd-db
//!
//! Postgres persistence for the fulfillment engine.
//!
//! Free functions take a `&PgPool` and return `anyhow::Result`; [`PgStore`]
//! wires them behind the engine's store traits. Uniqueness conflicts are
//! detected by constraint name and returned as typed outcomes.

use anyhow::{Context, Result};
use sqlx::{postgres::PgPoolOptions, PgPool};

mod assignments;
mod locations;
mod outbox;
mod priority;
mod store;

pub use assignments::{
    active_for_worker, archive_assignment, claimed_order_ids, count_archived_by_state,
    fetch_assignment, fetch_assignment_by_order, insert_claimed, list_active, pending_quantity,
    reassign_assignment, record_archived_sync, release_claim, remove_active, update_active,
};
pub use locations::{lookup_bin, upsert_product_location};
pub use outbox::{discard_syncs, enqueue_sync, list_pending_syncs, mark_sync_done, mark_sync_failed};
pub use priority::{delete_mark, list_marks, upsert_mark};
pub use store::PgStore;

pub const ENV_DB_URL: &str = "PKD_DATABASE_URL";

/// Connect to Postgres using PKD_DATABASE_URL.
pub async fn connect_from_env() -> Result<PgPool> {
    let url = std::env::var(ENV_DB_URL).with_context(|| format!("missing env var {ENV_DB_URL}"))?;
    connect(&url).await
}

pub async fn connect(url: &str) -> Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(url)
        .await
        .context("failed to connect to Postgres")?;
    Ok(pool)
}

/// Run embedded SQLx migrations.
pub async fn migrate(pool: &PgPool) -> Result<()> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .context("db migrate failed")?;
    Ok(())
}

/// Simple status query (connectivity + schema presence).
pub async fn status(pool: &PgPool) -> Result<DbStatus> {
    let (one,): (i32,) = sqlx::query_as::<_, (i32,)>("select 1")
        .fetch_one(pool)
        .await
        .context("status connectivity query failed")?;

    let (exists,): (bool,) = sqlx::query_as::<_, (bool,)>(
        r#"
        select exists (
            select 1
            from information_schema.tables
            where table_schema='public' and table_name='assignments'
        )
        "#,
    )
    .fetch_one(pool)
    .await
    .context("status table-exists query failed")?;

    Ok(DbStatus {
        ok: one == 1,
        has_assignments_table: exists,
    })
}

#[derive(Debug, Clone)]
pub struct DbStatus {
    pub ok: bool,
    pub has_assignments_table: bool,
}

/// Detect a Postgres unique constraint violation by name.
pub(crate) fn is_unique_constraint_violation(err: &sqlx::Error, constraint: &str) -> bool {
    match err {
        sqlx::Error::Database(db_err) => {
            // 23505 = unique_violation. Unique indexes report the index name.
            db_err.code().as_deref() == Some("23505") && db_err.constraint() == Some(constraint)
        }
        _ => false,
    }
}

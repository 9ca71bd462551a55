use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use pkd_engine::BinLocation;
use sqlx::PgPool;

pub async fn lookup_bin(pool: &PgPool, sku: &str) -> Result<Option<BinLocation>> {
    let row: Option<(String, String, DateTime<Utc>)> =
        sqlx::query_as("select sku, bin, updated_at_utc from product_locations where sku = $1")
            .bind(sku)
            .fetch_optional(pool)
            .await
            .context("lookup_bin failed")?;

    Ok(row.map(|(sku, bin, updated_at_utc)| BinLocation {
        sku,
        bin,
        updated_at_utc,
    }))
}

pub async fn upsert_product_location(pool: &PgPool, sku: &str, bin: &str) -> Result<()> {
    sqlx::query(
        r#"
        insert into product_locations (sku, bin, updated_at_utc)
        values ($1, $2, now())
        on conflict (sku) do update
          set bin = excluded.bin,
              updated_at_utc = now()
        "#,
    )
    .bind(sku)
    .bind(bin)
    .execute(pool)
    .await
    .context("upsert_product_location failed")?;
    Ok(())
}

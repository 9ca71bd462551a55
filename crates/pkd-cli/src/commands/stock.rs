//! Stock reconciliation and bin locations.

use anyhow::{anyhow, Result};
use pkd_reconcile::{StockCount, StockMode};

use super::{build_engine, connect_store, load_engine_config, GlobalOpts};

pub struct ReconcileArgs {
    pub sku: String,
    pub count: f64,
    pub current: i64,
    pub mode: String,
}

pub async fn reconcile(opts: &GlobalOpts, args: ReconcileArgs) -> Result<()> {
    let mode: StockMode = args.mode.parse().map_err(|e: String| anyhow!(e))?;
    let engine = build_engine(opts).await?;
    let count = StockCount::new(args.sku, args.count, args.current, mode);

    let view = engine.reconcile_for_display(&count).await?;
    let adj = &view.adjustment;
    println!("sku={}", adj.sku);
    println!("mode={}", adj.mode.as_str());
    println!("physical_count={}", adj.physical_count);
    println!("pending={}", adj.pending);
    println!("current_remote_stock={}", adj.current_remote_stock);
    println!("remote_quantity={}", adj.remote_quantity);
    println!("delta={}", adj.delta);
    match &view.bin {
        Some(b) => println!("bin={}", b.bin),
        None => println!("bin=unknown"),
    }
    Ok(())
}

pub async fn set_location(opts: &GlobalOpts, sku: String, bin: String) -> Result<()> {
    let cfg = load_engine_config(&opts.config_paths)?;
    let store = connect_store(&cfg).await?;
    pkd_db::upsert_product_location(store.pool(), &sku, &bin).await?;
    println!("location_set=true sku={} bin={}", sku, bin);
    Ok(())
}

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use pkd_config::EngineConfig;
use pkd_engine::Engine;
use pkd_schemas::{LineItem, Order, WorkerRef};
use serde_json::Value;

use crate::{MemoryStore, ScriptedOrderSource};

/// Fixed epoch plus `secs`.
pub fn t(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(1_700_000_000 + secs, 0)
        .single()
        .unwrap_or_else(Utc::now)
}

/// An open ("processing") order created at `t(created)`.
pub fn order(order_id: &str, created: i64, items: &[(&str, i64)]) -> Order {
    Order {
        order_id: order_id.to_string(),
        order_number: format!("#{order_id}"),
        status: "processing".to_string(),
        created_at_utc: t(created),
        line_items: items
            .iter()
            .map(|(sku, quantity)| LineItem {
                sku: sku.to_string(),
                quantity: *quantity,
                name: format!("Item {sku}"),
            })
            .collect(),
        customer: Default::default(),
        totals: Default::default(),
        raw: Value::Null,
    }
}

pub fn worker(worker_id: &str) -> WorkerRef {
    WorkerRef::new(worker_id, format!("Worker {worker_id}"))
}

/// Defaults with a short remote timeout so hang scenarios finish quickly.
pub fn test_config() -> EngineConfig {
    EngineConfig {
        remote_timeout: Duration::from_millis(100),
        ..EngineConfig::default()
    }
}

/// Engine over a fresh memory store and a scripted feed of `orders`.
pub fn engine(orders: Vec<Order>) -> (Engine, Arc<MemoryStore>, Arc<ScriptedOrderSource>) {
    engine_with(orders, test_config())
}

pub fn engine_with(
    orders: Vec<Order>,
    config: EngineConfig,
) -> (Engine, Arc<MemoryStore>, Arc<ScriptedOrderSource>) {
    let store = Arc::new(MemoryStore::new());
    let source = Arc::new(ScriptedOrderSource::new(orders));
    let engine = Engine::new(store.clone(), source.clone(), config).with_locations(store.clone());
    (engine, store, source)
}

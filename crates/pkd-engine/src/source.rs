use std::path::Path;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use pkd_schemas::Order;
use serde_json::Value;

use crate::error::RemoteError;
use crate::ports::OrderSource;

/// Read-only [`OrderSource`] over an exported order feed.
///
/// Accepts either a JSON array of orders or `{"orders": [...]}`. Status
/// changes are rejected, so every transition that publishes a tag goes down
/// the unsynced path and lands in the retry outbox.
#[derive(Debug, Clone, Default)]
pub struct FileOrderSource {
    orders: Vec<Order>,
}

impl FileOrderSource {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let s = std::fs::read_to_string(path)
            .with_context(|| format!("read order feed: {}", path.display()))?;
        Self::from_json_str(&s).with_context(|| format!("parse order feed: {}", path.display()))
    }

    pub fn from_json_str(s: &str) -> Result<Self> {
        let v: Value = serde_json::from_str(s).context("order feed is not valid json")?;
        let list = match v {
            Value::Array(items) => Value::Array(items),
            Value::Object(mut map) => match map.remove("orders") {
                Some(list @ Value::Array(_)) => list,
                _ => bail!("order feed object must carry an 'orders' array"),
            },
            _ => bail!("order feed must be an array or an object with 'orders'"),
        };
        let orders: Vec<Order> = serde_json::from_value(list).context("decode orders")?;
        Ok(Self { orders })
    }

    pub fn from_orders(orders: Vec<Order>) -> Self {
        Self { orders }
    }

    pub fn len(&self) -> usize {
        self.orders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.orders.is_empty()
    }
}

#[async_trait]
impl OrderSource for FileOrderSource {
    async fn list_open_orders(&self, status_filter: &[String]) -> Result<Vec<Order>, RemoteError> {
        Ok(self
            .orders
            .iter()
            .filter(|o| status_filter.iter().any(|s| *s == o.status))
            .cloned()
            .collect())
    }

    async fn get_order(&self, order_id: &str) -> Result<Order, RemoteError> {
        self.orders
            .iter()
            .find(|o| o.order_id == order_id)
            .cloned()
            .ok_or_else(|| RemoteError::OrderNotFound(order_id.to_string()))
    }

    async fn set_remote_status(&self, order_id: &str, status_tag: &str) -> Result<(), RemoteError> {
        Err(RemoteError::Rejected(format!(
            "file feed is read-only (order {order_id}, status {status_tag})"
        )))
    }
}

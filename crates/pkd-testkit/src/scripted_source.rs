use std::time::Duration;

use async_trait::async_trait;
use pkd_engine::{OrderSource, RemoteError};
use pkd_schemas::Order;
use tokio::sync::Mutex;

/// How `set_remote_status` answers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatusBehavior {
    Accept,
    Fail(RemoteError),
    /// Never returns; exercises the engine's remote timeout.
    Hang,
    /// Accepts after the given wall-clock delay, holding the caller inside
    /// the push so concurrent transitions overlap with it.
    Delay(Duration),
}

#[derive(Debug)]
struct State {
    orders: Vec<Order>,
    status: StatusBehavior,
    list_error: Option<RemoteError>,
    status_calls: Vec<(String, String)>,
}

/// Order feed under test control. Status calls are recorded but never change
/// the orders themselves.
#[derive(Debug)]
pub struct ScriptedOrderSource {
    state: Mutex<State>,
}

impl ScriptedOrderSource {
    pub fn new(orders: Vec<Order>) -> Self {
        Self {
            state: Mutex::new(State {
                orders,
                status: StatusBehavior::Accept,
                list_error: None,
                status_calls: Vec::new(),
            }),
        }
    }

    pub async fn set_orders(&self, orders: Vec<Order>) {
        self.state.lock().await.orders = orders;
    }

    /// Replace the order with the same id, or add it.
    pub async fn upsert_order(&self, order: Order) {
        let mut g = self.state.lock().await;
        match g.orders.iter_mut().find(|o| o.order_id == order.order_id) {
            Some(existing) => *existing = order,
            None => g.orders.push(order),
        }
    }

    pub async fn set_status_behavior(&self, behavior: StatusBehavior) {
        self.state.lock().await.status = behavior;
    }

    pub async fn fail_listing(&self, error: Option<RemoteError>) {
        self.state.lock().await.list_error = error;
    }

    /// `(order_id, status_tag)` for every status call that reached the feed.
    pub async fn status_calls(&self) -> Vec<(String, String)> {
        self.state.lock().await.status_calls.clone()
    }
}

#[async_trait]
impl OrderSource for ScriptedOrderSource {
    async fn list_open_orders(&self, status_filter: &[String]) -> Result<Vec<Order>, RemoteError> {
        let g = self.state.lock().await;
        if let Some(e) = &g.list_error {
            return Err(e.clone());
        }
        Ok(g.orders
            .iter()
            .filter(|o| status_filter.contains(&o.status))
            .cloned()
            .collect())
    }

    async fn get_order(&self, order_id: &str) -> Result<Order, RemoteError> {
        let g = self.state.lock().await;
        g.orders
            .iter()
            .find(|o| o.order_id == order_id)
            .cloned()
            .ok_or_else(|| RemoteError::OrderNotFound(order_id.to_string()))
    }

    async fn set_remote_status(&self, order_id: &str, status_tag: &str) -> Result<(), RemoteError> {
        let behavior = {
            let mut g = self.state.lock().await;
            g.status_calls
                .push((order_id.to_string(), status_tag.to_string()));
            g.status.clone()
        };
        match behavior {
            StatusBehavior::Accept => Ok(()),
            StatusBehavior::Fail(e) => Err(e),
            StatusBehavior::Hang => {
                std::future::pending::<()>().await;
                Ok(())
            }
            StatusBehavior::Delay(d) => {
                tokio::time::sleep(d).await;
                Ok(())
            }
        }
    }
}

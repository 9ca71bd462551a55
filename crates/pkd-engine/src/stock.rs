use pkd_reconcile::{reconcile_stock, StockAdjustment, StockCount};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::engine::Engine;
use crate::error::EngineError;
use crate::ports::BinLocation;

/// Calculator result plus where the SKU lives, for the counting screen.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconcileView {
    pub adjustment: StockAdjustment,
    pub bin: Option<BinLocation>,
}

impl Engine {
    /// Compute the quantity to publish for `count`. Pending units are read
    /// fresh on every call. Nothing is written; pushing the delta is up to
    /// the caller.
    pub async fn reconcile(&self, count: &StockCount) -> Result<StockAdjustment, EngineError> {
        let pending = self.store.pending_quantity(&count.sku).await?;
        let adj = reconcile_stock(count, pending)?;
        info!(
            sku = %adj.sku,
            mode = adj.mode.as_str(),
            physical = adj.physical_count,
            pending = adj.pending,
            remote_quantity = adj.remote_quantity,
            delta = adj.delta,
            "stock reconciled"
        );
        Ok(adj)
    }

    pub async fn reconcile_for_display(
        &self,
        count: &StockCount,
    ) -> Result<ReconcileView, EngineError> {
        let adjustment = self.reconcile(count).await?;
        let bin = match &self.locations {
            None => None,
            Some(index) => match index.lookup_bin(&count.sku).await {
                Ok(bin) => bin,
                Err(e) => {
                    // Location is advisory; the calculation stands without it.
                    warn!(sku = %count.sku, error = %e, "bin lookup failed");
                    None
                }
            },
        };
        Ok(ReconcileView { adjustment, bin })
    }
}

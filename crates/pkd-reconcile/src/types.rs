use serde::{Deserialize, Serialize};

/// How a physical count is interpreted.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StockMode {
    /// Full recount: the count replaces remote stock, minus pending units.
    Override,
    /// Newly received stock: the count is added to remote stock.
    Increment,
}

impl StockMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            StockMode::Override => "override",
            StockMode::Increment => "increment",
        }
    }
}

impl std::str::FromStr for StockMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "override" => Ok(StockMode::Override),
            "increment" => Ok(StockMode::Increment),
            other => Err(format!("unknown stock mode: {other}")),
        }
    }
}

/// Raw input from the counting UI.
#[derive(Clone, Debug, PartialEq)]
pub struct StockCount {
    pub sku: String,
    /// As entered; may be fractional. Normalized by [`crate::normalize_count`].
    pub physical_count: f64,
    /// Stock currently published on the remote platform.
    pub current_remote_stock: i64,
    pub mode: StockMode,
}

impl StockCount {
    pub fn new(
        sku: impl Into<String>,
        physical_count: f64,
        current_remote_stock: i64,
        mode: StockMode,
    ) -> Self {
        Self {
            sku: sku.into(),
            physical_count,
            current_remote_stock,
            mode,
        }
    }
}

/// Result of a reconciliation: what to publish and the delta to push.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockAdjustment {
    pub sku: String,
    pub mode: StockMode,
    /// Count after rounding.
    pub physical_count: i64,
    /// Units held by non-terminal assignments at calculation time.
    pub pending: i64,
    pub current_remote_stock: i64,
    pub remote_quantity: i64,
    pub delta: i64,
}

impl StockAdjustment {
    pub fn is_noop(&self) -> bool {
        self.delta == 0
    }
}

/// Rejected physical count.
#[derive(Clone, Debug, PartialEq, thiserror::Error)]
pub enum InvalidCount {
    #[error("INVALID_COUNT: physical count must not be negative (got {0})")]
    Negative(f64),
    #[error("INVALID_COUNT: physical count must be a finite number")]
    NotFinite,
    #[error("INVALID_COUNT: physical count {0} exceeds the representable range")]
    OutOfRange(f64),
}

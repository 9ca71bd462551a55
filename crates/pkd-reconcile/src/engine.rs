use crate::{InvalidCount, StockAdjustment, StockCount, StockMode};

/// Largest f64 that still converts to i64 without saturating.
const MAX_COUNT: f64 = 9_007_199_254_740_992.0; // 2^53

/// Round a raw count to the nearest whole unit (halves away from zero).
///
/// Negative input is rejected rather than clamped; a negative count is a
/// caller error, not an empty shelf.
pub fn normalize_count(raw: f64) -> Result<i64, InvalidCount> {
    if !raw.is_finite() {
        return Err(InvalidCount::NotFinite);
    }
    if raw < 0.0 {
        return Err(InvalidCount::Negative(raw));
    }
    let rounded = raw.round();
    if rounded > MAX_COUNT {
        return Err(InvalidCount::OutOfRange(raw));
    }
    Ok(rounded as i64)
}

/// Compute the remote quantity and delta for one SKU.
///
/// - Override: `remote = max(0, count - pending)`, `delta = remote - current`.
/// - Increment: `remote = current + count`, `delta = count`. Pending units are
///   already reflected in the current remote stock.
///
/// A negative `pending` (malformed snapshot data) is treated as zero.
pub fn reconcile_stock(count: &StockCount, pending: i64) -> Result<StockAdjustment, InvalidCount> {
    let physical = normalize_count(count.physical_count)?;
    let pending = pending.max(0);
    let current = count.current_remote_stock;

    let (remote_quantity, delta) = match count.mode {
        StockMode::Override => {
            let remote = physical.saturating_sub(pending).max(0);
            (remote, remote.saturating_sub(current))
        }
        StockMode::Increment => (current.saturating_add(physical), physical),
    };

    Ok(StockAdjustment {
        sku: count.sku.clone(),
        mode: count.mode,
        physical_count: physical,
        pending,
        current_remote_stock: current,
        remote_quantity,
        delta,
    })
}

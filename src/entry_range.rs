//! Maps an entry window onto the baskets of a branch.

use crate::basket::Basket;
use crate::branch::{BasketLocation, Branch};
use crate::error::Result;
use std::sync::Arc;

/// How one selected basket reaches the pipeline.
#[derive(Clone, Debug)]
pub enum RangeOrBasket {
    /// Byte range `[start, stop)` in the source, key prefix included.
    Range(u64, u64),
    /// Already deserialized; skips fetch and decompression.
    Basket(Arc<Basket>),
}

/// Resolves optional, possibly negative, entry bounds against `num_entries`.
///
/// Missing bounds mean the whole branch, negative ones count from the end,
/// and both are clamped to `[0, num_entries]` with `stop >= start`.
pub fn regularize_entries_start_stop(
    num_entries: u64,
    entry_start: Option<i64>,
    entry_stop: Option<i64>,
) -> (u64, u64) {
    let total = num_entries as i64;
    let resolve = |bound: i64| -> u64 {
        let bound = if bound < 0 { bound + total } else { bound };
        bound.clamp(0, total) as u64
    };

    let start = entry_start.map_or(0, resolve);
    let stop = entry_stop.map_or(num_entries, resolve);
    (start, stop.max(start))
}

/// Every basket of `branch` whose entries overlap `[entry_start, entry_stop)`,
/// in basket order.
pub fn entries_to_ranges_or_baskets(
    branch: &Branch,
    entry_start: u64,
    entry_stop: u64,
) -> Result<Vec<(usize, RangeOrBasket)>> {
    let mut out = Vec::new();
    for (basket_num, pair) in branch.entry_offsets().windows(2).enumerate() {
        let (start, stop) = (pair[0], pair[1]);
        if !(entry_start < stop && start <= entry_stop) {
            continue;
        }
        let selector = match branch.basket_location(basket_num)? {
            BasketLocation::Free { seek, bytes } => RangeOrBasket::Range(*seek, seek + bytes),
            BasketLocation::Embedded(basket) => RangeOrBasket::Basket(Arc::clone(basket)),
        };
        out.push((basket_num, selector));
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn regularize_handles_missing_and_negative_bounds() {
        assert_eq!(regularize_entries_start_stop(100, None, None), (0, 100));
        assert_eq!(regularize_entries_start_stop(100, Some(-10), None), (90, 100));
        assert_eq!(regularize_entries_start_stop(100, Some(10), Some(-80)), (10, 20));
        assert_eq!(regularize_entries_start_stop(100, Some(-500), Some(500)), (0, 100));
        assert_eq!(regularize_entries_start_stop(100, Some(60), Some(40)), (60, 60));
        assert_eq!(regularize_entries_start_stop(0, Some(5), Some(-5)), (0, 0));
    }
}

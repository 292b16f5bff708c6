//! Values computed from a full table rather than from one record.

use crate::constants::PERCENT_DECIMALS;
use tracing::warn;

/// Each value's share of the total, as a percentage rounded to two decimals.
///
/// A zero (or empty) total yields `0.0` for every value.
pub fn percent_shares(values: &[f64]) -> Vec<f64> {
    let total: f64 = values.iter().sum();
    if total == 0.0 || !total.is_finite() {
        warn!(
            rows = values.len(),
            total = total,
            "Total is zero; percentage shares set to 0"
        );
        return vec![0.0; values.len()];
    }
    values
        .iter()
        .map(|value| round_to(value / total * 100.0, PERCENT_DECIMALS))
        .collect()
}

pub fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

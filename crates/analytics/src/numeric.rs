use rust_decimal::prelude::*;

/// Rounds to `dp` decimal places, ties to even.
///
/// Values that do not fit a `Decimal` (non-finite or astronomically large)
/// are returned unchanged.
pub fn round_dp(value: f64, dp: u32) -> f64 {
    Decimal::from_f64(value)
        .map(|d| d.round_dp_with_strategy(dp, RoundingStrategy::MidpointNearestEven))
        .and_then(|d| d.to_f64())
        .unwrap_or(value)
}

/// Rounds to two decimal places, the precision of every money and percentage field.
pub fn round2(value: f64) -> f64 {
    round_dp(value, 2)
}

/// `part / whole * 100`, rounded; 0 for an empty whole.
pub fn percent(part: usize, whole: usize) -> f64 {
    if whole == 0 {
        return 0.0;
    }
    round2(part as f64 / whole as f64 * 100.0)
}

//! Deterministic placeholder history.
//!
//! Used when no live source answers so that every watched symbol still gets
//! indicators. Output depends only on the start date and bar count.

use crate::types::Bar;
use chrono::{DateTime, Duration, Utc};

const BASE_PRICE: f64 = 100.0;
const DRIFT: f64 = 0.0015;
/// Every n-th step drifts down instead of up.
const REVERSAL_PERIOD: usize = 7;

/// Generate `days` daily bars starting at `start`.
pub fn generate_daily_bars(symbol: &str, start: DateTime<Utc>, days: usize) -> Vec<Bar> {
    let mut base = BASE_PRICE;

    (0..days)
        .map(|i| {
            let bias = if i % REVERSAL_PERIOD == 0 { -1.0 } else { 1.0 };
            base *= 1.0 + DRIFT * bias;

            let close = base;
            let open = close * 1.001;
            let high = open.max(close) * 1.0025;
            let low = open.min(close) * 0.9975;
            let volume = 1000.0 + (i % 30) as f64 * 12.0;

            Bar::daily(symbol, start + Duration::days(i as i64), open, high, low, close, volume)
        })
        .collect()
}

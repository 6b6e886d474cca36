//! Technical indicator implementations.

pub mod rsi;
pub mod sma;

pub use rsi::Rsi;
pub use sma::{Sma, SmaSource};

use super::Indicator;
use crate::error::{AppError, Result};
use crate::types::{Bar, IndicatorSet};

/// Bars required before indicators are computed at all.
/// The longest window is 200; the margin keeps the slow average off the series edge.
pub const MIN_INDICATOR_BARS: usize = 210;

fn latest(indicator: &dyn Indicator, bars: &[Bar]) -> Result<f64> {
    indicator.latest(bars).ok_or_else(|| {
        AppError::Internal(format!(
            "{} needs {} bars, got {}",
            indicator.id(),
            indicator.min_periods(),
            bars.len()
        ))
    })
}

/// Compute the snapshot metrics from an ascending bar series.
///
/// Refuses with `InsufficientHistory` below [`MIN_INDICATOR_BARS`].
pub fn compute_indicators(bars: &[Bar]) -> Result<IndicatorSet> {
    if bars.len() < MIN_INDICATOR_BARS {
        return Err(AppError::InsufficientHistory {
            symbol: bars.first().map(|b| b.symbol.clone()).unwrap_or_default(),
            have: bars.len(),
            need: MIN_INDICATOR_BARS,
        });
    }

    Ok(IndicatorSet {
        ma50: latest(&Sma::ma50(), bars)?,
        ma200: latest(&Sma::ma200(), bars)?,
        rsi14: latest(&Rsi::default(), bars)?,
        vol_sma20: latest(&Sma::vol_sma20(), bars)?,
    })
}

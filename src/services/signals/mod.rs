//! Indicator computation and signal scoring.

pub mod indicators;
pub mod scorer;

pub use indicators::{compute_indicators, MIN_INDICATOR_BARS};
pub use scorer::{score_signal, ScoreBreakdown};

use crate::types::Bar;

/// A windowed statistic evaluated at the latest bar.
pub trait Indicator: Send + Sync {
    /// Metric key in the snapshot map.
    fn id(&self) -> &str;

    /// Minimum number of bars required for calculation.
    fn min_periods(&self) -> usize;

    /// Value at the last bar, or `None` if there is not enough data.
    fn latest(&self, bars: &[Bar]) -> Option<f64>;
}

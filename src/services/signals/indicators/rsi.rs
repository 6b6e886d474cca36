//! Relative Strength Index (RSI) indicator.

use crate::services::signals::Indicator;
use crate::types::Bar;

/// RSI (Relative Strength Index) indicator.
///
/// Compares the magnitude of recent gains to recent losses using Wilder
/// smoothing. Values range from 0-100.
pub struct Rsi {
    period: usize,
}

impl Default for Rsi {
    fn default() -> Self {
        Self { period: 14 }
    }
}

impl Rsi {
    pub fn new(period: usize) -> Self {
        Self { period }
    }

    /// Calculate RSI value from close-to-close changes.
    fn calculate_rsi(bars: &[Bar], period: usize) -> Option<f64> {
        if period == 0 || bars.len() < period + 1 {
            return None;
        }

        let (gains, losses): (Vec<f64>, Vec<f64>) = bars
            .windows(2)
            .map(|w| {
                let change = w[1].close - w[0].close;
                (change.max(0.0), (-change).max(0.0))
            })
            .unzip();

        // Seed with simple averages, then smooth the rest
        let mut avg_gain = gains.iter().take(period).sum::<f64>() / period as f64;
        let mut avg_loss = losses.iter().take(period).sum::<f64>() / period as f64;

        for i in period..gains.len() {
            avg_gain = (avg_gain * (period - 1) as f64 + gains[i]) / period as f64;
            avg_loss = (avg_loss * (period - 1) as f64 + losses[i]) / period as f64;
        }

        if avg_loss == 0.0 {
            // Flat series has no momentum either way
            return Some(if avg_gain == 0.0 { 50.0 } else { 100.0 });
        }

        let rs = avg_gain / avg_loss;
        Some(100.0 - (100.0 / (1.0 + rs)))
    }
}

impl Indicator for Rsi {
    fn id(&self) -> &str {
        "rsi14"
    }

    fn min_periods(&self) -> usize {
        self.period + 1
    }

    fn latest(&self, bars: &[Bar]) -> Option<f64> {
        Self::calculate_rsi(bars, self.period)
    }
}

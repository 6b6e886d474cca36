//! Simple Moving Average (SMA) indicator.

use crate::services::signals::Indicator;
use crate::types::Bar;

/// Bar field an SMA is taken over.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SmaSource {
    Close,
    Volume,
}

/// SMA (Simple Moving Average) indicator.
///
/// Arithmetic mean of the last `period` values of the source field.
pub struct Sma {
    id: &'static str,
    period: usize,
    source: SmaSource,
}

impl Sma {
    pub fn new(id: &'static str, period: usize, source: SmaSource) -> Self {
        Self { id, period, source }
    }

    /// SMA(50) of close.
    pub fn ma50() -> Self {
        Self::new("ma50", 50, SmaSource::Close)
    }

    /// SMA(200) of close.
    pub fn ma200() -> Self {
        Self::new("ma200", 200, SmaSource::Close)
    }

    /// SMA(20) of volume.
    pub fn vol_sma20() -> Self {
        Self::new("vol_sma20", 20, SmaSource::Volume)
    }
}

impl Indicator for Sma {
    fn id(&self) -> &str {
        self.id
    }

    fn min_periods(&self) -> usize {
        self.period
    }

    fn latest(&self, bars: &[Bar]) -> Option<f64> {
        if self.period == 0 || bars.len() < self.period {
            return None;
        }

        let sum: f64 = bars
            .iter()
            .rev()
            .take(self.period)
            .map(|b| match self.source {
                SmaSource::Close => b.close,
                SmaSource::Volume => b.volume,
            })
            .sum();

        Some(sum / self.period as f64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};

    fn bars(closes: &[f64]) -> Vec<Bar> {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        closes
            .iter()
            .enumerate()
            .map(|(i, c)| Bar::daily("T", start + Duration::days(i as i64), *c, *c, *c, *c, *c * 10.0))
            .collect()
    }

    #[test]
    fn test_sma_uses_last_window() {
        let sma = Sma::new("t", 3, SmaSource::Close);
        let data = bars(&[100.0, 1.0, 2.0, 3.0]);
        assert_eq!(sma.latest(&data), Some(2.0));
    }

    #[test]
    fn test_sma_of_volume() {
        let sma = Sma::new("t", 2, SmaSource::Volume);
        let data = bars(&[1.0, 2.0, 4.0]);
        assert_eq!(sma.latest(&data), Some(30.0));
    }

    #[test]
    fn test_sma_insufficient_data() {
        let sma = Sma::ma50();
        assert_eq!(sma.latest(&bars(&[1.0; 49])), None);
        assert!(sma.latest(&bars(&[1.0; 50])).is_some());
    }

    #[test]
    fn test_named_constructors() {
        assert_eq!(Sma::ma50().id(), "ma50");
        assert_eq!(Sma::ma200().min_periods(), 200);
        assert_eq!(Sma::vol_sma20().id(), "vol_sma20");
    }
}

use crate::error::AppError;
use chrono::{DateTime, Duration, TimeZone, Utc};
use serde::{Deserialize, Serialize};

/// Sampling interval of bars, snapshots and signals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum Timeframe {
    #[default]
    #[serde(rename = "1d")]
    Daily,
}

impl std::str::FromStr for Timeframe {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "1d" => Ok(Timeframe::Daily),
            other => Err(AppError::Config(format!("Unknown timeframe '{}'", other))),
        }
    }
}

impl Timeframe {
    /// Storage code for this timeframe.
    pub fn code(&self) -> &'static str {
        match self {
            Timeframe::Daily => "1d",
        }
    }

    /// Length of one bar.
    pub fn duration(&self) -> Duration {
        match self {
            Timeframe::Daily => Duration::days(1),
        }
    }

    /// Align a timestamp to the start of the bar that contains it.
    pub fn align(&self, ts: DateTime<Utc>) -> DateTime<Utc> {
        let step = self.duration().num_seconds();
        let secs = ts.timestamp().div_euclid(step) * step;
        Utc.timestamp_opt(secs, 0).single().unwrap_or(ts)
    }
}

impl std::fmt::Display for Timeframe {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.code())
    }
}

/// One OHLCV observation.
///
/// Identity is `(symbol, timeframe, ts)`. Bars are never updated once stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    pub symbol: String,
    pub timeframe: Timeframe,
    pub ts: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl Bar {
    /// Build a daily bar, aligning the timestamp to its UTC day.
    pub fn daily(
        symbol: &str,
        ts: DateTime<Utc>,
        open: f64,
        high: f64,
        low: f64,
        close: f64,
        volume: f64,
    ) -> Self {
        Self {
            symbol: symbol.to_uppercase(),
            timeframe: Timeframe::Daily,
            ts: Timeframe::Daily.align(ts),
            open,
            high,
            low,
            close,
            volume: volume.max(0.0),
        }
    }

    /// Finite OHLCV, positive open/close and a non-inverted range.
    pub fn is_well_formed(&self) -> bool {
        [self.open, self.high, self.low, self.close, self.volume]
            .iter()
            .all(|v| v.is_finite())
            && self.open > 0.0
            && self.close > 0.0
            && self.high >= self.low
    }
}

/// Normalize a provider series: drop malformed rows, sort ascending,
/// keep the first bar per timestamp and trim to the most recent `window` bars.
pub fn normalize_bars(mut bars: Vec<Bar>, window: usize) -> Vec<Bar> {
    bars.retain(Bar::is_well_formed);
    bars.sort_by_key(|b| b.ts);
    bars.dedup_by_key(|b| b.ts);
    if bars.len() > window {
        bars.drain(..bars.len() - window);
    }
    bars
}

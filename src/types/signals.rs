use super::Timeframe;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identifier of the trend/momentum/volume/breakout rule.
pub const TREND_BREAKOUT_RULE_ID: Uuid = Uuid::from_u128(1);

/// Latest values of the windowed statistics for one bar.
///
/// Serializes as the metric map persisted with a snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct IndicatorSet {
    /// SMA(50) of close.
    pub ma50: f64,
    /// SMA(200) of close.
    pub ma200: f64,
    /// RSI(14) of close, 0-100.
    pub rsi14: f64,
    /// SMA(20) of volume.
    pub vol_sma20: f64,
}

/// Indicator values computed at a bar. Upserted on recompute.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndicatorSnapshot {
    pub symbol: String,
    pub timeframe: Timeframe,
    pub ts: DateTime<Utc>,
    pub data: IndicatorSet,
}

/// Tri-state direction label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Up,
    Down,
    Neutral,
}

impl Direction {
    /// Label a bounded score: `up` at or above 0.6, `down` at or below 0.4.
    pub fn from_score(score: f64) -> Self {
        if score >= 0.6 {
            Direction::Up
        } else if score <= 0.4 {
            Direction::Down
        } else {
            Direction::Neutral
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Up => "up",
            Direction::Down => "down",
            Direction::Neutral => "neutral",
        }
    }
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Detail payload stored with a signal.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SignalDetail {
    pub direction: Direction,
    pub score: f64,
}

/// Identity of a persisted signal.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SignalKey {
    pub symbol: String,
    pub timeframe: Timeframe,
    pub ts: DateTime<Utc>,
    pub rule_id: Uuid,
}

/// A rule evaluation. First write for a key wins; later ones are dropped.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalRecord {
    pub symbol: String,
    pub timeframe: Timeframe,
    pub ts: DateTime<Utc>,
    pub rule_id: Uuid,
    pub fired: bool,
    pub score: f64,
    pub detail: SignalDetail,
}

impl SignalRecord {
    /// Build the record for the trend/breakout rule from a score.
    pub fn trend_breakout(symbol: &str, timeframe: Timeframe, ts: DateTime<Utc>, score: f64) -> Self {
        let direction = Direction::from_score(score);
        Self {
            symbol: symbol.to_string(),
            timeframe,
            ts,
            rule_id: TREND_BREAKOUT_RULE_ID,
            fired: score >= 0.6,
            score,
            detail: SignalDetail { direction, score },
        }
    }

    pub fn key(&self) -> SignalKey {
        SignalKey {
            symbol: self.symbol.clone(),
            timeframe: self.timeframe,
            ts: self.ts,
            rule_id: self.rule_id,
        }
    }
}

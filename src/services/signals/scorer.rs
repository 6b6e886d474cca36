//! Fixed-weight trend/momentum/volume/breakout score.
//!
//! Weights and thresholds are part of the stored signal history and must not
//! be tuned.

use crate::types::{Bar, Direction, IndicatorSet};

pub const TREND_WEIGHT: f64 = 0.4;
pub const MOMENTUM_WEIGHT: f64 = 0.3;
pub const VOLUME_WEIGHT: f64 = 0.2;
pub const BREAKOUT_WEIGHT: f64 = 0.2;

/// RSI level above which momentum counts as bullish.
pub const MOMENTUM_THRESHOLD: f64 = 55.0;
/// Bars before the latest one whose highs form the breakout level.
pub const BREAKOUT_LOOKBACK: usize = 60;

/// Which components fired, and the resulting score.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoreBreakdown {
    pub trend: bool,
    pub momentum: bool,
    pub volume: bool,
    pub breakout: bool,
    /// Sum of fired weights, capped at 1.0.
    pub score: f64,
}

impl ScoreBreakdown {
    /// Combine component flags into a capped score.
    pub fn from_components(trend: bool, momentum: bool, volume: bool, breakout: bool) -> Self {
        let mut score = 0.0;
        if trend {
            score += TREND_WEIGHT;
        }
        if momentum {
            score += MOMENTUM_WEIGHT;
        }
        if volume {
            score += VOLUME_WEIGHT;
        }
        if breakout {
            score += BREAKOUT_WEIGHT;
        }

        Self {
            trend,
            momentum,
            volume,
            breakout,
            score: score.min(1.0),
        }
    }

    pub fn direction(&self) -> Direction {
        Direction::from_score(self.score)
    }

    pub fn fired(&self) -> bool {
        self.score >= 0.6
    }
}

/// Highest high over the `BREAKOUT_LOOKBACK` bars preceding the latest bar.
fn prior_high(bars: &[Bar]) -> Option<f64> {
    if bars.len() < BREAKOUT_LOOKBACK + 1 {
        return None;
    }
    let end = bars.len() - 1;
    bars[end - BREAKOUT_LOOKBACK..end]
        .iter()
        .map(|b| b.high)
        .reduce(f64::max)
}

/// Score the latest bar of an ascending series against its indicators.
pub fn score_signal(indicators: &IndicatorSet, bars: &[Bar]) -> ScoreBreakdown {
    let Some(last) = bars.last() else {
        return ScoreBreakdown::from_components(false, false, false, false);
    };

    let trend = indicators.ma50 > indicators.ma200;
    let momentum = indicators.rsi14 > MOMENTUM_THRESHOLD;
    let volume = last.volume > indicators.vol_sma20;
    let breakout = prior_high(bars).is_some_and(|high| last.close > high);

    ScoreBreakdown::from_components(trend, momentum, volume, breakout)
}

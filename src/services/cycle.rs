//! Cycle orchestration.
//!
//! One cycle walks the watchlist in order and, per symbol, seeds history,
//! computes indicators, scores the latest bar and persists both records.
//! Scheduled ticks that land while a cycle is still running are skipped.

use crate::error::Result;
use crate::services::historical::HistorySeeder;
use crate::services::signals::{compute_indicators, score_signal};
use crate::services::SqliteStore;
use crate::types::{Direction, IndicatorSnapshot, SignalRecord, Timeframe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

/// Bars read back for indicator computation.
pub const DEFAULT_LOOKBACK: usize = 500;
/// Seconds between scheduled cycles.
pub const DEFAULT_INTERVAL_SECS: u64 = 300;

/// Result of processing one symbol.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SymbolOutcome {
    /// Indicators were computed and the latest bar scored.
    Scored {
        score: f64,
        direction: Direction,
        /// `false` when a signal for this bar already existed.
        signal_inserted: bool,
    },
    /// Too few bars to compute indicators this cycle.
    Skipped { bars: usize },
}

/// Summary of one cycle.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CycleReport {
    pub symbols: usize,
    pub scored: usize,
    pub skipped: usize,
    pub failed: usize,
    pub seeded: usize,
    pub signals_inserted: usize,
    pub elapsed_ms: u64,
}

/// Clears the in-flight flag when a cycle finishes, including on early return.
struct RunGuard<'a>(&'a AtomicBool);

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Drives the per-symbol pipeline over the watchlist.
pub struct CycleRunner {
    store: Arc<SqliteStore>,
    seeder: HistorySeeder,
    user_id: String,
    lookback: usize,
    interval: Duration,
    running: AtomicBool,
}

impl CycleRunner {
    pub fn new(store: Arc<SqliteStore>, seeder: HistorySeeder, user_id: impl Into<String>) -> Self {
        Self {
            store,
            seeder,
            user_id: user_id.into(),
            lookback: DEFAULT_LOOKBACK,
            interval: Duration::from_secs(DEFAULT_INTERVAL_SECS),
            running: AtomicBool::new(false),
        }
    }

    pub fn with_lookback(mut self, lookback: usize) -> Self {
        self.lookback = lookback;
        self
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn seeder(&self) -> &HistorySeeder {
        &self.seeder
    }

    /// Whether a cycle is in flight.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Run a cycle unless one is already in flight.
    ///
    /// Returns `None` when skipped.
    pub async fn try_run_cycle(&self) -> Option<Result<CycleReport>> {
        if self
            .running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            warn!("Previous cycle still running, skipping tick");
            return None;
        }
        let _guard = RunGuard(&self.running);
        Some(self.run_cycle_inner().await)
    }

    /// Run one full pass over the watchlist.
    ///
    /// Fails only if the watchlist cannot be read. If another cycle is in
    /// flight nothing runs and an empty report comes back.
    pub async fn run_cycle(&self) -> Result<CycleReport> {
        match self.try_run_cycle().await {
            Some(result) => result,
            None => Ok(CycleReport::default()),
        }
    }

    async fn run_cycle_inner(&self) -> Result<CycleReport> {
        let started = Instant::now();
        let symbols = self.store.load_watchlist(&self.user_id)?;
        let mut report = CycleReport {
            symbols: symbols.len(),
            ..Default::default()
        };
        info!("Cycle started for {} symbols", symbols.len());

        for symbol in &symbols {
            match self.process_symbol_inner(symbol).await {
                Ok((outcome, seeded)) => {
                    if seeded {
                        report.seeded += 1;
                    }
                    match outcome {
                        SymbolOutcome::Scored {
                            signal_inserted, ..
                        } => {
                            report.scored += 1;
                            if signal_inserted {
                                report.signals_inserted += 1;
                            }
                        }
                        SymbolOutcome::Skipped { .. } => report.skipped += 1,
                    }
                }
                Err(e) => {
                    error!("Failed to process {}: {}", symbol, e);
                    report.failed += 1;
                }
            }
        }

        report.elapsed_ms = started.elapsed().as_millis() as u64;
        info!(
            "Cycle finished in {}ms: {} scored, {} skipped, {} failed, {} seeded, {} new signals",
            report.elapsed_ms,
            report.scored,
            report.skipped,
            report.failed,
            report.seeded,
            report.signals_inserted
        );
        Ok(report)
    }

    /// Seed, compute, score and persist one symbol.
    pub async fn process_symbol(&self, symbol: &str) -> Result<SymbolOutcome> {
        self.process_symbol_inner(symbol).await.map(|(outcome, _)| outcome)
    }

    async fn process_symbol_inner(&self, symbol: &str) -> Result<(SymbolOutcome, bool)> {
        let symbol = symbol.to_uppercase();
        let seed = self.seeder.ensure_history(&symbol).await?;
        let seeded = seed.seeded();

        let bars = self.store.recent_bars(&symbol, Timeframe::Daily, self.lookback)?;
        let indicators = match compute_indicators(&bars) {
            Ok(set) => set,
            Err(e) if e.is_insufficient_history() => {
                warn!("Skipping {}: {}", symbol, e);
                return Ok((SymbolOutcome::Skipped { bars: bars.len() }, seeded));
            }
            Err(e) => return Err(e),
        };

        // compute_indicators succeeded, so the series is non-empty
        let Some(last) = bars.last() else {
            return Ok((SymbolOutcome::Skipped { bars: 0 }, seeded));
        };

        let snapshot = IndicatorSnapshot {
            symbol: last.symbol.clone(),
            timeframe: Timeframe::Daily,
            ts: last.ts,
            data: indicators,
        };
        self.store.upsert_snapshot(&snapshot)?;

        let breakdown = score_signal(&indicators, &bars);
        let signal =
            SignalRecord::trend_breakout(&last.symbol, Timeframe::Daily, last.ts, breakdown.score);
        let signal_inserted = self.store.insert_signal_if_absent(&signal)?;

        debug!(
            "{} @ {}: score {:.2} ({}), signal {}",
            symbol,
            last.ts.date_naive(),
            breakdown.score,
            breakdown.direction(),
            if signal_inserted { "stored" } else { "already present" }
        );

        Ok((
            SymbolOutcome::Scored {
                score: breakdown.score,
                direction: breakdown.direction(),
                signal_inserted,
            },
            seeded,
        ))
    }

    /// Spawn the periodic loop. The first run happens one interval from now.
    pub fn start(self: Arc<Self>) -> JoinHandle<()> {
        info!("Starting cycle scheduler (every {}s)", self.interval.as_secs());

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(self.interval);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
            // First tick completes immediately
            interval.tick().await;

            loop {
                interval.tick().await;

                let runner = self.clone();
                tokio::spawn(async move {
                    if let Some(Err(e)) = runner.try_run_cycle().await {
                        error!("Cycle aborted: {}", e);
                    }
                });
            }
        })
    }
}

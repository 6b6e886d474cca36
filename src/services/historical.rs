//! History seeding.
//!
//! Makes sure a symbol has enough daily bars stored before indicators run.
//! Live providers are tried first; the synthetic generator is the terminal
//! fallback so seeding itself never comes back empty.

use crate::error::Result;
use crate::services::synthetic::generate_daily_bars;
use crate::services::SqliteStore;
use crate::sources::PriceProvider;
use crate::types::Timeframe;
use chrono::{Duration, Utc};
use dashmap::DashMap;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Minimum stored daily bars before a symbol counts as seeded.
pub const MIN_HISTORY_BARS: usize = 250;
/// Calendar days requested when seeding.
pub const DEFAULT_SEED_DAYS: u32 = 320;

const PROVIDER_VENUE: &str = "provider";
const SYNTHETIC_VENUE: &str = "synthetic";

/// Seeding status for a symbol
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeedStatus {
    NotSeeded,
    Seeding,
    Seeded,
    Failed,
}

/// What one `ensure_history` call did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeedOutcome {
    /// Enough bars were already stored; nothing was fetched.
    Sufficient { count: usize },
    /// Bars came from a live provider.
    Provider { fetched: usize, inserted: usize },
    /// No provider answered; generated bars were stored.
    Synthetic { generated: usize, inserted: usize },
}

impl SeedOutcome {
    pub fn seeded(&self) -> bool {
        !matches!(self, SeedOutcome::Sufficient { .. })
    }
}

/// Seeds daily history from providers, falling back to synthetic bars.
pub struct HistorySeeder {
    store: Arc<SqliteStore>,
    provider: Arc<dyn PriceProvider>,
    seed_status: DashMap<String, SeedStatus>,
    min_bars: usize,
    seed_days: u32,
}

impl HistorySeeder {
    pub fn new(store: Arc<SqliteStore>, provider: Arc<dyn PriceProvider>) -> Self {
        Self::with_limits(store, provider, MIN_HISTORY_BARS, DEFAULT_SEED_DAYS)
    }

    pub fn with_limits(
        store: Arc<SqliteStore>,
        provider: Arc<dyn PriceProvider>,
        min_bars: usize,
        seed_days: u32,
    ) -> Self {
        Self {
            store,
            provider,
            seed_status: DashMap::new(),
            min_bars,
            seed_days,
        }
    }

    /// Get the seeding status for a symbol.
    pub fn seed_status(&self, symbol: &str) -> SeedStatus {
        self.seed_status
            .get(&symbol.to_uppercase())
            .map(|s| *s)
            .unwrap_or(SeedStatus::NotSeeded)
    }

    /// Ensure at least the minimum number of daily bars is stored for `symbol`.
    pub async fn ensure_history(&self, symbol: &str) -> Result<SeedOutcome> {
        let symbol = symbol.to_uppercase();
        let count = self.store.count_bars(&symbol, Timeframe::Daily)?;
        if count >= self.min_bars {
            debug!("{} has {} daily bars, no seeding needed", symbol, count);
            self.seed_status.insert(symbol, SeedStatus::Seeded);
            return Ok(SeedOutcome::Sufficient { count });
        }

        info!("Seeding {} ({} of {} bars stored)", symbol, count, self.min_bars);
        self.seed_status.insert(symbol.clone(), SeedStatus::Seeding);

        let result = self.seed(&symbol).await;
        let status = match &result {
            Ok(_) => SeedStatus::Seeded,
            Err(e) => {
                error!("Failed to store seed bars for {}: {}", symbol, e);
                SeedStatus::Failed
            }
        };
        self.seed_status.insert(symbol, status);
        result
    }

    async fn seed(&self, symbol: &str) -> Result<SeedOutcome> {
        let fetched = self
            .provider
            .fetch_daily(symbol, self.seed_days)
            .await
            .map(|mut bars| {
                let total = bars.len();
                bars.retain(|b| b.is_well_formed() && b.symbol == symbol);
                if bars.len() < total {
                    warn!("Dropped {} malformed bars for {}", total - bars.len(), symbol);
                }
                bars
            })
            .filter(|bars| !bars.is_empty());

        if let Some(bars) = fetched {
            let inserted = self.store.insert_bars(&bars, PROVIDER_VENUE)?;
            info!("Seeded {} with {} provider bars ({} new)", symbol, bars.len(), inserted);
            return Ok(SeedOutcome::Provider {
                fetched: bars.len(),
                inserted,
            });
        }

        let start = Utc::now() - Duration::days(self.seed_days as i64);
        let bars = generate_daily_bars(symbol, start, self.seed_days as usize);
        let inserted = self.store.insert_bars(&bars, SYNTHETIC_VENUE)?;
        info!("Seeded {} with {} synthetic bars ({} new)", symbol, bars.len(), inserted);
        Ok(SeedOutcome::Synthetic {
            generated: bars.len(),
            inserted,
        })
    }
}

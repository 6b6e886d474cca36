//! Daily price sources.
//!
//! Exchange pairs (`BTC-USD`) walk the configured exchanges in order and take
//! the first non-empty answer. Everything else goes to the single enabled
//! equity feed, if any. Failures never escape: callers see `None`.

pub mod alphavantage;
pub mod binance;
pub mod coinbase;
pub mod kraken;
pub mod tiingo;

pub use alphavantage::AlphaVantageClient;
pub use binance::BinanceClient;
pub use coinbase::CoinbaseClient;
pub use kraken::KrakenClient;
pub use tiingo::TiingoClient;

use crate::config::{Config, EquityFeed, ExchangeSource};
use crate::error::{AppError, Result};
use crate::types::{Bar, Timeframe};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Source of daily bars for a symbol.
#[async_trait]
pub trait PriceProvider: Send + Sync {
    /// Fetch up to `days` daily bars ending now, ascending.
    /// `None` means no source produced data.
    async fn fetch_daily(&self, symbol: &str, days: u32) -> Option<Vec<Bar>>;
}

/// Whether a symbol names an exchange pair quoted in USD, e.g. `ETH-USD`.
pub fn is_exchange_pair(symbol: &str) -> bool {
    let upper = symbol.to_uppercase();
    upper.contains('-') && upper.ends_with("-USD")
}

/// Split `BASE-QUOTE` into its parts.
pub fn split_pair(symbol: &str) -> Option<(String, String)> {
    let (base, quote) = symbol.split_once('-')?;
    if base.is_empty() || quote.is_empty() {
        return None;
    }
    Some((base.to_uppercase(), quote.to_uppercase()))
}

/// Read a number that may be encoded as a JSON number or string.
pub(crate) fn value_f64(value: &serde_json::Value) -> Option<f64> {
    match value {
        serde_json::Value::Number(n) => n.as_f64(),
        serde_json::Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

/// First 200 characters of an error body, for log lines.
pub(crate) fn snippet(body: &str) -> String {
    body.chars().take(200).collect()
}

/// Drop bars for the UTC day still in progress; their candle is not final.
pub fn completed_sessions(mut bars: Vec<Bar>, now: DateTime<Utc>) -> Vec<Bar> {
    let open_session = Timeframe::Daily.align(now);
    bars.retain(|b| b.ts < open_session);
    bars
}

/// Shared HTTP client with the per-request timeout.
pub fn http_client(timeout_secs: u64) -> Result<Client> {
    Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .user_agent("markets-analysis/0.1")
        .build()
        .map_err(AppError::from)
}

/// One exchange integration.
#[derive(Clone)]
pub enum ExchangeClient {
    Coinbase(CoinbaseClient),
    Kraken(KrakenClient),
    Binance(BinanceClient),
}

impl ExchangeClient {
    /// Build the default client for a configured exchange.
    pub fn for_source(source: ExchangeSource, client: Client) -> Self {
        match source {
            ExchangeSource::Coinbase => Self::Coinbase(CoinbaseClient::new(client)),
            ExchangeSource::Kraken => Self::Kraken(KrakenClient::new(client)),
            ExchangeSource::Binance => Self::Binance(BinanceClient::new(client)),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Coinbase(_) => ExchangeSource::Coinbase.name(),
            Self::Kraken(_) => ExchangeSource::Kraken.name(),
            Self::Binance(_) => ExchangeSource::Binance.name(),
        }
    }

    /// Completed daily candles only.
    pub async fn fetch_daily(&self, symbol: &str, days: u32) -> Result<Vec<Bar>> {
        let bars = match self {
            Self::Coinbase(c) => c.fetch_daily(symbol, days).await?,
            Self::Kraken(c) => c.fetch_daily(symbol, days).await?,
            Self::Binance(c) => c.fetch_daily(symbol, days).await?,
        };
        Ok(completed_sessions(bars, Utc::now()))
    }
}

/// The single vendor integration for listed instruments.
#[derive(Clone)]
pub enum EquityClient {
    Tiingo(TiingoClient),
    AlphaVantage(AlphaVantageClient),
}

impl EquityClient {
    pub fn for_feed(feed: &EquityFeed, client: Client) -> Self {
        match feed {
            EquityFeed::Tiingo { api_key } => Self::Tiingo(TiingoClient::new(client, api_key.clone())),
            EquityFeed::AlphaVantage { api_key } => {
                Self::AlphaVantage(AlphaVantageClient::new(client, api_key.clone()))
            }
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Tiingo(_) => "tiingo",
            Self::AlphaVantage(_) => "alphavantage",
        }
    }

    pub async fn fetch_daily(&self, symbol: &str, days: u32) -> Result<Vec<Bar>> {
        match self {
            Self::Tiingo(c) => c.fetch_daily(symbol, days).await,
            Self::AlphaVantage(c) => c.fetch_daily(symbol, days).await,
        }
    }
}

/// Production provider: exchange fallback list plus an optional equity feed.
#[derive(Clone)]
pub struct ProviderChain {
    exchanges: Vec<ExchangeClient>,
    equity: Option<EquityClient>,
}

impl ProviderChain {
    pub fn new(exchanges: Vec<ExchangeClient>, equity: Option<EquityClient>) -> Self {
        Self { exchanges, equity }
    }

    /// Resolve the configured integrations once.
    pub fn from_config(config: &Config) -> Result<Self> {
        let client = http_client(config.request_timeout_secs)?;
        let exchanges: Vec<ExchangeClient> = config
            .crypto_exchanges
            .iter()
            .map(|source| ExchangeClient::for_source(*source, client.clone()))
            .collect();
        let equity = config
            .equity_feed
            .as_ref()
            .map(|feed| EquityClient::for_feed(feed, client.clone()));

        info!(
            "Provider chain: exchanges [{}], equity feed {}",
            exchanges.iter().map(|e| e.name()).collect::<Vec<_>>().join(", "),
            equity.as_ref().map(|e| e.name()).unwrap_or("disabled")
        );

        Ok(Self::new(exchanges, equity))
    }

    async fn fetch_from_exchanges(&self, symbol: &str, days: u32) -> Option<Vec<Bar>> {
        for exchange in &self.exchanges {
            match exchange.fetch_daily(symbol, days).await {
                Ok(bars) if !bars.is_empty() => {
                    info!("[{}] {} daily bars for {}", exchange.name(), bars.len(), symbol);
                    return Some(bars);
                }
                Ok(_) => debug!("[{}] no bars for {}", exchange.name(), symbol),
                Err(e) => warn!("[{}] fetch failed for {}: {}", exchange.name(), symbol, e),
            }
        }
        None
    }

    async fn fetch_from_equity_feed(&self, symbol: &str, days: u32) -> Option<Vec<Bar>> {
        let feed = self.equity.as_ref()?;
        match feed.fetch_daily(symbol, days).await {
            Ok(bars) if !bars.is_empty() => {
                info!("[{}] {} daily bars for {}", feed.name(), bars.len(), symbol);
                Some(bars)
            }
            Ok(_) => {
                debug!("[{}] no bars for {}", feed.name(), symbol);
                None
            }
            Err(e) => {
                warn!("[{}] fetch failed for {}: {}", feed.name(), symbol, e);
                None
            }
        }
    }
}

#[async_trait]
impl PriceProvider for ProviderChain {
    async fn fetch_daily(&self, symbol: &str, days: u32) -> Option<Vec<Bar>> {
        if is_exchange_pair(symbol) {
            self.fetch_from_exchanges(symbol, days).await
        } else {
            self.fetch_from_equity_feed(symbol, days).await
        }
    }
}

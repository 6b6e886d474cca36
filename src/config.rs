use crate::error::AppError;
use std::env;
use std::str::FromStr;
use tracing::warn;

/// Exchanges that can serve daily candles for `BASE-USD` pairs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExchangeSource {
    Coinbase,
    Kraken,
    Binance,
}

impl FromStr for ExchangeSource {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "coinbase" | "coinbaseexchange" => Ok(Self::Coinbase),
            "kraken" => Ok(Self::Kraken),
            "binance" => Ok(Self::Binance),
            other => Err(AppError::Config(format!("Unknown exchange '{}'", other))),
        }
    }
}

impl ExchangeSource {

    pub fn name(&self) -> &'static str {
        match self {
            Self::Coinbase => "coinbase",
            Self::Kraken => "kraken",
            Self::Binance => "binance",
        }
    }
}

/// Vendor feed for conventionally listed instruments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EquityFeed {
    Tiingo { api_key: String },
    AlphaVantage { api_key: String },
}

impl EquityFeed {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Tiingo { .. } => "tiingo",
            Self::AlphaVantage { .. } => "alphavantage",
        }
    }
}

/// Application configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// SQLite database path.
    pub db_path: String,
    /// Owner of the watchlist the pipeline tracks.
    pub default_user_id: String,
    /// Enabled vendor feed for equities, if any.
    pub equity_feed: Option<EquityFeed>,
    /// Exchanges to try in order for pair symbols.
    pub crypto_exchanges: Vec<ExchangeSource>,
    /// Seconds between scheduled cycles.
    pub cycle_interval_secs: u64,
    /// Calendar days requested when seeding.
    pub seed_days: u32,
    /// Stored bars below which a symbol is seeded.
    pub min_history_bars: usize,
    /// Bars read back for indicator computation.
    pub history_lookback: usize,
    /// Timeout for each external HTTP call.
    pub request_timeout_secs: u64,
}

/// Parse an ordered, de-duplicated exchange list, dropping unknown names.
pub fn parse_exchange_list(raw: &str) -> Vec<ExchangeSource> {
    let mut sources = Vec::new();
    for name in raw.split(',').map(str::trim).filter(|s| !s.is_empty()) {
        match name.parse::<ExchangeSource>() {
            Ok(source) if !sources.contains(&source) => sources.push(source),
            Ok(_) => {}
            Err(e) => warn!("{} in CRYPTO_EXCHANGES, ignoring", e),
        }
    }
    sources
}

fn flag(name: &str) -> bool {
    env::var(name)
        .ok()
        .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
        .unwrap_or(false)
}

fn non_empty(name: &str) -> Option<String> {
    env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Resolve the single equity feed from its flags and keys. Tiingo wins when both are enabled.
pub fn resolve_equity_feed(
    use_tiingo: bool,
    tiingo_key: Option<String>,
    use_alpha_vantage: bool,
    alpha_vantage_key: Option<String>,
) -> Option<EquityFeed> {
    if use_tiingo {
        if let Some(api_key) = tiingo_key {
            return Some(EquityFeed::Tiingo { api_key });
        }
        warn!("USE_TIINGO is set but TIINGO_API_KEY is empty");
    }
    if use_alpha_vantage {
        if let Some(api_key) = alpha_vantage_key {
            return Some(EquityFeed::AlphaVantage { api_key });
        }
        warn!("USE_ALPHA_VANTAGE is set but ALPHA_VANTAGE_API_KEY is empty");
    }
    None
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        let crypto_exchanges = parse_exchange_list(
            &env::var("CRYPTO_EXCHANGES").unwrap_or_else(|_| "coinbase,kraken".to_string()),
        );

        Self {
            db_path: env::var("DB_PATH").unwrap_or_else(|_| "data/analysis.db".to_string()),
            default_user_id: env::var("DEFAULT_USER_ID")
                .unwrap_or_else(|_| "11111111-1111-1111-1111-111111111111".to_string()),
            equity_feed: resolve_equity_feed(
                flag("USE_TIINGO"),
                non_empty("TIINGO_API_KEY"),
                flag("USE_ALPHA_VANTAGE"),
                non_empty("ALPHA_VANTAGE_API_KEY"),
            ),
            crypto_exchanges,
            cycle_interval_secs: env::var("CYCLE_INTERVAL_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .filter(|v| *v > 0)
                .unwrap_or(300),
            seed_days: env::var("SEED_DAYS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(320),
            min_history_bars: env::var("MIN_HISTORY_BARS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(250),
            history_lookback: env::var("HISTORY_LOOKBACK")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(500),
            request_timeout_secs: env::var("REQUEST_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(15),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            db_path: ":memory:".to_string(),
            default_user_id: "11111111-1111-1111-1111-111111111111".to_string(),
            equity_feed: None,
            crypto_exchanges: vec![ExchangeSource::Coinbase, ExchangeSource::Kraken],
            cycle_interval_secs: 300,
            seed_days: 320,
            min_history_bars: 250,
            history_lookback: 500,
            request_timeout_secs: 15,
        }
    }
}

use super::{snippet, split_pair};
use crate::error::{AppError, Result};
use crate::types::{normalize_bars, Bar};
use chrono::{Duration, TimeZone, Utc};
use reqwest::Client;
use tracing::debug;

const COINBASE_API_URL: &str = "https://api.exchange.coinbase.com";
/// Maximum candles returned per request.
const MAX_CANDLES: i64 = 300;
const DAY_SECS: i64 = 86_400;

/// Coinbase Exchange candles client.
#[derive(Clone)]
pub struct CoinbaseClient {
    client: Client,
    base_url: String,
}

impl CoinbaseClient {
    pub fn new(client: Client) -> Self {
        Self::with_base_url(client, COINBASE_API_URL)
    }

    pub fn with_base_url(client: Client, base_url: &str) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    /// Fetch daily candles, paging backwards in 300-day windows.
    pub async fn fetch_daily(&self, symbol: &str, days: u32) -> Result<Vec<Bar>> {
        let (base, quote) = split_pair(symbol)
            .ok_or_else(|| AppError::ExternalApi(format!("Not a pair symbol: {}", symbol)))?;
        let product = format!("{}-{}", base, quote);

        let end = Utc::now();
        let start = end - Duration::days(days as i64);
        let mut bars = Vec::new();
        let mut window_start = start;

        while window_start < end {
            let window_end = (window_start + Duration::seconds(MAX_CANDLES * DAY_SECS)).min(end);
            let url = format!("{}/products/{}/candles", self.base_url, product);

            debug!("Fetching Coinbase candles for {} ({} .. {})", product, window_start, window_end);

            let response = self
                .client
                .get(&url)
                .query(&[
                    ("granularity", DAY_SECS.to_string()),
                    ("start", window_start.to_rfc3339()),
                    ("end", window_end.to_rfc3339()),
                ])
                .send()
                .await?;

            if !response.status().is_success() {
                let status = response.status();
                let body = response.text().await.unwrap_or_default();
                return Err(AppError::ExternalApi(format!(
                    "Coinbase API error {}: {}",
                    status,
                    snippet(&body)
                )));
            }

            // [time, low, high, open, close, volume], newest first
            let rows: Vec<[f64; 6]> = response.json().await?;
            bars.extend(rows.into_iter().filter_map(|row| {
                let ts = Utc.timestamp_opt(row[0] as i64, 0).single()?;
                Some(Bar::daily(symbol, ts, row[3], row[2], row[1], row[4], row[5]))
            }));

            window_start = window_end;
        }

        Ok(normalize_bars(bars, days as usize))
    }
}

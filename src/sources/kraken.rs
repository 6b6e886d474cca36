use super::{snippet, split_pair, value_f64};
use crate::error::{AppError, Result};
use crate::types::{normalize_bars, Bar};
use chrono::{Duration, TimeZone, Utc};
use reqwest::Client;
use serde::Deserialize;
use std::collections::HashMap;
use tracing::{debug, warn};

const KRAKEN_API_URL: &str = "https://api.kraken.com/0/public";
const DAILY_INTERVAL_MINUTES: u32 = 1440;

/// Kraken uses legacy asset codes for a few bases.
const ASSET_ALIASES: &[(&str, &str)] = &[("BTC", "XBT"), ("DOGE", "XDG")];

/// Kraken OHLC response.
#[derive(Debug, Deserialize)]
struct KrakenResponse {
    error: Vec<String>,
    result: Option<HashMap<String, serde_json::Value>>,
}

/// Kraken pair code for a `BASE-QUOTE` symbol.
pub fn kraken_pair(symbol: &str) -> Option<String> {
    let (base, quote) = split_pair(symbol)?;
    let base = ASSET_ALIASES
        .iter()
        .find(|(from, _)| *from == base)
        .map(|(_, to)| to.to_string())
        .unwrap_or(base);
    Some(format!("{}{}", base, quote))
}

/// Kraken public OHLC client.
#[derive(Clone)]
pub struct KrakenClient {
    client: Client,
    base_url: String,
}

impl KrakenClient {
    pub fn new(client: Client) -> Self {
        Self::with_base_url(client, KRAKEN_API_URL)
    }

    pub fn with_base_url(client: Client, base_url: &str) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub async fn fetch_daily(&self, symbol: &str, days: u32) -> Result<Vec<Bar>> {
        let pair = kraken_pair(symbol)
            .ok_or_else(|| AppError::ExternalApi(format!("Not a pair symbol: {}", symbol)))?;
        let since = (Utc::now() - Duration::days(days as i64)).timestamp();
        let url = format!("{}/OHLC", self.base_url);

        debug!("Fetching Kraken OHLC for {} since {}", pair, since);

        let response = self
            .client
            .get(&url)
            .query(&[
                ("pair", pair.clone()),
                ("interval", DAILY_INTERVAL_MINUTES.to_string()),
                ("since", since.to_string()),
            ])
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::ExternalApi(format!(
                "Kraken API error {}: {}",
                status,
                snippet(&body)
            )));
        }

        let data: KrakenResponse = response.json().await?;

        if !data.error.is_empty() {
            warn!("Kraken API errors for {}: {:?}", pair, data.error);
        }

        let Some(result) = data.result else {
            return Err(AppError::ExternalApi(format!(
                "Kraken returned no result for {}: {:?}",
                pair, data.error
            )));
        };

        // The result is keyed by Kraken's canonical pair name next to a "last" cursor.
        let rows = result
            .into_iter()
            .filter(|(key, _)| key != "last")
            .find_map(|(_, value)| match value {
                serde_json::Value::Array(rows) => Some(rows),
                _ => None,
            })
            .unwrap_or_default();

        // [time, open, high, low, close, vwap, volume, count]
        let bars = rows
            .iter()
            .filter_map(|row| {
                let row = row.as_array()?;
                if row.len() < 7 {
                    return None;
                }
                let ts = Utc.timestamp_opt(row[0].as_i64()?, 0).single()?;
                Some(Bar::daily(
                    symbol,
                    ts,
                    value_f64(&row[1])?,
                    value_f64(&row[2])?,
                    value_f64(&row[3])?,
                    value_f64(&row[4])?,
                    value_f64(&row[6])?,
                ))
            })
            .collect();

        Ok(normalize_bars(bars, days as usize))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kraken_pair_aliases() {
        assert_eq!(kraken_pair("BTC-USD").as_deref(), Some("XBTUSD"));
        assert_eq!(kraken_pair("doge-usd").as_deref(), Some("XDGUSD"));
        assert_eq!(kraken_pair("ETH-USD").as_deref(), Some("ETHUSD"));
        assert_eq!(kraken_pair("AAPL"), None);
    }
}

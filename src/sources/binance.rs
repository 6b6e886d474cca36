use super::{snippet, split_pair, value_f64};
use crate::error::{AppError, Result};
use crate::types::{normalize_bars, Bar};
use chrono::{TimeZone, Utc};
use reqwest::Client;
use tracing::debug;

const BINANCE_API_URL: &str = "https://api.binance.com/api/v3";
const MAX_KLINES: u32 = 1000;

/// Binance trading symbol for a `BASE-QUOTE` pair. USD pairs trade against USDT.
pub fn binance_symbol(symbol: &str) -> Option<String> {
    let (base, quote) = split_pair(symbol)?;
    let quote = if quote == "USD" { "USDT".to_string() } else { quote };
    Some(format!("{}{}", base, quote))
}

/// Binance klines client.
#[derive(Clone)]
pub struct BinanceClient {
    client: Client,
    base_url: String,
}

impl BinanceClient {
    pub fn new(client: Client) -> Self {
        Self::with_base_url(client, BINANCE_API_URL)
    }

    pub fn with_base_url(client: Client, base_url: &str) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub async fn fetch_daily(&self, symbol: &str, days: u32) -> Result<Vec<Bar>> {
        let pair = binance_symbol(symbol)
            .ok_or_else(|| AppError::ExternalApi(format!("Not a pair symbol: {}", symbol)))?;
        let limit = days.clamp(1, MAX_KLINES);
        let url = format!("{}/klines", self.base_url);

        debug!("Fetching Binance klines for {} (limit {})", pair, limit);

        let response = self
            .client
            .get(&url)
            .query(&[
                ("symbol", pair),
                ("interval", "1d".to_string()),
                ("limit", limit.to_string()),
            ])
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::ExternalApi(format!(
                "Binance API error {}: {}",
                status,
                snippet(&body)
            )));
        }

        // [open_time_ms, open, high, low, close, volume, close_time_ms, ...]
        let rows: Vec<Vec<serde_json::Value>> = response.json().await?;
        let bars = rows
            .iter()
            .filter(|row| row.len() >= 6)
            .filter_map(|row| {
                let ts = Utc.timestamp_millis_opt(row[0].as_i64()?).single()?;
                Some(Bar::daily(
                    symbol,
                    ts,
                    value_f64(&row[1])?,
                    value_f64(&row[2])?,
                    value_f64(&row[3])?,
                    value_f64(&row[4])?,
                    value_f64(&row[5])?,
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
    fn test_binance_symbol_maps_usd_to_usdt() {
        assert_eq!(binance_symbol("BTC-USD").as_deref(), Some("BTCUSDT"));
        assert_eq!(binance_symbol("eth-usd").as_deref(), Some("ETHUSDT"));
        assert_eq!(binance_symbol("NVDA"), None);
    }
}

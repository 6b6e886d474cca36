use super::snippet;
use crate::error::{AppError, Result};
use crate::types::{normalize_bars, Bar};
use chrono::{DateTime, Duration, Utc};
use reqwest::Client;
use serde::Deserialize;
use tracing::debug;

const TIINGO_API_URL: &str = "https://api.tiingo.com";

/// One row of the Tiingo end-of-day prices endpoint.
#[derive(Debug, Deserialize)]
struct TiingoPrice {
    date: String,
    open: f64,
    high: f64,
    low: f64,
    close: f64,
    #[serde(default)]
    volume: Option<f64>,
}

/// Tiingo end-of-day REST client.
#[derive(Clone)]
pub struct TiingoClient {
    client: Client,
    api_key: String,
    base_url: String,
}

impl TiingoClient {
    pub fn new(client: Client, api_key: String) -> Self {
        Self::with_base_url(client, api_key, TIINGO_API_URL)
    }

    pub fn with_base_url(client: Client, api_key: String, base_url: &str) -> Self {
        Self {
            client,
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub async fn fetch_daily(&self, symbol: &str, days: u32) -> Result<Vec<Bar>> {
        let start = Utc::now() - Duration::days(days as i64);
        let url = format!("{}/tiingo/daily/{}/prices", self.base_url, symbol.to_lowercase());

        debug!("Fetching Tiingo daily prices for {} from {}", symbol, start.date_naive());

        let response = self
            .client
            .get(&url)
            .query(&[
                ("startDate", start.format("%Y-%m-%d").to_string()),
                ("token", self.api_key.clone()),
            ])
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::ExternalApi(format!(
                "Tiingo API error {}: {}",
                status,
                snippet(&body)
            )));
        }

        let rows: Vec<TiingoPrice> = response.json().await?;
        let bars = rows
            .into_iter()
            .filter_map(|row| {
                let ts = DateTime::parse_from_rfc3339(&row.date).ok()?.with_timezone(&Utc);
                Some(Bar::daily(
                    symbol,
                    ts,
                    row.open,
                    row.high,
                    row.low,
                    row.close,
                    row.volume.unwrap_or(0.0),
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
    fn test_tiingo_row_without_volume() {
        let json = r#"[{"date":"2024-03-01T00:00:00.000Z","open":1.0,"high":2.0,"low":0.5,"close":1.5,"volume":null}]"#;
        let rows: Vec<TiingoPrice> = serde_json::from_str(json).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].volume, None);
        assert!(DateTime::parse_from_rfc3339(&rows[0].date).is_ok());
    }
}

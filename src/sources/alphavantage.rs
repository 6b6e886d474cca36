//! Alpha Vantage daily time series.
//!
//! Free tier is rate limited to 25 requests/day and 5/minute.

use super::snippet;
use crate::error::{AppError, Result};
use crate::types::{normalize_bars, Bar};
use chrono::{Duration, NaiveDate, Utc};
use reqwest::Client;
use serde::Deserialize;
use std::collections::HashMap;
use tracing::debug;

const ALPHA_VANTAGE_URL: &str = "https://www.alphavantage.co/query";

/// Time series daily response.
#[derive(Debug, Clone, Deserialize)]
pub struct TimeSeriesDailyResponse {
    #[serde(rename = "Time Series (Daily)")]
    pub time_series: Option<HashMap<String, TimeSeriesDataPoint>>,
    /// Rate-limit and usage notices come back with a 200 status.
    #[serde(rename = "Note")]
    pub note: Option<String>,
    #[serde(rename = "Information")]
    pub information: Option<String>,
    #[serde(rename = "Error Message")]
    pub error_message: Option<String>,
}

/// Individual time series data point.
#[derive(Debug, Clone, Deserialize)]
pub struct TimeSeriesDataPoint {
    #[serde(rename = "1. open")]
    pub open: String,
    #[serde(rename = "2. high")]
    pub high: String,
    #[serde(rename = "3. low")]
    pub low: String,
    #[serde(rename = "4. close")]
    pub close: String,
    #[serde(rename = "5. volume")]
    pub volume: String,
}

/// Alpha Vantage API client.
#[derive(Clone)]
pub struct AlphaVantageClient {
    client: Client,
    api_key: String,
    base_url: String,
}

impl AlphaVantageClient {
    pub fn new(client: Client, api_key: String) -> Self {
        Self::with_base_url(client, api_key, ALPHA_VANTAGE_URL)
    }

    pub fn with_base_url(client: Client, api_key: String, base_url: &str) -> Self {
        Self {
            client,
            api_key,
            base_url: base_url.to_string(),
        }
    }

    /// Get daily bars for the last `days` calendar days.
    pub async fn fetch_daily(&self, symbol: &str, days: u32) -> Result<Vec<Bar>> {
        debug!("Fetching Alpha Vantage daily series for {}", symbol);

        let response = self
            .client
            .get(&self.base_url)
            .query(&[
                ("function", "TIME_SERIES_DAILY"),
                ("symbol", symbol),
                ("outputsize", "full"),
                ("apikey", self.api_key.as_str()),
            ])
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::ExternalApi(format!(
                "Alpha Vantage API error {}: {}",
                status,
                snippet(&body)
            )));
        }

        let data: TimeSeriesDailyResponse = response.json().await?;

        let Some(time_series) = data.time_series else {
            let reason = data
                .error_message
                .or(data.note)
                .or(data.information)
                .unwrap_or_else(|| "No time series data available".to_string());
            return Err(AppError::ExternalApi(reason));
        };

        Ok(parse_time_series(symbol, time_series, days))
    }
}

fn parse_time_series(
    symbol: &str,
    time_series: HashMap<String, TimeSeriesDataPoint>,
    days: u32,
) -> Vec<Bar> {
    let cutoff = Utc::now() - Duration::days(days as i64);

    let bars = time_series
        .into_iter()
        .filter_map(|(date_str, point)| {
            let date = NaiveDate::parse_from_str(&date_str, "%Y-%m-%d").ok()?;
            let ts = date.and_hms_opt(0, 0, 0)?.and_utc();
            if ts < cutoff {
                return None;
            }

            Some(Bar::daily(
                symbol,
                ts,
                point.open.parse().ok()?,
                point.high.parse().ok()?,
                point.low.parse().ok()?,
                point.close.parse().ok()?,
                point.volume.parse().unwrap_or(0.0),
            ))
        })
        .collect();

    normalize_bars(bars, days as usize)
}

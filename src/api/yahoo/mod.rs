//! Yahoo Finance backend: v8 chart for bars and prices, v10 quoteSummary for
//! fundamentals.

mod types;

use crate::api::{Bar, BarTime, MarketData, SeriesRequest, StockInfo, Window};
use crate::config::Config;
use crate::error::{Result, ScreenerError};
use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use log::{debug, info};
use reqwest::{Client, Url};
use serde_json::Value;
use types::{ChartEnvelope, ChartResult, SummaryEnvelope};

const SUMMARY_MODULES: &str = "price,summaryDetail,assetProfile,defaultKeyStatistics";

#[derive(Debug, Clone)]
pub struct YahooClient {
    http: Client,
    base_url: Url,
}

impl YahooClient {
    pub fn new(config: &Config) -> Result<Self> {
        let http = Client::builder()
            .timeout(config.http_timeout)
            .user_agent(&config.user_agent)
            .build()?;

        let base_url = Url::parse(&config.base_url).map_err(|e| {
            ScreenerError::Data(format!("Invalid market-data URL {}: {}", config.base_url, e))
        })?;

        Ok(Self { http, base_url })
    }

    /// `base/<route...>/<symbol>`, with the symbol escaped as one path segment.
    fn endpoint(&self, route: &[&str], symbol: &str) -> Result<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| ScreenerError::Data(format!("Cannot build a path on {}", self.base_url)))?
            .pop_if_empty()
            .extend(route)
            .push(symbol);
        Ok(url)
    }

    async fn chart(&self, symbol: &str, query: &[(&str, String)]) -> Result<ChartResult> {
        let url = self.endpoint(&["v8", "finance", "chart"], symbol)?;
        debug!("GET {} {:?}", url, query);

        let body: Value = self
            .http
            .get(url)
            .query(query)
            .send()
            .await?
            .json()
            .await?;

        let envelope: ChartEnvelope = serde_json::from_value(body)
            .map_err(|_| ScreenerError::Data("Unexpected data format.".to_string()))?;

        if let Some(err) = envelope.chart.error {
            return Err(ScreenerError::Data(format!("{}: {}", err.code, err.description)));
        }

        envelope
            .chart
            .result
            .and_then(|results| results.into_iter().next())
            .ok_or_else(|| ScreenerError::Data("No data available.".to_string()))
    }

    async fn quote_summary(&self, symbol: &str) -> Result<StockInfo> {
        let url = self.endpoint(&["v10", "finance", "quoteSummary"], symbol)?;
        let envelope: SummaryEnvelope = self
            .http
            .get(url)
            .query(&[("modules", SUMMARY_MODULES)])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        let modules = envelope
            .quote_summary
            .result
            .and_then(|results| results.into_iter().next())
            .ok_or_else(|| ScreenerError::Data("Empty quote summary.".to_string()))?;

        let mut info = StockInfo::default();
        for (_, module) in modules {
            if let Value::Object(fields) = module {
                for (key, value) in fields {
                    if let Some(value) = flatten_field(value) {
                        info.insert_missing(key, value);
                    }
                }
            }
        }
        Ok(info)
    }
}

/// quoteSummary wraps numbers as `{"raw": 1.0, "fmt": "1.00"}`; keep the raw
/// value and drop empty wrappers.
fn flatten_field(value: Value) -> Option<Value> {
    match value {
        Value::Object(mut map) => match map.remove("raw") {
            Some(raw) if !raw.is_null() => Some(raw),
            _ => None,
        },
        Value::Null | Value::Array(_) => None,
        scalar => Some(scalar),
    }
}

fn bars_from_chart(result: ChartResult, intraday: bool) -> Result<Vec<Bar>> {
    let timestamps = match result.timestamp {
        Some(ts) => ts,
        None => return Ok(Vec::new()),
    };

    let closes = result
        .indicators
        .quote
        .into_iter()
        .next()
        .and_then(|q| q.close)
        .ok_or_else(|| ScreenerError::Data("Unexpected data format.".to_string()))?;

    if closes.len() != timestamps.len() {
        return Err(ScreenerError::Data("Unexpected data format.".to_string()));
    }

    let bars = timestamps
        .into_iter()
        .zip(closes)
        .filter_map(|(ts, close)| {
            let at = Utc.timestamp_opt(ts, 0).single()?;
            let time = if intraday {
                BarTime::Datetime(at)
            } else {
                BarTime::Date(at.date_naive())
            };
            Some(Bar { time, close })
        })
        .collect();

    Ok(bars)
}

#[async_trait]
impl MarketData for YahooClient {
    async fn fetch_bars(&self, symbol: &str, request: &SeriesRequest) -> Result<Vec<Bar>> {
        let mut query = vec![("interval", request.interval.as_str().to_string())];
        match &request.window {
            Window::Span { start, end } => {
                query.push(("period1", start.timestamp().to_string()));
                query.push(("period2", end.timestamp().to_string()));
            }
            Window::Range(range) => query.push(("range", range.to_string())),
        }

        let result = self.chart(symbol, &query).await?;
        let intraday = matches!(request.window, Window::Span { .. });
        let bars = bars_from_chart(result, intraday)?;
        info!("Fetched {} bars for {} ({})", bars.len(), symbol, request.interval.as_str());
        Ok(bars)
    }

    async fn fetch_metadata(&self, symbol: &str) -> Result<StockInfo> {
        let mut info = match self.quote_summary(symbol).await {
            Ok(info) => info,
            Err(e) => {
                debug!("quoteSummary unavailable for {}: {}", symbol, e);
                StockInfo::default()
            }
        };

        if info.is_empty() {
            let query = [("range", "1d".to_string()), ("interval", "1d".to_string())];
            let result = self.chart(symbol, &query).await?;
            for (key, value) in result.meta {
                info.insert_missing(key, value);
            }
        }

        if info.is_empty() {
            return Err(ScreenerError::Data(
                "Unable to fetch data for this symbol.".to_string(),
            ));
        }
        info.insert_missing("symbol", Value::String(symbol.to_string()));
        Ok(info)
    }

    async fn fetch_latest_price(&self, symbol: &str) -> Result<f64> {
        let query = [("range", "1d".to_string()), ("interval", "1d".to_string())];
        let result = self.chart(symbol, &query).await?;

        let from_meta = result
            .meta
            .get("regularMarketPrice")
            .and_then(Value::as_f64);
        let last_close = result
            .indicators
            .quote
            .first()
            .and_then(|q| q.close.as_ref())
            .and_then(|closes| closes.iter().rev().flatten().next().copied());

        last_close
            .or(from_meta)
            .ok_or_else(|| ScreenerError::Data(format!("No price available for {}", symbol)))
    }
}

//! Market-data capability and the types that cross it.

pub mod yahoo;

use crate::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde_json::{Map, Value};
use std::fmt;

/// Historical lookback windows offered by the chart view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Period {
    OneDay,
    FiveDays,
    OneMonth,
    ThreeMonths,
    SixMonths,
    OneYear,
    YearToDate,
    Max,
}

impl Period {
    pub const ALL: [Period; 8] = [
        Period::OneDay,
        Period::FiveDays,
        Period::OneMonth,
        Period::ThreeMonths,
        Period::SixMonths,
        Period::OneYear,
        Period::YearToDate,
        Period::Max,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Period::OneDay => "1d",
            Period::FiveDays => "5d",
            Period::OneMonth => "1mo",
            Period::ThreeMonths => "3mo",
            Period::SixMonths => "6mo",
            Period::OneYear => "1y",
            Period::YearToDate => "ytd",
            Period::Max => "max",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Period::OneDay => "1 Day",
            Period::FiveDays => "5 Days",
            Period::OneMonth => "1 Month",
            Period::ThreeMonths => "3 Months",
            Period::SixMonths => "6 Months",
            Period::OneYear => "1 Year",
            Period::YearToDate => "Year To Date",
            Period::Max => "Max",
        }
    }

    pub fn index(&self) -> usize {
        Self::ALL.iter().position(|p| p == self).unwrap_or(0)
    }

    pub fn next(&self) -> Period {
        Self::ALL[(self.index() + 1) % Self::ALL.len()]
    }

    pub fn prev(&self) -> Period {
        Self::ALL[(self.index() + Self::ALL.len() - 1) % Self::ALL.len()]
    }

    /// The one-day view asks for minute bars over the last 24 hours;
    /// every other preset asks for daily bars over the named range.
    pub fn request(&self, now: DateTime<Utc>) -> SeriesRequest {
        match self {
            Period::OneDay => SeriesRequest {
                interval: Interval::OneMinute,
                window: Window::Span {
                    start: now - Duration::days(1),
                    end: now,
                },
            },
            other => SeriesRequest {
                interval: Interval::OneDay,
                window: Window::Range(other.as_str()),
            },
        }
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interval {
    OneMinute,
    OneDay,
}

impl Interval {
    pub fn as_str(&self) -> &'static str {
        match self {
            Interval::OneMinute => "1m",
            Interval::OneDay => "1d",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Window {
    Span {
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    },
    Range(&'static str),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeriesRequest {
    pub interval: Interval,
    pub window: Window,
}

/// Time key of a raw bar. Intraday bars carry a full timestamp, daily bars
/// only a calendar date.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BarTime {
    Datetime(DateTime<Utc>),
    Date(NaiveDate),
}

impl BarTime {
    pub fn to_utc(self) -> DateTime<Utc> {
        match self {
            BarTime::Datetime(ts) => ts,
            BarTime::Date(date) => date.and_hms_opt(0, 0, 0).unwrap_or_default().and_utc(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Bar {
    pub time: BarTime,
    pub close: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PricePoint {
    pub time: DateTime<Utc>,
    pub close: f64,
}

/// Close prices for one symbol over one period, oldest first.
#[derive(Debug, Clone, PartialEq)]
pub struct PriceSeries {
    pub symbol: String,
    pub period: Period,
    pub points: Vec<PricePoint>,
}

impl PriceSeries {
    pub fn last_close(&self) -> Option<f64> {
        self.points.last().map(|p| p.close)
    }

    pub fn min_max(&self) -> Option<(f64, f64)> {
        if self.points.is_empty() {
            return None;
        }
        let min = self.points.iter().map(|p| p.close).fold(f64::INFINITY, f64::min);
        let max = self.points.iter().map(|p| p.close).fold(f64::NEG_INFINITY, f64::max);
        Some((min, max))
    }
}

/// Quote metadata keyed by provider field name (`shortName`, `marketCap`, ...).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StockInfo(Map<String, Value>);

impl StockInfo {
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key).filter(|v| !v.is_null())
    }

    #[cfg(test)]
    pub fn insert(&mut self, key: impl Into<String>, value: Value) {
        self.0.insert(key.into(), value);
    }

    /// Inserts only when the field is not already present.
    pub fn insert_missing(&mut self, key: impl Into<String>, value: Value) {
        self.0.entry(key.into()).or_insert(value);
    }

    pub fn f64(&self, key: &str) -> Option<f64> {
        self.get(key).and_then(Value::as_f64)
    }

    pub fn i64(&self, key: &str) -> Option<i64> {
        self.get(key)
            .and_then(|v| v.as_i64().or_else(|| v.as_f64().map(|f| f as i64)))
    }

    pub fn str(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(Value::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Everything the application needs from a quote source.
#[async_trait]
pub trait MarketData: Send + Sync {
    /// Raw bars for `symbol`. An empty vector means the provider had no rows.
    async fn fetch_bars(&self, symbol: &str, request: &SeriesRequest) -> Result<Vec<Bar>>;

    async fn fetch_metadata(&self, symbol: &str) -> Result<StockInfo>;

    /// Most recent close.
    async fn fetch_latest_price(&self, symbol: &str) -> Result<f64>;
}

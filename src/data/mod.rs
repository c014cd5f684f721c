//! Price-series and metadata access on top of a [`MarketData`] provider.

mod cache;

pub use cache::MetadataCache;

use crate::api::{MarketData, Period, PricePoint, PriceSeries, StockInfo};
use crate::error::{Result, ScreenerError};
use chrono::Utc;
use log::{debug, warn};
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Clone)]
pub struct DataManager {
    provider: Arc<dyn MarketData>,
    cache: Arc<Mutex<MetadataCache>>,
}

impl DataManager {
    pub fn new(provider: Arc<dyn MarketData>, cache_ttl: Duration, cache_capacity: usize) -> Self {
        Self {
            provider,
            cache: Arc::new(Mutex::new(MetadataCache::new(cache_ttl, cache_capacity))),
        }
    }

    /// Close prices for `symbol` over `period`. Every failure, including an
    /// empty result, comes back as [`ScreenerError::Data`].
    pub async fn fetch_price_series(&self, symbol: &str, period: Period) -> Result<PriceSeries> {
        self.load_series(symbol, period)
            .await
            .map_err(|e| ScreenerError::Data(format!("Failed to fetch data: {}", e)))
    }

    async fn load_series(&self, symbol: &str, period: Period) -> Result<PriceSeries> {
        let request = period.request(Utc::now());
        let bars = self.provider.fetch_bars(symbol, &request).await?;
        if bars.is_empty() {
            return Err(ScreenerError::Data("No data available.".to_string()));
        }

        let points: Vec<PricePoint> = bars
            .into_iter()
            .filter_map(|bar| {
                bar.close.map(|close| PricePoint {
                    time: bar.time.to_utc(),
                    close,
                })
            })
            .collect();

        if points.is_empty() {
            return Err(ScreenerError::Data("No data available.".to_string()));
        }

        Ok(PriceSeries {
            symbol: symbol.to_string(),
            period,
            points,
        })
    }

    pub async fn get_quote_metadata(&self, symbol: &str) -> Result<StockInfo> {
        if let Some(info) = self.lock_cache().get(symbol) {
            debug!("Metadata cache hit for {}", symbol);
            return Ok(info);
        }

        let info = self.provider.fetch_metadata(symbol).await?;
        self.lock_cache().insert(symbol, info.clone());
        Ok(info)
    }

    /// Latest close, or `None` when the provider fails for any reason.
    pub async fn get_latest_price(&self, symbol: &str) -> Option<f64> {
        match self.provider.fetch_latest_price(symbol).await {
            Ok(price) => Some(price),
            Err(e) => {
                warn!("Latest price for {} unavailable: {}", symbol, e);
                None
            }
        }
    }

    fn lock_cache(&self) -> std::sync::MutexGuard<'_, MetadataCache> {
        // A poisoned cache only ever holds complete entries.
        self.cache.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
pub mod mock {
    use crate::api::{Bar, MarketData, SeriesRequest, StockInfo};
    use crate::error::{Result, ScreenerError};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    /// Scriptable provider that records what it was asked for.
    #[derive(Default)]
    pub struct MockMarket {
        pub bars: Mutex<Option<Vec<Bar>>>,
        pub info: Mutex<Option<StockInfo>>,
        pub price: Mutex<Option<f64>>,
        pub requests: Mutex<Vec<SeriesRequest>>,
        pub metadata_calls: AtomicUsize,
        /// Delay before `fetch_latest_price` answers.
        pub price_delay: Mutex<Duration>,
        /// Makes the next `fetch_latest_price` call panic.
        pub panic_on_price: AtomicBool,
    }

    impl MockMarket {
        pub fn with_price(price: f64) -> Self {
            let mock = Self::default();
            *mock.price.lock().unwrap() = Some(price);
            mock
        }

        pub fn set_price(&self, price: Option<f64>) {
            *self.price.lock().unwrap() = price;
        }

        pub fn metadata_calls(&self) -> usize {
            self.metadata_calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl MarketData for MockMarket {
        async fn fetch_bars(&self, _symbol: &str, request: &SeriesRequest) -> Result<Vec<Bar>> {
            self.requests.lock().unwrap().push(request.clone());
            self.bars
                .lock()
                .unwrap()
                .clone()
                .ok_or_else(|| ScreenerError::Data("provider down".to_string()))
        }

        async fn fetch_metadata(&self, _symbol: &str) -> Result<StockInfo> {
            self.metadata_calls.fetch_add(1, Ordering::SeqCst);
            self.info
                .lock()
                .unwrap()
                .clone()
                .ok_or_else(|| ScreenerError::Data("Unable to fetch data for this symbol.".to_string()))
        }

        async fn fetch_latest_price(&self, symbol: &str) -> Result<f64> {
            if self.panic_on_price.swap(false, Ordering::SeqCst) {
                panic!("price feed blew up");
            }
            let delay = *self.price_delay.lock().unwrap();
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            self.price
                .lock()
                .unwrap()
                .ok_or_else(|| ScreenerError::Data(format!("No price available for {}", symbol)))
        }
    }
}

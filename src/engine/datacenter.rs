//! Data Center
//!
//! Facade composing a registry of data source adapters (keyed by exchange +
//! market type) with the cache/circuit-breaker layer, exposing a single
//! `get_market_data` request model to the rest of the engine.

use crate::engine::adapter::DataSourceAdapter;
use crate::engine::bar::{validate_sequence, Bar};
use crate::engine::cache::{BarCache, CacheKey, CircuitBreaker};
use crate::engine::error::EngineError;
use crate::engine::time::{Interval, Millis, SymbolId};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

/// Key identifying one adapter in the registry.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AdapterKey {
    pub exchange: String,
    pub market_type: String,
}

impl AdapterKey {
    pub fn new(exchange: impl Into<String>, market_type: impl Into<String>) -> Self {
        Self {
            exchange: exchange.into(),
            market_type: market_type.into(),
        }
    }
}

/// A request for bundled OHLCV arrays.
#[derive(Debug, Clone)]
pub struct MarketDataRequest {
    pub adapter: AdapterKey,
    pub symbol: SymbolId,
    pub interval: Interval,
    pub limit: usize,
    pub range: Option<(Millis, Millis)>,
}

/// Aligned OHLCV arrays, one entry per field, plus metadata.
#[derive(Debug, Clone, Default)]
pub struct Ohlcv {
    pub open: Vec<f64>,
    pub high: Vec<f64>,
    pub low: Vec<f64>,
    pub close: Vec<f64>,
    pub volume: Vec<f64>,
    pub timestamps: Vec<Millis>,
}

impl From<&[Bar]> for Ohlcv {
    fn from(bars: &[Bar]) -> Self {
        let mut out = Ohlcv::default();
        for bar in bars {
            out.open.push(bar.open);
            out.high.push(bar.high);
            out.low.push(bar.low);
            out.close.push(bar.close);
            out.volume.push(bar.volume);
            out.timestamps.push(bar.open_time);
        }
        out
    }
}

#[derive(Debug, Clone)]
pub struct MarketDataMetadata {
    pub symbol: SymbolId,
    pub interval: Interval,
    pub count: usize,
}

#[derive(Debug, Clone)]
pub struct MarketDataResponse {
    pub ohlcv: Ohlcv,
    pub metadata: MarketDataMetadata,
}

/// Composes an adapter registry with the cache/breaker pair.
pub struct DataCenter {
    adapters: HashMap<AdapterKey, Arc<dyn DataSourceAdapter>>,
    cache: BarCache,
    breakers: parking_lot::Mutex<HashMap<String, Arc<CircuitBreaker>>>,
    cache_enabled: bool,
    max_retries: u32,
    retry_delay: Duration,
}

impl DataCenter {
    pub fn new(cache_ttl: Duration, cache_capacity: usize) -> Self {
        Self {
            adapters: HashMap::new(),
            cache: BarCache::new(cache_ttl, cache_capacity),
            breakers: parking_lot::Mutex::new(HashMap::new()),
            cache_enabled: true,
            max_retries: 3,
            retry_delay: Duration::from_millis(200),
        }
    }

    pub fn with_cache_enabled(mut self, enabled: bool) -> Self {
        self.cache_enabled = enabled;
        self
    }

    pub fn register_adapter(&mut self, key: AdapterKey, adapter: Arc<dyn DataSourceAdapter>) {
        self.adapters.insert(key, adapter);
    }

    fn breaker_for(&self, service: &str) -> Arc<CircuitBreaker> {
        let mut breakers = self.breakers.lock();
        breakers
            .entry(service.to_string())
            .or_insert_with(|| {
                Arc::new(CircuitBreaker::new(service, 5, Duration::from_secs(30)))
            })
            .clone()
    }

    pub async fn get_market_data(
        &self,
        request: &MarketDataRequest,
    ) -> Result<MarketDataResponse, EngineError> {
        let adapter = self.adapters.get(&request.adapter).ok_or_else(|| {
            EngineError::ConfigError(format!(
                "no adapter registered for {:?}",
                request.adapter
            ))
        })?;

        let service = format!("{}:{}", request.adapter.exchange, request.adapter.market_type);
        let cache_key = CacheKey::new(
            &service,
            request.symbol.as_str(),
            request.interval,
            request.limit,
            request.range,
        );

        let bars = if self.cache_enabled {
            if let Some(cached) = self.cache.get(&cache_key) {
                cached
            } else {
                let fetched = self.fetch(adapter.as_ref(), &service, request).await?;
                self.cache.put(cache_key, fetched.clone());
                fetched
            }
        } else {
            self.fetch(adapter.as_ref(), &service, request).await?
        };

        let metadata = MarketDataMetadata {
            symbol: request.symbol.clone(),
            interval: request.interval,
            count: bars.len(),
        };
        Ok(MarketDataResponse {
            ohlcv: Ohlcv::from(bars.as_slice()),
            metadata,
        })
    }

    async fn fetch(
        &self,
        adapter: &dyn DataSourceAdapter,
        service: &str,
        request: &MarketDataRequest,
    ) -> Result<Vec<Bar>, EngineError> {
        let breaker = self.breaker_for(service);
        let max_retries = self.max_retries;
        let retry_delay = self.retry_delay;
        let bars = breaker
            .call(|| async {
                crate::engine::cache::with_retries(max_retries, retry_delay, || async {
                    adapter
                        .get_klines(&request.symbol, request.interval, request.limit, request.range)
                        .await
                })
                .await
            })
            .await?;
        validate_sequence(&bars, request.interval)?;
        Ok(bars)
    }

    /// Issue a bounded number of paged calls, stitching results in time
    /// order with duplicate suppression on `open_time`.
    pub async fn get_historical_klines_batch(
        &self,
        mut request: MarketDataRequest,
        max_requests: u32,
    ) -> Result<Vec<Bar>, EngineError> {
        let mut all = Vec::new();
        let mut seen_open_times = std::collections::HashSet::new();
        let Some((start, end)) = request.range else {
            return Err(EngineError::ConfigError(
                "get_historical_klines_batch requires a bounded range".into(),
            ));
        };
        let mut cursor = start;
        let mut requests_issued = 0;

        while cursor < end && requests_issued < max_requests {
            request.range = Some((cursor, end));
            let page = self.get_market_data(&request).await?;
            requests_issued += 1;

            if page.metadata.count == 0 {
                break;
            }

            let mut last_open_time = cursor;
            for (i, &ts) in page.ohlcv.timestamps.iter().enumerate() {
                if seen_open_times.insert(ts) {
                    all.push(Bar {
                        open_time: ts,
                        open: page.ohlcv.open[i],
                        high: page.ohlcv.high[i],
                        low: page.ohlcv.low[i],
                        close: page.ohlcv.close[i],
                        volume: page.ohlcv.volume[i],
                        close_time: ts + request.interval.to_millis().unwrap_or(0),
                        quote_volume: None,
                        trade_count: None,
                    });
                }
                last_open_time = last_open_time.max(ts);
            }

            let step = request.interval.to_millis().unwrap_or(1);
            let next_cursor = last_open_time + step;
            if next_cursor <= cursor {
                break;
            }
            cursor = next_cursor;
        }

        if requests_issued >= max_requests && cursor < end {
            tracing::warn!(
                symbol = %request.symbol,
                requests_issued,
                "get_historical_klines_batch hit max_requests before reaching end_ms; result is truncated"
            );
        }

        all.sort_by_key(|b| b.open_time);
        Ok(all)
    }
}

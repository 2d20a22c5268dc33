//! Data Source Adapter
//!
//! The only contract new exchange integrations need to satisfy. Real
//! transports (REST/WebSocket clients against Binance, Polymarket, etc.)
//! are external collaborators — this module defines the trait plus a single
//! in-memory reference implementation used by tests and the `demos/`
//! binaries.

use crate::engine::bar::Bar;
use crate::engine::error::{DataFetchKind, EngineError};
use crate::engine::time::{Interval, Millis, SymbolId};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};

/// Ticker snapshot.
#[derive(Debug, Clone, Copy)]
pub struct Ticker {
    pub last_price: f64,
    pub timestamp: Millis,
}

/// Capability set every data source adapter exposes.
///
/// Implementations MUST normalize symbols, MUST return bars sorted by
/// `open_time` ascending, and MUST NOT return more than `limit` bars.
#[async_trait]
pub trait DataSourceAdapter: Send + Sync {
    async fn get_klines(
        &self,
        symbol: &SymbolId,
        interval: Interval,
        limit: usize,
        range: Option<(Millis, Millis)>,
    ) -> Result<Vec<Bar>, EngineError>;

    async fn get_ticker(&self, symbol: &SymbolId) -> Result<Ticker, EngineError>;
}

/// Futures-capable adapters additionally surface mark price and funding.
#[async_trait]
pub trait FuturesDataSourceAdapter: DataSourceAdapter {
    async fn get_mark_price(&self, symbol: &SymbolId) -> Result<f64, EngineError>;
    async fn get_funding_rate(&self, symbol: &SymbolId) -> Result<f64, EngineError>;
}

/// In-memory adapter backed by a fixed bar table, for tests and demos.
///
/// `fail_next_n_calls` lets tests exercise the cache/circuit-breaker's
/// retry and trip behavior deterministically.
pub struct MockAdapter {
    bars: HashMap<String, Vec<Bar>>,
    fail_next_n_calls: AtomicU32,
}

impl MockAdapter {
    pub fn new() -> Self {
        Self {
            bars: HashMap::new(),
            fail_next_n_calls: AtomicU32::new(0),
        }
    }

    pub fn with_bars(mut self, symbol: &str, bars: Vec<Bar>) -> Self {
        self.bars.insert(SymbolId::normalize(symbol).as_str().to_string(), bars);
        self
    }

    /// Make the next `n` calls to `get_klines` fail with a network error.
    pub fn fail_next(&self, n: u32) {
        self.fail_next_n_calls.store(n, Ordering::SeqCst);
    }

    fn maybe_fail(&self) -> Result<(), EngineError> {
        let remaining = self.fail_next_n_calls.load(Ordering::SeqCst);
        if remaining > 0 {
            self.fail_next_n_calls.store(remaining - 1, Ordering::SeqCst);
            return Err(EngineError::DataFetch(DataFetchKind::Network(
                "mock adapter: injected failure".into(),
            )));
        }
        Ok(())
    }
}

impl Default for MockAdapter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DataSourceAdapter for MockAdapter {
    async fn get_klines(
        &self,
        symbol: &SymbolId,
        _interval: Interval,
        limit: usize,
        range: Option<(Millis, Millis)>,
    ) -> Result<Vec<Bar>, EngineError> {
        self.maybe_fail()?;
        let all = self
            .bars
            .get(symbol.as_str())
            .cloned()
            .unwrap_or_default();
        let filtered: Vec<Bar> = match range {
            Some((start, end)) => all
                .into_iter()
                .filter(|b| b.open_time >= start && b.open_time < end)
                .collect(),
            None => all,
        };
        Ok(filtered.into_iter().take(limit).collect())
    }

    async fn get_ticker(&self, symbol: &SymbolId) -> Result<Ticker, EngineError> {
        self.maybe_fail()?;
        let last = self
            .bars
            .get(symbol.as_str())
            .and_then(|b| b.last())
            .ok_or_else(|| {
                EngineError::DataFetch(DataFetchKind::Adapter(format!(
                    "no data for symbol {symbol}"
                )))
            })?;
        Ok(Ticker {
            last_price: last.close,
            timestamp: last.close_time,
        })
    }
}

#[async_trait]
impl FuturesDataSourceAdapter for MockAdapter {
    async fn get_mark_price(&self, symbol: &SymbolId) -> Result<f64, EngineError> {
        Ok(self.get_ticker(symbol).await?.last_price)
    }

    async fn get_funding_rate(&self, _symbol: &SymbolId) -> Result<f64, EngineError> {
        Ok(0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bar(open_time: Millis, close: f64) -> Bar {
        Bar {
            open_time,
            open: close,
            high: close,
            low: close,
            close,
            volume: 1.0,
            close_time: open_time + 60_000,
            quote_volume: None,
            trade_count: None,
        }
    }

    #[tokio::test]
    async fn normalizes_and_caps_to_limit() {
        let adapter = MockAdapter::new().with_bars(
            "BTCUSDT",
            vec![bar(0, 1.0), bar(60_000, 1.1), bar(120_000, 1.2)],
        );
        let symbol = SymbolId::normalize("btcusdt");
        let bars = adapter
            .get_klines(&symbol, Interval::Minutes(1), 2, None)
            .await
            .unwrap();
        assert_eq!(bars.len(), 2);
    }

    #[tokio::test]
    async fn injected_failure_surfaces_once() {
        let adapter = MockAdapter::new().with_bars("BTC/USDT", vec![bar(0, 1.0)]);
        adapter.fail_next(1);
        let symbol = SymbolId::normalize("BTC/USDT");
        assert!(adapter
            .get_klines(&symbol, Interval::Minutes(1), 10, None)
            .await
            .is_err());
        assert!(adapter
            .get_klines(&symbol, Interval::Minutes(1), 10, None)
            .await
            .is_ok());
    }
}

//! Bar Loader
//!
//! Turns a `DataCenter` into a streaming source of bars for the execution
//! engine's tick loop: fetch in pages, buffer, and refill a page ahead of
//! the consumer so the tick loop never blocks on an adapter round-trip
//! mid-run.

use crate::engine::bar::Bar;
use crate::engine::datacenter::{DataCenter, MarketDataRequest};
use crate::engine::error::EngineError;
use crate::engine::time::Millis;
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::task::JoinHandle;

/// Streams bars for one (adapter, symbol, interval, range) over a
/// `DataCenter`, paging transparently and prefetching one page ahead.
///
/// Holds an owned `Arc<DataCenter>` rather than borrowing it, so the loader
/// itself is `'static` and can be boxed into the execution engine's tick
/// loop, which is spawned onto the runtime.
pub struct BarLoader {
    data_center: Arc<DataCenter>,
    request: MarketDataRequest,
    end: Millis,
    cursor: Millis,
    page_size: usize,
    preload_enabled: bool,
    buffer: VecDeque<Bar>,
    prefetched: Option<VecDeque<Bar>>,
    prefetching: Option<JoinHandle<Result<VecDeque<Bar>, EngineError>>>,
    exhausted: bool,
}

impl BarLoader {
    pub fn new(data_center: Arc<DataCenter>, request: MarketDataRequest, page_size: usize) -> Result<Self, EngineError> {
        Self::with_preload(data_center, request, page_size, true)
    }

    /// Same as `new`, but lets a caller (e.g. a synchronous single-threaded
    /// backtest runner) disable the concurrent read-ahead and fetch pages
    /// strictly inline.
    pub fn with_preload(
        data_center: Arc<DataCenter>,
        request: MarketDataRequest,
        page_size: usize,
        preload_enabled: bool,
    ) -> Result<Self, EngineError> {
        let (_, end) = request.range.ok_or_else(|| {
            EngineError::ConfigError("BarLoader requires a bounded range".into())
        })?;
        let cursor = request.range.unwrap().0;
        Ok(Self {
            data_center,
            request,
            end,
            cursor,
            page_size,
            preload_enabled,
            buffer: VecDeque::new(),
            prefetched: None,
            prefetching: None,
            exhausted: false,
        })
    }

    fn fetch_page(
        data_center: Arc<DataCenter>,
        request: MarketDataRequest,
        start: Millis,
        end: Millis,
        page_size: usize,
    ) -> impl std::future::Future<Output = Result<VecDeque<Bar>, EngineError>> {
        async move {
            if start >= end {
                return Ok(VecDeque::new());
            }
            let mut req = request.clone();
            req.range = Some((start, end));
            req.limit = page_size;
            let response = data_center.get_market_data(&req).await?;
            let interval_ms = request.interval.to_millis().unwrap_or(0);
            let mut bars = VecDeque::with_capacity(response.metadata.count);
            for (i, &ts) in response.ohlcv.timestamps.iter().enumerate() {
                bars.push_back(Bar {
                    open_time: ts,
                    open: response.ohlcv.open[i],
                    high: response.ohlcv.high[i],
                    low: response.ohlcv.low[i],
                    close: response.ohlcv.close[i],
                    volume: response.ohlcv.volume[i],
                    close_time: ts + interval_ms,
                    quote_volume: None,
                    trade_count: None,
                });
            }
            Ok(bars)
        }
    }

    fn next_cursor_after(page: &VecDeque<Bar>, interval_step: Millis, fallback: Millis) -> Millis {
        match page.back() {
            Some(last) => last.open_time + interval_step.max(1),
            None => fallback,
        }
    }

    /// Kick off (or let keep running) a background fetch of the page
    /// starting at `cursor`, storing its `JoinHandle` for later collection.
    fn spawn_prefetch(&mut self, cursor: Millis) {
        if !self.preload_enabled || self.prefetching.is_some() || cursor >= self.end {
            return;
        }
        let fut = Self::fetch_page(
            self.data_center.clone(),
            self.request.clone(),
            cursor,
            self.end,
            self.page_size,
        );
        self.prefetching = Some(tokio::spawn(fut));
    }

    /// Pull the next bar, refilling the buffer (and kicking off a
    /// read-ahead prefetch of the following page) as needed.
    pub async fn next(&mut self) -> Result<Option<Bar>, EngineError> {
        if self.buffer.is_empty() && !self.exhausted {
            let page = if let Some(page) = self.prefetched.take() {
                page
            } else if let Some(handle) = self.prefetching.take() {
                handle
                    .await
                    .map_err(|e| EngineError::ConfigError(format!("prefetch task panicked: {e}")))??
            } else {
                Self::fetch_page(self.data_center.clone(), self.request.clone(), self.cursor, self.end, self.page_size)
                    .await?
            };

            let step = self.request.interval.to_millis().unwrap_or(1);
            self.cursor = Self::next_cursor_after(&page, step, self.end);
            if page.is_empty() || self.cursor >= self.end {
                self.exhausted = true;
            }
            self.buffer = page;

            if !self.exhausted {
                if self.preload_enabled {
                    self.spawn_prefetch(self.cursor);
                } else if self.prefetched.is_none() {
                    let next_page =
                        Self::fetch_page(self.data_center.clone(), self.request.clone(), self.cursor, self.end, self.page_size)
                            .await?;
                    self.prefetched = Some(next_page);
                }
            }
        }
        Ok(self.buffer.pop_front())
    }

    pub fn is_exhausted(&self) -> bool {
        self.exhausted && self.buffer.is_empty()
    }
}

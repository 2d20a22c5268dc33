//! Cache + Circuit Breaker
//!
//! A TTL/bounded-LRU memoization layer in front of the data source adapter,
//! plus a per-service circuit breaker that trips after consecutive
//! failures and gates calls while open. Retries live here too — business
//! logic never retries implicitly (see the crate-level error taxonomy).

use crate::engine::bar::Bar;
use crate::engine::error::{DataFetchKind, EngineError};
use crate::engine::time::{Interval, Millis};
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::time::{Duration, Instant};

/// Cache key: `(service, symbol, interval, limit, start_ms, end_ms)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub service: String,
    pub symbol: String,
    pub interval: String,
    pub limit: usize,
    pub start_ms: Option<Millis>,
    pub end_ms: Option<Millis>,
}

impl CacheKey {
    pub fn new(
        service: impl Into<String>,
        symbol: impl Into<String>,
        interval: Interval,
        limit: usize,
        range: Option<(Millis, Millis)>,
    ) -> Self {
        Self {
            service: service.into(),
            symbol: symbol.into(),
            interval: interval.to_string(),
            limit,
            start_ms: range.map(|r| r.0),
            end_ms: range.map(|r| r.1),
        }
    }
}

struct Entry {
    inserted_at: Instant,
    payload: Vec<Bar>,
}

/// TTL + bounded-LRU cache of bar windows.
pub struct BarCache {
    ttl: Duration,
    capacity: usize,
    entries: Mutex<HashMap<CacheKey, Entry>>,
    recency: Mutex<VecDeque<CacheKey>>,
    hits: Mutex<u64>,
    misses: Mutex<u64>,
}

impl BarCache {
    pub fn new(ttl: Duration, capacity: usize) -> Self {
        Self {
            ttl,
            capacity,
            entries: Mutex::new(HashMap::new()),
            recency: Mutex::new(VecDeque::new()),
            hits: Mutex::new(0),
            misses: Mutex::new(0),
        }
    }

    pub fn get(&self, key: &CacheKey) -> Option<Vec<Bar>> {
        let mut entries = self.entries.lock();
        if let Some(entry) = entries.get(key) {
            if entry.inserted_at.elapsed() <= self.ttl {
                *self.hits.lock() += 1;
                return Some(entry.payload.clone());
            }
            // Expired: evict and fall through to a miss.
            entries.remove(key);
        }
        *self.misses.lock() += 1;
        None
    }

    pub fn put(&self, key: CacheKey, payload: Vec<Bar>) {
        let mut entries = self.entries.lock();
        let mut recency = self.recency.lock();

        if !entries.contains_key(&key) {
            recency.push_back(key.clone());
        }
        entries.insert(
            key,
            Entry {
                inserted_at: Instant::now(),
                payload,
            },
        );

        while entries.len() > self.capacity {
            if let Some(oldest) = recency.pop_front() {
                entries.remove(&oldest);
            } else {
                break;
            }
        }
    }

    pub fn stats(&self) -> (u64, u64) {
        (*self.hits.lock(), *self.misses.lock())
    }
}

/// Circuit breaker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerState {
    Closed,
    Open,
    HalfOpen,
}

/// Per-service circuit breaker gating adapter calls.
pub struct CircuitBreaker {
    service: String,
    failure_threshold: u32,
    cooldown: Duration,
    state: Mutex<BreakerState>,
    consecutive_failures: Mutex<u32>,
    last_failure_at: Mutex<Option<Instant>>,
}

impl CircuitBreaker {
    pub fn new(service: impl Into<String>, failure_threshold: u32, cooldown: Duration) -> Self {
        Self {
            service: service.into(),
            failure_threshold,
            cooldown,
            state: Mutex::new(BreakerState::Closed),
            consecutive_failures: Mutex::new(0),
            last_failure_at: Mutex::new(None),
        }
    }

    pub fn state(&self) -> BreakerState {
        let mut state = self.state.lock();
        if *state == BreakerState::Open {
            if let Some(last) = *self.last_failure_at.lock() {
                if last.elapsed() >= self.cooldown {
                    *state = BreakerState::HalfOpen;
                }
            }
        }
        *state
    }

    fn on_success(&self) {
        *self.state.lock() = BreakerState::Closed;
        *self.consecutive_failures.lock() = 0;
    }

    fn on_failure(&self) {
        let mut failures = self.consecutive_failures.lock();
        *failures += 1;
        *self.last_failure_at.lock() = Some(Instant::now());
        if *failures >= self.failure_threshold {
            *self.state.lock() = BreakerState::Open;
        }
    }

    /// Run `f` through the breaker. Rejects immediately with `CircuitOpen`
    /// while open; a single success in half-open restores closed, any
    /// failure reopens.
    pub async fn call<F, Fut, T>(&self, f: F) -> Result<T, EngineError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, EngineError>>,
    {
        if self.state() == BreakerState::Open {
            return Err(EngineError::CircuitOpen {
                service: self.service.clone(),
            });
        }
        match f().await {
            Ok(v) => {
                self.on_success();
                Ok(v)
            }
            Err(e) => {
                self.on_failure();
                Err(e)
            }
        }
    }
}

/// Retry a retryable adapter call up to `max_attempts` times with
/// exponential back-off. Non-retryable failures (and the final attempt's
/// failure) are returned immediately. Only the data-access layer retries;
/// business logic never does.
pub async fn with_retries<F, Fut, T>(
    max_attempts: u32,
    base_delay: Duration,
    mut f: F,
) -> Result<T, EngineError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, EngineError>>,
{
    let mut attempt = 0;
    loop {
        attempt += 1;
        match f().await {
            Ok(v) => return Ok(v),
            Err(EngineError::DataFetch(kind)) if kind.is_retryable() && attempt < max_attempts => {
                tokio::time::sleep(base_delay * 2u32.saturating_pow(attempt - 1)).await;
            }
            Err(e) => return Err(e),
        }
    }
}

#[allow(dead_code)]
fn _assert_kind_retryable(kind: &DataFetchKind) -> bool {
    kind.is_retryable()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bar(t: Millis) -> Bar {
        Bar {
            open_time: t,
            open: 1.0,
            high: 1.0,
            low: 1.0,
            close: 1.0,
            volume: 1.0,
            close_time: t + 60_000,
            quote_volume: None,
            trade_count: None,
        }
    }

    #[test]
    fn cache_round_trip_within_ttl() {
        let cache = BarCache::new(Duration::from_secs(300), 10);
        let key = CacheKey::new("binance", "BTC/USDT", Interval::Minutes(1), 10, None);
        assert!(cache.get(&key).is_none());
        cache.put(key.clone(), vec![bar(0)]);
        let hit = cache.get(&key).unwrap();
        assert_eq!(hit.len(), 1);
        let (hits, misses) = cache.stats();
        assert_eq!(hits, 1);
        assert_eq!(misses, 1);
    }

    #[test]
    fn cache_expires_after_ttl() {
        let cache = BarCache::new(Duration::from_millis(1), 10);
        let key = CacheKey::new("binance", "BTC/USDT", Interval::Minutes(1), 10, None);
        cache.put(key.clone(), vec![bar(0)]);
        std::thread::sleep(Duration::from_millis(5));
        assert!(cache.get(&key).is_none());
    }

    #[test]
    fn cache_evicts_oldest_beyond_capacity() {
        let cache = BarCache::new(Duration::from_secs(300), 2);
        for i in 0..3 {
            let key = CacheKey::new("binance", format!("SYM{i}"), Interval::Minutes(1), 10, None);
            cache.put(key, vec![bar(0)]);
        }
        let first_key = CacheKey::new("binance", "SYM0", Interval::Minutes(1), 10, None);
        assert!(cache.get(&first_key).is_none());
    }

    #[tokio::test]
    async fn breaker_trips_after_threshold_and_half_opens_after_cooldown() {
        let breaker = CircuitBreaker::new("binance", 3, Duration::from_millis(10));
        for _ in 0..3 {
            let _ = breaker
                .call(|| async {
                    Err::<(), _>(EngineError::DataFetch(DataFetchKind::Network("x".into())))
                })
                .await;
        }
        assert_eq!(breaker.state(), BreakerState::Open);

        let blocked = breaker.call(|| async { Ok::<_, EngineError>(()) }).await;
        assert!(matches!(blocked, Err(EngineError::CircuitOpen { .. })));

        tokio::time::sleep(Duration::from_millis(15)).await;
        assert_eq!(breaker.state(), BreakerState::HalfOpen);

        let ok = breaker.call(|| async { Ok::<_, EngineError>(()) }).await;
        assert!(ok.is_ok());
        assert_eq!(breaker.state(), BreakerState::Closed);
    }

    #[tokio::test]
    async fn retries_only_retryable_kinds() {
        let mut calls = 0;
        let result: Result<(), EngineError> = with_retries(3, Duration::from_millis(1), || {
            calls += 1;
            async move {
                Err(EngineError::DataFetch(DataFetchKind::Adapter(
                    "permanent".into(),
                )))
            }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls, 1, "non-retryable failure should not be retried");
    }
}

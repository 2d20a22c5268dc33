//! OHLCV Bars
//!
//! A bar is the atomic unit the whole engine ticks on. Bars within any
//! request must form a strictly increasing, duplicate-free, boundary-aligned
//! sequence — that invariant is checked here once, at the inbound edge, so
//! nothing downstream has to re-validate it.

use crate::engine::error::EngineError;
use crate::engine::time::{Interval, Millis};
use serde::{Deserialize, Serialize};

/// A single OHLCV bar.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    pub open_time: Millis,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
    pub close_time: Millis,
    pub quote_volume: Option<f64>,
    pub trade_count: Option<u64>,
}

impl Bar {
    pub fn is_finite(&self) -> bool {
        [self.open, self.high, self.low, self.close, self.volume]
            .iter()
            .all(|v| v.is_finite())
    }
}

/// The wire format described by the external interface: an 11-tuple.
/// `[open_time_ms, open, high, low, close, volume, close_time_ms,
///   quote_volume, trade_count, taker_buy_volume, taker_buy_quote_volume]`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KlinePayload(
    pub Millis,
    pub f64,
    pub f64,
    pub f64,
    pub f64,
    pub f64,
    pub Millis,
    pub f64,
    pub u64,
    pub f64,
    pub f64,
);

impl TryFrom<KlinePayload> for Bar {
    type Error = EngineError;

    fn try_from(p: KlinePayload) -> Result<Self, Self::Error> {
        let bar = Bar {
            open_time: p.0,
            open: p.1,
            high: p.2,
            low: p.3,
            close: p.4,
            volume: p.5,
            close_time: p.6,
            quote_volume: Some(p.7),
            trade_count: Some(p.8),
        };
        if !bar.is_finite() {
            return Err(EngineError::DataFetch(
                crate::engine::error::DataFetchKind::Adapter(
                    "kline payload contains a non-finite value".into(),
                ),
            ));
        }
        if bar.close_time <= bar.open_time {
            return Err(EngineError::DataFetch(
                crate::engine::error::DataFetchKind::Adapter(
                    "kline close_time must be after open_time".into(),
                ),
            ));
        }
        Ok(bar)
    }
}

/// Validate that a sequence of bars is strictly increasing, duplicate-free,
/// and aligned to the interval boundary. Called once at the inbound edge, on
/// every page `DataCenter::fetch` pulls from an adapter, before it reaches
/// the cache or the loader; nothing downstream re-checks this.
pub fn validate_sequence(bars: &[Bar], interval: Interval) -> Result<(), EngineError> {
    let step = interval.to_millis();
    for pair in bars.windows(2) {
        if pair[1].open_time <= pair[0].open_time {
            return Err(EngineError::DataFetch(
                crate::engine::error::DataFetchKind::Adapter(format!(
                    "bars out of order or duplicated: {} then {}",
                    pair[0].open_time, pair[1].open_time
                )),
            ));
        }
    }
    if let Some(step) = step {
        for bar in bars {
            if bar.open_time % step != 0 {
                return Err(EngineError::DataFetch(
                    crate::engine::error::DataFetchKind::Adapter(format!(
                        "bar open_time {} not aligned to interval {}",
                        bar.open_time, interval
                    )),
                ));
            }
        }
    }
    Ok(())
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

    #[test]
    fn validates_strictly_increasing_aligned_sequence() {
        let bars = vec![bar(0, 1.0), bar(60_000, 1.1), bar(120_000, 1.2)];
        assert!(validate_sequence(&bars, Interval::Minutes(1)).is_ok());
    }

    #[test]
    fn rejects_duplicates() {
        let bars = vec![bar(0, 1.0), bar(0, 1.1)];
        assert!(validate_sequence(&bars, Interval::Minutes(1)).is_err());
    }

    #[test]
    fn rejects_out_of_order() {
        let bars = vec![bar(60_000, 1.0), bar(0, 1.1)];
        assert!(validate_sequence(&bars, Interval::Minutes(1)).is_err());
    }

    #[test]
    fn rejects_misaligned_bars() {
        let bars = vec![bar(0, 1.0), bar(90_000, 1.1)];
        assert!(validate_sequence(&bars, Interval::Minutes(1)).is_err());
    }

    #[test]
    fn kline_payload_round_trips() {
        let payload = KlinePayload(0, 1.0, 1.1, 0.9, 1.05, 100.0, 60_000, 105.0, 10, 50.0, 52.5);
        let bar = Bar::try_from(payload).unwrap();
        assert_eq!(bar.open_time, 0);
        assert_eq!(bar.trade_count, Some(10));
    }

    #[test]
    fn kline_payload_rejects_non_finite() {
        let payload = KlinePayload(
            0,
            f64::NAN,
            1.1,
            0.9,
            1.05,
            100.0,
            60_000,
            105.0,
            10,
            50.0,
            52.5,
        );
        assert!(Bar::try_from(payload).is_err());
    }
}

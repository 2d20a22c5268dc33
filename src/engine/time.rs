//! Time and Symbol Primitives
//!
//! All external time is UTC milliseconds since the Unix epoch. There is no
//! simulation clock distinct from bar timestamps here — unlike a tick-level
//! backtester, this engine advances strictly with the bar stream, so "now"
//! is always "the open_time (or close_time, at termination) of the bar the
//! tick loop is currently processing."

use crate::engine::error::EngineError;
use std::fmt;

/// Milliseconds since the Unix epoch, UTC.
pub type Millis = i64;

pub const MILLIS_PER_SEC: Millis = 1_000;

/// A normalized instrument symbol, e.g. `BTC/USDT`.
///
/// Adapters canonicalize exchange-native forms (`BTCUSDT`) to this form on
/// the inbound edge only; nothing downstream re-normalizes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
pub struct SymbolId(String);

impl SymbolId {
    pub fn new(normalized: impl Into<String>) -> Self {
        Self(normalized.into())
    }

    /// Canonicalize an exchange-native or already-normalized symbol.
    ///
    /// `BTCUSDT` -> `BTC/USDT` by splitting on the known quote suffixes;
    /// anything already containing `/` passes through unchanged.
    pub fn normalize(raw: &str) -> Self {
        if raw.contains('/') {
            return Self(raw.to_uppercase());
        }
        const QUOTES: &[&str] = &["USDT", "USDC", "USD", "BUSD"];
        let upper = raw.to_uppercase();
        for quote in QUOTES {
            if upper.len() > quote.len() && upper.ends_with(quote) {
                let base = &upper[..upper.len() - quote.len()];
                return Self(format!("{base}/{quote}"));
            }
        }
        Self(upper)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SymbolId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for SymbolId {
    fn from(raw: &str) -> Self {
        Self::normalize(raw)
    }
}

/// Bar interval, per the grammar in the engine's interval spec:
/// `{1,3,5,15,30}m`, `{1,2,4,6,8,12}h`, `{1,3}d`, `1w`, `1M`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum Interval {
    Minutes(u32),
    Hours(u32),
    Days(u32),
    Weeks(u32),
    Months(u32),
}

impl Interval {
    /// Milliseconds per unit, excluding `Months` (calendar math, not fixed-width).
    pub fn to_millis(self) -> Option<Millis> {
        let secs: i64 = match self {
            Interval::Minutes(n) => (n as i64) * 60,
            Interval::Hours(n) => (n as i64) * 3_600,
            Interval::Days(n) => (n as i64) * 86_400,
            Interval::Weeks(n) => (n as i64) * 604_800,
            Interval::Months(_) => return None,
        };
        Some(secs * MILLIS_PER_SEC)
    }
}

impl fmt::Display for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Interval::Minutes(n) => write!(f, "{n}m"),
            Interval::Hours(n) => write!(f, "{n}h"),
            Interval::Days(n) => write!(f, "{n}d"),
            Interval::Weeks(n) => write!(f, "{n}w"),
            Interval::Months(n) => write!(f, "{n}M"),
        }
    }
}

impl std::str::FromStr for Interval {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            return Err(EngineError::ConfigError("empty interval".into()));
        }
        let (digits, unit) = s.split_at(s.len() - 1);
        let n: u32 = if digits.is_empty() {
            1
        } else {
            digits
                .parse()
                .map_err(|_| EngineError::ConfigError(format!("bad interval '{s}'")))?
        };
        let interval = match unit {
            "m" => Interval::Minutes(n),
            "h" => Interval::Hours(n),
            "d" => Interval::Days(n),
            "w" => Interval::Weeks(n),
            "M" => Interval::Months(n),
            other => {
                return Err(EngineError::ConfigError(format!(
                    "unknown interval unit '{other}'"
                )))
            }
        };
        let valid = match interval {
            Interval::Minutes(n) => [1, 3, 5, 15, 30].contains(&n),
            Interval::Hours(n) => [1, 2, 4, 6, 8, 12].contains(&n),
            Interval::Days(n) => [1, 3].contains(&n),
            Interval::Weeks(n) => n == 1,
            Interval::Months(n) => n == 1,
        };
        if !valid {
            return Err(EngineError::ConfigError(format!(
                "interval '{s}' not in the supported grammar"
            )));
        }
        Ok(interval)
    }
}

/// Convert an RFC3339 timestamp to epoch millis, for fixtures and tests.
pub fn parse_iso8601(s: &str) -> Option<Millis> {
    chrono::DateTime::parse_from_rfc3339(s)
        .ok()
        .map(|dt| dt.timestamp_millis())
}

/// The UTC calendar date (as a day index) for a millis timestamp, used by
/// the risk manager's daily reset and the report builder's day resampling.
pub fn utc_day(ms: Millis) -> i64 {
    ms.div_euclid(86_400_000)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn normalizes_exchange_native_symbols() {
        assert_eq!(SymbolId::normalize("BTCUSDT").as_str(), "BTC/USDT");
        assert_eq!(SymbolId::normalize("btc/usdt").as_str(), "BTC/USDT");
        assert_eq!(SymbolId::normalize("ETHBUSD").as_str(), "ETH/BUSD");
    }

    #[test]
    fn parses_supported_intervals() {
        assert_eq!(Interval::from_str("15m").unwrap(), Interval::Minutes(15));
        assert_eq!(Interval::from_str("4h").unwrap(), Interval::Hours(4));
        assert_eq!(Interval::from_str("1w").unwrap(), Interval::Weeks(1));
        assert!(Interval::from_str("7m").is_err());
        assert!(Interval::from_str("2d").is_err());
    }

    #[test]
    fn interval_millis() {
        assert_eq!(Interval::Minutes(15).to_millis(), Some(900_000));
        assert_eq!(Interval::Hours(1).to_millis(), Some(3_600_000));
        assert_eq!(Interval::Months(1).to_millis(), None);
    }

    #[test]
    fn utc_day_buckets() {
        let d0 = utc_day(0);
        let d1 = utc_day(86_400_000);
        let d_same = utc_day(86_399_999);
        assert_eq!(d1, d0 + 1);
        assert_eq!(d_same, d0);
    }
}

//! Strategy Context & Signal Types
//!
//! The per-tick snapshot handed to a strategy, and the `Signal`/`Action`
//! vocabulary it replies with. Everything here is immutable to the
//! strategy: a fresh `StrategyContext` is built each tick from the visible
//! window, E's indicators, and the account/positions snapshot.

use crate::engine::time::{Interval, Millis, SymbolId};
use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::collections::HashMap;

/// Canonical action a signal can carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Action {
    Buy,
    Sell,
    Hold,
    Long,
    Short,
    CloseLong,
    CloseShort,
    Close,
    Up,
    Down,
}

impl Action {
    /// Stable-ordering priority used by the signal resolver.
    pub fn priority(self) -> u32 {
        match self {
            Action::Close => 100,
            Action::CloseLong | Action::CloseShort => 90,
            Action::Long | Action::Short | Action::Buy | Action::Sell => 50,
            Action::Up | Action::Down => 50,
            Action::Hold => 0,
        }
    }

    pub fn is_close_family(self) -> bool {
        matches!(self, Action::Close | Action::CloseLong | Action::CloseShort)
    }

    pub fn is_hold(self) -> bool {
        matches!(self, Action::Hold)
    }

    /// Canonical direction bucket for same-direction/opposite resolution.
    /// `None` for actions that don't bucket (Hold, close-family).
    pub fn direction_bucket(self) -> Option<Direction> {
        match self {
            Action::Long | Action::Buy | Action::Up => Some(Direction::Long),
            Action::Short | Action::Sell | Action::Down => Some(Direction::Short),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    Long,
    Short,
}

impl Direction {
    pub fn opposite(self) -> Direction {
        match self {
            Direction::Long => Direction::Short,
            Direction::Short => Direction::Long,
        }
    }
}

/// A strategy's trading intent for the current tick.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Signal {
    pub action: Action,
    pub symbol: SymbolId,
    pub quantity: f64,
    pub price: Option<f64>,
    pub stop_loss: Option<f64>,
    pub take_profit: Option<f64>,
    pub confidence: f64,
    pub reason: String,
}

impl Signal {
    pub fn new(action: Action, symbol: SymbolId, confidence: f64) -> Self {
        Self {
            action,
            symbol,
            quantity: 0.0,
            price: None,
            stop_loss: None,
            take_profit: None,
            confidence: confidence.clamp(0.0, 1.0),
            reason: String::new(),
        }
    }

    pub fn with_quantity(mut self, quantity: f64) -> Self {
        self.quantity = quantity.max(0.0);
        self
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = reason.into();
        self
    }
}

/// What a strategy's `execute` call returns.
#[derive(Debug, Clone, Default)]
pub struct StrategyResult {
    pub signals: Vec<Signal>,
    pub success: bool,
    pub error_message: Option<String>,
}

impl StrategyResult {
    pub fn ok(signals: Vec<Signal>) -> Self {
        Self {
            signals,
            success: true,
            error_message: None,
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            signals: Vec::new(),
            success: false,
            error_message: Some(message.into()),
        }
    }
}

/// `name -> ordered sequence of float`, the market data window a strategy
/// sees: at minimum open/high/low/close/volume/timestamps.
pub type MarketDataWindow = HashMap<String, Vec<f64>>;

/// `name -> aligned array`, as produced by the indicator precompute stage.
pub type IndicatorWindow = HashMap<String, Vec<f64>>;

/// Net-visible position size per symbol: positive long, negative short.
/// Hedge mode's independent long/short slots are exposed separately by the
/// position manager, not through this map.
pub type NetPositions = HashMap<SymbolId, f64>;

/// Immutable per-tick snapshot handed to a strategy's `execute`.
///
/// `metadata` is the one documented exception to immutability: it's a
/// scratch `RefCell` a `CompositeStrategy` running in `Sequential` mode
/// uses to let an earlier sub-strategy leave a note for a later one within
/// the same tick (e.g. "already opened a position this bar"). A plain
/// strategy never needs to touch it.
#[derive(Debug, Clone)]
pub struct StrategyContext {
    pub symbol: SymbolId,
    pub interval: Interval,
    pub current_time: Millis,
    pub market_data: MarketDataWindow,
    pub indicators: IndicatorWindow,
    pub cash: f64,
    pub positions: NetPositions,
    pub metadata: RefCell<serde_json::Map<String, serde_json::Value>>,
}

impl StrategyContext {
    pub fn close_series(&self) -> &[f64] {
        self.market_data
            .get("close")
            .map(|v| v.as_slice())
            .unwrap_or(&[])
    }

    pub fn latest_close(&self) -> Option<f64> {
        self.close_series().last().copied()
    }

    pub fn indicator(&self, name: &str) -> Option<&[f64]> {
        self.indicators.get(name).map(|v| v.as_slice())
    }
}

/// Data requirements a strategy may declare, used by the execution engine
/// to compute the pre-start warm-up window.
#[derive(Debug, Clone, Copy, Default)]
pub struct DataRequirements {
    pub min_bars: usize,
    pub warmup_periods: usize,
    pub prefer_closed_bar: bool,
    pub extra_seconds: u64,
    pub max_timeframe_required: Option<Interval>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn action_priority_matches_resolver_table() {
        assert_eq!(Action::Close.priority(), 100);
        assert_eq!(Action::CloseLong.priority(), 90);
        assert_eq!(Action::CloseShort.priority(), 90);
        assert_eq!(Action::Long.priority(), 50);
        assert_eq!(Action::Hold.priority(), 0);
    }

    #[test]
    fn direction_bucket_groups_aliases() {
        assert_eq!(Action::Buy.direction_bucket(), Some(Direction::Long));
        assert_eq!(Action::Up.direction_bucket(), Some(Direction::Long));
        assert_eq!(Action::Sell.direction_bucket(), Some(Direction::Short));
        assert_eq!(Action::Close.direction_bucket(), None);
    }

    #[test]
    fn signal_confidence_is_clamped() {
        let s = Signal::new(Action::Long, SymbolId::normalize("BTC/USDT"), 1.5);
        assert_eq!(s.confidence, 1.0);
    }

    #[test]
    fn context_exposes_latest_close_and_indicator() {
        let mut market_data = MarketDataWindow::new();
        market_data.insert("close".into(), vec![1.0, 2.0, 3.0]);
        let mut indicators = IndicatorWindow::new();
        indicators.insert("sma_2".into(), vec![f64::NAN, 1.5, 2.5]);
        let ctx = StrategyContext {
            symbol: SymbolId::normalize("BTC/USDT"),
            interval: Interval::Minutes(1),
            current_time: 0,
            market_data,
            indicators,
            cash: 1000.0,
            positions: NetPositions::new(),
            metadata: RefCell::new(serde_json::Map::new()),
        };
        assert_eq!(ctx.latest_close(), Some(3.0));
        assert_eq!(ctx.indicator("sma_2").unwrap()[2], 2.5);
    }
}

//! Traders
//!
//! Maps a resolved signal plus a reference price to concrete account and
//! position-manager mutations. Two variants: the events trader (fixed-stake
//! binary outcome, resolved at bar close) and the futures trader (delegates
//! to the position manager's open/close/close_all).

use crate::engine::accounts::{FuturesAccount, SimpleAccount};
use crate::engine::config::{EngineRuntimeConfig, TradingConfig};
use crate::engine::context::{Action, Signal};
use crate::engine::error::EngineError;
use crate::engine::positions::{CloseReason, PositionManager, Side, TradeRecord};
use crate::engine::time::{Millis, SymbolId};

/// A resolved binary-outcome event trade.
#[derive(Debug, Clone)]
pub struct EventTradeRecord {
    pub trade_id: u64,
    pub symbol: SymbolId,
    pub action: Action,
    pub entry_time: Millis,
    pub entry_price: f64,
    pub exit_time: Millis,
    pub exit_price: f64,
    pub quantity: f64,
    pub pnl: f64,
    pub pnl_pct: f64,
}

/// Direction an event-contract signal resolves to, after alias mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EventDirection {
    Up,
    Down,
}

fn map_event_alias(action: Action) -> Option<EventDirection> {
    match action {
        Action::Up | Action::Long | Action::Buy => Some(EventDirection::Up),
        Action::Down | Action::Short | Action::Sell => Some(EventDirection::Down),
        _ => None,
    }
}

/// Fixed-stake binary event trader: stake is debited at open, resolution
/// compares the bar's open and close at the close of the same bar.
pub struct EventsTrader {
    next_trade_id: u64,
}

impl EventsTrader {
    pub fn new() -> Self {
        Self { next_trade_id: 1 }
    }

    fn next_id(&mut self) -> u64 {
        let id = self.next_trade_id;
        self.next_trade_id += 1;
        id
    }

    /// Resolve one event-contract signal against a bar's open/close,
    /// mutating `account` and returning the resulting trade record.
    pub fn trade(
        &mut self,
        signal: &Signal,
        open: f64,
        close: f64,
        entry_time: Millis,
        exit_time: Millis,
        account: &mut SimpleAccount,
        cfg: &EngineRuntimeConfig,
    ) -> Result<EventTradeRecord, EngineError> {
        let direction = map_event_alias(signal.action).ok_or_else(|| {
            EngineError::InvalidSignal(format!(
                "{:?} is not a valid event-contract action",
                signal.action
            ))
        })?;

        let stake = if signal.quantity > 0.0 {
            signal.quantity
        } else {
            cfg.investment_amount
        };

        let won = match direction {
            EventDirection::Up => close > open,
            EventDirection::Down => close < open,
        };

        let pnl = if won {
            if cfg.payout_multiplier >= 1.0 {
                stake * (cfg.payout_multiplier - 1.0)
            } else {
                stake * cfg.payout_multiplier
            }
        } else {
            -stake
        };

        account.apply_trade_result(pnl);

        Ok(EventTradeRecord {
            trade_id: self.next_id(),
            symbol: signal.symbol.clone(),
            action: signal.action,
            entry_time,
            entry_price: open,
            exit_time,
            exit_price: close,
            quantity: stake,
            pnl,
            pnl_pct: pnl / stake,
        })
    }
}

impl Default for EventsTrader {
    fn default() -> Self {
        Self::new()
    }
}

/// Parsed futures action: OPEN/CLOSE/CLOSE_ALL/HOLD plus an optional side.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FuturesOp {
    Open(Side),
    Close(Side),
    CloseAll,
    Hold,
}

fn parse_futures_action(action: Action) -> FuturesOp {
    match action {
        Action::Long | Action::Buy => FuturesOp::Open(Side::Long),
        Action::Short | Action::Sell => FuturesOp::Open(Side::Short),
        Action::CloseLong => FuturesOp::Close(Side::Long),
        Action::CloseShort => FuturesOp::Close(Side::Short),
        Action::Close => FuturesOp::CloseAll,
        Action::Hold | Action::Up | Action::Down => FuturesOp::Hold,
    }
}

/// Delegates resolved signals to the position manager.
pub struct FuturesTrader;

impl FuturesTrader {
    pub fn new() -> Self {
        Self
    }

    #[allow(clippy::too_many_arguments)]
    pub fn trade(
        &self,
        signal: &Signal,
        price: f64,
        time: Millis,
        account: &mut FuturesAccount,
        positions: &mut PositionManager,
        cfg: &TradingConfig,
    ) -> Result<Vec<TradeRecord>, EngineError> {
        match parse_futures_action(signal.action) {
            FuturesOp::Hold => Ok(Vec::new()),
            FuturesOp::Open(side) => {
                positions.open(
                    &signal.symbol,
                    side,
                    price,
                    time,
                    Some(signal.quantity),
                    signal.stop_loss,
                    signal.take_profit,
                    None,
                    account,
                    cfg,
                )?;
                Ok(Vec::new())
            }
            FuturesOp::Close(side) => {
                let record = positions.close(&signal.symbol, side, price, time, account, cfg, CloseReason::Signal)?;
                Ok(vec![record])
            }
            FuturesOp::CloseAll => Ok(positions.close_all(&signal.symbol, price, time, account, cfg, CloseReason::Signal)),
        }
    }
}

impl Default for FuturesTrader {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn e1_events_win() {
        let mut account = SimpleAccount::new(1000.0);
        let mut trader = EventsTrader::new();
        let signal = Signal::new(Action::Up, SymbolId::normalize("BTC/USDT"), 1.0).with_quantity(100.0);
        let cfg = EngineRuntimeConfig {
            investment_amount: 100.0,
            payout_multiplier: 1.8,
            ..Default::default()
        };
        let record = trader.trade(&signal, 100.0, 110.0, 0, 60_000, &mut account, &cfg).unwrap();
        assert!((record.pnl - 80.0).abs() < 1e-9);
        assert!((account.cash - 1080.0).abs() < 1e-9);
    }

    #[test]
    fn e2_events_loss() {
        let mut account = SimpleAccount::new(1000.0);
        let mut trader = EventsTrader::new();
        let signal = Signal::new(Action::Up, SymbolId::normalize("BTC/USDT"), 1.0).with_quantity(100.0);
        let cfg = EngineRuntimeConfig::default();
        let record = trader.trade(&signal, 100.0, 95.0, 0, 60_000, &mut account, &cfg).unwrap();
        assert!((record.pnl - (-100.0)).abs() < 1e-9);
        assert!((account.cash - 900.0).abs() < 1e-9);
    }

    #[test]
    fn tie_loses_the_stake() {
        let mut account = SimpleAccount::new(1000.0);
        let mut trader = EventsTrader::new();
        let signal = Signal::new(Action::Up, SymbolId::normalize("BTC/USDT"), 1.0).with_quantity(100.0);
        let cfg = EngineRuntimeConfig::default();
        let record = trader.trade(&signal, 100.0, 100.0, 0, 60_000, &mut account, &cfg).unwrap();
        assert!((record.pnl - (-100.0)).abs() < 1e-9);
    }

    #[test]
    fn futures_trader_open_then_close_via_aliases() {
        let mut account = FuturesAccount::new(10000.0);
        let mut positions = PositionManager::new();
        let trader = FuturesTrader::new();
        let cfg = TradingConfig::default();
        let symbol = SymbolId::normalize("BTC/USDT");

        let open_signal = Signal::new(Action::Buy, symbol.clone(), 0.9).with_quantity(1000.0);
        let opened = trader.trade(&open_signal, 100.0, 0, &mut account, &mut positions, &cfg).unwrap();
        assert!(opened.is_empty());
        assert!(positions.slot(&symbol).long().is_some());

        let close_signal = Signal::new(Action::CloseLong, symbol.clone(), 0.9);
        let closed = trader.trade(&close_signal, 110.0, 1, &mut account, &mut positions, &cfg).unwrap();
        assert_eq!(closed.len(), 1);
        assert!(positions.slot(&symbol).long().is_none());
    }

    #[test]
    fn close_on_empty_slot_surfaces_position_not_found() {
        let mut account = FuturesAccount::new(10000.0);
        let mut positions = PositionManager::new();
        let trader = FuturesTrader::new();
        let cfg = TradingConfig::default();
        let symbol = SymbolId::normalize("BTC/USDT");
        let close_signal = Signal::new(Action::CloseLong, symbol, 0.9);
        let err = trader.trade(&close_signal, 100.0, 0, &mut account, &mut positions, &cfg).unwrap_err();
        assert!(matches!(err, EngineError::PositionNotFound { .. }));
    }
}

//! Futures Position Manager
//!
//! Per-symbol hedge slots: at most one LONG and one SHORT position open
//! simultaneously, each with its own margin, liquidation price, and stop
//! orders. Mark price drives PnL/liquidation/stop checks; fills use last
//! price plus slippage — the two are deliberately kept separate per the
//! mark-vs-last design note.

use crate::engine::accounts::FuturesAccount;
use crate::engine::config::TradingConfig;
use crate::engine::error::EngineError;
use crate::engine::time::{Millis, SymbolId};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Side {
    Long,
    Short,
}

impl Side {
    pub fn opposite(self) -> Side {
        match self {
            Side::Long => Side::Short,
            Side::Short => Side::Long,
        }
    }
}

/// Why a position was closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    Signal,
    Liquidation,
    StopLoss,
    TakeProfit,
    TrailingStop,
    SessionEnd,
    RiskCritical,
    Cancelled,
}

impl CloseReason {
    pub fn as_str(self) -> &'static str {
        match self {
            CloseReason::Signal => "signal",
            CloseReason::Liquidation => "liquidation",
            CloseReason::StopLoss => "stop_loss",
            CloseReason::TakeProfit => "take_profit",
            CloseReason::TrailingStop => "trailing_stop",
            CloseReason::SessionEnd => "session_end",
            CloseReason::RiskCritical => "risk_critical",
            CloseReason::Cancelled => "cancelled",
        }
    }
}

#[derive(Debug, Clone)]
pub struct FuturesPosition {
    pub symbol: SymbolId,
    pub side: Side,
    pub entry_price: f64,
    pub size: f64,
    pub leverage: f64,
    pub margin: f64,
    pub entry_time: Millis,
    pub entry_fee: f64,
    pub unrealized_pnl: f64,
    pub liquidation_price: f64,
    pub stop_loss: Option<f64>,
    pub take_profit: Option<f64>,
    pub trailing_stop_offset: Option<f64>,
    pub trailing_stop_price: Option<f64>,
    pub highest_price: f64,
    pub lowest_price: f64,
}

impl FuturesPosition {
    fn update_trailing_stop(&mut self) {
        let Some(offset) = self.trailing_stop_offset else {
            return;
        };
        self.trailing_stop_price = Some(match self.side {
            Side::Long => self.highest_price * (1.0 - offset),
            Side::Short => self.lowest_price * (1.0 + offset),
        });
    }

    pub fn mark_to_market(&mut self, mark_price: f64) {
        self.unrealized_pnl = match self.side {
            Side::Long => (mark_price - self.entry_price) * self.size,
            Side::Short => (self.entry_price - mark_price) * self.size,
        };
        self.highest_price = self.highest_price.max(mark_price);
        self.lowest_price = self.lowest_price.min(mark_price);
        self.update_trailing_stop();
    }
}

#[derive(Debug, Clone)]
pub struct TradeRecord {
    pub trade_id: u64,
    pub symbol: SymbolId,
    pub side: Side,
    pub entry_time: Millis,
    pub entry_price: f64,
    pub exit_time: Option<Millis>,
    pub exit_price: Option<f64>,
    pub quantity: f64,
    pub pnl: f64,
    pub pnl_pct: f64,
    pub fees: f64,
    pub reason: &'static str,
}

/// A symbol's hedge slot: independent long/short positions, never more
/// than one of each at a time.
#[derive(Debug, Clone, Default)]
pub enum HedgeSlot {
    #[default]
    Empty,
    Long(FuturesPosition),
    Short(FuturesPosition),
    Both(FuturesPosition, FuturesPosition),
}

impl HedgeSlot {
    fn has(&self, side: Side) -> bool {
        match (self, side) {
            (HedgeSlot::Long(_), Side::Long) | (HedgeSlot::Both(_, _), Side::Long) => true,
            (HedgeSlot::Short(_), Side::Short) | (HedgeSlot::Both(_, _), Side::Short) => true,
            _ => false,
        }
    }

    fn insert(self, side: Side, position: FuturesPosition) -> Self {
        match (self, side) {
            (HedgeSlot::Empty, Side::Long) => HedgeSlot::Long(position),
            (HedgeSlot::Empty, Side::Short) => HedgeSlot::Short(position),
            (HedgeSlot::Short(short), Side::Long) => HedgeSlot::Both(position, short),
            (HedgeSlot::Long(long), Side::Short) => HedgeSlot::Both(long, position),
            (other, _) => other,
        }
    }

    fn take(self, side: Side) -> (Self, Option<FuturesPosition>) {
        match (self, side) {
            (HedgeSlot::Long(long), Side::Long) => (HedgeSlot::Empty, Some(long)),
            (HedgeSlot::Short(short), Side::Short) => (HedgeSlot::Empty, Some(short)),
            (HedgeSlot::Both(long, short), Side::Long) => (HedgeSlot::Short(short), Some(long)),
            (HedgeSlot::Both(long, short), Side::Short) => (HedgeSlot::Long(long), Some(short)),
            (other, _) => (other, None),
        }
    }

    pub fn long(&self) -> Option<&FuturesPosition> {
        match self {
            HedgeSlot::Long(p) | HedgeSlot::Both(p, _) => Some(p),
            _ => None,
        }
    }

    pub fn short(&self) -> Option<&FuturesPosition> {
        match self {
            HedgeSlot::Short(p) | HedgeSlot::Both(_, p) => Some(p),
            _ => None,
        }
    }

    fn positions_mut(&mut self) -> Vec<&mut FuturesPosition> {
        match self {
            HedgeSlot::Empty => vec![],
            HedgeSlot::Long(p) | HedgeSlot::Short(p) => vec![p],
            HedgeSlot::Both(l, s) => vec![l, s],
        }
    }
}

/// What `check_stop_orders` found, in priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopTrigger {
    Liquidation,
    StopLoss,
    TakeProfit,
    TrailingStop,
}

impl From<StopTrigger> for CloseReason {
    fn from(t: StopTrigger) -> Self {
        match t {
            StopTrigger::Liquidation => CloseReason::Liquidation,
            StopTrigger::StopLoss => CloseReason::StopLoss,
            StopTrigger::TakeProfit => CloseReason::TakeProfit,
            StopTrigger::TrailingStop => CloseReason::TrailingStop,
        }
    }
}

pub struct PositionManager {
    slots: HashMap<SymbolId, HedgeSlot>,
    next_trade_id: u64,
}

impl PositionManager {
    pub fn new() -> Self {
        Self {
            slots: HashMap::new(),
            next_trade_id: 1,
        }
    }

    fn slot_mut(&mut self, symbol: &SymbolId) -> &mut HedgeSlot {
        self.slots.entry(symbol.clone()).or_default()
    }

    pub fn slot(&self, symbol: &SymbolId) -> HedgeSlot {
        self.slots.get(symbol).cloned().unwrap_or_default()
    }

    fn next_id(&mut self) -> u64 {
        let id = self.next_trade_id;
        self.next_trade_id += 1;
        id
    }

    #[allow(clippy::too_many_arguments)]
    pub fn open(
        &mut self,
        symbol: &SymbolId,
        side: Side,
        price: f64,
        entry_time: Millis,
        quantity: Option<f64>,
        stop_loss: Option<f64>,
        take_profit: Option<f64>,
        trailing_stop_offset: Option<f64>,
        account: &mut FuturesAccount,
        cfg: &TradingConfig,
    ) -> Result<FuturesPosition, EngineError> {
        if self.slot(symbol).has(side) {
            return Err(EngineError::DuplicatePosition {
                symbol: symbol.to_string(),
                side: side_label(side),
            });
        }

        let leverage = cfg.default_leverage;
        let margin = match quantity {
            Some(q) if q > 0.0 => q / leverage,
            _ => account.cash * cfg.default_position_size_pct,
        };
        let notional = margin * leverage;
        let fill_price = match side {
            Side::Long => price * (1.0 + cfg.slippage),
            Side::Short => price * (1.0 - cfg.slippage),
        };
        let size = notional / fill_price;
        let entry_fee = notional * cfg.taker_fee;
        let liquidation_price = match side {
            Side::Long => fill_price * (1.0 - (1.0 / leverage) + cfg.maintenance_margin_ratio),
            Side::Short => fill_price * (1.0 + (1.0 / leverage) - cfg.maintenance_margin_ratio),
        };

        account.lock_margin(margin, side)?;
        account.apply_fee(entry_fee);

        let position = FuturesPosition {
            symbol: symbol.clone(),
            side,
            entry_price: fill_price,
            size,
            leverage,
            margin,
            entry_time,
            entry_fee,
            unrealized_pnl: 0.0,
            liquidation_price,
            stop_loss,
            take_profit,
            trailing_stop_offset,
            trailing_stop_price: None,
            highest_price: fill_price,
            lowest_price: fill_price,
        };

        let slot = std::mem::take(self.slot_mut(symbol));
        *self.slot_mut(symbol) = slot.insert(side, position.clone());
        Ok(position)
    }

    pub fn close(
        &mut self,
        symbol: &SymbolId,
        side: Side,
        price: f64,
        exit_time: Millis,
        account: &mut FuturesAccount,
        cfg: &TradingConfig,
        reason: CloseReason,
    ) -> Result<TradeRecord, EngineError> {
        let slot = std::mem::take(self.slot_mut(symbol));
        let (remaining, position) = slot.take(side);
        *self.slot_mut(symbol) = remaining;
        let position = position.ok_or_else(|| EngineError::PositionNotFound {
            symbol: symbol.to_string(),
            side: side_label(side),
        })?;

        let fill_price = match side {
            Side::Long => price * (1.0 - cfg.slippage),
            Side::Short => price * (1.0 + cfg.slippage),
        };
        let realized_pnl = match side {
            Side::Long => (fill_price - position.entry_price) * position.size,
            Side::Short => (position.entry_price - fill_price) * position.size,
        };
        let exit_fee = fill_price * position.size * cfg.taker_fee;

        account.release_margin(position.margin, side);
        account.apply_pnl(realized_pnl - exit_fee);

        let pnl = realized_pnl - exit_fee - position.entry_fee;
        let trade_id = self.next_id();

        Ok(TradeRecord {
            trade_id,
            symbol: symbol.clone(),
            side,
            entry_time: position.entry_time,
            entry_price: position.entry_price,
            exit_time: Some(exit_time),
            exit_price: Some(fill_price),
            quantity: position.size,
            pnl,
            pnl_pct: pnl / position.margin,
            fees: position.entry_fee + exit_fee,
            reason: reason.as_str(),
        })
    }

    pub fn mark_to_market(&mut self, symbol: &SymbolId, mark_price: f64) {
        if let Some(slot) = self.slots.get_mut(symbol) {
            for position in slot.positions_mut() {
                position.mark_to_market(mark_price);
            }
        }
    }

    /// Check both slots for a symbol and return at most one action per
    /// slot per call, in strict priority order: liquidation, stop-loss,
    /// take-profit, trailing-stop.
    ///
    /// Driven by the bar's adverse intrabar extreme rather than its close —
    /// `low_price` for the long slot, `high_price` for the short slot — so a
    /// liquidation or stop that was only touched mid-bar still fires even
    /// when the bar closes back above (long) or below (short) the trigger
    /// level.
    pub fn check_stop_orders(&self, symbol: &SymbolId, low_price: f64, high_price: f64) -> Vec<(Side, StopTrigger)> {
        let slot = self.slot(symbol);
        let mut triggers = Vec::new();
        if let Some(p) = slot.long() {
            if let Some(t) = check_one(p, Side::Long, low_price) {
                triggers.push((Side::Long, t));
            }
        }
        if let Some(p) = slot.short() {
            if let Some(t) = check_one(p, Side::Short, high_price) {
                triggers.push((Side::Short, t));
            }
        }
        triggers
    }

    /// Flush both slots at `price`, for termination.
    pub fn close_all(
        &mut self,
        symbol: &SymbolId,
        price: f64,
        exit_time: Millis,
        account: &mut FuturesAccount,
        cfg: &TradingConfig,
        reason: CloseReason,
    ) -> Vec<TradeRecord> {
        let mut records = Vec::new();
        for side in [Side::Long, Side::Short] {
            if self.slot(symbol).has(side) {
                if let Ok(record) = self.close(symbol, side, price, exit_time, account, cfg, reason) {
                    records.push(record);
                }
            }
        }
        records
    }
}

impl Default for PositionManager {
    fn default() -> Self {
        Self::new()
    }
}

fn check_one(position: &FuturesPosition, side: Side, mark_price: f64) -> Option<StopTrigger> {
    let liquidated = match side {
        Side::Long => mark_price <= position.liquidation_price,
        Side::Short => mark_price >= position.liquidation_price,
    };
    if liquidated {
        return Some(StopTrigger::Liquidation);
    }
    if let Some(sl) = position.stop_loss {
        let hit = match side {
            Side::Long => mark_price <= sl,
            Side::Short => mark_price >= sl,
        };
        if hit {
            return Some(StopTrigger::StopLoss);
        }
    }
    if let Some(tp) = position.take_profit {
        let hit = match side {
            Side::Long => mark_price >= tp,
            Side::Short => mark_price <= tp,
        };
        if hit {
            return Some(StopTrigger::TakeProfit);
        }
    }
    if let Some(ts) = position.trailing_stop_price {
        let hit = match side {
            Side::Long => mark_price <= ts,
            Side::Short => mark_price >= ts,
        };
        if hit {
            return Some(StopTrigger::TrailingStop);
        }
    }
    None
}

fn side_label(side: Side) -> &'static str {
    match side {
        Side::Long => "long",
        Side::Short => "short",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg() -> TradingConfig {
        TradingConfig {
            default_leverage: 10.0,
            default_position_size_pct: 0.1,
            taker_fee: 0.0004,
            maker_fee: 0.0002,
            slippage: 0.0005,
            maintenance_margin_ratio: 0.004,
            funding_rate_interval_seconds: 28_800,
        }
    }

    #[test]
    fn f1_futures_long_close_in_profit() {
        let mut account = FuturesAccount::new(10000.0);
        let mut manager = PositionManager::new();
        let symbol = SymbolId::normalize("BTC/USDT");
        let cfg = cfg();

        let position = manager
            .open(&symbol, Side::Long, 100.0, 0, None, None, None, None, &mut account, &cfg)
            .unwrap();
        assert!((position.margin - 1000.0).abs() < 1e-6);
        assert!((position.entry_price - 100.05).abs() < 1e-6);
        assert!((position.size - 99.95002499).abs() < 1e-3);
        assert!((position.entry_fee - 4.0).abs() < 1e-6);

        let record = manager
            .close(&symbol, Side::Long, 110.0, 1, &mut account, &cfg, CloseReason::Signal)
            .unwrap();
        assert!((record.pnl - 980.58).abs() < 1.0);
        assert!((account.wallet_balance() - 10980.58).abs() < 1.0);
    }

    #[test]
    fn f2_liquidation_takes_priority_over_stop_loss() {
        let mut account = FuturesAccount::new(10000.0);
        let mut manager = PositionManager::new();
        let symbol = SymbolId::normalize("BTC/USDT");
        let cfg = cfg();

        manager
            .open(
                &symbol,
                Side::Long,
                100.0,
                0,
                None,
                Some(95.0),
                None,
                None,
                &mut account,
                &cfg,
            )
            .unwrap();
        let liquidation_price = manager.slot(&symbol).long().unwrap().liquidation_price;
        assert!((liquidation_price - 90.4).abs() < 0.5);

        manager.mark_to_market(&symbol, 90.0);
        let triggers = manager.check_stop_orders(&symbol, 90.0, 90.0);
        assert_eq!(triggers, vec![(Side::Long, StopTrigger::Liquidation)]);
    }

    #[test]
    fn f2_intrabar_low_liquidates_even_when_bar_closes_above_stop_loss() {
        // Reproduces the literal F2 scenario at the engine level: the bar's
        // low touches the liquidation price but its close does not, so a
        // close-only sweep would miss the liquidation (and could instead
        // fire the stop-loss on a later bar that never threatens margin).
        let mut account = FuturesAccount::new(10000.0);
        let mut manager = PositionManager::new();
        let symbol = SymbolId::normalize("BTC/USDT");
        let cfg = cfg();

        manager
            .open(&symbol, Side::Long, 100.0, 0, None, Some(95.0), None, None, &mut account, &cfg)
            .unwrap();
        let liquidation_price = manager.slot(&symbol).long().unwrap().liquidation_price;
        assert!((liquidation_price - 90.4).abs() < 0.5);

        // bar: low=90.0, close=95.0 — close alone never crosses either the
        // liquidation price or the stop-loss.
        let bar_low = 90.0;
        let bar_close = 95.0;
        manager.mark_to_market(&symbol, bar_close);
        let triggers = manager.check_stop_orders(&symbol, bar_low, bar_low);
        assert_eq!(triggers, vec![(Side::Long, StopTrigger::Liquidation)]);
    }

    #[test]
    fn duplicate_same_side_open_is_rejected() {
        let mut account = FuturesAccount::new(10000.0);
        let mut manager = PositionManager::new();
        let symbol = SymbolId::normalize("BTC/USDT");
        let cfg = cfg();
        manager
            .open(&symbol, Side::Long, 100.0, 0, None, None, None, None, &mut account, &cfg)
            .unwrap();
        let err = manager
            .open(&symbol, Side::Long, 100.0, 0, None, None, None, None, &mut account, &cfg)
            .unwrap_err();
        assert!(matches!(err, EngineError::DuplicatePosition { .. }));
    }

    #[test]
    fn hedge_slot_holds_both_sides_independently() {
        let mut account = FuturesAccount::new(10000.0);
        let mut manager = PositionManager::new();
        let symbol = SymbolId::normalize("BTC/USDT");
        let cfg = cfg();
        manager
            .open(&symbol, Side::Long, 100.0, 0, None, None, None, None, &mut account, &cfg)
            .unwrap();
        manager
            .open(&symbol, Side::Short, 100.0, 0, None, None, None, None, &mut account, &cfg)
            .unwrap();
        let slot = manager.slot(&symbol);
        assert!(slot.long().is_some());
        assert!(slot.short().is_some());
    }
}

//! Execution Engine
//!
//! Orchestrates D→E→F→G→J→H→K every tick and emits a back-pressured event
//! stream, the way the teacher's recorders spawn a writer task behind an
//! `mpsc` channel and hand the sender back to the caller. Single-tick-at-
//! a-time: one strategy call per bar, bars consumed strictly monotonically.

use crate::engine::accounts::{FuturesAccount, SimpleAccount};
use crate::engine::bar::Bar;
use crate::engine::config::EngineConfig;
use crate::engine::context::{IndicatorWindow, MarketDataWindow, NetPositions, StrategyContext};
use crate::engine::error::EngineError;
use crate::engine::indicators::IndicatorEngine;
use crate::engine::positions::{CloseReason, PositionManager, Side};
use crate::engine::report::{EquityPoint, Report, ReportBuilder};
use crate::engine::risk::{RiskAction, RiskManager, RiskState};
use crate::engine::signals::SignalResolver;
use crate::engine::strategy::Strategy;
use crate::engine::time::{Interval, Millis, SymbolId, MILLIS_PER_SEC};
use async_trait::async_trait;
use serde_json::json;
use std::collections::HashMap;
use tokio::sync::{mpsc, oneshot, watch};
use tokio_stream::wrappers::ReceiverStream;

/// Resolve a strategy's declared data requirements against the caller's
/// requested start time and push it backward by the computed warm-up
/// window — the execution engine's init step, run once before a
/// `BarLoader` is constructed for the (now-extended) range.
pub fn resolve_warmup_start(
    strategy: &dyn Strategy,
    interval: Interval,
    config: &HashMap<String, serde_json::Value>,
    requested_start: Millis,
) -> Millis {
    let requirements = strategy.get_data_requirements(interval, config);
    let bars = requirements.min_bars.max(requirements.warmup_periods) as i64;
    let step = requirements
        .max_timeframe_required
        .and_then(|iv| iv.to_millis())
        .or_else(|| interval.to_millis())
        .unwrap_or(0);
    let warmup_ms = bars * step + (requirements.extra_seconds as i64) * MILLIS_PER_SEC;
    requested_start - warmup_ms
}

/// The three interchangeable execution modes named in the purpose and
/// scope: historical replay is the only one fully implementable against
/// this crate's in-process primitives; paper/live require a realtime
/// exchange-adapter collaborator this core does not provide.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    Backtest,
    Paper,
    Live,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineEventKind {
    Tick,
    Trade,
    Warning,
    Progress,
    Error,
    Complete,
}

impl EngineEventKind {
    fn as_str(self) -> &'static str {
        match self {
            EngineEventKind::Tick => "tick",
            EngineEventKind::Trade => "trade",
            EngineEventKind::Warning => "warning",
            EngineEventKind::Progress => "progress",
            EngineEventKind::Error => "error",
            EngineEventKind::Complete => "complete",
        }
    }
}

/// `(event_type, data, timestamp)` per the external event stream contract.
/// `timestamp` is always the logical (bar) time, never wall-clock.
#[derive(Debug, Clone)]
pub struct EngineEvent {
    pub kind: EngineEventKind,
    pub data: serde_json::Value,
    pub timestamp: Millis,
}

impl EngineEvent {
    fn new(kind: EngineEventKind, data: serde_json::Value, timestamp: Millis) -> Self {
        Self { kind, data, timestamp }
    }
}

/// A lazy, finite, non-restartable source of bars feeding the tick loop —
/// the contract any of D's concrete flavors (replay, simulated realtime,
/// live) satisfies.
#[async_trait]
pub trait BarSource: Send {
    async fn next_bar(&mut self) -> Result<Option<Bar>, EngineError>;
}

#[async_trait]
impl BarSource for crate::engine::loader::BarLoader {
    async fn next_bar(&mut self) -> Result<Option<Bar>, EngineError> {
        self.next().await
    }
}

/// Speed control for replay emission pacing, per §5: batching never alters
/// the logical sequence, only the flush cadence.
#[derive(Debug, Clone, Copy)]
pub struct SpeedControl {
    factor: u32,
}

impl SpeedControl {
    pub fn new(factor: u32) -> Self {
        Self { factor: factor.min(999) }
    }

    /// Ticks to buffer before flushing. The express mode (factor at the
    /// grammar's ceiling) bundles up to 200 ticks per emission.
    pub fn batch_ticks(&self) -> usize {
        match self.factor {
            0..=9 => 1,
            10..=49 => 5,
            50..=99 => 10,
            100..=998 => 20,
            999 => 200,
        }
    }
}

impl Default for SpeedControl {
    fn default() -> Self {
        Self::new(0)
    }
}

/// Result of a completed run: the emitted events already drained through
/// the stream, plus the final report once the run terminates.
pub struct EngineRun {
    pub events: ReceiverStream<EngineEvent>,
    pub report: oneshot::Receiver<Report>,
}

pub struct ExecutionEngine {
    symbol: SymbolId,
    interval: Interval,
    strategy: Box<dyn Strategy>,
    indicator_engine: IndicatorEngine,
    resolver: SignalResolver,
    risk_manager: RiskManager,
    cfg: EngineConfig,
}

struct EmitBuffer {
    tx: mpsc::Sender<EngineEvent>,
    pending: Vec<EngineEvent>,
    batch_ticks: usize,
    ticks_since_flush: usize,
}

impl EmitBuffer {
    fn new(tx: mpsc::Sender<EngineEvent>, batch_ticks: usize) -> Self {
        Self {
            tx,
            pending: Vec::new(),
            batch_ticks,
            ticks_since_flush: 0,
        }
    }

    fn push(&mut self, event: EngineEvent) {
        self.pending.push(event);
    }

    fn push_tick(&mut self, event: EngineEvent) {
        self.pending.push(event);
        self.ticks_since_flush += 1;
    }

    async fn maybe_flush(&mut self) {
        if self.ticks_since_flush >= self.batch_ticks {
            self.flush().await;
        }
    }

    async fn flush(&mut self) {
        for event in self.pending.drain(..) {
            if self.tx.send(event).await.is_err() {
                break;
            }
        }
        self.ticks_since_flush = 0;
    }
}

impl ExecutionEngine {
    pub fn new(
        symbol: SymbolId,
        interval: Interval,
        strategy: Box<dyn Strategy>,
        indicator_engine: IndicatorEngine,
        resolver: SignalResolver,
        risk_manager: RiskManager,
        cfg: EngineConfig,
    ) -> Self {
        Self {
            symbol,
            interval,
            strategy,
            indicator_engine,
            resolver,
            risk_manager,
            cfg,
        }
    }

    /// Spawn the tick loop as a background task and return the event
    /// stream plus a one-shot handle to the final report, mirroring the
    /// channel-plus-spawned-writer shape used elsewhere for async output.
    pub fn run_futures(
        mut self,
        mut source: Box<dyn BarSource>,
        initial_capital: f64,
        cancel: watch::Receiver<bool>,
        event_buffer: usize,
    ) -> EngineRun {
        let (tx, rx) = mpsc::channel(event_buffer);
        let (report_tx, report_rx) = oneshot::channel();
        let batch_ticks = SpeedControl::new(self.cfg.runtime.max_speed).batch_ticks();

        tokio::spawn(async move {
            let mut emit = EmitBuffer::new(tx, batch_ticks);
            let report = self.drive_futures(source.as_mut(), initial_capital, cancel, &mut emit).await;
            emit.flush().await;
            let _ = report_tx.send(report);
        });

        EngineRun {
            events: ReceiverStream::new(rx),
            report: report_rx,
        }
    }

    async fn drive_futures(
        &mut self,
        source: &mut dyn BarSource,
        initial_capital: f64,
        mut cancel: watch::Receiver<bool>,
        emit: &mut EmitBuffer,
    ) -> Report {
        let mut account = FuturesAccount::new(initial_capital);
        let mut positions = PositionManager::new();
        let mut history: Vec<Bar> = Vec::new();
        let mut trade_records = Vec::new();
        let mut equity_curve: Vec<EquityPoint> = Vec::new();
        let mut peak_equity = initial_capital;
        let mut risk_state = RiskState::new(initial_capital, 0);
        let mut stop_trading = false;
        let mut last_price = initial_capital;
        let mut tick_index: u64 = 0;

        loop {
            if *cancel.borrow() {
                let records = positions.close_all(
                    &self.symbol,
                    last_price,
                    history.last().map(|b| b.close_time).unwrap_or(0),
                    &mut account,
                    &self.cfg.trading,
                    CloseReason::Cancelled,
                );
                self.emit_trades(emit, &records, last_price);
                return self.finish(
                    emit,
                    initial_capital,
                    account.wallet_balance(),
                    trade_records,
                    records,
                    equity_curve,
                    true,
                    "cancelled",
                    last_price,
                );
            }

            let bar = match source.next_bar().await {
                Ok(Some(bar)) => bar,
                Ok(None) => {
                    let records = positions.close_all(
                        &self.symbol,
                        last_price,
                        history.last().map(|b| b.close_time).unwrap_or(0),
                        &mut account,
                        &self.cfg.trading,
                        CloseReason::SessionEnd,
                    );
                    self.emit_trades(emit, &records, last_price);
                    return self.finish(
                        emit,
                        initial_capital,
                        account.wallet_balance(),
                        trade_records,
                        records,
                        equity_curve,
                        false,
                        "session_end",
                        last_price,
                    );
                }
                Err(e) => {
                    emit.push(EngineEvent::new(
                        EngineEventKind::Error,
                        json!({ "message": e.to_string() }),
                        last_price as Millis,
                    ));
                    let records = positions.close_all(
                        &self.symbol,
                        last_price,
                        history.last().map(|b| b.close_time).unwrap_or(0),
                        &mut account,
                        &self.cfg.trading,
                        CloseReason::SessionEnd,
                    );
                    return self.finish(
                        emit,
                        initial_capital,
                        account.wallet_balance(),
                        trade_records,
                        records,
                        equity_curve,
                        false,
                        "data_fetch_error",
                        last_price,
                    );
                }
            };

            history.push(bar);
            last_price = bar.close;
            tick_index += 1;

            // a. mark-to-market with bar close as the mark-price substitute.
            positions.mark_to_market(&self.symbol, bar.close);

            // b. stop-order sweep, driven by the bar's adverse intrabar
            // extreme (low for longs, high for shorts) rather than close
            // alone, so a liquidation or stop touched mid-bar is not missed.
            let triggers = positions.check_stop_orders(&self.symbol, bar.low, bar.high);
            for (side, trigger) in triggers {
                if let Ok(record) = positions.close(
                    &self.symbol,
                    side,
                    bar.close,
                    bar.close_time,
                    &mut account,
                    &self.cfg.trading,
                    trigger.into(),
                ) {
                    emit.push(EngineEvent::new(
                        EngineEventKind::Trade,
                        trade_to_json(&record),
                        bar.close_time,
                    ));
                    trade_records.push(record);
                }
            }

            // c. equity point.
            let unrealized: f64 = [positions.slot(&self.symbol).long(), positions.slot(&self.symbol).short()]
                .into_iter()
                .flatten()
                .map(|p| p.unrealized_pnl)
                .sum();
            let equity = account.cash + account.margin_locked() + unrealized;
            peak_equity = peak_equity.max(equity);
            let drawdown = (peak_equity - equity).max(0.0);
            let drawdown_pct = if peak_equity > 0.0 { drawdown / peak_equity } else { 0.0 };
            equity_curve.push(EquityPoint {
                timestamp: bar.close_time,
                equity,
                drawdown,
                drawdown_pct,
            });

            // d. build context.
            let window = build_market_data_window(&history);
            let indicators: IndicatorWindow = self.indicator_engine.compute_all(&window["close"]);
            let mut net_positions = NetPositions::new();
            let slot = positions.slot(&self.symbol);
            let net = slot.long().map(|p| p.size).unwrap_or(0.0) - slot.short().map(|p| p.size).unwrap_or(0.0);
            net_positions.insert(self.symbol.clone(), net);
            let context = StrategyContext {
                symbol: self.symbol.clone(),
                interval: self.interval,
                current_time: bar.open_time,
                market_data: window,
                indicators,
                cash: account.cash,
                positions: net_positions,
                metadata: std::cell::RefCell::new(serde_json::Map::new()),
            };

            // e. strategy.
            let result = self.strategy.execute(&context);
            let signals = if result.success {
                result.signals
            } else {
                emit.push(EngineEvent::new(
                    EngineEventKind::Warning,
                    json!({ "message": result.error_message.unwrap_or_default() }),
                    bar.close_time,
                ));
                Vec::new()
            };

            // f. resolve.
            let resolved = self.resolver.resolve(signals);

            // g. trade.
            let trader = crate::engine::traders::FuturesTrader::new();
            for signal in &resolved {
                if stop_trading && !signal.action.is_close_family() {
                    continue;
                }
                match trader.trade(signal, bar.close, bar.close_time, &mut account, &mut positions, &self.cfg.trading) {
                    Ok(records) => {
                        for record in &records {
                            emit.push(EngineEvent::new(EngineEventKind::Trade, trade_to_json(record), bar.close_time));
                        }
                        trade_records.extend(records);
                    }
                    Err(e @ (EngineError::InsufficientFunds { .. }
                    | EngineError::DuplicatePosition { .. }
                    | EngineError::PositionNotFound { .. })) => {
                        emit.push(EngineEvent::new(
                            EngineEventKind::Warning,
                            json!({ "message": e.to_string() }),
                            bar.close_time,
                        ));
                    }
                    Err(e) => {
                        emit.push(EngineEvent::new(
                            EngineEventKind::Error,
                            json!({ "message": e.to_string() }),
                            bar.close_time,
                        ));
                    }
                }
            }

            // h. risk.
            risk_state.update(bar.close_time, equity, &trade_records);
            let assessment = self.risk_manager.check_risk(&risk_state, &account, &positions, &self.symbol);
            match assessment.recommended_action {
                RiskAction::ForceClose => {
                    let records = positions.close_all(
                        &self.symbol,
                        bar.close,
                        bar.close_time,
                        &mut account,
                        &self.cfg.trading,
                        CloseReason::RiskCritical,
                    );
                    self.emit_trades(emit, &records, bar.close);
                    return self.finish(
                        emit,
                        initial_capital,
                        account.wallet_balance(),
                        trade_records,
                        records,
                        equity_curve,
                        false,
                        "risk_critical",
                        bar.close,
                    );
                }
                RiskAction::StopTrading => {
                    stop_trading = true;
                    emit.push(EngineEvent::new(
                        EngineEventKind::Warning,
                        json!({ "rules": assessment.triggered_rules, "action": "stop_trading" }),
                        bar.close_time,
                    ));
                }
                RiskAction::Warn => {
                    emit.push(EngineEvent::new(
                        EngineEventKind::Warning,
                        json!({ "rules": assessment.triggered_rules, "action": "warn" }),
                        bar.close_time,
                    ));
                }
                RiskAction::Continue => {}
            }

            // i. tick event.
            emit.push_tick(EngineEvent::new(
                EngineEventKind::Tick,
                json!({ "close": bar.close, "equity": equity, "tick_index": tick_index, "mark_source": "close" }),
                bar.close_time,
            ));
            emit.maybe_flush().await;

            if cancel.has_changed().unwrap_or(false) {
                let _ = cancel.borrow_and_update();
            }
        }
    }

    fn emit_trades(&self, emit: &mut EmitBuffer, records: &[crate::engine::positions::TradeRecord], timestamp: f64) {
        for record in records {
            emit.push(EngineEvent::new(EngineEventKind::Trade, trade_to_json(record), timestamp as Millis));
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn finish(
        &self,
        emit: &mut EmitBuffer,
        initial_capital: f64,
        final_capital: f64,
        mut trade_records: Vec<crate::engine::positions::TradeRecord>,
        termination_records: Vec<crate::engine::positions::TradeRecord>,
        equity_curve: Vec<EquityPoint>,
        cancelled: bool,
        reason: &'static str,
        timestamp: f64,
    ) -> Report {
        trade_records.extend(termination_records);
        let report = ReportBuilder::new(initial_capital, final_capital, trade_records, equity_curve).build();
        emit.push(EngineEvent::new(
            EngineEventKind::Complete,
            json!({ "reason": reason, "cancelled": cancelled }),
            timestamp as Millis,
        ));
        report
    }

    /// Event-contract run: fixed-stake binary outcomes resolved within the
    /// same bar, no margin or stop orders. Risk-rule checking is skipped —
    /// the rule table is expressed in margin/drawdown terms that don't
    /// apply to a cash-only account.
    pub fn run_events(
        mut self,
        mut source: Box<dyn BarSource>,
        initial_capital: f64,
        cancel: watch::Receiver<bool>,
        event_buffer: usize,
    ) -> EngineRun {
        let (tx, rx) = mpsc::channel(event_buffer);
        let (report_tx, report_rx) = oneshot::channel();
        let batch_ticks = SpeedControl::new(self.cfg.runtime.max_speed).batch_ticks();

        tokio::spawn(async move {
            let mut emit = EmitBuffer::new(tx, batch_ticks);
            let report = self.drive_events(source.as_mut(), initial_capital, cancel, &mut emit).await;
            emit.flush().await;
            let _ = report_tx.send(report);
        });

        EngineRun {
            events: ReceiverStream::new(rx),
            report: report_rx,
        }
    }

    async fn drive_events(
        &mut self,
        source: &mut dyn BarSource,
        initial_capital: f64,
        mut cancel: watch::Receiver<bool>,
        emit: &mut EmitBuffer,
    ) -> Report {
        let mut account = SimpleAccount::new(initial_capital);
        let mut trader = crate::engine::traders::EventsTrader::new();
        let mut history: Vec<Bar> = Vec::new();
        let mut trade_records = Vec::new();
        let mut equity_curve: Vec<EquityPoint> = Vec::new();
        let mut peak_equity = initial_capital;
        let mut tick_index: u64 = 0;

        loop {
            if *cancel.borrow() {
                return self.finish_events(emit, initial_capital, account.cash, trade_records, equity_curve, true, "cancelled");
            }

            let bar = match source.next_bar().await {
                Ok(Some(bar)) => bar,
                Ok(None) => {
                    return self.finish_events(emit, initial_capital, account.cash, trade_records, equity_curve, false, "session_end");
                }
                Err(e) => {
                    emit.push(EngineEvent::new(EngineEventKind::Error, json!({ "message": e.to_string() }), 0));
                    return self.finish_events(emit, initial_capital, account.cash, trade_records, equity_curve, false, "data_fetch_error");
                }
            };

            history.push(bar);
            tick_index += 1;

            let window = build_market_data_window(&history);
            let indicators: IndicatorWindow = self.indicator_engine.compute_all(&window["close"]);
            let context = StrategyContext {
                symbol: self.symbol.clone(),
                interval: self.interval,
                current_time: bar.open_time,
                market_data: window,
                indicators,
                cash: account.cash,
                positions: NetPositions::new(),
                metadata: std::cell::RefCell::new(serde_json::Map::new()),
            };

            let result = self.strategy.execute(&context);
            let signals = if result.success {
                result.signals
            } else {
                emit.push(EngineEvent::new(
                    EngineEventKind::Warning,
                    json!({ "message": result.error_message.unwrap_or_default() }),
                    bar.close_time,
                ));
                Vec::new()
            };

            let resolved = self.resolver.resolve(signals);
            for signal in &resolved {
                match trader.trade(signal, bar.open, bar.close, bar.open_time, bar.close_time, &mut account, &self.cfg.runtime) {
                    Ok(record) => {
                        emit.push(EngineEvent::new(EngineEventKind::Trade, event_trade_to_json(&record), bar.close_time));
                        trade_records.push(event_trade_to_position_record(&record));
                    }
                    Err(e) => {
                        emit.push(EngineEvent::new(EngineEventKind::Warning, json!({ "message": e.to_string() }), bar.close_time));
                    }
                }
            }

            peak_equity = peak_equity.max(account.cash);
            let drawdown = (peak_equity - account.cash).max(0.0);
            let drawdown_pct = if peak_equity > 0.0 { drawdown / peak_equity } else { 0.0 };
            equity_curve.push(EquityPoint {
                timestamp: bar.close_time,
                equity: account.cash,
                drawdown,
                drawdown_pct,
            });

            emit.push_tick(EngineEvent::new(
                EngineEventKind::Tick,
                json!({ "close": bar.close, "equity": account.cash, "tick_index": tick_index }),
                bar.close_time,
            ));
            emit.maybe_flush().await;

            if cancel.has_changed().unwrap_or(false) {
                let _ = cancel.borrow_and_update();
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn finish_events(
        &self,
        emit: &mut EmitBuffer,
        initial_capital: f64,
        final_capital: f64,
        trade_records: Vec<crate::engine::positions::TradeRecord>,
        equity_curve: Vec<EquityPoint>,
        cancelled: bool,
        reason: &'static str,
    ) -> Report {
        let timestamp = equity_curve.last().map(|p| p.timestamp).unwrap_or(0);
        let report = ReportBuilder::new(initial_capital, final_capital, trade_records, equity_curve).build();
        emit.push(EngineEvent::new(
            EngineEventKind::Complete,
            json!({ "reason": reason, "cancelled": cancelled }),
            timestamp,
        ));
        report
    }
}

fn event_trade_to_json(record: &crate::engine::traders::EventTradeRecord) -> serde_json::Value {
    json!({
        "trade_id": record.trade_id,
        "symbol": record.symbol.as_str(),
        "action": format!("{:?}", record.action),
        "entry_time": record.entry_time,
        "entry_price": record.entry_price,
        "exit_time": record.exit_time,
        "exit_price": record.exit_price,
        "quantity": record.quantity,
        "pnl": record.pnl,
        "pnl_pct": record.pnl_pct,
    })
}

/// Events trades fold into the same report pipeline as futures trades;
/// `side` carries no margin meaning here and is fixed to `Long`.
fn event_trade_to_position_record(record: &crate::engine::traders::EventTradeRecord) -> crate::engine::positions::TradeRecord {
    crate::engine::positions::TradeRecord {
        trade_id: record.trade_id,
        symbol: record.symbol.clone(),
        side: Side::Long,
        entry_time: record.entry_time,
        entry_price: record.entry_price,
        exit_time: Some(record.exit_time),
        exit_price: Some(record.exit_price),
        quantity: record.quantity,
        pnl: record.pnl,
        pnl_pct: record.pnl_pct,
        fees: 0.0,
        reason: "signal",
    }
}

fn build_market_data_window(history: &[Bar]) -> MarketDataWindow {
    let mut window = MarketDataWindow::new();
    window.insert("open".into(), history.iter().map(|b| b.open).collect());
    window.insert("high".into(), history.iter().map(|b| b.high).collect());
    window.insert("low".into(), history.iter().map(|b| b.low).collect());
    window.insert("close".into(), history.iter().map(|b| b.close).collect());
    window.insert("volume".into(), history.iter().map(|b| b.volume).collect());
    window.insert(
        "timestamps".into(),
        history.iter().map(|b| b.open_time as f64).collect(),
    );
    window
}

fn trade_to_json(record: &crate::engine::positions::TradeRecord) -> serde_json::Value {
    json!({
        "trade_id": record.trade_id,
        "symbol": record.symbol.as_str(),
        "side": match record.side { Side::Long => "long", Side::Short => "short" },
        "entry_time": record.entry_time,
        "entry_price": record.entry_price,
        "exit_time": record.exit_time,
        "exit_price": record.exit_price,
        "quantity": record.quantity,
        "pnl": record.pnl,
        "pnl_pct": record.pnl_pct,
        "fees": record.fees,
        "reason": record.reason,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::context::{Action, DataRequirements, Signal, StrategyResult};
    use crate::engine::indicators::IndicatorEngine;
    use crate::engine::risk::RiskManager;

    struct RequiresWarmup;

    impl Strategy for RequiresWarmup {
        fn name(&self) -> &str {
            "requires-warmup"
        }
        fn version(&self) -> &str {
            "1.0.0"
        }
        fn tags(&self) -> &[String] {
            &[]
        }
        fn execute(&self, _context: &StrategyContext) -> StrategyResult {
            StrategyResult::ok(vec![])
        }
        fn get_data_requirements(&self, _interval: Interval, _config: &HashMap<String, serde_json::Value>) -> DataRequirements {
            DataRequirements {
                min_bars: 0,
                warmup_periods: 20,
                prefer_closed_bar: true,
                extra_seconds: 30,
                max_timeframe_required: None,
            }
        }
    }

    #[test]
    fn resolve_warmup_start_pushes_back_by_periods_and_extra_seconds() {
        let strategy = RequiresWarmup;
        let start = resolve_warmup_start(&strategy, Interval::Minutes(1), &HashMap::new(), 1_000_000);
        // 20 bars * 60_000ms + 30s * 1_000ms = 1_200_000 + 30_000
        assert_eq!(start, 1_000_000 - 1_230_000);
    }

    #[test]
    fn resolve_warmup_start_is_a_no_op_with_default_requirements() {
        struct NoRequirements;
        impl Strategy for NoRequirements {
            fn name(&self) -> &str {
                "no-requirements"
            }
            fn version(&self) -> &str {
                "1.0.0"
            }
            fn tags(&self) -> &[String] {
                &[]
            }
            fn execute(&self, _context: &StrategyContext) -> StrategyResult {
                StrategyResult::ok(vec![])
            }
        }
        let start = resolve_warmup_start(&NoRequirements, Interval::Minutes(1), &HashMap::new(), 1_000_000);
        assert_eq!(start, 1_000_000);
    }

    struct OneShotLongStrategy {
        fired: std::sync::atomic::AtomicBool,
    }

    impl Strategy for OneShotLongStrategy {
        fn name(&self) -> &str {
            "one-shot-long"
        }
        fn version(&self) -> &str {
            "1.0.0"
        }
        fn tags(&self) -> &[String] {
            &[]
        }
        fn execute(&self, context: &StrategyContext) -> StrategyResult {
            if self.fired.swap(true, std::sync::atomic::Ordering::SeqCst) {
                return StrategyResult::ok(vec![]);
            }
            StrategyResult::ok(vec![Signal::new(Action::Long, context.symbol.clone(), 0.9).with_quantity(1000.0)])
        }
    }

    /// Fires a single `Up` event-contract signal on the first bar.
    struct OneShotUpStrategy {
        fired: std::sync::atomic::AtomicBool,
    }

    impl Strategy for OneShotUpStrategy {
        fn name(&self) -> &str {
            "one-shot-up"
        }
        fn version(&self) -> &str {
            "1.0.0"
        }
        fn tags(&self) -> &[String] {
            &[]
        }
        fn execute(&self, context: &StrategyContext) -> StrategyResult {
            if self.fired.swap(true, std::sync::atomic::Ordering::SeqCst) {
                return StrategyResult::ok(vec![]);
            }
            StrategyResult::ok(vec![Signal::new(Action::Up, context.symbol.clone(), 1.0).with_quantity(100.0)])
        }
    }

    struct VecBarSource {
        bars: std::collections::VecDeque<Bar>,
    }

    #[async_trait]
    impl BarSource for VecBarSource {
        async fn next_bar(&mut self) -> Result<Option<Bar>, EngineError> {
            Ok(self.bars.pop_front())
        }
    }

    fn bar(t: Millis, close: f64) -> Bar {
        Bar {
            open_time: t,
            open: close,
            high: close,
            low: close,
            close,
            volume: 1.0,
            close_time: t + 60_000,
            quote_volume: None,
            trade_count: None,
        }
    }

    fn bar_ohlc(t: Millis, open: f64, high: f64, low: f64, close: f64) -> Bar {
        Bar {
            open_time: t,
            open,
            high,
            low,
            close,
            volume: 1.0,
            close_time: t + 60_000,
            quote_volume: None,
            trade_count: None,
        }
    }

    /// Opens a single long with a stop-loss on the first bar, then never
    /// trades again.
    struct OpensLongWithStopLoss {
        stop_loss: f64,
        fired: std::sync::atomic::AtomicBool,
    }

    impl Strategy for OpensLongWithStopLoss {
        fn name(&self) -> &str {
            "opens-long-with-stop-loss"
        }
        fn version(&self) -> &str {
            "1.0.0"
        }
        fn tags(&self) -> &[String] {
            &[]
        }
        fn execute(&self, context: &StrategyContext) -> StrategyResult {
            if self.fired.swap(true, std::sync::atomic::Ordering::SeqCst) {
                return StrategyResult::ok(vec![]);
            }
            let mut signal = Signal::new(Action::Long, context.symbol.clone(), 0.9);
            signal.stop_loss = Some(self.stop_loss);
            StrategyResult::ok(vec![signal])
        }
    }

    #[tokio::test]
    async fn drives_a_full_run_to_completion_and_emits_complete() {
        let strategy = Box::new(OneShotLongStrategy {
            fired: std::sync::atomic::AtomicBool::new(false),
        });
        let engine = ExecutionEngine::new(
            SymbolId::normalize("BTC/USDT"),
            Interval::Minutes(1),
            strategy,
            IndicatorEngine::new(vec![]),
            SignalResolver::default(),
            RiskManager::default(),
            EngineConfig::default(),
        );
        let source = Box::new(VecBarSource {
            bars: vec![bar(0, 100.0), bar(60_000, 101.0), bar(120_000, 110.0)].into(),
        });
        let (_cancel_tx, cancel_rx) = watch::channel(false);
        let run = engine.run_futures(source, 10000.0, cancel_rx, 64);

        let events: Vec<EngineEvent> = tokio_stream::StreamExt::collect(run.events).await;
        assert!(events.iter().any(|e| e.kind == EngineEventKind::Trade));
        assert!(events.last().map(|e| e.kind) == Some(EngineEventKind::Complete));

        let report = run.report.await.unwrap();
        assert!(report.total_trades >= 1);
    }

    #[tokio::test]
    async fn cancellation_closes_positions_and_marks_cancelled() {
        let strategy = Box::new(OneShotLongStrategy {
            fired: std::sync::atomic::AtomicBool::new(false),
        });
        let engine = ExecutionEngine::new(
            SymbolId::normalize("BTC/USDT"),
            Interval::Minutes(1),
            strategy,
            IndicatorEngine::new(vec![]),
            SignalResolver::default(),
            RiskManager::default(),
            EngineConfig::default(),
        );
        let bars: std::collections::VecDeque<Bar> = (0..1000).map(|i| bar(i * 60_000, 100.0 + i as f64)).collect();
        let source = Box::new(VecBarSource { bars });
        let (cancel_tx, cancel_rx) = watch::channel(false);
        let run = engine.run_futures(source, 10000.0, cancel_rx, 4096);
        cancel_tx.send(true).unwrap();

        let events: Vec<EngineEvent> = tokio_stream::StreamExt::collect(run.events).await;
        let complete = events.iter().find(|e| e.kind == EngineEventKind::Complete).unwrap();
        assert_eq!(complete.data["cancelled"], serde_json::json!(true));
    }

    #[tokio::test]
    async fn f2_liquidation_fires_on_intrabar_low_even_when_bar_closes_above_stop_loss() {
        // Literal F2 scenario driven through the full tick loop: entry at
        // 100 gives a liquidation price of ~90.4; the next bar's low touches
        // 90.0 but its close (96.0) crosses neither the liquidation price
        // nor the 95.0 stop-loss. A close-only sweep would emit no trade at
        // all on this bar; the fix must emit a liquidation.
        let strategy = Box::new(OpensLongWithStopLoss {
            stop_loss: 95.0,
            fired: std::sync::atomic::AtomicBool::new(false),
        });
        let engine = ExecutionEngine::new(
            SymbolId::normalize("BTC/USDT"),
            Interval::Minutes(1),
            strategy,
            IndicatorEngine::new(vec![]),
            SignalResolver::default(),
            RiskManager::default(),
            EngineConfig::default(),
        );
        let source = Box::new(VecBarSource {
            bars: vec![bar(0, 100.0), bar_ohlc(60_000, 98.0, 98.0, 90.0, 96.0)].into(),
        });
        let (_cancel_tx, cancel_rx) = watch::channel(false);
        let run = engine.run_futures(source, 10_000.0, cancel_rx, 64);

        let events: Vec<EngineEvent> = tokio_stream::StreamExt::collect(run.events).await;
        let liquidation = events
            .iter()
            .find(|e| e.kind == EngineEventKind::Trade && e.data["reason"] == serde_json::json!("liquidation"))
            .expect("intrabar low must trigger a liquidation trade, not be missed or mistaken for a stop-loss");
        assert_ne!(liquidation.data["reason"], serde_json::json!("stop_loss"));
    }

    #[tokio::test]
    async fn e1_event_contract_run_drives_to_completion_via_run_events() {
        let strategy = Box::new(OneShotUpStrategy {
            fired: std::sync::atomic::AtomicBool::new(false),
        });
        let engine = ExecutionEngine::new(
            SymbolId::normalize("BTC/USDT"),
            Interval::Minutes(1),
            strategy,
            IndicatorEngine::new(vec![]),
            SignalResolver::default(),
            RiskManager::default(),
            EngineConfig::default(),
        );
        let source = Box::new(VecBarSource {
            bars: vec![bar_ohlc(0, 100.0, 110.0, 100.0, 110.0)].into(),
        });
        let (_cancel_tx, cancel_rx) = watch::channel(false);
        let run = engine.run_events(source, 1000.0, cancel_rx, 64);

        let events: Vec<EngineEvent> = tokio_stream::StreamExt::collect(run.events).await;
        let trade = events
            .iter()
            .find(|e| e.kind == EngineEventKind::Trade)
            .expect("run_events must emit the resolved Up trade");
        assert!((trade.data["pnl"].as_f64().unwrap() - 80.0).abs() < 1e-6);
        assert_eq!(events.last().map(|e| e.kind), Some(EngineEventKind::Complete));

        let report = run.report.await.unwrap();
        assert_eq!(report.total_trades, 1);
        assert!((report.total_return - 0.08).abs() < 1e-6);
    }
}

//! Single-symbol quant trading engine: backtest/paper/live execution over
//! event contracts and hedge-mode perpetual futures.
//!
//! The module tree mirrors the external interface's lettered components —
//! see `engine` for the full layout.

pub mod engine;

pub use engine::{
    Action, Bar, CircuitBreaker, DataCenter, DataSourceAdapter, Direction, EngineConfig,
    EngineError, EngineEvent, EngineEventKind, EngineRun, ExecutionEngine, FuturesAccount,
    FuturesDataSourceAdapter, FuturesPosition, FuturesTrader, HedgeSlot, IndicatorEngine, Interval,
    MockAdapter, PositionManager, Report, ReportBuilder, RiskManager, RunMode, Side, Signal,
    SignalResolver, SimpleAccount, Strategy, StrategyContext, StrategyResult, SymbolId,
    TradeRecord,
};

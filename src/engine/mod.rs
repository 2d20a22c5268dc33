//! Engine
//!
//! Module layout mirrors the external interface's lettered components:
//! time/bar/adapter/cache/datacenter/loader (data plane), indicators,
//! context/strategy/signals (decision plane), accounts/positions/traders
//! (execution plane), risk, report, and the execution engine tying them
//! together.

pub mod accounts;
pub mod adapter;
pub mod bar;
pub mod cache;
pub mod config;
pub mod context;
pub mod datacenter;
pub mod error;
pub mod execution;
pub mod indicators;
pub mod loader;
pub mod positions;
pub mod report;
pub mod risk;
pub mod signals;
pub mod strategy;
pub mod time;
pub mod traders;

pub use accounts::{FuturesAccount, SimpleAccount};
pub use adapter::{DataSourceAdapter, FuturesDataSourceAdapter, MockAdapter, Ticker};
pub use bar::{Bar, KlinePayload};
pub use cache::{BarCache, BreakerState, CacheKey, CircuitBreaker};
pub use config::EngineConfig;
pub use context::{Action, Direction, Signal, StrategyContext, StrategyResult};
pub use datacenter::{AdapterKey, DataCenter, MarketDataMetadata, MarketDataRequest, MarketDataResponse, Ohlcv};
pub use error::{DataFetchKind, EngineError};
pub use execution::{
    resolve_warmup_start, EngineEvent, EngineEventKind, EngineRun, ExecutionEngine, RunMode, SpeedControl,
};
pub use indicators::{IndicatorEngine, IndicatorSpec};
pub use loader::BarLoader;
pub use positions::{CloseReason, FuturesPosition, HedgeSlot, PositionManager, Side, StopTrigger, TradeRecord};
pub use report::{EquityPoint, Report, ReportBuilder};
pub use risk::{RiskAction, RiskAssessment, RiskLevel, RiskManager, RiskManagerBuilder, RiskRule, RiskState};
pub use signals::SignalResolver;
pub use strategy::{AggregationMode, CompositeStrategy, ExecutionMode, Strategy, StrategyFactory, StrategyRegistry};
pub use time::{Interval, Millis, SymbolId};
pub use traders::{EventTradeRecord, EventsTrader, FuturesTrader};

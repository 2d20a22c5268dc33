//! Error Taxonomy
//!
//! One enum covering every failure kind named by the engine's contract.
//! Variants are data, not string blobs, so callers can match on kind and
//! apply the propagation policy (catch-and-continue vs. bubble-and-terminate).

use std::fmt;

/// Transport-level failure reported by a data source adapter.
#[derive(Debug, Clone, PartialEq)]
pub enum DataFetchKind {
    /// Transient, retryable.
    Network(String),
    /// Retryable with back-off.
    RateLimited,
    /// Permanent, not retryable.
    Adapter(String),
}

impl DataFetchKind {
    pub fn is_retryable(&self) -> bool {
        matches!(self, DataFetchKind::Network(_) | DataFetchKind::RateLimited)
    }
}

impl fmt::Display for DataFetchKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataFetchKind::Network(msg) => write!(f, "network error: {msg}"),
            DataFetchKind::RateLimited => write!(f, "rate limited"),
            DataFetchKind::Adapter(msg) => write!(f, "adapter error: {msg}"),
        }
    }
}

/// Crate-wide error type.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineError {
    InsufficientFunds { required: f64, available: f64 },
    InvalidSignal(String),
    PositionNotFound { symbol: String, side: &'static str },
    DuplicatePosition { symbol: String, side: &'static str },
    StrategyLoadError(String),
    StrategyExecutionError(String),
    DataFetch(DataFetchKind),
    CircuitOpen { service: String },
    RiskControlTriggered { rules: Vec<String> },
    ConfigError(String),
    Cancelled,
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineError::InsufficientFunds {
                required,
                available,
            } => write!(
                f,
                "insufficient funds: need {required:.4}, have {available:.4}"
            ),
            EngineError::InvalidSignal(msg) => write!(f, "invalid signal: {msg}"),
            EngineError::PositionNotFound { symbol, side } => {
                write!(f, "no open {side} position for {symbol}")
            }
            EngineError::DuplicatePosition { symbol, side } => {
                write!(f, "{side} position already open for {symbol}")
            }
            EngineError::StrategyLoadError(msg) => write!(f, "strategy load error: {msg}"),
            EngineError::StrategyExecutionError(msg) => {
                write!(f, "strategy execution error: {msg}")
            }
            EngineError::DataFetch(kind) => write!(f, "data fetch error: {kind}"),
            EngineError::CircuitOpen { service } => {
                write!(f, "circuit open for service '{service}'")
            }
            EngineError::RiskControlTriggered { rules } => {
                write!(f, "risk control triggered: {}", rules.join(", "))
            }
            EngineError::ConfigError(msg) => write!(f, "config error: {msg}"),
            EngineError::Cancelled => write!(f, "run cancelled"),
        }
    }
}

impl std::error::Error for EngineError {}

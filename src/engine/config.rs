//! Engine Configuration
//!
//! The configuration surface named in the external interfaces: data
//! center, trading, engine, risk, and global option groups, each with
//! embedded defaults. Config-file parsing and environment-variable
//! binding are external collaborators — this module only defines the
//! shapes and their defaults; loading order of precedence is the caller's
//! responsibility.

use std::time::Duration;

#[derive(Debug, Clone)]
pub struct DataCenterConfig {
    pub base_url: String,
    pub enable_cache: bool,
    pub cache_ttl_seconds: u64,
    pub request_timeout_seconds: u64,
    pub max_retries: u32,
    pub retry_delay_seconds: f64,
}

impl Default for DataCenterConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            enable_cache: true,
            cache_ttl_seconds: 300,
            request_timeout_seconds: 10,
            max_retries: 3,
            retry_delay_seconds: 0.2,
        }
    }
}

impl DataCenterConfig {
    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_seconds)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_secs_f64(self.retry_delay_seconds)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct TradingConfig {
    pub default_leverage: f64,
    pub default_position_size_pct: f64,
    pub taker_fee: f64,
    pub maker_fee: f64,
    pub slippage: f64,
    pub maintenance_margin_ratio: f64,
    pub funding_rate_interval_seconds: u64,
}

impl Default for TradingConfig {
    fn default() -> Self {
        Self {
            default_leverage: 10.0,
            default_position_size_pct: 0.1,
            taker_fee: 0.0004,
            maker_fee: 0.0002,
            slippage: 0.0005,
            maintenance_margin_ratio: 0.004,
            funding_rate_interval_seconds: 28_800,
        }
    }
}

#[derive(Debug, Clone)]
pub struct EngineRuntimeConfig {
    pub batch_size: usize,
    pub preload_enabled: bool,
    pub max_speed: u32,
    pub investment_amount: f64,
    pub payout_multiplier: f64,
    /// Indicator names precomputed every tick when a strategy doesn't
    /// request its own set via `Strategy::get_config`.
    pub default_indicators: Vec<String>,
}

impl Default for EngineRuntimeConfig {
    fn default() -> Self {
        Self {
            batch_size: 500,
            preload_enabled: true,
            max_speed: 0,
            investment_amount: 100.0,
            payout_multiplier: 1.8,
            default_indicators: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct RiskConfig {
    pub max_daily_loss_pct: f64,
    pub max_drawdown_pct: f64,
    pub max_total_position_pct: f64,
    pub warning_ratio: f64,
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            max_daily_loss_pct: 0.05,
            max_drawdown_pct: 0.15,
            max_total_position_pct: 0.8,
            warning_ratio: 0.7,
        }
    }
}

#[derive(Debug, Clone)]
pub struct GlobalConfig {
    pub timezone: String,
    pub log_level: String,
    pub debug: bool,
}

impl Default for GlobalConfig {
    fn default() -> Self {
        Self {
            timezone: "UTC".into(),
            log_level: "info".into(),
            debug: false,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct EngineConfig {
    pub data_center: DataCenterConfig,
    pub trading: TradingConfig,
    pub runtime: EngineRuntimeConfig,
    pub risk: RiskConfig,
    pub global: GlobalConfig,
}

//! End-to-end demonstration: a trend-following toy strategy over a mock
//! adapter's bar table, run to completion through the execution engine.

use betterbot_engine::engine::adapter::MockAdapter;
use betterbot_engine::engine::bar::Bar;
use betterbot_engine::engine::config::EngineConfig;
use betterbot_engine::engine::context::{Action, DataRequirements, Signal, StrategyContext, StrategyResult};
use betterbot_engine::engine::datacenter::{AdapterKey, DataCenter, MarketDataRequest};
use betterbot_engine::engine::indicators::{IndicatorEngine, IndicatorSpec};
use betterbot_engine::engine::loader::BarLoader;
use betterbot_engine::engine::risk::RiskManager;
use betterbot_engine::engine::signals::SignalResolver;
use betterbot_engine::engine::strategy::Strategy;
use betterbot_engine::engine::time::{Interval, Millis, SymbolId};
use betterbot_engine::engine::{resolve_warmup_start, EngineEventKind, EngineRun, ExecutionEngine};
use clap::Parser;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio_stream::StreamExt;

#[derive(Parser, Debug)]
#[command(about = "Run a toy strategy through the execution engine against synthetic bars")]
struct Args {
    #[arg(long, default_value_t = 200)]
    bars: i64,

    #[arg(long, default_value_t = 10_000.0)]
    initial_capital: f64,

    #[arg(long, default_value_t = 0)]
    speed: u32,
}

/// Opens long on a fast/slow SMA crossover, closes on the reverse cross.
struct SmaCrossStrategy;

impl Strategy for SmaCrossStrategy {
    fn name(&self) -> &str {
        "sma-cross-demo"
    }

    fn version(&self) -> &str {
        "1.0.0"
    }

    fn tags(&self) -> &[String] {
        &[]
    }

    fn execute(&self, context: &StrategyContext) -> StrategyResult {
        let fast = context.indicator("sma_5");
        let slow = context.indicator("sma_20");
        let (Some(fast), Some(slow)) = (fast, slow) else {
            return StrategyResult::ok(vec![]);
        };
        let n = fast.len();
        if n < 2 || slow.len() < 2 {
            return StrategyResult::ok(vec![]);
        }
        let (prev_fast, curr_fast) = (fast[n - 2], fast[n - 1]);
        let (prev_slow, curr_slow) = (slow[n - 2], slow[n - 1]);
        if prev_fast.is_nan() || prev_slow.is_nan() {
            return StrategyResult::ok(vec![]);
        }

        let crossed_up = prev_fast <= prev_slow && curr_fast > curr_slow;
        let crossed_down = prev_fast >= prev_slow && curr_fast < curr_slow;

        let net = context.positions.get(&context.symbol).copied().unwrap_or(0.0);
        if crossed_up && net <= 0.0 {
            return StrategyResult::ok(vec![Signal::new(Action::Long, context.symbol.clone(), 0.8)
                .with_quantity(context.cash * 0.1)
                .with_reason("fast sma crossed above slow sma")]);
        }
        if crossed_down && net > 0.0 {
            return StrategyResult::ok(vec![Signal::new(Action::CloseLong, context.symbol.clone(), 0.8)
                .with_reason("fast sma crossed below slow sma")]);
        }
        StrategyResult::ok(vec![])
    }

    fn get_data_requirements(&self, _interval: Interval, _config: &HashMap<String, serde_json::Value>) -> DataRequirements {
        // Needs the slow SMA's period of lookback before it can emit a
        // meaningful crossover signal.
        DataRequirements {
            min_bars: 20,
            warmup_periods: 20,
            prefer_closed_bar: true,
            extra_seconds: 0,
            max_timeframe_required: None,
        }
    }
}

/// Generates one bar per minute covering `[start, end)`, including the
/// negative-time warm-up stretch a strategy's `DataRequirements` may push
/// the request back into.
fn synthetic_bars(start: Millis, end: Millis, symbol: &str) -> Vec<Bar> {
    let count = ((end - start) / 60_000).max(0);
    let mut bars = Vec::with_capacity(count as usize);
    let mut price = 100.0_f64;
    for i in 0..count {
        let drift = ((i as f64) / 17.0).sin() * 2.0;
        price = (price + drift).max(1.0);
        let open_time: Millis = start + i * 60_000;
        bars.push(Bar {
            open_time,
            open: price,
            high: price * 1.01,
            low: price * 0.99,
            close: price,
            volume: 10.0,
            close_time: open_time + 60_000,
            quote_volume: None,
            trade_count: None,
        });
    }
    let _ = symbol;
    bars
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();
    let args = Args::parse();

    let symbol = SymbolId::normalize("BTC/USDT");
    let end = args.bars * 60_000;
    let warmup_start = resolve_warmup_start(&SmaCrossStrategy, Interval::Minutes(1), &HashMap::new(), 0);

    let adapter = Arc::new(
        MockAdapter::new().with_bars(symbol.as_str(), synthetic_bars(warmup_start, end, symbol.as_str())),
    );
    let mut data_center = DataCenter::new(Duration::from_secs(300), 1000);
    data_center.register_adapter(AdapterKey::new("binance", "spot"), adapter);
    let data_center = Arc::new(data_center);

    let request = MarketDataRequest {
        adapter: AdapterKey::new("binance", "spot"),
        symbol: symbol.clone(),
        interval: Interval::Minutes(1),
        limit: 0,
        range: Some((warmup_start, end)),
    };
    let mut cfg = EngineConfig::default();
    cfg.runtime.max_speed = args.speed;

    let loader = BarLoader::with_preload(data_center, request, 50, cfg.runtime.preload_enabled)?;

    let indicators = IndicatorEngine::new(vec![
        IndicatorSpec::new("sma").with_param("period", 5.0),
        IndicatorSpec::new("sma").with_param("period", 20.0),
    ]);

    let engine = ExecutionEngine::new(
        symbol,
        Interval::Minutes(1),
        Box::new(SmaCrossStrategy),
        indicators,
        SignalResolver::default(),
        RiskManager::default(),
        cfg,
    );

    let (_cancel_tx, cancel_rx) = watch::channel(false);
    let EngineRun { mut events, report } = engine.run_futures(Box::new(loader), args.initial_capital, cancel_rx, 256);

    let mut trade_count = 0;
    while let Some(event) = events.next().await {
        match event.kind {
            EngineEventKind::Trade => {
                trade_count += 1;
                println!("trade #{trade_count} @ {}: {}", event.timestamp, event.data);
            }
            EngineEventKind::Warning => println!("warning @ {}: {}", event.timestamp, event.data),
            EngineEventKind::Complete => println!("complete @ {}: {}", event.timestamp, event.data),
            _ => {}
        }
    }

    let report = report.await?;
    println!(
        "total_return={:.4} win_rate={:.2} trades={} max_drawdown_pct={:.4} sharpe={:.2}",
        report.total_return, report.win_rate, report.total_trades, report.max_drawdown_pct, report.sharpe_ratio
    );

    Ok(())
}

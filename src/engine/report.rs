//! Report Builder
//!
//! Folds trade records and the equity curve into return, drawdown, and
//! risk-adjusted performance statistics. All ratios report 0 rather than
//! NaN when their denominator is zero.

use crate::engine::positions::TradeRecord;
use crate::engine::time::{utc_day, Millis};
use serde::{Deserialize, Serialize};
use statrs::statistics::Statistics;

const TRADING_DAYS_PER_YEAR: f64 = 365.0;

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct EquityPoint {
    pub timestamp: Millis,
    pub equity: f64,
    pub drawdown: f64,
    pub drawdown_pct: f64,
}

/// A run's performance summary. Derives `Serialize` so a caller — a
/// `demos/` binary, a paper-trading dashboard — can dump it as JSON
/// without a bespoke formatter.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Report {
    pub total_return: f64,
    pub annual_return: f64,
    pub win_rate: f64,
    pub avg_win: f64,
    pub avg_loss: f64,
    pub profit_factor: f64,
    pub max_drawdown_pct: f64,
    pub sharpe_ratio: f64,
    pub sortino_ratio: f64,
    pub calmar_ratio: f64,
    pub total_trades: usize,
    pub winning_trades: usize,
    pub losing_trades: usize,
}

pub struct ReportBuilder {
    initial_capital: f64,
    final_capital: f64,
    trade_records: Vec<TradeRecord>,
    equity_curve: Vec<EquityPoint>,
}

impl ReportBuilder {
    pub fn new(
        initial_capital: f64,
        final_capital: f64,
        trade_records: Vec<TradeRecord>,
        equity_curve: Vec<EquityPoint>,
    ) -> Self {
        Self {
            initial_capital,
            final_capital,
            trade_records,
            equity_curve,
        }
    }

    fn daily_returns(&self) -> Vec<f64> {
        if self.equity_curve.is_empty() {
            return Vec::new();
        }
        let mut by_day: Vec<(i64, f64)> = Vec::new();
        for point in &self.equity_curve {
            let day = utc_day(point.timestamp);
            match by_day.last_mut() {
                Some((last_day, last_equity)) if *last_day == day => *last_equity = point.equity,
                _ => by_day.push((day, point.equity)),
            }
        }
        by_day
            .windows(2)
            .filter_map(|w| {
                let (_, prev) = w[0];
                let (_, curr) = w[1];
                if prev.abs() > f64::EPSILON {
                    Some((curr - prev) / prev)
                } else {
                    None
                }
            })
            .collect()
    }

    fn duration_days(&self) -> f64 {
        match (self.equity_curve.first(), self.equity_curve.last()) {
            (Some(first), Some(last)) => {
                ((last.timestamp - first.timestamp) as f64 / 86_400_000.0).max(0.0)
            }
            _ => 0.0,
        }
    }

    pub fn build(&self) -> Report {
        let total_return = if self.initial_capital > 0.0 {
            (self.final_capital - self.initial_capital) / self.initial_capital
        } else {
            0.0
        };

        let duration_days = self.duration_days();
        let annual_return = if duration_days > 0.0 {
            (1.0 + total_return).powf(TRADING_DAYS_PER_YEAR / duration_days) - 1.0
        } else {
            0.0
        };

        let total_trades = self.trade_records.len();
        let wins: Vec<f64> = self.trade_records.iter().map(|t| t.pnl).filter(|&p| p > 0.0).collect();
        let losses: Vec<f64> = self
            .trade_records
            .iter()
            .map(|t| t.pnl)
            .filter(|&p| p < 0.0)
            .map(f64::abs)
            .collect();

        let winning_trades = wins.len();
        let losing_trades = losses.len();
        let win_rate = if total_trades > 0 {
            winning_trades as f64 / total_trades as f64
        } else {
            0.0
        };
        let avg_win = if !wins.is_empty() { wins.clone().mean() } else { 0.0 };
        let avg_loss = if !losses.is_empty() { losses.clone().mean() } else { 0.0 };

        let gross_gains: f64 = wins.iter().sum();
        let gross_losses: f64 = losses.iter().sum();
        let profit_factor = if gross_losses > f64::EPSILON {
            gross_gains / gross_losses
        } else if gross_gains > 0.0 {
            f64::INFINITY
        } else {
            0.0
        };

        let max_drawdown_pct = self
            .equity_curve
            .iter()
            .map(|p| p.drawdown_pct)
            .fold(0.0_f64, f64::max);

        let returns = self.daily_returns();
        let n = returns.len() as f64;
        let sharpe_ratio = if returns.len() >= 2 {
            let mean = returns.clone().mean();
            let std = returns.clone().std_dev();
            if std > f64::EPSILON {
                mean / std * n.sqrt()
            } else {
                0.0
            }
        } else {
            0.0
        };

        let negative_returns: Vec<f64> = returns.iter().copied().filter(|&r| r < 0.0).collect();
        let sortino_ratio = if returns.len() >= 2 && negative_returns.len() >= 2 {
            let mean = returns.clone().mean();
            let downside_std = negative_returns.clone().std_dev();
            if downside_std > f64::EPSILON {
                mean / downside_std * n.sqrt()
            } else {
                0.0
            }
        } else {
            0.0
        };

        let calmar_ratio = if max_drawdown_pct > f64::EPSILON {
            annual_return / max_drawdown_pct
        } else {
            0.0
        };

        Report {
            total_return,
            annual_return,
            win_rate,
            avg_win,
            avg_loss,
            profit_factor,
            max_drawdown_pct,
            sharpe_ratio,
            sortino_ratio,
            calmar_ratio,
            total_trades,
            winning_trades,
            losing_trades,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::positions::Side;
    use crate::engine::time::SymbolId;

    fn trade(pnl: f64) -> TradeRecord {
        TradeRecord {
            trade_id: 1,
            symbol: SymbolId::normalize("BTC/USDT"),
            side: Side::Long,
            entry_time: 0,
            entry_price: 100.0,
            exit_time: Some(0),
            exit_price: Some(100.0),
            quantity: 1.0,
            pnl,
            pnl_pct: pnl / 100.0,
            fees: 0.0,
            reason: "signal",
        }
    }

    fn point(day_ms: Millis, equity: f64, peak: f64) -> EquityPoint {
        EquityPoint {
            timestamp: day_ms,
            equity,
            drawdown: (peak - equity).max(0.0),
            drawdown_pct: if peak > 0.0 { ((peak - equity) / peak).max(0.0) } else { 0.0 },
        }
    }

    #[test]
    fn zero_denominators_report_zero_not_nan() {
        let builder = ReportBuilder::new(1000.0, 1000.0, Vec::new(), Vec::new());
        let report = builder.build();
        assert_eq!(report.sharpe_ratio, 0.0);
        assert_eq!(report.sortino_ratio, 0.0);
        assert_eq!(report.calmar_ratio, 0.0);
        assert_eq!(report.profit_factor, 0.0);
    }

    #[test]
    fn win_rate_and_profit_factor() {
        let trades = vec![trade(100.0), trade(-50.0), trade(50.0)];
        let builder = ReportBuilder::new(1000.0, 1100.0, trades, Vec::new());
        let report = builder.build();
        assert!((report.win_rate - (2.0 / 3.0)).abs() < 1e-9);
        assert!((report.profit_factor - 3.0).abs() < 1e-9);
    }

    #[test]
    fn max_drawdown_is_the_peak_relative_maximum() {
        let curve = vec![
            point(0, 1000.0, 1000.0),
            point(86_400_000, 1200.0, 1200.0),
            point(172_800_000, 900.0, 1200.0),
        ];
        let builder = ReportBuilder::new(1000.0, 900.0, Vec::new(), curve);
        let report = builder.build();
        assert!((report.max_drawdown_pct - 0.25).abs() < 1e-9);
    }
}

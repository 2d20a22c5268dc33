//! Risk Manager
//!
//! Evaluates a data-driven table of graded rules each tick and returns the
//! worst level/action observed, following the teacher's
//! `RiskLimits`/`RiskManagerBuilder` shape: a default table plus a builder
//! for tests that need tighter or looser thresholds.

use crate::engine::accounts::FuturesAccount;
use crate::engine::positions::{PositionManager, TradeRecord};
use crate::engine::time::{Millis, SymbolId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum RiskLevel {
    None,
    Warning,
    Critical,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum RiskAction {
    Continue,
    Warn,
    StopTrading,
    ForceClose,
}

#[derive(Debug, Clone, Copy)]
pub enum RuleKind {
    DailyLoss,
    MaxDrawdown,
    PositionRatio,
}

#[derive(Debug, Clone)]
pub struct RiskRule {
    pub name: &'static str,
    pub level: RiskLevel,
    pub kind: RuleKind,
    pub threshold: f64,
    pub action: RiskAction,
}

fn default_rules() -> Vec<RiskRule> {
    vec![
        RiskRule {
            name: "daily_loss_warning",
            level: RiskLevel::Warning,
            kind: RuleKind::DailyLoss,
            threshold: 0.035,
            action: RiskAction::Warn,
        },
        RiskRule {
            name: "daily_loss_critical",
            level: RiskLevel::Critical,
            kind: RuleKind::DailyLoss,
            threshold: 0.05,
            action: RiskAction::ForceClose,
        },
        RiskRule {
            name: "max_drawdown_warning",
            level: RiskLevel::Warning,
            kind: RuleKind::MaxDrawdown,
            threshold: 0.10,
            action: RiskAction::Warn,
        },
        RiskRule {
            name: "max_drawdown_critical",
            level: RiskLevel::Critical,
            kind: RuleKind::MaxDrawdown,
            threshold: 0.15,
            action: RiskAction::ForceClose,
        },
        RiskRule {
            name: "position_ratio",
            level: RiskLevel::Warning,
            kind: RuleKind::PositionRatio,
            threshold: 0.80,
            action: RiskAction::StopTrading,
        },
    ]
}

#[derive(Debug, Clone)]
pub struct RiskAssessment {
    pub level: RiskLevel,
    pub triggered_rules: Vec<&'static str>,
    pub recommended_action: RiskAction,
    pub daily_pnl: f64,
    pub drawdown_pct: f64,
}

/// Running risk state threaded across ticks: peak equity, daily pnl, and
/// the anchor date the daily figure resets against.
#[derive(Debug, Clone)]
pub struct RiskState {
    pub peak_equity: f64,
    pub current_equity: f64,
    pub daily_pnl: f64,
    pub daily_pnl_anchor_date: i64,
}

impl RiskState {
    pub fn new(initial_equity: f64, anchor_date: i64) -> Self {
        Self {
            peak_equity: initial_equity,
            current_equity: initial_equity,
            daily_pnl: 0.0,
            daily_pnl_anchor_date: anchor_date,
        }
    }

    /// Roll the equity/drawdown/daily-pnl state forward to `current_time`,
    /// recomputing `daily_pnl` from `trade_history` filtered to the tick's
    /// UTC date whenever the date has advanced.
    pub fn update(&mut self, current_time: Millis, current_equity: f64, trade_history: &[TradeRecord]) {
        self.current_equity = current_equity;
        self.peak_equity = self.peak_equity.max(current_equity);

        let today = crate::engine::time::utc_day(current_time);
        if today != self.daily_pnl_anchor_date {
            self.daily_pnl_anchor_date = today;
        }
        self.daily_pnl = trade_history
            .iter()
            .filter(|t| t.exit_time.map(crate::engine::time::utc_day) == Some(today))
            .map(|t| t.pnl)
            .sum();
    }

    pub fn drawdown_pct(&self) -> f64 {
        if self.peak_equity <= 0.0 {
            return 0.0;
        }
        ((self.peak_equity - self.current_equity) / self.peak_equity).max(0.0)
    }

    pub fn daily_loss_pct(&self) -> f64 {
        if self.peak_equity <= 0.0 || self.daily_pnl >= 0.0 {
            return 0.0;
        }
        -self.daily_pnl / self.peak_equity
    }
}

pub struct RiskManager {
    rules: Vec<RiskRule>,
}

impl RiskManager {
    pub fn new(rules: Vec<RiskRule>) -> Self {
        Self { rules }
    }

    pub fn check_risk(
        &self,
        state: &RiskState,
        account: &FuturesAccount,
        _positions: &PositionManager,
        _symbol: &SymbolId,
    ) -> RiskAssessment {
        let daily_loss_pct = state.daily_loss_pct();
        let drawdown_pct = state.drawdown_pct();
        let position_ratio = if account.wallet_balance() > 0.0 {
            account.margin_locked() / account.wallet_balance()
        } else {
            0.0
        };

        let mut triggered = Vec::new();
        let mut level = RiskLevel::None;
        let mut action = RiskAction::Continue;

        for rule in &self.rules {
            let measured = match rule.kind {
                RuleKind::DailyLoss => daily_loss_pct,
                RuleKind::MaxDrawdown => drawdown_pct,
                RuleKind::PositionRatio => position_ratio,
            };
            if measured >= rule.threshold {
                triggered.push(rule.name);
                if rule.level > level {
                    level = rule.level;
                }
                if rule.action > action {
                    action = rule.action;
                }
            }
        }

        RiskAssessment {
            level,
            triggered_rules: triggered,
            recommended_action: action,
            daily_pnl: state.daily_pnl,
            drawdown_pct,
        }
    }
}

impl Default for RiskManager {
    fn default() -> Self {
        Self::new(default_rules())
    }
}

pub struct RiskManagerBuilder {
    rules: Vec<RiskRule>,
}

impl Default for RiskManagerBuilder {
    fn default() -> Self {
        Self {
            rules: default_rules(),
        }
    }
}

impl RiskManagerBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rules(mut self, rules: Vec<RiskRule>) -> Self {
        self.rules = rules;
        self
    }

    pub fn add_rule(mut self, rule: RiskRule) -> Self {
        self.rules.push(rule);
        self
    }

    pub fn build(self) -> RiskManager {
        RiskManager::new(self.rules)
    }
}

//! Simulated Accounts
//!
//! Cash plus per-direction locked margin, with invariant-preserving
//! mutation methods. Invariant checks use `debug_assert!`: a violation here
//! is a caller bug (engine/trader wiring), never a recoverable runtime
//! condition, in the same spirit as the teacher's clock's backward-time
//! guard.

use crate::engine::error::EngineError;
use crate::engine::positions::Side;

/// Cash-only account, used by the events trader.
#[derive(Debug, Clone)]
pub struct SimpleAccount {
    pub cash: f64,
}

impl SimpleAccount {
    pub fn new(initial_cash: f64) -> Self {
        Self { cash: initial_cash }
    }

    /// Apply a trade's pnl to cash, returning the resulting balance.
    pub fn apply_trade_result(&mut self, pnl: f64) -> f64 {
        self.cash += pnl;
        self.cash
    }
}

/// Futures account: cash plus independent long/short locked margin.
#[derive(Debug, Clone)]
pub struct FuturesAccount {
    pub cash: f64,
    pub long_margin_locked: f64,
    pub short_margin_locked: f64,
}

impl FuturesAccount {
    pub fn new(initial_cash: f64) -> Self {
        Self {
            cash: initial_cash,
            long_margin_locked: 0.0,
            short_margin_locked: 0.0,
        }
    }

    pub fn wallet_balance(&self) -> f64 {
        self.cash + self.long_margin_locked + self.short_margin_locked
    }

    pub fn margin_locked(&self) -> f64 {
        self.long_margin_locked + self.short_margin_locked
    }

    fn check_invariants(&self) {
        debug_assert!(self.cash >= -1e-9, "cash went negative: {}", self.cash);
        debug_assert!(
            self.long_margin_locked >= -1e-9,
            "long_margin_locked went negative: {}",
            self.long_margin_locked
        );
        debug_assert!(
            self.short_margin_locked >= -1e-9,
            "short_margin_locked went negative: {}",
            self.short_margin_locked
        );
    }

    pub fn lock_margin(&mut self, amount: f64, side: Side) -> Result<(), EngineError> {
        if amount > self.cash {
            return Err(EngineError::InsufficientFunds {
                required: amount,
                available: self.cash,
            });
        }
        self.cash -= amount;
        match side {
            Side::Long => self.long_margin_locked += amount,
            Side::Short => self.short_margin_locked += amount,
        }
        self.check_invariants();
        Ok(())
    }

    pub fn release_margin(&mut self, amount: f64, side: Side) {
        match side {
            Side::Long => self.long_margin_locked = (self.long_margin_locked - amount).max(0.0),
            Side::Short => self.short_margin_locked = (self.short_margin_locked - amount).max(0.0),
        }
        self.cash += amount;
        self.check_invariants();
    }

    pub fn apply_fee(&mut self, fee: f64) {
        self.cash -= fee;
        self.check_invariants();
    }

    pub fn apply_pnl(&mut self, pnl: f64) {
        self.cash += pnl;
        self.check_invariants();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn simple_account_applies_trade_result() {
        let mut account = SimpleAccount::new(1000.0);
        let balance = account.apply_trade_result(80.0);
        assert_eq!(balance, 1080.0);
        assert_eq!(account.cash, 1080.0);
    }

    #[test]
    fn lock_margin_rejects_when_insufficient() {
        let mut account = FuturesAccount::new(100.0);
        let err = account.lock_margin(200.0, Side::Long).unwrap_err();
        assert!(matches!(err, EngineError::InsufficientFunds { .. }));
    }

    #[test]
    fn wallet_balance_is_conserved_across_lock_and_release() {
        let mut account = FuturesAccount::new(10000.0);
        account.lock_margin(1000.0, Side::Long).unwrap();
        assert_eq!(account.wallet_balance(), 10000.0);
        account.apply_fee(4.0);
        assert_eq!(account.wallet_balance(), 9996.0);
        account.release_margin(1000.0, Side::Long);
        assert_eq!(account.cash, 8996.0);
        assert_eq!(account.long_margin_locked, 0.0);
    }

    #[test]
    fn independent_margin_buckets() {
        let mut account = FuturesAccount::new(10000.0);
        account.lock_margin(1000.0, Side::Long).unwrap();
        account.lock_margin(500.0, Side::Short).unwrap();
        assert_eq!(account.margin_locked(), 1500.0);
        assert_eq!(account.cash, 8500.0);
    }
}

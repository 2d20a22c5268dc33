//! Signal Resolver
//!
//! Runs after the strategy, before the traders. Filters by confidence,
//! prefers close-family signals when configured, resolves same-direction
//! and opposite-direction conflicts, and drops HOLD whenever a real signal
//! survives.

use crate::engine::context::{Action, Direction, Signal};

#[derive(Debug, Clone)]
pub struct SignalResolver {
    pub min_confidence: f64,
    pub prefer_close_signals: bool,
}

impl Default for SignalResolver {
    fn default() -> Self {
        Self {
            min_confidence: 0.5,
            prefer_close_signals: false,
        }
    }
}

impl SignalResolver {
    pub fn new(min_confidence: f64, prefer_close_signals: bool) -> Self {
        Self {
            min_confidence,
            prefer_close_signals,
        }
    }

    pub fn resolve(&self, signals: Vec<Signal>) -> Vec<Signal> {
        let mut survivors: Vec<Signal> = signals
            .into_iter()
            .filter(|s| s.confidence >= self.min_confidence)
            .collect();
        if survivors.is_empty() {
            return survivors;
        }

        if self.prefer_close_signals {
            let close_signals: Vec<Signal> = survivors
                .iter()
                .filter(|s| s.action.is_close_family())
                .cloned()
                .collect();
            if !close_signals.is_empty() {
                return close_signals;
            }
        }

        survivors.sort_by(|a, b| b.action.priority().cmp(&a.action.priority()));

        let mut long_best: Option<Signal> = None;
        let mut short_best: Option<Signal> = None;
        let mut other: Vec<Signal> = Vec::new();

        for signal in survivors.drain(..) {
            match signal.action.direction_bucket() {
                Some(Direction::Long) => {
                    long_best = Some(keep_higher_confidence(long_best, signal));
                }
                Some(Direction::Short) => {
                    short_best = Some(keep_higher_confidence(short_best, signal));
                }
                None => other.push(signal),
            }
        }

        let mut resolved = Vec::new();
        match (long_best, short_best) {
            (Some(l), Some(s)) => {
                if (l.confidence - s.confidence).abs() < f64::EPSILON {
                    // Equal-confidence opposites cancel; emit nothing from this pair.
                } else if l.confidence > s.confidence {
                    resolved.push(l);
                } else {
                    resolved.push(s);
                }
            }
            (Some(l), None) => resolved.push(l),
            (None, Some(s)) => resolved.push(s),
            (None, None) => {}
        }
        resolved.extend(other);

        let has_non_hold = resolved.iter().any(|s| !s.action.is_hold());
        if has_non_hold {
            resolved.retain(|s| !s.action.is_hold());
        }

        resolved
    }
}

fn keep_higher_confidence(current: Option<Signal>, candidate: Signal) -> Signal {
    match current {
        None => candidate,
        Some(existing) if candidate.confidence > existing.confidence => candidate,
        Some(existing) => existing,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::time::SymbolId;

    fn sig(action: Action, confidence: f64) -> Signal {
        Signal::new(action, SymbolId::normalize("BTC/USDT"), confidence)
    }

    #[test]
    fn equal_confidence_opposites_cancel_and_hold_drops() {
        let resolver = SignalResolver::default();
        let signals = vec![sig(Action::Long, 0.7), sig(Action::Short, 0.7), sig(Action::Hold, 1.0)];
        let resolved = resolver.resolve(signals);
        assert!(resolved.is_empty());
    }

    #[test]
    fn higher_confidence_direction_survives() {
        let resolver = SignalResolver::default();
        let signals = vec![sig(Action::Long, 0.9), sig(Action::Short, 0.7)];
        let resolved = resolver.resolve(signals);
        assert_eq!(resolved.len(), 1);
        assert_eq!(resolved[0].action, Action::Long);
        assert_eq!(resolved[0].confidence, 0.9);
    }

    #[test]
    fn low_confidence_signals_are_dropped() {
        let resolver = SignalResolver::new(0.5, false);
        let signals = vec![sig(Action::Long, 0.3)];
        assert!(resolver.resolve(signals).is_empty());
    }

    #[test]
    fn prefer_close_signals_discards_others_when_present() {
        let resolver = SignalResolver::new(0.5, true);
        let signals = vec![sig(Action::CloseLong, 0.6), sig(Action::Short, 0.9)];
        let resolved = resolver.resolve(signals);
        assert_eq!(resolved.len(), 1);
        assert_eq!(resolved[0].action, Action::CloseLong);
    }

    #[test]
    fn resolver_is_idempotent() {
        let resolver = SignalResolver::default();
        let signals = vec![sig(Action::Long, 0.9), sig(Action::Short, 0.7), sig(Action::Hold, 0.5)];
        let once = resolver.resolve(signals);
        let twice = resolver.resolve(once.clone());
        assert_eq!(once.len(), twice.len());
        for (a, b) in once.iter().zip(twice.iter()) {
            assert_eq!(a.action, b.action);
            assert_eq!(a.confidence, b.confidence);
        }
    }
}

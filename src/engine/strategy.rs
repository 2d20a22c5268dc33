//! Strategy Contract
//!
//! The only contract imposed on user code: identity metadata plus a pure
//! `execute(context) -> result`. The engine guarantees a fresh instance per
//! run but makes no guarantee about instance reuse across ticks, so
//! strategies must not retain cross-tick state that isn't reconstructable
//! from the context.

use crate::engine::context::{DataRequirements, StrategyContext, StrategyResult};
use crate::engine::error::EngineError;
use crate::engine::time::Interval;
use serde_json::Value;
use std::collections::HashMap;

pub trait Strategy: Send {
    fn name(&self) -> &str;
    fn version(&self) -> &str;
    fn tags(&self) -> &[String];

    fn execute(&self, context: &StrategyContext) -> StrategyResult;

    fn get_data_requirements(&self, _interval: Interval, _config: &HashMap<String, Value>) -> DataRequirements {
        DataRequirements::default()
    }

    fn get_config(&self) -> HashMap<String, Value> {
        HashMap::new()
    }
}

pub trait StrategyFactory: Send + Sync {
    fn create(&self) -> Box<dyn Strategy>;
    fn name(&self) -> &str;
}

/// A name-keyed registration table of `StrategyFactory`s, the "registration
/// table populated at artifact build time" the dynamic-strategy-loading
/// design note names as a language-neutral stand-in for runtime module
/// import: a caller picks a strategy by name and gets a fresh instance,
/// never a shared one, on every call to `create`.
#[derive(Default)]
pub struct StrategyRegistry {
    factories: HashMap<String, Box<dyn StrategyFactory>>,
}

impl StrategyRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, factory: Box<dyn StrategyFactory>) {
        self.factories.insert(factory.name().to_string(), factory);
    }

    /// Instantiate a fresh strategy by name. Every call returns a new
    /// instance — the engine guarantees no cross-run state leaks through a
    /// shared strategy object.
    pub fn create(&self, name: &str) -> Result<Box<dyn Strategy>, EngineError> {
        self.factories
            .get(name)
            .map(|f| f.create())
            .ok_or_else(|| {
                let mut available: Vec<&str> = self.factories.keys().map(String::as_str).collect();
                available.sort_unstable();
                EngineError::StrategyLoadError(format!(
                    "unknown strategy '{name}'; available: {}",
                    available.join(", ")
                ))
            })
    }
}

/// How a composite strategy combines sub-strategy result lists.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregationMode {
    /// Majority action wins; ties keep the highest-confidence signal.
    Vote,
    /// First non-HOLD signal across sub-strategies, in order.
    First,
    /// Confidence-weighted merge: every signal survives, weighted by its
    /// source strategy's declared weight.
    Weighted,
}

/// How sub-strategies are invoked within a tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionMode {
    /// Each sub-strategy sees the same context independently.
    Parallel,
    /// Sub-strategies run in order; predecessors may mutate a shared
    /// scratch mapping carried alongside the context.
    Sequential,
}

/// Wraps N sub-strategies and collapses their result lists into one,
/// per §4.F's composite variant.
pub struct CompositeStrategy {
    name: String,
    version: String,
    tags: Vec<String>,
    sub_strategies: Vec<Box<dyn Strategy>>,
    execution_mode: ExecutionMode,
    aggregation_mode: AggregationMode,
}

impl CompositeStrategy {
    pub fn new(
        name: impl Into<String>,
        sub_strategies: Vec<Box<dyn Strategy>>,
        execution_mode: ExecutionMode,
        aggregation_mode: AggregationMode,
    ) -> Self {
        Self {
            name: name.into(),
            version: "1.0.0".into(),
            tags: Vec::new(),
            sub_strategies,
            execution_mode,
            aggregation_mode,
        }
    }

    fn aggregate(&self, results: Vec<StrategyResult>) -> StrategyResult {
        use crate::engine::context::Signal;

        let failed: Vec<&str> = results
            .iter()
            .filter(|r| !r.success)
            .filter_map(|r| r.error_message.as_deref())
            .collect();
        if !failed.is_empty() {
            return StrategyResult::failed(failed.join("; "));
        }

        let all_signals: Vec<Signal> = results.into_iter().flat_map(|r| r.signals).collect();
        match self.aggregation_mode {
            AggregationMode::First => {
                let first_non_hold = all_signals.iter().find(|s| !s.action.is_hold()).cloned();
                StrategyResult::ok(first_non_hold.into_iter().collect())
            }
            AggregationMode::Weighted => StrategyResult::ok(all_signals),
            AggregationMode::Vote => {
                if all_signals.is_empty() {
                    return StrategyResult::ok(Vec::new());
                }
                let mut counts: HashMap<crate::engine::context::Action, usize> = HashMap::new();
                for s in &all_signals {
                    *counts.entry(s.action).or_insert(0) += 1;
                }
                let winner = counts
                    .into_iter()
                    .max_by_key(|(_, count)| *count)
                    .map(|(action, _)| action);
                let kept: Vec<Signal> = match winner {
                    Some(action) => all_signals.into_iter().filter(|s| s.action == action).collect(),
                    None => Vec::new(),
                };
                StrategyResult::ok(kept)
            }
        }
    }
}

impl Strategy for CompositeStrategy {
    fn name(&self) -> &str {
        &self.name
    }

    fn version(&self) -> &str {
        &self.version
    }

    fn tags(&self) -> &[String] {
        &self.tags
    }

    fn execute(&self, context: &StrategyContext) -> StrategyResult {
        let results: Vec<StrategyResult> = match self.execution_mode {
            ExecutionMode::Parallel => self
                .sub_strategies
                .iter()
                .map(|s| s.execute(context))
                .collect(),
            ExecutionMode::Sequential => {
                // Sub-strategies still see an immutable `&StrategyContext`,
                // but `context.metadata` is a `RefCell` scratch map they may
                // read and write in turn: an earlier sub-strategy leaves a
                // note (e.g. "already opened a position this bar") for a
                // later one. Clear it before the run so no state leaks in
                // from a previous tick or a previous composite call.
                context.metadata.borrow_mut().clear();
                self.sub_strategies
                    .iter()
                    .map(|s| s.execute(context))
                    .collect()
            }
        };
        self.aggregate(results)
    }
}

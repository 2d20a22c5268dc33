//! Indicator Precompute
//!
//! Technical-indicator math proper is an external collaborator (a vendor
//! indicator library, in production); this module is the precompute stage
//! that owns the *contract* — a closed, per-run registry of named
//! functions producing arrays aligned 1:1 with `close`, warm-up entries
//! padded with `NAN` until each indicator's minimum sample count is met.

use std::collections::HashMap;

/// One indicator specification: a registry key plus its parameters.
#[derive(Debug, Clone)]
pub struct IndicatorSpec {
    pub name: String,
    pub params: HashMap<String, f64>,
}

impl IndicatorSpec {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            params: HashMap::new(),
        }
    }

    pub fn with_param(mut self, key: impl Into<String>, value: f64) -> Self {
        self.params.insert(key.into(), value);
        self
    }

    fn period(&self, default: usize) -> usize {
        self.params
            .get("period")
            .copied()
            .map(|p| p.max(1.0) as usize)
            .unwrap_or(default)
    }
}

/// A registered indicator function: closes in, an aligned array out.
pub trait IndicatorFn: Send + Sync {
    fn compute(&self, close: &[f64], spec: &IndicatorSpec) -> Vec<f64>;
}

struct Sma;

impl IndicatorFn for Sma {
    fn compute(&self, close: &[f64], spec: &IndicatorSpec) -> Vec<f64> {
        let period = spec.period(14);
        let mut out = vec![f64::NAN; close.len()];
        if period == 0 || close.len() < period {
            return out;
        }
        let mut window_sum: f64 = close[..period].iter().sum();
        out[period - 1] = window_sum / period as f64;
        for i in period..close.len() {
            window_sum += close[i] - close[i - period];
            out[i] = window_sum / period as f64;
        }
        out
    }
}

struct Ema;

impl IndicatorFn for Ema {
    fn compute(&self, close: &[f64], spec: &IndicatorSpec) -> Vec<f64> {
        let period = spec.period(14);
        let mut out = vec![f64::NAN; close.len()];
        if period == 0 || close.len() < period {
            return out;
        }
        let alpha = 2.0 / (period as f64 + 1.0);
        let seed: f64 = close[..period].iter().sum::<f64>() / period as f64;
        out[period - 1] = seed;
        let mut prev = seed;
        for i in period..close.len() {
            let value = alpha * close[i] + (1.0 - alpha) * prev;
            out[i] = value;
            prev = value;
        }
        out
    }
}

/// Closed-per-run registry of indicator functions and the arrays they
/// produce for a given OHLCV window.
pub struct IndicatorEngine {
    specs: Vec<IndicatorSpec>,
    registry: HashMap<&'static str, Box<dyn IndicatorFn>>,
}

impl IndicatorEngine {
    pub fn new(specs: Vec<IndicatorSpec>) -> Self {
        let mut registry: HashMap<&'static str, Box<dyn IndicatorFn>> = HashMap::new();
        registry.insert("sma", Box::new(Sma));
        registry.insert("ema", Box::new(Ema));
        Self { specs, registry }
    }

    /// Compute every configured indicator against `close`, keyed by each
    /// spec's name (e.g. `sma_20`). Unknown indicator names are skipped and
    /// logged, not fatal — a strategy referencing one simply sees no array.
    pub fn compute_all(&self, close: &[f64]) -> HashMap<String, Vec<f64>> {
        let mut out = HashMap::with_capacity(self.specs.len());
        for spec in &self.specs {
            match self.registry.get(spec.name.as_str()) {
                Some(f) => {
                    let key = spec
                        .params
                        .get("period")
                        .map(|p| format!("{}_{}", spec.name, *p as usize))
                        .unwrap_or_else(|| spec.name.clone());
                    out.insert(key, f.compute(close, spec));
                }
                None => {
                    tracing::warn!(indicator = %spec.name, "no registered indicator function, skipping");
                }
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sma_pads_warmup_with_nan() {
        let close = vec![1.0, 2.0, 3.0, 4.0, 5.0];
        let spec = IndicatorSpec::new("sma").with_param("period", 3.0);
        let out = Sma.compute(&close, &spec);
        assert!(out[0].is_nan());
        assert!(out[1].is_nan());
        assert_eq!(out[2], 2.0);
        assert_eq!(out[3], 3.0);
        assert_eq!(out[4], 4.0);
    }

    #[test]
    fn ema_seeds_from_sma_then_recurses() {
        let close = vec![10.0, 11.0, 12.0, 13.0, 14.0];
        let spec = IndicatorSpec::new("ema").with_param("period", 2.0);
        let out = Ema.compute(&close, &spec);
        assert!(out[0].is_nan());
        assert!((out[1] - 10.5).abs() < 1e-9);
    }

    #[test]
    fn engine_aligns_output_to_close_length_and_skips_unknown() {
        let close = vec![1.0, 2.0, 3.0, 4.0];
        let engine = IndicatorEngine::new(vec![
            IndicatorSpec::new("sma").with_param("period", 2.0),
            IndicatorSpec::new("bogus"),
        ]);
        let computed = engine.compute_all(&close);
        assert_eq!(computed.len(), 1);
        assert_eq!(computed["sma_2"].len(), close.len());
    }
}

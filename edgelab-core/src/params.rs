//! Calculation parameters: the immutable, versioned, content-hashed configuration
//! of the whole pipeline.
//!
//! - `CalculationParameters`: every tunable, validated at construction.
//! - `ParameterOverrides`: flat partial record used to derive a new instance.
//! - `ParamsHash`: BLAKE3 digest over canonical (sorted-key) JSON of the fields.
//!
//! Two instances with equal fields always hash equal; any field change changes
//! the hash. Nothing here reads the clock or the environment.

use crate::domain::ParamsHash;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Schema version of the parameter record. Part of the hash.
pub const PARAMS_VERSION: u32 = 1;

/// Upper bound on bootstrap iterations (overall iteration budget).
pub const MAX_BOOTSTRAP_ITERATIONS: usize = 1_000_000;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParamsError {
    #[error("invalid parameter '{field}': {reason}")]
    InvalidParameters { field: &'static str, reason: String },
}

impl ParamsError {
    fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidParameters {
            field,
            reason: reason.into(),
        }
    }
}

// ── Field groups ─────────────────────────────────────────────────────

/// Lookback windows. Changing any of these changes the derived indicator tables.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LookbackWindows {
    /// RSI period of the default indicator.
    pub indicator_period: usize,
    /// Moving-average period applied on top of the RSI.
    pub smoothing_period: usize,
    pub percentile_window: usize,
    /// SMA of close used to classify the regime of each bar.
    pub regime_window: usize,
    /// Trailing bars used by the robust stop-loss estimate.
    pub construction_window: usize,
    pub atr_period: usize,
}

impl Default for LookbackWindows {
    fn default() -> Self {
        Self {
            indicator_period: 14,
            smoothing_period: 14,
            percentile_window: 252,
            regime_window: 50,
            construction_window: 20,
            atr_period: 14,
        }
    }
}

/// Percentile thresholds: `entry < exit < dead_zone`, all in `[0, 100]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Thresholds {
    pub entry: f64,
    pub exit: f64,
    pub dead_zone: f64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            entry: 15.0,
            exit: 50.0,
            dead_zone: 85.0,
        }
    }
}

/// How the stop-loss distance is computed at entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "method", rename_all = "snake_case")]
pub enum StopLossMethod {
    /// `multiplier × |(1 − confidence) quantile of trailing returns| × entry price`.
    Robust { multiplier: f64, confidence: f64 },
    /// `multiplier × ATR` at the entry bar.
    Atr { multiplier: f64 },
    /// `percent` of the entry price.
    Fixed { percent: f64 },
}

impl StopLossMethod {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Robust { .. } => "robust",
            Self::Atr { .. } => "atr",
            Self::Fixed { .. } => "fixed",
        }
    }
}

impl Default for StopLossMethod {
    fn default() -> Self {
        Self::Robust {
            multiplier: 1.5,
            confidence: 0.95,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BootstrapSettings {
    pub iterations: usize,
    pub seed: u64,
    pub confidence_level: f64,
    pub block_size: usize,
}

impl Default for BootstrapSettings {
    fn default() -> Self {
        Self {
            iterations: 1000,
            seed: 42,
            confidence_level: 0.95,
            block_size: 5,
        }
    }
}

/// Trade-construction rules. Holding periods are counted in bars.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeRules {
    pub allow_overlap: bool,
    pub allow_same_day_reentry: bool,
    /// Percentile-driven exits are suppressed until this many bars are held.
    pub min_holding_period: usize,
    pub max_holding_period: usize,
    /// Whether a position still open at the end of the series counts toward statistics.
    pub include_truncated: bool,
}

impl Default for TradeRules {
    fn default() -> Self {
        Self {
            allow_overlap: false,
            allow_same_day_reentry: false,
            min_holding_period: 1,
            max_holding_period: 20,
            include_truncated: false,
        }
    }
}

/// Weights of the composite score. Non-negative, conventionally summing to 1.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskWeights {
    pub expectancy: f64,
    pub win_rate: f64,
    pub time_efficiency: f64,
    pub risk_efficiency: f64,
    pub ci_lower: f64,
}

impl Default for RiskWeights {
    fn default() -> Self {
        Self {
            expectancy: 0.4,
            win_rate: 0.2,
            time_efficiency: 0.1,
            risk_efficiency: 0.1,
            ci_lower: 0.2,
        }
    }
}

// ── CalculationParameters ────────────────────────────────────────────

/// Complete, immutable configuration of the analytics pipeline.
///
/// Fully determined by its field values. Construct through `new`, `default`
/// or `with_overrides`; all three validate, and so does deserialization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "UncheckedParameters")]
pub struct CalculationParameters {
    pub version: u32,
    pub windows: LookbackWindows,
    pub thresholds: Thresholds,
    pub stop_loss: StopLossMethod,
    pub bootstrap: BootstrapSettings,
    pub rules: TradeRules,
    pub weights: RiskWeights,
}

/// Wire shape of `CalculationParameters` before validation.
#[derive(Deserialize)]
struct UncheckedParameters {
    version: u32,
    windows: LookbackWindows,
    thresholds: Thresholds,
    stop_loss: StopLossMethod,
    bootstrap: BootstrapSettings,
    rules: TradeRules,
    weights: RiskWeights,
}

impl TryFrom<UncheckedParameters> for CalculationParameters {
    type Error = ParamsError;

    fn try_from(raw: UncheckedParameters) -> Result<Self, Self::Error> {
        let params = Self {
            version: raw.version,
            windows: raw.windows,
            thresholds: raw.thresholds,
            stop_loss: raw.stop_loss,
            bootstrap: raw.bootstrap,
            rules: raw.rules,
            weights: raw.weights,
        };
        params.validate()?;
        Ok(params)
    }
}

impl Default for CalculationParameters {
    fn default() -> Self {
        Self {
            version: PARAMS_VERSION,
            windows: LookbackWindows::default(),
            thresholds: Thresholds::default(),
            stop_loss: StopLossMethod::default(),
            bootstrap: BootstrapSettings::default(),
            rules: TradeRules::default(),
            weights: RiskWeights::default(),
        }
    }
}

impl CalculationParameters {
    pub fn new(
        windows: LookbackWindows,
        thresholds: Thresholds,
        stop_loss: StopLossMethod,
        bootstrap: BootstrapSettings,
        rules: TradeRules,
        weights: RiskWeights,
    ) -> Result<Self, ParamsError> {
        let params = Self {
            version: PARAMS_VERSION,
            windows,
            thresholds,
            stop_loss,
            bootstrap,
            rules,
            weights,
        };
        params.validate()?;
        Ok(params)
    }

    /// Check every range and cross-field constraint.
    pub fn validate(&self) -> Result<(), ParamsError> {
        if self.version != PARAMS_VERSION {
            return Err(ParamsError::invalid(
                "version",
                format!("unsupported version {} (expected {PARAMS_VERSION})", self.version),
            ));
        }

        let w = &self.windows;
        for (field, value) in [
            ("indicator_period", w.indicator_period),
            ("smoothing_period", w.smoothing_period),
            ("regime_window", w.regime_window),
            ("construction_window", w.construction_window),
            ("atr_period", w.atr_period),
        ] {
            if value == 0 {
                return Err(ParamsError::invalid(field, "must be >= 1"));
            }
        }
        if w.percentile_window < 2 {
            return Err(ParamsError::invalid("percentile_window", "must be >= 2"));
        }

        let t = &self.thresholds;
        for (field, value) in [
            ("entry_threshold", t.entry),
            ("exit_threshold", t.exit),
            ("dead_zone_threshold", t.dead_zone),
        ] {
            if !value.is_finite() || !(0.0..=100.0).contains(&value) {
                return Err(ParamsError::invalid(field, format!("{value} not in [0, 100]")));
            }
        }
        if t.entry >= t.exit {
            return Err(ParamsError::invalid(
                "entry_threshold",
                format!("entry {} must be below exit {}", t.entry, t.exit),
            ));
        }
        if t.dead_zone <= t.exit {
            return Err(ParamsError::invalid(
                "dead_zone_threshold",
                format!("dead zone {} must be above exit {}", t.dead_zone, t.exit),
            ));
        }

        match &self.stop_loss {
            StopLossMethod::Robust {
                multiplier,
                confidence,
            } => {
                check_positive("stop_multiplier", *multiplier)?;
                check_open_unit("stop_confidence", *confidence)?;
            }
            StopLossMethod::Atr { multiplier } => check_positive("stop_multiplier", *multiplier)?,
            StopLossMethod::Fixed { percent } => check_positive("stop_percent", *percent)?,
        }

        let b = &self.bootstrap;
        if b.iterations == 0 || b.iterations > MAX_BOOTSTRAP_ITERATIONS {
            return Err(ParamsError::invalid(
                "bootstrap_iterations",
                format!("{} not in [1, {MAX_BOOTSTRAP_ITERATIONS}]", b.iterations),
            ));
        }
        check_open_unit("confidence_level", b.confidence_level)?;
        if b.block_size == 0 {
            return Err(ParamsError::invalid("block_size", "must be >= 1"));
        }

        let r = &self.rules;
        if r.max_holding_period == 0 {
            return Err(ParamsError::invalid("max_holding_period", "must be >= 1"));
        }
        if r.min_holding_period > r.max_holding_period {
            return Err(ParamsError::invalid(
                "min_holding_period",
                format!(
                    "min {} exceeds max {}",
                    r.min_holding_period, r.max_holding_period
                ),
            ));
        }

        let wt = &self.weights;
        for (field, value) in [
            ("weight_expectancy", wt.expectancy),
            ("weight_win_rate", wt.win_rate),
            ("weight_time_efficiency", wt.time_efficiency),
            ("weight_risk_efficiency", wt.risk_efficiency),
            ("weight_ci_lower", wt.ci_lower),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(ParamsError::invalid(field, format!("{value} must be >= 0")));
            }
        }

        Ok(())
    }

    /// Return a new validated instance with the given overrides applied.
    ///
    /// `self` is never modified. Overrides are applied in a fixed order, so the
    /// result only depends on which fields are set.
    pub fn with_overrides(&self, o: &ParameterOverrides) -> Result<Self, ParamsError> {
        let mut p = self.clone();

        set(&mut p.windows.indicator_period, o.indicator_period);
        set(&mut p.windows.smoothing_period, o.smoothing_period);
        set(&mut p.windows.percentile_window, o.percentile_window);
        set(&mut p.windows.regime_window, o.regime_window);
        set(&mut p.windows.construction_window, o.construction_window);
        set(&mut p.windows.atr_period, o.atr_period);

        set(&mut p.thresholds.entry, o.entry_threshold);
        set(&mut p.thresholds.exit, o.exit_threshold);
        set(&mut p.thresholds.dead_zone, o.dead_zone_threshold);

        if let Some(method) = &o.stop_loss {
            p.stop_loss = method.clone();
        }

        set(&mut p.bootstrap.iterations, o.bootstrap_iterations);
        set(&mut p.bootstrap.seed, o.seed);
        set(&mut p.bootstrap.confidence_level, o.confidence_level);
        set(&mut p.bootstrap.block_size, o.block_size);

        set(&mut p.rules.allow_overlap, o.allow_overlap);
        set(&mut p.rules.allow_same_day_reentry, o.allow_same_day_reentry);
        set(&mut p.rules.min_holding_period, o.min_holding_period);
        set(&mut p.rules.max_holding_period, o.max_holding_period);
        set(&mut p.rules.include_truncated, o.include_truncated);

        if let Some(weights) = &o.weights {
            p.weights = weights.clone();
        }

        p.validate()?;
        Ok(p)
    }

    /// Stable content hash of every field value.
    pub fn compute_hash(&self) -> ParamsHash {
        let canonical = self.canonical_json();
        ParamsHash::from_bytes(canonical.as_bytes())
    }

    /// Canonical serialization: recursively sorted keys, no whitespace,
    /// negative zero folded to zero.
    pub fn canonical_json(&self) -> String {
        // Serializing plain structs and enums with f64/usize/bool fields cannot fail.
        let value = serde_json::to_value(self).unwrap_or(Value::Null);
        let mut out = String::new();
        write_canonical(&value, &mut out);
        out
    }
}

/// Flat partial record of parameter overrides.
///
/// Deserializable from TOML or JSON; every field is optional.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ParameterOverrides {
    pub indicator_period: Option<usize>,
    pub smoothing_period: Option<usize>,
    pub percentile_window: Option<usize>,
    pub regime_window: Option<usize>,
    pub construction_window: Option<usize>,
    pub atr_period: Option<usize>,

    pub entry_threshold: Option<f64>,
    pub exit_threshold: Option<f64>,
    pub dead_zone_threshold: Option<f64>,

    pub stop_loss: Option<StopLossMethod>,

    pub bootstrap_iterations: Option<usize>,
    pub seed: Option<u64>,
    pub confidence_level: Option<f64>,
    pub block_size: Option<usize>,

    pub allow_overlap: Option<bool>,
    pub allow_same_day_reentry: Option<bool>,
    pub min_holding_period: Option<usize>,
    pub max_holding_period: Option<usize>,
    pub include_truncated: Option<bool>,

    pub weights: Option<RiskWeights>,
}

impl ParameterOverrides {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Name of the first override that would change the indicator tables.
    ///
    /// Such overrides need a new snapshot; they cannot be applied to an existing one.
    pub fn indicator_table_field(&self) -> Option<&'static str> {
        [
            ("indicator_period", self.indicator_period.is_some()),
            ("smoothing_period", self.smoothing_period.is_some()),
            ("percentile_window", self.percentile_window.is_some()),
            ("regime_window", self.regime_window.is_some()),
            ("construction_window", self.construction_window.is_some()),
            ("atr_period", self.atr_period.is_some()),
        ]
        .into_iter()
        .find_map(|(field, set)| set.then_some(field))
    }
}

// ── Helpers ──────────────────────────────────────────────────────────

fn set<T>(slot: &mut T, value: Option<T>) {
    if let Some(v) = value {
        *slot = v;
    }
}

fn check_positive(field: &'static str, value: f64) -> Result<(), ParamsError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(ParamsError::invalid(field, format!("{value} must be > 0")))
    }
}

fn check_open_unit(field: &'static str, value: f64) -> Result<(), ParamsError> {
    if value.is_finite() && value > 0.0 && value < 1.0 {
        Ok(())
    } else {
        Err(ParamsError::invalid(field, format!("{value} not in (0, 1)")))
    }
}

fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            out.push('{');
            for (i, key) in keys.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&Value::String((*key).clone()).to_string());
                out.push(':');
                write_canonical(&map[key.as_str()], out);
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        Value::Number(n) => match n.as_f64() {
            Some(f) if f == 0.0 && n.is_f64() => out.push_str("0.0"),
            _ => out.push_str(&n.to_string()),
        },
        other => out.push_str(&other.to_string()),
    }
}

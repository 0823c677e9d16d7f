//! Rule-set data model and validation
//!
//! Rule sets arrive from external collaborators (the prompt parser or a
//! preset store) as JSON documents. Everything here is plain serde data;
//! the engine only runs rule sets that passed [`validate_rule_set`].

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Which candle field feeds a source-based indicator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PriceSource {
    Open,
    High,
    Low,
    Close,
    Volume,
}

impl PriceSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            PriceSource::Open => "open",
            PriceSource::High => "high",
            PriceSource::Low => "low",
            PriceSource::Close => "close",
            PriceSource::Volume => "volume",
        }
    }
}

/// All supported indicator types, including direct candle-field reads and
/// the two position-scope types resolved from the open position at
/// evaluation time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IndicatorKind {
    PriceClose,
    PriceOpen,
    PriceHigh,
    PriceLow,
    Volume,
    Sma,
    Ema,
    Rsi,
    MacdLine,
    MacdSignal,
    MacdHist,
    BbUpper,
    BbMiddle,
    BbLower,
    Atr,
    PctChange,
    PnlPct,
    BarsInTrade,
}

impl IndicatorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            IndicatorKind::PriceClose => "price_close",
            IndicatorKind::PriceOpen => "price_open",
            IndicatorKind::PriceHigh => "price_high",
            IndicatorKind::PriceLow => "price_low",
            IndicatorKind::Volume => "volume",
            IndicatorKind::Sma => "sma",
            IndicatorKind::Ema => "ema",
            IndicatorKind::Rsi => "rsi",
            IndicatorKind::MacdLine => "macd_line",
            IndicatorKind::MacdSignal => "macd_signal",
            IndicatorKind::MacdHist => "macd_hist",
            IndicatorKind::BbUpper => "bb_upper",
            IndicatorKind::BbMiddle => "bb_middle",
            IndicatorKind::BbLower => "bb_lower",
            IndicatorKind::Atr => "atr",
            IndicatorKind::PctChange => "pct_change",
            IndicatorKind::PnlPct => "pnl_pct",
            IndicatorKind::BarsInTrade => "bars_in_trade",
        }
    }
}

/// One indicator computation. Parameters are optional in the document;
/// effective values come from per-kind defaults (see the accessor methods).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndicatorSpec {
    #[serde(rename = "type")]
    pub kind: IndicatorKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub period: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fast_period: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub slow_period: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signal_period: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub std_dev: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<PriceSource>,
}

impl IndicatorSpec {
    pub fn bare(kind: IndicatorKind) -> Self {
        Self {
            kind,
            period: None,
            fast_period: None,
            slow_period: None,
            signal_period: None,
            std_dev: None,
            source: None,
        }
    }

    pub fn with_period(kind: IndicatorKind, period: usize) -> Self {
        Self {
            period: Some(period),
            ..Self::bare(kind)
        }
    }

    pub fn macd(kind: IndicatorKind, fast: usize, slow: usize, signal: usize) -> Self {
        Self {
            fast_period: Some(fast),
            slow_period: Some(slow),
            signal_period: Some(signal),
            ..Self::bare(kind)
        }
    }

    pub fn bollinger(kind: IndicatorKind, period: usize, std_dev: f64) -> Self {
        Self {
            period: Some(period),
            std_dev: Some(std_dev),
            ..Self::bare(kind)
        }
    }

    /// Defined only while a position is open; resolved at evaluation time,
    /// never pre-cached.
    pub fn is_position_scope(&self) -> bool {
        matches!(
            self.kind,
            IndicatorKind::PnlPct | IndicatorKind::BarsInTrade
        )
    }

    /// Read straight off the candle, no computation.
    pub fn is_candle_field(&self) -> bool {
        matches!(
            self.kind,
            IndicatorKind::PriceClose
                | IndicatorKind::PriceOpen
                | IndicatorKind::PriceHigh
                | IndicatorKind::PriceLow
                | IndicatorKind::Volume
        )
    }

    /// Whether this spec participates in the pre-computation pass.
    pub fn is_cacheable(&self) -> bool {
        !self.is_position_scope() && !self.is_candle_field()
    }

    /// Effective lookback period for single-period indicators.
    pub fn effective_period(&self) -> usize {
        self.period.unwrap_or(match self.kind {
            IndicatorKind::Rsi | IndicatorKind::Atr => 14,
            IndicatorKind::PctChange => 1,
            _ => 20,
        })
    }

    pub fn effective_fast(&self) -> usize {
        self.fast_period.unwrap_or(12)
    }

    pub fn effective_slow(&self) -> usize {
        self.slow_period.unwrap_or(26)
    }

    pub fn effective_signal(&self) -> usize {
        self.signal_period.unwrap_or(9)
    }

    pub fn effective_std_dev(&self) -> f64 {
        self.std_dev.unwrap_or(2.0)
    }

    pub fn effective_source(&self) -> PriceSource {
        self.source.unwrap_or(PriceSource::Close)
    }

    /// Canonical cache key: the kind followed by the effective parameters
    /// the computation actually depends on, in fixed order (period, fast,
    /// slow, signal, std_dev, source). Structurally equivalent specs
    /// collide on this key.
    pub fn cache_key(&self) -> String {
        let mut key = self.kind.as_str().to_string();
        match self.kind {
            IndicatorKind::Sma
            | IndicatorKind::Ema
            | IndicatorKind::Rsi
            | IndicatorKind::PctChange => {
                key.push_str(&format!(
                    "_{}_{}",
                    self.effective_period(),
                    self.effective_source().as_str()
                ));
            }
            IndicatorKind::MacdLine => {
                key.push_str(&format!(
                    "_{}_{}_{}",
                    self.effective_fast(),
                    self.effective_slow(),
                    self.effective_source().as_str()
                ));
            }
            IndicatorKind::MacdSignal | IndicatorKind::MacdHist => {
                key.push_str(&format!(
                    "_{}_{}_{}_{}",
                    self.effective_fast(),
                    self.effective_slow(),
                    self.effective_signal(),
                    self.effective_source().as_str()
                ));
            }
            IndicatorKind::BbUpper | IndicatorKind::BbLower => {
                key.push_str(&format!(
                    "_{}_{:.2}_{}",
                    self.effective_period(),
                    self.effective_std_dev(),
                    self.effective_source().as_str()
                ));
            }
            IndicatorKind::BbMiddle => {
                key.push_str(&format!(
                    "_{}_{}",
                    self.effective_period(),
                    self.effective_source().as_str()
                ));
            }
            IndicatorKind::Atr => {
                key.push_str(&format!("_{}", self.effective_period()));
            }
            // Candle fields and position-scope types carry no parameters.
            _ => {}
        }
        key
    }
}

/// One side of a condition comparison.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Operand {
    Indicator { spec: IndicatorSpec },
    Number { value: f64 },
}

impl Operand {
    pub fn indicator(spec: IndicatorSpec) -> Self {
        Operand::Indicator { spec }
    }

    pub fn number(value: f64) -> Self {
        Operand::Number { value }
    }

    pub fn spec(&self) -> Option<&IndicatorSpec> {
        match self {
            Operand::Indicator { spec } => Some(spec),
            Operand::Number { .. } => None,
        }
    }
}

/// Comparison operators. The cross variants consult index `i-1`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompareOp {
    Lt,
    Lte,
    Gt,
    Gte,
    Eq,
    CrossesAbove,
    CrossesBelow,
}

impl CompareOp {
    pub fn is_cross(&self) -> bool {
        matches!(self, CompareOp::CrossesAbove | CompareOp::CrossesBelow)
    }
}

/// Evaluation scope. `Position` conditions short-circuit to false while no
/// position is open.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConditionScope {
    #[default]
    Candle,
    Position,
}

/// A single rule: left [op] right.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Condition {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub scope: ConditionScope,
    pub left: Operand,
    pub op: CompareOp,
    pub right: Operand,
}

/// Logical connector for a condition group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GroupOp {
    #[serde(rename = "AND")]
    And,
    #[serde(rename = "OR")]
    Or,
}

/// An ordered list of conditions joined by one logical operator.
/// Empty `AND` is true, empty `OR` is false.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConditionGroup {
    pub op: GroupOp,
    #[serde(default)]
    pub conditions: Vec<Condition>,
}

impl ConditionGroup {
    pub fn empty_and() -> Self {
        Self {
            op: GroupOp::And,
            conditions: Vec::new(),
        }
    }

    pub fn empty_or() -> Self {
        Self {
            op: GroupOp::Or,
            conditions: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }
}

/// Signal-driven trading or periodic dollar-cost averaging.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StrategyMode {
    Standard,
    Dca { interval_days: u32, amount_usd: f64 },
}

/// How much capital each entry commits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PositionSizing {
    PercentEquity { pct: f64 },
    FixedAmount { usd: f64 },
}

/// A complete strategy rule set as produced by the prompt parser or a
/// preset store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategyRuleSet {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub mode: StrategyMode,
    pub entry: ConditionGroup,
    pub exit: ConditionGroup,
    pub sizing: PositionSizing,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
}

/// Configuration for a single backtest run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BacktestConfig {
    pub asset: String,
    pub timeframe: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub initial_capital: f64,
    pub fee_bps: f64,
    pub slippage_bps: f64,
    pub rules: StrategyRuleSet,
}

// =============================================================================
// Validation
// =============================================================================

/// Semantic violations that reject a rule set as a whole.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RuleSetError {
    #[error("standard mode requires at least one entry condition")]
    EmptyEntryConditions,

    #[error("dca mode does not allow {group} conditions")]
    DcaConditionsNotAllowed { group: String },

    #[error("dca interval_days must be >= 1")]
    DcaInvalidInterval,

    #[error("dca amount_usd must be > 0, got {0}")]
    DcaInvalidAmount(f64),

    #[error("condition '{condition_id}': {op} requires indicator operands on both sides")]
    CrossRequiresIndicators { condition_id: String, op: String },

    #[error("condition '{condition_id}': position scope requires a position-scope indicator operand")]
    PositionScopeWithoutPositionIndicator { condition_id: String },

    #[error("condition '{condition_id}': {param} must be positive")]
    NonPositiveParameter {
        condition_id: String,
        param: String,
    },

    #[error("percent_equity pct must be within [1, 100], got {0}")]
    SizingPctOutOfRange(f64),

    #[error("fixed_amount usd must be > 0, got {0}")]
    SizingAmountNotPositive(f64),

    #[error("initial_capital must be > 0, got {0}")]
    InitialCapitalNotPositive(f64),

    #[error("fee_bps must be >= 0, got {0}")]
    NegativeFeeBps(f64),

    #[error("slippage_bps must be >= 0, got {0}")]
    NegativeSlippageBps(f64),

    #[error("start_date {start} is after end_date {end}")]
    StartAfterEnd { start: NaiveDate, end: NaiveDate },
}

/// Result of rule-set validation. Errors reject the rule set as a whole;
/// warnings do not block execution.
#[derive(Debug, Default)]
pub struct ValidationReport {
    pub errors: Vec<RuleSetError>,
    pub warnings: Vec<String>,
}

impl ValidationReport {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn log(&self) {
        for error in &self.errors {
            tracing::error!("Rule-set validation error: {}", error);
        }
        for warning in &self.warnings {
            tracing::warn!("Rule-set validation warning: {}", warning);
        }
    }
}

pub const NO_EXIT_WARNING: &str =
    "no exit conditions — positions will be held until end of data";

fn check_spec_params(
    spec: &IndicatorSpec,
    condition_id: &str,
    errors: &mut Vec<RuleSetError>,
) {
    let positive = |name: &str, value: Option<usize>, errors: &mut Vec<RuleSetError>| {
        if value == Some(0) {
            errors.push(RuleSetError::NonPositiveParameter {
                condition_id: condition_id.to_string(),
                param: name.to_string(),
            });
        }
    };
    positive("period", spec.period, errors);
    positive("fast_period", spec.fast_period, errors);
    positive("slow_period", spec.slow_period, errors);
    positive("signal_period", spec.signal_period, errors);
    if let Some(sd) = spec.std_dev {
        if sd <= 0.0 {
            errors.push(RuleSetError::NonPositiveParameter {
                condition_id: condition_id.to_string(),
                param: "std_dev".to_string(),
            });
        }
    }
}

fn validate_group(group: &ConditionGroup, report: &mut ValidationReport) {
    for condition in &group.conditions {
        let operands = [&condition.left, &condition.right];

        if condition.op.is_cross() && operands.iter().any(|o| o.spec().is_none()) {
            report.errors.push(RuleSetError::CrossRequiresIndicators {
                condition_id: condition.id.clone(),
                op: match condition.op {
                    CompareOp::CrossesAbove => "crosses_above".to_string(),
                    _ => "crosses_below".to_string(),
                },
            });
        }

        if condition.scope == ConditionScope::Position
            && !operands
                .iter()
                .any(|o| o.spec().is_some_and(|s| s.is_position_scope()))
        {
            report
                .errors
                .push(RuleSetError::PositionScopeWithoutPositionIndicator {
                    condition_id: condition.id.clone(),
                });
        }

        for operand in operands {
            if let Some(spec) = operand.spec() {
                check_spec_params(spec, &condition.id, &mut report.errors);
            }
        }
    }
}

/// Validate a rule set against the schema invariants. Structural typing is
/// already guaranteed by deserialization; this checks the semantic rules.
pub fn validate_rule_set(rules: &StrategyRuleSet) -> ValidationReport {
    let mut report = ValidationReport::default();

    match &rules.mode {
        StrategyMode::Standard => {
            if rules.entry.is_empty() {
                report.errors.push(RuleSetError::EmptyEntryConditions);
            }
            if rules.exit.is_empty() {
                report.warnings.push(NO_EXIT_WARNING.to_string());
            }
        }
        StrategyMode::Dca {
            interval_days,
            amount_usd,
        } => {
            if !rules.entry.is_empty() {
                report.errors.push(RuleSetError::DcaConditionsNotAllowed {
                    group: "entry".to_string(),
                });
            }
            if !rules.exit.is_empty() {
                report.errors.push(RuleSetError::DcaConditionsNotAllowed {
                    group: "exit".to_string(),
                });
            }
            if *interval_days < 1 {
                report.errors.push(RuleSetError::DcaInvalidInterval);
            }
            if *amount_usd <= 0.0 {
                report
                    .errors
                    .push(RuleSetError::DcaInvalidAmount(*amount_usd));
            }
        }
    }

    validate_group(&rules.entry, &mut report);
    validate_group(&rules.exit, &mut report);

    match rules.sizing {
        PositionSizing::PercentEquity { pct } => {
            if !(1.0..=100.0).contains(&pct) {
                report.errors.push(RuleSetError::SizingPctOutOfRange(pct));
            }
        }
        PositionSizing::FixedAmount { usd } => {
            if usd <= 0.0 {
                report.errors.push(RuleSetError::SizingAmountNotPositive(usd));
            }
        }
    }

    report
}

/// Validate a full backtest configuration: the embedded rule set plus the
/// run parameters.
pub fn validate_config(config: &BacktestConfig) -> ValidationReport {
    let mut report = validate_rule_set(&config.rules);

    if config.initial_capital <= 0.0 {
        report
            .errors
            .push(RuleSetError::InitialCapitalNotPositive(
                config.initial_capital,
            ));
    }
    if config.fee_bps < 0.0 {
        report.errors.push(RuleSetError::NegativeFeeBps(config.fee_bps));
    }
    if config.slippage_bps < 0.0 {
        report
            .errors
            .push(RuleSetError::NegativeSlippageBps(config.slippage_bps));
    }
    if config.start_date > config.end_date {
        report.errors.push(RuleSetError::StartAfterEnd {
            start: config.start_date,
            end: config.end_date,
        });
    }

    report
}

/// Attach validation warnings to the rule set's metadata under a
/// `"warnings"` key so they travel with the document.
pub fn attach_warnings(rules: &mut StrategyRuleSet, report: &ValidationReport) {
    if report.warnings.is_empty() {
        return;
    }
    let warnings = serde_json::json!(report.warnings);
    match &mut rules.metadata {
        Some(serde_json::Value::Object(map)) => {
            map.insert("warnings".to_string(), warnings);
        }
        _ => {
            rules.metadata = Some(serde_json::json!({ "warnings": warnings }));
        }
    }
}

// =============================================================================
// Share codes
// =============================================================================

/// Failures when decoding a shared rule set.
#[derive(Debug, Error)]
pub enum ShareCodeError {
    #[error("invalid base64: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("invalid rule-set JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("decoded rule set failed validation: {0:?}")]
    Invalid(Vec<RuleSetError>),
}

/// Encode a rule set as a URL-safe share string (base64 over JSON).
pub fn encode_share_code(rules: &StrategyRuleSet) -> String {
    let json = serde_json::to_vec(rules).expect("rule set serializes");
    URL_SAFE_NO_PAD.encode(json)
}

/// Decode and validate a share string produced by [`encode_share_code`].
pub fn decode_share_code(code: &str) -> Result<StrategyRuleSet, ShareCodeError> {
    let json = URL_SAFE_NO_PAD.decode(code.trim())?;
    let rules: StrategyRuleSet = serde_json::from_slice(&json)?;
    let report = validate_rule_set(&rules);
    if !report.is_valid() {
        return Err(ShareCodeError::Invalid(report.errors));
    }
    Ok(rules)
}

//! Declarative playbook definitions: applicability, condition groups, action templates
//! and guardrails. Playbooks are read-only configuration loaded from JSON.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::domain::entity::{Provider, ScopeType};
use crate::domain::metrics::{MetricsWindow, Significance, TrendDirection};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Operator {
    #[serde(rename = ">")]
    GreaterThan,
    #[serde(rename = ">=")]
    GreaterOrEqual,
    #[serde(rename = "<")]
    LessThan,
    #[serde(rename = "<=")]
    LessOrEqual,
    #[serde(rename = "=")]
    Equal,
    #[serde(rename = "!=")]
    NotEqual,
    #[serde(rename = "between")]
    Between,
}

impl Operator {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::GreaterThan => ">",
            Self::GreaterOrEqual => ">=",
            Self::LessThan => "<",
            Self::LessOrEqual => "<=",
            Self::Equal => "=",
            Self::NotEqual => "!=",
            Self::Between => "between",
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Threshold of a metric condition: a number, or an inclusive `[lo, hi]` range.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ConditionValue {
    Scalar(f64),
    Range([f64; 2]),
}

impl fmt::Display for ConditionValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Scalar(value) => write!(f, "{value}"),
            Self::Range([lo, hi]) => write!(f, "[{lo}, {hi}]"),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MetricCondition {
    pub metric: String,
    pub operator: Operator,
    pub value: ConditionValue,
    pub window: MetricsWindow,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DirectionSet {
    One(TrendDirection),
    Many(Vec<TrendDirection>),
}

impl DirectionSet {
    pub fn contains(&self, direction: TrendDirection) -> bool {
        match self {
            Self::One(expected) => *expected == direction,
            Self::Many(expected) => expected.contains(&direction),
        }
    }

    pub fn describe(&self) -> String {
        match self {
            Self::One(direction) => direction.as_str().to_string(),
            Self::Many(directions) => {
                directions.iter().map(TrendDirection::as_str).collect::<Vec<_>>().join("|")
            }
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TrendCondition {
    pub direction: DirectionSet,
    pub window: MetricsWindow,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_change_pct: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub significance_level: Option<Significance>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CustomCondition {
    #[serde(rename = "type")]
    pub custom_type: String,
    #[serde(default)]
    pub params: Value,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Condition {
    Metric(MetricCondition),
    Trend(TrendCondition),
    Custom(CustomCondition),
}

impl Condition {
    pub fn metric(
        metric: impl Into<String>,
        operator: Operator,
        value: f64,
        window: MetricsWindow,
    ) -> Self {
        Self::Metric(MetricCondition {
            metric: metric.into(),
            operator,
            value: ConditionValue::Scalar(value),
            window,
        })
    }

    pub fn between(metric: impl Into<String>, lo: f64, hi: f64, window: MetricsWindow) -> Self {
        Self::Metric(MetricCondition {
            metric: metric.into(),
            operator: Operator::Between,
            value: ConditionValue::Range([lo, hi]),
            window,
        })
    }

    pub fn trend(direction: TrendDirection, window: MetricsWindow) -> Self {
        Self::Trend(TrendCondition {
            direction: DirectionSet::One(direction),
            window,
            min_change_pct: None,
            significance_level: None,
        })
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ConditionGroups {
    #[serde(default)]
    pub all: Vec<Condition>,
    #[serde(default)]
    pub any: Vec<Condition>,
    #[serde(default)]
    pub none: Vec<Condition>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppliesTo {
    pub providers: Vec<Provider>,
    pub levels: Vec<ScopeType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub objectives: Option<Vec<String>>,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ActionType {
    BudgetChange,
    Pause,
    BidAdjustment,
    CreativeRefresh,
    Other(String),
}

impl ActionType {
    pub fn as_str(&self) -> &str {
        match self {
            Self::BudgetChange => "recommend_budget_change",
            Self::Pause => "recommend_pause",
            Self::BidAdjustment => "recommend_bid_adjustment",
            Self::CreativeRefresh => "recommend_creative_refresh",
            Self::Other(value) => value,
        }
    }
}

impl From<String> for ActionType {
    fn from(value: String) -> Self {
        match value.as_str() {
            "recommend_budget_change" => Self::BudgetChange,
            "recommend_pause" => Self::Pause,
            "recommend_bid_adjustment" => Self::BidAdjustment,
            "recommend_creative_refresh" => Self::CreativeRefresh,
            _ => Self::Other(value),
        }
    }
}

impl From<ActionType> for String {
    fn from(value: ActionType) -> Self {
        value.as_str().to_string()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Guardrails {
    pub max_daily_increase_pct: f64,
    pub max_daily_decrease_pct: f64,
    pub cooldown_hours: u32,
    pub require_approval: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_budget: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_budget: Option<f64>,
}

impl Default for Guardrails {
    fn default() -> Self {
        Self {
            max_daily_increase_pct: 50.0,
            max_daily_decrease_pct: 50.0,
            cooldown_hours: 24,
            require_approval: false,
            min_budget: None,
            max_budget: None,
        }
    }
}

impl Guardrails {
    /// Returns a copy with every value present in `overrides` taking precedence.
    pub fn merged(&self, overrides: &GuardrailOverrides) -> Self {
        Self {
            max_daily_increase_pct: overrides
                .max_daily_increase_pct
                .unwrap_or(self.max_daily_increase_pct),
            max_daily_decrease_pct: overrides
                .max_daily_decrease_pct
                .unwrap_or(self.max_daily_decrease_pct),
            cooldown_hours: overrides.cooldown_hours.unwrap_or(self.cooldown_hours),
            require_approval: overrides.require_approval.unwrap_or(self.require_approval),
            min_budget: overrides.min_budget.or(self.min_budget),
            max_budget: overrides.max_budget.or(self.max_budget),
        }
    }
}

/// Partial guardrails as written in playbooks, actions, or AI responses.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct GuardrailOverrides {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_daily_increase_pct: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_daily_decrease_pct: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cooldown_hours: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub require_approval: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_budget: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_budget: Option<f64>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ActionTemplate {
    #[serde(rename = "type")]
    pub action_type: ActionType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
    #[serde(default)]
    pub params: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub change_pct: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub guardrails: Option<GuardrailOverrides>,
}

impl ActionTemplate {
    pub fn new(action_type: ActionType) -> Self {
        Self { action_type, target: None, params: Map::new(), change_pct: None, guardrails: None }
    }

    pub fn with_change_pct(mut self, change_pct: f64) -> Self {
        self.change_pct = Some(change_pct);
        self
    }

    pub fn with_param(mut self, key: impl Into<String>, value: Value) -> Self {
        self.params.insert(key.into(), value);
        self
    }

    pub fn param_f64(&self, key: &str) -> Option<f64> {
        self.params.get(key).and_then(Value::as_f64)
    }
}

fn default_enabled() -> bool {
    true
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Playbook {
    pub key: String,
    pub name: String,
    pub description: String,
    pub applies_to: AppliesTo,
    #[serde(default)]
    pub conditions: ConditionGroups,
    #[serde(default)]
    pub actions: Vec<ActionTemplate>,
    #[serde(default)]
    pub guardrails: GuardrailOverrides,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub explanation_template: Option<String>,
    #[serde(default)]
    pub risk_notes: Vec<String>,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn condition_json_uses_kind_tag() {
        let raw = json!([
            {"kind": "metric", "metric": "ctr", "operator": "<", "value": 1.0, "window": "7d"},
            {"kind": "metric", "metric": "roas", "operator": "between", "value": [1.0, 2.0], "window": "14d"},
            {"kind": "trend", "direction": ["declining", "stable"], "window": "7d", "min_change_pct": -10.0},
            {"kind": "custom", "type": "budget_utilization", "params": {"min": 0.9}}
        ]);

        let conditions: Vec<Condition> = serde_json::from_value(raw).expect("parse conditions");

        assert_eq!(conditions[0], Condition::metric("ctr", Operator::LessThan, 1.0, MetricsWindow::Last7Days));
        assert_eq!(conditions[1], Condition::between("roas", 1.0, 2.0, MetricsWindow::Last14Days));
        match &conditions[2] {
            Condition::Trend(trend) => {
                assert!(trend.direction.contains(TrendDirection::Stable));
                assert!(!trend.direction.contains(TrendDirection::Improving));
            }
            other => panic!("expected trend condition, got {other:?}"),
        }
        assert!(matches!(&conditions[3], Condition::Custom(custom) if custom.custom_type == "budget_utilization"));
    }

    #[test]
    fn unknown_action_types_are_preserved() {
        let action: ActionTemplate =
            serde_json::from_value(json!({"type": "recommend_dayparting", "params": {"hours": [9, 17]}}))
                .expect("parse action");

        assert_eq!(action.action_type, ActionType::Other("recommend_dayparting".to_string()));
        assert_eq!(String::from(action.action_type), "recommend_dayparting");
    }

    #[test]
    fn guardrail_overrides_take_precedence_over_defaults() {
        let merged = Guardrails::default().merged(&GuardrailOverrides {
            max_daily_increase_pct: Some(20.0),
            require_approval: Some(true),
            ..GuardrailOverrides::default()
        });

        assert_eq!(merged.max_daily_increase_pct, 20.0);
        assert_eq!(merged.max_daily_decrease_pct, 50.0);
        assert_eq!(merged.cooldown_hours, 24);
        assert!(merged.require_approval);
    }

    #[test]
    fn playbook_defaults_to_enabled() {
        let playbook: Playbook = serde_json::from_value(json!({
            "key": "pause_wasted_spend",
            "name": "Pause wasted spend",
            "description": "Spend without conversions",
            "applies_to": {"providers": ["meta"], "levels": ["ad"]}
        }))
        .expect("parse playbook");

        assert!(playbook.enabled);
        assert!(playbook.conditions.all.is_empty());
        assert!(playbook.actions.is_empty());
    }
}

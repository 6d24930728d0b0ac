use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde_json::{json, Value};

use super::{ConditionEvaluation, ConditionGroup, RuleContext};
use crate::domain::playbook::{
    Condition, ConditionValue, CustomCondition, MetricCondition, Operator, TrendCondition,
};

const EQUALITY_TOLERANCE: f64 = 1e-9;

/// Hook for `custom` conditions. Implementations report the literal truth of the
/// condition; group negation is applied by the engine.
pub trait CustomConditionHandler: Send + Sync {
    fn evaluate(&self, params: &Value, context: &RuleContext) -> ConditionEvaluation;
}

#[derive(Clone, Default)]
pub struct CustomConditionRegistry {
    handlers: HashMap<String, Arc<dyn CustomConditionHandler>>,
}

impl CustomConditionRegistry {
    pub fn register(
        &mut self,
        custom_type: impl Into<String>,
        handler: Arc<dyn CustomConditionHandler>,
    ) {
        self.handlers.insert(custom_type.into().to_ascii_lowercase(), handler);
    }

    pub fn get(&self, custom_type: &str) -> Option<&Arc<dyn CustomConditionHandler>> {
        self.handlers.get(&custom_type.to_ascii_lowercase())
    }
}

impl fmt::Debug for CustomConditionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut types = self.handlers.keys().collect::<Vec<_>>();
        types.sort();
        f.debug_struct("CustomConditionRegistry").field("types", &types).finish()
    }
}

#[derive(Clone, Debug, Default)]
pub struct ConditionEvaluator {
    custom: CustomConditionRegistry,
}

impl ConditionEvaluator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_custom_conditions(custom: CustomConditionRegistry) -> Self {
        Self { custom }
    }

    /// Evaluates one condition against the context. Never fails: missing data yields
    /// `passed = false` with the reason in `details`.
    pub fn evaluate(&self, condition: &Condition, context: &RuleContext) -> ConditionEvaluation {
        match condition {
            Condition::Metric(metric) => evaluate_metric(metric, context),
            Condition::Trend(trend) => evaluate_trend(trend, context),
            Condition::Custom(custom) => self.evaluate_custom(custom, context),
        }
    }

    fn evaluate_custom(&self, custom: &CustomCondition, context: &RuleContext) -> ConditionEvaluation {
        match self.custom.get(&custom.custom_type) {
            Some(handler) => {
                let mut evaluation = handler.evaluate(&custom.params, context);
                evaluation.group = ConditionGroup::All;
                evaluation
            }
            None => ConditionEvaluation::failed(
                custom.custom_type.clone(),
                "custom",
                format!("custom condition type `{}` is not supported", custom.custom_type),
            ),
        }
    }
}

fn evaluate_metric(condition: &MetricCondition, context: &RuleContext) -> ConditionEvaluation {
    let operator = condition.operator.as_str();
    let expected_value = expected_json(&condition.value);

    let Some(snapshot) = context.metrics.get(&condition.window) else {
        let mut evaluation = ConditionEvaluation::failed(
            condition.metric.clone(),
            operator,
            format!("no metrics available for window {}", condition.window.as_str()),
        );
        evaluation.expected_value = expected_value;
        return evaluation;
    };

    let Some(actual) = snapshot.metric(&condition.metric) else {
        let mut evaluation = ConditionEvaluation::failed(
            condition.metric.clone(),
            operator,
            format!("unknown metric `{}`", condition.metric),
        );
        evaluation.expected_value = expected_value;
        return evaluation;
    };

    let outcome = compare(actual, condition.operator, &condition.value);
    let (passed, details) = match outcome {
        Ok(passed) => (
            passed,
            format!(
                "{} ({}) = {} {} {}",
                condition.metric,
                condition.window.as_str(),
                actual,
                operator,
                condition.value
            ),
        ),
        Err(reason) => (false, reason),
    };

    ConditionEvaluation {
        group: ConditionGroup::All,
        label: condition.metric.clone(),
        passed,
        actual_value: json!(actual),
        expected_value,
        operator: operator.to_string(),
        details,
    }
}

fn compare(actual: f64, operator: Operator, expected: &ConditionValue) -> Result<bool, String> {
    match (operator, expected) {
        (Operator::Between, ConditionValue::Range([lo, hi])) => Ok(*lo <= actual && actual <= *hi),
        (Operator::Between, ConditionValue::Scalar(_)) => {
            Err("`between` requires a two-element [lo, hi] value".to_string())
        }
        (_, ConditionValue::Range(_)) => {
            Err(format!("operator `{operator}` requires a single numeric value"))
        }
        (Operator::GreaterThan, ConditionValue::Scalar(value)) => Ok(actual > *value),
        (Operator::GreaterOrEqual, ConditionValue::Scalar(value)) => Ok(actual >= *value),
        (Operator::LessThan, ConditionValue::Scalar(value)) => Ok(actual < *value),
        (Operator::LessOrEqual, ConditionValue::Scalar(value)) => Ok(actual <= *value),
        (Operator::Equal, ConditionValue::Scalar(value)) => {
            Ok((actual - *value).abs() <= EQUALITY_TOLERANCE)
        }
        (Operator::NotEqual, ConditionValue::Scalar(value)) => {
            Ok((actual - *value).abs() > EQUALITY_TOLERANCE)
        }
    }
}

fn expected_json(value: &ConditionValue) -> Value {
    match value {
        ConditionValue::Scalar(value) => json!(value),
        ConditionValue::Range([lo, hi]) => json!([lo, hi]),
    }
}

fn evaluate_trend(condition: &TrendCondition, context: &RuleContext) -> ConditionEvaluation {
    let label = format!("trend_{}", condition.window.as_str());
    let expected_value = json!(condition.direction.describe());

    let Some(trend) = context.metrics.get(&condition.window).and_then(|snapshot| snapshot.trend)
    else {
        let mut evaluation = ConditionEvaluation::failed(
            label,
            "in",
            format!("no trend available for window {}", condition.window.as_str()),
        );
        evaluation.expected_value = expected_value;
        return evaluation;
    };

    let mut passed = condition.direction.contains(trend.direction);
    let mut reasons = vec![format!(
        "direction {} expected {}",
        trend.direction.as_str(),
        condition.direction.describe()
    )];

    if let Some(min_change_pct) = condition.min_change_pct {
        let strong_enough = trend.change_pct.abs() >= min_change_pct.abs();
        passed &= strong_enough;
        reasons.push(format!(
            "change {:.2}% vs minimum {:.2}%",
            trend.change_pct,
            min_change_pct.abs()
        ));
    }

    if let Some(required) = condition.significance_level {
        passed &= trend.significance >= required;
        reasons.push(format!(
            "significance {} vs required {}",
            trend.significance.as_str(),
            required.as_str()
        ));
    }

    ConditionEvaluation {
        group: ConditionGroup::All,
        label,
        passed,
        actual_value: json!(trend.direction.as_str()),
        expected_value,
        operator: "in".to_string(),
        details: reasons.join("; "),
    }
}

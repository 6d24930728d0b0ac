//! Playbook rule evaluation.
//!
//! The evaluator and engine here are pure: they never perform I/O and never fail. Missing
//! windows, missing trends, and unknown condition or action types degrade to non-matching
//! results with the reason recorded in `ConditionEvaluation::details`.

mod condition;
mod engine;
mod impact;
mod template;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

pub use condition::{ConditionEvaluator, CustomConditionHandler, CustomConditionRegistry};
pub use engine::RuleEngine;
pub use impact::{estimate_impact, metric_weight, score_actions};
pub use template::{build_template_variables, format_number, PlaceholderFormatter, TemplateFormatter};

use crate::domain::entity::{EntityRef, Provider, ScopeType};
use crate::domain::metrics::{MetricsSnapshot, MetricsWindow};
use crate::domain::recommendation::ActionPayload;

/// Everything the engine knows about one entity at evaluation time.
#[derive(Clone, Debug, PartialEq)]
pub struct RuleContext {
    pub account_id: String,
    pub provider: Provider,
    pub entity_type: ScopeType,
    pub entity_id: String,
    pub entity_name: String,
    pub objective: Option<String>,
    pub metrics: BTreeMap<MetricsWindow, MetricsSnapshot>,
}

impl RuleContext {
    pub fn for_entity(entity: &EntityRef) -> Self {
        Self {
            account_id: entity.account_id.clone(),
            provider: entity.provider,
            entity_type: entity.scope_type,
            entity_id: entity.id.clone(),
            entity_name: entity.name.clone(),
            objective: entity.objective.clone(),
            metrics: BTreeMap::new(),
        }
    }

    pub fn with_metrics(mut self, window: MetricsWindow, snapshot: MetricsSnapshot) -> Self {
        self.metrics.insert(window, snapshot);
        self
    }

    /// The 7-day snapshot when present, otherwise the 14-day one.
    pub fn primary_metrics(&self) -> Option<&MetricsSnapshot> {
        self.metrics
            .get(&MetricsWindow::Last7Days)
            .or_else(|| self.metrics.get(&MetricsWindow::Last14Days))
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConditionGroup {
    All,
    Any,
    None,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ConditionEvaluation {
    pub group: ConditionGroup,
    /// Template variable prefix: the metric name, `trend_<window>`, or the custom type.
    pub label: String,
    pub passed: bool,
    pub actual_value: Value,
    pub expected_value: Value,
    pub operator: String,
    pub details: String,
}

impl ConditionEvaluation {
    pub(crate) fn failed(label: impl Into<String>, operator: impl Into<String>, details: impl Into<String>) -> Self {
        Self {
            group: ConditionGroup::All,
            label: label.into(),
            passed: false,
            actual_value: Value::Null,
            expected_value: Value::Null,
            operator: operator.into(),
            details: details.into(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RuleEvaluationResult {
    pub playbook_key: String,
    pub playbook_name: String,
    pub matched: bool,
    pub condition_results: Vec<ConditionEvaluation>,
    pub actions: Vec<ActionPayload>,
    pub score: f64,
    pub confidence: f64,
    pub explanation: String,
    pub risk_assessment: Option<String>,
}

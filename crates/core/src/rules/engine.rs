use std::fmt;
use std::sync::Arc;

use super::condition::ConditionEvaluator;
use super::impact::{estimate_impact, score_actions};
use super::template::{build_template_variables, PlaceholderFormatter, TemplateFormatter};
use super::{ConditionEvaluation, ConditionGroup, RuleContext, RuleEvaluationResult};
use crate::domain::metrics::MetricsSnapshot;
use crate::domain::playbook::{Condition, Guardrails, Playbook};
use crate::domain::recommendation::ActionPayload;

/// Evaluates playbooks against one entity's metrics. Pure and infallible.
#[derive(Clone)]
pub struct RuleEngine {
    evaluator: ConditionEvaluator,
    formatter: Arc<dyn TemplateFormatter>,
}

impl Default for RuleEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for RuleEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RuleEngine").field("evaluator", &self.evaluator).finish_non_exhaustive()
    }
}

impl RuleEngine {
    pub fn new() -> Self {
        Self { evaluator: ConditionEvaluator::new(), formatter: Arc::new(PlaceholderFormatter) }
    }

    pub fn with_evaluator(mut self, evaluator: ConditionEvaluator) -> Self {
        self.evaluator = evaluator;
        self
    }

    pub fn with_formatter(mut self, formatter: Arc<dyn TemplateFormatter>) -> Self {
        self.formatter = formatter;
        self
    }

    pub fn evaluate_playbook(&self, playbook: &Playbook, context: &RuleContext) -> RuleEvaluationResult {
        if let Some(reason) = inapplicable_reason(playbook, context) {
            return RuleEvaluationResult {
                playbook_key: playbook.key.clone(),
                playbook_name: playbook.name.clone(),
                matched: false,
                condition_results: Vec::new(),
                actions: Vec::new(),
                score: 0.0,
                confidence: 0.0,
                explanation: reason,
                risk_assessment: None,
            };
        }

        let condition_results = self.evaluate_groups(playbook, context);
        let matched = groups_match(&condition_results);
        let confidence = confidence(&condition_results);
        let risk_assessment =
            (!playbook.risk_notes.is_empty()).then(|| playbook.risk_notes.join("; "));

        if !matched {
            let failed = condition_results
                .iter()
                .filter(|evaluation| !evaluation.passed)
                .map(|evaluation| evaluation.details.as_str())
                .collect::<Vec<_>>();
            let explanation = format!("conditions not met: {}", failed.join("; "));
            return RuleEvaluationResult {
                playbook_key: playbook.key.clone(),
                playbook_name: playbook.name.clone(),
                matched: false,
                condition_results,
                actions: Vec::new(),
                score: 0.0,
                confidence,
                explanation,
                risk_assessment,
            };
        }

        let empty = MetricsSnapshot::default();
        let primary = context.primary_metrics().unwrap_or(&empty);
        let actions = instantiate_actions(playbook, primary);
        let score = score_actions(&actions);

        let template = playbook.explanation_template.as_deref().unwrap_or(&playbook.description);
        let variables = build_template_variables(context, primary, &condition_results);
        let explanation = self.formatter.format(template, &variables);

        RuleEvaluationResult {
            playbook_key: playbook.key.clone(),
            playbook_name: playbook.name.clone(),
            matched: true,
            condition_results,
            actions,
            score,
            confidence,
            explanation,
            risk_assessment,
        }
    }

    /// Matched results only, highest score first; ties keep playbook order.
    pub fn evaluate_playbooks(
        &self,
        playbooks: &[Playbook],
        context: &RuleContext,
    ) -> Vec<RuleEvaluationResult> {
        let mut results = playbooks
            .iter()
            .map(|playbook| self.evaluate_playbook(playbook, context))
            .filter(|result| result.matched)
            .collect::<Vec<_>>();
        results.sort_by(|left, right| right.score.total_cmp(&left.score));
        results
    }

    fn evaluate_groups(&self, playbook: &Playbook, context: &RuleContext) -> Vec<ConditionEvaluation> {
        let groups: [(ConditionGroup, &[Condition]); 3] = [
            (ConditionGroup::All, &playbook.conditions.all),
            (ConditionGroup::Any, &playbook.conditions.any),
            (ConditionGroup::None, &playbook.conditions.none),
        ];

        let mut evaluations = Vec::new();
        for (group, conditions) in groups {
            for condition in conditions {
                let mut evaluation = self.evaluator.evaluate(condition, context);
                evaluation.group = group;
                if group == ConditionGroup::None {
                    evaluation.passed = !evaluation.passed;
                }
                evaluations.push(evaluation);
            }
        }
        evaluations
    }
}

fn inapplicable_reason(playbook: &Playbook, context: &RuleContext) -> Option<String> {
    let applies_to = &playbook.applies_to;
    if !applies_to.providers.contains(&context.provider) {
        return Some(format!(
            "playbook does not apply to provider {}",
            context.provider.as_str()
        ));
    }
    if !applies_to.levels.contains(&context.entity_type) {
        return Some(format!(
            "playbook does not apply to {} level",
            context.entity_type.as_str()
        ));
    }
    if let (Some(objectives), Some(objective)) = (&applies_to.objectives, &context.objective) {
        if !objectives.iter().any(|candidate| candidate.eq_ignore_ascii_case(objective)) {
            return Some(format!("playbook does not apply to objective {objective}"));
        }
    }
    None
}

fn groups_match(evaluations: &[ConditionEvaluation]) -> bool {
    let in_group = |group: ConditionGroup| evaluations.iter().filter(move |e| e.group == group);

    let all_pass = in_group(ConditionGroup::All).all(|evaluation| evaluation.passed);
    let none_pass = in_group(ConditionGroup::None).all(|evaluation| evaluation.passed);
    let mut any = in_group(ConditionGroup::Any).peekable();
    let any_pass = any.peek().is_none() || any.any(|evaluation| evaluation.passed);

    all_pass && any_pass && none_pass
}

fn confidence(evaluations: &[ConditionEvaluation]) -> f64 {
    if evaluations.is_empty() {
        return 0.0;
    }
    let passed = evaluations.iter().filter(|evaluation| evaluation.passed).count();
    passed as f64 / evaluations.len() as f64
}

fn instantiate_actions(playbook: &Playbook, primary: &MetricsSnapshot) -> Vec<ActionPayload> {
    let base = Guardrails::default().merged(&playbook.guardrails);
    playbook
        .actions
        .iter()
        .map(|action| {
            let guardrails = match &action.guardrails {
                Some(overrides) => base.merged(overrides),
                None => base,
            };
            ActionPayload {
                action_type: action.action_type.clone(),
                target: action.target.clone(),
                params: action.params.clone(),
                change_pct: action.change_pct,
                guardrails,
                estimated_impact: estimate_impact(action, primary),
                metrics_snapshot: primary.clone(),
                manual_implementation_required: false,
                guardrails_applied: false,
            }
        })
        .collect()
}

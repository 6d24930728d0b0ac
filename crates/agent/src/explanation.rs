use std::fmt::Write as _;
use std::sync::Arc;

use adpilot_core::domain::playbook::{GuardrailOverrides, Guardrails};
use adpilot_core::errors::ApplicationError;
use adpilot_core::recommendations::ports::{
    ExplanationRequest, ExplanationResponse, ExplanationService, PortResult,
};
use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::guardrails::{GuardrailDecision, GuardrailPolicy};
use crate::llm::LlmClient;

pub const MAX_EXPLANATION_CHARS: usize = 1_200;

/// Asks an LLM to explain a matched playbook in plain language and, optionally, to
/// propose stricter guardrails for the first action.
pub struct LlmExplanationService {
    client: Arc<dyn LlmClient>,
    policy: GuardrailPolicy,
}

#[derive(Debug, Deserialize)]
struct ModelReply {
    explanation: String,
    #[serde(default)]
    guardrails: Option<GuardrailOverrides>,
}

impl LlmExplanationService {
    pub fn new(client: Arc<dyn LlmClient>) -> Self {
        Self { client, policy: GuardrailPolicy::default() }
    }

    pub fn with_policy(mut self, policy: GuardrailPolicy) -> Self {
        self.policy = policy;
        self
    }
}

#[async_trait]
impl ExplanationService for LlmExplanationService {
    async fn generate_explanation(
        &self,
        request: &ExplanationRequest,
    ) -> PortResult<ExplanationResponse> {
        let prompt = build_prompt(request);
        let raw = self
            .client
            .complete(&prompt)
            .await
            .map_err(|error| ApplicationError::Integration(format!("explanation request failed: {error:#}")))?;

        let (text, proposed) = parse_reply(&raw);
        let baseline = request
            .result
            .actions
            .first()
            .map(|action| action.guardrails)
            .unwrap_or_default();

        let guardrails = proposed.and_then(|proposed| self.screen(&baseline, &proposed, request));

        Ok(ExplanationResponse { model: self.client.model().to_string(), text, guardrails })
    }

    fn validate_explanation(&self, response: &ExplanationResponse) -> PortResult<()> {
        let text = response.text.trim();
        if text.is_empty() {
            return Err(ApplicationError::Integration("model returned an empty explanation".to_string()));
        }
        if text.chars().count() > MAX_EXPLANATION_CHARS {
            return Err(ApplicationError::Integration(format!(
                "explanation exceeds {MAX_EXPLANATION_CHARS} characters"
            )));
        }
        if text.contains("{{") || text.contains("}}") {
            return Err(ApplicationError::Integration(
                "explanation contains unrendered template placeholders".to_string(),
            ));
        }
        Ok(())
    }

    fn format_explanation(&self, response: &ExplanationResponse) -> String {
        response.text.split_whitespace().collect::<Vec<_>>().join(" ")
    }
}

impl LlmExplanationService {
    fn screen(
        &self,
        baseline: &Guardrails,
        proposed: &GuardrailOverrides,
        request: &ExplanationRequest,
    ) -> Option<GuardrailOverrides> {
        let decision = self.policy.evaluate(baseline, proposed);
        match &decision {
            GuardrailDecision::Allow(_) => {}
            GuardrailDecision::Degrade { reason_code, message, .. } => debug!(
                event_name = "agent.guardrails.degraded",
                playbook_key = %request.playbook.key,
                reason_code,
                message = %message,
                "model guardrails adjusted"
            ),
            GuardrailDecision::Deny { reason_code, message } => warn!(
                event_name = "agent.guardrails.denied",
                playbook_key = %request.playbook.key,
                reason_code,
                message = %message,
                "model guardrails discarded"
            ),
        }
        decision.accepted()
    }
}

fn build_prompt(request: &ExplanationRequest) -> String {
    let playbook = &request.playbook;
    let result = &request.result;
    let mut prompt = String::new();

    let _ = writeln!(
        prompt,
        "You are a paid-media analyst. Explain to an advertiser, in two or three sentences, \
         why the recommendation below applies to their {} \"{}\" on {}.",
        request.entity_type.as_str().replace('_', " "),
        request.entity_name,
        request.provider.as_str(),
    );
    let _ = writeln!(prompt, "\nRecommendation: {} ({})", playbook.name, playbook.key);
    if !playbook.description.is_empty() {
        let _ = writeln!(prompt, "Purpose: {}", playbook.description);
    }
    let _ = writeln!(prompt, "Rule engine summary: {}", result.explanation);

    let _ = writeln!(prompt, "\nConditions:");
    for condition in &result.condition_results {
        let _ = writeln!(
            prompt,
            "- [{}] {}: {}",
            if condition.passed { "met" } else { "not met" },
            condition.label,
            condition.details
        );
    }

    let _ = writeln!(prompt, "\nMetrics:");
    for (window, snapshot) in &request.metrics {
        let values = snapshot
            .named_values()
            .into_iter()
            .map(|(name, value)| format!("{name}={value:.2}"))
            .collect::<Vec<_>>()
            .join(", ");
        let _ = write!(prompt, "- {}: {values}", window.as_str());
        if let Some(trend) = &snapshot.trend {
            let _ = write!(prompt, " (trend {} {:+.1}%)", trend.direction.as_str(), trend.change_pct);
        }
        prompt.push('\n');
    }

    if let Some(action) = result.actions.first() {
        let _ = writeln!(
            prompt,
            "\nProposed action: {}{}. Current guardrails: max increase {:.0}%, max decrease {:.0}%, \
             cooldown {}h, approval required: {}.",
            action.action_type.as_str(),
            action.change_pct.map(|pct| format!(" ({pct:+.0}%)")).unwrap_or_default(),
            action.guardrails.max_daily_increase_pct,
            action.guardrails.max_daily_decrease_pct,
            action.guardrails.cooldown_hours,
            action.guardrails.require_approval,
        );
    }
    if !playbook.risk_notes.is_empty() {
        let _ = writeln!(prompt, "Known risks: {}", playbook.risk_notes.join("; "));
    }

    prompt.push_str(
        "\nRespond with JSON only: {\"explanation\": \"...\", \"guardrails\": null}. \
         Set \"guardrails\" to an object with any of max_daily_increase_pct, \
         max_daily_decrease_pct, cooldown_hours, require_approval, min_budget, max_budget \
         only when the data calls for stricter limits.",
    );
    prompt
}

/// Reads a `{explanation, guardrails}` JSON reply, tolerating code fences. Anything that
/// does not parse is treated as the explanation text itself.
fn parse_reply(raw: &str) -> (String, Option<GuardrailOverrides>) {
    let body = strip_code_fence(raw.trim());
    match serde_json::from_str::<ModelReply>(body) {
        Ok(reply) => (reply.explanation.trim().to_string(), reply.guardrails),
        Err(_) => (raw.trim().to_string(), None),
    }
}

pub(crate) fn strip_code_fence(text: &str) -> &str {
    let Some(rest) = text.strip_prefix("```") else {
        return text;
    };
    let rest = rest.trim_start_matches(|c: char| c.is_ascii_alphanumeric());
    rest.strip_suffix("```").unwrap_or(rest).trim()
}

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use tracing::{debug, warn};

use super::guardrails::apply_guardrails;
use super::ports::{ExplanationRequest, ExplanationService};
use crate::domain::metrics::{MetricsSnapshot, MetricsWindow};
use crate::domain::playbook::Playbook;
use crate::rules::{RuleContext, RuleEvaluationResult};

/// Result of the optional AI stage: the explanation text and model that produced it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Enrichment {
    pub explanation: String,
    pub model: String,
}

/// Post-scoring stage that asks an explanation service to rewrite a matched result's
/// explanation and possibly tighten the first action's guardrails. Failures leave the
/// result untouched.
#[derive(Clone, Default)]
pub struct Enricher {
    service: Option<Arc<dyn ExplanationService>>,
}

impl fmt::Debug for Enricher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Enricher").field("enabled", &self.service.is_some()).finish()
    }
}

impl Enricher {
    pub fn new(service: Arc<dyn ExplanationService>) -> Self {
        Self { service: Some(service) }
    }

    pub fn disabled() -> Self {
        Self::default()
    }

    pub async fn enrich(
        &self,
        playbook: &Playbook,
        result: &mut RuleEvaluationResult,
        context: &RuleContext,
    ) -> Option<Enrichment> {
        let service = self.service.as_ref()?;

        let metrics = MetricsWindow::DEFAULTS
            .iter()
            .filter_map(|window| context.metrics.get(window).map(|snapshot| (*window, snapshot.clone())))
            .collect::<BTreeMap<MetricsWindow, MetricsSnapshot>>();
        let request = ExplanationRequest {
            playbook: playbook.clone(),
            result: result.clone(),
            metrics,
            entity_type: context.entity_type,
            entity_name: context.entity_name.clone(),
            provider: context.provider,
        };

        let response = match service.generate_explanation(&request).await {
            Ok(response) => response,
            Err(error) => {
                warn!(
                    event_name = "recommendations.enrichment.failed",
                    playbook_key = %playbook.key,
                    entity_id = %context.entity_id,
                    error = %error,
                    "AI explanation failed; keeping rule explanation"
                );
                return None;
            }
        };

        if let Err(error) = service.validate_explanation(&response) {
            warn!(
                event_name = "recommendations.enrichment.rejected",
                playbook_key = %playbook.key,
                entity_id = %context.entity_id,
                model = %response.model,
                error = %error,
                "AI explanation failed validation; keeping rule explanation"
            );
            return None;
        }

        let explanation = service.format_explanation(&response);
        result.explanation = explanation.clone();
        if let (Some(overrides), Some(action)) = (&response.guardrails, result.actions.first_mut()) {
            apply_guardrails(action, overrides);
        }

        debug!(
            event_name = "recommendations.enrichment.applied",
            playbook_key = %playbook.key,
            entity_id = %context.entity_id,
            model = %response.model,
            guardrails = response.guardrails.is_some(),
            "AI explanation applied"
        );

        Some(Enrichment { explanation, model: response.model })
    }
}

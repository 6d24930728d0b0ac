use std::sync::Arc;

use adpilot_core::errors::ApplicationError;
use adpilot_core::recommendations::ports::{DescriptionGenerator, DescriptionRequest, PortResult};
use async_trait::async_trait;

use crate::explanation::strip_code_fence;
use crate::llm::LlmClient;

const MAX_DESCRIPTION_CHARS: usize = 600;

/// Writes heuristic recommendation descriptions with an LLM. Empty or oversized output is
/// an error so the heuristic service falls back to its built-in text.
pub struct LlmDescriptionGenerator {
    client: Arc<dyn LlmClient>,
}

impl LlmDescriptionGenerator {
    pub fn new(client: Arc<dyn LlmClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl DescriptionGenerator for LlmDescriptionGenerator {
    async fn describe(&self, request: &DescriptionRequest) -> PortResult<String> {
        let metrics = &request.metrics;
        let prompt = format!(
            "Write one or two sentences for an advertiser explaining the \"{rule_name}\" finding \
             ({recommendation_type}) on campaign \"{campaign}\". Yesterday's numbers ({date}): \
             {impressions:.0} impressions, {clicks:.0} clicks, CTR {ctr:.2}%, CPC ${cpc:.2}, \
             spend ${spend:.2}, {conversions:.0} conversions, ROAS {roas:.2}. \
             Mention the key number and one concrete next step. Plain text only.",
            rule_name = request.rule_name,
            recommendation_type = request.recommendation_type,
            campaign = request.campaign_name,
            date = metrics.date,
            impressions = metrics.impressions,
            clicks = metrics.clicks,
            ctr = metrics.ctr(),
            cpc = metrics.cpc(),
            spend = metrics.spend,
            conversions = metrics.conversions,
            roas = metrics.roas(),
        );

        let raw = self.client.complete(&prompt).await.map_err(|error| {
            ApplicationError::Integration(format!("description request for {} failed: {error:#}", request.rule_id))
        })?;

        let text = strip_code_fence(raw.trim()).split_whitespace().collect::<Vec<_>>().join(" ");
        if text.is_empty() {
            return Err(ApplicationError::Integration("model returned an empty description".to_string()));
        }
        if text.chars().count() > MAX_DESCRIPTION_CHARS {
            return Err(ApplicationError::Integration(format!(
                "description exceeds {MAX_DESCRIPTION_CHARS} characters"
            )));
        }
        Ok(text)
    }
}

use std::sync::Arc;

use adpilot_core::config::LlmConfig;
use adpilot_core::recommendations::ports::{DescriptionGenerator, ExplanationService};
use anyhow::Result;
use tracing::info;

use crate::description::LlmDescriptionGenerator;
use crate::explanation::LlmExplanationService;
use crate::guardrails::GuardrailPolicy;
use crate::llm::{HttpLlmClient, LlmClient};

/// LLM-backed collaborators handed to the recommendation and heuristic services.
#[derive(Clone)]
pub struct AgentRuntime {
    client: Arc<dyn LlmClient>,
    guardrails: GuardrailPolicy,
}

impl AgentRuntime {
    pub fn new(client: Arc<dyn LlmClient>) -> Self {
        Self { client, guardrails: GuardrailPolicy::default() }
    }

    /// `None` when the LLM is switched off in configuration.
    pub fn from_config(config: &LlmConfig) -> Result<Option<Self>> {
        if !config.enabled {
            return Ok(None);
        }

        let client = HttpLlmClient::from_config(config)?;
        info!(
            event_name = "agent.runtime.ready",
            provider = config.provider.as_str(),
            model = %config.model,
            base_url = client.base_url(),
            "LLM enrichment enabled"
        );
        Ok(Some(Self::new(Arc::new(client))))
    }

    pub fn model(&self) -> &str {
        self.client.model()
    }

    pub fn explanation_service(&self) -> Arc<dyn ExplanationService> {
        Arc::new(LlmExplanationService::new(self.client.clone()).with_policy(self.guardrails.clone()))
    }

    pub fn description_generator(&self) -> Arc<dyn DescriptionGenerator> {
        Arc::new(LlmDescriptionGenerator::new(self.client.clone()))
    }
}

#[cfg(test)]
mod tests {
    use adpilot_core::config::AppConfig;

    use super::AgentRuntime;

    #[test]
    fn disabled_llm_builds_no_runtime() {
        let config = AppConfig::default();
        assert!(!config.llm.enabled);
        assert!(AgentRuntime::from_config(&config.llm).expect("runtime").is_none());
    }

    #[test]
    fn enabled_ollama_runtime_reports_its_model() {
        let mut config = AppConfig::default();
        config.llm.enabled = true;

        let runtime = AgentRuntime::from_config(&config.llm).expect("runtime").expect("enabled");

        assert_eq!(runtime.model(), "llama3.1");
    }
}

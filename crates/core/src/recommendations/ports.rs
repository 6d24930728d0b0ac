//! Collaborators the recommendation and heuristic services depend on. Storage, metric
//! aggregation and LLM access are implemented in the `db` and `agent` crates; tests use
//! in-memory fakes.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::info;

use crate::domain::entity::{EntityRef, Provider, ScopeType};
use crate::domain::metrics::{DailyMetrics, MetricsSnapshot, MetricsWindow};
use crate::domain::playbook::{GuardrailOverrides, Playbook};
use crate::domain::recommendation::{
    Feedback, Recommendation, RecommendationFilters, RecommendationId, RecommendationStatistics,
    RecommendationStatus,
};
use crate::errors::ApplicationError;
use crate::rules::RuleEvaluationResult;

pub type PortResult<T> = Result<T, ApplicationError>;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MetricsQuery {
    pub account_id: String,
    pub provider: Provider,
    pub entity_type: ScopeType,
    pub entity_id: String,
    pub window: MetricsWindow,
    /// Also aggregate the preceding window of equal length and attach a trend.
    pub compare_window: bool,
}

#[async_trait]
pub trait MetricsWindowProvider: Send + Sync {
    async fn get_metrics(&self, query: &MetricsQuery) -> PortResult<MetricsSnapshot>;
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PlaybookFilter {
    pub provider: Option<Provider>,
    pub enabled: Option<bool>,
}

impl PlaybookFilter {
    pub fn matches(&self, playbook: &Playbook) -> bool {
        self.provider.map_or(true, |provider| playbook.applies_to.providers.contains(&provider))
            && self.enabled.map_or(true, |enabled| playbook.enabled == enabled)
    }
}

#[async_trait]
pub trait PlaybookRepository: Send + Sync {
    async fn get(&self, key: &str) -> PortResult<Option<Playbook>>;
    async fn get_filtered(&self, filter: &PlaybookFilter) -> PortResult<Vec<Playbook>>;
}

#[derive(Clone, Debug, PartialEq)]
pub struct ExplanationRequest {
    pub playbook: Playbook,
    pub result: RuleEvaluationResult,
    pub metrics: BTreeMap<MetricsWindow, MetricsSnapshot>,
    pub entity_type: ScopeType,
    pub entity_name: String,
    pub provider: Provider,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ExplanationResponse {
    pub model: String,
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub guardrails: Option<GuardrailOverrides>,
}

#[async_trait]
pub trait ExplanationService: Send + Sync {
    async fn generate_explanation(
        &self,
        request: &ExplanationRequest,
    ) -> PortResult<ExplanationResponse>;

    fn validate_explanation(&self, response: &ExplanationResponse) -> PortResult<()>;

    fn format_explanation(&self, response: &ExplanationResponse) -> String;
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EntityQuery {
    pub account_id: String,
    pub provider: Option<Provider>,
    pub scope_type: ScopeType,
    pub entity_ids: Option<Vec<String>>,
    pub active_only: bool,
}

impl EntityQuery {
    pub fn active(account_id: impl Into<String>, provider: Option<Provider>, scope_type: ScopeType) -> Self {
        Self { account_id: account_id.into(), provider, scope_type, entity_ids: None, active_only: true }
    }
}

#[async_trait]
pub trait EntityStore: Send + Sync {
    /// Entities of one level. The objective is resolved from the owning campaign.
    async fn list_entities(&self, query: &EntityQuery) -> PortResult<Vec<EntityRef>>;
}

#[async_trait]
pub trait RecommendationStore: Send + Sync {
    /// Inserts `recommendation` unless an unexpired recommendation for the same account,
    /// scope and rule with one of `statuses` was created at or after `since`. Returns whether
    /// it was inserted. The check and insert are one atomic step.
    async fn create_if_none_with_status(
        &self,
        recommendation: Recommendation,
        statuses: &[RecommendationStatus],
        since: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> PortResult<bool>;

    /// `create_if_none_with_status` over the open statuses (proposed, accepted).
    async fn create_if_no_active(
        &self,
        recommendation: Recommendation,
        since: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> PortResult<bool> {
        self.create_if_none_with_status(recommendation, &RecommendationStatus::OPEN, since, now).await
    }

    async fn find_by_id(&self, id: &RecommendationId) -> PortResult<Option<Recommendation>>;

    /// Unexpired recommendations for an account, highest score first, newest first on ties.
    async fn list(
        &self,
        account_id: &str,
        filters: &RecommendationFilters,
        now: DateTime<Utc>,
    ) -> PortResult<Vec<Recommendation>>;

    async fn save(&self, recommendation: Recommendation) -> PortResult<()>;

    async fn find_recent_by_rule(
        &self,
        account_id: &str,
        scope_type: ScopeType,
        scope_id: &str,
        rule_key: &str,
        since: DateTime<Utc>,
    ) -> PortResult<Vec<Recommendation>>;

    async fn statistics(&self, account_id: &str) -> PortResult<RecommendationStatistics>;
}

#[async_trait]
pub trait FeedbackStore: Send + Sync {
    async fn add(&self, feedback: Feedback) -> PortResult<()>;

    /// Newest first, at most `limit` entries.
    async fn list_for_recommendation(
        &self,
        recommendation_id: &RecommendationId,
        limit: usize,
    ) -> PortResult<Vec<Feedback>>;
}

#[async_trait]
pub trait ProviderActionExecutor: Send + Sync {
    async fn apply(&self, recommendation: &Recommendation) -> PortResult<Value>;
    async fn revert(&self, recommendation: &Recommendation) -> PortResult<Value>;
}

/// Records the request and reports that no provider write was made.
#[derive(Clone, Copy, Debug, Default)]
pub struct LoggingActionExecutor;

#[async_trait]
impl ProviderActionExecutor for LoggingActionExecutor {
    async fn apply(&self, recommendation: &Recommendation) -> PortResult<Value> {
        info!(
            event_name = "recommendations.provider_apply.skipped",
            recommendation_id = %recommendation.id.0,
            provider = recommendation.provider.as_str(),
            "provider apply is not implemented; recording intent only"
        );
        Ok(json!({
            "status": "not_implemented",
            "operation": "apply",
            "recommendation_id": recommendation.id.0,
        }))
    }

    async fn revert(&self, recommendation: &Recommendation) -> PortResult<Value> {
        info!(
            event_name = "recommendations.provider_revert.skipped",
            recommendation_id = %recommendation.id.0,
            provider = recommendation.provider.as_str(),
            "provider revert is not implemented; recording intent only"
        );
        Ok(json!({
            "status": "not_implemented",
            "operation": "revert",
            "recommendation_id": recommendation.id.0,
        }))
    }
}

#[async_trait]
pub trait DailyMetricsSource: Send + Sync {
    /// Daily rows for the last `days` days, oldest first. Days without data are absent.
    async fn daily_metrics(
        &self,
        account_id: &str,
        campaign_id: &str,
        days: u32,
    ) -> PortResult<Vec<DailyMetrics>>;
}

#[derive(Clone, Debug, PartialEq)]
pub struct DescriptionRequest {
    pub rule_id: String,
    pub rule_name: String,
    pub recommendation_type: String,
    pub campaign_name: String,
    pub metrics: DailyMetrics,
}

#[async_trait]
pub trait DescriptionGenerator: Send + Sync {
    async fn describe(&self, request: &DescriptionRequest) -> PortResult<String>;
}

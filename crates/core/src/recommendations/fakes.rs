//! In-process collaborators for service tests.

use std::collections::HashSet;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use super::ports::{
    DailyMetricsSource, DescriptionGenerator, DescriptionRequest, EntityQuery, EntityStore,
    ExplanationRequest, ExplanationResponse, ExplanationService, FeedbackStore, MetricsQuery,
    MetricsWindowProvider, PlaybookFilter, PlaybookRepository, PortResult, RecommendationStore,
};
use crate::domain::entity::{EntityRef, ScopeType};
use crate::domain::metrics::{DailyMetrics, MetricsSnapshot, MetricsWindow};
use crate::domain::playbook::{GuardrailOverrides, Playbook};
use crate::domain::recommendation::{
    Feedback, Recommendation, RecommendationFilters, RecommendationId, RecommendationStatistics,
    RecommendationStatus,
};
use crate::errors::ApplicationError;

pub struct FakePlaybooks(pub Vec<Playbook>);

#[async_trait]
impl PlaybookRepository for FakePlaybooks {
    async fn get(&self, key: &str) -> PortResult<Option<Playbook>> {
        Ok(self.0.iter().find(|playbook| playbook.key == key).cloned())
    }

    async fn get_filtered(&self, filter: &PlaybookFilter) -> PortResult<Vec<Playbook>> {
        Ok(self.0.iter().filter(|playbook| filter.matches(playbook)).cloned().collect())
    }
}

pub struct FakeEntities(pub Vec<EntityRef>);

#[async_trait]
impl EntityStore for FakeEntities {
    async fn list_entities(&self, query: &EntityQuery) -> PortResult<Vec<EntityRef>> {
        Ok(self
            .0
            .iter()
            .filter(|entity| entity.account_id == query.account_id)
            .filter(|entity| entity.scope_type == query.scope_type)
            .filter(|entity| query.provider.map_or(true, |provider| entity.provider == provider))
            .filter(|entity| query.entity_ids.as_ref().map_or(true, |ids| ids.contains(&entity.id)))
            .cloned()
            .collect())
    }
}

pub struct FakeMetrics {
    snapshot: MetricsSnapshot,
    failing_windows: HashSet<MetricsWindow>,
    failing_entities: HashSet<String>,
}

impl FakeMetrics {
    pub fn uniform(snapshot: MetricsSnapshot) -> Self {
        Self { snapshot, failing_windows: HashSet::new(), failing_entities: HashSet::new() }
    }

    pub fn failing_window(mut self, window: MetricsWindow) -> Self {
        self.failing_windows.insert(window);
        self
    }

    pub fn failing_entity(mut self, entity_id: &str) -> Self {
        self.failing_entities.insert(entity_id.to_string());
        self
    }
}

#[async_trait]
impl MetricsWindowProvider for FakeMetrics {
    async fn get_metrics(&self, query: &MetricsQuery) -> PortResult<MetricsSnapshot> {
        if self.failing_windows.contains(&query.window) || self.failing_entities.contains(&query.entity_id) {
            return Err(ApplicationError::Integration(format!(
                "metrics unavailable for {} {}",
                query.entity_id,
                query.window.as_str()
            )));
        }
        Ok(self.snapshot.clone())
    }
}

pub struct FakeExplanations {
    outcome: Option<(String, Option<GuardrailOverrides>)>,
}

impl FakeExplanations {
    pub fn succeeding(text: &str, guardrails: Option<GuardrailOverrides>) -> Self {
        Self { outcome: Some((text.to_string(), guardrails)) }
    }

    pub fn failing() -> Self {
        Self { outcome: None }
    }
}

#[async_trait]
impl ExplanationService for FakeExplanations {
    async fn generate_explanation(&self, _request: &ExplanationRequest) -> PortResult<ExplanationResponse> {
        match &self.outcome {
            Some((text, guardrails)) => Ok(ExplanationResponse {
                model: "fake-model".to_string(),
                text: text.clone(),
                guardrails: *guardrails,
            }),
            None => Err(ApplicationError::Integration("llm timed out".to_string())),
        }
    }

    fn validate_explanation(&self, response: &ExplanationResponse) -> PortResult<()> {
        if response.text.trim().is_empty() {
            return Err(ApplicationError::Integration("empty explanation".to_string()));
        }
        Ok(())
    }

    fn format_explanation(&self, response: &ExplanationResponse) -> String {
        response.text.trim().to_string()
    }
}

#[derive(Default)]
pub struct MemoryRecommendations {
    rows: RwLock<Vec<Recommendation>>,
}

impl MemoryRecommendations {
    pub async fn all(&self) -> Vec<Recommendation> {
        self.rows.read().await.clone()
    }

    pub async fn insert(&self, recommendation: Recommendation) {
        self.rows.write().await.push(recommendation);
    }
}

#[async_trait]
impl RecommendationStore for MemoryRecommendations {
    async fn create_if_none_with_status(
        &self,
        recommendation: Recommendation,
        statuses: &[RecommendationStatus],
        since: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> PortResult<bool> {
        let mut rows = self.rows.write().await;
        if rows.iter().any(|existing| existing.blocks(&recommendation, statuses, since, now)) {
            return Ok(false);
        }
        rows.push(recommendation);
        Ok(true)
    }

    async fn find_by_id(&self, id: &RecommendationId) -> PortResult<Option<Recommendation>> {
        Ok(self.rows.read().await.iter().find(|row| &row.id == id).cloned())
    }

    async fn list(
        &self,
        account_id: &str,
        filters: &RecommendationFilters,
        now: DateTime<Utc>,
    ) -> PortResult<Vec<Recommendation>> {
        let mut rows = self
            .rows
            .read()
            .await
            .iter()
            .filter(|row| row.account_id == account_id && !row.is_expired(now) && filters.matches(row))
            .cloned()
            .collect::<Vec<_>>();
        rows.sort_by(|left, right| {
            right.score.total_cmp(&left.score).then_with(|| right.created_at.cmp(&left.created_at))
        });
        Ok(rows)
    }

    async fn save(&self, recommendation: Recommendation) -> PortResult<()> {
        let mut rows = self.rows.write().await;
        match rows.iter_mut().find(|row| row.id == recommendation.id) {
            Some(row) => *row = recommendation,
            None => rows.push(recommendation),
        }
        Ok(())
    }

    async fn find_recent_by_rule(
        &self,
        account_id: &str,
        scope_type: ScopeType,
        scope_id: &str,
        rule_key: &str,
        since: DateTime<Utc>,
    ) -> PortResult<Vec<Recommendation>> {
        Ok(self
            .rows
            .read()
            .await
            .iter()
            .filter(|row| {
                row.account_id == account_id
                    && row.scope_type == scope_type
                    && row.scope_id == scope_id
                    && row.rule_key == rule_key
                    && row.created_at >= since
            })
            .cloned()
            .collect())
    }

    async fn statistics(&self, account_id: &str) -> PortResult<RecommendationStatistics> {
        let rows = self.rows.read().await;
        Ok(RecommendationStatistics::from_recommendations(
            rows.iter().filter(|row| row.account_id == account_id),
        ))
    }
}

#[derive(Default)]
pub struct MemoryFeedback {
    rows: RwLock<Vec<Feedback>>,
}

impl MemoryFeedback {
    pub async fn count(&self) -> usize {
        self.rows.read().await.len()
    }
}

#[async_trait]
impl FeedbackStore for MemoryFeedback {
    async fn add(&self, feedback: Feedback) -> PortResult<()> {
        self.rows.write().await.push(feedback);
        Ok(())
    }

    async fn list_for_recommendation(
        &self,
        recommendation_id: &RecommendationId,
        limit: usize,
    ) -> PortResult<Vec<Feedback>> {
        Ok(self
            .rows
            .read()
            .await
            .iter()
            .rev()
            .filter(|row| &row.recommendation_id == recommendation_id)
            .take(limit)
            .cloned()
            .collect())
    }
}

pub struct FakeDailyMetrics(pub Vec<DailyMetrics>);

#[async_trait]
impl DailyMetricsSource for FakeDailyMetrics {
    async fn daily_metrics(&self, _account_id: &str, _campaign_id: &str, days: u32) -> PortResult<Vec<DailyMetrics>> {
        let skip = self.0.len().saturating_sub(days as usize);
        Ok(self.0[skip..].to_vec())
    }
}

pub struct FakeDescriptions {
    pub fail: bool,
}

#[async_trait]
impl DescriptionGenerator for FakeDescriptions {
    async fn describe(&self, request: &DescriptionRequest) -> PortResult<String> {
        if self.fail {
            return Err(ApplicationError::Integration("generator offline".to_string()));
        }
        Ok(format!("generated: {} for {}", request.rule_name, request.campaign_name))
    }
}

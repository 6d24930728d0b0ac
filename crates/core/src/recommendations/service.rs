use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde_json::Value;
use tracing::{debug, info, warn};

use super::enrich::{Enricher, Enrichment};
use super::ports::{
    EntityQuery, EntityStore, ExplanationService, FeedbackStore, LoggingActionExecutor,
    MetricsQuery, MetricsWindowProvider, PlaybookFilter, PlaybookRepository,
    ProviderActionExecutor, RecommendationStore,
};
use crate::cancellation::CancellationToken;
use crate::domain::entity::{EntityRef, Provider, ScopeType};
use crate::domain::metrics::MetricsWindow;
use crate::domain::playbook::Playbook;
use crate::domain::recommendation::{
    ActionRequest, Category, Feedback, FeedbackType, Priority, Recommendation,
    RecommendationAction, RecommendationFilters, RecommendationId, RecommendationStatistics,
    RecommendationStatus, RecommendationWithFeedback,
};
use crate::errors::ApplicationError;
use crate::rules::{RuleContext, RuleEngine, RuleEvaluationResult};

const RECENT_FEEDBACK_LIMIT: usize = 5;
const DEFAULT_SNOOZE_DAYS: i64 = 7;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct GenerationSettings {
    /// Results must score strictly above this to be persisted.
    pub min_score: f64,
    pub dedup_window_days: i64,
    pub expiry_days: i64,
}

impl Default for GenerationSettings {
    fn default() -> Self {
        Self { min_score: 10.0, dedup_window_days: 7, expiry_days: 30 }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GenerateRequest {
    pub account_id: String,
    pub provider: Provider,
    pub entity_type: Option<ScopeType>,
    pub entity_ids: Option<Vec<String>>,
    pub playbook_keys: Option<Vec<String>>,
    pub windows: Vec<MetricsWindow>,
}

impl GenerateRequest {
    pub fn new(account_id: impl Into<String>, provider: Provider) -> Self {
        Self {
            account_id: account_id.into(),
            provider,
            entity_type: None,
            entity_ids: None,
            playbook_keys: None,
            windows: MetricsWindow::DEFAULTS.to_vec(),
        }
    }
}

/// Turns playbook matches into persisted recommendations and manages their lifecycle.
pub struct RecommendationService {
    playbooks: Arc<dyn PlaybookRepository>,
    entities: Arc<dyn EntityStore>,
    metrics: Arc<dyn MetricsWindowProvider>,
    recommendations: Arc<dyn RecommendationStore>,
    feedback: Arc<dyn FeedbackStore>,
    executor: Arc<dyn ProviderActionExecutor>,
    enricher: Enricher,
    engine: RuleEngine,
    settings: GenerationSettings,
}

impl RecommendationService {
    pub fn new(
        playbooks: Arc<dyn PlaybookRepository>,
        entities: Arc<dyn EntityStore>,
        metrics: Arc<dyn MetricsWindowProvider>,
        recommendations: Arc<dyn RecommendationStore>,
        feedback: Arc<dyn FeedbackStore>,
    ) -> Self {
        Self {
            playbooks,
            entities,
            metrics,
            recommendations,
            feedback,
            executor: Arc::new(LoggingActionExecutor),
            enricher: Enricher::disabled(),
            engine: RuleEngine::new(),
            settings: GenerationSettings::default(),
        }
    }

    pub fn with_explanation_service(mut self, service: Arc<dyn ExplanationService>) -> Self {
        self.enricher = Enricher::new(service);
        self
    }

    pub fn with_executor(mut self, executor: Arc<dyn ProviderActionExecutor>) -> Self {
        self.executor = executor;
        self
    }

    pub fn with_settings(mut self, settings: GenerationSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Evaluates playbooks for every matching entity and persists new recommendations.
    /// Per-entity failures are logged and skipped; cancellation returns what was created
    /// so far.
    pub async fn generate_recommendations(
        &self,
        request: &GenerateRequest,
        cancel: &CancellationToken,
    ) -> Result<Vec<RecommendationId>, ApplicationError> {
        let playbooks = self.resolve_playbooks(request).await?;
        if playbooks.is_empty() {
            info!(
                event_name = "recommendations.generate.no_playbooks",
                account_id = %request.account_id,
                provider = request.provider.as_str(),
                "no playbooks to evaluate"
            );
            return Ok(Vec::new());
        }
        let playbooks_by_key =
            playbooks.iter().map(|playbook| (playbook.key.as_str(), playbook)).collect::<HashMap<_, _>>();

        let entities = self.resolve_entities(request).await?;
        info!(
            event_name = "recommendations.generate.started",
            account_id = %request.account_id,
            provider = request.provider.as_str(),
            playbooks = playbooks.len(),
            entities = entities.len(),
            "generating recommendations"
        );

        let mut created = Vec::new();
        for entity in &entities {
            if cancel.is_cancelled() {
                warn!(
                    event_name = "recommendations.generate.cancelled",
                    account_id = %request.account_id,
                    created = created.len(),
                    "generation cancelled"
                );
                return Ok(created);
            }

            let Some(context) = self.build_context(entity, &request.windows).await else {
                debug!(
                    event_name = "recommendations.generate.no_metrics",
                    entity_id = %entity.id,
                    scope_type = entity.scope_type.as_str(),
                    "no metric windows available; skipping entity"
                );
                continue;
            };

            for mut result in self.engine.evaluate_playbooks(&playbooks, &context) {
                if result.score <= self.settings.min_score {
                    continue;
                }
                let Some(playbook) = playbooks_by_key.get(result.playbook_key.as_str()) else {
                    continue;
                };
                match self.persist_result(playbook, &mut result, &context).await {
                    Ok(Some(id)) => created.push(id),
                    Ok(None) => {}
                    Err(error) => warn!(
                        event_name = "recommendations.generate.persist_failed",
                        entity_id = %entity.id,
                        playbook_key = %result.playbook_key,
                        error = %error,
                        "failed to persist recommendation"
                    ),
                }
            }
        }

        info!(
            event_name = "recommendations.generate.completed",
            account_id = %request.account_id,
            created = created.len(),
            "recommendation generation completed"
        );
        Ok(created)
    }

    async fn resolve_playbooks(&self, request: &GenerateRequest) -> Result<Vec<Playbook>, ApplicationError> {
        let Some(keys) = &request.playbook_keys else {
            return self
                .playbooks
                .get_filtered(&PlaybookFilter { provider: Some(request.provider), enabled: Some(true) })
                .await;
        };

        let mut playbooks = Vec::with_capacity(keys.len());
        for key in keys {
            match self.playbooks.get(key).await? {
                Some(playbook) => playbooks.push(playbook),
                None => warn!(
                    event_name = "recommendations.generate.unknown_playbook",
                    playbook_key = %key,
                    "requested playbook does not exist; skipping"
                ),
            }
        }
        Ok(playbooks)
    }

    async fn resolve_entities(&self, request: &GenerateRequest) -> Result<Vec<EntityRef>, ApplicationError> {
        let levels = match request.entity_type {
            Some(level) => vec![level],
            None => ScopeType::ALL.to_vec(),
        };

        let mut entities = Vec::new();
        for level in levels {
            let query = EntityQuery {
                entity_ids: request.entity_ids.clone(),
                ..EntityQuery::active(request.account_id.clone(), Some(request.provider), level)
            };
            entities.extend(self.entities.list_entities(&query).await?);
        }
        Ok(entities)
    }

    async fn build_context(&self, entity: &EntityRef, windows: &[MetricsWindow]) -> Option<RuleContext> {
        let mut context = RuleContext::for_entity(entity);
        for window in windows {
            let query = MetricsQuery {
                account_id: entity.account_id.clone(),
                provider: entity.provider,
                entity_type: entity.scope_type,
                entity_id: entity.id.clone(),
                window: *window,
                compare_window: true,
            };
            match self.metrics.get_metrics(&query).await {
                Ok(snapshot) => {
                    context.metrics.insert(*window, snapshot);
                }
                Err(error) => warn!(
                    event_name = "recommendations.generate.metrics_failed",
                    entity_id = %entity.id,
                    window = window.as_str(),
                    error = %error,
                    "failed to load metrics window; skipping it"
                ),
            }
        }
        (!context.metrics.is_empty()).then_some(context)
    }

    async fn persist_result(
        &self,
        playbook: &Playbook,
        result: &mut RuleEvaluationResult,
        context: &RuleContext,
    ) -> Result<Option<RecommendationId>, ApplicationError> {
        let now = Utc::now();
        let since = now - Duration::days(self.settings.dedup_window_days);

        let recent = self
            .recommendations
            .find_recent_by_rule(
                &context.account_id,
                context.entity_type,
                &context.entity_id,
                &result.playbook_key,
                since,
            )
            .await?;
        if recent.iter().any(|existing| existing.is_active(now)) {
            debug!(
                event_name = "recommendations.generate.duplicate",
                entity_id = %context.entity_id,
                playbook_key = %result.playbook_key,
                "active recommendation exists; skipping"
            );
            return Ok(None);
        }

        let enrichment = self.enricher.enrich(playbook, result, context).await;
        let recommendation = self.build_recommendation(playbook, result, context, enrichment, now);
        let id = recommendation.id.clone();

        if self.recommendations.create_if_no_active(recommendation, since, now).await? {
            info!(
                event_name = "recommendations.generate.created",
                recommendation_id = %id.0,
                entity_id = %context.entity_id,
                playbook_key = %result.playbook_key,
                score = result.score,
                "recommendation created"
            );
            Ok(Some(id))
        } else {
            debug!(
                event_name = "recommendations.generate.duplicate",
                entity_id = %context.entity_id,
                playbook_key = %result.playbook_key,
                "concurrent run created an active recommendation; skipping"
            );
            Ok(None)
        }
    }

    fn build_recommendation(
        &self,
        playbook: &Playbook,
        result: &RuleEvaluationResult,
        context: &RuleContext,
        enrichment: Option<Enrichment>,
        now: DateTime<Utc>,
    ) -> Recommendation {
        let first_action = result.actions.first().cloned();
        let recommendation_type = first_action
            .as_ref()
            .map(|action| action.action_type.as_str().to_string())
            .unwrap_or_else(|| playbook.key.clone());
        let category = Category::from_action_type(&recommendation_type);
        let (ai_explanation, ai_model) = match enrichment {
            Some(enrichment) => (Some(enrichment.explanation), Some(enrichment.model)),
            None => (None, None),
        };

        Recommendation {
            id: RecommendationId::generate(),
            account_id: context.account_id.clone(),
            provider: context.provider,
            scope_type: context.entity_type,
            scope_id: context.entity_id.clone(),
            rule_key: playbook.key.clone(),
            recommendation_type,
            title: format!("{}: {}", playbook.name, context.entity_name),
            description: result.explanation.clone(),
            priority: Priority::from_score(result.score),
            category,
            metrics_snapshot: context.primary_metrics().cloned(),
            estimated_impact: first_action.as_ref().map(|action| action.estimated_impact.clone()),
            payload: first_action,
            score: result.score,
            confidence: result.confidence,
            ai_explanation,
            ai_model,
            status: RecommendationStatus::Proposed,
            accepted_at: None,
            rejected_at: None,
            applied_at: None,
            reverted_at: None,
            snoozed_until: None,
            expires_at: Some(now + Duration::days(self.settings.expiry_days)),
            status_reason: None,
            apply_result: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub async fn get_recommendations(
        &self,
        account_id: &str,
        filters: &RecommendationFilters,
    ) -> Result<Vec<RecommendationWithFeedback>, ApplicationError> {
        let recommendations = self.recommendations.list(account_id, filters, Utc::now()).await?;

        let mut with_feedback = Vec::with_capacity(recommendations.len());
        for recommendation in recommendations {
            let feedback = self
                .feedback
                .list_for_recommendation(&recommendation.id, RECENT_FEEDBACK_LIMIT)
                .await?;
            with_feedback.push(RecommendationWithFeedback { recommendation, feedback });
        }
        Ok(with_feedback)
    }

    pub async fn perform_action(&self, request: ActionRequest) -> Result<Recommendation, ApplicationError> {
        let mut recommendation = self
            .recommendations
            .find_by_id(&request.recommendation_id)
            .await?
            .ok_or_else(|| ApplicationError::not_found("recommendation", request.recommendation_id.0.clone()))?;
        let now = Utc::now();

        match request.action {
            RecommendationAction::Accept => recommendation.accept(now)?,
            RecommendationAction::Reject => recommendation.reject(now, request.reason.clone())?,
            RecommendationAction::Snooze => {
                recommendation.snooze(now, request.snooze_days.unwrap_or(DEFAULT_SNOOZE_DAYS))?
            }
            RecommendationAction::Apply => {
                recommendation.mark_applied(now, request.result.clone())?;
                let outcome = self.executor.apply(&recommendation).await?;
                if recommendation.apply_result.is_none() {
                    recommendation.apply_result = Some(outcome);
                }
            }
            RecommendationAction::Revert => {
                recommendation.mark_reverted(now, request.reason.clone())?;
                let outcome = self.executor.revert(&recommendation).await?;
                debug!(
                    event_name = "recommendations.action.revert_outcome",
                    recommendation_id = %recommendation.id.0,
                    outcome = %outcome,
                    "provider revert finished"
                );
            }
        }

        self.recommendations.save(recommendation.clone()).await?;
        info!(
            event_name = "recommendations.action.performed",
            recommendation_id = %recommendation.id.0,
            action = request.action.as_str(),
            status = recommendation.status.as_str(),
            "recommendation action performed"
        );
        Ok(recommendation)
    }

    pub async fn add_feedback(
        &self,
        recommendation_id: &RecommendationId,
        account_id: &str,
        user_id: &str,
        feedback_type: FeedbackType,
        comment: Option<String>,
    ) -> Result<Feedback, ApplicationError> {
        if self.recommendations.find_by_id(recommendation_id).await?.is_none() {
            return Err(ApplicationError::not_found("recommendation", recommendation_id.0.clone()));
        }

        let feedback = Feedback {
            id: format!("fb_{}", uuid::Uuid::new_v4().simple()),
            recommendation_id: recommendation_id.clone(),
            account_id: account_id.to_string(),
            user_id: user_id.to_string(),
            label: feedback_type.label(),
            comment,
            created_at: Utc::now(),
        };
        self.feedback.add(feedback.clone()).await?;
        Ok(feedback)
    }

    pub async fn get_statistics(&self, account_id: &str) -> Result<RecommendationStatistics, ApplicationError> {
        self.recommendations.statistics(account_id).await
    }
}

/// Convenience for callers that hold an `apply` payload as raw JSON text.
pub fn parse_apply_result(raw: Option<&str>) -> Result<Option<Value>, ApplicationError> {
    raw.map(|raw| {
        serde_json::from_str(raw).map_err(|error| {
            ApplicationError::Domain(crate::errors::DomainError::InvariantViolation(format!(
                "apply result is not valid JSON: {error}"
            )))
        })
    })
    .transpose()
}

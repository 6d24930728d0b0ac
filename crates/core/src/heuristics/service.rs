use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, info, warn};

use super::describe::fallback_description;
use super::rules::{HeuristicRule, RULES};
use crate::domain::entity::{EntityRef, ScopeType};
use crate::domain::metrics::{DailyMetrics, MetricTotals, MetricsSnapshot};
use crate::domain::recommendation::{
    Priority, Recommendation, RecommendationFilters, RecommendationId, RecommendationStatus,
};
use crate::errors::ApplicationError;
use crate::recommendations::ports::{
    DailyMetricsSource, DescriptionGenerator, DescriptionRequest, EntityQuery, EntityStore,
    RecommendationStore,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct HeuristicSettings {
    /// Days of daily rows loaded per campaign; the newest is the current day.
    pub history_days: u32,
    pub dedup_hours: i64,
    pub expiry_days: i64,
}

impl Default for HeuristicSettings {
    fn default() -> Self {
        Self { history_days: 31, dedup_hours: 24, expiry_days: 30 }
    }
}

pub fn heuristic_score(priority: Priority, metrics: &DailyMetrics) -> f64 {
    let mut score: f64 = match priority {
        Priority::Critical => 90.0,
        Priority::High => 70.0,
        Priority::Medium => 50.0,
        Priority::Low => 30.0,
    };
    if metrics.spend > 1_000.0 {
        score += 10.0;
    }
    if metrics.spend > 5_000.0 {
        score += 10.0;
    }
    if metrics.impressions > 100_000.0 {
        score += 5.0;
    }
    if metrics.conversions > 100.0 {
        score += 5.0;
    }
    score.min(100.0)
}

pub fn heuristic_confidence(history_len: usize, metrics: &DailyMetrics) -> f64 {
    let mut confidence: f64 = 0.5;
    if history_len > 7 {
        confidence += 0.2;
    }
    if history_len > 14 {
        confidence += 0.1;
    }
    if metrics.impressions > 10_000.0 {
        confidence += 0.1;
    }
    if metrics.clicks > 100.0 {
        confidence += 0.1;
    }
    confidence.min(1.0)
}

/// Threshold rules evaluated directly on daily campaign metrics, without playbooks.
pub struct HeuristicService {
    entities: Arc<dyn EntityStore>,
    daily_metrics: Arc<dyn DailyMetricsSource>,
    recommendations: Arc<dyn RecommendationStore>,
    descriptions: Option<Arc<dyn DescriptionGenerator>>,
    settings: HeuristicSettings,
}

impl HeuristicService {
    pub fn new(
        entities: Arc<dyn EntityStore>,
        daily_metrics: Arc<dyn DailyMetricsSource>,
        recommendations: Arc<dyn RecommendationStore>,
    ) -> Self {
        Self {
            entities,
            daily_metrics,
            recommendations,
            descriptions: None,
            settings: HeuristicSettings::default(),
        }
    }

    pub fn with_description_generator(mut self, generator: Arc<dyn DescriptionGenerator>) -> Self {
        self.descriptions = Some(generator);
        self
    }

    pub fn with_settings(mut self, settings: HeuristicSettings) -> Self {
        self.settings = settings;
        self
    }

    pub async fn generate_recommendations(
        &self,
        account_id: &str,
    ) -> Result<Vec<Recommendation>, ApplicationError> {
        let campaigns = self
            .entities
            .list_entities(&EntityQuery::active(account_id, None, ScopeType::Campaign))
            .await?;

        let mut created = Vec::new();
        for campaign in &campaigns {
            let days = match self
                .daily_metrics
                .daily_metrics(account_id, &campaign.id, self.settings.history_days)
                .await
            {
                Ok(days) => days,
                Err(error) => {
                    warn!(
                        event_name = "heuristics.generate.metrics_failed",
                        campaign_id = %campaign.id,
                        error = %error,
                        "failed to load daily metrics; skipping campaign"
                    );
                    continue;
                }
            };
            let Some((current, history)) = days.split_last() else {
                continue;
            };

            for rule in RULES.iter().filter(|rule| rule.matches(current, history)) {
                match self.create_for_rule(campaign, rule, current, history).await {
                    Ok(Some(recommendation)) => created.push(recommendation),
                    Ok(None) => {}
                    Err(error) => warn!(
                        event_name = "heuristics.generate.persist_failed",
                        campaign_id = %campaign.id,
                        rule_id = rule.id,
                        error = %error,
                        "failed to persist heuristic recommendation"
                    ),
                }
            }
        }

        info!(
            event_name = "heuristics.generate.completed",
            account_id = %account_id,
            campaigns = campaigns.len(),
            created = created.len(),
            "heuristic generation completed"
        );
        Ok(created)
    }

    async fn create_for_rule(
        &self,
        campaign: &EntityRef,
        rule: &HeuristicRule,
        current: &DailyMetrics,
        history: &[DailyMetrics],
    ) -> Result<Option<Recommendation>, ApplicationError> {
        let now = Utc::now();
        let since = now - Duration::hours(self.settings.dedup_hours);

        let recent = self
            .recommendations
            .find_recent_by_rule(&campaign.account_id, ScopeType::Campaign, &campaign.id, rule.id, since)
            .await?;
        if recent.iter().any(|existing| existing.status == RecommendationStatus::Proposed) {
            debug!(
                event_name = "heuristics.generate.duplicate",
                campaign_id = %campaign.id,
                rule_id = rule.id,
                "proposed recommendation exists; skipping"
            );
            return Ok(None);
        }

        let description = self.describe(campaign, rule, current).await;
        let recommendation = self.build_recommendation(campaign, rule, current, history, description, now);
        if self
            .recommendations
            .create_if_none_with_status(recommendation.clone(), &[RecommendationStatus::Proposed], since, now)
            .await?
        {
            Ok(Some(recommendation))
        } else {
            Ok(None)
        }
    }

    async fn describe(&self, campaign: &EntityRef, rule: &HeuristicRule, current: &DailyMetrics) -> String {
        if let Some(generator) = &self.descriptions {
            let request = DescriptionRequest {
                rule_id: rule.id.to_string(),
                rule_name: rule.name.to_string(),
                recommendation_type: rule.recommendation_type.to_string(),
                campaign_name: campaign.name.clone(),
                metrics: current.clone(),
            };
            match generator.describe(&request).await {
                Ok(text) if !text.trim().is_empty() => return text.trim().to_string(),
                Ok(_) => warn!(
                    event_name = "heuristics.describe.empty",
                    rule_id = rule.id,
                    "description generator returned empty text; using fallback"
                ),
                Err(error) => warn!(
                    event_name = "heuristics.describe.failed",
                    rule_id = rule.id,
                    error = %error,
                    "description generator failed; using fallback"
                ),
            }
        }
        fallback_description(rule.id, current)
    }

    fn build_recommendation(
        &self,
        campaign: &EntityRef,
        rule: &HeuristicRule,
        current: &DailyMetrics,
        history: &[DailyMetrics],
        description: String,
        now: DateTime<Utc>,
    ) -> Recommendation {
        let score = heuristic_score(rule.priority, current);
        let snapshot = MetricsSnapshot::from_totals(MetricTotals {
            impressions: current.impressions,
            clicks: current.clicks,
            spend: current.spend,
            conversions: current.conversions,
            revenue: current.revenue,
            reach: 0.0,
        });

        Recommendation {
            id: RecommendationId::generate(),
            account_id: campaign.account_id.clone(),
            provider: campaign.provider,
            scope_type: ScopeType::Campaign,
            scope_id: campaign.id.clone(),
            rule_key: rule.id.to_string(),
            recommendation_type: rule.recommendation_type.to_string(),
            title: format!("{}: {}", rule.name, campaign.name),
            description,
            priority: Priority::from_score(score),
            category: rule.category,
            payload: None,
            metrics_snapshot: Some(snapshot),
            estimated_impact: None,
            score,
            confidence: heuristic_confidence(history.len(), current),
            ai_explanation: None,
            ai_model: None,
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

    pub async fn accept_recommendation(&self, id: &RecommendationId) -> Result<Recommendation, ApplicationError> {
        self.transition(id, |recommendation, now| recommendation.accept(now)).await
    }

    pub async fn reject_recommendation(
        &self,
        id: &RecommendationId,
        reason: Option<String>,
    ) -> Result<Recommendation, ApplicationError> {
        self.transition(id, move |recommendation, now| recommendation.reject(now, reason)).await
    }

    pub async fn snooze_recommendation(
        &self,
        id: &RecommendationId,
        days: i64,
    ) -> Result<Recommendation, ApplicationError> {
        self.transition(id, |recommendation, now| recommendation.snooze(now, days)).await
    }

    /// Proposed, unexpired and not currently snoozed.
    pub async fn get_active_recommendations(
        &self,
        account_id: &str,
    ) -> Result<Vec<Recommendation>, ApplicationError> {
        let now = Utc::now();
        let filters = RecommendationFilters {
            status: Some(RecommendationStatus::Proposed),
            ..RecommendationFilters::default()
        };
        let recommendations = self.recommendations.list(account_id, &filters, now).await?;
        Ok(recommendations.into_iter().filter(|recommendation| !recommendation.is_snoozed(now)).collect())
    }

    pub async fn get_all_recommendations(
        &self,
        account_id: &str,
    ) -> Result<Vec<Recommendation>, ApplicationError> {
        self.recommendations.list(account_id, &RecommendationFilters::default(), Utc::now()).await
    }

    async fn transition<F>(&self, id: &RecommendationId, apply: F) -> Result<Recommendation, ApplicationError>
    where
        F: FnOnce(&mut Recommendation, DateTime<Utc>) -> Result<(), crate::errors::DomainError>,
    {
        let mut recommendation = self
            .recommendations
            .find_by_id(id)
            .await?
            .ok_or_else(|| ApplicationError::not_found("recommendation", id.0.clone()))?;
        apply(&mut recommendation, Utc::now())?;
        self.recommendations.save(recommendation.clone()).await?;
        Ok(recommendation)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::{Duration, NaiveDate};

    use super::*;
    use crate::domain::entity::Provider;
    use crate::recommendations::fakes::{FakeDailyMetrics, FakeDescriptions, FakeEntities, MemoryRecommendations};

    fn campaign() -> EntityRef {
        EntityRef {
            account_id: "acct-1".to_string(),
            provider: Provider::Google,
            scope_type: ScopeType::Campaign,
            id: "cmp-1".to_string(),
            name: "Search Brand".to_string(),
            objective: None,
        }
    }

    fn day(offset: i64, impressions: f64, clicks: f64, spend: f64) -> DailyMetrics {
        DailyMetrics {
            // 2026-10-01 is a Thursday; offset 13 lands on Wednesday 2026-10-14.
            date: NaiveDate::from_ymd_opt(2026, 10, 1).unwrap_or_default() + Duration::days(offset),
            impressions,
            clicks,
            spend,
            conversions: 1.0,
            revenue: spend * 3.0,
        }
    }

    fn low_ctr_days() -> Vec<DailyMetrics> {
        let mut days = (0..13).map(|offset| day(offset, 5_000.0, 100.0, 40.0)).collect::<Vec<_>>();
        days.push(day(13, 5_000.0, 15.0, 40.0));
        days
    }

    fn service(days: Vec<DailyMetrics>, store: Arc<MemoryRecommendations>) -> HeuristicService {
        HeuristicService::new(Arc::new(FakeEntities(vec![campaign()])), Arc::new(FakeDailyMetrics(days)), store)
    }

    #[test]
    fn score_adds_volume_bonuses_and_clamps() {
        let quiet = day(0, 1_000.0, 10.0, 10.0);
        assert_eq!(heuristic_score(Priority::Low, &quiet), 30.0);
        assert_eq!(heuristic_score(Priority::High, &quiet), 70.0);

        let busy = DailyMetrics { conversions: 150.0, ..day(0, 200_000.0, 10.0, 6_000.0) };
        assert_eq!(heuristic_score(Priority::Medium, &busy), 80.0);
        assert_eq!(heuristic_score(Priority::Critical, &busy), 100.0);
    }

    #[test]
    fn confidence_grows_with_history_and_volume() {
        let quiet = day(0, 1_000.0, 10.0, 10.0);
        assert!((heuristic_confidence(7, &quiet) - 0.5).abs() < 1e-9);
        assert!((heuristic_confidence(8, &quiet) - 0.7).abs() < 1e-9);
        assert!((heuristic_confidence(15, &quiet) - 0.8).abs() < 1e-9);

        let busy = day(0, 20_000.0, 200.0, 10.0);
        assert!((heuristic_confidence(30, &busy) - 1.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn low_ctr_campaign_yields_creative_refresh_with_formatted_ctr() {
        let store = Arc::new(MemoryRecommendations::default());

        let created = service(low_ctr_days(), store.clone())
            .generate_recommendations("acct-1")
            .await
            .expect("generate");

        let low_ctr = created.iter().find(|rec| rec.rule_key == "low-ctr").expect("low-ctr recommendation");
        assert_eq!(low_ctr.recommendation_type, "creative_refresh");
        assert_eq!(low_ctr.priority, Priority::from_score(low_ctr.score));
        assert_eq!(low_ctr.score, 70.0);
        assert!(low_ctr.description.contains("0.30%"), "{}", low_ctr.description);
        assert!((low_ctr.confidence - 0.7).abs() < 1e-9);
        assert_eq!(store.all().await.len(), created.len());
    }

    #[tokio::test]
    async fn proposed_recommendation_within_a_day_blocks_duplicates() {
        let store = Arc::new(MemoryRecommendations::default());
        let service = service(low_ctr_days(), store.clone());

        let first = service.generate_recommendations("acct-1").await.expect("first");
        let second = service.generate_recommendations("acct-1").await.expect("second");

        assert!(!first.is_empty());
        assert!(second.is_empty());
    }

    fn low_ctr_from(created: &[Recommendation]) -> Recommendation {
        created.iter().find(|rec| rec.rule_key == "low-ctr").cloned().expect("low-ctr recommendation")
    }

    #[tokio::test]
    async fn accepted_recommendation_does_not_block_a_new_proposal() {
        let store = Arc::new(MemoryRecommendations::default());
        let service = service(low_ctr_days(), store.clone());

        let first = low_ctr_from(&service.generate_recommendations("acct-1").await.expect("first"));
        service.accept_recommendation(&first.id).await.expect("accept");
        let second = service.generate_recommendations("acct-1").await.expect("second");

        let fresh = low_ctr_from(&second);
        assert_ne!(fresh.id, first.id);
        assert_eq!(fresh.status, RecommendationStatus::Proposed);
    }

    #[tokio::test]
    async fn rejected_recommendation_does_not_block_a_new_proposal() {
        let store = Arc::new(MemoryRecommendations::default());
        let service = service(low_ctr_days(), store.clone());

        let first = low_ctr_from(&service.generate_recommendations("acct-1").await.expect("first"));
        service.reject_recommendation(&first.id, None).await.expect("reject");
        let second = service.generate_recommendations("acct-1").await.expect("second");

        assert!(second.iter().any(|rec| rec.rule_key == "low-ctr" && rec.id != first.id));
    }

    #[tokio::test]
    async fn proposed_recommendation_older_than_a_day_does_not_block() {
        let store = Arc::new(MemoryRecommendations::default());
        let service = service(low_ctr_days(), store.clone());

        let mut first = low_ctr_from(&service.generate_recommendations("acct-1").await.expect("first"));
        first.created_at = Utc::now() - Duration::hours(25);
        store.save(first.clone()).await.expect("backdate");
        let second = service.generate_recommendations("acct-1").await.expect("second");

        assert!(second.iter().any(|rec| rec.rule_key == "low-ctr" && rec.id != first.id));
    }

    #[tokio::test]
    async fn generator_text_is_used_and_failures_fall_back() {
        let store = Arc::new(MemoryRecommendations::default());
        let generated = service(low_ctr_days(), store.clone())
            .with_description_generator(Arc::new(FakeDescriptions { fail: false }))
            .generate_recommendations("acct-1")
            .await
            .expect("generate");
        assert!(generated[0].description.starts_with("generated: "));

        let fallback_store = Arc::new(MemoryRecommendations::default());
        let fallback = service(low_ctr_days(), fallback_store)
            .with_description_generator(Arc::new(FakeDescriptions { fail: true }))
            .generate_recommendations("acct-1")
            .await
            .expect("generate");
        assert!(fallback[0].description.contains("0.30%"));
    }

    #[tokio::test]
    async fn campaigns_without_metrics_are_skipped() {
        let created = service(Vec::new(), Arc::new(MemoryRecommendations::default()))
            .generate_recommendations("acct-1")
            .await
            .expect("generate");

        assert!(created.is_empty());
    }

    #[tokio::test]
    async fn lifecycle_and_active_listing() {
        let store = Arc::new(MemoryRecommendations::default());
        let service = service(low_ctr_days(), store.clone());
        let created = service.generate_recommendations("acct-1").await.expect("generate");
        let id = created[0].id.clone();

        let snoozed = service.snooze_recommendation(&id, 3).await.expect("snooze");
        assert_eq!(snoozed.status, RecommendationStatus::Proposed);
        let active = service.get_active_recommendations("acct-1").await.expect("active");
        assert!(active.iter().all(|rec| rec.id != id));

        let rejected = service
            .reject_recommendation(&id, Some("seasonal dip".to_string()))
            .await
            .expect("reject");
        assert_eq!(rejected.status, RecommendationStatus::Rejected);
        assert_eq!(rejected.status_reason.as_deref(), Some("seasonal dip"));
        assert!(service.accept_recommendation(&id).await.is_err());

        let all = service.get_all_recommendations("acct-1").await.expect("all");
        assert_eq!(all.len(), created.len());

        let missing = service
            .accept_recommendation(&RecommendationId("rec_missing".to_string()))
            .await
            .expect_err("missing");
        assert!(matches!(missing, ApplicationError::NotFound { .. }));
    }
}

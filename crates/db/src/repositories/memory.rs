use std::collections::HashMap;

use adpilot_core::domain::entity::{Ad, AdGroup, Campaign, EntityRef, EntityStatus, ScopeType};
use adpilot_core::domain::metrics::{DailyMetrics, MetricTotals, MetricsSnapshot};
use adpilot_core::domain::recommendation::{
    Feedback, Recommendation, RecommendationFilters, RecommendationId, RecommendationStatistics,
    RecommendationStatus,
};
use adpilot_core::recommendations::ports::{
    DailyMetricsSource, EntityQuery, EntityStore, FeedbackStore, MetricsQuery,
    MetricsWindowProvider, PortResult, RecommendationStore,
};
use chrono::{DateTime, Duration, NaiveDate, Utc};
use tokio::sync::RwLock;

use super::insight::{trend_between, InsightRow};

#[derive(Default)]
pub struct InMemoryRecommendationRepository {
    recommendations: RwLock<HashMap<String, Recommendation>>,
}

#[async_trait::async_trait]
impl RecommendationStore for InMemoryRecommendationRepository {
    async fn create_if_none_with_status(
        &self,
        recommendation: Recommendation,
        statuses: &[RecommendationStatus],
        since: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> PortResult<bool> {
        // Check and insert under one write guard.
        let mut recommendations = self.recommendations.write().await;
        if recommendations
            .values()
            .any(|existing| existing.blocks(&recommendation, statuses, since, now))
        {
            return Ok(false);
        }
        recommendations.insert(recommendation.id.0.clone(), recommendation);
        Ok(true)
    }

    async fn find_by_id(&self, id: &RecommendationId) -> PortResult<Option<Recommendation>> {
        let recommendations = self.recommendations.read().await;
        Ok(recommendations.get(&id.0).cloned())
    }

    async fn list(
        &self,
        account_id: &str,
        filters: &RecommendationFilters,
        now: DateTime<Utc>,
    ) -> PortResult<Vec<Recommendation>> {
        let recommendations = self.recommendations.read().await;
        let mut matching = recommendations
            .values()
            .filter(|rec| rec.account_id == account_id && !rec.is_expired(now) && filters.matches(rec))
            .cloned()
            .collect::<Vec<_>>();
        matching.sort_by(|left, right| {
            right.score.total_cmp(&left.score).then_with(|| right.created_at.cmp(&left.created_at))
        });
        Ok(matching)
    }

    async fn save(&self, recommendation: Recommendation) -> PortResult<()> {
        let mut recommendations = self.recommendations.write().await;
        recommendations.insert(recommendation.id.0.clone(), recommendation);
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
        let recommendations = self.recommendations.read().await;
        let mut recent = recommendations
            .values()
            .filter(|rec| {
                rec.account_id == account_id
                    && rec.scope_type == scope_type
                    && rec.scope_id == scope_id
                    && rec.rule_key == rule_key
                    && rec.created_at >= since
            })
            .cloned()
            .collect::<Vec<_>>();
        recent.sort_by(|left, right| right.created_at.cmp(&left.created_at));
        Ok(recent)
    }

    async fn statistics(&self, account_id: &str) -> PortResult<RecommendationStatistics> {
        let recommendations = self.recommendations.read().await;
        Ok(RecommendationStatistics::from_recommendations(
            recommendations.values().filter(|rec| rec.account_id == account_id),
        ))
    }
}

#[derive(Default)]
pub struct InMemoryFeedbackRepository {
    feedback: RwLock<Vec<Feedback>>,
}

#[async_trait::async_trait]
impl FeedbackStore for InMemoryFeedbackRepository {
    async fn add(&self, feedback: Feedback) -> PortResult<()> {
        self.feedback.write().await.push(feedback);
        Ok(())
    }

    async fn list_for_recommendation(
        &self,
        recommendation_id: &RecommendationId,
        limit: usize,
    ) -> PortResult<Vec<Feedback>> {
        let feedback = self.feedback.read().await;
        Ok(feedback
            .iter()
            .rev()
            .filter(|entry| &entry.recommendation_id == recommendation_id)
            .take(limit)
            .cloned()
            .collect())
    }
}

#[derive(Default)]
pub struct InMemoryEntityRepository {
    campaigns: RwLock<HashMap<String, Campaign>>,
    ad_groups: RwLock<HashMap<String, AdGroup>>,
    ads: RwLock<HashMap<String, Ad>>,
}

impl InMemoryEntityRepository {
    pub async fn save_campaign(&self, campaign: Campaign) {
        self.campaigns.write().await.insert(campaign.id.clone(), campaign);
    }

    pub async fn save_ad_group(&self, ad_group: AdGroup) {
        self.ad_groups.write().await.insert(ad_group.id.clone(), ad_group);
    }

    pub async fn save_ad(&self, ad: Ad) {
        self.ads.write().await.insert(ad.id.clone(), ad);
    }
}

#[async_trait::async_trait]
impl EntityStore for InMemoryEntityRepository {
    async fn list_entities(&self, query: &EntityQuery) -> PortResult<Vec<EntityRef>> {
        let campaigns = self.campaigns.read().await;
        let ad_groups = self.ad_groups.read().await;
        let ads = self.ads.read().await;

        let campaign_objective = |campaign_id: &str| {
            campaigns.get(campaign_id).and_then(|campaign| campaign.objective.clone())
        };

        let candidates: Vec<(EntityRef, EntityStatus)> = match query.scope_type {
            ScopeType::Campaign => campaigns
                .values()
                .map(|campaign| {
                    let entity = EntityRef {
                        account_id: campaign.account_id.clone(),
                        provider: campaign.provider,
                        scope_type: ScopeType::Campaign,
                        id: campaign.id.clone(),
                        name: campaign.name.clone(),
                        objective: campaign.objective.clone(),
                    };
                    (entity, campaign.status)
                })
                .collect(),
            ScopeType::AdGroup => ad_groups
                .values()
                .map(|ad_group| {
                    let entity = EntityRef {
                        account_id: ad_group.account_id.clone(),
                        provider: ad_group.provider,
                        scope_type: ScopeType::AdGroup,
                        id: ad_group.id.clone(),
                        name: ad_group.name.clone(),
                        objective: campaign_objective(&ad_group.campaign_id),
                    };
                    (entity, ad_group.status)
                })
                .collect(),
            ScopeType::Ad => ads
                .values()
                .map(|ad| {
                    let objective = ad_groups
                        .get(&ad.ad_group_id)
                        .and_then(|ad_group| campaign_objective(&ad_group.campaign_id));
                    let entity = EntityRef {
                        account_id: ad.account_id.clone(),
                        provider: ad.provider,
                        scope_type: ScopeType::Ad,
                        id: ad.id.clone(),
                        name: ad.name.clone(),
                        objective,
                    };
                    (entity, ad.status)
                })
                .collect(),
        };

        let mut entities = candidates
            .into_iter()
            .filter(|(entity, status)| {
                entity.account_id == query.account_id
                    && query.provider.map_or(true, |provider| entity.provider == provider)
                    && (!query.active_only || *status == EntityStatus::Active)
                    && query.entity_ids.as_ref().map_or(true, |ids| ids.contains(&entity.id))
            })
            .map(|(entity, _)| entity)
            .collect::<Vec<_>>();
        entities.sort_by(|left, right| left.name.cmp(&right.name).then_with(|| left.id.cmp(&right.id)));
        Ok(entities)
    }
}

/// Same window semantics as the SQL repository, over rows held in memory.
pub struct InMemoryInsightRepository {
    rows: RwLock<Vec<InsightRow>>,
    anchor: NaiveDate,
}

impl InMemoryInsightRepository {
    pub fn new(anchor: NaiveDate) -> Self {
        Self { rows: RwLock::new(Vec::new()), anchor }
    }

    pub async fn save_daily(&self, row: InsightRow) {
        let mut rows = self.rows.write().await;
        rows.retain(|existing| {
            !(existing.entity_type == row.entity_type
                && existing.entity_id == row.entity_id
                && existing.date == row.date)
        });
        rows.push(row);
    }

    async fn sum_range(&self, query: &MetricsQuery, start: NaiveDate, end: NaiveDate) -> MetricTotals {
        let rows = self.rows.read().await;
        rows.iter()
            .filter(|row| {
                row.account_id == query.account_id
                    && row.provider == query.provider
                    && row.entity_type == query.entity_type
                    && row.entity_id == query.entity_id
                    && row.date >= start
                    && row.date <= end
            })
            .fold(MetricTotals::default(), |mut acc, row| {
                acc.impressions += row.totals.impressions;
                acc.clicks += row.totals.clicks;
                acc.spend += row.totals.spend;
                acc.conversions += row.totals.conversions;
                acc.revenue += row.totals.revenue;
                acc.reach += row.totals.reach;
                acc
            })
    }
}

#[async_trait::async_trait]
impl MetricsWindowProvider for InMemoryInsightRepository {
    async fn get_metrics(&self, query: &MetricsQuery) -> PortResult<MetricsSnapshot> {
        let days = query.window.days();
        let start = self.anchor - Duration::days(days - 1);
        let current = self.sum_range(query, start, self.anchor).await;
        let snapshot = MetricsSnapshot::from_totals(current);
        if !query.compare_window {
            return Ok(snapshot);
        }

        let previous_end = start - Duration::days(1);
        let previous =
            self.sum_range(query, previous_end - Duration::days(days - 1), previous_end).await;
        Ok(snapshot.with_trend(trend_between(&current, &previous)))
    }
}

#[async_trait::async_trait]
impl DailyMetricsSource for InMemoryInsightRepository {
    async fn daily_metrics(
        &self,
        account_id: &str,
        campaign_id: &str,
        days: u32,
    ) -> PortResult<Vec<DailyMetrics>> {
        let start = self.anchor - Duration::days(i64::from(days.max(1)) - 1);
        let rows = self.rows.read().await;
        let mut daily = rows
            .iter()
            .filter(|row| {
                row.account_id == account_id
                    && row.entity_type == ScopeType::Campaign
                    && row.entity_id == campaign_id
                    && row.date >= start
                    && row.date <= self.anchor
            })
            .map(|row| DailyMetrics {
                date: row.date,
                impressions: row.totals.impressions,
                clicks: row.totals.clicks,
                spend: row.totals.spend,
                conversions: row.totals.conversions,
                revenue: row.totals.revenue,
            })
            .collect::<Vec<_>>();
        daily.sort_by_key(|day| day.date);
        Ok(daily)
    }
}

#[cfg(test)]
mod tests {
    use adpilot_core::domain::entity::{AdGroup, Campaign, EntityStatus, Provider, ScopeType};
    use adpilot_core::domain::recommendation::{
        Category, Priority, Recommendation, RecommendationId, RecommendationStatus,
    };
    use adpilot_core::recommendations::ports::{EntityQuery, EntityStore, RecommendationStore};
    use chrono::{Duration, Utc};

    use super::{InMemoryEntityRepository, InMemoryRecommendationRepository};

    fn proposed(id: &str) -> Recommendation {
        let now = Utc::now();
        Recommendation {
            id: RecommendationId(id.to_string()),
            account_id: "acct-1".to_string(),
            provider: Provider::Google,
            scope_type: ScopeType::AdGroup,
            scope_id: "ag-1".to_string(),
            rule_key: "reduce_bids_high_cpc".to_string(),
            recommendation_type: "bid_adjustment".to_string(),
            title: "Reduce bids".to_string(),
            description: "CPC is high".to_string(),
            priority: Priority::Medium,
            category: Category::Bidding,
            payload: None,
            metrics_snapshot: None,
            estimated_impact: None,
            score: 42.0,
            confidence: 1.0,
            ai_explanation: None,
            ai_model: None,
            status: RecommendationStatus::Proposed,
            accepted_at: None,
            rejected_at: None,
            applied_at: None,
            reverted_at: None,
            snoozed_until: None,
            expires_at: Some(now + Duration::days(30)),
            status_reason: None,
            apply_result: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn conditional_insert_is_idempotent_per_scope_and_rule() {
        let repo = InMemoryRecommendationRepository::default();
        let now = Utc::now();
        let since = now - Duration::days(7);

        assert!(repo.create_if_no_active(proposed("rec-1"), since, now).await.expect("insert"));
        assert!(!repo.create_if_no_active(proposed("rec-2"), since, now).await.expect("insert"));

        let stats = repo.statistics("acct-1").await.expect("stats");
        assert_eq!(stats.total, 1);
    }

    #[tokio::test]
    async fn ad_groups_resolve_objective_through_campaign() {
        let repo = InMemoryEntityRepository::default();
        repo.save_campaign(Campaign {
            id: "cmp-1".to_string(),
            account_id: "acct-1".to_string(),
            provider: Provider::Google,
            name: "Search".to_string(),
            status: EntityStatus::Active,
            objective: Some("sales".to_string()),
            daily_budget: None,
        })
        .await;
        repo.save_ad_group(AdGroup {
            id: "ag-1".to_string(),
            account_id: "acct-1".to_string(),
            provider: Provider::Google,
            campaign_id: "cmp-1".to_string(),
            name: "Brand".to_string(),
            status: EntityStatus::Paused,
        })
        .await;

        let active = repo
            .list_entities(&EntityQuery::active("acct-1", None, ScopeType::AdGroup))
            .await
            .expect("list");
        assert!(active.is_empty());

        let all = repo
            .list_entities(&EntityQuery {
                active_only: false,
                ..EntityQuery::active("acct-1", None, ScopeType::AdGroup)
            })
            .await
            .expect("list");
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].objective.as_deref(), Some("sales"));
    }
}

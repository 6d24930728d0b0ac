use std::collections::BTreeMap;

use adpilot_core::domain::entity::{Provider, ScopeType};
use adpilot_core::domain::recommendation::{
    Category, Priority, Recommendation, RecommendationFilters, RecommendationId,
    RecommendationStatistics, RecommendationStatus,
};
use adpilot_core::recommendations::ports::{PortResult, RecommendationStore};
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::{QueryBuilder, Sqlite};

use super::{
    column, decode_enum, decode_optional_timestamp, decode_timestamp, encode_timestamp,
    RepositoryError,
};
use crate::DbPool;

const RECOMMENDATION_COLUMNS: &str = "id, account_id, provider, scope_type, scope_id, rule_key,
    recommendation_type, title, description, priority, category, payload_json,
    metrics_snapshot_json, estimated_impact_json, score, confidence, ai_explanation, ai_model,
    status, accepted_at, rejected_at, applied_at, reverted_at, snoozed_until, expires_at,
    status_reason, apply_result_json, created_at, updated_at";

pub struct SqlRecommendationRepository {
    pool: DbPool,
}

impl SqlRecommendationRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    async fn insert_unless_matching(
        &self,
        recommendation: &Recommendation,
        statuses: &[RecommendationStatus],
        since: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<bool, RepositoryError> {
        let encoded = EncodedRecommendation::encode(recommendation)?;
        let status_placeholders = vec!["?"; statuses.len()].join(", ");

        // A single statement, so the existence check and insert cannot interleave.
        let sql = format!(
            "INSERT INTO recommendations (id, account_id, provider, scope_type, scope_id, rule_key,
                recommendation_type, title, description, priority, category, payload_json,
                metrics_snapshot_json, estimated_impact_json, score, confidence, ai_explanation,
                ai_model, status, accepted_at, rejected_at, applied_at, reverted_at, snoozed_until,
                expires_at, status_reason, apply_result_json, created_at, updated_at)
             SELECT ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?
             WHERE NOT EXISTS (
                 SELECT 1 FROM recommendations
                 WHERE account_id = ? AND scope_type = ? AND scope_id = ? AND rule_key = ?
                   AND created_at >= ?
                   AND status IN ({status_placeholders})
                   AND (expires_at IS NULL OR expires_at > ?)
             )"
        );
        let mut query = encoded
            .bind_all(sqlx::query(&sql))
            .bind(&recommendation.account_id)
            .bind(recommendation.scope_type.as_str())
            .bind(&recommendation.scope_id)
            .bind(&recommendation.rule_key)
            .bind(encode_timestamp(since));
        for status in statuses {
            query = query.bind(status.as_str());
        }
        let result = query.bind(encode_timestamp(now)).execute(&self.pool).await?;

        Ok(result.rows_affected() == 1)
    }

    async fn upsert(&self, recommendation: &Recommendation) -> Result<(), RepositoryError> {
        let encoded = EncodedRecommendation::encode(recommendation)?;
        let query = sqlx::query(
            "INSERT INTO recommendations (id, account_id, provider, scope_type, scope_id, rule_key,
                recommendation_type, title, description, priority, category, payload_json,
                metrics_snapshot_json, estimated_impact_json, score, confidence, ai_explanation,
                ai_model, status, accepted_at, rejected_at, applied_at, reverted_at, snoozed_until,
                expires_at, status_reason, apply_result_json, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                 title = excluded.title,
                 description = excluded.description,
                 priority = excluded.priority,
                 category = excluded.category,
                 payload_json = excluded.payload_json,
                 metrics_snapshot_json = excluded.metrics_snapshot_json,
                 estimated_impact_json = excluded.estimated_impact_json,
                 score = excluded.score,
                 confidence = excluded.confidence,
                 ai_explanation = excluded.ai_explanation,
                 ai_model = excluded.ai_model,
                 status = excluded.status,
                 accepted_at = excluded.accepted_at,
                 rejected_at = excluded.rejected_at,
                 applied_at = excluded.applied_at,
                 reverted_at = excluded.reverted_at,
                 snoozed_until = excluded.snoozed_until,
                 expires_at = excluded.expires_at,
                 status_reason = excluded.status_reason,
                 apply_result_json = excluded.apply_result_json,
                 updated_at = excluded.updated_at",
        );
        encoded.bind_all(query).execute(&self.pool).await?;
        Ok(())
    }

    async fn fetch_by_id(
        &self,
        id: &RecommendationId,
    ) -> Result<Option<Recommendation>, RepositoryError> {
        let row = sqlx::query(&format!(
            "SELECT {RECOMMENDATION_COLUMNS} FROM recommendations WHERE id = ?"
        ))
        .bind(&id.0)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(row_to_recommendation).transpose()
    }

    async fn fetch_list(
        &self,
        account_id: &str,
        filters: &RecommendationFilters,
        now: DateTime<Utc>,
    ) -> Result<Vec<Recommendation>, RepositoryError> {
        let mut builder: QueryBuilder<Sqlite> = QueryBuilder::new(format!(
            "SELECT {RECOMMENDATION_COLUMNS} FROM recommendations WHERE account_id = "
        ));
        builder.push_bind(account_id.to_string());
        builder.push(" AND (expires_at IS NULL OR expires_at > ");
        builder.push_bind(encode_timestamp(now));
        builder.push(")");

        if let Some(provider) = filters.provider {
            builder.push(" AND provider = ").push_bind(provider.as_str());
        }
        if let Some(status) = filters.status {
            builder.push(" AND status = ").push_bind(status.as_str());
        }
        if let Some(priority) = filters.priority {
            builder.push(" AND priority = ").push_bind(priority.as_str());
        }
        if let Some(category) = filters.category {
            builder.push(" AND category = ").push_bind(category.as_str());
        }
        if let Some(scope_type) = filters.scope_type {
            builder.push(" AND scope_type = ").push_bind(scope_type.as_str());
        }
        builder.push(" ORDER BY score DESC, created_at DESC");

        let rows = builder.build().fetch_all(&self.pool).await?;
        rows.iter().map(row_to_recommendation).collect()
    }

    async fn fetch_recent_by_rule(
        &self,
        account_id: &str,
        scope_type: ScopeType,
        scope_id: &str,
        rule_key: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<Recommendation>, RepositoryError> {
        let rows = sqlx::query(&format!(
            "SELECT {RECOMMENDATION_COLUMNS} FROM recommendations
             WHERE account_id = ? AND scope_type = ? AND scope_id = ? AND rule_key = ?
               AND created_at >= ?
             ORDER BY created_at DESC"
        ))
        .bind(account_id)
        .bind(scope_type.as_str())
        .bind(scope_id)
        .bind(rule_key)
        .bind(encode_timestamp(since))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_recommendation).collect()
    }

    async fn fetch_statistics(
        &self,
        account_id: &str,
    ) -> Result<RecommendationStatistics, RepositoryError> {
        let totals = sqlx::query(
            "SELECT COUNT(*) AS total, COALESCE(AVG(score), 0.0) AS average_score
             FROM recommendations WHERE account_id = ?",
        )
        .bind(account_id)
        .fetch_one(&self.pool)
        .await?;

        let total: i64 = column(&totals, "total")?;
        let average_score: f64 = column(&totals, "average_score")?;

        Ok(RecommendationStatistics {
            total: u64::try_from(total).unwrap_or_default(),
            by_status: self.count_by(account_id, "status").await?,
            by_priority: self.count_by(account_id, "priority").await?,
            by_category: self.count_by(account_id, "category").await?,
            average_score,
        })
    }

    async fn count_by(
        &self,
        account_id: &str,
        group_column: &'static str,
    ) -> Result<BTreeMap<String, u64>, RepositoryError> {
        let rows = sqlx::query(&format!(
            "SELECT {group_column} AS bucket, COUNT(*) AS count
             FROM recommendations WHERE account_id = ?
             GROUP BY {group_column}"
        ))
        .bind(account_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                let bucket: String = column(row, "bucket")?;
                let count: i64 = column(row, "count")?;
                Ok((bucket, u64::try_from(count).unwrap_or_default()))
            })
            .collect()
    }
}

#[async_trait::async_trait]
impl RecommendationStore for SqlRecommendationRepository {
    async fn create_if_none_with_status(
        &self,
        recommendation: Recommendation,
        statuses: &[RecommendationStatus],
        since: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> PortResult<bool> {
        Ok(self.insert_unless_matching(&recommendation, statuses, since, now).await?)
    }

    async fn find_by_id(&self, id: &RecommendationId) -> PortResult<Option<Recommendation>> {
        Ok(self.fetch_by_id(id).await?)
    }

    async fn list(
        &self,
        account_id: &str,
        filters: &RecommendationFilters,
        now: DateTime<Utc>,
    ) -> PortResult<Vec<Recommendation>> {
        Ok(self.fetch_list(account_id, filters, now).await?)
    }

    async fn save(&self, recommendation: Recommendation) -> PortResult<()> {
        Ok(self.upsert(&recommendation).await?)
    }

    async fn find_recent_by_rule(
        &self,
        account_id: &str,
        scope_type: ScopeType,
        scope_id: &str,
        rule_key: &str,
        since: DateTime<Utc>,
    ) -> PortResult<Vec<Recommendation>> {
        Ok(self.fetch_recent_by_rule(account_id, scope_type, scope_id, rule_key, since).await?)
    }

    async fn statistics(&self, account_id: &str) -> PortResult<RecommendationStatistics> {
        Ok(self.fetch_statistics(account_id).await?)
    }
}

/// Column values in insert order.
struct EncodedRecommendation<'a> {
    recommendation: &'a Recommendation,
    payload_json: Option<String>,
    metrics_snapshot_json: Option<String>,
    estimated_impact_json: Option<String>,
    apply_result_json: Option<String>,
}

impl<'a> EncodedRecommendation<'a> {
    fn encode(recommendation: &'a Recommendation) -> Result<Self, RepositoryError> {
        Ok(Self {
            recommendation,
            payload_json: encode_json(recommendation.payload.as_ref())?,
            metrics_snapshot_json: encode_json(recommendation.metrics_snapshot.as_ref())?,
            estimated_impact_json: encode_json(recommendation.estimated_impact.as_ref())?,
            apply_result_json: recommendation.apply_result.as_ref().map(Value::to_string),
        })
    }

    fn bind_all<'q>(
        &'q self,
        query: sqlx::query::Query<'q, Sqlite, sqlx::sqlite::SqliteArguments<'q>>,
    ) -> sqlx::query::Query<'q, Sqlite, sqlx::sqlite::SqliteArguments<'q>> {
        let rec = self.recommendation;
        query
            .bind(&rec.id.0)
            .bind(&rec.account_id)
            .bind(rec.provider.as_str())
            .bind(rec.scope_type.as_str())
            .bind(&rec.scope_id)
            .bind(&rec.rule_key)
            .bind(&rec.recommendation_type)
            .bind(&rec.title)
            .bind(&rec.description)
            .bind(rec.priority.as_str())
            .bind(rec.category.as_str())
            .bind(&self.payload_json)
            .bind(&self.metrics_snapshot_json)
            .bind(&self.estimated_impact_json)
            .bind(rec.score)
            .bind(rec.confidence)
            .bind(&rec.ai_explanation)
            .bind(&rec.ai_model)
            .bind(rec.status.as_str())
            .bind(rec.accepted_at.map(encode_timestamp))
            .bind(rec.rejected_at.map(encode_timestamp))
            .bind(rec.applied_at.map(encode_timestamp))
            .bind(rec.reverted_at.map(encode_timestamp))
            .bind(rec.snoozed_until.map(encode_timestamp))
            .bind(rec.expires_at.map(encode_timestamp))
            .bind(&rec.status_reason)
            .bind(&self.apply_result_json)
            .bind(encode_timestamp(rec.created_at))
            .bind(encode_timestamp(rec.updated_at))
    }
}

fn encode_json<T: serde::Serialize>(value: Option<&T>) -> Result<Option<String>, RepositoryError> {
    value
        .map(|value| serde_json::to_string(value).map_err(|e| RepositoryError::Decode(e.to_string())))
        .transpose()
}

fn decode_json<T: serde::de::DeserializeOwned>(
    raw: Option<String>,
    column_name: &str,
) -> Result<Option<T>, RepositoryError> {
    raw.map(|raw| {
        serde_json::from_str(&raw)
            .map_err(|e| RepositoryError::Decode(format!("invalid {column_name}: {e}")))
    })
    .transpose()
}

fn row_to_recommendation(row: &sqlx::sqlite::SqliteRow) -> Result<Recommendation, RepositoryError> {
    let provider: String = column(row, "provider")?;
    let scope_type: String = column(row, "scope_type")?;
    let priority: String = column(row, "priority")?;
    let category: String = column(row, "category")?;
    let status: String = column(row, "status")?;
    let created_at: String = column(row, "created_at")?;
    let updated_at: String = column(row, "updated_at")?;

    Ok(Recommendation {
        id: RecommendationId(column(row, "id")?),
        account_id: column(row, "account_id")?,
        provider: decode_enum(&provider, "provider", Provider::parse)?,
        scope_type: decode_enum(&scope_type, "scope_type", ScopeType::parse)?,
        scope_id: column(row, "scope_id")?,
        rule_key: column(row, "rule_key")?,
        recommendation_type: column(row, "recommendation_type")?,
        title: column(row, "title")?,
        description: column(row, "description")?,
        priority: decode_enum(&priority, "priority", Priority::parse)?,
        category: decode_enum(&category, "category", Category::parse)?,
        payload: decode_json(column(row, "payload_json")?, "payload_json")?,
        metrics_snapshot: decode_json(column(row, "metrics_snapshot_json")?, "metrics_snapshot_json")?,
        estimated_impact: decode_json(column(row, "estimated_impact_json")?, "estimated_impact_json")?,
        score: column(row, "score")?,
        confidence: column(row, "confidence")?,
        ai_explanation: column(row, "ai_explanation")?,
        ai_model: column(row, "ai_model")?,
        status: decode_enum(&status, "status", RecommendationStatus::parse)?,
        accepted_at: decode_optional_timestamp(column(row, "accepted_at")?)?,
        rejected_at: decode_optional_timestamp(column(row, "rejected_at")?)?,
        applied_at: decode_optional_timestamp(column(row, "applied_at")?)?,
        reverted_at: decode_optional_timestamp(column(row, "reverted_at")?)?,
        snoozed_until: decode_optional_timestamp(column(row, "snoozed_until")?)?,
        expires_at: decode_optional_timestamp(column(row, "expires_at")?)?,
        status_reason: column(row, "status_reason")?,
        apply_result: decode_json(column(row, "apply_result_json")?, "apply_result_json")?,
        created_at: decode_timestamp(&created_at)?,
        updated_at: decode_timestamp(&updated_at)?,
    })
}

#[cfg(test)]
mod tests {
    use adpilot_core::domain::recommendation::{
        Category, Priority, Recommendation, RecommendationFilters, RecommendationId,
        RecommendationStatus,
    };
    use adpilot_core::domain::entity::{Provider, ScopeType};
    use adpilot_core::recommendations::ports::RecommendationStore;
    use chrono::{Duration, Utc};
    use serde_json::json;

    use super::SqlRecommendationRepository;
    use crate::{connect_with_settings, migrations};

    async fn setup() -> SqlRecommendationRepository {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");
        SqlRecommendationRepository::new(pool)
    }

    fn recommendation(id: &str, scope_id: &str, score: f64) -> Recommendation {
        let now = Utc::now();
        Recommendation {
            id: RecommendationId(id.to_string()),
            account_id: "acct-1".to_string(),
            provider: Provider::Meta,
            scope_type: ScopeType::Campaign,
            scope_id: scope_id.to_string(),
            rule_key: "scale_high_roas".to_string(),
            recommendation_type: "budget_change".to_string(),
            title: "Scale high-ROAS campaigns: Spring Sale".to_string(),
            description: "ROAS of 5 over 7 days".to_string(),
            priority: Priority::from_score(score),
            category: Category::Budget,
            payload: None,
            metrics_snapshot: None,
            estimated_impact: None,
            score,
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
    async fn conditional_insert_skips_when_an_open_recommendation_exists() {
        let repo = setup().await;
        let now = Utc::now();
        let since = now - Duration::days(7);

        let first = repo
            .create_if_no_active(recommendation("rec-1", "cmp-1", 50.0), since, now)
            .await
            .expect("first insert");
        let second = repo
            .create_if_no_active(recommendation("rec-2", "cmp-1", 55.0), since, now)
            .await
            .expect("second insert");
        let other_scope = repo
            .create_if_no_active(recommendation("rec-3", "cmp-2", 55.0), since, now)
            .await
            .expect("other scope insert");

        assert!(first);
        assert!(!second);
        assert!(other_scope);
        assert!(repo.find_by_id(&RecommendationId("rec-2".to_string())).await.expect("find").is_none());
    }

    #[tokio::test]
    async fn rejected_or_expired_recommendations_do_not_block() {
        let repo = setup().await;
        let now = Utc::now();
        let since = now - Duration::days(7);

        let mut rejected = recommendation("rec-1", "cmp-1", 50.0);
        rejected.status = RecommendationStatus::Rejected;
        repo.save(rejected).await.expect("save rejected");

        let mut expired = recommendation("rec-2", "cmp-2", 50.0);
        expired.expires_at = Some(now - Duration::hours(1));
        repo.save(expired).await.expect("save expired");

        assert!(repo
            .create_if_no_active(recommendation("rec-3", "cmp-1", 50.0), since, now)
            .await
            .expect("insert after rejected"));
        assert!(repo
            .create_if_no_active(recommendation("rec-4", "cmp-2", 50.0), since, now)
            .await
            .expect("insert after expired"));
    }

    #[tokio::test]
    async fn status_filtered_insert_only_counts_the_given_statuses() {
        let repo = setup().await;
        let now = Utc::now();
        let since = now - Duration::hours(24);

        let mut accepted = recommendation("rec-1", "cmp-1", 50.0);
        accepted.accept(now).expect("accept");
        repo.save(accepted).await.expect("save accepted");

        assert!(!repo
            .create_if_no_active(recommendation("rec-2", "cmp-1", 50.0), since, now)
            .await
            .expect("open-status insert"));
        assert!(repo
            .create_if_none_with_status(
                recommendation("rec-3", "cmp-1", 50.0),
                &[RecommendationStatus::Proposed],
                since,
                now,
            )
            .await
            .expect("proposed-only insert"));
        assert!(!repo
            .create_if_none_with_status(
                recommendation("rec-4", "cmp-1", 50.0),
                &[RecommendationStatus::Proposed],
                since,
                now,
            )
            .await
            .expect("second proposed-only insert"));

        let mut stale = recommendation("rec-5", "cmp-2", 50.0);
        stale.created_at = now - Duration::hours(25);
        repo.save(stale).await.expect("save stale");
        assert!(repo
            .create_if_none_with_status(
                recommendation("rec-6", "cmp-2", 50.0),
                &[RecommendationStatus::Proposed],
                since,
                now,
            )
            .await
            .expect("insert past window"));
    }

    #[tokio::test]
    async fn save_round_trips_json_columns_and_lifecycle_fields() {
        let repo = setup().await;
        let now = Utc::now();
        let mut rec = recommendation("rec-1", "cmp-1", 72.5);
        repo.save(rec.clone()).await.expect("insert");

        rec.mark_applied(now, Some(json!({"status": "not_implemented"}))).expect("apply");
        repo.save(rec.clone()).await.expect("update");

        let loaded = repo.find_by_id(&rec.id).await.expect("find").expect("present");
        assert_eq!(loaded.status, RecommendationStatus::Applied);
        assert_eq!(loaded.apply_result, Some(json!({"status": "not_implemented"})));
        assert!(loaded.applied_at.is_some());
        assert_eq!(loaded.priority, Priority::High);
    }

    #[tokio::test]
    async fn list_filters_excludes_expired_and_orders_by_score() {
        let repo = setup().await;
        let now = Utc::now();

        repo.save(recommendation("rec-low", "cmp-1", 20.0)).await.expect("save");
        repo.save(recommendation("rec-high", "cmp-2", 90.0)).await.expect("save");
        let mut expired = recommendation("rec-expired", "cmp-3", 99.0);
        expired.expires_at = Some(now - Duration::days(1));
        repo.save(expired).await.expect("save");

        let all = repo.list("acct-1", &RecommendationFilters::default(), now).await.expect("list");
        let ids = all.iter().map(|rec| rec.id.0.as_str()).collect::<Vec<_>>();
        assert_eq!(ids, vec!["rec-high", "rec-low"]);

        let critical = repo
            .list(
                "acct-1",
                &RecommendationFilters { priority: Some(Priority::Critical), ..Default::default() },
                now,
            )
            .await
            .expect("list critical");
        assert_eq!(critical.len(), 1);
        assert_eq!(critical[0].id.0, "rec-high");
    }

    #[tokio::test]
    async fn statistics_group_by_status_and_average_score() {
        let repo = setup().await;
        let now = Utc::now();

        repo.save(recommendation("rec-1", "cmp-1", 40.0)).await.expect("save");
        let mut accepted = recommendation("rec-2", "cmp-2", 80.0);
        accepted.accept(now).expect("accept");
        repo.save(accepted).await.expect("save");

        let stats = repo.statistics("acct-1").await.expect("stats");
        assert_eq!(stats.total, 2);
        assert_eq!(stats.by_status.get("proposed"), Some(&1));
        assert_eq!(stats.by_status.get("accepted"), Some(&1));
        assert_eq!(stats.by_category.get("budget"), Some(&2));
        assert!((stats.average_score - 60.0).abs() < 1e-9);

        let empty = repo.statistics("acct-unknown").await.expect("stats");
        assert_eq!(empty.total, 0);
        assert_eq!(empty.average_score, 0.0);
    }
}

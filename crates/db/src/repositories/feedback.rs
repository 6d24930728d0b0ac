use adpilot_core::domain::recommendation::{Feedback, FeedbackLabel, RecommendationId};
use adpilot_core::recommendations::ports::{FeedbackStore, PortResult};

use super::{column, decode_enum, decode_timestamp, encode_timestamp, RepositoryError};
use crate::DbPool;

pub struct SqlFeedbackRepository {
    pool: DbPool,
}

impl SqlFeedbackRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    async fn insert(&self, feedback: &Feedback) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO recommendation_feedback
                (id, recommendation_id, account_id, user_id, label, comment, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&feedback.id)
        .bind(&feedback.recommendation_id.0)
        .bind(&feedback.account_id)
        .bind(&feedback.user_id)
        .bind(feedback.label.as_str())
        .bind(&feedback.comment)
        .bind(encode_timestamp(feedback.created_at))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn fetch_for_recommendation(
        &self,
        recommendation_id: &RecommendationId,
        limit: usize,
    ) -> Result<Vec<Feedback>, RepositoryError> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let rows = sqlx::query(
            "SELECT id, recommendation_id, account_id, user_id, label, comment, created_at
             FROM recommendation_feedback
             WHERE recommendation_id = ?
             ORDER BY created_at DESC, rowid DESC
             LIMIT ?",
        )
        .bind(&recommendation_id.0)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_feedback).collect()
    }
}

fn row_to_feedback(row: &sqlx::sqlite::SqliteRow) -> Result<Feedback, RepositoryError> {
    let label: String = column(row, "label")?;
    let created_at: String = column(row, "created_at")?;

    Ok(Feedback {
        id: column(row, "id")?,
        recommendation_id: RecommendationId(column(row, "recommendation_id")?),
        account_id: column(row, "account_id")?,
        user_id: column(row, "user_id")?,
        label: decode_enum(&label, "feedback label", FeedbackLabel::parse)?,
        comment: column(row, "comment")?,
        created_at: decode_timestamp(&created_at)?,
    })
}

#[async_trait::async_trait]
impl FeedbackStore for SqlFeedbackRepository {
    async fn add(&self, feedback: Feedback) -> PortResult<()> {
        Ok(self.insert(&feedback).await?)
    }

    async fn list_for_recommendation(
        &self,
        recommendation_id: &RecommendationId,
        limit: usize,
    ) -> PortResult<Vec<Feedback>> {
        Ok(self.fetch_for_recommendation(recommendation_id, limit).await?)
    }
}

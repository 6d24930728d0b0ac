use adpilot_core::errors::ApplicationError;
use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::Row;
use thiserror::Error;

pub mod entity;
pub mod feedback;
pub mod insight;
pub mod memory;
pub mod recommendation;

pub use entity::SqlEntityRepository;
pub use feedback::SqlFeedbackRepository;
pub use insight::{InsightRow, SqlInsightRepository};
pub use memory::{
    InMemoryEntityRepository, InMemoryFeedbackRepository, InMemoryInsightRepository,
    InMemoryRecommendationRepository,
};
pub use recommendation::SqlRecommendationRepository;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
}

impl From<RepositoryError> for ApplicationError {
    fn from(error: RepositoryError) -> Self {
        ApplicationError::Persistence(error.to_string())
    }
}

/// Fixed-width UTC timestamps so stored values compare correctly as text.
pub(crate) fn encode_timestamp(value: DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub(crate) fn decode_timestamp(raw: &str) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|error| RepositoryError::Decode(format!("invalid timestamp `{raw}`: {error}")))
}

pub(crate) fn decode_optional_timestamp(
    raw: Option<String>,
) -> Result<Option<DateTime<Utc>>, RepositoryError> {
    raw.as_deref().map(decode_timestamp).transpose()
}

pub(crate) fn column<'r, T>(row: &'r sqlx::sqlite::SqliteRow, name: &str) -> Result<T, RepositoryError>
where
    T: sqlx::Decode<'r, sqlx::Sqlite> + sqlx::Type<sqlx::Sqlite>,
{
    row.try_get(name).map_err(|e| RepositoryError::Decode(e.to_string()))
}

pub(crate) fn decode_enum<T>(
    raw: &str,
    column_name: &str,
    parse: impl Fn(&str) -> Option<T>,
) -> Result<T, RepositoryError> {
    parse(raw).ok_or_else(|| RepositoryError::Decode(format!("unknown {column_name} `{raw}`")))
}

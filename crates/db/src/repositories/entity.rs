use adpilot_core::domain::entity::{
    Ad, AdGroup, Campaign, EntityRef, EntityStatus, Provider, ScopeType,
};
use adpilot_core::recommendations::ports::{EntityQuery, EntityStore, PortResult};
use adpilot_core::sync_health::{InsightRef, SyncSnapshot};
use chrono::Utc;
use sqlx::{QueryBuilder, Sqlite};

use super::{column, decode_enum, encode_timestamp, RepositoryError};
use crate::DbPool;

/// Campaign, ad group and ad rows as written by provider sync.
pub struct SqlEntityRepository {
    pool: DbPool,
}

impl SqlEntityRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub async fn save_campaign(&self, campaign: &Campaign) -> Result<(), RepositoryError> {
        let now = encode_timestamp(Utc::now());
        sqlx::query(
            "INSERT INTO campaigns (id, account_id, provider, name, status, objective, daily_budget,
                                    created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                 name = excluded.name,
                 status = excluded.status,
                 objective = excluded.objective,
                 daily_budget = excluded.daily_budget,
                 updated_at = excluded.updated_at",
        )
        .bind(&campaign.id)
        .bind(&campaign.account_id)
        .bind(campaign.provider.as_str())
        .bind(&campaign.name)
        .bind(campaign.status.as_str())
        .bind(&campaign.objective)
        .bind(campaign.daily_budget)
        .bind(&now)
        .bind(&now)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn save_ad_group(&self, ad_group: &AdGroup) -> Result<(), RepositoryError> {
        let now = encode_timestamp(Utc::now());
        sqlx::query(
            "INSERT INTO ad_groups (id, account_id, provider, campaign_id, name, status,
                                    created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                 campaign_id = excluded.campaign_id,
                 name = excluded.name,
                 status = excluded.status,
                 updated_at = excluded.updated_at",
        )
        .bind(&ad_group.id)
        .bind(&ad_group.account_id)
        .bind(ad_group.provider.as_str())
        .bind(&ad_group.campaign_id)
        .bind(&ad_group.name)
        .bind(ad_group.status.as_str())
        .bind(&now)
        .bind(&now)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn save_ad(&self, ad: &Ad) -> Result<(), RepositoryError> {
        let now = encode_timestamp(Utc::now());
        sqlx::query(
            "INSERT INTO ads (id, account_id, provider, ad_group_id, name, status,
                              created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                 ad_group_id = excluded.ad_group_id,
                 name = excluded.name,
                 status = excluded.status,
                 updated_at = excluded.updated_at",
        )
        .bind(&ad.id)
        .bind(&ad.account_id)
        .bind(ad.provider.as_str())
        .bind(&ad.ad_group_id)
        .bind(&ad.name)
        .bind(ad.status.as_str())
        .bind(&now)
        .bind(&now)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn fetch_entities(&self, query: &EntityQuery) -> Result<Vec<EntityRef>, RepositoryError> {
        let (select, alias) = match query.scope_type {
            ScopeType::Campaign => (
                "SELECT c.id, c.account_id, c.provider, c.name, c.objective
                 FROM campaigns c",
                "c",
            ),
            ScopeType::AdGroup => (
                "SELECT g.id, g.account_id, g.provider, g.name, c.objective
                 FROM ad_groups g
                 LEFT JOIN campaigns c ON c.id = g.campaign_id",
                "g",
            ),
            ScopeType::Ad => (
                "SELECT a.id, a.account_id, a.provider, a.name, c.objective
                 FROM ads a
                 LEFT JOIN ad_groups g ON g.id = a.ad_group_id
                 LEFT JOIN campaigns c ON c.id = g.campaign_id",
                "a",
            ),
        };

        let mut builder: QueryBuilder<Sqlite> = QueryBuilder::new(select);
        builder.push(format!(" WHERE {alias}.account_id = ")).push_bind(query.account_id.clone());
        if let Some(provider) = query.provider {
            builder.push(format!(" AND {alias}.provider = ")).push_bind(provider.as_str());
        }
        if query.active_only {
            builder.push(format!(" AND {alias}.status = 'active'"));
        }
        if let Some(entity_ids) = &query.entity_ids {
            if entity_ids.is_empty() {
                return Ok(Vec::new());
            }
            builder.push(format!(" AND {alias}.id IN ("));
            let mut separated = builder.separated(", ");
            for entity_id in entity_ids {
                separated.push_bind(entity_id.clone());
            }
            builder.push(")");
        }
        builder.push(format!(" ORDER BY {alias}.name, {alias}.id"));

        let rows = builder.build().fetch_all(&self.pool).await?;
        rows.iter()
            .map(|row| {
                let provider: String = column(row, "provider")?;
                Ok(EntityRef {
                    account_id: column(row, "account_id")?,
                    provider: decode_enum(&provider, "provider", Provider::parse)?,
                    scope_type: query.scope_type,
                    id: column(row, "id")?,
                    name: column(row, "name")?,
                    objective: column(row, "objective")?,
                })
            })
            .collect()
    }

    /// Everything stored for an account, plus rows of other accounts that hang off its
    /// campaigns or ad groups.
    pub async fn load_sync_snapshot(&self, account_id: &str) -> Result<SyncSnapshot, RepositoryError> {
        let campaign_rows = sqlx::query(
            "SELECT id, account_id, provider, name, status, objective, daily_budget
             FROM campaigns WHERE account_id = ? ORDER BY id",
        )
        .bind(account_id)
        .fetch_all(&self.pool)
        .await?;

        let ad_group_rows = sqlx::query(
            "SELECT id, account_id, provider, campaign_id, name, status
             FROM ad_groups
             WHERE account_id = ?
                OR campaign_id IN (SELECT id FROM campaigns WHERE account_id = ?)
             ORDER BY id",
        )
        .bind(account_id)
        .bind(account_id)
        .fetch_all(&self.pool)
        .await?;

        let ad_rows = sqlx::query(
            "SELECT id, account_id, provider, ad_group_id, name, status
             FROM ads
             WHERE account_id = ?
                OR ad_group_id IN (SELECT id FROM ad_groups WHERE account_id = ?)
             ORDER BY id",
        )
        .bind(account_id)
        .bind(account_id)
        .fetch_all(&self.pool)
        .await?;

        let insight_rows = sqlx::query(
            "SELECT DISTINCT account_id, entity_type, entity_id
             FROM insight_daily WHERE account_id = ?
             ORDER BY entity_type, entity_id",
        )
        .bind(account_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(SyncSnapshot {
            campaigns: campaign_rows.iter().map(row_to_campaign).collect::<Result<_, _>>()?,
            ad_groups: ad_group_rows.iter().map(row_to_ad_group).collect::<Result<_, _>>()?,
            ads: ad_rows.iter().map(row_to_ad).collect::<Result<_, _>>()?,
            insights: insight_rows
                .iter()
                .map(|row| {
                    let scope_type: String = column(row, "entity_type")?;
                    Ok(InsightRef {
                        account_id: column(row, "account_id")?,
                        scope_type: decode_enum(&scope_type, "entity_type", ScopeType::parse)?,
                        entity_id: column(row, "entity_id")?,
                    })
                })
                .collect::<Result<_, RepositoryError>>()?,
        })
    }
}

fn decode_provider_and_status(
    row: &sqlx::sqlite::SqliteRow,
) -> Result<(Provider, EntityStatus), RepositoryError> {
    let provider: String = column(row, "provider")?;
    let status: String = column(row, "status")?;
    Ok((
        decode_enum(&provider, "provider", Provider::parse)?,
        decode_enum(&status, "status", EntityStatus::parse)?,
    ))
}

fn row_to_campaign(row: &sqlx::sqlite::SqliteRow) -> Result<Campaign, RepositoryError> {
    let (provider, status) = decode_provider_and_status(row)?;
    Ok(Campaign {
        id: column(row, "id")?,
        account_id: column(row, "account_id")?,
        provider,
        name: column(row, "name")?,
        status,
        objective: column(row, "objective")?,
        daily_budget: column(row, "daily_budget")?,
    })
}

fn row_to_ad_group(row: &sqlx::sqlite::SqliteRow) -> Result<AdGroup, RepositoryError> {
    let (provider, status) = decode_provider_and_status(row)?;
    Ok(AdGroup {
        id: column(row, "id")?,
        account_id: column(row, "account_id")?,
        provider,
        campaign_id: column(row, "campaign_id")?,
        name: column(row, "name")?,
        status,
    })
}

fn row_to_ad(row: &sqlx::sqlite::SqliteRow) -> Result<Ad, RepositoryError> {
    let (provider, status) = decode_provider_and_status(row)?;
    Ok(Ad {
        id: column(row, "id")?,
        account_id: column(row, "account_id")?,
        provider,
        ad_group_id: column(row, "ad_group_id")?,
        name: column(row, "name")?,
        status,
    })
}

#[async_trait::async_trait]
impl EntityStore for SqlEntityRepository {
    async fn list_entities(&self, query: &EntityQuery) -> PortResult<Vec<EntityRef>> {
        Ok(self.fetch_entities(query).await?)
    }
}

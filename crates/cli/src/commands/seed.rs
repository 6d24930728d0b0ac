use std::path::Path;

use adpilot_core::config::LoadOptions;
use adpilot_core::domain::entity::{Ad, AdGroup, Campaign, Provider, ScopeType};
use adpilot_core::domain::metrics::MetricTotals;
use adpilot_db::repositories::InsightRow;
use chrono::{Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::commands::context::AppContext;
use crate::commands::{execute, CommandFailure, CommandOutput, CommandResult, EXIT_OPERATION};

/// Entities and daily insight rows loaded from a JSON file.
#[derive(Debug, Default, Deserialize)]
pub struct SeedDataset {
    #[serde(default)]
    pub campaigns: Vec<Campaign>,
    #[serde(default)]
    pub ad_groups: Vec<AdGroup>,
    #[serde(default)]
    pub ads: Vec<Ad>,
    #[serde(default)]
    pub insights: Vec<SeedInsight>,
}

/// One insight day. Either `date` or `days_ago` (relative to today in UTC) is required.
#[derive(Debug, Deserialize)]
pub struct SeedInsight {
    pub account_id: String,
    pub provider: Provider,
    pub entity_type: ScopeType,
    pub entity_id: String,
    #[serde(default)]
    pub date: Option<NaiveDate>,
    #[serde(default)]
    pub days_ago: Option<i64>,
    #[serde(default)]
    pub impressions: f64,
    #[serde(default)]
    pub clicks: f64,
    #[serde(default)]
    pub spend: f64,
    #[serde(default)]
    pub conversions: f64,
    #[serde(default)]
    pub revenue: f64,
    #[serde(default)]
    pub reach: f64,
}

impl SeedInsight {
    fn into_row(self, today: NaiveDate) -> Result<InsightRow, CommandFailure> {
        let date = match (self.date, self.days_ago) {
            (Some(date), _) => date,
            (None, Some(days_ago)) if days_ago >= 0 => today - Duration::days(days_ago),
            _ => {
                return Err(CommandFailure::input(format!(
                    "insight for {} `{}` needs `date` or a non-negative `days_ago`",
                    self.entity_type.as_str(),
                    self.entity_id
                )))
            }
        };

        Ok(InsightRow {
            account_id: self.account_id,
            provider: self.provider,
            entity_type: self.entity_type,
            entity_id: self.entity_id,
            date,
            totals: MetricTotals {
                impressions: self.impressions,
                clicks: self.clicks,
                spend: self.spend,
                conversions: self.conversions,
                revenue: self.revenue,
                reach: self.reach,
            },
        })
    }
}

#[derive(Debug, Default, Serialize)]
struct SeedSummary {
    campaigns: usize,
    ad_groups: usize,
    ads: usize,
    insights: usize,
}

pub fn load_dataset(path: &Path) -> Result<SeedDataset, CommandFailure> {
    let raw = std::fs::read_to_string(path)
        .map_err(|error| CommandFailure::input(format!("failed to read {}: {error}", path.display())))?;
    serde_json::from_str(&raw)
        .map_err(|error| CommandFailure::input(format!("invalid seed file {}: {error}", path.display())))
}

pub fn run(options: &LoadOptions, file: &Path) -> CommandResult {
    let dataset = match load_dataset(file) {
        Ok(dataset) => dataset,
        Err(failure) => return CommandResult::failure("seed", failure.error_class, failure.message, failure.exit_code),
    };

    execute("seed", options, |config| async move {
        let context = AppContext::open(config).await?;
        let summary = import(&context, dataset).await;
        context.close().await;
        let summary = summary?;

        info!(
            event_name = "cli.seed.completed",
            campaigns = summary.campaigns,
            ad_groups = summary.ad_groups,
            ads = summary.ads,
            insights = summary.insights,
            "seed dataset imported"
        );
        CommandOutput::with_data(
            format!(
                "imported {} campaigns, {} ad groups, {} ads, {} insight rows",
                summary.campaigns, summary.ad_groups, summary.ads, summary.insights
            ),
            &summary,
        )
    })
}

async fn import(context: &AppContext, dataset: SeedDataset) -> Result<SeedSummary, CommandFailure> {
    let entities = context.entities();
    let insights = context.insights();
    let store_failure = |error: adpilot_db::RepositoryError| {
        CommandFailure::new("seed_execution", error.to_string(), EXIT_OPERATION)
    };
    let today = Utc::now().date_naive();
    let mut summary = SeedSummary::default();

    for campaign in &dataset.campaigns {
        entities.save_campaign(campaign).await.map_err(store_failure)?;
        summary.campaigns += 1;
    }
    for ad_group in &dataset.ad_groups {
        entities.save_ad_group(ad_group).await.map_err(store_failure)?;
        summary.ad_groups += 1;
    }
    for ad in &dataset.ads {
        entities.save_ad(ad).await.map_err(store_failure)?;
        summary.ads += 1;
    }
    for insight in dataset.insights {
        let row = insight.into_row(today)?;
        insights.save_daily(&row).await.map_err(store_failure)?;
        summary.insights += 1;
    }

    Ok(summary)
}

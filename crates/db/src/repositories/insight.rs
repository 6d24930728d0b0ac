use adpilot_core::domain::entity::{Provider, ScopeType};
use adpilot_core::domain::metrics::{DailyMetrics, MetricTotals, MetricsSnapshot, Trend};
use adpilot_core::recommendations::ports::{
    DailyMetricsSource, MetricsQuery, MetricsWindowProvider, PortResult,
};
use chrono::{Duration, NaiveDate, Utc};

use super::{column, RepositoryError};
use crate::DbPool;

const DATE_FORMAT: &str = "%Y-%m-%d";

/// One provider-reported day for one entity.
#[derive(Clone, Debug, PartialEq)]
pub struct InsightRow {
    pub account_id: String,
    pub provider: Provider,
    pub entity_type: ScopeType,
    pub entity_id: String,
    pub date: NaiveDate,
    pub totals: MetricTotals,
}

/// Aggregates `insight_daily` into window snapshots. Windows end on the anchor date
/// (today in UTC unless pinned) and include it.
pub struct SqlInsightRepository {
    pool: DbPool,
    anchor: Option<NaiveDate>,
}

impl SqlInsightRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool, anchor: None }
    }

    pub fn with_anchor_date(mut self, anchor: NaiveDate) -> Self {
        self.anchor = Some(anchor);
        self
    }

    fn anchor(&self) -> NaiveDate {
        self.anchor.unwrap_or_else(|| Utc::now().date_naive())
    }

    pub async fn save_daily(&self, row: &InsightRow) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO insight_daily (account_id, provider, entity_type, entity_id, date,
                                        impressions, clicks, spend, conversions, revenue, reach)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(entity_type, entity_id, date) DO UPDATE SET
                 impressions = excluded.impressions,
                 clicks = excluded.clicks,
                 spend = excluded.spend,
                 conversions = excluded.conversions,
                 revenue = excluded.revenue,
                 reach = excluded.reach",
        )
        .bind(&row.account_id)
        .bind(row.provider.as_str())
        .bind(row.entity_type.as_str())
        .bind(&row.entity_id)
        .bind(row.date.format(DATE_FORMAT).to_string())
        .bind(row.totals.impressions)
        .bind(row.totals.clicks)
        .bind(row.totals.spend)
        .bind(row.totals.conversions)
        .bind(row.totals.revenue)
        .bind(row.totals.reach)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn sum_range(
        &self,
        query: &MetricsQuery,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<MetricTotals, RepositoryError> {
        let row = sqlx::query(
            "SELECT COALESCE(SUM(impressions), 0.0) AS impressions,
                    COALESCE(SUM(clicks), 0.0) AS clicks,
                    COALESCE(SUM(spend), 0.0) AS spend,
                    COALESCE(SUM(conversions), 0.0) AS conversions,
                    COALESCE(SUM(revenue), 0.0) AS revenue,
                    COALESCE(SUM(reach), 0.0) AS reach
             FROM insight_daily
             WHERE account_id = ? AND provider = ? AND entity_type = ? AND entity_id = ?
               AND date >= ? AND date <= ?",
        )
        .bind(&query.account_id)
        .bind(query.provider.as_str())
        .bind(query.entity_type.as_str())
        .bind(&query.entity_id)
        .bind(start.format(DATE_FORMAT).to_string())
        .bind(end.format(DATE_FORMAT).to_string())
        .fetch_one(&self.pool)
        .await?;

        Ok(MetricTotals {
            impressions: column(&row, "impressions")?,
            clicks: column(&row, "clicks")?,
            spend: column(&row, "spend")?,
            conversions: column(&row, "conversions")?,
            revenue: column(&row, "revenue")?,
            reach: column(&row, "reach")?,
        })
    }

    async fn window_snapshot(&self, query: &MetricsQuery) -> Result<MetricsSnapshot, RepositoryError> {
        let days = query.window.days();
        let end = self.anchor();
        let start = end - Duration::days(days - 1);

        let current = self.sum_range(query, start, end).await?;
        let snapshot = MetricsSnapshot::from_totals(current);
        if !query.compare_window {
            return Ok(snapshot);
        }

        let previous_end = start - Duration::days(1);
        let previous_start = previous_end - Duration::days(days - 1);
        let previous = self.sum_range(query, previous_start, previous_end).await?;

        Ok(snapshot.with_trend(trend_between(&current, &previous)))
    }

    async fn campaign_days(
        &self,
        account_id: &str,
        campaign_id: &str,
        days: u32,
    ) -> Result<Vec<DailyMetrics>, RepositoryError> {
        let end = self.anchor();
        let start = end - Duration::days(i64::from(days.max(1)) - 1);

        let rows = sqlx::query(
            "SELECT date,
                    SUM(impressions) AS impressions,
                    SUM(clicks) AS clicks,
                    SUM(spend) AS spend,
                    SUM(conversions) AS conversions,
                    SUM(revenue) AS revenue
             FROM insight_daily
             WHERE account_id = ? AND entity_type = 'campaign' AND entity_id = ?
               AND date >= ? AND date <= ?
             GROUP BY date
             ORDER BY date ASC",
        )
        .bind(account_id)
        .bind(campaign_id)
        .bind(start.format(DATE_FORMAT).to_string())
        .bind(end.format(DATE_FORMAT).to_string())
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                let date: String = column(row, "date")?;
                Ok(DailyMetrics {
                    date: NaiveDate::parse_from_str(&date, DATE_FORMAT).map_err(|e| {
                        RepositoryError::Decode(format!("invalid insight date `{date}`: {e}"))
                    })?,
                    impressions: column(row, "impressions")?,
                    clicks: column(row, "clicks")?,
                    spend: column(row, "spend")?,
                    conversions: column(row, "conversions")?,
                    revenue: column(row, "revenue")?,
                })
            })
            .collect()
    }
}

/// ROAS movement when either window booked revenue, CTR movement otherwise.
pub fn trend_between(current: &MetricTotals, previous: &MetricTotals) -> Trend {
    let current = MetricsSnapshot::from_totals(*current);
    let previous = MetricsSnapshot::from_totals(*previous);
    if current.revenue > 0.0 || previous.revenue > 0.0 {
        Trend::between(current.roas, previous.roas)
    } else {
        Trend::between(current.ctr, previous.ctr)
    }
}

#[async_trait::async_trait]
impl MetricsWindowProvider for SqlInsightRepository {
    async fn get_metrics(&self, query: &MetricsQuery) -> PortResult<MetricsSnapshot> {
        Ok(self.window_snapshot(query).await?)
    }
}

#[async_trait::async_trait]
impl DailyMetricsSource for SqlInsightRepository {
    async fn daily_metrics(
        &self,
        account_id: &str,
        campaign_id: &str,
        days: u32,
    ) -> PortResult<Vec<DailyMetrics>> {
        Ok(self.campaign_days(account_id, campaign_id, days).await?)
    }
}

#[cfg(test)]
mod tests {
    use adpilot_core::domain::entity::{Provider, ScopeType};
    use adpilot_core::domain::metrics::{MetricTotals, MetricsWindow, TrendDirection};
    use adpilot_core::recommendations::ports::{
        DailyMetricsSource, MetricsQuery, MetricsWindowProvider,
    };
    use chrono::{Duration, NaiveDate};

    use super::{trend_between, InsightRow, SqlInsightRepository};
    use crate::{connect_with_settings, migrations};

    fn anchor() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, 31).expect("valid date")
    }

    fn row(days_ago: i64, clicks: f64, revenue: f64) -> InsightRow {
        InsightRow {
            account_id: "acct-1".to_string(),
            provider: Provider::Meta,
            entity_type: ScopeType::Campaign,
            entity_id: "cmp-1".to_string(),
            date: anchor() - Duration::days(days_ago),
            totals: MetricTotals {
                impressions: 1_000.0,
                clicks,
                spend: 10.0,
                conversions: 1.0,
                revenue,
                reach: 500.0,
            },
        }
    }

    async fn setup() -> SqlInsightRepository {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");
        SqlInsightRepository::new(pool).with_anchor_date(anchor())
    }

    fn query(compare_window: bool) -> MetricsQuery {
        MetricsQuery {
            account_id: "acct-1".to_string(),
            provider: Provider::Meta,
            entity_type: ScopeType::Campaign,
            entity_id: "cmp-1".to_string(),
            window: MetricsWindow::Last7Days,
            compare_window,
        }
    }

    #[tokio::test]
    async fn seven_day_window_sums_only_the_last_seven_days() {
        let repo = setup().await;
        for days_ago in 0..10 {
            repo.save_daily(&row(days_ago, 20.0, 0.0)).await.expect("save");
        }

        let snapshot = repo.get_metrics(&query(false)).await.expect("metrics");

        assert_eq!(snapshot.impressions, 7_000.0);
        assert_eq!(snapshot.clicks, 140.0);
        assert!((snapshot.ctr - 2.0).abs() < 1e-9);
        assert!((snapshot.frequency - 2.0).abs() < 1e-9);
        assert!(snapshot.trend.is_none());
    }

    #[tokio::test]
    async fn empty_window_yields_zero_ratios() {
        let repo = setup().await;

        let snapshot = repo.get_metrics(&query(true)).await.expect("metrics");

        assert_eq!(snapshot.spend, 0.0);
        assert_eq!(snapshot.ctr, 0.0);
        assert_eq!(snapshot.roas, 0.0);
        assert!(snapshot.ctr.is_finite());
        assert_eq!(snapshot.trend.map(|trend| trend.direction), Some(TrendDirection::Stable));
    }

    #[tokio::test]
    async fn compare_window_attaches_trend_against_previous_period() {
        let repo = setup().await;
        for days_ago in 0..7 {
            repo.save_daily(&row(days_ago, 10.0, 50.0)).await.expect("save current");
        }
        for days_ago in 7..14 {
            repo.save_daily(&row(days_ago, 10.0, 20.0)).await.expect("save previous");
        }

        let snapshot = repo.get_metrics(&query(true)).await.expect("metrics");
        let trend = snapshot.trend.expect("trend");

        assert_eq!(trend.direction, TrendDirection::Improving);
        assert!((trend.change_pct - 150.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn daily_metrics_are_oldest_first_within_the_requested_days() {
        let repo = setup().await;
        for days_ago in [0, 1, 2, 5, 40] {
            repo.save_daily(&row(days_ago, 10.0, 0.0)).await.expect("save");
        }

        let days = repo.daily_metrics("acct-1", "cmp-1", 31).await.expect("daily");
        let dates = days.iter().map(|day| day.date).collect::<Vec<_>>();

        assert_eq!(
            dates,
            vec![
                anchor() - Duration::days(5),
                anchor() - Duration::days(2),
                anchor() - Duration::days(1),
                anchor(),
            ]
        );
    }

    #[test]
    fn trend_falls_back_to_ctr_without_revenue() {
        let current = MetricTotals { impressions: 1_000.0, clicks: 5.0, ..MetricTotals::default() };
        let previous = MetricTotals { impressions: 1_000.0, clicks: 10.0, ..MetricTotals::default() };

        let trend = trend_between(&current, &previous);

        assert_eq!(trend.direction, TrendDirection::Declining);
        assert!((trend.change_pct + 50.0).abs() < 1e-9);
    }
}

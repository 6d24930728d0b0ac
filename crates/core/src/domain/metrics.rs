use chrono::{Datelike, NaiveDate, Weekday};
use serde::{Deserialize, Serialize};

/// Divides two metric totals, returning 0 for a zero or non-finite denominator.
pub fn safe_ratio(numerator: f64, denominator: f64) -> f64 {
    if denominator == 0.0 || !denominator.is_finite() || !numerator.is_finite() {
        return 0.0;
    }
    numerator / denominator
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum MetricsWindow {
    #[serde(rename = "7d")]
    Last7Days,
    #[serde(rename = "14d")]
    Last14Days,
    #[serde(rename = "30d")]
    Last30Days,
}

impl MetricsWindow {
    pub const DEFAULTS: [MetricsWindow; 3] =
        [MetricsWindow::Last7Days, MetricsWindow::Last14Days, MetricsWindow::Last30Days];

    pub fn days(&self) -> i64 {
        match self {
            Self::Last7Days => 7,
            Self::Last14Days => 14,
            Self::Last30Days => 30,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Last7Days => "7d",
            Self::Last14Days => "14d",
            Self::Last30Days => "30d",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "7d" => Some(Self::Last7Days),
            "14d" => Some(Self::Last14Days),
            "30d" => Some(Self::Last30Days),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrendDirection {
    Improving,
    Declining,
    Stable,
}

impl TrendDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Improving => "improving",
            Self::Declining => "declining",
            Self::Stable => "stable",
        }
    }
}

/// Ordered from weakest to strongest so `>=` means "at least as strong".
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Significance {
    None,
    Low,
    Medium,
    High,
}

impl Significance {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Trend {
    pub direction: TrendDirection,
    pub change_pct: f64,
    pub significance: Significance,
}

impl Trend {
    /// Compares a metric against the same metric over the preceding window.
    pub fn between(current: f64, previous: f64) -> Self {
        let change_pct = if previous == 0.0 {
            if current > 0.0 {
                100.0
            } else {
                0.0
            }
        } else {
            (current - previous) / previous * 100.0
        };

        let direction = if change_pct > 5.0 {
            TrendDirection::Improving
        } else if change_pct < -5.0 {
            TrendDirection::Declining
        } else {
            TrendDirection::Stable
        };

        let magnitude = change_pct.abs();
        let significance = if magnitude >= 30.0 {
            Significance::High
        } else if magnitude >= 15.0 {
            Significance::Medium
        } else if magnitude >= 5.0 {
            Significance::Low
        } else {
            Significance::None
        };

        Self { direction, change_pct, significance }
    }
}

/// Raw additive totals for an entity over a window.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricTotals {
    pub impressions: f64,
    pub clicks: f64,
    pub spend: f64,
    pub conversions: f64,
    pub revenue: f64,
    pub reach: f64,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub impressions: f64,
    pub clicks: f64,
    pub spend: f64,
    pub conversions: f64,
    pub revenue: f64,
    pub ctr: f64,
    pub cpc: f64,
    pub cpm: f64,
    pub cvr: f64,
    pub roas: f64,
    pub frequency: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trend: Option<Trend>,
}

impl MetricsSnapshot {
    pub fn from_totals(totals: MetricTotals) -> Self {
        Self {
            impressions: totals.impressions,
            clicks: totals.clicks,
            spend: totals.spend,
            conversions: totals.conversions,
            revenue: totals.revenue,
            ctr: safe_ratio(totals.clicks, totals.impressions) * 100.0,
            cpc: safe_ratio(totals.spend, totals.clicks),
            cpm: safe_ratio(totals.spend, totals.impressions) * 1000.0,
            cvr: safe_ratio(totals.conversions, totals.clicks) * 100.0,
            roas: safe_ratio(totals.revenue, totals.spend),
            frequency: safe_ratio(totals.impressions, totals.reach),
            trend: None,
        }
    }

    pub fn with_trend(mut self, trend: Trend) -> Self {
        self.trend = Some(trend);
        self
    }

    /// Looks up a metric by the name used in playbook conditions.
    pub fn metric(&self, name: &str) -> Option<f64> {
        let value = match name.trim().to_ascii_lowercase().as_str() {
            "impressions" => self.impressions,
            "clicks" => self.clicks,
            "spend" => self.spend,
            "conversions" => self.conversions,
            "revenue" => self.revenue,
            "ctr" => self.ctr,
            "cpc" => self.cpc,
            "cpm" => self.cpm,
            "cvr" => self.cvr,
            "roas" => self.roas,
            "frequency" => self.frequency,
            "cpa" => safe_ratio(self.spend, self.conversions),
            _ => return None,
        };
        Some(value)
    }

    /// Flat `(name, value)` view used by explanation templates.
    pub fn named_values(&self) -> Vec<(&'static str, f64)> {
        vec![
            ("impressions", self.impressions),
            ("clicks", self.clicks),
            ("spend", self.spend),
            ("conversions", self.conversions),
            ("revenue", self.revenue),
            ("ctr", self.ctr),
            ("cpc", self.cpc),
            ("cpm", self.cpm),
            ("cvr", self.cvr),
            ("roas", self.roas),
            ("frequency", self.frequency),
        ]
    }
}

/// One day of campaign performance, as consumed by the heuristic rules.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DailyMetrics {
    pub date: NaiveDate,
    pub impressions: f64,
    pub clicks: f64,
    pub spend: f64,
    pub conversions: f64,
    pub revenue: f64,
}

impl DailyMetrics {
    /// Click-through rate in percent.
    pub fn ctr(&self) -> f64 {
        safe_ratio(self.clicks, self.impressions) * 100.0
    }

    pub fn cpc(&self) -> f64 {
        safe_ratio(self.spend, self.clicks)
    }

    pub fn roas(&self) -> f64 {
        safe_ratio(self.revenue, self.spend)
    }

    /// Conversions per click, as a fraction.
    pub fn conversion_rate(&self) -> f64 {
        safe_ratio(self.conversions, self.clicks)
    }

    pub fn is_weekend(&self) -> bool {
        matches!(self.date.weekday(), Weekday::Sat | Weekday::Sun)
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::*;

    #[test]
    fn derived_ratios_are_zero_when_denominator_is_zero() {
        let snapshot = MetricsSnapshot::from_totals(MetricTotals::default());

        assert_eq!(snapshot.ctr, 0.0);
        assert_eq!(snapshot.cpc, 0.0);
        assert_eq!(snapshot.cpm, 0.0);
        assert_eq!(snapshot.cvr, 0.0);
        assert_eq!(snapshot.roas, 0.0);
        assert_eq!(snapshot.frequency, 0.0);
        assert!(!snapshot.ctr.is_nan());
    }

    #[test]
    fn derived_ratios_follow_totals() {
        let snapshot = MetricsSnapshot::from_totals(MetricTotals {
            impressions: 10_000.0,
            clicks: 200.0,
            spend: 400.0,
            conversions: 10.0,
            revenue: 1_200.0,
            reach: 5_000.0,
        });

        assert!((snapshot.ctr - 2.0).abs() < 1e-9);
        assert!((snapshot.cpc - 2.0).abs() < 1e-9);
        assert!((snapshot.cpm - 40.0).abs() < 1e-9);
        assert!((snapshot.cvr - 5.0).abs() < 1e-9);
        assert!((snapshot.roas - 3.0).abs() < 1e-9);
        assert!((snapshot.frequency - 2.0).abs() < 1e-9);
        assert_eq!(snapshot.metric("cpa"), Some(40.0));
        assert_eq!(snapshot.metric("unknown"), None);
    }

    #[test]
    fn trend_classifies_direction_and_significance() {
        let up = Trend::between(140.0, 100.0);
        assert_eq!(up.direction, TrendDirection::Improving);
        assert_eq!(up.significance, Significance::High);

        let down = Trend::between(80.0, 100.0);
        assert_eq!(down.direction, TrendDirection::Declining);
        assert_eq!(down.significance, Significance::Medium);

        let flat = Trend::between(101.0, 100.0);
        assert_eq!(flat.direction, TrendDirection::Stable);
        assert_eq!(flat.significance, Significance::None);

        assert_eq!(Trend::between(0.0, 0.0).change_pct, 0.0);
    }

    #[test]
    fn significance_orders_from_none_to_high() {
        assert!(Significance::High > Significance::Medium);
        assert!(Significance::Medium > Significance::Low);
        assert!(Significance::Low > Significance::None);
    }

    #[test]
    fn window_round_trips_through_strings() {
        for window in MetricsWindow::DEFAULTS {
            assert_eq!(MetricsWindow::parse(window.as_str()), Some(window));
        }
        assert_eq!(MetricsWindow::parse("90d"), None);
        assert_eq!(MetricsWindow::Last14Days.days(), 14);
    }

    #[test]
    fn daily_metrics_detects_weekends() {
        let saturday = DailyMetrics {
            date: NaiveDate::from_ymd_opt(2026, 10, 17).unwrap_or_default(),
            impressions: 0.0,
            clicks: 0.0,
            spend: 0.0,
            conversions: 0.0,
            revenue: 0.0,
        };
        assert!(saturday.is_weekend());
        assert_eq!(saturday.conversion_rate(), 0.0);
    }
}

use crate::domain::metrics::DailyMetrics;
use crate::domain::recommendation::{Category, Priority};

/// `history` is chronological (oldest first) and excludes `current`.
pub type HeuristicCheck = fn(current: &DailyMetrics, history: &[DailyMetrics]) -> bool;

#[derive(Clone, Copy)]
pub struct HeuristicRule {
    pub id: &'static str,
    pub name: &'static str,
    pub recommendation_type: &'static str,
    pub category: Category,
    pub priority: Priority,
    check: HeuristicCheck,
}

impl HeuristicRule {
    pub fn matches(&self, current: &DailyMetrics, history: &[DailyMetrics]) -> bool {
        (self.check)(current, history)
    }
}

impl std::fmt::Debug for HeuristicRule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HeuristicRule")
            .field("id", &self.id)
            .field("recommendation_type", &self.recommendation_type)
            .field("priority", &self.priority)
            .finish()
    }
}

pub const RULES: [HeuristicRule; 8] = [
    HeuristicRule {
        id: "low-ctr",
        name: "Low click-through rate",
        recommendation_type: "creative_refresh",
        category: Category::Creative,
        priority: Priority::High,
        check: low_ctr,
    },
    HeuristicRule {
        id: "high-cpc",
        name: "High cost per click",
        recommendation_type: "bid_adjustment",
        category: Category::Bidding,
        priority: Priority::Medium,
        check: high_cpc,
    },
    HeuristicRule {
        id: "low-roas",
        name: "Low return on ad spend",
        recommendation_type: "budget_reallocation",
        category: Category::Budget,
        priority: Priority::High,
        check: low_roas,
    },
    HeuristicRule {
        id: "budget-pacing",
        name: "Budget pacing variance",
        recommendation_type: "budget_pacing",
        category: Category::Budget,
        priority: Priority::Medium,
        check: budget_pacing,
    },
    HeuristicRule {
        id: "conversion-drop",
        name: "Conversion rate drop",
        recommendation_type: "conversion_optimization",
        category: Category::Performance,
        priority: Priority::Critical,
        check: conversion_drop,
    },
    HeuristicRule {
        id: "audience-fatigue",
        name: "Audience fatigue",
        recommendation_type: "audience_refresh",
        category: Category::Targeting,
        priority: Priority::Medium,
        check: audience_fatigue,
    },
    HeuristicRule {
        id: "scaling-opportunity",
        name: "Scaling opportunity",
        recommendation_type: "budget_increase",
        category: Category::Growth,
        priority: Priority::Medium,
        check: scaling_opportunity,
    },
    HeuristicRule {
        id: "weekend-optimization",
        name: "Weekend cost optimization",
        recommendation_type: "dayparting",
        category: Category::Scheduling,
        priority: Priority::Low,
        check: weekend_optimization,
    },
];

fn mean(values: impl Iterator<Item = f64>) -> f64 {
    let (sum, count) = values.fold((0.0, 0usize), |(sum, count), value| (sum + value, count + 1));
    if count == 0 {
        0.0
    } else {
        sum / count as f64
    }
}

fn low_ctr(current: &DailyMetrics, _history: &[DailyMetrics]) -> bool {
    current.ctr() < 0.5 && current.impressions > 1000.0
}

fn high_cpc(current: &DailyMetrics, _history: &[DailyMetrics]) -> bool {
    current.cpc() > 5.0
}

fn low_roas(current: &DailyMetrics, _history: &[DailyMetrics]) -> bool {
    current.roas() < 2.0 && current.spend > 100.0
}

fn budget_pacing(current: &DailyMetrics, history: &[DailyMetrics]) -> bool {
    if history.len() < 7 {
        return false;
    }
    let average = mean(history.iter().map(|day| day.spend));
    if average == 0.0 {
        return false;
    }
    (current.spend - average).abs() / average > 0.3
}

fn conversion_drop(current: &DailyMetrics, history: &[DailyMetrics]) -> bool {
    if history.len() < 7 {
        return false;
    }
    let average = mean(history.iter().map(DailyMetrics::conversion_rate));
    if average == 0.0 {
        return false;
    }
    current.conversion_rate() < average * 0.7
}

fn audience_fatigue(_current: &DailyMetrics, history: &[DailyMetrics]) -> bool {
    if history.len() < 14 {
        return false;
    }
    let recent = &history[history.len() - 7..];
    let previous = &history[history.len() - 14..history.len() - 7];
    let previous_ctr = mean(previous.iter().map(DailyMetrics::ctr));
    if previous_ctr == 0.0 {
        return false;
    }
    mean(recent.iter().map(DailyMetrics::ctr)) < previous_ctr * 0.7
}

fn scaling_opportunity(current: &DailyMetrics, _history: &[DailyMetrics]) -> bool {
    current.roas() > 4.0 && current.conversions > 10.0
}

fn weekend_optimization(current: &DailyMetrics, _history: &[DailyMetrics]) -> bool {
    current.is_weekend() && current.cpc() > 3.0
}

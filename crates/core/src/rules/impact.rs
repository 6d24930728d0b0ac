use crate::domain::metrics::MetricsSnapshot;
use crate::domain::playbook::{ActionTemplate, ActionType};
use crate::domain::recommendation::{ActionPayload, EstimatedImpact};

const MAX_SCORE: f64 = 100.0;

/// Projects the effect of one action against the primary snapshot.
pub fn estimate_impact(action: &ActionTemplate, metrics: &MetricsSnapshot) -> EstimatedImpact {
    match action.action_type {
        ActionType::BudgetChange => {
            let change_pct = action
                .change_pct
                .or_else(|| action.param_f64("change_pct"))
                .unwrap_or(0.0);
            EstimatedImpact {
                metric: "conversions".to_string(),
                current_value: metrics.conversions,
                projected_value: metrics.conversions * (1.0 + change_pct / 100.0),
                change_pct,
                confidence: 0.7,
                revenue_impact: Some(metrics.revenue * change_pct / 100.0),
                cost_savings: None,
            }
        }
        ActionType::Pause => EstimatedImpact {
            metric: "spend".to_string(),
            current_value: metrics.spend,
            projected_value: 0.0,
            change_pct: -100.0,
            confidence: 1.0,
            revenue_impact: None,
            cost_savings: Some(metrics.spend),
        },
        ActionType::BidAdjustment => {
            let bid_change_pct = action.param_f64("bid_change_pct").unwrap_or(0.0);
            EstimatedImpact {
                metric: "cpc".to_string(),
                current_value: metrics.cpc,
                projected_value: metrics.cpc * (1.0 + bid_change_pct / 100.0),
                change_pct: bid_change_pct,
                confidence: 0.6,
                revenue_impact: None,
                cost_savings: None,
            }
        }
        ActionType::CreativeRefresh => EstimatedImpact {
            metric: "ctr".to_string(),
            current_value: metrics.ctr,
            projected_value: metrics.ctr * 1.25,
            change_pct: 25.0,
            confidence: 0.5,
            revenue_impact: Some(metrics.revenue * 0.25),
            cost_savings: None,
        },
        ActionType::Other(_) => EstimatedImpact {
            metric: "conversions".to_string(),
            current_value: metrics.conversions,
            projected_value: metrics.conversions,
            change_pct: 0.0,
            confidence: 0.5,
            revenue_impact: None,
            cost_savings: None,
        },
    }
}

/// Relative importance of the metric an action moves.
pub fn metric_weight(metric: &str) -> f64 {
    match metric {
        "conversions" | "revenue" => 1.0,
        "roas" => 0.9,
        "cpa" => 0.8,
        "ctr" => 0.6,
        "spend" => 0.5,
        _ => 0.5,
    }
}

/// Impact-weighted score of a set of actions, clamped to `[0, 100]`.
pub fn score_actions(actions: &[ActionPayload]) -> f64 {
    let raw = actions
        .iter()
        .map(|action| {
            let impact = &action.estimated_impact;
            let value = impact.revenue_impact.unwrap_or(0.0) * 10.0
                + impact.cost_savings.unwrap_or(0.0) * 5.0;
            value * impact.confidence * metric_weight(&impact.metric)
        })
        .sum::<f64>();

    if raw.is_finite() {
        raw.clamp(0.0, MAX_SCORE)
    } else if raw > 0.0 {
        MAX_SCORE
    } else {
        0.0
    }
}

use crate::domain::metrics::DailyMetrics;

pub fn format_percent(value: f64) -> String {
    format!("{value:.2}%")
}

pub fn format_money(value: f64) -> String {
    format!("${value:.2}")
}

/// Deterministic description used when no generator is configured or it fails.
pub fn fallback_description(rule_id: &str, metrics: &DailyMetrics) -> String {
    match rule_id {
        "low-ctr" => format!(
            "Click-through rate is {} across {} impressions. Refresh the creative or test new \
             headlines to win back attention.",
            format_percent(metrics.ctr()),
            metrics.impressions
        ),
        "high-cpc" => format!(
            "Cost per click reached {}. Lower bids or tighten targeting to bring acquisition costs down.",
            format_money(metrics.cpc())
        ),
        "low-roas" => format!(
            "Return on ad spend is {:.2}x on {} of spend. Shift budget toward better-performing campaigns.",
            metrics.roas(),
            format_money(metrics.spend)
        ),
        "budget-pacing" => format!(
            "Daily spend of {} is more than 30% away from the recent average. Review pacing so the \
             budget lasts the full flight.",
            format_money(metrics.spend)
        ),
        "conversion-drop" => format!(
            "Conversion rate fell to {}, well below the recent average. Check the landing page and \
             conversion tracking.",
            format_percent(metrics.conversion_rate() * 100.0)
        ),
        "audience-fatigue" => format!(
            "Click-through rate has declined to {} over the last week. The audience may be saturated; \
             refresh creatives or broaden targeting.",
            format_percent(metrics.ctr())
        ),
        "scaling-opportunity" => format!(
            "Return on ad spend is {:.2}x with {} conversions. Increase the budget gradually to \
             capture more volume.",
            metrics.roas(),
            metrics.conversions
        ),
        "weekend-optimization" => format!(
            "Weekend cost per click is {}. Reduce weekend bids or schedule ads for stronger weekdays.",
            format_money(metrics.cpc())
        ),
        _ => format!(
            "Performance needs attention: CTR {}, CPC {}, spend {}.",
            format_percent(metrics.ctr()),
            format_money(metrics.cpc()),
            format_money(metrics.spend)
        ),
    }
}

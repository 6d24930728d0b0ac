use serde_json::{json, Value};

use crate::domain::playbook::GuardrailOverrides;
use crate::domain::recommendation::{ActionPayload, EstimatedImpact};

/// Merges guardrails returned alongside an AI explanation into an action and clamps its
/// numeric changes to the resulting bounds.
pub fn apply_guardrails(action: &mut ActionPayload, overrides: &GuardrailOverrides) {
    let guardrails = action.guardrails.merged(overrides);

    if let Some(change_pct) = action.change_pct {
        let lower = -guardrails.max_daily_decrease_pct.abs();
        let upper = guardrails.max_daily_increase_pct.abs();
        let clamped = change_pct.clamp(lower, upper);
        action.change_pct = Some(clamped);
        if clamped != change_pct {
            rescale_impact(&mut action.estimated_impact, change_pct, clamped);
        }
    }

    if let Some(new_budget) = action.params.get("new_budget").and_then(Value::as_f64) {
        let mut clamped = new_budget;
        if let Some(min_budget) = guardrails.min_budget {
            clamped = clamped.max(min_budget);
        }
        if let Some(max_budget) = guardrails.max_budget {
            clamped = clamped.min(max_budget);
        }
        action.params.insert("new_budget".to_string(), json!(clamped));
    }

    action.guardrails = guardrails;
    action.manual_implementation_required = true;
    action.guardrails_applied = true;
}

/// Impacts projected from the action's own change percentage scale linearly with it.
fn rescale_impact(impact: &mut EstimatedImpact, original_pct: f64, clamped_pct: f64) {
    if original_pct == 0.0 || impact.change_pct != original_pct {
        return;
    }
    let factor = clamped_pct / original_pct;
    impact.change_pct = clamped_pct;
    impact.projected_value =
        impact.current_value + (impact.projected_value - impact.current_value) * factor;
    impact.revenue_impact = impact.revenue_impact.map(|value| value * factor);
    impact.cost_savings = impact.cost_savings.map(|value| value * factor);
}

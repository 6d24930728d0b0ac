use adpilot_core::domain::playbook::{GuardrailOverrides, Guardrails};

/// Outcome of checking guardrails proposed by a model against the action's current ones.
#[derive(Clone, Debug, PartialEq)]
pub enum GuardrailDecision {
    Allow(GuardrailOverrides),
    Deny { reason_code: &'static str, message: String },
    /// Some values tried to relax a limit and were pinned back to the baseline.
    Degrade { reason_code: &'static str, message: String, overrides: GuardrailOverrides },
}

impl GuardrailDecision {
    /// Overrides safe to hand to the enrichment stage, if any.
    pub fn accepted(&self) -> Option<GuardrailOverrides> {
        match self {
            Self::Allow(overrides) | Self::Degrade { overrides, .. } => Some(*overrides),
            Self::Deny { .. } => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct GuardrailPolicy {
    pub ai_can_loosen_limits: bool,
    pub ai_can_waive_approval: bool,
    pub max_change_pct: f64,
    pub max_cooldown_hours: u32,
}

impl Default for GuardrailPolicy {
    fn default() -> Self {
        Self {
            ai_can_loosen_limits: false,
            ai_can_waive_approval: false,
            max_change_pct: 100.0,
            max_cooldown_hours: 24 * 14,
        }
    }
}

impl GuardrailPolicy {
    pub fn evaluate(&self, baseline: &Guardrails, proposed: &GuardrailOverrides) -> GuardrailDecision {
        for (name, value) in [
            ("max_daily_increase_pct", proposed.max_daily_increase_pct),
            ("max_daily_decrease_pct", proposed.max_daily_decrease_pct),
        ] {
            if let Some(value) = value {
                if !value.is_finite() || !(0.0..=self.max_change_pct).contains(&value) {
                    return GuardrailDecision::Deny {
                        reason_code: "guardrail_out_of_range",
                        message: format!("{name} {value} is outside 0..={}", self.max_change_pct),
                    };
                }
            }
        }

        for (name, value) in [("min_budget", proposed.min_budget), ("max_budget", proposed.max_budget)] {
            if let Some(value) = value {
                if !value.is_finite() || value < 0.0 {
                    return GuardrailDecision::Deny {
                        reason_code: "guardrail_out_of_range",
                        message: format!("{name} {value} must be a non-negative amount"),
                    };
                }
            }
        }

        if let (Some(min), Some(max)) = (proposed.min_budget, proposed.max_budget) {
            if min > max {
                return GuardrailDecision::Deny {
                    reason_code: "guardrail_budget_inverted",
                    message: format!("min_budget {min} exceeds max_budget {max}"),
                };
            }
        }

        if proposed.cooldown_hours.is_some_and(|hours| hours > self.max_cooldown_hours) {
            return GuardrailDecision::Deny {
                reason_code: "guardrail_out_of_range",
                message: format!("cooldown_hours exceeds {}", self.max_cooldown_hours),
            };
        }

        let mut overrides = *proposed;
        let mut relaxed = Vec::new();

        if !self.ai_can_loosen_limits {
            if let Some(value) = overrides.max_daily_increase_pct {
                if value > baseline.max_daily_increase_pct {
                    overrides.max_daily_increase_pct = Some(baseline.max_daily_increase_pct);
                    relaxed.push("max_daily_increase_pct");
                }
            }
            if let Some(value) = overrides.max_daily_decrease_pct {
                if value > baseline.max_daily_decrease_pct {
                    overrides.max_daily_decrease_pct = Some(baseline.max_daily_decrease_pct);
                    relaxed.push("max_daily_decrease_pct");
                }
            }
            if let Some(hours) = overrides.cooldown_hours {
                if hours < baseline.cooldown_hours {
                    overrides.cooldown_hours = Some(baseline.cooldown_hours);
                    relaxed.push("cooldown_hours");
                }
            }
            if let (Some(value), Some(floor)) = (overrides.min_budget, baseline.min_budget) {
                if value < floor {
                    overrides.min_budget = Some(floor);
                    relaxed.push("min_budget");
                }
            }
            if let (Some(value), Some(ceiling)) = (overrides.max_budget, baseline.max_budget) {
                if value > ceiling {
                    overrides.max_budget = Some(ceiling);
                    relaxed.push("max_budget");
                }
            }
        }

        if !self.ai_can_waive_approval && baseline.require_approval && overrides.require_approval == Some(false)
        {
            overrides.require_approval = Some(true);
            relaxed.push("require_approval");
        }

        if relaxed.is_empty() {
            GuardrailDecision::Allow(overrides)
        } else {
            GuardrailDecision::Degrade {
                reason_code: "guardrail_loosening_ignored",
                message: format!("model tried to relax {}", relaxed.join(", ")),
                overrides,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use adpilot_core::domain::playbook::{GuardrailOverrides, Guardrails};

    use super::{GuardrailDecision, GuardrailPolicy};

    #[test]
    fn tightening_is_allowed_as_proposed() {
        let proposed = GuardrailOverrides {
            max_daily_increase_pct: Some(20.0),
            cooldown_hours: Some(48),
            require_approval: Some(true),
            ..GuardrailOverrides::default()
        };

        let decision = GuardrailPolicy::default().evaluate(&Guardrails::default(), &proposed);

        assert_eq!(decision, GuardrailDecision::Allow(proposed));
    }

    #[test]
    fn loosening_is_pinned_back_to_the_baseline() {
        let baseline = Guardrails { require_approval: true, ..Guardrails::default() };
        let proposed = GuardrailOverrides {
            max_daily_increase_pct: Some(80.0),
            cooldown_hours: Some(2),
            require_approval: Some(false),
            ..GuardrailOverrides::default()
        };

        let decision = GuardrailPolicy::default().evaluate(&baseline, &proposed);

        let (reason_code, message, overrides) = match decision {
            GuardrailDecision::Degrade { reason_code, message, overrides } => (reason_code, message, overrides),
            other => panic!("expected degrade, got {other:?}"),
        };
        assert_eq!(reason_code, "guardrail_loosening_ignored");
        assert!(message.contains("max_daily_increase_pct"));
        assert_eq!(overrides.max_daily_increase_pct, Some(50.0));
        assert_eq!(overrides.cooldown_hours, Some(24));
        assert_eq!(overrides.require_approval, Some(true));
    }

    #[test]
    fn permissive_policy_passes_loosened_limits_through() {
        let policy = GuardrailPolicy { ai_can_loosen_limits: true, ..GuardrailPolicy::default() };
        let proposed =
            GuardrailOverrides { max_daily_increase_pct: Some(80.0), ..GuardrailOverrides::default() };

        let decision = policy.evaluate(&Guardrails::default(), &proposed);

        assert_eq!(decision.accepted(), Some(proposed));
    }

    #[test]
    fn nonsense_values_are_denied() {
        let policy = GuardrailPolicy::default();
        let negative =
            GuardrailOverrides { max_daily_decrease_pct: Some(-5.0), ..GuardrailOverrides::default() };
        let inverted = GuardrailOverrides {
            min_budget: Some(500.0),
            max_budget: Some(100.0),
            ..GuardrailOverrides::default()
        };
        let not_a_number =
            GuardrailOverrides { max_budget: Some(f64::NAN), ..GuardrailOverrides::default() };

        for proposed in [negative, inverted, not_a_number] {
            let decision = policy.evaluate(&Guardrails::default(), &proposed);
            assert!(matches!(decision, GuardrailDecision::Deny { .. }), "{proposed:?}");
            assert!(decision.accepted().is_none());
        }
    }
}

//! Playbook catalog: the built-in set, optionally replaced or extended from a JSON file.

use std::path::Path;

use async_trait::async_trait;
use serde_json::json;

use crate::config::PlaybooksConfig;
use crate::domain::entity::{Provider, ScopeType};
use crate::domain::metrics::{MetricsWindow, Significance, TrendDirection};
use crate::domain::playbook::{
    ActionTemplate, ActionType, AppliesTo, Condition, ConditionGroups, DirectionSet,
    GuardrailOverrides, Operator, Playbook, TrendCondition,
};
use crate::errors::ApplicationError;
use crate::recommendations::ports::{PlaybookFilter, PlaybookRepository, PortResult};

#[derive(Clone, Debug, Default, PartialEq)]
pub struct PlaybookCatalog {
    playbooks: Vec<Playbook>,
}

impl PlaybookCatalog {
    pub fn new(playbooks: Vec<Playbook>) -> Result<Self, ApplicationError> {
        let mut seen = std::collections::HashSet::new();
        for playbook in &playbooks {
            if playbook.key.trim().is_empty() {
                return Err(ApplicationError::Configuration("playbook key must not be empty".to_string()));
            }
            if !seen.insert(playbook.key.as_str()) {
                return Err(ApplicationError::Configuration(format!(
                    "duplicate playbook key `{}`",
                    playbook.key
                )));
            }
        }
        Ok(Self { playbooks })
    }

    pub fn builtin() -> Self {
        Self { playbooks: builtin_playbooks() }
    }

    /// Parses a JSON array of playbooks.
    pub fn from_json_str(raw: &str) -> Result<Self, ApplicationError> {
        let playbooks: Vec<Playbook> = serde_json::from_str(raw).map_err(|error| {
            ApplicationError::Configuration(format!("invalid playbook JSON: {error}"))
        })?;
        Self::new(playbooks)
    }

    pub fn from_path(path: &Path) -> Result<Self, ApplicationError> {
        let raw = std::fs::read_to_string(path).map_err(|error| {
            ApplicationError::Configuration(format!(
                "failed to read playbooks from {}: {error}",
                path.display()
            ))
        })?;
        Self::from_json_str(&raw)
    }

    /// Built-ins plus `extra`; a playbook in `extra` replaces the built-in with the same key.
    pub fn builtin_with(extra: Vec<Playbook>) -> Result<Self, ApplicationError> {
        let mut playbooks = builtin_playbooks();
        for playbook in extra {
            match playbooks.iter_mut().find(|existing| existing.key == playbook.key) {
                Some(existing) => *existing = playbook,
                None => playbooks.push(playbook),
            }
        }
        Self::new(playbooks)
    }

    /// Catalog described by configuration: built-ins, the file, or built-ins overlaid by
    /// the file.
    pub fn from_config(config: &PlaybooksConfig) -> Result<Self, ApplicationError> {
        match (&config.path, config.include_builtin) {
            (None, true) => Ok(Self::builtin()),
            (None, false) => Err(ApplicationError::Configuration(
                "playbooks.path is required when built-in playbooks are excluded".to_string(),
            )),
            (Some(path), false) => Self::from_path(path),
            (Some(path), true) => {
                let extra = Self::from_path(path)?;
                Self::builtin_with(extra.playbooks)
            }
        }
    }

    pub fn playbooks(&self) -> &[Playbook] {
        &self.playbooks
    }
}

#[async_trait]
impl PlaybookRepository for PlaybookCatalog {
    async fn get(&self, key: &str) -> PortResult<Option<Playbook>> {
        Ok(self.playbooks.iter().find(|playbook| playbook.key == key).cloned())
    }

    async fn get_filtered(&self, filter: &PlaybookFilter) -> PortResult<Vec<Playbook>> {
        Ok(self.playbooks.iter().filter(|playbook| filter.matches(playbook)).cloned().collect())
    }
}

fn all_providers() -> Vec<Provider> {
    vec![Provider::Meta, Provider::Google]
}

fn builtin_playbooks() -> Vec<Playbook> {
    vec![
        Playbook {
            key: "pause_wasted_spend".to_string(),
            name: "Pause wasted spend".to_string(),
            description: "{{entity_name}} spent {{spend}} in the last 7 days without a conversion."
                .to_string(),
            applies_to: AppliesTo {
                providers: all_providers(),
                levels: vec![ScopeType::AdGroup, ScopeType::Ad],
                objectives: None,
            },
            conditions: ConditionGroups {
                all: vec![
                    Condition::metric("spend", Operator::GreaterThan, 50.0, MetricsWindow::Last7Days),
                    Condition::metric("conversions", Operator::Equal, 0.0, MetricsWindow::Last7Days),
                ],
                any: Vec::new(),
                none: vec![Condition::metric("conversions", Operator::GreaterThan, 0.0, MetricsWindow::Last30Days)],
            },
            actions: vec![ActionTemplate::new(ActionType::Pause)],
            guardrails: GuardrailOverrides { require_approval: Some(true), ..GuardrailOverrides::default() },
            explanation_template: None,
            risk_notes: vec!["Pausing stops delivery immediately and may reset learning.".to_string()],
            enabled: true,
        },
        Playbook {
            key: "scale_high_roas".to_string(),
            name: "Scale high-ROAS campaigns".to_string(),
            description: "{{entity_name}} returns {{roas}}x on spend with {{conversions}} conversions."
                .to_string(),
            applies_to: AppliesTo {
                providers: all_providers(),
                levels: vec![ScopeType::Campaign],
                objectives: None,
            },
            conditions: ConditionGroups {
                all: vec![
                    Condition::metric("roas", Operator::GreaterThan, 4.0, MetricsWindow::Last7Days),
                    Condition::metric("conversions", Operator::GreaterOrEqual, 10.0, MetricsWindow::Last7Days),
                ],
                any: Vec::new(),
                none: vec![Condition::trend(TrendDirection::Declining, MetricsWindow::Last7Days)],
            },
            actions: vec![ActionTemplate::new(ActionType::BudgetChange).with_change_pct(20.0)],
            guardrails: GuardrailOverrides { max_daily_increase_pct: Some(30.0), ..GuardrailOverrides::default() },
            explanation_template: Some(
                "ROAS of {{roas}} over 7 days (trend {{trend_direction}}) supports a budget increase."
                    .to_string(),
            ),
            risk_notes: vec!["Large budget increases can raise CPA while delivery re-stabilises.".to_string()],
            enabled: true,
        },
        Playbook {
            key: "refresh_fatigued_creative".to_string(),
            name: "Refresh fatigued creative".to_string(),
            description: "Frequency reached {{frequency}} while CTR is {{ctr}}%.".to_string(),
            applies_to: AppliesTo {
                providers: vec![Provider::Meta],
                levels: vec![ScopeType::AdGroup, ScopeType::Ad],
                objectives: None,
            },
            conditions: ConditionGroups {
                all: vec![Condition::metric("frequency", Operator::GreaterThan, 3.0, MetricsWindow::Last7Days)],
                any: vec![
                    Condition::metric("ctr", Operator::LessThan, 1.0, MetricsWindow::Last7Days),
                    Condition::Trend(TrendCondition {
                        direction: DirectionSet::One(TrendDirection::Declining),
                        window: MetricsWindow::Last7Days,
                        min_change_pct: Some(15.0),
                        significance_level: Some(Significance::Medium),
                    }),
                ],
                none: Vec::new(),
            },
            actions: vec![ActionTemplate::new(ActionType::CreativeRefresh)],
            guardrails: GuardrailOverrides::default(),
            explanation_template: None,
            risk_notes: Vec::new(),
            enabled: true,
        },
        Playbook {
            key: "reduce_bids_high_cpc".to_string(),
            name: "Reduce bids on expensive clicks".to_string(),
            description: "CPC of {{cpc}} with a conversion rate of {{cvr}}% over 14 days.".to_string(),
            applies_to: AppliesTo {
                providers: vec![Provider::Google],
                levels: vec![ScopeType::Campaign, ScopeType::AdGroup],
                objectives: None,
            },
            conditions: ConditionGroups {
                all: vec![
                    Condition::metric("cpc", Operator::GreaterThan, 5.0, MetricsWindow::Last14Days),
                    Condition::metric("cvr", Operator::LessThan, 2.0, MetricsWindow::Last14Days),
                ],
                any: Vec::new(),
                none: Vec::new(),
            },
            actions: vec![ActionTemplate::new(ActionType::BidAdjustment).with_param("bid_change_pct", json!(-15))],
            guardrails: GuardrailOverrides::default(),
            explanation_template: None,
            risk_notes: vec!["Lower bids can reduce impression share.".to_string()],
            enabled: true,
        },
        Playbook {
            key: "cut_budget_low_roas".to_string(),
            name: "Cut budget on unprofitable campaigns".to_string(),
            description: "ROAS of {{roas}} on {{spend}} spend over 14 days.".to_string(),
            applies_to: AppliesTo {
                providers: all_providers(),
                levels: vec![ScopeType::Campaign],
                objectives: Some(vec!["conversions".to_string(), "sales".to_string()]),
            },
            conditions: ConditionGroups {
                all: vec![
                    Condition::between("roas", 0.0, 1.0, MetricsWindow::Last14Days),
                    Condition::metric("spend", Operator::GreaterThan, 200.0, MetricsWindow::Last14Days),
                ],
                any: Vec::new(),
                none: Vec::new(),
            },
            actions: vec![ActionTemplate::new(ActionType::BudgetChange).with_change_pct(-25.0)],
            guardrails: GuardrailOverrides { max_daily_decrease_pct: Some(30.0), ..GuardrailOverrides::default() },
            explanation_template: None,
            risk_notes: Vec::new(),
            enabled: true,
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_keys_are_unique() {
        let catalog = PlaybookCatalog::builtin();
        assert!(PlaybookCatalog::new(catalog.playbooks().to_vec()).is_ok());
        assert!(catalog.playbooks().len() >= 5);
    }

    #[test]
    fn config_without_builtins_requires_a_file() {
        let config = PlaybooksConfig { path: None, include_builtin: false };
        assert!(matches!(PlaybookCatalog::from_config(&config), Err(ApplicationError::Configuration(_))));

        let builtin = PlaybooksConfig { path: None, include_builtin: true };
        assert_eq!(
            PlaybookCatalog::from_config(&builtin).expect("builtin").playbooks().len(),
            PlaybookCatalog::builtin().playbooks().len()
        );
    }

    #[test]
    fn config_file_overlays_builtins() {
        let mut custom = PlaybookCatalog::builtin().playbooks()[0].clone();
        custom.name = "Custom name".to_string();
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("playbooks.json");
        std::fs::write(&path, serde_json::to_string(&vec![custom.clone()]).expect("json")).expect("write");

        let overlaid = PlaybookCatalog::from_config(&PlaybooksConfig { path: Some(path.clone()), include_builtin: true })
            .expect("overlay");
        let only_file = PlaybookCatalog::from_config(&PlaybooksConfig { path: Some(path), include_builtin: false })
            .expect("file only");

        assert_eq!(overlaid.playbooks().len(), PlaybookCatalog::builtin().playbooks().len());
        assert!(overlaid.playbooks().iter().any(|playbook| playbook.name == "Custom name"));
        assert_eq!(only_file.playbooks().len(), 1);
        assert_eq!(only_file.playbooks()[0].key, custom.key);
    }

    #[tokio::test]
    async fn filters_by_provider_and_enabled() {
        let mut playbooks = PlaybookCatalog::builtin().playbooks().to_vec();
        playbooks[0].enabled = false;
        let catalog = PlaybookCatalog::new(playbooks).expect("catalog");

        let google = catalog
            .get_filtered(&PlaybookFilter { provider: Some(Provider::Google), enabled: Some(true) })
            .await
            .expect("filter");
        let keys = google.iter().map(|playbook| playbook.key.as_str()).collect::<Vec<_>>();

        assert!(keys.contains(&"reduce_bids_high_cpc"));
        assert!(!keys.contains(&"refresh_fatigued_creative"));
        assert!(!keys.contains(&"pause_wasted_spend"));
        assert!(catalog.get("scale_high_roas").await.expect("get").is_some());
        assert!(catalog.get("nope").await.expect("get").is_none());
    }

    #[test]
    fn json_catalog_rejects_duplicates_and_bad_json() {
        let raw = r#"[
            {"key": "a", "name": "A", "description": "d", "applies_to": {"providers": ["meta"], "levels": ["ad"]}},
            {"key": "a", "name": "A2", "description": "d", "applies_to": {"providers": ["meta"], "levels": ["ad"]}}
        ]"#;
        assert!(matches!(PlaybookCatalog::from_json_str(raw), Err(ApplicationError::Configuration(_))));
        assert!(PlaybookCatalog::from_json_str("{").is_err());
    }

    #[test]
    fn extra_playbooks_override_builtins_by_key() {
        let mut replacement = PlaybookCatalog::builtin().playbooks()[1].clone();
        replacement.enabled = false;

        let catalog = PlaybookCatalog::builtin_with(vec![replacement]).expect("catalog");

        let scaled = catalog.playbooks().iter().find(|playbook| playbook.key == "scale_high_roas");
        assert_eq!(scaled.map(|playbook| playbook.enabled), Some(false));
        assert_eq!(catalog.playbooks().len(), PlaybookCatalog::builtin().playbooks().len());
    }
}

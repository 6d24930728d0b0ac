use std::collections::BTreeMap;

use serde_json::Value;

use super::{ConditionEvaluation, RuleContext};
use crate::domain::metrics::MetricsSnapshot;

/// Renders an explanation template against a flat variable map.
pub trait TemplateFormatter: Send + Sync {
    fn format(&self, template: &str, variables: &BTreeMap<String, String>) -> String;
}

/// `{{name}}` substitution. Whitespace inside the braces is ignored and unknown names
/// are left in place.
#[derive(Clone, Copy, Debug, Default)]
pub struct PlaceholderFormatter;

impl TemplateFormatter for PlaceholderFormatter {
    fn format(&self, template: &str, variables: &BTreeMap<String, String>) -> String {
        let mut output = String::with_capacity(template.len());
        let mut rest = template;

        while let Some(start) = rest.find("{{") {
            output.push_str(&rest[..start]);
            let after_open = &rest[start + 2..];
            let Some(end) = after_open.find("}}") else {
                output.push_str(&rest[start..]);
                return output;
            };

            let key = after_open[..end].trim();
            match variables.get(key) {
                Some(value) => output.push_str(value),
                None => output.push_str(&rest[start..start + 2 + end + 2]),
            }
            rest = &after_open[end + 2..];
        }

        output.push_str(rest);
        output
    }
}

/// Shortest round-trip rendering: `2.5` stays `2.5`, `3.0` becomes `3`.
pub fn format_number(value: f64) -> String {
    format!("{value}")
}

/// Variables available to explanation templates: entity identity, the flattened
/// primary snapshot, and `<label>_actual|_expected|_passed` per condition.
pub fn build_template_variables(
    context: &RuleContext,
    primary: &MetricsSnapshot,
    condition_results: &[ConditionEvaluation],
) -> BTreeMap<String, String> {
    let mut variables = BTreeMap::new();
    variables.insert("account_id".to_string(), context.account_id.clone());
    variables.insert("provider".to_string(), context.provider.as_str().to_string());
    variables.insert("entity_type".to_string(), context.entity_type.as_str().to_string());
    variables.insert("entity_id".to_string(), context.entity_id.clone());
    variables.insert("entity_name".to_string(), context.entity_name.clone());
    if let Some(objective) = &context.objective {
        variables.insert("objective".to_string(), objective.clone());
    }

    if let Ok(snapshot) = serde_json::to_value(primary) {
        flatten_into(&mut variables, None, &snapshot);
    }

    for condition in condition_results {
        variables.insert(format!("{}_actual", condition.label), render_value(&condition.actual_value));
        variables.insert(
            format!("{}_expected", condition.label),
            render_value(&condition.expected_value),
        );
        variables.insert(format!("{}_passed", condition.label), condition.passed.to_string());
    }

    variables
}

fn flatten_into(variables: &mut BTreeMap<String, String>, prefix: Option<&str>, value: &Value) {
    match value {
        Value::Object(fields) => {
            for (key, nested) in fields {
                let name = match prefix {
                    Some(prefix) => format!("{prefix}_{key}"),
                    None => key.clone(),
                };
                flatten_into(variables, Some(&name), nested);
            }
        }
        other => {
            if let Some(prefix) = prefix {
                variables.insert(prefix.to_string(), render_value(other));
            }
        }
    }
}

fn render_value(value: &Value) -> String {
    match value {
        Value::Null => "n/a".to_string(),
        Value::Bool(flag) => flag.to_string(),
        Value::Number(number) => number.as_f64().map(format_number).unwrap_or_else(|| number.to_string()),
        Value::String(text) => text.clone(),
        Value::Array(items) => {
            let rendered = items.iter().map(render_value).collect::<Vec<_>>();
            format!("[{}]", rendered.join(", "))
        }
        Value::Object(_) => value.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use serde_json::json;

    use super::*;
    use crate::domain::entity::{Provider, ScopeType};
    use crate::domain::metrics::{MetricTotals, MetricsWindow, Trend};
    use crate::rules::ConditionGroup;

    fn vars(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs.iter().map(|(key, value)| (key.to_string(), value.to_string())).collect()
    }

    #[test]
    fn substitutes_known_placeholders_and_keeps_unknown_ones() {
        let rendered = PlaceholderFormatter.format(
            "CTR is {{ ctr }}% for {{entity_name}} ({{unknown}})",
            &vars(&[("ctr", "0.4"), ("entity_name", "Spring Sale")]),
        );

        assert_eq!(rendered, "CTR is 0.4% for Spring Sale ({{unknown}})");
    }

    #[test]
    fn unterminated_placeholder_is_left_verbatim() {
        let rendered = PlaceholderFormatter.format("spend {{spend and more", &vars(&[("spend", "1")]));
        assert_eq!(rendered, "spend {{spend and more");
    }

    #[test]
    fn substituted_values_are_not_expanded_again() {
        let rendered = PlaceholderFormatter.format("{{a}}", &vars(&[("a", "{{b}}"), ("b", "x")]));
        assert_eq!(rendered, "{{b}}");
    }

    #[test]
    fn numbers_use_shortest_display() {
        assert_eq!(format_number(2.5), "2.5");
        assert_eq!(format_number(3.0), "3");
        assert_eq!(format_number(0.1 + 0.2), "0.30000000000000004");
    }

    #[test]
    fn variables_include_flattened_trend_and_condition_results() {
        let snapshot = MetricsSnapshot::from_totals(MetricTotals {
            impressions: 1_000.0,
            clicks: 25.0,
            ..MetricTotals::default()
        })
        .with_trend(Trend::between(80.0, 100.0));
        let context = RuleContext {
            account_id: "acct-1".to_string(),
            provider: Provider::Google,
            entity_type: ScopeType::AdGroup,
            entity_id: "ag-1".to_string(),
            entity_name: "Brand terms".to_string(),
            objective: None,
            metrics: Default::default(),
        }
        .with_metrics(MetricsWindow::Last7Days, snapshot.clone());
        let conditions = vec![ConditionEvaluation {
            group: ConditionGroup::All,
            label: "ctr".to_string(),
            passed: true,
            actual_value: json!(2.5),
            expected_value: json!(3.0),
            operator: "<".to_string(),
            details: String::new(),
        }];

        let variables = build_template_variables(&context, &snapshot, &conditions);

        assert_eq!(variables.get("ctr").map(String::as_str), Some("2.5"));
        assert_eq!(variables.get("impressions").map(String::as_str), Some("1000"));
        assert_eq!(variables.get("trend_direction").map(String::as_str), Some("declining"));
        assert_eq!(variables.get("trend_significance").map(String::as_str), Some("medium"));
        assert_eq!(variables.get("ctr_actual").map(String::as_str), Some("2.5"));
        assert_eq!(variables.get("ctr_expected").map(String::as_str), Some("3"));
        assert_eq!(variables.get("ctr_passed").map(String::as_str), Some("true"));
        assert_eq!(variables.get("provider").map(String::as_str), Some("google"));
    }
}

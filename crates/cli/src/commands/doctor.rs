use adpilot_agent::AgentRuntime;
use adpilot_core::config::{AppConfig, LoadOptions};
use adpilot_core::PlaybookCatalog;
use adpilot_db::{connect_with_config, migrations};
use serde::Serialize;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
enum CheckStatus {
    Pass,
    Fail,
    Skipped,
}

#[derive(Debug, Serialize)]
struct DoctorCheck {
    name: &'static str,
    status: CheckStatus,
    details: String,
}

#[derive(Debug, Serialize)]
struct DoctorReport {
    overall_status: CheckStatus,
    summary: String,
    checks: Vec<DoctorCheck>,
}

/// Returns the rendered report and whether every non-skipped check passed.
pub fn run(options: &LoadOptions, json_output: bool) -> (String, bool) {
    let report = build_report(options);
    let healthy = report.overall_status == CheckStatus::Pass;

    if json_output {
        let output = serde_json::to_string_pretty(&report).unwrap_or_else(|error| {
            format!(
                "{{\"overall_status\":\"fail\",\"summary\":\"doctor serialization failed\",\"error\":\"{}\"}}",
                escape_json(&error.to_string())
            )
        });
        return (output, healthy);
    }

    (render_human(&report), healthy)
}

fn build_report(options: &LoadOptions) -> DoctorReport {
    let mut checks = Vec::new();

    match AppConfig::load(options.clone()) {
        Ok(config) => {
            checks.push(DoctorCheck {
                name: "config_validation",
                status: CheckStatus::Pass,
                details: "configuration loaded and validated".to_string(),
            });
            checks.push(check_playbook_catalog(&config));
            checks.push(check_llm_readiness(&config));
            checks.push(check_database(&config));
        }
        Err(error) => {
            checks.push(DoctorCheck {
                name: "config_validation",
                status: CheckStatus::Fail,
                details: error.to_string(),
            });
            for name in ["playbook_catalog", "llm_readiness", "database_connectivity"] {
                checks.push(DoctorCheck {
                    name,
                    status: CheckStatus::Skipped,
                    details: "skipped because configuration did not load".to_string(),
                });
            }
        }
    }

    let all_pass = checks.iter().all(|check| check.status != CheckStatus::Fail)
        && checks.first().is_some_and(|check| check.status == CheckStatus::Pass);
    let overall_status = if all_pass { CheckStatus::Pass } else { CheckStatus::Fail };
    let summary = if all_pass {
        "doctor: all readiness checks passed".to_string()
    } else {
        "doctor: one or more readiness checks failed".to_string()
    };

    DoctorReport { overall_status, summary, checks }
}

fn check_playbook_catalog(config: &AppConfig) -> DoctorCheck {
    match PlaybookCatalog::from_config(&config.playbooks) {
        Ok(catalog) => {
            let enabled = catalog.playbooks().iter().filter(|playbook| playbook.enabled).count();
            DoctorCheck {
                name: "playbook_catalog",
                status: CheckStatus::Pass,
                details: format!("{} playbooks loaded ({enabled} enabled)", catalog.playbooks().len()),
            }
        }
        Err(error) => {
            DoctorCheck { name: "playbook_catalog", status: CheckStatus::Fail, details: error.to_string() }
        }
    }
}

fn check_llm_readiness(config: &AppConfig) -> DoctorCheck {
    match AgentRuntime::from_config(&config.llm) {
        Ok(None) => DoctorCheck {
            name: "llm_readiness",
            status: CheckStatus::Skipped,
            details: "llm.enabled is false; rule explanations are used as-is".to_string(),
        },
        Ok(Some(runtime)) => DoctorCheck {
            name: "llm_readiness",
            status: CheckStatus::Pass,
            details: format!("{} client ready for model `{}`", config.llm.provider.as_str(), runtime.model()),
        },
        Err(error) => DoctorCheck {
            name: "llm_readiness",
            status: CheckStatus::Fail,
            details: format!("{error:#}"),
        },
    }
}

fn check_database(config: &AppConfig) -> DoctorCheck {
    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(error) => {
            return DoctorCheck {
                name: "database_connectivity",
                status: CheckStatus::Fail,
                details: format!("failed to initialize async runtime: {error}"),
            };
        }
    };

    let result = runtime.block_on(async {
        let pool = connect_with_config(&config.database)
            .await
            .map_err(|error| format!("failed to connect to database: {error}"))?;
        let applied = migrations::applied_count(&pool)
            .await
            .map_err(|error| format!("failed to read migration history: {error}"));
        pool.close().await;
        applied
    });

    match result {
        Ok(applied) => {
            let pending = migrations::known_count().saturating_sub(applied);
            DoctorCheck {
                name: "database_connectivity",
                status: CheckStatus::Pass,
                details: format!("connected using `{}` ({pending} pending migrations)", config.database.url),
            }
        }
        Err(error) => {
            DoctorCheck { name: "database_connectivity", status: CheckStatus::Fail, details: error }
        }
    }
}

fn render_human(report: &DoctorReport) -> String {
    let mut lines = Vec::new();
    lines.push(report.summary.clone());

    for check in &report.checks {
        let marker = match check.status {
            CheckStatus::Pass => "ok",
            CheckStatus::Fail => "fail",
            CheckStatus::Skipped => "skip",
        };
        lines.push(format!("- [{marker}] {}: {}", check.name, check.details));
    }

    lines.join("\n")
}

fn escape_json(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}

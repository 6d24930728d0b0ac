use adpilot_core::config::LoadOptions;
use adpilot_core::domain::recommendation::{Recommendation, RecommendationId};
use adpilot_core::errors::ApplicationError;
use serde_json::json;

use crate::commands::context::AppContext;
use crate::commands::{execute, CommandFailure, CommandOutput, CommandResult};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HeuristicsOp {
    Run { account_id: String },
    Active { account_id: String },
    All { account_id: String },
    Accept { id: String },
    Reject { id: String, reason: Option<String> },
    Snooze { id: String, days: i64 },
}

pub fn run(options: &LoadOptions, op: HeuristicsOp) -> CommandResult {
    execute("heuristics", options, |config| async move {
        let context = AppContext::open(config).await?;
        let outcome = dispatch(&context, op).await;
        context.close().await;
        outcome
    })
}

async fn dispatch(context: &AppContext, op: HeuristicsOp) -> Result<CommandOutput, CommandFailure> {
    let service = context.heuristic_service()?;
    let failed = |error: ApplicationError| CommandFailure::application("heuristics", error);

    match op {
        HeuristicsOp::Run { account_id } => {
            let created = service.generate_recommendations(&account_id).await.map_err(failed)?;
            listing(format!("created {} heuristic recommendations", created.len()), &account_id, &created)
        }
        HeuristicsOp::Active { account_id } => {
            let active = service.get_active_recommendations(&account_id).await.map_err(failed)?;
            listing(format!("{} active recommendations", active.len()), &account_id, &active)
        }
        HeuristicsOp::All { account_id } => {
            let all = service.get_all_recommendations(&account_id).await.map_err(failed)?;
            listing(format!("{} recommendations", all.len()), &account_id, &all)
        }
        HeuristicsOp::Accept { id } => {
            let updated = service.accept_recommendation(&RecommendationId(id)).await.map_err(failed)?;
            transitioned(updated)
        }
        HeuristicsOp::Reject { id, reason } => {
            let updated =
                service.reject_recommendation(&RecommendationId(id), reason).await.map_err(failed)?;
            transitioned(updated)
        }
        HeuristicsOp::Snooze { id, days } => {
            let updated = service.snooze_recommendation(&RecommendationId(id), days).await.map_err(failed)?;
            transitioned(updated)
        }
    }
}

fn listing(
    message: String,
    account_id: &str,
    recommendations: &[Recommendation],
) -> Result<CommandOutput, CommandFailure> {
    CommandOutput::with_data(message, &json!({ "account_id": account_id, "recommendations": recommendations }))
}

fn transitioned(recommendation: Recommendation) -> Result<CommandOutput, CommandFailure> {
    CommandOutput::with_data(
        format!("recommendation `{}` is now {}", recommendation.id.0, recommendation.status.as_str()),
        &recommendation,
    )
}

use adpilot_core::config::LoadOptions;
use adpilot_core::domain::recommendation::RecommendationFilters;
use serde_json::json;

use crate::commands::context::AppContext;
use crate::commands::{execute, CommandFailure, CommandOutput, CommandResult};

pub fn run(options: &LoadOptions, account_id: String, filters: RecommendationFilters) -> CommandResult {
    execute("list", options, |config| async move {
        let context = AppContext::open(config).await?;
        let outcome = list(&context, &account_id, &filters).await;
        context.close().await;
        outcome
    })
}

async fn list(
    context: &AppContext,
    account_id: &str,
    filters: &RecommendationFilters,
) -> Result<CommandOutput, CommandFailure> {
    let service = context.recommendation_service()?;
    let recommendations = service
        .get_recommendations(account_id, filters)
        .await
        .map_err(|error| CommandFailure::application("list", error))?;

    CommandOutput::with_data(
        format!("{} recommendations for account `{account_id}`", recommendations.len()),
        &json!({ "account_id": account_id, "recommendations": recommendations }),
    )
}

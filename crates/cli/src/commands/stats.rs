use adpilot_core::config::LoadOptions;

use crate::commands::context::AppContext;
use crate::commands::{execute, CommandFailure, CommandOutput, CommandResult};

pub fn run(options: &LoadOptions, account_id: String) -> CommandResult {
    execute("stats", options, |config| async move {
        let context = AppContext::open(config).await?;
        let outcome = match context.recommendation_service() {
            Ok(service) => service
                .get_statistics(&account_id)
                .await
                .map_err(|error| CommandFailure::application("stats", error)),
            Err(failure) => Err(failure),
        };
        context.close().await;
        let stats = outcome?;

        CommandOutput::with_data(
            format!(
                "{} recommendations for account `{account_id}` (average score {:.1})",
                stats.total, stats.average_score
            ),
            &stats,
        )
    })
}

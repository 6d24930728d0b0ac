use adpilot_core::config::LoadOptions;
use adpilot_core::domain::recommendation::{FeedbackType, RecommendationId};

use crate::commands::context::AppContext;
use crate::commands::{execute, CommandFailure, CommandOutput, CommandResult};

#[derive(Debug, Clone)]
pub struct FeedbackArgs {
    pub recommendation_id: String,
    pub account_id: String,
    pub user_id: String,
    pub feedback_type: FeedbackType,
    pub comment: Option<String>,
}

pub fn run(options: &LoadOptions, args: FeedbackArgs) -> CommandResult {
    execute("feedback", options, |config| async move {
        let context = AppContext::open(config).await?;
        let outcome = record(&context, args).await;
        context.close().await;
        outcome
    })
}

async fn record(context: &AppContext, args: FeedbackArgs) -> Result<CommandOutput, CommandFailure> {
    let service = context.recommendation_service()?;
    let feedback = service
        .add_feedback(
            &RecommendationId(args.recommendation_id),
            &args.account_id,
            &args.user_id,
            args.feedback_type,
            args.comment,
        )
        .await
        .map_err(|error| CommandFailure::application("feedback", error))?;

    CommandOutput::with_data(
        format!("recorded {} feedback on `{}`", feedback.label.as_str(), feedback.recommendation_id.0),
        &feedback,
    )
}

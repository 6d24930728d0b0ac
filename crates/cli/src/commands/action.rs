use adpilot_core::config::LoadOptions;
use adpilot_core::domain::recommendation::{ActionRequest, RecommendationAction, RecommendationId};
use adpilot_core::recommendations::parse_apply_result;

use crate::commands::context::AppContext;
use crate::commands::{execute, CommandFailure, CommandOutput, CommandResult};

#[derive(Debug, Clone)]
pub struct ActionArgs {
    pub recommendation_id: String,
    pub action: RecommendationAction,
    pub reason: Option<String>,
    pub snooze_days: Option<i64>,
    /// Raw JSON recorded as the apply result.
    pub result: Option<String>,
}

pub fn run(options: &LoadOptions, args: ActionArgs) -> CommandResult {
    execute("action", options, |config| async move {
        let context = AppContext::open(config).await?;
        let outcome = perform(&context, args).await;
        context.close().await;
        outcome
    })
}

async fn perform(context: &AppContext, args: ActionArgs) -> Result<CommandOutput, CommandFailure> {
    let result = parse_apply_result(args.result.as_deref())
        .map_err(|error| CommandFailure::input(error.to_string()))?;
    let service = context.recommendation_service()?;

    let mut request = ActionRequest::new(RecommendationId(args.recommendation_id), args.action);
    request.reason = args.reason;
    request.snooze_days = args.snooze_days;
    request.result = result;

    let updated = service
        .perform_action(request)
        .await
        .map_err(|error| CommandFailure::application("action", error))?;

    CommandOutput::with_data(
        format!(
            "{} applied to `{}`; status is now {}",
            args.action.as_str(),
            updated.id.0,
            updated.status.as_str()
        ),
        &updated,
    )
}

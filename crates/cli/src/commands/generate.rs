use adpilot_core::config::LoadOptions;
use adpilot_core::domain::entity::{Provider, ScopeType};
use adpilot_core::domain::metrics::MetricsWindow;
use adpilot_core::{CancellationToken, GenerateRequest};
use serde_json::json;
use tracing::warn;

use crate::commands::context::AppContext;
use crate::commands::{execute, CommandFailure, CommandOutput, CommandResult};

#[derive(Debug, Clone)]
pub struct GenerateArgs {
    pub account_id: String,
    pub provider: Provider,
    pub entity_type: Option<ScopeType>,
    pub entity_ids: Vec<String>,
    pub playbooks: Vec<String>,
    pub windows: Vec<MetricsWindow>,
}

pub fn run(options: &LoadOptions, args: GenerateArgs) -> CommandResult {
    execute("generate", options, |config| async move {
        let context = AppContext::open(config).await?;
        let outcome = generate(&context, args).await;
        context.close().await;
        outcome
    })
}

async fn generate(context: &AppContext, args: GenerateArgs) -> Result<CommandOutput, CommandFailure> {
    let service = context.recommendation_service()?;

    let mut request = GenerateRequest::new(args.account_id.clone(), args.provider);
    request.entity_type = args.entity_type;
    request.entity_ids = (!args.entity_ids.is_empty()).then_some(args.entity_ids);
    request.playbook_keys = (!args.playbooks.is_empty()).then_some(args.playbooks);
    request.windows =
        if args.windows.is_empty() { context.config.generation.windows.clone() } else { args.windows };

    let cancel = CancellationToken::new();
    let watcher = cancel.clone();
    let interrupt = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!(event_name = "cli.generate.interrupted", "interrupt received; stopping generation");
            watcher.cancel();
        }
    });

    let result = service.generate_recommendations(&request, &cancel).await;
    interrupt.abort();
    let ids = result.map_err(|error| CommandFailure::application("generate", error))?;

    let ids = ids.into_iter().map(|id| id.0).collect::<Vec<_>>();
    CommandOutput::with_data(
        format!("created {} recommendations for account `{}`", ids.len(), args.account_id),
        &json!({ "account_id": args.account_id, "created": ids, "cancelled": cancel.is_cancelled() }),
    )
}

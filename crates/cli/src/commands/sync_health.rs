use adpilot_core::config::LoadOptions;
use adpilot_core::domain::entity::Provider;
use adpilot_core::sync_health::{detect_discrepancies, SyncFailure, SyncHealthReport, SyncHealthStatus};
use tracing::warn;

use crate::commands::context::AppContext;
use crate::commands::{execute, CommandFailure, CommandOutput, CommandResult, EXIT_OPERATION};

#[derive(Debug, Clone)]
pub struct SyncHealthArgs {
    pub account_id: String,
    pub provider: Provider,
    /// Provider error messages from the last sync attempts.
    pub errors: Vec<String>,
}

pub fn run(options: &LoadOptions, args: SyncHealthArgs) -> CommandResult {
    execute("sync-health", options, |config| async move {
        let context = AppContext::open(config).await?;
        let snapshot = context.entities().load_sync_snapshot(&args.account_id).await;
        context.close().await;
        let snapshot = snapshot
            .map_err(|error| CommandFailure::new("persistence", error.to_string(), EXIT_OPERATION))?;

        let failures = args
            .errors
            .iter()
            .map(|message| SyncFailure::new(args.account_id.clone(), args.provider, message.clone()))
            .collect::<Vec<_>>();
        let report = SyncHealthReport::from_parts(failures, detect_discrepancies(&snapshot));

        if report.status != SyncHealthStatus::Healthy {
            warn!(
                event_name = "cli.sync_health.unhealthy",
                account_id = %args.account_id,
                failures = report.failures.len(),
                discrepancies = report.discrepancies.len(),
                "sync health is not clean"
            );
        }

        CommandOutput::with_data(
            format!(
                "sync health for `{}` is {}: {} failures, {} discrepancies",
                args.account_id,
                report.status.as_str(),
                report.failures.len(),
                report.discrepancies.len()
            ),
            &report,
        )
    })
}

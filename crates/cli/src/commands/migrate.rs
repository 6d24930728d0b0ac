use adpilot_core::config::LoadOptions;
use adpilot_db::{connect_with_config, migrations};

use crate::commands::{
    execute, CommandFailure, CommandOutput, CommandResult, EXIT_DATABASE, EXIT_MIGRATION,
};

pub fn run(options: &LoadOptions) -> CommandResult {
    execute("migrate", options, |config| async move {
        let pool = connect_with_config(&config.database)
            .await
            .map_err(|error| CommandFailure::new("db_connectivity", error.to_string(), EXIT_DATABASE))?;
        migrations::run_pending(&pool)
            .await
            .map_err(|error| CommandFailure::new("migration", error.to_string(), EXIT_MIGRATION))?;
        let known = migrations::known_count();
        pool.close().await;
        Ok(CommandOutput::message(format!("applied pending migrations ({known} known)")))
    })
}

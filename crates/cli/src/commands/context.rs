use std::sync::Arc;

use adpilot_agent::AgentRuntime;
use adpilot_core::config::AppConfig;
use adpilot_core::{HeuristicService, PlaybookCatalog, RecommendationService};
use adpilot_db::{
    connect_with_config, migrations, DbPool, SqlEntityRepository, SqlFeedbackRepository,
    SqlInsightRepository, SqlRecommendationRepository,
};
use tracing::debug;

use crate::commands::{CommandFailure, EXIT_CONFIG, EXIT_DATABASE, EXIT_MIGRATION};

/// Migrated pool plus the configuration commands build services from.
pub struct AppContext {
    pub config: AppConfig,
    pub pool: DbPool,
}

impl AppContext {
    pub async fn open(config: AppConfig) -> Result<Self, CommandFailure> {
        let pool = connect_with_config(&config.database)
            .await
            .map_err(|error| CommandFailure::new("db_connectivity", error.to_string(), EXIT_DATABASE))?;
        migrations::run_pending(&pool)
            .await
            .map_err(|error| CommandFailure::new("migration", error.to_string(), EXIT_MIGRATION))?;
        debug!(event_name = "cli.context.opened", database_url = %config.database.url, "database ready");
        Ok(Self { config, pool })
    }

    fn agent(&self) -> Result<Option<AgentRuntime>, CommandFailure> {
        AgentRuntime::from_config(&self.config.llm)
            .map_err(|error| CommandFailure::new("llm_client", format!("{error:#}"), EXIT_CONFIG))
    }

    pub fn recommendation_service(&self) -> Result<RecommendationService, CommandFailure> {
        let catalog = PlaybookCatalog::from_config(&self.config.playbooks)
            .map_err(|error| CommandFailure::new("playbook_catalog", error.to_string(), EXIT_CONFIG))?;

        let mut service = RecommendationService::new(
            Arc::new(catalog),
            Arc::new(SqlEntityRepository::new(self.pool.clone())),
            Arc::new(SqlInsightRepository::new(self.pool.clone())),
            Arc::new(SqlRecommendationRepository::new(self.pool.clone())),
            Arc::new(SqlFeedbackRepository::new(self.pool.clone())),
        )
        .with_settings(self.config.generation.settings());

        if let Some(agent) = self.agent()? {
            service = service.with_explanation_service(agent.explanation_service());
        }
        Ok(service)
    }

    pub fn heuristic_service(&self) -> Result<HeuristicService, CommandFailure> {
        let mut service = HeuristicService::new(
            Arc::new(SqlEntityRepository::new(self.pool.clone())),
            Arc::new(SqlInsightRepository::new(self.pool.clone())),
            Arc::new(SqlRecommendationRepository::new(self.pool.clone())),
        )
        .with_settings(self.config.generation.heuristic_settings());

        if let Some(agent) = self.agent()? {
            service = service.with_description_generator(agent.description_generator());
        }
        Ok(service)
    }

    pub fn entities(&self) -> SqlEntityRepository {
        SqlEntityRepository::new(self.pool.clone())
    }

    pub fn insights(&self) -> SqlInsightRepository {
        SqlInsightRepository::new(self.pool.clone())
    }

    pub async fn close(self) {
        self.pool.close().await;
    }
}

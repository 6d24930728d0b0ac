pub mod cancellation;
pub mod config;
pub mod domain;
pub mod errors;
pub mod heuristics;
pub mod playbooks;
pub mod recommendations;
pub mod rules;
pub mod sync_health;

pub use cancellation::CancellationToken;
pub use domain::entity::{EntityRef, Provider, ScopeType};
pub use domain::metrics::{DailyMetrics, MetricsSnapshot, MetricsWindow, Trend};
pub use domain::playbook::{Condition, Guardrails, Playbook};
pub use domain::recommendation::{
    ActionRequest, Feedback, FeedbackType, Priority, Recommendation, RecommendationAction,
    RecommendationFilters, RecommendationId, RecommendationStatistics, RecommendationStatus,
    RecommendationWithFeedback,
};
pub use errors::{ApplicationError, DomainError, InterfaceError};
pub use heuristics::{HeuristicService, HeuristicSettings};
pub use playbooks::PlaybookCatalog;
pub use recommendations::{GenerateRequest, GenerationSettings, RecommendationService};
pub use rules::{ConditionEvaluator, RuleContext, RuleEngine, RuleEvaluationResult};
pub use sync_health::{classify_sync_error, detect_discrepancies, AccessIssue, SyncHealthReport};

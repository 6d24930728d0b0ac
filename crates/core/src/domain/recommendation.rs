use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::domain::entity::{Provider, ScopeType};
use crate::domain::metrics::MetricsSnapshot;
use crate::domain::playbook::{ActionType, Guardrails};
use crate::errors::DomainError;

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RecommendationId(pub String);

impl RecommendationId {
    pub fn generate() -> Self {
        Self(format!("rec_{}", uuid::Uuid::new_v4().simple()))
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecommendationStatus {
    Proposed,
    Accepted,
    Rejected,
    Applied,
    Reverted,
}

impl RecommendationStatus {
    pub const OPEN: [RecommendationStatus; 2] = [Self::Proposed, Self::Accepted];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Proposed => "proposed",
            Self::Accepted => "accepted",
            Self::Rejected => "rejected",
            Self::Applied => "applied",
            Self::Reverted => "reverted",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "proposed" => Some(Self::Proposed),
            "accepted" => Some(Self::Accepted),
            "rejected" => Some(Self::Rejected),
            "applied" => Some(Self::Applied),
            "reverted" => Some(Self::Reverted),
            _ => None,
        }
    }

    /// Statuses that count toward the one-active-recommendation invariant.
    pub fn is_open(&self) -> bool {
        Self::OPEN.contains(self)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Critical,
    High,
    Medium,
    Low,
}

impl Priority {
    pub fn from_score(score: f64) -> Self {
        if score >= 80.0 {
            Self::Critical
        } else if score >= 60.0 {
            Self::High
        } else if score >= 40.0 {
            Self::Medium
        } else {
            Self::Low
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Critical => "critical",
            Self::High => "high",
            Self::Medium => "medium",
            Self::Low => "low",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "critical" => Some(Self::Critical),
            "high" => Some(Self::High),
            "medium" => Some(Self::Medium),
            "low" => Some(Self::Low),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Budget,
    Creative,
    Targeting,
    Performance,
    Growth,
    Bidding,
    Scheduling,
    Optimization,
}

impl Category {
    /// Derives the category from the dominant action type name.
    pub fn from_action_type(action_type: &str) -> Self {
        let action_type = action_type.to_ascii_lowercase();
        if action_type.contains("budget") {
            Self::Budget
        } else if action_type.contains("creative") {
            Self::Creative
        } else if action_type.contains("targeting") || action_type.contains("audience") {
            Self::Targeting
        } else if action_type.contains("bid") {
            Self::Bidding
        } else if action_type.contains("schedul") || action_type.contains("daypart") {
            Self::Scheduling
        } else {
            Self::Performance
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Budget => "budget",
            Self::Creative => "creative",
            Self::Targeting => "targeting",
            Self::Performance => "performance",
            Self::Growth => "growth",
            Self::Bidding => "bidding",
            Self::Scheduling => "scheduling",
            Self::Optimization => "optimization",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "budget" => Some(Self::Budget),
            "creative" => Some(Self::Creative),
            "targeting" => Some(Self::Targeting),
            "performance" => Some(Self::Performance),
            "growth" => Some(Self::Growth),
            "bidding" => Some(Self::Bidding),
            "scheduling" => Some(Self::Scheduling),
            "optimization" => Some(Self::Optimization),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EstimatedImpact {
    pub metric: String,
    pub current_value: f64,
    pub projected_value: f64,
    pub change_pct: f64,
    pub confidence: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub revenue_impact: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cost_savings: Option<f64>,
}

/// A playbook action instantiated against concrete metrics.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ActionPayload {
    #[serde(rename = "type")]
    pub action_type: ActionType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
    #[serde(default)]
    pub params: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub change_pct: Option<f64>,
    pub guardrails: Guardrails,
    pub estimated_impact: EstimatedImpact,
    pub metrics_snapshot: MetricsSnapshot,
    #[serde(default)]
    pub manual_implementation_required: bool,
    #[serde(default)]
    pub guardrails_applied: bool,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
    pub id: RecommendationId,
    pub account_id: String,
    pub provider: Provider,
    pub scope_type: ScopeType,
    pub scope_id: String,
    pub rule_key: String,
    #[serde(rename = "type")]
    pub recommendation_type: String,
    pub title: String,
    pub description: String,
    pub priority: Priority,
    pub category: Category,
    pub payload: Option<ActionPayload>,
    pub metrics_snapshot: Option<MetricsSnapshot>,
    pub estimated_impact: Option<EstimatedImpact>,
    pub score: f64,
    pub confidence: f64,
    pub ai_explanation: Option<String>,
    pub ai_model: Option<String>,
    pub status: RecommendationStatus,
    pub accepted_at: Option<DateTime<Utc>>,
    pub rejected_at: Option<DateTime<Utc>>,
    pub applied_at: Option<DateTime<Utc>>,
    pub reverted_at: Option<DateTime<Utc>>,
    pub snoozed_until: Option<DateTime<Utc>>,
    pub expires_at: Option<DateTime<Utc>>,
    pub status_reason: Option<String>,
    pub apply_result: Option<Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Recommendation {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.map(|expires_at| expires_at <= now).unwrap_or(false)
    }

    pub fn is_snoozed(&self, now: DateTime<Utc>) -> bool {
        self.snoozed_until.map(|until| until > now).unwrap_or(false)
    }

    /// Open and unexpired: blocks creation of a duplicate for the same scope and rule.
    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        self.status.is_open() && !self.is_expired(now)
    }

    /// Whether this recommendation prevents `candidate` from being created: same account,
    /// scope and rule, created at or after `since`, unexpired and in one of `statuses`.
    pub fn blocks(
        &self,
        candidate: &Recommendation,
        statuses: &[RecommendationStatus],
        since: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> bool {
        self.account_id == candidate.account_id
            && self.scope_type == candidate.scope_type
            && self.scope_id == candidate.scope_id
            && self.rule_key == candidate.rule_key
            && self.created_at >= since
            && statuses.contains(&self.status)
            && !self.is_expired(now)
    }

    pub fn accept(&mut self, now: DateTime<Utc>) -> Result<(), DomainError> {
        self.require(&[RecommendationStatus::Proposed], RecommendationStatus::Accepted)?;
        self.status = RecommendationStatus::Accepted;
        self.accepted_at = Some(now);
        self.updated_at = now;
        Ok(())
    }

    pub fn reject(&mut self, now: DateTime<Utc>, reason: Option<String>) -> Result<(), DomainError> {
        self.require(&[RecommendationStatus::Proposed], RecommendationStatus::Rejected)?;
        self.status = RecommendationStatus::Rejected;
        self.rejected_at = Some(now);
        if reason.is_some() {
            self.status_reason = reason;
        }
        self.updated_at = now;
        Ok(())
    }

    pub fn snooze(&mut self, now: DateTime<Utc>, days: i64) -> Result<(), DomainError> {
        self.require(&[RecommendationStatus::Proposed], RecommendationStatus::Proposed)?;
        if days <= 0 {
            return Err(DomainError::InvariantViolation(format!(
                "snooze days must be positive, got {days}"
            )));
        }
        self.snoozed_until = Some(now + Duration::days(days));
        self.updated_at = now;
        Ok(())
    }

    pub fn mark_applied(&mut self, now: DateTime<Utc>, result: Option<Value>) -> Result<(), DomainError> {
        self.require(
            &[RecommendationStatus::Proposed, RecommendationStatus::Accepted],
            RecommendationStatus::Applied,
        )?;
        self.status = RecommendationStatus::Applied;
        self.applied_at = Some(now);
        self.apply_result = result;
        self.updated_at = now;
        Ok(())
    }

    pub fn mark_reverted(&mut self, now: DateTime<Utc>, reason: Option<String>) -> Result<(), DomainError> {
        self.require(&[RecommendationStatus::Applied], RecommendationStatus::Reverted)?;
        self.status = RecommendationStatus::Reverted;
        self.reverted_at = Some(now);
        self.status_reason = reason;
        self.updated_at = now;
        Ok(())
    }

    fn require(
        &self,
        allowed: &[RecommendationStatus],
        to: RecommendationStatus,
    ) -> Result<(), DomainError> {
        if allowed.contains(&self.status) {
            Ok(())
        } else {
            Err(DomainError::InvalidTransition { from: self.status, to })
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecommendationAction {
    Accept,
    Reject,
    Snooze,
    Apply,
    Revert,
}

impl RecommendationAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Accept => "accept",
            Self::Reject => "reject",
            Self::Snooze => "snooze",
            Self::Apply => "apply",
            Self::Revert => "revert",
        }
    }
}

impl std::str::FromStr for RecommendationAction {
    type Err = DomainError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "accept" => Ok(Self::Accept),
            "reject" => Ok(Self::Reject),
            "snooze" => Ok(Self::Snooze),
            "apply" => Ok(Self::Apply),
            "revert" => Ok(Self::Revert),
            other => Err(DomainError::InvariantViolation(format!(
                "unsupported recommendation action `{other}` (expected accept|reject|snooze|apply|revert)"
            ))),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct ActionRequest {
    pub recommendation_id: RecommendationId,
    pub action: RecommendationAction,
    pub reason: Option<String>,
    pub snooze_days: Option<i64>,
    pub result: Option<Value>,
}

impl ActionRequest {
    pub fn new(recommendation_id: RecommendationId, action: RecommendationAction) -> Self {
        Self { recommendation_id, action, reason: None, snooze_days: None, result: None }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeedbackType {
    ThumbsUp,
    ThumbsDown,
    Comment,
}

impl FeedbackType {
    pub fn label(&self) -> FeedbackLabel {
        match self {
            Self::ThumbsUp => FeedbackLabel::Helpful,
            Self::ThumbsDown => FeedbackLabel::NotHelpful,
            Self::Comment => FeedbackLabel::Comment,
        }
    }
}

impl std::str::FromStr for FeedbackType {
    type Err = DomainError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "thumbs_up" => Ok(Self::ThumbsUp),
            "thumbs_down" => Ok(Self::ThumbsDown),
            "comment" => Ok(Self::Comment),
            other => Err(DomainError::InvariantViolation(format!(
                "unsupported feedback type `{other}` (expected thumbs_up|thumbs_down|comment)"
            ))),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeedbackLabel {
    Helpful,
    NotHelpful,
    Comment,
}

impl FeedbackLabel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Helpful => "helpful",
            Self::NotHelpful => "not_helpful",
            Self::Comment => "comment",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "helpful" => Some(Self::Helpful),
            "not_helpful" => Some(Self::NotHelpful),
            "comment" => Some(Self::Comment),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Feedback {
    pub id: String,
    pub recommendation_id: RecommendationId,
    pub account_id: String,
    pub user_id: String,
    pub label: FeedbackLabel,
    pub comment: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RecommendationFilters {
    pub provider: Option<Provider>,
    pub status: Option<RecommendationStatus>,
    pub priority: Option<Priority>,
    pub category: Option<Category>,
    pub scope_type: Option<ScopeType>,
}

impl RecommendationFilters {
    pub fn matches(&self, recommendation: &Recommendation) -> bool {
        self.provider.map_or(true, |provider| recommendation.provider == provider)
            && self.status.map_or(true, |status| recommendation.status == status)
            && self.priority.map_or(true, |priority| recommendation.priority == priority)
            && self.category.map_or(true, |category| recommendation.category == category)
            && self.scope_type.map_or(true, |scope_type| recommendation.scope_type == scope_type)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RecommendationWithFeedback {
    pub recommendation: Recommendation,
    pub feedback: Vec<Feedback>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RecommendationStatistics {
    pub total: u64,
    pub by_status: BTreeMap<String, u64>,
    pub by_priority: BTreeMap<String, u64>,
    pub by_category: BTreeMap<String, u64>,
    pub average_score: f64,
}

impl RecommendationStatistics {
    pub fn from_recommendations<'a>(
        recommendations: impl IntoIterator<Item = &'a Recommendation>,
    ) -> Self {
        let mut stats = Self::default();
        let mut score_sum = 0.0;

        for recommendation in recommendations {
            stats.total += 1;
            score_sum += recommendation.score;
            *stats.by_status.entry(recommendation.status.as_str().to_string()).or_insert(0) += 1;
            *stats.by_priority.entry(recommendation.priority.as_str().to_string()).or_insert(0) +=
                1;
            *stats.by_category.entry(recommendation.category.as_str().to_string()).or_insert(0) +=
                1;
        }

        if stats.total > 0 {
            stats.average_score = score_sum / stats.total as f64;
        }
        stats
    }
}


#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};

    use super::fixtures::proposed;
    use super::*;

    #[test]
    fn priority_thresholds_follow_score_bands() {
        assert_eq!(Priority::from_score(80.0), Priority::Critical);
        assert_eq!(Priority::from_score(79.9), Priority::High);
        assert_eq!(Priority::from_score(60.0), Priority::High);
        assert_eq!(Priority::from_score(40.0), Priority::Medium);
        assert_eq!(Priority::from_score(39.99), Priority::Low);
    }

    #[test]
    fn category_is_derived_from_action_type_substrings() {
        assert_eq!(Category::from_action_type("recommend_budget_change"), Category::Budget);
        assert_eq!(Category::from_action_type("recommend_creative_refresh"), Category::Creative);
        assert_eq!(Category::from_action_type("recommend_audience_expansion"), Category::Targeting);
        assert_eq!(Category::from_action_type("recommend_bid_adjustment"), Category::Bidding);
        assert_eq!(Category::from_action_type("recommend_dayparting"), Category::Scheduling);
        assert_eq!(Category::from_action_type("recommend_pause"), Category::Performance);
    }

    #[test]
    fn accept_then_apply_then_revert_records_timestamps() {
        let now = Utc::now();
        let mut recommendation = proposed("rec-1", now);

        recommendation.accept(now).expect("accept");
        recommendation.mark_applied(now, None).expect("apply");
        recommendation.mark_reverted(now, Some("too aggressive".to_string())).expect("revert");

        assert_eq!(recommendation.status, RecommendationStatus::Reverted);
        assert_eq!(recommendation.accepted_at, Some(now));
        assert_eq!(recommendation.applied_at, Some(now));
        assert_eq!(recommendation.reverted_at, Some(now));
        assert_eq!(recommendation.status_reason.as_deref(), Some("too aggressive"));
    }

    #[test]
    fn rejected_recommendation_cannot_be_applied() {
        let now = Utc::now();
        let mut recommendation = proposed("rec-1", now);
        recommendation.reject(now, None).expect("reject");

        let error = recommendation.mark_applied(now, None).expect_err("apply should fail");
        assert_eq!(
            error,
            DomainError::InvalidTransition {
                from: RecommendationStatus::Rejected,
                to: RecommendationStatus::Applied,
            }
        );
    }

    #[test]
    fn snooze_keeps_status_proposed() {
        let now = Utc::now();
        let mut recommendation = proposed("rec-1", now);

        recommendation.snooze(now, 7).expect("snooze");

        assert_eq!(recommendation.status, RecommendationStatus::Proposed);
        assert_eq!(recommendation.snoozed_until, Some(now + Duration::days(7)));
        assert!(recommendation.is_snoozed(now));
        assert!(recommendation.snooze(now, 0).is_err());
    }

    #[test]
    fn expired_recommendations_are_not_active() {
        let now = Utc::now();
        let mut recommendation = proposed("rec-1", now);
        assert!(recommendation.is_active(now));

        recommendation.expires_at = Some(now - Duration::seconds(1));
        assert!(!recommendation.is_active(now));
    }

    #[test]
    fn action_and_feedback_strings_parse_strictly() {
        assert_eq!("Accept".parse::<RecommendationAction>(), Ok(RecommendationAction::Accept));
        assert!("archive".parse::<RecommendationAction>().is_err());
        assert_eq!("thumbs_down".parse::<FeedbackType>().map(|t| t.label()), Ok(FeedbackLabel::NotHelpful));
        assert!("love".parse::<FeedbackType>().is_err());
    }

    #[test]
    fn statistics_group_and_average() {
        let now = Utc::now();
        let first = proposed("rec-1", now);
        let mut second = proposed("rec-2", now);
        second.score = 85.0;
        second.priority = Priority::Critical;
        second.status = RecommendationStatus::Accepted;

        let stats = RecommendationStatistics::from_recommendations([&first, &second]);

        assert_eq!(stats.total, 2);
        assert_eq!(stats.by_status.get("proposed"), Some(&1));
        assert_eq!(stats.by_status.get("accepted"), Some(&1));
        assert_eq!(stats.by_priority.get("critical"), Some(&1));
        assert_eq!(stats.by_category.get("creative"), Some(&2));
        assert!((stats.average_score - 65.0).abs() < 1e-9);
        assert_eq!(RecommendationStatistics::from_recommendations(std::iter::empty()).average_score, 0.0);
    }
}

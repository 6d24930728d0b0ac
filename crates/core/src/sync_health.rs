//! Classification of provider sync failures and consistency checks over synced entities.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::domain::entity::{Ad, AdGroup, Campaign, Provider, ScopeType};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessIssue {
    TokenExpired,
    PermissionDenied,
    AccountDisabled,
    RateLimited,
    NotFound,
    Network,
    Unknown,
}

impl AccessIssue {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::TokenExpired => "token_expired",
            Self::PermissionDenied => "permission_denied",
            Self::AccountDisabled => "account_disabled",
            Self::RateLimited => "rate_limited",
            Self::NotFound => "not_found",
            Self::Network => "network",
            Self::Unknown => "unknown",
        }
    }

    /// Whether the account owner must act before syncing can succeed again.
    pub fn requires_user_action(&self) -> bool {
        matches!(
            self,
            Self::TokenExpired | Self::PermissionDenied | Self::AccountDisabled | Self::NotFound
        )
    }

    pub fn remediation(&self) -> &'static str {
        match self {
            Self::TokenExpired => "Reconnect the ad account to refresh its access token.",
            Self::PermissionDenied => "Grant the integration access to the ad account and its assets.",
            Self::AccountDisabled => "Resolve the account restriction with the ad provider.",
            Self::RateLimited => "Wait for the provider quota to reset; the next sync will retry.",
            Self::NotFound => "Check that the ad account still exists and is linked to this workspace.",
            Self::Network => "Retry later; the provider could not be reached.",
            Self::Unknown => "Inspect the provider error and retry the sync.",
        }
    }
}

const KEYWORDS: &[(AccessIssue, &[&str])] = &[
    (
        AccessIssue::TokenExpired,
        &["token expired", "expired token", "invalid_grant", "session has expired", "invalid oauth", "unauthenticated"],
    ),
    (
        AccessIssue::AccountDisabled,
        &["account disabled", "account is disabled", "account suspended", "customer_not_enabled", "account closed"],
    ),
    (
        AccessIssue::PermissionDenied,
        &["permission", "not authorized", "unauthorized", "forbidden", "access denied", "user_permission_denied"],
    ),
    (
        AccessIssue::RateLimited,
        &["rate limit", "too many requests", "quota", "resource_exhausted", "throttl"],
    ),
    (AccessIssue::NotFound, &["not found", "does not exist", "unknown account", "no such"]),
    (
        AccessIssue::Network,
        &["timeout", "timed out", "connection", "dns", "network", "econnreset", "unreachable"],
    ),
];

/// Maps provider error text to a category by case-insensitive keyword match. Earlier
/// categories win when several match.
pub fn classify_sync_error(message: &str) -> AccessIssue {
    let message = message.to_ascii_lowercase();
    KEYWORDS
        .iter()
        .find(|(_, keywords)| keywords.iter().any(|keyword| message.contains(keyword)))
        .map(|(issue, _)| *issue)
        .unwrap_or(AccessIssue::Unknown)
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncFailure {
    pub account_id: String,
    pub provider: Provider,
    pub message: String,
    pub issue: AccessIssue,
}

impl SyncFailure {
    pub fn new(account_id: impl Into<String>, provider: Provider, message: impl Into<String>) -> Self {
        let message = message.into();
        let issue = classify_sync_error(&message);
        Self { account_id: account_id.into(), provider, message, issue }
    }
}

/// A daily insight row as referenced during consistency checks.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct InsightRef {
    pub account_id: String,
    pub scope_type: ScopeType,
    pub entity_id: String,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct SyncSnapshot {
    pub campaigns: Vec<Campaign>,
    pub ad_groups: Vec<AdGroup>,
    pub ads: Vec<Ad>,
    pub insights: Vec<InsightRef>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiscrepancyKind {
    OrphanAdGroup,
    OrphanAd,
    OrphanInsight,
    AccountMismatch,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Discrepancy {
    pub kind: DiscrepancyKind,
    pub scope_type: ScopeType,
    pub entity_id: String,
    pub details: String,
}

pub fn detect_discrepancies(snapshot: &SyncSnapshot) -> Vec<Discrepancy> {
    let campaigns = snapshot
        .campaigns
        .iter()
        .map(|campaign| (campaign.id.as_str(), campaign.account_id.as_str()))
        .collect::<HashMap<_, _>>();
    let ad_groups = snapshot
        .ad_groups
        .iter()
        .map(|ad_group| (ad_group.id.as_str(), ad_group.account_id.as_str()))
        .collect::<HashMap<_, _>>();
    let ads = snapshot.ads.iter().map(|ad| ad.id.as_str()).collect::<HashSet<_>>();

    let mut discrepancies = Vec::new();

    for ad_group in &snapshot.ad_groups {
        match campaigns.get(ad_group.campaign_id.as_str()) {
            None => discrepancies.push(Discrepancy {
                kind: DiscrepancyKind::OrphanAdGroup,
                scope_type: ScopeType::AdGroup,
                entity_id: ad_group.id.clone(),
                details: format!("campaign `{}` is missing", ad_group.campaign_id),
            }),
            Some(account_id) if *account_id != ad_group.account_id => discrepancies.push(Discrepancy {
                kind: DiscrepancyKind::AccountMismatch,
                scope_type: ScopeType::AdGroup,
                entity_id: ad_group.id.clone(),
                details: format!(
                    "belongs to account `{}` but campaign `{}` belongs to `{account_id}`",
                    ad_group.account_id, ad_group.campaign_id
                ),
            }),
            Some(_) => {}
        }
    }

    for ad in &snapshot.ads {
        match ad_groups.get(ad.ad_group_id.as_str()) {
            None => discrepancies.push(Discrepancy {
                kind: DiscrepancyKind::OrphanAd,
                scope_type: ScopeType::Ad,
                entity_id: ad.id.clone(),
                details: format!("ad group `{}` is missing", ad.ad_group_id),
            }),
            Some(account_id) if *account_id != ad.account_id => discrepancies.push(Discrepancy {
                kind: DiscrepancyKind::AccountMismatch,
                scope_type: ScopeType::Ad,
                entity_id: ad.id.clone(),
                details: format!(
                    "belongs to account `{}` but ad group `{}` belongs to `{account_id}`",
                    ad.account_id, ad.ad_group_id
                ),
            }),
            Some(_) => {}
        }
    }

    for insight in &snapshot.insights {
        let known = match insight.scope_type {
            ScopeType::Campaign => campaigns.contains_key(insight.entity_id.as_str()),
            ScopeType::AdGroup => ad_groups.contains_key(insight.entity_id.as_str()),
            ScopeType::Ad => ads.contains(insight.entity_id.as_str()),
        };
        if !known {
            discrepancies.push(Discrepancy {
                kind: DiscrepancyKind::OrphanInsight,
                scope_type: insight.scope_type,
                entity_id: insight.entity_id.clone(),
                details: format!(
                    "insight rows reference unknown {} `{}`",
                    insight.scope_type.as_str(),
                    insight.entity_id
                ),
            });
        }
    }

    discrepancies
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncHealthStatus {
    Healthy,
    Degraded,
    Failing,
}

impl SyncHealthStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Healthy => "healthy",
            Self::Degraded => "degraded",
            Self::Failing => "failing",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncHealthReport {
    pub status: SyncHealthStatus,
    pub failures: Vec<SyncFailure>,
    pub discrepancies: Vec<Discrepancy>,
}

impl SyncHealthReport {
    /// Failing when any failure needs user action; degraded on transient failures or
    /// discrepancies; healthy otherwise.
    pub fn from_parts(failures: Vec<SyncFailure>, discrepancies: Vec<Discrepancy>) -> Self {
        let status = if failures.iter().any(|failure| failure.issue.requires_user_action()) {
            SyncHealthStatus::Failing
        } else if !failures.is_empty() || !discrepancies.is_empty() {
            SyncHealthStatus::Degraded
        } else {
            SyncHealthStatus::Healthy
        };
        Self { status, failures, discrepancies }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entity::EntityStatus;

    #[test]
    fn classifies_common_provider_errors() {
        assert_eq!(classify_sync_error("Error validating access token: Session has expired"), AccessIssue::TokenExpired);
        assert_eq!(classify_sync_error("USER_PERMISSION_DENIED for customer 123"), AccessIssue::PermissionDenied);
        assert_eq!(classify_sync_error("Ad account is disabled"), AccessIssue::AccountDisabled);
        assert_eq!(classify_sync_error("429 Too Many Requests"), AccessIssue::RateLimited);
        assert_eq!(classify_sync_error("Object with ID 'act_1' does not exist"), AccessIssue::NotFound);
        assert_eq!(classify_sync_error("operation timed out"), AccessIssue::Network);
        assert_eq!(classify_sync_error("something odd"), AccessIssue::Unknown);
    }

    #[test]
    fn user_actionable_categories() {
        assert!(AccessIssue::TokenExpired.requires_user_action());
        assert!(!AccessIssue::RateLimited.requires_user_action());
        assert!(!AccessIssue::Network.requires_user_action());
        assert!(!AccessIssue::Unknown.remediation().is_empty());
    }

    fn campaign(id: &str, account: &str) -> Campaign {
        Campaign {
            id: id.to_string(),
            account_id: account.to_string(),
            provider: Provider::Meta,
            name: id.to_string(),
            status: EntityStatus::Active,
            objective: None,
            daily_budget: None,
        }
    }

    fn ad_group(id: &str, campaign_id: &str, account: &str) -> AdGroup {
        AdGroup {
            id: id.to_string(),
            account_id: account.to_string(),
            provider: Provider::Meta,
            campaign_id: campaign_id.to_string(),
            name: id.to_string(),
            status: EntityStatus::Active,
        }
    }

    #[test]
    fn detects_orphans_and_account_mismatches() {
        let snapshot = SyncSnapshot {
            campaigns: vec![campaign("cmp-1", "acct-1")],
            ad_groups: vec![ad_group("ag-1", "cmp-1", "acct-1"), ad_group("ag-2", "cmp-9", "acct-1"), ad_group("ag-3", "cmp-1", "acct-2")],
            ads: vec![Ad {
                id: "ad-1".to_string(),
                account_id: "acct-1".to_string(),
                provider: Provider::Meta,
                ad_group_id: "ag-missing".to_string(),
                name: "ad".to_string(),
                status: EntityStatus::Paused,
            }],
            insights: vec![
                InsightRef { account_id: "acct-1".to_string(), scope_type: ScopeType::Campaign, entity_id: "cmp-1".to_string() },
                InsightRef { account_id: "acct-1".to_string(), scope_type: ScopeType::Ad, entity_id: "ad-404".to_string() },
            ],
        };

        let kinds = detect_discrepancies(&snapshot).into_iter().map(|d| (d.kind, d.entity_id)).collect::<Vec<_>>();

        assert_eq!(
            kinds,
            vec![
                (DiscrepancyKind::OrphanAdGroup, "ag-2".to_string()),
                (DiscrepancyKind::AccountMismatch, "ag-3".to_string()),
                (DiscrepancyKind::OrphanAd, "ad-1".to_string()),
                (DiscrepancyKind::OrphanInsight, "ad-404".to_string()),
            ]
        );
    }

    #[test]
    fn report_status_reflects_severity() {
        assert_eq!(SyncHealthReport::from_parts(Vec::new(), Vec::new()).status, SyncHealthStatus::Healthy);

        let transient = SyncFailure::new("acct-1", Provider::Google, "RESOURCE_EXHAUSTED");
        assert_eq!(transient.issue, AccessIssue::RateLimited);
        assert_eq!(
            SyncHealthReport::from_parts(vec![transient.clone()], Vec::new()).status,
            SyncHealthStatus::Degraded
        );

        let expired = SyncFailure::new("acct-1", Provider::Meta, "Invalid OAuth access token");
        assert_eq!(
            SyncHealthReport::from_parts(vec![transient, expired], Vec::new()).status,
            SyncHealthStatus::Failing
        );
    }
}

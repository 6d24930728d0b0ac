use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Provider {
    Meta,
    Google,
}

impl Provider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Meta => "meta",
            Self::Google => "google",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "meta" | "facebook" => Some(Self::Meta),
            "google" | "google_ads" => Some(Self::Google),
            _ => None,
        }
    }
}

/// Level of the entity graph a recommendation targets.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScopeType {
    Campaign,
    AdGroup,
    Ad,
}

impl ScopeType {
    pub const ALL: [ScopeType; 3] = [ScopeType::Campaign, ScopeType::AdGroup, ScopeType::Ad];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Campaign => "campaign",
            Self::AdGroup => "ad_group",
            Self::Ad => "ad",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "campaign" => Some(Self::Campaign),
            "ad_group" | "adgroup" | "ad_set" => Some(Self::AdGroup),
            "ad" => Some(Self::Ad),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityStatus {
    Active,
    Paused,
    Archived,
}

impl EntityStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Paused => "paused",
            Self::Archived => "archived",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "active" | "enabled" => Some(Self::Active),
            "paused" => Some(Self::Paused),
            "archived" | "removed" | "deleted" => Some(Self::Archived),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Campaign {
    pub id: String,
    pub account_id: String,
    pub provider: Provider,
    pub name: String,
    pub status: EntityStatus,
    pub objective: Option<String>,
    pub daily_budget: Option<f64>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AdGroup {
    pub id: String,
    pub account_id: String,
    pub provider: Provider,
    pub campaign_id: String,
    pub name: String,
    pub status: EntityStatus,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Ad {
    pub id: String,
    pub account_id: String,
    pub provider: Provider,
    pub ad_group_id: String,
    pub name: String,
    pub status: EntityStatus,
}

/// An entity resolved for evaluation, with the objective inherited from its campaign.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityRef {
    pub account_id: String,
    pub provider: Provider,
    pub scope_type: ScopeType,
    pub id: String,
    pub name: String,
    pub objective: Option<String>,
}

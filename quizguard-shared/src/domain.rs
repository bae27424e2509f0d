use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Guardian-configurable daily limit bounds, in minutes.
pub const DAILY_LIMIT_MIN: i32 = 15;
pub const DAILY_LIMIT_MAX: i32 = 240;

/// Temporary extension bounds, in minutes.
pub const EXTENSION_MIN: i32 = 5;
pub const EXTENSION_MAX: i32 = 60;

/// Safety alerts are purged this many days after creation.
pub const ALERT_RETENTION_DAYS: i64 = 90;

/// Daily limit applied to children whose config omits one.
pub const DEFAULT_DAILY_LIMIT: i32 = 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AgeGroup {
    #[serde(rename = "3-5")]
    Preschool,
    #[serde(rename = "6-8")]
    Early,
    #[serde(rename = "9-12")]
    Preteen,
}

impl AgeGroup {
    pub fn as_str(&self) -> &'static str {
        match self {
            AgeGroup::Preschool => "3-5",
            AgeGroup::Early => "6-8",
            AgeGroup::Preteen => "9-12",
        }
    }
}

impl fmt::Display for AgeGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AgeGroup {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "3-5" => Ok(AgeGroup::Preschool),
            "6-8" => Ok(AgeGroup::Early),
            "9-12" => Ok(AgeGroup::Preteen),
            other => Err(format!("unknown age group: {other}")),
        }
    }
}

/// Ordinal safety-risk level. Ordering is Low < Medium < High.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Severity {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "low" => Ok(Severity::Low),
            "medium" => Ok(Severity::Medium),
            "high" => Ok(Severity::High),
            other => Err(format!("unknown severity: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThreatCategory {
    Cyberbullying,
    ExplicitContent,
    PersonalInfo,
    Violence,
    Other,
}

impl ThreatCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            ThreatCategory::Cyberbullying => "cyberbullying",
            ThreatCategory::ExplicitContent => "explicit_content",
            ThreatCategory::PersonalInfo => "personal_info",
            ThreatCategory::Violence => "violence",
            ThreatCategory::Other => "other",
        }
    }
}

impl FromStr for ThreatCategory {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "cyberbullying" => Ok(ThreatCategory::Cyberbullying),
            "explicit_content" => Ok(ThreatCategory::ExplicitContent),
            "personal_info" => Ok(ThreatCategory::PersonalInfo),
            "violence" => Ok(ThreatCategory::Violence),
            "other" => Ok(ThreatCategory::Other),
            other => Err(format!("unknown threat category: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertType {
    Cyberbullying,
    ExplicitContent,
    ScreenTime,
    TimeExtensionRequest,
    Other,
}

impl AlertType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertType::Cyberbullying => "cyberbullying",
            AlertType::ExplicitContent => "explicit_content",
            AlertType::ScreenTime => "screen_time",
            AlertType::TimeExtensionRequest => "time_extension_request",
            AlertType::Other => "other",
        }
    }

    /// Alert classification for a scan hit. Only bullying and explicit
    /// content get their own alert type; everything else is grouped.
    pub fn from_category(category: ThreatCategory) -> Self {
        match category {
            ThreatCategory::Cyberbullying => AlertType::Cyberbullying,
            ThreatCategory::ExplicitContent => AlertType::ExplicitContent,
            _ => AlertType::Other,
        }
    }
}

impl FromStr for AlertType {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "cyberbullying" => Ok(AlertType::Cyberbullying),
            "explicit_content" => Ok(AlertType::ExplicitContent),
            "screen_time" => Ok(AlertType::ScreenTime),
            "time_extension_request" => Ok(AlertType::TimeExtensionRequest),
            "other" => Ok(AlertType::Other),
            other => Err(format!("unknown alert type: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Open,
    Completed,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Open => "open",
            SessionStatus::Completed => "completed",
        }
    }
}

impl FromStr for SessionStatus {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "open" => Ok(SessionStatus::Open),
            "completed" => Ok(SessionStatus::Completed),
            other => Err(format!("unknown session status: {other}")),
        }
    }
}

/// A child as configured by the operator; seeded into storage on startup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Child {
    pub id: String,
    pub display_name: String,
    pub age_group: AgeGroup,
    /// Initial daily limit; [`DEFAULT_DAILY_LIMIT`] when omitted.
    pub daily_limit_minutes: Option<i32>,
}

/// A catalog game as configured by the operator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Game {
    pub id: String,
    pub name: String,
    pub active: bool,
    pub age_groups: Vec<AgeGroup>,
    pub max_points: i32,
}

/// A seed entry for the content-safety dictionary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThreatKeyword {
    pub keyword: String,
    pub severity: Severity,
    pub category: ThreatCategory,
}

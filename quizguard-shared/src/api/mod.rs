use serde::{Deserialize, Serialize};

use crate::domain::{AgeGroup, AlertType, SessionStatus, Severity, ThreatCategory};

/// Uniform response envelope: `{success, data}` on success,
/// `{success: false, message}` on error.
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            message: None,
        }
    }

    pub fn fail<M: Into<String>>(message: M) -> Self {
        Self {
            success: false,
            data: None,
            message: Some(message.into()),
        }
    }
}

// Auth
#[derive(Debug, Serialize, Deserialize)]
pub struct AuthReq {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AuthResp {
    pub token: String,
}

// Children
#[derive(Debug, Serialize, Deserialize)]
pub struct ChildDto {
    pub id: String,
    pub display_name: String,
    pub age_group: AgeGroup,
}

// Screen time
#[derive(Debug, Serialize, Deserialize)]
pub struct TimeStatusDto {
    pub child_id: String,
    pub allowed: bool,
    pub used_minutes_today: i32,
    pub daily_limit_minutes: i32,
    pub remaining_minutes: i32,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SetLimitReq {
    pub minutes: i32,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ExtensionReq {
    pub minutes: i32,
}

// Game sessions
#[derive(Debug, Serialize, Deserialize)]
pub struct StartSessionReq {
    pub game_id: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SessionDto {
    pub id: String,
    pub child_id: String,
    pub game_id: String,
    pub status: SessionStatus,
    pub started_at: String,
    pub completed_at: Option<String>,
    pub raw_score: Option<i32>,
    pub points_awarded: Option<i32>,
    pub questions_answered: Option<i32>,
    pub correct_answers: Option<i32>,
    pub hints_used: Option<i32>,
    pub badge_awarded: Option<String>,
    /// Whole minutes, rounded up; set at completion.
    pub duration_minutes: Option<i32>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CompleteSessionReq {
    pub score: i32,
    pub correct_answers: i32,
    pub questions_answered: i32,
    pub hints_used: i32,
    pub badge_earned: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CompleteSessionResp {
    pub session: SessionDto,
    pub progress: ProgressDto,
    pub time: TimeStatusDto,
}

// Progress & points
#[derive(Debug, Serialize, Deserialize)]
pub struct ProgressDto {
    pub child_id: String,
    pub point_balance: i32,
    pub achievements: Vec<String>,
    pub total_sessions_played: i32,
    pub total_minutes_played: i32,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PointsTransactionDto {
    pub amount: i32,
    pub reason: String,
    pub occurred_at: String,
}

// Chat safety pipeline
#[derive(Debug, Serialize, Deserialize)]
pub struct MessageReq {
    pub body: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MessageResp {
    pub message_id: String,
    pub flagged: bool,
}

// Alerts & notifications
#[derive(Debug, Serialize, Deserialize)]
pub struct AlertDto {
    pub id: String,
    pub child_id: String,
    pub severity: Severity,
    pub alert_type: AlertType,
    pub message: String,
    pub trigger_keyword: Option<String>,
    pub resolved: bool,
    pub resolved_at: Option<String>,
    pub resolved_by: Option<String>,
    pub created_at: String,
    pub expires_at: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct NotificationDto {
    pub id: i32,
    pub alert_id: String,
    pub child_id: String,
    pub severity: Severity,
    pub alert_type: AlertType,
    pub alert_message: String,
    pub is_read: bool,
    pub sent_at: String,
    pub read_at: Option<String>,
}

// Threat dictionary administration
#[derive(Debug, Serialize, Deserialize)]
pub struct ThreatAddReq {
    pub keyword: String,
    pub severity: Severity,
    pub category: ThreatCategory,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ThreatDto {
    pub keyword: String,
    pub severity: Severity,
    pub category: ThreatCategory,
    pub active: bool,
    pub created_at: String,
}

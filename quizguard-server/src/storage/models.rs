use crate::storage::schema::{
    achievements, auth_sessions, chat_messages, child_progress, children, game_sessions, games,
    guardian_notifications, points_transactions, safety_alerts, threat_keywords, time_records,
};
use chrono::{NaiveDate, NaiveDateTime};
use diesel::prelude::*;

#[derive(Debug, Clone, Queryable, Identifiable, Selectable)]
#[diesel(table_name = children)]
pub struct Child {
    pub id: String,
    pub display_name: String,
    pub age_group: String,
}

#[derive(Insertable)]
#[diesel(table_name = children)]
pub struct NewChild<'a> {
    pub id: &'a str,
    pub display_name: &'a str,
    pub age_group: &'a str,
}

#[derive(Debug, Clone, Queryable, Identifiable, Selectable)]
#[diesel(table_name = games)]
pub struct Game {
    pub id: String,
    pub name: String,
    pub is_active: bool,
    /// Comma-separated [`quizguard_shared::domain::AgeGroup`] labels.
    pub age_groups: String,
    pub max_points: i32,
    pub play_count: i32,
    pub average_score: f64,
}

impl Game {
    pub fn allows_age_group(&self, group: &str) -> bool {
        self.age_groups.split(',').any(|g| g.trim() == group)
    }
}

#[derive(Insertable)]
#[diesel(table_name = games)]
pub struct NewGame<'a> {
    pub id: &'a str,
    pub name: &'a str,
    pub is_active: bool,
    pub age_groups: &'a str,
    pub max_points: i32,
}

#[derive(Debug, Clone, Queryable, Identifiable, Selectable)]
#[diesel(table_name = time_records)]
#[diesel(primary_key(child_id))]
pub struct TimeRecord {
    pub child_id: String,
    pub daily_limit_minutes: i32,
    pub base_limit_minutes: i32,
    pub used_minutes_today: i32,
    pub last_reset_date: NaiveDate,
    pub total_lifetime_minutes: i32,
}

impl TimeRecord {
    /// May go negative once the session that crossed the limit is debited.
    pub fn remaining_minutes(&self) -> i32 {
        self.daily_limit_minutes - self.used_minutes_today
    }

    pub fn allowed(&self) -> bool {
        self.remaining_minutes() > 0
    }
}

#[derive(Insertable)]
#[diesel(table_name = time_records)]
pub struct NewTimeRecord<'a> {
    pub child_id: &'a str,
    pub daily_limit_minutes: i32,
    pub base_limit_minutes: i32,
    pub used_minutes_today: i32,
    pub last_reset_date: NaiveDate,
    pub total_lifetime_minutes: i32,
}

#[derive(Debug, Clone, Queryable, Identifiable, Associations, Selectable)]
#[diesel(table_name = game_sessions)]
#[diesel(belongs_to(Child, foreign_key = child_id))]
#[diesel(belongs_to(Game, foreign_key = game_id))]
pub struct GameSession {
    pub id: String,
    pub child_id: String,
    pub game_id: String,
    pub status: String,
    pub started_at: NaiveDateTime,
    pub completed_at: Option<NaiveDateTime>,
    pub raw_score: Option<i32>,
    pub points_awarded: Option<i32>,
    pub questions_answered: Option<i32>,
    pub correct_answers: Option<i32>,
    pub hints_used: Option<i32>,
    pub badge_awarded: Option<String>,
    pub duration_minutes: Option<i32>,
}

#[derive(Insertable)]
#[diesel(table_name = game_sessions)]
pub struct NewGameSession<'a> {
    pub id: &'a str,
    pub child_id: &'a str,
    pub game_id: &'a str,
    pub status: &'a str,
    pub started_at: NaiveDateTime,
}

#[derive(Debug, Clone, Queryable, Identifiable, Selectable)]
#[diesel(table_name = child_progress)]
#[diesel(primary_key(child_id))]
pub struct ChildProgress {
    pub child_id: String,
    pub point_balance: i32,
    pub total_sessions_played: i32,
    pub total_minutes_played: i32,
}

#[derive(Insertable)]
#[diesel(table_name = child_progress)]
pub struct NewChildProgress<'a> {
    pub child_id: &'a str,
    pub point_balance: i32,
    pub total_sessions_played: i32,
    pub total_minutes_played: i32,
}

#[derive(Insertable)]
#[diesel(table_name = achievements)]
pub struct NewAchievement<'a> {
    pub child_id: &'a str,
    pub badge_id: &'a str,
    pub earned_at: NaiveDateTime,
}

#[derive(Debug, Clone, Queryable, Identifiable, Selectable)]
#[diesel(table_name = points_transactions)]
pub struct PointsTransaction {
    pub id: i32,
    pub child_id: String,
    pub amount: i32,
    pub reason: String,
    pub occurred_at: NaiveDateTime,
}

#[derive(Insertable)]
#[diesel(table_name = points_transactions)]
pub struct NewPointsTransaction<'a> {
    pub child_id: &'a str,
    pub amount: i32,
    pub reason: &'a str,
    pub occurred_at: NaiveDateTime,
}

#[derive(Debug, Clone, Queryable, Identifiable, Selectable)]
#[diesel(table_name = threat_keywords)]
pub struct ThreatKeyword {
    pub id: i32,
    pub keyword: String,
    pub severity: String,
    pub category: String,
    pub active: bool,
    pub created_at: NaiveDateTime,
}

#[derive(Insertable)]
#[diesel(table_name = threat_keywords)]
pub struct NewThreatKeyword<'a> {
    pub keyword: &'a str,
    pub severity: &'a str,
    pub category: &'a str,
    pub active: bool,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Clone, Queryable, Identifiable, Selectable)]
#[diesel(table_name = chat_messages)]
pub struct ChatMessage {
    pub id: String,
    pub child_id: String,
    pub body: String,
    pub flagged: bool,
    pub created_at: NaiveDateTime,
}

#[derive(Insertable)]
#[diesel(table_name = chat_messages)]
pub struct NewChatMessage<'a> {
    pub id: &'a str,
    pub child_id: &'a str,
    pub body: &'a str,
    pub flagged: bool,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Clone, Queryable, Identifiable, Selectable)]
#[diesel(table_name = safety_alerts)]
pub struct SafetyAlert {
    pub id: String,
    pub child_id: String,
    pub severity: String,
    pub alert_type: String,
    pub message: String,
    pub trigger_keyword: Option<String>,
    pub resolved: bool,
    pub resolved_at: Option<NaiveDateTime>,
    pub resolved_by: Option<String>,
    pub created_at: NaiveDateTime,
    pub expires_at: NaiveDateTime,
}

#[derive(Insertable)]
#[diesel(table_name = safety_alerts)]
pub struct NewSafetyAlert<'a> {
    pub id: &'a str,
    pub child_id: &'a str,
    pub severity: &'a str,
    pub alert_type: &'a str,
    pub message: &'a str,
    pub trigger_keyword: Option<&'a str>,
    pub created_at: NaiveDateTime,
    pub expires_at: NaiveDateTime,
}

#[derive(Debug, Clone, Queryable, Identifiable, Associations, Selectable)]
#[diesel(table_name = guardian_notifications)]
#[diesel(belongs_to(SafetyAlert, foreign_key = alert_id))]
pub struct GuardianNotification {
    pub id: i32,
    pub guardian: String,
    pub alert_id: String,
    pub is_read: bool,
    pub sent_at: NaiveDateTime,
    pub read_at: Option<NaiveDateTime>,
}

#[derive(Insertable)]
#[diesel(table_name = guardian_notifications)]
pub struct NewGuardianNotification<'a> {
    pub guardian: &'a str,
    pub alert_id: &'a str,
    pub sent_at: NaiveDateTime,
}

#[derive(Debug, Clone, Queryable, Identifiable, Selectable)]
#[diesel(table_name = auth_sessions)]
#[diesel(primary_key(jti))]
pub struct AuthSession {
    pub jti: String,
    pub username: String,
    pub issued_at: NaiveDateTime,
    pub last_used_at: NaiveDateTime,
}

#[derive(Insertable)]
#[diesel(table_name = auth_sessions)]
pub struct NewAuthSession<'a> {
    pub jti: &'a str,
    pub username: &'a str,
    pub issued_at: NaiveDateTime,
    pub last_used_at: NaiveDateTime,
}

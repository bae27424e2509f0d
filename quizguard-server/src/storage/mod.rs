pub mod models;
pub mod schema;

use chrono::{NaiveDate, NaiveDateTime};
use diesel::prelude::*;
use diesel::r2d2::{ConnectionManager, Pool};
use diesel::result::DatabaseErrorKind;
use diesel_migrations::{EmbeddedMigrations, MigrationHarness, embed_migrations};
use models::{
    ChatMessage, Child, ChildProgress, Game, GameSession, GuardianNotification, NewAchievement,
    NewAuthSession, NewChatMessage, NewChild, NewChildProgress, NewGame, NewGameSession,
    NewGuardianNotification, NewPointsTransaction, NewSafetyAlert, NewThreatKeyword, NewTimeRecord,
    PointsTransaction, SafetyAlert, ThreatKeyword, TimeRecord,
};
use quizguard_shared::domain::{self, ALERT_RETENTION_DAYS, AlertType, DEFAULT_DAILY_LIMIT, Severity};
use tracing::trace;

/// Structured error type for all storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// A Diesel ORM error (query failure, constraint violation, etc.)
    #[error("database error: {0}")]
    Database(#[from] diesel::result::Error),

    /// Failed to acquire or build a connection from the pool.
    #[error("pool error: {0}")]
    Pool(#[from] diesel::r2d2::PoolError),

    /// A `spawn_blocking` task panicked or was cancelled.
    #[error("task error: {0}")]
    Task(#[from] tokio::task::JoinError),

    /// A database migration failed to apply.
    #[error("migration error: {0}")]
    Migration(String),

    /// The caller supplied invalid input.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// The referenced entity does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// The caller may not act on this entity (ownership or gating failure).
    #[error("not allowed: {0}")]
    NotAllowed(String),

    /// The request is logically stale or duplicate; stored state wins.
    #[error("conflict: {0}")]
    Conflict(String),
}

/// Client-reported results for a completed game session.
#[derive(Debug, Clone)]
pub struct SessionReport {
    pub score: i32,
    pub correct_answers: i32,
    pub questions_answered: i32,
    pub hints_used: i32,
    pub badge_earned: Option<String>,
}

/// Everything needed to persist one safety alert.
#[derive(Debug, Clone)]
pub struct AlertSpec {
    pub severity: Severity,
    pub alert_type: AlertType,
    pub message: String,
    pub trigger_keyword: Option<String>,
}

/// The result of finalizing a session: every entity the pipeline touched.
#[derive(Debug, Clone)]
pub struct CompletionOutcome {
    pub session: GameSession,
    pub progress: ChildProgress,
    pub achievements: Vec<String>,
    pub time: TimeRecord,
}

#[derive(Clone)]
pub struct Store {
    pool: Pool<ConnectionManager<SqliteConnection>>,
}

impl Store {
    pub async fn connect_sqlite(path: &str) -> Result<Self, StorageError> {
        let url = path.to_string();
        let manager = ConnectionManager::<SqliteConnection>::new(url);
        let pool = Pool::builder().max_size(8).build(manager)?;

        // Run pending Diesel migrations on startup (auto-init empty DBs)
        {
            let pool_clone = pool.clone();
            tokio::task::spawn_blocking(move || -> Result<(), StorageError> {
                const MIGRATIONS: EmbeddedMigrations = embed_migrations!();
                let mut conn = pool_clone.get()?;
                configure_sqlite_conn(&mut conn)?;
                conn.run_pending_migrations(MIGRATIONS)
                    .map_err(|e| StorageError::Migration(e.to_string()))?;
                Ok(())
            })
            .await??;
        }

        Ok(Store { pool })
    }

    /// Upsert children, the game catalog and seed keywords from config.
    /// Time-record and progress rows are created once per child and left
    /// untouched afterwards; catalog upserts never clobber play stats.
    pub async fn seed_from_config(
        &self,
        cfg_children: &[domain::Child],
        cfg_games: &[domain::Game],
        cfg_keywords: &[domain::ThreatKeyword],
        today: NaiveDate,
        now: NaiveDateTime,
    ) -> Result<(), StorageError> {
        use schema::{child_progress, children, games, threat_keywords, time_records};

        let pool = self.pool.clone();
        let children_owned = cfg_children.to_owned();
        let games_owned = cfg_games.to_owned();
        let keywords_owned = cfg_keywords.to_owned();
        tokio::task::spawn_blocking(move || -> Result<(), StorageError> {
            let mut conn = pool.get()?;
            configure_sqlite_conn(&mut conn)?;

            for c in &children_owned {
                let new_child = NewChild {
                    id: &c.id,
                    display_name: &c.display_name,
                    age_group: c.age_group.as_str(),
                };
                diesel::insert_into(children::table)
                    .values(&new_child)
                    .on_conflict(children::id)
                    .do_update()
                    .set((
                        children::display_name.eq(new_child.display_name),
                        children::age_group.eq(new_child.age_group),
                    ))
                    .execute(&mut conn)?;

                let limit = c.daily_limit_minutes.unwrap_or(DEFAULT_DAILY_LIMIT);
                let new_record = NewTimeRecord {
                    child_id: &c.id,
                    daily_limit_minutes: limit,
                    base_limit_minutes: limit,
                    used_minutes_today: 0,
                    last_reset_date: today,
                    total_lifetime_minutes: 0,
                };
                diesel::insert_into(time_records::table)
                    .values(&new_record)
                    .on_conflict_do_nothing()
                    .execute(&mut conn)?;

                let new_progress = NewChildProgress {
                    child_id: &c.id,
                    point_balance: 0,
                    total_sessions_played: 0,
                    total_minutes_played: 0,
                };
                diesel::insert_into(child_progress::table)
                    .values(&new_progress)
                    .on_conflict_do_nothing()
                    .execute(&mut conn)?;
            }

            for g in &games_owned {
                let groups = g
                    .age_groups
                    .iter()
                    .map(|a| a.as_str())
                    .collect::<Vec<_>>()
                    .join(",");
                let new_game = NewGame {
                    id: &g.id,
                    name: &g.name,
                    is_active: g.active,
                    age_groups: &groups,
                    max_points: g.max_points,
                };
                diesel::insert_into(games::table)
                    .values(&new_game)
                    .on_conflict(games::id)
                    .do_update()
                    .set((
                        games::name.eq(new_game.name),
                        games::is_active.eq(new_game.is_active),
                        games::age_groups.eq(new_game.age_groups),
                        games::max_points.eq(new_game.max_points),
                    ))
                    .execute(&mut conn)?;
            }

            for k in &keywords_owned {
                let normalized = normalize_keyword(&k.keyword);
                if normalized.is_empty() {
                    continue;
                }
                let new_kw = NewThreatKeyword {
                    keyword: &normalized,
                    severity: k.severity.as_str(),
                    category: k.category.as_str(),
                    active: true,
                    created_at: now,
                };
                diesel::insert_into(threat_keywords::table)
                    .values(&new_kw)
                    .on_conflict_do_nothing()
                    .execute(&mut conn)?;
            }

            Ok(())
        })
        .await?
    }

    pub async fn list_children(&self) -> Result<Vec<Child>, StorageError> {
        use schema::children::dsl::*;
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || -> Result<Vec<Child>, StorageError> {
            let mut conn = pool.get()?;
            configure_sqlite_conn(&mut conn)?;
            Ok(children
                .order(display_name.asc())
                .load::<Child>(&mut conn)?)
        })
        .await?
    }

    pub async fn get_child(&self, child: &str) -> Result<Option<Child>, StorageError> {
        use schema::children::dsl::*;
        let pool = self.pool.clone();
        let child_owned = child.to_string();
        tokio::task::spawn_blocking(move || -> Result<Option<Child>, StorageError> {
            let mut conn = pool.get()?;
            configure_sqlite_conn(&mut conn)?;
            Ok(children
                .filter(id.eq(&child_owned))
                .first::<Child>(&mut conn)
                .optional()?)
        })
        .await?
    }

    // ---- Time Accounting -------------------------------------------------

    /// Current screen-time record, with the daily reset applied first.
    pub async fn time_status(
        &self,
        child: &str,
        today: NaiveDate,
    ) -> Result<TimeRecord, StorageError> {
        let pool = self.pool.clone();
        let child_owned = child.to_string();
        tokio::task::spawn_blocking(move || -> Result<TimeRecord, StorageError> {
            let mut conn = pool.get()?;
            configure_sqlite_conn(&mut conn)?;
            conn.immediate_transaction(|conn| apply_daily_reset(conn, &child_owned, today))
        })
        .await?
    }

    /// Add `minutes` to today's usage and the lifetime total. Usage is not
    /// clamped to the limit; enforcement happens at the next session start.
    pub async fn record_usage(
        &self,
        child: &str,
        minutes: i32,
        today: NaiveDate,
    ) -> Result<TimeRecord, StorageError> {
        if minutes < 0 {
            return Err(StorageError::InvalidInput(
                "usage minutes must be non-negative".to_string(),
            ));
        }
        let pool = self.pool.clone();
        let child_owned = child.to_string();
        trace!(child_id = %child, minutes, "record_usage");
        tokio::task::spawn_blocking(move || -> Result<TimeRecord, StorageError> {
            let mut conn = pool.get()?;
            configure_sqlite_conn(&mut conn)?;
            conn.immediate_transaction(|conn| {
                apply_daily_reset(conn, &child_owned, today)?;
                apply_usage(conn, &child_owned, minutes)
            })
        })
        .await?
    }

    /// Set the guardian-configured daily limit. Range is validated by the
    /// caller; this also rewrites the base so future resets keep the value.
    pub async fn set_daily_limit(
        &self,
        child: &str,
        minutes: i32,
        today: NaiveDate,
    ) -> Result<TimeRecord, StorageError> {
        use schema::time_records::dsl as tr;
        let pool = self.pool.clone();
        let child_owned = child.to_string();
        tokio::task::spawn_blocking(move || -> Result<TimeRecord, StorageError> {
            let mut conn = pool.get()?;
            configure_sqlite_conn(&mut conn)?;
            conn.immediate_transaction(|conn| {
                apply_daily_reset(conn, &child_owned, today)?;
                diesel::update(tr::time_records.filter(tr::child_id.eq(&child_owned)))
                    .set((
                        tr::daily_limit_minutes.eq(minutes),
                        tr::base_limit_minutes.eq(minutes),
                    ))
                    .execute(conn)?;
                load_time_record(conn, &child_owned)
            })
        })
        .await?
    }

    /// Temporary extension: widens today's limit only. The next daily reset
    /// restores the base limit, discarding whatever was left of the grant.
    pub async fn grant_extension(
        &self,
        child: &str,
        minutes: i32,
        today: NaiveDate,
    ) -> Result<TimeRecord, StorageError> {
        use schema::time_records::dsl as tr;
        let pool = self.pool.clone();
        let child_owned = child.to_string();
        tokio::task::spawn_blocking(move || -> Result<TimeRecord, StorageError> {
            let mut conn = pool.get()?;
            configure_sqlite_conn(&mut conn)?;
            conn.immediate_transaction(|conn| {
                apply_daily_reset(conn, &child_owned, today)?;
                diesel::update(tr::time_records.filter(tr::child_id.eq(&child_owned)))
                    .set(tr::daily_limit_minutes.eq(tr::daily_limit_minutes + minutes))
                    .execute(conn)?;
                load_time_record(conn, &child_owned)
            })
        })
        .await?
    }

    // ---- Session Ledger --------------------------------------------------

    /// Open a new game session after the gating checks: the game must be
    /// active, the child's age group allowed, and screen time remaining.
    pub async fn start_session(
        &self,
        child: &str,
        game: &str,
        now: NaiveDateTime,
        today: NaiveDate,
    ) -> Result<GameSession, StorageError> {
        use schema::{children, game_sessions, games};
        let pool = self.pool.clone();
        let child_owned = child.to_string();
        let game_owned = game.to_string();
        let session_id = uuid::Uuid::new_v4().to_string();
        tokio::task::spawn_blocking(move || -> Result<GameSession, StorageError> {
            let mut conn = pool.get()?;
            configure_sqlite_conn(&mut conn)?;
            conn.immediate_transaction(|conn| {
                let child_row: Option<Child> = children::table
                    .filter(children::id.eq(&child_owned))
                    .first::<Child>(conn)
                    .optional()?;
                let Some(child_row) = child_row else {
                    return Err(StorageError::NotFound(format!(
                        "child not found: {child_owned}"
                    )));
                };
                let game_row: Option<Game> = games::table
                    .filter(games::id.eq(&game_owned))
                    .first::<Game>(conn)
                    .optional()?;
                let Some(game_row) = game_row else {
                    return Err(StorageError::NotFound(format!(
                        "game not found: {game_owned}"
                    )));
                };
                if !game_row.is_active {
                    return Err(StorageError::NotAllowed(format!(
                        "game is not active: {game_owned}"
                    )));
                }
                if !game_row.allows_age_group(&child_row.age_group) {
                    return Err(StorageError::NotAllowed(format!(
                        "game {game_owned} is not available for age group {}",
                        child_row.age_group
                    )));
                }
                let record = apply_daily_reset(conn, &child_owned, today)?;
                if !record.allowed() {
                    return Err(StorageError::NotAllowed(
                        "daily screen time limit reached".to_string(),
                    ));
                }

                let new_session = NewGameSession {
                    id: &session_id,
                    child_id: &child_owned,
                    game_id: &game_owned,
                    status: domain::SessionStatus::Open.as_str(),
                    started_at: now,
                };
                diesel::insert_into(game_sessions::table)
                    .values(&new_session)
                    .execute(conn)?;
                Ok(game_sessions::table
                    .filter(game_sessions::id.eq(&session_id))
                    .first::<GameSession>(conn)?)
            })
        })
        .await?
    }

    /// Finalize a session. Applies, as one transaction: the status flip
    /// (exactly once), the points award and transaction append, the badge
    /// grant, the progress counters, the screen-time debit, and the game's
    /// play-count / running-average update.
    pub async fn complete_session(
        &self,
        session: &str,
        child: &str,
        report: SessionReport,
        now: NaiveDateTime,
        today: NaiveDate,
    ) -> Result<CompletionOutcome, StorageError> {
        use schema::{achievements, child_progress, game_sessions, games, points_transactions};
        let pool = self.pool.clone();
        let session_owned = session.to_string();
        let child_owned = child.to_string();
        tokio::task::spawn_blocking(move || -> Result<CompletionOutcome, StorageError> {
            let mut conn = pool.get()?;
            configure_sqlite_conn(&mut conn)?;
            conn.immediate_transaction(|conn| {
                let row: Option<GameSession> = game_sessions::table
                    .filter(game_sessions::id.eq(&session_owned))
                    .first::<GameSession>(conn)
                    .optional()?;
                let Some(row) = row else {
                    return Err(StorageError::NotFound(format!(
                        "session not found: {session_owned}"
                    )));
                };
                if row.child_id != child_owned {
                    return Err(StorageError::NotAllowed(
                        "session belongs to another child".to_string(),
                    ));
                }

                // Duration is attributed to the day of completion and
                // rounded up to the next whole minute.
                let seconds = (now - row.started_at).num_seconds().max(0);
                let duration = (seconds as u64).div_ceil(60) as i32;

                // The status flip doubles as the exactly-once guard: a
                // second completion matches zero rows.
                let flipped = diesel::update(
                    game_sessions::table
                        .filter(game_sessions::id.eq(&session_owned))
                        .filter(game_sessions::status.eq(domain::SessionStatus::Open.as_str())),
                )
                .set((
                    game_sessions::status.eq(domain::SessionStatus::Completed.as_str()),
                    game_sessions::completed_at.eq(Some(now)),
                    game_sessions::raw_score.eq(Some(report.score)),
                    game_sessions::points_awarded.eq(Some(report.score)),
                    game_sessions::questions_answered.eq(Some(report.questions_answered)),
                    game_sessions::correct_answers.eq(Some(report.correct_answers)),
                    game_sessions::hints_used.eq(Some(report.hints_used)),
                    game_sessions::badge_awarded.eq(report.badge_earned.as_deref()),
                    game_sessions::duration_minutes.eq(Some(duration)),
                ))
                .execute(conn)?;
                if flipped == 0 {
                    return Err(StorageError::Conflict(format!(
                        "session already completed: {session_owned}"
                    )));
                }

                let reason = format!("session:{session_owned}");
                let tx = NewPointsTransaction {
                    child_id: &child_owned,
                    amount: report.score,
                    reason: &reason,
                    occurred_at: now,
                };
                diesel::insert_into(points_transactions::table)
                    .values(&tx)
                    .execute(conn)?;

                diesel::update(
                    child_progress::table.filter(child_progress::child_id.eq(&child_owned)),
                )
                .set((
                    child_progress::point_balance.eq(child_progress::point_balance + report.score),
                    child_progress::total_sessions_played
                        .eq(child_progress::total_sessions_played + 1),
                    child_progress::total_minutes_played
                        .eq(child_progress::total_minutes_played + duration),
                ))
                .execute(conn)?;

                if let Some(badge) = report.badge_earned.as_deref() {
                    let new_badge = NewAchievement {
                        child_id: &child_owned,
                        badge_id: badge,
                        earned_at: now,
                    };
                    diesel::insert_into(achievements::table)
                        .values(&new_badge)
                        .on_conflict_do_nothing()
                        .execute(conn)?;
                }

                apply_daily_reset(conn, &child_owned, today)?;
                let time = apply_usage(conn, &child_owned, duration)?;

                let game_row: Game = games::table
                    .filter(games::id.eq(&row.game_id))
                    .first::<Game>(conn)?;
                let new_count = game_row.play_count + 1;
                let new_average = (game_row.average_score * game_row.play_count as f64
                    + report.score as f64)
                    / new_count as f64;
                diesel::update(games::table.filter(games::id.eq(&row.game_id)))
                    .set((
                        games::play_count.eq(new_count),
                        games::average_score.eq(new_average),
                    ))
                    .execute(conn)?;

                let session = game_sessions::table
                    .filter(game_sessions::id.eq(&session_owned))
                    .first::<GameSession>(conn)?;
                let (progress, badges) = load_progress(conn, &child_owned)?;
                Ok(CompletionOutcome {
                    session,
                    progress,
                    achievements: badges,
                    time,
                })
            })
        })
        .await?
    }

    // ---- Child Progress & Points Log ------------------------------------

    pub async fn get_progress(
        &self,
        child: &str,
    ) -> Result<(ChildProgress, Vec<String>), StorageError> {
        let pool = self.pool.clone();
        let child_owned = child.to_string();
        tokio::task::spawn_blocking(
            move || -> Result<(ChildProgress, Vec<String>), StorageError> {
                let mut conn = pool.get()?;
                configure_sqlite_conn(&mut conn)?;
                load_progress(&mut conn, &child_owned)
            },
        )
        .await?
    }

    pub async fn list_points_transactions(
        &self,
        child: &str,
        page: usize,
        per_page: usize,
    ) -> Result<Vec<PointsTransaction>, StorageError> {
        use schema::points_transactions::dsl as pt;
        let pool = self.pool.clone();
        let child_owned = child.to_string();
        let page = page.max(1);
        let per_page = per_page.clamp(1, 1000) as i64;
        let offset = ((page as i64) - 1) * per_page;
        tokio::task::spawn_blocking(move || -> Result<Vec<PointsTransaction>, StorageError> {
            let mut conn = pool.get()?;
            configure_sqlite_conn(&mut conn)?;
            Ok(pt::points_transactions
                .filter(pt::child_id.eq(&child_owned))
                .order(pt::occurred_at.desc())
                .offset(offset)
                .limit(per_page)
                .load::<PointsTransaction>(&mut conn)?)
        })
        .await?
    }

    // ---- Threat Dictionary -----------------------------------------------

    /// Insert a dictionary entry. The keyword must already be normalized
    /// (lowercased, trimmed). A duplicate, active or not, is a conflict.
    pub async fn add_threat_keyword(
        &self,
        keyword: &str,
        severity: Severity,
        category: domain::ThreatCategory,
        now: NaiveDateTime,
    ) -> Result<ThreatKeyword, StorageError> {
        use schema::threat_keywords::dsl as tk;
        let pool = self.pool.clone();
        let keyword_owned = keyword.to_string();
        tokio::task::spawn_blocking(move || -> Result<ThreatKeyword, StorageError> {
            let mut conn = pool.get()?;
            configure_sqlite_conn(&mut conn)?;
            let new_kw = NewThreatKeyword {
                keyword: &keyword_owned,
                severity: severity.as_str(),
                category: category.as_str(),
                active: true,
                created_at: now,
            };
            match diesel::insert_into(tk::threat_keywords)
                .values(&new_kw)
                .execute(&mut conn)
            {
                Ok(_) => {}
                Err(diesel::result::Error::DatabaseError(
                    DatabaseErrorKind::UniqueViolation,
                    _,
                )) => {
                    return Err(StorageError::Conflict(format!(
                        "keyword already exists: {keyword_owned}"
                    )));
                }
                Err(e) => return Err(e.into()),
            }
            Ok(tk::threat_keywords
                .filter(tk::keyword.eq(&keyword_owned))
                .first::<ThreatKeyword>(&mut conn)?)
        })
        .await?
    }

    /// Soft delete: the entry stays for historical match explanations.
    pub async fn deactivate_threat_keyword(&self, keyword: &str) -> Result<(), StorageError> {
        use schema::threat_keywords::dsl as tk;
        let pool = self.pool.clone();
        let keyword_owned = keyword.to_string();
        tokio::task::spawn_blocking(move || -> Result<(), StorageError> {
            let mut conn = pool.get()?;
            configure_sqlite_conn(&mut conn)?;
            let updated =
                diesel::update(tk::threat_keywords.filter(tk::keyword.eq(&keyword_owned)))
                    .set(tk::active.eq(false))
                    .execute(&mut conn)?;
            if updated == 0 {
                return Err(StorageError::NotFound(format!(
                    "keyword not found: {keyword_owned}"
                )));
            }
            Ok(())
        })
        .await?
    }

    pub async fn list_threat_keywords(&self) -> Result<Vec<ThreatKeyword>, StorageError> {
        use schema::threat_keywords::dsl as tk;
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || -> Result<Vec<ThreatKeyword>, StorageError> {
            let mut conn = pool.get()?;
            configure_sqlite_conn(&mut conn)?;
            Ok(tk::threat_keywords
                .order(tk::id.asc())
                .load::<ThreatKeyword>(&mut conn)?)
        })
        .await?
    }

    /// Active entries in dictionary (insertion) order, for the scanner.
    pub async fn active_threat_keywords(&self) -> Result<Vec<ThreatKeyword>, StorageError> {
        use schema::threat_keywords::dsl as tk;
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || -> Result<Vec<ThreatKeyword>, StorageError> {
            let mut conn = pool.get()?;
            configure_sqlite_conn(&mut conn)?;
            Ok(tk::threat_keywords
                .filter(tk::active.eq(true))
                .order(tk::id.asc())
                .load::<ThreatKeyword>(&mut conn)?)
        })
        .await?
    }

    // ---- Alerts, messages, notifications ---------------------------------

    /// Persist a scanned chat message and, when the scan flagged it, the
    /// resulting alert, as one transaction. Notification fan-out is the
    /// caller's follow-up step; alerts are the source of truth.
    pub async fn record_scanned_message(
        &self,
        child: &str,
        body: &str,
        alert: Option<AlertSpec>,
        now: NaiveDateTime,
    ) -> Result<(ChatMessage, Option<SafetyAlert>), StorageError> {
        use schema::{chat_messages, children, safety_alerts};
        let pool = self.pool.clone();
        let child_owned = child.to_string();
        let body_owned = body.to_string();
        let message_id = uuid::Uuid::new_v4().to_string();
        let alert_id = uuid::Uuid::new_v4().to_string();
        tokio::task::spawn_blocking(
            move || -> Result<(ChatMessage, Option<SafetyAlert>), StorageError> {
                let mut conn = pool.get()?;
                configure_sqlite_conn(&mut conn)?;
                conn.immediate_transaction(|conn| {
                    let known: i64 = children::table
                        .filter(children::id.eq(&child_owned))
                        .count()
                        .get_result(conn)?;
                    if known == 0 {
                        return Err(StorageError::NotFound(format!(
                            "child not found: {child_owned}"
                        )));
                    }
                    let new_message = NewChatMessage {
                        id: &message_id,
                        child_id: &child_owned,
                        body: &body_owned,
                        flagged: alert.is_some(),
                        created_at: now,
                    };
                    diesel::insert_into(chat_messages::table)
                        .values(&new_message)
                        .execute(conn)?;

                    let alert_row = if let Some(spec) = &alert {
                        let new_alert = NewSafetyAlert {
                            id: &alert_id,
                            child_id: &child_owned,
                            severity: spec.severity.as_str(),
                            alert_type: spec.alert_type.as_str(),
                            message: &spec.message,
                            trigger_keyword: spec.trigger_keyword.as_deref(),
                            created_at: now,
                            expires_at: now + chrono::Duration::days(ALERT_RETENTION_DAYS),
                        };
                        diesel::insert_into(safety_alerts::table)
                            .values(&new_alert)
                            .execute(conn)?;
                        Some(
                            safety_alerts::table
                                .filter(safety_alerts::id.eq(&alert_id))
                                .first::<SafetyAlert>(conn)?,
                        )
                    } else {
                        None
                    };

                    let message = chat_messages::table
                        .filter(chat_messages::id.eq(&message_id))
                        .first::<ChatMessage>(conn)?;
                    Ok((message, alert_row))
                })
            },
        )
        .await?
    }

    /// Create a standalone alert (explicit requests, e.g. a time extension).
    pub async fn create_alert(
        &self,
        child: &str,
        spec: AlertSpec,
        now: NaiveDateTime,
    ) -> Result<SafetyAlert, StorageError> {
        use schema::{children, safety_alerts};
        let pool = self.pool.clone();
        let child_owned = child.to_string();
        let alert_id = uuid::Uuid::new_v4().to_string();
        tokio::task::spawn_blocking(move || -> Result<SafetyAlert, StorageError> {
            let mut conn = pool.get()?;
            configure_sqlite_conn(&mut conn)?;
            conn.immediate_transaction(|conn| {
                let known: i64 = children::table
                    .filter(children::id.eq(&child_owned))
                    .count()
                    .get_result(conn)?;
                if known == 0 {
                    return Err(StorageError::NotFound(format!(
                        "child not found: {child_owned}"
                    )));
                }
                let new_alert = NewSafetyAlert {
                    id: &alert_id,
                    child_id: &child_owned,
                    severity: spec.severity.as_str(),
                    alert_type: spec.alert_type.as_str(),
                    message: &spec.message,
                    trigger_keyword: spec.trigger_keyword.as_deref(),
                    created_at: now,
                    expires_at: now + chrono::Duration::days(ALERT_RETENTION_DAYS),
                };
                diesel::insert_into(safety_alerts::table)
                    .values(&new_alert)
                    .execute(conn)?;
                Ok(safety_alerts::table
                    .filter(safety_alerts::id.eq(&alert_id))
                    .first::<SafetyAlert>(conn)?)
            })
        })
        .await?
    }

    pub async fn get_alert(&self, alert: &str) -> Result<Option<SafetyAlert>, StorageError> {
        use schema::safety_alerts::dsl as sa;
        let pool = self.pool.clone();
        let alert_owned = alert.to_string();
        tokio::task::spawn_blocking(move || -> Result<Option<SafetyAlert>, StorageError> {
            let mut conn = pool.get()?;
            configure_sqlite_conn(&mut conn)?;
            Ok(sa::safety_alerts
                .filter(sa::id.eq(&alert_owned))
                .first::<SafetyAlert>(&mut conn)
                .optional()?)
        })
        .await?
    }

    pub async fn list_alerts_for_child(
        &self,
        child: &str,
    ) -> Result<Vec<SafetyAlert>, StorageError> {
        use schema::safety_alerts::dsl as sa;
        let pool = self.pool.clone();
        let child_owned = child.to_string();
        tokio::task::spawn_blocking(move || -> Result<Vec<SafetyAlert>, StorageError> {
            let mut conn = pool.get()?;
            configure_sqlite_conn(&mut conn)?;
            Ok(sa::safety_alerts
                .filter(sa::child_id.eq(&child_owned))
                .order(sa::created_at.desc())
                .load::<SafetyAlert>(&mut conn)?)
        })
        .await?
    }

    pub async fn list_alerts(&self) -> Result<Vec<SafetyAlert>, StorageError> {
        use schema::safety_alerts::dsl as sa;
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || -> Result<Vec<SafetyAlert>, StorageError> {
            let mut conn = pool.get()?;
            configure_sqlite_conn(&mut conn)?;
            Ok(sa::safety_alerts
                .order(sa::created_at.desc())
                .load::<SafetyAlert>(&mut conn)?)
        })
        .await?
    }

    /// Resolve exactly once. Resolved fields are set atomically and never
    /// cleared afterwards; a second call is a conflict.
    pub async fn resolve_alert(
        &self,
        alert: &str,
        resolved_by: &str,
        now: NaiveDateTime,
    ) -> Result<SafetyAlert, StorageError> {
        use schema::safety_alerts::dsl as sa;
        let pool = self.pool.clone();
        let alert_owned = alert.to_string();
        let resolver = resolved_by.to_string();
        tokio::task::spawn_blocking(move || -> Result<SafetyAlert, StorageError> {
            let mut conn = pool.get()?;
            configure_sqlite_conn(&mut conn)?;
            conn.immediate_transaction(|conn| {
                let updated = diesel::update(
                    sa::safety_alerts
                        .filter(sa::id.eq(&alert_owned))
                        .filter(sa::resolved.eq(false)),
                )
                .set((
                    sa::resolved.eq(true),
                    sa::resolved_at.eq(Some(now)),
                    sa::resolved_by.eq(Some(resolver.as_str())),
                ))
                .execute(conn)?;
                if updated == 0 {
                    let existing: Option<SafetyAlert> = sa::safety_alerts
                        .filter(sa::id.eq(&alert_owned))
                        .first::<SafetyAlert>(conn)
                        .optional()?;
                    return match existing {
                        Some(_) => Err(StorageError::Conflict(format!(
                            "alert already resolved: {alert_owned}"
                        ))),
                        None => Err(StorageError::NotFound(format!(
                            "alert not found: {alert_owned}"
                        ))),
                    };
                }
                Ok(sa::safety_alerts
                    .filter(sa::id.eq(&alert_owned))
                    .first::<SafetyAlert>(conn)?)
            })
        })
        .await?
    }

    /// Hard-delete alerts past their retention window, together with any
    /// notifications derived from them. Returns the number of alerts purged.
    pub async fn purge_expired_alerts(&self, now: NaiveDateTime) -> Result<usize, StorageError> {
        use schema::guardian_notifications::dsl as gn;
        use schema::safety_alerts::dsl as sa;
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || -> Result<usize, StorageError> {
            let mut conn = pool.get()?;
            configure_sqlite_conn(&mut conn)?;
            conn.immediate_transaction(|conn| {
                let expired = sa::safety_alerts
                    .filter(sa::expires_at.lt(now))
                    .select(sa::id);
                diesel::delete(gn::guardian_notifications.filter(gn::alert_id.eq_any(expired)))
                    .execute(conn)?;
                let purged =
                    diesel::delete(sa::safety_alerts.filter(sa::expires_at.lt(now)))
                        .execute(conn)?;
                Ok(purged)
            })
        })
        .await?
    }

    pub async fn create_notification(
        &self,
        guardian: &str,
        alert: &str,
        now: NaiveDateTime,
    ) -> Result<GuardianNotification, StorageError> {
        use schema::guardian_notifications::dsl as gn;
        let pool = self.pool.clone();
        let guardian_owned = guardian.to_string();
        let alert_owned = alert.to_string();
        tokio::task::spawn_blocking(move || -> Result<GuardianNotification, StorageError> {
            let mut conn = pool.get()?;
            configure_sqlite_conn(&mut conn)?;
            let new_notification = NewGuardianNotification {
                guardian: &guardian_owned,
                alert_id: &alert_owned,
                sent_at: now,
            };
            diesel::insert_into(gn::guardian_notifications)
                .values(&new_notification)
                .execute(&mut conn)?;
            Ok(gn::guardian_notifications
                .filter(gn::guardian.eq(&guardian_owned))
                .filter(gn::alert_id.eq(&alert_owned))
                .order(gn::id.desc())
                .first::<GuardianNotification>(&mut conn)?)
        })
        .await?
    }

    pub async fn list_notifications(
        &self,
        guardian: &str,
    ) -> Result<Vec<(GuardianNotification, SafetyAlert)>, StorageError> {
        use schema::{guardian_notifications, safety_alerts};
        let pool = self.pool.clone();
        let guardian_owned = guardian.to_string();
        tokio::task::spawn_blocking(
            move || -> Result<Vec<(GuardianNotification, SafetyAlert)>, StorageError> {
                let mut conn = pool.get()?;
                configure_sqlite_conn(&mut conn)?;
                Ok(guardian_notifications::table
                    .inner_join(safety_alerts::table)
                    .filter(guardian_notifications::guardian.eq(&guardian_owned))
                    .order(guardian_notifications::sent_at.desc())
                    .select((
                        GuardianNotification::as_select(),
                        SafetyAlert::as_select(),
                    ))
                    .load::<(GuardianNotification, SafetyAlert)>(&mut conn)?)
            },
        )
        .await?
    }

    /// Mark a notification read. Idempotent: marking an already-read
    /// notification again is a no-op, not an error.
    pub async fn mark_notification_read(
        &self,
        notification: i32,
        guardian: &str,
        now: NaiveDateTime,
    ) -> Result<(), StorageError> {
        use schema::guardian_notifications::dsl as gn;
        let pool = self.pool.clone();
        let guardian_owned = guardian.to_string();
        tokio::task::spawn_blocking(move || -> Result<(), StorageError> {
            let mut conn = pool.get()?;
            configure_sqlite_conn(&mut conn)?;
            let updated = diesel::update(
                gn::guardian_notifications
                    .filter(gn::id.eq(notification))
                    .filter(gn::guardian.eq(&guardian_owned))
                    .filter(gn::is_read.eq(false)),
            )
            .set((gn::is_read.eq(true), gn::read_at.eq(Some(now))))
            .execute(&mut conn)?;
            if updated == 0 {
                let exists: i64 = gn::guardian_notifications
                    .filter(gn::id.eq(notification))
                    .filter(gn::guardian.eq(&guardian_owned))
                    .count()
                    .get_result(&mut conn)?;
                if exists == 0 {
                    return Err(StorageError::NotFound(format!(
                        "notification not found: {notification}"
                    )));
                }
            }
            Ok(())
        })
        .await?
    }

    // ---- Auth session helpers for JWT inactivity windows ------------------

    pub async fn create_auth_session(
        &self,
        jti_: &str,
        username_: &str,
        now: NaiveDateTime,
    ) -> Result<(), StorageError> {
        use schema::auth_sessions;
        let pool = self.pool.clone();
        let j = jti_.to_string();
        let u = username_.to_string();
        tokio::task::spawn_blocking(move || -> Result<(), StorageError> {
            let mut conn = pool.get()?;
            configure_sqlite_conn(&mut conn)?;
            let new = NewAuthSession {
                jti: &j,
                username: &u,
                issued_at: now,
                last_used_at: now,
            };
            diesel::insert_into(auth_sessions::table)
                .values(&new)
                .on_conflict_do_nothing()
                .execute(&mut conn)?;
            Ok(())
        })
        .await?
    }

    /// Touch the auth session atomically, but only if it hasn't idled out.
    /// Combines the idle check and the `last_used_at` update into a single
    /// UPDATE, eliminating the check-then-update race.
    pub async fn touch_auth_session_with_cutoff(
        &self,
        jti_: &str,
        cutoff: NaiveDateTime,
        now: NaiveDateTime,
    ) -> Result<bool, StorageError> {
        use schema::auth_sessions::dsl::*;
        let pool = self.pool.clone();
        let j = jti_.to_string();
        tokio::task::spawn_blocking(move || -> Result<bool, StorageError> {
            let mut conn = pool.get()?;
            configure_sqlite_conn(&mut conn)?;
            let updated =
                diesel::update(auth_sessions.filter(jti.eq(&j)).filter(last_used_at.ge(cutoff)))
                    .set(last_used_at.eq(now))
                    .execute(&mut conn)?;
            Ok(updated > 0)
        })
        .await?
    }
}

/// Lowercase + trim; the canonical form stored and matched against.
pub fn normalize_keyword(raw: &str) -> String {
    raw.trim().to_lowercase()
}

fn load_time_record(
    conn: &mut SqliteConnection,
    child: &str,
) -> Result<TimeRecord, StorageError> {
    use schema::time_records::dsl as tr;
    let record: Option<TimeRecord> = tr::time_records
        .filter(tr::child_id.eq(child))
        .first::<TimeRecord>(conn)
        .optional()?;
    record.ok_or_else(|| StorageError::NotFound(format!("time record not found for child: {child}")))
}

/// The daily rollover. Runs inside the caller's transaction, before the
/// requested operation touches the record. Restoring the limit from the
/// base discards any unused temporary extension from the previous day.
fn apply_daily_reset(
    conn: &mut SqliteConnection,
    child: &str,
    today: NaiveDate,
) -> Result<TimeRecord, StorageError> {
    use schema::time_records::dsl as tr;
    let record = load_time_record(conn, child)?;
    if record.last_reset_date == today {
        return Ok(record);
    }
    diesel::update(tr::time_records.filter(tr::child_id.eq(child)))
        .set((
            tr::used_minutes_today.eq(0),
            tr::last_reset_date.eq(today),
            tr::daily_limit_minutes.eq(record.base_limit_minutes),
        ))
        .execute(conn)?;
    load_time_record(conn, child)
}

fn apply_usage(
    conn: &mut SqliteConnection,
    child: &str,
    minutes: i32,
) -> Result<TimeRecord, StorageError> {
    use schema::time_records::dsl as tr;
    diesel::update(tr::time_records.filter(tr::child_id.eq(child)))
        .set((
            tr::used_minutes_today.eq(tr::used_minutes_today + minutes),
            tr::total_lifetime_minutes.eq(tr::total_lifetime_minutes + minutes),
        ))
        .execute(conn)?;
    load_time_record(conn, child)
}

fn load_progress(
    conn: &mut SqliteConnection,
    child: &str,
) -> Result<(ChildProgress, Vec<String>), StorageError> {
    use schema::achievements::dsl as ach;
    use schema::child_progress::dsl as cp;
    let progress: Option<ChildProgress> = cp::child_progress
        .filter(cp::child_id.eq(child))
        .first::<ChildProgress>(conn)
        .optional()?;
    let Some(progress) = progress else {
        return Err(StorageError::NotFound(format!(
            "progress not found for child: {child}"
        )));
    };
    let badges = ach::achievements
        .filter(ach::child_id.eq(child))
        .order(ach::earned_at.asc())
        .select(ach::badge_id)
        .load::<String>(conn)?;
    Ok((progress, badges))
}

fn configure_sqlite_conn(conn: &mut SqliteConnection) -> Result<(), diesel::result::Error> {
    // Enable WAL for better read/write concurrency and set a busy timeout
    // Ignore the result rows; Diesel's execute is fine for PRAGMAs
    diesel::sql_query("PRAGMA journal_mode=WAL;").execute(conn)?;
    diesel::sql_query("PRAGMA synchronous=NORMAL;").execute(conn)?;
    diesel::sql_query("PRAGMA busy_timeout=5000;").execute(conn)?;
    Ok(())
}

use axum::http::StatusCode;
use quizguard_server::{server, storage};
use quizguard_shared::domain::{AgeGroup, Child, Game, Severity, ThreatCategory, ThreatKeyword};
use reqwest::Client;
use serde_json::{Value, json};
use std::io::ErrorKind;
use std::net::SocketAddr;
use std::path::Path;

const LOGIN_PATH: &str = "/api/auth/login";

struct TestServer {
    base: String,
    client: Client,
    handle: tokio::task::JoinHandle<()>,
    _tempdir: tempfile::TempDir,
}

impl TestServer {
    async fn spawn() -> Option<Self> {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("test.db");
        let (addr, handle) = match start_server(&db_path).await {
            Ok(v) => v,
            Err(e) if e.kind() == ErrorKind::PermissionDenied => {
                eprintln!("Skipping test due to sandbox restrictions: {e}");
                return None;
            }
            Err(e) => panic!("failed to start server: {e}"),
        };
        Some(Self {
            base: format!("http://{}", addr),
            client: Client::new(),
            handle,
            _tempdir: dir,
        })
    }

    async fn login(&self, username: &str, password: &str) -> String {
        let body = self
            .request_expect(
                "POST",
                LOGIN_PATH,
                None,
                Some(json!({"username": username, "password": password})),
                StatusCode::OK,
            )
            .await;
        body.pointer("/data/token")
            .and_then(|v| v.as_str())
            .map(|s| s.to_string())
            .expect("token missing from auth response")
    }

    async fn request(
        &self,
        method: &str,
        path: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let url = format!("{}{}", self.base, path);
        let mut req = match method {
            "GET" => self.client.get(&url),
            "POST" => self.client.post(&url),
            "PUT" => self.client.put(&url),
            other => panic!("unsupported method {other}"),
        };
        if let Some(t) = token {
            req = req.bearer_auth(t);
        }
        if let Some(b) = body {
            req = req.json(&b);
        }
        let resp = req.send().await.unwrap();
        let status = resp.status();
        let text = resp.text().await.unwrap();
        let val = if text.is_empty() {
            json!(null)
        } else {
            serde_json::from_str(&text).unwrap_or(json!({"raw": text}))
        };
        (status, val)
    }

    async fn request_expect(
        &self,
        method: &str,
        path: &str,
        token: Option<&str>,
        body: Option<Value>,
        expected: StatusCode,
    ) -> Value {
        let (status, value) = self.request(method, path, token, body).await;
        assert_eq!(
            status, expected,
            "{method} {path} returned {status:?} with body {value:?}",
        );
        if expected.is_success() {
            assert_eq!(
                value.get("success").and_then(|v| v.as_bool()),
                Some(true),
                "{method} {path} body missing success=true: {value:?}",
            );
        } else if expected != StatusCode::UNAUTHORIZED || value.get("success").is_some() {
            // Error envelopes carry success=false and a message.
            assert_eq!(
                value.get("success").and_then(|v| v.as_bool()),
                Some(false),
                "{method} {path} body missing success=false: {value:?}",
            );
        }
        value
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

async fn start_server(
    tmp_db: &Path,
) -> Result<(SocketAddr, tokio::task::JoinHandle<()>), std::io::Error> {
    let guardian_pwd = "secret123";
    let child_pwd = "kidpass";
    let admin_pwd = "adminpass";
    let guardian_hash = bcrypt::hash(guardian_pwd, bcrypt::DEFAULT_COST).unwrap();
    let child_hash = bcrypt::hash(child_pwd, bcrypt::DEFAULT_COST).unwrap();
    let admin_hash = bcrypt::hash(admin_pwd, bcrypt::DEFAULT_COST).unwrap();
    let config = server::AppConfig {
        children: vec![
            Child {
                id: "alice".into(),
                display_name: "Alice".into(),
                age_group: AgeGroup::Early,
                daily_limit_minutes: Some(60),
            },
            Child {
                id: "bob".into(),
                display_name: "Bob".into(),
                age_group: AgeGroup::Preschool,
                daily_limit_minutes: None,
            },
        ],
        games: vec![
            Game {
                id: "math-quiz".into(),
                name: "Math Quiz".into(),
                active: true,
                age_groups: vec![AgeGroup::Early, AgeGroup::Preteen],
                max_points: 100,
            },
            Game {
                id: "tots-quiz".into(),
                name: "Tots Quiz".into(),
                active: true,
                age_groups: vec![AgeGroup::Preschool],
                max_points: 50,
            },
            Game {
                id: "retired-quiz".into(),
                name: "Retired Quiz".into(),
                active: false,
                age_groups: vec![AgeGroup::Early],
                max_points: 100,
            },
        ],
        threat_keywords: vec![ThreatKeyword {
            keyword: "stupid".into(),
            severity: Severity::Low,
            category: ThreatCategory::Cyberbullying,
        }],
        jwt_secret: "testsecret".into(),
        users: vec![
            server::UserConfig {
                username: "root".into(),
                password_hash: admin_hash,
                role: server::Role::Admin,
                child_id: None,
                children: vec![],
            },
            server::UserConfig {
                username: "gina".into(),
                password_hash: guardian_hash,
                role: server::Role::Guardian,
                child_id: None,
                children: vec!["alice".into()],
            },
            server::UserConfig {
                username: "alice".into(),
                password_hash: child_hash.clone(),
                role: server::Role::Child,
                child_id: Some("alice".into()),
                children: vec![],
            },
            server::UserConfig {
                username: "bob".into(),
                password_hash: child_hash,
                role: server::Role::Child,
                child_id: Some("bob".into()),
                children: vec![],
            },
        ],
        timezone: None,
        alert_sweep_minutes: None,
        dev_cors_origin: None,
        listen_port: None,
    };

    let store = storage::Store::connect_sqlite(tmp_db.to_str().unwrap())
        .await
        .expect("db");
    let today = chrono::Utc::now().date_naive();
    store
        .seed_from_config(
            &config.children,
            &config.games,
            &config.threat_keywords,
            today,
            chrono::Utc::now().naive_utc(),
        )
        .await
        .expect("seed");

    let state = server::AppState::new(config, store, chrono_tz::UTC);
    let app = server::router(state);

    let listener = tokio::net::TcpListener::bind((std::net::Ipv4Addr::LOCALHOST, 0)).await?;
    let addr = listener.local_addr()?;
    let handle = tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    Ok((addr, handle))
}

#[tokio::test]
async fn public_endpoints_work() {
    let Some(server) = TestServer::spawn().await else {
        return;
    };
    let (status, _) = server.request("GET", "/healthz", None, None).await;
    assert_eq!(status, StatusCode::OK);
    let token = server.login("gina", "secret123").await;
    assert!(!token.is_empty());
}

#[tokio::test]
async fn unauthenticated_requests_are_rejected() {
    let Some(server) = TestServer::spawn().await else {
        return;
    };
    let cases: Vec<(&str, &str, Option<Value>)> = vec![
        ("GET", "/api/children", None),
        ("GET", "/api/children/alice/time", None),
        ("PUT", "/api/children/alice/time/limit", Some(json!({"minutes": 30}))),
        ("POST", "/api/children/alice/sessions", Some(json!({"game_id": "math-quiz"}))),
        ("GET", "/api/children/alice/progress", None),
        ("POST", "/api/children/alice/messages", Some(json!({"body": "hi"}))),
        ("GET", "/api/alerts", None),
        ("GET", "/api/notifications", None),
        ("GET", "/api/threats", None),
    ];

    for (method, path, body) in cases.iter() {
        server
            .request_expect(method, path, None, body.clone(), StatusCode::UNAUTHORIZED)
            .await;
    }
}

#[tokio::test]
async fn guardian_manages_screen_time() {
    let Some(server) = TestServer::spawn().await else {
        return;
    };
    let token = server.login("gina", "secret123").await;

    let status = server
        .request_expect(
            "GET",
            "/api/children/alice/time",
            Some(&token),
            None,
            StatusCode::OK,
        )
        .await;
    assert_eq!(status.pointer("/data/used_minutes_today"), Some(&json!(0)));
    assert_eq!(status.pointer("/data/daily_limit_minutes"), Some(&json!(60)));
    assert_eq!(status.pointer("/data/remaining_minutes"), Some(&json!(60)));
    assert_eq!(status.pointer("/data/allowed"), Some(&json!(true)));

    // Below the 15-minute floor.
    server
        .request_expect(
            "PUT",
            "/api/children/alice/time/limit",
            Some(&token),
            Some(json!({"minutes": 10})),
            StatusCode::BAD_REQUEST,
        )
        .await;
    // Above the 240-minute ceiling.
    server
        .request_expect(
            "PUT",
            "/api/children/alice/time/limit",
            Some(&token),
            Some(json!({"minutes": 300})),
            StatusCode::BAD_REQUEST,
        )
        .await;

    let updated = server
        .request_expect(
            "PUT",
            "/api/children/alice/time/limit",
            Some(&token),
            Some(json!({"minutes": 45})),
            StatusCode::OK,
        )
        .await;
    assert_eq!(updated.pointer("/data/daily_limit_minutes"), Some(&json!(45)));

    // Extensions widen the limit for the day.
    let extended = server
        .request_expect(
            "POST",
            "/api/children/alice/time/extension",
            Some(&token),
            Some(json!({"minutes": 30})),
            StatusCode::OK,
        )
        .await;
    assert_eq!(extended.pointer("/data/daily_limit_minutes"), Some(&json!(75)));
    assert_eq!(extended.pointer("/data/remaining_minutes"), Some(&json!(75)));

    server
        .request_expect(
            "POST",
            "/api/children/alice/time/extension",
            Some(&token),
            Some(json!({"minutes": 3})),
            StatusCode::BAD_REQUEST,
        )
        .await;
    server
        .request_expect(
            "POST",
            "/api/children/alice/time/extension",
            Some(&token),
            Some(json!({"minutes": 90})),
            StatusCode::BAD_REQUEST,
        )
        .await;

    let status = server
        .request_expect(
            "GET",
            "/api/children/alice/time",
            Some(&token),
            None,
            StatusCode::OK,
        )
        .await;
    assert_eq!(status.pointer("/data/daily_limit_minutes"), Some(&json!(75)));
}

#[tokio::test]
async fn child_plays_and_completes_a_session() {
    let Some(server) = TestServer::spawn().await else {
        return;
    };
    let token = server.login("alice", "kidpass").await;

    let started = server
        .request_expect(
            "POST",
            "/api/children/alice/sessions",
            Some(&token),
            Some(json!({"game_id": "math-quiz"})),
            StatusCode::OK,
        )
        .await;
    assert_eq!(started.pointer("/data/status"), Some(&json!("open")));
    let session_id = started
        .pointer("/data/id")
        .and_then(|v| v.as_str())
        .unwrap()
        .to_string();

    server
        .request_expect(
            "POST",
            &format!("/api/children/alice/sessions/{session_id}/complete"),
            Some(&token),
            Some(json!({
                "score": -5,
                "correct_answers": 0,
                "questions_answered": 0,
                "hints_used": 0
            })),
            StatusCode::BAD_REQUEST,
        )
        .await;

    let completed = server
        .request_expect(
            "POST",
            &format!("/api/children/alice/sessions/{session_id}/complete"),
            Some(&token),
            Some(json!({
                "score": 80,
                "correct_answers": 8,
                "questions_answered": 10,
                "hints_used": 1,
                "badge_earned": "math-whiz"
            })),
            StatusCode::OK,
        )
        .await;
    assert_eq!(
        completed.pointer("/data/session/status"),
        Some(&json!("completed"))
    );
    assert_eq!(
        completed.pointer("/data/session/points_awarded"),
        Some(&json!(80))
    );
    assert_eq!(
        completed.pointer("/data/progress/point_balance"),
        Some(&json!(80))
    );
    assert_eq!(
        completed.pointer("/data/progress/achievements"),
        Some(&json!(["math-whiz"]))
    );
    assert_eq!(
        completed.pointer("/data/progress/total_sessions_played"),
        Some(&json!(1))
    );

    // Completion is exactly-once; a retry is a conflict and awards nothing.
    server
        .request_expect(
            "POST",
            &format!("/api/children/alice/sessions/{session_id}/complete"),
            Some(&token),
            Some(json!({
                "score": 80,
                "correct_answers": 8,
                "questions_answered": 10,
                "hints_used": 1
            })),
            StatusCode::CONFLICT,
        )
        .await;

    let progress = server
        .request_expect(
            "GET",
            "/api/children/alice/progress",
            Some(&token),
            None,
            StatusCode::OK,
        )
        .await;
    assert_eq!(progress.pointer("/data/point_balance"), Some(&json!(80)));

    let points = server
        .request_expect(
            "GET",
            "/api/children/alice/points",
            Some(&token),
            None,
            StatusCode::OK,
        )
        .await;
    let txs = points.pointer("/data").and_then(|v| v.as_array()).unwrap();
    assert_eq!(txs.len(), 1);
    assert_eq!(txs[0].get("amount"), Some(&json!(80)));
    assert_eq!(
        txs[0].get("reason"),
        Some(&json!(format!("session:{session_id}")))
    );
}

#[tokio::test]
async fn session_start_is_gated() {
    let Some(server) = TestServer::spawn().await else {
        return;
    };
    let alice = server.login("alice", "kidpass").await;
    let bob = server.login("bob", "kidpass").await;

    // Inactive game
    server
        .request_expect(
            "POST",
            "/api/children/alice/sessions",
            Some(&alice),
            Some(json!({"game_id": "retired-quiz"})),
            StatusCode::FORBIDDEN,
        )
        .await;
    // Game outside the child's age group
    server
        .request_expect(
            "POST",
            "/api/children/alice/sessions",
            Some(&alice),
            Some(json!({"game_id": "tots-quiz"})),
            StatusCode::FORBIDDEN,
        )
        .await;
    server
        .request_expect(
            "POST",
            "/api/children/bob/sessions",
            Some(&bob),
            Some(json!({"game_id": "math-quiz"})),
            StatusCode::FORBIDDEN,
        )
        .await;
    // Unknown game
    server
        .request_expect(
            "POST",
            "/api/children/alice/sessions",
            Some(&alice),
            Some(json!({"game_id": "no-such-game"})),
            StatusCode::NOT_FOUND,
        )
        .await;
}

#[tokio::test]
async fn flagged_chat_raises_alert_and_notifies_guardian() {
    let Some(server) = TestServer::spawn().await else {
        return;
    };
    let alice = server.login("alice", "kidpass").await;
    let gina = server.login("gina", "secret123").await;

    let posted = server
        .request_expect(
            "POST",
            "/api/children/alice/messages",
            Some(&alice),
            Some(json!({"body": "You are SO stupid"})),
            StatusCode::OK,
        )
        .await;
    assert_eq!(posted.pointer("/data/flagged"), Some(&json!(true)));

    let alerts = server
        .request_expect(
            "GET",
            "/api/children/alice/alerts",
            Some(&gina),
            None,
            StatusCode::OK,
        )
        .await;
    let alerts = alerts.pointer("/data").and_then(|v| v.as_array()).unwrap();
    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0].get("severity"), Some(&json!("low")));
    assert_eq!(alerts[0].get("alert_type"), Some(&json!("cyberbullying")));
    assert_eq!(alerts[0].get("trigger_keyword"), Some(&json!("stupid")));
    assert_eq!(alerts[0].get("resolved"), Some(&json!(false)));
    let alert_id = alerts[0].get("id").and_then(|v| v.as_str()).unwrap();

    let notifications = server
        .request_expect("GET", "/api/notifications", Some(&gina), None, StatusCode::OK)
        .await;
    let notifications = notifications
        .pointer("/data")
        .and_then(|v| v.as_array())
        .unwrap();
    assert_eq!(notifications.len(), 1);
    assert_eq!(notifications[0].get("is_read"), Some(&json!(false)));
    assert_eq!(notifications[0].get("child_id"), Some(&json!("alice")));
    let notification_id = notifications[0].get("id").and_then(|v| v.as_i64()).unwrap();

    // Read marks are idempotent.
    for _ in 0..2 {
        server
            .request_expect(
                "POST",
                &format!("/api/notifications/{notification_id}/read"),
                Some(&gina),
                None,
                StatusCode::OK,
            )
            .await;
    }

    let resolved = server
        .request_expect(
            "POST",
            &format!("/api/alerts/{alert_id}/resolve"),
            Some(&gina),
            None,
            StatusCode::OK,
        )
        .await;
    assert_eq!(resolved.pointer("/data/resolved"), Some(&json!(true)));
    assert_eq!(resolved.pointer("/data/resolved_by"), Some(&json!("gina")));

    // Resolution is exactly-once.
    server
        .request_expect(
            "POST",
            &format!("/api/alerts/{alert_id}/resolve"),
            Some(&gina),
            None,
            StatusCode::CONFLICT,
        )
        .await;

    // A clean message flags nothing and raises nothing new.
    let posted = server
        .request_expect(
            "POST",
            "/api/children/alice/messages",
            Some(&alice),
            Some(json!({"body": "good game, congrats!"})),
            StatusCode::OK,
        )
        .await;
    assert_eq!(posted.pointer("/data/flagged"), Some(&json!(false)));
    let alerts = server
        .request_expect(
            "GET",
            "/api/children/alice/alerts",
            Some(&gina),
            None,
            StatusCode::OK,
        )
        .await;
    assert_eq!(
        alerts.pointer("/data").and_then(|v| v.as_array()).map(|a| a.len()),
        Some(1)
    );
}

#[tokio::test]
async fn alert_for_unguarded_child_stays_unnotified() {
    let Some(server) = TestServer::spawn().await else {
        return;
    };
    let bob = server.login("bob", "kidpass").await;
    let gina = server.login("gina", "secret123").await;
    let root = server.login("root", "adminpass").await;

    let posted = server
        .request_expect(
            "POST",
            "/api/children/bob/messages",
            Some(&bob),
            Some(json!({"body": "stupid game"})),
            StatusCode::OK,
        )
        .await;
    assert_eq!(posted.pointer("/data/flagged"), Some(&json!(true)));

    // The alert exists, admin-visible, even though nobody was notified.
    let alerts = server
        .request_expect("GET", "/api/alerts", Some(&root), None, StatusCode::OK)
        .await;
    let alerts = alerts.pointer("/data").and_then(|v| v.as_array()).unwrap();
    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0].get("child_id"), Some(&json!("bob")));

    let notifications = server
        .request_expect("GET", "/api/notifications", Some(&gina), None, StatusCode::OK)
        .await;
    assert_eq!(
        notifications
            .pointer("/data")
            .and_then(|v| v.as_array())
            .map(|a| a.len()),
        Some(0)
    );
}

#[tokio::test]
async fn child_requests_time_extension() {
    let Some(server) = TestServer::spawn().await else {
        return;
    };
    let alice = server.login("alice", "kidpass").await;
    let gina = server.login("gina", "secret123").await;

    server
        .request_expect(
            "POST",
            "/api/children/alice/time/extension-request",
            Some(&alice),
            Some(json!({"minutes": 3})),
            StatusCode::BAD_REQUEST,
        )
        .await;

    let requested = server
        .request_expect(
            "POST",
            "/api/children/alice/time/extension-request",
            Some(&alice),
            Some(json!({"minutes": 15})),
            StatusCode::OK,
        )
        .await;
    assert_eq!(
        requested.pointer("/data/alert_type"),
        Some(&json!("time_extension_request"))
    );
    assert_eq!(requested.pointer("/data/severity"), Some(&json!("low")));
    assert_eq!(requested.pointer("/data/trigger_keyword"), Some(&json!(null)));

    // The request does not change the limit; only a guardian grant does.
    let status = server
        .request_expect(
            "GET",
            "/api/children/alice/time",
            Some(&gina),
            None,
            StatusCode::OK,
        )
        .await;
    assert_eq!(status.pointer("/data/daily_limit_minutes"), Some(&json!(60)));

    let notifications = server
        .request_expect("GET", "/api/notifications", Some(&gina), None, StatusCode::OK)
        .await;
    let notifications = notifications
        .pointer("/data")
        .and_then(|v| v.as_array())
        .unwrap();
    assert_eq!(notifications.len(), 1);
    assert_eq!(
        notifications[0].get("alert_type"),
        Some(&json!("time_extension_request"))
    );
}

#[tokio::test]
async fn admin_curates_threat_dictionary() {
    let Some(server) = TestServer::spawn().await else {
        return;
    };
    let root = server.login("root", "adminpass").await;
    let alice = server.login("alice", "kidpass").await;

    // Keywords are normalized (trimmed, lowercased) before storage.
    let added = server
        .request_expect(
            "POST",
            "/api/threats",
            Some(&root),
            Some(json!({"keyword": "  Dummy ", "severity": "medium", "category": "violence"})),
            StatusCode::OK,
        )
        .await;
    assert_eq!(added.pointer("/data/keyword"), Some(&json!("dummy")));
    assert_eq!(added.pointer("/data/active"), Some(&json!(true)));

    // Duplicate after normalization.
    server
        .request_expect(
            "POST",
            "/api/threats",
            Some(&root),
            Some(json!({"keyword": "DUMMY", "severity": "low", "category": "other"})),
            StatusCode::CONFLICT,
        )
        .await;
    server
        .request_expect(
            "POST",
            "/api/threats",
            Some(&root),
            Some(json!({"keyword": "   ", "severity": "low", "category": "other"})),
            StatusCode::BAD_REQUEST,
        )
        .await;

    let posted = server
        .request_expect(
            "POST",
            "/api/children/alice/messages",
            Some(&alice),
            Some(json!({"body": "such a dummy move"})),
            StatusCode::OK,
        )
        .await;
    assert_eq!(posted.pointer("/data/flagged"), Some(&json!(true)));

    // Soft delete: the scanner stops matching but history stays listed.
    server
        .request_expect(
            "POST",
            "/api/threats/dummy/deactivate",
            Some(&root),
            None,
            StatusCode::OK,
        )
        .await;
    let posted = server
        .request_expect(
            "POST",
            "/api/children/alice/messages",
            Some(&alice),
            Some(json!({"body": "such a dummy move"})),
            StatusCode::OK,
        )
        .await;
    assert_eq!(posted.pointer("/data/flagged"), Some(&json!(false)));

    let listed = server
        .request_expect("GET", "/api/threats", Some(&root), None, StatusCode::OK)
        .await;
    let listed = listed.pointer("/data").and_then(|v| v.as_array()).unwrap();
    let dummy = listed
        .iter()
        .find(|k| k.get("keyword") == Some(&json!("dummy")))
        .expect("dummy listed");
    assert_eq!(dummy.get("active"), Some(&json!(false)));

    server
        .request_expect(
            "POST",
            "/api/threats/never-added/deactivate",
            Some(&root),
            None,
            StatusCode::NOT_FOUND,
        )
        .await;
}

#[tokio::test]
async fn access_control_scopes_roles_and_ownership() {
    let Some(server) = TestServer::spawn().await else {
        return;
    };
    let alice = server.login("alice", "kidpass").await;
    let bob = server.login("bob", "kidpass").await;
    let gina = server.login("gina", "secret123").await;
    let root = server.login("root", "adminpass").await;

    let negative_cases: Vec<(&str, &str, Option<Value>, &str)> = vec![
        // Children cannot enumerate accounts, manage limits or touch
        // other children.
        ("GET", "/api/children", None, "alice"),
        ("GET", "/api/children/bob/time", None, "alice"),
        (
            "PUT",
            "/api/children/alice/time/limit",
            Some(json!({"minutes": 30})),
            "alice",
        ),
        (
            "POST",
            "/api/children/alice/time/extension",
            Some(json!({"minutes": 15})),
            "alice",
        ),
        ("GET", "/api/children/bob/progress", None, "alice"),
        (
            "POST",
            "/api/children/bob/messages",
            Some(json!({"body": "hi"})),
            "alice",
        ),
        ("GET", "/api/threats", None, "alice"),
        ("GET", "/api/notifications", None, "alice"),
        // Guardians are scoped to linked children.
        ("GET", "/api/children/bob/time", None, "gina"),
        ("GET", "/api/children/bob/alerts", None, "gina"),
        (
            "POST",
            "/api/children/bob/time/extension",
            Some(json!({"minutes": 15})),
            "gina",
        ),
        ("POST", "/api/threats", Some(json!({"keyword": "x", "severity": "low", "category": "other"})), "gina"),
        // Admins do not post as children.
        (
            "POST",
            "/api/children/alice/messages",
            Some(json!({"body": "hi"})),
            "root",
        ),
        (
            "POST",
            "/api/children/alice/sessions",
            Some(json!({"game_id": "math-quiz"})),
            "root",
        ),
    ];

    for (method, path, body, who) in negative_cases.iter() {
        let token = match *who {
            "alice" => &alice,
            "bob" => &bob,
            "gina" => &gina,
            "root" => &root,
            other => panic!("unknown actor {other}"),
        };
        server
            .request_expect(method, path, Some(token), body.clone(), StatusCode::FORBIDDEN)
            .await;
    }

    // A guardian cannot resolve an alert for a child they are not linked
    // to; an admin can.
    server
        .request_expect(
            "POST",
            "/api/children/bob/messages",
            Some(&bob),
            Some(json!({"body": "stupid"})),
            StatusCode::OK,
        )
        .await;
    let alerts = server
        .request_expect("GET", "/api/alerts", Some(&root), None, StatusCode::OK)
        .await;
    let alert_id = alerts
        .pointer("/data/0/id")
        .and_then(|v| v.as_str())
        .unwrap()
        .to_string();
    server
        .request_expect(
            "POST",
            &format!("/api/alerts/{alert_id}/resolve"),
            Some(&gina),
            None,
            StatusCode::FORBIDDEN,
        )
        .await;
    let resolved = server
        .request_expect(
            "POST",
            &format!("/api/alerts/{alert_id}/resolve"),
            Some(&root),
            None,
            StatusCode::OK,
        )
        .await;
    assert_eq!(resolved.pointer("/data/resolved_by"), Some(&json!("root")));

    // Guardians see only their linked children in listings.
    let children = server
        .request_expect("GET", "/api/children", Some(&gina), None, StatusCode::OK)
        .await;
    let children = children.pointer("/data").and_then(|v| v.as_array()).unwrap();
    assert_eq!(children.len(), 1);
    assert_eq!(children[0].get("id"), Some(&json!("alice")));
}

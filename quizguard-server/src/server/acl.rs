use super::{AppError, AppState, auth::AuthCtx};
use axum::response::Response;
use axum::{
    extract::{OriginalUri, State},
    http::{Method, Request},
    middleware::Next,
};
use percent_encoding::percent_decode_str;
use quizguard_shared::auth::Role;
use quizguard_shared::jwt::JwtClaims;

/// Role/ownership gate over the private API. Rules that need entity state
/// (e.g. which child an alert belongs to) are enforced in the handler
/// instead; everything path-shaped is decided here.
pub async fn enforce_acl(
    State(state): State<AppState>,
    req: Request<axum::body::Body>,
    next: Next,
) -> Result<Response, AppError> {
    let path = req
        .extensions()
        .get::<OriginalUri>()
        .map(|orig| orig.0.path().to_string())
        .unwrap_or_else(|| req.uri().path().to_string());
    let method = req.method().clone();
    let Some(auth) = req.extensions().get::<AuthCtx>() else {
        return Err(AppError::unauthorized());
    };
    let claims = &auth.claims;

    let segs = segmented(&path);
    if segs.first() != Some(&"api") {
        tracing::warn!(?segs, "ACL: path outside api scope");
        return Err(AppError::forbidden());
    }
    let rest = &segs[1..];

    let decision = match claims.role {
        Role::Admin => allow_admin(&method, rest),
        Role::Guardian => allow_guardian(&state, &method, rest, claims),
        Role::Child => allow_child(&method, rest, claims),
    };

    if let Err(err) = decision {
        tracing::warn!(
            method = %method,
            path = %path,
            username = %claims.sub,
            role = ?claims.role,
            token_child = ?claims.child_id,
            "ACL: no rule matched; denying"
        );
        return Err(err);
    }

    Ok(next.run(req).await)
}

fn allow_admin(method: &Method, rest: &[&str]) -> Result<(), AppError> {
    match rest {
        ["children"] if *method == Method::GET => Ok(()),
        ["children", _, "time"] if *method == Method::GET => Ok(()),
        ["children", _, "progress"] if *method == Method::GET => Ok(()),
        ["children", _, "points"] if *method == Method::GET => Ok(()),
        ["children", _, "alerts"] if *method == Method::GET => Ok(()),
        ["alerts"] if *method == Method::GET => Ok(()),
        ["alerts", _, "resolve"] if *method == Method::POST => Ok(()),
        ["threats"] if *method == Method::GET || *method == Method::POST => Ok(()),
        ["threats", _, "deactivate"] if *method == Method::POST => Ok(()),
        _ => Err(AppError::forbidden()),
    }
}

fn allow_guardian(
    state: &AppState,
    method: &Method,
    rest: &[&str],
    claims: &JwtClaims,
) -> Result<(), AppError> {
    match rest {
        // Handler narrows the listing to linked children.
        ["children"] if *method == Method::GET => Ok(()),
        ["children", child, "time"] if *method == Method::GET => {
            ensure_linked(state, claims, child)
        }
        ["children", child, "time", "limit"] if *method == Method::PUT => {
            ensure_linked(state, claims, child)
        }
        ["children", child, "time", "extension"] if *method == Method::POST => {
            ensure_linked(state, claims, child)
        }
        ["children", child, "progress"] if *method == Method::GET => {
            ensure_linked(state, claims, child)
        }
        ["children", child, "points"] if *method == Method::GET => {
            ensure_linked(state, claims, child)
        }
        ["children", child, "alerts"] if *method == Method::GET => {
            ensure_linked(state, claims, child)
        }
        // Resolution needs the alert row; the handler checks the link.
        ["alerts", _, "resolve"] if *method == Method::POST => Ok(()),
        ["notifications"] if *method == Method::GET => Ok(()),
        ["notifications", id, "read"] if *method == Method::POST && id.parse::<i32>().is_ok() => {
            Ok(())
        }
        _ => Err(AppError::forbidden()),
    }
}

fn allow_child(method: &Method, rest: &[&str], claims: &JwtClaims) -> Result<(), AppError> {
    match rest {
        ["children", child, "time"] if *method == Method::GET => ensure_child(claims, child),
        ["children", child, "time", "extension-request"] if *method == Method::POST => {
            ensure_child(claims, child)
        }
        ["children", child, "sessions"] if *method == Method::POST => ensure_child(claims, child),
        ["children", child, "sessions", _, "complete"] if *method == Method::POST => {
            ensure_child(claims, child)
        }
        ["children", child, "progress"] if *method == Method::GET => ensure_child(claims, child),
        ["children", child, "points"] if *method == Method::GET => ensure_child(claims, child),
        ["children", child, "messages"] if *method == Method::POST => ensure_child(claims, child),
        _ => Err(AppError::forbidden()),
    }
}

fn segmented(path: &str) -> Vec<&str> {
    path.split('/').filter(|s| !s.is_empty()).collect()
}

fn decode(seg: &str) -> String {
    percent_decode_str(seg).decode_utf8_lossy().to_string()
}

fn ensure_child(claims: &JwtClaims, seg: &str) -> Result<(), AppError> {
    let expected = claims.child_id.as_ref().ok_or_else(AppError::forbidden)?;
    let provided = decode(seg);
    if expected == &provided {
        Ok(())
    } else {
        Err(AppError::forbidden())
    }
}

fn ensure_linked(state: &AppState, claims: &JwtClaims, seg: &str) -> Result<(), AppError> {
    let provided = decode(seg);
    if state.config.is_guardian_of(&claims.sub, &provided) {
        Ok(())
    } else {
        Err(AppError::forbidden())
    }
}

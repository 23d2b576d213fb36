use std::sync::Arc;

use axum::{
    extract::State,
    http::{header, HeaderMap, HeaderValue},
    response::{IntoResponse, Response},
    Extension, Json,
};
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;
use zeroize::Zeroizing;

use super::{not_logged_in, session_token, CurrentSession};
use crate::auth::SESSION_COOKIE;
use crate::error::AppError;
use crate::AppState;

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct LoginRequest {
    email: String,
    password: String,
}

fn with_cookie(mut resp: Response, cookie: String) -> Result<Response, AppError> {
    let value = HeaderValue::from_str(&cookie)
        .map_err(|e| AppError::Internal(format!("session cookie: {e}")))?;
    resp.headers_mut().insert(header::SET_COOKIE, value);
    Ok(resp)
}

pub async fn login(
    State(state): State<Arc<AppState>>,
    Json(body): Json<LoginRequest>,
) -> Result<Response, AppError> {
    let LoginRequest { email, password } = body;
    let password = Zeroizing::new(password);

    // bcrypt verification blocks the thread.
    let worker = state.clone();
    let outcome = tokio::task::spawn_blocking(move || {
        worker.auth.login(&worker.db, &email, password.as_str())
    })
    .await
    .map_err(|e| AppError::Internal(format!("login task failed: {e}")))??;

    let max_age = (outcome.expires_at - Utc::now()).num_seconds().max(0);
    let cookie = format!(
        "{SESSION_COOKIE}={}; HttpOnly; Path=/; SameSite=Lax; Max-Age={max_age}",
        outcome.token
    );
    let resp = Json(json!({
        "ok": true,
        "token": outcome.token,
        "user": outcome.user,
        "expires": outcome.expires_at.to_rfc3339(),
    }))
    .into_response();
    with_cookie(resp, cookie)
}

pub async fn logout(
    State(state): State<Arc<AppState>>,
    Extension(session): Extension<CurrentSession>,
) -> Result<Response, AppError> {
    state.auth.logout(&session.token);
    let resp = Json(json!({ "ok": true })).into_response();
    with_cookie(
        resp,
        format!("{SESSION_COOKIE}=; HttpOnly; Path=/; SameSite=Lax; Max-Age=0"),
    )
}

pub async fn session(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Response, AppError> {
    let info = session_token(&headers)
        .and_then(|token| state.auth.session_json(&token))
        .ok_or(AppError::Unauthenticated)?;
    Ok(Json(json!({ "ok": true, "session": info })).into_response())
}

/// Lets a page confirm it is signed in.
pub async fn secure(State(state): State<Arc<AppState>>, headers: HeaderMap) -> Response {
    match session_token(&headers).and_then(|t| state.auth.authenticate(&t)) {
        Some(_) => Json(json!({ "message": "Success" })).into_response(),
        None => not_logged_in(),
    }
}

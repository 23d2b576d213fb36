//! HTTP surface: router, session gate and shared response helpers.
//!
//! Handlers are grouped by screen. Pass-through routes keep the exact
//! status codes and body shapes pages already depend on, so they build
//! their responses by hand instead of going through [`AppError`].

use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::{header, HeaderMap, HeaderValue, Method, StatusCode},
    middleware::{from_fn_with_state, Next},
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};
use serde_json::{json, Value};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::debug;

use crate::auth::{SessionUser, SESSION_COOKIE};
use crate::error::AppError;
use crate::AppState;

mod addstocks;
mod auth;
mod dispensers;
mod employees;
mod lubricants;
mod pumps;
mod purchase_orders;
mod sales;

/// The signed-in user, attached to requests that pass the session gate.
#[derive(Debug, Clone)]
pub struct CurrentSession {
    pub token: String,
    pub user: SessionUser,
}

// ---------------------------------------------------------------------------
// Router
// ---------------------------------------------------------------------------

pub fn router(state: Arc<AppState>) -> Router {
    let protected = Router::new()
        // pass-through
        .route("/api/addstocks/get-all", get(addstocks::get_all))
        .route("/api/dispensers/get-by-location", get(dispensers::get_by_location))
        .route(
            "/api/employees/get-by-employee-number",
            get(employees::get_by_employee_number),
        )
        .route(
            "/api/pump-inventories/get-by-pump-id-and-location",
            get(pumps::get_by_pump_id_and_location),
        )
        .route(
            "/api/pumps/get-latest-pump-inventories-by-location",
            get(pumps::get_latest_by_location),
        )
        .route("/api/pumps/get-pumps-by-location", get(pumps::get_pumps_by_location))
        .route("/api/purchase-orders/check", get(purchase_orders::check))
        .route("/api/purchase-orders/verify", get(purchase_orders::verify))
        // screens
        .route("/api/dispensers/latest", get(dispensers::latest))
        .route("/api/dispensers/rows", get(dispensers::list_rows))
        .route("/api/dispensers/rows/{pump_number}", put(dispensers::update_row))
        .route("/api/pumps/{pump_id}/snapshot", get(pumps::snapshot))
        .route("/api/pumps/{pump_id}/inventory/preview", post(pumps::preview))
        .route("/api/pumps/{pump_id}/inventory", post(pumps::submit))
        .route("/api/pump-inventories/submissions", get(pumps::submissions))
        .route(
            "/api/purchase-orders/fuel/{po_number}",
            get(purchase_orders::fuel_by_number),
        )
        .route("/api/purchase-orders/manual", post(purchase_orders::manual))
        .route("/api/addstocks/summary", get(addstocks::summary))
        .route("/api/lubricants", get(lubricants::view))
        .route("/api/lubricants/selection", put(lubricants::select))
        .route("/api/lubricants/items/{name}", put(lubricants::update_item))
        .route(
            "/api/sales/summary",
            get(sales::from_session).post(sales::from_body),
        )
        .route("/api/auth/logout", post(auth::logout))
        .route_layer(from_fn_with_state(state.clone(), require_session));

    let open = Router::new()
        .route("/health", get(health))
        .route("/api/auth/login", post(auth::login))
        .route("/api/auth/session", get(auth::session))
        .route("/api/secure", get(auth::secure));

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION]);

    protected
        .merge(open)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

async fn health(State(state): State<Arc<AppState>>) -> Json<Value> {
    Json(crate::diagnostics::health(&state.db))
}

// ---------------------------------------------------------------------------
// Session gate
// ---------------------------------------------------------------------------

/// Token from `Authorization: Bearer` or the session cookie.
pub(crate) fn session_token(headers: &HeaderMap) -> Option<String> {
    if let Some(bearer) = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
    {
        return Some(bearer.to_string());
    }

    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == SESSION_COOKIE)
        .map(|(_, value)| value.trim().to_string())
        .filter(|t| !t.is_empty())
}

async fn require_session(
    State(state): State<Arc<AppState>>,
    mut req: Request,
    next: Next,
) -> Result<Response, AppError> {
    if req.method() == Method::OPTIONS {
        return Ok(next.run(req).await);
    }

    let token = session_token(req.headers()).ok_or(AppError::Unauthenticated)?;
    let user = state.auth.authenticate(&token).ok_or_else(|| {
        debug!(path = %req.uri().path(), "rejected request without a live session");
        AppError::Unauthenticated
    })?;

    req.extensions_mut().insert(CurrentSession { token, user });
    Ok(next.run(req).await)
}

// ---------------------------------------------------------------------------
// Response helpers
// ---------------------------------------------------------------------------

pub(crate) fn json_status(status: StatusCode, body: Value) -> Response {
    (status, Json(body)).into_response()
}

/// 200 with `Cache-Control` set to `value`.
pub(crate) fn json_uncached(body: Value, value: &'static str) -> Response {
    let mut resp = Json(body).into_response();
    resp.headers_mut()
        .insert(header::CACHE_CONTROL, HeaderValue::from_static(value));
    resp
}

/// `401 {message}` in the shape `/api/secure` has always used.
pub(crate) fn not_logged_in() -> Response {
    json_status(
        StatusCode::UNAUTHORIZED,
        json!({ "message": "You must be logged in." }),
    )
}

/// A required query parameter, trimmed; `None` when absent or blank.
pub(crate) fn required(v: &Option<String>) -> Option<&str> {
    v.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use axum::body::{to_bytes, Body};
    use tower::ServiceExt;

    /// Router over a fresh in-memory state pointed at `upstream`.
    pub fn app(upstream: &str) -> (Router, Arc<AppState>) {
        app_with(crate::config::Config::for_upstream(upstream))
    }

    pub fn app_with(config: crate::config::Config) -> (Router, Arc<AppState>) {
        let state = crate::test_state(config);
        (router(state.clone()), state)
    }

    pub fn login(state: &AppState, email: &str) -> String {
        state
            .auth
            .login(&state.db, email, "pass123")
            .expect("demo login")
            .token
    }

    pub async fn send(app: &Router, req: axum::http::Request<Body>) -> (StatusCode, HeaderMap, Value) {
        let resp = app.clone().oneshot(req).await.expect("router responds");
        let status = resp.status();
        let headers = resp.headers().clone();
        let bytes = to_bytes(resp.into_body(), 1 << 20).await.expect("body");
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or_else(|_| {
                Value::String(String::from_utf8_lossy(&bytes).into_owned())
            })
        };
        (status, headers, body)
    }

    pub fn get(uri: &str, token: &str) -> axum::http::Request<Body> {
        axum::http::Request::get(uri)
            .header(header::AUTHORIZATION, format!("Bearer {token}"))
            .body(Body::empty())
            .expect("request")
    }

    pub fn with_json(method: Method, uri: &str, token: &str, body: Value) -> axum::http::Request<Body> {
        axum::http::Request::builder()
            .method(method)
            .uri(uri)
            .header(header::AUTHORIZATION, format!("Bearer {token}"))
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .expect("request")
    }
}

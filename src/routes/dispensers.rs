use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Extension, Json,
};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;

use super::{json_status, CurrentSession};
use crate::dispensers::{dispenser_cards, parse_dispenser_list, pump_index, RegisterPatch, RegisterRow};
use crate::error::AppError;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct LocationQuery {
    location: Option<String>,
}

pub async fn get_by_location(
    State(state): State<Arc<AppState>>,
    Query(q): Query<LocationQuery>,
) -> Response {
    let Some(location) = q.location.as_deref().filter(|l| !l.is_empty()) else {
        return json_status(
            StatusCode::BAD_REQUEST,
            json!({ "error": "location is required" }),
        );
    };

    let url = state.config.dispensers_by_location_url();
    let result = match state.upstream.get(&url, &[("location", location)], None).await {
        Ok(reply) if !reply.is_success() => {
            return json_status(
                StatusCode::BAD_GATEWAY,
                json!({ "error": "Upstream error", "status": reply.status.as_u16() }),
            );
        }
        Ok(reply) => reply.json(),
        Err(e) => Err(e),
    };

    match result {
        Ok(data) => Json(data).into_response(),
        Err(e) => json_status(
            StatusCode::INTERNAL_SERVER_ERROR,
            json!({ "error": e.to_string() }),
        ),
    }
}

/// Latest pump inventories for the signed-in location, grouped by dispenser.
pub async fn latest(
    State(state): State<Arc<AppState>>,
    Extension(session): Extension<CurrentSession>,
) -> Result<Json<Value>, AppError> {
    let location = session.user.location.as_str();
    let url = state
        .config
        .station_url("pumps/get-latest-pump-inventories-by-location");
    let data = state
        .upstream
        .get(&url, &[("location", location)], None)
        .await?
        .success_json()?;

    let dispensers = parse_dispenser_list(data);
    debug!(location, count = dispensers.len(), "latest dispensers");
    Ok(Json(json!({
        "ok": true,
        "location": location,
        "dispensers": dispenser_cards(&dispensers),
    })))
}

pub async fn list_rows(
    State(state): State<Arc<AppState>>,
    Extension(session): Extension<CurrentSession>,
) -> Result<Json<Vec<RegisterRow>>, AppError> {
    state
        .auth
        .with_drafts(&session.token, |drafts| drafts.register_rows.clone())
        .map(Json)
        .ok_or(AppError::Unauthenticated)
}

pub async fn update_row(
    State(state): State<Arc<AppState>>,
    Extension(session): Extension<CurrentSession>,
    Path(pump_number): Path<usize>,
    Json(patch): Json<RegisterPatch>,
) -> Result<Json<RegisterRow>, AppError> {
    let updated = state
        .auth
        .with_drafts(&session.token, |drafts| {
            let idx = pump_index(&drafts.register_rows, pump_number)?;
            let row = &mut drafts.register_rows[idx];
            row.apply_patch(&patch);
            debug!(row = %row.key(), ending = row.ending_register, "register row updated");
            Some(row.clone())
        })
        .ok_or(AppError::Unauthenticated)?;

    updated
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("Pump {pump_number} not found")))
}

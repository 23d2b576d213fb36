//! Pump inventory screens and the pump pass-through routes.

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Extension, Json,
};
use chrono::Utc;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{info, warn};

use super::employees::LOOKUP_FN;
use super::{json_status, json_uncached, required, CurrentSession};
use crate::api::UpstreamError;
use crate::db::{self, SubmissionRecord};
use crate::employees::{
    is_valid_employee_number, lookup_employee, sanitize_employee_number, EmployeeLookup,
};
use crate::error::AppError;
use crate::format;
use crate::inventory::{compute_pump_inventory, dispensed_by_meter, DispensedInput, PumpInventoryRecord};
use crate::AppState;

const LATEST_BY_PUMP_FN: &str = "pump_inventories/get-latest-by-pump-id-and-location";
const LATEST_BY_LOCATION_FN: &str = "pumps/get-latest-pump-inventories-by-location";
const PUMPS_BY_LOCATION_FN: &str = "pumps/get-pumps-by-location";

const DEFAULT_SUBMISSION_LIMIT: u32 = 20;
const MAX_SUBMISSION_LIMIT: u32 = 100;

// ---------------------------------------------------------------------------
// Pass-through
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct PumpQuery {
    location: Option<String>,
    pump_id: Option<String>,
}

pub async fn get_by_pump_id_and_location(
    State(state): State<Arc<AppState>>,
    Query(q): Query<PumpQuery>,
) -> Response {
    let (Some(location), Some(pump_id)) = (required(&q.location), required(&q.pump_id)) else {
        return json_status(
            StatusCode::BAD_REQUEST,
            json!({ "ok": false, "error": "location and pump_id are required query params" }),
        );
    };

    let url = state.config.station_url(LATEST_BY_PUMP_FN);
    let body = json!({ "location": location, "pump_id": pump_id });
    let data = match state.upstream.post_json(&url, &body).await {
        Ok(reply) if !reply.is_success() => {
            let status = reply.status.as_u16();
            return json_status(
                StatusCode::BAD_GATEWAY,
                json!({
                    "ok": false,
                    "error": "Upstream error",
                    "status": status,
                    "detail": reply.body.into_text(),
                }),
            );
        }
        Ok(reply) => reply.json(),
        Err(e) => Err(e),
    };

    match data {
        Ok(data) => Json(json!({ "ok": true, "data": data })).into_response(),
        Err(e) => json_status(
            StatusCode::BAD_GATEWAY,
            json!({ "ok": false, "error": "Request failed", "detail": e.to_string() }),
        ),
    }
}

#[derive(Debug, Deserialize)]
pub struct LocationQuery {
    location: Option<String>,
}

fn present(v: &Option<String>) -> Option<&str> {
    v.as_deref().filter(|s| !s.is_empty())
}

pub async fn get_latest_by_location(
    State(state): State<Arc<AppState>>,
    Query(q): Query<LocationQuery>,
) -> Response {
    let Some(location) = present(&q.location) else {
        return json_status(StatusCode::BAD_REQUEST, json!({ "error": "Missing ?location" }));
    };

    let url = state.config.station_url(LATEST_BY_LOCATION_FN);
    let data = match state.upstream.get(&url, &[("location", location)], None).await {
        Ok(reply) if !reply.is_success() => {
            let status = reply.status.as_u16();
            return json_status(
                StatusCode::BAD_GATEWAY,
                json!({ "error": "Upstream error", "status": status, "body": reply.body.into_text() }),
            );
        }
        Ok(reply) => reply.json(),
        Err(e) => Err(e),
    };

    match data {
        Ok(data) => json_uncached(data, "no-store"),
        Err(e) => json_status(
            StatusCode::INTERNAL_SERVER_ERROR,
            json!({ "error": "Request failed", "message": e.to_string() }),
        ),
    }
}

pub async fn get_pumps_by_location(
    State(state): State<Arc<AppState>>,
    Query(q): Query<LocationQuery>,
) -> Response {
    let Some(location) = present(&q.location) else {
        return json_status(StatusCode::BAD_REQUEST, json!({ "error": "location is required" }));
    };

    let url = state.config.station_url(PUMPS_BY_LOCATION_FN);
    let data = match state.upstream.get(&url, &[("location", location)], None).await {
        Ok(reply) if !reply.is_success() => {
            let status = reply.status.as_u16();
            return json_status(
                StatusCode::BAD_GATEWAY,
                json!({ "error": "Upstream error", "status": status, "body": reply.body.into_text() }),
            );
        }
        Ok(reply) => reply.json(),
        Err(e) => Err(e),
    };

    match data {
        Ok(data) => json_uncached(data, "no-store"),
        Err(e) => json_status(StatusCode::BAD_GATEWAY, json!({ "error": e.to_string() })),
    }
}

// ---------------------------------------------------------------------------
// Snapshot and new readings
// ---------------------------------------------------------------------------

async fn latest_record(
    state: &AppState,
    location: &str,
    pump_id: &str,
) -> Result<PumpInventoryRecord, AppError> {
    let url = state.config.station_url(LATEST_BY_PUMP_FN);
    let data = state
        .upstream
        .post_json(&url, &json!({ "location": location, "pump_id": pump_id }))
        .await?
        .success_json()?;

    if !data.is_object() {
        return Err(AppError::NotFound(format!(
            "No pump inventory found for pump {pump_id}"
        )));
    }
    serde_json::from_value(data)
        .map_err(|e| UpstreamError::Decode(format!("Unexpected pump inventory shape: {e}")).into())
}

pub async fn snapshot(
    State(state): State<Arc<AppState>>,
    Extension(session): Extension<CurrentSession>,
    Path(pump_id): Path<String>,
) -> Result<Json<Value>, AppError> {
    let record = latest_record(&state, &session.user.location, &pump_id).await?;

    let can_create = record.is_matching_today == Some(false);
    let next = record
        .next_date
        .as_deref()
        .and_then(format::manila_short_date)
        .unwrap_or_else(|| "next date".to_string());

    Ok(Json(json!({
        "ok": true,
        "data": record,
        "display": {
            "date": format::manila_date(&record.date),
            "price": format::price_per_liter(record.price),
            "beginning_inventory": format::liters(record.beginning_inventory),
            "ending_inventory": format::liters(record.ending_inventory),
            "starting_liter_meter": format::liters(record.starting_liter_meter),
            "ending_liter_meter": format::liters(record.ending_liter_meter),
        },
        "dispensed_liters": dispensed_by_meter(record.starting_liter_meter, record.ending_liter_meter),
        "can_create": can_create,
        "create_label": format!("Create Pump Inventory for {next}"),
    })))
}

pub async fn preview(
    State(state): State<Arc<AppState>>,
    Extension(session): Extension<CurrentSession>,
    Path(pump_id): Path<String>,
    Json(input): Json<DispensedInput>,
) -> Result<Json<Value>, AppError> {
    let record = latest_record(&state, &session.user.location, &pump_id).await?;
    let payload = compute_pump_inventory(&record, &input);
    Ok(Json(json!({ "ok": true, "payload": payload })))
}

/// Both employee numbers, when entered, must exist upstream. The verified,
/// sanitized numbers replace what was typed.
async fn verify_employees(state: &AppState, input: &mut DispensedInput) -> Result<(), AppError> {
    let url = state.config.backoffice_url(LOOKUP_FN);
    let entered = [
        ("cashier_employee_number", &mut input.cashier_employee_number),
        ("pump_attendant_employee_number", &mut input.pump_attendant_employee_number),
    ];

    for (field, value) in entered {
        let Some(raw) = required(value) else {
            *value = None;
            continue;
        };
        let number = sanitize_employee_number(raw);
        if !is_valid_employee_number(&number) {
            return Err(AppError::BadRequest(format!("{field} must be 5 digits")));
        }
        match lookup_employee(
            &state.upstream,
            &url,
            &number,
            state.config.employee_lookup_timeout,
        )
        .await?
        {
            EmployeeLookup::Found(_) => *value = Some(number),
            EmployeeLookup::NotFound => {
                return Err(AppError::NotFound(format!("Employee {number} not found")));
            }
            EmployeeLookup::Rejected { status, .. } => {
                return Err(UpstreamError::Status(status).into());
            }
        }
    }
    Ok(())
}

pub async fn submit(
    State(state): State<Arc<AppState>>,
    Extension(session): Extension<CurrentSession>,
    Path(pump_id): Path<String>,
    Json(mut input): Json<DispensedInput>,
) -> Result<Response, AppError> {
    let location = session.user.location.clone();
    let record = latest_record(&state, &location, &pump_id).await?;
    match record.is_matching_today {
        Some(false) => {}
        Some(true) => {
            return Err(AppError::Conflict(
                "A pump inventory for today already exists".into(),
            ));
        }
        None => {
            return Err(AppError::Conflict(format!(
                "Pump {pump_id} has no reading that can be continued"
            )));
        }
    }
    verify_employees(&state, &mut input).await?;

    let payload = compute_pump_inventory(&record, &input);
    let payload = serde_json::to_value(&payload)
        .map_err(|e| AppError::Internal(format!("serialize payload: {e}")))?;

    let forward_url = state.config.pump_inventory_submit_url.clone();
    let mut journal = SubmissionRecord {
        id: uuid::Uuid::new_v4().to_string(),
        location,
        pump_id,
        reading_date: record.next_date.clone().unwrap_or_else(|| record.date.clone()),
        submitted_by: session.user.employee_number.clone(),
        payload,
        forward_status: (if forward_url.is_some() { "pending" } else { "local" }).into(),
        upstream_status: None,
        created_at: Utc::now().to_rfc3339(),
    };
    {
        let conn = state.db.lock();
        db::insert_submission(&conn, &journal).map_err(AppError::Internal)?;
    }

    if let Some(url) = forward_url {
        let (status, upstream_status) = match state.upstream.post_json(&url, &journal.payload).await {
            Ok(reply) if reply.is_success() => ("forwarded", Some(reply.status.as_u16())),
            Ok(reply) => {
                warn!(id = %journal.id, status = reply.status.as_u16(), "pump inventory forward rejected");
                ("failed", Some(reply.status.as_u16()))
            }
            Err(e) => {
                warn!(id = %journal.id, "pump inventory forward failed: {e}");
                ("failed", None)
            }
        };
        {
            let conn = state.db.lock();
            db::update_forward_status(&conn, &journal.id, status, upstream_status)
                .map_err(AppError::Internal)?;
        }
        journal.forward_status = status.into();
        journal.upstream_status = upstream_status;
    }

    info!(
        id = %journal.id,
        pump_id = %journal.pump_id,
        forward_status = %journal.forward_status,
        "pump inventory submitted"
    );
    Ok((
        StatusCode::CREATED,
        Json(json!({ "ok": true, "submission": journal })),
    )
        .into_response())
}

#[derive(Debug, Deserialize)]
pub struct SubmissionsQuery {
    limit: Option<u32>,
}

pub async fn submissions(
    State(state): State<Arc<AppState>>,
    Extension(session): Extension<CurrentSession>,
    Query(q): Query<SubmissionsQuery>,
) -> Result<Json<Value>, AppError> {
    let limit = q
        .limit
        .unwrap_or(DEFAULT_SUBMISSION_LIMIT)
        .clamp(1, MAX_SUBMISSION_LIMIT);
    let records = {
        let conn = state.db.lock();
        db::recent_submissions(&conn, &session.user.location, limit).map_err(AppError::Internal)?
    };
    let items: Vec<Value> = records
        .into_iter()
        .map(|r| {
            let created = format::manila_datetime(&r.created_at);
            let mut item = json!(r);
            item["created_display"] = Value::String(created);
            item
        })
        .collect();
    Ok(Json(json!({ "ok": true, "count": items.len(), "items": items })))
}

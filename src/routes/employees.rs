use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Deserialize;
use serde_json::json;

use super::{json_status, required};
use crate::api::UpstreamError;
use crate::employees::{lookup_employee, EmployeeLookup};
use crate::AppState;

pub(crate) const LOOKUP_FN: &str = "employees/get-by-employee-number";

#[derive(Debug, Deserialize)]
pub struct EmployeeQuery {
    employee_number: Option<String>,
}

pub async fn get_by_employee_number(
    State(state): State<Arc<AppState>>,
    Query(q): Query<EmployeeQuery>,
) -> Response {
    let Some(number) = required(&q.employee_number) else {
        return json_status(
            StatusCode::BAD_REQUEST,
            json!({ "error": "employee_number is required" }),
        );
    };

    let url = state.config.backoffice_url(LOOKUP_FN);
    let lookup = lookup_employee(
        &state.upstream,
        &url,
        number,
        state.config.employee_lookup_timeout,
    )
    .await;

    match lookup {
        Ok(EmployeeLookup::Found(employee)) => {
            Json(json!({ "found": true, "employee": employee })).into_response()
        }
        Ok(EmployeeLookup::NotFound) => json_status(StatusCode::NOT_FOUND, json!({ "found": false })),
        Ok(EmployeeLookup::Rejected { status, data }) => json_status(
            status,
            json!({ "error": "Upstream error", "status": status.as_u16(), "data": data }),
        ),
        Err(UpstreamError::Timeout) => json_status(
            StatusCode::BAD_GATEWAY,
            json!({ "error": "Upstream timeout" }),
        ),
        Err(_) => json_status(StatusCode::BAD_GATEWAY, json!({ "error": "Request failed" })),
    }
}

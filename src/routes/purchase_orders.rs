use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use super::json_status;
use crate::error::AppError;
use crate::purchase_orders::{
    classify_fuel_reply, sanitize_po_number, validate_manual_po, ManualPoForm, PO_NETWORK_ERROR,
    PO_NOT_FOUND, PO_NUMBER_LEN,
};
use crate::AppState;

const FUEL_BY_PO_FN: &str = "purchase-orders/get-fuel-by-po-number";

#[derive(Debug, Deserialize)]
pub struct PoQuery {
    po_number: Option<String>,
}

fn missing_po() -> Response {
    json_status(StatusCode::BAD_REQUEST, json!({ "error": "Missing po_number" }))
}

pub async fn check(State(state): State<Arc<AppState>>, Query(q): Query<PoQuery>) -> Response {
    let Some(po_number) = q.po_number.as_deref().filter(|p| !p.is_empty()) else {
        return missing_po();
    };

    let url = state.config.backoffice_url(FUEL_BY_PO_FN);
    let reply = match state.upstream.get(&url, &[("po_number", po_number)], None).await {
        Ok(reply) => reply,
        Err(e) => {
            return json_status(
                StatusCode::BAD_GATEWAY,
                json!({ "error": "Upstream fetch error", "message": e.to_string() }),
            );
        }
    };

    if !reply.is_success() {
        let status = reply.status;
        return json_status(
            status,
            json!({
                "error": "Upstream request failed",
                "status": status.as_u16(),
                "body": reply.body.into_value(),
            }),
        );
    }
    match reply.json() {
        Ok(data) => Json(data).into_response(),
        Err(e) => json_status(
            StatusCode::BAD_GATEWAY,
            json!({ "error": "Upstream fetch error", "message": e.to_string() }),
        ),
    }
}

pub async fn verify(State(state): State<Arc<AppState>>, Query(q): Query<PoQuery>) -> Response {
    let Some(po_number) = q.po_number.as_deref().filter(|p| !p.is_empty()) else {
        return missing_po();
    };

    let url = state.config.backoffice_url(FUEL_BY_PO_FN);
    let data = match state
        .upstream
        .post_json(&url, &json!({ "po_number": po_number }))
        .await
    {
        Ok(reply) if !reply.is_success() => {
            let status = reply.status.as_u16();
            return json_status(
                StatusCode::BAD_GATEWAY,
                json!({
                    "error": "Upstream request failed",
                    "status": status,
                    "body": reply.body.into_text(),
                }),
            );
        }
        Ok(reply) => reply.json(),
        Err(e) => Err(e),
    };

    match data {
        Ok(data) => Json(data).into_response(),
        Err(e) => json_status(
            StatusCode::INTERNAL_SERVER_ERROR,
            json!({ "error": "Internal error", "details": e.to_string() }),
        ),
    }
}

/// Look up a fuel PO by number as the PO picker does.
pub async fn fuel_by_number(
    State(state): State<Arc<AppState>>,
    Path(raw): Path<String>,
) -> Result<Response, AppError> {
    let po_number = sanitize_po_number(&raw);
    if po_number.len() != PO_NUMBER_LEN {
        return Err(AppError::BadRequest(format!(
            "PO number must be {PO_NUMBER_LEN} digits"
        )));
    }

    let url = state.config.backoffice_url(FUEL_BY_PO_FN);
    let reply = match state
        .upstream
        .post_json(&url, &json!({ "po_number": po_number }))
        .await
    {
        Ok(reply) => reply,
        Err(e) => {
            debug!(po_number, "fuel PO lookup failed: {e}");
            return Ok(json_status(
                StatusCode::BAD_GATEWAY,
                json!({ "ok": false, "error": PO_NETWORK_ERROR }),
            ));
        }
    };

    let po = classify_fuel_reply(reply)?.ok_or_else(|| AppError::NotFound(PO_NOT_FOUND.into()))?;
    Ok(Json(json!({ "ok": true, "purchase_order": po })).into_response())
}

pub async fn manual(Json(form): Json<ManualPoForm>) -> Response {
    match validate_manual_po(&form) {
        Ok(po) => json_status(StatusCode::CREATED, json!({ "ok": true, "purchase_order": po })),
        Err(errors) => json_status(
            StatusCode::BAD_REQUEST,
            json!({ "ok": false, "error": "Please fix the highlighted fields", "errors": errors }),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use axum::http::{Method, StatusCode};
    use serde_json::json;
    use wiremock::matchers::{body_json, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn fuel_po(po_number: &str) -> serde_json::Value {
        json!({
            "id": "po-1",
            "type": "fuel",
            "tin": "123-456-789",
            "created_by": "Back Office",
            "creator_employee_number": "10002",
            "created": "2026-10-17T01:00:00Z",
            "date": "2026-10-17",
            "fuel": {
                "plate_number": "ABC 1234",
                "route": "Loboc - Tagbilaran",
                "driver": "Pedro",
                "product": "diesel",
                "quantity": "150"
            },
            "po_number": po_number
        })
    }

    #[tokio::test]
    async fn check_and_verify_require_a_number() {
        let (app, state) = app("http://127.0.0.1:9");
        let token = login(&state, "loboc@email.com");
        for route in ["/api/purchase-orders/check", "/api/purchase-orders/verify?po_number="] {
            let (status, _, body) = send(&app, get(route, &token)).await;
            assert_eq!(status, StatusCode::BAD_REQUEST);
            assert_eq!(body, json!({ "error": "Missing po_number" }));
        }
    }

    #[tokio::test]
    async fn check_mirrors_upstream_status_and_verify_hides_it() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/purchase-orders/get-fuel-by-po-number"))
            .and(query_param("po_number", "11111111"))
            .respond_with(ResponseTemplate::new(404).set_body_json(json!({ "error": "not found" })))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/purchase-orders/get-fuel-by-po-number"))
            .respond_with(ResponseTemplate::new(404).set_body_string("not found"))
            .mount(&server)
            .await;

        let (app, state) = app(&server.uri());
        let token = login(&state, "loboc@email.com");

        let (status, _, body) =
            send(&app, get("/api/purchase-orders/check?po_number=11111111", &token)).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(
            body,
            json!({ "error": "Upstream request failed", "status": 404, "body": { "error": "not found" } })
        );

        let (status, _, body) =
            send(&app, get("/api/purchase-orders/verify?po_number=11111111", &token)).await;
        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert_eq!(
            body,
            json!({ "error": "Upstream request failed", "status": 404, "body": "not found" })
        );
    }

    #[tokio::test]
    async fn verify_posts_the_number() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/purchase-orders/get-fuel-by-po-number"))
            .and(body_json(json!({ "po_number": "11996189" })))
            .respond_with(ResponseTemplate::new(200).set_body_json(fuel_po("11996189")))
            .mount(&server)
            .await;

        let (app, state) = app(&server.uri());
        let token = login(&state, "loboc@email.com");
        let (status, _, body) =
            send(&app, get("/api/purchase-orders/verify?po_number=11996189", &token)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["type"], "fuel");
    }

    #[tokio::test]
    async fn fuel_lookup_by_number() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_json(json!({ "po_number": "11996189" })))
            .respond_with(ResponseTemplate::new(200).set_body_json(fuel_po("11996189")))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(body_json(json!({ "po_number": "22222222" })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "type": "lubricant", "po_number": "22222222" })))
            .mount(&server)
            .await;

        let (app, state) = app(&server.uri());
        let token = login(&state, "loboc@email.com");

        let (status, _, body) =
            send(&app, get("/api/purchase-orders/fuel/PO-1199-6189", &token)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["purchase_order"]["po_number"], "11996189");
        assert_eq!(body["purchase_order"]["fuel"]["quantity"], 150.0);

        let (status, _, body) = send(&app, get("/api/purchase-orders/fuel/22222222", &token)).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "PO Number Not Found");

        let (status, _, _) = send(&app, get("/api/purchase-orders/fuel/1234", &token)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn fuel_lookup_network_failure() {
        let (app, state) = app("http://127.0.0.1:9");
        let token = login(&state, "loboc@email.com");
        let (status, _, body) = send(&app, get("/api/purchase-orders/fuel/11996189", &token)).await;
        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert_eq!(body, json!({ "ok": false, "error": "Network error. Please try again." }));
    }

    #[tokio::test]
    async fn manual_po_validation() {
        let (app, state) = app("http://127.0.0.1:9");
        let token = login(&state, "loboc@email.com");

        let (status, _, body) = send(
            &app,
            with_json(
                Method::POST,
                "/api/purchase-orders/manual",
                &token,
                json!({ "product": "Diesel", "po_number": "11996189", "quantity_liters": "abc" }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["errors"]["plate_number"], "Required");
        assert_eq!(body["errors"]["quantity_liters"], "Must be a number");

        let (status, _, body) = send(
            &app,
            with_json(
                Method::POST,
                "/api/purchase-orders/manual",
                &token,
                json!({
                    "dispenser_id": "dispenser_1",
                    "product": "Diesel",
                    "po_number": "11996189",
                    "plate_number": "ABC 1234",
                    "route": "Loboc",
                    "driver": "Pedro",
                    "quantity_liters": "25.5"
                }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["purchase_order"]["product"], "diesel");
        assert_eq!(body["purchase_order"]["quantity_liters"], 25.5);
        assert!(body["purchase_order"]["id"].is_string());
    }

    #[tokio::test]
    async fn check_and_verify_transport_failures() {
        let (app, state) = app("http://127.0.0.1:9");
        let token = login(&state, "loboc@email.com");

        let (status, _, body) =
            send(&app, get("/api/purchase-orders/verify?po_number=11996189", &token)).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["error"], "Internal error");
        assert!(body["details"].is_string());

        let (status, _, body) =
            send(&app, get("/api/purchase-orders/check?po_number=11996189", &token)).await;
        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert_eq!(body["error"], "Upstream fetch error");
        assert!(body["message"].is_string());
    }
}

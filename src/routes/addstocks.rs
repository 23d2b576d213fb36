use std::sync::Arc;

use axum::{extract::State, http::StatusCode, response::Response, Json};
use chrono::Utc;
use serde_json::{json, Value};

use super::{json_status, json_uncached};
use crate::addstocks::{reply_ok, summarize, AddStockSummary};
use crate::api::UpstreamError;
use crate::error::AppError;
use crate::AppState;

const GET_ALL: &str = "addstocks/get-all";

pub async fn get_all(State(state): State<Arc<AppState>>) -> Response {
    let url = state.config.station_url(GET_ALL);
    let read = match state.upstream.get(&url, &[], None).await {
        Ok(reply) => {
            let status = reply.status;
            reply.declared_body().map(|data| (status, data))
        }
        Err(e) => Err(e),
    };

    match read {
        Ok((status, data)) if status.is_success() => json_uncached(data, "no-store, max-age=0"),
        Ok((status, data)) => json_status(
            status,
            json!({
                "error": "Upstream request failed",
                "status": status.as_u16(),
                "body": data,
            }),
        ),
        Err(e) => json_status(
            StatusCode::BAD_GATEWAY,
            json!({ "error": "Network or parsing error", "message": e.to_string() }),
        ),
    }
}

pub async fn summary(State(state): State<Arc<AppState>>) -> Result<Json<AddStockSummary>, AppError> {
    let url = state.config.station_url(GET_ALL);
    let data = state.upstream.get(&url, &[], None).await?.success_json()?;
    if !reply_ok(&data) {
        let message = data
            .get("error")
            .and_then(Value::as_str)
            .unwrap_or("Add-stocks request was not ok")
            .to_string();
        return Err(UpstreamError::Decode(message).into());
    }
    Ok(Json(summarize(&data, Utc::now())))
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use axum::http::StatusCode;
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn get_all_passes_data_through_uncached() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/addstocks/get-all"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "ok": true, "count": 0, "items": [] })))
            .mount(&server)
            .await;

        let (app, state) = app(&server.uri());
        let token = login(&state, "loboc@email.com");
        let (status, headers, body) = send(&app, get("/api/addstocks/get-all", &token)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["ok"], true);
        assert_eq!(headers["cache-control"], "no-store, max-age=0");
    }

    #[tokio::test]
    async fn get_all_mirrors_upstream_error_status() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503).set_body_string("maintenance"))
            .mount(&server)
            .await;

        let (app, state) = app(&server.uri());
        let token = login(&state, "loboc@email.com");
        let (status, _, body) = send(&app, get("/api/addstocks/get-all", &token)).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(
            body,
            json!({ "error": "Upstream request failed", "status": 503, "body": "maintenance" })
        );
    }

    #[tokio::test]
    async fn get_all_reports_transport_failure() {
        let (app, state) = app("http://127.0.0.1:9");
        let token = login(&state, "loboc@email.com");
        let (status, _, body) = send(&app, get("/api/addstocks/get-all", &token)).await;
        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert_eq!(body["error"], "Network or parsing error");
        assert!(body["message"].is_string());
    }

    #[tokio::test]
    async fn get_all_reads_the_body_by_content_type() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/broken/addstocks/get-all"))
            .respond_with(ResponseTemplate::new(200).set_body_raw("{not json", "application/json"))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/plain/addstocks/get-all"))
            .respond_with(ResponseTemplate::new(200).set_body_raw("{\"ok\":true}", "text/plain"))
            .mount(&server)
            .await;

        let (app, state) = app(&format!("{}/broken", server.uri()));
        let token = login(&state, "loboc@email.com");
        let (status, _, body) = send(&app, get("/api/addstocks/get-all", &token)).await;
        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert_eq!(body["error"], "Network or parsing error");

        let (app, state) = super::super::test_support::app(&format!("{}/plain", server.uri()));
        let token = login(&state, "loboc@email.com");
        let (status, _, body) = send(&app, get("/api/addstocks/get-all", &token)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!("{\"ok\":true}"));
    }

    #[tokio::test]
    async fn summary_totals_by_product() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/addstocks/get-all"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "ok": true,
                "count": 2,
                "items": [
                    {
                        "id": "6530aaaa0000000000000001",
                        "date": { "$date": "2026-10-16T01:00:00Z" },
                        "items": [{ "product": "diesel", "quantity": 1000 }],
                        "creator_employee_number": "10002",
                        "created": "2026-10-16T01:05:00Z"
                    },
                    {
                        "id": "6530aaaa0000000000000002",
                        "date": "2026-10-17T01:00:00Z",
                        "items": [
                            { "product": "diesel", "quantity": "250.5" },
                            { "product": "regular", "quantity": 800 }
                        ],
                        "creator_employee_number": "10001",
                        "created": "2026-10-17T01:05:00Z"
                    }
                ]
            })))
            .mount(&server)
            .await;

        let (app, state) = app(&server.uri());
        let token = login(&state, "loboc@email.com");
        let (status, _, body) = send(&app, get("/api/addstocks/summary", &token)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["count"], 2);
        assert_eq!(body["diesel_total_liters"], 1250.5);
        assert_eq!(body["regular_total_liters"], 800.0);
        assert_eq!(body["items"][0]["id"], "6530aaaa0000000000000002");
    }

    #[tokio::test]
    async fn summary_fails_when_upstream_is_not_ok() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "ok": false, "error": "db down" })))
            .mount(&server)
            .await;

        let (app, state) = app(&server.uri());
        let token = login(&state, "loboc@email.com");
        let (status, _, body) = send(&app, get("/api/addstocks/summary", &token)).await;
        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert_eq!(body, json!({ "ok": false, "error": "db down" }));
    }
}

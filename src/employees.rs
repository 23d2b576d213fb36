//! Employee-number rules and the back-office employee lookup.

use std::time::Duration;

use reqwest::StatusCode;
use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use crate::api::{UpstreamBody, UpstreamClient, UpstreamError};
use crate::inventory::digits_only;

pub const EMPLOYEE_NUMBER_LEN: usize = 5;

/// Digits only, cut to the employee-number length.
pub fn sanitize_employee_number(raw: &str) -> String {
    digits_only(raw, EMPLOYEE_NUMBER_LEN)
}

pub fn is_valid_employee_number(raw: &str) -> bool {
    raw.len() == EMPLOYEE_NUMBER_LEN && raw.chars().all(|c| c.is_ascii_digit())
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Employee {
    pub id: Value,
    pub employee_number: Value,
    pub first_name: Value,
    pub last_name: Value,
    pub full_name: String,
    pub uid: Value,
    pub created: Value,
}

fn field(e: &Value, key: &str) -> Value {
    e.get(key).cloned().unwrap_or(Value::Null)
}

/// Pull the employee out of a lookup reply. `None` unless the reply says
/// `found` and carries an `employee` object.
pub fn normalize_employee(data: &Value) -> Option<Employee> {
    let found = data.get("found").is_some_and(truthy);
    let e = data.get("employee").filter(|e| truthy(e))?;
    if !found {
        return None;
    }
    let name_part = |key: &str| e.get(key).and_then(Value::as_str).unwrap_or("").to_string();
    let full_name = format!("{} {}", name_part("first_name"), name_part("last_name"))
        .trim()
        .to_string();
    let created = match e.get("created") {
        Some(v) if !v.is_null() => v.clone(),
        _ => field(e, "created_at"),
    };
    Some(Employee {
        id: field(e, "id"),
        employee_number: field(e, "employee_number"),
        first_name: field(e, "first_name"),
        last_name: field(e, "last_name"),
        full_name,
        uid: field(e, "uid"),
        created,
    })
}

/// JavaScript-style truthiness for the lookup's loosely typed flags.
fn truthy(v: &Value) -> bool {
    match v {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum EmployeeLookup {
    Found(Employee),
    NotFound,
    /// Upstream answered with a non-2xx status; the body is passed along.
    Rejected { status: StatusCode, data: Value },
}

/// Look `employee_number` up on the back-office host.
pub async fn lookup_employee(
    client: &UpstreamClient,
    url: &str,
    employee_number: &str,
    timeout: Duration,
) -> Result<EmployeeLookup, UpstreamError> {
    let reply = client
        .get(url, &[("employee_number", employee_number)], Some(timeout))
        .await?;

    // Unparseable bodies read as null, like an empty reply.
    let data = match reply.body {
        UpstreamBody::Json(v) => v,
        UpstreamBody::Text(_) => Value::Null,
    };

    if !reply.status.is_success() {
        return Ok(EmployeeLookup::Rejected {
            status: reply.status,
            data,
        });
    }

    let outcome = match normalize_employee(&data) {
        Some(e) => EmployeeLookup::Found(e),
        None => EmployeeLookup::NotFound,
    };
    debug!(employee_number, found = matches!(outcome, EmployeeLookup::Found(_)), "employee lookup");
    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{method, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn employee_numbers_are_five_digits() {
        assert!(is_valid_employee_number("10002"));
        assert!(!is_valid_employee_number("1000"));
        assert!(!is_valid_employee_number("1000a"));
        assert_eq!(sanitize_employee_number("10-00 2 99"), "10002");
    }

    #[test]
    fn normalizes_names_and_created_fallback() {
        let e = normalize_employee(&json!({
            "found": true,
            "employee": {
                "id": 4,
                "employee_number": "10002",
                "first_name": "Ana",
                "last_name": null,
                "uid": "u-4",
                "created_at": "2026-01-02"
            }
        }))
        .expect("employee");
        assert_eq!(e.full_name, "Ana");
        assert_eq!(e.created, json!("2026-01-02"));
        assert_eq!(e.id, json!(4));
    }

    #[test]
    fn missing_flag_or_employee_is_not_found() {
        assert!(normalize_employee(&json!({ "found": false, "employee": { "id": 1 } })).is_none());
        assert!(normalize_employee(&json!({ "found": true })).is_none());
        assert!(normalize_employee(&Value::Null).is_none());
    }

    #[tokio::test]
    async fn lookup_passes_upstream_rejections_through() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(query_param("employee_number", "99999"))
            .respond_with(ResponseTemplate::new(503).set_body_json(json!({ "down": true })))
            .mount(&server)
            .await;

        let client = UpstreamClient::new(Duration::from_secs(5)).expect("client");
        let outcome = lookup_employee(&client, &server.uri(), "99999", Duration::from_secs(2))
            .await
            .expect("reply");
        assert_eq!(
            outcome,
            EmployeeLookup::Rejected {
                status: StatusCode::SERVICE_UNAVAILABLE,
                data: json!({ "down": true })
            }
        );
    }
}

//! Purchase-order numbers, fuel-PO verification and the manual PO form.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::api::{UpstreamBody, UpstreamError, UpstreamReply};
use crate::inventory::{digits_only, lenient_opt_f64, normalize_quantity};

pub const PO_NUMBER_LEN: usize = 8;
pub const MIN_QUANTITY_LITERS: f64 = 0.01;

pub const PO_NOT_FOUND: &str = "PO Number Not Found";
pub const PO_NETWORK_ERROR: &str = "Network error. Please try again.";

pub fn sanitize_po_number(raw: &str) -> String {
    digits_only(raw, PO_NUMBER_LEN)
}

// ---------------------------------------------------------------------------
// Fuel PO verification
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct FuelDetails {
    pub plate_number: Option<String>,
    pub route: Option<String>,
    pub driver: Option<String>,
    pub product: Option<String>,
    #[serde(deserialize_with = "lenient_opt_f64")]
    pub quantity: Option<f64>,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct FuelPurchaseOrder {
    #[serde(default)]
    pub id: Value,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub tin: Value,
    #[serde(default)]
    pub created_by: Value,
    #[serde(default)]
    pub creator_employee_number: Value,
    #[serde(default)]
    pub created: Value,
    #[serde(default)]
    pub date: Value,
    #[serde(default)]
    pub fuel: Option<FuelDetails>,
    pub po_number: String,
}

/// Whether a JSON value would pass an `if` on the page: `null`, `false`,
/// `0` and `""` do not.
fn is_truthy(v: &Value) -> bool {
    match v {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0 && !f.is_nan()),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

/// Decide whether a verify reply is a fuel PO. Error statuses, a truthy
/// `error`, and anything that is not `type: "fuel"` with an 8-character
/// `po_number` all read as not found. A fuel PO whose other fields have
/// the wrong shape is a decode error.
pub fn classify_fuel_reply(
    reply: UpstreamReply,
) -> Result<Option<FuelPurchaseOrder>, UpstreamError> {
    if !reply.is_success() {
        return Ok(None);
    }
    let UpstreamBody::Json(data) = reply.body else {
        return Ok(None);
    };
    if data.get("error").is_some_and(is_truthy) {
        return Ok(None);
    }
    let looks_fuel = data.get("type").and_then(Value::as_str) == Some("fuel")
        && data
            .get("po_number")
            .and_then(Value::as_str)
            .is_some_and(|po| po.chars().count() == PO_NUMBER_LEN);
    if !looks_fuel {
        return Ok(None);
    }
    serde_json::from_value(data)
        .map(Some)
        .map_err(|e| UpstreamError::Decode(format!("Unexpected purchase order shape: {e}")))
}

// ---------------------------------------------------------------------------
// Manual PO form
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ManualPoForm {
    pub dispenser_id: Option<String>,
    pub product: String,
    pub po_number: String,
    pub plate_number: String,
    pub route: String,
    pub driver: String,
    pub quantity_liters: String,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ManualPurchaseOrder {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dispenser_id: Option<String>,
    pub product: String,
    pub po_number: String,
    pub plate_number: String,
    pub route: String,
    pub driver: String,
    pub quantity_liters: f64,
}

/// Field name to message; empty when the form is valid.
pub type FieldErrors = BTreeMap<&'static str, &'static str>;

/// Validate the form and assign it an id.
pub fn validate_manual_po(form: &ManualPoForm) -> Result<ManualPurchaseOrder, FieldErrors> {
    let mut errors = FieldErrors::new();
    let required = [
        ("product", &form.product),
        ("po_number", &form.po_number),
        ("plate_number", &form.plate_number),
        ("route", &form.route),
        ("driver", &form.driver),
        ("quantity_liters", &form.quantity_liters),
    ];
    for (name, value) in required {
        if value.trim().is_empty() {
            errors.insert(name, "Required");
        }
    }

    let quantity = normalize_quantity(form.quantity_liters.trim(), Some(MIN_QUANTITY_LITERS), None);
    let parsed = quantity.parse::<f64>().ok().filter(|q| q.is_finite());
    if parsed.is_none() && !errors.contains_key("quantity_liters") {
        errors.insert("quantity_liters", "Must be a number");
    }

    if !errors.is_empty() {
        return Err(errors);
    }

    Ok(ManualPurchaseOrder {
        id: Uuid::new_v4().to_string(),
        dispenser_id: form
            .dispenser_id
            .as_deref()
            .map(str::trim)
            .filter(|d| !d.is_empty())
            .map(str::to_string),
        product: form.product.trim().to_lowercase(),
        po_number: form.po_number.trim().to_string(),
        plate_number: form.plate_number.trim().to_string(),
        route: form.route.trim().to_string(),
        driver: form.driver.trim().to_string(),
        quantity_liters: parsed.unwrap_or(MIN_QUANTITY_LITERS),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::StatusCode;
    use serde_json::json;

    fn reply(status: StatusCode, body: Value) -> UpstreamReply {
        UpstreamReply {
            status,
            content_type: Some("application/json".into()),
            body: UpstreamBody::Json(body),
        }
    }

    #[test]
    fn po_numbers_are_cut_to_eight_digits() {
        assert_eq!(sanitize_po_number("PO 1199-6189 77"), "11996189");
        assert_eq!(sanitize_po_number("12ab"), "12");
    }

    #[test]
    fn fuel_reply_is_recognized() {
        let po = classify_fuel_reply(reply(
            StatusCode::OK,
            json!({
                "id": "po-1",
                "type": "fuel",
                "tin": "123-456",
                "created_by": "Ana",
                "creator_employee_number": "10002",
                "created": { "$date": "2026-10-17T00:00:00Z" },
                "date": "2026-10-17",
                "fuel": { "plate_number": "ABC 123", "quantity": 40.5 },
                "po_number": "11996189"
            }),
        ))
        .expect("decodes")
        .expect("fuel po");
        assert_eq!(po.kind, "fuel");
        assert_eq!(po.fuel.and_then(|f| f.quantity), Some(40.5));
    }

    #[test]
    fn non_fuel_or_erroneous_replies_are_not_found() {
        let not_fuel = json!({ "type": "lubricant", "po_number": "11996189" });
        assert!(classify_fuel_reply(reply(StatusCode::OK, not_fuel)).expect("decodes").is_none());

        let short = json!({ "type": "fuel", "po_number": "1199" });
        assert!(classify_fuel_reply(reply(StatusCode::OK, short)).expect("decodes").is_none());

        let flagged = json!({ "type": "fuel", "po_number": "11996189", "error": "gone" });
        assert!(classify_fuel_reply(reply(StatusCode::OK, flagged)).expect("decodes").is_none());

        let failed = json!({ "type": "fuel", "po_number": "11996189" });
        assert!(classify_fuel_reply(reply(StatusCode::BAD_GATEWAY, failed)).expect("decodes").is_none());

        let text = UpstreamReply {
            status: StatusCode::OK,
            content_type: Some("text/plain".into()),
            body: UpstreamBody::Text("ok".into()),
        };
        assert!(classify_fuel_reply(text).expect("decodes").is_none());
    }

    #[test]
    fn falsy_error_field_does_not_hide_a_fuel_po() {
        for error in [json!(""), json!(false), json!(null), json!(0)] {
            let body = json!({ "type": "fuel", "po_number": "11996189", "error": error.clone() });
            let po = classify_fuel_reply(reply(StatusCode::OK, body)).expect("decodes");
            assert!(po.is_some(), "error {error} should not count");
        }
    }

    #[test]
    fn oddly_shaped_fuel_po_is_a_decode_error() {
        let body = json!({ "type": "fuel", "po_number": "11996189", "fuel": "diesel" });
        let err = classify_fuel_reply(reply(StatusCode::OK, body)).expect_err("bad shape");
        assert!(matches!(err, UpstreamError::Decode(_)));
    }

    #[test]
    fn manual_form_reports_every_missing_field() {
        let errors = validate_manual_po(&ManualPoForm::default()).expect_err("empty form");
        assert_eq!(errors.len(), 6);
        assert_eq!(errors.get("driver"), Some(&"Required"));
    }

    #[test]
    fn manual_form_normalizes_quantity() {
        let form = ManualPoForm {
            product: "Diesel".into(),
            po_number: "11996189".into(),
            plate_number: " ABC 123 ".into(),
            route: "Loboc - Tagbilaran".into(),
            driver: "Juan".into(),
            quantity_liters: "0".into(),
            ..Default::default()
        };
        let po = validate_manual_po(&form).expect("valid");
        assert_eq!(po.quantity_liters, 0.01);
        assert_eq!(po.product, "diesel");
        assert_eq!(po.plate_number, "ABC 123");
        assert!(Uuid::parse_str(&po.id).is_ok());

        let bad = ManualPoForm {
            quantity_liters: "lots".into(),
            ..form
        };
        let errors = validate_manual_po(&bad).expect_err("bad quantity");
        assert_eq!(errors.get("quantity_liters"), Some(&"Must be a number"));
    }
}

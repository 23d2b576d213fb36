//! Pump inventory arithmetic and numeric input rules.
//!
//! Two conventions apply and must not be mixed:
//! - tank inventory draws down: `ending = max(0, beginning - dispensed)`
//! - meters and registers accumulate: `ending = start + dispensed`
//!
//! where `dispensed = calibration + po + cash`.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

// ---------------------------------------------------------------------------
// Lenient numbers
// ---------------------------------------------------------------------------

/// Read a number the way the function host sends them: JSON numbers, or
/// strings with thousands separators. Anything unreadable is 0.
pub fn to_num(v: &Value) -> f64 {
    match v {
        Value::Number(n) => n.as_f64().filter(|f| f.is_finite()).unwrap_or(0.0),
        Value::String(s) => parse_num_str(s).unwrap_or(0.0),
        _ => 0.0,
    }
}

fn parse_num_str(s: &str) -> Option<f64> {
    let cleaned = s.replace(',', "");
    let trimmed = cleaned.trim();
    if trimmed.is_empty() {
        return Some(0.0);
    }
    trimmed.parse::<f64>().ok().filter(|f| f.is_finite())
}

/// Serde adapter for [`to_num`].
pub fn lenient_f64<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    let v = Value::deserialize(deserializer)?;
    Ok(to_num(&v))
}

/// Like [`lenient_f64`] but keeps "absent" (`null`) distinct from zero.
pub fn lenient_opt_f64<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let v = Value::deserialize(deserializer)?;
    Ok(match v {
        Value::Null => None,
        other => Some(to_num(&other)),
    })
}

/// Liters typed into an entry form. Text goes through the two-decimal
/// input rules; numbers are taken as sent; `null` means not entered.
pub fn entered_liters<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let v = Value::deserialize(deserializer)?;
    Ok(match v {
        Value::Null => None,
        Value::String(s) => Some(finalize_two_decimals(&s).parse().unwrap_or(0.0)),
        other => Some(to_num(&other)),
    })
}

/// Accept either a JSON string or number as text (pump ids arrive as both).
pub fn lenient_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let v = Value::deserialize(deserializer)?;
    Ok(match v {
        Value::String(s) => s,
        Value::Null => String::new(),
        other => other.to_string(),
    })
}

pub fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

pub fn non_negative(v: f64) -> f64 {
    v.max(0.0)
}

// ---------------------------------------------------------------------------
// Two-decimal text input
// ---------------------------------------------------------------------------

/// Sanitise a liters field while it is being typed: digits and one dot, at
/// most two fraction digits, no leading zeros. A trailing dot is kept so the
/// user can keep typing.
pub fn clean_two_decimals(raw: &str) -> String {
    if raw.is_empty() {
        return String::new();
    }

    let mut seen_dot = false;
    let kept: String = raw
        .chars()
        .filter(|c| {
            if c.is_ascii_digit() {
                true
            } else if *c == '.' && !seen_dot {
                seen_dot = true;
                true
            } else {
                false
            }
        })
        .collect();

    let trailing_dot = kept.ends_with('.');
    let (int_part, frac_part) = match kept.split_once('.') {
        Some((i, f)) => (i, f),
        None => (kept.as_str(), ""),
    };

    let int = if kept.starts_with('.') {
        "0"
    } else {
        match int_part.trim_start_matches('0') {
            "" => "0",
            stripped => stripped,
        }
    };

    if trailing_dot {
        format!("{int}.")
    } else if !frac_part.is_empty() {
        let frac: String = frac_part.chars().take(2).collect();
        format!("{int}.{frac}")
    } else {
        int.to_string()
    }
}

/// Final form of a liters field once editing ends, always two decimals.
pub fn finalize_two_decimals(raw: &str) -> String {
    let mut v = clean_two_decimals(raw);
    if v.is_empty() || v == "." {
        v = "0".into();
    }
    if v.ends_with('.') {
        v.pop();
    }
    match v.parse::<f64>() {
        Ok(n) if n.is_finite() => format!("{n:.2}"),
        _ => "0.00".into(),
    }
}

/// Keep only ASCII digits, at most `max` of them.
pub fn digits_only(raw: &str, max: usize) -> String {
    raw.chars().filter(char::is_ascii_digit).take(max).collect()
}

/// Normalise a purchase-order quantity: clamp into `[min, max]` and render
/// with at most two decimals and no trailing zeros. Empty input stays
/// empty; text that is not a number is returned unchanged.
pub fn normalize_quantity(raw: &str, min: Option<f64>, max: Option<f64>) -> String {
    if raw.is_empty() {
        return String::new();
    }
    let Ok(n) = raw.trim().parse::<f64>() else {
        return raw.to_string();
    };
    if n.is_nan() {
        return raw.to_string();
    }
    let mut clamped = n;
    if let Some(lo) = min {
        clamped = clamped.max(lo);
    }
    if let Some(hi) = max {
        clamped = clamped.min(hi);
    }
    format!("{}", round2(clamped))
}

// ---------------------------------------------------------------------------
// Pump inventory
// ---------------------------------------------------------------------------

/// Latest inventory reading for one pump, as returned by the function host.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct PumpInventoryRecord {
    #[serde(deserialize_with = "lenient_string")]
    pub id: String,
    #[serde(deserialize_with = "lenient_string")]
    pub created_at: String,
    #[serde(deserialize_with = "lenient_string")]
    pub location: String,
    #[serde(deserialize_with = "lenient_string")]
    pub date: String,
    #[serde(deserialize_with = "lenient_string")]
    pub dispenser_name: String,
    #[serde(deserialize_with = "lenient_string")]
    pub pump_id: String,
    #[serde(deserialize_with = "lenient_string")]
    pub pump_name: String,
    #[serde(deserialize_with = "lenient_string")]
    pub product: String,
    #[serde(deserialize_with = "lenient_string")]
    pub unit: String,
    #[serde(deserialize_with = "lenient_f64")]
    pub price: f64,
    #[serde(deserialize_with = "lenient_f64")]
    pub beginning_inventory: f64,
    #[serde(deserialize_with = "lenient_f64")]
    pub calibration: f64,
    #[serde(deserialize_with = "lenient_f64")]
    pub po: f64,
    #[serde(deserialize_with = "lenient_f64")]
    pub cash: f64,
    #[serde(deserialize_with = "lenient_f64")]
    pub ending_inventory: f64,
    #[serde(deserialize_with = "lenient_f64")]
    pub starting_liter_meter: f64,
    #[serde(deserialize_with = "lenient_f64")]
    pub ending_liter_meter: f64,
    pub next_date: Option<String>,
    pub is_matching_today: Option<bool>,
}

/// Liters entered for a new reading. `None` keeps the latest record's value.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct DispensedInput {
    #[serde(deserialize_with = "entered_liters")]
    pub calibration: Option<f64>,
    #[serde(deserialize_with = "entered_liters")]
    pub po: Option<f64>,
    #[serde(deserialize_with = "entered_liters")]
    pub cash: Option<f64>,
    pub cashier_employee_number: Option<String>,
    pub pump_attendant_employee_number: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq)]
pub struct LiterBreakdown {
    pub calibration: f64,
    pub po: f64,
    pub cash: f64,
}

impl LiterBreakdown {
    pub fn total(&self) -> f64 {
        self.calibration + self.po + self.cash
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ComputedTotals {
    pub beginning_inventory_liters: f64,
    pub ending_inventory_liters: f64,
    pub starting_liter_meter: f64,
    pub ending_liter_meter: f64,
    pub amounts_php: LiterBreakdown,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct PumpInventoryComputation {
    pub pump_id: String,
    pub location: String,
    pub date: String,
    pub price_per_liter: f64,
    pub inputs_liters: LiterBreakdown,
    pub computed: ComputedTotals,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cashier_employee_number: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pump_attendant_employee_number: Option<String>,
}

fn non_empty(v: &Option<String>) -> Option<String> {
    v.as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// Derive ending inventory, ending meter and peso amounts for a new reading.
pub fn compute_pump_inventory(
    record: &PumpInventoryRecord,
    input: &DispensedInput,
) -> PumpInventoryComputation {
    let liters = LiterBreakdown {
        calibration: non_negative(input.calibration.unwrap_or(record.calibration)),
        po: non_negative(input.po.unwrap_or(record.po)),
        cash: non_negative(input.cash.unwrap_or(record.cash)),
    };
    let price = record.price;
    let dispensed = liters.total();

    let ending_inventory = non_negative(record.beginning_inventory - dispensed);
    let ending_meter = record.starting_liter_meter + dispensed;

    PumpInventoryComputation {
        pump_id: record.pump_id.clone(),
        location: record.location.clone(),
        date: record.date.clone(),
        price_per_liter: price,
        inputs_liters: LiterBreakdown {
            calibration: round2(liters.calibration),
            po: round2(liters.po),
            cash: round2(liters.cash),
        },
        computed: ComputedTotals {
            beginning_inventory_liters: round2(record.beginning_inventory),
            ending_inventory_liters: round2(ending_inventory),
            starting_liter_meter: round2(record.starting_liter_meter),
            ending_liter_meter: round2(ending_meter),
            amounts_php: LiterBreakdown {
                calibration: round2(price * liters.calibration),
                po: round2(price * liters.po),
                cash: round2(price * liters.cash),
            },
        },
        cashier_employee_number: non_empty(&input.cashier_employee_number),
        pump_attendant_employee_number: non_empty(&input.pump_attendant_employee_number),
    }
}

/// Liters dispensed according to the meter; a meter that went backwards
/// reads as nothing dispensed.
pub fn dispensed_by_meter(starting_meter: f64, ending_meter: f64) -> f64 {
    non_negative(ending_meter - starting_meter)
}

// ---------------------------------------------------------------------------
// Registers
// ---------------------------------------------------------------------------

/// Register values after a shift. Price, PO and cash are clamped at zero;
/// calibration is taken as entered.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RegisterTotals {
    pub calibration: f64,
    pub price: f64,
    pub po: f64,
    pub cash: f64,
    pub ending_register: f64,
    pub analog_register: f64,
}

pub fn register_totals(
    beginning_register: f64,
    calibration: f64,
    price: f64,
    po: f64,
    cash: f64,
    base_analog: f64,
) -> RegisterTotals {
    let price = non_negative(price);
    let po = non_negative(po);
    let cash = non_negative(cash);
    let delta = calibration + po + cash;
    RegisterTotals {
        calibration,
        price,
        po,
        cash,
        ending_register: beginning_register + delta,
        analog_register: base_analog + delta,
    }
}

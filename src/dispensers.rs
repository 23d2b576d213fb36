//! Dispenser listings and the per-session register rows.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use tracing::warn;

use crate::addstocks::EjsonDate;
use crate::format;
use crate::inventory::{self, lenient_opt_f64, lenient_string};

// ---------------------------------------------------------------------------
// Latest inventories by location
// ---------------------------------------------------------------------------

/// The slice of a pump's latest reading shown on the dispenser list.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct LatestInventory {
    #[serde(deserialize_with = "lenient_opt_f64")]
    pub price: Option<f64>,
    #[serde(deserialize_with = "lenient_opt_f64")]
    pub ending_inventory: Option<f64>,
    pub date: Option<EjsonDate>,
    pub pump_name: Option<String>,
    pub product: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct Pump {
    #[serde(deserialize_with = "lenient_string")]
    pub id: String,
    #[serde(deserialize_with = "lenient_string")]
    pub name: String,
    pub latest_inventory: Option<LatestInventory>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct Dispenser {
    #[serde(deserialize_with = "lenient_string")]
    pub id: String,
    #[serde(deserialize_with = "lenient_string")]
    pub name: String,
    #[serde(deserialize_with = "lenient_string")]
    pub location: String,
    #[serde(deserialize_with = "lenient_pumps")]
    pub pumps: Vec<Pump>,
}

/// `null` or a non-array reads as no pumps; malformed pumps are skipped.
fn lenient_pumps<'de, D>(deserializer: D) -> Result<Vec<Pump>, D::Error>
where
    D: Deserializer<'de>,
{
    let pumps = match Value::deserialize(deserializer)? {
        Value::Array(items) => items
            .into_iter()
            .filter_map(|item| match serde_json::from_value(item) {
                Ok(pump) => Some(pump),
                Err(e) => {
                    warn!("Skipping malformed pump entry: {e}");
                    None
                }
            })
            .collect(),
        Value::Null => Vec::new(),
        other => {
            warn!("Expected a pump list, got a {}", json_kind(&other));
            Vec::new()
        }
    };
    Ok(pumps)
}

/// Read the upstream listing. Anything but an array is an empty list, and
/// entries that do not look like dispensers are skipped with a warning.
pub fn parse_dispenser_list(value: Value) -> Vec<Dispenser> {
    match value {
        Value::Array(items) => items
            .into_iter()
            .filter_map(|item| match serde_json::from_value(item) {
                Ok(dispenser) => Some(dispenser),
                Err(e) => {
                    warn!("Skipping malformed dispenser entry: {e}");
                    None
                }
            })
            .collect(),
        other => {
            warn!("Expected a dispenser list, got a {}", json_kind(&other));
            Vec::new()
        }
    }
}

fn json_kind(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct PumpCard {
    pub id: String,
    pub name: String,
    pub product: Option<String>,
    pub price: String,
    pub ending_inventory: String,
    pub date: String,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct DispenserCard {
    pub id: String,
    pub name: String,
    pub location: String,
    pub pumps: Vec<PumpCard>,
}

impl From<&Pump> for PumpCard {
    fn from(p: &Pump) -> Self {
        let latest = p.latest_inventory.clone().unwrap_or_default();
        Self {
            id: p.id.clone(),
            name: latest.pump_name.clone().unwrap_or_else(|| p.name.clone()),
            product: latest.product.clone(),
            price: format::price_per_liter(latest.price.unwrap_or(0.0)),
            ending_inventory: format::liters(latest.ending_inventory.unwrap_or(0.0)),
            date: latest
                .date
                .as_ref()
                .map(|d| format::manila_date(d.as_str()))
                .unwrap_or_default(),
        }
    }
}

/// Listing with display strings filled in.
pub fn dispenser_cards(dispensers: &[Dispenser]) -> Vec<DispenserCard> {
    dispensers
        .iter()
        .map(|d| DispenserCard {
            id: d.id.clone(),
            name: d.name.clone(),
            location: d.location.clone(),
            pumps: d.pumps.iter().map(PumpCard::from).collect(),
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Register rows
// ---------------------------------------------------------------------------

struct NozzleSpec {
    id: &'static str,
    product: &'static str,
    price: f64,
}

struct DispenserSpec {
    id: &'static str,
    side: &'static str,
    nozzles: [NozzleSpec; 2],
}

static DISPENSERS: [DispenserSpec; 2] = [
    DispenserSpec {
        id: "dispenser_1",
        side: "East",
        nozzles: [
            NozzleSpec { id: "nozzle_1", product: "Diesel", price: 68.5 },
            NozzleSpec { id: "nozzle_2", product: "Regular", price: 65.0 },
        ],
    },
    DispenserSpec {
        id: "dispenser_2",
        side: "West",
        nozzles: [
            NozzleSpec { id: "nozzle_1", product: "Diesel", price: 68.5 },
            NozzleSpec { id: "nozzle_2", product: "Regular", price: 65.0 },
        ],
    },
];

/// One nozzle's register readings for the shift.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RegisterRow {
    pub dispenser: String,
    pub nozzle: String,
    pub side: String,
    pub date: String,
    pub beginning_register: f64,
    pub ending_register: f64,
    pub analog_register: f64,
    pub calibration: f64,
    pub price: f64,
    pub po: f64,
    pub cash: f64,
    pub product_label: String,
    pub unit: String,
    pub submitted: bool,
    /// Analog counter reading the shift started from.
    pub base_analog: f64,
}

/// Fields a page may change on a row. Absent fields keep their value.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RegisterPatch {
    pub date: Option<String>,
    #[serde(deserialize_with = "lenient_opt_f64")]
    pub beginning_register: Option<f64>,
    #[serde(deserialize_with = "lenient_opt_f64")]
    pub calibration: Option<f64>,
    #[serde(deserialize_with = "lenient_opt_f64")]
    pub price: Option<f64>,
    #[serde(deserialize_with = "lenient_opt_f64")]
    pub po: Option<f64>,
    #[serde(deserialize_with = "lenient_opt_f64")]
    pub cash: Option<f64>,
}

fn product_label(dispenser: &str, product: &str) -> String {
    format!("{} — {product}", dispenser.to_uppercase().replacen('_', " ", 1))
}

/// Fresh rows for a shift starting on `now`'s UTC date.
pub fn initial_register_rows(now: &DateTime<Utc>) -> Vec<RegisterRow> {
    let date = now.format("%Y-%m-%d").to_string();
    DISPENSERS
        .iter()
        .flat_map(|d| {
            let date = date.clone();
            d.nozzles.iter().map(move |n| {
                let totals = inventory::register_totals(0.0, 0.0, n.price, 0.0, 0.0, 0.0);
                RegisterRow {
                    dispenser: d.id.to_string(),
                    nozzle: n.id.to_string(),
                    side: d.side.to_string(),
                    date: date.clone(),
                    beginning_register: 0.0,
                    ending_register: totals.ending_register,
                    analog_register: totals.analog_register,
                    calibration: totals.calibration,
                    price: totals.price,
                    po: totals.po,
                    cash: totals.cash,
                    product_label: product_label(d.id, n.product),
                    unit: "L".into(),
                    submitted: true,
                    base_analog: 0.0,
                }
            })
        })
        .collect()
}

impl RegisterRow {
    pub fn key(&self) -> String {
        format!("{}::{}", self.dispenser, self.nozzle)
    }

    /// Apply `patch` and recompute the ending and analog registers.
    pub fn apply_patch(&mut self, patch: &RegisterPatch) {
        if let Some(date) = patch.date.as_deref().filter(|d| !d.trim().is_empty()) {
            self.date = date.to_string();
        }
        let totals = inventory::register_totals(
            patch.beginning_register.unwrap_or(self.beginning_register),
            patch.calibration.unwrap_or(self.calibration),
            patch.price.unwrap_or(self.price),
            patch.po.unwrap_or(self.po),
            patch.cash.unwrap_or(self.cash),
            self.base_analog,
        );
        self.beginning_register = patch.beginning_register.unwrap_or(self.beginning_register);
        self.calibration = totals.calibration;
        self.price = totals.price;
        self.po = totals.po;
        self.cash = totals.cash;
        self.ending_register = totals.ending_register;
        self.analog_register = totals.analog_register;
        self.submitted = true;
    }
}

/// Index of pump `number` (1-based) in `rows`.
pub fn pump_index(rows: &[RegisterRow], number: usize) -> Option<usize> {
    (1..=rows.len()).contains(&number).then(|| number - 1)
}

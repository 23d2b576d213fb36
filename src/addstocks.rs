//! Fuel deliveries ("add-stocks") and their summary.

use chrono::{DateTime, Datelike, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::format;
use crate::inventory::{lenient_f64, lenient_string};

/// Dates arrive either as plain strings or as extended-JSON `{"$date": ...}`.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(untagged)]
pub enum EjsonDate {
    Wrapped {
        #[serde(rename = "$date")]
        date: String,
    },
    Plain(String),
}

impl EjsonDate {
    pub fn as_str(&self) -> &str {
        match self {
            EjsonDate::Wrapped { date } => date,
            EjsonDate::Plain(s) => s,
        }
    }

    pub fn parsed(&self) -> Option<DateTime<Utc>> {
        format::parse_timestamp(self.as_str())
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct AddStockItem {
    #[serde(default, deserialize_with = "lenient_string")]
    pub product: String,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub quantity: f64,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct AddStock {
    #[serde(default, deserialize_with = "lenient_string")]
    pub id: String,
    pub date: Option<EjsonDate>,
    #[serde(default)]
    pub items: Vec<AddStockItem>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub creator_employee_number: String,
    pub created: Option<EjsonDate>,
}

impl AddStock {
    /// Quantity of the first line for `product`, or 0.
    pub fn quantity_of(&self, product: &str) -> f64 {
        self.items
            .iter()
            .find(|i| i.product == product)
            .map(|i| i.quantity)
            .unwrap_or(0.0)
    }

    fn sort_key(&self) -> i64 {
        self.date
            .as_ref()
            .and_then(EjsonDate::parsed)
            .map(|d| d.timestamp_millis())
            .unwrap_or(i64::MIN)
    }
}

/// Relative wording for a date seen from `now`, counted in Manila calendar
/// days: days within a month, then months up to two years, then years.
pub fn humanize(when: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let tz = format::manila();
    let when = when.with_timezone(&tz).date_naive();
    let today = now.with_timezone(&tz).date_naive();

    let days = (when - today).num_days();
    if days.abs() <= 31 {
        return relative(days, "day", "today", "yesterday", "tomorrow");
    }

    let months = (today.year() - when.year()) as i64 * 12 + (today.month() as i64 - when.month() as i64);
    if months.abs() <= 24 {
        return relative(-months, "month", "this month", "last month", "next month");
    }

    let years = (today.year() - when.year()) as i64;
    relative(-years, "year", "this year", "last year", "next year")
}

fn relative(n: i64, unit: &str, zero: &str, minus_one: &str, plus_one: &str) -> String {
    match n {
        0 => zero.to_string(),
        -1 => minus_one.to_string(),
        1 => plus_one.to_string(),
        n if n < 0 => format!("{} {unit}s ago", -n),
        n => format!("in {n} {unit}s"),
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct AddStockRow {
    pub id: String,
    pub short_id: String,
    pub date: String,
    pub date_relative: String,
    pub items: Vec<AddStockItem>,
    pub creator_employee_number: String,
    pub created: String,
    pub created_relative: String,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct AddStockSummary {
    pub count: usize,
    pub diesel_total_liters: f64,
    pub regular_total_liters: f64,
    pub items: Vec<AddStockRow>,
}

fn display_date(d: Option<&EjsonDate>) -> String {
    d.and_then(|d| format::manila_short_date(d.as_str()))
        .unwrap_or_else(|| "—".to_string())
}

fn display_relative(d: Option<&EjsonDate>, now: DateTime<Utc>) -> String {
    d.and_then(EjsonDate::parsed)
        .map(|when| humanize(when, now))
        .unwrap_or_else(|| "—".to_string())
}

/// Build the summary from the `get-all` reply
/// (`{ok, count, items: [...]}`). Deliveries that fail to parse are dropped.
pub fn summarize(reply: &Value, now: DateTime<Utc>) -> AddStockSummary {
    let mut stocks: Vec<AddStock> = reply
        .get("items")
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(|i| serde_json::from_value(i.clone()).ok())
                .collect()
        })
        .unwrap_or_default();
    stocks.sort_by_key(|s| std::cmp::Reverse(s.sort_key()));

    let diesel = stocks.iter().map(|s| s.quantity_of("diesel")).sum();
    let regular = stocks.iter().map(|s| s.quantity_of("regular")).sum();

    let count = reply
        .get("count")
        .and_then(Value::as_u64)
        .filter(|c| *c > 0)
        .map(|c| c as usize)
        .unwrap_or(stocks.len());

    let items = stocks
        .into_iter()
        .map(|s| AddStockRow {
            short_id: s.id.chars().take(8).collect(),
            date: display_date(s.date.as_ref()),
            date_relative: display_relative(s.date.as_ref(), now),
            created: display_date(s.created.as_ref()),
            created_relative: display_relative(s.created.as_ref(), now),
            id: s.id,
            items: s.items,
            creator_employee_number: s.creator_employee_number,
        })
        .collect();

    AddStockSummary {
        count,
        diesel_total_liters: diesel,
        regular_total_liters: regular,
        items,
    }
}

/// Whether a `get-all` reply reports success.
pub fn reply_ok(reply: &Value) -> bool {
    reply.get("ok").and_then(Value::as_bool).unwrap_or(false)
}

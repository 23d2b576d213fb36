//! Per-nozzle sales tables.

use serde::{Deserialize, Serialize};

use crate::dispensers::RegisterRow;
use crate::format;
use crate::inventory::lenient_f64;

/// One nozzle's shift figures, in liters and pesos per liter.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct NozzleSales {
    pub dispenser: String,
    #[serde(deserialize_with = "lenient_f64")]
    pub beginning_register: f64,
    #[serde(deserialize_with = "lenient_f64")]
    pub calibration: f64,
    #[serde(deserialize_with = "lenient_f64")]
    pub po: f64,
    #[serde(deserialize_with = "lenient_f64")]
    pub cash: f64,
    #[serde(deserialize_with = "lenient_f64")]
    pub price: f64,
    #[serde(deserialize_with = "lenient_f64")]
    pub ending_register: f64,
    #[serde(deserialize_with = "lenient_f64")]
    pub analog_register: f64,
}

impl From<&RegisterRow> for NozzleSales {
    fn from(row: &RegisterRow) -> Self {
        Self {
            dispenser: row.product_label.clone(),
            beginning_register: row.beginning_register,
            calibration: row.calibration,
            po: row.po,
            cash: row.cash,
            price: row.price,
            ending_register: row.ending_register,
            analog_register: row.analog_register,
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct SalesLine {
    pub desc: &'static str,
    /// `None` on the price line, which has no liters.
    pub liters: Option<f64>,
    pub liters_display: String,
    pub amount: f64,
    pub amount_display: String,
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ProductTone {
    Regular,
    Diesel,
    Other,
}

impl ProductTone {
    fn of(title: &str) -> Self {
        let t = title.to_lowercase();
        if t.contains("regular") {
            ProductTone::Regular
        } else if t.contains("diesel") {
            ProductTone::Diesel
        } else {
            ProductTone::Other
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct SalesTable {
    pub title: String,
    pub tone: ProductTone,
    pub submitted: bool,
    pub lines: Vec<SalesLine>,
}

fn liter_line(desc: &'static str, liters: f64, price: f64) -> SalesLine {
    let amount = liters * price;
    SalesLine {
        desc,
        liters: Some(liters),
        liters_display: format::number(liters),
        amount,
        amount_display: format::peso_spaced(amount),
    }
}

pub fn build_lines(n: &NozzleSales) -> Vec<SalesLine> {
    let sold = n.po + n.cash;
    vec![
        SalesLine {
            desc: "Price (₱/L)",
            liters: None,
            liters_display: "-".into(),
            amount: n.price,
            amount_display: format::peso_spaced(n.price),
        },
        liter_line("Beginning Register", n.beginning_register, n.price),
        liter_line("Calibration", n.calibration, n.price),
        liter_line("PO", n.po, n.price),
        liter_line("Cash", n.cash, n.price),
        liter_line("Sold (PO + Cash)", sold, n.price),
        liter_line("Ending Register", n.ending_register, n.price),
        liter_line("Analog Register", n.analog_register, n.price),
    ]
}

pub fn sales_tables(nozzles: &[NozzleSales]) -> Vec<SalesTable> {
    nozzles
        .iter()
        .map(|n| SalesTable {
            title: n.dispenser.clone(),
            tone: ProductTone::of(&n.dispenser),
            submitted: true,
            lines: build_lines(n),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispensers::initial_register_rows;
    use chrono::Utc;

    fn regular() -> NozzleSales {
        NozzleSales {
            dispenser: "Dispenser A — Regular".into(),
            beginning_register: 1200.0,
            calibration: 0.0,
            po: 100.0,
            cash: 200.0,
            price: 65.0,
            ending_register: 1500.0,
            analog_register: 1502.0,
        }
    }

    #[test]
    fn lines_follow_the_sheet_order() {
        let lines = build_lines(&regular());
        let descs: Vec<&str> = lines.iter().map(|l| l.desc).collect();
        assert_eq!(
            descs,
            vec![
                "Price (₱/L)",
                "Beginning Register",
                "Calibration",
                "PO",
                "Cash",
                "Sold (PO + Cash)",
                "Ending Register",
                "Analog Register"
            ]
        );
        assert_eq!(lines[0].liters_display, "-");
        assert_eq!(lines[0].amount_display, "₱ 65.00");
        assert_eq!(lines[5].liters, Some(300.0));
        assert_eq!(lines[5].amount, 19500.0);
        assert_eq!(lines[6].amount_display, "₱ 97,500.00");
        assert_eq!(lines[1].liters_display, "1,200");
    }

    #[test]
    fn tone_follows_the_product_in_the_title() {
        let mut diesel = regular();
        diesel.dispenser = "Dispenser A — Diesel".into();
        let tables = sales_tables(&[regular(), diesel]);
        assert_eq!(tables[0].tone, ProductTone::Regular);
        assert_eq!(tables[1].tone, ProductTone::Diesel);
        assert!(tables.iter().all(|t| t.submitted));
    }

    #[test]
    fn register_rows_feed_the_tables() {
        let rows = initial_register_rows(&Utc::now());
        let nozzles: Vec<NozzleSales> = rows.iter().map(NozzleSales::from).collect();
        let tables = sales_tables(&nozzles);
        assert_eq!(tables.len(), 4);
        assert_eq!(tables[0].title, "DISPENSER 1 — Diesel");
        assert_eq!(tables[0].lines[0].amount, 68.5);
    }
}

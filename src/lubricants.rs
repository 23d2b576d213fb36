//! Lubricant catalog and the per-session lubricant register.

use serde::{Deserialize, Serialize};

use crate::format;
use crate::inventory::{lenient_opt_f64, non_negative};

const QUICK_PICK: usize = 3;

/// (name, beginning inventory, price per liter)
const CATALOG: [(&str, f64, f64); 10] = [
    ("Shell Helix 10W-40", 120.0, 380.0),
    ("Shell Advance 4T 15W-50", 90.0, 420.0),
    ("Shell Helix 5W-30", 75.0, 450.0),
    ("Shell Rimula R4X 15W-40", 60.0, 510.0),
    ("Shell Advance AX7 10W-40", 80.0, 395.0),
    ("Shell Advance Ultra 5W-40", 40.0, 690.0),
    ("Shell Helix HX7 10W-40", 110.0, 420.0),
    ("Shell Helix HX5 15W-40", 95.0, 360.0),
    ("Shell Advance 4T AX5 20W-50", 85.0, 310.0),
    ("Shell Advance Long Ride 10W-40", 55.0, 520.0),
];

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Lubricant {
    pub name: String,
    pub unit: String,
    pub beginning_inventory: f64,
    pub addstock: f64,
    pub po: f64,
    pub cash: f64,
    pub price: f64,
}

impl Lubricant {
    pub fn sold(&self) -> f64 {
        non_negative(self.po + self.cash)
    }

    pub fn ending(&self) -> f64 {
        non_negative(self.beginning_inventory + self.addstock - self.sold())
    }
}

pub fn catalog() -> Vec<Lubricant> {
    CATALOG
        .iter()
        .map(|(name, beginning, price)| Lubricant {
            name: (*name).to_string(),
            unit: "L".into(),
            beginning_inventory: *beginning,
            addstock: 0.0,
            po: 0.0,
            cash: 0.0,
            price: *price,
        })
        .collect()
}

#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SelectionPreset {
    Clear,
    Quick3,
    All,
}

/// Body of a selection change: a preset, explicit names, or both (the
/// preset applies first).
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SelectionRequest {
    pub preset: Option<SelectionPreset>,
    pub names: Option<Vec<String>>,
}

/// Edit of one lubricant line. Values are clamped at zero.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct LubricantPatch {
    #[serde(deserialize_with = "lenient_opt_f64")]
    pub addstock: Option<f64>,
    #[serde(deserialize_with = "lenient_opt_f64")]
    pub po: Option<f64>,
    #[serde(deserialize_with = "lenient_opt_f64")]
    pub cash: Option<f64>,
    #[serde(deserialize_with = "lenient_opt_f64")]
    pub price: Option<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LubricantRegister {
    rows: Vec<Lubricant>,
    selected: Vec<String>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct LubricantLine {
    #[serde(flatten)]
    pub item: Lubricant,
    pub sold: f64,
    pub ending: f64,
    pub cash_sales: f64,
    pub ending_value: f64,
    pub cash_sales_display: String,
    pub ending_value_display: String,
    pub price_display: String,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct LubricantView {
    pub selected_count: usize,
    pub catalog_count: usize,
    pub catalog: Vec<String>,
    pub selected: Vec<String>,
    pub rows: Vec<LubricantLine>,
}

impl Default for LubricantRegister {
    fn default() -> Self {
        Self::new()
    }
}

impl LubricantRegister {
    pub fn new() -> Self {
        let rows = catalog();
        let selected = rows.iter().take(QUICK_PICK).map(|r| r.name.clone()).collect();
        Self { rows, selected }
    }

    pub fn apply_preset(&mut self, preset: SelectionPreset) {
        let names = self.rows.iter().map(|r| r.name.clone());
        self.selected = match preset {
            SelectionPreset::Clear => Vec::new(),
            SelectionPreset::Quick3 => names.take(QUICK_PICK).collect(),
            SelectionPreset::All => names.collect(),
        };
    }

    /// Replace the selection. Names not in the catalog are returned and the
    /// selection is left untouched.
    pub fn select(&mut self, names: &[String]) -> Result<(), Vec<String>> {
        let unknown: Vec<String> = names
            .iter()
            .filter(|n| !self.rows.iter().any(|r| &r.name == *n))
            .cloned()
            .collect();
        if !unknown.is_empty() {
            return Err(unknown);
        }
        let mut selected: Vec<String> = Vec::with_capacity(names.len());
        for n in names {
            if !selected.contains(n) {
                selected.push(n.clone());
            }
        }
        self.selected = selected;
        Ok(())
    }

    /// Apply `patch` to the named line. `None` when the name is unknown.
    pub fn update(&mut self, name: &str, patch: &LubricantPatch) -> Option<&Lubricant> {
        let row = self.rows.iter_mut().find(|r| r.name == name)?;
        if let Some(v) = patch.addstock {
            row.addstock = non_negative(v);
        }
        if let Some(v) = patch.po {
            row.po = non_negative(v);
        }
        if let Some(v) = patch.cash {
            row.cash = non_negative(v);
        }
        if let Some(v) = patch.price {
            row.price = non_negative(v);
        }
        Some(row)
    }

    /// Selected lines in catalog order.
    pub fn view(&self) -> LubricantView {
        let rows = self
            .rows
            .iter()
            .filter(|r| self.selected.contains(&r.name))
            .map(|r| {
                let cash_sales = r.cash * r.price;
                let ending_value = r.ending() * r.price;
                LubricantLine {
                    item: r.clone(),
                    sold: r.sold(),
                    ending: r.ending(),
                    cash_sales,
                    ending_value,
                    cash_sales_display: format::peso_spaced(cash_sales),
                    ending_value_display: format::peso_spaced(ending_value),
                    price_display: format::peso_spaced(r.price),
                }
            })
            .collect();
        LubricantView {
            selected_count: self.selected.len(),
            catalog_count: self.rows.len(),
            catalog: self.rows.iter().map(|r| r.name.clone()).collect(),
            selected: self.selected.clone(),
            rows,
        }
    }
}

//! Environment-driven service configuration.
//!
//! Every setting has a default so a bare `cargo run` talks to the production
//! function host. Values can also come from a `.env` file, loaded in
//! [`crate::run`] before [`Config::load`] is called.

use std::env;
use std::fmt::Display;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use tracing::{info, warn};

use crate::api::{normalize_base_url, DEFAULT_TIMEOUT};

/// Station namespace: dispensers, pumps, pump inventories and add-stocks.
pub const DEFAULT_STATION_API_URL: &str =
    "https://faas-sgp1-18bc02ac.doserverless.co/api/v1/web/fn-d2428264-d75d-40c6-9c56-b265528c57f9";

/// Back-office namespace: employees and purchase orders.
pub const DEFAULT_BACKOFFICE_API_URL: &str =
    "https://faas-sgp1-18bc02ac.doserverless.co/api/v1/web/fn-86217a9f-1135-4904-b49a-fe070d4e10c7";

const DEFAULT_ALLOWED_LOCATIONS: &str = "loboc,sikatuna";

#[derive(Debug, Clone)]
pub struct Config {
    pub bind_addr: String,
    pub station_api_url: String,
    pub backoffice_api_url: String,
    /// Full URL override for the dispensers-by-location function.
    pub dispensers_api_url: Option<String>,
    /// Where submitted pump inventories are forwarded. Unset means the
    /// submission is only journaled locally.
    pub pump_inventory_submit_url: Option<String>,
    pub upstream_timeout: Duration,
    pub employee_lookup_timeout: Duration,
    pub data_dir: PathBuf,
    pub log_dir: PathBuf,
    pub users_file: Option<PathBuf>,
    pub allowed_locations: Vec<String>,
}

impl Config {
    pub fn load() -> Result<Self, String> {
        let data_dir: PathBuf = optional_var("ERP_DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(default_data_dir);
        let log_dir = optional_var("ERP_LOG_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| data_dir.join("logs"));

        Ok(Self {
            bind_addr: try_load("ERP_BIND_ADDR", "0.0.0.0:3000")?,
            station_api_url: normalize_base_url(&try_load::<String>(
                "STATION_API_URL",
                DEFAULT_STATION_API_URL,
            )?),
            backoffice_api_url: normalize_base_url(&try_load::<String>(
                "BACKOFFICE_API_URL",
                DEFAULT_BACKOFFICE_API_URL,
            )?),
            dispensers_api_url: optional_var("DISPENSERS_API_URL"),
            pump_inventory_submit_url: optional_var("PUMP_INVENTORY_SUBMIT_URL"),
            upstream_timeout: Duration::from_secs(try_load(
                "UPSTREAM_TIMEOUT_SECS",
                &DEFAULT_TIMEOUT.as_secs().to_string(),
            )?),
            employee_lookup_timeout: Duration::from_secs(try_load(
                "EMPLOYEE_LOOKUP_TIMEOUT_SECS",
                "8",
            )?),
            data_dir,
            log_dir,
            users_file: optional_var("ERP_USERS_FILE").map(PathBuf::from),
            allowed_locations: parse_locations(&try_load::<String>(
                "ERP_ALLOWED_LOCATIONS",
                DEFAULT_ALLOWED_LOCATIONS,
            )?),
        })
    }

    /// A configuration pointing both upstream namespaces at `upstream`.
    #[cfg(test)]
    pub fn for_upstream(upstream: &str) -> Self {
        Self {
            bind_addr: "127.0.0.1:0".into(),
            station_api_url: normalize_base_url(upstream),
            backoffice_api_url: normalize_base_url(upstream),
            dispensers_api_url: None,
            pump_inventory_submit_url: None,
            upstream_timeout: Duration::from_secs(5),
            employee_lookup_timeout: Duration::from_secs(2),
            data_dir: PathBuf::from(":memory:"),
            log_dir: std::env::temp_dir(),
            users_file: None,
            allowed_locations: parse_locations(DEFAULT_ALLOWED_LOCATIONS),
        }
    }

    pub fn station_url(&self, function: &str) -> String {
        format!("{}/{function}", self.station_api_url)
    }

    pub fn backoffice_url(&self, function: &str) -> String {
        format!("{}/{function}", self.backoffice_api_url)
    }

    pub fn dispensers_by_location_url(&self) -> String {
        self.dispensers_api_url
            .clone()
            .unwrap_or_else(|| self.station_url("dispensers/get-by-location"))
    }
}

fn optional_var(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn try_load<T: FromStr>(key: &str, default: &str) -> Result<T, String>
where
    T::Err: Display,
{
    let raw = optional_var(key).unwrap_or_else(|| {
        info!("{key} not set, using default: {default}");
        default.to_string()
    });
    raw.parse().map_err(|e| {
        warn!("Invalid {key} value: {e}");
        format!("Invalid {key} value {raw:?}: {e}")
    })
}

fn parse_locations(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_lowercase())
        .filter(|s| !s.is_empty())
        .collect()
}

fn default_data_dir() -> PathBuf {
    env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            PathBuf::from(env::var("HOME").unwrap_or_else(|_| ".".into()))
                .join(".local")
                .join("share")
        })
        .join("gas-station-erp")
}

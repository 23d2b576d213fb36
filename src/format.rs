//! Display strings for pesos, liters and Asia/Manila dates.
//!
//! Pages render these verbatim, so the output mirrors the en-PH locale.

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, Offset, TimeZone, Utc};

/// Asia/Manila has no daylight saving; a fixed +08:00 is exact.
const MANILA_OFFSET_SECS: i32 = 8 * 3600;

pub fn manila() -> FixedOffset {
    FixedOffset::east_opt(MANILA_OFFSET_SECS).unwrap_or_else(|| Utc.fix())
}

fn group_thousands(int_digits: &str) -> String {
    let mut out = String::with_capacity(int_digits.len() + int_digits.len() / 3);
    for (i, ch) in int_digits.chars().enumerate() {
        if i > 0 && (int_digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}

/// Two fixed decimals with thousands separators, e.g. `1,234.50`.
pub fn amount(v: f64) -> String {
    if !v.is_finite() {
        return "0.00".into();
    }
    let fixed = format!("{:.2}", v.abs());
    let (int, frac) = fixed.split_once('.').unwrap_or((fixed.as_str(), "00"));
    let sign = if v < 0.0 && fixed != "0.00" { "-" } else { "" };
    format!("{sign}{}.{frac}", group_thousands(int))
}

/// Currency as the PHP locale prints it: `₱1,234.50`.
pub fn peso(v: f64) -> String {
    let a = amount(v);
    match a.strip_prefix('-') {
        Some(rest) => format!("-₱{rest}"),
        None => format!("₱{a}"),
    }
}

/// Table variant with a space after the sign: `₱ 1,234.50`.
pub fn peso_spaced(v: f64) -> String {
    format!("₱ {}", amount(v))
}

pub fn price_per_liter(v: f64) -> String {
    format!("{}/L", peso(v))
}

/// Liters with at most two decimals: `1,234.5 L`.
pub fn liters(v: f64) -> String {
    let a = amount(v);
    let trimmed = a.trim_end_matches('0').trim_end_matches('.');
    format!("{trimmed} L")
}

/// Plain number as the en-PH locale prints it: grouped, up to three
/// decimals, trailing zeros dropped.
pub fn number(v: f64) -> String {
    if !v.is_finite() {
        return "0".into();
    }
    let fixed = format!("{:.3}", v.abs());
    let (int, frac) = fixed.split_once('.').unwrap_or((fixed.as_str(), ""));
    let frac = frac.trim_end_matches('0');
    let sign = if v < 0.0 && (int != "0" || !frac.is_empty()) { "-" } else { "" };
    if frac.is_empty() {
        format!("{sign}{}", group_thousands(int))
    } else {
        format!("{sign}{}.{frac}", group_thousands(int))
    }
}

/// Parse the timestamps the function host emits. Strings without a zone
/// are UTC; a bare date is midnight UTC.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let s = raw.trim();
    if s.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    let iso = s.replacen(' ', "T", 1);
    if let Ok(dt) = DateTime::parse_from_rfc3339(&iso) {
        return Some(dt.with_timezone(&Utc));
    }
    for fmt in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(&iso, fmt) {
            return Some(Utc.from_utc_datetime(&naive));
        }
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| Utc.from_utc_datetime(&naive))
}

/// `MM/DD/YYYY` in Manila time; empty when the input is not a date.
pub fn manila_date(raw: &str) -> String {
    parse_timestamp(raw)
        .map(|dt| dt.with_timezone(&manila()).format("%m/%d/%Y").to_string())
        .unwrap_or_default()
}

/// `Oct 18, 2026` in Manila time.
pub fn manila_short_date(raw: &str) -> Option<String> {
    parse_timestamp(raw).map(|dt| dt.with_timezone(&manila()).format("%b %d, %Y").to_string())
}

/// `10/18/2026, 6:10 AM` in Manila time; the raw text when unparseable.
pub fn manila_datetime(raw: &str) -> String {
    match parse_timestamp(raw) {
        Some(dt) => dt
            .with_timezone(&manila())
            .format("%m/%d/%Y, %-I:%M %p")
            .to_string(),
        None => raw.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn amounts_are_grouped() {
        assert_eq!(amount(0.0), "0.00");
        assert_eq!(amount(1234.5), "1,234.50");
        assert_eq!(amount(1_000_000.0), "1,000,000.00");
        assert_eq!(amount(-42.1), "-42.10");
        assert_eq!(amount(f64::NAN), "0.00");
    }

    #[test]
    fn peso_variants() {
        assert_eq!(peso(68.5), "₱68.50");
        assert_eq!(peso(-3.0), "-₱3.00");
        assert_eq!(peso_spaced(19500.0), "₱ 19,500.00");
        assert_eq!(price_per_liter(65.0), "₱65.00/L");
    }

    #[test]
    fn liters_drop_trailing_zeros() {
        assert_eq!(liters(1234.5), "1,234.5 L");
        assert_eq!(liters(90.0), "90 L");
        assert_eq!(liters(0.25), "0.25 L");
    }

    #[test]
    fn plain_numbers() {
        assert_eq!(number(1500.0), "1,500");
        assert_eq!(number(0.1234), "0.123");
        assert_eq!(number(-2.5), "-2.5");
        assert_eq!(number(-0.0001), "0");
    }

    #[test]
    fn timestamps_without_zone_are_utc() {
        let dt = parse_timestamp("2026-10-17 22:10:00").expect("parses");
        assert_eq!(dt.to_rfc3339(), "2026-10-17T22:10:00+00:00");
        assert!(parse_timestamp("2026-10-17T22:10:00.123").is_some());
        assert!(parse_timestamp("2026-10-17T22:10:00+08:00").is_some());
        assert!(parse_timestamp("yesterday").is_none());
    }

    #[test]
    fn manila_rendering_crosses_midnight() {
        assert_eq!(manila_date("2026-10-17 22:10:00"), "10/18/2026");
        assert_eq!(manila_short_date("2026-10-17T17:00:00Z").as_deref(), Some("Oct 18, 2026"));
        assert_eq!(manila_datetime("2026-10-17 22:10:00"), "10/18/2026, 6:10 AM");
        assert_eq!(manila_datetime("n/a"), "n/a");
        assert_eq!(manila_date(""), "");
    }
}

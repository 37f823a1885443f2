//! Value conversions shared by the spreadsheet exporter and the legacy adapter.

use std::sync::OnceLock;

use chrono::{DateTime, NaiveDate};
use regex::Regex;

const MONTH_NAMES: [&str; 12] = [
    "Jan", "Feb", "Mar", "Apr", "May", "Jun", "Jul", "Aug", "Sep", "Oct", "Nov", "Dec",
];

const SECONDS_DIGITS: std::ops::RangeInclusive<usize> = 9..=10;
const MILLISECONDS_DIGITS: std::ops::RangeInclusive<usize> = 11..=13;

fn camel_boundary() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"([a-z])([A-Z])").expect("valid regex"))
}

fn separators() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[_-]+").expect("valid regex"))
}

fn iso_date() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^(\d{4})-(\d{2})-(\d{2})$").expect("valid regex"))
}

/// `rareEarthElements` -> `Rare Earth Elements`, `soda_ash` -> `Soda ash`.
pub fn humanize_key(key: &str) -> String {
    let spaced = camel_boundary().replace_all(key, "$1 $2");
    let spaced = separators().replace_all(&spaced, " ");
    let trimmed = spaced.trim();
    let mut chars = trimmed.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// `2024-03-05` -> `05-Mar-2024`. Inputs that are not `Y-M-D` come back unchanged.
pub fn to_display_date(iso: &str) -> String {
    if iso.is_empty() {
        return String::new();
    }
    let mut parts = iso.split('-');
    let (Some(year), Some(month), Some(day)) = (parts.next(), parts.next(), parts.next()) else {
        return iso.to_string();
    };
    if year.is_empty() || month.is_empty() || day.is_empty() {
        return iso.to_string();
    }
    match month.parse::<usize>() {
        Ok(m @ 1..=12) => format!("{day}-{}-{year}", MONTH_NAMES[m - 1]),
        _ => iso.to_string(),
    }
}

/// UTC calendar date (`YYYY-MM-DD`) of an epoch-milliseconds timestamp.
pub fn epoch_ms_to_iso_date(ms: i64) -> Option<String> {
    DateTime::from_timestamp_millis(ms).map(|dt| dt.format("%Y-%m-%d").to_string())
}

/// Epoch milliseconds of UTC midnight for a strict `YYYY-MM-DD` date.
pub fn iso_date_to_epoch_ms(value: &str) -> Option<i64> {
    let caps = iso_date().captures(value)?;
    let year: i32 = caps[1].parse().ok()?;
    let month: u32 = caps[2].parse().ok()?;
    let day: u32 = caps[3].parse().ok()?;
    let midnight = NaiveDate::from_ymd_opt(year, month, day)?.and_hms_opt(0, 0, 0)?;
    Some(midnight.and_utc().timestamp_millis())
}

fn timestamp_to_iso(value: i64, digits: usize) -> Option<String> {
    if MILLISECONDS_DIGITS.contains(&digits) {
        epoch_ms_to_iso_date(value)
    } else if SECONDS_DIGITS.contains(&digits) {
        epoch_ms_to_iso_date(value.checked_mul(1000)?)
    } else {
        None
    }
}

/// Normalizes a textual authorization date to `YYYY-MM-DD`.
///
/// ISO dates pass through. Integers are read as epoch seconds (9-10 digits) or epoch
/// milliseconds (11-13 digits). Anything else comes back trimmed.
pub fn normalize_authorization_date_text(value: &str) -> String {
    let trimmed = value.trim();
    if trimmed.is_empty() || iso_date().is_match(trimmed) {
        return trimmed.to_string();
    }
    let unsigned = trimmed.strip_prefix('-').unwrap_or(trimmed);
    if unsigned.is_empty() || !unsigned.bytes().all(|b| b.is_ascii_digit()) {
        return trimmed.to_string();
    }
    let significant = unsigned.trim_start_matches('0');
    let digits = significant.len().max(1);
    trimmed
        .parse::<i64>()
        .ok()
        .and_then(|n| timestamp_to_iso(n, digits))
        .unwrap_or_else(|| trimmed.to_string())
}

/// Numeric flavor of [`normalize_authorization_date_text`].
pub fn normalize_authorization_date_number(value: f64) -> String {
    if !value.is_finite() || value.fract() != 0.0 || value.abs() > i64::MAX as f64 {
        return value.to_string();
    }
    let n = value as i64;
    let digits = n.unsigned_abs().to_string().len();
    timestamp_to_iso(n, digits).unwrap_or_else(|| value.to_string())
}

/// Canonical spelling of the two special smelter lookup values; other input is returned as-is.
pub fn normalize_smelter_lookup(value: &str) -> String {
    let lower = value.trim().to_lowercase();
    match lower.as_str() {
        "smelter not listed" => "Smelter not listed".to_string(),
        "smelter not yet identified" => "Smelter not yet identified".to_string(),
        _ => value.to_string(),
    }
}

// Utility helpers for parsing and display formatting.
//
// This module centralizes the "dirty" number handling so the rest of the
// code can assume clean, typed values.
use num_format::{Locale, ToFormattedString};

/// Parse a string-like value into `f64` while being forgiving about
/// formatting issues that are common in CSV exports (commas, spaces, text).
///
/// - Accepts `Option<&str>` so callers can pass through optional fields.
/// - Trims whitespace.
/// - Rejects values that contain alphabetic characters.
/// - Strips thousands separators like `","` before parsing.
/// - Returns `None` for anything that cannot be safely parsed.
pub fn parse_f64_safe(s: Option<&str>) -> Option<f64> {
    let s = s?.trim();
    if s.is_empty() {
        return None;
    }
    if s.chars().any(|c| c.is_ascii_alphabetic()) {
        return None;
    }
    let s = s.replace(",", "");
    s.parse::<f64>().ok()
}

/// Like `parse_f64_safe`, for count-valued fields. The source exports counts
/// as plain digits, but a stray decimal point is tolerated and rounded.
pub fn parse_u64_safe(s: Option<&str>) -> Option<u64> {
    let v = parse_f64_safe(s)?;
    if v < 0.0 || !v.is_finite() {
        return None;
    }
    Some(v.round() as u64)
}

pub fn format_number(n: f64, decimals: usize) -> String {
    // Format a floating-point value with:
    // - a fixed number of decimal places, and
    // - locale-aware thousands separators (e.g., `1,234,567.89`).
    let neg = n.is_sign_negative();
    let abs_n = n.abs();
    // First, format to a plain fixed-decimal string like `1234567.89`.
    let s = format!("{:.*}", decimals, abs_n);
    let mut parts = s.split('.');
    let int_part = parts.next().unwrap_or("0");
    let frac_part = parts.next();
    // Use `num-format` to insert commas into the integer portion.
    let int_val: i64 = int_part.parse().unwrap_or(0);
    let mut res = int_val.to_formatted_string(&Locale::en);
    if let Some(frac) = frac_part {
        if decimals > 0 {
            res.push('.');
            res.push_str(frac);
        }
    } else if decimals > 0 {
        res.push('.');
        res.push_str(&"0".repeat(decimals));
    }
    if neg {
        format!("-{}", res)
    } else {
        res
    }
}

pub fn format_int<T>(n: T) -> String
where
    T: ToFormattedString,
{
    // Thin wrapper around `num-format` for integer-like values. This is used
    // for counts in console messages and table cells (e.g., `137,383`).
    n.to_formatted_string(&Locale::en)
}

/// Render a Rupiah amount given in billions as a short headline figure:
/// amounts of 1,000 billion and up switch to trillions.
pub fn format_rupiah_billions(value: f64) -> String {
    if value >= 1000.0 {
        format!("Rp {} T", format_number(value / 1000.0, 2))
    } else {
        format!("Rp {} M", format_number(value, 0))
    }
}

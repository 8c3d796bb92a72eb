// src/core/rules/quantity.rs

//! Parses Kubernetes `Quantity` strings ("250m", "2Gi", "128974848") into
//! base units: cores for CPU, bytes for memory.

use k8s_openapi::apimachinery::pkg::api::resource::Quantity;

/// Binary (power-of-two) suffixes.
const BINARY_SUFFIXES: &[(&str, f64)] = &[
    ("Ki", 1024.0),
    ("Mi", 1024.0 * 1024.0),
    ("Gi", 1024.0 * 1024.0 * 1024.0),
    ("Ti", 1024.0 * 1024.0 * 1024.0 * 1024.0),
    ("Pi", 1024.0 * 1024.0 * 1024.0 * 1024.0 * 1024.0),
    ("Ei", 1024.0 * 1024.0 * 1024.0 * 1024.0 * 1024.0 * 1024.0),
];

/// Decimal suffixes, including the milli suffix used for CPU quantities.
const DECIMAL_SUFFIXES: &[(&str, f64)] = &[
    ("m", 0.001),
    ("k", 1e3),
    ("M", 1e6),
    ("G", 1e9),
    ("T", 1e12),
    ("P", 1e15),
    ("E", 1e18),
];

/// Parses a `Quantity` into its base-unit value. Returns `None` for
/// malformed strings rather than guessing.
pub fn parse_quantity(quantity: &Quantity) -> Option<f64> {
    parse_quantity_str(&quantity.0)
}

pub fn parse_quantity_str(s: &str) -> Option<f64> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }

    for (suffix, multiplier) in BINARY_SUFFIXES {
        if let Some(value_str) = s.strip_suffix(suffix) {
            let value: f64 = value_str.trim().parse().ok()?;
            return Some(value * multiplier);
        }
    }

    for (suffix, multiplier) in DECIMAL_SUFFIXES {
        if let Some(value_str) = s.strip_suffix(suffix) {
            // Guard against scientific notation ("2e3") being read as the
            // decimal "E" (exa) suffix.
            if *suffix == "E" && value_str.ends_with(|c: char| c.is_ascii_digit() || c == '.') {
                if let Ok(value) = value_str.trim().parse::<f64>() {
                    return Some(value * multiplier);
                }
            } else if *suffix != "E" {
                let value: f64 = value_str.trim().parse().ok()?;
                return Some(value * multiplier);
            }
        }
    }

    s.parse().ok()
}

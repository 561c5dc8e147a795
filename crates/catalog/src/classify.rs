//! Item-code classification heuristics.
//!
//! The external feed carries no brand or category fields, so both are derived
//! from the item code. The prefix tables mirror the OEM's product lines:
//! `FX`/`Q*` controllers, `FR-` drives, `MR-` servo amplifiers, `GOT` panels.

use serde::{Deserialize, Serialize};

/// Codes containing any of these markers belong to the OEM brand.
const OEM_MARKERS: [&str; 5] = ["FX", "MR", "QY", "QX", "FR-"];

pub const OEM_BRAND: &str = "Mitsubishi Electric";
pub const IMPORT_BRAND: &str = "Inventory Import";

/// Product category, keyed the way reports and the API expose it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Plc,
    Vfd,
    Servo,
    Hmi,
    #[default]
    Other,
}

impl Category {
    pub fn code(&self) -> &'static str {
        match self {
            Category::Plc => "PLC",
            Category::Vfd => "VFD",
            Category::Servo => "SERVO",
            Category::Hmi => "HMI",
            Category::Other => "OTHER",
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Category::Plc => "Programmable Logic Controllers",
            Category::Vfd => "Variable Frequency Drives",
            Category::Servo => "Servo Systems",
            Category::Hmi => "HMI & SCADA",
            Category::Other => "Other Products",
        }
    }
}

impl core::fmt::Display for Category {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.code())
    }
}

/// Whether an item code looks like an OEM product.
pub fn is_oem_code(code: &str) -> bool {
    let upper = code.to_uppercase();
    OEM_MARKERS.iter().any(|marker| upper.contains(marker))
}

/// Brand name derived from the item code.
pub fn brand_for_code(code: &str) -> &'static str {
    if is_oem_code(code) { OEM_BRAND } else { IMPORT_BRAND }
}

/// Category derived from the item code prefix.
pub fn classify_category(code: &str) -> Category {
    let upper = code.to_uppercase();
    if upper.starts_with("FX") || upper.starts_with('Q') {
        Category::Plc
    } else if upper.starts_with("FR-") {
        Category::Vfd
    } else if upper.starts_with("MR-") || upper.contains("SERVO") {
        Category::Servo
    } else if upper.starts_with("GOT") || upper.contains("HMI") {
        Category::Hmi
    } else {
        Category::Other
    }
}

/// Structured pieces of an OEM item code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedCode {
    pub series: String,
    pub points: String,
    pub io_type: String,
    pub suffix: String,
}

/// Parse an item code like `FX5U-32MR/ES` into series/points/type/suffix.
///
/// Returns `None` when the code does not follow the `<series>-<digits><letters>[/<suffix>]`
/// shape (many third-party codes won't).
pub fn parse_product_code(code: &str) -> Option<ParsedCode> {
    let (series, rest) = code.split_once('-')?;
    if series.is_empty() || !series.chars().all(|c| c.is_ascii_alphanumeric()) {
        return None;
    }

    let (body, suffix) = match rest.split_once('/') {
        Some((body, suffix)) => (body, suffix),
        None => (rest, ""),
    };

    let points: String = body.chars().take_while(|c| c.is_ascii_digit()).collect();
    let io_type = &body[points.len()..];
    if points.is_empty() || io_type.is_empty() || !io_type.chars().all(|c| c.is_ascii_alphabetic())
    {
        return None;
    }

    Some(ParsedCode {
        series: series.to_string(),
        points,
        io_type: io_type.to_string(),
        suffix: suffix.to_string(),
    })
}

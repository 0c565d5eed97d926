use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

use crate::units::{BaseUnit, UnitTables, normalize_unit};

// Unit alternation ordered longest-first so GALLON wins over GAL, PINT over PT.
const UNIT_PATTERN: &str = "GALLON|GAL|QUART|QT|PINT|PT|ML|LB|OZ|KG|G|L";

// "9/1/2GAL" = 9 × (1/2) gallon: pack_count / numerator / denominator + unit
static FRACTION_PACK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(
        r"(?i)(\d+)\s*/\s*(\d+)\s*/\s*(\d+)\s*({UNIT_PATTERN})\b"
    ))
    .expect("fraction pack pattern")
});

// "36/1LB" or "36/1 LB" — count of sized units
static SLASH_PACK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(
        r"(?i)(\d+)\s*/\s*(\d+(?:\.\d+)?)\s*({UNIT_PATTERN})\b"
    ))
    .expect("slash pack pattern")
});

// "36X1LB" or "36 x 1 LB" — alternate count-of-units format
static X_PACK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(
        r"(?i)(\d+)\s*x\s*(\d+(?:\.\d+)?)\s*({UNIT_PATTERN})\b"
    ))
    .expect("x pack pattern")
});

// "15DZ" — dozen counts
static DOZEN_PACK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)(\d+)\s*(DZ|DOZ|DOZEN)\b").expect("dozen pack pattern"));

// "10LB CS" — a single weight/volume quantity, optionally tagged as a case
static CASE_PACK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(
        r"(?i)(\d+(?:\.\d+)?)\s*({UNIT_PATTERN})\b\s*(CS|CASE|BX|BOX|PK|PACK)?"
    ))
    .expect("case pack pattern")
});

// "4CT" — plain counts
static COUNT_PACK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)(\d+)\s*(CT|EA|PC|EACH)\b").expect("count pack pattern"));

/// A distributor pack description resolved to structured configuration.
#[derive(Debug, Clone, Serialize)]
pub struct PackConfig {
    /// Number of units in the pack (36 in "36/1LB").
    pub pack_count: f64,
    /// Size of each unit in `unit` (1 in "36/1LB", 0.5 in "9/1/2GAL").
    pub unit_size: f64,
    /// Normalized source unit ("lb", "gal", "each").
    pub unit: String,
    /// `pack_count × unit_size` converted to the base unit.
    pub total_base_units: f64,
    pub base_unit: BaseUnit,
}

impl PackConfig {
    #[must_use]
    pub fn display(&self) -> String {
        let count = self.pack_count;
        let size = self.unit_size;
        let unit = &self.unit;
        format!("{count} × {size} {unit}")
    }
}

/// Parse a free-text pack description ("BUTTER AA 36/1LB CS") into structured
/// pack configuration.
///
/// Patterns are tried most-specific first; the first match wins. `None` means
/// no pattern matched — callers treat that as "needs manual entry", never as
/// an error.
#[must_use]
pub fn parse_pack(description: &str, tables: &UnitTables) -> Option<PackConfig> {
    if let Some(caps) = FRACTION_PACK.captures(description) {
        let pack_count: f64 = caps[1].parse().ok()?;
        let numerator: f64 = caps[2].parse().ok()?;
        let denominator: f64 = caps[3].parse().ok()?;
        if denominator > 0.0 {
            return sized_pack(pack_count, numerator / denominator, &caps[4], tables);
        }
    }

    if let Some(caps) = SLASH_PACK.captures(description) {
        let pack_count: f64 = caps[1].parse().ok()?;
        let unit_size: f64 = caps[2].parse().ok()?;
        return sized_pack(pack_count, unit_size, &caps[3], tables);
    }

    if let Some(caps) = X_PACK.captures(description) {
        let pack_count: f64 = caps[1].parse().ok()?;
        let unit_size: f64 = caps[2].parse().ok()?;
        return sized_pack(pack_count, unit_size, &caps[3], tables);
    }

    if let Some(caps) = DOZEN_PACK.captures(description) {
        let pack_count: f64 = caps[1].parse().ok()?;
        return Some(PackConfig {
            pack_count,
            unit_size: 12.0,
            unit: "each".to_string(),
            total_base_units: pack_count * 12.0,
            base_unit: BaseUnit::Each,
        });
    }

    if let Some(caps) = CASE_PACK.captures(description) {
        let unit_size: f64 = caps[1].parse().ok()?;
        return sized_pack(1.0, unit_size, &caps[2], tables);
    }

    if let Some(caps) = COUNT_PACK.captures(description) {
        let pack_count: f64 = caps[1].parse().ok()?;
        return Some(PackConfig {
            pack_count,
            unit_size: 1.0,
            unit: "each".to_string(),
            total_base_units: pack_count,
            base_unit: BaseUnit::Each,
        });
    }

    None
}

fn sized_pack(
    pack_count: f64,
    unit_size: f64,
    unit: &str,
    tables: &UnitTables,
) -> Option<PackConfig> {
    let (total_base_units, base_unit) = tables.convert(pack_count * unit_size, unit).ok()?;
    Some(PackConfig {
        pack_count,
        unit_size,
        unit: normalize_unit(unit),
        total_base_units,
        base_unit,
    })
}

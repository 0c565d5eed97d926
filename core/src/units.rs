use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::CostError;

/// The three canonical base units all ingredient quantities normalize to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BaseUnit {
    #[serde(rename = "g")]
    Gram,
    #[serde(rename = "ml")]
    Milliliter,
    #[serde(rename = "each")]
    Each,
}

impl BaseUnit {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            BaseUnit::Gram => "g",
            BaseUnit::Milliliter => "ml",
            BaseUnit::Each => "each",
        }
    }

    /// Parse a base-unit label as stored in the catalog ("g", "ml", "each").
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match normalize_unit(s).as_str() {
            "g" => Some(BaseUnit::Gram),
            "ml" => Some(BaseUnit::Milliliter),
            "each" => Some(BaseUnit::Each),
            _ => None,
        }
    }
}

impl fmt::Display for BaseUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Normalize a unit string for table lookup: lowercase, trimmed, with
/// hyphens/underscores flattened to spaces ("FL_OZ" -> "fl oz").
#[must_use]
pub fn normalize_unit(unit: &str) -> String {
    unit.trim().to_lowercase().replace(['-', '_'], " ")
}

/// Conversion tables from supported units to the three base units.
///
/// Injected into the parser and service rather than held as a global, so
/// tests can substitute alternate tables.
#[derive(Debug, Clone)]
pub struct UnitTables {
    mass_to_grams: HashMap<String, f64>,
    volume_to_ml: HashMap<String, f64>,
    count_to_each: HashMap<String, f64>,
}

impl Default for UnitTables {
    fn default() -> Self {
        let mass: &[(&str, f64)] = &[
            ("g", 1.0),
            ("gram", 1.0),
            ("grams", 1.0),
            ("kg", 1000.0),
            ("kilogram", 1000.0),
            ("kilograms", 1000.0),
            ("oz", 28.3495),
            ("ounce", 28.3495),
            ("ounces", 28.3495),
            ("lb", 453.592),
            ("lbs", 453.592),
            ("pound", 453.592),
            ("pounds", 453.592),
            // pound symbol, common on food-service invoices
            ("#", 453.592),
        ];
        let volume: &[(&str, f64)] = &[
            ("ml", 1.0),
            ("milliliter", 1.0),
            ("milliliters", 1.0),
            ("l", 1000.0),
            ("liter", 1000.0),
            ("liters", 1000.0),
            ("litre", 1000.0),
            ("litres", 1000.0),
            ("fl oz", 29.5735),
            ("floz", 29.5735),
            ("fluid ounce", 29.5735),
            ("fluid ounces", 29.5735),
            ("cup", 236.588),
            ("cups", 236.588),
            ("pt", 473.176),
            ("pint", 473.176),
            ("pints", 473.176),
            ("qt", 946.353),
            ("quart", 946.353),
            ("quarts", 946.353),
            ("gal", 3785.41),
            ("gallon", 3785.41),
            ("gallons", 3785.41),
            ("tbsp", 14.7868),
            ("tablespoon", 14.7868),
            ("tablespoons", 14.7868),
            ("tsp", 4.92892),
            ("teaspoon", 4.92892),
            ("teaspoons", 4.92892),
        ];
        let count: &[(&str, f64)] = &[
            ("ea", 1.0),
            ("each", 1.0),
            ("ct", 1.0),
            ("count", 1.0),
            ("pc", 1.0),
            ("piece", 1.0),
            ("pieces", 1.0),
            ("unit", 1.0),
            ("units", 1.0),
            ("dz", 12.0),
            ("doz", 12.0),
            ("dozen", 12.0),
        ];

        let build = |pairs: &[(&str, f64)]| {
            pairs
                .iter()
                .map(|&(k, v)| (k.to_string(), v))
                .collect::<HashMap<_, _>>()
        };

        UnitTables {
            mass_to_grams: build(mass),
            volume_to_ml: build(volume),
            count_to_each: build(count),
        }
    }
}

impl UnitTables {
    /// Build tables from explicit entries (test substitution).
    #[must_use]
    pub fn new(
        mass_to_grams: HashMap<String, f64>,
        volume_to_ml: HashMap<String, f64>,
        count_to_each: HashMap<String, f64>,
    ) -> Self {
        UnitTables {
            mass_to_grams,
            volume_to_ml,
            count_to_each,
        }
    }

    /// Classify a unit string into its base-unit category.
    ///
    /// Returns `None` for units absent from every table; unknown units must
    /// never silently convert.
    #[must_use]
    pub fn category(&self, unit: &str) -> Option<BaseUnit> {
        let normalized = normalize_unit(unit);
        if self.mass_to_grams.contains_key(&normalized) {
            Some(BaseUnit::Gram)
        } else if self.volume_to_ml.contains_key(&normalized) {
            Some(BaseUnit::Milliliter)
        } else if self.count_to_each.contains_key(&normalized) {
            Some(BaseUnit::Each)
        } else {
            None
        }
    }

    /// Convert a quantity in `unit` to its base unit.
    pub fn convert(&self, quantity: f64, unit: &str) -> Result<(f64, BaseUnit), CostError> {
        let normalized = normalize_unit(unit);
        if let Some(factor) = self.mass_to_grams.get(&normalized) {
            return Ok((quantity * factor, BaseUnit::Gram));
        }
        if let Some(factor) = self.volume_to_ml.get(&normalized) {
            return Ok((quantity * factor, BaseUnit::Milliliter));
        }
        if let Some(factor) = self.count_to_each.get(&normalized) {
            return Ok((quantity * factor, BaseUnit::Each));
        }
        Err(CostError::UnknownUnit(unit.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_unit() {
        assert_eq!(normalize_unit("LB"), "lb");
        assert_eq!(normalize_unit("  oz  "), "oz");
        assert_eq!(normalize_unit("fl-oz"), "fl oz");
        assert_eq!(normalize_unit("FL_OZ"), "fl oz");
    }

    #[test]
    fn test_category_mass_units() {
        let tables = UnitTables::default();
        for unit in ["g", "kg", "oz", "lb", "lbs", "pound", "#", "LB"] {
            assert_eq!(tables.category(unit), Some(BaseUnit::Gram), "{unit}");
        }
    }

    #[test]
    fn test_category_volume_units() {
        let tables = UnitTables::default();
        for unit in ["ml", "l", "fl oz", "fl_oz", "cup", "qt", "gal", "tbsp", "Gallon"] {
            assert_eq!(tables.category(unit), Some(BaseUnit::Milliliter), "{unit}");
        }
    }

    #[test]
    fn test_category_count_units() {
        let tables = UnitTables::default();
        for unit in ["ea", "each", "ct", "pc", "dz", "dozen", "EACH"] {
            assert_eq!(tables.category(unit), Some(BaseUnit::Each), "{unit}");
        }
    }

    #[test]
    fn test_category_unknown() {
        let tables = UnitTables::default();
        assert_eq!(tables.category("bushel"), None);
        assert_eq!(tables.category(""), None);
    }

    #[test]
    fn test_convert_pounds_to_grams() {
        let tables = UnitTables::default();
        let (value, base) = tables.convert(1.0, "lb").unwrap();
        assert!((value - 453.592).abs() < 1e-9);
        assert_eq!(base, BaseUnit::Gram);
    }

    #[test]
    fn test_convert_gallons_to_ml() {
        let tables = UnitTables::default();
        let (value, base) = tables.convert(2.0, "gal").unwrap();
        assert!((value - 7570.82).abs() < 1e-9);
        assert_eq!(base, BaseUnit::Milliliter);
    }

    #[test]
    fn test_convert_dozen_to_each() {
        let tables = UnitTables::default();
        let (value, base) = tables.convert(3.0, "dozen").unwrap();
        assert!((value - 36.0).abs() < f64::EPSILON);
        assert_eq!(base, BaseUnit::Each);
    }

    #[test]
    fn test_convert_unknown_unit_errors() {
        let tables = UnitTables::default();
        let err = tables.convert(1.0, "bushel").unwrap_err();
        assert!(matches!(err, CostError::UnknownUnit(u) if u == "bushel"));
    }

    #[test]
    fn test_substituted_tables() {
        let mut mass = HashMap::new();
        mass.insert("stone".to_string(), 6350.29);
        let tables = UnitTables::new(mass, HashMap::new(), HashMap::new());
        let (value, base) = tables.convert(1.0, "stone").unwrap();
        assert!((value - 6350.29).abs() < 1e-9);
        assert_eq!(base, BaseUnit::Gram);
        // default entries are gone
        assert!(tables.convert(1.0, "lb").is_err());
    }

    #[test]
    fn test_base_unit_serde_labels() {
        assert_eq!(serde_json::to_string(&BaseUnit::Gram).unwrap(), "\"g\"");
        assert_eq!(
            serde_json::to_string(&BaseUnit::Milliliter).unwrap(),
            "\"ml\""
        );
        let parsed: BaseUnit = serde_json::from_str("\"each\"").unwrap();
        assert_eq!(parsed, BaseUnit::Each);
    }

    #[test]
    fn test_base_unit_parse() {
        assert_eq!(BaseUnit::parse("g"), Some(BaseUnit::Gram));
        assert_eq!(BaseUnit::parse("ML"), Some(BaseUnit::Milliliter));
        assert_eq!(BaseUnit::parse("each"), Some(BaseUnit::Each));
        assert_eq!(BaseUnit::parse("grams-ish"), None);
    }
}

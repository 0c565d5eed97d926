use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use anyhow::{Result, bail};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::units::BaseUnit;

// --- Catalog rows ---

/// Canonical ingredient record that distributor SKUs map onto.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ingredient {
    pub id: i64,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    pub base_unit: BaseUnit,
    /// Usable fraction after trim/waste, in (0, 1].
    pub yield_factor: f64,
    pub created_at: String,
    #[serde(default)]
    pub updated_at: String,
}

#[derive(Debug, Clone)]
pub struct NewIngredient {
    pub name: String,
    pub category: Option<String>,
    pub base_unit: BaseUnit,
    pub yield_factor: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Distributor {
    pub id: i64,
    pub name: String,
    pub created_at: String,
}

/// A specific distributor's SKU/pack configuration for a canonical
/// ingredient. Belongs to exactly one ingredient.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DistributorVariant {
    pub id: i64,
    pub ingredient_id: i64,
    pub distributor_id: i64,
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pack_count: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unit_size: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
    /// Derived pack total in the ingredient's base unit. `None` means the
    /// pack was never resolved; such variants are excluded from pricing.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_base_units: Option<f64>,
    pub is_active: bool,
    pub created_at: String,
    // Joined field for display
    #[serde(skip_serializing_if = "Option::is_none")]
    pub distributor_name: Option<String>,
}

#[derive(Debug, Clone)]
pub struct NewVariant {
    pub ingredient_id: i64,
    pub distributor_id: i64,
    pub description: String,
    pub pack_count: Option<f64>,
    pub unit_size: Option<f64>,
    pub unit: Option<String>,
    pub total_base_units: Option<f64>,
}

/// One recorded pack price. Append-only: no update or delete path exists.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriceObservation {
    pub id: i64,
    pub variant_id: i64,
    pub price_cents: i64,
    pub effective_date: NaiveDate,
    pub source: String,
    pub created_at: String,
}

#[derive(Debug, Clone)]
pub struct NewPriceObservation {
    pub variant_id: i64,
    pub price_cents: i64,
    pub effective_date: NaiveDate,
    pub source: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Recipe {
    pub id: i64,
    pub name: String,
    pub yield_quantity: f64,
    pub yield_unit: String,
    /// True finished weight, for weight-based component costing (accounts
    /// for evaporation during cooking).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub yield_weight_grams: Option<f64>,
    pub created_at: String,
    #[serde(default)]
    pub updated_at: String,
}

#[derive(Debug, Clone)]
pub struct NewRecipe {
    pub name: String,
    pub yield_quantity: f64,
    pub yield_unit: String,
    pub yield_weight_grams: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecipeIngredientLine {
    pub id: i64,
    pub recipe_id: i64,
    pub ingredient_id: i64,
    /// Quantity in the ingredient's base unit.
    pub quantity: f64,
    pub is_optional: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ingredient_name: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecipeComponentLink {
    pub id: i64,
    pub recipe_id: i64,
    pub component_recipe_id: i64,
    /// Quantity in the component recipe's yield unit.
    pub quantity: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub component_name: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MenuItem {
    pub id: i64,
    pub name: String,
    /// `None` for retail items sold without a recipe.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recipe_id: Option<i64>,
    pub portion_of_recipe: f64,
    pub menu_price_cents: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    pub is_active: bool,
    pub created_at: String,
    #[serde(default)]
    pub updated_at: String,
}

#[derive(Debug, Clone)]
pub struct NewMenuItem {
    pub name: String,
    pub recipe_id: Option<i64>,
    pub portion_of_recipe: f64,
    pub menu_price_cents: i64,
    pub category: Option<String>,
}

/// Packaging usage for a menu item (cups, lids, bags) with a usage rate:
/// a latte always takes a cup, but maybe only half of them take a sleeve.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PackagingLine {
    pub id: i64,
    pub menu_item_id: i64,
    pub ingredient_id: i64,
    pub quantity: f64,
    pub usage_rate: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ingredient_name: Option<String>,
}

// --- Pricing policy ---

/// Policy for selecting which recorded price to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum PricingMode {
    /// Lowest observation ever recorded per variant.
    Cheapest,
    /// Latest observation per variant.
    Recent,
    /// Mean of observations within the trailing window; variants with an
    /// empty window are excluded.
    Average { window_days: u32 },
}

impl FromStr for PricingMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim().to_lowercase();
        match s.as_str() {
            "cheapest" => Ok(PricingMode::Cheapest),
            "recent" => Ok(PricingMode::Recent),
            "average" => Ok(PricingMode::Average { window_days: 30 }),
            _ => {
                if let Some(days) = s.strip_prefix("average:") {
                    let window_days: u32 = days
                        .parse()
                        .map_err(|_| anyhow::anyhow!("Invalid average window: '{days}'"))?;
                    if window_days == 0 {
                        bail!("Average window must be at least 1 day");
                    }
                    Ok(PricingMode::Average { window_days })
                } else {
                    bail!("Unknown pricing mode '{s}'. Use cheapest, recent, or average[:days]")
                }
            }
        }
    }
}

impl fmt::Display for PricingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PricingMode::Cheapest => f.write_str("cheapest"),
            PricingMode::Recent => f.write_str("recent"),
            PricingMode::Average { window_days } => write!(f, "average:{window_days}"),
        }
    }
}

// --- Margin configuration ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MarginStatus {
    Healthy,
    Warning,
    Danger,
}

impl MarginStatus {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            MarginStatus::Healthy => "healthy",
            MarginStatus::Warning => "warning",
            MarginStatus::Danger => "danger",
        }
    }
}

/// Food-cost percentage bands. Configuration, not literals in the logic.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct MarginThresholds {
    pub warning_pct: f64,
    pub danger_pct: f64,
}

impl Default for MarginThresholds {
    fn default() -> Self {
        MarginThresholds {
            warning_pct: 30.0,
            danger_pct: 35.0,
        }
    }
}

impl MarginThresholds {
    #[must_use]
    pub fn classify(&self, food_cost_percent: f64) -> MarginStatus {
        if food_cost_percent < self.warning_pct {
            MarginStatus::Healthy
        } else if food_cost_percent < self.danger_pct {
            MarginStatus::Warning
        } else {
            MarginStatus::Danger
        }
    }
}

/// Engine knobs passed into the service constructor.
#[derive(Debug, Clone, Copy)]
pub struct EngineConfig {
    /// Traversal depth bound — a safety net independent of cycle detection.
    pub max_recursion_depth: usize,
    pub margin_thresholds: MarginThresholds,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            max_recursion_depth: 32,
            margin_thresholds: MarginThresholds::default(),
        }
    }
}

// --- Cost reports (derived, never stored) ---

#[derive(Debug, Clone, Serialize)]
pub struct IngredientLineCost {
    pub ingredient_id: i64,
    pub ingredient_name: String,
    pub base_unit: BaseUnit,
    pub quantity: f64,
    /// `quantity / yield_factor` — what actually has to be purchased.
    pub effective_quantity: f64,
    pub is_optional: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub price_per_base_unit_cents: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub distributor: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cost_cents: Option<i64>,
    pub has_price: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct ComponentLineCost {
    pub component_recipe_id: i64,
    /// Quantity in the component's yield unit.
    pub quantity: f64,
    pub cost_per_unit_cents: f64,
    pub line_cost_cents: i64,
    /// The component's own full breakdown, untouched by parent scaling.
    pub breakdown: CostBreakdown,
}

/// Full cost tree for one recipe: nested breakdowns for every component so
/// consumers can drill into any level.
#[derive(Debug, Clone, Serialize)]
pub struct CostBreakdown {
    pub recipe_id: i64,
    pub recipe_name: String,
    pub yield_quantity: f64,
    pub yield_unit: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub yield_weight_grams: Option<f64>,
    pub ingredients: Vec<IngredientLineCost>,
    pub components: Vec<ComponentLineCost>,
    pub total_ingredient_cost_cents: i64,
    pub total_component_cost_cents: i64,
    pub total_cost_cents: i64,
    pub cost_per_unit_cents: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cost_per_gram_cents: Option<f64>,
    pub has_unpriced_ingredients: bool,
    pub unpriced_count: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct PackagingLineCost {
    pub ingredient_id: i64,
    pub ingredient_name: String,
    pub quantity: f64,
    pub usage_rate: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub price_per_base_unit_cents: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cost_cents: Option<i64>,
    pub has_price: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct MenuItemCostBreakdown {
    pub menu_item_id: i64,
    pub name: String,
    pub menu_price_cents: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recipe_name: Option<String>,
    pub portion_of_recipe: f64,
    pub recipe_cost_cents: i64,
    pub packaging_cost_cents: i64,
    pub total_cost_cents: i64,
    pub gross_margin_cents: i64,
    pub food_cost_percent: f64,
    pub margin_status: MarginStatus,
    pub has_unpriced_ingredients: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recipe_breakdown: Option<CostBreakdown>,
    pub packaging: Vec<PackagingLineCost>,
}

// --- Price comparison ---

#[derive(Debug, Clone, Serialize)]
pub struct PriceComparisonRow {
    pub variant_id: i64,
    pub distributor_name: String,
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub price_cents: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub effective_date: Option<NaiveDate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_base_units: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub price_per_base_unit_cents: Option<f64>,
    pub is_best_price: bool,
}

/// Cross-distributor normalized comparison for one ingredient.
#[derive(Debug, Clone, Serialize)]
pub struct PriceComparison {
    pub ingredient_id: i64,
    pub ingredient_name: String,
    pub base_unit: BaseUnit,
    pub variants: Vec<PriceComparisonRow>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub best_price_per_base_unit_cents: Option<f64>,
    /// (max − min) / min × 100, defined only with ≥ 2 priced variants.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub spread_percent: Option<f64>,
}

// --- Menu analyzer ---

#[derive(Debug, Clone, Serialize)]
pub struct MenuAnalysisRow {
    pub menu_item_id: i64,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    pub menu_price_cents: i64,
    pub total_cost_cents: i64,
    pub food_cost_percent: f64,
    pub gross_margin_cents: i64,
    pub margin_status: MarginStatus,
    pub has_unpriced_ingredients: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct CategorySummary {
    pub total_items: usize,
    pub avg_food_cost_percent: f64,
    pub healthy_count: usize,
    pub warning_count: usize,
    pub danger_count: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct MenuAnalysisSummary {
    pub total_items: usize,
    pub avg_food_cost_percent: f64,
    pub healthy_count: usize,
    pub warning_count: usize,
    pub danger_count: usize,
    pub by_category: BTreeMap<String, CategorySummary>,
}

#[derive(Debug, Clone, Serialize)]
pub struct MenuAnalysis {
    pub items: Vec<MenuAnalysisRow>,
    pub summary: MenuAnalysisSummary,
}

// --- Validation ---

pub fn validate_yield_factor(yield_factor: f64) -> Result<()> {
    if !(yield_factor > 0.0 && yield_factor <= 1.0) {
        bail!("Yield factor must be in (0, 1], got {yield_factor}");
    }
    Ok(())
}

pub fn validate_usage_rate(usage_rate: f64) -> Result<()> {
    if !(0.0..=1.0).contains(&usage_rate) {
        bail!("Usage rate must be between 0 and 1, got {usage_rate}");
    }
    Ok(())
}

pub fn validate_yield_quantity(yield_quantity: f64) -> Result<()> {
    if yield_quantity <= 0.0 {
        bail!("Yield quantity must be greater than 0");
    }
    Ok(())
}

pub fn validate_line_quantity(quantity: f64) -> Result<()> {
    if quantity <= 0.0 {
        bail!("Quantity must be greater than 0");
    }
    Ok(())
}

pub fn validate_portion(portion_of_recipe: f64) -> Result<()> {
    if portion_of_recipe <= 0.0 {
        bail!("Portion of recipe must be greater than 0");
    }
    Ok(())
}

pub fn validate_price_cents(price_cents: i64) -> Result<()> {
    if price_cents < 0 {
        bail!("Price must not be negative");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pricing_mode_from_str() {
        assert_eq!(
            "cheapest".parse::<PricingMode>().unwrap(),
            PricingMode::Cheapest
        );
        assert_eq!("Recent".parse::<PricingMode>().unwrap(), PricingMode::Recent);
        assert_eq!(
            "average".parse::<PricingMode>().unwrap(),
            PricingMode::Average { window_days: 30 }
        );
        assert_eq!(
            "average:45".parse::<PricingMode>().unwrap(),
            PricingMode::Average { window_days: 45 }
        );
    }

    #[test]
    fn test_pricing_mode_from_str_invalid() {
        assert!("lowest".parse::<PricingMode>().is_err());
        assert!("average:zero".parse::<PricingMode>().is_err());
        assert!("average:0".parse::<PricingMode>().is_err());
    }

    #[test]
    fn test_pricing_mode_round_trip_display() {
        for s in ["cheapest", "recent", "average:7"] {
            let mode: PricingMode = s.parse().unwrap();
            assert_eq!(mode.to_string(), s);
        }
    }

    #[test]
    fn test_margin_classification_bands() {
        let t = MarginThresholds::default();
        assert_eq!(t.classify(0.0), MarginStatus::Healthy);
        assert_eq!(t.classify(29.99), MarginStatus::Healthy);
        assert_eq!(t.classify(30.0), MarginStatus::Warning);
        assert_eq!(t.classify(34.8), MarginStatus::Warning);
        assert_eq!(t.classify(35.0), MarginStatus::Danger);
        assert_eq!(t.classify(120.0), MarginStatus::Danger);
    }

    #[test]
    fn test_margin_classification_custom_thresholds() {
        let t = MarginThresholds {
            warning_pct: 25.0,
            danger_pct: 40.0,
        };
        assert_eq!(t.classify(28.0), MarginStatus::Warning);
        assert_eq!(t.classify(39.9), MarginStatus::Warning);
        assert_eq!(t.classify(40.0), MarginStatus::Danger);
    }

    #[test]
    fn test_validate_yield_factor() {
        assert!(validate_yield_factor(1.0).is_ok());
        assert!(validate_yield_factor(0.85).is_ok());
        assert!(validate_yield_factor(0.0).is_err());
        assert!(validate_yield_factor(-0.2).is_err());
        assert!(validate_yield_factor(1.01).is_err());
    }

    #[test]
    fn test_validate_usage_rate() {
        assert!(validate_usage_rate(0.0).is_ok());
        assert!(validate_usage_rate(0.5).is_ok());
        assert!(validate_usage_rate(1.0).is_ok());
        assert!(validate_usage_rate(1.5).is_err());
        assert!(validate_usage_rate(-0.1).is_err());
    }

    #[test]
    fn test_margin_status_serializes_snake_case() {
        assert_eq!(
            serde_json::to_string(&MarginStatus::Warning).unwrap(),
            "\"warning\""
        );
    }

    #[test]
    fn test_pricing_mode_serializes_tagged() {
        let json = serde_json::to_value(PricingMode::Average { window_days: 30 }).unwrap();
        assert_eq!(json["mode"], "average");
        assert_eq!(json["window_days"], 30);
        let json = serde_json::to_value(PricingMode::Cheapest).unwrap();
        assert_eq!(json["mode"], "cheapest");
    }

    #[test]
    fn test_validate_quantities() {
        assert!(validate_yield_quantity(12.0).is_ok());
        assert!(validate_yield_quantity(0.0).is_err());
        assert!(validate_line_quantity(0.1).is_ok());
        assert!(validate_line_quantity(0.0).is_err());
        assert!(validate_portion(0.25).is_ok());
        assert!(validate_portion(0.0).is_err());
        assert!(validate_price_cents(0).is_ok());
        assert!(validate_price_cents(-1).is_err());
    }
}

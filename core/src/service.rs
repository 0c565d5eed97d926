use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{Context, Result, bail};
use chrono::{Local, NaiveDate};
use serde::Serialize;
use tracing::debug;

use crate::costing::CostEngine;
use crate::db::Database;
use crate::error::CostError;
use crate::models::{
    CategorySummary, CostBreakdown, Distributor, DistributorVariant, EngineConfig, Ingredient,
    MenuAnalysis, MenuAnalysisRow, MenuAnalysisSummary, MenuItem, MenuItemCostBreakdown,
    NewIngredient, NewMenuItem, NewPriceObservation, NewRecipe, NewVariant, PackagingLine,
    PriceComparison, PriceObservation, PricingMode, Recipe, RecipeComponentLink,
    RecipeIngredientLine, validate_line_quantity, validate_portion, validate_price_cents,
    validate_usage_rate, validate_yield_factor, validate_yield_quantity,
};
use crate::pack::parse_pack;
use crate::price_import::{self, PriceImportSummary};
use crate::pricing::PriceSelector;
use crate::units::{BaseUnit, UnitTables};

/// Result of asking the service to parse a pack description. A miss is a
/// normal outcome queued for manual mapping, never an error.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum PackParseOutcome {
    Parsed {
        pack_count: f64,
        unit_size: f64,
        unit: String,
        total_base_units: f64,
        base_unit: BaseUnit,
        display: String,
    },
    NeedsManualEntry {
        description: String,
    },
}

/// Facade over the catalog and the costing engine.
///
/// Every cost computation builds a fresh request-scoped engine, so memo
/// caches and ancestor paths are never shared across calls.
pub struct CostService {
    db: Database,
    tables: UnitTables,
    config: EngineConfig,
}

impl CostService {
    pub fn new(db_path: &str) -> Result<Self> {
        let db = Database::open(Path::new(db_path))?;
        Ok(Self::with_config(db, UnitTables::default(), EngineConfig::default()))
    }

    pub fn new_in_memory() -> Result<Self> {
        let db = Database::open_in_memory()?;
        Ok(Self::with_config(db, UnitTables::default(), EngineConfig::default()))
    }

    #[must_use]
    pub fn with_config(db: Database, tables: UnitTables, config: EngineConfig) -> Self {
        CostService { db, tables, config }
    }

    fn today() -> NaiveDate {
        Local::now().date_naive()
    }

    fn engine(&self) -> CostEngine<'_> {
        CostEngine::new(&self.db, self.config, Self::today())
    }

    // --- Engine surface ---

    #[must_use]
    pub fn parse_pack(&self, description: &str) -> PackParseOutcome {
        match parse_pack(description, &self.tables) {
            Some(pack) => PackParseOutcome::Parsed {
                display: pack.display(),
                pack_count: pack.pack_count,
                unit_size: pack.unit_size,
                unit: pack.unit,
                total_base_units: pack.total_base_units,
                base_unit: pack.base_unit,
            },
            None => PackParseOutcome::NeedsManualEntry {
                description: description.to_string(),
            },
        }
    }

    pub fn recipe_cost(
        &self,
        recipe_id: i64,
        mode: PricingMode,
    ) -> Result<CostBreakdown, CostError> {
        self.engine().recipe_cost(recipe_id, mode)
    }

    pub fn menu_item_cost(
        &self,
        menu_item_id: i64,
        mode: PricingMode,
    ) -> Result<MenuItemCostBreakdown, CostError> {
        self.engine().menu_item_cost(menu_item_id, mode)
    }

    pub fn price_comparison(&self, ingredient_id: i64) -> Result<PriceComparison, CostError> {
        let ingredient = self
            .db
            .get_ingredient_by_id(ingredient_id)?
            .ok_or(CostError::IngredientNotFound(ingredient_id))?;
        PriceSelector::new(&self.db, Self::today()).comparison(&ingredient)
    }

    pub fn price_comparison_by_category(
        &self,
        category: &str,
    ) -> Result<Vec<PriceComparison>, CostError> {
        let ingredients = self.db.list_ingredients(Some(category))?;
        let selector = PriceSelector::new(&self.db, Self::today());
        ingredients
            .iter()
            .map(|ingredient| selector.comparison(ingredient))
            .collect()
    }

    /// Cost every active menu item and aggregate margin health, overall and
    /// per category.
    pub fn analyze_menu(
        &self,
        mode: PricingMode,
        category: Option<&str>,
    ) -> Result<MenuAnalysis, CostError> {
        let menu_items = self.db.list_menu_items(category, true)?;
        let mut items = Vec::with_capacity(menu_items.len());
        let mut by_category: BTreeMap<String, Vec<&MenuAnalysisRow>> = BTreeMap::new();

        for item in &menu_items {
            let breakdown = self.menu_item_cost(item.id, mode)?;
            items.push(MenuAnalysisRow {
                menu_item_id: item.id,
                name: breakdown.name.clone(),
                category: item.category.clone(),
                menu_price_cents: breakdown.menu_price_cents,
                total_cost_cents: breakdown.total_cost_cents,
                food_cost_percent: breakdown.food_cost_percent,
                gross_margin_cents: breakdown.gross_margin_cents,
                margin_status: breakdown.margin_status,
                has_unpriced_ingredients: breakdown.has_unpriced_ingredients,
            });
        }

        for row in &items {
            let key = row
                .category
                .clone()
                .unwrap_or_else(|| "uncategorized".to_string());
            by_category.entry(key).or_default().push(row);
        }

        let summarize = |rows: &[&MenuAnalysisRow]| {
            let total = rows.len();
            let avg = if total > 0 {
                rows.iter().map(|r| r.food_cost_percent).sum::<f64>() / total as f64
            } else {
                0.0
            };
            let count = |status| rows.iter().filter(|r| r.margin_status == status).count();
            (
                total,
                avg,
                count(crate::models::MarginStatus::Healthy),
                count(crate::models::MarginStatus::Warning),
                count(crate::models::MarginStatus::Danger),
            )
        };

        let all: Vec<&MenuAnalysisRow> = items.iter().collect();
        let (total_items, avg_food_cost_percent, healthy_count, warning_count, danger_count) =
            summarize(&all);

        let by_category = by_category
            .into_iter()
            .map(|(category, rows)| {
                let (total, avg, healthy, warning, danger) = summarize(&rows);
                (
                    category,
                    CategorySummary {
                        total_items: total,
                        avg_food_cost_percent: avg,
                        healthy_count: healthy,
                        warning_count: warning,
                        danger_count: danger,
                    },
                )
            })
            .collect();

        Ok(MenuAnalysis {
            items,
            summary: MenuAnalysisSummary {
                total_items,
                avg_food_cost_percent,
                healthy_count,
                warning_count,
                danger_count,
                by_category,
            },
        })
    }

    // --- Catalog: ingredients and distributors ---

    pub fn add_ingredient(
        &self,
        name: &str,
        category: Option<&str>,
        base_unit: BaseUnit,
        yield_factor: f64,
    ) -> Result<Ingredient> {
        if name.trim().is_empty() {
            bail!("Ingredient name must not be empty");
        }
        validate_yield_factor(yield_factor)?;
        self.db.insert_ingredient(&NewIngredient {
            name: name.trim().to_string(),
            category: category.map(str::to_string),
            base_unit,
            yield_factor,
        })
    }

    pub fn ingredient_by_name(&self, name: &str) -> Result<Ingredient> {
        self.db
            .get_ingredient_by_name(name)?
            .with_context(|| format!("Ingredient '{name}' not found"))
    }

    pub fn list_ingredients(&self, category: Option<&str>) -> Result<Vec<Ingredient>> {
        self.db.list_ingredients(category)
    }

    pub fn add_distributor(&self, name: &str) -> Result<Distributor> {
        if name.trim().is_empty() {
            bail!("Distributor name must not be empty");
        }
        self.db.insert_distributor(name.trim())
    }

    pub fn list_distributors(&self) -> Result<Vec<Distributor>> {
        self.db.list_distributors()
    }

    // --- Catalog: variants and prices ---

    /// Register a distributor variant. The pack configuration is parsed from
    /// `pack` (or the description when absent); an unparsable pack is stored
    /// without `total_base_units` and stays out of pricing until mapped.
    pub fn add_variant(
        &self,
        ingredient_id: i64,
        distributor_id: i64,
        description: &str,
        pack: Option<&str>,
    ) -> Result<DistributorVariant> {
        self.db
            .get_ingredient_by_id(ingredient_id)?
            .with_context(|| format!("Ingredient {ingredient_id} not found"))?;

        let pack_source = pack.unwrap_or(description);
        let parsed = parse_pack(pack_source, &self.tables);
        if parsed.is_none() {
            debug!(description, "pack did not parse; variant needs manual mapping");
        }

        let (pack_count, unit_size, unit, total_base_units) = match parsed {
            Some(p) => (
                Some(p.pack_count),
                Some(p.unit_size),
                Some(p.unit),
                Some(p.total_base_units),
            ),
            None => (None, None, None, None),
        };

        self.db.insert_variant(&NewVariant {
            ingredient_id,
            distributor_id,
            description: description.to_string(),
            pack_count,
            unit_size,
            unit,
            total_base_units,
        })
    }

    pub fn variants_for_ingredient(&self, ingredient_id: i64) -> Result<Vec<DistributorVariant>> {
        self.db.active_variants(ingredient_id)
    }

    pub fn record_price(
        &self,
        variant_id: i64,
        price_cents: i64,
        effective_date: Option<NaiveDate>,
        source: &str,
    ) -> Result<PriceObservation> {
        validate_price_cents(price_cents)?;
        self.db
            .get_variant_by_id(variant_id)?
            .with_context(|| format!("Variant {variant_id} not found"))?;
        self.db.insert_price_observation(&NewPriceObservation {
            variant_id,
            price_cents,
            effective_date: effective_date.unwrap_or_else(Self::today),
            source: source.to_string(),
        })
    }

    pub fn price_history(&self, variant_id: i64) -> Result<Vec<PriceObservation>> {
        self.db.price_observations(variant_id)
    }

    pub fn import_price_csv(&self, csv_data: &str, dry_run: bool) -> Result<PriceImportSummary> {
        let rows = price_import::parse_price_csv(csv_data.as_bytes())?;
        price_import::import_price_rows(&self.db, &self.tables, &rows, Self::today(), dry_run)
    }

    // --- Catalog: recipes ---

    pub fn create_recipe(
        &self,
        name: &str,
        yield_quantity: f64,
        yield_unit: &str,
        yield_weight_grams: Option<f64>,
    ) -> Result<Recipe> {
        if name.trim().is_empty() {
            bail!("Recipe name must not be empty");
        }
        validate_yield_quantity(yield_quantity)?;
        if let Some(weight) = yield_weight_grams {
            if weight <= 0.0 {
                bail!("Yield weight must be greater than 0");
            }
        }
        self.db.create_recipe(&NewRecipe {
            name: name.trim().to_string(),
            yield_quantity,
            yield_unit: yield_unit.trim().to_string(),
            yield_weight_grams,
        })
    }

    pub fn recipe_by_name(&self, name: &str) -> Result<Recipe> {
        self.db
            .get_recipe_by_name(name)?
            .with_context(|| format!("Recipe '{name}' not found"))
    }

    pub fn list_recipes(&self) -> Result<Vec<Recipe>> {
        self.db.list_recipes()
    }

    pub fn add_recipe_ingredient(
        &self,
        recipe_id: i64,
        ingredient_id: i64,
        quantity: f64,
        is_optional: bool,
    ) -> Result<RecipeIngredientLine> {
        validate_line_quantity(quantity)?;
        self.db
            .get_recipe_by_id(recipe_id)?
            .with_context(|| format!("Recipe {recipe_id} not found"))?;
        self.db
            .get_ingredient_by_id(ingredient_id)?
            .with_context(|| format!("Ingredient {ingredient_id} not found"))?;
        self.db
            .add_recipe_ingredient(recipe_id, ingredient_id, quantity, is_optional)
    }

    /// Link a component recipe. Links that would close a cycle are refused
    /// here; the engine still re-detects cycles at computation time.
    pub fn add_recipe_component(
        &self,
        recipe_id: i64,
        component_recipe_id: i64,
        quantity: f64,
    ) -> Result<RecipeComponentLink> {
        validate_line_quantity(quantity)?;
        self.db
            .get_recipe_by_id(recipe_id)?
            .with_context(|| format!("Recipe {recipe_id} not found"))?;
        self.db
            .get_recipe_by_id(component_recipe_id)?
            .with_context(|| format!("Recipe {component_recipe_id} not found"))?;
        self.db
            .add_recipe_component(recipe_id, component_recipe_id, quantity)
    }

    // --- Catalog: menu items ---

    pub fn add_menu_item(
        &self,
        name: &str,
        recipe_id: Option<i64>,
        portion_of_recipe: f64,
        menu_price_cents: i64,
        category: Option<&str>,
    ) -> Result<MenuItem> {
        if name.trim().is_empty() {
            bail!("Menu item name must not be empty");
        }
        validate_portion(portion_of_recipe)?;
        validate_price_cents(menu_price_cents)?;
        if let Some(recipe_id) = recipe_id {
            self.db
                .get_recipe_by_id(recipe_id)?
                .with_context(|| format!("Recipe {recipe_id} not found"))?;
        }
        self.db.create_menu_item(&NewMenuItem {
            name: name.trim().to_string(),
            recipe_id,
            portion_of_recipe,
            menu_price_cents,
            category: category.map(str::to_string),
        })
    }

    pub fn menu_item_by_name(&self, name: &str) -> Result<MenuItem> {
        self.db
            .get_menu_item_by_name(name)?
            .with_context(|| format!("Menu item '{name}' not found"))
    }

    pub fn list_menu_items(
        &self,
        category: Option<&str>,
        active_only: bool,
    ) -> Result<Vec<MenuItem>> {
        self.db.list_menu_items(category, active_only)
    }

    pub fn add_packaging_line(
        &self,
        menu_item_id: i64,
        ingredient_id: i64,
        quantity: f64,
        usage_rate: f64,
    ) -> Result<PackagingLine> {
        validate_line_quantity(quantity)?;
        validate_usage_rate(usage_rate)?;
        self.db
            .get_menu_item_by_id(menu_item_id)?
            .with_context(|| format!("Menu item {menu_item_id} not found"))?;
        self.db
            .get_ingredient_by_id(ingredient_id)?
            .with_context(|| format!("Ingredient {ingredient_id} not found"))?;
        self.db
            .add_packaging_line(menu_item_id, ingredient_id, quantity, usage_rate)
    }
}

use anyhow::Result;
use serde::Serialize;

use crate::models::{
    DistributorVariant, Ingredient, MenuItem, PackagingLine, PriceObservation, Recipe,
    RecipeComponentLink, RecipeIngredientLine,
};

/// A recipe with its lines, as the engine reads it.
#[derive(Debug, Clone, Serialize)]
pub struct RecipeDetail {
    pub recipe: Recipe,
    pub ingredient_lines: Vec<RecipeIngredientLine>,
    pub component_links: Vec<RecipeComponentLink>,
}

/// A menu item with its packaging lines, as the engine reads it.
#[derive(Debug, Clone, Serialize)]
pub struct MenuItemDetail {
    pub menu_item: MenuItem,
    pub packaging_lines: Vec<PackagingLine>,
}

/// Read-shape the costing engine needs from the surrounding service.
///
/// The engine is pure over this trait: the SQLite catalog implements it in
/// production, tests substitute in-memory maps. Implementations must return
/// price observations ascending by `effective_date` (ties broken by
/// insertion order); windowing is the selector's job.
pub trait CostDataSource {
    fn get_ingredient(&self, id: i64) -> Result<Option<Ingredient>>;
    fn list_active_variants(&self, ingredient_id: i64) -> Result<Vec<DistributorVariant>>;
    fn list_price_observations(&self, variant_id: i64) -> Result<Vec<PriceObservation>>;
    fn get_recipe(&self, id: i64) -> Result<Option<RecipeDetail>>;
    fn get_menu_item(&self, id: i64) -> Result<Option<MenuItemDetail>>;
}

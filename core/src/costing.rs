use std::collections::HashMap;

use chrono::NaiveDate;
use tracing::debug;

use crate::datasource::CostDataSource;
use crate::error::CostError;
use crate::models::{
    ComponentLineCost, CostBreakdown, EngineConfig, IngredientLineCost, MenuItemCostBreakdown,
    PackagingLineCost, PricingMode,
};
use crate::pricing::PriceSelector;
use crate::units::BaseUnit;

/// Round a fractional cent amount to whole cents, half away from zero.
/// Rounding happens per line; totals are sums of rounded lines.
fn round_cents(value: f64) -> i64 {
    value.round() as i64
}

/// Recursive cost roll-up over the recipe graph.
///
/// Each top-level call owns its ancestor path and memo cache; nothing is
/// shared across requests, so pricing mode and data changes between requests
/// can never leak stale results.
pub struct CostEngine<'a> {
    data: &'a dyn CostDataSource,
    selector: PriceSelector<'a>,
    config: EngineConfig,
}

impl<'a> CostEngine<'a> {
    pub fn new(data: &'a dyn CostDataSource, config: EngineConfig, as_of: NaiveDate) -> Self {
        CostEngine {
            data,
            selector: PriceSelector::new(data, as_of),
            config,
        }
    }

    /// Compute the full cost tree for a recipe.
    ///
    /// Fails atomically on cycles and depth overruns — no partial totals.
    pub fn recipe_cost(
        &self,
        recipe_id: i64,
        mode: PricingMode,
    ) -> Result<CostBreakdown, CostError> {
        let mut path = Vec::new();
        let mut cache = HashMap::new();
        self.compute(recipe_id, mode, &mut path, &mut cache)
    }

    fn compute(
        &self,
        recipe_id: i64,
        mode: PricingMode,
        path: &mut Vec<i64>,
        cache: &mut HashMap<i64, CostBreakdown>,
    ) -> Result<CostBreakdown, CostError> {
        if path.contains(&recipe_id) {
            let mut cycle = path.clone();
            cycle.push(recipe_id);
            return Err(CostError::CircularRecipeReference { path: cycle });
        }

        let depth = path.len() + 1;
        if depth > self.config.max_recursion_depth {
            return Err(CostError::MaxRecursionDepthExceeded {
                depth,
                max_depth: self.config.max_recursion_depth,
            });
        }

        // Diamond graphs: a component shared by multiple parents is computed
        // once per top-level call.
        if let Some(hit) = cache.get(&recipe_id) {
            return Ok(hit.clone());
        }

        let detail = self
            .data
            .get_recipe(recipe_id)?
            .ok_or(CostError::RecipeNotFound(recipe_id))?;
        debug!(recipe_id, depth, "computing recipe cost");

        let mut ingredients = Vec::with_capacity(detail.ingredient_lines.len());
        let mut total_ingredient_cost: i64 = 0;
        let mut unpriced_count: usize = 0;

        for line in &detail.ingredient_lines {
            let ingredient = self
                .data
                .get_ingredient(line.ingredient_id)?
                .ok_or(CostError::IngredientNotFound(line.ingredient_id))?;
            // yield_factor is validated into (0, 1] at write time
            let effective_quantity = line.quantity / ingredient.yield_factor;
            let selected = self.selector.select(ingredient.id, mode)?;

            let (price, distributor, cost_cents) = match selected {
                Some(p) => {
                    let cost = round_cents(effective_quantity * p.price_per_base_unit_cents);
                    total_ingredient_cost += cost;
                    (
                        Some(p.price_per_base_unit_cents),
                        p.distributor_name,
                        Some(cost),
                    )
                }
                None => {
                    unpriced_count += 1;
                    (None, None, None)
                }
            };

            ingredients.push(IngredientLineCost {
                ingredient_id: ingredient.id,
                ingredient_name: ingredient.name,
                base_unit: ingredient.base_unit,
                quantity: line.quantity,
                effective_quantity,
                is_optional: line.is_optional,
                price_per_base_unit_cents: price,
                distributor,
                cost_cents,
                has_price: cost_cents.is_some(),
            });
        }

        let mut components = Vec::with_capacity(detail.component_links.len());
        let mut total_component_cost: i64 = 0;

        path.push(recipe_id);
        for link in &detail.component_links {
            let child = self.compute(link.component_recipe_id, mode, path, cache)?;
            let cost_per_unit = if child.yield_quantity > 0.0 {
                child.total_cost_cents as f64 / child.yield_quantity
            } else {
                0.0
            };
            let line_cost = round_cents(cost_per_unit * link.quantity);
            total_component_cost += line_cost;
            unpriced_count += child.unpriced_count;

            components.push(ComponentLineCost {
                component_recipe_id: link.component_recipe_id,
                quantity: link.quantity,
                cost_per_unit_cents: cost_per_unit,
                line_cost_cents: line_cost,
                breakdown: child,
            });
        }
        path.pop();

        let total_cost = total_ingredient_cost + total_component_cost;
        let recipe = detail.recipe;

        let cost_per_unit = if recipe.yield_quantity > 0.0 {
            total_cost as f64 / recipe.yield_quantity
        } else {
            0.0
        };

        // Weight-based component costing: prefer the true finished weight;
        // fall back to the yield when it is already expressed in a base unit.
        let cost_per_gram = match recipe.yield_weight_grams {
            Some(weight) if weight > 0.0 => Some(total_cost as f64 / weight),
            _ if BaseUnit::parse(&recipe.yield_unit).is_some() && recipe.yield_quantity > 0.0 => {
                Some(cost_per_unit)
            }
            _ => None,
        };

        let breakdown = CostBreakdown {
            recipe_id: recipe.id,
            recipe_name: recipe.name,
            yield_quantity: recipe.yield_quantity,
            yield_unit: recipe.yield_unit,
            yield_weight_grams: recipe.yield_weight_grams,
            ingredients,
            components,
            total_ingredient_cost_cents: total_ingredient_cost,
            total_component_cost_cents: total_component_cost,
            total_cost_cents: total_cost,
            cost_per_unit_cents: cost_per_unit,
            cost_per_gram_cents: cost_per_gram,
            has_unpriced_ingredients: unpriced_count > 0,
            unpriced_count,
        };

        cache.insert(recipe_id, breakdown.clone());
        Ok(breakdown)
    }

    /// Cost a menu item: portioned recipe cost plus usage-rated packaging,
    /// against the menu price.
    pub fn menu_item_cost(
        &self,
        menu_item_id: i64,
        mode: PricingMode,
    ) -> Result<MenuItemCostBreakdown, CostError> {
        let detail = self
            .data
            .get_menu_item(menu_item_id)?
            .ok_or(CostError::MenuItemNotFound(menu_item_id))?;
        let item = detail.menu_item;

        let mut has_unpriced = false;

        let (recipe_cost_cents, recipe_name, recipe_breakdown) = match item.recipe_id {
            Some(recipe_id) => {
                let breakdown = self.recipe_cost(recipe_id, mode)?;
                let cents = round_cents(breakdown.cost_per_unit_cents * item.portion_of_recipe);
                has_unpriced |= breakdown.has_unpriced_ingredients;
                (cents, Some(breakdown.recipe_name.clone()), Some(breakdown))
            }
            None => (0, None, None),
        };

        let mut packaging = Vec::with_capacity(detail.packaging_lines.len());
        let mut packaging_cost_cents: i64 = 0;

        for line in &detail.packaging_lines {
            let ingredient = self
                .data
                .get_ingredient(line.ingredient_id)?
                .ok_or(CostError::IngredientNotFound(line.ingredient_id))?;
            let selected = self.selector.select(ingredient.id, mode)?;

            let (price, cost_cents) = match selected {
                Some(p) => {
                    let cost = round_cents(
                        line.quantity * line.usage_rate * p.price_per_base_unit_cents,
                    );
                    packaging_cost_cents += cost;
                    (Some(p.price_per_base_unit_cents), Some(cost))
                }
                None => {
                    has_unpriced = true;
                    (None, None)
                }
            };

            packaging.push(PackagingLineCost {
                ingredient_id: ingredient.id,
                ingredient_name: ingredient.name,
                quantity: line.quantity,
                usage_rate: line.usage_rate,
                price_per_base_unit_cents: price,
                cost_cents,
                has_price: cost_cents.is_some(),
            });
        }

        let total_cost = recipe_cost_cents + packaging_cost_cents;
        let gross_margin = item.menu_price_cents - total_cost;
        let food_cost_percent = if item.menu_price_cents > 0 {
            total_cost as f64 / item.menu_price_cents as f64 * 100.0
        } else {
            0.0
        };
        let margin_status = self.config.margin_thresholds.classify(food_cost_percent);

        Ok(MenuItemCostBreakdown {
            menu_item_id: item.id,
            name: item.name,
            menu_price_cents: item.menu_price_cents,
            recipe_name,
            portion_of_recipe: item.portion_of_recipe,
            recipe_cost_cents,
            packaging_cost_cents,
            total_cost_cents: total_cost,
            gross_margin_cents: gross_margin,
            food_cost_percent,
            margin_status,
            has_unpriced_ingredients: has_unpriced,
            recipe_breakdown,
            packaging,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    use anyhow::Result;

    use crate::datasource::{MenuItemDetail, RecipeDetail};
    use crate::models::{
        DistributorVariant, Ingredient, MarginStatus, MenuItem, PackagingLine, PriceObservation,
        Recipe, RecipeComponentLink, RecipeIngredientLine,
    };

    #[derive(Default)]
    struct MockSource {
        ingredients: std::collections::HashMap<i64, Ingredient>,
        variants: std::collections::HashMap<i64, Vec<DistributorVariant>>,
        observations: std::collections::HashMap<i64, Vec<PriceObservation>>,
        recipes: std::collections::HashMap<i64, RecipeDetail>,
        menu_items: std::collections::HashMap<i64, MenuItemDetail>,
        recipe_fetches: RefCell<std::collections::HashMap<i64, usize>>,
    }

    impl MockSource {
        fn add_ingredient(&mut self, id: i64, name: &str, yield_factor: f64) {
            self.ingredients.insert(
                id,
                Ingredient {
                    id,
                    name: name.to_string(),
                    category: None,
                    base_unit: BaseUnit::Gram,
                    yield_factor,
                    created_at: String::new(),
                    updated_at: String::new(),
                },
            );
        }

        /// Give an ingredient a single priced variant at `cents_per_base`
        /// cents per base unit (via a 1000-base-unit pack).
        fn price_ingredient(&mut self, ingredient_id: i64, cents_per_base: f64) {
            let variant_id = ingredient_id * 100;
            self.variants
                .entry(ingredient_id)
                .or_default()
                .push(DistributorVariant {
                    id: variant_id,
                    ingredient_id,
                    distributor_id: 1,
                    description: format!("PACK {ingredient_id}"),
                    pack_count: None,
                    unit_size: None,
                    unit: None,
                    total_base_units: Some(1000.0),
                    is_active: true,
                    created_at: String::new(),
                    distributor_name: Some("Supplier".to_string()),
                });
            self.observations.entry(variant_id).or_default().push(
                PriceObservation {
                    id: variant_id,
                    variant_id,
                    price_cents: (cents_per_base * 1000.0).round() as i64,
                    effective_date: "2025-06-01".parse().unwrap(),
                    source: "manual".to_string(),
                    created_at: String::new(),
                },
            );
        }

        fn add_recipe(&mut self, id: i64, name: &str, yield_quantity: f64, yield_unit: &str) {
            self.recipes.insert(
                id,
                RecipeDetail {
                    recipe: Recipe {
                        id,
                        name: name.to_string(),
                        yield_quantity,
                        yield_unit: yield_unit.to_string(),
                        yield_weight_grams: None,
                        created_at: String::new(),
                        updated_at: String::new(),
                    },
                    ingredient_lines: Vec::new(),
                    component_links: Vec::new(),
                },
            );
        }

        fn set_yield_weight(&mut self, recipe_id: i64, grams: f64) {
            self.recipes
                .get_mut(&recipe_id)
                .unwrap()
                .recipe
                .yield_weight_grams = Some(grams);
        }

        fn add_line(&mut self, recipe_id: i64, ingredient_id: i64, quantity: f64) {
            let detail = self.recipes.get_mut(&recipe_id).unwrap();
            let id = detail.ingredient_lines.len() as i64 + 1;
            detail.ingredient_lines.push(RecipeIngredientLine {
                id,
                recipe_id,
                ingredient_id,
                quantity,
                is_optional: false,
                ingredient_name: None,
            });
        }

        fn add_component(&mut self, recipe_id: i64, component_recipe_id: i64, quantity: f64) {
            let detail = self.recipes.get_mut(&recipe_id).unwrap();
            let id = detail.component_links.len() as i64 + 1;
            detail.component_links.push(RecipeComponentLink {
                id,
                recipe_id,
                component_recipe_id,
                quantity,
                component_name: None,
            });
        }

        fn add_menu_item(
            &mut self,
            id: i64,
            name: &str,
            recipe_id: Option<i64>,
            portion: f64,
            menu_price_cents: i64,
        ) {
            self.menu_items.insert(
                id,
                MenuItemDetail {
                    menu_item: MenuItem {
                        id,
                        name: name.to_string(),
                        recipe_id,
                        portion_of_recipe: portion,
                        menu_price_cents,
                        category: None,
                        is_active: true,
                        created_at: String::new(),
                        updated_at: String::new(),
                    },
                    packaging_lines: Vec::new(),
                },
            );
        }

        fn add_packaging(
            &mut self,
            menu_item_id: i64,
            ingredient_id: i64,
            quantity: f64,
            usage_rate: f64,
        ) {
            let detail = self.menu_items.get_mut(&menu_item_id).unwrap();
            let id = detail.packaging_lines.len() as i64 + 1;
            detail.packaging_lines.push(PackagingLine {
                id,
                menu_item_id,
                ingredient_id,
                quantity,
                usage_rate,
                ingredient_name: None,
            });
        }
    }

    impl CostDataSource for MockSource {
        fn get_ingredient(&self, id: i64) -> Result<Option<Ingredient>> {
            Ok(self.ingredients.get(&id).cloned())
        }

        fn list_active_variants(&self, ingredient_id: i64) -> Result<Vec<DistributorVariant>> {
            Ok(self.variants.get(&ingredient_id).cloned().unwrap_or_default())
        }

        fn list_price_observations(&self, variant_id: i64) -> Result<Vec<PriceObservation>> {
            Ok(self
                .observations
                .get(&variant_id)
                .cloned()
                .unwrap_or_default())
        }

        fn get_recipe(&self, id: i64) -> Result<Option<RecipeDetail>> {
            *self.recipe_fetches.borrow_mut().entry(id).or_insert(0) += 1;
            Ok(self.recipes.get(&id).cloned())
        }

        fn get_menu_item(&self, id: i64) -> Result<Option<MenuItemDetail>> {
            Ok(self.menu_items.get(&id).cloned())
        }
    }

    fn engine(source: &MockSource) -> CostEngine<'_> {
        CostEngine::new(source, EngineConfig::default(), "2025-06-15".parse().unwrap())
    }

    #[test]
    fn test_simple_recipe_cost() {
        let mut source = MockSource::default();
        source.add_ingredient(1, "Butter", 1.0);
        // $5.99 per lb-equivalent pack of 1000 g => 0.599 ¢/g... use exact:
        source.price_ingredient(1, 1.3206);
        source.add_recipe(10, "Butter Sauce", 10.0, "servings");
        source.add_line(10, 1, 227.0);

        let breakdown = engine(&source)
            .recipe_cost(10, PricingMode::Recent)
            .unwrap();

        // 227 g × 1.3206 ¢/g = 299.78 → 300
        assert_eq!(breakdown.total_cost_cents, 300);
        assert_eq!(breakdown.total_ingredient_cost_cents, 300);
        assert_eq!(breakdown.total_component_cost_cents, 0);
        assert!((breakdown.cost_per_unit_cents - 30.0).abs() < 1e-9);
        assert!(!breakdown.has_unpriced_ingredients);
        assert_eq!(breakdown.unpriced_count, 0);
        assert!(breakdown.ingredients[0].has_price);
    }

    #[test]
    fn test_yield_factor_inflates_effective_quantity() {
        let mut source = MockSource::default();
        source.add_ingredient(1, "Onion", 0.5);
        source.price_ingredient(1, 2.0);
        source.add_recipe(10, "Soup", 1.0, "batch");
        source.add_line(10, 1, 100.0);

        let breakdown = engine(&source)
            .recipe_cost(10, PricingMode::Recent)
            .unwrap();

        // 100 g usable needs 200 g purchased at 2 ¢/g
        assert!((breakdown.ingredients[0].effective_quantity - 200.0).abs() < 1e-9);
        assert_eq!(breakdown.total_cost_cents, 400);
    }

    #[test]
    fn test_rounding_is_per_line() {
        let mut source = MockSource::default();
        source.add_ingredient(1, "A", 1.0);
        source.add_ingredient(2, "B", 1.0);
        source.price_ingredient(1, 2.0);
        source.price_ingredient(2, 2.0);
        source.add_recipe(10, "Two Lines", 1.0, "batch");
        source.add_line(10, 1, 1.2);
        source.add_line(10, 2, 1.2);

        let breakdown = engine(&source)
            .recipe_cost(10, PricingMode::Recent)
            .unwrap();

        // Each line is 2.4 ¢ → 2 ¢; the total is 4, not round(4.8) = 5.
        assert_eq!(breakdown.ingredients[0].cost_cents, Some(2));
        assert_eq!(breakdown.total_cost_cents, 4);
    }

    #[test]
    fn test_unpriced_ingredient_flagged_not_zeroed() {
        let mut source = MockSource::default();
        source.add_ingredient(1, "Rare Spice", 1.0);
        source.add_ingredient(2, "Flour", 1.0);
        source.price_ingredient(2, 0.3);
        source.add_recipe(10, "Spiced Bread", 4.0, "loaves");
        source.add_line(10, 1, 10.0);
        source.add_line(10, 2, 1000.0);

        let breakdown = engine(&source)
            .recipe_cost(10, PricingMode::Recent)
            .unwrap();

        assert!(breakdown.has_unpriced_ingredients);
        assert_eq!(breakdown.unpriced_count, 1);
        assert!(!breakdown.ingredients[0].has_price);
        assert!(breakdown.ingredients[0].cost_cents.is_none());
        // priced line still contributes
        assert_eq!(breakdown.total_cost_cents, 300);
    }

    #[test]
    fn test_unpriced_flag_propagates_to_ancestors() {
        let mut source = MockSource::default();
        source.add_ingredient(1, "Mystery", 1.0);
        source.add_recipe(10, "Leaf", 1.0, "batch");
        source.add_line(10, 1, 5.0);
        source.add_recipe(20, "Middle", 1.0, "batch");
        source.add_component(20, 10, 1.0);
        source.add_recipe(30, "Root", 1.0, "batch");
        source.add_component(30, 20, 1.0);

        let breakdown = engine(&source)
            .recipe_cost(30, PricingMode::Recent)
            .unwrap();

        assert!(breakdown.has_unpriced_ingredients);
        assert!(breakdown.components[0].breakdown.has_unpriced_ingredients);
        assert!(
            breakdown.components[0].breakdown.components[0]
                .breakdown
                .has_unpriced_ingredients
        );
    }

    #[test]
    fn test_component_costing_scales_by_yield_unit() {
        let mut source = MockSource::default();
        source.add_ingredient(1, "Chocolate", 1.0);
        source.price_ingredient(1, 1.6);
        // Syrup: 200 g chocolate → 320 ¢, yields 500 ml
        source.add_recipe(10, "Chocolate Syrup", 500.0, "ml");
        source.add_line(10, 1, 200.0);
        // Mocha uses 30 ml of syrup
        source.add_recipe(20, "Mocha", 1.0, "servings");
        source.add_component(20, 10, 30.0);

        let breakdown = engine(&source)
            .recipe_cost(20, PricingMode::Recent)
            .unwrap();

        // 320 / 500 = 0.64 ¢ per ml × 30 = 19.2 → 19
        assert_eq!(breakdown.total_component_cost_cents, 19);
        assert_eq!(breakdown.components[0].line_cost_cents, 19);
        assert!((breakdown.components[0].cost_per_unit_cents - 0.64).abs() < 1e-9);
        // Child tree embedded intact
        assert_eq!(breakdown.components[0].breakdown.total_cost_cents, 320);
    }

    #[test]
    fn test_direct_cycle_fails_with_path() {
        let mut source = MockSource::default();
        source.add_recipe(1, "A", 1.0, "batch");
        source.add_recipe(2, "B", 1.0, "batch");
        source.add_component(1, 2, 1.0);
        source.add_component(2, 1, 1.0);

        let err = engine(&source)
            .recipe_cost(1, PricingMode::Recent)
            .unwrap_err();
        match err {
            CostError::CircularRecipeReference { path } => {
                assert_eq!(path, vec![1, 2, 1]);
            }
            other => panic!("expected cycle error, got {other:?}"),
        }
    }

    #[test]
    fn test_self_cycle_fails() {
        let mut source = MockSource::default();
        source.add_recipe(1, "Ouroboros", 1.0, "batch");
        source.add_component(1, 1, 1.0);

        let err = engine(&source)
            .recipe_cost(1, PricingMode::Recent)
            .unwrap_err();
        assert!(matches!(
            err,
            CostError::CircularRecipeReference { ref path } if path == &vec![1, 1]
        ));
    }

    #[test]
    fn test_diamond_component_computed_once() {
        let mut source = MockSource::default();
        source.add_ingredient(1, "Unpriced Leaf", 1.0);
        source.add_recipe(4, "Shared", 1.0, "batch");
        source.add_line(4, 1, 10.0);
        source.add_recipe(2, "Left", 1.0, "batch");
        source.add_component(2, 4, 1.0);
        source.add_recipe(3, "Right", 1.0, "batch");
        source.add_component(3, 4, 1.0);
        source.add_recipe(1, "Parent", 1.0, "batch");
        source.add_component(1, 2, 1.0);
        source.add_component(1, 3, 1.0);

        let breakdown = engine(&source)
            .recipe_cost(1, PricingMode::Recent)
            .unwrap();

        // Shared component fetched (and computed) exactly once.
        assert_eq!(source.recipe_fetches.borrow()[&4], 1);
        assert!(breakdown.has_unpriced_ingredients);
        // Flagged once per path through the diamond, not duplicated further.
        assert_eq!(breakdown.unpriced_count, 2);
    }

    #[test]
    fn test_depth_guard_fires_on_long_chains() {
        let mut source = MockSource::default();
        for id in 1..=40 {
            source.add_recipe(id, &format!("Level {id}"), 1.0, "batch");
        }
        for id in 1..40 {
            source.add_component(id, id + 1, 1.0);
        }

        let err = engine(&source)
            .recipe_cost(1, PricingMode::Recent)
            .unwrap_err();
        assert!(matches!(err, CostError::MaxRecursionDepthExceeded { .. }));

        // A deeper configured bound clears the same chain.
        let config = EngineConfig {
            max_recursion_depth: 64,
            ..EngineConfig::default()
        };
        let deep = CostEngine::new(&source, config, "2025-06-15".parse().unwrap());
        assert!(deep.recipe_cost(1, PricingMode::Recent).is_ok());
    }

    #[test]
    fn test_cost_per_unit_scenario() {
        // 12-serving recipe totaling $31.30 ⇒ ≈ 260.8 ¢ per serving
        let mut source = MockSource::default();
        source.add_ingredient(1, "Everything", 1.0);
        source.price_ingredient(1, 3.13);
        source.add_recipe(10, "Casserole", 12.0, "servings");
        source.add_line(10, 1, 1000.0);

        let breakdown = engine(&source)
            .recipe_cost(10, PricingMode::Recent)
            .unwrap();

        assert_eq!(breakdown.total_cost_cents, 3130);
        assert!((breakdown.cost_per_unit_cents - 260.8333).abs() < 1e-3);
    }

    #[test]
    fn test_cost_per_gram_from_yield_weight() {
        let mut source = MockSource::default();
        source.add_ingredient(1, "Sugar", 1.0);
        source.price_ingredient(1, 0.2);
        source.add_recipe(10, "Caramel", 500.0, "ml");
        source.set_yield_weight(10, 600.0);
        source.add_line(10, 1, 400.0);

        let breakdown = engine(&source)
            .recipe_cost(10, PricingMode::Recent)
            .unwrap();

        assert_eq!(breakdown.total_cost_cents, 80);
        let cpg = breakdown.cost_per_gram_cents.unwrap();
        assert!((cpg - 80.0 / 600.0).abs() < 1e-9);
    }

    #[test]
    fn test_cost_per_gram_falls_back_to_base_yield_unit() {
        let mut source = MockSource::default();
        source.add_ingredient(1, "Oats", 1.0);
        source.price_ingredient(1, 0.4);
        source.add_recipe(10, "Granola", 2000.0, "g");
        source.add_line(10, 1, 1500.0);

        let breakdown = engine(&source)
            .recipe_cost(10, PricingMode::Recent)
            .unwrap();

        assert_eq!(breakdown.total_cost_cents, 600);
        let cpg = breakdown.cost_per_gram_cents.unwrap();
        assert!((cpg - 0.3).abs() < 1e-9);
        // No fallback for non-base yield units
        source.add_recipe(11, "Portions", 4.0, "servings");
        source.add_line(11, 1, 100.0);
        let other = engine(&source).recipe_cost(11, PricingMode::Recent).unwrap();
        assert!(other.cost_per_gram_cents.is_none());
    }

    #[test]
    fn test_recipe_not_found() {
        let source = MockSource::default();
        let err = engine(&source)
            .recipe_cost(999, PricingMode::Recent)
            .unwrap_err();
        assert!(matches!(err, CostError::RecipeNotFound(999)));
    }

    #[test]
    fn test_monotonicity_under_price_increase() {
        let build = |cents_per_base: f64| {
            let mut source = MockSource::default();
            source.add_ingredient(1, "Flour", 1.0);
            source.price_ingredient(1, cents_per_base);
            source.add_recipe(10, "Bread", 4.0, "loaves");
            source.add_line(10, 1, 1000.0);
            source
        };
        let cheap = build(0.3);
        let pricey = build(0.45);
        let low = engine(&cheap).recipe_cost(10, PricingMode::Recent).unwrap();
        let high = engine(&pricey).recipe_cost(10, PricingMode::Recent).unwrap();
        assert!(high.total_cost_cents >= low.total_cost_cents);
        assert!(high.cost_per_unit_cents >= low.cost_per_unit_cents);
    }

    #[test]
    fn test_repeated_computation_is_deterministic() {
        let mut source = MockSource::default();
        source.add_ingredient(1, "Butter", 0.9);
        source.price_ingredient(1, 1.321);
        source.add_recipe(10, "Sauce", 7.0, "servings");
        source.add_line(10, 1, 333.0);

        let eng = engine(&source);
        let a = eng.recipe_cost(10, PricingMode::Recent).unwrap();
        let b = eng.recipe_cost(10, PricingMode::Recent).unwrap();
        assert_eq!(a.total_cost_cents, b.total_cost_cents);
        assert!((a.cost_per_unit_cents - b.cost_per_unit_cents).abs() < f64::EPSILON);
    }

    // --- Menu item costing ---

    #[test]
    fn test_menu_item_margin_scenario() {
        // $7.50 item costing $2.61 ⇒ 34.8% food cost, warning status
        let mut source = MockSource::default();
        source.add_ingredient(1, "Everything", 1.0);
        source.price_ingredient(1, 3.13);
        source.add_recipe(10, "Casserole", 12.0, "servings");
        source.add_line(10, 1, 1000.0);
        source.add_menu_item(100, "Casserole Plate", Some(10), 1.0, 750);

        let breakdown = engine(&source)
            .menu_item_cost(100, PricingMode::Recent)
            .unwrap();

        assert_eq!(breakdown.recipe_cost_cents, 261);
        assert_eq!(breakdown.total_cost_cents, 261);
        assert_eq!(breakdown.gross_margin_cents, 489);
        assert!((breakdown.food_cost_percent - 34.8).abs() < 0.01);
        assert_eq!(breakdown.margin_status, MarginStatus::Warning);
    }

    #[test]
    fn test_menu_item_packaging_usage_rate() {
        let mut source = MockSource::default();
        source.add_ingredient(1, "Cup", 1.0);
        source.add_ingredient(2, "Bag", 1.0);
        source.price_ingredient(1, 20.0);
        source.price_ingredient(2, 10.0);
        source.add_menu_item(100, "Latte", None, 1.0, 550);
        source.add_packaging(100, 1, 1.0, 1.0);
        // Only half of customers take a bag
        source.add_packaging(100, 2, 1.0, 0.5);

        let breakdown = engine(&source)
            .menu_item_cost(100, PricingMode::Recent)
            .unwrap();

        assert_eq!(breakdown.recipe_cost_cents, 0);
        assert_eq!(breakdown.packaging_cost_cents, 25);
        assert_eq!(breakdown.packaging[0].cost_cents, Some(20));
        assert_eq!(breakdown.packaging[1].cost_cents, Some(5));
    }

    #[test]
    fn test_menu_item_unpriced_packaging_flags() {
        let mut source = MockSource::default();
        source.add_ingredient(1, "Custom Box", 1.0);
        source.add_menu_item(100, "Retail Thing", None, 1.0, 1000);
        source.add_packaging(100, 1, 1.0, 1.0);

        let breakdown = engine(&source)
            .menu_item_cost(100, PricingMode::Recent)
            .unwrap();

        assert!(breakdown.has_unpriced_ingredients);
        assert!(!breakdown.packaging[0].has_price);
        assert_eq!(breakdown.packaging_cost_cents, 0);
    }

    #[test]
    fn test_menu_item_unpriced_recipe_flag_propagates() {
        let mut source = MockSource::default();
        source.add_ingredient(1, "Mystery", 1.0);
        source.add_recipe(10, "Leaf", 1.0, "batch");
        source.add_line(10, 1, 5.0);
        source.add_menu_item(100, "Dish", Some(10), 1.0, 900);

        let breakdown = engine(&source)
            .menu_item_cost(100, PricingMode::Recent)
            .unwrap();
        assert!(breakdown.has_unpriced_ingredients);
    }

    #[test]
    fn test_menu_item_portion_scales_per_unit_cost() {
        let mut source = MockSource::default();
        source.add_ingredient(1, "Flour", 1.0);
        source.price_ingredient(1, 0.3);
        // 4 loaves at 300 ¢ total → 75 ¢ per loaf
        source.add_recipe(10, "Bread", 4.0, "loaves");
        source.add_line(10, 1, 1000.0);
        // Half a loaf per serving
        source.add_menu_item(100, "Toast", Some(10), 0.5, 300);

        let breakdown = engine(&source)
            .menu_item_cost(100, PricingMode::Recent)
            .unwrap();
        assert_eq!(breakdown.recipe_cost_cents, 38); // 37.5 → 38
    }

    #[test]
    fn test_menu_item_cycle_aborts_whole_computation() {
        let mut source = MockSource::default();
        source.add_recipe(1, "A", 1.0, "batch");
        source.add_recipe(2, "B", 1.0, "batch");
        source.add_component(1, 2, 1.0);
        source.add_component(2, 1, 1.0);
        source.add_menu_item(100, "Broken", Some(1), 1.0, 500);

        let err = engine(&source)
            .menu_item_cost(100, PricingMode::Recent)
            .unwrap_err();
        assert!(matches!(err, CostError::CircularRecipeReference { .. }));
    }

    #[test]
    fn test_menu_item_not_found() {
        let source = MockSource::default();
        let err = engine(&source)
            .menu_item_cost(42, PricingMode::Recent)
            .unwrap_err();
        assert!(matches!(err, CostError::MenuItemNotFound(42)));
    }

    #[test]
    fn test_zero_menu_price_yields_zero_percent() {
        let mut source = MockSource::default();
        source.add_menu_item(100, "Comp", None, 1.0, 0);
        let breakdown = engine(&source)
            .menu_item_cost(100, PricingMode::Recent)
            .unwrap();
        assert!((breakdown.food_cost_percent - 0.0).abs() < f64::EPSILON);
        assert_eq!(breakdown.margin_status, MarginStatus::Healthy);
    }
}

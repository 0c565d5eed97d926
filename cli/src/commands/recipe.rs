use anyhow::Result;
use std::process;
use tabled::{
    Table, Tabled,
    settings::{Alignment, Modify, Style, object::Columns},
};

use platecost_core::models::{CostBreakdown, PricingMode};
use platecost_core::service::CostService;

use super::helpers::{fmt_cents, fmt_rate, truncate};

pub(crate) fn cmd_recipe_create(
    svc: &CostService,
    name: &str,
    yield_qty: f64,
    yield_unit: &str,
    yield_weight_grams: Option<f64>,
    json: bool,
) -> Result<()> {
    let recipe = svc.create_recipe(name, yield_qty, yield_unit, yield_weight_grams)?;
    if json {
        println!("{}", serde_json::to_string_pretty(&recipe)?);
    } else {
        let id = recipe.id;
        println!("Created recipe: {name} (id: {id}, yields {yield_qty} {yield_unit})");
        println!("Add ingredients with: platecost recipe add-ingredient \"{name}\" <ingredient> <quantity>");
    }
    Ok(())
}

pub(crate) fn cmd_recipe_add_ingredient(
    svc: &CostService,
    recipe_name: &str,
    ingredient_name: &str,
    quantity: f64,
    optional: bool,
    json: bool,
) -> Result<()> {
    let recipe = svc.recipe_by_name(recipe_name)?;
    let ingredient = svc.ingredient_by_name(ingredient_name)?;
    let line = svc.add_recipe_ingredient(recipe.id, ingredient.id, quantity, optional)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&line)?);
    } else {
        let unit = ingredient.base_unit;
        println!("Added {quantity} {unit} of {ingredient_name} to {recipe_name}");
    }
    Ok(())
}

pub(crate) fn cmd_recipe_add_component(
    svc: &CostService,
    recipe_name: &str,
    component_name: &str,
    quantity: f64,
    json: bool,
) -> Result<()> {
    let recipe = svc.recipe_by_name(recipe_name)?;
    let component = svc.recipe_by_name(component_name)?;
    let link = svc.add_recipe_component(recipe.id, component.id, quantity)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&link)?);
    } else {
        let unit = &component.yield_unit;
        println!("Added {quantity} {unit} of {component_name} to {recipe_name}");
    }
    Ok(())
}

pub(crate) fn cmd_recipe_list(svc: &CostService, json: bool) -> Result<()> {
    #[derive(Tabled)]
    struct RecipeRow {
        #[tabled(rename = "ID")]
        id: i64,
        #[tabled(rename = "Name")]
        name: String,
        #[tabled(rename = "Yields")]
        yields: String,
    }

    let recipes = svc.list_recipes()?;
    if recipes.is_empty() {
        if json {
            println!("[]");
        } else {
            eprintln!("No recipes found");
        }
        process::exit(2);
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&recipes)?);
        return Ok(());
    }

    let rows: Vec<RecipeRow> = recipes
        .iter()
        .map(|r| RecipeRow {
            id: r.id,
            name: truncate(&r.name, 30),
            yields: format!("{} {}", r.yield_quantity, r.yield_unit),
        })
        .collect();

    let table = Table::new(&rows)
        .with(Style::rounded())
        .with(Modify::new(Columns::new(2..)).with(Alignment::right()))
        .to_string();
    println!("{table}");

    Ok(())
}

pub(crate) fn cmd_recipe_cost(
    svc: &CostService,
    recipe_name: &str,
    mode: PricingMode,
    json: bool,
) -> Result<()> {
    let recipe = svc.recipe_by_name(recipe_name)?;
    let breakdown = svc.recipe_cost(recipe.id, mode)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&breakdown)?);
        return Ok(());
    }

    print_breakdown(&breakdown, 0);
    Ok(())
}

fn print_breakdown(breakdown: &CostBreakdown, depth: usize) {
    let pad = "  ".repeat(depth);
    let name = &breakdown.recipe_name;
    let total = fmt_cents(breakdown.total_cost_cents);
    let per_unit = fmt_rate(breakdown.cost_per_unit_cents);
    let yield_qty = breakdown.yield_quantity;
    let yield_unit = &breakdown.yield_unit;

    if depth == 0 {
        println!("=== {name} ===");
    } else {
        println!("{pad}[{name}]");
    }
    println!("{pad}  Yield: {yield_qty} {yield_unit}  |  Total: {total}  |  Per unit: {per_unit}");
    if let Some(cpg) = breakdown.cost_per_gram_cents {
        let rate = fmt_rate(cpg);
        println!("{pad}  Per gram: {rate}");
    }
    if breakdown.has_unpriced_ingredients {
        let count = breakdown.unpriced_count;
        println!("{pad}  ⚠ {count} unpriced ingredient line(s) — totals are incomplete");
    }

    if !breakdown.ingredients.is_empty() {
        println!("{pad}  INGREDIENTS:");
        for line in &breakdown.ingredients {
            let iname = &line.ingredient_name;
            let qty = line.quantity;
            let unit = line.base_unit;
            let optional = if line.is_optional { " (optional)" } else { "" };
            match (line.cost_cents, line.price_per_base_unit_cents) {
                (Some(cost), Some(rate)) => {
                    let cost = fmt_cents(cost);
                    let rate = fmt_rate(rate);
                    let from = line
                        .distributor
                        .as_deref()
                        .map(|d| format!(" ({d})"))
                        .unwrap_or_default();
                    println!("{pad}    {iname} — {qty} {unit} — {cost} @ {rate}/{unit}{from}{optional}");
                }
                _ => {
                    println!("{pad}    {iname} — {qty} {unit} — NO PRICE{optional}");
                }
            }
        }
    }

    if !breakdown.components.is_empty() {
        println!("{pad}  COMPONENTS:");
        for component in &breakdown.components {
            let qty = component.quantity;
            let cost = fmt_cents(component.line_cost_cents);
            let rate = fmt_rate(component.cost_per_unit_cents);
            println!("{pad}    {qty} × {rate} = {cost}");
            print_breakdown(&component.breakdown, depth + 3);
        }
    }
}

use anyhow::Result;
use std::process;
use tabled::{
    Table, Tabled,
    settings::{Alignment, Modify, Style, object::Columns},
};

use platecost_core::models::PricingMode;
use platecost_core::price_import::parse_price_cents;
use platecost_core::service::CostService;

use super::helpers::{fmt_cents, status_label, truncate};

pub(crate) fn cmd_menu_add(
    svc: &CostService,
    name: &str,
    price: &str,
    recipe: Option<String>,
    portion: f64,
    category: Option<String>,
    json: bool,
) -> Result<()> {
    let menu_price_cents = parse_price_cents(price)?;
    let recipe_id = match recipe {
        Some(recipe_name) => Some(svc.recipe_by_name(&recipe_name)?.id),
        None => None,
    };
    let item = svc.add_menu_item(name, recipe_id, portion, menu_price_cents, category.as_deref())?;

    if json {
        println!("{}", serde_json::to_string_pretty(&item)?);
    } else {
        let id = item.id;
        let price = fmt_cents(item.menu_price_cents);
        println!("Added menu item: {name} (id: {id}, price: {price})");
    }
    Ok(())
}

pub(crate) fn cmd_menu_add_packaging(
    svc: &CostService,
    item_name: &str,
    ingredient_name: &str,
    quantity: f64,
    usage_rate: f64,
    json: bool,
) -> Result<()> {
    let item = svc.menu_item_by_name(item_name)?;
    let ingredient = svc.ingredient_by_name(ingredient_name)?;
    let line = svc.add_packaging_line(item.id, ingredient.id, quantity, usage_rate)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&line)?);
    } else {
        let pct = usage_rate * 100.0;
        println!("Added {quantity} × {ingredient_name} ({pct:.0}% usage) to {item_name}");
    }
    Ok(())
}

pub(crate) fn cmd_menu_list(svc: &CostService, category: Option<String>, json: bool) -> Result<()> {
    let items = svc.list_menu_items(category.as_deref(), true)?;
    if json {
        println!("{}", serde_json::to_string_pretty(&items)?);
        return Ok(());
    }
    if items.is_empty() {
        eprintln!("No menu items found");
        process::exit(2);
    }
    for item in &items {
        let id = item.id;
        let name = &item.name;
        let price = fmt_cents(item.menu_price_cents);
        let category = item.category.as_deref().unwrap_or("-");
        println!("{id:>4}  {name:<30}  {price:>8}  [{category}]");
    }
    Ok(())
}

pub(crate) fn cmd_menu_cost(
    svc: &CostService,
    item_name: &str,
    mode: PricingMode,
    json: bool,
) -> Result<()> {
    let item = svc.menu_item_by_name(item_name)?;
    let breakdown = svc.menu_item_cost(item.id, mode)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&breakdown)?);
        return Ok(());
    }

    let name = &breakdown.name;
    println!("=== {name} ===");
    let price = fmt_cents(breakdown.menu_price_cents);
    println!("  Menu price:  {price}");

    let recipe_cost = fmt_cents(breakdown.recipe_cost_cents);
    match &breakdown.recipe_name {
        Some(recipe_name) => {
            let portion = breakdown.portion_of_recipe;
            println!("  Recipe cost: {recipe_cost} ({recipe_name} × {portion})");
        }
        None => println!("  Recipe cost: {recipe_cost}"),
    }

    let packaging = fmt_cents(breakdown.packaging_cost_cents);
    println!("  Packaging:   {packaging}");
    for line in &breakdown.packaging {
        let iname = &line.ingredient_name;
        let qty = line.quantity;
        let rate = line.usage_rate * 100.0;
        match line.cost_cents {
            Some(cost) => {
                let cost = fmt_cents(cost);
                println!("    {iname} — {qty} × {rate:.0}% — {cost}");
            }
            None => println!("    {iname} — {qty} × {rate:.0}% — NO PRICE"),
        }
    }

    let total = fmt_cents(breakdown.total_cost_cents);
    let margin = fmt_cents(breakdown.gross_margin_cents);
    let pct = breakdown.food_cost_percent;
    let status = status_label(breakdown.margin_status);
    println!("  Total cost:  {total}  |  Gross margin: {margin}");
    println!("  Food cost:   {pct:.1}%  [{status}]");
    if breakdown.has_unpriced_ingredients {
        println!("  ⚠ unpriced ingredients — cost is incomplete");
    }
    Ok(())
}

pub(crate) fn cmd_menu_analyze(
    svc: &CostService,
    mode: PricingMode,
    category: Option<String>,
    json: bool,
) -> Result<()> {
    #[derive(Tabled)]
    struct AnalysisRow {
        #[tabled(rename = "Item")]
        name: String,
        #[tabled(rename = "Category")]
        category: String,
        #[tabled(rename = "Price")]
        price: String,
        #[tabled(rename = "Cost")]
        cost: String,
        #[tabled(rename = "Food %")]
        food_pct: String,
        #[tabled(rename = "Margin")]
        margin: String,
        #[tabled(rename = "Status")]
        status: String,
    }

    let analysis = svc.analyze_menu(mode, category.as_deref())?;

    if json {
        println!("{}", serde_json::to_string_pretty(&analysis)?);
        return Ok(());
    }
    if analysis.items.is_empty() {
        eprintln!("No active menu items to analyze");
        process::exit(2);
    }

    let rows: Vec<AnalysisRow> = analysis
        .items
        .iter()
        .map(|item| AnalysisRow {
            name: truncate(&item.name, 30),
            category: item.category.clone().unwrap_or_default(),
            price: fmt_cents(item.menu_price_cents),
            cost: if item.has_unpriced_ingredients {
                format!("{}*", fmt_cents(item.total_cost_cents))
            } else {
                fmt_cents(item.total_cost_cents)
            },
            food_pct: format!("{:.1}%", item.food_cost_percent),
            margin: fmt_cents(item.gross_margin_cents),
            status: status_label(item.margin_status).to_string(),
        })
        .collect();

    let table = Table::new(&rows)
        .with(Style::rounded())
        .with(Modify::new(Columns::new(2..6)).with(Alignment::right()))
        .to_string();
    println!("{table}");

    let summary = &analysis.summary;
    let avg = summary.avg_food_cost_percent;
    let healthy = summary.healthy_count;
    let warning = summary.warning_count;
    let danger = summary.danger_count;
    println!(
        "\n  {} items  |  avg food cost {avg:.1}%  |  {healthy} healthy / {warning} warning / {danger} danger",
        summary.total_items
    );
    if analysis.items.iter().any(|i| i.has_unpriced_ingredients) {
        println!("  * cost incomplete: unpriced ingredients");
    }
    Ok(())
}

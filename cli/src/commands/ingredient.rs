use anyhow::{Context, Result};
use std::process;
use tabled::{
    Table, Tabled,
    settings::{Alignment, Modify, Style, object::Columns},
};

use platecost_core::BaseUnit;
use platecost_core::service::CostService;

use super::helpers::truncate;

pub(crate) fn cmd_ingredient_add(
    svc: &CostService,
    name: &str,
    unit: &str,
    category: Option<String>,
    yield_factor: f64,
    json: bool,
) -> Result<()> {
    let base_unit = BaseUnit::parse(unit)
        .with_context(|| format!("Invalid base unit '{unit}'. Use g, ml, or each"))?;
    let ingredient = svc.add_ingredient(name, category.as_deref(), base_unit, yield_factor)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&ingredient)?);
    } else {
        let id = ingredient.id;
        println!("Added ingredient: {name} (id: {id}, base unit: {base_unit})");
    }
    Ok(())
}

pub(crate) fn cmd_ingredient_list(
    svc: &CostService,
    category: Option<String>,
    json: bool,
) -> Result<()> {
    #[derive(Tabled)]
    struct IngredientRow {
        #[tabled(rename = "ID")]
        id: i64,
        #[tabled(rename = "Name")]
        name: String,
        #[tabled(rename = "Category")]
        category: String,
        #[tabled(rename = "Base unit")]
        base_unit: String,
        #[tabled(rename = "Yield")]
        yield_factor: String,
    }

    let ingredients = svc.list_ingredients(category.as_deref())?;
    if ingredients.is_empty() {
        if json {
            println!("[]");
        } else {
            eprintln!("No ingredients found");
        }
        process::exit(2);
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&ingredients)?);
        return Ok(());
    }

    let rows: Vec<IngredientRow> = ingredients
        .iter()
        .map(|i| IngredientRow {
            id: i.id,
            name: truncate(&i.name, 35),
            category: i.category.clone().unwrap_or_default(),
            base_unit: i.base_unit.to_string(),
            yield_factor: format!("{:.0}%", i.yield_factor * 100.0),
        })
        .collect();

    let table = Table::new(&rows)
        .with(Style::rounded())
        .with(Modify::new(Columns::new(4..)).with(Alignment::right()))
        .to_string();
    println!("{table}");

    Ok(())
}

pub(crate) fn cmd_distributor_add(svc: &CostService, name: &str, json: bool) -> Result<()> {
    let distributor = svc.add_distributor(name)?;
    if json {
        println!("{}", serde_json::to_string_pretty(&distributor)?);
    } else {
        let id = distributor.id;
        println!("Added distributor: {name} (id: {id})");
    }
    Ok(())
}

pub(crate) fn cmd_distributor_list(svc: &CostService, json: bool) -> Result<()> {
    let distributors = svc.list_distributors()?;
    if json {
        println!("{}", serde_json::to_string_pretty(&distributors)?);
        return Ok(());
    }
    if distributors.is_empty() {
        eprintln!("No distributors found");
        process::exit(2);
    }
    for d in &distributors {
        let id = d.id;
        let name = &d.name;
        println!("{id:>4}  {name}");
    }
    Ok(())
}

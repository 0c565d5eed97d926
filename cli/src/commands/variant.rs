use anyhow::Result;
use std::process;
use tabled::{
    Table, Tabled,
    settings::{Alignment, Modify, Style, object::Columns},
};

use platecost_core::price_import::parse_price_cents;
use platecost_core::service::CostService;

use super::helpers::{fmt_cents, parse_date, truncate};

pub(crate) fn cmd_variant_add(
    svc: &CostService,
    ingredient: &str,
    distributor: &str,
    description: &str,
    pack: Option<String>,
    json: bool,
) -> Result<()> {
    let ingredient = svc.ingredient_by_name(ingredient)?;
    let distributor = match svc
        .list_distributors()?
        .into_iter()
        .find(|d| d.name.eq_ignore_ascii_case(distributor))
    {
        Some(d) => d,
        None => svc.add_distributor(distributor)?,
    };

    let variant = svc.add_variant(ingredient.id, distributor.id, description, pack.as_deref())?;

    if json {
        println!("{}", serde_json::to_string_pretty(&variant)?);
        return Ok(());
    }

    let id = variant.id;
    println!("Added variant {id}: {description} ({})", distributor.name);
    match variant.total_base_units {
        Some(total) => {
            let unit = ingredient.base_unit;
            println!("  Pack resolved to {total:.1} {unit}");
        }
        None => {
            println!("  Pack could not be parsed — variant is excluded from pricing");
            println!("  Re-add with an explicit --pack (e.g. --pack \"36/1LB\")");
        }
    }
    Ok(())
}

pub(crate) fn cmd_variant_list(svc: &CostService, ingredient: &str, json: bool) -> Result<()> {
    #[derive(Tabled)]
    struct VariantRow {
        #[tabled(rename = "ID")]
        id: i64,
        #[tabled(rename = "Distributor")]
        distributor: String,
        #[tabled(rename = "Description")]
        description: String,
        #[tabled(rename = "Pack total")]
        total: String,
    }

    let ingredient = svc.ingredient_by_name(ingredient)?;
    let variants = svc.variants_for_ingredient(ingredient.id)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&variants)?);
        return Ok(());
    }
    if variants.is_empty() {
        eprintln!("No active variants for {}", ingredient.name);
        process::exit(2);
    }

    let rows: Vec<VariantRow> = variants
        .iter()
        .map(|v| VariantRow {
            id: v.id,
            distributor: v.distributor_name.clone().unwrap_or_default(),
            description: truncate(&v.description, 40),
            total: v.total_base_units.map_or("unmapped".into(), |t| {
                format!("{t:.1} {}", ingredient.base_unit)
            }),
        })
        .collect();

    let table = Table::new(&rows)
        .with(Style::rounded())
        .with(Modify::new(Columns::new(3..)).with(Alignment::right()))
        .to_string();
    println!("{table}");
    Ok(())
}

pub(crate) fn cmd_price_record(
    svc: &CostService,
    variant_id: i64,
    price: &str,
    date: Option<String>,
    source: &str,
    json: bool,
) -> Result<()> {
    let price_cents = parse_price_cents(price)?;
    let effective_date = parse_date(date)?;
    let observation = svc.record_price(variant_id, price_cents, effective_date, source)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&observation)?);
    } else {
        let formatted = fmt_cents(observation.price_cents);
        let date = observation.effective_date;
        println!("Recorded {formatted} for variant {variant_id} effective {date}");
    }
    Ok(())
}

pub(crate) fn cmd_price_history(svc: &CostService, variant_id: i64, json: bool) -> Result<()> {
    let observations = svc.price_history(variant_id)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&observations)?);
        return Ok(());
    }
    if observations.is_empty() {
        eprintln!("No price observations for variant {variant_id}");
        process::exit(2);
    }

    for obs in &observations {
        let date = obs.effective_date;
        let price = fmt_cents(obs.price_cents);
        let source = &obs.source;
        println!("{date}  {price:>10}  ({source})");
    }
    Ok(())
}

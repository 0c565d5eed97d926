use anyhow::Result;
use std::process;
use tabled::{
    Table, Tabled,
    settings::{Alignment, Modify, Style, object::Columns},
};

use platecost_core::models::PriceComparison;
use platecost_core::service::CostService;

use super::helpers::{fmt_cents, fmt_rate, truncate};

pub(crate) fn cmd_compare(
    svc: &CostService,
    ingredient: Option<String>,
    category: Option<String>,
    json: bool,
) -> Result<()> {
    let comparisons = match (&ingredient, &category) {
        (Some(name), _) => {
            let ingredient = svc.ingredient_by_name(name)?;
            vec![svc.price_comparison(ingredient.id)?]
        }
        (None, Some(category)) => svc.price_comparison_by_category(category)?,
        (None, None) => {
            eprintln!("Provide an ingredient name or --category");
            process::exit(2);
        }
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&comparisons)?);
        return Ok(());
    }

    for comparison in &comparisons {
        print_comparison(comparison);
    }
    Ok(())
}

fn print_comparison(comparison: &PriceComparison) {
    #[derive(Tabled)]
    struct CompareRow {
        #[tabled(rename = "Distributor")]
        distributor: String,
        #[tabled(rename = "Description")]
        description: String,
        #[tabled(rename = "Latest price")]
        price: String,
        #[tabled(rename = "Per unit")]
        per_unit: String,
        #[tabled(rename = "Best")]
        best: String,
    }

    let name = &comparison.ingredient_name;
    let unit = comparison.base_unit;
    println!("=== {name} (per {unit}) ===");

    if comparison.variants.is_empty() {
        println!("  no active variants\n");
        return;
    }

    let rows: Vec<CompareRow> = comparison
        .variants
        .iter()
        .map(|v| CompareRow {
            distributor: truncate(&v.distributor_name, 24),
            description: truncate(&v.description, 36),
            price: v.price_cents.map_or("-".into(), fmt_cents),
            per_unit: v
                .price_per_base_unit_cents
                .map_or("unpriced".into(), fmt_rate),
            best: if v.is_best_price { "◀".to_string() } else { String::new() },
        })
        .collect();

    let table = Table::new(&rows)
        .with(Style::rounded())
        .with(Modify::new(Columns::new(2..4)).with(Alignment::right()))
        .to_string();
    println!("{table}");

    if let Some(spread) = comparison.spread_percent {
        println!("  spread: {spread:.1}% between cheapest and most expensive\n");
    } else {
        println!();
    }
}

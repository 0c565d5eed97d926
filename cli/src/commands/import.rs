use anyhow::{Context, Result};
use serde::Serialize;
use std::path::Path;

use platecost_core::service::CostService;

pub(crate) fn cmd_price_import(
    svc: &CostService,
    file: &Path,
    dry_run: bool,
    json: bool,
) -> Result<()> {
    let csv_data = std::fs::read_to_string(file)
        .with_context(|| format!("Failed to read file: {}", file.display()))?;

    let summary = svc.import_price_csv(&csv_data, dry_run)?;

    if json {
        #[derive(Serialize)]
        struct JsonSummary {
            rows_parsed: usize,
            prices_recorded: usize,
            distributors_created: usize,
            variants_created: usize,
            variants_reused: usize,
            unmatched_ingredients: usize,
            unparsed_packs: usize,
            dry_run: bool,
        }
        let out = JsonSummary {
            rows_parsed: summary.rows_parsed,
            prices_recorded: summary.prices_recorded,
            distributors_created: summary.distributors_created,
            variants_created: summary.variants_created,
            variants_reused: summary.variants_reused,
            unmatched_ingredients: summary.unmatched_ingredients,
            unparsed_packs: summary.unparsed_packs,
            dry_run,
        };
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }

    if dry_run {
        println!("Dry run — nothing was written");
    }
    println!("Rows parsed:        {}", summary.rows_parsed);
    println!("Prices recorded:    {}", summary.prices_recorded);
    println!("Variants created:   {}", summary.variants_created);
    println!("Variants reused:    {}", summary.variants_reused);
    if summary.distributors_created > 0 {
        println!("New distributors:   {}", summary.distributors_created);
    }
    if summary.unparsed_packs > 0 {
        println!("Unparsed packs:     {} (need manual mapping)", summary.unparsed_packs);
    }
    if summary.unmatched_ingredients > 0 {
        println!(
            "Unmatched rows:     {} (no catalog ingredient)",
            summary.unmatched_ingredients
        );
    }
    Ok(())
}

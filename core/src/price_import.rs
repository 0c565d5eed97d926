use std::io::Read;

use anyhow::{Context, Result, bail};
use chrono::NaiveDate;
use tracing::debug;

use crate::db::Database;
use crate::models::{NewPriceObservation, NewVariant};
use crate::pack::parse_pack;
use crate::units::UnitTables;

/// A single row parsed from a distributor price-list CSV.
#[derive(Debug, Clone)]
pub struct PriceRow {
    pub distributor: String,
    pub description: String,
    pub ingredient: String,
    pub pack: Option<String>,
    pub price_cents: i64,
    pub effective_date: Option<NaiveDate>,
}

/// Summary of what a price-list import would do / did.
#[derive(Debug, Clone, Default)]
pub struct PriceImportSummary {
    pub rows_parsed: usize,
    pub prices_recorded: usize,
    pub distributors_created: usize,
    pub variants_created: usize,
    pub variants_reused: usize,
    /// Rows whose ingredient name matched nothing in the catalog.
    pub unmatched_ingredients: usize,
    /// Rows whose pack description matched no pattern (queued for manual
    /// mapping; the row is skipped, never an error).
    pub unparsed_packs: usize,
}

/// Parse a price-list CSV export from any reader.
///
/// Expected header: `Distributor,Description,Ingredient,Pack,Price[,Date]`
/// (`Pack` and `Date` columns are optional; an absent pack falls back to
/// parsing the description).
pub fn parse_price_csv<R: Read>(reader: R) -> Result<Vec<PriceRow>> {
    let mut rdr = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(reader);

    let headers = rdr.headers().context("Failed to read CSV headers")?.clone();

    let required = ["Distributor", "Description", "Ingredient", "Price"];
    for name in &required {
        if !headers.iter().any(|h| h.eq_ignore_ascii_case(name)) {
            bail!("Missing required column: {name}");
        }
    }

    let col =
        |name: &str| -> Option<usize> { headers.iter().position(|h| h.eq_ignore_ascii_case(name)) };

    let idx_distributor = col("Distributor").context("Missing 'Distributor' column")?;
    let idx_description = col("Description").context("Missing 'Description' column")?;
    let idx_ingredient = col("Ingredient").context("Missing 'Ingredient' column")?;
    let idx_price = col("Price").context("Missing 'Price' column")?;
    let idx_pack = col("Pack");
    let idx_date = col("Date");

    let mut rows = Vec::new();

    for (line_num, result) in rdr.records().enumerate() {
        let record = result.with_context(|| format!("Failed to parse CSV row {}", line_num + 2))?;

        let get = |idx: usize| record.get(idx).unwrap_or("").trim().to_string();
        let distributor = get(idx_distributor);
        let description = get(idx_description);
        let ingredient = get(idx_ingredient);

        if distributor.is_empty() && description.is_empty() {
            continue; // skip blank rows
        }
        if distributor.is_empty() || description.is_empty() {
            bail!("Row {}: distributor and description are required", line_num + 2);
        }

        let price_str = get(idx_price);
        let price_cents = parse_price_cents(&price_str)
            .with_context(|| format!("Row {}: invalid price '{price_str}'", line_num + 2))?;

        let pack = idx_pack
            .map(|i| record.get(i).unwrap_or("").trim().to_string())
            .filter(|s| !s.is_empty());

        let effective_date = match idx_date.map(|i| record.get(i).unwrap_or("").trim()) {
            Some(s) if !s.is_empty() => Some(
                NaiveDate::parse_from_str(s, "%Y-%m-%d")
                    .with_context(|| format!("Row {}: invalid date '{s}'", line_num + 2))?,
            ),
            _ => None,
        };

        rows.push(PriceRow {
            distributor,
            description,
            ingredient,
            pack,
            price_cents,
            effective_date,
        });
    }

    Ok(rows)
}

/// Parse a money string ("$142.56", "142.56", "1,042.50") into integer cents.
pub fn parse_price_cents(s: &str) -> Result<i64> {
    let cleaned: String = s
        .chars()
        .filter(|c| !matches!(c, '$' | ',' | ' '))
        .collect();
    if cleaned.is_empty() {
        bail!("Empty price");
    }
    let dollars: f64 = cleaned
        .parse()
        .map_err(|_| anyhow::anyhow!("Cannot parse price: '{s}'"))?;
    if dollars < 0.0 {
        bail!("Price must not be negative: '{s}'");
    }
    Ok((dollars * 100.0).round() as i64)
}

/// Import parsed price rows into the catalog.
///
/// Each row resolves its distributor (created on demand), matches the
/// ingredient by name, parses the pack, and appends one price observation.
/// Rows with unmatched ingredients or unparsable packs are counted and
/// skipped. When `dry_run` is true, nothing is written.
pub fn import_price_rows(
    db: &Database,
    tables: &UnitTables,
    rows: &[PriceRow],
    default_date: NaiveDate,
    dry_run: bool,
) -> Result<PriceImportSummary> {
    let mut summary = PriceImportSummary {
        rows_parsed: rows.len(),
        ..PriceImportSummary::default()
    };
    // Dry-run bookkeeping: rows that *would* create a distributor/variant
    // must not be counted twice.
    let mut pending_distributors: std::collections::HashSet<String> =
        std::collections::HashSet::new();
    let mut pending_variants: std::collections::HashSet<(String, i64, String)> =
        std::collections::HashSet::new();

    for row in rows {
        let Some(ingredient) = db.get_ingredient_by_name(&row.ingredient)? else {
            debug!(ingredient = %row.ingredient, "no catalog match, skipping row");
            summary.unmatched_ingredients += 1;
            continue;
        };

        let pack_source = row.pack.as_deref().unwrap_or(&row.description);
        let Some(pack) = parse_pack(pack_source, tables) else {
            debug!(pack = %pack_source, "pack did not parse, queued for manual mapping");
            summary.unparsed_packs += 1;
            continue;
        };

        let distributor_key = row.distributor.to_lowercase();
        let distributor = db.get_distributor_by_name(&row.distributor)?;
        if distributor.is_none() && pending_distributors.insert(distributor_key.clone()) {
            summary.distributors_created += 1;
        }

        if dry_run {
            let variant_key = (
                distributor_key,
                ingredient.id,
                row.description.to_lowercase(),
            );
            let existing = match &distributor {
                Some(d) => db.find_variant(ingredient.id, d.id, &row.description)?,
                None => None,
            };
            if existing.is_some() || !pending_variants.insert(variant_key) {
                summary.variants_reused += 1;
            } else {
                summary.variants_created += 1;
            }
            summary.prices_recorded += 1;
            continue;
        }

        let distributor = match distributor {
            Some(d) => d,
            None => db.insert_distributor(&row.distributor)?,
        };

        let variant = match db.find_variant(ingredient.id, distributor.id, &row.description)? {
            Some(existing) => {
                summary.variants_reused += 1;
                existing
            }
            None => {
                summary.variants_created += 1;
                db.insert_variant(&NewVariant {
                    ingredient_id: ingredient.id,
                    distributor_id: distributor.id,
                    description: row.description.clone(),
                    pack_count: Some(pack.pack_count),
                    unit_size: Some(pack.unit_size),
                    unit: Some(pack.unit.clone()),
                    total_base_units: Some(pack.total_base_units),
                })?
            }
        };

        db.insert_price_observation(&NewPriceObservation {
            variant_id: variant.id,
            price_cents: row.price_cents,
            effective_date: row.effective_date.unwrap_or(default_date),
            source: "import".to_string(),
        })?;
        summary.prices_recorded += 1;
    }

    Ok(summary)
}

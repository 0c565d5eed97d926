use chrono::{Duration, NaiveDate};
use tracing::debug;

use crate::datasource::CostDataSource;
use crate::error::CostError;
use crate::models::{Ingredient, PriceComparison, PriceComparisonRow, PriceObservation, PricingMode};

/// The price-per-base-unit chosen for an ingredient under some policy.
#[derive(Debug, Clone)]
pub struct SelectedPrice {
    pub variant_id: i64,
    pub distributor_name: Option<String>,
    pub price_per_base_unit_cents: f64,
}

/// Picks the price-per-base-unit to use for an ingredient.
///
/// Carries an explicit `as_of` date so windowed averages are deterministic
/// under test.
pub struct PriceSelector<'a> {
    data: &'a dyn CostDataSource,
    as_of: NaiveDate,
}

impl<'a> PriceSelector<'a> {
    pub fn new(data: &'a dyn CostDataSource, as_of: NaiveDate) -> Self {
        PriceSelector { data, as_of }
    }

    /// Resolve one representative price per active variant, then take the
    /// cheapest across variants (selection is cheapest-across-distributors
    /// whatever the temporal mode). Ties keep the first variant in store
    /// order, i.e. the lowest id.
    ///
    /// `Ok(None)` when no variant has a resolvable price.
    pub fn select(
        &self,
        ingredient_id: i64,
        mode: PricingMode,
    ) -> Result<Option<SelectedPrice>, CostError> {
        let variants = self.data.list_active_variants(ingredient_id)?;
        let mut best: Option<SelectedPrice> = None;

        for variant in &variants {
            let Some(total_base_units) = variant.total_base_units else {
                continue;
            };
            if total_base_units <= 0.0 {
                continue;
            }
            let observations = self.data.list_price_observations(variant.id)?;
            let Some(pack_price_cents) = representative_price(&observations, mode, self.as_of)
            else {
                continue;
            };
            let price_per_base_unit = pack_price_cents / total_base_units;

            let beats = match &best {
                Some(current) => price_per_base_unit < current.price_per_base_unit_cents,
                None => true,
            };
            if beats {
                best = Some(SelectedPrice {
                    variant_id: variant.id,
                    distributor_name: variant.distributor_name.clone(),
                    price_per_base_unit_cents: price_per_base_unit,
                });
            }
        }

        if best.is_none() {
            debug!(ingredient_id, %mode, "no resolvable price for ingredient");
        }
        Ok(best)
    }

    /// Cross-distributor comparison for one ingredient: every active variant
    /// with its latest resolvable price-per-base-unit, best-price flags, and
    /// the min-to-max spread when at least two variants are priced.
    pub fn comparison(&self, ingredient: &Ingredient) -> Result<PriceComparison, CostError> {
        let variants = self.data.list_active_variants(ingredient.id)?;
        let mut rows = Vec::with_capacity(variants.len());

        for variant in &variants {
            let observations = self.data.list_price_observations(variant.id)?;
            let latest = observations.last();
            let price_per_base_unit = match (latest, variant.total_base_units) {
                (Some(obs), Some(total)) if total > 0.0 => {
                    Some(obs.price_cents as f64 / total)
                }
                _ => None,
            };
            rows.push(PriceComparisonRow {
                variant_id: variant.id,
                distributor_name: variant.distributor_name.clone().unwrap_or_default(),
                description: variant.description.clone(),
                price_cents: latest.map(|o| o.price_cents),
                effective_date: latest.map(|o| o.effective_date),
                total_base_units: variant.total_base_units,
                price_per_base_unit_cents: price_per_base_unit,
                is_best_price: false,
            });
        }

        let priced: Vec<f64> = rows
            .iter()
            .filter_map(|r| r.price_per_base_unit_cents)
            .collect();
        let best = priced.iter().copied().fold(None, |acc: Option<f64>, p| {
            Some(acc.map_or(p, |b| b.min(p)))
        });

        if let Some(best) = best {
            for row in &mut rows {
                row.is_best_price = row.price_per_base_unit_cents == Some(best);
            }
        }

        let spread_percent = if priced.len() >= 2 {
            let max = priced.iter().copied().fold(f64::MIN, f64::max);
            let min = priced.iter().copied().fold(f64::MAX, f64::min);
            if min > 0.0 {
                Some((max - min) / min * 100.0)
            } else {
                None
            }
        } else {
            None
        };

        Ok(PriceComparison {
            ingredient_id: ingredient.id,
            ingredient_name: ingredient.name.clone(),
            base_unit: ingredient.base_unit,
            variants: rows,
            best_price_per_base_unit_cents: best,
            spread_percent,
        })
    }
}

/// Resolve one variant's observation history to a single pack price under
/// the given mode. Observations arrive ascending by `effective_date`.
fn representative_price(
    observations: &[PriceObservation],
    mode: PricingMode,
    as_of: NaiveDate,
) -> Option<f64> {
    if observations.is_empty() {
        return None;
    }
    match mode {
        PricingMode::Recent => observations.last().map(|o| o.price_cents as f64),
        PricingMode::Cheapest => observations
            .iter()
            .map(|o| o.price_cents)
            .min()
            .map(|c| c as f64),
        PricingMode::Average { window_days } => {
            let cutoff = as_of - Duration::days(i64::from(window_days));
            let in_window: Vec<i64> = observations
                .iter()
                .filter(|o| o.effective_date >= cutoff)
                .map(|o| o.price_cents)
                .collect();
            if in_window.is_empty() {
                // Empty window excludes the variant; no fallback to recent.
                None
            } else {
                Some(in_window.iter().sum::<i64>() as f64 / in_window.len() as f64)
            }
        }
    }
}

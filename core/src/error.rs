use thiserror::Error;

/// Failures raised by the costing engine.
///
/// Pack-parse misses and missing prices are deliberately not represented
/// here: the first is a `None` result (queued for manual mapping), the
/// second a `has_unpriced_ingredients` flag on the breakdown.
#[derive(Error, Debug)]
pub enum CostError {
    #[error("unknown unit '{0}'")]
    UnknownUnit(String),

    #[error("ingredient {0} not found")]
    IngredientNotFound(i64),

    #[error("recipe {0} not found")]
    RecipeNotFound(i64),

    #[error("menu item {0} not found")]
    MenuItemNotFound(i64),

    /// A recipe transitively includes itself. The path lists recipe ids from
    /// the top-level call down to the repeated id.
    #[error("circular recipe reference: {}", format_cycle(.path))]
    CircularRecipeReference { path: Vec<i64> },

    /// Defensive bound on traversal depth, independent of cycle detection.
    #[error("recursion depth {depth} exceeds configured maximum {max_depth}")]
    MaxRecursionDepthExceeded { depth: usize, max_depth: usize },

    #[error(transparent)]
    Data(#[from] anyhow::Error),
}

fn format_cycle(path: &[i64]) -> String {
    path.iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(" -> ")
}

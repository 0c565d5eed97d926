mod commands;
mod config;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process;
use tracing_subscriber::EnvFilter;

use crate::commands::{
    cmd_compare, cmd_distributor_add, cmd_distributor_list, cmd_ingredient_add,
    cmd_ingredient_list, cmd_menu_add, cmd_menu_add_packaging, cmd_menu_analyze, cmd_menu_cost,
    cmd_menu_list, cmd_pack_parse, cmd_price_history, cmd_price_import, cmd_price_record,
    cmd_recipe_add_component, cmd_recipe_add_ingredient, cmd_recipe_cost, cmd_recipe_create,
    cmd_recipe_list, cmd_variant_add, cmd_variant_list, parse_mode,
};
use crate::config::Config;
use platecost_core::service::CostService;

#[derive(Parser)]
#[command(
    name = "platecost",
    version,
    about = "Recipe and menu costing from distributor pack prices",
    long_about = "Track distributor pack prices, roll them up through recipes and\n\
                  sub-recipes, and see what every menu item costs today."
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage canonical ingredients
    Ingredient {
        #[command(subcommand)]
        command: IngredientCommands,
    },
    /// Manage distributors
    Distributor {
        #[command(subcommand)]
        command: DistributorCommands,
    },
    /// Manage distributor variants (SKUs/packs) for ingredients
    Variant {
        #[command(subcommand)]
        command: VariantCommands,
    },
    /// Record and inspect pack prices
    Price {
        #[command(subcommand)]
        command: PriceCommands,
    },
    /// Parse a pack description ("36/1LB", "9/1/2GAL")
    Pack {
        /// Free-text pack description
        description: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Manage recipes and compute their costs
    Recipe {
        #[command(subcommand)]
        command: RecipeCommands,
    },
    /// Manage menu items, cost them, and analyze margins
    Menu {
        #[command(subcommand)]
        command: MenuCommands,
    },
    /// Compare normalized prices across distributors
    Compare {
        /// Ingredient name
        ingredient: Option<String>,
        /// Compare every ingredient in a category instead
        #[arg(long)]
        category: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
enum IngredientCommands {
    /// Add a canonical ingredient
    Add {
        /// Ingredient name (e.g. "Butter")
        name: String,
        /// Base unit: g, ml, or each
        #[arg(short, long)]
        unit: String,
        /// Category (dairy, produce, packaging, ...)
        #[arg(short, long)]
        category: Option<String>,
        /// Usable fraction after trim/waste, in (0, 1]
        #[arg(long, default_value_t = 1.0)]
        yield_factor: f64,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// List ingredients
    List {
        /// Filter by category
        #[arg(short, long)]
        category: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
enum DistributorCommands {
    /// Add a distributor
    Add {
        name: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// List distributors
    List {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
enum VariantCommands {
    /// Add a distributor variant for an ingredient
    Add {
        /// Ingredient name
        ingredient: String,
        /// Distributor name (created if unknown)
        distributor: String,
        /// Pack description (e.g. "BUTTER AA 36/1LB CS")
        description: String,
        /// Explicit pack string when the description doesn't parse
        #[arg(long)]
        pack: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// List active variants for an ingredient
    List {
        /// Ingredient name
        ingredient: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
enum PriceCommands {
    /// Record a price observation for a variant
    Record {
        /// Variant id (see `variant list`)
        variant_id: i64,
        /// Pack price (e.g. "142.56" or "$142.56")
        price: String,
        /// Effective date (YYYY-MM-DD, default: today)
        #[arg(long)]
        date: Option<String>,
        /// Source tag (manual, quote, invoice)
        #[arg(long, default_value = "manual")]
        source: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show the observation history for a variant
    History {
        variant_id: i64,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Import a distributor price-list CSV
    Import {
        /// CSV file: Distributor,Description,Ingredient,Pack,Price[,Date]
        file: PathBuf,
        /// Parse and report without writing
        #[arg(long)]
        dry_run: bool,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
enum RecipeCommands {
    /// Create a recipe
    Create {
        name: String,
        /// Yield quantity (e.g. 12)
        #[arg(long)]
        yield_qty: f64,
        /// Yield unit (servings, ml, g, ...)
        #[arg(long)]
        yield_unit: String,
        /// True finished weight in grams (for weight-based component costing)
        #[arg(long)]
        yield_weight_grams: Option<f64>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Add an ingredient line (quantity in the ingredient's base unit)
    AddIngredient {
        recipe: String,
        ingredient: String,
        quantity: f64,
        /// Mark the line as optional
        #[arg(long)]
        optional: bool,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Add a sub-recipe component (quantity in the component's yield unit)
    AddComponent {
        recipe: String,
        component: String,
        quantity: f64,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// List recipes
    List {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Compute a recipe's full cost breakdown
    Cost {
        recipe: String,
        /// Pricing mode: cheapest, recent, or average[:days]
        #[arg(short, long)]
        mode: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
enum MenuCommands {
    /// Add a menu item
    Add {
        name: String,
        /// Menu price (e.g. "7.50")
        price: String,
        /// Recipe backing this item
        #[arg(long)]
        recipe: Option<String>,
        /// Portion of one recipe yield unit per serving
        #[arg(long, default_value_t = 1.0)]
        portion: f64,
        /// Category (breakfast, drinks, retail, ...)
        #[arg(short, long)]
        category: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Attach a packaging line to a menu item
    AddPackaging {
        item: String,
        ingredient: String,
        /// How many per menu item
        #[arg(long, default_value_t = 1.0)]
        quantity: f64,
        /// Fraction of orders that use it (0-1)
        #[arg(long, default_value_t = 1.0)]
        usage_rate: f64,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// List menu items
    List {
        /// Filter by category
        #[arg(short, long)]
        category: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Compute a menu item's cost and margin
    Cost {
        item: String,
        /// Pricing mode: cheapest, recent, or average[:days]
        #[arg(short, long)]
        mode: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Cost all active menu items and summarize margin health
    Analyze {
        /// Filter by category
        #[arg(short, long)]
        category: Option<String>,
        /// Pricing mode: cheapest, recent, or average[:days]
        #[arg(short, long)]
        mode: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

fn main() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    if let Err(e) = run(cli) {
        eprintln!("Error: {e:#}");
        process::exit(1);
    }
}

#[allow(clippy::too_many_lines)]
fn run(cli: Cli) -> Result<()> {
    let config = Config::load()?;
    let db_path = config
        .db_path
        .to_str()
        .context("Database path is not valid UTF-8")?;
    let svc = CostService::new(db_path)?;

    match cli.command {
        Commands::Ingredient { command } => match command {
            IngredientCommands::Add {
                name,
                unit,
                category,
                yield_factor,
                json,
            } => cmd_ingredient_add(&svc, &name, &unit, category, yield_factor, json),
            IngredientCommands::List { category, json } => {
                cmd_ingredient_list(&svc, category, json)
            }
        },
        Commands::Distributor { command } => match command {
            DistributorCommands::Add { name, json } => cmd_distributor_add(&svc, &name, json),
            DistributorCommands::List { json } => cmd_distributor_list(&svc, json),
        },
        Commands::Variant { command } => match command {
            VariantCommands::Add {
                ingredient,
                distributor,
                description,
                pack,
                json,
            } => cmd_variant_add(&svc, &ingredient, &distributor, &description, pack, json),
            VariantCommands::List { ingredient, json } => {
                cmd_variant_list(&svc, &ingredient, json)
            }
        },
        Commands::Price { command } => match command {
            PriceCommands::Record {
                variant_id,
                price,
                date,
                source,
                json,
            } => cmd_price_record(&svc, variant_id, &price, date, &source, json),
            PriceCommands::History { variant_id, json } => {
                cmd_price_history(&svc, variant_id, json)
            }
            PriceCommands::Import {
                file,
                dry_run,
                json,
            } => cmd_price_import(&svc, &file, dry_run, json),
        },
        Commands::Pack { description, json } => cmd_pack_parse(&svc, &description, json),
        Commands::Recipe { command } => match command {
            RecipeCommands::Create {
                name,
                yield_qty,
                yield_unit,
                yield_weight_grams,
                json,
            } => cmd_recipe_create(&svc, &name, yield_qty, &yield_unit, yield_weight_grams, json),
            RecipeCommands::AddIngredient {
                recipe,
                ingredient,
                quantity,
                optional,
                json,
            } => cmd_recipe_add_ingredient(&svc, &recipe, &ingredient, quantity, optional, json),
            RecipeCommands::AddComponent {
                recipe,
                component,
                quantity,
                json,
            } => cmd_recipe_add_component(&svc, &recipe, &component, quantity, json),
            RecipeCommands::List { json } => cmd_recipe_list(&svc, json),
            RecipeCommands::Cost { recipe, mode, json } => {
                let mode = parse_mode(mode.as_deref())?;
                cmd_recipe_cost(&svc, &recipe, mode, json)
            }
        },
        Commands::Menu { command } => match command {
            MenuCommands::Add {
                name,
                price,
                recipe,
                portion,
                category,
                json,
            } => cmd_menu_add(&svc, &name, &price, recipe, portion, category, json),
            MenuCommands::AddPackaging {
                item,
                ingredient,
                quantity,
                usage_rate,
                json,
            } => cmd_menu_add_packaging(&svc, &item, &ingredient, quantity, usage_rate, json),
            MenuCommands::List { category, json } => cmd_menu_list(&svc, category, json),
            MenuCommands::Cost { item, mode, json } => {
                let mode = parse_mode(mode.as_deref())?;
                cmd_menu_cost(&svc, &item, mode, json)
            }
            MenuCommands::Analyze {
                category,
                mode,
                json,
            } => {
                let mode = parse_mode(mode.as_deref())?;
                cmd_menu_analyze(&svc, mode, category, json)
            }
        },
        Commands::Compare {
            ingredient,
            category,
            json,
        } => cmd_compare(&svc, ingredient, category, json),
    }
}

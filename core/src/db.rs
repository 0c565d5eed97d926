use std::collections::HashSet;
use std::path::Path;

use anyhow::{Context, Result, bail};
use chrono::{Local, NaiveDate};
use rusqlite::{Connection, params};

use crate::datasource::{CostDataSource, MenuItemDetail, RecipeDetail};
use crate::models::{
    Distributor, DistributorVariant, Ingredient, MenuItem, NewIngredient, NewMenuItem,
    NewPriceObservation, NewRecipe, NewVariant, PackagingLine, PriceObservation, Recipe,
    RecipeComponentLink, RecipeIngredientLine,
};
use crate::units::BaseUnit;

/// SQLite-backed catalog: ingredients, distributors, variants, price
/// history, recipes, and menu items. Implements the engine's read-shape.
pub struct Database {
    conn: Connection,
}

impl Database {
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open database: {}", path.display()))?;
        let db = Database { conn };
        db.migrate()?;
        Ok(db)
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let db = Database { conn };
        db.migrate()?;
        Ok(db)
    }

    fn migrate(&self) -> Result<()> {
        let version: i64 = self
            .conn
            .pragma_query_value(None, "user_version", |row| row.get(0))?;

        if version < 1 {
            self.conn.execute_batch(
                "CREATE TABLE IF NOT EXISTS ingredients (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    name TEXT NOT NULL UNIQUE,
                    category TEXT,
                    base_unit TEXT NOT NULL,
                    yield_factor REAL NOT NULL DEFAULT 1.0,
                    created_at TEXT NOT NULL,
                    updated_at TEXT NOT NULL
                );

                CREATE TABLE IF NOT EXISTS distributors (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    name TEXT NOT NULL UNIQUE,
                    created_at TEXT NOT NULL
                );

                CREATE TABLE IF NOT EXISTS distributor_variants (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    ingredient_id INTEGER NOT NULL REFERENCES ingredients(id),
                    distributor_id INTEGER NOT NULL REFERENCES distributors(id),
                    description TEXT NOT NULL,
                    pack_count REAL,
                    unit_size REAL,
                    unit TEXT,
                    total_base_units REAL,
                    is_active INTEGER NOT NULL DEFAULT 1,
                    created_at TEXT NOT NULL
                );

                CREATE TABLE IF NOT EXISTS price_observations (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    variant_id INTEGER NOT NULL REFERENCES distributor_variants(id),
                    price_cents INTEGER NOT NULL,
                    effective_date TEXT NOT NULL,
                    source TEXT NOT NULL,
                    created_at TEXT NOT NULL
                );

                CREATE TABLE IF NOT EXISTS recipes (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    name TEXT NOT NULL UNIQUE,
                    yield_quantity REAL NOT NULL,
                    yield_unit TEXT NOT NULL,
                    yield_weight_grams REAL,
                    created_at TEXT NOT NULL,
                    updated_at TEXT NOT NULL
                );

                CREATE TABLE IF NOT EXISTS recipe_ingredients (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    recipe_id INTEGER NOT NULL REFERENCES recipes(id) ON DELETE CASCADE,
                    ingredient_id INTEGER NOT NULL REFERENCES ingredients(id),
                    quantity REAL NOT NULL,
                    is_optional INTEGER NOT NULL DEFAULT 0,
                    UNIQUE(recipe_id, ingredient_id)
                );

                CREATE TABLE IF NOT EXISTS recipe_components (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    recipe_id INTEGER NOT NULL REFERENCES recipes(id) ON DELETE CASCADE,
                    component_recipe_id INTEGER NOT NULL REFERENCES recipes(id) ON DELETE CASCADE,
                    quantity REAL NOT NULL,
                    UNIQUE(recipe_id, component_recipe_id)
                );

                CREATE TABLE IF NOT EXISTS menu_items (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    name TEXT NOT NULL,
                    recipe_id INTEGER REFERENCES recipes(id),
                    portion_of_recipe REAL NOT NULL DEFAULT 1.0,
                    menu_price_cents INTEGER NOT NULL,
                    category TEXT,
                    is_active INTEGER NOT NULL DEFAULT 1,
                    created_at TEXT NOT NULL,
                    updated_at TEXT NOT NULL
                );

                CREATE TABLE IF NOT EXISTS menu_item_packaging (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    menu_item_id INTEGER NOT NULL REFERENCES menu_items(id) ON DELETE CASCADE,
                    ingredient_id INTEGER NOT NULL REFERENCES ingredients(id),
                    quantity REAL NOT NULL DEFAULT 1.0,
                    usage_rate REAL NOT NULL DEFAULT 1.0,
                    UNIQUE(menu_item_id, ingredient_id)
                );

                CREATE INDEX IF NOT EXISTS idx_variants_ingredient
                    ON distributor_variants(ingredient_id);
                CREATE INDEX IF NOT EXISTS idx_observations_variant_date
                    ON price_observations(variant_id, effective_date);
                CREATE INDEX IF NOT EXISTS idx_recipe_ingredients_recipe
                    ON recipe_ingredients(recipe_id);
                CREATE INDEX IF NOT EXISTS idx_recipe_components_recipe
                    ON recipe_components(recipe_id);
                CREATE INDEX IF NOT EXISTS idx_menu_items_category
                    ON menu_items(category);

                PRAGMA user_version = 1;",
            )?;
        }

        Ok(())
    }

    // --- Row mapping helpers ---

    fn ingredient_from_row(row: &rusqlite::Row) -> rusqlite::Result<Ingredient> {
        let base_unit_str: String = row.get(3)?;
        let base_unit = BaseUnit::parse(&base_unit_str).ok_or_else(|| {
            rusqlite::Error::FromSqlConversionFailure(
                3,
                rusqlite::types::Type::Text,
                format!("invalid base unit '{base_unit_str}'").into(),
            )
        })?;
        Ok(Ingredient {
            id: row.get(0)?,
            name: row.get(1)?,
            category: row.get(2)?,
            base_unit,
            yield_factor: row.get(4)?,
            created_at: row.get(5)?,
            updated_at: row.get(6)?,
        })
    }

    fn distributor_from_row(row: &rusqlite::Row) -> rusqlite::Result<Distributor> {
        Ok(Distributor {
            id: row.get(0)?,
            name: row.get(1)?,
            created_at: row.get(2)?,
        })
    }

    // Expects variant columns 0-9 then d.name at 10.
    fn variant_from_row(row: &rusqlite::Row) -> rusqlite::Result<DistributorVariant> {
        Ok(DistributorVariant {
            id: row.get(0)?,
            ingredient_id: row.get(1)?,
            distributor_id: row.get(2)?,
            description: row.get(3)?,
            pack_count: row.get(4)?,
            unit_size: row.get(5)?,
            unit: row.get(6)?,
            total_base_units: row.get(7)?,
            is_active: row.get(8)?,
            created_at: row.get(9)?,
            distributor_name: row.get(10)?,
        })
    }

    fn observation_from_row(row: &rusqlite::Row) -> rusqlite::Result<PriceObservation> {
        let date_str: String = row.get(3)?;
        let effective_date = NaiveDate::parse_from_str(&date_str, "%Y-%m-%d").map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(
                3,
                rusqlite::types::Type::Text,
                Box::new(e),
            )
        })?;
        Ok(PriceObservation {
            id: row.get(0)?,
            variant_id: row.get(1)?,
            price_cents: row.get(2)?,
            effective_date,
            source: row.get(4)?,
            created_at: row.get(5)?,
        })
    }

    fn recipe_from_row(row: &rusqlite::Row) -> rusqlite::Result<Recipe> {
        Ok(Recipe {
            id: row.get(0)?,
            name: row.get(1)?,
            yield_quantity: row.get(2)?,
            yield_unit: row.get(3)?,
            yield_weight_grams: row.get(4)?,
            created_at: row.get(5)?,
            updated_at: row.get(6)?,
        })
    }

    fn menu_item_from_row(row: &rusqlite::Row) -> rusqlite::Result<MenuItem> {
        Ok(MenuItem {
            id: row.get(0)?,
            name: row.get(1)?,
            recipe_id: row.get(2)?,
            portion_of_recipe: row.get(3)?,
            menu_price_cents: row.get(4)?,
            category: row.get(5)?,
            is_active: row.get(6)?,
            created_at: row.get(7)?,
            updated_at: row.get(8)?,
        })
    }

    // --- Ingredients ---

    pub fn insert_ingredient(&self, ingredient: &NewIngredient) -> Result<Ingredient> {
        let now = Local::now().to_rfc3339();
        self.conn.execute(
            "INSERT INTO ingredients (name, category, base_unit, yield_factor, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                ingredient.name,
                ingredient.category,
                ingredient.base_unit.as_str(),
                ingredient.yield_factor,
                now,
                now,
            ],
        )?;
        let id = self.conn.last_insert_rowid();
        self.get_ingredient_by_id(id)?
            .context("Ingredient not found after insert")
    }

    pub fn get_ingredient_by_id(&self, id: i64) -> Result<Option<Ingredient>> {
        let mut stmt = self
            .conn
            .prepare("SELECT * FROM ingredients WHERE id = ?1")?;
        let mut rows = stmt.query(params![id])?;
        match rows.next()? {
            Some(row) => Ok(Some(Self::ingredient_from_row(row)?)),
            None => Ok(None),
        }
    }

    pub fn get_ingredient_by_name(&self, name: &str) -> Result<Option<Ingredient>> {
        let mut stmt = self
            .conn
            .prepare("SELECT * FROM ingredients WHERE name = ?1 COLLATE NOCASE")?;
        let mut rows = stmt.query(params![name])?;
        match rows.next()? {
            Some(row) => Ok(Some(Self::ingredient_from_row(row)?)),
            None => Ok(None),
        }
    }

    pub fn list_ingredients(&self, category: Option<&str>) -> Result<Vec<Ingredient>> {
        if let Some(category) = category {
            let mut stmt = self
                .conn
                .prepare("SELECT * FROM ingredients WHERE category = ?1 ORDER BY name")?;
            let rows = stmt
                .query_map(params![category], Self::ingredient_from_row)?
                .collect::<Result<Vec<_>, _>>()?;
            return Ok(rows);
        }
        let mut stmt = self.conn.prepare("SELECT * FROM ingredients ORDER BY name")?;
        let rows = stmt
            .query_map([], Self::ingredient_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    // --- Distributors ---

    pub fn insert_distributor(&self, name: &str) -> Result<Distributor> {
        let now = Local::now().to_rfc3339();
        self.conn.execute(
            "INSERT INTO distributors (name, created_at) VALUES (?1, ?2)",
            params![name, now],
        )?;
        let id = self.conn.last_insert_rowid();
        self.conn
            .query_row(
                "SELECT * FROM distributors WHERE id = ?1",
                params![id],
                Self::distributor_from_row,
            )
            .context("Distributor not found after insert")
    }

    pub fn get_distributor_by_name(&self, name: &str) -> Result<Option<Distributor>> {
        let mut stmt = self
            .conn
            .prepare("SELECT * FROM distributors WHERE name = ?1 COLLATE NOCASE")?;
        let mut rows = stmt.query(params![name])?;
        match rows.next()? {
            Some(row) => Ok(Some(Self::distributor_from_row(row)?)),
            None => Ok(None),
        }
    }

    pub fn get_or_create_distributor(&self, name: &str) -> Result<Distributor> {
        if let Some(existing) = self.get_distributor_by_name(name)? {
            return Ok(existing);
        }
        self.insert_distributor(name)
    }

    pub fn list_distributors(&self) -> Result<Vec<Distributor>> {
        let mut stmt = self.conn.prepare("SELECT * FROM distributors ORDER BY name")?;
        let rows = stmt
            .query_map([], Self::distributor_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    // --- Distributor variants ---

    pub fn insert_variant(&self, variant: &NewVariant) -> Result<DistributorVariant> {
        let now = Local::now().to_rfc3339();
        self.conn.execute(
            "INSERT INTO distributor_variants
                (ingredient_id, distributor_id, description, pack_count, unit_size, unit, total_base_units, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                variant.ingredient_id,
                variant.distributor_id,
                variant.description,
                variant.pack_count,
                variant.unit_size,
                variant.unit,
                variant.total_base_units,
                now,
            ],
        )?;
        let id = self.conn.last_insert_rowid();
        self.get_variant_by_id(id)?
            .context("Variant not found after insert")
    }

    pub fn get_variant_by_id(&self, id: i64) -> Result<Option<DistributorVariant>> {
        let mut stmt = self.conn.prepare(
            "SELECT v.id, v.ingredient_id, v.distributor_id, v.description, v.pack_count,
                    v.unit_size, v.unit, v.total_base_units, v.is_active, v.created_at, d.name
             FROM distributor_variants v
             JOIN distributors d ON v.distributor_id = d.id
             WHERE v.id = ?1",
        )?;
        let mut rows = stmt.query(params![id])?;
        match rows.next()? {
            Some(row) => Ok(Some(Self::variant_from_row(row)?)),
            None => Ok(None),
        }
    }

    /// Active variants for an ingredient, ascending by id. The id ordering
    /// is what makes best-price tie-breaks deterministic.
    pub fn active_variants(&self, ingredient_id: i64) -> Result<Vec<DistributorVariant>> {
        let mut stmt = self.conn.prepare(
            "SELECT v.id, v.ingredient_id, v.distributor_id, v.description, v.pack_count,
                    v.unit_size, v.unit, v.total_base_units, v.is_active, v.created_at, d.name
             FROM distributor_variants v
             JOIN distributors d ON v.distributor_id = d.id
             WHERE v.ingredient_id = ?1 AND v.is_active = 1
             ORDER BY v.id",
        )?;
        let rows = stmt
            .query_map(params![ingredient_id], Self::variant_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Find an existing variant by its natural key (importer reuse path).
    pub fn find_variant(
        &self,
        ingredient_id: i64,
        distributor_id: i64,
        description: &str,
    ) -> Result<Option<DistributorVariant>> {
        let mut stmt = self.conn.prepare(
            "SELECT v.id, v.ingredient_id, v.distributor_id, v.description, v.pack_count,
                    v.unit_size, v.unit, v.total_base_units, v.is_active, v.created_at, d.name
             FROM distributor_variants v
             JOIN distributors d ON v.distributor_id = d.id
             WHERE v.ingredient_id = ?1 AND v.distributor_id = ?2 AND v.description = ?3 COLLATE NOCASE
             ORDER BY v.id LIMIT 1",
        )?;
        let mut rows = stmt.query(params![ingredient_id, distributor_id, description])?;
        match rows.next()? {
            Some(row) => Ok(Some(Self::variant_from_row(row)?)),
            None => Ok(None),
        }
    }

    pub fn set_variant_active(&self, id: i64, is_active: bool) -> Result<bool> {
        let changed = self.conn.execute(
            "UPDATE distributor_variants SET is_active = ?1 WHERE id = ?2",
            params![is_active, id],
        )?;
        Ok(changed > 0)
    }

    // --- Price observations (append-only) ---

    pub fn insert_price_observation(
        &self,
        observation: &NewPriceObservation,
    ) -> Result<PriceObservation> {
        let now = Local::now().to_rfc3339();
        let date_str = observation.effective_date.format("%Y-%m-%d").to_string();
        self.conn.execute(
            "INSERT INTO price_observations (variant_id, price_cents, effective_date, source, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                observation.variant_id,
                observation.price_cents,
                date_str,
                observation.source,
                now,
            ],
        )?;
        let id = self.conn.last_insert_rowid();
        self.conn
            .query_row(
                "SELECT * FROM price_observations WHERE id = ?1",
                params![id],
                Self::observation_from_row,
            )
            .context("Price observation not found after insert")
    }

    /// Full observation history for a variant, ascending by effective date
    /// (insertion order breaks ties).
    pub fn price_observations(&self, variant_id: i64) -> Result<Vec<PriceObservation>> {
        let mut stmt = self.conn.prepare(
            "SELECT * FROM price_observations
             WHERE variant_id = ?1
             ORDER BY effective_date, id",
        )?;
        let rows = stmt
            .query_map(params![variant_id], Self::observation_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    // --- Recipes ---

    pub fn create_recipe(&self, recipe: &NewRecipe) -> Result<Recipe> {
        let now = Local::now().to_rfc3339();
        self.conn.execute(
            "INSERT INTO recipes (name, yield_quantity, yield_unit, yield_weight_grams, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                recipe.name,
                recipe.yield_quantity,
                recipe.yield_unit,
                recipe.yield_weight_grams,
                now,
                now,
            ],
        )?;
        let id = self.conn.last_insert_rowid();
        self.get_recipe_by_id(id)?
            .context("Recipe not found after insert")
    }

    pub fn get_recipe_by_id(&self, id: i64) -> Result<Option<Recipe>> {
        let mut stmt = self.conn.prepare("SELECT * FROM recipes WHERE id = ?1")?;
        let mut rows = stmt.query(params![id])?;
        match rows.next()? {
            Some(row) => Ok(Some(Self::recipe_from_row(row)?)),
            None => Ok(None),
        }
    }

    pub fn get_recipe_by_name(&self, name: &str) -> Result<Option<Recipe>> {
        let mut stmt = self
            .conn
            .prepare("SELECT * FROM recipes WHERE name = ?1 COLLATE NOCASE")?;
        let mut rows = stmt.query(params![name])?;
        match rows.next()? {
            Some(row) => Ok(Some(Self::recipe_from_row(row)?)),
            None => Ok(None),
        }
    }

    pub fn list_recipes(&self) -> Result<Vec<Recipe>> {
        let mut stmt = self.conn.prepare("SELECT * FROM recipes ORDER BY name")?;
        let rows = stmt
            .query_map([], Self::recipe_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn add_recipe_ingredient(
        &self,
        recipe_id: i64,
        ingredient_id: i64,
        quantity: f64,
        is_optional: bool,
    ) -> Result<RecipeIngredientLine> {
        self.conn.execute(
            "INSERT INTO recipe_ingredients (recipe_id, ingredient_id, quantity, is_optional)
             VALUES (?1, ?2, ?3, ?4)",
            params![recipe_id, ingredient_id, quantity, is_optional],
        )?;
        let id = self.conn.last_insert_rowid();
        self.conn
            .query_row(
                "SELECT ri.id, ri.recipe_id, ri.ingredient_id, ri.quantity, ri.is_optional, i.name
                 FROM recipe_ingredients ri
                 JOIN ingredients i ON ri.ingredient_id = i.id
                 WHERE ri.id = ?1",
                params![id],
                |row| {
                    Ok(RecipeIngredientLine {
                        id: row.get(0)?,
                        recipe_id: row.get(1)?,
                        ingredient_id: row.get(2)?,
                        quantity: row.get(3)?,
                        is_optional: row.get(4)?,
                        ingredient_name: row.get(5)?,
                    })
                },
            )
            .context("Recipe ingredient not found after insert")
    }

    /// Would linking `component_recipe_id` under `recipe_id` close a cycle?
    ///
    /// Walks the stored component graph from the candidate component; a path
    /// back to the parent (or a self-link) means the editor must refuse the
    /// save. The engine re-detects cycles independently at computation time.
    pub fn component_link_creates_cycle(
        &self,
        recipe_id: i64,
        component_recipe_id: i64,
    ) -> Result<bool> {
        if recipe_id == component_recipe_id {
            return Ok(true);
        }
        let mut seen: HashSet<i64> = HashSet::new();
        let mut stack = vec![component_recipe_id];
        while let Some(current) = stack.pop() {
            if current == recipe_id {
                return Ok(true);
            }
            if !seen.insert(current) {
                continue;
            }
            let mut stmt = self
                .conn
                .prepare("SELECT component_recipe_id FROM recipe_components WHERE recipe_id = ?1")?;
            let children: Vec<i64> = stmt
                .query_map(params![current], |row| row.get(0))?
                .collect::<Result<Vec<_>, _>>()?;
            stack.extend(children);
        }
        Ok(false)
    }

    pub fn add_recipe_component(
        &self,
        recipe_id: i64,
        component_recipe_id: i64,
        quantity: f64,
    ) -> Result<RecipeComponentLink> {
        if self.component_link_creates_cycle(recipe_id, component_recipe_id)? {
            bail!(
                "Adding recipe {component_recipe_id} as a component of {recipe_id} would create a circular reference"
            );
        }
        self.conn.execute(
            "INSERT INTO recipe_components (recipe_id, component_recipe_id, quantity)
             VALUES (?1, ?2, ?3)",
            params![recipe_id, component_recipe_id, quantity],
        )?;
        let id = self.conn.last_insert_rowid();
        self.conn
            .query_row(
                "SELECT rc.id, rc.recipe_id, rc.component_recipe_id, rc.quantity, r.name
                 FROM recipe_components rc
                 JOIN recipes r ON rc.component_recipe_id = r.id
                 WHERE rc.id = ?1",
                params![id],
                |row| {
                    Ok(RecipeComponentLink {
                        id: row.get(0)?,
                        recipe_id: row.get(1)?,
                        component_recipe_id: row.get(2)?,
                        quantity: row.get(3)?,
                        component_name: row.get(4)?,
                    })
                },
            )
            .context("Recipe component not found after insert")
    }

    pub fn get_recipe_detail(&self, id: i64) -> Result<Option<RecipeDetail>> {
        let Some(recipe) = self.get_recipe_by_id(id)? else {
            return Ok(None);
        };

        let mut stmt = self.conn.prepare(
            "SELECT ri.id, ri.recipe_id, ri.ingredient_id, ri.quantity, ri.is_optional, i.name
             FROM recipe_ingredients ri
             JOIN ingredients i ON ri.ingredient_id = i.id
             WHERE ri.recipe_id = ?1
             ORDER BY ri.id",
        )?;
        let ingredient_lines = stmt
            .query_map(params![id], |row| {
                Ok(RecipeIngredientLine {
                    id: row.get(0)?,
                    recipe_id: row.get(1)?,
                    ingredient_id: row.get(2)?,
                    quantity: row.get(3)?,
                    is_optional: row.get(4)?,
                    ingredient_name: row.get(5)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        let mut stmt = self.conn.prepare(
            "SELECT rc.id, rc.recipe_id, rc.component_recipe_id, rc.quantity, r.name
             FROM recipe_components rc
             JOIN recipes r ON rc.component_recipe_id = r.id
             WHERE rc.recipe_id = ?1
             ORDER BY rc.id",
        )?;
        let component_links = stmt
            .query_map(params![id], |row| {
                Ok(RecipeComponentLink {
                    id: row.get(0)?,
                    recipe_id: row.get(1)?,
                    component_recipe_id: row.get(2)?,
                    quantity: row.get(3)?,
                    component_name: row.get(4)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Some(RecipeDetail {
            recipe,
            ingredient_lines,
            component_links,
        }))
    }

    // --- Menu items ---

    pub fn create_menu_item(&self, item: &NewMenuItem) -> Result<MenuItem> {
        let now = Local::now().to_rfc3339();
        self.conn.execute(
            "INSERT INTO menu_items (name, recipe_id, portion_of_recipe, menu_price_cents, category, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                item.name,
                item.recipe_id,
                item.portion_of_recipe,
                item.menu_price_cents,
                item.category,
                now,
                now,
            ],
        )?;
        let id = self.conn.last_insert_rowid();
        self.get_menu_item_by_id(id)?
            .context("Menu item not found after insert")
    }

    pub fn get_menu_item_by_id(&self, id: i64) -> Result<Option<MenuItem>> {
        let mut stmt = self.conn.prepare("SELECT * FROM menu_items WHERE id = ?1")?;
        let mut rows = stmt.query(params![id])?;
        match rows.next()? {
            Some(row) => Ok(Some(Self::menu_item_from_row(row)?)),
            None => Ok(None),
        }
    }

    pub fn get_menu_item_by_name(&self, name: &str) -> Result<Option<MenuItem>> {
        let mut stmt = self
            .conn
            .prepare("SELECT * FROM menu_items WHERE name = ?1 COLLATE NOCASE ORDER BY id LIMIT 1")?;
        let mut rows = stmt.query(params![name])?;
        match rows.next()? {
            Some(row) => Ok(Some(Self::menu_item_from_row(row)?)),
            None => Ok(None),
        }
    }

    pub fn list_menu_items(
        &self,
        category: Option<&str>,
        active_only: bool,
    ) -> Result<Vec<MenuItem>> {
        let mut sql = String::from("SELECT * FROM menu_items WHERE 1=1");
        if active_only {
            sql.push_str(" AND is_active = 1");
        }
        if category.is_some() {
            sql.push_str(" AND category = ?1");
        }
        sql.push_str(" ORDER BY category, name");

        let mut stmt = self.conn.prepare(&sql)?;
        let rows = if let Some(category) = category {
            stmt.query_map(params![category], Self::menu_item_from_row)?
                .collect::<Result<Vec<_>, _>>()?
        } else {
            stmt.query_map([], Self::menu_item_from_row)?
                .collect::<Result<Vec<_>, _>>()?
        };
        Ok(rows)
    }

    pub fn add_packaging_line(
        &self,
        menu_item_id: i64,
        ingredient_id: i64,
        quantity: f64,
        usage_rate: f64,
    ) -> Result<PackagingLine> {
        self.conn.execute(
            "INSERT INTO menu_item_packaging (menu_item_id, ingredient_id, quantity, usage_rate)
             VALUES (?1, ?2, ?3, ?4)",
            params![menu_item_id, ingredient_id, quantity, usage_rate],
        )?;
        let id = self.conn.last_insert_rowid();
        self.conn
            .query_row(
                "SELECT p.id, p.menu_item_id, p.ingredient_id, p.quantity, p.usage_rate, i.name
                 FROM menu_item_packaging p
                 JOIN ingredients i ON p.ingredient_id = i.id
                 WHERE p.id = ?1",
                params![id],
                |row| {
                    Ok(PackagingLine {
                        id: row.get(0)?,
                        menu_item_id: row.get(1)?,
                        ingredient_id: row.get(2)?,
                        quantity: row.get(3)?,
                        usage_rate: row.get(4)?,
                        ingredient_name: row.get(5)?,
                    })
                },
            )
            .context("Packaging line not found after insert")
    }

    pub fn get_menu_item_detail(&self, id: i64) -> Result<Option<MenuItemDetail>> {
        let Some(menu_item) = self.get_menu_item_by_id(id)? else {
            return Ok(None);
        };

        let mut stmt = self.conn.prepare(
            "SELECT p.id, p.menu_item_id, p.ingredient_id, p.quantity, p.usage_rate, i.name
             FROM menu_item_packaging p
             JOIN ingredients i ON p.ingredient_id = i.id
             WHERE p.menu_item_id = ?1
             ORDER BY p.id",
        )?;
        let packaging_lines = stmt
            .query_map(params![id], |row| {
                Ok(PackagingLine {
                    id: row.get(0)?,
                    menu_item_id: row.get(1)?,
                    ingredient_id: row.get(2)?,
                    quantity: row.get(3)?,
                    usage_rate: row.get(4)?,
                    ingredient_name: row.get(5)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Some(MenuItemDetail {
            menu_item,
            packaging_lines,
        }))
    }
}

impl CostDataSource for Database {
    fn get_ingredient(&self, id: i64) -> Result<Option<Ingredient>> {
        self.get_ingredient_by_id(id)
    }

    fn list_active_variants(&self, ingredient_id: i64) -> Result<Vec<DistributorVariant>> {
        self.active_variants(ingredient_id)
    }

    fn list_price_observations(&self, variant_id: i64) -> Result<Vec<PriceObservation>> {
        self.price_observations(variant_id)
    }

    fn get_recipe(&self, id: i64) -> Result<Option<RecipeDetail>> {
        self.get_recipe_detail(id)
    }

    fn get_menu_item(&self, id: i64) -> Result<Option<MenuItemDetail>> {
        self.get_menu_item_detail(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn db() -> Database {
        Database::open_in_memory().unwrap()
    }

    fn sample_ingredient(name: &str) -> NewIngredient {
        NewIngredient {
            name: name.to_string(),
            category: Some("dairy".to_string()),
            base_unit: BaseUnit::Gram,
            yield_factor: 1.0,
        }
    }

    fn sample_recipe(name: &str) -> NewRecipe {
        NewRecipe {
            name: name.to_string(),
            yield_quantity: 10.0,
            yield_unit: "servings".to_string(),
            yield_weight_grams: None,
        }
    }

    #[test]
    fn test_insert_and_get_ingredient() {
        let db = db();
        let ing = db.insert_ingredient(&sample_ingredient("Butter")).unwrap();
        assert_eq!(ing.name, "Butter");
        assert_eq!(ing.base_unit, BaseUnit::Gram);

        let fetched = db.get_ingredient_by_id(ing.id).unwrap().unwrap();
        assert_eq!(fetched.name, "Butter");

        let by_name = db.get_ingredient_by_name("butter").unwrap().unwrap();
        assert_eq!(by_name.id, ing.id);
    }

    #[test]
    fn test_duplicate_ingredient_name_rejected() {
        let db = db();
        db.insert_ingredient(&sample_ingredient("Butter")).unwrap();
        assert!(db.insert_ingredient(&sample_ingredient("Butter")).is_err());
    }

    #[test]
    fn test_list_ingredients_by_category() {
        let db = db();
        db.insert_ingredient(&sample_ingredient("Butter")).unwrap();
        let mut cup = sample_ingredient("Cup");
        cup.category = Some("packaging".to_string());
        cup.base_unit = BaseUnit::Each;
        db.insert_ingredient(&cup).unwrap();

        assert_eq!(db.list_ingredients(None).unwrap().len(), 2);
        let dairy = db.list_ingredients(Some("dairy")).unwrap();
        assert_eq!(dairy.len(), 1);
        assert_eq!(dairy[0].name, "Butter");
    }

    #[test]
    fn test_get_or_create_distributor() {
        let db = db();
        let a = db.get_or_create_distributor("Valley Foods").unwrap();
        let b = db.get_or_create_distributor("valley foods").unwrap();
        assert_eq!(a.id, b.id);
        assert_eq!(db.list_distributors().unwrap().len(), 1);
    }

    fn variant_for(db: &Database, ingredient_id: i64, distributor_id: i64) -> DistributorVariant {
        db.insert_variant(&NewVariant {
            ingredient_id,
            distributor_id,
            description: "BUTTER AA 36/1LB CS".to_string(),
            pack_count: Some(36.0),
            unit_size: Some(1.0),
            unit: Some("lb".to_string()),
            total_base_units: Some(16_329.312),
        })
        .unwrap()
    }

    #[test]
    fn test_variant_round_trip() {
        let db = db();
        let ing = db.insert_ingredient(&sample_ingredient("Butter")).unwrap();
        let dist = db.insert_distributor("Valley Foods").unwrap();
        let variant = variant_for(&db, ing.id, dist.id);

        assert!(variant.is_active);
        assert_eq!(variant.distributor_name.as_deref(), Some("Valley Foods"));
        assert!((variant.total_base_units.unwrap() - 16_329.312).abs() < 1e-6);

        let active = db.active_variants(ing.id).unwrap();
        assert_eq!(active.len(), 1);
    }

    #[test]
    fn test_inactive_variant_excluded() {
        let db = db();
        let ing = db.insert_ingredient(&sample_ingredient("Butter")).unwrap();
        let dist = db.insert_distributor("Valley Foods").unwrap();
        let variant = variant_for(&db, ing.id, dist.id);

        assert!(db.set_variant_active(variant.id, false).unwrap());
        assert!(db.active_variants(ing.id).unwrap().is_empty());
    }

    #[test]
    fn test_price_observations_ordered_by_date() {
        let db = db();
        let ing = db.insert_ingredient(&sample_ingredient("Butter")).unwrap();
        let dist = db.insert_distributor("Valley Foods").unwrap();
        let variant = variant_for(&db, ing.id, dist.id);

        for (cents, date) in [(14256, "2025-06-01"), (13000, "2025-01-15"), (15000, "2025-03-01")]
        {
            db.insert_price_observation(&NewPriceObservation {
                variant_id: variant.id,
                price_cents: cents,
                effective_date: date.parse().unwrap(),
                source: "manual".to_string(),
            })
            .unwrap();
        }

        let observations = db.price_observations(variant.id).unwrap();
        assert_eq!(observations.len(), 3);
        assert_eq!(observations[0].price_cents, 13000);
        assert_eq!(observations[2].price_cents, 14256);
    }

    #[test]
    fn test_recipe_detail_with_lines_and_components() {
        let db = db();
        let ing = db.insert_ingredient(&sample_ingredient("Butter")).unwrap();
        let syrup = db.create_recipe(&sample_recipe("Syrup")).unwrap();
        let mocha = db.create_recipe(&sample_recipe("Mocha")).unwrap();

        db.add_recipe_ingredient(mocha.id, ing.id, 30.0, false).unwrap();
        db.add_recipe_component(mocha.id, syrup.id, 2.0).unwrap();

        let detail = db.get_recipe_detail(mocha.id).unwrap().unwrap();
        assert_eq!(detail.ingredient_lines.len(), 1);
        assert_eq!(detail.ingredient_lines[0].ingredient_name.as_deref(), Some("Butter"));
        assert_eq!(detail.component_links.len(), 1);
        assert_eq!(detail.component_links[0].component_name.as_deref(), Some("Syrup"));
    }

    #[test]
    fn test_component_cycle_precheck_self() {
        let db = db();
        let r = db.create_recipe(&sample_recipe("Solo")).unwrap();
        assert!(db.component_link_creates_cycle(r.id, r.id).unwrap());
        assert!(db.add_recipe_component(r.id, r.id, 1.0).is_err());
    }

    #[test]
    fn test_component_cycle_precheck_transitive() {
        let db = db();
        let a = db.create_recipe(&sample_recipe("A")).unwrap();
        let b = db.create_recipe(&sample_recipe("B")).unwrap();
        let c = db.create_recipe(&sample_recipe("C")).unwrap();

        db.add_recipe_component(a.id, b.id, 1.0).unwrap();
        db.add_recipe_component(b.id, c.id, 1.0).unwrap();

        // C -> A would close A -> B -> C -> A
        assert!(db.component_link_creates_cycle(c.id, a.id).unwrap());
        assert!(db.add_recipe_component(c.id, a.id, 1.0).is_err());

        // Unrelated link remains fine
        let d = db.create_recipe(&sample_recipe("D")).unwrap();
        assert!(!db.component_link_creates_cycle(d.id, c.id).unwrap());
        assert!(db.add_recipe_component(d.id, c.id, 1.0).is_ok());
    }

    #[test]
    fn test_menu_item_detail() {
        let db = db();
        let recipe = db.create_recipe(&sample_recipe("Casserole")).unwrap();
        let mut cup = sample_ingredient("Cup");
        cup.base_unit = BaseUnit::Each;
        let cup = db.insert_ingredient(&cup).unwrap();

        let item = db
            .create_menu_item(&NewMenuItem {
                name: "Casserole Plate".to_string(),
                recipe_id: Some(recipe.id),
                portion_of_recipe: 1.0,
                menu_price_cents: 750,
                category: Some("mains".to_string()),
            })
            .unwrap();
        db.add_packaging_line(item.id, cup.id, 1.0, 0.5).unwrap();

        let detail = db.get_menu_item_detail(item.id).unwrap().unwrap();
        assert_eq!(detail.menu_item.menu_price_cents, 750);
        assert_eq!(detail.packaging_lines.len(), 1);
        assert!((detail.packaging_lines[0].usage_rate - 0.5).abs() < f64::EPSILON);
        assert_eq!(
            detail.packaging_lines[0].ingredient_name.as_deref(),
            Some("Cup")
        );
    }

    #[test]
    fn test_list_menu_items_filters() {
        let db = db();
        for (name, category) in [("Latte", "drinks"), ("Muffin", "bakery")] {
            db.create_menu_item(&NewMenuItem {
                name: name.to_string(),
                recipe_id: None,
                portion_of_recipe: 1.0,
                menu_price_cents: 500,
                category: Some(category.to_string()),
            })
            .unwrap();
        }

        assert_eq!(db.list_menu_items(None, true).unwrap().len(), 2);
        let drinks = db.list_menu_items(Some("drinks"), true).unwrap();
        assert_eq!(drinks.len(), 1);
        assert_eq!(drinks[0].name, "Latte");
    }

    #[test]
    fn test_missing_rows_return_none() {
        let db = db();
        assert!(db.get_ingredient_by_id(99).unwrap().is_none());
        assert!(db.get_recipe_detail(99).unwrap().is_none());
        assert!(db.get_menu_item_detail(99).unwrap().is_none());
        assert!(db.get_variant_by_id(99).unwrap().is_none());
    }
}

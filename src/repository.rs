//! Persistence for the `recipes` relation.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use rand::seq::IteratorRandom;
use sqlx::{postgres::PgPoolOptions, types::Json, PgPool, Postgres, QueryBuilder};
use std::collections::BTreeMap;
use thiserror::Error;
use tracing::info;

use crate::models::{
    Ingredient, Nutrition, PageQuery, Recipe, RecipeId, RecipeTiny, RecipeUpdate, Step,
};

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("Corrupt row: {0}")]
    Corrupt(String),
}

pub type RepositoryResult<T> = Result<T, RepositoryError>;

#[async_trait]
pub trait RecipeRepository: Send + Sync {
    /// Stores a new recipe, assigning its id and timestamps.
    async fn create(&self, recipe: Recipe) -> RepositoryResult<Recipe>;
    async fn get_by_id(&self, id: RecipeId) -> RepositoryResult<Option<Recipe>>;
    /// Filtered page ordered by id.
    async fn page(&self, query: &PageQuery) -> RepositoryResult<Vec<RecipeTiny>>;
    /// Newest first.
    async fn latest(&self, limit: usize) -> RepositoryResult<Vec<RecipeTiny>>;
    async fn random_id(&self) -> RepositoryResult<Option<RecipeId>>;
    async fn update(&self, id: RecipeId, update: RecipeUpdate) -> RepositoryResult<Option<Recipe>>;
    async fn delete(&self, id: RecipeId) -> RepositoryResult<bool>;
}

// --- In-memory ---

#[derive(Default)]
struct Store {
    last_id: RecipeId,
    recipes: BTreeMap<RecipeId, Recipe>,
}

/// Process-local repository used when no database is configured.
#[derive(Default)]
pub struct InMemoryRecipeRepository {
    store: RwLock<Store>,
}

impl InMemoryRecipeRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RecipeRepository for InMemoryRecipeRepository {
    async fn create(&self, mut recipe: Recipe) -> RepositoryResult<Recipe> {
        let mut store = self.store.write();
        store.last_id += 1;
        let id = store.last_id;
        let now = Utc::now();
        recipe.id = Some(id);
        recipe.created_at = Some(now);
        recipe.updated_at = Some(now);
        store.recipes.insert(id, recipe.clone());
        Ok(recipe)
    }

    async fn get_by_id(&self, id: RecipeId) -> RepositoryResult<Option<Recipe>> {
        Ok(self.store.read().recipes.get(&id).cloned())
    }

    async fn page(&self, query: &PageQuery) -> RepositoryResult<Vec<RecipeTiny>> {
        Ok(self
            .store
            .read()
            .recipes
            .values()
            .filter(|r| query.matches(r))
            .skip(query.start)
            .take(query.limit)
            .map(RecipeTiny::from)
            .collect())
    }

    async fn latest(&self, limit: usize) -> RepositoryResult<Vec<RecipeTiny>> {
        let store = self.store.read();
        let mut recipes: Vec<&Recipe> = store.recipes.values().collect();
        recipes.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(recipes.into_iter().take(limit).map(RecipeTiny::from).collect())
    }

    async fn random_id(&self) -> RepositoryResult<Option<RecipeId>> {
        let store = self.store.read();
        Ok(store.recipes.keys().copied().choose(&mut rand::thread_rng()))
    }

    async fn update(&self, id: RecipeId, update: RecipeUpdate) -> RepositoryResult<Option<Recipe>> {
        let mut store = self.store.write();
        let Some(recipe) = store.recipes.get_mut(&id) else {
            return Ok(None);
        };
        update.apply_to(recipe);
        recipe.updated_at = Some(Utc::now());
        Ok(Some(recipe.clone()))
    }

    async fn delete(&self, id: RecipeId) -> RepositoryResult<bool> {
        Ok(self.store.write().recipes.remove(&id).is_some())
    }
}

// --- Postgres ---

const COLUMNS: &str = "id, name, type, time_to_cook, ingredients, steps, nutrition, description, \
                       notes, servings, user_image_paths, generated_image_path, created_at, updated_at";

#[derive(sqlx::FromRow)]
struct RecipeRow {
    id: i64,
    name: String,
    #[sqlx(rename = "type")]
    recipe_type: String,
    time_to_cook: f64,
    ingredients: Json<Vec<Ingredient>>,
    steps: Json<Vec<Step>>,
    nutrition: Json<Nutrition>,
    description: String,
    notes: Option<String>,
    servings: Option<f64>,
    user_image_paths: Vec<String>,
    generated_image_path: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<RecipeRow> for Recipe {
    type Error = RepositoryError;

    fn try_from(row: RecipeRow) -> Result<Self, Self::Error> {
        Ok(Recipe {
            id: Some(row.id),
            name: row.name,
            recipe_type: row
                .recipe_type
                .parse()
                .map_err(|e: crate::models::UnknownRecipeType| RepositoryError::Corrupt(e.to_string()))?,
            time_to_cook: row.time_to_cook,
            ingredients: row.ingredients.0,
            steps: row.steps.0,
            nutrition: row.nutrition.0,
            description: row.description,
            notes: row.notes,
            servings: row.servings,
            user_image_paths: row.user_image_paths,
            generated_image_path: row.generated_image_path,
            created_at: Some(row.created_at),
            updated_at: Some(row.updated_at),
        })
    }
}

fn to_tiny(rows: Vec<RecipeRow>) -> RepositoryResult<Vec<RecipeTiny>> {
    rows.into_iter()
        .map(|row| Recipe::try_from(row).map(|r| RecipeTiny::from(&r)))
        .collect()
}

fn escape_like(s: &str) -> String {
    s.replace('\\', "\\\\").replace('%', "\\%").replace('_', "\\_")
}

fn page_query(query: &PageQuery) -> QueryBuilder<'static, Postgres> {
    let mut qb = QueryBuilder::new(format!("SELECT {COLUMNS} FROM recipes"));
    let mut sep = " WHERE ";
    if !query.types.is_empty() {
        let types: Vec<String> = query.types.iter().map(|t| t.as_str().to_string()).collect();
        qb.push(sep).push("type = ANY(").push_bind(types).push(")");
        sep = " AND ";
    }
    if let Some(q) = &query.query {
        qb.push(sep).push("name ILIKE ").push_bind(format!("%{}%", escape_like(q)));
    }
    qb.push(" ORDER BY id LIMIT ")
        .push_bind(query.limit as i64)
        .push(" OFFSET ")
        .push_bind(query.start as i64);
    qb
}

pub struct PgRecipeRepository {
    pool: PgPool,
}

impl PgRecipeRepository {
    /// Connects and brings the schema up to date.
    pub async fn connect(database_url: &str) -> RepositoryResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await?;
        sqlx::migrate!("./migrations").run(&pool).await?;
        info!("Connected to Postgres and applied migrations");
        Ok(Self { pool })
    }
}

#[async_trait]
impl RecipeRepository for PgRecipeRepository {
    async fn create(&self, recipe: Recipe) -> RepositoryResult<Recipe> {
        let sql = format!(
            "INSERT INTO recipes (name, type, time_to_cook, ingredients, steps, nutrition, description, \
             notes, servings, user_image_paths, generated_image_path) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11) RETURNING {COLUMNS}"
        );
        let row = sqlx::query_as::<Postgres, RecipeRow>(&sql)
            .bind(&recipe.name)
            .bind(recipe.recipe_type.as_str())
            .bind(recipe.time_to_cook)
            .bind(Json(&recipe.ingredients))
            .bind(Json(&recipe.steps))
            .bind(Json(&recipe.nutrition))
            .bind(&recipe.description)
            .bind(&recipe.notes)
            .bind(recipe.servings)
            .bind(&recipe.user_image_paths)
            .bind(&recipe.generated_image_path)
            .fetch_one(&self.pool)
            .await?;
        Recipe::try_from(row)
    }

    async fn get_by_id(&self, id: RecipeId) -> RepositoryResult<Option<Recipe>> {
        let sql = format!("SELECT {COLUMNS} FROM recipes WHERE id = $1");
        sqlx::query_as::<Postgres, RecipeRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .map(Recipe::try_from)
            .transpose()
    }

    async fn page(&self, query: &PageQuery) -> RepositoryResult<Vec<RecipeTiny>> {
        let mut qb = page_query(query);
        let rows = qb.build_query_as::<RecipeRow>().fetch_all(&self.pool).await?;
        to_tiny(rows)
    }

    async fn latest(&self, limit: usize) -> RepositoryResult<Vec<RecipeTiny>> {
        let sql = format!("SELECT {COLUMNS} FROM recipes ORDER BY created_at DESC, id DESC LIMIT $1");
        let rows = sqlx::query_as::<Postgres, RecipeRow>(&sql)
            .bind(limit as i64)
            .fetch_all(&self.pool)
            .await?;
        to_tiny(rows)
    }

    async fn random_id(&self) -> RepositoryResult<Option<RecipeId>> {
        let id = sqlx::query_scalar::<Postgres, i64>("SELECT id FROM recipes ORDER BY RANDOM() LIMIT 1")
            .fetch_optional(&self.pool)
            .await?;
        Ok(id)
    }

    async fn update(&self, id: RecipeId, update: RecipeUpdate) -> RepositoryResult<Option<Recipe>> {
        let sql = format!(
            "UPDATE recipes SET \
                name = COALESCE($1, name), \
                type = COALESCE($2, type), \
                time_to_cook = COALESCE($3, time_to_cook), \
                ingredients = COALESCE($4, ingredients), \
                steps = COALESCE($5, steps), \
                nutrition = COALESCE($6, nutrition), \
                description = COALESCE($7, description), \
                notes = COALESCE($8, notes), \
                servings = COALESCE($9, servings), \
                user_image_paths = COALESCE($10, user_image_paths), \
                updated_at = now() \
             WHERE id = $11 RETURNING {COLUMNS}"
        );
        sqlx::query_as::<Postgres, RecipeRow>(&sql)
            .bind(update.name)
            .bind(update.recipe_type.map(|t| t.as_str()))
            .bind(update.time_to_cook)
            .bind(update.ingredients.map(Json))
            .bind(update.steps.map(Json))
            .bind(update.nutrition.map(Json))
            .bind(update.description)
            .bind(update.notes)
            .bind(update.servings)
            .bind(update.user_image_paths)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .map(Recipe::try_from)
            .transpose()
    }

    async fn delete(&self, id: RecipeId) -> RepositoryResult<bool> {
        let rows_affected = sqlx::query("DELETE FROM recipes WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?
            .rows_affected();
        Ok(rows_affected > 0)
    }
}

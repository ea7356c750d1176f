use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_with::skip_serializing_none;
use std::{fmt, str::FromStr};
use thiserror::Error;

pub type RecipeId = i64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecipeType {
    Dessert,
    MainDish,
    SideDish,
    Appetizer,
    Beverage,
}

impl RecipeType {
    pub const ALL: [RecipeType; 5] = [
        RecipeType::Dessert,
        RecipeType::MainDish,
        RecipeType::SideDish,
        RecipeType::Appetizer,
        RecipeType::Beverage,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RecipeType::Dessert => "dessert",
            RecipeType::MainDish => "main_dish",
            RecipeType::SideDish => "side_dish",
            RecipeType::Appetizer => "appetizer",
            RecipeType::Beverage => "beverage",
        }
    }
}

impl fmt::Display for RecipeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error, PartialEq)]
#[error("unknown recipe type: {0}")]
pub struct UnknownRecipeType(pub String);

impl FromStr for RecipeType {
    type Err = UnknownRecipeType;

    // Exact match only; the model is constrained to the lowercase enum values.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        RecipeType::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| UnknownRecipeType(s.to_string()))
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Ingredient {
    pub name: String,
    pub quantity: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Step {
    pub order: u32,
    pub description: String,
}

/// Per-serving estimate produced by the model. Fat, carbohydrates and protein are grams.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
pub struct Nutrition {
    #[serde(default)]
    pub calories: f64,
    #[serde(default)]
    pub fat: f64,
    #[serde(default)]
    pub carbohydrates: f64,
    #[serde(default)]
    pub protein: f64,
}

/// Canonical recipe. `id` and the timestamps stay unset until the repository stores it.
#[skip_serializing_none]
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Recipe {
    #[serde(default)]
    pub id: Option<RecipeId>,
    pub name: String,
    #[serde(rename = "type")]
    pub recipe_type: RecipeType,
    /// Minutes.
    pub time_to_cook: f64,
    pub ingredients: Vec<Ingredient>,
    pub steps: Vec<Step>,
    #[serde(default)]
    pub nutrition: Nutrition,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub servings: Option<f64>,
    #[serde(default)]
    pub user_image_paths: Vec<String>,
    #[serde(default)]
    pub generated_image_path: Option<String>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

/// List/search projection, always derived from a [`Recipe`].
#[skip_serializing_none]
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct RecipeTiny {
    pub id: Option<RecipeId>,
    pub name: String,
    pub description: String,
    pub image_path: Option<String>,
    pub time_to_cook: f64,
    #[serde(rename = "type")]
    pub recipe_type: RecipeType,
}

impl From<&Recipe> for RecipeTiny {
    fn from(recipe: &Recipe) -> Self {
        Self {
            id: recipe.id,
            name: recipe.name.clone(),
            description: recipe.description.clone(),
            image_path: recipe.user_image_paths.first().cloned(),
            time_to_cook: recipe.time_to_cook,
            recipe_type: recipe.recipe_type,
        }
    }
}

/// Partial update; absent fields are left untouched.
#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
pub struct RecipeUpdate {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default, rename = "type")]
    pub recipe_type: Option<RecipeType>,
    #[serde(default)]
    pub time_to_cook: Option<f64>,
    #[serde(default)]
    pub ingredients: Option<Vec<Ingredient>>,
    #[serde(default)]
    pub steps: Option<Vec<Step>>,
    #[serde(default)]
    pub nutrition: Option<Nutrition>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub servings: Option<f64>,
    #[serde(default)]
    pub user_image_paths: Option<Vec<String>>,
}

impl RecipeUpdate {
    /// Rejects changes that would leave a recipe without a name, ingredients
    /// or steps, or with steps not numbered `1..=n`.
    pub fn validate(&self) -> Result<(), String> {
        if matches!(&self.name, Some(name) if name.trim().is_empty()) {
            return Err("Recipe name must not be empty".to_string());
        }
        if matches!(&self.ingredients, Some(ingredients) if ingredients.is_empty()) {
            return Err("A recipe needs at least one ingredient".to_string());
        }
        if let Some(steps) = &self.steps {
            if steps.is_empty() {
                return Err("A recipe needs at least one step".to_string());
            }
            if steps.iter().zip(1u32..).any(|(step, expected)| step.order != expected) {
                return Err("Step order must run from 1 without gaps".to_string());
            }
        }
        Ok(())
    }

    pub fn apply_to(self, recipe: &mut Recipe) {
        if let Some(name) = self.name {
            recipe.name = name;
        }
        if let Some(t) = self.recipe_type {
            recipe.recipe_type = t;
        }
        if let Some(minutes) = self.time_to_cook {
            recipe.time_to_cook = minutes;
        }
        if let Some(ingredients) = self.ingredients {
            recipe.ingredients = ingredients;
        }
        if let Some(steps) = self.steps {
            recipe.steps = steps;
        }
        if let Some(nutrition) = self.nutrition {
            recipe.nutrition = nutrition;
        }
        if let Some(description) = self.description {
            recipe.description = description;
        }
        if let Some(notes) = self.notes {
            recipe.notes = Some(notes);
        }
        if let Some(servings) = self.servings {
            recipe.servings = Some(servings);
        }
        if let Some(paths) = self.user_image_paths {
            recipe.user_image_paths = paths;
        }
    }
}

/// Pagination and filters for list views.
#[derive(Debug, Clone, PartialEq)]
pub struct PageQuery {
    pub start: usize,
    pub limit: usize,
    pub types: Vec<RecipeType>,
    pub query: Option<String>,
}

impl Default for PageQuery {
    fn default() -> Self {
        Self { start: 0, limit: 10, types: Vec::new(), query: None }
    }
}

impl PageQuery {
    pub fn matches(&self, recipe: &Recipe) -> bool {
        let type_ok = self.types.is_empty() || self.types.contains(&recipe.recipe_type);
        let query_ok = match &self.query {
            Some(q) => recipe.name.to_lowercase().contains(&q.to_lowercase()),
            None => true,
        };
        type_ok && query_ok
    }
}

/// One uploaded photo as received from the client.
#[derive(Debug, Clone)]
pub struct ImageUpload {
    pub bytes: Bytes,
    pub mime_type: String,
}

impl ImageUpload {
    pub fn new(bytes: impl Into<Bytes>, mime_type: impl Into<String>) -> Self {
        Self { bytes: bytes.into(), mime_type: mime_type.into() }
    }
}

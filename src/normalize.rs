//! Validation and normalization of the extraction model's raw output.
//!
//! Checks run in a fixed order and the first failure wins:
//! empty object, missing/sentinel name, ingredients, instructions, type.

use serde::{de::DeserializeOwned, Deserialize, Deserializer};
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::{debug, info};

use crate::{
    models::{Ingredient, Nutrition, Recipe, RecipeType, Step},
    schema::NO_RECIPE_SENTINEL,
};

/// The images do not contain a usable recipe. Messages are shown to the user as-is.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum Rejection {
    #[error("Empty model response. The images likely contain no recipe content.")]
    EmptyResponse,
    #[error("No valid recipe detected. Please upload images of recipe cards, cookbook pages, or handwritten recipes.")]
    NoRecipe,
    #[error("No ingredients found. Please ensure the images contain a complete recipe with ingredients.")]
    NoIngredients,
    #[error("No instructions found. Please ensure the images contain a complete recipe with preparation steps.")]
    NoInstructions,
    #[error("Unable to determine a valid recipe type. The images may not contain a valid recipe.")]
    InvalidType,
}

impl Rejection {
    pub fn reason(&self) -> String {
        self.to_string()
    }
}

/// Decodes a field, mapping a value of the wrong shape to `None` instead of failing the document.
fn lenient<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let value = Value::deserialize(deserializer)?;
    Ok(serde_json::from_value(value).ok())
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ExtractedRecipe {
    #[serde(default, deserialize_with = "lenient")]
    recipe_name: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    recipe_type: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    cook_time: Option<f64>,
    #[serde(default, deserialize_with = "lenient")]
    ingredients: Option<Vec<Value>>,
    #[serde(default, deserialize_with = "lenient")]
    instructions: Option<Vec<Value>>,
    #[serde(default, deserialize_with = "lenient")]
    nutrition: Option<Nutrition>,
    #[serde(default, deserialize_with = "lenient")]
    servings: Option<f64>,
    #[serde(default, deserialize_with = "lenient")]
    description: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    notes: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ExtractedIngredient {
    #[serde(default)]
    name: String,
    #[serde(default)]
    quantity: String,
}

fn parse_object(raw: &str) -> Map<String, Value> {
    match serde_json::from_str::<Value>(raw) {
        Ok(Value::Object(map)) => map,
        Ok(other) => {
            debug!("Model response is JSON but not an object: {}", other);
            Map::new()
        }
        Err(e) => {
            debug!("Model response is not valid JSON: {}", e);
            Map::new()
        }
    }
}

/// Elements are kept verbatim; only non-objects and blank names are skipped.
/// A missing quantity ("salt, to taste") becomes `""`.
fn to_ingredient(value: Value) -> Option<Ingredient> {
    let ing: ExtractedIngredient = serde_json::from_value(value).ok()?;
    if ing.name.trim().is_empty() {
        return None;
    }
    Some(Ingredient { name: ing.name, quantity: ing.quantity })
}

/// Turns raw model text into an unpersisted [`Recipe`], or explains why it is not one.
///
/// Deterministic and side-effect free. Numeric fields are carried through unclamped.
pub fn normalize(raw: &str) -> Result<Recipe, Rejection> {
    let object = parse_object(raw);
    if object.is_empty() {
        return Err(Rejection::EmptyResponse);
    }

    let extracted: ExtractedRecipe =
        serde_json::from_value(Value::Object(object)).unwrap_or_default();

    let name = match extracted.recipe_name.as_deref().map(str::trim) {
        Some(n) if !n.is_empty() && n != NO_RECIPE_SENTINEL => n.to_string(),
        _ => return Err(Rejection::NoRecipe),
    };

    let ingredients: Vec<Ingredient> = extracted
        .ingredients
        .unwrap_or_default()
        .into_iter()
        .filter_map(to_ingredient)
        .collect();
    if ingredients.is_empty() {
        return Err(Rejection::NoIngredients);
    }

    let instructions: Vec<String> = extracted
        .instructions
        .unwrap_or_default()
        .into_iter()
        .filter_map(|v| match v {
            Value::String(s) => Some(s),
            _ => None,
        })
        .collect();
    if instructions.is_empty() {
        return Err(Rejection::NoInstructions);
    }

    let recipe_type: RecipeType = extracted
        .recipe_type
        .as_deref()
        .and_then(|t| t.parse().ok())
        .ok_or(Rejection::InvalidType)?;

    let steps = instructions
        .into_iter()
        .zip(1u32..)
        .map(|(description, order)| Step { order, description })
        .collect();

    info!(recipe = %name, %recipe_type, "Model output accepted as recipe");

    Ok(Recipe {
        id: None,
        name,
        recipe_type,
        time_to_cook: extracted.cook_time.unwrap_or_default(),
        ingredients,
        steps,
        nutrition: extracted.nutrition.unwrap_or_default(),
        description: extracted.description.unwrap_or_default(),
        notes: extracted.notes,
        servings: extracted.servings,
        user_image_paths: Vec::new(),
        generated_image_path: None,
        created_at: None,
        updated_at: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    const PANCAKES: &str = r#"{"recipeName":"Pancakes","recipeType":"main_dish","cookTime":15,"ingredients":[{"name":"flour","quantity":"1 cup"}],"instructions":["Mix","Cook"],"nutrition":{"calories":300,"fat":10,"carbohydrates":40,"protein":8},"servings":2,"description":"Fluffy pancakes"}"#;

    fn valid_with(overrides: Value) -> String {
        let mut base: Value = serde_json::from_str(PANCAKES).unwrap();
        for (k, v) in overrides.as_object().unwrap() {
            base[k] = v.clone();
        }
        base.to_string()
    }

    #[test]
    fn sentinel_name_is_rejected() {
        let err = normalize(r#"{"recipeName":"No recipe found"}"#).unwrap_err();
        assert_eq!(err, Rejection::NoRecipe);
        assert!(err.reason().to_lowercase().contains("no valid recipe"));
    }

    #[test]
    fn empty_object_is_rejected_as_empty() {
        let err = normalize("{}").unwrap_err();
        assert_eq!(err, Rejection::EmptyResponse);
        assert!(err.reason().to_lowercase().contains("empty"));
    }

    #[test]
    fn pancakes_are_accepted() {
        let recipe = normalize(PANCAKES).unwrap();
        assert_eq!(recipe.id, None);
        assert_eq!(recipe.name, "Pancakes");
        assert_eq!(recipe.recipe_type, RecipeType::MainDish);
        assert_eq!(recipe.time_to_cook, 15.0);
        assert_eq!(recipe.ingredients, vec![Ingredient { name: "flour".into(), quantity: "1 cup".into() }]);
        assert_eq!(
            recipe.steps,
            vec![
                Step { order: 1, description: "Mix".into() },
                Step { order: 2, description: "Cook".into() },
            ]
        );
        assert_eq!(
            recipe.nutrition,
            Nutrition { calories: 300.0, fat: 10.0, carbohydrates: 40.0, protein: 8.0 }
        );
        assert_eq!(recipe.servings, Some(2.0));
        assert_eq!(recipe.description, "Fluffy pancakes");
        assert_eq!(recipe.notes, None);
        assert!(recipe.user_image_paths.is_empty());
    }

    #[test]
    fn unparseable_text_is_rejected_as_empty() {
        for raw in ["", "   ", "not json", "{\"recipeName\":", "```json\n{}\n```", "null", "[]", "42", "\"Pancakes\""] {
            assert_eq!(normalize(raw), Err(Rejection::EmptyResponse), "input: {raw:?}");
        }
    }

    #[test]
    fn sentinel_wins_over_otherwise_valid_fields() {
        let raw = valid_with(json!({"recipeName": "No recipe found"}));
        assert_eq!(normalize(&raw), Err(Rejection::NoRecipe));
    }

    #[test]
    fn missing_or_blank_name_is_rejected() {
        let mut value: Value = serde_json::from_str(PANCAKES).unwrap();
        value.as_object_mut().unwrap().remove("recipeName");
        assert_eq!(normalize(&value.to_string()), Err(Rejection::NoRecipe));
        assert_eq!(normalize(&valid_with(json!({"recipeName": "   "}))), Err(Rejection::NoRecipe));
        assert_eq!(normalize(&valid_with(json!({"recipeName": 12}))), Err(Rejection::NoRecipe));
    }

    #[test]
    fn empty_ingredients_are_rejected_even_with_instructions() {
        assert_eq!(normalize(&valid_with(json!({"ingredients": []}))), Err(Rejection::NoIngredients));
        assert_eq!(normalize(&valid_with(json!({"ingredients": null}))), Err(Rejection::NoIngredients));
        assert_eq!(
            normalize(&valid_with(json!({"ingredients": [{"name": " ", "quantity": "1"}]}))),
            Err(Rejection::NoIngredients)
        );
    }

    #[test]
    fn ingredients_without_quantity_are_kept() {
        let raw = valid_with(json!({"ingredients": [
            {"name": "salt", "quantity": ""},
            {"name": "water", "quantity": "1 l"},
        ]}));
        assert_eq!(
            normalize(&raw).unwrap().ingredients,
            vec![
                Ingredient { name: "salt".into(), quantity: "".into() },
                Ingredient { name: "water".into(), quantity: "1 l".into() },
            ]
        );

        let recipe = normalize(&valid_with(json!({"ingredients": [{"name": "salt"}]}))).unwrap();
        assert_eq!(recipe.ingredients, vec![Ingredient { name: "salt".into(), quantity: "".into() }]);
    }

    #[test]
    fn non_object_and_nameless_ingredients_are_skipped() {
        let raw = valid_with(json!({"ingredients": [
            "2 eggs",
            {"quantity": "1 cup"},
            {"name": "milk", "quantity": "200 ml"},
        ]}));
        assert_eq!(
            normalize(&raw).unwrap().ingredients,
            vec![Ingredient { name: "milk".into(), quantity: "200 ml".into() }]
        );
    }

    #[test]
    fn sentinel_is_matched_literally() {
        assert_eq!(normalize(&valid_with(json!({"recipeName": "  No recipe found "}))), Err(Rejection::NoRecipe));
        let recipe = normalize(&valid_with(json!({"recipeName": "no recipe found"}))).unwrap();
        assert_eq!(recipe.name, "no recipe found");
    }

    #[test]
    fn empty_instructions_are_rejected() {
        assert_eq!(normalize(&valid_with(json!({"instructions": []}))), Err(Rejection::NoInstructions));
        assert_eq!(normalize(&valid_with(json!({"instructions": "Mix"}))), Err(Rejection::NoInstructions));
    }

    #[test]
    fn ingredients_are_checked_before_instructions() {
        let raw = valid_with(json!({"ingredients": [], "instructions": []}));
        assert_eq!(normalize(&raw), Err(Rejection::NoIngredients));
    }

    #[test]
    fn unknown_or_missing_type_is_rejected() {
        for t in [json!("soup"), json!("Dessert"), json!(""), json!(null), json!(3)] {
            let raw = valid_with(json!({"recipeType": t}));
            assert_eq!(normalize(&raw), Err(Rejection::InvalidType), "type: {t}");
        }
    }

    #[test]
    fn every_enum_value_is_accepted() {
        for t in RecipeType::ALL {
            let recipe = normalize(&valid_with(json!({"recipeType": t.as_str()}))).unwrap();
            assert_eq!(recipe.recipe_type, t);
        }
    }

    #[test]
    fn steps_are_numbered_contiguously_from_one() {
        for n in 1..=12usize {
            let instructions: Vec<String> = (0..n).map(|i| format!("step {i}")).collect();
            let recipe = normalize(&valid_with(json!({"instructions": instructions}))).unwrap();
            assert_eq!(recipe.steps.len(), n);
            for (i, step) in recipe.steps.iter().enumerate() {
                assert_eq!(step.order as usize, i + 1);
                assert_eq!(step.description, instructions[i]);
            }
        }
    }

    #[test]
    fn normalize_is_deterministic() {
        let raw = valid_with(json!({"notes": "Rest the batter", "servings": 4}));
        assert_eq!(normalize(&raw), normalize(&raw));
        assert_eq!(normalize("garbage"), normalize("garbage"));
    }

    #[test]
    fn optional_and_malformed_numeric_fields_do_not_reject() {
        let mut value: Value = serde_json::from_str(PANCAKES).unwrap();
        let obj = value.as_object_mut().unwrap();
        obj.remove("servings");
        obj.remove("nutrition");
        obj.insert("cookTime".into(), json!("about an hour"));
        let recipe = normalize(&value.to_string()).unwrap();
        assert_eq!(recipe.servings, None);
        assert_eq!(recipe.nutrition, Nutrition::default());
        assert_eq!(recipe.time_to_cook, 0.0);
    }

    #[test]
    fn negative_values_are_carried_through_unclamped() {
        let raw = valid_with(json!({"servings": -1, "nutrition": {"calories": -5, "fat": 1, "carbohydrates": 2, "protein": 3}}));
        let recipe = normalize(&raw).unwrap();
        assert_eq!(recipe.servings, Some(-1.0));
        assert_eq!(recipe.nutrition.calories, -5.0);
    }
}

//! Structured-output contract sent to the extraction model.
//!
//! The model must either fill every required field or set `recipeName` to
//! [`NO_RECIPE_SENTINEL`]. Field names here are the ones the normalizer reads.

use serde_json::{json, Value};

use crate::models::RecipeType;

pub const NO_RECIPE_SENTINEL: &str = "No recipe found";

pub const EXTRACTION_PROMPT: &str = "Analyze the following image(s) to determine if they contain a recipe.

IMPORTANT VALIDATION RULES:
1. Only extract recipes if the image clearly shows recipe content (ingredients, cooking instructions, food preparation steps).
2. If the image does NOT contain recipe-related content (e.g., random photos, non-food items, text unrelated to cooking, landscapes, people, etc.), you MUST set \"recipeName\" to \"No recipe found\".
3. The recipe could be handwritten, typed, or in any format, but it must be a legitimate recipe.
4. Images of random food without preparation instructions are NOT recipes.

Extract the recipe details and structure them into a valid JSON object.
Estimate nutrition per serving. If the number of servings is not stated, estimate it from typical portion sizes.
If you cannot find a legitimate recipe in the images, use \"recipeName\": \"No recipe found\".";

pub fn recipe_type_values() -> Vec<&'static str> {
    RecipeType::ALL.iter().map(RecipeType::as_str).collect()
}

/// Gemini `responseSchema` (OpenAPI subset) for a single extracted recipe.
pub fn recipe_response_schema() -> Value {
    json!({
        "type": "OBJECT",
        "properties": {
            "recipeName": {
                "type": "STRING",
                "description": "The name of the recipe"
            },
            "recipeType": {
                "type": "STRING",
                "enum": recipe_type_values(),
                "description": "The category of the recipe. Must be one of: dessert, main_dish, side_dish, appetizer, beverage."
            },
            "cookTime": {
                "type": "NUMBER",
                "description": "The total time required to make the recipe in minutes, e.g. 45."
            },
            "ingredients": {
                "type": "ARRAY",
                "description": "List of ingredients required for the recipe.",
                "items": {
                    "type": "OBJECT",
                    "properties": {
                        "name": {
                            "type": "STRING",
                            "description": "The name of the ingredient, e.g. 'sugar' or 'flour'."
                        },
                        "quantity": {
                            "type": "STRING",
                            "description": "The quantity of the ingredient, e.g. \"2 cups\" or \"100g\"."
                        }
                    },
                    "required": ["name", "quantity"]
                }
            },
            "instructions": {
                "type": "ARRAY",
                "description": "An ordered list of steps to follow to prepare the recipe.",
                "items": {
                    "type": "STRING",
                    "description": "A single imperative step in the recipe instructions."
                }
            },
            "nutrition": {
                "type": "OBJECT",
                "description": "Estimated nutrition per serving.",
                "properties": {
                    "calories": { "type": "NUMBER", "description": "Calories per serving." },
                    "protein": { "type": "NUMBER", "description": "Protein per serving, in grams." },
                    "fat": { "type": "NUMBER", "description": "Fat per serving, in grams." },
                    "carbohydrates": { "type": "NUMBER", "description": "Carbohydrates per serving, in grams." }
                },
                "required": ["calories", "protein", "fat", "carbohydrates"]
            },
            "servings": {
                "type": "NUMBER",
                "description": "The number of servings the recipe yields. If not specified, estimate from typical portion sizes."
            },
            "description": {
                "type": "STRING",
                "description": "A short summary of the dish, its flavor and characteristics."
            },
            "notes": {
                "type": "STRING",
                "description": "Optional: Any additional notes, tips, or variations mentioned in the recipe."
            }
        },
        "required": [
            "recipeName", "recipeType", "cookTime", "ingredients",
            "instructions", "nutrition", "servings", "description"
        ]
    })
}

//! Best-effort AI illustration of a finished dish.

use async_trait::async_trait;
use base64::Engine;
use bytes::Bytes;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::{gemini::GeminiClient, models::Recipe};

#[derive(Debug, Clone, PartialEq)]
pub struct Illustration {
    pub bytes: Bytes,
    pub mime_type: String,
}

#[async_trait]
pub trait Illustrator: Send + Sync {
    /// `None` on any failure; never errors.
    async fn illustrate(&self, recipe: &Recipe) -> Option<Illustration>;
}

pub fn build_illustration_prompt(recipe: &Recipe) -> String {
    let main_ingredients = recipe
        .ingredients
        .iter()
        .take(5)
        .map(|i| i.name.as_str())
        .collect::<Vec<_>>()
        .join(", ");
    format!(
        "Create a high-quality, appetizing, photorealistic image of {name}. \
         This {kind} dish takes approximately {minutes} minutes to cook. \
         Main ingredients include: {main_ingredients}. \
         Show the finished dish beautifully plated, with appealing presentation suitable for a recipe book. \
         Make it look delicious and inviting.",
        name = recipe.name,
        kind = recipe.recipe_type,
        minutes = recipe.time_to_cook,
    )
}

pub struct GeminiIllustrator {
    gemini: Arc<GeminiClient>,
    model: String,
}

impl GeminiIllustrator {
    pub fn new(gemini: Arc<GeminiClient>, model: String) -> Self {
        Self { gemini, model }
    }

    fn build_request(prompt: &str) -> Value {
        json!({
            "contents": [{ "parts": [{ "text": prompt }] }],
            "generationConfig": {
                "responseModalities": ["IMAGE"],
                "imageConfig": { "aspectRatio": "16:9" }
            }
        })
    }
}

#[async_trait]
impl Illustrator for GeminiIllustrator {
    async fn illustrate(&self, recipe: &Recipe) -> Option<Illustration> {
        let prompt = build_illustration_prompt(recipe);
        let preview: String = prompt.chars().take(100).collect();
        info!(recipe = %recipe.name, "Generating illustration with prompt (truncated): {}", preview);

        let response = match self.gemini.generate_content(&self.model, &Self::build_request(&prompt)).await {
            Ok(r) => r,
            Err(e) => {
                error!(recipe = %recipe.name, "Illustration generation failed: {}", e);
                return None;
            }
        };

        let Some((mime_type, data)) = response.first_image() else {
            warn!(recipe = %recipe.name, "No image data returned from model");
            return None;
        };

        match base64::engine::general_purpose::STANDARD.decode(data) {
            Ok(bytes) if !bytes.is_empty() => {
                let mime_type = if mime_type.is_empty() { "image/png" } else { mime_type };
                info!(recipe = %recipe.name, size_bytes = bytes.len(), "Illustration generated");
                Some(Illustration { bytes: Bytes::from(bytes), mime_type: mime_type.to_string() })
            }
            Ok(_) => {
                warn!(recipe = %recipe.name, "Model returned an empty image payload");
                None
            }
            Err(e) => {
                error!(recipe = %recipe.name, "Illustration payload is not valid base64: {}", e);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::sample_recipe;
    use mockito::Matcher;
    use std::time::Duration;

    fn illustrator(base_url: String) -> GeminiIllustrator {
        let client = GeminiClient::new("k".into(), base_url, Duration::from_secs(5)).unwrap();
        GeminiIllustrator::new(Arc::new(client), "gemini-2.5-flash-image".into())
    }

    #[test]
    fn prompt_names_at_most_five_ingredients() {
        let mut recipe = sample_recipe();
        recipe.ingredients = (1..=7)
            .map(|i| crate::models::Ingredient { name: format!("ing{i}"), quantity: "1".into() })
            .collect();
        let prompt = build_illustration_prompt(&recipe);
        assert!(prompt.contains("ing1, ing2, ing3, ing4, ing5."));
        assert!(!prompt.contains("ing6"));
        assert!(prompt.contains("main_dish dish takes approximately 15 minutes"));
        assert!(prompt.contains("photorealistic image of Pancakes"));
    }

    #[test]
    fn request_asks_for_a_wide_image() {
        let body = GeminiIllustrator::build_request("p");
        assert_eq!(body["generationConfig"]["imageConfig"]["aspectRatio"], "16:9");
        assert_eq!(body["generationConfig"]["responseModalities"], json!(["IMAGE"]));
    }

    #[tokio::test]
    async fn decodes_the_inline_image() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", Matcher::Regex("gemini-2.5-flash-image:generateContent".into()))
            .with_status(200)
            .with_body(r#"{"candidates":[{"content":{"parts":[{"inlineData":{"mimeType":"image/png","data":"AQID"}}]}}]}"#)
            .create_async()
            .await;

        let image = illustrator(server.url()).illustrate(&sample_recipe()).await.unwrap();
        assert_eq!(image.bytes, Bytes::from_static(&[1, 2, 3]));
        assert_eq!(image.mime_type, "image/png");
    }

    #[tokio::test]
    async fn remote_failure_yields_none() {
        let mut server = mockito::Server::new_async().await;
        server.mock("POST", Matcher::Any).with_status(500).create_async().await;
        assert!(illustrator(server.url()).illustrate(&sample_recipe()).await.is_none());
    }

    #[tokio::test]
    async fn unreachable_service_yields_none() {
        assert!(illustrator("http://127.0.0.1:1".into()).illustrate(&sample_recipe()).await.is_none());
    }

    #[tokio::test]
    async fn text_only_response_yields_none() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", Matcher::Any)
            .with_status(200)
            .with_body(r#"{"candidates":[{"content":{"parts":[{"text":"I cannot draw that"}]}}]}"#)
            .create_async()
            .await;
        assert!(illustrator(server.url()).illustrate(&sample_recipe()).await.is_none());
    }
}

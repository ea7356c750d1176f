//! Extraction Invoker: photos in, raw structured text out.

use async_trait::async_trait;
use serde_json::{json, Value};
use std::{sync::Arc, time::Duration};
use tracing::{info, warn};

use crate::{
    gemini::{inline_image_part, GeminiClient, GeminiError},
    models::ImageUpload,
    schema::{recipe_response_schema, EXTRACTION_PROMPT},
};

#[async_trait]
pub trait RecipeExtractor: Send + Sync {
    /// Returns the model's raw text. Transport failures propagate; content is not judged here.
    async fn extract(&self, images: &[ImageUpload]) -> Result<String, GeminiError>;
}

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self { max_retries: 0, delay: Duration::from_millis(1000) }
    }
}

pub struct GeminiExtractor {
    gemini: Arc<GeminiClient>,
    model: String,
    retry: RetryPolicy,
}

impl GeminiExtractor {
    pub fn new(gemini: Arc<GeminiClient>, model: String, retry: RetryPolicy) -> Self {
        Self { gemini, model, retry }
    }

    pub fn build_request(images: &[ImageUpload]) -> Value {
        let mut parts = vec![json!({ "text": EXTRACTION_PROMPT })];
        parts.extend(images.iter().map(|img| inline_image_part(&img.mime_type, &img.bytes)));
        json!({
            "contents": [{ "parts": parts }],
            "generationConfig": {
                "responseMimeType": "application/json",
                "responseSchema": recipe_response_schema(),
            }
        })
    }
}

#[async_trait]
impl RecipeExtractor for GeminiExtractor {
    async fn extract(&self, images: &[ImageUpload]) -> Result<String, GeminiError> {
        let body = Self::build_request(images);
        let attempts = self.retry.max_retries + 1;
        let mut attempt = 1;
        loop {
            info!(model = %self.model, images = images.len(), attempt, "Extracting recipe from images");
            match self.gemini.generate_content(&self.model, &body).await {
                Ok(response) => {
                    let text = response.text();
                    info!(chars = text.len(), "Extraction response received");
                    return Ok(text);
                }
                Err(e) if e.is_transient() && attempt < attempts => {
                    let delay = self.retry.delay * attempt;
                    warn!("Extraction attempt {}/{} failed: {}; retrying in {:?}", attempt, attempts, e, delay);
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

use base64::Engine;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error, info};

#[derive(Debug, Error)]
pub enum GeminiError {
    #[error("HTTP error: {0}")]
    Http(String),
    #[error("Gemini API returned status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("Decode error: {0}")]
    Decode(String),
}

impl GeminiError {
    /// Transport failures, throttling and server-side errors may succeed on a later attempt.
    pub fn is_transient(&self) -> bool {
        match self {
            GeminiError::Http(_) => true,
            GeminiError::Status { status, .. } => *status == 429 || *status >= 500,
            GeminiError::Decode(_) => false,
        }
    }
}

// Helper function to truncate base64 data in JSON for cleaner logging
fn truncate_base64_in_json(value: &mut Value) {
    match value {
        Value::Object(map) => {
            for (key, val) in map.iter_mut() {
                if key == "data" {
                    if let Value::String(s) = val {
                        if s.len() > 100 && s.chars().all(|c| c.is_ascii_alphanumeric() || c == '+' || c == '/' || c == '=') {
                            *val = Value::String(format!("{}...[truncated {} chars]", &s[..50], s.len() - 50));
                        }
                    }
                } else {
                    truncate_base64_in_json(val);
                }
            }
        }
        Value::Array(arr) => {
            for val in arr.iter_mut() {
                truncate_base64_in_json(val);
            }
        }
        _ => {}
    }
}

fn loggable(value: &Value) -> String {
    let mut copy = value.clone();
    truncate_base64_in_json(&mut copy);
    serde_json::to_string(&copy).unwrap_or_default()
}

/// Request part carrying one image inline as base64.
pub fn inline_image_part(mime_type: &str, bytes: &[u8]) -> Value {
    json!({
        "inlineData": {
            "mimeType": mime_type,
            "data": base64::engine::general_purpose::STANDARD.encode(bytes),
        }
    })
}

/// Thin client over the `generateContent` REST endpoint. Constructed once and shared.
pub struct GeminiClient {
    client: Client,
    api_key: String,
    base_url: String,
}

impl GeminiClient {
    pub fn new(api_key: String, base_url: String, timeout: Duration) -> Result<Self, GeminiError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| GeminiError::Http(e.to_string()))?;
        Ok(Self {
            client,
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub async fn generate_content(&self, model: &str, body: &Value) -> Result<GeminiResponse, GeminiError> {
        let url = format!("{}/models/{}:generateContent?key={}", self.base_url, model, self.api_key);

        info!(model, "Making request to: {}", url.replace(&self.api_key, "***"));
        debug!("Request body: {}", loggable(body));

        let response = self.client
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(|e| GeminiError::Http(e.to_string().replace(&self.api_key, "***")))?;

        let status = response.status();
        info!(model, %status, "Gemini response received");

        let response_text = response.text().await
            .map_err(|e| GeminiError::Http(e.to_string()))?;

        if !status.is_success() {
            error!(model, %status, "Gemini API error response: {}", response_text);
            return Err(GeminiError::Status { status: status.as_u16(), body: response_text });
        }

        let parsed: GeminiResponse = serde_json::from_str(&response_text)
            .map_err(|e| GeminiError::Decode(format!("parse error: {}", e)))?;

        if let Ok(raw) = serde_json::from_str::<Value>(&response_text) {
            debug!("Raw Gemini API response: {}", loggable(&raw));
        }

        Ok(parsed)
    }
}

// --- Response Parsing Helpers ---

#[derive(Debug, Deserialize)]
pub struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate { #[serde(default)] content: Content }

#[derive(Debug, Deserialize, Default)]
struct Content { #[serde(default)] parts: Vec<Part> }

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Part {
    Inline {
        #[serde(rename = "inlineData")]
        inline_data: InlineData
    },
    Text { text: String },
    #[allow(dead_code)]
    Other(Value)
}

#[derive(Debug, Deserialize)]
struct InlineData {
    data: String,
    #[serde(rename = "mimeType", default)]
    mime_type: String,
}

impl GeminiResponse {
    /// Concatenated text parts of the first candidate; empty when the model returned none.
    pub fn text(&self) -> String {
        self.candidates
            .first()
            .map(|c| {
                c.content.parts.iter().filter_map(|p| match p {
                    Part::Text { text } => Some(text.as_str()),
                    _ => None,
                }).collect::<String>()
            })
            .unwrap_or_default()
    }

    /// First inline payload as `(mime_type, base64_data)`.
    pub fn first_image(&self) -> Option<(&str, &str)> {
        for c in &self.candidates {
            for p in &c.content.parts {
                if let Part::Inline { inline_data } = p {
                    info!("Found image data with mime type: {}", inline_data.mime_type);
                    return Some((inline_data.mime_type.as_str(), inline_data.data.as_str()));
                }
            }
        }
        info!("No inline image data found in response structure");
        None
    }
}

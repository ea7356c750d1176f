use std::{path::PathBuf, str::FromStr, time::Duration};
use thiserror::Error;

use crate::extraction::RetryPolicy;

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),
    #[error("{key}={value:?} is invalid: {reason}")]
    Invalid { key: &'static str, value: String, reason: String },
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub gemini_api_key: String,
    pub gemini_api_base: String,
    pub extraction_model: String,
    pub image_model: String,
    pub gemini_timeout: Duration,
    pub extraction_retry: RetryPolicy,
    pub generate_illustrations: bool,
    pub database_url: Option<String>,
    pub storage_dir: PathBuf,
    pub max_upload_bytes: usize,
    pub port: u16,
}

fn parsed<T>(lookup: &impl Fn(&str) -> Option<String>, key: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        Some(value) => value.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
            key,
            value,
            reason: e.to_string(),
        }),
        None => Ok(default),
    }
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let gemini_api_key = lookup("GEMINI_API_KEY")
            .filter(|k| !k.trim().is_empty())
            .ok_or(ConfigError::Missing("GEMINI_API_KEY"))?;

        Ok(Self {
            gemini_api_key,
            gemini_api_base: lookup("GEMINI_API_BASE")
                .unwrap_or_else(|| "https://generativelanguage.googleapis.com/v1beta".to_string()),
            extraction_model: lookup("GEMINI_MODEL_NAME").unwrap_or_else(|| "gemini-2.5-flash".to_string()),
            image_model: lookup("GEMINI_IMAGE_MODEL_NAME").unwrap_or_else(|| "gemini-2.5-flash-image".to_string()),
            gemini_timeout: Duration::from_secs(parsed(&lookup, "GEMINI_TIMEOUT_SECS", 60u64)?),
            extraction_retry: RetryPolicy {
                max_retries: parsed(&lookup, "GEMINI_MAX_RETRIES", 0u32)?,
                delay: Duration::from_millis(parsed(&lookup, "GEMINI_RETRY_DELAY_MS", 1000u64)?),
            },
            generate_illustrations: parsed(&lookup, "GENERATE_ILLUSTRATIONS", false)?,
            database_url: lookup("DATABASE_URL").filter(|u| !u.trim().is_empty()),
            storage_dir: lookup("STORAGE_DIR").map(PathBuf::from).unwrap_or_else(|| PathBuf::from("./storage")),
            max_upload_bytes: parsed(&lookup, "MAX_UPLOAD_BYTES", 25 * 1024 * 1024usize)?,
            port: parsed(&lookup, "PORT", 3001u16)?,
        })
    }
}

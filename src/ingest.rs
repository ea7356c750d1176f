//! Ingestion Orchestrator: photos of a recipe in, persisted [`Recipe`] out.

use futures::future::join_all;
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;
use tracing::{error, info, warn};

use crate::{
    extraction::RecipeExtractor,
    gemini::GeminiError,
    illustration::Illustrator,
    models::{ImageUpload, Recipe},
    normalize::{normalize, Rejection},
    repository::{RecipeRepository, RepositoryError},
    storage::{ImageStorage, StorageError},
};

/// Whether the caller can fix the problem (4xx) or the server failed (5xx).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Validation,
    ServerError,
}

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("No images uploaded")]
    NoImages,
    #[error(transparent)]
    Rejected(#[from] Rejection),
    #[error("Recipe extraction failed: {0}")]
    Extraction(#[from] GeminiError),
    #[error("Image upload failed: {0}")]
    Upload(#[from] StorageError),
    #[error("Failed to save recipe: {0}")]
    Repository(#[from] RepositoryError),
}

impl IngestError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            IngestError::NoImages | IngestError::Rejected(_) => ErrorKind::Validation,
            IngestError::Extraction(_) | IngestError::Upload(_) | IngestError::Repository(_) => {
                ErrorKind::ServerError
            }
        }
    }
}

pub struct RecipeIngestor {
    extractor: Arc<dyn RecipeExtractor>,
    storage: Arc<dyn ImageStorage>,
    repository: Arc<dyn RecipeRepository>,
    illustrator: Option<Arc<dyn Illustrator>>,
}

impl RecipeIngestor {
    pub fn new(
        extractor: Arc<dyn RecipeExtractor>,
        storage: Arc<dyn ImageStorage>,
        repository: Arc<dyn RecipeRepository>,
    ) -> Self {
        Self { extractor, storage, repository, illustrator: None }
    }

    /// Also generate an illustration for every accepted recipe.
    pub fn with_illustrator(mut self, illustrator: Arc<dyn Illustrator>) -> Self {
        self.illustrator = Some(illustrator);
        self
    }

    /// Extract, validate, upload the source photos, then persist.
    ///
    /// Photos reach storage only after the model output is accepted. If any
    /// upload or the final insert fails, nothing is persisted and the stored
    /// objects are removed again.
    pub async fn create_from_images(&self, images: Vec<ImageUpload>) -> Result<Recipe, IngestError> {
        if images.is_empty() {
            return Err(IngestError::NoImages);
        }

        info!(images = images.len(), "Starting recipe ingestion");

        let raw = self.extractor.extract(&images).await.map_err(|e| {
            error!("Extraction call failed: {}", e);
            e
        })?;

        let mut recipe = normalize(&raw).map_err(|rejection| {
            warn!(reason = %rejection.reason(), "Model output rejected");
            rejection
        })?;

        let uploads = join_all(
            images
                .iter()
                .map(|img| self.storage.put(img.bytes.clone(), &img.mime_type)),
        );
        let (results, generated) = tokio::join!(uploads, self.illustrate(&recipe));

        let mut paths = Vec::with_capacity(results.len());
        let mut first_error = None;
        for result in results {
            match result {
                Ok(path) => paths.push(path),
                Err(e) => {
                    error!("Image upload failed: {}", e);
                    first_error.get_or_insert(e);
                }
            }
        }
        if let Some(e) = first_error {
            self.discard(paths.into_iter().chain(generated)).await;
            return Err(e.into());
        }

        recipe.user_image_paths = paths.clone();
        recipe.generated_image_path = generated.clone();

        let stored = match self.repository.create(recipe).await {
            Ok(stored) => stored,
            Err(e) => {
                error!("Failed to persist recipe: {}", e);
                self.discard(paths.into_iter().chain(generated)).await;
                return Err(e.into());
            }
        };
        info!(id = ?stored.id, recipe = %stored.name, "Recipe created from images");
        Ok(stored)
    }

    async fn illustrate(&self, recipe: &Recipe) -> Option<String> {
        let illustrator = self.illustrator.as_ref()?;
        let image = illustrator.illustrate(recipe).await?;
        match self.storage.put(image.bytes, &image.mime_type).await {
            Ok(path) => Some(path),
            Err(e) => {
                warn!("Failed to store illustration, continuing without it: {}", e);
                None
            }
        }
    }

    async fn discard(&self, paths: impl Iterator<Item = String>) {
        for path in paths {
            if let Err(e) = self.storage.delete(&path).await {
                warn!(%path, "Failed to remove orphaned upload: {}", e);
            }
        }
    }
}

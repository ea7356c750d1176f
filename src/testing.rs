//! Test doubles for the ingestion collaborators.

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::{
    extraction::RecipeExtractor,
    gemini::GeminiError,
    illustration::{Illustration, Illustrator},
    models::{ImageUpload, Recipe},
    normalize::normalize,
    storage::{ImageStorage, StorageError, StorageResult},
};

pub const PANCAKES_JSON: &str = r#"{"recipeName":"Pancakes","recipeType":"main_dish","cookTime":15,"ingredients":[{"name":"flour","quantity":"1 cup"}],"instructions":["Mix","Cook"],"nutrition":{"calories":300,"fat":10,"carbohydrates":40,"protein":8},"servings":2,"description":"Fluffy pancakes"}"#;

pub fn sample_recipe() -> Recipe {
    normalize(PANCAKES_JSON).expect("fixture is a valid recipe")
}

pub struct FakeExtractor {
    response: Option<String>,
    calls: AtomicUsize,
}

impl FakeExtractor {
    pub fn returning(raw: &str) -> Self {
        Self { response: Some(raw.to_string()), calls: AtomicUsize::new(0) }
    }

    pub fn failing() -> Self {
        Self { response: None, calls: AtomicUsize::new(0) }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RecipeExtractor for FakeExtractor {
    async fn extract(&self, _images: &[ImageUpload]) -> Result<String, GeminiError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.response
            .clone()
            .ok_or_else(|| GeminiError::Http("connection refused".into()))
    }
}

pub struct FakeIllustrator {
    image: Option<Illustration>,
}

impl FakeIllustrator {
    pub fn absent() -> Self {
        Self { image: None }
    }

    pub fn returning(image: Illustration) -> Self {
        Self { image: Some(image) }
    }
}

#[async_trait]
impl Illustrator for FakeIllustrator {
    async fn illustrate(&self, _recipe: &Recipe) -> Option<Illustration> {
        self.image.clone()
    }
}

/// In-memory object store. Can be told to refuse one specific payload.
#[derive(Default)]
pub struct MemoryStorage {
    objects: Mutex<HashMap<String, Bytes>>,
    deleted: Mutex<Vec<String>>,
    fail_on: Option<Bytes>,
    counter: AtomicUsize,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_on(payload: Bytes) -> Self {
        Self { fail_on: Some(payload), ..Self::default() }
    }

    pub fn get(&self, reference: &str) -> Option<Bytes> {
        self.objects.lock().get(reference).cloned()
    }

    pub fn len(&self) -> usize {
        self.objects.lock().len()
    }

    pub fn deleted(&self) -> Vec<String> {
        self.deleted.lock().clone()
    }
}

#[async_trait]
impl ImageStorage for MemoryStorage {
    async fn put(&self, data: Bytes, mime_type: &str) -> StorageResult<String> {
        if self.fail_on.as_ref() == Some(&data) {
            return Err(StorageError::UploadFailed("bucket unavailable".into()));
        }
        let n = self.counter.fetch_add(1, Ordering::SeqCst);
        let reference = format!("/storage/user-uploads/{n}.{}", mime_type.rsplit('/').next().unwrap_or("bin"));
        self.objects.lock().insert(reference.clone(), data);
        Ok(reference)
    }

    async fn delete(&self, reference: &str) -> StorageResult<()> {
        self.objects.lock().remove(reference);
        self.deleted.lock().push(reference.to_string());
        Ok(())
    }
}

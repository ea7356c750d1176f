use axum::{
    extract::{DefaultBodyLimit, Multipart, Path, Query, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use serde_json::{json, Value};
use std::{path::Path as FsPath, sync::Arc};
use tower_http::{
    cors::{Any, CorsLayer},
    services::ServeDir,
    trace::TraceLayer,
};
use tracing::{info, warn};

use crate::{
    error::ApiError,
    ingest::RecipeIngestor,
    models::{ImageUpload, PageQuery, Recipe, RecipeId, RecipeTiny, RecipeType, RecipeUpdate},
    repository::RecipeRepository,
    storage::{ImageStorage, PUBLIC_PREFIX},
};

const UPLOAD_FIELD: &str = "user_images";
const LATEST_COUNT: usize = 6;
const MAX_PAGE_SIZE: usize = 100;

#[derive(Clone)]
pub struct AppState {
    pub repository: Arc<dyn RecipeRepository>,
    pub storage: Arc<dyn ImageStorage>,
    pub ingestor: Arc<RecipeIngestor>,
}

pub fn router(state: AppState, storage_dir: &FsPath, max_upload_bytes: usize) -> Router {
    let recipes = Router::new()
        .route("/", get(get_recipe_page).post(create_recipe))
        .route("/latest", get(get_latest_recipes))
        .route("/feeling-lucky", get(get_feeling_lucky))
        .route("/:id", get(get_recipe).put(update_recipe).delete(delete_recipe));

    Router::new()
        .route("/health", get(health))
        .nest("/api/v1/recipes", recipes)
        .nest_service(PUBLIC_PREFIX, ServeDir::new(storage_dir))
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any)
        )
        .with_state(state)
}

async fn health() -> &'static str {
    "OK"
}

/// `start`/`limit` fall back to defaults when unparseable; unknown `typeFilter` values are rejected.
fn parse_page_query(params: Vec<(String, String)>) -> Result<PageQuery, ApiError> {
    let mut query = PageQuery::default();
    for (key, value) in params {
        match key.as_str() {
            "start" => query.start = value.parse().unwrap_or(0),
            "limit" => {
                query.limit = match value.parse::<usize>() {
                    Ok(0) | Err(_) => PageQuery::default().limit,
                    Ok(n) => n.min(MAX_PAGE_SIZE),
                }
            }
            "typeFilter" if !value.is_empty() => {
                let t: RecipeType = value
                    .parse()
                    .map_err(|e: crate::models::UnknownRecipeType| ApiError::BadRequest(e.to_string()))?;
                if !query.types.contains(&t) {
                    query.types.push(t);
                }
            }
            "queryString" if !value.trim().is_empty() => query.query = Some(value.trim().to_string()),
            _ => {}
        }
    }
    Ok(query)
}

async fn get_recipe_page(
    State(state): State<AppState>,
    Query(params): Query<Vec<(String, String)>>,
) -> Result<Json<Vec<RecipeTiny>>, ApiError> {
    let query = parse_page_query(params)?;
    Ok(Json(state.repository.page(&query).await?))
}

async fn get_latest_recipes(State(state): State<AppState>) -> Result<Json<Vec<RecipeTiny>>, ApiError> {
    Ok(Json(state.repository.latest(LATEST_COUNT).await?))
}

async fn get_feeling_lucky(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    match state.repository.random_id().await? {
        Some(id) => Ok(Json(json!({ "recipeId": id }))),
        None => Err(ApiError::NotFound("No recipes available")),
    }
}

/// Declared image types are trusted; anything else is sniffed from the bytes.
fn resolve_mime(declared: Option<&str>, bytes: &[u8]) -> Option<String> {
    match declared {
        Some(mime) if mime.starts_with("image/") => Some(mime.to_string()),
        _ => image::guess_format(bytes)
            .ok()
            .map(|format| format.to_mime_type().to_string()),
    }
}

async fn create_recipe(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let mut images = Vec::new();
    while let Some(field) = multipart.next_field().await? {
        if field.name() != Some(UPLOAD_FIELD) {
            continue;
        }
        let declared = field.content_type().map(str::to_string);
        let file_name = field.file_name().unwrap_or("upload").to_string();
        let bytes = field.bytes().await?;
        let mime_type = resolve_mime(declared.as_deref(), &bytes).ok_or_else(|| {
            ApiError::BadRequest(format!("{} is not a supported image", file_name))
        })?;
        images.push(ImageUpload::new(bytes, mime_type));
    }

    info!(images = images.len(), "Received recipe images");

    let recipe = state.ingestor.create_from_images(images).await?;
    Ok((StatusCode::CREATED, Json(json!({ "recipeId": recipe.id }))))
}

async fn get_recipe(
    Path(id): Path<RecipeId>,
    State(state): State<AppState>,
) -> Result<Json<Recipe>, ApiError> {
    state
        .repository
        .get_by_id(id)
        .await?
        .map(Json)
        .ok_or(ApiError::NotFound("Recipe not found"))
}

async fn update_recipe(
    Path(id): Path<RecipeId>,
    State(state): State<AppState>,
    Json(body): Json<RecipeUpdate>,
) -> Result<Json<Recipe>, ApiError> {
    body.validate().map_err(ApiError::BadRequest)?;
    state
        .repository
        .update(id, body)
        .await?
        .map(Json)
        .ok_or(ApiError::NotFound("Recipe not found"))
}

/// Removes the row, then the images it referenced. Image removal is best effort.
async fn delete_recipe(
    Path(id): Path<RecipeId>,
    State(state): State<AppState>,
) -> Result<Json<Value>, ApiError> {
    let recipe = state
        .repository
        .get_by_id(id)
        .await?
        .ok_or(ApiError::NotFound("Recipe not found"))?;

    if !state.repository.delete(id).await? {
        return Err(ApiError::NotFound("Recipe not found"));
    }

    for path in recipe.user_image_paths.iter().chain(recipe.generated_image_path.iter()) {
        if let Err(e) = state.storage.delete(path).await {
            warn!(%path, recipe_id = id, "Failed to delete recipe image: {}", e);
        }
    }

    info!(recipe_id = id, "Recipe deleted");
    Ok(Json(json!({ "message": "Recipe deleted successfully" })))
}

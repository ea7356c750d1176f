mod config;
mod error;
mod extraction;
mod gemini;
mod illustration;
mod ingest;
mod models;
mod normalize;
mod repository;
mod routes;
mod schema;
mod storage;
#[cfg(test)]
mod testing;

use anyhow::Context;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing_subscriber::{fmt, EnvFilter};

use crate::{
    config::AppConfig,
    extraction::GeminiExtractor,
    gemini::GeminiClient,
    illustration::GeminiIllustrator,
    ingest::RecipeIngestor,
    repository::{InMemoryRecipeRepository, PgRecipeRepository, RecipeRepository},
    routes::AppState,
    storage::LocalImageStorage,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file
    dotenv::dotenv().ok();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt().with_env_filter(filter).init();

    let config = AppConfig::from_env().context("invalid configuration")?;

    let gemini = Arc::new(
        GeminiClient::new(
            config.gemini_api_key.clone(),
            config.gemini_api_base.clone(),
            config.gemini_timeout,
        )
        .context("failed to build Gemini client")?,
    );

    let repository: Arc<dyn RecipeRepository> = match &config.database_url {
        Some(url) => Arc::new(
            PgRecipeRepository::connect(url)
                .await
                .context("failed to connect to database")?,
        ),
        None => {
            tracing::warn!("DATABASE_URL not set, recipes are kept in memory and lost on restart");
            Arc::new(InMemoryRecipeRepository::new())
        }
    };

    let storage = Arc::new(
        LocalImageStorage::new(config.storage_dir.clone())
            .await
            .context("failed to prepare image storage")?,
    );

    let extractor = Arc::new(GeminiExtractor::new(
        gemini.clone(),
        config.extraction_model.clone(),
        config.extraction_retry.clone(),
    ));

    let mut ingestor = RecipeIngestor::new(extractor, storage.clone(), repository.clone());
    if config.generate_illustrations {
        tracing::info!(model = %config.image_model, "Recipe illustrations enabled");
        ingestor = ingestor.with_illustrator(Arc::new(GeminiIllustrator::new(
            gemini.clone(),
            config.image_model.clone(),
        )));
    }

    let state = AppState {
        repository,
        storage: storage.clone(),
        ingestor: Arc::new(ingestor),
    };
    let app = routes::router(state, storage.root(), config.max_upload_bytes);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    tracing::info!(%addr, model = %config.extraction_model, "Starting server");
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}

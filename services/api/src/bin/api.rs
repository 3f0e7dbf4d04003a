//! services/api/src/bin/api.rs

use api_lib::{
    adapters::{FileSnapshotStore, OpenAiImageAdapter, OpenAiTextAdapter},
    config::{Config, ConfigError},
    error::ApiError,
    web::{
        download_snapshot_handler, export_paginated_handler, export_slides_handler,
        health_handler, rest::ApiDoc, state::AppState, ws_handler,
    },
};
use async_openai::{config::OpenAIConfig, Client};
use axum::http::{
    header::{ACCEPT, CONTENT_TYPE},
    HeaderValue, Method,
};
use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use textbook_forge_core::PortError;
use tower_http::cors::CorsLayer;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[tokio::main]
async fn main() -> Result<(), ApiError> {
    // --- 1. Load Configuration & Set Up Logging ---
    let config = Arc::new(Config::from_env()?);
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(config.log_level.to_string()))
        .with(tracing_subscriber::fmt::layer())
        .init();
    info!("Configuration loaded. Starting server...");

    // --- 2. Prepare Snapshot Storage ---
    tokio::fs::create_dir_all(&config.snapshot_dir).await?;
    let snapshot_store = FileSnapshotStore::new(config.snapshot_dir.clone())
        .map_err(|e| ApiError::Port(PortError::from(e)))?;
    info!("Snapshots will be written to {}", config.snapshot_dir.display());

    // --- 3. Initialize Service Adapters ---
    let mut openai_config = OpenAIConfig::new().with_api_key(config.openai_api_key.as_str());
    if let Some(api_base) = &config.openai_api_base {
        openai_config = openai_config.with_api_base(api_base.as_str());
    }
    let openai_client = Client::with_config(openai_config);

    let text_adapter = Arc::new(OpenAiTextAdapter::new(
        openai_client.clone(),
        config.text_model.clone(),
    ));
    let image_adapter = Arc::new(OpenAiImageAdapter::new(
        openai_client,
        config.image_model.clone(),
    ));
    info!(
        "Using text model '{}' and image model '{}'.",
        config.text_model, config.image_model
    );

    // --- 4. Build the Shared AppState ---
    let app_state = Arc::new(AppState {
        config: config.clone(),
        text_adapter,
        image_adapter,
        snapshot_store: Arc::new(snapshot_store),
    });

    let cors_origin = config.cors_origin.parse::<HeaderValue>().map_err(|e| {
        ConfigError::InvalidValue("CORS_ORIGIN".to_string(), e.to_string())
    })?;
    let cors = CorsLayer::new()
        .allow_origin(cors_origin)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([CONTENT_TYPE, ACCEPT]);

    // --- 5. Create the Web Router ---
    let body_limit = usize::try_from(config.ingest_limits.max_total_bytes).unwrap_or(usize::MAX);
    let api_router = Router::new()
        .route("/health", get(health_handler))
        .route("/ws", get(ws_handler))
        .route("/exports/paginated", post(export_paginated_handler))
        .route("/exports/slides", post(export_slides_handler))
        .route("/snapshots/{file_name}", get(download_snapshot_handler))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(cors)
        .with_state(app_state);

    // Merge the API router with the Swagger UI router for a complete application.
    let app = Router::new()
        .merge(api_router)
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()));

    // --- 6. Start the Server ---
    info!("Starting server on {}", config.bind_address);
    info!(
        "Swagger UI available at http://{}/swagger-ui",
        config.bind_address
    );
    let listener = tokio::net::TcpListener::bind(&config.bind_address).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

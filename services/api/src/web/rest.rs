//! services/api/src/web/rest.rs
//!
//! Contains the Axum handlers for the REST API endpoints and the master
//! definition for the OpenAPI specification.

use crate::web::state::AppState;
use axum::{
    extract::{Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Json},
};
use bytes::Bytes;
use serde::Serialize;
use std::sync::Arc;
use textbook_forge_core::{
    export::{build_slide_deck, export_file_name, paginate, PaginatedLayout, SlideDeck},
    ports::PortError,
    TextbookDocument,
};
use tracing::{error, info};
use utoipa::{OpenApi, ToSchema};

//=========================================================================================
// OpenAPI Master Definition
//=========================================================================================

#[derive(OpenApi)]
#[openapi(
    paths(
        health_handler,
        export_paginated_handler,
        export_slides_handler,
        download_snapshot_handler,
    ),
    components(
        schemas(HealthResponse, PaginatedExportResponse, SlideExportResponse)
    ),
    tags(
        (name = "Textbook Forge API", description = "Exports and snapshot downloads for generated textbooks. Generation itself runs over the /ws WebSocket.")
    )
)]
pub struct ApiDoc;

//=========================================================================================
// API Response and Payload Structs
//=========================================================================================

#[derive(Serialize, ToSchema)]
pub struct HealthResponse {
    status: String,
    version: String,
}

/// A print-ready layout of a textbook document and a suggested file name.
#[derive(Serialize, ToSchema)]
pub struct PaginatedExportResponse {
    file_name: String,
    #[schema(value_type = Object)]
    layout: PaginatedLayout,
}

/// A slide-by-slide plan of a textbook document and a suggested file name.
#[derive(Serialize, ToSchema)]
pub struct SlideExportResponse {
    file_name: String,
    #[schema(value_type = Object)]
    deck: SlideDeck,
}

//=========================================================================================
// REST API Handlers
//=========================================================================================

#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "The service is up", body = HealthResponse)
    )
)]
pub async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

fn require_sections(document: &TextbookDocument) -> Result<(), (StatusCode, String)> {
    if document.sections().is_empty() {
        return Err((
            StatusCode::BAD_REQUEST,
            "The document has no sections to export.".to_string(),
        ));
    }
    Ok(())
}

/// Lay out a textbook document as A4 pages.
///
/// Accepts a document exactly as it was delivered in a `document_updated` message.
#[utoipa::path(
    post,
    path = "/exports/paginated",
    request_body(content = Object, description = "A textbook document."),
    responses(
        (status = 200, description = "Paginated layout", body = PaginatedExportResponse),
        (status = 400, description = "The document has no sections"),
        (status = 422, description = "The body is not a textbook document")
    )
)]
pub async fn export_paginated_handler(
    Json(document): Json<TextbookDocument>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    require_sections(&document)?;
    let layout = paginate(&document);
    info!(
        "Paginated '{}' into {} content pages.",
        document.title(),
        layout.pages.len()
    );
    Ok(Json(PaginatedExportResponse {
        file_name: export_file_name(document.title(), "pdf"),
        layout,
    }))
}

/// Lay out a textbook document as a widescreen slide deck.
#[utoipa::path(
    post,
    path = "/exports/slides",
    request_body(content = Object, description = "A textbook document."),
    responses(
        (status = 200, description = "Slide deck", body = SlideExportResponse),
        (status = 400, description = "The document has no sections"),
        (status = 422, description = "The body is not a textbook document")
    )
)]
pub async fn export_slides_handler(
    Json(document): Json<TextbookDocument>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    require_sections(&document)?;
    Ok(Json(SlideExportResponse {
        file_name: export_file_name(document.title(), "pptx"),
        deck: build_slide_deck(&document),
    }))
}

/// Download a progress snapshot saved after a failed generation.
#[utoipa::path(
    get,
    path = "/snapshots/{file_name}",
    params(
        ("file_name" = String, Path, description = "The name reported in `generation_failed`.")
    ),
    responses(
        (status = 200, description = "The snapshot JSON", content_type = "application/json"),
        (status = 404, description = "No such snapshot"),
        (status = 500, description = "Internal server error")
    )
)]
pub async fn download_snapshot_handler(
    State(app_state): State<Arc<AppState>>,
    Path(file_name): Path<String>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    match app_state.snapshot_store.load(&file_name).await {
        Ok(bytes) => Ok((
            [
                (header::CONTENT_TYPE, "application/json".to_string()),
                (
                    header::CONTENT_DISPOSITION,
                    format!("attachment; filename=\"{file_name}\""),
                ),
            ],
            Bytes::from(bytes),
        )),
        Err(PortError::NotFound(_)) => Err((
            StatusCode::NOT_FOUND,
            format!("Snapshot '{file_name}' not found"),
        )),
        Err(e) => {
            error!("Failed to read snapshot: {:?}", e);
            Err((
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to read snapshot".to_string(),
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::{FileSnapshotStore, OpenAiImageAdapter, OpenAiTextAdapter};
    use crate::config::Config;
    use async_openai::{config::OpenAIConfig, Client};
    use axum::body::to_bytes;
    use textbook_forge_core::domain::{Outline, OutlineSection, Snapshot};

    fn document(sections: usize) -> TextbookDocument {
        let outline = Outline {
            title: "Chapter 3: Error Correction".to_string(),
            sections: (1..=sections)
                .map(|i| OutlineSection {
                    section_number: format!("§3.{i}"),
                    title: format!("Part {i}"),
                    summary: format!("About part {i}."),
                })
                .collect(),
        };
        TextbookDocument::from_outline(&outline)
    }

    fn app_state(dir: &std::path::Path) -> Arc<AppState> {
        let config = Config::from_lookup(|key| match key {
            "OPENAI_API_KEY" => Some("sk-test".to_string()),
            _ => None,
        })
        .unwrap();
        let client = Client::with_config(OpenAIConfig::new().with_api_key("sk-test"));
        Arc::new(AppState {
            config: Arc::new(config),
            text_adapter: Arc::new(OpenAiTextAdapter::new(client.clone(), "gpt-4o-mini".into())),
            image_adapter: Arc::new(OpenAiImageAdapter::new(client, "dall-e-3".into())),
            snapshot_store: Arc::new(FileSnapshotStore::new(dir).unwrap()),
        })
    }

    async fn body_json(response: axum::response::Response) -> serde_json::Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn paginated_export_suggests_a_pdf_name() {
        let doc = document(2).append_section_text(0, "Stabilizers detect errors.");
        let response = export_paginated_handler(Json(doc))
            .await
            .unwrap()
            .into_response();
        assert_eq!(response.status(), StatusCode::OK);

        let body = body_json(response).await;
        assert_eq!(body["file_name"], "chapter_3__error_correction.pdf");
        assert_eq!(body["layout"]["title_page"]["subtitle"], "An AI-Generated Textbook Addendum");
        assert_eq!(body["layout"]["pages"][0]["footer"], "Page 1");
    }

    #[tokio::test]
    async fn slide_export_has_one_slide_per_section() {
        let response = export_slides_handler(Json(document(3)))
            .await
            .unwrap()
            .into_response();
        let body = body_json(response).await;
        assert_eq!(body["file_name"], "chapter_3__error_correction.pptx");
        assert_eq!(body["deck"]["slides"].as_array().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn empty_documents_are_rejected() {
        let err = export_slides_handler(Json(document(0))).await.err().unwrap();
        assert_eq!(err.0, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn snapshots_download_as_attachments() {
        let dir = tempfile::tempdir().unwrap();
        let state = app_state(dir.path());
        let saved = state
            .snapshot_store
            .save(&Snapshot::textbook(Arc::new(document(1))))
            .await
            .unwrap();

        let response = download_snapshot_handler(State(state.clone()), Path(saved.name.clone()))
            .await
            .unwrap()
            .into_response();
        assert_eq!(response.status(), StatusCode::OK);
        let disposition = response.headers()[header::CONTENT_DISPOSITION]
            .to_str()
            .unwrap()
            .to_string();
        assert!(disposition.contains(&saved.name));
        assert_eq!(body_json(response).await["kind"], "textbook");

        let missing = download_snapshot_handler(State(state), Path("../etc/passwd".to_string()))
            .await
            .err()
            .unwrap();
        assert_eq!(missing.0, StatusCode::NOT_FOUND);
    }

    #[test]
    fn openapi_lists_every_route() {
        let doc = ApiDoc::openapi();
        for path in ["/health", "/exports/paginated", "/exports/slides", "/snapshots/{file_name}"] {
            assert!(doc.paths.paths.contains_key(path), "missing {path}");
        }
    }
}

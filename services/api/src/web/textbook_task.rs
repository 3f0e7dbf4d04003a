//! services/api/src/web/textbook_task.rs
//!
//! The asynchronous "worker" that generates one textbook chapter for a connection
//! and reports the outcome.

use crate::{
    error::ApiError,
    web::{
        protocol::{send_message, ServerMessage, WsSender},
        publisher::WsPublisher,
        state::AppState,
    },
};
use std::sync::Arc;
use std::time::Instant;
use textbook_forge_core::GenerationError;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

/// Runs the textbook pipeline over already-validated source text. Every
/// intermediate document is streamed to the client as it is published.
pub async fn textbook_process(
    app_state: Arc<AppState>,
    source_text: String,
    ws_sender: WsSender,
    cancellation_token: CancellationToken,
) -> Result<(), ApiError> {
    let start_time = Instant::now();
    info!("Textbook process started ({} characters of source).", source_text.len());

    let generator = app_state.textbook_generator();
    let publisher = WsPublisher::new(ws_sender.clone());

    let outcome = tokio::select! {
        _ = cancellation_token.cancelled() => {
            info!("Textbook process cancelled.");
            return Ok(());
        }
        outcome = generator.generate(&source_text, &publisher) => outcome,
    };

    match outcome {
        Ok(document) => {
            info!(
                "⏱️ Textbook '{}' finished in {:?}",
                document.title(),
                start_time.elapsed()
            );
            send_message(&ws_sender, &ServerMessage::GenerationComplete).await
        }
        Err(e) => report_failure(&ws_sender, &e).await,
    }
}

/// Tells the client why a run ended and where its partial work was saved.
pub async fn report_failure(ws_sender: &WsSender, e: &GenerationError) -> Result<(), ApiError> {
    error!("Generation failed: {e}");
    let message = ServerMessage::GenerationFailed {
        message: e.user_message().to_string(),
        snapshot: e.snapshot().map(|s| s.name.clone()),
    };
    send_message(ws_sender, &message).await
}

//! services/api/src/web/story_task.rs
//!
//! The asynchronous "workers" behind story generation: one that plans and drafts
//! (or resumes drafting) a story, and one that relays run-state changes to the
//! client so the Stop/Continue controls stay in sync.

use crate::{
    error::ApiError,
    web::{
        protocol::{send_message, ServerMessage, WsSender},
        publisher::WsPublisher,
        state::{AppState, StorySession},
        textbook_task::report_failure,
    },
};
use std::sync::Arc;
use textbook_forge_core::{GenerationStatus, StoryDocument, StoryRunState};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Where a story run begins.
pub enum StoryStep {
    /// Plan a new story in this style, then draft it.
    Plan { style: String },
    /// Keep drafting a paused story from its last published state.
    Continue { document: Arc<StoryDocument> },
}

pub async fn story_process(
    app_state: Arc<AppState>,
    story: StorySession,
    step: StoryStep,
    ws_sender: WsSender,
    cancellation_token: CancellationToken,
) -> Result<(), ApiError> {
    let generator = app_state.story_generator();
    let publisher = WsPublisher::for_story(ws_sender.clone(), story.latest.clone());

    let run = async {
        let document = match step {
            StoryStep::Plan { style } => {
                info!("Story process started in style '{style}'.");
                generator
                    .plan(&story.source_text, &style, &publisher)
                    .await?
            }
            StoryStep::Continue { document } => {
                info!(
                    "Story process resuming with {}/{} pages drafted.",
                    document.drafted_count(),
                    document.page_count()
                );
                document
            }
        };
        generator
            .draft(&story.source_text, document, &story.control, &publisher)
            .await
    };

    let outcome = tokio::select! {
        _ = cancellation_token.cancelled() => {
            info!("Story process cancelled.");
            return Ok(());
        }
        outcome = run => outcome,
    };

    match outcome {
        Ok(_) if story.status() == GenerationStatus::Complete => {
            send_message(&ws_sender, &ServerMessage::GenerationComplete).await
        }
        // Paused on request; the status relay already told the client.
        Ok(_) => Ok(()),
        Err(e) => report_failure(&ws_sender, &e).await,
    }
}

/// Sends the current run state, then every change to it, until the story is
/// dropped or the client goes away.
pub async fn forward_story_status(
    mut status: watch::Receiver<StoryRunState>,
    ws_sender: WsSender,
) {
    loop {
        let state = *status.borrow_and_update();
        let message = ServerMessage::StoryStatus {
            status: state.status,
            progress: state.progress,
        };
        if let Err(e) = send_message(&ws_sender, &message).await {
            warn!("Stopped relaying story status: {e}");
            break;
        }
        if status.changed().await.is_err() {
            break;
        }
    }
}

//! services/api/src/web/ws_handler.rs
//!
//! This is the main entry point and control loop for a WebSocket connection.
//! Each connection is one session: it runs at most one generation at a time and
//! delegates the work to spawned tasks.

use crate::web::{
    protocol::{send_message, ClientMessage, ServerMessage, WsSender},
    state::{AppState, SessionState, StorySession},
    story_task::{forward_story_status, story_process, StoryStep},
    textbook_task::textbook_process,
};
use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::Response,
};
use futures::StreamExt;
use std::sync::Arc;
use textbook_forge_core::{assemble_source, GenerationStatus, SourceFile};
use tokio::sync::Mutex;
use tracing::{error, info, warn};

/// The handler for upgrading HTTP requests to WebSocket connections.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(app_state): State<Arc<AppState>>,
) -> Response {
    // Uploads travel inside a single JSON message, so allow for the whole batch.
    let limit = usize::try_from(app_state.config.ingest_limits.max_total_bytes)
        .unwrap_or(usize::MAX)
        .saturating_mul(2);
    ws.max_message_size(limit)
        .max_frame_size(limit)
        .on_upgrade(move |socket| handle_socket(socket, app_state))
}

async fn handle_socket(socket: WebSocket, app_state: Arc<AppState>) {
    let mut session = SessionState::new();
    info!("New WebSocket connection established: session {}", session.session_id);

    // The sender is wrapped in an Arc<Mutex<>> to allow for shared mutable access across tasks.
    let (sender, mut receiver) = socket.split();
    let ws_sender: WsSender = Arc::new(Mutex::new(sender));

    loop {
        match receiver.next().await {
            Some(Ok(Message::Text(text))) => {
                handle_text_message(text.as_str(), &app_state, &mut session, &ws_sender).await;
            }
            Some(Ok(Message::Close(_))) => {
                info!("Client sent close message.");
                break;
            }
            Some(Ok(_)) => {}
            Some(Err(e)) => {
                warn!("WebSocket receive error: {e}");
                break;
            }
            None => {
                info!("Client disconnected.");
                break;
            }
        }
    }

    // --- Cleanup ---
    session.reset();
    info!("WebSocket connection closed: session {}", session.session_id);
}

/// Helper function to handle the logic for different `ClientMessage` variants.
async fn handle_text_message(
    text: &str,
    app_state: &Arc<AppState>,
    session: &mut SessionState,
    ws_sender: &WsSender,
) {
    let client_msg = match serde_json::from_str::<ClientMessage>(text) {
        Ok(msg) => msg,
        Err(e) => {
            warn!("Failed to deserialize client message: {}", e);
            reply(ws_sender, ServerMessage::error(format!("Unrecognized message: {e}"))).await;
            return;
        }
    };

    match client_msg {
        ClientMessage::GenerateTextbook { files } => {
            info!("GenerateTextbook received with {} file(s).", files.len());
            session.reset();
            let Some(source_text) = validated_source(app_state, &files, ws_sender).await else {
                return;
            };

            let task = {
                let app_state = app_state.clone();
                let ws_sender = ws_sender.clone();
                let token = session.cancellation_token.clone();
                tokio::spawn(async move {
                    if let Err(e) = textbook_process(app_state, source_text, ws_sender, token).await {
                        error!("Textbook process failed: {:?}", e);
                    }
                })
            };
            session.task = Some(task);
        }
        ClientMessage::GenerateStory { files, style } => {
            info!("GenerateStory received with {} file(s).", files.len());
            session.reset();
            let Some(source_text) = validated_source(app_state, &files, ws_sender).await else {
                return;
            };

            let story = StorySession::new(source_text);
            session.status_forwarder = Some(tokio::spawn(forward_story_status(
                story.control.subscribe(),
                ws_sender.clone(),
            )));
            spawn_story(app_state, session, story, StoryStep::Plan { style }, ws_sender);
        }
        ClientMessage::StopStory => {
            info!("StopStory message received.");
            let stopped = session
                .story
                .as_ref()
                .is_some_and(|story| story.control.request_stop());
            if !stopped {
                reply(ws_sender, ServerMessage::error("There is no story to stop.")).await;
            }
        }
        ClientMessage::ContinueStory => {
            info!("ContinueStory message received.");
            let Some(story) = session.story.clone() else {
                reply(ws_sender, ServerMessage::error("There is no story to continue.")).await;
                return;
            };
            if session.is_busy() || story.status() != GenerationStatus::Paused {
                reply(ws_sender, ServerMessage::error("The story is not paused.")).await;
                return;
            }
            let Some(document) = story.latest.lock().await.clone() else {
                reply(ws_sender, ServerMessage::error("There is no story to continue.")).await;
                return;
            };
            spawn_story(app_state, session, story, StoryStep::Continue { document }, ws_sender);
        }
        ClientMessage::Reset => {
            info!("Reset message received.");
            session.reset();
        }
    }
}

fn spawn_story(
    app_state: &Arc<AppState>,
    session: &mut SessionState,
    story: StorySession,
    step: StoryStep,
    ws_sender: &WsSender,
) {
    let task = {
        let app_state = app_state.clone();
        let ws_sender = ws_sender.clone();
        let token = session.cancellation_token.clone();
        let story = story.clone();
        tokio::spawn(async move {
            if let Err(e) = story_process(app_state, story, step, ws_sender, token).await {
                error!("Story process failed: {:?}", e);
            }
        })
    };
    session.story = Some(story);
    session.task = Some(task);
}

/// Validates the uploaded files and joins their text, telling the client why if
/// they are rejected. Nothing reaches the AI gateway unless this succeeds.
async fn validated_source(
    app_state: &AppState,
    files: &[SourceFile],
    ws_sender: &WsSender,
) -> Option<String> {
    match assemble_source(files, &app_state.config.ingest_limits) {
        Ok(source_text) => Some(source_text),
        Err(e) => {
            warn!("Rejected upload: {e}");
            reply(ws_sender, ServerMessage::error(e.to_string())).await;
            None
        }
    }
}

async fn reply(ws_sender: &WsSender, message: ServerMessage) {
    if let Err(e) = send_message(ws_sender, &message).await {
        error!("Failed to send message to client: {e}");
    }
}

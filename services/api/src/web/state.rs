//! services/api/src/web/state.rs
//!
//! Defines the application's shared and session-specific states.

use crate::config::Config;
use std::sync::Arc;
use textbook_forge_core::{
    ports::{ImageGenerationService, SnapshotStore, TextGenerationService},
    GenerationStatus, StoryControl, StoryDocument, StoryGenerator, TextbookGenerator,
};
use tokio::{sync::Mutex, task::JoinHandle};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

//=========================================================================================
// AppState (Shared Across All Connections)
//=========================================================================================

/// The shared application state, created once at startup and passed to all handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub text_adapter: Arc<dyn TextGenerationService>,
    pub image_adapter: Arc<dyn ImageGenerationService>,
    pub snapshot_store: Arc<dyn SnapshotStore>,
}

impl AppState {
    pub fn textbook_generator(&self) -> TextbookGenerator {
        TextbookGenerator::new(
            self.text_adapter.clone(),
            self.image_adapter.clone(),
            self.snapshot_store.clone(),
        )
    }

    pub fn story_generator(&self) -> StoryGenerator {
        StoryGenerator::new(
            self.text_adapter.clone(),
            self.image_adapter.clone(),
            self.snapshot_store.clone(),
        )
    }
}

//=========================================================================================
// SessionState (Specific to One WebSocket Connection)
//=========================================================================================

/// The most recently published story document, kept so a paused story can resume.
pub type LatestStory = Arc<Mutex<Option<Arc<StoryDocument>>>>;

/// Everything needed to keep drafting one story across stop/continue cycles.
#[derive(Clone)]
pub struct StorySession {
    pub source_text: Arc<str>,
    pub control: Arc<StoryControl>,
    pub latest: LatestStory,
}

impl StorySession {
    pub fn new(source_text: String) -> Self {
        Self {
            source_text: source_text.into(),
            control: Arc::new(StoryControl::new()),
            latest: Arc::new(Mutex::new(None)),
        }
    }

    pub fn status(&self) -> GenerationStatus {
        self.control.state().status
    }
}

/// The state for a single, active WebSocket connection.
pub struct SessionState {
    pub session_id: Uuid,
    pub story: Option<StorySession>,
    /// The running generation task, if any.
    pub task: Option<JoinHandle<()>>,
    /// Relays story status changes to the client for as long as the story exists.
    pub status_forwarder: Option<JoinHandle<()>>,
    /// A token to gracefully cancel the current generation task.
    pub cancellation_token: CancellationToken,
}

impl Default for SessionState {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionState {
    pub fn new() -> Self {
        Self {
            session_id: Uuid::new_v4(),
            story: None,
            task: None,
            status_forwarder: None,
            cancellation_token: CancellationToken::new(),
        }
    }

    pub fn is_busy(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }

    /// Abandons the running task and the current story. A fresh token is issued for
    /// whatever starts next.
    pub fn reset(&mut self) {
        self.cancellation_token.cancel();
        self.cancellation_token = CancellationToken::new();
        if let Some(task) = self.task.take() {
            task.abort();
        }
        if let Some(forwarder) = self.status_forwarder.take() {
            forwarder.abort();
        }
        self.story = None;
    }
}

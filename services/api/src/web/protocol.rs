//! services/api/src/web/protocol.rs
//!
//! Defines the WebSocket message protocol between the browser client and the API server
//! for the textbook and story generators.

use crate::error::ApiError;
use axum::extract::ws::{Message, WebSocket};
use futures::{stream::SplitSink, SinkExt};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use textbook_forge_core::{
    GenerationProgress, GenerationStatus, SourceFile, StoryDocument, TextbookDocument,
};
use tokio::sync::Mutex;

/// The sending half of a connection, shared by the handler and its tasks.
pub type WsSender = Arc<Mutex<SplitSink<WebSocket, Message>>>;

//=========================================================================================
// Messages Sent FROM the Client (Browser) TO the Server
//=========================================================================================
// NOTE: PDFs are converted to text in the browser; files arrive here as extracted text
// plus the original metadata, so size and type limits can still be enforced.
//=========================================================================================

#[derive(Deserialize, Debug)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Starts a textbook chapter from the uploaded material. Any generation already
    /// running on this connection is abandoned first.
    GenerateTextbook { files: Vec<SourceFile> },

    /// Plans a story in the given style and starts drafting its pages.
    GenerateStory { files: Vec<SourceFile>, style: String },

    /// Pauses story drafting once the current page is finished.
    StopStory,

    /// Resumes drafting at the first page without text.
    ContinueStory,

    /// Abandons whatever is in progress and forgets the current story.
    Reset,
}

//=========================================================================================
// Messages Sent FROM the Server TO the Client (Browser)
//=========================================================================================

#[derive(Serialize, Debug, Clone)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// A new snapshot of the textbook being generated. Each one replaces the last.
    DocumentUpdated { document: Arc<TextbookDocument> },

    /// Streamed text for one section. `version` is the document version after the
    /// append; a client that did not hold `version - 1` has missed an update.
    SectionTextAppended {
        version: u64,
        index: usize,
        chunk: String,
    },

    /// A new snapshot of the story being generated.
    StoryUpdated { document: Arc<StoryDocument> },

    /// Streamed text for one story page, versioned like `SectionTextAppended`.
    PageTextAppended {
        version: u64,
        chapter_index: usize,
        page_index: usize,
        chunk: String,
    },

    /// Human-readable description of the current pipeline stage.
    Stage { message: String },

    /// Drives the Stop/Continue controls and the progress bar.
    StoryStatus {
        status: GenerationStatus,
        progress: GenerationProgress,
    },

    GenerationComplete,

    /// The run ended early. `snapshot` names the saved progress file, if any.
    GenerationFailed {
        message: String,
        snapshot: Option<String>,
    },

    /// Rejected input or an out-of-place command.
    Error { message: String },
}

impl ServerMessage {
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
        }
    }
}

/// Serializes and sends one message as a text frame.
pub async fn send_message(ws_sender: &WsSender, message: &ServerMessage) -> Result<(), ApiError> {
    let json = serde_json::to_string(message)?;
    ws_sender
        .lock()
        .await
        .send(Message::Text(json.into()))
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn client_messages_are_tagged_by_type() {
        let message: ClientMessage = serde_json::from_value(json!({
            "type": "generate_story",
            "style": "noir",
            "files": [{
                "name": "notes.txt",
                "content_type": "text/plain",
                "size_bytes": 12,
                "text": "Hello qubits"
            }]
        }))
        .unwrap();
        match message {
            ClientMessage::GenerateStory { files, style } => {
                assert_eq!(style, "noir");
                assert_eq!(files[0].name, "notes.txt");
            }
            other => panic!("unexpected {other:?}"),
        }

        let stop: ClientMessage = serde_json::from_str(r#"{"type":"stop_story"}"#).unwrap();
        assert!(matches!(stop, ClientMessage::StopStory));
    }

    #[test]
    fn server_messages_serialize_flat() {
        let status = serde_json::to_value(ServerMessage::StoryStatus {
            status: GenerationStatus::Paused,
            progress: GenerationProgress {
                completed: 4,
                total: 10,
            },
        })
        .unwrap();
        assert_eq!(
            status,
            json!({
                "type": "story_status",
                "status": "paused",
                "progress": {"completed": 4, "total": 10}
            })
        );

        let failed = serde_json::to_value(ServerMessage::GenerationFailed {
            message: "saved".to_string(),
            snapshot: Some("textbook_progress_x.json".to_string()),
        })
        .unwrap();
        assert_eq!(failed["type"], "generation_failed");
        assert_eq!(failed["snapshot"], "textbook_progress_x.json");

        let appended = serde_json::to_value(ServerMessage::SectionTextAppended {
            version: 7,
            index: 2,
            chunk: "Stabilizers ".to_string(),
        })
        .unwrap();
        assert_eq!(
            appended,
            json!({"type": "section_text_appended", "version": 7, "index": 2, "chunk": "Stabilizers "})
        );

        let page = serde_json::to_value(ServerMessage::PageTextAppended {
            version: 3,
            chapter_index: 1,
            page_index: 0,
            chunk: "Rain.".to_string(),
        })
        .unwrap();
        assert_eq!(page["type"], "page_text_appended");
        assert_eq!(page["chapter_index"], 1);

        let complete = serde_json::to_value(ServerMessage::GenerationComplete).unwrap();
        assert_eq!(complete, json!({"type": "generation_complete"}));
    }
}

//! services/api/src/web/publisher.rs
//!
//! Bridges the core pipelines' observer port onto a WebSocket connection.

use crate::web::{
    protocol::{send_message, ServerMessage, WsSender},
    state::LatestStory,
};
use async_trait::async_trait;
use std::sync::Arc;
use textbook_forge_core::{GenerationObserver, GenerationStage, StoryDocument, TextbookDocument};
use tokio::sync::Mutex;
use tracing::warn;

/// Picks the wire form of a textbook update: a text delta when `next` only grew
/// one section by a chunk, otherwise the whole document.
pub fn textbook_update(
    previous: Option<&TextbookDocument>,
    next: Arc<TextbookDocument>,
) -> ServerMessage {
    let delta = previous
        .and_then(|previous| next.text_appended_since(previous))
        .map(|(index, chunk)| (index, chunk.to_string()));
    match delta {
        Some((index, chunk)) => ServerMessage::SectionTextAppended {
            version: next.version(),
            index,
            chunk,
        },
        None => ServerMessage::DocumentUpdated { document: next },
    }
}

/// Story counterpart of [`textbook_update`].
pub fn story_update(previous: Option<&StoryDocument>, next: Arc<StoryDocument>) -> ServerMessage {
    let delta = previous
        .and_then(|previous| next.page_text_appended_since(previous))
        .map(|(location, chunk)| (location, chunk.to_string()));
    match delta {
        Some(((chapter_index, page_index), chunk)) => ServerMessage::PageTextAppended {
            version: next.version(),
            chapter_index,
            page_index,
            chunk,
        },
        None => ServerMessage::StoryUpdated { document: next },
    }
}

/// Forwards published documents and stages to the client. Streamed text goes out
/// as deltas against the last document sent; everything else as a full document.
/// A closed socket is logged but never interrupts generation.
pub struct WsPublisher {
    ws_sender: WsSender,
    latest_story: Option<LatestStory>,
    sent_textbook: Mutex<Option<Arc<TextbookDocument>>>,
    sent_story: Mutex<Option<Arc<StoryDocument>>>,
}

impl WsPublisher {
    pub fn new(ws_sender: WsSender) -> Self {
        Self {
            ws_sender,
            latest_story: None,
            sent_textbook: Mutex::new(None),
            sent_story: Mutex::new(None),
        }
    }

    /// Also records each story snapshot so a later continue can resume from it.
    pub fn for_story(ws_sender: WsSender, latest: LatestStory) -> Self {
        Self {
            latest_story: Some(latest),
            ..Self::new(ws_sender)
        }
    }

    async fn send(&self, message: ServerMessage) {
        if let Err(e) = send_message(&self.ws_sender, &message).await {
            warn!("Failed to deliver update to client: {e}");
        }
    }
}

#[async_trait]
impl GenerationObserver<TextbookDocument> for WsPublisher {
    async fn publish(&self, snapshot: Arc<TextbookDocument>) {
        let message = {
            let mut sent = self.sent_textbook.lock().await;
            let message = textbook_update(sent.as_deref(), Arc::clone(&snapshot));
            *sent = Some(snapshot);
            message
        };
        self.send(message).await;
    }

    async fn stage(&self, stage: GenerationStage) {
        self.send(ServerMessage::Stage {
            message: stage.to_string(),
        })
        .await;
    }
}

#[async_trait]
impl GenerationObserver<StoryDocument> for WsPublisher {
    async fn publish(&self, snapshot: Arc<StoryDocument>) {
        if let Some(latest) = &self.latest_story {
            *latest.lock().await = Some(Arc::clone(&snapshot));
        }
        let message = {
            let mut sent = self.sent_story.lock().await;
            let message = story_update(sent.as_deref(), Arc::clone(&snapshot));
            *sent = Some(snapshot);
            message
        };
        self.send(message).await;
    }

    async fn stage(&self, stage: GenerationStage) {
        self.send(ServerMessage::Stage {
            message: stage.to_string(),
        })
        .await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use textbook_forge_core::domain::{ChapterOutline, Outline, OutlineSection, StoryOutline};

    fn chapter(sections: usize) -> TextbookDocument {
        TextbookDocument::from_outline(&Outline {
            title: "Chapter 4: Surface Codes".to_string(),
            sections: (1..=sections)
                .map(|i| OutlineSection {
                    section_number: format!("§4.{i}"),
                    title: format!("Part {i}"),
                    summary: format!("About part {i}."),
                })
                .collect(),
        })
    }

    fn wire_len(message: &ServerMessage) -> usize {
        serde_json::to_string(message).unwrap().len()
    }

    #[test]
    fn streamed_text_does_not_resend_images() {
        let header = format!("data:image/png;base64,{}", "A".repeat(2 * 1024 * 1024));
        let mut previous = Arc::new(chapter(15).with_header_image(header));
        let first = textbook_update(None, Arc::clone(&previous));
        assert!(matches!(first, ServerMessage::DocumentUpdated { .. }));
        assert!(wire_len(&first) > 2 * 1024 * 1024);

        let mut streamed_bytes = 0;
        for index in 0..15 {
            for chunk in ["Stabilizers ", "measure ", "parity."] {
                let next = Arc::new(previous.append_section_text(index, chunk));
                let message = textbook_update(Some(&previous), Arc::clone(&next));
                match &message {
                    ServerMessage::SectionTextAppended {
                        version,
                        index: sent_index,
                        chunk: sent_chunk,
                    } => {
                        assert_eq!(*version, next.version());
                        assert_eq!(*sent_index, index);
                        assert_eq!(sent_chunk, chunk);
                    }
                    other => panic!("expected a text delta, got {other:?}"),
                }
                streamed_bytes += wire_len(&message);
                previous = next;
            }
        }
        assert!(streamed_bytes < 10 * 1024, "{streamed_bytes} bytes streamed");

        let imaged = Arc::new(previous.push_section_image(0, "data:image/png;base64,RA".to_string()));
        assert!(matches!(
            textbook_update(Some(&previous), imaged),
            ServerMessage::DocumentUpdated { .. }
        ));
    }

    #[test]
    fn story_pages_stream_as_deltas() {
        let story = Arc::new(StoryDocument::from_outline(
            &StoryOutline {
                title: "The Lattice Voyage".to_string(),
                chapters: vec![ChapterOutline {
                    title: "Chapter 1".to_string(),
                    summary: "Departure.".to_string(),
                    pages: vec!["Brief 1".to_string(), "Brief 2".to_string()],
                }],
            },
            "noir",
        ));
        assert!(matches!(
            story_update(None, Arc::clone(&story)),
            ServerMessage::StoryUpdated { .. }
        ));

        let drafted = Arc::new(story.append_page_text((0, 1), "Rain fell."));
        match story_update(Some(&story), Arc::clone(&drafted)) {
            ServerMessage::PageTextAppended {
                version,
                chapter_index,
                page_index,
                chunk,
            } => {
                assert_eq!(version, drafted.version());
                assert_eq!((chapter_index, page_index), (0, 1));
                assert_eq!(chunk, "Rain fell.");
            }
            other => panic!("expected a page delta, got {other:?}"),
        }
    }
}

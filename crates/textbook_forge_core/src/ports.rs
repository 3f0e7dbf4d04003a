//! crates/textbook_forge_core/src/ports.rs
//!
//! Defines the service contracts (traits) for the application's core logic.
//! These traits form the boundary of the hexagonal architecture, allowing the
//! generation pipelines to be independent of the hosted AI service, the storage
//! used for snapshots, and whatever transport observes the documents.

use crate::domain::{GenerationStage, Outline, Snapshot, SnapshotRef, StoryOutline};
use async_trait::async_trait;
use futures::Stream;
use std::pin::Pin;
use std::sync::Arc;

//=========================================================================================
// Generic Port Error and Result Types
//=========================================================================================

/// A generic error type for all port operations.
/// This abstracts away the specific errors from external services (e.g., network, disk).
#[derive(Debug, thiserror::Error)]
pub enum PortError {
    #[error("Item not found: {0}")]
    NotFound(String),
    #[error("Invalid outline: {0}")]
    InvalidOutline(String),
    #[error("An unexpected error occurred: {0}")]
    Unexpected(String),
}

/// A convenience type alias for `Result<T, PortError>`.
pub type PortResult<T> = Result<T, PortError>;

/// A lazy, finite, forward-only sequence of text fragments. Concatenating the
/// fragments in arrival order yields the full text. Streams cannot be restarted.
pub type TextStream = Pin<Box<dyn Stream<Item = PortResult<String>> + Send>>;

//=========================================================================================
// Request Payloads
//=========================================================================================

/// Everything needed to write the body of one textbook section.
#[derive(Debug, Clone, Copy)]
pub struct SectionRequest<'a> {
    pub source_text: &'a str,
    pub summary: &'a str,
    pub chapter_title: &'a str,
    pub subject: &'a str,
    pub section_title: &'a str,
    pub section_number: &'a str,
}

/// Everything needed to draft one page of a story.
#[derive(Debug, Clone, Copy)]
pub struct PageRequest<'a> {
    pub source_text: &'a str,
    pub story_title: &'a str,
    pub style: &'a str,
    pub chapter_title: &'a str,
    pub chapter_summary: &'a str,
    pub page_number: u32,
    pub suggestions: &'a [String],
    pub previous_page_text: Option<&'a str>,
}

//=========================================================================================
// Service Ports (Traits)
//=========================================================================================

#[async_trait]
pub trait TextGenerationService: Send + Sync {
    /// Describes the subject of the source material in one plain sentence.
    async fn infer_subject(&self, source_text: &str) -> PortResult<String>;

    /// Produces a keyword summary used only to steer illustration style.
    async fn summarize_for_image_context(&self, source_text: &str) -> PortResult<String>;

    /// Requests and validates a chapter outline. Malformed results fail with
    /// `PortError::InvalidOutline` and are not retried.
    async fn generate_outline(&self, source_text: &str, subject: &str) -> PortResult<Outline>;

    async fn generate_section_text_stream(
        &self,
        request: &SectionRequest<'_>,
    ) -> PortResult<TextStream>;

    async fn generate_story_outline(
        &self,
        source_text: &str,
        style: &str,
    ) -> PortResult<StoryOutline>;

    async fn generate_page_text_stream(&self, request: &PageRequest<'_>)
        -> PortResult<TextStream>;
}

/// Image synthesis is best effort: every failure is absorbed and reported as `None`.
#[async_trait]
pub trait ImageGenerationService: Send + Sync {
    async fn generate_header_image(&self, title: &str, style_context: &str) -> Option<String>;

    async fn generate_diagram_image(&self, section_text: &str) -> Option<String>;

    async fn generate_page_image(&self, page_text: &str, style: &str) -> Option<String>;
}

#[async_trait]
pub trait SnapshotStore: Send + Sync {
    /// Persists a snapshot in a human-readable form.
    async fn save(&self, snapshot: &Snapshot) -> PortResult<SnapshotRef>;

    /// Reads back the raw bytes of a previously saved snapshot.
    async fn load(&self, name: &str) -> PortResult<Vec<u8>>;
}

/// Receives every published document snapshot, in order. Observers only ever
/// see immutable snapshots.
#[async_trait]
pub trait GenerationObserver<D: Send + Sync + 'static>: Send + Sync {
    async fn publish(&self, snapshot: Arc<D>);

    async fn stage(&self, _stage: GenerationStage) {}
}

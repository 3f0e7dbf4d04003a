//! crates/textbook_forge_core/src/pipeline.rs
//!
//! The textbook generation pipeline: infer subject, summarize for images, outline,
//! publish the skeleton, illustrate the header, then write and illustrate each
//! section in order. Every state change is published as a new document snapshot.

use crate::domain::{
    GenerationStage, InvalidTransition, Snapshot, SnapshotRef, TextbookDocument,
};
use crate::ports::{
    GenerationObserver, ImageGenerationService, PortError, SectionRequest, SnapshotStore,
    TextGenerationService,
};
use futures::StreamExt;
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, warn};

pub const PROGRESS_SAVED_MESSAGE: &str = "An error occurred during generation. Your progress has been automatically saved. Please try again.";
pub const NOTHING_GENERATED_MESSAGE: &str =
    "Failed to generate the textbook chapter. Please try again.";
pub const EMPTY_SOURCE_MESSAGE: &str = "Could not extract any text from the provided files.";

/// The outcome of a failed generation attempt.
#[derive(Debug, thiserror::Error)]
pub enum GenerationError {
    /// The source material was empty; no AI call was made.
    #[error("could not extract any text from the source material")]
    EmptySource,

    /// Failed before any document existed, so there was nothing to save.
    #[error("generation failed before a document existed: {source}")]
    NothingGenerated { source: PortError },

    /// Failed after a document was published. `snapshot` is `None` when the
    /// snapshot itself could not be written.
    #[error("generation failed after partial progress: {source}")]
    ProgressSaved {
        snapshot: Option<SnapshotRef>,
        source: PortError,
    },

    #[error("invalid run state: {0}")]
    Control(#[from] InvalidTransition),
}

impl GenerationError {
    /// The message shown to the user for this failure.
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::EmptySource => EMPTY_SOURCE_MESSAGE,
            Self::ProgressSaved { .. } => PROGRESS_SAVED_MESSAGE,
            Self::NothingGenerated { .. } | Self::Control(_) => NOTHING_GENERATED_MESSAGE,
        }
    }

    pub fn snapshot(&self) -> Option<&SnapshotRef> {
        match self {
            Self::ProgressSaved { snapshot, .. } => snapshot.as_ref(),
            _ => None,
        }
    }
}

//=========================================================================================
// Publication helper shared by the pipelines
//=========================================================================================

/// Tracks the latest published document and forwards every replacement to the
/// observer. The tracked value is what gets snapshotted on failure.
pub(crate) struct Publication<'o, D: Send + Sync + 'static> {
    current: Option<Arc<D>>,
    observer: &'o dyn GenerationObserver<D>,
}

impl<'o, D: Send + Sync + 'static> Publication<'o, D> {
    pub(crate) fn new(observer: &'o dyn GenerationObserver<D>) -> Self {
        Self {
            current: None,
            observer,
        }
    }

    pub(crate) fn resume(observer: &'o dyn GenerationObserver<D>, current: Arc<D>) -> Self {
        Self {
            current: Some(current),
            observer,
        }
    }

    pub(crate) async fn commit(&mut self, next: D) -> Arc<D> {
        let next = Arc::new(next);
        self.current = Some(Arc::clone(&next));
        self.observer.publish(Arc::clone(&next)).await;
        next
    }

    pub(crate) async fn stage(&self, stage: GenerationStage) {
        info!("{stage}");
        self.observer.stage(stage).await;
    }

    pub(crate) fn current(&self) -> Option<Arc<D>> {
        self.current.clone()
    }
}

/// Saves whatever was generated so far and classifies the failure.
pub(crate) async fn recover(
    store: &dyn SnapshotStore,
    snapshot: Option<Snapshot>,
    source: PortError,
) -> GenerationError {
    error!("Generation aborted: {source}");
    let Some(snapshot) = snapshot else {
        return GenerationError::NothingGenerated { source };
    };
    let saved = match store.save(&snapshot).await {
        Ok(reference) => {
            info!("Progress saved to snapshot '{}'.", reference.name);
            Some(reference)
        }
        Err(e) => {
            error!("Failed to save progress snapshot: {e}");
            None
        }
    };
    GenerationError::ProgressSaved {
        snapshot: saved,
        source,
    }
}

//=========================================================================================
// Textbook Generator
//=========================================================================================

/// Runs the textbook pipeline against the injected AI gateway and snapshot store.
#[derive(Clone)]
pub struct TextbookGenerator {
    text: Arc<dyn TextGenerationService>,
    images: Arc<dyn ImageGenerationService>,
    snapshots: Arc<dyn SnapshotStore>,
}

impl TextbookGenerator {
    pub fn new(
        text: Arc<dyn TextGenerationService>,
        images: Arc<dyn ImageGenerationService>,
        snapshots: Arc<dyn SnapshotStore>,
    ) -> Self {
        Self {
            text,
            images,
            snapshots,
        }
    }

    /// Generates a complete chapter, publishing every intermediate document.
    pub async fn generate(
        &self,
        source_text: &str,
        observer: &dyn GenerationObserver<TextbookDocument>,
    ) -> Result<Arc<TextbookDocument>, GenerationError> {
        if source_text.trim().is_empty() {
            return Err(GenerationError::EmptySource);
        }

        let start_time = Instant::now();
        let mut publication = Publication::new(observer);
        match self.run(source_text, &mut publication).await {
            Ok(document) => {
                info!(
                    "⏱️ Textbook generation took: {:?} ({} sections)",
                    start_time.elapsed(),
                    document.sections().len()
                );
                Ok(document)
            }
            Err(source) => {
                let snapshot = publication.current().map(Snapshot::textbook);
                Err(recover(self.snapshots.as_ref(), snapshot, source).await)
            }
        }
    }

    async fn run(
        &self,
        source_text: &str,
        publication: &mut Publication<'_, TextbookDocument>,
    ) -> Result<Arc<TextbookDocument>, PortError> {
        publication.stage(GenerationStage::InferringSubject).await;
        let subject = self.text.infer_subject(source_text).await?;
        info!("Inferred subject: '{subject}'");

        publication.stage(GenerationStage::SummarizingForImages).await;
        let image_context = self.text.summarize_for_image_context(source_text).await?;

        publication.stage(GenerationStage::Outlining).await;
        let outline = self.text.generate_outline(source_text, &subject).await?;

        let mut document = publication
            .commit(TextbookDocument::from_outline(&outline))
            .await;

        publication.stage(GenerationStage::IllustratingHeader).await;
        match self
            .images
            .generate_header_image(&outline.title, &image_context)
            .await
        {
            Some(url) => document = publication.commit(document.with_header_image(url)).await,
            None => warn!("No header image was generated; continuing without one."),
        }

        let total = document.sections().len();
        for index in 0..total {
            let section = Arc::clone(&document.sections()[index]);

            publication
                .stage(GenerationStage::WritingSection { index, total })
                .await;
            let request = SectionRequest {
                source_text,
                summary: section.summary.as_deref().unwrap_or(&section.title),
                chapter_title: &outline.title,
                subject: &subject,
                section_title: &section.title,
                section_number: &section.section_number,
            };
            let mut stream = self.text.generate_section_text_stream(&request).await?;
            while let Some(chunk) = stream.next().await {
                let chunk = chunk?;
                if chunk.is_empty() {
                    continue;
                }
                document = publication
                    .commit(document.append_section_text(index, &chunk))
                    .await;
            }

            publication
                .stage(GenerationStage::IllustratingSection { index, total })
                .await;
            let full_text = document.sections()[index].section_text.clone();
            match self.images.generate_diagram_image(&full_text).await {
                Some(url) => {
                    document = publication
                        .commit(document.push_section_image(index, url))
                        .await;
                }
                None => warn!(
                    "No diagram generated for section {}; continuing.",
                    section.section_number
                ),
            }
        }

        Ok(document)
    }
}

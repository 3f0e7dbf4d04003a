//! crates/textbook_forge_core/src/story.rs
//!
//! Story/magazine generation: planning a multi-chapter document and drafting its
//! pages one at a time under user run control (stop / continue).

use crate::domain::{
    GenerationProgress, GenerationStage, GenerationStatus, InvalidTransition, PageLocation,
    Snapshot, StatusEvent, StoryDocument,
};
use crate::pipeline::{recover, GenerationError, Publication};
use crate::ports::{
    GenerationObserver, ImageGenerationService, PageRequest, PortError, SnapshotStore,
    TextGenerationService,
};
use futures::StreamExt;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{info, warn};

//=========================================================================================
// Run Control
//=========================================================================================

/// What the UI needs to enable Stop/Continue and display progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct StoryRunState {
    pub status: GenerationStatus,
    pub progress: GenerationProgress,
}

/// Shared run control for one story. The drafting task owns the transitions;
/// everyone else may only request a stop or watch the state.
pub struct StoryControl {
    state: watch::Sender<StoryRunState>,
    stop_requested: AtomicBool,
}

impl Default for StoryControl {
    fn default() -> Self {
        Self::new()
    }
}

impl StoryControl {
    pub fn new() -> Self {
        let (state, _) = watch::channel(StoryRunState::default());
        Self {
            state,
            stop_requested: AtomicBool::new(false),
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<StoryRunState> {
        self.state.subscribe()
    }

    pub fn state(&self) -> StoryRunState {
        *self.state.borrow()
    }

    /// Asks drafting to pause at the next page boundary. A request made while the
    /// story is still being planned is held and honored before the first page.
    /// Returns false once the run is paused or complete.
    pub fn request_stop(&self) -> bool {
        match self.state().status {
            GenerationStatus::Idle | GenerationStatus::Running => {
                self.stop_requested.store(true, Ordering::SeqCst);
                true
            }
            GenerationStatus::Paused | GenerationStatus::Complete => false,
        }
    }

    fn take_stop_request(&self) -> bool {
        self.stop_requested.swap(false, Ordering::SeqCst)
    }

    /// Enters `Running` from `Idle` (first run) or `Paused` (continue). A stop
    /// left over from the previous run is dropped on continue.
    fn begin(&self, progress: GenerationProgress) -> Result<StoryRunState, InvalidTransition> {
        let event = match self.state().status {
            GenerationStatus::Paused => {
                self.stop_requested.store(false, Ordering::SeqCst);
                StatusEvent::Resume
            }
            _ => StatusEvent::Start,
        };
        self.apply(event, Some(progress))
    }

    fn set_progress(&self, progress: GenerationProgress) {
        self.state.send_modify(|state| state.progress = progress);
    }

    fn apply(
        &self,
        event: StatusEvent,
        progress: Option<GenerationProgress>,
    ) -> Result<StoryRunState, InvalidTransition> {
        let mut outcome = None;
        self.state.send_if_modified(|state| match state.status.apply(event) {
            Ok(next) => {
                state.status = next;
                if let Some(progress) = progress {
                    state.progress = progress;
                }
                outcome = Some(Ok(*state));
                true
            }
            Err(e) => {
                outcome = Some(Err(e));
                false
            }
        });
        outcome.unwrap_or(Err(InvalidTransition {
            from: self.state().status,
            event,
        }))
    }
}

//=========================================================================================
// Story Generator
//=========================================================================================

#[derive(Clone)]
pub struct StoryGenerator {
    text: Arc<dyn TextGenerationService>,
    images: Arc<dyn ImageGenerationService>,
    snapshots: Arc<dyn SnapshotStore>,
}

impl StoryGenerator {
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

    /// Plans the story and publishes its skeleton, then the header illustration.
    pub async fn plan(
        &self,
        source_text: &str,
        style: &str,
        observer: &dyn GenerationObserver<StoryDocument>,
    ) -> Result<Arc<StoryDocument>, GenerationError> {
        if source_text.trim().is_empty() {
            return Err(GenerationError::EmptySource);
        }

        let mut publication = Publication::new(observer);
        publication.stage(GenerationStage::PlanningStory).await;
        let outline = match self.text.generate_story_outline(source_text, style).await {
            Ok(outline) => outline,
            Err(source) => return Err(recover(self.snapshots.as_ref(), None, source).await),
        };

        let skeleton = publication
            .commit(StoryDocument::from_outline(&outline, style))
            .await;
        info!(
            "Story skeleton '{}' published with {} pages.",
            skeleton.title(),
            skeleton.page_count()
        );

        publication.stage(GenerationStage::IllustratingHeader).await;
        match self.images.generate_header_image(skeleton.title(), style).await {
            Some(url) => Ok(publication.commit(skeleton.with_header_image(url)).await),
            None => {
                warn!("No story header image was generated; continuing without one.");
                Ok(skeleton)
            }
        }
    }

    /// Drafts every undrafted page in reading order. Honors stop requests between
    /// pages, leaving the run `Paused`; a later call continues at the next
    /// undrafted page. A page whose stream yields no text is not counted, and the
    /// run pauses instead of completing while any page is still empty.
    pub async fn draft(
        &self,
        source_text: &str,
        document: Arc<StoryDocument>,
        control: &StoryControl,
        observer: &dyn GenerationObserver<StoryDocument>,
    ) -> Result<Arc<StoryDocument>, GenerationError> {
        let pending = document.undrafted_pages();
        let total = document.page_count();
        let mut progress = GenerationProgress {
            completed: total - pending.len(),
            total,
        };
        control.begin(progress)?;

        let mut publication = Publication::resume(observer, Arc::clone(&document));
        let mut document = document;
        for location in pending {
            if control.take_stop_request() {
                info!(
                    "Story generation paused with {}/{} pages complete.",
                    progress.completed, progress.total
                );
                control.apply(StatusEvent::Pause, Some(progress))?;
                return Ok(document);
            }

            match self
                .draft_page(source_text, document, location, progress, &mut publication)
                .await
            {
                Ok(next) => document = next,
                Err(source) => {
                    control.apply(StatusEvent::Pause, Some(progress))?;
                    let snapshot = publication.current().map(Snapshot::story);
                    return Err(recover(self.snapshots.as_ref(), snapshot, source).await);
                }
            }

            if document.page(location).is_some_and(|page| page.is_drafted()) {
                progress.completed += 1;
                control.set_progress(progress);
            } else {
                warn!(
                    "Page {} of chapter {} came back empty; it stays undrafted.",
                    location.1 + 1,
                    location.0 + 1
                );
            }
        }

        if progress.completed < progress.total {
            info!(
                "Story generation paused with {}/{} pages drafted.",
                progress.completed, progress.total
            );
            control.apply(StatusEvent::Pause, Some(progress))?;
            return Ok(document);
        }
        control.apply(StatusEvent::Finish, Some(progress))?;
        info!("Story generation complete: all {} pages drafted.", progress.total);
        Ok(document)
    }

    async fn draft_page(
        &self,
        source_text: &str,
        mut document: Arc<StoryDocument>,
        location: PageLocation,
        progress: GenerationProgress,
        publication: &mut Publication<'_, StoryDocument>,
    ) -> Result<Arc<StoryDocument>, PortError> {
        let (chapter_index, page_index) = location;
        let chapter = Arc::clone(&document.chapters()[chapter_index]);
        let page = Arc::clone(&chapter.pages[page_index]);
        let previous_page_text = page_index
            .checked_sub(1)
            .and_then(|i| chapter.pages.get(i))
            .map(|p| p.page_text.as_str())
            .filter(|t| !t.is_empty());

        publication
            .stage(GenerationStage::DraftingPage {
                completed: progress.completed,
                total: progress.total,
            })
            .await;
        let request = PageRequest {
            source_text,
            story_title: document.title(),
            style: document.style(),
            chapter_title: &chapter.title,
            chapter_summary: &chapter.summary,
            page_number: page.page_number,
            suggestions: &page.ai_suggestions,
            previous_page_text,
        };
        let mut stream = self.text.generate_page_text_stream(&request).await?;
        let style = document.style().to_string();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            if chunk.is_empty() {
                continue;
            }
            document = publication
                .commit(document.append_page_text(location, &chunk))
                .await;
        }

        let page_text = document
            .page(location)
            .map(|p| p.page_text.clone())
            .unwrap_or_default();
        if page_text.trim().is_empty() {
            return Ok(document);
        }
        publication
            .stage(GenerationStage::IllustratingPage {
                completed: progress.completed,
                total: progress.total,
            })
            .await;
        if let Some(url) = self.images.generate_page_image(&page_text, &style).await {
            document = publication
                .commit(document.push_page_image(location, url))
                .await;
        }
        Ok(document)
    }
}

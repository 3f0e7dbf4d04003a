//! In-memory fakes of the core ports, shared by the integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use textbook_forge_core::domain::{
    ChapterOutline, GenerationStage, Outline, OutlineSection, Snapshot, SnapshotRef,
    StoryOutline,
};
use textbook_forge_core::ports::{
    GenerationObserver, ImageGenerationService, PageRequest, PortError, PortResult,
    SectionRequest, SnapshotStore, TextGenerationService, TextStream,
};
use textbook_forge_core::StoryControl;

//=========================================================================================
// Shared call log
//=========================================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    InferSubject,
    SummarizeForImages,
    Outline,
    SectionChunk { section: String, last: bool },
    PageChunk { page: String, last: bool },
    HeaderImage,
    Diagram { text: String },
    PageImage,
}

pub type CallLog = Arc<Mutex<Vec<Call>>>;

pub fn call_log() -> CallLog {
    Arc::new(Mutex::new(Vec::new()))
}

pub fn outline(count: usize) -> Outline {
    Outline {
        title: "Chapter 9: Emergent Braided Minds".to_string(),
        // Deliberately out of order; the skeleton sorts them.
        sections: (1..=count)
            .rev()
            .map(|i| OutlineSection {
                section_number: format!("§9.{i}"),
                title: format!("Section title {i}"),
                summary: format!("Summary of section {i}."),
            })
            .collect(),
    }
}

pub fn chunks_for(section_number: &str) -> Vec<String> {
    vec![
        format!("Body of {section_number}. "),
        "Definition 9.1.1 holds. ".to_string(),
        "(Veridia-2024 lattice simulations)".to_string(),
    ]
}

fn logged_stream(log: CallLog, items: Vec<PortResult<String>>, label: String, page: bool) -> TextStream {
    let count = items.len();
    stream::iter(items.into_iter().enumerate())
        .map(move |(i, item)| {
            let last = i + 1 == count;
            let call = if page {
                Call::PageChunk { page: label.clone(), last }
            } else {
                Call::SectionChunk { section: label.clone(), last }
            };
            log.lock().unwrap().push(call);
            item
        })
        .boxed()
}

//=========================================================================================
// Text service
//=========================================================================================

pub struct FakeText {
    pub log: CallLog,
    pub outline: Mutex<Option<PortResult<Outline>>>,
    pub fail_subject: bool,
    /// Sections (by number) whose stream fails after its first chunk.
    pub fail_stream_for: HashSet<String>,
    pub story: Option<StoryOutline>,
    pub page_requests: Mutex<Vec<(String, u32)>>,
    /// Requests a stop on this control when the n-th page (1-based) starts drafting.
    pub stop_on_page: Option<(usize, Arc<StoryControl>)>,
    pub fail_page: Option<usize>,
    /// The n-th page request (1-based) gets a stream with no chunks.
    pub empty_page: Option<usize>,
}

impl FakeText {
    pub fn new(log: CallLog, outline: PortResult<Outline>) -> Self {
        Self {
            log,
            outline: Mutex::new(Some(outline)),
            fail_subject: false,
            fail_stream_for: HashSet::new(),
            story: None,
            page_requests: Mutex::new(Vec::new()),
            stop_on_page: None,
            fail_page: None,
            empty_page: None,
        }
    }

    pub fn for_story(log: CallLog, chapters: usize, pages_per_chapter: usize) -> Self {
        let mut fake = Self::new(log, Ok(outline(1)));
        fake.story = Some(StoryOutline {
            title: "The Lattice Voyage".to_string(),
            chapters: (1..=chapters)
                .map(|c| ChapterOutline {
                    title: format!("Chapter {c}"),
                    summary: format!("Things happen in chapter {c}."),
                    pages: (1..=pages_per_chapter).map(|p| format!("Brief {c}.{p}")).collect(),
                })
                .collect(),
        });
        fake
    }

    fn record(&self, call: Call) {
        self.log.lock().unwrap().push(call);
    }
}

#[async_trait]
impl TextGenerationService for FakeText {
    async fn infer_subject(&self, _source_text: &str) -> PortResult<String> {
        self.record(Call::InferSubject);
        if self.fail_subject {
            return Err(PortError::Unexpected("service unavailable".to_string()));
        }
        Ok("Quantum compiler systems.".to_string())
    }

    async fn summarize_for_image_context(&self, _source_text: &str) -> PortResult<String> {
        self.record(Call::SummarizeForImages);
        Ok("lattices, braids, circuits".to_string())
    }

    async fn generate_outline(&self, _source_text: &str, _subject: &str) -> PortResult<Outline> {
        self.record(Call::Outline);
        self.outline
            .lock()
            .unwrap()
            .take()
            .unwrap_or_else(|| Err(PortError::Unexpected("outline already taken".to_string())))
    }

    async fn generate_section_text_stream(
        &self,
        request: &SectionRequest<'_>,
    ) -> PortResult<TextStream> {
        let number = request.section_number.to_string();
        let mut items: Vec<PortResult<String>> = chunks_for(&number).into_iter().map(Ok).collect();
        if self.fail_stream_for.contains(&number) {
            items.truncate(1);
            items.push(Err(PortError::Unexpected("connection reset".to_string())));
        }
        Ok(logged_stream(self.log.clone(), items, number, false))
    }

    async fn generate_story_outline(
        &self,
        _source_text: &str,
        _style: &str,
    ) -> PortResult<StoryOutline> {
        self.record(Call::Outline);
        self.story
            .clone()
            .ok_or_else(|| PortError::InvalidOutline("missing or empty chapters array".to_string()))
    }

    async fn generate_page_text_stream(
        &self,
        request: &PageRequest<'_>,
    ) -> PortResult<TextStream> {
        let call_number = {
            let mut requests = self.page_requests.lock().unwrap();
            requests.push((request.chapter_title.to_string(), request.page_number));
            requests.len()
        };
        if let Some((n, control)) = &self.stop_on_page {
            if *n == call_number {
                control.request_stop();
            }
        }
        if self.fail_page == Some(call_number) {
            return Err(PortError::Unexpected("rate limited".to_string()));
        }
        let label = format!("{} p{}", request.chapter_title, request.page_number);
        if self.empty_page == Some(call_number) {
            return Ok(logged_stream(self.log.clone(), Vec::new(), label, true));
        }
        let items = vec![Ok(format!("Text of {label}. ")), Ok("The end.".to_string())];
        Ok(logged_stream(self.log.clone(), items, label, true))
    }
}

//=========================================================================================
// Image service
//=========================================================================================

pub struct FakeImages {
    pub log: CallLog,
    pub header: Option<String>,
    /// Zero-based diagram calls that fail.
    pub failing_diagrams: HashSet<usize>,
    diagram_calls: Mutex<usize>,
}

impl FakeImages {
    pub fn new(log: CallLog) -> Self {
        Self {
            log,
            header: Some("data:image/png;base64,SEVBREVS".to_string()),
            failing_diagrams: HashSet::new(),
            diagram_calls: Mutex::new(0),
        }
    }
}

#[async_trait]
impl ImageGenerationService for FakeImages {
    async fn generate_header_image(&self, _title: &str, _style_context: &str) -> Option<String> {
        self.log.lock().unwrap().push(Call::HeaderImage);
        self.header.clone()
    }

    async fn generate_diagram_image(&self, section_text: &str) -> Option<String> {
        self.log.lock().unwrap().push(Call::Diagram {
            text: section_text.to_string(),
        });
        let index = {
            let mut calls = self.diagram_calls.lock().unwrap();
            *calls += 1;
            *calls - 1
        };
        if self.failing_diagrams.contains(&index) {
            return None;
        }
        Some(format!("data:image/png;base64,RElBR1JBTQ{index}"))
    }

    async fn generate_page_image(&self, _page_text: &str, _style: &str) -> Option<String> {
        self.log.lock().unwrap().push(Call::PageImage);
        Some("data:image/png;base64,UEFHRQ".to_string())
    }
}

//=========================================================================================
// Snapshot store and observer
//=========================================================================================

#[derive(Default)]
pub struct MemorySnapshots {
    pub saved: Mutex<Vec<serde_json::Value>>,
    pub fail: bool,
}

#[async_trait]
impl SnapshotStore for MemorySnapshots {
    async fn save(&self, snapshot: &Snapshot) -> PortResult<SnapshotRef> {
        if self.fail {
            return Err(PortError::Unexpected("disk full".to_string()));
        }
        let value = serde_json::to_value(snapshot)
            .map_err(|e| PortError::Unexpected(e.to_string()))?;
        let mut saved = self.saved.lock().unwrap();
        saved.push(value);
        Ok(SnapshotRef {
            name: format!("{}_progress_{}.json", snapshot.kind(), saved.len()),
        })
    }

    async fn load(&self, name: &str) -> PortResult<Vec<u8>> {
        Err(PortError::NotFound(name.to_string()))
    }
}

pub struct RecordingObserver<D> {
    pub published: Mutex<Vec<Arc<D>>>,
    pub stages: Mutex<Vec<GenerationStage>>,
}

impl<D> Default for RecordingObserver<D> {
    fn default() -> Self {
        Self {
            published: Mutex::new(Vec::new()),
            stages: Mutex::new(Vec::new()),
        }
    }
}

impl<D> RecordingObserver<D> {
    pub fn snapshots(&self) -> Vec<Arc<D>> {
        self.published.lock().unwrap().clone()
    }
}

#[async_trait]
impl<D: Send + Sync + 'static> GenerationObserver<D> for RecordingObserver<D> {
    async fn publish(&self, snapshot: Arc<D>) {
        self.published.lock().unwrap().push(snapshot);
    }

    async fn stage(&self, stage: GenerationStage) {
        self.stages.lock().unwrap().push(stage);
    }
}

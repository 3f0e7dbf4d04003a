//! crates/textbook_forge_core/src/domain.rs
//!
//! Defines the pure, core data structures for the application.
//!
//! Documents are never mutated once they have been handed to an observer. Every
//! update returns a new document value that shares its untouched sections (or
//! chapters and pages) with the previous one through `Arc`, and carries a higher
//! `version`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;
use uuid::Uuid;

//=========================================================================================
// Outlines (results of the structured AI calls)
//=========================================================================================

/// A single section stub produced by the outline step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutlineSection {
    pub section_number: String,
    pub title: String,
    pub summary: String,
}

/// The validated outline that seeds a textbook chapter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Outline {
    pub title: String,
    pub sections: Vec<OutlineSection>,
}

/// One chapter of a story plan. `pages` holds a short brief per page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChapterOutline {
    pub title: String,
    pub summary: String,
    pub pages: Vec<String>,
}

/// The validated plan that seeds a story/magazine document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoryOutline {
    pub title: String,
    pub chapters: Vec<ChapterOutline>,
}

//=========================================================================================
// Textbook Documents
//=========================================================================================

/// One chapter subdivision of a textbook document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Section {
    pub id: Uuid,
    /// Human-facing ordinal label, e.g. "§9.1".
    pub section_number: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    pub section_text: String,
    pub images: Vec<String>,
}

impl Section {
    /// An empty body means the section has not been written yet.
    pub fn is_generating(&self) -> bool {
        self.section_text.is_empty()
    }

    pub fn primary_image(&self) -> Option<&str> {
        self.images.first().map(String::as_str)
    }

    /// Figure captions fall back to the title once the summary is gone.
    pub fn caption(&self) -> &str {
        self.summary.as_deref().unwrap_or(&self.title)
    }
}

/// The aggregate root of a generated textbook chapter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextbookDocument {
    id: Uuid,
    title: String,
    #[serde(
        rename = "headerImageUrl",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    header_image_url: Option<String>,
    sections: Vec<Arc<Section>>,
    #[serde(default)]
    version: u64,
}

impl TextbookDocument {
    /// Builds the skeleton document for an outline: fresh ids, empty bodies, and
    /// sections sorted once by the natural order of their numbers.
    pub fn from_outline(outline: &Outline) -> Self {
        let mut sections: Vec<Arc<Section>> = outline
            .sections
            .iter()
            .map(|s| {
                Arc::new(Section {
                    id: Uuid::new_v4(),
                    section_number: s.section_number.clone(),
                    title: s.title.clone(),
                    summary: Some(s.summary.clone()),
                    section_text: String::new(),
                    images: Vec::new(),
                })
            })
            .collect();
        sections.sort_by(|a, b| compare_section_numbers(&a.section_number, &b.section_number));

        Self {
            id: Uuid::new_v4(),
            title: outline.title.clone(),
            header_image_url: None,
            sections,
            version: 0,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn header_image_url(&self) -> Option<&str> {
        self.header_image_url.as_deref()
    }

    pub fn sections(&self) -> &[Arc<Section>] {
        &self.sections
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    /// True until any section has received text.
    pub fn is_skeleton(&self) -> bool {
        self.sections.iter().all(|s| s.is_generating())
    }

    pub fn with_header_image(&self, url: String) -> Self {
        Self {
            header_image_url: Some(url),
            version: self.version + 1,
            ..self.clone()
        }
    }

    pub fn append_section_text(&self, index: usize, chunk: &str) -> Self {
        self.with_section(index, |section| section.section_text.push_str(chunk))
    }

    pub fn push_section_image(&self, index: usize, url: String) -> Self {
        self.with_section(index, |section| section.images.push(url))
    }

    /// If this document is `previous` plus exactly one text append, the index of
    /// the grown section and the appended chunk.
    pub fn text_appended_since<'a>(&'a self, previous: &TextbookDocument) -> Option<(usize, &'a str)> {
        if self.id != previous.id
            || self.version != previous.version + 1
            || self.sections.len() != previous.sections.len()
            || self.header_image_url != previous.header_image_url
        {
            return None;
        }
        let mut changed = self
            .sections
            .iter()
            .zip(&previous.sections)
            .enumerate()
            .filter(|(_, (now, before))| !Arc::ptr_eq(now, before));
        let (index, (now, before)) = changed.next()?;
        if changed.next().is_some() || now.images != before.images {
            return None;
        }
        now.section_text
            .strip_prefix(before.section_text.as_str())
            .filter(|chunk| !chunk.is_empty())
            .map(|chunk| (index, chunk))
    }

    fn with_section(&self, index: usize, update: impl FnOnce(&mut Section)) -> Self {
        let Some(current) = self.sections.get(index) else {
            return self.clone();
        };
        let mut section = Section::clone(current);
        update(&mut section);

        let mut sections = self.sections.clone();
        sections[index] = Arc::new(section);
        Self {
            sections,
            version: self.version + 1,
            ..self.clone()
        }
    }
}

/// Compares section labels such as "§1.2" and "§1.10" by the value of their
/// embedded numerals rather than lexically.
pub fn compare_section_numbers(a: &str, b: &str) -> Ordering {
    let mut left = Tokens::new(a);
    let mut right = Tokens::new(b);
    loop {
        let ordering = match (left.next(), right.next()) {
            (None, None) => return a.cmp(b),
            (None, Some(_)) => return Ordering::Less,
            (Some(_), None) => return Ordering::Greater,
            (Some(Token::Number(x)), Some(Token::Number(y))) => compare_digits(x, y),
            (Some(Token::Text(x)), Some(Token::Text(y))) => x.to_lowercase().cmp(&y.to_lowercase()),
            (Some(Token::Number(_)), Some(Token::Text(_))) => Ordering::Less,
            (Some(Token::Text(_)), Some(Token::Number(_))) => Ordering::Greater,
        };
        if ordering != Ordering::Equal {
            return ordering;
        }
    }
}

fn compare_digits(x: &str, y: &str) -> Ordering {
    let x = x.trim_start_matches('0');
    let y = y.trim_start_matches('0');
    x.len().cmp(&y.len()).then_with(|| x.cmp(y))
}

enum Token<'a> {
    Number(&'a str),
    Text(&'a str),
}

struct Tokens<'a> {
    rest: &'a str,
}

impl<'a> Tokens<'a> {
    fn new(input: &'a str) -> Self {
        Self { rest: input }
    }
}

impl<'a> Iterator for Tokens<'a> {
    type Item = Token<'a>;

    fn next(&mut self) -> Option<Token<'a>> {
        let first = self.rest.chars().next()?;
        let numeric = first.is_ascii_digit();
        let end = self
            .rest
            .char_indices()
            .find(|(_, c)| c.is_ascii_digit() != numeric)
            .map(|(i, _)| i)
            .unwrap_or(self.rest.len());
        let (token, rest) = self.rest.split_at(end);
        self.rest = rest;
        Some(if numeric {
            Token::Number(token)
        } else {
            Token::Text(token)
        })
    }
}

//=========================================================================================
// Story / Magazine Documents
//=========================================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page {
    pub id: Uuid,
    pub page_number: u32,
    pub page_text: String,
    pub ai_suggestions: Vec<String>,
    pub images: Vec<String>,
}

impl Page {
    pub fn is_drafted(&self) -> bool {
        !self.page_text.trim().is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chapter {
    pub id: Uuid,
    pub title: String,
    pub summary: String,
    pub pages: Vec<Arc<Page>>,
}

/// Position of a page inside a story: (chapter index, page index).
pub type PageLocation = (usize, usize);

/// The aggregate root of a generated story or magazine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoryDocument {
    id: Uuid,
    title: String,
    style: String,
    #[serde(
        rename = "headerImageUrl",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    header_image_url: Option<String>,
    chapters: Vec<Arc<Chapter>>,
    #[serde(default)]
    version: u64,
}

impl StoryDocument {
    pub fn from_outline(outline: &StoryOutline, style: &str) -> Self {
        let chapters = outline
            .chapters
            .iter()
            .map(|chapter| {
                let pages = chapter
                    .pages
                    .iter()
                    .zip(1u32..)
                    .map(|(brief, page_number)| {
                        Arc::new(Page {
                            id: Uuid::new_v4(),
                            page_number,
                            page_text: String::new(),
                            ai_suggestions: vec![brief.clone()],
                            images: Vec::new(),
                        })
                    })
                    .collect();
                Arc::new(Chapter {
                    id: Uuid::new_v4(),
                    title: chapter.title.clone(),
                    summary: chapter.summary.clone(),
                    pages,
                })
            })
            .collect();

        Self {
            id: Uuid::new_v4(),
            title: outline.title.clone(),
            style: style.to_string(),
            header_image_url: None,
            chapters,
            version: 0,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn style(&self) -> &str {
        &self.style
    }

    pub fn header_image_url(&self) -> Option<&str> {
        self.header_image_url.as_deref()
    }

    pub fn chapters(&self) -> &[Arc<Chapter>] {
        &self.chapters
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn page(&self, (chapter, page): PageLocation) -> Option<&Arc<Page>> {
        self.chapters.get(chapter)?.pages.get(page)
    }

    pub fn page_count(&self) -> usize {
        self.chapters.iter().map(|c| c.pages.len()).sum()
    }

    pub fn drafted_count(&self) -> usize {
        self.chapters
            .iter()
            .flat_map(|c| c.pages.iter())
            .filter(|p| p.is_drafted())
            .count()
    }

    /// Locations of all pages that still need text, in reading order.
    pub fn undrafted_pages(&self) -> Vec<PageLocation> {
        self.chapters
            .iter()
            .enumerate()
            .flat_map(|(ci, chapter)| {
                chapter
                    .pages
                    .iter()
                    .enumerate()
                    .filter(|(_, page)| !page.is_drafted())
                    .map(move |(pi, _)| (ci, pi))
            })
            .collect()
    }

    pub fn with_header_image(&self, url: String) -> Self {
        Self {
            header_image_url: Some(url),
            version: self.version + 1,
            ..self.clone()
        }
    }

    pub fn append_page_text(&self, location: PageLocation, chunk: &str) -> Self {
        self.with_page(location, |page| page.page_text.push_str(chunk))
    }

    pub fn push_page_image(&self, location: PageLocation, url: String) -> Self {
        self.with_page(location, |page| page.images.push(url))
    }

    /// If this document is `previous` plus exactly one page text append, the
    /// page's location and the appended chunk.
    pub fn page_text_appended_since<'a>(
        &'a self,
        previous: &StoryDocument,
    ) -> Option<(PageLocation, &'a str)> {
        if self.id != previous.id
            || self.version != previous.version + 1
            || self.chapters.len() != previous.chapters.len()
            || self.header_image_url != previous.header_image_url
        {
            return None;
        }
        let mut changed = self
            .chapters
            .iter()
            .zip(&previous.chapters)
            .enumerate()
            .filter(|(_, (now, before))| !Arc::ptr_eq(now, before));
        let (ci, (chapter, chapter_before)) = changed.next()?;
        if changed.next().is_some() || chapter.pages.len() != chapter_before.pages.len() {
            return None;
        }
        let mut pages = chapter
            .pages
            .iter()
            .zip(&chapter_before.pages)
            .enumerate()
            .filter(|(_, (now, before))| !Arc::ptr_eq(now, before));
        let (pi, (now, before)) = pages.next()?;
        if pages.next().is_some() || now.images != before.images {
            return None;
        }
        now.page_text
            .strip_prefix(before.page_text.as_str())
            .filter(|chunk| !chunk.is_empty())
            .map(|chunk| ((ci, pi), chunk))
    }

    fn with_page(&self, (ci, pi): PageLocation, update: impl FnOnce(&mut Page)) -> Self {
        let Some(chapter) = self.chapters.get(ci) else {
            return self.clone();
        };
        let Some(current) = chapter.pages.get(pi) else {
            return self.clone();
        };
        let mut page = Page::clone(current);
        update(&mut page);

        let mut pages = chapter.pages.clone();
        pages[pi] = Arc::new(page);
        let mut chapters = self.chapters.clone();
        chapters[ci] = Arc::new(Chapter {
            pages,
            ..Chapter::clone(chapter)
        });
        Self {
            chapters,
            version: self.version + 1,
            ..self.clone()
        }
    }
}

//=========================================================================================
// Generation Status (story run control)
//=========================================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GenerationStatus {
    #[default]
    Idle,
    Running,
    Paused,
    Complete,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusEvent {
    Start,
    Pause,
    Resume,
    Finish,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("Cannot apply {event:?} while generation is {from:?}")]
pub struct InvalidTransition {
    pub from: GenerationStatus,
    pub event: StatusEvent,
}

impl GenerationStatus {
    pub fn apply(self, event: StatusEvent) -> Result<GenerationStatus, InvalidTransition> {
        use GenerationStatus::*;
        match (self, event) {
            (Idle, StatusEvent::Start) => Ok(Running),
            (Running, StatusEvent::Pause) => Ok(Paused),
            (Paused, StatusEvent::Resume) => Ok(Running),
            (Running, StatusEvent::Finish) => Ok(Complete),
            (from, event) => Err(InvalidTransition { from, event }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct GenerationProgress {
    pub completed: usize,
    pub total: usize,
}

//=========================================================================================
// Generation Stages
//=========================================================================================

/// A coarse description of what a pipeline is doing, for progress display.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GenerationStage {
    InferringSubject,
    SummarizingForImages,
    Outlining,
    PlanningStory,
    IllustratingHeader,
    WritingSection { index: usize, total: usize },
    IllustratingSection { index: usize, total: usize },
    DraftingPage { completed: usize, total: usize },
    IllustratingPage { completed: usize, total: usize },
}

impl fmt::Display for GenerationStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InferringSubject => {
                write!(f, "Analyzing source material to determine the subject...")
            }
            Self::SummarizingForImages => {
                write!(f, "Creating visual summary for illustrations...")
            }
            Self::Outlining => write!(f, "Generating textbook outline..."),
            Self::PlanningStory => write!(f, "Planning chapters and pages..."),
            Self::IllustratingHeader => write!(f, "Generating chapter header illustration..."),
            Self::WritingSection { index, total } => {
                write!(f, "Writing section {} of {}...", index + 1, total)
            }
            Self::IllustratingSection { index, .. } => {
                write!(f, "Generating diagram for section {}...", index + 1)
            }
            Self::DraftingPage { completed, total } => {
                write!(f, "Generating... Page {} of {}", completed + 1, total)
            }
            Self::IllustratingPage { completed, .. } => {
                write!(f, "Illustrating page {}...", completed + 1)
            }
        }
    }
}

//=========================================================================================
// Failure Snapshots
//=========================================================================================

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", content = "document", rename_all = "snake_case")]
pub enum SnapshotContent {
    Textbook(Arc<TextbookDocument>),
    Story(Arc<StoryDocument>),
}

/// A self-describing capture of a document, written when generation fails.
#[derive(Debug, Clone, Serialize)]
pub struct Snapshot {
    pub saved_at: DateTime<Utc>,
    #[serde(flatten)]
    pub content: SnapshotContent,
}

impl Snapshot {
    pub fn textbook(document: Arc<TextbookDocument>) -> Self {
        Self {
            saved_at: Utc::now(),
            content: SnapshotContent::Textbook(document),
        }
    }

    pub fn story(document: Arc<StoryDocument>) -> Self {
        Self {
            saved_at: Utc::now(),
            content: SnapshotContent::Story(document),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self.content {
            SnapshotContent::Textbook(_) => "textbook",
            SnapshotContent::Story(_) => "story",
        }
    }

    pub fn title(&self) -> &str {
        match &self.content {
            SnapshotContent::Textbook(doc) => doc.title(),
            SnapshotContent::Story(doc) => doc.title(),
        }
    }
}

/// Where a snapshot ended up; `name` is what clients use to download it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotRef {
    pub name: String,
}

//! crates/textbook_forge_core/src/export.rs
//!
//! Flattens a textbook document into export layouts: a paginated document (title
//! page, running header/footer, figure + caption + body per section) and a slide
//! deck. Binary encoding of the layouts is left to a renderer.

use crate::domain::TextbookDocument;
use serde::Serialize;

pub const SUBTITLE: &str = "An AI-Generated Textbook Addendum";

// A4 in points.
const PAGE_WIDTH: f32 = 595.28;
const PAGE_HEIGHT: f32 = 841.89;
const MARGIN: f32 = 50.0;

const HEADING_SIZE: f32 = 16.0;
const HEADING_LINE: f32 = 20.0;
const BODY_SIZE: f32 = 12.0;
const BODY_LINE: f32 = 14.0;
const CAPTION_SIZE: f32 = 9.0;
const CAPTION_LINE: f32 = 12.0;
const TITLE_SIZE: f32 = 32.0;
const FIGURE_HEIGHT: f32 = 180.0;

/// Average Helvetica glyph width as a fraction of the font size.
const GLYPH_WIDTH: f32 = 0.5;

/// `"Chapter 9: Braids"` -> `"chapter_9__braids"`.
pub fn file_slug(title: &str) -> String {
    title
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_lowercase()
            } else {
                '_'
            }
        })
        .collect()
}

pub fn export_file_name(title: &str, extension: &str) -> String {
    format!("{}.{}", file_slug(title), extension)
}

/// Greedy word wrap against an estimated line width. Words longer than a line
/// are split; paragraph breaks are kept as empty lines.
pub fn wrap_text(text: &str, max_width: f32, font_size: f32) -> Vec<String> {
    let max_chars = ((max_width / (font_size * GLYPH_WIDTH)).floor() as usize).max(1);
    let mut lines = Vec::new();

    for paragraph in text.split('\n') {
        let mut line = String::new();
        for word in paragraph.split_whitespace() {
            let mut word: Vec<char> = word.chars().collect();
            while word.len() > max_chars {
                if !line.is_empty() {
                    lines.push(std::mem::take(&mut line));
                }
                let rest = word.split_off(max_chars);
                lines.push(word.into_iter().collect());
                word = rest;
            }
            let word: String = word.into_iter().collect();
            let needed = if line.is_empty() {
                word.chars().count()
            } else {
                line.chars().count() + 1 + word.chars().count()
            };
            if needed > max_chars && !line.is_empty() {
                lines.push(std::mem::take(&mut line));
            }
            if !line.is_empty() {
                line.push(' ');
            }
            line.push_str(&word);
        }
        lines.push(line);
    }

    while lines.last().is_some_and(|l| l.is_empty()) {
        lines.pop();
    }
    lines
}

//=========================================================================================
// Paginated Document
//=========================================================================================

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PaginatedLayout {
    pub page_width: f32,
    pub page_height: f32,
    pub margin: f32,
    pub title_page: TitlePage,
    pub pages: Vec<ContentPage>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TitlePage {
    pub header_image: Option<String>,
    pub title_lines: Vec<String>,
    pub subtitle: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ContentPage {
    pub number: usize,
    pub running_header: String,
    pub footer: String,
    pub elements: Vec<PlacedElement>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlacedElement {
    pub y: f32,
    #[serde(flatten)]
    pub kind: ElementKind,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ElementKind {
    Heading { lines: Vec<String> },
    Figure { image: String, height: f32 },
    Caption { lines: Vec<String> },
    BodyLine { text: String },
}

struct Paginator {
    title: String,
    pages: Vec<ContentPage>,
    y: f32,
}

impl Paginator {
    fn new(title: &str) -> Self {
        let mut paginator = Self {
            title: title.to_string(),
            pages: Vec::new(),
            y: MARGIN,
        };
        paginator.new_page();
        paginator
    }

    fn new_page(&mut self) {
        let number = self.pages.len() + 1;
        self.pages.push(ContentPage {
            number,
            running_header: self.title.clone(),
            footer: format!("Page {number}"),
            elements: Vec::new(),
        });
        self.y = MARGIN;
    }

    /// Starts a new page unless `height` still fits above the bottom margin.
    fn ensure_room(&mut self, height: f32) {
        if self.y + height > PAGE_HEIGHT - MARGIN {
            self.new_page();
        }
    }

    fn place(&mut self, kind: ElementKind) {
        let y = self.y;
        if let Some(page) = self.pages.last_mut() {
            page.elements.push(PlacedElement { y, kind });
        }
    }
}

pub fn paginate(document: &TextbookDocument) -> PaginatedLayout {
    let content_width = PAGE_WIDTH - MARGIN * 2.0;
    let mut paginator = Paginator::new(document.title());

    for section in document.sections() {
        let heading = wrap_text(
            &format!("{} {}", section.section_number, section.title),
            content_width,
            HEADING_SIZE,
        );
        let heading_height = heading.len() as f32 * HEADING_LINE;
        paginator.ensure_room(heading_height);
        paginator.place(ElementKind::Heading { lines: heading });
        paginator.y += heading_height + 10.0;

        if let Some(image) = section.primary_image() {
            paginator.ensure_room(FIGURE_HEIGHT + 30.0);
            paginator.place(ElementKind::Figure {
                image: image.to_string(),
                height: FIGURE_HEIGHT,
            });
            paginator.y += FIGURE_HEIGHT + 5.0;

            let caption = wrap_text(
                &format!(
                    "Figure {}: {}",
                    section.section_number.replace('§', ""),
                    section.caption()
                ),
                content_width,
                CAPTION_SIZE,
            );
            let caption_height = caption.len() as f32 * CAPTION_LINE;
            paginator.place(ElementKind::Caption { lines: caption });
            paginator.y += caption_height + 15.0;
        }

        for line in wrap_text(&section.section_text, content_width, BODY_SIZE) {
            if paginator.y > PAGE_HEIGHT - MARGIN {
                paginator.new_page();
            }
            paginator.place(ElementKind::BodyLine { text: line });
            paginator.y += BODY_LINE;
        }
        paginator.y += 20.0;
    }

    PaginatedLayout {
        page_width: PAGE_WIDTH,
        page_height: PAGE_HEIGHT,
        margin: MARGIN,
        title_page: TitlePage {
            header_image: document.header_image_url().map(str::to_string),
            title_lines: wrap_text(document.title(), content_width * 0.9, TITLE_SIZE),
            subtitle: SUBTITLE.to_string(),
        },
        pages: paginator.pages,
    }
}

//=========================================================================================
// Slide Deck
//=========================================================================================

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SlideDeck {
    /// 13.33 x 7.5 inch widescreen.
    pub layout: &'static str,
    pub title_slide: TitleSlide,
    pub slides: Vec<ContentSlide>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TitleSlide {
    pub title: String,
    pub subtitle: String,
    pub background_image: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ContentSlide {
    pub heading: String,
    pub body: String,
    pub layout: SlideLayout,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SlideLayout {
    /// Full-width text.
    TextOnly,
    /// Text on the left, the section's diagram on the right.
    TextWithImage { image: String },
}

pub fn build_slide_deck(document: &TextbookDocument) -> SlideDeck {
    let slides = document
        .sections()
        .iter()
        .map(|section| ContentSlide {
            heading: format!("{} {}", section.section_number, section.title),
            body: section.section_text.clone(),
            layout: match section.primary_image() {
                Some(image) => SlideLayout::TextWithImage {
                    image: image.to_string(),
                },
                None => SlideLayout::TextOnly,
            },
        })
        .collect();

    SlideDeck {
        layout: "LAYOUT_WIDE",
        title_slide: TitleSlide {
            title: document.title().to_string(),
            subtitle: SUBTITLE.to_string(),
            background_image: document.header_image_url().map(str::to_string),
        },
        slides,
    }
}

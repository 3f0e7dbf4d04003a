//! crates/textbook_forge_core/src/outline.rs
//!
//! Parsing and validation of the structured outline responses. The outline is the
//! only AI result whose shape drives control flow, so it is checked strictly here
//! instead of trusting the service's schema enforcement.

use crate::domain::{ChapterOutline, Outline, OutlineSection, StoryOutline};
use crate::ports::{PortError, PortResult};
use serde::Deserialize;
use tracing::error;

/// Removes a Markdown code fence (with or without a `json` tag) around a response.
pub fn strip_code_fences(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    rest.strip_suffix("```").unwrap_or(rest).trim()
}

#[derive(Deserialize)]
struct RawOutline {
    title: Option<String>,
    sections: Option<Vec<RawOutlineSection>>,
}

#[derive(Deserialize)]
struct RawOutlineSection {
    section_number: Option<String>,
    title: Option<String>,
    #[serde(default)]
    summary: Option<String>,
}

/// Parses a chapter outline, requiring a non-empty title and a non-empty list of
/// sections that each carry a number and a title.
pub fn parse_outline(raw: &str) -> PortResult<Outline> {
    let json = strip_code_fences(raw);
    let parsed: RawOutline = serde_json::from_str(json).map_err(|e| {
        error!("Failed to parse textbook outline JSON: {e}. Malformed JSON string: {json}");
        PortError::InvalidOutline(format!("response is not valid JSON: {e}"))
    })?;

    let title = non_empty(parsed.title)
        .ok_or_else(|| PortError::InvalidOutline("missing chapter title".to_string()))?;
    let raw_sections = parsed
        .sections
        .filter(|s| !s.is_empty())
        .ok_or_else(|| PortError::InvalidOutline("missing or empty sections array".to_string()))?;

    let sections = raw_sections
        .into_iter()
        .enumerate()
        .map(|(i, s)| {
            let section_number = non_empty(s.section_number).ok_or_else(|| {
                PortError::InvalidOutline(format!("section {} has no section_number", i + 1))
            })?;
            let title = non_empty(s.title).ok_or_else(|| {
                PortError::InvalidOutline(format!("section {} has no title", i + 1))
            })?;
            Ok(OutlineSection {
                section_number,
                title,
                summary: s.summary.unwrap_or_default().trim().to_string(),
            })
        })
        .collect::<PortResult<Vec<_>>>()?;

    Ok(Outline { title, sections })
}

#[derive(Deserialize)]
struct RawStoryOutline {
    title: Option<String>,
    chapters: Option<Vec<RawChapterOutline>>,
}

#[derive(Deserialize)]
struct RawChapterOutline {
    title: Option<String>,
    #[serde(default)]
    summary: Option<String>,
    #[serde(default)]
    pages: Vec<String>,
}

/// Parses a story plan: a title and chapters that each have at least one page brief.
pub fn parse_story_outline(raw: &str) -> PortResult<StoryOutline> {
    let json = strip_code_fences(raw);
    let parsed: RawStoryOutline = serde_json::from_str(json).map_err(|e| {
        error!("Failed to parse story outline JSON: {e}");
        PortError::InvalidOutline(format!("response is not valid JSON: {e}"))
    })?;

    let title = non_empty(parsed.title)
        .ok_or_else(|| PortError::InvalidOutline("missing story title".to_string()))?;
    let raw_chapters = parsed
        .chapters
        .filter(|c| !c.is_empty())
        .ok_or_else(|| PortError::InvalidOutline("missing or empty chapters array".to_string()))?;

    let chapters = raw_chapters
        .into_iter()
        .enumerate()
        .map(|(i, c)| {
            let title = non_empty(c.title).ok_or_else(|| {
                PortError::InvalidOutline(format!("chapter {} has no title", i + 1))
            })?;
            let pages: Vec<String> = c
                .pages
                .into_iter()
                .map(|p| p.trim().to_string())
                .filter(|p| !p.is_empty())
                .collect();
            if pages.is_empty() {
                return Err(PortError::InvalidOutline(format!(
                    "chapter {} has no pages",
                    i + 1
                )));
            }
            Ok(ChapterOutline {
                title,
                summary: c.summary.unwrap_or_default().trim().to_string(),
                pages,
            })
        })
        .collect::<PortResult<Vec<_>>>()?;

    Ok(StoryOutline { title, chapters })
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

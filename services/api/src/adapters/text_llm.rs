//! services/api/src/adapters/text_llm.rs
//!
//! This module contains the adapter for the text-generating LLM.
//! It implements the `TextGenerationService` port from the `core` crate: subject
//! inference, outlines (as JSON objects), and streamed prose for sections and pages.

const SOURCE_CHAR_LIMIT: usize = 100_000;

const PROFESSOR_PERSONA: &str = "You are a university professor and author of a leading textbook on advanced computer science.";

const STORYTELLER_PERSONA: &str = "You are an accomplished author who turns technical reference material into vivid, serialized fiction.";

const SUBJECT_TEMPLATE: &str = r#"Read the following reference material and state its academic subject in one plain sentence. Respond with the sentence only.

---
{source}
---"#;

const IMAGE_CONTEXT_TEMPLATE: &str = r#"Summarize the following reference material as a short, comma-separated list of visual keywords (themes, objects, moods) that an illustrator could use. Do not exceed 40 words and respond with the list only.

---
{source}
---"#;

const OUTLINE_TEMPLATE: &str = r#"Your task is to create a chapter outline for a new addendum to the 2025 edition.

**Chapter Subject:** {subject}

**Reference Material (use this as a "dictionary of facts" and inspiration for the new concepts):**
---
{source}
---

Generate a textbook chapter outline. The chapter should be formal, structured, and academic in tone.
The outline must have a formal chapter title (e.g., "Chapter 9: Emergent Braided Minds in Quantum Compiler Systems") and summaries for exactly 15 sections.
Each section must have a section number (e.g., §9.1, §9.2), a title, and a one-sentence summary of its content.
The content should be dense, authoritative, and suitable for an MIT-level textbook.

Respond with a JSON object of the form:
{"title": "...", "sections": [{"section_number": "§9.1", "title": "...", "summary": "..."}]}
Do not output anything else."#;

const SECTION_TEMPLATE: &str = r#"You are writing a section for a textbook chapter titled "{chapter_title}".
The overall subject is: {subject}.

Reference material (draw facts and terminology from it):
---
{source}
---

The current section you are writing is "{section_number} {section_title}".
The summary for this section is: "{summary}".

Based on this, write the full text for this section. The text should be dense, academic, and authoritative, suitable for an advanced computer science textbook.
- Write 2-3 detailed paragraphs.
- Use formal language.
- Where appropriate, invent and include formalisms like "Definition 9.1.1" or references to simulated results like "(Veridia-2024 lattice simulations)".
- Do NOT include the section title or number in your output. Just write the body text for this section."#;

const STORY_OUTLINE_TEMPLATE: &str = r#"Plan a multi-chapter story in the style of: {style}.
The story must be inspired by, and faithful to the facts of, the reference material below.

---
{source}
---

Respond with a JSON object of the form:
{"title": "...", "chapters": [{"title": "...", "summary": "...", "pages": ["one-sentence brief for page 1", "..."]}]}
Plan between 3 and 6 chapters with 3 to 5 pages each. Do not output anything else."#;

const PAGE_TEMPLATE: &str = r#"You are writing "{story_title}", a story in the style of: {style}.

Reference material (keep the story consistent with it):
---
{source}
---

Chapter: "{chapter_title}"
Chapter summary: {chapter_summary}
Write page {page_number} of this chapter.
{suggestions}{previous}
Write 2-4 paragraphs of prose for this page only. Do NOT include headings, page numbers, or the chapter title."#;

use async_openai::{
    config::OpenAIConfig,
    error::OpenAIError,
    types::chat::{
        ChatCompletionRequestMessage, ChatCompletionRequestSystemMessageArgs,
        ChatCompletionRequestUserMessageArgs, CreateChatCompletionRequest,
        CreateChatCompletionRequestArgs, ResponseFormat,
    },
    Client,
};
use async_trait::async_trait;
use futures::StreamExt;
use std::time::Instant;
use textbook_forge_core::{
    domain::{Outline, StoryOutline},
    outline::{parse_outline, parse_story_outline},
    ports::{
        PageRequest, PortError, PortResult, SectionRequest, TextGenerationService, TextStream,
    },
};
use tracing::{debug, info};

//=========================================================================================
// Prompt Rendering
//=========================================================================================

/// Returns at most `limit` characters of `text`, cut on a character boundary.
pub fn truncate_chars(text: &str, limit: usize) -> &str {
    match text.char_indices().nth(limit) {
        Some((end, _)) => &text[..end],
        None => text,
    }
}

fn source_excerpt(source_text: &str) -> &str {
    truncate_chars(source_text, SOURCE_CHAR_LIMIT)
}

pub fn render_outline_prompt(source_text: &str, subject: &str) -> String {
    OUTLINE_TEMPLATE
        .replace("{subject}", subject)
        .replace("{source}", source_excerpt(source_text))
}

pub fn render_section_prompt(request: &SectionRequest<'_>) -> String {
    SECTION_TEMPLATE
        .replace("{chapter_title}", request.chapter_title)
        .replace("{subject}", request.subject)
        .replace("{section_number}", request.section_number)
        .replace("{section_title}", request.section_title)
        .replace("{summary}", request.summary)
        .replace("{source}", source_excerpt(request.source_text))
}

pub fn render_page_prompt(request: &PageRequest<'_>) -> String {
    let suggestions = if request.suggestions.is_empty() {
        String::new()
    } else {
        format!(
            "Cover the following in this page:\n{}\n",
            request
                .suggestions
                .iter()
                .map(|s| format!("- {s}"))
                .collect::<Vec<_>>()
                .join("\n")
        )
    };
    let previous = match request.previous_page_text {
        Some(text) => format!(
            "\nThe previous page ended with:\n\"{}\"\nContinue seamlessly from it.\n",
            tail_chars(text, 1_000)
        ),
        None => String::new(),
    };

    PAGE_TEMPLATE
        .replace("{story_title}", request.story_title)
        .replace("{style}", request.style)
        .replace("{chapter_title}", request.chapter_title)
        .replace("{chapter_summary}", request.chapter_summary)
        .replace("{page_number}", &request.page_number.to_string())
        .replace("{suggestions}", &suggestions)
        .replace("{previous}", &previous)
        .replace("{source}", source_excerpt(request.source_text))
}

fn tail_chars(text: &str, limit: usize) -> &str {
    let count = text.chars().count();
    if count <= limit {
        return text;
    }
    match text.char_indices().nth(count - limit) {
        Some((start, _)) => &text[start..],
        None => text,
    }
}

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// An adapter that implements `TextGenerationService` using an OpenAI-compatible LLM.
#[derive(Clone)]
pub struct OpenAiTextAdapter {
    client: Client<OpenAIConfig>,
    model: String,
}

impl OpenAiTextAdapter {
    pub fn new(client: Client<OpenAIConfig>, model: String) -> Self {
        Self { client, model }
    }

    fn request(
        &self,
        persona: &str,
        prompt: String,
        json_object: bool,
    ) -> PortResult<CreateChatCompletionRequest> {
        let messages: Vec<ChatCompletionRequestMessage> = vec![
            ChatCompletionRequestSystemMessageArgs::default()
                .content(persona)
                .build()
                .map_err(|e| PortError::Unexpected(e.to_string()))?
                .into(),
            ChatCompletionRequestUserMessageArgs::default()
                .content(prompt)
                .build()
                .map_err(|e| PortError::Unexpected(e.to_string()))?
                .into(),
        ];

        let mut builder = CreateChatCompletionRequestArgs::default();
        builder.model(&self.model).messages(messages);
        if json_object {
            builder.response_format(ResponseFormat::JsonObject);
        }
        builder
            .build()
            .map_err(|e| PortError::Unexpected(e.to_string()))
    }

    /// Sends a single completion request and returns the first choice's text.
    async fn complete(&self, persona: &str, prompt: String, json_object: bool) -> PortResult<String> {
        let request = self.request(persona, prompt, json_object)?;

        // Call the API and manually map the error if it occurs, which respects the orphan rule.
        let response = self
            .client
            .chat()
            .create(request)
            .await
            .map_err(|e: OpenAIError| PortError::Unexpected(e.to_string()))?;

        response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .filter(|content| !content.trim().is_empty())
            .ok_or_else(|| {
                PortError::Unexpected("Text LLM response contained no text content.".to_string())
            })
    }

    /// Opens a streamed completion. Each non-empty content delta becomes one
    /// fragment; a transport error ends the stream with that error.
    async fn stream(&self, persona: &str, prompt: String) -> PortResult<TextStream> {
        let request = self.request(persona, prompt, false)?;
        let mut events = self
            .client
            .chat()
            .create_stream(request)
            .await
            .map_err(|e: OpenAIError| PortError::Unexpected(e.to_string()))?;

        let fragments = async_stream::stream! {
            while let Some(event) = events.next().await {
                match event {
                    Ok(response) => {
                        for choice in response.choices {
                            if let Some(content) = choice.delta.content {
                                if !content.is_empty() {
                                    yield Ok(content);
                                }
                            }
                        }
                    }
                    Err(e) => {
                        yield Err(PortError::Unexpected(e.to_string()));
                        break;
                    }
                }
            }
        };
        Ok(Box::pin(fragments))
    }
}

//=========================================================================================
// `TextGenerationService` Trait Implementation
//=========================================================================================

#[async_trait]
impl TextGenerationService for OpenAiTextAdapter {
    async fn infer_subject(&self, source_text: &str) -> PortResult<String> {
        let prompt = SUBJECT_TEMPLATE.replace("{source}", source_excerpt(source_text));
        let subject = self.complete(PROFESSOR_PERSONA, prompt, false).await?;
        Ok(subject.trim().to_string())
    }

    async fn summarize_for_image_context(&self, source_text: &str) -> PortResult<String> {
        let prompt = IMAGE_CONTEXT_TEMPLATE.replace("{source}", source_excerpt(source_text));
        let summary = self.complete(PROFESSOR_PERSONA, prompt, false).await?;
        debug!("Image context: {}", summary.trim());
        Ok(summary.trim().to_string())
    }

    async fn generate_outline(&self, source_text: &str, subject: &str) -> PortResult<Outline> {
        let start_time = Instant::now();
        let raw = self
            .complete(PROFESSOR_PERSONA, render_outline_prompt(source_text, subject), true)
            .await?;
        info!("⏱️ Outline request took: {:?}", start_time.elapsed());
        parse_outline(&raw)
    }

    async fn generate_section_text_stream(
        &self,
        request: &SectionRequest<'_>,
    ) -> PortResult<TextStream> {
        self.stream(PROFESSOR_PERSONA, render_section_prompt(request))
            .await
    }

    async fn generate_story_outline(
        &self,
        source_text: &str,
        style: &str,
    ) -> PortResult<StoryOutline> {
        let prompt = STORY_OUTLINE_TEMPLATE
            .replace("{style}", style)
            .replace("{source}", source_excerpt(source_text));
        let raw = self.complete(STORYTELLER_PERSONA, prompt, true).await?;
        parse_story_outline(&raw)
    }

    async fn generate_page_text_stream(
        &self,
        request: &PageRequest<'_>,
    ) -> PortResult<TextStream> {
        self.stream(STORYTELLER_PERSONA, render_page_prompt(request))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncation_respects_char_boundaries() {
        assert_eq!(truncate_chars("§§§§", 2), "§§");
        assert_eq!(truncate_chars("abc", 10), "abc");
        assert_eq!(tail_chars("abcdef", 2), "ef");
    }

    #[test]
    fn outline_prompt_embeds_at_most_the_source_limit() {
        let source = "x".repeat(SOURCE_CHAR_LIMIT + 500);
        let prompt = render_outline_prompt(&source, "Topological compilers");
        assert!(prompt.contains("**Chapter Subject:** Topological compilers"));
        assert!(prompt.contains(&"x".repeat(SOURCE_CHAR_LIMIT)));
        assert!(!prompt.contains(&"x".repeat(SOURCE_CHAR_LIMIT + 1)));
        assert!(prompt.contains("exactly 15 sections"));
    }

    #[test]
    fn section_prompt_names_the_section() {
        let request = SectionRequest {
            source_text: "facts",
            summary: "Introduces braid groups.",
            chapter_title: "Chapter 9: Braids",
            subject: "Topology",
            section_title: "Braid Groups",
            section_number: "§9.1",
        };
        let prompt = render_section_prompt(&request);
        assert!(prompt.contains("\"§9.1 Braid Groups\""));
        assert!(prompt.contains("\"Introduces braid groups.\""));
        assert!(!prompt.contains('{'));
    }

    #[test]
    fn page_prompt_carries_continuity() {
        let suggestions = vec!["The detective finds the qubit.".to_string()];
        let request = PageRequest {
            source_text: "facts",
            story_title: "The Lattice Voyage",
            style: "noir",
            chapter_title: "Cold Start",
            chapter_summary: "A case opens.",
            page_number: 2,
            suggestions: &suggestions,
            previous_page_text: Some("It was raining on the cryostat."),
        };
        let prompt = render_page_prompt(&request);
        assert!(prompt.contains("Write page 2 of this chapter."));
        assert!(prompt.contains("- The detective finds the qubit."));
        assert!(prompt.contains("It was raining on the cryostat."));

        let first = PageRequest {
            previous_page_text: None,
            suggestions: &[],
            ..request
        };
        assert!(!render_page_prompt(&first).contains("previous page"));
    }
}

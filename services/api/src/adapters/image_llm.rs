//! services/api/src/adapters/image_llm.rs
//!
//! This module contains the adapter for the image-generating model.
//! It implements the `ImageGenerationService` port. Image synthesis is best
//! effort: every failure is logged and reported to the pipeline as `None`.

const DIAGRAM_CONTEXT_CHARS: usize = 500;

const HEADER_TEMPLATE: &str = r#"Create a header illustration for a textbook chapter.
Chapter Title: "{title}"
Art Style: {style}, abstract, conceptual, scientific.
The image should be a sophisticated, abstract visualization of the core concepts, suitable for a university textbook.
Avoid: text, words, signature, watermark, cartoonish, photo, fantasy."#;

const DIAGRAM_TEMPLATE: &str = r#"Generate a technical diagram or abstract scientific illustration for a section of a computer science textbook.
The section's content is about: "{excerpt}".
The illustration should be clean, minimalist, and informative, like a figure in a scientific journal or textbook. It could be a flowchart, a conceptual graph, or an abstract representation of a process.
Avoid: ugly, blurry, deformed, watermark, text, signature, amateurish, fantasy, narrative scene."#;

const PAGE_TEMPLATE: &str = r#"Create an illustration for a page of a story told in the style of: {style}.
The page reads: "{excerpt}".
Depict the key moment of the page. Avoid: text, words, captions, signature, watermark."#;

use crate::adapters::text_llm::truncate_chars;
use async_openai::{
    config::OpenAIConfig,
    error::OpenAIError,
    types::images::{CreateImageRequestArgs, Image, ImageModel, ImageResponseFormat, ImageSize},
    Client,
};
use async_trait::async_trait;
use std::time::Instant;
use textbook_forge_core::ports::{ImageGenerationService, PortError, PortResult};
use tracing::{info, warn};

/// Maps a configured model name onto the client's model enum.
pub fn image_model(name: &str) -> ImageModel {
    match name {
        "dall-e-2" => ImageModel::DallE2,
        "dall-e-3" => ImageModel::DallE3,
        "gpt-image-1" => ImageModel::GptImage1,
        "gpt-image-1.5" => ImageModel::GptImage1dot5,
        "gpt-image-1-mini" => ImageModel::GptImage1Mini,
        other => ImageModel::Other(other.to_string()),
    }
}

/// Size and response format a model accepts. DALL-E 2 tops out at square
/// 1024px; the GPT image models always answer in base64 and reject
/// `response_format`.
pub fn request_shape(model: &ImageModel) -> (ImageSize, Option<ImageResponseFormat>) {
    match model {
        ImageModel::DallE2 => (ImageSize::S1024x1024, Some(ImageResponseFormat::B64Json)),
        ImageModel::GptImage1 | ImageModel::GptImage1dot5 | ImageModel::GptImage1Mini => {
            (ImageSize::S1536x1024, None)
        }
        ImageModel::Other(name) if name.starts_with("gpt-image") => (ImageSize::S1536x1024, None),
        _ => (ImageSize::S1792x1024, Some(ImageResponseFormat::B64Json)),
    }
}

/// Turns a generated image into something an `<img src>` can display.
pub fn image_source(image: &Image) -> String {
    match image {
        Image::Url { url, .. } => url.clone(),
        Image::B64Json { b64_json, .. } => format!("data:image/png;base64,{}", b64_json),
    }
}

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

#[derive(Clone)]
pub struct OpenAiImageAdapter {
    client: Client<OpenAIConfig>,
    model: String,
}

impl OpenAiImageAdapter {
    pub fn new(client: Client<OpenAIConfig>, model: String) -> Self {
        Self { client, model }
    }

    async fn generate(&self, prompt: String) -> PortResult<String> {
        let start_time = Instant::now();
        let model = image_model(&self.model);
        let (size, response_format) = request_shape(&model);
        let mut args = CreateImageRequestArgs::default();
        args.prompt(prompt).model(model).n(1).size(size);
        if let Some(format) = response_format {
            args.response_format(format);
        }
        let request = args
            .build()
            .map_err(|e| PortError::Unexpected(e.to_string()))?;

        let response = self
            .client
            .images()
            .generate(request)
            .await
            .map_err(|e: OpenAIError| PortError::Unexpected(e.to_string()))?;
        info!("⏱️ Image generation took: {:?}", start_time.elapsed());

        response
            .data
            .first()
            .map(|image| image_source(image))
            .ok_or_else(|| PortError::Unexpected("Image model returned no images.".to_string()))
    }

    /// Absorbs the failure of a best-effort image request.
    async fn best_effort(&self, what: &str, prompt: String) -> Option<String> {
        match self.generate(prompt).await {
            Ok(url) => Some(url),
            Err(e) => {
                warn!("{what} image generation failed: {e}");
                None
            }
        }
    }
}

//=========================================================================================
// `ImageGenerationService` Trait Implementation
//=========================================================================================

#[async_trait]
impl ImageGenerationService for OpenAiImageAdapter {
    async fn generate_header_image(&self, title: &str, style_context: &str) -> Option<String> {
        let prompt = HEADER_TEMPLATE
            .replace("{title}", title)
            .replace("{style}", style_context);
        self.best_effort("Header", prompt).await
    }

    async fn generate_diagram_image(&self, section_text: &str) -> Option<String> {
        let prompt = DIAGRAM_TEMPLATE.replace(
            "{excerpt}",
            truncate_chars(section_text, DIAGRAM_CONTEXT_CHARS),
        );
        self.best_effort("Diagram", prompt).await
    }

    async fn generate_page_image(&self, page_text: &str, style: &str) -> Option<String> {
        let prompt = PAGE_TEMPLATE
            .replace("{style}", style)
            .replace("{excerpt}", truncate_chars(page_text, DIAGRAM_CONTEXT_CHARS));
        self.best_effort("Page", prompt).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn base64_images_become_data_urls() {
        let image = Image::B64Json {
            b64_json: Arc::new("iVBORw0KGgo".to_string()),
            revised_prompt: None,
        };
        assert_eq!(image_source(&image), "data:image/png;base64,iVBORw0KGgo");

        let hosted = Image::Url {
            url: "https://images.example/1.png".to_string(),
            revised_prompt: None,
        };
        assert_eq!(image_source(&hosted), "https://images.example/1.png");
    }

    #[test]
    fn unknown_models_pass_through() {
        assert_eq!(image_model("dall-e-3"), ImageModel::DallE3);
        assert_eq!(
            image_model("imagen-3.0"),
            ImageModel::Other("imagen-3.0".to_string())
        );
    }

    #[test]
    fn request_shape_fits_each_model() {
        assert_eq!(
            request_shape(&ImageModel::DallE3),
            (ImageSize::S1792x1024, Some(ImageResponseFormat::B64Json))
        );
        assert_eq!(
            request_shape(&image_model("dall-e-2")),
            (ImageSize::S1024x1024, Some(ImageResponseFormat::B64Json))
        );
        for name in ["gpt-image-1", "gpt-image-1-mini", "gpt-image-2"] {
            assert_eq!(
                request_shape(&image_model(name)),
                (ImageSize::S1536x1024, None),
                "{name}"
            );
        }
    }

    #[test]
    fn gpt_image_requests_omit_response_format() {
        let (size, response_format) = request_shape(&ImageModel::GptImage1);
        let mut args = CreateImageRequestArgs::default();
        args.prompt("a lattice").model(ImageModel::GptImage1).size(size);
        if let Some(format) = response_format {
            args.response_format(format);
        }
        let body = serde_json::to_value(args.build().unwrap()).unwrap();
        assert!(body.get("response_format").is_none());
        assert_eq!(body["size"], "1536x1024");
    }

    #[test]
    fn diagram_prompt_uses_a_bounded_excerpt() {
        let text = "q".repeat(DIAGRAM_CONTEXT_CHARS * 2);
        let prompt = DIAGRAM_TEMPLATE.replace(
            "{excerpt}",
            truncate_chars(&text, DIAGRAM_CONTEXT_CHARS),
        );
        assert!(prompt.contains(&"q".repeat(DIAGRAM_CONTEXT_CHARS)));
        assert!(!prompt.contains(&"q".repeat(DIAGRAM_CONTEXT_CHARS + 1)));
    }
}

//! Notes extractor: page photo → `{Description, Images}` via structured output.
//!
//! One `generateContent` call per page, with the fixed system instruction,
//! `responseMimeType = application/json` and a response schema requiring
//! `Description`. The full raw response is returned; the model sometimes
//! still wraps its JSON in a code fence or splits it over several parts,
//! which is why locating the payload is left to
//! [`crate::pipeline::repair`].

use super::NotesExtractor;
use crate::error::GenerationError;
use crate::pipeline::encode::{encode_png, PNG_MIME};
use crate::prompts::NOTES_SYSTEM_PROMPT;
use async_trait::async_trait;
use gemini_rest::{
    Content, GeminiClient, GenerateContentRequest, GenerationConfig, Part, Schema, SchemaType,
    ThinkingConfig,
};
use std::collections::BTreeMap;
use tracing::debug;

/// [`NotesExtractor`] backed by a Gemini vision model.
#[derive(Debug, Clone)]
pub struct GeminiNotesExtractor {
    client: GeminiClient,
    model: String,
    system_prompt: String,
    thinking_budget: i32,
}

impl GeminiNotesExtractor {
    pub fn new(client: GeminiClient, model: impl Into<String>) -> Self {
        Self {
            client,
            model: model.into(),
            system_prompt: NOTES_SYSTEM_PROMPT.to_string(),
            thinking_budget: 30_000,
        }
    }

    pub fn system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = prompt.into();
        self
    }

    pub fn thinking_budget(mut self, budget: i32) -> Self {
        self.thinking_budget = budget;
        self
    }

    fn build_request(&self, png_base64: String) -> GenerateContentRequest {
        GenerateContentRequest {
            contents: vec![Content::user(vec![Part::inline(PNG_MIME, png_base64)])],
            system_instruction: Some(Content::system(self.system_prompt.as_str())),
            generation_config: Some(GenerationConfig {
                response_mime_type: Some("application/json".to_string()),
                response_schema: Some(note_page_schema()),
                thinking_config: Some(ThinkingConfig {
                    thinking_budget: self.thinking_budget,
                }),
                ..Default::default()
            }),
        }
    }
}

#[async_trait]
impl NotesExtractor for GeminiNotesExtractor {
    async fn extract(&self, image: &[u8]) -> Result<serde_json::Value, GenerationError> {
        let png = encode_png(image)?;
        let request = self.build_request(png);
        debug!("Extracting notes with {}", self.model);
        Ok(self.client.generate_content_raw(&self.model, &request).await?)
    }
}

/// `{Description: string (required), Images: [string]}`
pub fn note_page_schema() -> Schema {
    let mut properties = BTreeMap::new();
    properties.insert("Description".to_string(), Schema::of(SchemaType::String));
    properties.insert(
        "Images".to_string(),
        Schema::array_of(Schema::of(SchemaType::String)),
    );
    Schema {
        properties: Some(properties),
        required: Some(vec!["Description".to_string()]),
        ..Schema::of(SchemaType::Object)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn schema_matches_note_page_shape() {
        let v = serde_json::to_value(note_page_schema()).unwrap();
        assert_eq!(
            v,
            json!({
                "type": "OBJECT",
                "required": ["Description"],
                "properties": {
                    "Description": {"type": "STRING"},
                    "Images": {"type": "ARRAY", "items": {"type": "STRING"}}
                }
            })
        );
    }

    #[test]
    fn request_carries_prompt_image_and_json_mode() {
        let client = GeminiClient::new("k").unwrap();
        let extractor = GeminiNotesExtractor::new(client, "gemini-2.5-pro")
            .system_prompt("custom")
            .thinking_budget(128);
        let v = serde_json::to_value(extractor.build_request("QUJD".into())).unwrap();
        assert_eq!(v["systemInstruction"]["parts"][0]["text"], "custom");
        assert_eq!(v["contents"][0]["parts"][0]["inlineData"]["mimeType"], "image/png");
        assert_eq!(v["contents"][0]["parts"][0]["inlineData"]["data"], "QUJD");
        assert_eq!(v["generationConfig"]["responseMimeType"], "application/json");
        assert_eq!(v["generationConfig"]["thinkingConfig"]["thinkingBudget"], 128);
    }
}

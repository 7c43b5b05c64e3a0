//! Image requester: text prompt → streamed image → file.
//!
//! The image model answers over `streamGenerateContent` with a mix of text
//! chunks (commentary) and inline-data chunks (the image). Text is logged;
//! the first image payload is written to disk and its path returned.

use super::{write_atomic, ImageGenerator};
use crate::error::GenerationError;
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use futures::{Stream, StreamExt};
use gemini_rest::{
    Content, GeminiClient, GeminiError, GenerateContentRequest, GenerateContentResponse,
    GenerationConfig, Modality, Part,
};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, info};

/// [`ImageGenerator`] backed by a Gemini image model.
#[derive(Debug, Clone)]
pub struct GeminiImageGenerator {
    client: GeminiClient,
    model: String,
}

impl GeminiImageGenerator {
    pub fn new(client: GeminiClient, model: impl Into<String>) -> Self {
        Self {
            client,
            model: model.into(),
        }
    }

    fn build_request(prompt: &str) -> GenerateContentRequest {
        GenerateContentRequest {
            contents: vec![Content::user(vec![Part::text(prompt)])],
            system_instruction: None,
            generation_config: Some(GenerationConfig {
                response_modalities: Some(vec![Modality::Image, Modality::Text]),
                ..Default::default()
            }),
        }
    }
}

#[async_trait]
impl ImageGenerator for GeminiImageGenerator {
    async fn generate(
        &self,
        prompt: &str,
        output: Option<&Path>,
    ) -> Result<Option<PathBuf>, GenerationError> {
        let request = Self::build_request(prompt);
        let chunks = self
            .client
            .stream_generate_content(&self.model, &request)
            .await?;

        save_first_image(chunks, output, &self.model).await
    }
}

/// Drain a streamed response, writing the first inline payload to `output`
/// (or a generated name) and logging text chunks.
///
/// Chunks without parts are skipped. Returns `None` when no image arrived.
pub(crate) async fn save_first_image<S>(
    mut chunks: S,
    output: Option<&Path>,
    model: &str,
) -> Result<Option<PathBuf>, GenerationError>
where
    S: Stream<Item = Result<GenerateContentResponse, GeminiError>> + Unpin,
{
    let mut saved: Option<PathBuf> = None;
    while let Some(chunk) = chunks.next().await {
        let chunk = chunk?;
        let Some(part) = chunk.first_parts().first() else {
            continue;
        };

        match part.inline_data {
            Some(ref blob) if !blob.data.is_empty() => {
                if saved.is_some() {
                    debug!("Ignoring additional {} payload", blob.mime_type);
                    continue;
                }
                let bytes = STANDARD.decode(&blob.data).map_err(|e| {
                    GenerationError::InvalidResponse(format!("image data is not base64: {e}"))
                })?;
                let path = match output {
                    Some(p) => p.to_path_buf(),
                    None => default_file_name(&blob.mime_type),
                };
                write_atomic(&path, &bytes).await?;
                info!("Image saved to {}", path.display());
                saved = Some(path);
            }
            _ => {
                let text = chunk.text();
                if !text.trim().is_empty() {
                    info!("{}: {}", model, text.trim());
                }
            }
        }
    }

    Ok(saved)
}

/// File extension (with dot) for an image MIME type.
pub fn extension_for_mime(mime_type: &str) -> &'static str {
    let essence = mime_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();
    match essence.as_str() {
        "image/png" => ".png",
        "image/jpeg" | "image/jpg" => ".jpg",
        "image/webp" => ".webp",
        "image/gif" => ".gif",
        "image/bmp" => ".bmp",
        _ => ".bin",
    }
}

/// `generated_image_<unix-millis><ext>` in the working directory.
fn default_file_name(mime_type: &str) -> PathBuf {
    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or_default();
    PathBuf::from(format!(
        "generated_image_{}{}",
        millis,
        extension_for_mime(mime_type)
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extension_inferred_from_mime() {
        assert_eq!(extension_for_mime("image/png"), ".png");
        assert_eq!(extension_for_mime("IMAGE/JPEG"), ".jpg");
        assert_eq!(extension_for_mime("image/webp; q=1"), ".webp");
        assert_eq!(extension_for_mime("application/octet-stream"), ".bin");
    }

    #[test]
    fn default_name_carries_extension() {
        let p = default_file_name("image/png");
        let name = p.to_string_lossy();
        assert!(name.starts_with("generated_image_"));
        assert!(name.ends_with(".png"));
    }

    #[test]
    fn request_asks_for_image_and_text() {
        let req = GeminiImageGenerator::build_request("a sunset");
        let v = serde_json::to_value(&req).unwrap();
        assert_eq!(v["contents"][0]["parts"][0]["text"], "a sunset");
        assert_eq!(
            v["generationConfig"]["responseModalities"],
            serde_json::json!(["IMAGE", "TEXT"])
        );
    }

    fn chunk(part: serde_json::Value) -> Result<GenerateContentResponse, GeminiError> {
        let v = serde_json::json!({
            "candidates": [{"content": {"role": "model", "parts": [part]}}]
        });
        Ok(serde_json::from_value(v).unwrap())
    }

    fn image_chunk(bytes: &[u8]) -> Result<GenerateContentResponse, GeminiError> {
        chunk(serde_json::json!({
            "inlineData": {"mimeType": "image/png", "data": STANDARD.encode(bytes)}
        }))
    }

    #[tokio::test]
    async fn first_image_written_later_ones_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("figure.png");
        let chunks = futures::stream::iter(vec![
            Ok(GenerateContentResponse::default()),
            chunk(serde_json::json!({"text": "Here is your figure."})),
            image_chunk(b"first"),
            image_chunk(b"second"),
        ]);

        let saved = save_first_image(chunks, Some(&out), "image-model")
            .await
            .unwrap();
        assert_eq!(saved.as_deref(), Some(out.as_path()));
        assert_eq!(std::fs::read(&out).unwrap(), b"first");
    }

    #[tokio::test]
    async fn text_only_stream_yields_none() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("figure.png");
        let chunks = futures::stream::iter(vec![
            chunk(serde_json::json!({"text": "I cannot draw that."})),
            Ok(GenerateContentResponse::default()),
        ]);

        let saved = save_first_image(chunks, Some(&out), "image-model")
            .await
            .unwrap();
        assert!(saved.is_none());
        assert!(!out.exists());
    }

    #[tokio::test]
    async fn empty_stream_yields_none() {
        let chunks = futures::stream::empty::<Result<GenerateContentResponse, GeminiError>>();
        let saved = save_first_image(chunks, None, "image-model").await.unwrap();
        assert!(saved.is_none());
    }

    #[tokio::test]
    async fn undecodable_image_data_is_invalid_response() {
        let chunks = futures::stream::iter(vec![chunk(
            serde_json::json!({"inlineData": {"mimeType": "image/png", "data": "not base64!"}}),
        )]);
        let err = save_first_image(chunks, None, "image-model")
            .await
            .unwrap_err();
        assert!(matches!(err, GenerationError::InvalidResponse(_)));
    }
}

//! Requesters for the generative services.
//!
//! Each service sits behind a small async trait so the pipelines can be
//! driven by the Gemini implementations in production and by in-process
//! fakes in tests:
//!
//! | Trait | Gemini implementation | Output |
//! |-------|-----------------------|--------|
//! | [`ImageGenerator`]    | [`images::GeminiImageGenerator`]    | image file |
//! | [`NotesExtractor`]    | [`extract::GeminiNotesExtractor`]  | raw response JSON |
//! | [`SpeechSynthesizer`] | [`speech::GeminiSpeechSynthesizer`] | WAV file |
//!
//! Requesters never retry and never swallow errors: a failed call comes back
//! as `Err(GenerationError)` and the calling pipeline decides what to do.

pub mod extract;
pub mod images;
pub mod speech;

use crate::config::PipelineConfig;
use crate::error::{GenerationError, NotesmithError};
use async_trait::async_trait;
use gemini_rest::GeminiClient;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

pub use self::extract::GeminiNotesExtractor;
pub use self::images::GeminiImageGenerator;
pub use self::speech::GeminiSpeechSynthesizer;

/// Turns a text prompt into an image file.
#[async_trait]
pub trait ImageGenerator: Send + Sync {
    /// Generate an image for `prompt` and write it to `output` (or a
    /// generated name when `None`).
    ///
    /// Returns `Ok(None)` when the service answered without image data.
    async fn generate(
        &self,
        prompt: &str,
        output: Option<&Path>,
    ) -> Result<Option<PathBuf>, GenerationError>;
}

/// Turns narration text into an audio file.
#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    /// Returns `Ok(None)` when the service answered without audio data.
    async fn synthesize(&self, text: &str, output: &Path)
        -> Result<Option<PathBuf>, GenerationError>;
}

/// Sends one note-page image to a structured-output service.
#[async_trait]
pub trait NotesExtractor: Send + Sync {
    /// Returns the service's full raw response; locating the
    /// `{Description, Images}` payload inside it is the caller's job
    /// (see [`crate::pipeline::repair`]).
    async fn extract(&self, image: &[u8]) -> Result<serde_json::Value, GenerationError>;
}

// ── Resolution ───────────────────────────────────────────────────────────

/// Build a Gemini client from the configured key and base URL.
pub fn gemini_client(config: &PipelineConfig) -> Result<GeminiClient, NotesmithError> {
    let key = config
        .api_key
        .as_deref()
        .ok_or_else(|| NotesmithError::ProviderNotConfigured {
            provider: "gemini".to_string(),
            hint: format!(
                "No API key configured.\nSet {} (or put it in .env), or pass --api-key.",
                crate::config::API_KEY_ENV
            ),
        })?;
    let client = GeminiClient::new(key).map_err(|e| NotesmithError::ProviderNotConfigured {
        provider: "gemini".to_string(),
        hint: e.to_string(),
    })?;
    Ok(match config.api_base_url {
        Some(ref url) => client.with_base_url(url.as_str()),
        None => client,
    })
}

/// The injected generator if any, else a Gemini one.
pub fn resolve_image_generator(
    config: &PipelineConfig,
) -> Result<Arc<dyn ImageGenerator>, NotesmithError> {
    if let Some(ref g) = config.image_generator {
        return Ok(Arc::clone(g));
    }
    Ok(Arc::new(GeminiImageGenerator::new(
        gemini_client(config)?,
        &config.image_model,
    )))
}

/// The injected synthesizer if any, else a Gemini one.
pub fn resolve_speech_synthesizer(
    config: &PipelineConfig,
) -> Result<Arc<dyn SpeechSynthesizer>, NotesmithError> {
    if let Some(ref s) = config.speech_synthesizer {
        return Ok(Arc::clone(s));
    }
    Ok(Arc::new(GeminiSpeechSynthesizer::new(
        gemini_client(config)?,
        &config.tts_model,
        &config.voice,
    )))
}

/// The injected extractor if any, else a Gemini one.
pub fn resolve_notes_extractor(
    config: &PipelineConfig,
) -> Result<Arc<dyn NotesExtractor>, NotesmithError> {
    if let Some(ref e) = config.notes_extractor {
        return Ok(Arc::clone(e));
    }
    let mut extractor =
        GeminiNotesExtractor::new(gemini_client(config)?, &config.extraction_model)
            .thinking_budget(config.thinking_budget);
    if let Some(ref prompt) = config.system_prompt {
        extractor = extractor.system_prompt(prompt.as_str());
    }
    Ok(Arc::new(extractor))
}

// ── Shared helpers ───────────────────────────────────────────────────────

/// Write `bytes` to `path` via a sibling temp file and rename, creating
/// parent directories as needed.
///
/// The pipelines treat an existing asset as finished, so a half-written file
/// must never appear under the final name.
pub(crate) async fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), GenerationError> {
    let to_err = |source| GenerationError::Write {
        path: path.to_path_buf(),
        source,
    };
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await.map_err(to_err)?;
    }
    let mut tmp_name = path.file_name().unwrap_or_default().to_os_string();
    tmp_name.push(".part");
    let tmp = path.with_file_name(tmp_name);
    tokio::fs::write(&tmp, bytes).await.map_err(to_err)?;
    tokio::fs::rename(&tmp, path).await.map_err(to_err)?;
    debug!("Wrote {} bytes to {}", bytes.len(), path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_key_is_provider_not_configured() {
        let config = PipelineConfig::default();
        let err = gemini_client(&config).unwrap_err();
        assert!(matches!(err, NotesmithError::ProviderNotConfigured { .. }));
        assert!(err.to_string().contains("GEMINI_API_KEY"));
    }

    #[test]
    fn base_url_override_applied() {
        let config = PipelineConfig::builder()
            .api_key("k")
            .api_base_url("http://127.0.0.1:9/v1beta")
            .build()
            .unwrap();
        let client = gemini_client(&config).unwrap();
        assert_eq!(client.base_url(), "http://127.0.0.1:9/v1beta");
    }

    #[tokio::test]
    async fn write_atomic_creates_parents_and_leaves_no_temp() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/deeper/out.bin");
        write_atomic(&path, b"payload").await.unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), b"payload");
        assert!(!dir.path().join("nested/deeper/out.bin.part").exists());
    }
}

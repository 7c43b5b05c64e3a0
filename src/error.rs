//! Error types for the notesmith library.
//!
//! The same split as every long-running batch tool: most failures are local
//! to one unit of work and must not sink the whole run.
//!
//! * [`NotesmithError`] — **Fatal**: the operation cannot produce its output
//!   (script unreadable, no sections, zero clips built, no credentials).
//!   Returned as `Err(NotesmithError)` from the top-level entry points.
//!
//! * [`SectionError`] — **Non-fatal**: a single video section failed
//!   (missing field, generation error, clip build error). Stored in
//!   [`crate::output::SectionAssets`]; the section is left out of the video.
//!
//! * [`GenerationError`] — a call to a generative service failed. Leaf
//!   requesters propagate it untouched; the pipeline decides whether it is
//!   fatal.
//!
//! * [`MediaError`] — ffmpeg / ffprobe / WAV handling failed.

use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the notesmith library.
#[derive(Debug, Error)]
pub enum NotesmithError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// A required directory does not exist.
    #[error("Directory '{path}' not found")]
    DirectoryNotFound { path: PathBuf },

    /// The section script could not be read from disk.
    #[error("Failed to read script '{path}': {source}")]
    ScriptRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The section script is not valid JSON of the expected shape.
    #[error("Failed to parse script '{path}': {source}")]
    ScriptParse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// The script parsed but contains no sections.
    #[error("No sections found in '{path}'")]
    NoSections { path: PathBuf },

    /// A source file could not be read.
    #[error("Failed to read '{path}': {source}")]
    ReadFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Pipeline errors ───────────────────────────────────────────────────
    /// Every section failed; there is nothing to put in the video.
    #[error("No video clips were created successfully ({failed} of {total} sections failed)")]
    NoClipsBuilt { total: usize, failed: usize },

    /// The generative service cannot be used (missing API key etc.).
    #[error("Generation provider '{provider}' is not configured.\n{hint}")]
    ProviderNotConfigured { provider: String, hint: String },

    /// Final concatenation or another whole-video media step failed.
    #[error("Media processing failed: {0}")]
    Media(#[from] MediaError),

    // ── I/O errors ────────────────────────────────────────────────────────
    /// Could not create or write an output file or directory.
    #[error("Failed to write output '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error (task panicked etc.).
    #[error("Internal error: {0}")]
    Internal(String),
}

/// A non-fatal failure of one video section.
#[derive(Debug, Clone, Error, PartialEq, serde::Serialize, serde::Deserialize)]
pub enum SectionError {
    /// `content` or `image_description` was empty or absent.
    #[error("Section {index}: missing image_description or content")]
    MissingFields { index: usize },

    /// The image asset could not be produced.
    #[error("Section {index}: image generation failed: {detail}")]
    ImageFailed { index: usize, detail: String },

    /// The narration asset could not be produced.
    #[error("Section {index}: audio generation failed: {detail}")]
    AudioFailed { index: usize, detail: String },

    /// Both assets exist but the clip could not be encoded.
    #[error("Section {index}: clip creation failed: {detail}")]
    ClipFailed { index: usize, detail: String },
}

impl SectionError {
    pub fn index(&self) -> usize {
        match self {
            SectionError::MissingFields { index }
            | SectionError::ImageFailed { index, .. }
            | SectionError::AudioFailed { index, .. }
            | SectionError::ClipFailed { index, .. } => *index,
        }
    }
}

/// Failure of a call to a generative service.
#[derive(Debug, Error)]
pub enum GenerationError {
    #[error(transparent)]
    Api(#[from] gemini_rest::GeminiError),

    /// The service answered, but with something we cannot use.
    #[error("Unexpected response: {0}")]
    InvalidResponse(String),

    /// The source image could not be decoded or re-encoded.
    #[error("Image encoding failed: {0}")]
    Encode(#[from] image::ImageError),

    /// The generated payload could not be written to disk.
    #[error("Failed to write '{path}': {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Used by non-Gemini implementations of the generator traits.
    #[error("{0}")]
    Other(String),
}

/// The repair ladder could not find a `{Description, Images}` object in a
/// service response.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum RepairError {
    #[error("response has no candidate text parts")]
    NoText,

    #[error("JSON parse error: {0}")]
    Parse(String),

    #[error("payload is not a note-page object: {0}")]
    Shape(String),
}

/// ffmpeg / ffprobe / WAV failures.
#[derive(Debug, Error)]
pub enum MediaError {
    #[error("ffprobe/ffmpeg binary not found: {0}")]
    NotFound(std::io::Error),

    #[error("ffprobe/ffmpeg execution failed (exit code {exit_code:?}): {stderr}")]
    ExecutionFailed {
        exit_code: Option<i32>,
        stderr: String,
    },

    #[error("failed to parse ffprobe output: {0}")]
    ParseError(String),

    #[error("WAV error: {0}")]
    Wav(#[from] hound::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("media file not found: {0}")]
    FileNotFound(PathBuf),

    #[error("no clips to concatenate")]
    NoClips,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_clips_display() {
        let e = NotesmithError::NoClipsBuilt { total: 3, failed: 3 };
        let msg = e.to_string();
        assert!(msg.contains("No video clips"), "got: {msg}");
        assert!(msg.contains("3 of 3"), "got: {msg}");
    }

    #[test]
    fn section_error_index() {
        let e = SectionError::AudioFailed {
            index: 4,
            detail: "quota".into(),
        };
        assert_eq!(e.index(), 4);
        assert!(e.to_string().contains("Section 4"));
        assert!(e.to_string().contains("quota"));
    }

    #[test]
    fn provider_not_configured_display() {
        let e = NotesmithError::ProviderNotConfigured {
            provider: "gemini".into(),
            hint: "Set GEMINI_API_KEY".into(),
        };
        assert!(e.to_string().contains("gemini"));
        assert!(e.to_string().contains("GEMINI_API_KEY"));
    }

    #[test]
    fn media_error_converts() {
        let e: NotesmithError = MediaError::NoClips.into();
        assert!(e.to_string().contains("no clips"));
    }
}

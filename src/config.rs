//! Configuration for the notes pipelines.
//!
//! [`PipelineConfig`] carries everything the service-backed stages need:
//! credentials, model ids, concurrency widths, video encoding parameters and
//! optional pre-built service implementations. It is passed explicitly to
//! every entry point; no leaf function reads the process environment.
//! [`PipelineConfigBuilder::api_key_from_env`] is the one place that does.
//!
//! [`MarkdownConfig`] configures the markdown aggregator, which talks to no
//! service and needs no credentials.

use crate::error::NotesmithError;
use crate::generate::{ImageGenerator, NotesExtractor, SpeechSynthesizer};
use crate::pipeline::media::VideoEncoder;
use crate::progress::ProgressCallback;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::RangeInclusive;
use std::path::PathBuf;
use std::sync::Arc;

/// Environment variable holding the Gemini API key.
pub const API_KEY_ENV: &str = "GEMINI_API_KEY";

/// Configuration shared by the digitisation and video pipelines.
///
/// Built via [`PipelineConfig::builder()`] or [`PipelineConfig::default()`].
///
/// # Example
/// ```rust
/// use notesmith::PipelineConfig;
///
/// let config = PipelineConfig::builder()
///     .api_key("test-key")
///     .section_concurrency(6)
///     .voice("Puck")
///     .build()
///     .unwrap();
/// assert_eq!(config.section_concurrency, 6);
/// ```
#[derive(Clone)]
pub struct PipelineConfig {
    /// Gemini API key. Required unless every service is injected.
    pub api_key: Option<String>,

    /// Override the Gemini API root (proxies, test servers).
    pub api_base_url: Option<String>,

    /// Model for section and figure images. Default: `gemini-2.5-flash-image`.
    pub image_model: String,

    /// Model for note-page extraction. Default: `gemini-2.5-pro`.
    pub extraction_model: String,

    /// Model for narration. Default: `gemini-2.5-flash-preview-tts`.
    pub tts_model: String,

    /// Prebuilt TTS voice name. Default: `Kore`.
    pub voice: String,

    /// Thinking budget for the extraction call. Default: 30000.
    ///
    /// Extraction asks the model to explain, not only transcribe; a large
    /// budget noticeably improves the explanations on dense pages.
    pub thinking_budget: i32,

    /// Custom extraction system prompt. If None, uses
    /// [`crate::prompts::NOTES_SYSTEM_PROMPT`].
    pub system_prompt: Option<String>,

    /// Sections processed at once within one document. Default: 4.
    ///
    /// Each section itself runs its image and audio requests together, so
    /// the number of in-flight service calls is up to twice this value.
    pub section_concurrency: usize,

    /// Documents processed at once in a multi-document run. Default: 2.
    pub document_concurrency: usize,

    /// Script numbers considered by the multi-document run. Default: 1..=8.
    pub script_range: RangeInclusive<u32>,

    /// Video encoding parameters.
    pub video: VideoSettings,

    /// Pre-constructed image generator. Takes precedence over Gemini.
    pub image_generator: Option<Arc<dyn ImageGenerator>>,

    /// Pre-constructed speech synthesizer. Takes precedence over Gemini.
    pub speech_synthesizer: Option<Arc<dyn SpeechSynthesizer>>,

    /// Pre-constructed notes extractor. Takes precedence over Gemini.
    pub notes_extractor: Option<Arc<dyn NotesExtractor>>,

    /// Pre-constructed video encoder. Takes precedence over ffmpeg.
    pub video_encoder: Option<Arc<dyn VideoEncoder>>,

    /// Optional per-item progress events.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            api_base_url: None,
            image_model: "gemini-2.5-flash-image".to_string(),
            extraction_model: "gemini-2.5-pro".to_string(),
            tts_model: "gemini-2.5-flash-preview-tts".to_string(),
            voice: "Kore".to_string(),
            thinking_budget: 30_000,
            system_prompt: None,
            section_concurrency: 4,
            document_concurrency: 2,
            script_range: 1..=8,
            video: VideoSettings::default(),
            image_generator: None,
            speech_synthesizer: None,
            notes_extractor: None,
            video_encoder: None,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for PipelineConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipelineConfig")
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("api_base_url", &self.api_base_url)
            .field("image_model", &self.image_model)
            .field("extraction_model", &self.extraction_model)
            .field("tts_model", &self.tts_model)
            .field("voice", &self.voice)
            .field("thinking_budget", &self.thinking_budget)
            .field("section_concurrency", &self.section_concurrency)
            .field("document_concurrency", &self.document_concurrency)
            .field("script_range", &self.script_range)
            .field("video", &self.video)
            .field(
                "image_generator",
                &self.image_generator.as_ref().map(|_| "<dyn ImageGenerator>"),
            )
            .field(
                "speech_synthesizer",
                &self.speech_synthesizer.as_ref().map(|_| "<dyn SpeechSynthesizer>"),
            )
            .field(
                "notes_extractor",
                &self.notes_extractor.as_ref().map(|_| "<dyn NotesExtractor>"),
            )
            .field("video_encoder", &self.video_encoder.as_ref().map(|_| "<dyn VideoEncoder>"))
            .finish()
    }
}

impl PipelineConfig {
    /// Create a new builder for `PipelineConfig`.
    pub fn builder() -> PipelineConfigBuilder {
        PipelineConfigBuilder {
            config: Self::default(),
        }
    }

    /// Defaults plus the API key from `GEMINI_API_KEY` (loading `.env` first).
    pub fn from_env() -> Result<Self, NotesmithError> {
        Self::builder().api_key_from_env().build()
    }
}

/// Builder for [`PipelineConfig`].
#[derive(Debug)]
pub struct PipelineConfigBuilder {
    config: PipelineConfig,
}

impl PipelineConfigBuilder {
    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.config.api_key = Some(key.into());
        self
    }

    /// Load `.env` from the working directory (if any, overriding existing
    /// variables) and read [`API_KEY_ENV`]. Leaves the key unset when absent.
    pub fn api_key_from_env(mut self) -> Self {
        dotenvy::dotenv_override().ok();
        if let Ok(key) = std::env::var(API_KEY_ENV) {
            if !key.trim().is_empty() {
                self.config.api_key = Some(key);
            }
        }
        self
    }

    pub fn api_base_url(mut self, url: impl Into<String>) -> Self {
        self.config.api_base_url = Some(url.into());
        self
    }

    pub fn image_model(mut self, model: impl Into<String>) -> Self {
        self.config.image_model = model.into();
        self
    }

    pub fn extraction_model(mut self, model: impl Into<String>) -> Self {
        self.config.extraction_model = model.into();
        self
    }

    pub fn tts_model(mut self, model: impl Into<String>) -> Self {
        self.config.tts_model = model.into();
        self
    }

    pub fn voice(mut self, voice: impl Into<String>) -> Self {
        self.config.voice = voice.into();
        self
    }

    pub fn thinking_budget(mut self, budget: i32) -> Self {
        self.config.thinking_budget = budget.max(0);
        self
    }

    pub fn system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.config.system_prompt = Some(prompt.into());
        self
    }

    pub fn section_concurrency(mut self, n: usize) -> Self {
        self.config.section_concurrency = n.max(1);
        self
    }

    pub fn document_concurrency(mut self, n: usize) -> Self {
        self.config.document_concurrency = n.max(1);
        self
    }

    pub fn script_range(mut self, range: RangeInclusive<u32>) -> Self {
        self.config.script_range = range;
        self
    }

    pub fn video(mut self, video: VideoSettings) -> Self {
        self.config.video = video;
        self
    }

    pub fn image_generator(mut self, generator: Arc<dyn ImageGenerator>) -> Self {
        self.config.image_generator = Some(generator);
        self
    }

    pub fn speech_synthesizer(mut self, synthesizer: Arc<dyn SpeechSynthesizer>) -> Self {
        self.config.speech_synthesizer = Some(synthesizer);
        self
    }

    pub fn notes_extractor(mut self, extractor: Arc<dyn NotesExtractor>) -> Self {
        self.config.notes_extractor = Some(extractor);
        self
    }

    pub fn video_encoder(mut self, encoder: Arc<dyn VideoEncoder>) -> Self {
        self.config.video_encoder = Some(encoder);
        self
    }

    pub fn progress_callback(mut self, callback: ProgressCallback) -> Self {
        self.config.progress_callback = Some(callback);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<PipelineConfig, NotesmithError> {
        let c = &self.config;
        if c.section_concurrency == 0 || c.document_concurrency == 0 {
            return Err(NotesmithError::InvalidConfig(
                "Concurrency must be ≥ 1".into(),
            ));
        }
        if c.script_range.is_empty() {
            return Err(NotesmithError::InvalidConfig(format!(
                "Script range {}..={} is empty",
                c.script_range.start(),
                c.script_range.end()
            )));
        }
        c.video.validate()?;
        Ok(self.config)
    }
}

// ── Video settings ───────────────────────────────────────────────────────

/// Parameters for clip encoding and concatenation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoSettings {
    /// Output frame rate. Default: 24.
    pub fps: u32,

    /// Output frame width in pixels. Default: 1280.
    ///
    /// Every clip is scaled and letterboxed to the same frame so the
    /// concat demuxer can join them without re-encoding.
    pub width: u32,

    /// Output frame height in pixels. Default: 720.
    pub height: u32,

    /// Default: `libx264`.
    pub video_codec: String,

    /// Default: `aac`.
    pub audio_codec: String,

    /// ffmpeg executable. Default: `ffmpeg` (looked up on `PATH`).
    pub ffmpeg: PathBuf,

    /// ffprobe executable. Default: `ffprobe`.
    pub ffprobe: PathBuf,

    /// File name of the final video inside the output directory.
    pub output_name: String,
}

impl Default for VideoSettings {
    fn default() -> Self {
        Self {
            fps: 24,
            width: 1280,
            height: 720,
            video_codec: "libx264".to_string(),
            audio_codec: "aac".to_string(),
            ffmpeg: PathBuf::from("ffmpeg"),
            ffprobe: PathBuf::from("ffprobe"),
            output_name: "final_video.mp4".to_string(),
        }
    }
}

impl VideoSettings {
    fn validate(&self) -> Result<(), NotesmithError> {
        if self.fps == 0 {
            return Err(NotesmithError::InvalidConfig("fps must be ≥ 1".into()));
        }
        // yuv420p needs even dimensions.
        if self.width == 0 || self.height == 0 || self.width % 2 != 0 || self.height % 2 != 0 {
            return Err(NotesmithError::InvalidConfig(format!(
                "Frame size must be non-zero and even, got {}x{}",
                self.width, self.height
            )));
        }
        if self.output_name.trim().is_empty() {
            return Err(NotesmithError::InvalidConfig(
                "Video output name is empty".into(),
            ));
        }
        Ok(())
    }
}

// ── Markdown aggregation ─────────────────────────────────────────────────

/// Configuration for [`crate::markdown`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarkdownConfig {
    /// Folder holding `0.md`, `1.md`, ... Default: `bmsp`.
    pub input_dir: PathBuf,

    /// First file number (inclusive). Default: 0.
    pub first: u32,

    /// Last file number (inclusive). Default: 17.
    pub last: u32,

    /// Combined markdown file. Default: `bmsp/combined_notes.md`.
    pub output_file: PathBuf,

    /// Rendered PDF. Default: `bmsp/combined_notes.pdf`.
    pub pdf_file: PathBuf,

    /// `width` attribute of rewritten `<img>` tags. Default: 400.
    pub image_width: u32,

    /// HTML → PDF renderer invocation.
    pub renderer: RendererCommand,
}

impl Default for MarkdownConfig {
    fn default() -> Self {
        Self {
            input_dir: PathBuf::from("bmsp"),
            first: 0,
            last: 17,
            output_file: PathBuf::from("bmsp/combined_notes.md"),
            pdf_file: PathBuf::from("bmsp/combined_notes.pdf"),
            image_width: 400,
            renderer: RendererCommand::default(),
        }
    }
}

/// External HTML → PDF command. Invoked as `program args... <html> <pdf>`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RendererCommand {
    pub program: PathBuf,
    pub args: Vec<String>,
}

impl Default for RendererCommand {
    fn default() -> Self {
        Self {
            program: PathBuf::from("wkhtmltopdf"),
            args: vec![
                "--enable-local-file-access".to_string(),
                "--quiet".to_string(),
                "--encoding".to_string(),
                "utf-8".to_string(),
            ],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let c = PipelineConfig::default();
        assert_eq!(c.section_concurrency, 4);
        assert_eq!(c.document_concurrency, 2);
        assert_eq!(c.script_range, 1..=8);
        assert_eq!(c.video.fps, 24);
        assert_eq!(c.video.output_name, "final_video.mp4");
        assert_eq!(c.image_model, "gemini-2.5-flash-image");
    }

    #[test]
    fn builder_clamps_concurrency() {
        let c = PipelineConfig::builder()
            .section_concurrency(0)
            .document_concurrency(0)
            .build()
            .unwrap();
        assert_eq!(c.section_concurrency, 1);
        assert_eq!(c.document_concurrency, 1);
    }

    #[test]
    fn odd_frame_size_rejected() {
        let video = VideoSettings {
            width: 1279,
            ..VideoSettings::default()
        };
        let err = PipelineConfig::builder().video(video).build().unwrap_err();
        assert!(err.to_string().contains("even"), "got: {err}");
    }

    #[test]
    #[allow(clippy::reversed_empty_ranges)]
    fn empty_script_range_rejected() {
        let err = PipelineConfig::builder()
            .script_range(5..=2)
            .build()
            .unwrap_err();
        assert!(matches!(err, NotesmithError::InvalidConfig(_)));
    }

    #[test]
    fn debug_redacts_api_key() {
        let c = PipelineConfig::builder().api_key("sk-secret").build().unwrap();
        let dbg = format!("{c:?}");
        assert!(!dbg.contains("sk-secret"));
        assert!(dbg.contains("<redacted>"));
    }

    #[test]
    fn markdown_defaults() {
        let m = MarkdownConfig::default();
        assert_eq!((m.first, m.last), (0, 17));
        assert_eq!(m.image_width, 400);
        assert_eq!(m.renderer.program, PathBuf::from("wkhtmltopdf"));
    }
}

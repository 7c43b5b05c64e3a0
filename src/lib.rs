//! # notesmith
//!
//! Turn photographed lecture notes into study documents and narrated videos
//! using Gemini image, vision and speech models.
//!
//! ## Pipelines
//!
//! ```text
//! page photos ─▶ digitize ─▶ <folder>/<folder>.json      (descriptions + figure prompts)
//!
//! section script ─▶ video ─▶ images/ + audio/ ─▶ clips ─▶ final_video.mp4
//!
//! 0.md … 17.md ─▶ markdown ─▶ combined_notes.md ─▶ combined_notes.pdf
//! ```
//!
//! * [`digitize`] — one structured-extraction call per page photo, JSON
//!   repair, one aggregate per folder.
//! * [`video`] — per-section image and narration generation (concurrent,
//!   resumable), then ffmpeg clip assembly in section order.
//! * [`markdown`] — link rewriting, concatenation and PDF rendering. Needs
//!   no credentials.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use notesmith::{generate_video_from_json, PipelineConfig};
//! use std::path::Path;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // GEMINI_API_KEY from the environment or .env
//!     let config = PipelineConfig::from_env()?;
//!     let video = generate_video_from_json(
//!         Path::new("vlsi/video/1.json"),
//!         Path::new("vlsi/video/output_1"),
//!         &config,
//!     )
//!     .await?;
//!     println!("{}", video.display());
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `notesmith` binary (clap + anyhow + tracing-subscriber + indicatif) |
//!
//! ```toml
//! notesmith = { version = "0.1", default-features = false }
//! ```
//!
//! ## External Tools
//!
//! Video assembly needs `ffmpeg` and `ffprobe`; PDF rendering needs
//! `wkhtmltopdf` (or any command taking `<html> <pdf>`, see
//! [`config::RendererCommand`]).

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod digitize;
pub mod error;
pub mod generate;
pub mod markdown;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod prompts;
pub mod video;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{MarkdownConfig, PipelineConfig, PipelineConfigBuilder, VideoSettings};
pub use digitize::{process_all_folders, process_folder};
pub use error::{GenerationError, MediaError, NotesmithError, RepairError, SectionError};
pub use generate::{ImageGenerator, NotesExtractor, SpeechSynthesizer};
pub use markdown::{combine_markdown_files, markdown_to_pdf, rewrite_image_links};
pub use output::{
    Clip, DocumentOutcome, FolderAggregate, FolderBatchReport, FolderOutcome, FolderSummary,
    NotePage, PdfReport, SectionAssets, SectionScript, VideoBatchReport, VideoOutput, VideoSection,
};
pub use pipeline::media::VideoEncoder;
pub use progress::{NoopProgressCallback, PipelineProgressCallback, ProgressCallback};
pub use video::{generate_video_from_json, process_all_videos, render_video};

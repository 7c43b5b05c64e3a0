//! Per-section asset generation.
//!
//! A section needs two files: `images/section_{idx}.png` and
//! `audio/section_{idx}.wav`. Either file already existing counts as done;
//! a missing one is generated. The two requests for a section run together.
//! Failures are recorded on the returned [`SectionAssets`] and never
//! propagate.

use crate::error::SectionError;
use crate::generate::{ImageGenerator, SpeechSynthesizer};
use crate::output::{SectionAssets, VideoSection};
use crate::prompts::section_image_prompt;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// `<images_dir>/section_{idx}.png`
pub fn section_image_path(images_dir: &Path, index: usize) -> PathBuf {
    images_dir.join(format!("section_{index}.png"))
}

/// `<audio_dir>/section_{idx}.wav`
pub fn section_audio_path(audio_dir: &Path, index: usize) -> PathBuf {
    audio_dir.join(format!("section_{index}.wav"))
}

/// Resolve both assets for one section, generating whatever is missing.
pub async fn process_section_assets(
    index: usize,
    section: &VideoSection,
    images_dir: &Path,
    audio_dir: &Path,
    images: &dyn ImageGenerator,
    speech: &dyn SpeechSynthesizer,
) -> SectionAssets {
    if !section.is_complete() {
        warn!("Section {index} missing image_description or content. Skipping.");
        return SectionAssets::failed(index, SectionError::MissingFields { index });
    }

    let image_path = section_image_path(images_dir, index);
    let audio_path = section_audio_path(audio_dir, index);

    let (image, audio) = tokio::join!(
        ensure_image(index, &section.image_description, &image_path, images),
        ensure_audio(index, &section.content, &audio_path, speech),
    );

    let mut assets = SectionAssets {
        index,
        image: None,
        audio: None,
        errors: Vec::new(),
    };
    match image {
        Ok(p) => assets.image = Some(p),
        Err(detail) => assets.errors.push(SectionError::ImageFailed { index, detail }),
    }
    match audio {
        Ok(p) => assets.audio = Some(p),
        Err(detail) => assets.errors.push(SectionError::AudioFailed { index, detail }),
    }
    for e in &assets.errors {
        warn!("{e}");
    }
    assets
}

async fn ensure_image(
    index: usize,
    description: &str,
    path: &Path,
    images: &dyn ImageGenerator,
) -> Result<PathBuf, String> {
    if path.exists() {
        info!("Image for section {index} already exists. Skipping generation.");
        return Ok(path.to_path_buf());
    }
    info!("Generating image for section {index}...");
    let prompt = section_image_prompt(description);
    match images.generate(&prompt, Some(path)).await {
        Ok(Some(p)) if p.exists() => Ok(p),
        Ok(Some(p)) => Err(format!("generator reported {} but it does not exist", p.display())),
        Ok(None) => Err("no image data returned".to_string()),
        Err(e) => Err(e.to_string()),
    }
}

async fn ensure_audio(
    index: usize,
    content: &str,
    path: &Path,
    speech: &dyn SpeechSynthesizer,
) -> Result<PathBuf, String> {
    if path.exists() {
        info!("Audio for section {index} already exists. Skipping generation.");
        return Ok(path.to_path_buf());
    }
    info!("Generating audio for section {index}...");
    match speech.synthesize(content, path).await {
        Ok(Some(p)) if p.exists() => Ok(p),
        Ok(Some(p)) => Err(format!("synthesizer reported {} but it does not exist", p.display())),
        Ok(None) => Err("no audio data returned".to_string()),
        Err(e) => Err(e.to_string()),
    }
}

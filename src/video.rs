//! Narrated video generation from a section script.
//!
//! ## Flow
//!
//! ```text
//! script.json ──▶ sections ──▶ assets (buffer_unordered) ──▶ sort by index
//!                                   │
//!                                   ▼
//!                 clips (sequential, index order) ──▶ concat ──▶ final_video.mp4
//! ```
//!
//! Asset files are the resume points: a rerun over the same output
//! directory regenerates only what is missing. Clips are intermediate and
//! are removed once the final video is written.

use crate::config::PipelineConfig;
use crate::error::{NotesmithError, SectionError};
use crate::generate::{resolve_image_generator, resolve_speech_synthesizer};
use crate::output::{
    Clip, DocumentOutcome, SectionAssets, SectionScript, VideoBatchReport, VideoOutput, VideoStats,
};
use crate::pipeline::assets::process_section_assets;
use crate::pipeline::media::resolve_video_encoder;
use crate::progress::{NoopProgressCallback, PipelineProgressCallback};
use futures::stream::{self, StreamExt};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{error, info, warn};

/// Read and parse a `{ "sections": [...] }` script.
pub async fn load_script(path: &Path) -> Result<SectionScript, NotesmithError> {
    let text = tokio::fs::read_to_string(path)
        .await
        .map_err(|source| NotesmithError::ScriptRead {
            path: path.to_path_buf(),
            source,
        })?;
    let script: SectionScript =
        serde_json::from_str(&text).map_err(|source| NotesmithError::ScriptParse {
            path: path.to_path_buf(),
            source,
        })?;
    if script.sections.is_empty() {
        return Err(NotesmithError::NoSections {
            path: path.to_path_buf(),
        });
    }
    Ok(script)
}

/// Build the video for `script_path` into `output_dir` and return the path
/// of the final video.
pub async fn generate_video_from_json(
    script_path: &Path,
    output_dir: &Path,
    config: &PipelineConfig,
) -> Result<PathBuf, NotesmithError> {
    Ok(render_video(script_path, output_dir, config).await?.video)
}

/// Like [`generate_video_from_json`], returning per-section detail.
///
/// # Errors
/// Fatal only when the script is unusable, services are not configured,
/// output directories cannot be created, no clip could be built, or the
/// final concatenation fails. A failed section is recorded in
/// [`VideoOutput::sections`] and left out of the video.
///
/// The paths in [`VideoOutput::clips`] point into a scratch directory that
/// is gone by the time this returns.
pub async fn render_video(
    script_path: &Path,
    output_dir: &Path,
    config: &PipelineConfig,
) -> Result<VideoOutput, NotesmithError> {
    let script = load_script(script_path).await?;
    let images = resolve_image_generator(config)?;
    let speech = resolve_speech_synthesizer(config)?;
    let encoder = resolve_video_encoder(config);

    let images_dir = output_dir.join("images");
    let audio_dir = output_dir.join("audio");
    for dir in [&images_dir, &audio_dir] {
        tokio::fs::create_dir_all(dir)
            .await
            .map_err(|source| NotesmithError::OutputWriteFailed {
                path: dir.clone(),
                source,
            })?;
    }

    let total = script.sections.len();
    info!(
        "Processing {} sections from {} ({} at a time)",
        total,
        script_path.display(),
        config.section_concurrency
    );

    let noop = NoopProgressCallback;
    let progress: &dyn PipelineProgressCallback = match config.progress_callback {
        Some(ref cb) => cb.as_ref(),
        None => &noop,
    };
    progress.on_run_start(total);

    // ── Assets ───────────────────────────────────────────────────────────
    let generation_start = Instant::now();
    let images_ref = images.as_ref();
    let speech_ref = speech.as_ref();
    let images_dir_ref = images_dir.as_path();
    let audio_dir_ref = audio_dir.as_path();

    let mut sections: Vec<SectionAssets> = stream::iter(script.sections.iter().enumerate())
        .map(move |(index, section)| async move {
            let label = format!("section {index}");
            progress.on_item_start(index, total, &label);
            let assets = process_section_assets(
                index,
                section,
                images_dir_ref,
                audio_dir_ref,
                images_ref,
                speech_ref,
            )
            .await;
            match assets.errors.first() {
                None => {
                    info!("Section {index} assets generated");
                    progress.on_item_complete(index, total, &label);
                }
                Some(e) => progress.on_item_error(index, total, &e.to_string()),
            }
            assets
        })
        .buffer_unordered(config.section_concurrency)
        .collect()
        .await;
    sections.sort_by_key(|s| s.index);
    let generation_duration_ms = generation_start.elapsed().as_millis() as u64;

    // ── Clips ────────────────────────────────────────────────────────────
    let assembly_start = Instant::now();
    let scratch = tempfile::Builder::new()
        .prefix(".clips-")
        .tempdir_in(output_dir)
        .map_err(|source| NotesmithError::OutputWriteFailed {
            path: output_dir.to_path_buf(),
            source,
        })?;

    let mut clips: Vec<Clip> = Vec::new();
    for assets in sections.iter_mut() {
        let (Some(image), Some(audio)) = (assets.image.as_deref(), assets.audio.as_deref()) else {
            warn!("Skipping section {} due to missing assets", assets.index);
            continue;
        };
        match encoder
            .build_clip(assets.index, image, audio, scratch.path())
            .await
        {
            Ok(clip) => {
                info!(
                    "Section {} clip created (duration: {:.2}s)",
                    clip.index, clip.duration_secs
                );
                clips.push(clip);
            }
            Err(e) => {
                let err = SectionError::ClipFailed {
                    index: assets.index,
                    detail: e.to_string(),
                };
                warn!("{err}");
                assets.errors.push(err);
            }
        }
    }

    let failed_sections = sections.iter().filter(|s| !s.errors.is_empty()).count();
    progress.on_run_complete(total, clips.len());

    if clips.is_empty() {
        return Err(NotesmithError::NoClipsBuilt {
            total,
            failed: failed_sections,
        });
    }

    // Concatenate inside the scratch dir so an interrupted run never leaves
    // a partial final video behind.
    let video = output_dir.join(&config.video.output_name);
    let staged = scratch.path().join(&config.video.output_name);
    info!("Combining {} clips into {}", clips.len(), video.display());
    encoder.concatenate(&clips, &staged).await?;
    tokio::fs::rename(&staged, &video)
        .await
        .map_err(|source| NotesmithError::OutputWriteFailed {
            path: video.clone(),
            source,
        })?;
    let assembly_duration_ms = assembly_start.elapsed().as_millis() as u64;

    let stats = VideoStats {
        total_sections: total,
        clips_built: clips.len(),
        failed_sections,
        duration_secs: clips.iter().map(|c| c.duration_secs).sum(),
        generation_duration_ms,
        assembly_duration_ms,
    };
    info!(
        "Video generation complete: {} ({}/{} sections, {:.1}s)",
        video.display(),
        stats.clips_built,
        stats.total_sections,
        stats.duration_secs
    );

    Ok(VideoOutput {
        video,
        sections,
        clips,
        stats,
    })
}

/// Render every `{n}.json` script in `base_dir` into `output_{n}/`.
///
/// `n` ranges over [`PipelineConfig::script_range`]; missing numbers are
/// ignored. A document whose final video already exists is skipped and
/// counted as a success. With `parallel` set and more than one script,
/// up to [`PipelineConfig::document_concurrency`] documents run at once.
/// Per-document failures are captured in the report; the report lists
/// documents in script order.
pub async fn process_all_videos(
    base_dir: &Path,
    config: &PipelineConfig,
    parallel: bool,
) -> Result<VideoBatchReport, NotesmithError> {
    if !base_dir.is_dir() {
        return Err(NotesmithError::DirectoryNotFound {
            path: base_dir.to_path_buf(),
        });
    }

    let scripts: Vec<(u32, PathBuf)> = config
        .script_range
        .clone()
        .map(|n| (n, base_dir.join(format!("{n}.json"))))
        .filter(|(_, p)| p.is_file())
        .collect();

    let mut report = VideoBatchReport::default();
    if scripts.is_empty() {
        warn!("No JSON files found in {}", base_dir.display());
        return Ok(report);
    }

    info!(
        "Found {} JSON files to process (parallel: {})",
        scripts.len(),
        if parallel { "enabled" } else { "disabled" }
    );

    let mut outcomes: Vec<(u32, DocumentOutcome)> = if parallel && scripts.len() > 1 {
        stream::iter(scripts.iter())
            .map(|(n, path)| async move {
                (*n, process_document(*n, path, base_dir, config).await)
            })
            .buffer_unordered(config.document_concurrency)
            .collect()
            .await
    } else {
        let mut v = Vec::with_capacity(scripts.len());
        for (n, path) in &scripts {
            v.push((*n, process_document(*n, path, base_dir, config).await));
        }
        v
    };
    outcomes.sort_by_key(|(n, _)| *n);
    report.documents = outcomes.into_iter().map(|(_, d)| d).collect();

    let successful = report.successful().count();
    info!(
        "Successfully processed: {}/{}",
        successful,
        report.documents.len()
    );
    for d in report.failed() {
        error!(
            "{}: {}",
            d.script,
            d.error.as_deref().unwrap_or("unknown error")
        );
    }
    Ok(report)
}

async fn process_document(
    number: u32,
    script: &Path,
    base_dir: &Path,
    config: &PipelineConfig,
) -> DocumentOutcome {
    let name = script
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| format!("{number}.json"));
    let output_dir = base_dir.join(format!("output_{number}"));
    let video = output_dir.join(&config.video.output_name);

    if video.exists() {
        info!("Video for {name} already exists. Skipping.");
        return DocumentOutcome {
            script: name,
            success: true,
            skipped: true,
            video: Some(video),
            error: None,
        };
    }

    info!("Processing {name} -> output_{number}/");
    match generate_video_from_json(script, &output_dir, config).await {
        Ok(video) => DocumentOutcome {
            script: name,
            success: true,
            skipped: false,
            video: Some(video),
            error: None,
        },
        Err(e) => {
            error!("Error processing {name}: {e}");
            DocumentOutcome {
                script: name,
                success: false,
                skipped: false,
                video: None,
                error: Some(e.to_string()),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn empty_sections_is_no_sections() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("1.json");
        std::fs::write(&path, r#"{"sections": []}"#).unwrap();
        let err = load_script(&path).await.unwrap_err();
        assert!(matches!(err, NotesmithError::NoSections { .. }));
    }

    #[tokio::test]
    async fn missing_sections_key_is_no_sections() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("1.json");
        std::fs::write(&path, r#"{"title": "x"}"#).unwrap();
        let err = load_script(&path).await.unwrap_err();
        assert!(matches!(err, NotesmithError::NoSections { .. }));
    }

    #[tokio::test]
    async fn invalid_json_is_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("1.json");
        std::fs::write(&path, "{not json").unwrap();
        let err = load_script(&path).await.unwrap_err();
        assert!(matches!(err, NotesmithError::ScriptParse { .. }));
    }

    #[tokio::test]
    async fn missing_script_is_read_error() {
        let err = load_script(Path::new("/nonexistent/1.json")).await.unwrap_err();
        assert!(matches!(err, NotesmithError::ScriptRead { .. }));
    }

    #[tokio::test]
    async fn missing_base_dir_is_error() {
        let config = PipelineConfig::default();
        let err = process_all_videos(Path::new("/nonexistent/video"), &config, true)
            .await
            .unwrap_err();
        assert!(matches!(err, NotesmithError::DirectoryNotFound { .. }));
    }

    #[tokio::test]
    async fn existing_final_video_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("1.json"), r#"{"sections": []}"#).unwrap();
        std::fs::create_dir(dir.path().join("output_1")).unwrap();
        std::fs::write(dir.path().join("output_1/final_video.mp4"), b"mp4").unwrap();

        let report = process_all_videos(dir.path(), &PipelineConfig::default(), false)
            .await
            .unwrap();
        assert_eq!(report.documents.len(), 1);
        assert!(report.documents[0].skipped);
        assert!(report.documents[0].success);
    }
}

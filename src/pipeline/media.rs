//! Clip encoding and concatenation.
//!
//! A clip is one section image held on screen for the length of its
//! narration. Clips are encoded to a common frame size, frame rate and audio
//! layout so the concat demuxer can join them with `-c copy`.
//!
//! [`VideoEncoder`] is the seam; [`FfmpegEncoder`] shells out to `ffmpeg` and
//! `ffprobe` through `tokio::process`.

use crate::config::{PipelineConfig, VideoSettings};
use crate::error::MediaError;
use crate::output::Clip;
use async_trait::async_trait;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::process::Output;
use std::sync::Arc;
use tokio::process::Command;
use tracing::{debug, info, warn};

/// Builds clips and joins them into one video.
#[async_trait]
pub trait VideoEncoder: Send + Sync {
    /// Encode `image` + `audio` into a clip inside `out_dir`.
    async fn build_clip(
        &self,
        index: usize,
        image: &Path,
        audio: &Path,
        out_dir: &Path,
    ) -> Result<Clip, MediaError>;

    /// Join `clips` in the given order into `output`.
    async fn concatenate(&self, clips: &[Clip], output: &Path) -> Result<PathBuf, MediaError>;
}

/// The injected encoder if any, else [`FfmpegEncoder`].
pub fn resolve_video_encoder(config: &PipelineConfig) -> Arc<dyn VideoEncoder> {
    match config.video_encoder {
        Some(ref e) => Arc::clone(e),
        None => Arc::new(FfmpegEncoder::new(config.video.clone())),
    }
}

/// [`VideoEncoder`] backed by the ffmpeg command-line tools.
#[derive(Debug, Clone)]
pub struct FfmpegEncoder {
    settings: VideoSettings,
}

impl FfmpegEncoder {
    pub fn new(settings: VideoSettings) -> Self {
        Self { settings }
    }

    /// Length of an audio file in seconds.
    ///
    /// WAV headers are read directly; anything else (or a WAV hound cannot
    /// read) goes through `ffprobe`.
    pub async fn audio_duration(&self, audio: &Path) -> Result<f64, MediaError> {
        if !audio.exists() {
            return Err(MediaError::FileNotFound(audio.to_path_buf()));
        }
        let is_wav = audio
            .extension()
            .is_some_and(|e| e.eq_ignore_ascii_case("wav"));
        if is_wav {
            let path = audio.to_path_buf();
            let wav = tokio::task::spawn_blocking(move || wav_duration(&path))
                .await
                .map_err(|e| MediaError::ParseError(format!("duration task failed: {e}")))?;
            match wav {
                Ok(secs) => return Ok(secs),
                Err(e) => debug!("hound could not read {}: {e}; trying ffprobe", audio.display()),
            }
        }
        self.probe_duration(audio).await
    }

    async fn probe_duration(&self, path: &Path) -> Result<f64, MediaError> {
        let output = Command::new(&self.settings.ffprobe)
            .args(["-v", "quiet", "-print_format", "json", "-show_format"])
            .arg(path)
            .output()
            .await
            .map_err(MediaError::NotFound)?;
        check_success(&output)?;
        parse_probe_duration(&String::from_utf8_lossy(&output.stdout))
    }

    fn clip_args(&self, image: &Path, audio: &Path, duration: f64, output: &Path) -> Vec<String> {
        let s = &self.settings;
        let filter = format!(
            "scale={w}:{h}:force_original_aspect_ratio=decrease,\
             pad={w}:{h}:(ow-iw)/2:(oh-ih)/2,setsar=1,format=yuv420p",
            w = s.width,
            h = s.height
        );
        let mut args: Vec<String> = vec!["-y".into(), "-loop".into(), "1".into()];
        args.extend(["-framerate".into(), s.fps.to_string(), "-i".into()]);
        args.push(image.to_string_lossy().into_owned());
        args.extend(["-i".into(), audio.to_string_lossy().into_owned()]);
        args.extend(["-t".into(), format!("{duration:.3}")]);
        args.extend(["-vf".into(), filter]);
        args.extend(["-r".into(), s.fps.to_string()]);
        args.extend(["-c:v".into(), s.video_codec.clone(), "-tune".into(), "stillimage".into()]);
        args.extend(["-pix_fmt".into(), "yuv420p".into()]);
        args.extend(["-c:a".into(), s.audio_codec.clone()]);
        args.extend(["-ar".into(), "44100".into(), "-ac".into(), "2".into()]);
        args.push("-shortest".into());
        args.push(output.to_string_lossy().into_owned());
        args
    }
}

#[async_trait]
impl VideoEncoder for FfmpegEncoder {
    async fn build_clip(
        &self,
        index: usize,
        image: &Path,
        audio: &Path,
        out_dir: &Path,
    ) -> Result<Clip, MediaError> {
        if !image.exists() {
            return Err(MediaError::FileNotFound(image.to_path_buf()));
        }
        let duration = self.audio_duration(audio).await?;
        let path = out_dir.join(format!("clip_{index:03}.mp4"));

        let output = Command::new(&self.settings.ffmpeg)
            .args(self.clip_args(image, audio, duration, &path))
            .output()
            .await
            .map_err(MediaError::NotFound)?;
        check_success(&output)?;

        debug!("Clip {index}: {:.2}s -> {}", duration, path.display());
        Ok(Clip {
            index,
            path,
            duration_secs: duration,
        })
    }

    async fn concatenate(&self, clips: &[Clip], output: &Path) -> Result<PathBuf, MediaError> {
        if clips.is_empty() {
            return Err(MediaError::NoClips);
        }
        let mut segments = Vec::with_capacity(clips.len());
        for clip in clips {
            segments.push(tokio::fs::canonicalize(&clip.path).await?);
        }

        let manifest_path = output.with_extension("concat.txt");
        tokio::fs::write(&manifest_path, concat_manifest(&segments)).await?;
        info!(
            "Concatenating {} clips into {}",
            segments.len(),
            output.display()
        );

        let result = Command::new(&self.settings.ffmpeg)
            .args(["-y", "-f", "concat", "-safe", "0", "-i"])
            .arg(&manifest_path)
            .args(["-c", "copy"])
            .arg(output)
            .output()
            .await
            .map_err(MediaError::NotFound);

        if let Err(e) = tokio::fs::remove_file(&manifest_path).await {
            warn!("Could not remove {}: {e}", manifest_path.display());
        }
        check_success(&result?)?;
        Ok(output.to_path_buf())
    }
}

/// Concat-demuxer manifest: one `file '<path>'` line per segment.
pub fn concat_manifest(segments: &[PathBuf]) -> String {
    segments
        .iter()
        .map(|p| format!("file '{}'\n", p.to_string_lossy().replace('\'', r"'\''")))
        .collect()
}

fn wav_duration(path: &Path) -> Result<f64, MediaError> {
    let reader = hound::WavReader::open(path)?;
    let spec = reader.spec();
    if spec.sample_rate == 0 {
        return Err(MediaError::ParseError("WAV sample rate is zero".into()));
    }
    Ok(f64::from(reader.duration()) / f64::from(spec.sample_rate))
}

#[derive(Debug, Deserialize)]
struct ProbeOutput {
    format: ProbeFormat,
}

#[derive(Debug, Deserialize)]
struct ProbeFormat {
    duration: Option<String>,
}

/// Duration from `ffprobe -print_format json -show_format` output.
pub fn parse_probe_duration(stdout: &str) -> Result<f64, MediaError> {
    let probe: ProbeOutput = serde_json::from_str(stdout)
        .map_err(|e| MediaError::ParseError(format!("{e}: {stdout}")))?;
    probe
        .format
        .duration
        .as_deref()
        .and_then(|d| d.trim().parse::<f64>().ok())
        .filter(|d| d.is_finite() && *d > 0.0)
        .ok_or_else(|| MediaError::ParseError(format!("no usable duration in: {stdout}")))
}

fn check_success(output: &Output) -> Result<(), MediaError> {
    if output.status.success() {
        return Ok(());
    }
    Err(MediaError::ExecutionFailed {
        exit_code: output.status.code(),
        stderr: String::from_utf8_lossy(&output.stderr).to_string(),
    })
}

//! Records produced and consumed by the pipeline stages.
//!
//! Everything here is a transient, file-backed value: created by one stage,
//! written to disk or handed to the next stage, and never mutated afterwards
//! (the folder aggregate grows while a folder is being processed, then is
//! frozen and serialised).

use crate::error::SectionError;
use serde::{Deserialize, Deserializer, Serialize};
use std::path::PathBuf;

/// Treat an explicit JSON `null` the same as an absent field.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

// ── Note-page extraction ─────────────────────────────────────────────────

/// Structured result of one photographed note page.
///
/// Field names match the response schema sent to the extraction service.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NotePage {
    /// Markdown explanation of the page.
    #[serde(rename = "Description", default, deserialize_with = "null_as_default")]
    pub description: String,

    /// Image-generation prompts, one per figure placeholder in `description`.
    #[serde(rename = "Images", default, deserialize_with = "null_as_default")]
    pub images: Vec<String>,
}

/// A figure placeholder paired with the prompt that regenerates it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Figure {
    /// 1-based figure number.
    pub number: usize,
    /// File name the description's placeholder link points at, e.g. `figure_1.png`.
    pub placeholder: String,
    pub prompt: String,
}

impl NotePage {
    /// Pair each prompt with its placeholder file name.
    ///
    /// The extraction prompt asks the model to reference the i-th prompt as
    /// `figure_{i+1}.png`; nothing enforces it, so this is the one place that
    /// encodes the convention.
    pub fn figures(&self) -> Vec<Figure> {
        self.images
            .iter()
            .enumerate()
            .map(|(i, prompt)| Figure {
                number: i + 1,
                placeholder: format!("figure_{}.png", i + 1),
                prompt: prompt.clone(),
            })
            .collect()
    }

    /// Figure numbers whose placeholder appears in the description.
    pub fn referenced_figures(&self) -> Vec<usize> {
        self.figures()
            .into_iter()
            .filter(|f| self.description.contains(&f.placeholder))
            .map(|f| f.number)
            .collect()
    }
}

// ── Folder aggregation ───────────────────────────────────────────────────

/// One successfully described source image inside a folder aggregate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DescriptionEntry {
    /// Source image file name.
    pub image: String,
    pub description: String,
    /// Prompts for this image's figures, keyed by placeholder.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub figures: Vec<Figure>,
}

/// Combined JSON written once per folder as `<folder>/<folder>.json`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FolderAggregate {
    pub folder: String,
    pub total_images: usize,
    pub processed_images: usize,
    pub descriptions: Vec<DescriptionEntry>,
    /// Every image's prompts concatenated in file order.
    pub image_prompts: Vec<String>,
}

/// What a successfully processed folder reports back.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FolderSummary {
    pub folder: String,
    pub json_file: PathBuf,
    pub images_processed: usize,
    pub total_images: usize,
    pub image_prompts_count: usize,
}

/// Result of processing one folder. Never an `Err`: a folder that produced
/// nothing is reported, not raised.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum FolderOutcome {
    Processed(FolderSummary),
    Failed { folder: String, error: String },
}

impl FolderOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, FolderOutcome::Processed(_))
    }

    pub fn folder(&self) -> &str {
        match self {
            FolderOutcome::Processed(s) => &s.folder,
            FolderOutcome::Failed { folder, .. } => folder,
        }
    }
}

/// Results of a batch-of-folders run, in processing order.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FolderBatchReport {
    pub outcomes: Vec<FolderOutcome>,
}

impl FolderBatchReport {
    pub fn successful(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_success()).count()
    }

    pub fn failed(&self) -> usize {
        self.outcomes.len() - self.successful()
    }

    pub fn total_images_processed(&self) -> usize {
        self.summaries().map(|s| s.images_processed).sum()
    }

    pub fn total_prompts(&self) -> usize {
        self.summaries().map(|s| s.image_prompts_count).sum()
    }

    fn summaries(&self) -> impl Iterator<Item = &FolderSummary> {
        self.outcomes.iter().filter_map(|o| match o {
            FolderOutcome::Processed(s) => Some(s),
            FolderOutcome::Failed { .. } => None,
        })
    }
}

// ── Video script ─────────────────────────────────────────────────────────

/// One narrated slide. Identified only by its position in the script.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VideoSection {
    /// Narration text.
    #[serde(default, deserialize_with = "null_as_default")]
    pub content: String,
    /// What the slide image should show.
    #[serde(default, deserialize_with = "null_as_default")]
    pub image_description: String,
}

impl VideoSection {
    pub fn is_complete(&self) -> bool {
        !self.content.trim().is_empty() && !self.image_description.trim().is_empty()
    }
}

/// `{ "sections": [...] }`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SectionScript {
    #[serde(default, deserialize_with = "null_as_default")]
    pub sections: Vec<VideoSection>,
}

/// Assets resolved for one section after the generation fan-in.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SectionAssets {
    pub index: usize,
    pub image: Option<PathBuf>,
    pub audio: Option<PathBuf>,
    /// Why an asset is missing, if one is.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<SectionError>,
}

impl SectionAssets {
    pub fn failed(index: usize, error: SectionError) -> Self {
        Self {
            index,
            image: None,
            audio: None,
            errors: vec![error],
        }
    }

    /// Both assets are present.
    pub fn is_ready(&self) -> bool {
        self.image.is_some() && self.audio.is_some()
    }
}

/// An encoded clip: the section image held for the narration's duration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Clip {
    pub index: usize,
    pub path: PathBuf,
    pub duration_secs: f64,
}

/// Everything a single-document video run produced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VideoOutput {
    /// The concatenated video.
    pub video: PathBuf,
    /// Per-section assets, sorted by index.
    pub sections: Vec<SectionAssets>,
    /// Clips in the order they appear in the video.
    pub clips: Vec<Clip>,
    pub stats: VideoStats,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VideoStats {
    pub total_sections: usize,
    pub clips_built: usize,
    pub failed_sections: usize,
    /// Sum of clip durations.
    pub duration_secs: f64,
    pub generation_duration_ms: u64,
    pub assembly_duration_ms: u64,
}

/// Result of one document in a multi-document run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentOutcome {
    /// Script file name, e.g. `3.json`.
    pub script: String,
    pub success: bool,
    /// The final video already existed; nothing was done.
    pub skipped: bool,
    pub video: Option<PathBuf>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VideoBatchReport {
    pub documents: Vec<DocumentOutcome>,
}

impl VideoBatchReport {
    pub fn successful(&self) -> impl Iterator<Item = &DocumentOutcome> {
        self.documents.iter().filter(|d| d.success)
    }

    pub fn failed(&self) -> impl Iterator<Item = &DocumentOutcome> {
        self.documents.iter().filter(|d| !d.success)
    }
}

// ── Markdown / PDF ───────────────────────────────────────────────────────

/// Outcome of the HTML → PDF stage. Renderer failures land in
/// `renderer_error` instead of an `Err`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PdfReport {
    pub html_path: PathBuf,
    pub pdf_path: PathBuf,
    pub renderer_error: Option<String>,
}

impl PdfReport {
    pub fn is_ok(&self) -> bool {
        self.renderer_error.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn note_page_defaults_missing_images() {
        let p: NotePage = serde_json::from_value(json!({"Description": "# T"})).unwrap();
        assert_eq!(p.description, "# T");
        assert!(p.images.is_empty());

        let p: NotePage =
            serde_json::from_value(json!({"Description": "x", "Images": null})).unwrap();
        assert!(p.images.is_empty());
    }

    #[test]
    fn figures_pair_placeholder_with_prompt() {
        let p = NotePage {
            description: "see ![a](images/figure_2.png)".into(),
            images: vec!["first".into(), "second".into()],
        };
        let figs = p.figures();
        assert_eq!(figs[0].placeholder, "figure_1.png");
        assert_eq!(figs[1].prompt, "second");
        assert_eq!(p.referenced_figures(), vec![2]);
    }

    #[test]
    fn section_completeness() {
        let s: VideoSection = serde_json::from_value(json!({"content": "hi"})).unwrap();
        assert!(!s.is_complete());
        let s: VideoSection =
            serde_json::from_value(json!({"content": "hi", "image_description": null})).unwrap();
        assert!(!s.is_complete());
        let s: VideoSection =
            serde_json::from_value(json!({"content": "hi", "image_description": "a cat"})).unwrap();
        assert!(s.is_complete());
        let blank = json!({"content": "  \n", "image_description": "a cat"});
        let s: VideoSection = serde_json::from_value(blank).unwrap();
        assert!(!s.is_complete());
    }

    #[test]
    fn folder_outcome_serialises_with_status_tag() {
        let o = FolderOutcome::Failed {
            folder: "3".into(),
            error: "No images found in 3".into(),
        };
        let v = serde_json::to_value(&o).unwrap();
        assert_eq!(v["status"], "failed");
        assert_eq!(v["folder"], "3");
    }

    #[test]
    fn batch_report_totals() {
        let report = FolderBatchReport {
            outcomes: vec![
                FolderOutcome::Processed(FolderSummary {
                    folder: "1".into(),
                    json_file: "1/1.json".into(),
                    images_processed: 2,
                    total_images: 3,
                    image_prompts_count: 4,
                }),
                FolderOutcome::Failed {
                    folder: "2".into(),
                    error: "x".into(),
                },
            ],
        };
        assert_eq!(report.successful(), 1);
        assert_eq!(report.failed(), 1);
        assert_eq!(report.total_images_processed(), 2);
        assert_eq!(report.total_prompts(), 4);
    }
}

//! Folder digitisation: photographed note pages → one combined JSON per folder.
//!
//! Each folder of page photos becomes `<folder>/<folder>.json`, a
//! [`FolderAggregate`] holding every page's markdown explanation and the
//! figure prompts collected along the way. Pages are processed one at a time
//! in file-name order; a page that cannot be read, extracted or repaired is
//! logged and skipped without aborting the folder.

use crate::config::PipelineConfig;
use crate::generate::{resolve_notes_extractor, NotesExtractor};
use crate::output::{
    DescriptionEntry, FolderAggregate, FolderBatchReport, FolderOutcome, FolderSummary,
};
use crate::pipeline::repair::locate_note_page;
use crate::progress::{NoopProgressCallback, PipelineProgressCallback};
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, warn};

/// Extensions (lower-case) treated as page photos.
pub const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "gif", "bmp"];

/// File-name prefix of images that are never pages.
pub const EXCLUDED_PREFIX: &str = "Screenshot";

/// Process every page photo in `folder` and write `<folder>/<folder>.json`.
///
/// Never returns an error: every failure is reported as
/// [`FolderOutcome::Failed`].
pub async fn process_folder(folder: &Path, config: &PipelineConfig) -> FolderOutcome {
    match resolve_notes_extractor(config) {
        Ok(extractor) => process_folder_with(folder, extractor.as_ref(), config).await,
        Err(e) => FolderOutcome::Failed {
            folder: folder_name(folder),
            error: e.to_string(),
        },
    }
}

/// Process every subfolder of `base_dir` in order and summarise.
///
/// Subfolders are sorted numerically when every name is a number, otherwise
/// lexicographically. A missing or empty base directory yields an empty
/// report.
pub async fn process_all_folders(base_dir: &Path, config: &PipelineConfig) -> FolderBatchReport {
    let mut report = FolderBatchReport::default();

    let folders = match list_subfolders(base_dir).await {
        Ok(f) if f.is_empty() => {
            error!("No folders found in '{}'", base_dir.display());
            return report;
        }
        Ok(f) => f,
        Err(e) => {
            error!("Base directory '{}' does not exist: {e}", base_dir.display());
            return report;
        }
    };
    info!(
        "Found {} folder(s) to process: {:?}",
        folders.len(),
        folders.iter().map(|f| folder_name(f)).collect::<Vec<_>>()
    );

    let extractor = match resolve_notes_extractor(config) {
        Ok(e) => e,
        Err(e) => {
            error!("{e}");
            report.outcomes = folders
                .iter()
                .map(|f| FolderOutcome::Failed {
                    folder: folder_name(f),
                    error: e.to_string(),
                })
                .collect();
            return report;
        }
    };

    for folder in &folders {
        let outcome = process_folder_with(folder, extractor.as_ref(), config).await;
        report.outcomes.push(outcome);
    }

    info!(
        "Folders processed: {}, successful: {}, failed: {}",
        report.outcomes.len(),
        report.successful(),
        report.failed()
    );
    if report.successful() > 0 {
        info!(
            "Total images processed: {}, total image prompts collected: {}",
            report.total_images_processed(),
            report.total_prompts()
        );
    }
    report
}

/// [`process_folder`] with an explicit extractor.
pub async fn process_folder_with(
    folder: &Path,
    extractor: &dyn NotesExtractor,
    config: &PipelineConfig,
) -> FolderOutcome {
    let name = folder_name(folder);
    info!("Processing folder: {name}");
    let failed = |error: String| {
        warn!("{error}");
        FolderOutcome::Failed {
            folder: name.clone(),
            error,
        }
    };

    let images = match list_page_images(folder).await {
        Ok(images) if images.is_empty() => return failed(format!("No images found in {name}")),
        Ok(images) => images,
        Err(e) => return failed(format!("Cannot read folder {}: {e}", folder.display())),
    };

    let noop = NoopProgressCallback;
    let progress: &dyn PipelineProgressCallback = match config.progress_callback {
        Some(ref cb) => cb.as_ref(),
        None => &noop,
    };

    let total = images.len();
    info!("Found {total} image(s) in {name}");
    progress.on_run_start(total);

    let mut aggregate = FolderAggregate {
        folder: name.clone(),
        total_images: total,
        processed_images: 0,
        descriptions: Vec::new(),
        image_prompts: Vec::new(),
    };

    for (i, path) in images.iter().enumerate() {
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        progress.on_item_start(i, total, &file_name);
        info!("Processing image {}/{}: {}", i + 1, total, file_name);

        match describe_page(path, extractor).await {
            Ok(page) => {
                let described = !page.description.is_empty();
                if described {
                    debug!("Description extracted ({} chars)", page.description.len());
                    aggregate.descriptions.push(DescriptionEntry {
                        image: file_name.clone(),
                        description: page.description.clone(),
                        figures: page.figures(),
                    });
                }
                if !page.images.is_empty() {
                    debug!("Found {} image prompt(s)", page.images.len());
                    aggregate.image_prompts.extend(page.images);
                }
                if described {
                    progress.on_item_complete(i, total, &file_name);
                } else {
                    progress.on_item_error(i, total, "empty description");
                }
            }
            Err(e) => {
                warn!("Skipping {file_name}: {e}");
                progress.on_item_error(i, total, &e);
            }
        }
    }

    aggregate.processed_images = aggregate.descriptions.len();
    progress.on_run_complete(total, aggregate.processed_images);

    if aggregate.descriptions.is_empty() {
        return failed(format!("No descriptions generated for {name}"));
    }

    let json_file = folder.join(format!("{name}.json"));
    let json = match serde_json::to_string_pretty(&aggregate) {
        Ok(j) => j,
        Err(e) => return failed(format!("Failed to save JSON: {e}")),
    };
    if let Err(e) = tokio::fs::write(&json_file, json).await {
        return failed(format!("Failed to save JSON: {e}"));
    }
    info!("JSON saved to: {}", json_file.display());

    FolderOutcome::Processed(FolderSummary {
        folder: name,
        json_file,
        images_processed: aggregate.processed_images,
        total_images: total,
        image_prompts_count: aggregate.image_prompts.len(),
    })
}

async fn describe_page(
    path: &Path,
    extractor: &dyn NotesExtractor,
) -> Result<crate::output::NotePage, String> {
    let bytes = tokio::fs::read(path)
        .await
        .map_err(|e| format!("failed to read image: {e}"))?;
    let response = extractor
        .extract(&bytes)
        .await
        .map_err(|e| format!("failed to generate JSON: {e}"))?;
    locate_note_page(&response).map_err(|e| format!("no usable JSON: {e}"))
}

/// Page photos directly inside `folder`, sorted by path.
pub async fn list_page_images(folder: &Path) -> std::io::Result<Vec<PathBuf>> {
    let mut entries = tokio::fs::read_dir(folder).await?;
    let mut images = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if entry.file_type().await?.is_dir() {
            continue;
        }
        if is_page_image(&path) {
            images.push(path);
        }
    }
    images.sort();
    Ok(images)
}

fn is_page_image(path: &Path) -> bool {
    let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
        return false;
    };
    if name.starts_with(EXCLUDED_PREFIX) {
        return false;
    }
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|ext| IMAGE_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
}

/// Subdirectories of `base_dir`, numerically sorted if all names are numbers.
pub async fn list_subfolders(base_dir: &Path) -> std::io::Result<Vec<PathBuf>> {
    let mut entries = tokio::fs::read_dir(base_dir).await?;
    let mut folders = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        if entry.file_type().await?.is_dir() {
            folders.push(entry.path());
        }
    }
    sort_folders(&mut folders);
    Ok(folders)
}

fn sort_folders(folders: &mut [PathBuf]) {
    let numbers: Option<Vec<u64>> = folders
        .iter()
        .map(|f| folder_name(f).parse::<u64>().ok())
        .collect();
    match numbers {
        Some(_) => folders.sort_by_key(|f| folder_name(f).parse::<u64>().unwrap_or(u64::MAX)),
        None => folders.sort(),
    }
}

fn folder_name(folder: &Path) -> String {
    folder
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| folder.display().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_image_filter() {
        assert!(is_page_image(Path::new("a/1.png")));
        assert!(is_page_image(Path::new("a/page.JPEG")));
        assert!(is_page_image(Path::new("a/x.bmp")));
        assert!(!is_page_image(Path::new("a/Screenshot 2024.png")));
        assert!(!is_page_image(Path::new("a/notes.pdf")));
        assert!(!is_page_image(Path::new("a/noext")));
    }

    #[test]
    fn numeric_folders_sorted_numerically() {
        let mut f: Vec<PathBuf> = ["10", "2", "1"].iter().map(PathBuf::from).collect();
        sort_folders(&mut f);
        assert_eq!(f, vec![PathBuf::from("1"), PathBuf::from("2"), PathBuf::from("10")]);
    }

    #[test]
    fn mixed_folders_sorted_lexicographically() {
        let mut f: Vec<PathBuf> = ["b", "10", "2"].iter().map(PathBuf::from).collect();
        sort_folders(&mut f);
        assert_eq!(f, vec![PathBuf::from("10"), PathBuf::from("2"), PathBuf::from("b")]);
    }

    #[tokio::test]
    async fn listing_skips_dirs_and_screenshots() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["b.jpg", "a.png", "Screenshot 1.png", "readme.txt"] {
            std::fs::write(dir.path().join(name), b"x").unwrap();
        }
        std::fs::create_dir(dir.path().join("c.png")).unwrap();
        let images = list_page_images(dir.path()).await.unwrap();
        let names: Vec<_> = images
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["a.png", "b.jpg"]);
    }

    #[tokio::test]
    async fn missing_base_dir_gives_empty_report() {
        let report =
            process_all_folders(Path::new("/nonexistent/notes"), &PipelineConfig::default()).await;
        assert!(report.outcomes.is_empty());
    }

    #[tokio::test]
    async fn missing_key_fails_folder_without_panic() {
        let dir = tempfile::tempdir().unwrap();
        let outcome = process_folder(dir.path(), &PipelineConfig::default()).await;
        assert!(!outcome.is_success());
    }
}

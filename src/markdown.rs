//! Markdown aggregation: numbered notes → one markdown file → styled PDF.
//!
//! Talks to no generative service. The only external dependency is the
//! HTML → PDF renderer, and its failures are reported, never raised.

use crate::config::MarkdownConfig;
use crate::error::NotesmithError;
use crate::output::PdfReport;
use once_cell::sync::Lazy;
use pulldown_cmark::{html, Options, Parser};
use regex::{Captures, Regex};
use std::path::{Path, PathBuf};
use tracing::{error, info, warn};

/// Separator appended after every combined file.
pub const FILE_SEPARATOR: &str = "\n\n---\n\n";

/// `width` used by [`rewrite_image_links`].
pub const DEFAULT_IMAGE_WIDTH: u32 = 400;

/// A4 print stylesheet embedded in the rendered HTML.
pub const STYLESHEET: &str = r#"
@page { size: A4; margin: 2cm; }
body { font-family: Arial, Helvetica, sans-serif; line-height: 1.6; color: #333; }
h1 { color: #2c3e50; border-bottom: 3px solid #3498db; padding-bottom: 10px; margin-top: 30px; font-size: 24px; }
h2 { color: #34495e; border-bottom: 2px solid #95a5a6; padding-bottom: 5px; margin-top: 25px; font-size: 20px; }
h3 { color: #7f8c8d; margin-top: 20px; font-size: 16px; }
img { max-width: 400px; height: auto; display: block; margin: 20px auto; border: 1px solid #ddd; padding: 5px; }
table { border-collapse: collapse; width: 100%; margin: 20px 0; font-size: 12px; }
th, td { border: 1px solid #ddd; padding: 8px; text-align: left; }
th { background-color: #3498db; color: white; }
tr:nth-child(even) { background-color: #f2f2f2; }
code { background-color: #f4f4f4; padding: 2px 6px; font-family: Courier New, monospace; font-size: 11px; }
pre { background-color: #f4f4f4; padding: 15px; overflow-x: auto; font-size: 11px; }
ul, ol { margin: 15px 0; padding-left: 30px; }
li { margin: 8px 0; }
hr { border: none; border-top: 2px solid #bdc3c7; margin: 30px 0; }
"#;

static RE_NOTE_IMAGE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"!\[([^\]]*)\]\((images/\d+/image_\d+\.png)\)").unwrap());

/// Rewrite `![alt](images/N/image_M.png)` links to sized `<img>` tags.
///
/// Other image links are left alone.
pub fn rewrite_image_links(content: &str) -> String {
    rewrite_image_links_with_width(content, DEFAULT_IMAGE_WIDTH)
}

pub fn rewrite_image_links_with_width(content: &str, width: u32) -> String {
    RE_NOTE_IMAGE
        .replace_all(content, |caps: &Captures| {
            format!(r#"<img src="{}" alt="{}" width="{}">"#, &caps[2], &caps[1], width)
        })
        .into_owned()
}

/// Concatenate `{first..=last}.md` from the input folder into the output
/// file, rewriting image links. Missing numbers are skipped.
pub async fn combine_markdown_files(config: &MarkdownConfig) -> Result<PathBuf, NotesmithError> {
    if !config.input_dir.is_dir() {
        return Err(NotesmithError::DirectoryNotFound {
            path: config.input_dir.clone(),
        });
    }

    let files: Vec<PathBuf> = (config.first..=config.last)
        .map(|i| config.input_dir.join(format!("{i}.md")))
        .filter(|p| p.is_file())
        .collect();
    info!("Found {} markdown files to combine", files.len());

    let mut combined = String::new();
    for path in &files {
        info!("Processing {}", path.display());
        let content =
            tokio::fs::read_to_string(path)
                .await
                .map_err(|source| NotesmithError::ReadFailed {
                    path: path.clone(),
                    source,
                })?;
        combined.push_str(&rewrite_image_links_with_width(&content, config.image_width));
        combined.push_str(FILE_SEPARATOR);
    }

    write_output(&config.output_file, combined.as_bytes()).await?;
    info!("Combined markdown saved to: {}", config.output_file.display());
    Ok(config.output_file.clone())
}

/// Markdown → complete HTML document with [`STYLESHEET`].
pub fn render_html(markdown: &str) -> String {
    let mut options = Options::empty();
    options.insert(Options::ENABLE_TABLES);
    options.insert(Options::ENABLE_FOOTNOTES);
    options.insert(Options::ENABLE_STRIKETHROUGH);
    options.insert(Options::ENABLE_TASKLISTS);

    let mut body = String::with_capacity(markdown.len() * 3 / 2);
    html::push_html(&mut body, Parser::new_ext(markdown, options));

    format!(
        "<!DOCTYPE html>\n<html>\n<head>\n<meta charset=\"utf-8\">\n<style>{STYLESHEET}</style>\n</head>\n<body>\n{body}</body>\n</html>\n"
    )
}

/// Render `md_file` to HTML next to `pdf_file`, then to PDF.
///
/// The renderer runs with the markdown file's directory as working
/// directory so relative image paths resolve.
///
/// # Errors
/// Only when the markdown cannot be read or the HTML cannot be written.
/// Renderer failures land in [`PdfReport::renderer_error`].
pub async fn markdown_to_pdf(
    md_file: &Path,
    pdf_file: &Path,
    config: &MarkdownConfig,
) -> Result<PdfReport, NotesmithError> {
    let markdown =
        tokio::fs::read_to_string(md_file)
            .await
            .map_err(|source| NotesmithError::ReadFailed {
                path: md_file.to_path_buf(),
                source,
            })?;

    let html_path = pdf_file.with_extension("html");
    write_output(&html_path, render_html(&markdown).as_bytes()).await?;

    info!("Generating PDF: {}", pdf_file.display());
    let renderer_error = run_renderer(md_file, &html_path, pdf_file, config)
        .await
        .err();
    match renderer_error {
        Some(ref e) => error!("Error creating PDF: {e}"),
        None => info!("PDF successfully created: {}", pdf_file.display()),
    }

    Ok(PdfReport {
        html_path,
        pdf_path: pdf_file.to_path_buf(),
        renderer_error,
    })
}

/// [`combine_markdown_files`] followed by [`markdown_to_pdf`].
pub async fn combine_and_render(config: &MarkdownConfig) -> Result<PdfReport, NotesmithError> {
    let combined = combine_markdown_files(config).await?;
    markdown_to_pdf(&combined, &config.pdf_file, config).await
}

async fn run_renderer(
    md_file: &Path,
    html: &Path,
    pdf: &Path,
    config: &MarkdownConfig,
) -> Result<(), String> {
    let html = std::path::absolute(html).map_err(|e| e.to_string())?;
    let pdf = std::path::absolute(pdf).map_err(|e| e.to_string())?;
    let workdir = md_file
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));

    let previous = modified_at(&pdf).await;

    let output = tokio::process::Command::new(&config.renderer.program)
        .args(&config.renderer.args)
        .arg(&html)
        .arg(&pdf)
        .current_dir(workdir)
        .output()
        .await
        .map_err(|e| format!("{}: {e}", config.renderer.program.display()))?;

    if output.status.success() {
        return Ok(());
    }
    let stderr = String::from_utf8_lossy(&output.stderr);
    // wkhtmltopdf exits non-zero on missing assets even when it wrote a PDF.
    // A file left over from an earlier run does not count.
    let written = match (previous, modified_at(&pdf).await) {
        (None, Some(_)) => true,
        (Some(before), Some(after)) => after > before,
        (_, None) => false,
    };
    if written {
        warn!("Renderer reported problems: {}", stderr.trim());
        return Ok(());
    }
    Err(format!(
        "renderer exited with {:?}: {}",
        output.status.code(),
        stderr.trim()
    ))
}

async fn modified_at(path: &Path) -> Option<std::time::SystemTime> {
    tokio::fs::metadata(path).await.ok()?.modified().ok()
}

async fn write_output(path: &Path, bytes: &[u8]) -> Result<(), NotesmithError> {
    let to_err = |source| NotesmithError::OutputWriteFailed {
        path: path.to_path_buf(),
        source,
    };
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await.map_err(to_err)?;
    }
    tokio::fs::write(path, bytes).await.map_err(to_err)
}

//! CLI binary for notesmith.
//!
//! A thin shim over the library crate that maps subcommands and flags to
//! `PipelineConfig` / `MarkdownConfig` and prints results.

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use notesmith::config::RendererCommand;
use notesmith::generate::{
    resolve_image_generator, resolve_notes_extractor, resolve_speech_synthesizer,
};
use notesmith::markdown::{combine_and_render, combine_markdown_files};
use notesmith::pipeline::repair::locate_note_page;
use notesmith::{
    generate_video_from_json, process_all_folders, process_all_videos, process_folder,
    FolderOutcome, MarkdownConfig, PipelineConfig, PipelineProgressCallback, ProgressCallback,
};
use std::collections::HashMap;
use std::io;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

const TICKS: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"];

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Renders a live progress bar plus one log line per finished item. Items
/// may finish out of order (sections run concurrently).
struct CliProgressCallback {
    bar: ProgressBar,
    start_times: Mutex<HashMap<usize, Instant>>,
    noun: &'static str,
}

impl CliProgressCallback {
    fn new(noun: &'static str) -> Arc<Self> {
        let bar = ProgressBar::new(0);
        let spinner_style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(TICKS);
        bar.set_style(spinner_style);
        bar.set_prefix("Preparing");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            start_times: Mutex::new(HashMap::new()),
            noun,
        })
    }

    fn elapsed_secs(&self, index: usize) -> f64 {
        self.start_times
            .lock()
            .ok()
            .and_then(|mut m| m.remove(&index))
            .map(|t| t.elapsed().as_secs_f64())
            .unwrap_or(0.0)
    }
}

impl PipelineProgressCallback for CliProgressCallback {
    fn on_run_start(&self, total: usize) {
        let style = ProgressStyle::with_template(&format!(
            "{{spinner:.cyan}} {{prefix:.bold}}  [{{bar:42.green/238}}] {{pos:>3}}/{{len}} {}  ⏱ {{elapsed_precise}}",
            self.noun
        ))
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(TICKS);

        self.bar.reset();
        self.bar.set_length(total as u64);
        self.bar.set_style(style);
        self.bar.set_prefix("Working");
        self.bar.enable_steady_tick(Duration::from_millis(80));
        self.bar.println(format!(
            "{} {}",
            cyan("◆"),
            bold(&format!("Starting {total} {}…", self.noun))
        ));
    }

    fn on_item_start(&self, index: usize, _total: usize, label: &str) {
        if let Ok(mut m) = self.start_times.lock() {
            m.insert(index, Instant::now());
        }
        self.bar.set_message(label.to_string());
    }

    fn on_item_complete(&self, index: usize, total: usize, label: &str) {
        let secs = self.elapsed_secs(index);
        self.bar.println(format!(
            "  {} {:>3}/{:<3}  {}  {}",
            green("✓"),
            index + 1,
            total,
            label,
            dim(&format!("{secs:.1}s")),
        ));
        self.bar.inc(1);
    }

    fn on_item_error(&self, index: usize, total: usize, error: &str) {
        let secs = self.elapsed_secs(index);

        let msg: String = if error.chars().count() > 80 {
            error.chars().take(79).chain(std::iter::once('…')).collect()
        } else {
            error.to_string()
        };
        self.bar.println(format!(
            "  {} {:>3}/{:<3}  {}  {}",
            red("✗"),
            index + 1,
            total,
            red(&msg),
            dim(&format!("{secs:.1}s")),
        ));
        self.bar.inc(1);
    }

    fn on_run_complete(&self, total: usize, success_count: usize) {
        let failed = total.saturating_sub(success_count);
        self.bar.finish_and_clear();
        if failed == 0 {
            eprintln!("{} {} {} done", green("✔"), bold(&success_count.to_string()), self.noun);
        } else {
            eprintln!(
                "{} {}/{} {} done  ({} failed)",
                if failed == total { red("✘") } else { cyan("⚠") },
                bold(&success_count.to_string()),
                total,
                self.noun,
                red(&failed.to_string()),
            );
        }
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Generate a single image
  notesmith image "A labelled CMOS inverter schematic" -o inverter.png

  # Extract one note page to JSON
  notesmith extract vlsi/3/page_01.jpg

  # Digitise every numbered folder of page photos
  notesmith digitize-all vlsi

  # Build one narrated video
  notesmith video vlsi/video/1.json vlsi/video/output_1

  # Build videos for 1.json … 8.json, two at a time
  notesmith videos vlsi/video

  # Combine bmsp/0.md … bmsp/17.md and render a PDF
  notesmith combine --input-dir bmsp

ENVIRONMENT VARIABLES:
  GEMINI_API_KEY        Google Gemini API key (also read from .env)
  NOTESMITH_BASE_URL    Override the Gemini API root
  RUST_LOG              Override the log filter (e.g. notesmith=debug)

EXTERNAL TOOLS:
  ffmpeg / ffprobe      required by `video` and `videos`
  wkhtmltopdf           required by `combine` (unless --no-pdf)
"#;

/// Turn photographed notes into study documents and narrated videos.
#[derive(Parser, Debug)]
#[command(
    name = "notesmith",
    version,
    about = "Turn photographed notes into study documents and narrated videos",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    #[command(flatten)]
    service: ServiceArgs,

    /// Print results as JSON.
    #[arg(long, global = true)]
    json: bool,

    /// Disable progress bar.
    #[arg(long, global = true, env = "NOTESMITH_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, global = true, env = "NOTESMITH_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, global = true, env = "NOTESMITH_QUIET")]
    quiet: bool,
}

#[derive(Args, Debug)]
struct ServiceArgs {
    /// Gemini API key (defaults to GEMINI_API_KEY / .env).
    #[arg(long, global = true)]
    api_key: Option<String>,

    /// Gemini API root.
    #[arg(long, global = true, env = "NOTESMITH_BASE_URL")]
    base_url: Option<String>,

    /// Image generation model.
    #[arg(long, global = true, env = "NOTESMITH_IMAGE_MODEL")]
    image_model: Option<String>,

    /// Note-page extraction model.
    #[arg(long, global = true, env = "NOTESMITH_EXTRACTION_MODEL")]
    extraction_model: Option<String>,

    /// Text-to-speech model.
    #[arg(long, global = true, env = "NOTESMITH_TTS_MODEL")]
    tts_model: Option<String>,

    /// Prebuilt TTS voice.
    #[arg(long, global = true, env = "NOTESMITH_VOICE")]
    voice: Option<String>,

    /// Path to a text file containing a custom extraction system prompt.
    #[arg(long, global = true, env = "NOTESMITH_SYSTEM_PROMPT")]
    system_prompt: Option<PathBuf>,

    /// Sections generated at once within one video.
    #[arg(long, global = true, env = "NOTESMITH_SECTION_CONCURRENCY", default_value_t = 4)]
    section_concurrency: usize,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Generate one image from a text prompt.
    Image {
        prompt: String,
        /// Output file (default: generated_image_<millis>.<ext>).
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Synthesize narration for a text into a WAV file.
    Speak {
        text: String,
        #[arg(short, long, default_value = "speech.wav")]
        output: PathBuf,
    },

    /// Extract {Description, Images} from one note-page photo.
    Extract {
        image: PathBuf,
        /// Print the service's raw response instead of the repaired payload.
        #[arg(long)]
        raw: bool,
    },

    /// Digitise one folder of page photos into <folder>/<folder>.json.
    Digitize { folder: PathBuf },

    /// Digitise every subfolder of a base directory.
    DigitizeAll {
        #[arg(default_value = "vlsi")]
        base_dir: PathBuf,
    },

    /// Build one narrated video from a section script.
    Video { script: PathBuf, output_dir: PathBuf },

    /// Build videos for every numbered script in a directory.
    Videos {
        #[arg(default_value = "vlsi/video")]
        base_dir: PathBuf,
        /// Process documents one at a time.
        #[arg(long)]
        sequential: bool,
        /// Documents processed at once.
        #[arg(long, default_value_t = 2)]
        document_concurrency: usize,
    },

    /// Combine numbered markdown files and render them to PDF.
    Combine {
        #[arg(long, default_value = "bmsp")]
        input_dir: PathBuf,
        #[arg(long, default_value_t = 0)]
        first: u32,
        #[arg(long, default_value_t = 17)]
        last: u32,
        /// Combined markdown (default: <input-dir>/combined_notes.md).
        #[arg(long)]
        output: Option<PathBuf>,
        /// Rendered PDF (default: <input-dir>/combined_notes.pdf).
        #[arg(long)]
        pdf: Option<PathBuf>,
        /// Only write the combined markdown.
        #[arg(long)]
        no_pdf: bool,
        /// HTML → PDF command.
        #[arg(long, env = "NOTESMITH_PDF_RENDERER", default_value = "wkhtmltopdf")]
        renderer: PathBuf,
    },
}

impl Command {
    /// `None` when the command has no single bar to drive. Parallel
    /// `videos` runs interleave sections of several documents, so they log
    /// instead.
    fn progress_noun(&self) -> Option<&'static str> {
        match self {
            Command::Digitize { .. } | Command::DigitizeAll { .. } => Some("pages"),
            Command::Video { .. } => Some("sections"),
            Command::Videos {
                sequential,
                document_concurrency,
                ..
            } if *sequential || *document_concurrency <= 1 => Some("sections"),
            _ => None,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The progress bar replaces INFO logs; --verbose always wins.
    let noun = cli.command.progress_noun();
    let show_progress = !cli.quiet && !cli.no_progress && !cli.json && noun.is_some();
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    let progress_cb: Option<ProgressCallback> = match noun {
        Some(noun) if show_progress => {
            Some(CliProgressCallback::new(noun) as Arc<dyn PipelineProgressCallback>)
        }
        _ => None,
    };

    match cli.command {
        Command::Image { ref prompt, ref output } => {
            let config = build_config(&cli, progress_cb).await?;
            let generator = resolve_image_generator(&config)?;
            match generator
                .generate(prompt, output.as_deref())
                .await
                .context("Image generation failed")?
            {
                Some(path) => println!("{}", path.display()),
                None => bail!("The model returned no image data"),
            }
        }

        Command::Speak { ref text, ref output } => {
            let config = build_config(&cli, progress_cb).await?;
            let synthesizer = resolve_speech_synthesizer(&config)?;
            match synthesizer
                .synthesize(text, output)
                .await
                .context("Speech synthesis failed")?
            {
                Some(path) => println!("{}", path.display()),
                None => bail!("The model returned no audio data"),
            }
        }

        Command::Extract { ref image, raw } => {
            let config = build_config(&cli, progress_cb).await?;
            let extractor = resolve_notes_extractor(&config)?;
            let bytes = tokio::fs::read(image)
                .await
                .with_context(|| format!("Failed to read {}", image.display()))?;
            let response = extractor.extract(&bytes).await.context("Extraction failed")?;
            let out = if raw {
                response
            } else {
                let page = locate_note_page(&response)
                    .context("The response contained no usable note-page JSON")?;
                serde_json::to_value(page)?
            };
            println!("{}", serde_json::to_string_pretty(&out)?);
        }

        Command::Digitize { ref folder } => {
            let config = build_config(&cli, progress_cb).await?;
            let outcome = process_folder(folder, &config).await;
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&outcome)?);
            } else if !cli.quiet {
                print_folder_outcome(&outcome);
            }
            if !outcome.is_success() {
                std::process::exit(1);
            }
        }

        Command::DigitizeAll { ref base_dir } => {
            let config = build_config(&cli, progress_cb).await?;
            let report = process_all_folders(base_dir, &config).await;
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else if !cli.quiet {
                for outcome in &report.outcomes {
                    print_folder_outcome(outcome);
                }
                eprintln!(
                    "{}  {}/{} folders  {} images  {} prompts",
                    if report.failed() == 0 { green("✔") } else { cyan("⚠") },
                    report.successful(),
                    report.outcomes.len(),
                    report.total_images_processed(),
                    report.total_prompts(),
                );
            }
        }

        Command::Video {
            ref script,
            ref output_dir,
        } => {
            let config = build_config(&cli, progress_cb).await?;
            let video = generate_video_from_json(script, output_dir, &config)
                .await
                .with_context(|| format!("Video generation failed for {}", script.display()))?;
            println!("{}", video.display());
        }

        Command::Videos {
            ref base_dir,
            sequential,
            document_concurrency,
        } => {
            let mut config = build_config(&cli, progress_cb).await?;
            config.document_concurrency = document_concurrency.max(1);
            let report = process_all_videos(base_dir, &config, !sequential)
                .await
                .context("Batch video generation failed")?;
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else if !cli.quiet {
                for d in &report.documents {
                    match (d.success, d.skipped) {
                        (true, true) => {
                            eprintln!("  {} {}  {}", dim("="), d.script, dim("already built"))
                        }
                        (true, false) => eprintln!("  {} {}", green("✓"), d.script),
                        (false, _) => eprintln!(
                            "  {} {}  {}",
                            red("✗"),
                            d.script,
                            red(d.error.as_deref().unwrap_or("failed"))
                        ),
                    }
                }
            }
        }

        Command::Combine {
            ref input_dir,
            first,
            last,
            ref output,
            ref pdf,
            no_pdf,
            ref renderer,
        } => {
            if first > last {
                bail!("--first ({first}) must be <= --last ({last})");
            }
            let config = MarkdownConfig {
                input_dir: input_dir.clone(),
                first,
                last,
                output_file: output
                    .clone()
                    .unwrap_or_else(|| input_dir.join("combined_notes.md")),
                pdf_file: pdf
                    .clone()
                    .unwrap_or_else(|| input_dir.join("combined_notes.pdf")),
                renderer: RendererCommand {
                    program: renderer.clone(),
                    ..RendererCommand::default()
                },
                ..MarkdownConfig::default()
            };

            if no_pdf {
                let md = combine_markdown_files(&config)
                    .await
                    .context("Failed to combine markdown files")?;
                println!("{}", md.display());
            } else {
                let report = combine_and_render(&config)
                    .await
                    .context("Failed to build the notes PDF")?;
                if cli.json {
                    println!("{}", serde_json::to_string_pretty(&report)?);
                } else {
                    println!("{}", config.output_file.display());
                    match report.renderer_error {
                        None => println!("{}", report.pdf_path.display()),
                        Some(ref e) => {
                            eprintln!("{} PDF not rendered: {e}", red("✗"));
                            eprintln!("   HTML kept at {}", report.html_path.display());
                        }
                    }
                }
            }
        }
    }

    Ok(())
}

/// Map CLI args to `PipelineConfig`.
async fn build_config(cli: &Cli, progress: Option<ProgressCallback>) -> Result<PipelineConfig> {
    let s = &cli.service;
    let mut builder = PipelineConfig::builder()
        .api_key_from_env()
        .section_concurrency(s.section_concurrency);

    if let Some(ref key) = s.api_key {
        builder = builder.api_key(key.as_str());
    }
    if let Some(ref url) = s.base_url {
        builder = builder.api_base_url(url.as_str());
    }
    if let Some(ref m) = s.image_model {
        builder = builder.image_model(m.as_str());
    }
    if let Some(ref m) = s.extraction_model {
        builder = builder.extraction_model(m.as_str());
    }
    if let Some(ref m) = s.tts_model {
        builder = builder.tts_model(m.as_str());
    }
    if let Some(ref v) = s.voice {
        builder = builder.voice(v.as_str());
    }
    if let Some(ref path) = s.system_prompt {
        let prompt = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read system prompt from {:?}", path))?;
        builder = builder.system_prompt(prompt);
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}

fn print_folder_outcome(outcome: &FolderOutcome) {
    match outcome {
        FolderOutcome::Processed(s) => {
            eprintln!(
                "  {} Folder {}: {}/{} images processed",
                green("✓"),
                s.folder,
                s.images_processed,
                s.total_images
            );
            eprintln!("    JSON: {}", s.json_file.display());
            eprintln!("    Image prompts: {}", s.image_prompts_count);
        }
        FolderOutcome::Failed { folder, error } => {
            eprintln!("  {} Folder {}: {}", red("✗"), folder, red(error));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn noun(args: &[&str]) -> Option<&'static str> {
        let mut argv = vec!["notesmith"];
        argv.extend_from_slice(args);
        Cli::try_parse_from(argv).unwrap().command.progress_noun()
    }

    #[test]
    fn parallel_videos_run_without_shared_bar() {
        assert_eq!(noun(&["videos"]), None);
        assert_eq!(noun(&["videos", "--document-concurrency", "3"]), None);
    }

    #[test]
    fn sequential_runs_keep_the_bar() {
        assert_eq!(noun(&["videos", "--sequential"]), Some("sections"));
        assert_eq!(noun(&["videos", "--document-concurrency", "1"]), Some("sections"));
        assert_eq!(noun(&["video", "1.json", "out"]), Some("sections"));
        assert_eq!(noun(&["digitize-all"]), Some("pages"));
        assert_eq!(noun(&["combine"]), None);
    }
}

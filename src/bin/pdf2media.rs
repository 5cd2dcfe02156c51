//! CLI binary for pdf2media.
//!
//! A thin shim over the library crate: flags map to `ConversionConfig`, the
//! job runs on a `ConversionJob` worker, and the foreground thread keeps a
//! spinner alive until the tri-state outcome arrives.

use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use pdf2media::{
    CancelToken, ConversionConfig, ConversionJob, ConversionMode, ConversionProgressCallback, ConversionRequest,
    ItemStatus, JobOutcome, JobResult, ProgressCallback, RenderStage, Selection, TextColor,
};
use std::io;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn yellow(s: &str) -> String {
    format!("\x1b[33m{s}\x1b[0m")
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

/// Indeterminate spinner plus one log line per finished input.
struct CliProgressCallback {
    bar: ProgressBar,
    total: AtomicUsize,
    index: AtomicUsize,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new_spinner();
        let style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}  {elapsed:.dim}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(TICKS);
        bar.set_style(style);
        bar.set_prefix("Preparing");
        bar.enable_steady_tick(Duration::from_millis(80));
        Arc::new(Self {
            bar,
            total: AtomicUsize::new(0),
            index: AtomicUsize::new(0),
        })
    }

    fn tick(&self) {
        self.bar.tick();
    }

    fn finish(&self) {
        self.bar.finish_and_clear();
    }
}

impl ConversionProgressCallback for CliProgressCallback {
    fn on_job_start(&self, total_inputs: usize) {
        self.total.store(total_inputs, Ordering::SeqCst);
        self.bar.println(format!(
            "{} {}",
            cyan("◆"),
            bold(&format!(
                "Converting {total_inputs} input{}…",
                if total_inputs == 1 { "" } else { "s" }
            ))
        ));
    }

    fn on_item_start(&self, index: usize, total: usize, name: &str) {
        self.index.store(index, Ordering::SeqCst);
        self.bar.set_prefix(format!("{index}/{total}"));
        self.bar.set_message(name.to_string());
    }

    fn on_item_stage(&self, name: &str, stage: RenderStage) {
        if !stage.is_terminal() {
            self.bar.set_message(format!("{name}  {}", dim(&stage.to_string())));
        }
    }

    fn on_render_progress(&self, name: &str, fraction: f32) {
        self.bar.set_message(format!(
            "{name}  {}",
            dim(&format!("rendering {:>3.0}%", fraction * 100.0))
        ));
    }

    fn on_item_complete(&self, name: &str, status: &ItemStatus) {
        let index = self.index.load(Ordering::SeqCst);
        let total = self.total.load(Ordering::SeqCst);
        let line = match status {
            ItemStatus::Converted => format!("  {} {:>3}/{:<3}  {}", green("✓"), index, total, name),
            ItemStatus::Skipped => format!(
                "  {} {:>3}/{:<3}  {}  {}",
                yellow("•"),
                index,
                total,
                name,
                dim("exists, skipped")
            ),
            ItemStatus::Failed { stage, reason } => {
                let first = reason.lines().next().unwrap_or_default();
                format!(
                    "  {} {:>3}/{:<3}  {}  {} {}",
                    red("✗"),
                    index,
                    total,
                    name,
                    dim(&format!("[{stage}]")),
                    red(first)
                )
            }
        };
        self.bar.println(line);
    }
}

const AFTER_HELP: &str = r#"MODES:
  wind     per-line CSV wind speeds → MP3, 30 s per day (max 24 days)
  bpm      3-digit heart rates → 12-minute MP3 pulse train
  rgb      3-digit colour triples → 12-minute MP4 colour fade (520×520)
  clouds   page images → 12-minute MP4 horizontal pan (750×360)
  text     page text → MP4 right-to-left scroller (600×225 @ 30 fps)
  slideshow
           folder of PNG/JPG images → MP4, 4 s per image (1280×720)

  With --stitch-images, clouds reads a folder of images instead of PDFs
  and writes one scrolling video named after the folder.

EXAMPLES:
  # One document, artifact written next to it
  pdf2media bpm 16001.pdf

  # Every PDF in a folder, artifacts into out/
  pdf2media rgb scans/ --output-dir out

  # Scrolling text in a fixed colour
  pdf2media text 5001.pdf --color '#00ffcc'

  # Drawings folder → drawings_slideshow.mp4 beside it
  pdf2media slideshow drawings/

  # Machine-readable job report
  pdf2media wind weather/ --json > report.json

ENVIRONMENT VARIABLES:
  PDFIUM_LIB_PATH   Path to a libpdfium shared library
  RUST_LOG          Overrides the log filter (e.g. pdf2media=debug)
"#;

/// Convert PDF documents into MP3 soundscapes and MP4 videos.
#[derive(Parser, Debug)]
#[command(
    name = "pdf2media",
    version,
    about = "Convert PDF documents into MP3 soundscapes and MP4 videos",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Conversion mode: wind, bpm, rgb, clouds, text or slideshow.
    mode: ConversionMode,

    /// A PDF file, or a directory whose PDFs are converted in turn.
    /// Slideshow and `--stitch-images` take a directory of images.
    path: PathBuf,

    /// Clouds: stitch the images in PATH into one video.
    #[arg(long, env = "PDF2MEDIA_STITCH_IMAGES")]
    stitch_images: bool,

    /// Write artifacts here instead of next to each source document.
    #[arg(short, long, env = "PDF2MEDIA_OUTPUT_DIR")]
    output_dir: Option<PathBuf>,

    /// Base name for the artifact (single-file and image-folder modes).
    #[arg(long)]
    name: Option<String>,

    /// Encoder binary.
    #[arg(long, env = "PDF2MEDIA_FFMPEG", default_value = "ffmpeg")]
    ffmpeg: PathBuf,

    /// PDF user password for encrypted documents.
    #[arg(long, env = "PDF2MEDIA_PASSWORD")]
    password: Option<String>,

    /// Characters dropped from the start of each extracted line.
    #[arg(long, env = "PDF2MEDIA_LINE_PREFIX", default_value_t = 2)]
    line_prefix: usize,

    /// Ambient loop used by the wind mode.
    #[arg(long, env = "PDF2MEDIA_WIND_LOOP", default_value = pdf2media::config::DEFAULT_WIND_LOOP)]
    wind_loop: PathBuf,

    /// TrueType font used by the text mode.
    #[arg(long, env = "PDF2MEDIA_FONT", default_value = pdf2media::config::DEFAULT_FONT)]
    font: PathBuf,

    /// Text colour: `palette` or `#RRGGBB`.
    #[arg(long, env = "PDF2MEDIA_COLOR", default_value = "palette", value_parser = parse_color)]
    color: TextColor,

    /// Characters per scrolling-text chunk.
    #[arg(long, env = "PDF2MEDIA_CHUNK_SIZE", default_value_t = 5)]
    chunk_size: usize,

    /// Print the job report as JSON on stdout.
    #[arg(long, env = "PDF2MEDIA_JSON")]
    json: bool,

    /// Disable the spinner.
    #[arg(long, env = "PDF2MEDIA_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "PDF2MEDIA_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "PDF2MEDIA_QUIET")]
    quiet: bool,
}

fn parse_color(s: &str) -> Result<TextColor, String> {
    TextColor::parse(s).map_err(|e| e.to_string())
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The spinner provides the feedback that matters; library INFO logs
    // would tear it, so they are only shown without it.
    let show_progress = !cli.quiet && !cli.no_progress && !cli.json;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .with_writer(io::stderr)
        .init();

    // ── Build config ─────────────────────────────────────────────────────
    let progress = if show_progress {
        Some(CliProgressCallback::new())
    } else {
        None
    };
    let config = build_config(&cli, progress.clone().map(|p| p as ProgressCallback))?;
    install_ctrl_c(config.cancel.clone());

    let mut request =
        ConversionRequest::new(cli.mode, Selection::from_path(&cli.path)).with_stitch_images(cli.stitch_images);
    if let Some(ref name) = cli.name {
        request = request.with_output_name(name.clone());
    }

    // ── Run conversion ───────────────────────────────────────────────────
    let mut handle = ConversionJob::spawn(request, config);
    while !handle.is_finished() {
        if let Some(ref p) = progress {
            p.tick();
        }
        std::thread::sleep(Duration::from_millis(100));
    }
    if let Some(ref p) = progress {
        p.finish();
    }

    let result = handle.wait();
    if cli.json {
        if let JobResult::Completed(ref report) = result {
            println!(
                "{}",
                serde_json::to_string_pretty(report).context("Failed to serialise job report")?
            );
        }
    }

    let outcome = result.outcome();
    if !cli.quiet {
        print_summary(&result, &outcome);
    }

    match outcome {
        JobOutcome::Failed { .. } => std::process::exit(1),
        JobOutcome::Success | JobOutcome::Skipped => Ok(()),
    }
}

fn print_summary(result: &JobResult, outcome: &JobOutcome) {
    match result {
        JobResult::Aborted(e) => eprintln!("{} {}", red("✘"), e),
        JobResult::Completed(report) => {
            let line = format!(
                "{} converted, {} skipped, {} failed  {}",
                report.converted(),
                report.skipped(),
                report.failed(),
                dim(&format!("{:.1}s", report.total_duration_ms as f64 / 1000.0)),
            );
            let mark = match outcome {
                JobOutcome::Success => green("✔"),
                JobOutcome::Skipped => yellow("•"),
                JobOutcome::Failed { .. } => red("✘"),
            };
            eprintln!("{mark} {}", outcome.message());
            eprintln!("   {line}");
        }
    }
}

/// Map CLI args to `ConversionConfig`.
fn build_config(cli: &Cli, progress: Option<ProgressCallback>) -> Result<ConversionConfig> {
    let mut builder = ConversionConfig::builder()
        .ffmpeg_path(cli.ffmpeg.clone())
        .line_prefix_strip(cli.line_prefix)
        .wind_loop_path(cli.wind_loop.clone())
        .font_path(cli.font.clone())
        .text_color(cli.color)
        .text_chunk_size(cli.chunk_size);

    if let Some(ref dir) = cli.output_dir {
        builder = builder.output_dir(dir.clone());
    }
    if let Some(ref pwd) = cli.password {
        builder = builder.password(pwd.clone());
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}

/// Cancel the job on the first Ctrl-C.
fn install_ctrl_c(token: CancelToken) {
    std::thread::spawn(move || {
        let Ok(rt) = tokio::runtime::Builder::new_current_thread().enable_all().build() else {
            return;
        };
        if rt.block_on(tokio::signal::ctrl_c()).is_ok() {
            eprintln!("{} cancelling…", yellow("⚠"));
            token.cancel();
        }
    });
}

//! # pdf2media
//!
//! Turn numeric tables and page images extracted from PDF documents into
//! fixed-length media: two MP3 soundscapes and three MP4 videos. Two
//! folder modes turn a directory of images into a single MP4.
//!
//! ## Pipeline Overview
//!
//! ```text
//! PDF
//!  │
//!  ├─ 1. Input     resolve one file or every PDF in a directory
//!  ├─ 2. Extract   page text / page bitmaps via pdfium (spawn_blocking)
//!  ├─ 3. Envelope  clean tokens → BPM | RGB | wind | cloud strip | text chunks
//!  ├─ 4. Render    raw WAV (hound) or raw frames piped to the encoder
//!  └─ 5. Encode    ffmpeg transcode → <name>.mp3 / <name>.mp4
//! ```
//!
//! | Mode     | Input          | Output | Length                     |
//! |----------|----------------|--------|----------------------------|
//! | `wind`   | per-line CSV   | MP3    | 30 s per day, ≤ 24 days    |
//! | `bpm`    | 3-digit groups | MP3    | 12 minutes                 |
//! | `rgb`    | 3-digit groups | MP4    | 12 minutes, 520×520 @ 25   |
//! | `clouds` | page bitmaps   | MP4    | 12 minutes, 750×360 @ 25   |
//! | `text`   | page text      | MP4    | until the last chunk exits |
//! | `slideshow` | image folder | MP4   | 4 s per image, 1280×720 @ 25 |
//!
//! `clouds` also accepts a folder of images when the request sets
//! [`ConversionRequest::with_stitch_images`]; the images become one strip
//! and one video named after the folder.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use pdf2media::{convert, ConversionConfig, ConversionMode, ConversionRequest, Selection};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ConversionConfig::default();
//!     let request = ConversionRequest::new(ConversionMode::Bpm, Selection::from_path("16001.pdf"));
//!     let report = convert(&request, &config).await?;
//!     println!("{}", report.outcome().message());
//!     Ok(())
//! }
//! ```
//!
//! Long jobs can run off the caller's thread with [`ConversionJob::spawn`];
//! the returned [`JobHandle`] is polled, cancelled or waited on.
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `pdf2media` binary (clap + anyhow + tracing-subscriber + indicatif) |
//!
//! ## Runtime requirements
//!
//! * a pdfium shared library (system path or `PDFIUM_LIB_PATH`)
//! * an `ffmpeg` binary with `libmp3lame` and `libx264`
//! * `assets/Wind_Loop.wav` for `wind`, and an LCD TrueType font for `text`

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod convert;
pub mod error;
pub mod job;
pub mod output;
pub mod pipeline;
pub mod progress;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{ConversionConfig, ConversionConfigBuilder, ConversionMode, TextColor};
pub use convert::{convert, convert_file, convert_sync};
pub use error::Pdf2MediaError;
pub use job::{CancelToken, ConversionJob, JobHandle, JobResult};
pub use output::{ConversionRequest, ItemOutcome, ItemStatus, JobOutcome, JobReport, Selection};
pub use pipeline::encode::{FfmpegEncoder, FrameSink, MediaEncoder, TranscodeProfile, VideoFormat};
pub use pipeline::extract::{PdfBackend, PdfiumBackend};
pub use progress::{ConversionProgressCallback, NoopProgressCallback, ProgressCallback, RenderStage};

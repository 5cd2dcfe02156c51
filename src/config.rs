//! Configuration types for PDF-to-media conversion.
//!
//! All conversion behaviour is controlled through [`ConversionConfig`], built
//! via its [`ConversionConfigBuilder`]. The UI owns one config per submitted
//! job (selected colour, output folder, asset paths) and hands it to the
//! dispatcher.
//!
//! The timing constants (12-minute target, sample and frame rates, frame
//! sizes) are not configurable; they live next to the renderer that uses them.

use crate::error::Pdf2MediaError;
use crate::job::CancelToken;
use crate::pipeline::encode::{FfmpegEncoder, MediaEncoder};
use crate::pipeline::extract::{PdfBackend, PdfiumBackend};
use crate::progress::ProgressCallback;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

/// Default location of the ambient wind loop, relative to the working directory.
pub const DEFAULT_WIND_LOOP: &str = "assets/Wind_Loop.wav";

/// Default LCD-style font used by the scrolling-text renderer.
pub const DEFAULT_FONT: &str = "assets/JdLcdRoundedRegular-vXwE.ttf";

/// Configuration for a PDF-to-media conversion.
///
/// # Example
/// ```rust
/// use pdf2media::{ConversionConfig, TextColor};
///
/// let config = ConversionConfig::builder()
///     .output_dir("out")
///     .text_color(TextColor::Fixed([255, 255, 255]))
///     .text_chunk_size(8)
///     .build()
///     .unwrap();
/// assert_eq!(config.text_chunk_size, 8);
/// ```
#[derive(Clone)]
pub struct ConversionConfig {
    /// Directory that receives the intermediates and final artifacts.
    /// If None, each artifact is written next to its source document.
    pub output_dir: Option<PathBuf>,

    /// Encoder binary. Default: `ffmpeg` (resolved through `PATH`).
    pub ffmpeg_path: PathBuf,

    /// PDF user password for encrypted documents.
    pub password: Option<String>,

    /// Characters dropped from the start of every extracted text line. Default: 2.
    ///
    /// The numeric tables these documents carry are prefixed with layout
    /// markers by the extraction step; removing a fixed prefix per line keeps
    /// the three-digit groups aligned.
    pub line_prefix_strip: usize,

    /// Ambient noise loop scaled by the wind envelope.
    pub wind_loop_path: PathBuf,

    /// TrueType font for the Text mode.
    pub font_path: PathBuf,

    /// Colour of the scrolling text. Default: [`TextColor::Palette`].
    pub text_color: TextColor,

    /// Characters per scrolling-text chunk. Default: 5.
    pub text_chunk_size: usize,

    /// Pre-constructed PDF backend. If None, pdfium is bound on first use.
    pub pdf_backend: Option<Arc<dyn PdfBackend>>,

    /// Pre-constructed media encoder. If None, [`FfmpegEncoder`] is used.
    pub encoder: Option<Arc<dyn MediaEncoder>>,

    /// Optional progress observer.
    pub progress_callback: Option<ProgressCallback>,

    /// Cooperative cancellation flag shared with the job handle.
    pub cancel: CancelToken,
}

impl Default for ConversionConfig {
    fn default() -> Self {
        Self {
            output_dir: None,
            ffmpeg_path: PathBuf::from("ffmpeg"),
            password: None,
            line_prefix_strip: 2,
            wind_loop_path: PathBuf::from(DEFAULT_WIND_LOOP),
            font_path: PathBuf::from(DEFAULT_FONT),
            text_color: TextColor::default(),
            text_chunk_size: 5,
            pdf_backend: None,
            encoder: None,
            progress_callback: None,
            cancel: CancelToken::new(),
        }
    }
}

impl fmt::Debug for ConversionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConversionConfig")
            .field("output_dir", &self.output_dir)
            .field("ffmpeg_path", &self.ffmpeg_path)
            .field("line_prefix_strip", &self.line_prefix_strip)
            .field("wind_loop_path", &self.wind_loop_path)
            .field("font_path", &self.font_path)
            .field("text_color", &self.text_color)
            .field("text_chunk_size", &self.text_chunk_size)
            .field("pdf_backend", &self.pdf_backend.as_ref().map(|_| "<dyn PdfBackend>"))
            .field("encoder", &self.encoder.as_ref().map(|_| "<dyn MediaEncoder>"))
            .field("cancelled", &self.cancel.is_cancelled())
            .finish()
    }
}

impl ConversionConfig {
    /// Create a new builder for `ConversionConfig`.
    pub fn builder() -> ConversionConfigBuilder {
        ConversionConfigBuilder {
            config: Self::default(),
        }
    }

    /// The configured PDF backend, or a lazily-bound pdfium backend.
    pub fn backend(&self) -> Arc<dyn PdfBackend> {
        match self.pdf_backend {
            Some(ref b) => Arc::clone(b),
            None => Arc::new(PdfiumBackend::new()),
        }
    }

    /// The configured encoder, or an ffmpeg encoder using `ffmpeg_path`.
    pub fn media_encoder(&self) -> Arc<dyn MediaEncoder> {
        match self.encoder {
            Some(ref e) => Arc::clone(e),
            None => Arc::new(FfmpegEncoder::new(self.ffmpeg_path.clone())),
        }
    }
}

/// Builder for [`ConversionConfig`].
#[derive(Debug)]
pub struct ConversionConfigBuilder {
    config: ConversionConfig,
}

impl ConversionConfigBuilder {
    pub fn output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.output_dir = Some(dir.into());
        self
    }

    pub fn ffmpeg_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.ffmpeg_path = path.into();
        self
    }

    pub fn password(mut self, pwd: impl Into<String>) -> Self {
        self.config.password = Some(pwd.into());
        self
    }

    pub fn line_prefix_strip(mut self, n: usize) -> Self {
        self.config.line_prefix_strip = n;
        self
    }

    pub fn wind_loop_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.wind_loop_path = path.into();
        self
    }

    pub fn font_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.font_path = path.into();
        self
    }

    pub fn text_color(mut self, color: TextColor) -> Self {
        self.config.text_color = color;
        self
    }

    pub fn text_chunk_size(mut self, n: usize) -> Self {
        self.config.text_chunk_size = n;
        self
    }

    pub fn pdf_backend(mut self, backend: Arc<dyn PdfBackend>) -> Self {
        self.config.pdf_backend = Some(backend);
        self
    }

    pub fn encoder(mut self, encoder: Arc<dyn MediaEncoder>) -> Self {
        self.config.encoder = Some(encoder);
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    pub fn cancel_token(mut self, token: CancelToken) -> Self {
        self.config.cancel = token;
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ConversionConfig, Pdf2MediaError> {
        let c = &self.config;
        if c.text_chunk_size == 0 {
            return Err(Pdf2MediaError::InvalidConfig(
                "Text chunk size must be ≥ 1".into(),
            ));
        }
        if c.line_prefix_strip > 16 {
            return Err(Pdf2MediaError::InvalidConfig(format!(
                "Line prefix strip must be 0–16, got {}",
                c.line_prefix_strip
            )));
        }
        if c.ffmpeg_path.as_os_str().is_empty() {
            return Err(Pdf2MediaError::InvalidConfig(
                "ffmpeg path must not be empty".into(),
            ));
        }
        Ok(self.config)
    }
}

// ── Enums ────────────────────────────────────────────────────────────────

/// Which envelope/renderer pair a job runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConversionMode {
    /// Comma-separated daily wind intensities → ambient MP3.
    Wind,
    /// Three-digit beats-per-minute values → pulse-train MP3.
    Bpm,
    /// Three-digit RGB triples → colour-gradient MP4.
    Rgb,
    /// Page rasters → horizontally scrolling MP4.
    Clouds,
    /// Page text → scrolling LCD-text MP4.
    Text,
    /// A folder of images → MP4 showing each image for four seconds.
    Slideshow,
}

impl ConversionMode {
    pub const ALL: [ConversionMode; 6] = [
        ConversionMode::Wind,
        ConversionMode::Bpm,
        ConversionMode::Rgb,
        ConversionMode::Clouds,
        ConversionMode::Text,
        ConversionMode::Slideshow,
    ];

    /// Extension of the final artifact.
    pub fn output_extension(self) -> &'static str {
        if self.is_audio() {
            "mp3"
        } else {
            "mp4"
        }
    }

    pub fn is_audio(self) -> bool {
        matches!(self, ConversionMode::Wind | ConversionMode::Bpm)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ConversionMode::Wind => "wind",
            ConversionMode::Bpm => "bpm",
            ConversionMode::Rgb => "rgb",
            ConversionMode::Clouds => "clouds",
            ConversionMode::Text => "text",
            ConversionMode::Slideshow => "slideshow",
        }
    }
}

impl fmt::Display for ConversionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ConversionMode {
    type Err = Pdf2MediaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_lowercase();
        ConversionMode::ALL
            .into_iter()
            .find(|m| m.as_str() == lower)
            .ok_or_else(|| {
                Pdf2MediaError::InvalidConfig(format!(
                    "Unknown mode '{s}' (expected wind, bpm, rgb, clouds, text or slideshow)"
                ))
            })
    }
}

/// Colour of the scrolling text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum TextColor {
    /// Pick from [`TEXT_PALETTE`] by the document's numeric name.
    #[default]
    Palette,
    /// Always use this RGB colour.
    Fixed([u8; 3]),
}

/// Six-colour cycle for numerically named documents.
pub const TEXT_PALETTE: [[u8; 3]; 6] = [
    [255, 0, 0],
    [255, 127, 0],
    [255, 255, 0],
    [0, 255, 0],
    [0, 255, 255],
    [255, 0, 255],
];

impl TextColor {
    /// Resolve the colour for a document named `stem`.
    ///
    /// Palette mode keys on `(stem mod 1000 - 1) mod 6`, so `5001` and `4001`
    /// share red. Stems that are not integers fall back to white.
    pub fn resolve(self, stem: &str) -> [u8; 3] {
        match self {
            TextColor::Fixed(rgb) => rgb,
            TextColor::Palette => match stem.trim().parse::<i64>() {
                Ok(n) => {
                    let idx = (n.rem_euclid(1000) - 1).rem_euclid(6) as usize;
                    TEXT_PALETTE[idx]
                }
                Err(_) => [255, 255, 255],
            },
        }
    }

    /// Parse `palette` or a `#RRGGBB` / `RRGGBB` hex string.
    pub fn parse(s: &str) -> Result<Self, Pdf2MediaError> {
        let s = s.trim();
        if s.eq_ignore_ascii_case("palette") {
            return Ok(TextColor::Palette);
        }
        let hex = s.trim_start_matches('#');
        let bad = || Pdf2MediaError::InvalidConfig(format!("Invalid colour '{s}', expected #RRGGBB"));
        if hex.len() != 6 || !hex.is_ascii() {
            return Err(bad());
        }
        let mut rgb = [0u8; 3];
        for (i, channel) in rgb.iter_mut().enumerate() {
            *channel = u8::from_str_radix(&hex[i * 2..i * 2 + 2], 16).map_err(|_| bad())?;
        }
        Ok(TextColor::Fixed(rgb))
    }
}

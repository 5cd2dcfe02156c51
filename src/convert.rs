//! Conversion dispatcher: request → per-input render/transcode → report.
//!
//! Every input walks the [`RenderStage`] state machine on its own:
//!
//! 1. skip if the final artifact already exists
//! 2. remove stale intermediates from an earlier failed run
//! 3. render the raw intermediate (`spawn_blocking`: pdfium and the sample
//!    loops are CPU-bound)
//! 4. transcode into `<name>.part.<ext>`, rename onto the final path, and
//!    delete the intermediate
//!
//! A renderer failure leaves the intermediate for inspection; an encoder
//! failure keeps the intermediate and discards the partial output. In
//! directory mode a failed input is recorded and the batch moves on.
//!
//! Image-folder jobs (slideshow, stitched clouds) run the same state machine
//! once, with the whole folder as the input.

use crate::config::{ConversionConfig, ConversionMode};
use crate::error::Pdf2MediaError;
use crate::output::{ConversionRequest, ItemOutcome, ItemStatus, JobReport};
use crate::pipeline::audio::{self, WindLoop};
use crate::pipeline::encode::{FrameSink, MediaEncoder, TranscodeProfile, VideoFormat};
use crate::pipeline::envelope::{BpmEnvelope, CloudStrip, RgbEnvelope, TextChunks, WindEnvelope, CLOUD_ZOOM};
use crate::pipeline::glyph::GlyphPainter;
use crate::pipeline::input::{self, ArtifactPaths, Source};
use crate::pipeline::video::{self, CLOUD_FORMAT, RGB_FORMAT, SLIDESHOW_FORMAT, TEXT_FORMAT};
use crate::pipeline::RenderContext;
use crate::progress::RenderStage;
use std::path::Path;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Run a whole request: one document, every PDF in a directory, or one
/// folder of images.
///
/// # Returns
/// `Ok(JobReport)` once every input has been attempted, even if some
/// failed (check [`JobReport::outcome`]).
///
/// # Errors
/// Returns `Err(Pdf2MediaError)` only when the selection itself is unusable:
/// a missing or non-PDF file, a directory without PDFs, or a file or
/// image-less folder given to an image-folder mode.
pub async fn convert(request: &ConversionRequest, config: &ConversionConfig) -> Result<JobReport, Pdf2MediaError> {
    let total_start = Instant::now();
    info!("Starting {} conversion: {}", request.mode, request.selection.path().display());

    let image_folder = request.reads_image_folder();
    let inputs: Vec<Source> = if image_folder {
        vec![Source::ImageFolder(input::resolve_image_folder(&request.selection, request.mode)?)]
    } else {
        input::resolve_inputs(&request.selection)?
            .into_iter()
            .map(Source::Pdf)
            .collect()
    };
    let single_file = !request.selection.is_batch();
    let name_override = if single_file || image_folder {
        request.output_name.as_deref()
    } else {
        None
    };

    if let Some(ref cb) = config.progress_callback {
        cb.on_job_start(inputs.len());
    }

    let mut items = Vec::with_capacity(inputs.len());
    for (idx, source) in inputs.iter().enumerate() {
        if config.cancel.is_cancelled() {
            info!("Cancelled; {} inputs not started", inputs.len() - idx);
            break;
        }
        let paths = ArtifactPaths::for_source(source, request.mode, config.output_dir.as_deref(), name_override);
        if let Some(ref cb) = config.progress_callback {
            cb.on_item_start(idx + 1, inputs.len(), &paths.name);
        }
        let name = paths.name.clone();
        let item = convert_item(source, request.mode, paths, single_file, config).await;
        if let Some(ref cb) = config.progress_callback {
            cb.on_item_complete(&name, &item.status);
        }
        items.push(item);
    }

    let report = JobReport {
        mode: Some(request.mode),
        items,
        total_duration_ms: total_start.elapsed().as_millis() as u64,
    };

    info!(
        "Job complete: {} converted, {} skipped, {} failed in {}ms",
        report.converted(),
        report.skipped(),
        report.failed(),
        report.total_duration_ms
    );
    if let Some(ref cb) = config.progress_callback {
        cb.on_job_complete(report.converted(), report.skipped(), report.failed());
    }
    Ok(report)
}

/// Synchronous wrapper around [`convert`].
///
/// Creates a temporary tokio runtime internally.
pub fn convert_sync(request: &ConversionRequest, config: &ConversionConfig) -> Result<JobReport, Pdf2MediaError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| Pdf2MediaError::Internal(format!("Failed to create tokio runtime: {}", e)))?
        .block_on(convert(request, config))
}

/// Convert one document and surface its failure as `Err`.
///
/// `Ok` carries either [`ItemStatus::Converted`] or [`ItemStatus::Skipped`].
/// The slideshow reads folders only and is rejected here.
pub async fn convert_file(
    pdf: impl AsRef<Path>,
    mode: ConversionMode,
    config: &ConversionConfig,
) -> Result<ItemOutcome, Pdf2MediaError> {
    let pdf = pdf.as_ref();
    if mode == ConversionMode::Slideshow {
        return Err(Pdf2MediaError::FolderRequired {
            path: pdf.to_path_buf(),
            mode,
        });
    }
    input::validate_pdf(pdf)?;
    let source = Source::Pdf(pdf.to_path_buf());
    let paths = ArtifactPaths::new(pdf, mode, config.output_dir.as_deref(), None);
    let start = Instant::now();
    let output = paths.output.clone();
    let status = run_item(&source, mode, &paths, true, config)
        .await
        .map_err(|(_, e)| e)?;
    Ok(ItemOutcome {
        input: pdf.to_path_buf(),
        output,
        status,
        duration_ms: start.elapsed().as_millis() as u64,
    })
}

async fn convert_item(
    source: &Source,
    mode: ConversionMode,
    paths: ArtifactPaths,
    single_file: bool,
    config: &ConversionConfig,
) -> ItemOutcome {
    let start = Instant::now();
    let status = match run_item(source, mode, &paths, single_file, config).await {
        Ok(status) => status,
        Err((stage, e)) => {
            warn!("{} failed while {}: {}", source.path().display(), stage, e);
            ItemStatus::Failed {
                stage,
                reason: e.to_string(),
            }
        }
    };
    ItemOutcome {
        input: source.path().to_path_buf(),
        output: paths.output,
        status,
        duration_ms: start.elapsed().as_millis() as u64,
    }
}

/// Tracks one input through the state machine and reports transitions.
struct StageTracker<'a> {
    name: &'a str,
    stage: RenderStage,
    config: &'a ConversionConfig,
}

impl<'a> StageTracker<'a> {
    fn new(name: &'a str, config: &'a ConversionConfig) -> Self {
        let t = Self {
            name,
            stage: RenderStage::Pending,
            config,
        };
        t.emit();
        t
    }

    fn advance(&mut self, next: RenderStage) {
        debug_assert!(self.stage.can_advance_to(next), "{} -> {}", self.stage, next);
        self.stage = next;
        self.emit();
    }

    fn fail(&mut self, e: Pdf2MediaError) -> (RenderStage, Pdf2MediaError) {
        let at = self.stage;
        self.advance(RenderStage::Failed);
        (at, e)
    }

    fn emit(&self) {
        debug!("{}: {}", self.name, self.stage);
        if let Some(ref cb) = self.config.progress_callback {
            cb.on_item_stage(self.name, self.stage);
        }
    }
}

async fn run_item(
    source: &Source,
    mode: ConversionMode,
    paths: &ArtifactPaths,
    single_file: bool,
    config: &ConversionConfig,
) -> Result<ItemStatus, (RenderStage, Pdf2MediaError)> {
    let mut stage = StageTracker::new(&paths.name, config);

    // ── Skip ─────────────────────────────────────────────────────────────
    if paths.output_exists() {
        info!("{} exists, skipping", paths.output.display());
        stage.advance(RenderStage::Skipped);
        return Ok(ItemStatus::Skipped);
    }

    if let Err(e) = prepare(source, paths) {
        return Err(stage.fail(e));
    }

    // ── Render ───────────────────────────────────────────────────────────
    stage.advance(RenderStage::RenderingRaw);
    let render = {
        let source = source.clone();
        let paths = paths.clone();
        let config = config.clone();
        tokio::task::spawn_blocking(move || render_raw(&source, mode, &paths, single_file, &config))
            .await
            .map_err(|e| Pdf2MediaError::Internal(format!("Render task panicked: {}", e)))
            .and_then(|r| r)
    };
    if let Err(e) = render {
        if matches!(e, Pdf2MediaError::Cancelled) {
            remove_if_exists(&paths.intermediate);
        }
        return Err(stage.fail(e));
    }
    stage.advance(RenderStage::RawComplete);

    if let Err(e) = config.cancel.check() {
        remove_if_exists(&paths.intermediate);
        return Err(stage.fail(e));
    }

    // ── Transcode ────────────────────────────────────────────────────────
    stage.advance(RenderStage::Transcoding);
    let encoder = config.media_encoder();
    let transcode = {
        let input = paths.intermediate.clone();
        let partial = paths.partial.clone();
        let profile = TranscodeProfile::for_mode(mode);
        tokio::task::spawn_blocking(move || encoder.transcode(&input, &partial, profile))
            .await
            .map_err(|e| Pdf2MediaError::Internal(format!("Transcode task panicked: {}", e)))
            .and_then(|r| r)
    };
    if let Err(e) = transcode {
        remove_if_exists(&paths.partial);
        return Err(stage.fail(e));
    }

    if let Err(e) = publish(paths) {
        remove_if_exists(&paths.partial);
        return Err(stage.fail(e));
    }
    stage.advance(RenderStage::Done);
    info!("Wrote {}", paths.output.display());
    Ok(ItemStatus::Converted)
}

/// Validate the source and clear leftovers from an earlier run.
fn prepare(source: &Source, paths: &ArtifactPaths) -> Result<(), Pdf2MediaError> {
    source.validate()?;
    if let Some(dir) = paths.output.parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir).map_err(|e| Pdf2MediaError::write(dir, e))?;
    }
    for stale in [&paths.intermediate, &paths.partial] {
        if stale.exists() {
            debug!("Removing stale {}", stale.display());
            std::fs::remove_file(stale).map_err(|e| Pdf2MediaError::write(stale, e))?;
        }
    }
    Ok(())
}

/// Move the partial output onto its final name and drop the intermediate.
fn publish(paths: &ArtifactPaths) -> Result<(), Pdf2MediaError> {
    std::fs::rename(&paths.partial, &paths.output).map_err(|e| Pdf2MediaError::write(&paths.output, e))?;
    if let Err(e) = std::fs::remove_file(&paths.intermediate) {
        if e.kind() != std::io::ErrorKind::NotFound {
            return Err(Pdf2MediaError::write(&paths.intermediate, e));
        }
    }
    Ok(())
}

fn remove_if_exists(path: &Path) {
    match std::fs::remove_file(path) {
        Ok(()) => debug!("Removed {}", path.display()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!("Could not remove {}: {}", path.display(), e),
    }
}

// ── Blocking render ──────────────────────────────────────────────────────

/// Extract, build the envelope and write the raw intermediate for `mode`.
fn render_raw(
    source: &Source,
    mode: ConversionMode,
    paths: &ArtifactPaths,
    single_file: bool,
    config: &ConversionConfig,
) -> Result<(), Pdf2MediaError> {
    let ctx = RenderContext::new(&paths.name, &config.cancel, config.progress_callback.as_ref());
    let pdf = match source {
        Source::Pdf(pdf) => pdf.as_path(),
        Source::ImageFolder(dir) => return render_image_folder(dir, mode, paths, config, &ctx),
    };
    let backend = config.backend();
    let password = config.password.as_deref();
    let prefix = config.line_prefix_strip;

    match mode {
        ConversionMode::Bpm => {
            let texts = backend.page_texts(pdf, password)?;
            let env = BpmEnvelope::from_pages(&texts, prefix, pdf)?;
            audio::render_bpm(&env, &paths.intermediate, &ctx)
        }
        ConversionMode::Wind => {
            let wind = WindLoop::load(&config.wind_loop_path)?;
            let texts = backend.page_texts(pdf, password)?;
            let env = WindEnvelope::from_pages(&texts, prefix, pdf)?;
            audio::render_wind(&env, &wind, &paths.intermediate, &ctx)
        }
        ConversionMode::Rgb => {
            let texts = backend.page_texts(pdf, password)?;
            let gradient = RgbEnvelope::from_pages(&texts, prefix, pdf)?.gradient();
            render_video(config.media_encoder().as_ref(), &paths.intermediate, RGB_FORMAT, |sink| {
                video::render_rgb(&gradient, sink, &ctx)
            })
        }
        ConversionMode::Clouds => {
            let pages = backend.page_images(pdf, password, CLOUD_ZOOM)?;
            let strip = CloudStrip::from_pages(&pages, single_file, pdf)?;
            drop(pages);
            render_video(config.media_encoder().as_ref(), &paths.intermediate, CLOUD_FORMAT, |sink| {
                video::render_clouds(&strip, sink, &ctx)
            })
        }
        ConversionMode::Text => {
            let mut painter = GlyphPainter::load(&config.font_path, video::text_font_size())?;
            let texts = backend.page_texts(pdf, password)?;
            let chunks = TextChunks::from_pages(&texts, config.text_chunk_size, pdf)?;
            let color = config.text_color.resolve(&input::output_stem(pdf));
            render_video(config.media_encoder().as_ref(), &paths.intermediate, TEXT_FORMAT, |sink| {
                video::render_text(&chunks, &mut painter, color, sink, &ctx)
            })
        }
        ConversionMode::Slideshow => Err(Pdf2MediaError::FolderRequired {
            path: pdf.to_path_buf(),
            mode,
        }),
    }
}

/// Write the raw intermediate for a folder of images.
///
/// Clouds stitches every image into one strip ending on a black panel; the
/// slideshow shows each image in turn.
fn render_image_folder(
    dir: &Path,
    mode: ConversionMode,
    paths: &ArtifactPaths,
    config: &ConversionConfig,
    ctx: &RenderContext<'_>,
) -> Result<(), Pdf2MediaError> {
    let images = input::list_images(dir)?;
    let encoder = config.media_encoder();
    match mode {
        ConversionMode::Slideshow => render_video(encoder.as_ref(), &paths.intermediate, SLIDESHOW_FORMAT, |sink| {
            video::render_slideshow(&images, sink, ctx)
        }),
        ConversionMode::Clouds => {
            let pages = images
                .iter()
                .map(|p| input::open_image(p))
                .collect::<Result<Vec<_>, _>>()?;
            let strip = CloudStrip::from_pages(&pages, true, dir)?;
            drop(pages);
            render_video(encoder.as_ref(), &paths.intermediate, CLOUD_FORMAT, |sink| {
                video::render_clouds(&strip, sink, ctx)
            })
        }
        other => Err(Pdf2MediaError::InvalidConfig(format!(
            "{other} mode cannot read a folder of images"
        ))),
    }
}

/// Open a raw video intermediate, let `draw` fill it, and close it.
///
/// On a drawing error the sink is dropped unfinished.
fn render_video<F>(encoder: &dyn MediaEncoder, path: &Path, format: VideoFormat, draw: F) -> Result<(), Pdf2MediaError>
where
    F: FnOnce(&mut dyn FrameSink) -> Result<(), Pdf2MediaError>,
{
    let mut sink = encoder.open_raw_video(path, format)?;
    draw(sink.as_mut())?;
    sink.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::Selection;
    use crate::pipeline::extract::PdfBackend;
    use std::path::PathBuf;
    use image::DynamicImage;
    use std::sync::Arc;

    struct NoTextBackend;

    impl PdfBackend for NoTextBackend {
        fn page_texts(&self, _: &Path, _: Option<&str>) -> Result<Vec<String>, Pdf2MediaError> {
            Ok(vec![String::new()])
        }

        fn page_images(&self, _: &Path, _: Option<&str>, _: f32) -> Result<Vec<DynamicImage>, Pdf2MediaError> {
            Ok(Vec::new())
        }
    }

    fn write_pdf(dir: &Path, name: &str) -> PathBuf {
        let p = dir.join(name);
        std::fs::write(&p, b"%PDF-1.4\n%%EOF\n").unwrap();
        p
    }

    #[test]
    fn stale_intermediates_are_removed() {
        let tmp = tempfile::tempdir().unwrap();
        let pdf = write_pdf(tmp.path(), "a.pdf");
        let paths = ArtifactPaths::new(&pdf, ConversionMode::Bpm, None, None);
        std::fs::write(&paths.intermediate, b"old").unwrap();
        std::fs::write(&paths.partial, b"old").unwrap();
        prepare(&Source::Pdf(pdf), &paths).unwrap();
        assert!(!paths.intermediate.exists());
        assert!(!paths.partial.exists());
    }

    #[test]
    fn publish_renames_and_cleans_up() {
        let tmp = tempfile::tempdir().unwrap();
        let pdf = write_pdf(tmp.path(), "a.pdf");
        let paths = ArtifactPaths::new(&pdf, ConversionMode::Rgb, None, None);
        std::fs::write(&paths.intermediate, b"raw").unwrap();
        std::fs::write(&paths.partial, b"final").unwrap();
        publish(&paths).unwrap();
        assert_eq!(std::fs::read(&paths.output).unwrap(), b"final");
        assert!(!paths.partial.exists());
        assert!(!paths.intermediate.exists());
    }

    #[test]
    fn convert_sync_reports_missing_input() {
        let config = ConversionConfig::default();
        let request = ConversionRequest::new(
            ConversionMode::Wind,
            Selection::File(PathBuf::from("/nonexistent/16001.pdf")),
        );
        let err = convert_sync(&request, &config).unwrap_err();
        assert!(matches!(err, Pdf2MediaError::FileNotFound { .. }));
    }

    #[test]
    fn existing_artifact_short_circuits() {
        let tmp = tempfile::tempdir().unwrap();
        let pdf = write_pdf(tmp.path(), "3001.pdf");
        std::fs::write(tmp.path().join("3001.mp4"), b"done").unwrap();
        let config = ConversionConfig::builder()
            .pdf_backend(Arc::new(NoTextBackend))
            .build()
            .unwrap();
        let outcome = tokio_test::block_on(convert_file(&pdf, ConversionMode::Rgb, &config)).unwrap();
        assert_eq!(outcome.status, ItemStatus::Skipped);
        assert_eq!(std::fs::read(tmp.path().join("3001.mp4")).unwrap(), b"done");
    }

    #[tokio::test]
    async fn empty_document_fails_while_rendering() {
        let tmp = tempfile::tempdir().unwrap();
        let pdf = write_pdf(tmp.path(), "16001.pdf");
        let config = ConversionConfig::builder()
            .pdf_backend(Arc::new(NoTextBackend))
            .build()
            .unwrap();
        let err = convert_file(&pdf, ConversionMode::Bpm, &config).await.unwrap_err();
        assert!(matches!(err, Pdf2MediaError::NoDataExtracted { mode: ConversionMode::Bpm, .. }));
        assert!(!tmp.path().join("16001.mp3").exists());
    }

    #[tokio::test]
    async fn slideshow_needs_a_folder() {
        let tmp = tempfile::tempdir().unwrap();
        let pdf = write_pdf(tmp.path(), "a.pdf");
        let config = ConversionConfig::default();

        let request = ConversionRequest::new(ConversionMode::Slideshow, Selection::File(pdf.clone()));
        let err = convert(&request, &config).await.unwrap_err();
        assert!(err.to_string().contains("requires selecting a FOLDER"), "{err}");

        let err = convert_file(&pdf, ConversionMode::Slideshow, &config).await.unwrap_err();
        assert!(matches!(err, Pdf2MediaError::FolderRequired { .. }));

        // The folder holds a PDF but no images.
        let request = ConversionRequest::new(ConversionMode::Slideshow, Selection::Directory(tmp.path().to_path_buf()));
        let err = convert(&request, &config).await.unwrap_err();
        assert!(matches!(err, Pdf2MediaError::NoImages { .. }));
    }

    #[tokio::test]
    async fn directory_request_records_failures() {
        let tmp = tempfile::tempdir().unwrap();
        write_pdf(tmp.path(), "a.pdf");
        std::fs::write(tmp.path().join("b.pdf"), b"not a pdf").unwrap();
        let config = ConversionConfig::builder()
            .pdf_backend(Arc::new(NoTextBackend))
            .build()
            .unwrap();
        let request = ConversionRequest::new(ConversionMode::Rgb, Selection::Directory(tmp.path().to_path_buf()));
        let report = convert(&request, &config).await.unwrap();
        assert_eq!(report.items.len(), 2);
        assert_eq!(report.failed(), 2);
        match &report.items[1].status {
            ItemStatus::Failed { stage, reason } => {
                assert_eq!(*stage, RenderStage::Pending);
                assert!(reason.contains("not a valid PDF"), "{reason}");
            }
            other => panic!("unexpected {other:?}"),
        }
    }
}

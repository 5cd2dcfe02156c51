//! Pipeline stages for PDF-to-media conversion.
//!
//! Each submodule implements exactly one transformation step. Keeping
//! stages separate makes each independently testable and lets us swap the
//! native collaborators (pdfium, ffmpeg) for fakes without touching the
//! timing math.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ extract ──▶ envelope ──▶ audio / video ──▶ encode
//! (paths)   (pdfium)   (per mode)   (raw render)     (ffmpeg)
//! ```
//!
//! 1. [`input`]    — enumerate documents or image folders, validate them,
//!    derive artifact paths
//! 2. [`extract`]  — page text or page rasters; blocking, runs in `spawn_blocking`
//! 3. [`envelope`] — tokens → control signal (BPM list, gradient, wind days, …)
//! 4. [`audio`] / [`video`] — sample- or frame-accurate raw intermediate;
//!    [`glyph`] measures and paints text for the Text mode
//! 5. [`encode`]   — transcode the intermediate into the final MP3/MP4

pub mod audio;
pub mod encode;
pub mod envelope;
pub mod extract;
pub mod glyph;
pub mod input;
pub mod video;

/// Length of every artifact: twelve minutes.
pub const TARGET_SECS: u32 = 12 * 60;

/// How often (in samples or frames) renderers report progress and check
/// for cancellation.
pub(crate) const PROGRESS_STRIDE: usize = 4096;

use crate::error::Pdf2MediaError;
use crate::job::CancelToken;
use crate::progress::ProgressCallback;

/// What a renderer needs besides its envelope: who to report to and when
/// to stop.
#[derive(Clone, Copy)]
pub struct RenderContext<'a> {
    /// Output base name, used as the progress key.
    pub name: &'a str,
    pub cancel: &'a CancelToken,
    pub progress: Option<&'a ProgressCallback>,
}

impl<'a> RenderContext<'a> {
    pub fn new(name: &'a str, cancel: &'a CancelToken, progress: Option<&'a ProgressCallback>) -> Self {
        Self {
            name,
            cancel,
            progress,
        }
    }

    /// Report `done / total` and bail out if the job was cancelled.
    pub fn step(&self, done: usize, total: usize) -> Result<(), Pdf2MediaError> {
        self.cancel.check()?;
        if let Some(cb) = self.progress {
            cb.on_render_progress(self.name, (done as f32 / total.max(1) as f32).min(1.0));
        }
        Ok(())
    }
}

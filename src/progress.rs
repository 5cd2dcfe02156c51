//! Progress-callback trait and the per-input render state machine.
//!
//! Inject an [`Arc<dyn ConversionProgressCallback>`] via
//! [`crate::config::ConversionConfigBuilder::progress_callback`] to receive
//! events while a job runs. Every input walks the same state machine:
//!
//! ```text
//! Pending ─▶ RenderingRaw ─▶ RawComplete ─▶ Transcoding ─▶ Done
//!    │              │                            │
//!    └─▶ Skipped    └──────────▶ Failed ◀─────────┘
//! ```
//!
//! `Skipped` means the output artifact already existed and nothing was
//! rendered.
//!
//! # Example
//!
//! ```rust
//! use pdf2media::{ConversionConfig, ConversionProgressCallback, RenderStage};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct DoneCounter {
//!     done: AtomicUsize,
//! }
//!
//! impl ConversionProgressCallback for DoneCounter {
//!     fn on_item_stage(&self, name: &str, stage: RenderStage) {
//!         if stage == RenderStage::Done {
//!             self.done.fetch_add(1, Ordering::SeqCst);
//!             eprintln!("{name} finished");
//!         }
//!     }
//! }
//!
//! let counter = Arc::new(DoneCounter { done: AtomicUsize::new(0) });
//! let config = ConversionConfig::builder()
//!     .progress_callback(counter as Arc<dyn ConversionProgressCallback>)
//!     .build()
//!     .unwrap();
//! ```

use crate::output::ItemStatus;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Where one input currently is in its conversion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RenderStage {
    Pending,
    RenderingRaw,
    RawComplete,
    Transcoding,
    Done,
    Skipped,
    Failed,
}

impl RenderStage {
    /// True for the three terminal states.
    pub fn is_terminal(self) -> bool {
        matches!(self, RenderStage::Done | RenderStage::Skipped | RenderStage::Failed)
    }

    /// Whether moving from `self` to `next` is a legal transition.
    pub fn can_advance_to(self, next: RenderStage) -> bool {
        use RenderStage::*;
        matches!(
            (self, next),
            (Pending, RenderingRaw)
                | (Pending, Skipped)
                | (Pending, Failed)
                | (RenderingRaw, RawComplete)
                | (RenderingRaw, Failed)
                | (RawComplete, Transcoding)
                | (RawComplete, Failed)
                | (Transcoding, Done)
                | (Transcoding, Failed)
        )
    }
}

impl fmt::Display for RenderStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RenderStage::Pending => "pending",
            RenderStage::RenderingRaw => "rendering",
            RenderStage::RawComplete => "rendered",
            RenderStage::Transcoding => "transcoding",
            RenderStage::Done => "done",
            RenderStage::Skipped => "skipped",
            RenderStage::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Called by the dispatcher as it works through a job.
///
/// Implementations must be `Send + Sync`: events are emitted from the job's
/// worker thread and from blocking render tasks. All methods have default
/// no-op implementations so callers only override what they care about.
pub trait ConversionProgressCallback: Send + Sync {
    /// Called once, after the selection has been resolved.
    ///
    /// # Arguments
    /// * `total_inputs` — number of documents the job will visit
    fn on_job_start(&self, total_inputs: usize) {
        let _ = total_inputs;
    }

    /// Called before an input is checked for an existing artifact.
    ///
    /// # Arguments
    /// * `index` — 1-indexed position in the batch
    /// * `total` — batch size
    /// * `name`  — output base name of the input
    fn on_item_start(&self, index: usize, total: usize, name: &str) {
        let _ = (index, total, name);
    }

    /// Called on every state-machine transition of an input.
    fn on_item_stage(&self, name: &str, stage: RenderStage) {
        let _ = (name, stage);
    }

    /// Called periodically while raw samples/frames are rendered.
    ///
    /// # Arguments
    /// * `fraction` — 0.0 ..= 1.0 of the raw render
    fn on_render_progress(&self, name: &str, fraction: f32) {
        let _ = (name, fraction);
    }

    /// Called once per input with its final status.
    fn on_item_complete(&self, name: &str, status: &ItemStatus) {
        let _ = (name, status);
    }

    /// Called once after every input has been attempted.
    ///
    /// # Arguments
    /// * `converted` — inputs that produced a new artifact
    /// * `skipped`   — inputs whose artifact already existed
    /// * `failed`    — inputs that failed
    fn on_job_complete(&self, converted: usize, skipped: usize, failed: usize) {
        let _ = (converted, skipped, failed);
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl ConversionProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::ConversionConfig`].
pub type ProgressCallback = Arc<dyn ConversionProgressCallback>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn happy_path_transitions_are_legal() {
        use RenderStage::*;
        let path = [Pending, RenderingRaw, RawComplete, Transcoding, Done];
        for w in path.windows(2) {
            assert!(w[0].can_advance_to(w[1]), "{} -> {}", w[0], w[1]);
        }
        assert!(Pending.can_advance_to(Skipped));
        assert!(Transcoding.can_advance_to(Failed));
    }

    #[test]
    fn terminal_states_do_not_advance() {
        use RenderStage::*;
        for t in [Done, Skipped, Failed] {
            assert!(t.is_terminal());
            for next in [Pending, RenderingRaw, RawComplete, Transcoding, Done, Skipped, Failed] {
                assert!(!t.can_advance_to(next));
            }
        }
        assert!(!RenderingRaw.can_advance_to(Skipped));
        assert!(!Pending.can_advance_to(Done));
    }

    #[test]
    fn noop_callback_does_not_panic() {
        let cb = NoopProgressCallback;
        cb.on_job_start(2);
        cb.on_item_start(1, 2, "16001");
        cb.on_item_stage("16001", RenderStage::RenderingRaw);
        cb.on_render_progress("16001", 0.5);
        cb.on_item_complete("16001", &ItemStatus::Skipped);
        cb.on_job_complete(0, 1, 0);
    }

    #[test]
    fn arc_dyn_callback_records_stages() {
        struct Recorder(Mutex<Vec<RenderStage>>);
        impl ConversionProgressCallback for Recorder {
            fn on_item_stage(&self, _name: &str, stage: RenderStage) {
                self.0.lock().unwrap().push(stage);
            }
        }

        let rec = Arc::new(Recorder(Mutex::new(Vec::new())));
        let cb: ProgressCallback = rec.clone();
        cb.on_item_stage("a", RenderStage::Pending);
        cb.on_item_stage("a", RenderStage::Skipped);
        assert_eq!(
            *rec.0.lock().unwrap(),
            vec![RenderStage::Pending, RenderStage::Skipped]
        );
    }
}

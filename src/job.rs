//! One background worker per submitted job, with a typed result handoff.
//!
//! The UI submits a [`ConversionRequest`] and gets a [`JobHandle`] back. The
//! worker owns the request for its whole lifetime; the only thing that
//! crosses back is a single [`JobResult`] on a oneshot channel, so the
//! foreground loop either polls [`JobHandle::try_outcome`] every tick or
//! blocks in [`JobHandle::wait`].
//!
//! ```rust,no_run
//! use pdf2media::{ConversionConfig, ConversionJob, ConversionMode, ConversionRequest, Selection};
//!
//! let config = ConversionConfig::default();
//! let request = ConversionRequest::new(ConversionMode::Bpm, Selection::from_path("16001.pdf"));
//! let mut handle = ConversionJob::spawn(request, config);
//! while !handle.is_finished() {
//!     std::thread::sleep(std::time::Duration::from_millis(100));
//! }
//! let result = handle.wait();
//! println!("{}", result.outcome().message());
//! ```

use crate::config::ConversionConfig;
use crate::convert;
use crate::error::Pdf2MediaError;
use crate::output::{ConversionRequest, JobOutcome, JobReport};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use tokio::sync::oneshot;
use tracing::{error, info};

/// Cooperative cancellation flag shared between a job and its handle.
///
/// Checked between inputs and periodically inside the renderers. Cloning
/// shares the flag.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation. Idempotent.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// `Err(Cancelled)` once cancellation has been requested.
    pub fn check(&self) -> Result<(), Pdf2MediaError> {
        if self.is_cancelled() {
            Err(Pdf2MediaError::Cancelled)
        } else {
            Ok(())
        }
    }
}

/// What a finished job hands back to the UI.
#[derive(Debug)]
pub enum JobResult {
    /// Every input was attempted; see the per-input statuses.
    Completed(JobReport),
    /// The job could not start (bad selection, empty directory, runtime).
    Aborted(Pdf2MediaError),
}

impl JobResult {
    /// Collapse into the tri-state signal.
    pub fn outcome(&self) -> JobOutcome {
        match self {
            JobResult::Completed(report) => report.outcome(),
            JobResult::Aborted(e) => JobOutcome::Failed {
                failed: 1,
                total: 1,
                first_error: e.to_string(),
            },
        }
    }

    pub fn report(&self) -> Option<&JobReport> {
        match self {
            JobResult::Completed(r) => Some(r),
            JobResult::Aborted(_) => None,
        }
    }
}

/// Entry point for background conversions.
pub struct ConversionJob;

impl ConversionJob {
    /// Start `request` on a dedicated worker thread.
    ///
    /// The worker drives a current-thread tokio runtime; render work inside
    /// it still goes through `spawn_blocking`. A panic on the worker is
    /// reported as [`Pdf2MediaError::Internal`] by [`JobHandle::wait`].
    pub fn spawn(request: ConversionRequest, config: ConversionConfig) -> JobHandle {
        let (tx, rx) = oneshot::channel();
        let cancel = config.cancel.clone();

        let thread = std::thread::Builder::new()
            .name(format!("pdf2media-{}", request.mode))
            .spawn(move || {
                let result = run_job(request, &config);
                // The receiver may already be gone; nothing left to report to.
                let _ = tx.send(result);
            });

        match thread {
            Ok(thread) => JobHandle {
                rx: Some(rx),
                thread: Some(thread),
                cancel,
                result: None,
            },
            Err(e) => {
                error!("Failed to spawn job thread: {}", e);
                JobHandle {
                    rx: None,
                    thread: None,
                    cancel,
                    result: Some(JobResult::Aborted(Pdf2MediaError::Internal(format!(
                        "Failed to spawn worker thread: {e}"
                    )))),
                }
            }
        }
    }
}

fn run_job(request: ConversionRequest, config: &ConversionConfig) -> JobResult {
    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(rt) => rt,
        Err(e) => {
            return JobResult::Aborted(Pdf2MediaError::Internal(format!(
                "Failed to create tokio runtime: {e}"
            )))
        }
    };

    info!("Job started: {} {}", request.mode, request.selection.path().display());
    match runtime.block_on(convert::convert(&request, config)) {
        Ok(report) => JobResult::Completed(report),
        Err(e) => {
            error!("Job aborted: {}", e);
            JobResult::Aborted(e)
        }
    }
}

/// The foreground side of a running job.
pub struct JobHandle {
    rx: Option<oneshot::Receiver<JobResult>>,
    thread: Option<JoinHandle<()>>,
    cancel: CancelToken,
    result: Option<JobResult>,
}

impl JobHandle {
    /// Non-blocking: has the worker delivered its result (or died)?
    pub fn is_finished(&mut self) -> bool {
        self.poll();
        self.result.is_some()
    }

    /// Non-blocking poll for the tri-state outcome.
    pub fn try_outcome(&mut self) -> Option<JobOutcome> {
        self.poll();
        self.result.as_ref().map(JobResult::outcome)
    }

    /// Request cooperative cancellation of the running job.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Block until the worker finishes and take its result.
    pub fn wait(mut self) -> JobResult {
        if let Some(result) = self.result.take() {
            self.join();
            return result;
        }
        let result = match self.rx.take() {
            Some(rx) => rx.blocking_recv().unwrap_or_else(|_| {
                JobResult::Aborted(Pdf2MediaError::Internal(
                    "Conversion worker exited without a result".into(),
                ))
            }),
            None => JobResult::Aborted(Pdf2MediaError::Internal(
                "Conversion result already taken".into(),
            )),
        };
        self.join();
        result
    }

    fn poll(&mut self) {
        if self.result.is_some() {
            return;
        }
        let Some(rx) = self.rx.as_mut() else {
            return;
        };
        match rx.try_recv() {
            Ok(result) => {
                self.result = Some(result);
                self.rx = None;
            }
            Err(oneshot::error::TryRecvError::Empty) => {}
            Err(oneshot::error::TryRecvError::Closed) => {
                self.result = Some(JobResult::Aborted(Pdf2MediaError::Internal(
                    "Conversion worker exited without a result".into(),
                )));
                self.rx = None;
            }
        }
    }

    fn join(&mut self) {
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                error!("Conversion worker panicked");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConversionMode;
    use crate::output::Selection;

    #[test]
    fn cancel_token_is_shared_between_clones() {
        let a = CancelToken::new();
        let b = a.clone();
        assert!(!b.is_cancelled());
        assert!(b.check().is_ok());
        a.cancel();
        assert!(b.is_cancelled());
        assert!(matches!(b.check(), Err(Pdf2MediaError::Cancelled)));
    }

    #[test]
    fn missing_input_aborts_job() {
        let request = ConversionRequest::new(
            ConversionMode::Bpm,
            Selection::File("/definitely/not/here.pdf".into()),
        );
        let handle = ConversionJob::spawn(request, ConversionConfig::default());
        let result = handle.wait();
        assert!(matches!(
            result,
            JobResult::Aborted(Pdf2MediaError::FileNotFound { .. })
        ));
    }

    #[test]
    fn aborted_result_is_a_failure_outcome() {
        let r = JobResult::Aborted(Pdf2MediaError::Cancelled);
        assert!(matches!(r.outcome(), JobOutcome::Failed { failed: 1, total: 1, .. }));
        assert!(r.report().is_none());
    }
}

//! The job controller: submit, poll, synthesize progress, cancel.
//!
//! One controller tracks at most one job. Submitting again abandons the
//! previous job. Every operation that abandons a job bumps a generation
//! counter, and every asynchronous result (submit response, poll result,
//! progress tick) is applied only if its generation is still current.
//!
//! State is published two ways: the latest [`JobSnapshot`] on a `watch`
//! channel and discrete [`JobEvent`]s on a `broadcast` channel.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use base64::Engine as _;
use retouch_backend::{BackendAdapter, BackendError, ConfigError, StatusReport, SubmitRequest};
use retouch_core::output::OutputImage;
use retouch_core::payload::{data_url_mime, strip_data_url_prefix};
use retouch_core::status::CanonicalStatus;
use retouch_core::types::JobId;
use tokio::sync::{broadcast, watch};
use tokio::time::MissedTickBehavior;

use crate::config::ControllerConfig;
use crate::error::SessionError;
use crate::events::{JobEvent, DEFAULT_EVENT_CAPACITY};
use crate::previews::{Preview, PreviewId, PreviewStore};
use crate::snapshot::{ControllerState, JobSnapshot, ProcessingResult};
use crate::timers::JobTimers;

/// Message used when the backend reports an error without details.
pub const FALLBACK_ERROR_MESSAGE: &str = "Processing failed";
/// Message used when a job ends up cancelled.
pub const CANCELLED_MESSAGE: &str = "Job was cancelled";

/// Drives one image-processing job at a time against a backend.
///
/// Must be used from within a Tokio runtime. Dropping the controller
/// disposes it.
pub struct JobController {
    shared: Arc<Shared>,
}

struct Shared {
    backend: Arc<dyn BackendAdapter>,
    config: ControllerConfig,
    inner: Mutex<Inner>,
    state_tx: watch::Sender<JobSnapshot>,
    events: broadcast::Sender<JobEvent>,
}

struct Inner {
    generation: u64,
    snapshot: JobSnapshot,
    timers: Option<JobTimers>,
    previews: PreviewStore,
    output_preview: Option<PreviewId>,
    /// Generations whose submit was cancelled while still in flight.
    cancelled_submits: Vec<u64>,
}

impl Inner {
    /// Stop the current job's timers, if any.
    fn stop_timers(&mut self) {
        if let Some(timers) = self.timers.take() {
            timers.stop();
        }
    }

    /// Abandon whatever is in flight: newer generation, no timers.
    fn abandon(&mut self) -> u64 {
        self.generation += 1;
        self.stop_timers();
        self.generation
    }

    /// Whether the submit tagged `generation` was cancelled in flight.
    /// Clears the mark.
    fn take_cancelled_submit(&mut self, generation: u64) -> bool {
        match self.cancelled_submits.iter().position(|g| *g == generation) {
            Some(index) => {
                self.cancelled_submits.swap_remove(index);
                true
            }
            None => false,
        }
    }

    fn release_previews(&mut self) -> usize {
        self.output_preview = None;
        self.previews.release_all()
    }
}

impl JobController {
    /// Fails when `config` has timings the timers cannot run with.
    pub fn new(
        backend: Arc<dyn BackendAdapter>,
        config: ControllerConfig,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        let snapshot = JobSnapshot::default();
        let (state_tx, _) = watch::channel(snapshot.clone());
        let (events, _) = broadcast::channel(DEFAULT_EVENT_CAPACITY);

        Ok(Self {
            shared: Arc::new(Shared {
                backend,
                config,
                inner: Mutex::new(Inner {
                    generation: 0,
                    snapshot,
                    timers: None,
                    previews: PreviewStore::new(),
                    output_preview: None,
                    cancelled_submits: Vec::new(),
                }),
                state_tx,
                events,
            }),
        })
    }

    pub fn config(&self) -> &ControllerConfig {
        &self.shared.config
    }

    /// Current state.
    pub fn snapshot(&self) -> JobSnapshot {
        self.shared.lock().snapshot.clone()
    }

    /// Receiver that always holds the latest snapshot.
    pub fn subscribe(&self) -> watch::Receiver<JobSnapshot> {
        self.shared.state_tx.subscribe()
    }

    /// Receiver for lifecycle events published from now on.
    pub fn events(&self) -> broadcast::Receiver<JobEvent> {
        self.shared.events.subscribe()
    }

    /// The current job as a result record, if there is one.
    pub fn result(&self) -> Option<ProcessingResult> {
        self.shared.lock().snapshot.result()
    }

    /// Submit a new job, abandoning any previous one.
    ///
    /// Returns the backend job id once the backend accepted the job;
    /// polling then continues in the background.
    pub async fn submit(&self, request: SubmitRequest) -> Result<JobId, SessionError> {
        if request.image.trim().is_empty() {
            return Err(SessionError::EmptyImage);
        }

        let generation = {
            let mut inner = self.shared.lock();
            let generation = inner.abandon();
            let released = inner.release_previews();
            inner.snapshot = JobSnapshot::submitting();
            self.shared.publish(&mut inner);
            tracing::debug!(generation, released_previews = released, "Submitting job");
            generation
        };

        let outcome = self.shared.backend.submit(&request).await;

        let mut inner = self.shared.lock();
        if inner.generation != generation {
            let cancelled = inner.take_cancelled_submit(generation);
            drop(inner);
            if let Ok(receipt) = outcome {
                if cancelled {
                    tracing::info!(
                        job_id = %receipt.job_id,
                        "Submit response arrived after cancel; cancelling remotely",
                    );
                    self.spawn_remote_cancel(receipt.job_id);
                } else {
                    tracing::warn!(
                        job_id = %receipt.job_id,
                        "Submit response arrived after the job was abandoned; ignoring",
                    );
                }
            }
            return Err(SessionError::Superseded);
        }

        match outcome {
            Ok(receipt) => {
                let job_id = receipt.job_id;
                let state = ControllerState::from(receipt.status);
                inner.snapshot.job_id = Some(job_id.clone());
                inner.snapshot.state = state;

                match receipt.status {
                    CanonicalStatus::Error => {
                        inner.snapshot.error_message = Some(FALLBACK_ERROR_MESSAGE.to_string());
                    }
                    CanonicalStatus::Cancelled => {
                        inner.snapshot.error_message = Some(CANCELLED_MESSAGE.to_string());
                    }
                    _ => {
                        inner.timers = Some(JobTimers::start(
                            poll_loop(self.shared.clone(), generation, job_id.clone()),
                            progress_loop(self.shared.clone(), generation, job_id.clone()),
                        ));
                    }
                }

                self.shared.publish(&mut inner);
                tracing::info!(job_id = %job_id, %state, "Job accepted by backend");
                self.shared.emit(JobEvent::Submitted {
                    job_id: job_id.clone(),
                    state,
                });
                Ok(job_id)
            }
            Err(e) => {
                let message = e.to_string();
                inner.snapshot.state = ControllerState::Error;
                inner.snapshot.error_message = Some(message.clone());
                self.shared.publish(&mut inner);
                tracing::error!(error = %e, "Job submission failed");
                self.shared.emit(JobEvent::Failed {
                    job_id: None,
                    message,
                });
                Err(SessionError::Backend(e))
            }
        }
    }

    /// Cancel the current job.
    ///
    /// Takes effect locally at once; the remote cancel runs in the
    /// background and its outcome is only logged. Returns `false` (and
    /// does nothing) unless a job was submitting or active.
    pub fn cancel(&self) -> bool {
        let mut inner = self.shared.lock();
        let state = inner.snapshot.state;
        if !(state == ControllerState::Submitting || state.is_active()) {
            return false;
        }

        if state == ControllerState::Submitting {
            let in_flight = inner.generation;
            inner.cancelled_submits.push(in_flight);
        }
        inner.abandon();
        inner.snapshot.state = ControllerState::Cancelled;
        inner.snapshot.error_message = Some(CANCELLED_MESSAGE.to_string());
        let job_id = inner.snapshot.job_id.clone();
        self.shared.publish(&mut inner);
        drop(inner);

        tracing::info!(job_id = ?job_id, "Job cancelled");
        self.shared.emit(JobEvent::Cancelled {
            job_id: job_id.clone(),
        });

        match job_id {
            Some(job_id) => self.spawn_remote_cancel(job_id),
            None => tracing::debug!("Cancelled before the backend assigned a job id"),
        }
        true
    }

    fn spawn_remote_cancel(&self, job_id: JobId) {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            tracing::warn!(job_id = %job_id, "No runtime available; remote cancel skipped");
            return;
        };
        let backend = self.shared.backend.clone();
        runtime.spawn(async move {
            match backend.cancel(&job_id).await {
                Ok(()) => tracing::debug!(job_id = %job_id, "Remote cancel acknowledged"),
                Err(e) => tracing::warn!(
                    job_id = %job_id,
                    error = %e,
                    "Remote cancel failed; backend job may still be running",
                ),
            }
        });
    }

    /// Stop everything, release previews and return to idle.
    pub fn reset(&self) {
        let mut inner = self.shared.lock();
        inner.abandon();
        inner.release_previews();
        inner.snapshot = JobSnapshot::default();
        self.shared.publish(&mut inner);
        drop(inner);

        tracing::debug!("Controller reset");
        self.shared.emit(JobEvent::Reset);
    }

    /// Stop timers and release every preview. Safe to call repeatedly.
    pub fn dispose(&self) {
        let mut inner = self.shared.lock();
        let had_timers = inner.timers.is_some();
        inner.abandon();
        let released = inner.release_previews();
        if had_timers || released > 0 {
            tracing::debug!(released_previews = released, "Controller disposed");
        }
    }

    /// Whether poll/progress timers are currently running.
    pub fn is_polling(&self) -> bool {
        self.shared
            .lock()
            .timers
            .as_ref()
            .is_some_and(|timers| !timers.is_stopped())
    }

    // ---- previews ----

    /// Hold image bytes under a new handle until the next submit, reset or
    /// dispose.
    pub fn register_preview(
        &self,
        mime: impl Into<String>,
        bytes: impl Into<Arc<[u8]>>,
    ) -> PreviewId {
        self.shared.lock().previews.register(mime, bytes)
    }

    pub fn preview(&self, id: &PreviewId) -> Option<Preview> {
        self.shared.lock().previews.get(id)
    }

    pub fn release_preview(&self, id: &PreviewId) -> bool {
        self.shared.lock().previews.release(id)
    }

    pub fn preview_count(&self) -> usize {
        self.shared.lock().previews.len()
    }

    /// Handle to the decoded output of a completed base64 job.
    pub fn output_preview(&self) -> Option<PreviewId> {
        self.shared.lock().output_preview
    }
}

impl Drop for JobController {
    fn drop(&mut self) {
        self.dispose();
    }
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Stamp and broadcast the snapshot. Called with the lock held so
    /// receivers observe updates in order.
    fn publish(&self, inner: &mut Inner) {
        inner.snapshot.touch();
        self.state_tx.send_replace(inner.snapshot.clone());
    }

    fn emit(&self, event: JobEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }

    /// Apply one poll result. Returns whether polling should continue.
    fn apply_poll(
        &self,
        generation: u64,
        job_id: &str,
        result: Result<StatusReport, BackendError>,
    ) -> bool {
        let mut inner = self.lock();
        if inner.generation != generation {
            return false;
        }

        let report = match result {
            Ok(report) => report,
            Err(e) => {
                tracing::error!(job_id, error = %e, "Status poll failed");
                self.fail(&mut inner, job_id, e.to_string());
                return false;
            }
        };

        let status = report.status;
        match status {
            CanonicalStatus::Done => {
                self.complete(&mut inner, job_id, report);
                false
            }
            CanonicalStatus::Error => {
                let message = report
                    .error
                    .unwrap_or_else(|| FALLBACK_ERROR_MESSAGE.to_string());
                tracing::warn!(job_id, error = %message, "Backend reported job failure");
                self.fail(&mut inner, job_id, message);
                false
            }
            CanonicalStatus::Cancelled => {
                inner.stop_timers();
                inner.snapshot.state = ControllerState::Cancelled;
                inner.snapshot.error_message =
                    Some(report.error.unwrap_or_else(|| CANCELLED_MESSAGE.to_string()));
                self.publish(&mut inner);
                tracing::info!(job_id, "Backend reported job cancelled");
                self.emit(JobEvent::Cancelled {
                    job_id: Some(job_id.to_string()),
                });
                false
            }
            status => {
                let state = ControllerState::from(status);
                let changed = inner.snapshot.state != state;
                inner.snapshot.state = state;

                let mut progressed = false;
                if let Some(reported) = report.progress {
                    let reported = reported.clamp(0.0, 99.0) as u8;
                    if reported > inner.snapshot.progress {
                        inner.snapshot.progress = reported;
                        progressed = true;
                    }
                }

                if changed || progressed {
                    self.publish(&mut inner);
                }
                if changed {
                    tracing::debug!(job_id, %state, "Job status changed");
                    self.emit(JobEvent::StatusChanged {
                        job_id: job_id.to_string(),
                        state,
                    });
                }
                if progressed {
                    self.emit(JobEvent::Progress {
                        job_id: job_id.to_string(),
                        progress: inner.snapshot.progress,
                    });
                }
                true
            }
        }
    }

    fn complete(&self, inner: &mut Inner, job_id: &str, report: StatusReport) {
        inner.stop_timers();

        let output = OutputImage::prefer_inline(report.image_base64, report.image_url);
        if let Some(OutputImage::Base64(body)) = &output {
            match base64::engine::general_purpose::STANDARD.decode(strip_data_url_prefix(body)) {
                Ok(bytes) => {
                    let mime = data_url_mime(body).unwrap_or_else(|| "image/png".to_string());
                    let id = inner.previews.register(mime, bytes);
                    inner.output_preview = Some(id);
                }
                Err(e) => tracing::warn!(job_id, error = %e, "Output image is not valid base64"),
            }
        }
        if output.is_none() {
            tracing::warn!(job_id, "Job completed without an output image");
        }

        let output_image = output.as_ref().map(OutputImage::display_src);
        inner.snapshot.state = ControllerState::Done;
        inner.snapshot.progress = 100;
        inner.snapshot.output_image = output_image.clone();
        inner.snapshot.error_message = None;
        self.publish(inner);

        tracing::info!(
            job_id,
            inline = output.as_ref().is_some_and(OutputImage::is_inline),
            execution_ms = report.execution_time,
            "Job completed",
        );
        self.emit(JobEvent::Completed {
            job_id: job_id.to_string(),
            output_image,
        });
    }

    fn fail(&self, inner: &mut Inner, job_id: &str, message: String) {
        inner.stop_timers();
        inner.snapshot.state = ControllerState::Error;
        inner.snapshot.error_message = Some(message.clone());
        self.publish(inner);
        self.emit(JobEvent::Failed {
            job_id: Some(job_id.to_string()),
            message,
        });
    }

    /// One synthetic progress step. Returns whether the timer should keep
    /// running.
    fn advance_progress(&self, generation: u64, job_id: &str) -> bool {
        let mut inner = self.lock();
        if inner.generation != generation || inner.snapshot.state.is_terminal() {
            return false;
        }
        if !inner.snapshot.state.advances_progress() {
            return true;
        }

        let cap = self.config.progress_cap;
        let current = inner.snapshot.progress;
        if current >= cap {
            return true;
        }
        inner.snapshot.progress = current.saturating_add(self.config.progress_step).min(cap);
        let progress = inner.snapshot.progress;
        self.publish(&mut inner);
        self.emit(JobEvent::Progress {
            job_id: job_id.to_string(),
            progress,
        });
        true
    }
}

async fn poll_loop(shared: Arc<Shared>, generation: u64, job_id: JobId) {
    tokio::time::sleep(shared.config.poll_start_delay).await;

    let mut ticker = tokio::time::interval(shared.config.poll_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;
        let result = shared.backend.fetch_status(&job_id).await;
        if !shared.apply_poll(generation, &job_id, result) {
            break;
        }
    }
}

async fn progress_loop(shared: Arc<Shared>, generation: u64, job_id: JobId) {
    let mut ticker = tokio::time::interval(shared.config.progress_tick);
    // The first tick completes immediately.
    ticker.tick().await;

    loop {
        ticker.tick().await;
        if !shared.advance_progress(generation, &job_id) {
            break;
        }
    }
}

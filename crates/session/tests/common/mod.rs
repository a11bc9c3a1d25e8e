//! Scripted in-memory backend for controller tests.
//!
//! Submit replies are consumed in order. Status replies are queued per job
//! id; the last one repeats once the queue is drained. Unscripted polls
//! report `processing`.

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use retouch_backend::job_queue::parse_status_document;
use retouch_backend::{
    BackendAdapter, BackendError, BackendKind, StatusReport, SubmitReceipt, SubmitRequest,
};
use retouch_core::status::{map_status, CanonicalStatus};
use retouch_session::{ControllerConfig, JobController};

/// A call as observed by the backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Submit(String),
    Status(String),
    Cancel(String),
}

#[derive(Debug, Clone)]
enum Reply<T> {
    Ok(T),
    Fail { status: u16, body: String },
}

#[derive(Default)]
pub struct ScriptedBackend {
    submits: Mutex<VecDeque<Reply<SubmitReceipt>>>,
    statuses: Mutex<HashMap<String, VecDeque<Reply<StatusReport>>>>,
    calls: Mutex<Vec<Call>>,
    submit_delay: Mutex<Duration>,
    status_delays: Mutex<HashMap<String, Duration>>,
    status_in_flight: AtomicUsize,
    max_status_in_flight: AtomicUsize,
}

impl ScriptedBackend {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Queue a submit response document, e.g. `{"id": "abc", "status": "IN_QUEUE"}`.
    pub fn queue_submit(&self, doc: serde_json::Value) {
        let receipt = SubmitReceipt {
            job_id: doc["id"].as_str().expect("submit doc needs an id").to_string(),
            status: map_status(doc["status"].as_str()),
        };
        self.submits.lock().unwrap().push_back(Reply::Ok(receipt));
    }

    pub fn fail_submit(&self, status: u16, body: &str) {
        self.submits.lock().unwrap().push_back(Reply::Fail {
            status,
            body: body.to_string(),
        });
    }

    /// Queue a status document for `job_id`.
    pub fn queue_status(&self, job_id: &str, doc: serde_json::Value) {
        self.push_status(job_id, Reply::Ok(parse_status_document(&doc)));
    }

    pub fn fail_status(&self, job_id: &str, status: u16, body: &str) {
        self.push_status(
            job_id,
            Reply::Fail {
                status,
                body: body.to_string(),
            },
        );
    }

    fn push_status(&self, job_id: &str, reply: Reply<StatusReport>) {
        self.statuses
            .lock()
            .unwrap()
            .entry(job_id.to_string())
            .or_default()
            .push_back(reply);
    }

    pub fn set_submit_delay(&self, delay: Duration) {
        *self.submit_delay.lock().unwrap() = delay;
    }

    /// Make every status request for `job_id` take `delay` to answer.
    pub fn set_status_delay(&self, job_id: &str, delay: Duration) {
        self.status_delays
            .lock()
            .unwrap()
            .insert(job_id.to_string(), delay);
    }

    /// Most status requests that were ever outstanding at the same time.
    pub fn max_status_in_flight(&self) -> usize {
        self.max_status_in_flight.load(Ordering::SeqCst)
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn status_calls(&self, job_id: &str) -> usize {
        self.calls()
            .iter()
            .filter(|c| **c == Call::Status(job_id.to_string()))
            .count()
    }

    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }
}

/// Counts one outstanding status request; released even when the request
/// future is dropped.
struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

fn api_error(operation: &'static str, status: u16, body: String) -> BackendError {
    BackendError::Api {
        operation,
        status,
        body,
    }
}

#[async_trait]
impl BackendAdapter for ScriptedBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::JobQueue
    }

    async fn submit(&self, request: &SubmitRequest) -> Result<SubmitReceipt, BackendError> {
        self.record(Call::Submit(request.image.clone()));

        let delay = *self.submit_delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let next = self.submits.lock().unwrap().pop_front();
        match next {
            Some(Reply::Ok(receipt)) => Ok(receipt),
            Some(Reply::Fail { status, body }) => Err(api_error("Generate", status, body)),
            None => Ok(SubmitReceipt {
                job_id: "job-default".to_string(),
                status: CanonicalStatus::Queued,
            }),
        }
    }

    async fn fetch_status(&self, job_id: &str) -> Result<StatusReport, BackendError> {
        self.record(Call::Status(job_id.to_string()));

        let outstanding = self.status_in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        let _in_flight = InFlight(&self.status_in_flight);
        self.max_status_in_flight.fetch_max(outstanding, Ordering::SeqCst);

        let delay = self.status_delays.lock().unwrap().get(job_id).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let next = {
            let mut statuses = self.statuses.lock().unwrap();
            statuses.get_mut(job_id).and_then(|queue| {
                if queue.len() > 1 {
                    queue.pop_front()
                } else {
                    queue.front().cloned()
                }
            })
        };
        match next {
            Some(Reply::Ok(report)) => Ok(report),
            Some(Reply::Fail { status, body }) => Err(api_error("Status", status, body)),
            None => Ok(StatusReport::new(CanonicalStatus::Processing)),
        }
    }

    async fn cancel(&self, job_id: &str) -> Result<(), BackendError> {
        self.record(Call::Cancel(job_id.to_string()));
        Ok(())
    }
}

/// Controller with default timings over `backend`.
pub fn controller(backend: &Arc<ScriptedBackend>) -> JobController {
    JobController::new(backend.clone(), ControllerConfig::default()).unwrap()
}

/// Advance paused time, letting spawned tasks run.
pub async fn advance(ms: u64) {
    tokio::time::sleep(Duration::from_millis(ms)).await;
}

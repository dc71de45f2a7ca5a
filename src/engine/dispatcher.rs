// Dispatcher for image generation jobs
// Runs jobs off the request path, schedules retries and keeps dead letters

//! # Job Dispatcher
//!
//! An in-process worker pool for [`ImageGenerationJob`]s.
//!
//! ## Flow
//!
//! ```text
//! enqueue ─► mpsc queue ─► run loop ─► acquire permit ─► spawn attempt
//!                ▲                                           │
//!                └──── sleep(delay) ◄── RetryScheduled ◄─────┤
//!                                                            ├─► Completed
//!                                   dead letters ◄───────────┴─► Abandoned / Failed
//! ```
//!
//! - **Concurrency**: a `Semaphore` caps how many attempts run at once. The
//!   retry delay is spent outside the permit.
//! - **Status**: every submission gets a [`JobHandle`] backed by a `watch`
//!   channel, so callers can poll or await the terminal status.
//! - **Dead letters**: abandoned and failed jobs are kept per location until
//!   an operator retries them or a later job for that location succeeds.
//! - **Logging**: each attempt's outcome is logged here once, with `job_id`,
//!   `location_id` and `attempt` fields: `info` on completion, `warn` when a
//!   retry is scheduled, `error` when the job is dead-lettered.
//!
//! ## Rust Learning Notes:
//!
//! ### Weak Senders
//! The retry timer needs to push back into the queue, but holding a strong
//! sender there would keep the run loop alive forever. A weak sender is
//! upgraded only when the timer fires; if the `Dispatcher` is gone the retry
//! is dropped and reported as abandoned.
//!
//! ### Owned Permits
//! `acquire_owned` returns a permit that is `'static` and can move into the
//! spawned task. The slot is released when the task drops it.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch, Semaphore};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::job::{ImageGenerationJob, JobCompletion, JobOutcome};
use crate::models::LocationId;
use crate::{ExploraError, Result};

/// Anything that accepts generation work for a location
pub trait JobQueue: Send + Sync {
    /// Submit a first attempt for `location_id`; returns immediately
    fn enqueue(&self, location_id: LocationId) -> Result<JobHandle>;
}

/// Observable status of a submitted job
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum JobStatus {
    Queued,
    Running { attempt: u32 },
    RetryScheduled { next_attempt: u32, delay_ms: u64 },
    Completed { completion: JobCompletion },
    Abandoned { attempts: u32, reason: String },
    Failed { reason: String },
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Completed { .. } | JobStatus::Abandoned { .. } | JobStatus::Failed { .. }
        )
    }
}

/// Caller-side view of a submitted job
#[derive(Debug, Clone)]
pub struct JobHandle {
    pub job_id: Uuid,
    pub location_id: LocationId,
    status: watch::Receiver<JobStatus>,
}

impl JobHandle {
    /// Handle for a job that no dispatcher will ever run
    pub fn detached(location_id: LocationId) -> Self {
        let (_, status) = watch::channel(JobStatus::Queued);
        Self {
            job_id: Uuid::new_v4(),
            location_id,
            status,
        }
    }

    pub fn status(&self) -> JobStatus {
        self.status.borrow().clone()
    }

    /// Wait for a terminal status
    ///
    /// Returns the last known status if the dispatcher stops tracking the job
    /// before it finishes.
    pub async fn wait(mut self) -> JobStatus {
        loop {
            {
                let status = self.status.borrow_and_update();
                if status.is_terminal() {
                    return status.clone();
                }
            }
            if self.status.changed().await.is_err() {
                return self.status.borrow().clone();
            }
        }
    }
}

/// A job that will not run again without operator action
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AbandonedJob {
    pub job_id: Uuid,
    pub location_id: LocationId,
    pub attempts: u32,
    pub error_kind: String,
    pub reason: String,
    /// `true` when the retry budget ran out, `false` for non-retryable errors
    pub retries_exhausted: bool,
    pub abandoned_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    /// Maximum attempts running at the same time
    pub max_concurrent_jobs: usize,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            max_concurrent_jobs: 4,
        }
    }
}

/// One attempt waiting in the queue
struct QueuedAttempt {
    job_id: Uuid,
    location_id: LocationId,
    attempt: u32,
    status: watch::Sender<JobStatus>,
}

/// State shared between the run loop and in-flight attempts
struct Worker {
    job: Arc<ImageGenerationJob>,
    semaphore: Arc<Semaphore>,
    retries: mpsc::WeakUnboundedSender<QueuedAttempt>,
    dead_letters: Arc<DashMap<LocationId, AbandonedJob>>,
}

/// In-process job dispatcher
///
/// Dropping the dispatcher stops accepting work; attempts already running
/// finish, pending retries are reported as abandoned.
pub struct Dispatcher {
    sender: mpsc::UnboundedSender<QueuedAttempt>,
    dead_letters: Arc<DashMap<LocationId, AbandonedJob>>,
}

impl Dispatcher {
    /// Start the run loop on the current tokio runtime
    pub fn start(job: Arc<ImageGenerationJob>, config: DispatcherConfig) -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        let dead_letters = Arc::new(DashMap::new());

        let worker = Arc::new(Worker {
            job,
            semaphore: Arc::new(Semaphore::new(config.max_concurrent_jobs.max(1))),
            retries: sender.downgrade(),
            dead_letters: dead_letters.clone(),
        });
        tokio::spawn(worker.run(receiver));

        info!(
            "Job dispatcher started ({} concurrent jobs)",
            config.max_concurrent_jobs.max(1)
        );
        Self {
            sender,
            dead_letters,
        }
    }

    /// Abandoned and failed jobs, oldest first
    pub fn abandoned_jobs(&self) -> Vec<AbandonedJob> {
        let mut jobs: Vec<AbandonedJob> = self
            .dead_letters
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        jobs.sort_by_key(|job| job.abandoned_at);
        jobs
    }

    /// Re-submit the dead-lettered job for `location_id` as a fresh first attempt
    pub fn retry_abandoned(&self, location_id: LocationId) -> Result<JobHandle> {
        let (_, abandoned) = self.dead_letters.remove(&location_id).ok_or_else(|| {
            ExploraError::NotFound(format!("No abandoned job for location {}", location_id))
        })?;
        info!(
            "Operator retry for location {} (previous job {})",
            location_id, abandoned.job_id
        );
        self.enqueue(location_id)
    }

    fn submit(&self, location_id: LocationId, attempt: u32) -> Result<JobHandle> {
        let job_id = Uuid::new_v4();
        let (status, receiver) = watch::channel(JobStatus::Queued);

        self.sender
            .send(QueuedAttempt {
                job_id,
                location_id,
                attempt,
                status,
            })
            .map_err(|_| ExploraError::Internal("job dispatcher is not running".to_string()))?;

        debug!(job_id = %job_id, location_id = %location_id, attempt, "Job queued");
        Ok(JobHandle {
            job_id,
            location_id,
            status: receiver,
        })
    }
}

impl JobQueue for Dispatcher {
    fn enqueue(&self, location_id: LocationId) -> Result<JobHandle> {
        self.submit(location_id, 1)
    }
}

fn completion_label(completion: &JobCompletion) -> &'static str {
    match completion {
        JobCompletion::Generated { .. } => "generated",
        JobCompletion::AlreadyGenerated => "already_generated",
        JobCompletion::Deduplicated => "deduplicated",
    }
}

impl Worker {
    async fn run(self: Arc<Self>, mut receiver: mpsc::UnboundedReceiver<QueuedAttempt>) {
        while let Some(queued) = receiver.recv().await {
            let permit = match self.semaphore.clone().acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => break,
            };

            let worker = self.clone();
            tokio::spawn(async move {
                worker.execute(queued).await;
                drop(permit);
            });
        }
        debug!("Job dispatcher run loop stopped");
    }

    async fn execute(&self, queued: QueuedAttempt) {
        let QueuedAttempt {
            job_id,
            location_id,
            attempt,
            status,
        } = queued;

        status.send_replace(JobStatus::Running { attempt });

        match self.job.run(location_id, attempt).await {
            JobOutcome::Completed(completion) => {
                info!(
                    job_id = %job_id,
                    location_id = %location_id,
                    attempt,
                    result = completion_label(&completion),
                    "Image generation job completed"
                );
                self.dead_letters.remove(&location_id);
                status.send_replace(JobStatus::Completed { completion });
            }
            JobOutcome::RetryScheduled {
                next_attempt,
                delay,
                error,
            } => {
                warn!(
                    job_id = %job_id,
                    location_id = %location_id,
                    attempt,
                    next_attempt,
                    delay_ms = delay.as_millis() as u64,
                    error_kind = error.kind(),
                    "Attempt failed, retry scheduled: {}",
                    error
                );
                status.send_replace(JobStatus::RetryScheduled {
                    next_attempt,
                    delay_ms: delay.as_millis() as u64,
                });
                self.schedule_retry(
                    QueuedAttempt {
                        job_id,
                        location_id,
                        attempt: next_attempt,
                        status,
                    },
                    delay,
                );
            }
            JobOutcome::Abandoned { attempts, error } => {
                let reason = error.to_string();
                self.dead_letter(AbandonedJob {
                    job_id,
                    location_id,
                    attempts,
                    error_kind: error.kind().to_string(),
                    reason: reason.clone(),
                    retries_exhausted: true,
                    abandoned_at: Utc::now(),
                });
                status.send_replace(JobStatus::Abandoned { attempts, reason });
            }
            JobOutcome::Failed { error } => {
                let reason = error.to_string();
                self.dead_letter(AbandonedJob {
                    job_id,
                    location_id,
                    attempts: attempt,
                    error_kind: error.kind().to_string(),
                    reason: reason.clone(),
                    retries_exhausted: false,
                    abandoned_at: Utc::now(),
                });
                status.send_replace(JobStatus::Failed { reason });
            }
        }
    }

    fn schedule_retry(&self, queued: QueuedAttempt, delay: Duration) {
        let retries = self.retries.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;

            let Some(sender) = retries.upgrade() else {
                warn!(job_id = %queued.job_id, "Dispatcher stopped before retry");
                queued.status.send_replace(JobStatus::Abandoned {
                    attempts: queued.attempt - 1,
                    reason: "dispatcher stopped".to_string(),
                });
                return;
            };

            if let Err(mpsc::error::SendError(queued)) = sender.send(queued) {
                warn!(job_id = %queued.job_id, "Dispatcher stopped before retry");
                queued.status.send_replace(JobStatus::Abandoned {
                    attempts: queued.attempt - 1,
                    reason: "dispatcher stopped".to_string(),
                });
            }
        });
    }

    fn dead_letter(&self, job: AbandonedJob) {
        error!(
            job_id = %job.job_id,
            location_id = %job.location_id,
            attempt = job.attempts,
            error_kind = %job.error_kind,
            retries_exhausted = job.retries_exhausted,
            "Image generation job dead-lettered: {}",
            job.reason
        );
        self.dead_letters.insert(job.location_id, job);
    }
}

//! Generation job tracking.
//!
//! A generation job runs server-side for minutes. The runner persists the
//! job id and its retry counter before anything else happens, so a killed
//! process can pick the job back up with `resume()` instead of losing it.
//! Polling runs on a fixed cadence after an initial grace delay; a `failed`
//! status is re-kicked once, with the spent budget read back from disk on
//! every decision so restarts cannot mint fresh retries.

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, info, warn};

use regimen_client::JobApi;
use regimen_types::{GenerationInput, GenerationResult, JobStatus, SyncEvent};

use crate::event_bus::EventBus;
use crate::state_store::{PersistedJobState, StateStore};

const DEFAULT_INITIAL_DELAY: Duration = Duration::from_secs(20);
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(3);
const DEFAULT_RETRY_COOLDOWN: Duration = Duration::from_secs(3);
const DEFAULT_RETRY_BUDGET: u32 = 1;

#[derive(Debug, Clone)]
pub struct JobConfig {
    /// Grace period before the first status check. A job can never finish
    /// faster than this, so earlier polls are wasted.
    pub initial_delay: Duration,
    pub poll_interval: Duration,
    pub retry_cooldown: Duration,
    pub retry_budget: u32,
}

impl Default for JobConfig {
    fn default() -> Self {
        Self {
            initial_delay: DEFAULT_INITIAL_DELAY,
            poll_interval: DEFAULT_POLL_INTERVAL,
            retry_cooldown: DEFAULT_RETRY_COOLDOWN,
            retry_budget: DEFAULT_RETRY_BUDGET,
        }
    }
}

#[derive(Debug, Error)]
pub enum JobError {
    /// The server declared the job failed and the retry budget is spent.
    /// Terminal: persisted job state has been cleared, a fresh `start` is
    /// the only way forward.
    #[error("generation failed: {message}")]
    Exhausted { message: String },
    /// Transport-level failure while talking to the job service. Persisted
    /// state is left intact and the retry budget untouched; `resume()` can
    /// re-enter polling.
    #[error(transparent)]
    Api(#[from] anyhow::Error),
}

struct RunnerInner {
    api: Arc<dyn JobApi>,
    store: StateStore,
    events: EventBus,
    config: JobConfig,
}

#[derive(Clone)]
pub struct JobRunner {
    inner: Arc<RunnerInner>,
}

impl JobRunner {
    pub fn new(api: Arc<dyn JobApi>, store: StateStore, events: EventBus) -> Self {
        Self::with_config(api, store, events, JobConfig::default())
    }

    pub fn with_config(
        api: Arc<dyn JobApi>,
        store: StateStore,
        events: EventBus,
        config: JobConfig,
    ) -> Self {
        Self {
            inner: Arc::new(RunnerInner {
                api,
                store,
                events,
                config,
            }),
        }
    }

    /// Submit a job and persist its id before returning, so a crash right
    /// after submission is still resumable.
    pub async fn start(&self, input: &GenerationInput) -> Result<String, JobError> {
        let job_id = self.inner.api.submit(input).await?;
        self.inner
            .store
            .save(&PersistedJobState {
                job_id: Some(job_id.clone()),
                retry_count: 0,
            })
            .await;
        info!("generation job {job_id} submitted");
        Ok(job_id)
    }

    /// Drive a freshly started job to a terminal state. Waits out the
    /// initial grace delay before the first poll. Must not be called twice
    /// concurrently for the same job.
    pub async fn await_completion(&self, job_id: &str) -> Result<GenerationResult, JobError> {
        tokio::time::sleep(self.inner.config.initial_delay).await;
        self.poll_to_completion(job_id).await
    }

    /// Pick up whatever job is persisted, if any. Skips the initial delay:
    /// by the time the host process came back, the job has had its grace
    /// period. The persisted retry counter is carried over, not reset.
    pub async fn resume(&self) -> Result<Option<GenerationResult>, JobError> {
        let persisted = self.inner.store.load().await;
        let Some(job_id) = persisted.job_id else {
            return Ok(None);
        };
        info!("resuming generation job {job_id}");
        self.poll_to_completion(&job_id).await.map(Some)
    }

    async fn poll_to_completion(&self, job_id: &str) -> Result<GenerationResult, JobError> {
        loop {
            let status = self.inner.api.status(job_id).await?;
            self.inner.events.publish(SyncEvent::JobUpdated {
                job_id: job_id.to_string(),
                status: status.clone(),
            });
            match status {
                JobStatus::Pending | JobStatus::Processing => {
                    debug!("generation job {job_id} still running");
                    tokio::time::sleep(self.inner.config.poll_interval).await;
                }
                JobStatus::Completed { result_id } => {
                    let result = self.inner.api.fetch_result(&result_id).await?;
                    self.inner.store.clear().await;
                    info!("generation job {job_id} completed as {result_id}");
                    return Ok(result);
                }
                JobStatus::Failed { message } => {
                    // Disk, not memory, decides how much budget is left.
                    let persisted = self.inner.store.load().await;
                    if persisted.retry_count < self.inner.config.retry_budget {
                        self.inner
                            .store
                            .save(&PersistedJobState {
                                job_id: Some(job_id.to_string()),
                                retry_count: persisted.retry_count + 1,
                            })
                            .await;
                        warn!("generation job {job_id} failed, retrying once: {message}");
                        self.inner.api.retry(job_id).await?;
                        tokio::time::sleep(self.inner.config.retry_cooldown).await;
                    } else {
                        self.inner.store.clear().await;
                        return Err(JobError::Exhausted { message });
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use regimen_client::InMemoryJobApi;
    use serde_json::json;

    fn input() -> GenerationInput {
        GenerationInput {
            user_id: "u1".to_string(),
            intake: json!({"goal": "sleep"}),
        }
    }

    fn result(id: &str) -> GenerationResult {
        GenerationResult {
            id: id.to_string(),
            plan: json!({"items": []}),
        }
    }

    fn runner_over(api: Arc<InMemoryJobApi>, store: StateStore) -> JobRunner {
        JobRunner::new(api, store, EventBus::new())
    }

    // ── Happy path ────────────────────────────────────────────────────────

    #[tokio::test(start_paused = true)]
    async fn polls_until_completed_and_clears_state() {
        let dir = tempfile::tempdir().unwrap();
        let store = StateStore::new(dir.path().join("job_state.json"));
        let api = Arc::new(InMemoryJobApi::new());
        api.script_status([
            JobStatus::Pending,
            JobStatus::Processing,
            JobStatus::Completed {
                result_id: "rec-1".to_string(),
            },
        ]);
        api.insert_result(result("rec-1"));
        let runner = runner_over(api.clone(), store.clone());

        let job_id = runner.start(&input()).await.unwrap();
        assert_eq!(store.load().await.job_id, Some(job_id.clone()));

        let result = runner.await_completion(&job_id).await.unwrap();
        assert_eq!(result.id, "rec-1");
        assert_eq!(api.status_calls(), 3);
        assert_eq!(store.load().await.job_id, None);
    }

    #[tokio::test(start_paused = true)]
    async fn first_poll_waits_out_initial_delay() {
        let dir = tempfile::tempdir().unwrap();
        let store = StateStore::new(dir.path().join("job_state.json"));
        let api = Arc::new(InMemoryJobApi::new());
        api.script_status([JobStatus::Completed {
            result_id: "rec-1".to_string(),
        }]);
        api.insert_result(result("rec-1"));
        let runner = runner_over(api.clone(), store);

        let job_id = runner.start(&input()).await.unwrap();
        let poller = tokio::spawn({
            let runner = runner.clone();
            async move { runner.await_completion(&job_id).await }
        });

        tokio::time::sleep(Duration::from_secs(19)).await;
        assert_eq!(api.status_calls(), 0);

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(api.status_calls(), 1);
        poller.await.unwrap().unwrap();
    }

    // ── Retry budget ──────────────────────────────────────────────────────

    #[tokio::test(start_paused = true)]
    async fn second_failure_is_terminal_and_stops_polling() {
        let dir = tempfile::tempdir().unwrap();
        let store = StateStore::new(dir.path().join("job_state.json"));
        let api = Arc::new(InMemoryJobApi::new());
        api.script_status([
            JobStatus::Failed {
                message: "first".to_string(),
            },
            JobStatus::Failed {
                message: "second".to_string(),
            },
        ]);
        let runner = runner_over(api.clone(), store.clone());

        let job_id = runner.start(&input()).await.unwrap();
        let err = runner.await_completion(&job_id).await.unwrap_err();

        assert!(matches!(err, JobError::Exhausted { ref message } if message == "second"));
        assert_eq!(api.status_calls(), 2);
        assert_eq!(api.retry_calls(), 1);
        assert_eq!(store.load().await.job_id, None);
    }

    #[tokio::test(start_paused = true)]
    async fn restart_does_not_refill_retry_budget() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("job_state.json");

        // First run: submit, then the process dies before polling finishes.
        let api1 = Arc::new(InMemoryJobApi::new());
        let runner1 = runner_over(api1, StateStore::new(path.clone()));
        let job_id = runner1.start(&input()).await.unwrap();
        drop(runner1);
        assert_eq!(
            StateStore::new(path.clone()).load().await.job_id,
            Some(job_id)
        );

        // Second run: resume against the surviving state.
        let api2 = Arc::new(InMemoryJobApi::new());
        api2.script_status([
            JobStatus::Failed {
                message: "first".to_string(),
            },
            JobStatus::Failed {
                message: "second".to_string(),
            },
        ]);
        let store = StateStore::new(path);
        let runner2 = runner_over(api2.clone(), store.clone());

        let err = runner2.resume().await.unwrap_err();
        assert!(matches!(err, JobError::Exhausted { .. }));
        assert_eq!(api2.retry_calls(), 1);
        assert_eq!(store.load().await.job_id, None);
    }

    #[tokio::test(start_paused = true)]
    async fn resume_honors_already_spent_budget() {
        let dir = tempfile::tempdir().unwrap();
        let store = StateStore::new(dir.path().join("job_state.json"));
        store
            .save(&PersistedJobState {
                job_id: Some("job-9".to_string()),
                retry_count: 1,
            })
            .await;

        let api = Arc::new(InMemoryJobApi::new());
        api.script_status([JobStatus::Failed {
            message: "still broken".to_string(),
        }]);
        let runner = runner_over(api.clone(), store.clone());

        let err = runner.resume().await.unwrap_err();
        assert!(matches!(err, JobError::Exhausted { ref message } if message == "still broken"));
        assert_eq!(api.retry_calls(), 0);
        assert_eq!(api.status_calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn resume_without_persisted_job_is_a_noop() {
        let dir = tempfile::tempdir().unwrap();
        let store = StateStore::new(dir.path().join("job_state.json"));
        let api = Arc::new(InMemoryJobApi::new());
        let runner = runner_over(api.clone(), store);

        assert!(runner.resume().await.unwrap().is_none());
        assert_eq!(api.status_calls(), 0);
    }

    // ── Transport failures ────────────────────────────────────────────────

    #[tokio::test(start_paused = true)]
    async fn transport_error_preserves_state_and_budget() {
        let dir = tempfile::tempdir().unwrap();
        let store = StateStore::new(dir.path().join("job_state.json"));
        // Empty script: the first status call fails at the transport level.
        let api = Arc::new(InMemoryJobApi::new());
        let runner = runner_over(api.clone(), store.clone());

        let job_id = runner.start(&input()).await.unwrap();
        let err = runner.await_completion(&job_id).await.unwrap_err();

        assert!(matches!(err, JobError::Api(_)));
        let persisted = store.load().await;
        assert_eq!(persisted.job_id, Some(job_id));
        assert_eq!(persisted.retry_count, 0);
    }

    // ── Events ────────────────────────────────────────────────────────────

    #[tokio::test(start_paused = true)]
    async fn status_changes_are_published() {
        let dir = tempfile::tempdir().unwrap();
        let store = StateStore::new(dir.path().join("job_state.json"));
        let api = Arc::new(InMemoryJobApi::new());
        api.script_status([
            JobStatus::Processing,
            JobStatus::Completed {
                result_id: "rec-1".to_string(),
            },
        ]);
        api.insert_result(result("rec-1"));
        let events = EventBus::new();
        let mut rx = events.subscribe();
        let runner = JobRunner::new(api, store, events);

        let job_id = runner.start(&input()).await.unwrap();
        runner.await_completion(&job_id).await.unwrap();

        match rx.try_recv().unwrap() {
            SyncEvent::JobUpdated { status, .. } => assert_eq!(status, JobStatus::Processing),
            other => panic!("unexpected event {other:?}"),
        }
        assert!(matches!(
            rx.try_recv().unwrap(),
            SyncEvent::JobUpdated {
                status: JobStatus::Completed { .. },
                ..
            }
        ));
    }
}

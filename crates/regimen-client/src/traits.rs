use async_trait::async_trait;
use chrono::NaiveDate;

use regimen_types::{GenerationInput, GenerationResult, JobStatus, LogWriteRequest, WeekSnapshot};

/// Remote intake log service. Writes are date-scoped and batched; reads are
/// weekly snapshots. Implementations are chosen by the composing caller.
#[async_trait]
pub trait IntakeLogApi: Send + Sync {
    async fn write_day(&self, request: &LogWriteRequest) -> anyhow::Result<()>;
    async fn fetch_week(&self, week_start: NaiveDate) -> anyhow::Result<WeekSnapshot>;
}

/// Remote generation job service.
#[async_trait]
pub trait JobApi: Send + Sync {
    /// Submit a new job; returns the server-assigned job id.
    async fn submit(&self, input: &GenerationInput) -> anyhow::Result<String>;
    async fn status(&self, job_id: &str) -> anyhow::Result<JobStatus>;
    /// Re-kick a job the server reported as failed.
    async fn retry(&self, job_id: &str) -> anyhow::Result<()>;
    async fn fetch_result(&self, result_id: &str) -> anyhow::Result<GenerationResult>;
}

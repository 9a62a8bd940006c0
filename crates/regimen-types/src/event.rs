use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::JobStatus;

/// Events published by the sync core for presentation-layer observers.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SyncEvent {
    FlushSucceeded { dates: Vec<NaiveDate> },
    FlushFailed { date: NaiveDate },
    JobUpdated { job_id: String, status: JobStatus },
}

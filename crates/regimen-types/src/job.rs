use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Server-reported state of a generation job.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Processing,
    Completed {
        #[serde(rename = "resultId")]
        result_id: String,
    },
    Failed {
        message: String,
    },
}

impl JobStatus {
    /// Pending and processing both mean "keep polling".
    pub fn is_settled(&self) -> bool {
        matches!(self, JobStatus::Completed { .. } | JobStatus::Failed { .. })
    }
}

/// Questionnaire payload submitted to start a generation job. The plan
/// contents are a presentation-layer concern and travel opaquely.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationInput {
    pub user_id: String,
    pub intake: Value,
}

/// Finalized output of a completed generation job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationResult {
    pub id: String,
    pub plan: Value,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_tagging_matches_server_payloads() {
        let pending: JobStatus = serde_json::from_str(r#"{"status": "pending"}"#).unwrap();
        assert_eq!(pending, JobStatus::Pending);
        assert!(!pending.is_settled());

        let completed: JobStatus =
            serde_json::from_str(r#"{"status": "completed", "resultId": "rec-42"}"#).unwrap();
        assert_eq!(
            completed,
            JobStatus::Completed {
                result_id: "rec-42".to_string()
            }
        );
        assert!(completed.is_settled());

        let failed: JobStatus =
            serde_json::from_str(r#"{"status": "failed", "message": "model timeout"}"#).unwrap();
        assert!(matches!(failed, JobStatus::Failed { ref message } if message == "model timeout"));
    }
}

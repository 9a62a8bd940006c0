//! HTTP-backed implementations of the remote API traits.
//!
//! ## API paths
//!
//! | Action          | Path                              |
//! |-----------------|-----------------------------------|
//! | Write day log   | `POST /intake/log`                |
//! | Weekly snapshot | `GET  /intake/week?start=...`     |
//! | Submit job      | `POST /generation`                |
//! | Job status      | `GET  /generation/{id}/status`    |
//! | Retry job       | `POST /generation/{id}/retry`     |
//! | Fetch result    | `GET  /recommendation/{resultId}` |

use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use reqwest::Client;
use serde_json::json;

use regimen_types::{GenerationInput, GenerationResult, JobStatus, LogWriteRequest, WeekSnapshot};

use crate::config::ApiConfig;
use crate::traits::{IntakeLogApi, JobApi};

/// Attach both auth schemes so the client works against the production
/// gateway (Bearer) and the staging proxy (x-regimen-token).
fn add_auth(rb: reqwest::RequestBuilder, token: &str) -> reqwest::RequestBuilder {
    rb.header("x-regimen-token", token).bearer_auth(token)
}

fn body_preview(body: String) -> String {
    if body.chars().count() > 320 {
        let truncated: String = body.chars().take(320).collect();
        format!("{truncated}...")
    } else {
        body
    }
}

async fn check_status(resp: reqwest::Response, what: &str) -> anyhow::Result<reqwest::Response> {
    if resp.status().is_success() {
        return Ok(resp);
    }
    let status = resp.status();
    let body = resp.text().await.unwrap_or_default();
    anyhow::bail!("{what} failed ({status}): {}", body_preview(body))
}

pub struct HttpIntakeLogApi {
    base_url: String,
    api_token: String,
    client: Client,
}

impl HttpIntakeLogApi {
    pub fn new(config: &ApiConfig) -> anyhow::Result<Self> {
        Ok(Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_token: config.api_token.clone(),
            client: Client::builder()
                .timeout(Duration::from_secs(config.timeout_secs))
                .build()?,
        })
    }
}

#[async_trait]
impl IntakeLogApi for HttpIntakeLogApi {
    async fn write_day(&self, request: &LogWriteRequest) -> anyhow::Result<()> {
        let resp = add_auth(
            self.client.post(format!("{}/intake/log", self.base_url)),
            &self.api_token,
        )
        .json(request)
        .send()
        .await?;
        check_status(resp, "intake log write").await?;
        Ok(())
    }

    async fn fetch_week(&self, week_start: NaiveDate) -> anyhow::Result<WeekSnapshot> {
        let resp = add_auth(
            self.client.get(format!("{}/intake/week", self.base_url)),
            &self.api_token,
        )
        .query(&[("start", week_start.format("%Y-%m-%d").to_string())])
        .send()
        .await?;
        let resp = check_status(resp, "weekly snapshot fetch").await?;
        Ok(resp.json().await?)
    }
}

pub struct HttpJobApi {
    base_url: String,
    api_token: String,
    client: Client,
}

impl HttpJobApi {
    pub fn new(config: &ApiConfig) -> anyhow::Result<Self> {
        Ok(Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_token: config.api_token.clone(),
            client: Client::builder()
                .timeout(Duration::from_secs(config.timeout_secs))
                .build()?,
        })
    }
}

#[async_trait]
impl JobApi for HttpJobApi {
    async fn submit(&self, input: &GenerationInput) -> anyhow::Result<String> {
        let resp = add_auth(
            self.client.post(format!("{}/generation", self.base_url)),
            &self.api_token,
        )
        .json(input)
        .send()
        .await?;
        let resp = check_status(resp, "job submit").await?;
        let body: serde_json::Value = resp.json().await?;
        body.get("jobId")
            .and_then(|v| v.as_str())
            .map(|s| s.to_string())
            .ok_or_else(|| anyhow::anyhow!("job submit response carried no jobId: {body}"))
    }

    async fn status(&self, job_id: &str) -> anyhow::Result<JobStatus> {
        let resp = add_auth(
            self.client
                .get(format!("{}/generation/{job_id}/status", self.base_url)),
            &self.api_token,
        )
        .send()
        .await?;
        let resp = check_status(resp, "job status").await?;
        Ok(resp.json().await?)
    }

    async fn retry(&self, job_id: &str) -> anyhow::Result<()> {
        let resp = add_auth(
            self.client
                .post(format!("{}/generation/{job_id}/retry", self.base_url)),
            &self.api_token,
        )
        .json(&json!({}))
        .send()
        .await?;
        check_status(resp, "job retry").await?;
        Ok(())
    }

    async fn fetch_result(&self, result_id: &str) -> anyhow::Result<GenerationResult> {
        let resp = add_auth(
            self.client
                .get(format!("{}/recommendation/{result_id}", self.base_url)),
            &self.api_token,
        )
        .send()
        .await?;
        let resp = check_status(resp, "result fetch").await?;
        Ok(resp.json().await?)
    }
}

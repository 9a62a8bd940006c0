//! In-memory API implementations for tests and offline development.

use std::collections::{HashMap, HashSet, VecDeque};

use async_trait::async_trait;
use chrono::{Days, NaiveDate};
use parking_lot::Mutex;

use regimen_types::{
    DaySnapshot, GenerationInput, GenerationResult, IntakeStatus, JobStatus, LogWriteRequest,
    Timeslot, WeekSnapshot,
};

use crate::traits::{IntakeLogApi, JobApi};

#[derive(Default)]
struct LogState {
    days: HashMap<NaiveDate, HashMap<(String, Timeslot), bool>>,
    fail_dates: HashSet<NaiveDate>,
    writes: Vec<LogWriteRequest>,
}

/// Intake log backed by a plain map, with per-date write failure injection.
#[derive(Default)]
pub struct InMemoryLogApi {
    state: Mutex<LogState>,
}

impl InMemoryLogApi {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seed(&self, date: NaiveDate, item_id: &str, timeslot: Timeslot, taken: bool) {
        self.state
            .lock()
            .days
            .entry(date)
            .or_default()
            .insert((item_id.to_string(), timeslot), taken);
    }

    /// Make every subsequent write for `date` fail.
    pub fn fail_writes_for(&self, date: NaiveDate) {
        self.state.lock().fail_dates.insert(date);
    }

    pub fn clear_failures(&self) {
        self.state.lock().fail_dates.clear();
    }

    /// Every write request received so far, failed ones included.
    pub fn writes(&self) -> Vec<LogWriteRequest> {
        self.state.lock().writes.clone()
    }

    pub fn taken(&self, date: NaiveDate, item_id: &str, timeslot: Timeslot) -> Option<bool> {
        self.state
            .lock()
            .days
            .get(&date)
            .and_then(|items| items.get(&(item_id.to_string(), timeslot)))
            .copied()
    }
}

#[async_trait]
impl IntakeLogApi for InMemoryLogApi {
    async fn write_day(&self, request: &LogWriteRequest) -> anyhow::Result<()> {
        let mut state = self.state.lock();
        state.writes.push(request.clone());
        if state.fail_dates.contains(&request.date) {
            anyhow::bail!("injected write failure for {}", request.date);
        }
        let day = state.days.entry(request.date).or_default();
        for entry in &request.entries {
            day.insert((entry.item_id.clone(), entry.timeslot), entry.taken);
        }
        Ok(())
    }

    async fn fetch_week(&self, week_start: NaiveDate) -> anyhow::Result<WeekSnapshot> {
        let state = self.state.lock();
        let mut week_data = Vec::new();
        for offset in 0..7 {
            let date = week_start + Days::new(offset);
            let Some(items) = state.days.get(&date) else {
                continue;
            };
            let mut items: Vec<IntakeStatus> = items
                .iter()
                .map(|((item_id, timeslot), taken)| IntakeStatus {
                    item_id: item_id.clone(),
                    item_name: item_id.clone(),
                    timeslot: *timeslot,
                    taken: *taken,
                })
                .collect();
            items.sort_by(|a, b| a.item_id.cmp(&b.item_id));
            week_data.push(DaySnapshot { date, items });
        }
        Ok(WeekSnapshot { week_data })
    }
}

#[derive(Default)]
struct JobState {
    scripted: VecDeque<JobStatus>,
    results: HashMap<String, GenerationResult>,
    submitted: Vec<GenerationInput>,
    status_calls: usize,
    retry_calls: usize,
    next_job: usize,
}

/// Job API driven by a scripted status sequence. `status` drains the script
/// one entry per call and errors once it runs dry, so a test over-polling by
/// one call fails loudly instead of looping.
#[derive(Default)]
pub struct InMemoryJobApi {
    state: Mutex<JobState>,
}

impl InMemoryJobApi {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn script_status(&self, statuses: impl IntoIterator<Item = JobStatus>) {
        self.state.lock().scripted.extend(statuses);
    }

    pub fn insert_result(&self, result: GenerationResult) {
        self.state.lock().results.insert(result.id.clone(), result);
    }

    pub fn status_calls(&self) -> usize {
        self.state.lock().status_calls
    }

    pub fn retry_calls(&self) -> usize {
        self.state.lock().retry_calls
    }

    pub fn submitted(&self) -> Vec<GenerationInput> {
        self.state.lock().submitted.clone()
    }
}

#[async_trait]
impl JobApi for InMemoryJobApi {
    async fn submit(&self, input: &GenerationInput) -> anyhow::Result<String> {
        let mut state = self.state.lock();
        state.submitted.push(input.clone());
        state.next_job += 1;
        Ok(format!("job-{}", state.next_job))
    }

    async fn status(&self, job_id: &str) -> anyhow::Result<JobStatus> {
        let mut state = self.state.lock();
        state.status_calls += 1;
        state
            .scripted
            .pop_front()
            .ok_or_else(|| anyhow::anyhow!("status script drained for {job_id}"))
    }

    async fn retry(&self, _job_id: &str) -> anyhow::Result<()> {
        self.state.lock().retry_calls += 1;
        Ok(())
    }

    async fn fetch_result(&self, result_id: &str) -> anyhow::Result<GenerationResult> {
        self.state
            .lock()
            .results
            .get(result_id)
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("no result {result_id}"))
    }
}

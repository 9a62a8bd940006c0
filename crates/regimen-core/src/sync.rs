//! Intake log reconciliation.
//!
//! The engine keeps a local overlay of "taken/not taken" facts layered over
//! whatever the log service last reported. Toggles land in the overlay
//! immediately and are flushed to the server in date-scoped batches after a
//! debounce quiet period, so a burst of taps costs one request per touched
//! date. Failed batches roll the overlay back; snapshot syncs never clobber
//! an edit that is still in flight.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDate;
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use regimen_client::IntakeLogApi;
use regimen_types::{IntakeKey, LogEntry, LogWriteRequest, SyncEvent, Timeslot, WeekSnapshot};

use crate::event_bus::EventBus;

const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(1500);

#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Quiet period after the last toggle before pending edits are flushed.
    pub debounce: Duration,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            debounce: DEFAULT_DEBOUNCE,
        }
    }
}

#[derive(Default)]
struct SyncState {
    /// Session-local view of each fact, keyed by `IntakeKey::storage_key`.
    overlay: HashMap<String, bool>,
    /// Edits not yet confirmed by the server. Always a subset of the overlay
    /// with identical values; last toggle per key wins.
    pending: HashMap<String, bool>,
    debounce_timer: Option<JoinHandle<()>>,
    flush_in_flight: bool,
}

struct EngineInner {
    log_api: Arc<dyn IntakeLogApi>,
    events: EventBus,
    debounce: Duration,
    state: Mutex<SyncState>,
}

#[derive(Clone)]
pub struct IntakeSyncEngine {
    inner: Arc<EngineInner>,
}

impl IntakeSyncEngine {
    pub fn new(log_api: Arc<dyn IntakeLogApi>, events: EventBus) -> Self {
        Self::with_config(log_api, events, SyncConfig::default())
    }

    pub fn with_config(
        log_api: Arc<dyn IntakeLogApi>,
        events: EventBus,
        config: SyncConfig,
    ) -> Self {
        Self {
            inner: Arc::new(EngineInner {
                log_api,
                events,
                debounce: config.debounce,
                state: Mutex::new(SyncState::default()),
            }),
        }
    }

    /// Flip a fact locally and schedule a flush. Fire-and-forget: the caller
    /// sees the new value on the next `is_taken` read, and a write failure is
    /// only observable as the value reverting later.
    pub fn toggle(&self, item_id: &str, timeslot: Timeslot, date: NaiveDate, current_state: bool) {
        let key = IntakeKey::new(date, item_id, timeslot).storage_key();
        let new_state = !current_state;

        let mut state = self.inner.state.lock();
        state.overlay.insert(key.clone(), new_state);
        state.pending.insert(key, new_state);

        // Reschedule the flush relative to this toggle, not the first one.
        if let Some(timer) = state.debounce_timer.take() {
            timer.abort();
        }
        let engine = self.clone();
        state.debounce_timer = Some(tokio::spawn(async move {
            tokio::time::sleep(engine.inner.debounce).await;
            engine.flush().await;
        }));
    }

    /// Overlay value for the fact if the session has one, else the caller's
    /// remote state. Pure read, safe once per rendered row.
    pub fn is_taken(
        &self,
        item_id: &str,
        timeslot: Timeslot,
        date: NaiveDate,
        remote_state: bool,
    ) -> bool {
        let key = IntakeKey::new(date, item_id, timeslot).storage_key();
        self.inner
            .state
            .lock()
            .overlay
            .get(&key)
            .copied()
            .unwrap_or(remote_state)
    }

    pub fn has_pending(&self) -> bool {
        !self.inner.state.lock().pending.is_empty()
    }

    /// Reconcile the overlay against a fresh server snapshot. Keys with an
    /// edit in flight are skipped; overlay keys absent from both the snapshot
    /// and the pending set are dropped, bounding the overlay to the visible
    /// window.
    pub fn sync_with_snapshot(&self, snapshot: &WeekSnapshot) {
        let mut guard = self.inner.state.lock();
        let state = &mut *guard;

        let mut seen = HashSet::new();
        for day in &snapshot.week_data {
            for item in &day.items {
                let key = IntakeKey::new(day.date, item.item_id.as_str(), item.timeslot)
                    .storage_key();
                if !state.pending.contains_key(&key) {
                    state.overlay.insert(key.clone(), item.taken);
                }
                seen.insert(key);
            }
        }

        let pending = &state.pending;
        state
            .overlay
            .retain(|key, _| seen.contains(key) || pending.contains_key(key));
    }

    /// Fetch the weekly snapshot from the server and reconcile against it.
    pub async fn refresh_week(&self, week_start: NaiveDate) -> anyhow::Result<()> {
        let snapshot = self.inner.log_api.fetch_week(week_start).await?;
        self.sync_with_snapshot(&snapshot);
        Ok(())
    }

    /// Flush now instead of waiting out the debounce. For callers that need
    /// durability before tearing down, e.g. leaving the schedule screen.
    pub async fn flush_pending(&self) {
        if let Some(timer) = self.inner.state.lock().debounce_timer.take() {
            timer.abort();
        }
        self.flush().await;
    }

    /// Single-flight flush of everything pending, one write per date. Failed
    /// date groups are rolled back by flipping the overlay bit; the pending
    /// set is cleared wholesale once the round settles.
    async fn flush(&self) {
        let batches: HashMap<NaiveDate, Vec<LogEntry>> = {
            let mut state = self.inner.state.lock();
            if state.pending.is_empty() || state.flush_in_flight {
                return;
            }
            state.flush_in_flight = true;

            let mut batches: HashMap<NaiveDate, Vec<LogEntry>> = HashMap::new();
            for (raw, taken) in &state.pending {
                let Ok(key) = IntakeKey::parse(raw) else {
                    warn!("dropping unparseable pending key {raw}");
                    continue;
                };
                batches.entry(key.date).or_default().push(LogEntry {
                    item_id: key.item_id,
                    timeslot: key.timeslot,
                    taken: *taken,
                });
            }
            batches
        };

        let mut succeeded = Vec::new();
        let mut failed = Vec::new();
        for (date, entries) in &batches {
            let request = LogWriteRequest {
                date: *date,
                entries: entries.clone(),
            };
            match self.inner.log_api.write_day(&request).await {
                Ok(()) => {
                    debug!("flushed {} intake entries for {date}", entries.len());
                    succeeded.push(*date);
                }
                Err(e) => {
                    warn!("intake flush for {date} failed, reverting: {e}");
                    failed.push(*date);
                }
            }
        }

        {
            let mut state = self.inner.state.lock();
            for date in &failed {
                for entry in &batches[date] {
                    let key = IntakeKey::new(*date, entry.item_id.as_str(), entry.timeslot)
                        .storage_key();
                    state.overlay.insert(key, !entry.taken);
                }
            }
            state.pending.clear();
            state.flush_in_flight = false;
        }

        if !succeeded.is_empty() {
            self.inner
                .events
                .publish(SyncEvent::FlushSucceeded { dates: succeeded });
        }
        for date in failed {
            self.inner.events.publish(SyncEvent::FlushFailed { date });
        }
    }
}

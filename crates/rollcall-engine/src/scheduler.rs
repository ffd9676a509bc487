//! Scheduler — the loop that fires due schedule entries.
//!
//! Each tick reads the due entries and spawns one task per entry. A
//! running set keyed by entry id stops a slow batch from being fired
//! again by the next tick. Entries advance their `next_run` only after a
//! successful batch; a failed one stays due and is retried next tick.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, NaiveTime, Utc, Weekday};
use tokio::task::JoinHandle;

use rollcall_core::Result;
use rollcall_core::schedule::{Recurrence, ScheduleEntry};
use rollcall_core::types::TriggerKind;
use rollcall_store::Store;

use crate::dispatcher::Dispatcher;

pub struct Scheduler {
    store: Arc<Store>,
    dispatcher: Arc<Dispatcher>,
    tick_secs: u64,
    running: Mutex<HashSet<i64>>,
}

impl Scheduler {
    pub fn new(store: Arc<Store>, dispatcher: Arc<Dispatcher>, tick_secs: u64) -> Self {
        Self {
            store,
            dispatcher,
            tick_secs,
            running: Mutex::new(HashSet::new()),
        }
    }

    /// Run the tick loop forever.
    pub async fn run(self: Arc<Self>) {
        tracing::info!("⏰ Scheduler started (check every {}s)", self.tick_secs);
        let mut interval = tokio::time::interval(Duration::from_secs(self.tick_secs.max(1)));
        loop {
            interval.tick().await;
            self.fire_due(Utc::now());
        }
    }

    /// Spawn one task per due entry not already in flight. Returns the
    /// handles so tests can await completion.
    pub fn fire_due(self: &Arc<Self>, now: DateTime<Utc>) -> Vec<JoinHandle<()>> {
        let due = match self.store.due_entries(now) {
            Ok(due) => due,
            Err(e) => {
                tracing::error!("Failed to read due schedule entries: {e}");
                return Vec::new();
            }
        };

        let mut handles = Vec::new();
        for entry in due {
            if !self.running.lock().unwrap().insert(entry.id) {
                tracing::debug!("Schedule entry {} still running, not re-firing", entry.id);
                continue;
            }
            let scheduler = Arc::clone(self);
            handles.push(tokio::spawn(async move {
                let _slot = RunningSlot { scheduler: Arc::clone(&scheduler), id: entry.id };
                if let Err(e) = scheduler.process_entry(&entry, now).await {
                    tracing::error!(
                        "Schedule entry {} ({}) failed, will retry next tick: {e}",
                        entry.id,
                        entry.trigger
                    );
                }
            }));
        }
        handles
    }

    /// Fire one entry: dispatch for its owner, or for every owner with
    /// settings when the entry is a system-level sweep. Advances
    /// `next_run` strictly past `now` only once dispatch succeeded.
    pub async fn process_entry(&self, entry: &ScheduleEntry, now: DateTime<Utc>) -> Result<()> {
        tracing::info!("🔔 Schedule entry {} fired: {}", entry.id, entry.trigger);
        let owners = match entry.owner_id {
            Some(owner) => vec![owner],
            None => self.store.owners_with_settings()?,
        };
        for owner in owners {
            self.dispatcher
                .dispatch(owner, entry.trigger, now.date_naive())
                .await?;
        }
        self.store
            .complete_entry(entry.id, now, entry.recurrence.next_after(now))?;
        Ok(())
    }
}

/// Running-set reservation for one entry task. Dropping it frees the
/// slot, so even a task that panics mid-batch can be re-fired next tick.
struct RunningSlot {
    scheduler: Arc<Scheduler>,
    id: i64,
}

impl Drop for RunningSlot {
    fn drop(&mut self) {
        if let Ok(mut running) = self.scheduler.running.lock() {
            running.remove(&self.id);
        }
    }
}

/// Create the four stock system-level sweeps unless they already exist:
/// absence daily at 08:00, low attendance Mondays at 09:00, weekly reports
/// Fridays at 17:00, monthly reports on the 1st at 18:00 (all UTC).
pub fn seed_system_schedules(store: &Store, now: DateTime<Utc>) -> Result<()> {
    let stock = [
        (TriggerKind::Absence, Recurrence::daily(hm(8, 0))),
        (TriggerKind::LowAttendance, Recurrence::weekly(Weekday::Mon, hm(9, 0))),
        (TriggerKind::WeeklyReport, Recurrence::weekly(Weekday::Fri, hm(17, 0))),
        (TriggerKind::MonthlyReport, Recurrence::monthly(1, hm(18, 0))),
    ];
    for (trigger, recurrence) in stock {
        if store.system_schedule_exists(trigger)? {
            continue;
        }
        store.insert_schedule(None, trigger, recurrence, recurrence.next_after(now))?;
        tracing::info!("📅 Seeded system schedule: {trigger}");
    }
    Ok(())
}

fn hm(hour: u32, minute: u32) -> NaiveTime {
    NaiveTime::from_hms_opt(hour, minute, 0).unwrap_or_default()
}

//! Engine facade — the one type the binary (or an embedding portal)
//! talks to.

use std::sync::Arc;

use chrono::{NaiveDate, Utc};

use rollcall_channels::Provider;
use rollcall_core::Result;
use rollcall_core::config::RollcallConfig;
use rollcall_core::schedule::{Recurrence, ScheduleEntry};
use rollcall_core::types::{
    AttendanceDirectory, DeliveryRecord, NotificationSettings, SettingsPatch, TriggerKind,
};
use rollcall_store::Store;

use crate::dispatcher::{BatchSummary, Dispatcher};
use crate::resolver::Resolver;
use crate::scheduler::{Scheduler, seed_system_schedules};

pub struct Engine {
    store: Arc<Store>,
    dispatcher: Arc<Dispatcher>,
    tick_secs: u64,
}

impl Engine {
    /// Wire up the pipeline. The directory and providers are injected so
    /// the portal can substitute its own; in the standalone binary the
    /// store doubles as the directory.
    pub fn new(
        config: &RollcallConfig,
        store: Arc<Store>,
        directory: Arc<dyn AttendanceDirectory>,
        providers: Vec<Arc<dyn Provider>>,
    ) -> Self {
        let resolver = Resolver::new(directory, config.school_name.clone());
        let dispatcher = Arc::new(Dispatcher::new(
            Arc::clone(&store),
            resolver,
            providers,
            config.dispatch.clone(),
        ));
        Self {
            store,
            dispatcher,
            tick_secs: config.scheduler.tick_secs,
        }
    }

    /// Run one batch immediately for (owner, kind), bypassing schedules
    /// but not the dedup policy.
    pub async fn trigger_now(
        &self,
        owner_id: i64,
        kind: TriggerKind,
        date: Option<NaiveDate>,
    ) -> Result<BatchSummary> {
        let date = date.unwrap_or_else(|| Utc::now().date_naive());
        self.dispatcher.dispatch(owner_id, kind, date).await
    }

    /// Latest delivery log rows for an owner, newest first.
    pub fn recent_deliveries(&self, owner_id: i64, limit: usize) -> Result<Vec<DeliveryRecord>> {
        self.store.recent_deliveries(owner_id, limit)
    }

    /// Current settings for an owner, created with defaults on first read.
    pub fn settings(&self, owner_id: i64) -> Result<NotificationSettings> {
        self.store.settings_for(owner_id)
    }

    /// Apply a partial settings update and return the merged result.
    pub fn update_settings(
        &self,
        owner_id: i64,
        patch: &SettingsPatch,
    ) -> Result<NotificationSettings> {
        self.store.update_settings(owner_id, patch)
    }

    /// Add a recurring schedule entry; `owner_id = None` makes it a
    /// system-wide sweep. The first run lands at the next occurrence of
    /// the recurrence rule, strictly in the future.
    pub fn add_schedule(
        &self,
        owner_id: Option<i64>,
        trigger: TriggerKind,
        recurrence: Recurrence,
    ) -> Result<i64> {
        self.store
            .insert_schedule(owner_id, trigger, recurrence, recurrence.next_after(Utc::now()))
    }

    /// Every schedule entry, active or not.
    pub fn schedules(&self) -> Result<Vec<ScheduleEntry>> {
        self.store.list_schedules()
    }

    /// Activate or deactivate an entry. Entries are never deleted.
    pub fn set_schedule_active(&self, id: i64, active: bool) -> Result<()> {
        self.store.set_schedule_active(id, active)
    }

    /// Make sure the stock system sweeps exist, then hand back the
    /// scheduler ready to `run()`.
    pub fn scheduler(&self) -> Result<Arc<Scheduler>> {
        seed_system_schedules(&self.store, Utc::now())?;
        Ok(Arc::new(Scheduler::new(
            Arc::clone(&self.store),
            Arc::clone(&self.dispatcher),
            self.tick_secs,
        )))
    }

    pub fn store(&self) -> &Arc<Store> {
        &self.store
    }
}

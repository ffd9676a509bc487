//! Duplicate suppression, backed by the delivery log.
//!
//! Only SENT records count toward a window; failed or skipped attempts
//! never suppress a retry. Keys are (trigger, subject, channel), so an
//! email landing does not silence the SMS lane.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};

use rollcall_core::Result;
use rollcall_core::types::{ChannelKind, TriggerKind};
use rollcall_store::Store;

/// Low-attendance and weekly-report repeats are held off for a week.
fn week_window() -> Duration {
    Duration::days(7)
}

/// Monthly reports use 27 days, shorter than the shortest month, so a
/// report scheduled for the 1st is never suppressed by last month's.
fn monthly_window() -> Duration {
    Duration::days(27)
}

#[derive(Clone)]
pub struct DedupPolicy {
    store: Arc<Store>,
}

impl DedupPolicy {
    pub fn new(store: Arc<Store>) -> Self {
        Self { store }
    }

    /// May (kind, subject, channel) be notified at `now`, given the last
    /// successful send?
    pub fn may_notify(
        &self,
        kind: TriggerKind,
        subject_id: i64,
        channel: ChannelKind,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        let Some(last) = self.store.last_sent(kind, subject_id, channel)? else {
            return Ok(true);
        };
        let allowed = match kind {
            // One absence alert per calendar date, so a re-run later the
            // same day stays quiet but tomorrow's absence alerts fine.
            TriggerKind::Absence => last.date_naive() != now.date_naive(),
            TriggerKind::LowAttendance | TriggerKind::WeeklyReport => now - last >= week_window(),
            TriggerKind::MonthlyReport => now - last >= monthly_window(),
        };
        Ok(allowed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rollcall_core::types::DeliveryStatus;
    use rollcall_store::DeliveryAttempt;

    fn utc(y: i32, mo: u32, d: u32, h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, 0, 0).unwrap()
    }

    fn attempt(kind: TriggerKind, channel: ChannelKind, status: DeliveryStatus) -> DeliveryAttempt {
        DeliveryAttempt {
            owner_id: 1,
            kind,
            channel,
            recipient_contact: "parent@example.com".into(),
            subject_id: 10,
            status,
            provider_ref: None,
            error: None,
        }
    }

    fn policy_with(store: Store) -> DedupPolicy {
        DedupPolicy::new(Arc::new(store))
    }

    #[test]
    fn clean_history_always_allows() {
        let policy = policy_with(Store::open_in_memory().unwrap());
        assert!(
            policy
                .may_notify(TriggerKind::Absence, 10, ChannelKind::Email, Utc::now())
                .unwrap()
        );
    }

    #[test]
    fn absence_suppressed_same_day_allowed_next_day() {
        let store = Store::open_in_memory().unwrap();
        store
            .record_delivery_at(
                &attempt(TriggerKind::Absence, ChannelKind::Email, DeliveryStatus::Sent),
                utc(2026, 3, 2, 8),
            )
            .unwrap();
        let policy = policy_with(store);

        // Later the same day: suppressed.
        assert!(
            !policy
                .may_notify(TriggerKind::Absence, 10, ChannelKind::Email, utc(2026, 3, 2, 15))
                .unwrap()
        );
        // Next morning: allowed, even though under 24 hours elapsed.
        assert!(
            policy
                .may_notify(TriggerKind::Absence, 10, ChannelKind::Email, utc(2026, 3, 3, 8))
                .unwrap()
        );
    }

    #[test]
    fn low_attendance_seven_day_window() {
        let store = Store::open_in_memory().unwrap();
        store
            .record_delivery_at(
                &attempt(TriggerKind::LowAttendance, ChannelKind::Sms, DeliveryStatus::Sent),
                utc(2026, 3, 2, 9),
            )
            .unwrap();
        let policy = policy_with(store);

        assert!(
            !policy
                .may_notify(TriggerKind::LowAttendance, 10, ChannelKind::Sms, utc(2026, 3, 8, 9))
                .unwrap()
        );
        // Exactly seven days later is allowed again.
        assert!(
            policy
                .may_notify(TriggerKind::LowAttendance, 10, ChannelKind::Sms, utc(2026, 3, 9, 9))
                .unwrap()
        );
    }

    #[test]
    fn monthly_window_never_blocks_consecutive_months() {
        let store = Store::open_in_memory().unwrap();
        // Sent February 1st; the next monthly run is March 1st, 28 days on.
        store
            .record_delivery_at(
                &attempt(TriggerKind::MonthlyReport, ChannelKind::Email, DeliveryStatus::Sent),
                utc(2026, 2, 1, 18),
            )
            .unwrap();
        let policy = policy_with(store);
        assert!(
            policy
                .may_notify(TriggerKind::MonthlyReport, 10, ChannelKind::Email, utc(2026, 3, 1, 18))
                .unwrap()
        );
    }

    #[test]
    fn failed_sends_never_suppress() {
        let store = Store::open_in_memory().unwrap();
        store
            .record_delivery_at(
                &attempt(TriggerKind::Absence, ChannelKind::Email, DeliveryStatus::Failed),
                utc(2026, 3, 2, 8),
            )
            .unwrap();
        let policy = policy_with(store);
        assert!(
            policy
                .may_notify(TriggerKind::Absence, 10, ChannelKind::Email, utc(2026, 3, 2, 9))
                .unwrap()
        );
    }

    #[test]
    fn channels_deduplicate_independently() {
        let store = Store::open_in_memory().unwrap();
        store
            .record_delivery_at(
                &attempt(TriggerKind::Absence, ChannelKind::Email, DeliveryStatus::Sent),
                utc(2026, 3, 2, 8),
            )
            .unwrap();
        let policy = policy_with(store);
        assert!(
            !policy
                .may_notify(TriggerKind::Absence, 10, ChannelKind::Email, utc(2026, 3, 2, 9))
                .unwrap()
        );
        assert!(
            policy
                .may_notify(TriggerKind::Absence, 10, ChannelKind::Sms, utc(2026, 3, 2, 9))
                .unwrap()
        );
    }
}

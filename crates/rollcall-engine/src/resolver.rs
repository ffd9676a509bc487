//! Recipient resolution — from a trigger to concrete (guardian, variables)
//! pairs.
//!
//! Recipients are derived fresh on every batch, never stored. The variable
//! bag built here is the full vocabulary the stock templates use; custom
//! templates can reference any subset of it.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{Duration, NaiveDate};

use rollcall_core::Result;
use rollcall_core::types::{
    AbsentSubject, AttendanceDirectory, NotificationSettings, Recipient, SubjectStats, TriggerKind,
};

/// Trailing window for low-attendance rate computation, in days.
const LOW_ATTENDANCE_WINDOW: u32 = 30;
/// A subject needs this many recorded days before a low-attendance alert
/// can fire, so a single early absence does not trip the threshold.
const LOW_ATTENDANCE_MIN_DAYS: u32 = 10;
const WEEKLY_WINDOW: u32 = 7;
const MONTHLY_WINDOW: u32 = 30;

pub struct Resolver {
    directory: Arc<dyn AttendanceDirectory>,
    school_name: String,
}

impl Resolver {
    pub fn new(directory: Arc<dyn AttendanceDirectory>, school_name: impl Into<String>) -> Self {
        Self { directory, school_name: school_name.into() }
    }

    /// All recipients for `kind` under the owner's settings, as of `date`.
    /// Returns empty when the alert type or every channel is switched off.
    pub fn resolve(
        &self,
        settings: &NotificationSettings,
        kind: TriggerKind,
        date: NaiveDate,
    ) -> Result<Vec<Recipient>> {
        if !settings.alerts_enabled(kind) || !settings.any_channel_enabled() {
            tracing::debug!(
                "Owner {} has {kind} disabled, resolving no recipients",
                settings.owner_id
            );
            return Ok(Vec::new());
        }

        let recipients = match kind {
            TriggerKind::Absence => self
                .directory
                .list_absent(settings.owner_id, date)?
                .into_iter()
                .map(|subject| self.absence_recipient(subject, date))
                .collect(),
            TriggerKind::LowAttendance => self
                .directory
                .attendance_stats(settings.owner_id, LOW_ATTENDANCE_WINDOW, date)?
                .into_iter()
                .filter(|stats| {
                    stats.total_days >= LOW_ATTENDANCE_MIN_DAYS
                        && stats.rate() < settings.low_attendance_threshold as f64
                })
                .map(|stats| {
                    self.stats_recipient(stats, date, LOW_ATTENDANCE_WINDOW, Some(settings))
                })
                .collect(),
            TriggerKind::WeeklyReport => self
                .directory
                .attendance_stats(settings.owner_id, WEEKLY_WINDOW, date)?
                .into_iter()
                .map(|stats| self.stats_recipient(stats, date, WEEKLY_WINDOW, None))
                .collect(),
            TriggerKind::MonthlyReport => self
                .directory
                .attendance_stats(settings.owner_id, MONTHLY_WINDOW, date)?
                .into_iter()
                .map(|stats| self.stats_recipient(stats, date, MONTHLY_WINDOW, None))
                .collect(),
        };

        let mut recipients: Vec<Recipient> = recipients;
        recipients.retain(|r: &Recipient| r.contact.is_usable());
        Ok(recipients)
    }

    fn base_variables(&self, date: NaiveDate) -> HashMap<String, String> {
        let mut vars = HashMap::new();
        vars.insert("date".into(), date.format("%Y-%m-%d").to_string());
        vars.insert("school_name".into(), self.school_name.clone());
        vars
    }

    fn absence_recipient(&self, subject: AbsentSubject, date: NaiveDate) -> Recipient {
        let mut vars = self.base_variables(date);
        vars.insert("guardian_name".into(), subject.contact.guardian_name.clone());
        vars.insert("student_name".into(), subject.subject_name.clone());
        vars.insert("roll_number".into(), subject.roll_number.clone());
        vars.insert("class_name".into(), subject.class_name.clone());
        vars.insert("section".into(), subject.section.clone());
        Recipient {
            subject_id: subject.subject_id,
            subject_name: subject.subject_name,
            class_name: subject.class_name,
            contact: subject.contact,
            variables: vars,
        }
    }

    fn stats_recipient(
        &self,
        stats: SubjectStats,
        as_of: NaiveDate,
        window_days: u32,
        settings: Option<&NotificationSettings>,
    ) -> Recipient {
        let start = as_of - Duration::days(window_days as i64 - 1);
        let mut vars = self.base_variables(as_of);
        vars.insert("guardian_name".into(), stats.contact.guardian_name.clone());
        vars.insert("student_name".into(), stats.subject_name.clone());
        vars.insert("roll_number".into(), stats.roll_number.clone());
        vars.insert("class_name".into(), stats.class_name.clone());
        vars.insert("section".into(), stats.section.clone());
        vars.insert("attendance_rate".into(), format!("{:.1}", stats.rate()));
        vars.insert("present_days".into(), stats.present_days.to_string());
        vars.insert("absent_days".into(), stats.absent_days.to_string());
        vars.insert("late_days".into(), stats.late_days.to_string());
        vars.insert("excused_days".into(), stats.excused_days.to_string());
        vars.insert("total_days".into(), stats.total_days.to_string());
        vars.insert("start_date".into(), start.format("%Y-%m-%d").to_string());
        vars.insert("end_date".into(), as_of.format("%Y-%m-%d").to_string());
        if let Some(settings) = settings {
            vars.insert("threshold".into(), settings.low_attendance_threshold.to_string());
        }
        Recipient {
            subject_id: stats.subject_id,
            subject_name: stats.subject_name,
            class_name: stats.class_name,
            contact: stats.contact,
            variables: vars,
        }
    }
}

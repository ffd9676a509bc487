//! Domain types — the core data model for notification dispatch.

use std::collections::HashMap;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// What caused a batch of notifications.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerKind {
    /// Subject marked absent today.
    Absence,
    /// Trailing-window present-rate fell below the owner's threshold.
    LowAttendance,
    /// Weekly attendance summary.
    WeeklyReport,
    /// Monthly attendance summary.
    MonthlyReport,
}

impl TriggerKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Absence => "absence",
            Self::LowAttendance => "low_attendance",
            Self::WeeklyReport => "weekly_report",
            Self::MonthlyReport => "monthly_report",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "absence" => Some(Self::Absence),
            "low_attendance" => Some(Self::LowAttendance),
            "weekly_report" => Some(Self::WeeklyReport),
            "monthly_report" => Some(Self::MonthlyReport),
            _ => None,
        }
    }
}

impl std::fmt::Display for TriggerKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Transport channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelKind {
    Email,
    Sms,
}

impl ChannelKind {
    pub const ALL: [ChannelKind; 2] = [ChannelKind::Email, ChannelKind::Sms];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Email => "email",
            Self::Sms => "sms",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "email" => Some(Self::Email),
            "sms" => Some(Self::Sms),
            _ => None,
        }
    }
}

impl std::fmt::Display for ChannelKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Guardian channel preference. `Both` accepts either channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PreferredChannel {
    Email,
    Sms,
    Both,
}

impl PreferredChannel {
    /// Unknown or missing preference falls back to `Both`.
    pub fn parse(s: &str) -> Self {
        match s {
            "email" => Self::Email,
            "sms" => Self::Sms,
            _ => Self::Both,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Email => "email",
            Self::Sms => "sms",
            Self::Both => "both",
        }
    }

    pub fn accepts(&self, channel: ChannelKind) -> bool {
        match (self, channel) {
            (Self::Both, _) => true,
            (Self::Email, ChannelKind::Email) => true,
            (Self::Sms, ChannelKind::Sms) => true,
            _ => false,
        }
    }
}

/// Outcome of a single delivery attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryStatus {
    Sent,
    Failed,
    Skipped,
}

impl DeliveryStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sent => "sent",
            Self::Failed => "failed",
            Self::Skipped => "skipped",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "sent" => Some(Self::Sent),
            "failed" => Some(Self::Failed),
            "skipped" => Some(Self::Skipped),
            _ => None,
        }
    }
}

/// Per-owner notification preferences. One row per owner, created lazily
/// with these defaults on first access through the settings API.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationSettings {
    pub owner_id: i64,
    pub email_enabled: bool,
    pub sms_enabled: bool,
    pub absence_alerts: bool,
    pub low_attendance_alerts: bool,
    pub weekly_reports: bool,
    pub monthly_reports: bool,
    /// Present-rate percentage below which a low-attendance alert fires.
    pub low_attendance_threshold: u32,
    pub report_day: String,
    pub report_time: String,
}

impl NotificationSettings {
    pub fn defaults_for(owner_id: i64) -> Self {
        Self {
            owner_id,
            email_enabled: true,
            sms_enabled: false,
            absence_alerts: true,
            low_attendance_alerts: true,
            weekly_reports: true,
            monthly_reports: false,
            low_attendance_threshold: 75,
            report_day: "friday".into(),
            report_time: "17:00".into(),
        }
    }

    /// Is the alert type behind this trigger switched on?
    pub fn alerts_enabled(&self, kind: TriggerKind) -> bool {
        match kind {
            TriggerKind::Absence => self.absence_alerts,
            TriggerKind::LowAttendance => self.low_attendance_alerts,
            TriggerKind::WeeklyReport => self.weekly_reports,
            TriggerKind::MonthlyReport => self.monthly_reports,
        }
    }

    pub fn channel_enabled(&self, channel: ChannelKind) -> bool {
        match channel {
            ChannelKind::Email => self.email_enabled,
            ChannelKind::Sms => self.sms_enabled,
        }
    }

    pub fn any_channel_enabled(&self) -> bool {
        self.email_enabled || self.sms_enabled
    }
}

/// Partial settings update; `None` fields are left untouched.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SettingsPatch {
    pub email_enabled: Option<bool>,
    pub sms_enabled: Option<bool>,
    pub absence_alerts: Option<bool>,
    pub low_attendance_alerts: Option<bool>,
    pub weekly_reports: Option<bool>,
    pub monthly_reports: Option<bool>,
    pub low_attendance_threshold: Option<u32>,
    pub report_day: Option<String>,
    pub report_time: Option<String>,
}

impl SettingsPatch {
    pub fn apply(&self, settings: &mut NotificationSettings) {
        if let Some(v) = self.email_enabled {
            settings.email_enabled = v;
        }
        if let Some(v) = self.sms_enabled {
            settings.sms_enabled = v;
        }
        if let Some(v) = self.absence_alerts {
            settings.absence_alerts = v;
        }
        if let Some(v) = self.low_attendance_alerts {
            settings.low_attendance_alerts = v;
        }
        if let Some(v) = self.weekly_reports {
            settings.weekly_reports = v;
        }
        if let Some(v) = self.monthly_reports {
            settings.monthly_reports = v;
        }
        if let Some(v) = self.low_attendance_threshold {
            settings.low_attendance_threshold = v;
        }
        if let Some(v) = &self.report_day {
            settings.report_day = v.clone();
        }
        if let Some(v) = &self.report_time {
            settings.report_time = v.clone();
        }
    }
}

/// Guardian contact details for one subject.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GuardianContact {
    pub guardian_name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub preferred: PreferredChannel,
}

impl GuardianContact {
    /// A non-empty contact for the given channel, if present.
    pub fn contact_for(&self, channel: ChannelKind) -> Option<&str> {
        let value = match channel {
            ChannelKind::Email => self.email.as_deref(),
            ChannelKind::Sms => self.phone.as_deref(),
        };
        value.filter(|v| !v.is_empty())
    }

    /// At least one contact consistent with the preferred channel.
    pub fn is_usable(&self) -> bool {
        ChannelKind::ALL
            .iter()
            .any(|&ch| self.preferred.accepts(ch) && self.contact_for(ch).is_some())
    }
}

/// A contactable guardian/channel projection for one subject — derived,
/// never stored. Produced by the resolver, consumed by the dispatcher.
#[derive(Debug, Clone)]
pub struct Recipient {
    pub subject_id: i64,
    pub subject_name: String,
    pub class_name: String,
    pub contact: GuardianContact,
    /// Variable bag for template rendering.
    pub variables: HashMap<String, String>,
}

impl Recipient {
    /// Should this recipient be considered on the given channel?
    /// Requires both a usable contact and a matching (or "both") preference.
    pub fn wants(&self, channel: ChannelKind) -> bool {
        self.contact.preferred.accepts(channel) && self.contact.contact_for(channel).is_some()
    }
}

/// One row of the append-only delivery audit log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryRecord {
    pub id: i64,
    pub owner_id: i64,
    pub kind: TriggerKind,
    pub channel: ChannelKind,
    pub recipient_contact: String,
    pub subject_id: i64,
    pub status: DeliveryStatus,
    pub provider_ref: Option<String>,
    pub error: Option<String>,
    pub sent_at: DateTime<Utc>,
}

/// Aggregate attendance figures for one subject over a reporting window,
/// with guardian contact joined in.
#[derive(Debug, Clone)]
pub struct SubjectStats {
    pub subject_id: i64,
    pub subject_name: String,
    pub roll_number: String,
    pub class_name: String,
    pub section: String,
    pub contact: GuardianContact,
    pub total_days: u32,
    pub present_days: u32,
    pub absent_days: u32,
    pub late_days: u32,
    pub excused_days: u32,
}

impl SubjectStats {
    /// Present-rate percentage. Late counts as attended, matching how the
    /// portal reports it.
    pub fn rate(&self) -> f64 {
        if self.total_days == 0 {
            return 0.0;
        }
        (self.present_days + self.late_days) as f64 * 100.0 / self.total_days as f64
    }
}

/// A subject marked absent on a specific date, with guardian contact.
#[derive(Debug, Clone)]
pub struct AbsentSubject {
    pub subject_id: i64,
    pub subject_name: String,
    pub roll_number: String,
    pub class_name: String,
    pub section: String,
    pub contact: GuardianContact,
}

/// Read-only queries against the attendance/guardian state owned by the
/// portal. The engine never writes through this interface.
pub trait AttendanceDirectory: Send + Sync {
    /// Every subject marked absent on `date` within `owner_id`'s classes,
    /// restricted to subjects with at least one guardian contact.
    fn list_absent(&self, owner_id: i64, date: NaiveDate) -> Result<Vec<AbsentSubject>>;

    /// Per-subject attendance aggregates over the trailing `window_days`
    /// ending at `as_of`, restricted to contactable subjects.
    fn attendance_stats(
        &self,
        owner_id: i64,
        window_days: u32,
        as_of: NaiveDate,
    ) -> Result<Vec<SubjectStats>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trigger_kind_round_trip() {
        for kind in [
            TriggerKind::Absence,
            TriggerKind::LowAttendance,
            TriggerKind::WeeklyReport,
            TriggerKind::MonthlyReport,
        ] {
            assert_eq!(TriggerKind::parse(kind.as_str()), Some(kind));
        }
        assert_eq!(TriggerKind::parse("bogus"), None);
    }

    #[test]
    fn preferred_channel_gating() {
        assert!(PreferredChannel::Both.accepts(ChannelKind::Email));
        assert!(PreferredChannel::Both.accepts(ChannelKind::Sms));
        assert!(PreferredChannel::Email.accepts(ChannelKind::Email));
        assert!(!PreferredChannel::Email.accepts(ChannelKind::Sms));
        assert_eq!(PreferredChannel::parse("unknown"), PreferredChannel::Both);
    }

    #[test]
    fn contact_usability() {
        let contact = GuardianContact {
            guardian_name: "Ana".into(),
            email: Some("ana@example.com".into()),
            phone: None,
            preferred: PreferredChannel::Sms,
        };
        // Preferred channel has no contact; email is not accepted.
        assert!(!contact.is_usable());

        let contact = GuardianContact {
            preferred: PreferredChannel::Both,
            ..contact
        };
        assert!(contact.is_usable());
        assert_eq!(contact.contact_for(ChannelKind::Email), Some("ana@example.com"));
        assert_eq!(contact.contact_for(ChannelKind::Sms), None);
    }

    #[test]
    fn empty_string_contact_is_unusable() {
        let contact = GuardianContact {
            guardian_name: String::new(),
            email: Some(String::new()),
            phone: None,
            preferred: PreferredChannel::Both,
        };
        assert!(!contact.is_usable());
    }

    #[test]
    fn settings_defaults() {
        let s = NotificationSettings::defaults_for(7);
        assert!(s.email_enabled);
        assert!(!s.sms_enabled);
        assert!(s.absence_alerts);
        assert!(!s.monthly_reports);
        assert_eq!(s.low_attendance_threshold, 75);
    }

    #[test]
    fn settings_patch_applies_only_set_fields() {
        let mut s = NotificationSettings::defaults_for(1);
        let patch = SettingsPatch {
            sms_enabled: Some(true),
            low_attendance_threshold: Some(80),
            ..Default::default()
        };
        patch.apply(&mut s);
        assert!(s.sms_enabled);
        assert_eq!(s.low_attendance_threshold, 80);
        assert!(s.email_enabled); // untouched
    }

    #[test]
    fn rate_counts_late_as_attended() {
        let stats = SubjectStats {
            subject_id: 1,
            subject_name: "A".into(),
            roll_number: "1".into(),
            class_name: "C".into(),
            section: "".into(),
            contact: GuardianContact {
                guardian_name: "".into(),
                email: Some("a@b.c".into()),
                phone: None,
                preferred: PreferredChannel::Both,
            },
            total_days: 10,
            present_days: 6,
            absent_days: 2,
            late_days: 2,
            excused_days: 0,
        };
        assert!((stats.rate() - 80.0).abs() < f64::EPSILON);
    }
}

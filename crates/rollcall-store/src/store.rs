//! SQLite store for settings, templates, delivery log, and schedules.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, NaiveTime, Utc};
use rusqlite::{Connection, OptionalExtension, params};

use rollcall_core::schedule::{Recurrence, RecurrenceKind, ScheduleEntry};
use rollcall_core::template::TemplateKind;
use rollcall_core::types::{
    ChannelKind, DeliveryRecord, DeliveryStatus, NotificationSettings, SettingsPatch, TriggerKind,
};
use rollcall_core::{Result, RollcallError};

/// A delivery outcome about to be appended to the log. The store stamps
/// `sent_at` on insert.
#[derive(Debug, Clone)]
pub struct DeliveryAttempt {
    pub owner_id: i64,
    pub kind: TriggerKind,
    pub channel: ChannelKind,
    pub recipient_contact: String,
    pub subject_id: i64,
    pub status: DeliveryStatus,
    pub provider_ref: Option<String>,
    pub error: Option<String>,
}

/// SQLite persistence for all engine state.
pub struct Store {
    conn: Mutex<Connection>,
}

fn db_err(e: impl std::fmt::Display) -> RollcallError {
    RollcallError::Store(e.to_string())
}

impl Store {
    /// Open or create the database at `path` and run migrations.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path).map_err(db_err)?;
        let store = Self { conn: Mutex::new(conn) };
        store.migrate()?;
        Ok(store)
    }

    /// In-memory database, for tests.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(db_err)?;
        let store = Self { conn: Mutex::new(conn) };
        store.migrate()?;
        Ok(store)
    }

    pub(crate) fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap()
    }

    fn migrate(&self) -> Result<()> {
        self.conn()
            .execute_batch(
                "
            -- Per-owner notification preferences (one row per owner)
            CREATE TABLE IF NOT EXISTS notification_settings (
                owner_id INTEGER PRIMARY KEY,
                email_enabled INTEGER NOT NULL DEFAULT 1,
                sms_enabled INTEGER NOT NULL DEFAULT 0,
                absence_alerts INTEGER NOT NULL DEFAULT 1,
                low_attendance_alerts INTEGER NOT NULL DEFAULT 1,
                weekly_reports INTEGER NOT NULL DEFAULT 1,
                monthly_reports INTEGER NOT NULL DEFAULT 0,
                low_attendance_threshold INTEGER NOT NULL DEFAULT 75,
                report_day TEXT NOT NULL DEFAULT 'friday',
                report_time TEXT NOT NULL DEFAULT '17:00',
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            -- Message templates; owner_id NULL + is_global = 1 marks a
            -- global fallback row
            CREATE TABLE IF NOT EXISTS notification_templates (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                owner_id INTEGER,
                name TEXT NOT NULL,
                type TEXT NOT NULL,
                content TEXT NOT NULL,
                is_global INTEGER NOT NULL DEFAULT 0,
                updated_at TEXT NOT NULL
            );

            -- Append-only delivery audit log; also feeds the dedup policy
            CREATE TABLE IF NOT EXISTS notification_log (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                owner_id INTEGER NOT NULL,
                type TEXT NOT NULL,
                channel TEXT NOT NULL,
                recipient_contact TEXT NOT NULL,
                subject_id INTEGER NOT NULL,
                status TEXT NOT NULL,          -- 'sent', 'failed', 'skipped'
                provider_ref TEXT,
                error TEXT,
                sent_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_log_dedup
                ON notification_log (type, subject_id, channel, status, sent_at);
            CREATE INDEX IF NOT EXISTS idx_log_owner
                ON notification_log (owner_id, id);

            -- Recurring triggers; owner_id NULL marks a system-level sweep
            CREATE TABLE IF NOT EXISTS scheduled_notifications (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                owner_id INTEGER,
                trigger_kind TEXT NOT NULL,
                recurrence_kind TEXT NOT NULL, -- 'daily', 'weekly', 'monthly'
                anchor_day INTEGER,            -- weekday 1-7 or day-of-month
                schedule_time TEXT NOT NULL,   -- 'HH:MM'
                active INTEGER NOT NULL DEFAULT 1,
                last_run TEXT,
                next_run TEXT NOT NULL,
                created_at TEXT NOT NULL
            );

            -- Portal-owned attendance tables, created here only so the
            -- engine can run standalone in dev/test; in production the
            -- portal migrates and populates these.
            CREATE TABLE IF NOT EXISTS classes (
                id INTEGER PRIMARY KEY,
                name TEXT NOT NULL,
                section TEXT NOT NULL DEFAULT '',
                teacher_id INTEGER NOT NULL
            );
            CREATE TABLE IF NOT EXISTS students (
                id INTEGER PRIMARY KEY,
                name TEXT NOT NULL,
                roll_number TEXT NOT NULL DEFAULT '',
                class_id INTEGER NOT NULL
            );
            CREATE TABLE IF NOT EXISTS guardians (
                id INTEGER PRIMARY KEY,
                student_id INTEGER NOT NULL,
                name TEXT NOT NULL DEFAULT '',
                email TEXT,
                phone TEXT,
                preferred_channel TEXT NOT NULL DEFAULT 'both'
            );
            CREATE TABLE IF NOT EXISTS attendance (
                id INTEGER PRIMARY KEY,
                student_id INTEGER NOT NULL,
                class_id INTEGER NOT NULL,
                date TEXT NOT NULL,            -- 'YYYY-MM-DD'
                status TEXT NOT NULL           -- 'present', 'absent', 'late', 'excused'
            );
            CREATE INDEX IF NOT EXISTS idx_attendance_date
                ON attendance (class_id, date, status);
         ",
            )
            .map_err(db_err)?;

        self.seed_default_templates()?;
        Ok(())
    }

    /// Insert the built-in defaults as global template rows, once.
    fn seed_default_templates(&self) -> Result<()> {
        let kinds = [
            TemplateKind::AbsenceEmail,
            TemplateKind::AbsenceSms,
            TemplateKind::LowAttendanceEmail,
            TemplateKind::LowAttendanceSms,
            TemplateKind::WeeklyReportEmail,
            TemplateKind::WeeklyReportSms,
            TemplateKind::MonthlyReportEmail,
            TemplateKind::MonthlyReportSms,
        ];
        let conn = self.conn();
        for kind in kinds {
            conn.execute(
                "INSERT INTO notification_templates (owner_id, name, type, content, is_global, updated_at)
                 SELECT NULL, ?1, ?2, ?3, 1, ?4
                 WHERE NOT EXISTS (
                     SELECT 1 FROM notification_templates WHERE type = ?2 AND is_global = 1
                 )",
                params![
                    format!("Default {}", kind.as_str()),
                    kind.as_str(),
                    kind.builtin(),
                    Utc::now().to_rfc3339(),
                ],
            )
            .map_err(db_err)?;
        }
        Ok(())
    }

    // --- Settings ---

    /// Read the owner's settings without creating a row. A missing row is
    /// a policy no-op for the resolver, not an error.
    pub fn find_settings(&self, owner_id: i64) -> Result<Option<NotificationSettings>> {
        self.conn()
            .query_row(
                "SELECT owner_id, email_enabled, sms_enabled, absence_alerts,
                        low_attendance_alerts, weekly_reports, monthly_reports,
                        low_attendance_threshold, report_day, report_time
                 FROM notification_settings WHERE owner_id = ?1",
                [owner_id],
                Self::row_to_settings,
            )
            .optional()
            .map_err(db_err)
    }

    /// Read the owner's settings, lazily creating the default row on
    /// first access.
    pub fn settings_for(&self, owner_id: i64) -> Result<NotificationSettings> {
        if let Some(settings) = self.find_settings(owner_id)? {
            return Ok(settings);
        }
        let defaults = NotificationSettings::defaults_for(owner_id);
        self.write_settings(&defaults, true)?;
        Ok(defaults)
    }

    /// Apply a partial update on top of the current (or default) settings.
    pub fn update_settings(
        &self,
        owner_id: i64,
        patch: &SettingsPatch,
    ) -> Result<NotificationSettings> {
        let mut settings = self.settings_for(owner_id)?;
        patch.apply(&mut settings);
        self.write_settings(&settings, false)?;
        Ok(settings)
    }

    fn write_settings(&self, s: &NotificationSettings, create: bool) -> Result<()> {
        let now = Utc::now().to_rfc3339();
        if create {
            self.conn()
                .execute(
                    "INSERT OR IGNORE INTO notification_settings
                     (owner_id, email_enabled, sms_enabled, absence_alerts,
                      low_attendance_alerts, weekly_reports, monthly_reports,
                      low_attendance_threshold, report_day, report_time,
                      created_at, updated_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?11)",
                    params![
                        s.owner_id,
                        s.email_enabled as i32,
                        s.sms_enabled as i32,
                        s.absence_alerts as i32,
                        s.low_attendance_alerts as i32,
                        s.weekly_reports as i32,
                        s.monthly_reports as i32,
                        s.low_attendance_threshold,
                        s.report_day,
                        s.report_time,
                        now,
                    ],
                )
                .map_err(db_err)?;
        } else {
            self.conn()
                .execute(
                    "UPDATE notification_settings SET
                     email_enabled = ?2, sms_enabled = ?3, absence_alerts = ?4,
                     low_attendance_alerts = ?5, weekly_reports = ?6,
                     monthly_reports = ?7, low_attendance_threshold = ?8,
                     report_day = ?9, report_time = ?10, updated_at = ?11
                     WHERE owner_id = ?1",
                    params![
                        s.owner_id,
                        s.email_enabled as i32,
                        s.sms_enabled as i32,
                        s.absence_alerts as i32,
                        s.low_attendance_alerts as i32,
                        s.weekly_reports as i32,
                        s.monthly_reports as i32,
                        s.low_attendance_threshold,
                        s.report_day,
                        s.report_time,
                        now,
                    ],
                )
                .map_err(db_err)?;
        }
        Ok(())
    }

    fn row_to_settings(row: &rusqlite::Row<'_>) -> rusqlite::Result<NotificationSettings> {
        Ok(NotificationSettings {
            owner_id: row.get(0)?,
            email_enabled: row.get::<_, i32>(1)? != 0,
            sms_enabled: row.get::<_, i32>(2)? != 0,
            absence_alerts: row.get::<_, i32>(3)? != 0,
            low_attendance_alerts: row.get::<_, i32>(4)? != 0,
            weekly_reports: row.get::<_, i32>(5)? != 0,
            monthly_reports: row.get::<_, i32>(6)? != 0,
            low_attendance_threshold: row.get(7)?,
            report_day: row.get(8)?,
            report_time: row.get(9)?,
        })
    }

    /// Every owner that has a settings row — the fan-out set for
    /// system-level schedule entries.
    pub fn owners_with_settings(&self) -> Result<Vec<i64>> {
        let conn = self.conn();
        let mut stmt = conn
            .prepare("SELECT owner_id FROM notification_settings ORDER BY owner_id")
            .map_err(db_err)?;
        let rows = stmt
            .query_map([], |row| row.get(0))
            .map_err(db_err)?
            .filter_map(|r| r.ok())
            .collect();
        Ok(rows)
    }

    // --- Templates ---

    /// Effective template content for (kind, owner): owner row first, then
    /// global row, then the built-in default.
    pub fn template_for(&self, kind: TemplateKind, owner_id: Option<i64>) -> Result<String> {
        let found: Option<String> = self
            .conn()
            .query_row(
                "SELECT content FROM notification_templates
                 WHERE type = ?1 AND (owner_id = ?2 OR is_global = 1)
                 ORDER BY owner_id IS NULL
                 LIMIT 1",
                params![kind.as_str(), owner_id.unwrap_or(-1)],
                |row| row.get(0),
            )
            .optional()
            .map_err(db_err)?;

        Ok(found.unwrap_or_else(|| {
            tracing::debug!("No template row for {kind}, using built-in default");
            kind.builtin().to_string()
        }))
    }

    /// Create or overwrite a template. Owner templates shadow globals;
    /// overwriting replaces content in place (no history kept).
    pub fn set_template(
        &self,
        owner_id: Option<i64>,
        kind: TemplateKind,
        name: &str,
        content: &str,
    ) -> Result<()> {
        let now = Utc::now().to_rfc3339();
        let conn = self.conn();
        let updated = match owner_id {
            Some(owner) => conn
                .execute(
                    "UPDATE notification_templates
                     SET name = ?3, content = ?4, updated_at = ?5
                     WHERE type = ?1 AND owner_id = ?2",
                    params![kind.as_str(), owner, name, content, now],
                )
                .map_err(db_err)?,
            None => conn
                .execute(
                    "UPDATE notification_templates
                     SET name = ?2, content = ?3, updated_at = ?4
                     WHERE type = ?1 AND is_global = 1",
                    params![kind.as_str(), name, content, now],
                )
                .map_err(db_err)?,
        };
        if updated == 0 {
            conn.execute(
                "INSERT INTO notification_templates
                 (owner_id, name, type, content, is_global, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    owner_id,
                    name,
                    kind.as_str(),
                    content,
                    owner_id.is_none() as i32,
                    now,
                ],
            )
            .map_err(db_err)?;
        }
        Ok(())
    }

    // --- Delivery log ---

    /// Append one delivery outcome, stamped now.
    pub fn record_delivery(&self, attempt: &DeliveryAttempt) -> Result<i64> {
        self.record_delivery_at(attempt, Utc::now())
    }

    /// Append one delivery outcome with an explicit timestamp. The log is
    /// append-only: rows are never updated or deleted here.
    pub fn record_delivery_at(
        &self,
        attempt: &DeliveryAttempt,
        sent_at: DateTime<Utc>,
    ) -> Result<i64> {
        let conn = self.conn();
        conn.execute(
            "INSERT INTO notification_log
             (owner_id, type, channel, recipient_contact, subject_id, status,
              provider_ref, error, sent_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                attempt.owner_id,
                attempt.kind.as_str(),
                attempt.channel.as_str(),
                attempt.recipient_contact,
                attempt.subject_id,
                attempt.status.as_str(),
                attempt.provider_ref,
                attempt.error,
                sent_at.to_rfc3339(),
            ],
        )
        .map_err(db_err)?;
        Ok(conn.last_insert_rowid())
    }

    /// Latest deliveries for an owner's dashboard, newest first.
    pub fn recent_deliveries(&self, owner_id: i64, limit: usize) -> Result<Vec<DeliveryRecord>> {
        let conn = self.conn();
        let mut stmt = conn
            .prepare(
                "SELECT id, owner_id, type, channel, recipient_contact, subject_id,
                        status, provider_ref, error, sent_at
                 FROM notification_log
                 WHERE owner_id = ?1
                 ORDER BY id DESC
                 LIMIT ?2",
            )
            .map_err(db_err)?;
        let rows = stmt
            .query_map(params![owner_id, limit as i64], Self::row_to_delivery)
            .map_err(db_err)?
            .filter_map(|r| r.ok().flatten())
            .collect();
        Ok(rows)
    }

    /// Timestamp of the most recent SENT record for (kind, subject,
    /// channel) — the structured lookup the dedup policy is built on.
    pub fn last_sent(
        &self,
        kind: TriggerKind,
        subject_id: i64,
        channel: ChannelKind,
    ) -> Result<Option<DateTime<Utc>>> {
        let found: Option<String> = self
            .conn()
            .query_row(
                "SELECT sent_at FROM notification_log
                 WHERE type = ?1 AND subject_id = ?2 AND channel = ?3 AND status = 'sent'
                 ORDER BY sent_at DESC
                 LIMIT 1",
                params![kind.as_str(), subject_id, channel.as_str()],
                |row| row.get(0),
            )
            .optional()
            .map_err(db_err)?;
        Ok(found
            .and_then(|s| DateTime::parse_from_rfc3339(&s).ok())
            .map(|d| d.with_timezone(&Utc)))
    }

    /// Total number of log rows, across all owners.
    pub fn delivery_count(&self) -> Result<i64> {
        self.conn()
            .query_row("SELECT COUNT(*) FROM notification_log", [], |row| row.get(0))
            .map_err(db_err)
    }

    fn row_to_delivery(row: &rusqlite::Row<'_>) -> rusqlite::Result<Option<DeliveryRecord>> {
        let kind: String = row.get(2)?;
        let channel: String = row.get(3)?;
        let status: String = row.get(6)?;
        let sent_at: String = row.get(9)?;
        let (Some(kind), Some(channel), Some(status)) = (
            TriggerKind::parse(&kind),
            ChannelKind::parse(&channel),
            DeliveryStatus::parse(&status),
        ) else {
            return Ok(None);
        };
        // Audit timestamps are never substituted: a corrupt sent_at drops
        // the row like any other malformed column.
        let Ok(sent_at) = DateTime::parse_from_rfc3339(&sent_at) else {
            return Ok(None);
        };
        Ok(Some(DeliveryRecord {
            id: row.get(0)?,
            owner_id: row.get(1)?,
            kind,
            channel,
            recipient_contact: row.get(4)?,
            subject_id: row.get(5)?,
            status,
            provider_ref: row.get(7)?,
            error: row.get(8)?,
            sent_at: sent_at.with_timezone(&Utc),
        }))
    }

    // --- Schedules ---

    /// Insert a schedule entry; returns its id.
    pub fn insert_schedule(
        &self,
        owner_id: Option<i64>,
        trigger: TriggerKind,
        recurrence: Recurrence,
        next_run: DateTime<Utc>,
    ) -> Result<i64> {
        let conn = self.conn();
        conn.execute(
            "INSERT INTO scheduled_notifications
             (owner_id, trigger_kind, recurrence_kind, anchor_day, schedule_time,
              active, last_run, next_run, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, 1, NULL, ?6, ?7)",
            params![
                owner_id,
                trigger.as_str(),
                recurrence.kind.as_str(),
                recurrence.anchor_day,
                recurrence.at.format("%H:%M").to_string(),
                next_run.to_rfc3339(),
                Utc::now().to_rfc3339(),
            ],
        )
        .map_err(db_err)?;
        Ok(conn.last_insert_rowid())
    }

    /// Does a system-level (owner-less) entry already exist for `trigger`?
    /// Used to make seeding idempotent.
    pub fn system_schedule_exists(&self, trigger: TriggerKind) -> Result<bool> {
        let count: i64 = self
            .conn()
            .query_row(
                "SELECT COUNT(*) FROM scheduled_notifications
                 WHERE owner_id IS NULL AND trigger_kind = ?1",
                [trigger.as_str()],
                |row| row.get(0),
            )
            .map_err(db_err)?;
        Ok(count > 0)
    }

    /// Active entries whose next_run has arrived.
    pub fn due_entries(&self, now: DateTime<Utc>) -> Result<Vec<ScheduleEntry>> {
        let conn = self.conn();
        let mut stmt = conn
            .prepare(
                "SELECT id, owner_id, trigger_kind, recurrence_kind, anchor_day,
                        schedule_time, active, last_run, next_run
                 FROM scheduled_notifications
                 WHERE active = 1 AND next_run <= ?1
                 ORDER BY next_run",
            )
            .map_err(db_err)?;
        let rows = stmt
            .query_map([now.to_rfc3339()], Self::row_to_entry)
            .map_err(db_err)?
            .filter_map(|r| r.ok().flatten())
            .collect();
        Ok(rows)
    }

    pub fn list_schedules(&self) -> Result<Vec<ScheduleEntry>> {
        let conn = self.conn();
        let mut stmt = conn
            .prepare(
                "SELECT id, owner_id, trigger_kind, recurrence_kind, anchor_day,
                        schedule_time, active, last_run, next_run
                 FROM scheduled_notifications
                 ORDER BY id",
            )
            .map_err(db_err)?;
        let rows = stmt
            .query_map([], Self::row_to_entry)
            .map_err(db_err)?
            .filter_map(|r| r.ok().flatten())
            .collect();
        Ok(rows)
    }

    /// Record a completed firing: set last_run and advance next_run.
    pub fn complete_entry(
        &self,
        id: i64,
        last_run: DateTime<Utc>,
        next_run: DateTime<Utc>,
    ) -> Result<()> {
        self.conn()
            .execute(
                "UPDATE scheduled_notifications
                 SET last_run = ?2, next_run = ?3
                 WHERE id = ?1",
                params![id, last_run.to_rfc3339(), next_run.to_rfc3339()],
            )
            .map_err(db_err)?;
        Ok(())
    }

    /// Owners disable entries; they are never deleted.
    pub fn set_schedule_active(&self, id: i64, active: bool) -> Result<()> {
        self.conn()
            .execute(
                "UPDATE scheduled_notifications SET active = ?2 WHERE id = ?1",
                params![id, active as i32],
            )
            .map_err(db_err)?;
        Ok(())
    }

    fn row_to_entry(row: &rusqlite::Row<'_>) -> rusqlite::Result<Option<ScheduleEntry>> {
        let trigger: String = row.get(2)?;
        let recurrence_kind: String = row.get(3)?;
        let schedule_time: String = row.get(5)?;
        let next_run: String = row.get(8)?;
        let (Some(trigger), Some(kind)) = (
            TriggerKind::parse(&trigger),
            RecurrenceKind::parse(&recurrence_kind),
        ) else {
            return Ok(None);
        };
        let at = NaiveTime::parse_from_str(&schedule_time, "%H:%M")
            .or_else(|_| NaiveTime::parse_from_str(&schedule_time, "%H:%M:%S"))
            .unwrap_or_default();
        let Ok(next_run) = DateTime::parse_from_rfc3339(&next_run) else {
            return Ok(None);
        };
        let last_run: Option<String> = row.get(7)?;
        Ok(Some(ScheduleEntry {
            id: row.get(0)?,
            owner_id: row.get(1)?,
            trigger,
            recurrence: Recurrence { kind, anchor_day: row.get(4)?, at },
            active: row.get::<_, i32>(6)? != 0,
            last_run: last_run
                .and_then(|s| DateTime::parse_from_rfc3339(&s).ok())
                .map(|d| d.with_timezone(&Utc)),
            next_run: next_run.with_timezone(&Utc),
        }))
    }

    // --- Dev/test fixtures ---

    /// Run arbitrary SQL against the underlying connection. Intended for
    /// the portal's fixtures and for tests; the engine itself never calls
    /// this.
    pub fn execute_batch(&self, sql: &str) -> Result<()> {
        self.conn().execute_batch(sql).map_err(db_err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use rollcall_core::schedule::Recurrence;

    fn utc(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, mi, 0).unwrap()
    }

    #[test]
    fn open_on_disk_and_migrate() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(&dir.path().join("test.db")).unwrap();
        assert_eq!(store.delivery_count().unwrap(), 0);
    }

    #[test]
    fn settings_created_lazily_with_defaults() {
        let store = Store::open_in_memory().unwrap();
        assert!(store.find_settings(42).unwrap().is_none());

        let s = store.settings_for(42).unwrap();
        assert!(s.email_enabled);
        assert_eq!(s.low_attendance_threshold, 75);

        // Now the row exists and find_settings sees it.
        assert!(store.find_settings(42).unwrap().is_some());
        assert_eq!(store.owners_with_settings().unwrap(), vec![42]);
    }

    #[test]
    fn update_settings_applies_patch() {
        let store = Store::open_in_memory().unwrap();
        let patch = SettingsPatch {
            sms_enabled: Some(true),
            monthly_reports: Some(true),
            low_attendance_threshold: Some(80),
            ..Default::default()
        };
        let s = store.update_settings(1, &patch).unwrap();
        assert!(s.sms_enabled);
        assert!(s.monthly_reports);

        let reread = store.find_settings(1).unwrap().unwrap();
        assert_eq!(reread.low_attendance_threshold, 80);
        assert!(reread.email_enabled); // untouched default
    }

    #[test]
    fn template_resolution_owner_then_global_then_builtin() {
        let store = Store::open_in_memory().unwrap();
        let kind = TemplateKind::AbsenceSms;

        // Seeded global row matches the built-in content.
        let global = store.template_for(kind, Some(5)).unwrap();
        assert_eq!(global, kind.builtin());

        // Owner-specific row shadows the global one.
        store
            .set_template(Some(5), kind, "Mine", "custom {{student_name}}")
            .unwrap();
        assert_eq!(
            store.template_for(kind, Some(5)).unwrap(),
            "custom {{student_name}}"
        );
        // Other owners still get the global row.
        assert_eq!(store.template_for(kind, Some(6)).unwrap(), kind.builtin());
    }

    #[test]
    fn set_template_overwrites_in_place() {
        let store = Store::open_in_memory().unwrap();
        let kind = TemplateKind::WeeklyReportSms;
        store.set_template(Some(1), kind, "v1", "one").unwrap();
        store.set_template(Some(1), kind, "v2", "two").unwrap();
        assert_eq!(store.template_for(kind, Some(1)).unwrap(), "two");
    }

    #[test]
    fn delivery_log_append_and_query() {
        let store = Store::open_in_memory().unwrap();
        let attempt = DeliveryAttempt {
            owner_id: 1,
            kind: TriggerKind::Absence,
            channel: ChannelKind::Email,
            recipient_contact: "parent@example.com".into(),
            subject_id: 10,
            status: DeliveryStatus::Sent,
            provider_ref: Some("250".into()),
            error: None,
        };
        store.record_delivery(&attempt).unwrap();
        store
            .record_delivery(&DeliveryAttempt {
                status: DeliveryStatus::Failed,
                error: Some("timeout".into()),
                provider_ref: None,
                ..attempt.clone()
            })
            .unwrap();

        let recent = store.recent_deliveries(1, 10).unwrap();
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].status, DeliveryStatus::Failed); // newest first
        assert!(store.recent_deliveries(2, 10).unwrap().is_empty());
    }

    #[test]
    fn log_row_with_corrupt_timestamp_is_dropped() {
        let store = Store::open_in_memory().unwrap();
        store
            .record_delivery(&DeliveryAttempt {
                owner_id: 1,
                kind: TriggerKind::Absence,
                channel: ChannelKind::Email,
                recipient_contact: "parent@example.com".into(),
                subject_id: 10,
                status: DeliveryStatus::Sent,
                provider_ref: None,
                error: None,
            })
            .unwrap();
        store
            .execute_batch(
                "INSERT INTO notification_log
                     (owner_id, type, channel, recipient_contact, subject_id,
                      status, provider_ref, error, sent_at)
                 VALUES (1, 'absence', 'email', 'other@example.com', 11,
                         'sent', NULL, NULL, 'not-a-timestamp');",
            )
            .unwrap();

        // The corrupt row is excluded, never backfilled with a fresh time.
        let recent = store.recent_deliveries(1, 10).unwrap();
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].subject_id, 10);
    }

    #[test]
    fn last_sent_ignores_failed_and_skipped() {
        let store = Store::open_in_memory().unwrap();
        let base = DeliveryAttempt {
            owner_id: 1,
            kind: TriggerKind::LowAttendance,
            channel: ChannelKind::Sms,
            recipient_contact: "+15550001".into(),
            subject_id: 7,
            status: DeliveryStatus::Failed,
            provider_ref: None,
            error: Some("boom".into()),
        };
        store.record_delivery(&base).unwrap();
        assert!(
            store
                .last_sent(TriggerKind::LowAttendance, 7, ChannelKind::Sms)
                .unwrap()
                .is_none()
        );

        let sent_at = utc(2026, 3, 2, 9, 0);
        store
            .record_delivery_at(
                &DeliveryAttempt {
                    status: DeliveryStatus::Sent,
                    error: None,
                    ..base
                },
                sent_at,
            )
            .unwrap();
        assert_eq!(
            store
                .last_sent(TriggerKind::LowAttendance, 7, ChannelKind::Sms)
                .unwrap(),
            Some(sent_at)
        );
        // Different subject or channel stays independent.
        assert!(
            store
                .last_sent(TriggerKind::LowAttendance, 8, ChannelKind::Sms)
                .unwrap()
                .is_none()
        );
        assert!(
            store
                .last_sent(TriggerKind::LowAttendance, 7, ChannelKind::Email)
                .unwrap()
                .is_none()
        );
    }

    #[test]
    fn schedule_due_and_complete_round_trip() {
        let store = Store::open_in_memory().unwrap();
        let now = utc(2026, 3, 2, 9, 0);
        let rule = Recurrence::daily(NaiveTime::from_hms_opt(8, 0, 0).unwrap());
        let id = store
            .insert_schedule(None, TriggerKind::Absence, rule, now - Duration::hours(1))
            .unwrap();

        let due = store.due_entries(now).unwrap();
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].id, id);
        assert_eq!(due[0].trigger, TriggerKind::Absence);
        assert!(due[0].owner_id.is_none());

        let next = rule.next_after(now);
        store.complete_entry(id, now, next).unwrap();
        assert!(store.due_entries(now).unwrap().is_empty());

        let all = store.list_schedules().unwrap();
        assert_eq!(all[0].last_run, Some(now));
        assert_eq!(all[0].next_run, next);
    }

    #[test]
    fn deactivated_entries_are_never_due() {
        let store = Store::open_in_memory().unwrap();
        let now = utc(2026, 3, 2, 9, 0);
        let rule = Recurrence::daily(NaiveTime::from_hms_opt(8, 0, 0).unwrap());
        let id = store
            .insert_schedule(Some(3), TriggerKind::WeeklyReport, rule, now - Duration::days(1))
            .unwrap();
        store.set_schedule_active(id, false).unwrap();
        assert!(store.due_entries(now).unwrap().is_empty());
        // Still present, just inactive.
        assert_eq!(store.list_schedules().unwrap().len(), 1);
    }

    #[test]
    fn system_schedule_exists_after_insert() {
        let store = Store::open_in_memory().unwrap();
        assert!(!store.system_schedule_exists(TriggerKind::Absence).unwrap());
        let rule = Recurrence::daily(NaiveTime::from_hms_opt(8, 0, 0).unwrap());
        store
            .insert_schedule(None, TriggerKind::Absence, rule, Utc::now())
            .unwrap();
        assert!(store.system_schedule_exists(TriggerKind::Absence).unwrap());
    }
}

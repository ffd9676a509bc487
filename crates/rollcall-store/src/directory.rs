//! Read-only attendance queries backing the recipient resolver.
//!
//! These run against the portal-owned tables (classes, students,
//! guardians, attendance). The engine only ever reads them.

use chrono::{Duration, NaiveDate};
use rusqlite::params;

use rollcall_core::types::{
    AbsentSubject, AttendanceDirectory, GuardianContact, PreferredChannel, SubjectStats,
};
use rollcall_core::{Result, RollcallError};

use crate::store::Store;

fn db_err(e: impl std::fmt::Display) -> RollcallError {
    RollcallError::Store(e.to_string())
}

impl AttendanceDirectory for Store {
    fn list_absent(&self, owner_id: i64, date: NaiveDate) -> Result<Vec<AbsentSubject>> {
        let conn = self.conn();
        let mut stmt = conn
            .prepare(
                "SELECT s.id, s.name, s.roll_number, c.name, c.section,
                        g.name, g.email, g.phone, g.preferred_channel
                 FROM attendance a
                 JOIN students s ON s.id = a.student_id
                 JOIN classes c ON c.id = s.class_id
                 JOIN guardians g ON g.student_id = s.id
                 WHERE c.teacher_id = ?1
                   AND a.date = ?2
                   AND a.status = 'absent'
                   AND (g.email IS NOT NULL OR g.phone IS NOT NULL)
                 ORDER BY c.name, s.name",
            )
            .map_err(db_err)?;
        let rows = stmt
            .query_map(
                params![owner_id, date.format("%Y-%m-%d").to_string()],
                |row| {
                    Ok(AbsentSubject {
                        subject_id: row.get(0)?,
                        subject_name: row.get(1)?,
                        roll_number: row.get::<_, Option<String>>(2)?.unwrap_or_default(),
                        class_name: row.get(3)?,
                        section: row.get::<_, Option<String>>(4)?.unwrap_or_default(),
                        contact: contact_from_row(row, 5)?,
                    })
                },
            )
            .map_err(db_err)?
            .filter_map(|r| r.ok())
            .collect();
        Ok(rows)
    }

    fn attendance_stats(
        &self,
        owner_id: i64,
        window_days: u32,
        as_of: NaiveDate,
    ) -> Result<Vec<SubjectStats>> {
        let start = as_of - Duration::days(window_days as i64 - 1);
        let conn = self.conn();
        let mut stmt = conn
            .prepare(
                "SELECT s.id, s.name, s.roll_number, c.name, c.section,
                        g.name, g.email, g.phone, g.preferred_channel,
                        COUNT(a.id),
                        SUM(CASE WHEN a.status = 'present' THEN 1 ELSE 0 END),
                        SUM(CASE WHEN a.status = 'absent' THEN 1 ELSE 0 END),
                        SUM(CASE WHEN a.status = 'late' THEN 1 ELSE 0 END),
                        SUM(CASE WHEN a.status = 'excused' THEN 1 ELSE 0 END)
                 FROM students s
                 JOIN classes c ON c.id = s.class_id
                 JOIN guardians g ON g.student_id = s.id
                 LEFT JOIN attendance a
                   ON a.student_id = s.id AND a.date BETWEEN ?2 AND ?3
                 WHERE c.teacher_id = ?1
                   AND (g.email IS NOT NULL OR g.phone IS NOT NULL)
                 GROUP BY s.id, g.id
                 HAVING COUNT(a.id) > 0
                 ORDER BY c.name, s.name",
            )
            .map_err(db_err)?;
        let rows = stmt
            .query_map(
                params![
                    owner_id,
                    start.format("%Y-%m-%d").to_string(),
                    as_of.format("%Y-%m-%d").to_string(),
                ],
                |row| {
                    Ok(SubjectStats {
                        subject_id: row.get(0)?,
                        subject_name: row.get(1)?,
                        roll_number: row.get::<_, Option<String>>(2)?.unwrap_or_default(),
                        class_name: row.get(3)?,
                        section: row.get::<_, Option<String>>(4)?.unwrap_or_default(),
                        contact: contact_from_row(row, 5)?,
                        total_days: row.get(9)?,
                        present_days: row.get::<_, Option<u32>>(10)?.unwrap_or(0),
                        absent_days: row.get::<_, Option<u32>>(11)?.unwrap_or(0),
                        late_days: row.get::<_, Option<u32>>(12)?.unwrap_or(0),
                        excused_days: row.get::<_, Option<u32>>(13)?.unwrap_or(0),
                    })
                },
            )
            .map_err(db_err)?
            .filter_map(|r| r.ok())
            .collect();
        Ok(rows)
    }
}

fn contact_from_row(row: &rusqlite::Row<'_>, offset: usize) -> rusqlite::Result<GuardianContact> {
    let preferred: Option<String> = row.get(offset + 3)?;
    Ok(GuardianContact {
        guardian_name: row.get::<_, Option<String>>(offset)?.unwrap_or_default(),
        email: row.get(offset + 1)?,
        phone: row.get(offset + 2)?,
        preferred: PreferredChannel::parse(preferred.as_deref().unwrap_or("both")),
    })
}

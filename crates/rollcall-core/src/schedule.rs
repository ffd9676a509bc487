//! Recurrence rules and schedule entries.
//!
//! Cron expressions are deliberately absent: every entry carries an
//! explicit `next_run` timestamp recomputed after each firing, which is
//! simpler to test and cannot drift.

use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveTime, TimeZone, Utc, Weekday};
use serde::{Deserialize, Serialize};

use crate::types::TriggerKind;

/// How often an entry recurs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecurrenceKind {
    Daily,
    Weekly,
    Monthly,
}

impl RecurrenceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Daily => "daily",
            Self::Weekly => "weekly",
            Self::Monthly => "monthly",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "daily" => Some(Self::Daily),
            "weekly" => Some(Self::Weekly),
            "monthly" => Some(Self::Monthly),
            _ => None,
        }
    }
}

/// A recurrence rule anchored at a time of day, plus a day anchor for
/// weekly (1 = Monday .. 7 = Sunday) and monthly (1..=31, clamped to the
/// month length) rules. Daily rules ignore `anchor_day`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Recurrence {
    pub kind: RecurrenceKind,
    pub anchor_day: Option<u32>,
    pub at: NaiveTime,
}

impl Recurrence {
    pub fn daily(at: NaiveTime) -> Self {
        Self { kind: RecurrenceKind::Daily, anchor_day: None, at }
    }

    pub fn weekly(weekday: Weekday, at: NaiveTime) -> Self {
        Self {
            kind: RecurrenceKind::Weekly,
            anchor_day: Some(weekday.number_from_monday()),
            at,
        }
    }

    pub fn monthly(day_of_month: u32, at: NaiveTime) -> Self {
        Self {
            kind: RecurrenceKind::Monthly,
            anchor_day: Some(day_of_month.clamp(1, 31)),
            at,
        }
    }

    /// The next occurrence strictly after `now`.
    ///
    /// Starts from the anchor occurrence nearest `now` and advances by
    /// whole periods until the candidate is in the future, so an entry
    /// overdue by many periods lands on the nearest future anchor in a
    /// bounded number of steps instead of re-firing immediately over and
    /// over.
    pub fn next_after(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        let today = now.date_naive();
        let mut date = match self.kind {
            RecurrenceKind::Daily => today,
            RecurrenceKind::Weekly => {
                let target = self.anchor_day.unwrap_or(1).clamp(1, 7);
                let current = today.weekday().number_from_monday();
                today + Duration::days(((target + 7 - current) % 7) as i64)
            }
            RecurrenceKind::Monthly => {
                let dom = self.anchor_day.unwrap_or(1);
                clamp_to_month(today.year(), today.month(), dom)
            }
        };

        let mut candidate = Utc.from_utc_datetime(&date.and_time(self.at));
        // Bounded: one step per period, at most ~3 years of catch-up.
        for _ in 0..1200 {
            if candidate > now {
                return candidate;
            }
            date = match self.kind {
                RecurrenceKind::Daily => date + Duration::days(1),
                RecurrenceKind::Weekly => date + Duration::days(7),
                RecurrenceKind::Monthly => {
                    let (year, month) = if date.month() == 12 {
                        (date.year() + 1, 1)
                    } else {
                        (date.year(), date.month() + 1)
                    };
                    clamp_to_month(year, month, self.anchor_day.unwrap_or(1))
                }
            };
            candidate = Utc.from_utc_datetime(&date.and_time(self.at));
        }
        candidate
    }
}

/// Day-of-month clamped to the actual length of (year, month).
fn clamp_to_month(year: i32, month: u32, day: u32) -> NaiveDate {
    let mut d = day.clamp(1, 31);
    loop {
        if let Some(date) = NaiveDate::from_ymd_opt(year, month, d) {
            return date;
        }
        d -= 1;
    }
}

/// A persisted recurring trigger. `owner_id = None` marks a system-level
/// sweep that fans out over every owner with a settings row.
#[derive(Debug, Clone)]
pub struct ScheduleEntry {
    pub id: i64,
    pub owner_id: Option<i64>,
    pub trigger: TriggerKind,
    pub recurrence: Recurrence,
    pub active: bool,
    pub last_run: Option<DateTime<Utc>>,
    pub next_run: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Timelike;

    fn at(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    fn utc(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, mi, 0).unwrap()
    }

    #[test]
    fn daily_advances_to_tomorrow_when_time_passed() {
        let rule = Recurrence::daily(at(8, 0));
        let now = utc(2026, 3, 2, 9, 0); // Monday, past 08:00
        let next = rule.next_after(now);
        assert_eq!(next, utc(2026, 3, 3, 8, 0));
    }

    #[test]
    fn daily_fires_later_today_when_time_ahead() {
        let rule = Recurrence::daily(at(17, 0));
        let now = utc(2026, 3, 2, 9, 0);
        assert_eq!(rule.next_after(now), utc(2026, 3, 2, 17, 0));
    }

    #[test]
    fn weekly_lands_on_anchor_weekday() {
        let rule = Recurrence::weekly(Weekday::Fri, at(17, 0));
        let now = utc(2026, 3, 2, 9, 0); // Monday
        let next = rule.next_after(now);
        assert_eq!(next, utc(2026, 3, 6, 17, 0));
        assert_eq!(next.weekday(), Weekday::Fri);
    }

    #[test]
    fn weekly_same_day_past_time_skips_a_week() {
        let rule = Recurrence::weekly(Weekday::Mon, at(9, 0));
        let now = utc(2026, 3, 2, 10, 0); // Monday 10:00
        assert_eq!(rule.next_after(now), utc(2026, 3, 9, 9, 0));
    }

    #[test]
    fn overdue_weekly_recovers_to_nearest_future_anchor() {
        // An entry 40 days overdue must land on the coming Friday, not
        // re-fire once per missed week.
        let rule = Recurrence::weekly(Weekday::Fri, at(17, 0));
        let now = utc(2026, 4, 15, 12, 0); // Wednesday
        let next = rule.next_after(now);
        assert!(next > now);
        assert_eq!(next.weekday(), Weekday::Fri);
        assert!(next - now <= Duration::days(7));
        assert_eq!(next.hour(), 17);
    }

    #[test]
    fn monthly_clamps_to_short_months() {
        let rule = Recurrence::monthly(31, at(18, 0));
        let now = utc(2026, 1, 31, 19, 0); // past January's anchor
        let next = rule.next_after(now);
        // February 2026 has 28 days.
        assert_eq!(next, utc(2026, 2, 28, 18, 0));
    }

    #[test]
    fn monthly_first_of_month() {
        let rule = Recurrence::monthly(1, at(18, 0));
        let now = utc(2026, 3, 15, 12, 0);
        assert_eq!(rule.next_after(now), utc(2026, 4, 1, 18, 0));
    }

    #[test]
    fn next_run_is_strictly_future_at_the_boundary() {
        let rule = Recurrence::daily(at(8, 0));
        let now = utc(2026, 3, 2, 8, 0); // exactly the anchor instant
        assert!(rule.next_after(now) > now);
    }
}

//! # Rollcall Core
//!
//! Shared foundation for the Rollcall notification engine: domain types,
//! configuration, error taxonomy, message templates, and recurrence rules.
//!
//! The attendance portal itself (marking UI, auth, CSV import, dashboards)
//! is an external collaborator — this workspace only covers the engine that
//! decides who gets told what, renders it, sends it, and audits it.

pub mod config;
pub mod error;
pub mod schedule;
pub mod template;
pub mod types;

pub use config::RollcallConfig;
pub use error::{Result, RollcallError};
pub use schedule::{Recurrence, RecurrenceKind, ScheduleEntry};
pub use template::{TemplateKind, email_subject, render};
pub use types::{
    AbsentSubject, AttendanceDirectory, ChannelKind, DeliveryRecord, DeliveryStatus,
    GuardianContact, NotificationSettings, PreferredChannel, Recipient, SettingsPatch,
    SubjectStats, TriggerKind,
};

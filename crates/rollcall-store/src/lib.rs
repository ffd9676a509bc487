//! # Rollcall Store
//!
//! SQLite-backed persistence for the notification engine: per-owner
//! settings, message templates, the append-only delivery log, and
//! recurring schedule entries. Also implements the read-only
//! [`AttendanceDirectory`](rollcall_core::AttendanceDirectory) queries
//! against the portal-owned attendance tables.
//!
//! One connection behind a mutex; every write is a single-row insert or
//! update, so plain connection-level locking is all the concurrency
//! control the engine needs.

mod directory;
mod store;

pub use store::{DeliveryAttempt, Store};

//! # Rollcall Engine
//!
//! The dispatch pipeline: a trigger fires (manually or from the
//! scheduler), the resolver turns it into concrete recipients, the dedup
//! policy drops anyone notified too recently, and the dispatcher fans the
//! rest out across channel providers under a bounded worker pool. Every
//! attempt lands in the delivery log, including the ones that were
//! skipped and why.

pub mod dedup;
pub mod dispatcher;
pub mod engine;
pub mod resolver;
pub mod scheduler;

pub use dedup::DedupPolicy;
pub use dispatcher::{BatchSummary, Dispatcher};
pub use engine::Engine;
pub use resolver::Resolver;
pub use scheduler::Scheduler;

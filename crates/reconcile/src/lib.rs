//! Ethereal reconciliation engine.
//!
//! Each cycle lists every desired record, looks up the instance its name
//! derives to, decides a corrective action, executes it and records the
//! outcome on the record's status. The scheduler runs cycles back to back
//! with a fixed delay and stops only at a cycle boundary.

#![forbid(unsafe_code)]

pub mod detect;
pub mod reconciler;
pub mod scheduler;
pub mod status;

pub use detect::decide;
pub use reconciler::{CycleReport, Reconciler, RecordOutcome};
pub use scheduler::{LoopSummary, SchedulerLoop};
pub use status::{next_resurrections, StatusTracker};

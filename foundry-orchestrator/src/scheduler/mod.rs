//! Scheduler layer
//!
//! Holds the priority queue of jobs waiting for an executor.

pub mod queue;

pub use foundry_core::dto::job::QueueEntry;
pub use queue::{JobQueue, QueueError};

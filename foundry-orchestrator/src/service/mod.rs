//! Service Module
//!
//! Business logic layer for the orchestrator.
//! Services coordinate the stores and the queue and contain domain logic.

pub mod job;
pub mod metric;

// Re-export for convenience
pub use job as job_service;
pub use metric as metric_service;

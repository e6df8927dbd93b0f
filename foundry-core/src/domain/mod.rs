//! Core domain types
//!
//! These types are shared between the orchestrator (which persists and
//! schedules them) and clients (which submit jobs and read results back).

pub mod job;
pub mod metric;

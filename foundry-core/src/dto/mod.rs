//! Data Transfer Objects
//!
//! Request and response bodies used on the orchestrator HTTP API.

pub mod job;
pub mod metric;

//! Foundry Core
//!
//! Core types shared by the Foundry job scheduler components.
//!
//! This crate contains:
//! - Domain types: Jobs, their lifecycle status, and metric points
//! - DTOs: Request and response bodies exchanged with the orchestrator

pub mod domain;
pub mod dto;

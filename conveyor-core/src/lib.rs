//! Conveyor Core
//!
//! Core types and abstractions for the Conveyor CI/CD pipeline runner.
//!
//! This crate contains:
//! - Domain types: pipeline definitions, execution records and the
//!   execution-state vocabulary with its aggregation rules
//! - DTOs: Data transfer objects exchanged between orchestrator and runners

pub mod domain;
pub mod dto;

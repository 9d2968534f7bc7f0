//! Core domain types
//!
//! This module contains the core domain structures used across Conveyor services.
//! Definitions are authored and immutable; execution records are the mutable
//! runtime counterpart owned by the orchestrator (pipelines, stages) and
//! the runner (a job while it is running).

pub mod definition;
pub mod execution;
pub mod state;

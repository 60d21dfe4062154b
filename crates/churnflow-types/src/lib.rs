//! Shared domain types for Churnflow.
//!
//! This crate contains the core domain types used across the Churnflow
//! pipelines: workflow/step definitions and statuses, the in-memory
//! tabular data model, and hyperparameter search domain types.
//!
//! Zero infrastructure dependencies -- only serde, uuid, chrono, thiserror.

pub mod search;
pub mod table;
pub mod workflow;

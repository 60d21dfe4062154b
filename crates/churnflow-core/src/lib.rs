//! Core engine for Churnflow.
//!
//! This crate defines the "ports" (storage traits) that the infrastructure
//! layer implements, the wave-parallel workflow executor with immutable
//! artifact passing, the trial-based hyperparameter search loop with
//! champion tracking, the decision-tree model with cross-validated
//! scoring, and the three pipeline flow definitions. It depends only on
//! `churnflow-types` -- never on `churnflow-infra` or any IO backend.

pub mod model;
pub mod pipeline;
pub mod search;
pub mod store;
pub mod workflow;

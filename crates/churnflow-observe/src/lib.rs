//! Observability utilities for Churnflow.

pub mod tracing_setup;

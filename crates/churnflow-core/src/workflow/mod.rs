//! Workflow engine core: DAG validation, artifact passing, and wave execution.
//!
//! - `dag` -- DAG validation (single start/terminal, reachability, cycles)
//!   and parallel wave computation
//! - `artifact` -- write-once artifact store and the join-time merge policy
//! - `executor` -- wave-based parallel executor over `tokio::JoinSet`

pub mod artifact;
pub mod dag;
pub mod executor;

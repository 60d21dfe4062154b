//! Hyperparameter search: parameter space, seeded random sampling,
//! champion tracking, and the trial loop.
//!
//! - `space` -- the searchable parameter space and the [`Sampler`] trait
//! - `champion` -- best-so-far tracking with improvement events
//! - `study` -- the budgeted trial loop and its outcome

pub mod champion;
pub mod space;
pub mod study;

pub use champion::{ChampionEvent, ChampionTracker};
pub use space::{RandomSampler, Sampler, SearchSpace};
pub use study::{optimize, SearchError, SearchOutcome, Study};

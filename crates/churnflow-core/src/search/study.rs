//! The budgeted trial loop.
//!
//! `optimize` draws configurations from a sampler, evaluates them with a
//! caller-supplied objective, and records completed trials in a `Study`.
//! Failed evaluations are skipped without consuming budget; the loop only
//! aborts after too many consecutive failures, so one flaky configuration
//! cannot sink a whole search.

use chrono::Utc;
use tracing::{info, warn};

use churnflow_types::search::{Direction, Trial, TrialConfig};

use super::champion::{ChampionEvent, ChampionTracker};
use super::space::{Sampler, SearchSpace};

/// Abort the search after this many objective failures in a row.
pub const MAX_CONSECUTIVE_TRIAL_FAILURES: usize = 3;

// ---------------------------------------------------------------------------
// Study
// ---------------------------------------------------------------------------

/// A completed (or in-progress) sequence of evaluated trials.
#[derive(Debug)]
pub struct Study {
    direction: Direction,
    trials: Vec<Trial>,
}

impl Study {
    pub fn new(direction: Direction) -> Self {
        Self {
            direction,
            trials: Vec::new(),
        }
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn trials(&self) -> &[Trial] {
        &self.trials
    }

    pub fn record(&mut self, trial: Trial) {
        self.trials.push(trial);
    }

    /// The best trial under the study direction; the earliest one on ties.
    pub fn best_trial(&self) -> Option<&Trial> {
        let mut best: Option<&Trial> = None;
        for trial in &self.trials {
            match best {
                None => best = Some(trial),
                Some(incumbent) if self.direction.improves(trial.value, incumbent.value) => {
                    best = Some(trial)
                }
                Some(_) => {}
            }
        }
        best
    }
}

// ---------------------------------------------------------------------------
// optimize
// ---------------------------------------------------------------------------

/// Everything a finished search produced.
#[derive(Debug)]
pub struct SearchOutcome {
    pub study: Study,
    /// Configuration of the best trial.
    pub best_config: TrialConfig,
    /// Champion events in the order they occurred.
    pub events: Vec<ChampionEvent>,
}

/// Run a budgeted search: exactly `trial_budget` completed trials, unless
/// the objective fails [`MAX_CONSECUTIVE_TRIAL_FAILURES`] times in a row.
pub fn optimize<F>(
    space: &SearchSpace,
    direction: Direction,
    trial_budget: usize,
    mut sampler: impl Sampler,
    mut objective: F,
) -> Result<SearchOutcome, SearchError>
where
    F: FnMut(&TrialConfig) -> Result<f64, Box<dyn std::error::Error + Send + Sync>>,
{
    space.validate()?;
    if trial_budget == 0 {
        return Err(SearchError::InvalidBudget);
    }

    let mut study = Study::new(direction);
    let mut tracker = ChampionTracker::new(direction);
    let mut events = Vec::new();
    let mut consecutive_failures = 0_usize;

    while study.trials().len() < trial_budget {
        let number = study.trials().len();
        let config = sampler.suggest(space);

        let value = match objective(&config) {
            Ok(value) => {
                consecutive_failures = 0;
                value
            }
            Err(error) => {
                consecutive_failures += 1;
                warn!(
                    trial = number,
                    consecutive_failures,
                    %error,
                    "trial evaluation failed, skipping"
                );
                if consecutive_failures >= MAX_CONSECUTIVE_TRIAL_FAILURES {
                    return Err(SearchError::ConsecutiveFailures {
                        count: consecutive_failures,
                        last: error.to_string(),
                    });
                }
                continue;
            }
        };

        let trial = Trial {
            number,
            config,
            value,
            evaluated_at: Utc::now(),
        };
        info!(trial = number, value, "trial completed");
        if let Some(event) = tracker.observe(&trial) {
            events.push(event);
        }
        study.record(trial);
    }

    // Budget >= 1 and every recorded trial completed, so a best exists.
    let best_config = study
        .best_trial()
        .map(|t| t.config.clone())
        .ok_or(SearchError::InvalidBudget)?;

    Ok(SearchOutcome {
        study,
        best_config,
        events,
    })
}

// ---------------------------------------------------------------------------
// SearchError
// ---------------------------------------------------------------------------

/// Search setup and execution failures.
#[derive(Debug, thiserror::Error)]
pub enum SearchError {
    /// The space names the same parameter twice.
    #[error("duplicate search parameter '{0}'")]
    DuplicateParam(String),

    /// The space has no parameters.
    #[error("search space is empty")]
    EmptySpace,

    /// A budget of zero trials is meaningless.
    #[error("trial budget must be at least 1")]
    InvalidBudget,

    /// The objective failed too many times in a row.
    #[error("{count} consecutive trial failures, last: {last}")]
    ConsecutiveFailures { count: usize, last: String },
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

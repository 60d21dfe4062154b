//! Best-so-far tracking across trials.
//!
//! The tracker observes every completed trial and reports an event only
//! when the champion changes: once for the first trial, then once per
//! strict improvement, with the relative improvement over the previous
//! champion.

use tracing::info;

use churnflow_types::search::{Direction, Trial};

// ---------------------------------------------------------------------------
// ChampionEvent
// ---------------------------------------------------------------------------

/// Emitted when a trial becomes the new champion.
#[derive(Debug, Clone, PartialEq)]
pub enum ChampionEvent {
    /// The first completed trial, champion by default.
    Initial { trial: usize, value: f64 },
    /// A later trial strictly beat the previous champion.
    ///
    /// `improvement_pct` is |previous - new| / |previous| * 100, or `None`
    /// when the previous champion value was exactly zero.
    Improved {
        trial: usize,
        value: f64,
        improvement_pct: Option<f64>,
    },
}

// ---------------------------------------------------------------------------
// ChampionTracker
// ---------------------------------------------------------------------------

/// Tracks the best trial seen so far under a fixed direction.
#[derive(Debug)]
pub struct ChampionTracker {
    direction: Direction,
    champion_value: Option<f64>,
    champion_trial: Option<usize>,
}

impl ChampionTracker {
    pub fn new(direction: Direction) -> Self {
        Self {
            direction,
            champion_value: None,
            champion_trial: None,
        }
    }

    /// The current champion's trial number and value, if any trial has
    /// completed.
    pub fn champion(&self) -> Option<(usize, f64)> {
        self.champion_trial.zip(self.champion_value)
    }

    /// Observe a completed trial. Returns an event when the champion
    /// changes, `None` when the trial does not improve on it.
    pub fn observe(&mut self, trial: &Trial) -> Option<ChampionEvent> {
        match self.champion_value {
            None => {
                self.champion_value = Some(trial.value);
                self.champion_trial = Some(trial.number);
                info!(trial = trial.number, value = trial.value, "initial champion");
                Some(ChampionEvent::Initial {
                    trial: trial.number,
                    value: trial.value,
                })
            }
            Some(incumbent) if self.direction.improves(trial.value, incumbent) => {
                let improvement_pct = if incumbent == 0.0 {
                    None
                } else {
                    Some((incumbent - trial.value).abs() / incumbent.abs() * 100.0)
                };
                self.champion_value = Some(trial.value);
                self.champion_trial = Some(trial.number);
                info!(
                    trial = trial.number,
                    value = trial.value,
                    improvement_pct,
                    "new champion"
                );
                Some(ChampionEvent::Improved {
                    trial: trial.number,
                    value: trial.value,
                    improvement_pct,
                })
            }
            Some(_) => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

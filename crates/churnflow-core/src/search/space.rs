//! Parameter space definition and configuration sampling.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};

use churnflow_types::search::{ParamDomain, ParamValue, TrialConfig};

use super::study::SearchError;

// ---------------------------------------------------------------------------
// SearchSpace
// ---------------------------------------------------------------------------

/// An ordered set of named parameter domains.
///
/// Order is preserved so sampled configurations always list parameters in
/// declaration order, and so seeded sampling draws values in a stable
/// sequence.
#[derive(Debug, Clone, Default)]
pub struct SearchSpace {
    params: Vec<(String, ParamDomain)>,
}

impl SearchSpace {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a parameter domain. Chainable.
    pub fn add(mut self, name: impl Into<String>, domain: ParamDomain) -> Self {
        self.params.push((name.into(), domain));
        self
    }

    pub fn params(&self) -> &[(String, ParamDomain)] {
        &self.params
    }

    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    /// Reject empty spaces and duplicate parameter names.
    pub fn validate(&self) -> Result<(), SearchError> {
        if self.params.is_empty() {
            return Err(SearchError::EmptySpace);
        }
        let mut seen = std::collections::HashSet::new();
        for (name, _) in &self.params {
            if !seen.insert(name.as_str()) {
                return Err(SearchError::DuplicateParam(name.clone()));
            }
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Sampler
// ---------------------------------------------------------------------------

/// Draws one configuration per trial from a search space.
pub trait Sampler {
    fn suggest(&mut self, space: &SearchSpace) -> TrialConfig;
}

/// Uniform random sampling with a fixed seed for reproducible studies.
#[derive(Debug)]
pub struct RandomSampler {
    rng: StdRng,
}

impl RandomSampler {
    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }
}

impl Sampler for RandomSampler {
    fn suggest(&mut self, space: &SearchSpace) -> TrialConfig {
        let values = space
            .params()
            .iter()
            .map(|(name, domain)| {
                let value = match domain {
                    ParamDomain::IntRange { low, high } => {
                        ParamValue::Int(self.rng.gen_range(*low..=*high))
                    }
                    ParamDomain::Categorical { choices } => {
                        // validate() guarantees a non-empty space; an empty
                        // choice list still yields a stable fallback.
                        let choice = choices
                            .choose(&mut self.rng)
                            .cloned()
                            .unwrap_or_default();
                        ParamValue::Text(choice)
                    }
                };
                (name.clone(), value)
            })
            .collect();
        TrialConfig(values)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

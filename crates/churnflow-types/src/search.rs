//! Hyperparameter search domain types.
//!
//! Parameter domains, sampled configurations, and the immutable `Trial`
//! record. The search loop itself (study, sampler, champion tracker)
//! lives in `churnflow-core::search`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Parameter domains and values
// ---------------------------------------------------------------------------

/// The domain a hyperparameter may be sampled from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ParamDomain {
    /// Inclusive integer range.
    IntRange { low: i64, high: i64 },
    /// Finite set of named choices.
    Categorical { choices: Vec<String> },
}

impl ParamDomain {
    /// Whether a sampled value lies inside this domain.
    pub fn contains(&self, value: &ParamValue) -> bool {
        match (self, value) {
            (ParamDomain::IntRange { low, high }, ParamValue::Int(v)) => {
                *low <= *v && *v <= *high
            }
            (ParamDomain::Categorical { choices }, ParamValue::Text(v)) => {
                choices.iter().any(|c| c == v)
            }
            _ => false,
        }
    }
}

/// A concrete sampled hyperparameter value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    Int(i64),
    Text(String),
}

impl ParamValue {
    pub fn as_int(&self) -> Option<i64> {
        match self {
            ParamValue::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            ParamValue::Text(v) => Some(v),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Trial configuration
// ---------------------------------------------------------------------------

/// One sampled configuration: parameter name to value, in space order.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TrialConfig(pub Vec<(String, ParamValue)>);

impl TrialConfig {
    /// Look up a parameter value by name.
    pub fn get(&self, name: &str) -> Option<&ParamValue> {
        self.0.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    pub fn int(&self, name: &str) -> Option<i64> {
        self.get(name).and_then(ParamValue::as_int)
    }

    pub fn text(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(ParamValue::as_text)
    }
}

// ---------------------------------------------------------------------------
// Study direction and trials
// ---------------------------------------------------------------------------

/// Whether the study seeks the largest or smallest objective value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Maximize,
    Minimize,
}

impl Direction {
    /// Whether `candidate` strictly improves on `incumbent` under this direction.
    pub fn improves(self, candidate: f64, incumbent: f64) -> bool {
        match self {
            Direction::Maximize => candidate > incumbent,
            Direction::Minimize => candidate < incumbent,
        }
    }
}

/// One evaluated trial. Immutable once recorded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trial {
    /// Monotonic 0-based trial number (wall-clock evaluation order).
    pub number: usize,
    /// The sampled configuration this trial evaluated.
    pub config: TrialConfig,
    /// The objective value the configuration achieved.
    pub value: f64,
    /// When the evaluation finished.
    pub evaluated_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn int_range_contains_is_inclusive() {
        let d = ParamDomain::IntRange { low: 1, high: 30 };
        assert!(d.contains(&ParamValue::Int(1)));
        assert!(d.contains(&ParamValue::Int(30)));
        assert!(!d.contains(&ParamValue::Int(0)));
        assert!(!d.contains(&ParamValue::Int(31)));
        assert!(!d.contains(&ParamValue::Text("gini".into())));
    }

    #[test]
    fn categorical_contains_named_choice() {
        let d = ParamDomain::Categorical {
            choices: vec!["gini".into(), "entropy".into()],
        };
        assert!(d.contains(&ParamValue::Text("entropy".into())));
        assert!(!d.contains(&ParamValue::Text("mse".into())));
        assert!(!d.contains(&ParamValue::Int(2)));
    }

    #[test]
    fn trial_config_typed_lookups() {
        let cfg = TrialConfig(vec![
            ("max_depth".into(), ParamValue::Int(7)),
            ("criterion".into(), ParamValue::Text("gini".into())),
        ]);
        assert_eq!(cfg.int("max_depth"), Some(7));
        assert_eq!(cfg.text("criterion"), Some("gini"));
        assert_eq!(cfg.int("criterion"), None);
        assert_eq!(cfg.get("missing"), None);
    }

    #[test]
    fn direction_improves_strictly() {
        assert!(Direction::Maximize.improves(0.7, 0.6));
        assert!(!Direction::Maximize.improves(0.6, 0.6));
        assert!(Direction::Minimize.improves(0.5, 0.6));
        assert!(!Direction::Minimize.improves(0.6, 0.6));
    }

    #[test]
    fn trial_json_roundtrip() {
        let trial = Trial {
            number: 3,
            config: TrialConfig(vec![("max_depth".into(), ParamValue::Int(5))]),
            value: 0.71,
            evaluated_at: Utc::now(),
        };
        let json = serde_json::to_string(&trial).unwrap();
        let parsed: Trial = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.number, 3);
        assert_eq!(parsed.config.int("max_depth"), Some(5));
        assert_eq!(parsed.value, 0.71);
    }
}

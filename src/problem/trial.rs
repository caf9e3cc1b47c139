use std::fmt;
use std::sync::Arc;

use crate::algorithm::AlgorithmId;
use crate::problem::TrialPoint;

const INITIAL_LABEL: &str = "Initial Algorithm";

/// Who proposed a trial point.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Origin {
    /// The problem's initial point, evaluated once when a solve starts.
    Initial,
    /// A search algorithm registered with the schedule.
    Algorithm { id: AlgorithmId, label: Arc<str> },
}

impl Origin {
    pub fn id(&self) -> Option<AlgorithmId> {
        match self {
            Self::Initial => None,
            Self::Algorithm { id, .. } => Some(*id),
        }
    }

    pub fn label(&self) -> &str {
        match self {
            Self::Initial => INITIAL_LABEL,
            Self::Algorithm { label, .. } => label,
        }
    }
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Initial => f.write_str(INITIAL_LABEL),
            Self::Algorithm { id, label } => write!(f, "{label} ({id})"),
        }
    }
}

/// Folds a raw satisfaction into `[0, 1]`; NaN counts as no satisfaction.
pub fn fold_satisfaction(satisfaction: f64) -> f64 {
    if satisfaction.is_nan() {
        0.0
    } else {
        satisfaction.clamp(0.0, 1.0)
    }
}

/// The result of evaluating one trial point.
#[derive(Debug, Clone, PartialEq)]
pub struct Trial {
    point: TrialPoint,
    satisfaction: f64,
    origin: Origin,
    veto: Option<String>,
    sequence: usize,
}

impl Trial {
    pub(crate) fn scored(point: TrialPoint, satisfaction: f64, origin: Origin) -> Self {
        Self {
            point,
            satisfaction,
            origin,
            veto: None,
            sequence: 0,
        }
    }

    pub(crate) fn vetoed(point: TrialPoint, reason: String, origin: Origin) -> Self {
        Self {
            point,
            satisfaction: f64::NAN,
            origin,
            veto: Some(reason),
            sequence: 0,
        }
    }

    pub(crate) fn with_sequence(mut self, sequence: usize) -> Self {
        self.sequence = sequence;
        self
    }

    pub fn point(&self) -> &TrialPoint {
        &self.point
    }

    /// Satisfaction folded into `[0, 1]`, with failed evaluations reading as 0.
    pub fn satisfaction(&self) -> f64 {
        fold_satisfaction(self.satisfaction)
    }

    /// Satisfaction exactly as the evaluator returned it, NaN included.
    pub fn raw_satisfaction(&self) -> f64 {
        self.satisfaction
    }

    /// True when evaluation produced no usable score.
    pub fn is_failed(&self) -> bool {
        self.satisfaction.is_nan()
    }

    pub fn is_vetoed(&self) -> bool {
        self.veto.is_some()
    }

    pub fn veto_reason(&self) -> Option<&str> {
        self.veto.as_deref()
    }

    pub fn origin(&self) -> &Origin {
        &self.origin
    }

    /// True when the algorithm identified by `id` proposed this trial.
    pub fn is_from(&self, id: AlgorithmId) -> bool {
        self.origin.id() == Some(id)
    }

    /// One-based position of this trial in the order of evaluation.
    pub fn sequence(&self) -> usize {
        self.sequence
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fold_satisfaction() {
        assert_eq!(fold_satisfaction(f64::NAN), 0.0);
        assert_eq!(fold_satisfaction(0.4), 0.4);
        assert_eq!(fold_satisfaction(-2.0), 0.0);
        assert_eq!(fold_satisfaction(1.5), 1.0);
    }

    #[test]
    fn test_failed_trial_keeps_nan_marker() {
        let trial = Trial::scored(TrialPoint::new(vec![1.0]), f64::NAN, Origin::Initial);
        assert!(trial.is_failed());
        assert!(trial.raw_satisfaction().is_nan());
        assert_eq!(trial.satisfaction(), 0.0);
    }

    #[test]
    fn test_vetoed_trial() {
        let origin = Origin::Algorithm {
            id: AlgorithmId::new(3),
            label: Arc::from("Random Search"),
        };
        let trial = Trial::vetoed(TrialPoint::new(vec![1.0]), "infeasible".into(), origin);
        assert!(trial.is_vetoed());
        assert_eq!(trial.veto_reason(), Some("infeasible"));
        assert!(trial.is_from(AlgorithmId::new(3)));
        assert!(!trial.is_from(AlgorithmId::new(0)));
        assert_eq!(trial.origin().label(), "Random Search");
    }
}

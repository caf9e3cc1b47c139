use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::error::{Error, Result};

/// Why a solve ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    TargetSatisfaction,
    MaxEvaluations,
    MaxTime,
    /// A [`StopHandle`] or an observer asked the solve to stop.
    Requested,
    /// No algorithm could make further progress.
    Exhausted,
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::TargetSatisfaction => "target satisfaction reached",
            Self::MaxEvaluations => "evaluation limit reached",
            Self::MaxTime => "time limit reached",
            Self::Requested => "stop requested",
            Self::Exhausted => "no algorithm available",
        };
        f.write_str(text)
    }
}

/// Global stopping criteria; the first one met ends the solve.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use multisolve::Stopper;
///
/// let stopper = Stopper::target_satisfaction(0.999)
///     .with_max_evaluations(10_000)
///     .with_max_time(Duration::from_secs(30));
/// assert!(stopper.validate().is_ok());
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Stopper {
    max_evaluations: Option<usize>,
    max_time: Option<Duration>,
    target_satisfaction: Option<f64>,
}

impl Stopper {
    pub fn max_evaluations(evaluations: usize) -> Self {
        Self::default().with_max_evaluations(evaluations)
    }

    pub fn max_time(duration: Duration) -> Self {
        Self::default().with_max_time(duration)
    }

    pub fn target_satisfaction(satisfaction: f64) -> Self {
        Self::default().with_target_satisfaction(satisfaction)
    }

    pub fn with_max_evaluations(mut self, evaluations: usize) -> Self {
        self.max_evaluations = Some(evaluations);
        self
    }

    pub fn with_max_time(mut self, duration: Duration) -> Self {
        self.max_time = Some(duration);
        self
    }

    pub fn with_target_satisfaction(mut self, satisfaction: f64) -> Self {
        self.target_satisfaction = Some(satisfaction);
        self
    }

    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] when no criterion is set or the target
    /// satisfaction is not finite.
    pub fn validate(&self) -> Result<()> {
        if self.max_evaluations.is_none()
            && self.max_time.is_none()
            && self.target_satisfaction.is_none()
        {
            return Err(Error::InvalidConfig(
                "stopper needs at least one criterion".to_string(),
            ));
        }
        if self.target_satisfaction.is_some_and(|target| !target.is_finite()) {
            return Err(Error::InvalidConfig(
                "target satisfaction must be finite".to_string(),
            ));
        }
        Ok(())
    }

    /// Evaluations still allowed, if an evaluation limit is set.
    pub fn remaining_evaluations(&self, evaluations: usize) -> Option<usize> {
        self.max_evaluations
            .map(|limit| limit.saturating_sub(evaluations))
    }

    pub fn check(
        &self,
        evaluations: usize,
        elapsed: Duration,
        best_satisfaction: Option<f64>,
    ) -> Option<StopReason> {
        if let (Some(target), Some(best)) = (self.target_satisfaction, best_satisfaction) {
            if best >= target {
                return Some(StopReason::TargetSatisfaction);
            }
        }
        if self.max_evaluations.is_some_and(|limit| evaluations >= limit) {
            return Some(StopReason::MaxEvaluations);
        }
        if self.max_time.is_some_and(|limit| elapsed >= limit) {
            return Some(StopReason::MaxTime);
        }
        None
    }
}

/// Shared flag for asking a running solve to stop from another thread.
#[derive(Debug, Clone, Default)]
pub struct StopHandle(Arc<AtomicBool>);

impl StopHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request_stop(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_requested(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    pub(crate) fn clear(&self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stopper_requires_a_criterion() {
        assert!(Stopper::default().validate().is_err());
        assert!(Stopper::target_satisfaction(f64::NAN).validate().is_err());
        assert!(Stopper::max_evaluations(10).validate().is_ok());
    }

    #[test]
    fn test_stopper_check() {
        let stopper = Stopper::max_evaluations(100)
            .with_target_satisfaction(0.99)
            .with_max_time(Duration::from_secs(5));

        assert_eq!(stopper.check(10, Duration::ZERO, Some(0.5)), None);
        assert_eq!(
            stopper.check(10, Duration::ZERO, Some(0.995)),
            Some(StopReason::TargetSatisfaction)
        );
        assert_eq!(
            stopper.check(100, Duration::ZERO, None),
            Some(StopReason::MaxEvaluations)
        );
        assert_eq!(
            stopper.check(1, Duration::from_secs(6), Some(0.1)),
            Some(StopReason::MaxTime)
        );
    }

    #[test]
    fn test_remaining_evaluations() {
        assert_eq!(Stopper::max_evaluations(10).remaining_evaluations(4), Some(6));
        assert_eq!(Stopper::max_evaluations(10).remaining_evaluations(12), Some(0));
        assert_eq!(Stopper::target_satisfaction(0.9).remaining_evaluations(4), None);
    }

    #[test]
    fn test_stop_handle_is_shared() {
        let handle = StopHandle::new();
        let clone = handle.clone();
        clone.request_stop();
        assert!(handle.is_requested());
        handle.clear();
        assert!(!clone.is_requested());
    }
}

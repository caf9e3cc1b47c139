//! Search strategies and the bookkeeping the schedule keeps about them.

pub mod directed_step;
pub mod random_search;
pub mod random_shrink;
pub mod simplex;

use std::cmp::Ordering;
use std::fmt;

use crate::problem::{Problem, Trial, TrialPoint};
use crate::schedule::score_board::ScoreBoard;
use crate::schedule::{AlgorithmRun, RunTermination};

pub use directed_step::DirectedStep;
pub use random_search::RandomSearch;
pub use random_shrink::RandomShrinkSearch;
pub use simplex::{SimplexConfig, SimplexSearchAlgorithm};

/// Opaque identity the schedule assigns to each registered algorithm.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AlgorithmId(usize);

impl AlgorithmId {
    pub(crate) fn new(index: usize) -> Self {
        Self(index)
    }

    pub fn index(&self) -> usize {
        self.0
    }
}

impl fmt::Display for AlgorithmId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// What an algorithm sees when the schedule notifies it of an event.
pub struct Context<'a> {
    id: AlgorithmId,
    problem: &'a Problem,
    score_board: &'a ScoreBoard,
}

impl<'a> Context<'a> {
    pub(crate) fn new(id: AlgorithmId, problem: &'a Problem, score_board: &'a ScoreBoard) -> Self {
        Self {
            id,
            problem,
            score_board,
        }
    }

    /// Identity of the algorithm receiving the event.
    pub fn id(&self) -> AlgorithmId {
        self.id
    }

    pub fn problem(&self) -> &'a Problem {
        self.problem
    }

    pub fn score_board(&self) -> &'a ScoreBoard {
        self.score_board
    }
}

/// A pluggable search strategy driven by an
/// [`AlgorithmSchedule`](crate::AlgorithmSchedule).
///
/// The schedule grants the algorithm a bounded number of evaluations at a time
/// through [`perform_run`](SearchAlgorithm::perform_run). Every scored trial,
/// whichever algorithm proposed it, is reported back through the event methods
/// once the run that produced it has finished.
pub trait SearchAlgorithm: Send {
    /// Human readable identity.
    fn label(&self) -> &str;

    /// Forgets all history and starts searching again around `start`.
    fn reset(&mut self, problem: &Problem, start: &TrialPoint);

    /// Proposes and evaluates trial points until the run's budget is spent or
    /// the schedule asks to stop.
    ///
    /// Returning `Err` is a normal early exit; trials already evaluated stay
    /// recorded.
    fn perform_run(&mut self, run: &mut AlgorithmRun<'_>) -> Result<(), RunTermination>;

    fn min_evaluations_per_run(&self) -> usize {
        1
    }

    fn max_evaluations_per_run(&self) -> usize {
        usize::MAX
    }

    /// 0 to 10 rating of how well this algorithm performs on global searches.
    fn global_rating(&self) -> u8;

    /// 0 to 10 rating of how well this algorithm performs on local searches.
    fn local_rating(&self) -> u8;

    /// Whether the schedule may grant this algorithm another run.
    fn is_available(&self) -> bool {
        true
    }

    fn trial_scored(&mut self, _context: &Context<'_>, _trial: &Trial) {}

    fn trial_vetoed(&mut self, _context: &Context<'_>, _trial: &Trial) {}

    /// Called for every new best solution, including those found by this
    /// algorithm.
    fn found_new_optimal_solution(&mut self, _context: &Context<'_>, _solution: &Trial) {}
}

/// Blends an algorithm's global and local ratings into a weight in `[0, 1]`.
///
/// Far from a solution the global rating dominates; as the best satisfaction
/// approaches 1 the local rating takes over.
pub fn rating_weight(global: u8, local: u8, best_satisfaction: f64) -> f64 {
    let best = best_satisfaction.clamp(0.0, 1.0);
    (f64::from(global.min(10)) * (1.0 - best) + f64::from(local.min(10)) * best) / 10.0
}

/// Exponentially weighted improvement per evaluation.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Efficiency {
    value: f64,
}

impl Efficiency {
    const NEW_WEIGHT: f64 = 0.75;

    pub fn value(&self) -> f64 {
        self.value
    }

    /// Folds one run into the estimate.
    ///
    /// The improvement is scaled by the headroom left at the start of the run.
    /// Runs that used no evaluations, or started fully satisfied, leave the
    /// estimate unchanged.
    ///
    /// # Arguments
    ///
    /// * `start` - Best satisfaction when the run started
    /// * `end` - Best satisfaction when the run finished
    /// * `evaluations` - Evaluations consumed by the run
    pub fn record_run(&mut self, start: f64, end: f64, evaluations: usize) {
        if evaluations == 0 || start >= 1.0 || start.is_nan() || end.is_nan() {
            return;
        }
        let gain = ((end - start) / ((1.0 - start) * evaluations as f64)).max(0.0);
        self.value = Self::NEW_WEIGHT * gain + (1.0 - Self::NEW_WEIGHT) * self.value;
    }
}

/// Orders algorithms by descending efficiency, then by label.
pub fn compare_by_efficiency(
    a_efficiency: Efficiency,
    a_label: &str,
    b_efficiency: Efficiency,
    b_label: &str,
) -> Ordering {
    b_efficiency
        .value()
        .total_cmp(&a_efficiency.value())
        .then_with(|| a_label.cmp(b_label))
}

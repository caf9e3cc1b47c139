//! The scheduler that races search algorithms against one problem.

pub mod event;
pub mod score_board;
pub mod stopper;


use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use log::{debug, info, trace, warn};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha20Rng;
#[cfg(feature = "parallel")]
use rayon::prelude::*;
use thiserror::Error;

use crate::algorithm::{
    compare_by_efficiency, rating_weight, AlgorithmId, Context, DirectedStep, Efficiency,
    RandomSearch, RandomShrinkSearch, SearchAlgorithm, SimplexSearchAlgorithm,
};
use crate::error::{Error, Result};
use crate::problem::{Origin, Problem, Trial, TrialPoint};

use event::{Action, Event, Observer};
use score_board::ScoreBoard;
use stopper::{StopHandle, StopReason, Stopper};

/// Why an algorithm's run ended before the algorithm finished on its own.
///
/// Algorithms propagate this with `?` out of
/// [`perform_run`](SearchAlgorithm::perform_run); the schedule treats it as a
/// normal end of the run.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum RunTermination {
    #[error("the run's evaluation budget is spent")]
    BudgetExhausted,

    #[error("the solve is stopping")]
    StopRequested,
}

/// Tuning knobs for an [`AlgorithmSchedule`].
#[derive(Debug, Clone, PartialEq)]
pub struct ScheduleConfig {
    /// Evaluations granted per run, before clamping to the algorithm's limits
    pub evaluations_per_run: usize,
    /// Weight of the algorithms' static ratings next to their measured efficiency
    pub rating_prior: f64,
    /// Seed of the schedule's own selection generator
    pub seed: u64,
    /// Reset every algorithm after this many consecutive runs without improvement
    pub restart_after_stagnant_runs: Option<usize>,
    /// Keep every trial on the score board
    pub record_history: bool,
    /// Log per-algorithm efficiency every this many evaluations
    pub efficiency_report_interval: Option<usize>,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            evaluations_per_run: 100,
            rating_prior: 0.002,
            seed: 0,
            restart_after_stagnant_runs: None,
            record_history: false,
            efficiency_report_interval: None,
        }
    }
}

impl ScheduleConfig {
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] for a zero run size, a negative or
    /// non-finite rating prior, or a zero stagnation limit.
    pub fn validate(&self) -> Result<()> {
        if self.evaluations_per_run == 0 {
            return Err(Error::InvalidConfig(
                "evaluations per run must be positive".to_string(),
            ));
        }
        if !self.rating_prior.is_finite() || self.rating_prior < 0.0 {
            return Err(Error::InvalidConfig(
                "rating prior must be finite and non-negative".to_string(),
            ));
        }
        if self.restart_after_stagnant_runs == Some(0) {
            return Err(Error::InvalidConfig(
                "stagnation limit must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

/// How one algorithm fared during a solve.
#[derive(Debug, Clone, PartialEq)]
pub struct AlgorithmSummary {
    pub id: AlgorithmId,
    pub label: String,
    pub efficiency: f64,
    pub runs: usize,
    pub evaluations: usize,
    pub available: bool,
}

/// Outcome of a solve.
#[derive(Debug, Clone)]
pub struct Solution {
    /// Best trial found; `None` only if nothing could be scored
    pub best: Option<Arc<Trial>>,
    /// Every trial that was the best when it was found, oldest first
    pub optimal_solutions: Vec<Arc<Trial>>,
    /// Every trial, when [`ScheduleConfig::record_history`] is set
    pub history: Option<Vec<Arc<Trial>>>,
    pub stop_reason: StopReason,
    pub evaluations: usize,
    pub elapsed: Duration,
    pub algorithms: Vec<AlgorithmSummary>,
}

impl Solution {
    pub fn best_point(&self) -> Option<&TrialPoint> {
        self.best.as_deref().map(Trial::point)
    }

    /// Satisfaction of the best trial, 0 when there is none.
    pub fn satisfaction(&self) -> f64 {
        self.best.as_ref().map_or(0.0, |best| best.satisfaction())
    }
}

/// State shared by the schedule and the run currently executing.
struct ScheduleCore {
    problem: Arc<Problem>,
    score_board: Arc<ScoreBoard>,
    stopper: Stopper,
    stop: StopHandle,
    pending: VecDeque<Event>,
}

fn score(problem: &Problem, point: TrialPoint, origin: Origin) -> Trial {
    match problem.veto(&point) {
        Some(reason) => Trial::vetoed(point, reason, origin),
        None => {
            let satisfaction = problem.evaluate(&point);
            Trial::scored(point, satisfaction, origin)
        }
    }
}

impl ScheduleCore {
    fn stop_reason(&self) -> Option<StopReason> {
        let best = self
            .score_board
            .best_solution()
            .map(|best| best.satisfaction());
        self.stopper
            .check(self.score_board.evaluations(), self.score_board.elapsed(), best)
            .or_else(|| self.stop.is_requested().then_some(StopReason::Requested))
    }

    fn record(&mut self, trial: Trial) -> Arc<Trial> {
        let (trial, improved) = self.score_board.record(trial);
        if let Some(reason) = trial.veto_reason() {
            warn!("trial {} from {} vetoed: {}", trial.sequence(), trial.origin(), reason);
            self.pending.push_back(Event::TrialVetoed(Arc::clone(&trial)));
            return trial;
        }

        trace!(
            "trial {} from {} scored {}",
            trial.sequence(),
            trial.origin(),
            trial.raw_satisfaction()
        );
        self.pending.push_back(Event::TrialScored(Arc::clone(&trial)));
        if improved {
            debug!(
                "new optimal solution {} from {} at trial {}",
                trial.satisfaction(),
                trial.origin(),
                trial.sequence()
            );
            self.pending
                .push_back(Event::NewOptimalSolution(Arc::clone(&trial)));
        }
        trial
    }
}

/// A bounded run of evaluations granted to one algorithm.
///
/// Every point submitted through [`evaluate`](Self::evaluate) is scored,
/// recorded on the score board and counted against the run's budget. Once the
/// budget is spent or the solve is stopping, `evaluate` returns a
/// [`RunTermination`] instead of scoring.
pub struct AlgorithmRun<'a> {
    core: &'a mut ScheduleCore,
    id: AlgorithmId,
    label: Arc<str>,
    granted: usize,
    evaluations_left: usize,
}

impl<'a> AlgorithmRun<'a> {
    fn new(core: &'a mut ScheduleCore, id: AlgorithmId, label: Arc<str>, granted: usize) -> Self {
        Self {
            core,
            id,
            label,
            granted,
            evaluations_left: granted,
        }
    }

    pub fn id(&self) -> AlgorithmId {
        self.id
    }

    pub fn problem(&self) -> Arc<Problem> {
        Arc::clone(&self.core.problem)
    }

    pub fn score_board(&self) -> &ScoreBoard {
        &self.core.score_board
    }

    pub fn best_solution(&self) -> Option<Arc<Trial>> {
        self.core.score_board.best_solution()
    }

    pub fn granted(&self) -> usize {
        self.granted
    }

    pub fn evaluations_left(&self) -> usize {
        self.evaluations_left
    }

    pub fn evaluations_used(&self) -> usize {
        self.granted - self.evaluations_left
    }

    /// True when no further evaluation would be accepted.
    pub fn should_stop(&self) -> bool {
        self.check(1).is_err()
    }

    fn check(&self, evaluations: usize) -> std::result::Result<(), RunTermination> {
        if self.evaluations_left < evaluations {
            return Err(RunTermination::BudgetExhausted);
        }
        if self.core.stop_reason().is_some() {
            return Err(RunTermination::StopRequested);
        }
        Ok(())
    }

    fn origin(&self) -> Origin {
        Origin::Algorithm {
            id: self.id,
            label: Arc::clone(&self.label),
        }
    }

    /// Scores one point, unless it is vetoed.
    ///
    /// # Errors
    ///
    /// Returns a [`RunTermination`] without evaluating when the run's budget is
    /// spent or the solve is stopping.
    pub fn evaluate(&mut self, point: TrialPoint) -> std::result::Result<Arc<Trial>, RunTermination> {
        self.check(1)?;
        let trial = score(&self.core.problem, point, self.origin());
        self.evaluations_left -= 1;
        Ok(self.core.record(trial))
    }

    /// Scores independent points, in parallel when the `parallel` feature is
    /// enabled, and records them in submission order.
    ///
    /// # Errors
    ///
    /// Evaluates nothing and returns a [`RunTermination`] when the budget cannot
    /// cover every point or the solve is stopping.
    pub fn evaluate_batch(
        &mut self,
        points: Vec<TrialPoint>,
    ) -> std::result::Result<Vec<Arc<Trial>>, RunTermination> {
        self.check(points.len())?;
        let origin = self.origin();
        let problem = Arc::clone(&self.core.problem);

        #[cfg(feature = "parallel")]
        let trials: Vec<Trial> = points
            .into_par_iter()
            .map(|point| score(&problem, point, origin.clone()))
            .collect();
        #[cfg(not(feature = "parallel"))]
        let trials: Vec<Trial> = points
            .into_iter()
            .map(|point| score(&problem, point, origin.clone()))
            .collect();

        self.evaluations_left -= trials.len();
        Ok(trials
            .into_iter()
            .map(|trial| self.core.record(trial))
            .collect())
    }
}

struct AlgorithmSlot {
    id: AlgorithmId,
    label: Arc<str>,
    algorithm: Box<dyn SearchAlgorithm>,
    efficiency: Efficiency,
    runs: usize,
    evaluations: usize,
    available: bool,
    /// Not yet run since the last reset
    fresh: bool,
    /// Score board evaluation count at which a run last used no evaluations
    stalled_at: Option<usize>,
}

impl AlgorithmSlot {
    fn summary(&self) -> AlgorithmSummary {
        AlgorithmSummary {
            id: self.id,
            label: self.label.to_string(),
            efficiency: self.efficiency.value(),
            runs: self.runs,
            evaluations: self.evaluations,
            available: self.available,
        }
    }
}

/// Owns a pool of search algorithms and apportions evaluations between them.
///
/// Each cycle the schedule picks an available algorithm, grants it a run of
/// evaluations and, once the run ends, delivers every queued event to all
/// algorithms and observers in the order the trials were recorded. Algorithms
/// that improve the best solution quickly earn more runs.
///
/// # Examples
///
/// ```
/// use multisolve::{AlgorithmSchedule, Problem, RandomSearch, Stopper, TrialPoint};
///
/// let problem = Problem::builder()
///     .variable("x", 0.0, -1.0, 1.0)
///     .evaluator(|point: &TrialPoint| 1.0 - point.values()[0].abs())
///     .build()
///     .unwrap();
///
/// let mut schedule = AlgorithmSchedule::new(problem, Stopper::max_evaluations(50));
/// schedule.add_algorithm(RandomSearch::new());
/// let solution = schedule.solve().unwrap();
///
/// assert_eq!(solution.evaluations, 50);
/// assert!(solution.satisfaction() >= 0.0);
/// ```
pub struct AlgorithmSchedule {
    slots: Vec<AlgorithmSlot>,
    core: ScheduleCore,
    config: ScheduleConfig,
    observers: Vec<Box<dyn Observer>>,
}

impl AlgorithmSchedule {
    pub fn new(problem: impl Into<Arc<Problem>>, stopper: Stopper) -> Self {
        Self {
            slots: Vec::new(),
            core: ScheduleCore {
                problem: problem.into(),
                score_board: Arc::new(ScoreBoard::new()),
                stopper,
                stop: StopHandle::new(),
                pending: VecDeque::new(),
            },
            config: ScheduleConfig::default(),
            observers: Vec::new(),
        }
    }

    pub fn with_config(mut self, config: ScheduleConfig) -> Self {
        self.config = config;
        self
    }

    /// Adds the four built-in algorithms, seeded from the configured seed.
    pub fn with_default_algorithms(mut self) -> Self {
        let seed = self.config.seed;
        self.add_algorithm(RandomSearch::new().with_seed(seed));
        self.add_algorithm(RandomShrinkSearch::new().with_seed(seed.wrapping_add(1)));
        self.add_algorithm(DirectedStep::new());
        self.add_algorithm(SimplexSearchAlgorithm::new());
        self
    }

    pub fn add_algorithm(&mut self, algorithm: impl SearchAlgorithm + 'static) -> AlgorithmId {
        let id = AlgorithmId::new(self.slots.len());
        self.slots.push(AlgorithmSlot {
            id,
            label: Arc::from(algorithm.label()),
            available: algorithm.is_available(),
            algorithm: Box::new(algorithm),
            efficiency: Efficiency::default(),
            runs: 0,
            evaluations: 0,
            fresh: true,
            stalled_at: None,
        });
        id
    }

    pub fn add_observer(&mut self, observer: impl Observer + 'static) {
        self.observers.push(Box::new(observer));
    }

    /// Handle for stopping the solve from another thread.
    pub fn stop_handle(&self) -> StopHandle {
        self.core.stop.clone()
    }

    /// Live view of the solve's progress.
    pub fn score_board(&self) -> Arc<ScoreBoard> {
        Arc::clone(&self.core.score_board)
    }

    pub fn problem(&self) -> &Problem {
        &self.core.problem
    }

    pub fn config(&self) -> &ScheduleConfig {
        &self.config
    }

    pub fn algorithms(&self) -> Vec<AlgorithmSummary> {
        self.slots.iter().map(AlgorithmSlot::summary).collect()
    }

    /// Runs the algorithms until a stopping criterion fires.
    ///
    /// Each call starts from scratch: the score board, the algorithms and a
    /// stop requested through the [`StopHandle`] are all reset first.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration or stopper is invalid, or if no
    /// algorithm was added.
    pub fn solve(&mut self) -> Result<Solution> {
        self.config.validate()?;
        self.core.stopper.validate()?;
        if self.slots.is_empty() {
            return Err(Error::NoAlgorithms);
        }

        self.core.stop.clear();
        self.core.pending.clear();
        self.core.score_board.reset(
            self.config.record_history,
            self.config.efficiency_report_interval,
        );
        let mut rng = ChaCha20Rng::seed_from_u64(self.config.seed);

        info!(
            "solving {} variables with {} algorithms",
            self.core.problem.dimension(),
            self.slots.len()
        );

        let start = self.core.problem.generate_initial_trial_point();
        for slot in &mut self.slots {
            slot.algorithm.reset(&self.core.problem, &start);
            slot.efficiency = Efficiency::default();
            slot.runs = 0;
            slot.evaluations = 0;
            slot.fresh = true;
            slot.stalled_at = None;
            slot.available = slot.algorithm.is_available();
        }
        if self.core.stop_reason().is_none() {
            let trial = score(&self.core.problem, start, Origin::Initial);
            self.core.record(trial);
            self.dispatch();
        }

        let stop_reason = self.run_loop(&mut rng);

        let board = &self.core.score_board;
        info!(
            "solve finished after {} evaluations: {}",
            board.evaluations(),
            stop_reason
        );
        debug!("{board}");

        Ok(Solution {
            best: board.best_solution(),
            optimal_solutions: board.optimal_solutions(),
            history: board.history(),
            stop_reason,
            evaluations: board.evaluations(),
            elapsed: board.elapsed(),
            algorithms: self.algorithms(),
        })
    }

    fn run_loop(&mut self, rng: &mut ChaCha20Rng) -> StopReason {
        let mut evaluations_at_restart = self.core.score_board.evaluations();
        let mut stagnant_runs = 0;

        loop {
            if let Some(reason) = self.core.stop_reason() {
                return reason;
            }

            let Some(index) = self.select(rng) else {
                if self.core.score_board.evaluations() == evaluations_at_restart {
                    return StopReason::Exhausted;
                }
                info!("no algorithm available, restarting");
                self.restart();
                evaluations_at_restart = self.core.score_board.evaluations();
                stagnant_runs = 0;
                continue;
            };

            let improved = self.execute_run(index);
            self.dispatch();
            self.refresh_availability();

            if improved {
                stagnant_runs = 0;
                continue;
            }
            stagnant_runs += 1;
            if let Some(limit) = self.config.restart_after_stagnant_runs {
                if stagnant_runs >= limit
                    && self.core.score_board.evaluations() > evaluations_at_restart
                {
                    info!("{stagnant_runs} runs without improvement, restarting");
                    self.restart();
                    evaluations_at_restart = self.core.score_board.evaluations();
                    stagnant_runs = 0;
                }
            }
        }
    }

    /// Picks the next algorithm to run, or `None` when none can run.
    ///
    /// Algorithms that have not run since the last reset go first. After that a
    /// roulette wheel weighted by efficiency plus the rating prior decides, or a
    /// uniform draw when every weight is zero.
    fn select(&self, rng: &mut ChaCha20Rng) -> Option<usize> {
        let evaluations = self.core.score_board.evaluations();
        let mut candidates: Vec<usize> = (0..self.slots.len())
            .filter(|&i| {
                let slot = &self.slots[i];
                slot.available && slot.stalled_at != Some(evaluations)
            })
            .collect();
        candidates.sort_by(|&a, &b| {
            let (a, b) = (&self.slots[a], &self.slots[b]);
            compare_by_efficiency(a.efficiency, &a.label, b.efficiency, &b.label)
        });

        if candidates.is_empty() {
            return None;
        }
        if let Some(&fresh) = candidates.iter().find(|&&i| self.slots[i].fresh) {
            return Some(fresh);
        }

        let best = self.core.score_board.best_satisfaction();
        let weights: Vec<f64> = candidates
            .iter()
            .map(|&i| {
                let slot = &self.slots[i];
                let rating = rating_weight(
                    slot.algorithm.global_rating(),
                    slot.algorithm.local_rating(),
                    best,
                );
                slot.efficiency.value() + self.config.rating_prior * rating
            })
            .collect();
        let total: f64 = weights.iter().sum();
        if total <= 0.0 || !total.is_finite() {
            // Nothing to weigh by, so every candidate gets the same chance.
            return candidates.get(rng.gen_range(0..candidates.len())).copied();
        }

        let mut ticket = rng.gen::<f64>() * total;
        for (&index, &weight) in candidates.iter().zip(&weights) {
            if ticket < weight {
                return Some(index);
            }
            ticket -= weight;
        }
        candidates.last().copied()
    }

    /// Grants one run and updates the algorithm's efficiency.
    /// Returns whether the best satisfaction improved.
    fn execute_run(&mut self, index: usize) -> bool {
        let board = Arc::clone(&self.core.score_board);
        let slot = &mut self.slots[index];

        let min = slot.algorithm.min_evaluations_per_run();
        let max = slot.algorithm.max_evaluations_per_run();
        let mut granted = self.config.evaluations_per_run.max(min).min(max);
        if let Some(remaining) = self.core.stopper.remaining_evaluations(board.evaluations()) {
            granted = granted.min(remaining);
        }

        let start = board.best_satisfaction();
        debug!("{} starts a run of {} evaluations", slot.label, granted);
        self.core.pending.push_back(Event::RunWillExecute {
            id: slot.id,
            label: Arc::clone(&slot.label),
            evaluations: granted,
        });

        let mut run = AlgorithmRun::new(&mut self.core, slot.id, Arc::clone(&slot.label), granted);
        let outcome = slot.algorithm.perform_run(&mut run);
        let used = run.evaluations_used();
        if let Err(termination) = outcome {
            debug!("{} run ended early: {}", slot.label, termination);
        }

        let end = board.best_satisfaction();
        slot.efficiency.record_run(start, end, used);
        slot.runs += 1;
        slot.fresh = false;
        slot.evaluations += used;
        slot.stalled_at = (used == 0).then(|| board.evaluations());
        board.record_run_execution();

        debug!(
            "{} used {} of {} evaluations, efficiency {:.6}",
            slot.label,
            used,
            granted,
            slot.efficiency.value()
        );
        self.core.pending.push_back(Event::RunExecuted {
            id: slot.id,
            label: Arc::clone(&slot.label),
            evaluations: used,
            efficiency: slot.efficiency.value(),
        });
        end > start
    }

    /// Delivers queued events to every algorithm, then to the observers.
    fn dispatch(&mut self) {
        while let Some(event) = self.core.pending.pop_front() {
            for slot in &mut self.slots {
                let context = Context::new(slot.id, &self.core.problem, &self.core.score_board);
                match &event {
                    Event::TrialScored(trial) => slot.algorithm.trial_scored(&context, trial),
                    Event::TrialVetoed(trial) => slot.algorithm.trial_vetoed(&context, trial),
                    Event::NewOptimalSolution(trial) => {
                        slot.algorithm.found_new_optimal_solution(&context, trial)
                    }
                    _ => {}
                }
            }
            for observer in &mut self.observers {
                if observer.observe(&event) == Some(Action::StopEarly) {
                    debug!("observer requested stop");
                    self.core.stop.request_stop();
                }
            }
        }
    }

    fn refresh_availability(&mut self) {
        for slot in &mut self.slots {
            let available = slot.algorithm.is_available();
            if available == slot.available {
                continue;
            }
            slot.available = available;
            let (id, label) = (slot.id, Arc::clone(&slot.label));
            debug!(
                "{} is now {}",
                label,
                if available { "available" } else { "unavailable" }
            );
            self.core.pending.push_back(if available {
                Event::AlgorithmAvailable { id, label }
            } else {
                Event::AlgorithmUnavailable { id, label }
            });
        }
        self.dispatch();
    }

    /// Resets every algorithm around the best point found so far.
    fn restart(&mut self) {
        let start = match self.core.score_board.best_solution() {
            Some(best) => best.point().clone(),
            None => self.core.problem.generate_initial_trial_point(),
        };
        for slot in &mut self.slots {
            slot.algorithm.reset(&self.core.problem, &start);
            slot.fresh = true;
            slot.stalled_at = None;
        }
        self.refresh_availability();
    }
}

/// Solves `problem` with the four built-in algorithms and default settings.
///
/// # Examples
///
/// ```
/// use multisolve::{solve, Problem, StopReason, Stopper, TrialPoint};
///
/// let problem = Problem::builder()
///     .variable("x", 1.0, 0.0, 10.0)
///     .variable("y", 1.0, 0.0, 10.0)
///     .evaluator(|point: &TrialPoint| {
///         let values = point.values();
///         let error = (values[0] - 4.0).powi(2) + (values[1] - 6.0).powi(2);
///         1.0 / (1.0 + error)
///     })
///     .build()
///     .unwrap();
///
/// let solution = solve(problem, Stopper::max_evaluations(2_000).with_target_satisfaction(0.999)).unwrap();
/// assert!(solution.satisfaction() > 0.9);
/// ```
///
/// # Errors
///
/// Returns an error if the stopper has no criterion.
pub fn solve(problem: Problem, stopper: Stopper) -> Result<Solution> {
    AlgorithmSchedule::new(problem, stopper)
        .with_default_algorithms()
        .solve()
}

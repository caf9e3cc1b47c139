//! Random search inside per-variable windows that shrink around each
//! improvement.

use log::debug;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha20Rng;

use crate::algorithm::{Context, SearchAlgorithm};
use crate::problem::{DomainHint, Origin, Problem, Trial, TrialPoint, Variable};
use crate::schedule::{AlgorithmRun, RunTermination};

/// Seed used when none is given.
pub const DEFAULT_SEED: u64 = 0x5eed_0002;

/// Probability that the combined searcher draws from the shrinking window
/// rather than the full range.
const SHRINK_THRESHOLD: f64 = 0.9;

/// Window size relative to a variable's change at an improvement.
const WINDOW_SCALE: f64 = 3.0;

/// Fraction of the remaining headroom by which the global best may lead before
/// the search jumps to it.
const LAG_TOLERANCE: f64 = 0.25;

/// Search range for one variable.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Window {
    pub lower: f64,
    pub upper: f64,
}

impl Window {
    fn from_range([lower, upper]: [f64; 2]) -> Self {
        Self { lower, upper }
    }

    fn sample(&self, rng: &mut ChaCha20Rng) -> f64 {
        self.lower + rng.gen::<f64>() * (self.upper - self.lower)
    }

    pub fn width(&self) -> f64 {
        self.upper - self.lower
    }
}

/// Strategy for proposing new values around the current best point.
pub trait Searcher {
    fn propose_value(&mut self, variable: &Variable, rng: &mut ChaCha20Rng) -> f64;

    /// Adapts to a move of the best point from `old` to `new`.
    fn new_top_solution(&mut self, _problem: &Problem, _old: &TrialPoint, _new: &TrialPoint) {}

    /// Makes the next [`new_top_solution`](Searcher::new_top_solution) move the
    /// windows without resizing them.
    fn request_shift(&mut self) {}
}

/// Draws from the variable's full range.
#[derive(Debug, Clone, Copy, Default)]
pub struct RandomSearcher;

impl Searcher for RandomSearcher {
    fn propose_value(&mut self, variable: &Variable, rng: &mut ChaCha20Rng) -> f64 {
        variable.lower_limit() + rng.gen::<f64>() * variable.range()
    }
}

/// Draws from a window per variable that follows the best point.
#[derive(Debug, Clone, PartialEq)]
pub struct ShrinkSearcher {
    windows: Vec<Window>,
    shift: bool,
}

impl ShrinkSearcher {
    /// Initial windows come from the problem's delta hint, else its domain
    /// hint, else the full variable ranges.
    pub fn new(problem: &Problem) -> Self {
        let windows = problem
            .variables()
            .iter()
            .map(|variable| {
                let range = match (problem.initial_delta(), problem.initial_domain()) {
                    (Some(delta), _) => delta.range(variable),
                    (None, Some(domain)) => domain.range(variable),
                    (None, None) => [variable.lower_limit(), variable.upper_limit()],
                };
                Window::from_range(range)
            })
            .collect();
        Self {
            windows,
            shift: false,
        }
    }

    pub fn windows(&self) -> &[Window] {
        &self.windows
    }

    fn shift_windows(&mut self, problem: &Problem, new: &TrialPoint) {
        for (variable, window) in problem.variables().iter().zip(&mut self.windows) {
            let value = new.value(variable);
            let half = window.width() / 2.0;
            window.lower = (value - half).max(variable.lower_limit());
            window.upper = (value + half).min(variable.upper_limit());
        }
    }

    fn shrink_windows(&mut self, problem: &Problem, old: &TrialPoint, new: &TrialPoint) {
        for (variable, window) in problem.variables().iter().zip(&mut self.windows) {
            let new_value = new.value(variable);
            let old_value = old.value(variable);
            if new_value == old_value {
                continue;
            }
            let reach = WINDOW_SCALE * (new_value - old_value).abs();
            window.lower = (new_value - reach).max(variable.lower_limit());
            window.upper = (new_value + reach).min(variable.upper_limit());
        }
    }
}

impl Searcher for ShrinkSearcher {
    fn propose_value(&mut self, variable: &Variable, rng: &mut ChaCha20Rng) -> f64 {
        match self.windows.get(variable.index()) {
            Some(window) => window.sample(rng),
            None => RandomSearcher.propose_value(variable, rng),
        }
    }

    fn new_top_solution(&mut self, problem: &Problem, old: &TrialPoint, new: &TrialPoint) {
        if self.shift {
            self.shift_windows(problem, new);
        } else {
            self.shrink_windows(problem, old, new);
        }
        self.shift = false;
    }

    fn request_shift(&mut self) {
        self.shift = true;
    }
}

/// Draws each value from the shrink window most of the time and from the
/// full range otherwise.
#[derive(Debug, Clone, PartialEq)]
pub struct ComboSearcher {
    shrink: ShrinkSearcher,
}

impl ComboSearcher {
    pub fn new(problem: &Problem) -> Self {
        Self {
            shrink: ShrinkSearcher::new(problem),
        }
    }

    pub fn windows(&self) -> &[Window] {
        self.shrink.windows()
    }
}

impl Searcher for ComboSearcher {
    fn propose_value(&mut self, variable: &Variable, rng: &mut ChaCha20Rng) -> f64 {
        if rng.gen::<f64>() < SHRINK_THRESHOLD {
            self.shrink.propose_value(variable, rng)
        } else {
            RandomSearcher.propose_value(variable, rng)
        }
    }

    fn new_top_solution(&mut self, problem: &Problem, old: &TrialPoint, new: &TrialPoint) {
        self.shrink.new_top_solution(problem, old, new);
    }

    fn request_shift(&mut self) {
        self.shrink.request_shift();
    }
}

/// Changes a random subset of the variables of `base`.
///
/// Each variable changes with probability `1 / n`. If no variable was picked
/// the draw is repeated with a random expected count in `1..=n`.
pub fn next_point<S: Searcher>(
    searcher: &mut S,
    problem: &Problem,
    base: &TrialPoint,
    rng: &mut ChaCha20Rng,
) -> TrialPoint {
    let variables = problem.variables();
    let count = variables.len();
    let mut values = base.values().to_vec();
    let mut expected = 1;

    loop {
        let probability = expected as f64 / count as f64;
        let mut changed = false;
        for variable in variables {
            if rng.gen::<f64>() <= probability {
                values[variable.index()] = searcher.propose_value(variable, rng);
                changed = true;
            }
        }
        if changed {
            return problem.clamped_point(values);
        }
        expected = rng.gen_range(1..=count);
    }
}

/// Adaptive random search around its own best point.
///
/// Every improvement found by this algorithm re-centers the variable windows
/// on the new point with a width proportional to how far each variable moved.
/// If by the end of a run the global best leads this algorithm's best by more
/// than a quarter of the remaining headroom, the windows jump to the global
/// best without resizing.
#[derive(Debug, Clone)]
pub struct RandomShrinkSearch {
    seed: u64,
    rng: ChaCha20Rng,
    searcher: Option<ComboSearcher>,
    best_point: Option<TrialPoint>,
    best_satisfaction: f64,
}

impl Default for RandomShrinkSearch {
    fn default() -> Self {
        Self::new()
    }
}

impl RandomShrinkSearch {
    pub fn new() -> Self {
        Self {
            seed: DEFAULT_SEED,
            rng: ChaCha20Rng::seed_from_u64(DEFAULT_SEED),
            searcher: None,
            best_point: None,
            best_satisfaction: 0.0,
        }
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self.rng = ChaCha20Rng::seed_from_u64(seed);
        self
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Best point this algorithm is searching around.
    pub fn best_point(&self) -> Option<&TrialPoint> {
        self.best_point.as_ref()
    }

    pub fn best_satisfaction(&self) -> f64 {
        self.best_satisfaction
    }

    pub fn windows(&self) -> Option<&[Window]> {
        self.searcher.as_ref().map(ComboSearcher::windows)
    }

    fn next_trial_point(&mut self, problem: &Problem) -> TrialPoint {
        let base = self
            .best_point
            .clone()
            .unwrap_or_else(|| problem.generate_initial_trial_point());
        let searcher = self
            .searcher
            .get_or_insert_with(|| ComboSearcher::new(problem));
        next_point(searcher, problem, &base, &mut self.rng)
    }

    fn move_best(&mut self, problem: &Problem, point: &TrialPoint, satisfaction: f64) {
        let old = self
            .best_point
            .replace(point.clone())
            .unwrap_or_else(|| point.clone());
        self.searcher
            .get_or_insert_with(|| ComboSearcher::new(problem))
            .new_top_solution(problem, &old, point);
        self.best_satisfaction = satisfaction;
    }

    fn consider(&mut self, problem: &Problem, trial: &Trial) {
        if !trial.is_vetoed() && trial.satisfaction() >= self.best_satisfaction {
            self.move_best(problem, trial.point(), trial.satisfaction());
        }
    }

    /// Jumps to the global best when it leads by more than the lag tolerance.
    fn catch_up(&mut self, problem: &Problem, global: Option<&Trial>) {
        let Some(global) = global else {
            return;
        };
        let own = self.best_satisfaction;
        if global.satisfaction() > own + LAG_TOLERANCE * (1.0 - own) {
            debug!(
                "random shrink shifts from {} to the global best {}",
                own,
                global.satisfaction()
            );
            if let Some(searcher) = self.searcher.as_mut() {
                searcher.request_shift();
            }
            self.move_best(problem, global.point(), global.satisfaction());
        }
    }
}

impl SearchAlgorithm for RandomShrinkSearch {
    fn label(&self) -> &str {
        "Random Shrink Search"
    }

    fn reset(&mut self, problem: &Problem, start: &TrialPoint) {
        self.searcher = Some(ComboSearcher::new(problem));
        self.best_point = Some(start.clone());
        self.best_satisfaction = 0.0;
    }

    fn perform_run(&mut self, run: &mut AlgorithmRun<'_>) -> Result<(), RunTermination> {
        let problem = run.problem();
        while !run.should_stop() {
            let last = run.evaluations_left() == 1;
            let point = self.next_trial_point(&problem);
            let trial = run.evaluate(point)?;
            self.consider(&problem, &trial);
            if last {
                self.catch_up(&problem, run.best_solution().as_deref());
            }
        }
        Ok(())
    }

    fn global_rating(&self) -> u8 {
        8
    }

    fn local_rating(&self) -> u8 {
        5
    }

    // Own trials are handled as they are scored; only the schedule's initial
    // point is taken from the broadcast.
    fn trial_scored(&mut self, context: &Context<'_>, trial: &Trial) {
        if *trial.origin() == Origin::Initial {
            self.consider(context.problem(), trial);
        }
    }
}

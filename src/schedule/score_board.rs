use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use log::info;

use crate::problem::Trial;

/// Tracks the best solution found so far and the solve's running statistics.
///
/// The score board is shared between the schedule and anyone holding its
/// [`Arc`], so progress can be read from another thread while a solve runs.
/// All updates happen under one lock: deciding whether a trial beats the
/// current best and replacing it is a single atomic step.
#[derive(Debug)]
pub struct ScoreBoard {
    state: Mutex<State>,
}

#[derive(Debug)]
struct State {
    started: Instant,
    best: Option<Arc<Trial>>,
    optimal_solutions: Vec<Arc<Trial>>,
    history: Option<Vec<Arc<Trial>>>,
    evaluations: usize,
    vetoes: usize,
    run_executions: usize,
    evaluations_log: BTreeMap<String, usize>,
    report: Option<EfficiencyReport>,
}

impl State {
    fn new(record_history: bool, report_interval: Option<usize>) -> Self {
        Self {
            started: Instant::now(),
            best: None,
            optimal_solutions: Vec::new(),
            history: record_history.then(Vec::new),
            evaluations: 0,
            vetoes: 0,
            run_executions: 0,
            evaluations_log: BTreeMap::new(),
            report: report_interval
                .filter(|&interval| interval > 0)
                .map(EfficiencyReport::new),
        }
    }
}

impl Default for ScoreBoard {
    fn default() -> Self {
        Self::new()
    }
}

impl ScoreBoard {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State::new(false, None)),
        }
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Clears everything and restarts the clock.
    pub(crate) fn reset(&self, record_history: bool, report_interval: Option<usize>) {
        *self.lock() = State::new(record_history, report_interval);
    }

    /// Records an evaluated trial.
    ///
    /// Returns the shared trial and whether it became the new best solution.
    /// A trial replaces the best only if its satisfaction is strictly greater;
    /// vetoed trials never do.
    pub(crate) fn record(&self, trial: Trial) -> (Arc<Trial>, bool) {
        let mut guard = self.lock();
        let state = &mut *guard;
        state.evaluations += 1;
        let trial = Arc::new(trial.with_sequence(state.evaluations));

        *state
            .evaluations_log
            .entry(trial.origin().label().to_string())
            .or_insert(0) += 1;
        if let Some(history) = state.history.as_mut() {
            history.push(Arc::clone(&trial));
        }
        if let Some(report) = state.report.as_mut() {
            report.record(&trial, state.evaluations);
        }

        if trial.is_vetoed() {
            state.vetoes += 1;
            return (trial, false);
        }

        let improved = match &state.best {
            Some(best) => trial.satisfaction() > best.satisfaction(),
            None => true,
        };
        if improved {
            state.best = Some(Arc::clone(&trial));
            state.optimal_solutions.push(Arc::clone(&trial));
        }
        (trial, improved)
    }

    pub(crate) fn record_run_execution(&self) {
        self.lock().run_executions += 1;
    }

    pub fn best_solution(&self) -> Option<Arc<Trial>> {
        self.lock().best.clone()
    }

    /// Satisfaction of the best solution, 0 before anything was scored.
    pub fn best_satisfaction(&self) -> f64 {
        self.lock()
            .best
            .as_ref()
            .map_or(0.0, |best| best.satisfaction())
    }

    /// Every solution that was the best when it was found, oldest first.
    pub fn optimal_solutions(&self) -> Vec<Arc<Trial>> {
        self.lock().optimal_solutions.clone()
    }

    /// All recorded trials, when history recording is enabled.
    pub fn history(&self) -> Option<Vec<Arc<Trial>>> {
        self.lock().history.clone()
    }

    pub fn evaluations(&self) -> usize {
        self.lock().evaluations
    }

    pub fn vetoes(&self) -> usize {
        self.lock().vetoes
    }

    pub fn algorithm_executions(&self) -> usize {
        self.lock().run_executions
    }

    pub fn optimal_solutions_found(&self) -> usize {
        self.lock().optimal_solutions.len()
    }

    pub fn elapsed(&self) -> Duration {
        self.lock().started.elapsed()
    }

    /// Evaluations made by each algorithm, keyed by label.
    pub fn evaluations_log(&self) -> BTreeMap<String, usize> {
        self.lock().evaluations_log.clone()
    }
}

impl fmt::Display for ScoreBoard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.lock();
        writeln!(f, "ScoreBoard")?;
        writeln!(f, "Elapsed time: {:.3} s", state.started.elapsed().as_secs_f64())?;
        writeln!(f, "Evaluations: {}", state.evaluations)?;
        writeln!(f, "Vetoes: {}", state.vetoes)?;
        writeln!(f, "Algorithm runs: {}", state.run_executions)?;
        writeln!(f, "Optimal solutions found: {}", state.optimal_solutions.len())?;
        match &state.best {
            Some(best) => {
                writeln!(f, "Best satisfaction: {}", best.satisfaction())?;
                writeln!(f, "Best point: {:?}", best.point().values())?;
                write!(f, "Found by: {}", best.origin())
            }
            None => write!(f, "No solution yet"),
        }
    }
}

#[derive(Debug, Default, Clone, Copy)]
struct Window {
    evaluations: usize,
    initial: f64,
    best: f64,
}

/// Periodic per-algorithm efficiency summary written to the log.
#[derive(Debug)]
struct EfficiencyReport {
    interval: usize,
    pending: usize,
    windows: BTreeMap<String, Window>,
}

impl EfficiencyReport {
    fn new(interval: usize) -> Self {
        Self {
            interval,
            pending: 0,
            windows: BTreeMap::new(),
        }
    }

    fn record(&mut self, trial: &Trial, total_evaluations: usize) {
        self.pending += 1;
        let satisfaction = trial.satisfaction();
        let window = self
            .windows
            .entry(trial.origin().label().to_string())
            .or_default();
        if window.evaluations == 0 {
            window.initial = satisfaction;
            window.best = satisfaction;
        } else {
            window.best = window.best.max(satisfaction);
        }
        window.evaluations += 1;

        if self.pending >= self.interval {
            for (label, window) in &self.windows {
                info!(
                    "efficiency after {} evaluations: {} made {} evaluations, efficiency {:.5}",
                    total_evaluations,
                    label,
                    window.evaluations,
                    window.efficiency()
                );
            }
            self.windows.clear();
            self.pending = 0;
        }
    }
}

impl Window {
    fn efficiency(&self) -> f64 {
        if self.evaluations == 0 || self.initial >= 1.0 {
            return 0.0;
        }
        (self.best - self.initial) / ((1.0 - self.initial) * self.evaluations as f64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::problem::{Origin, TrialPoint};

    fn trial(satisfaction: f64) -> Trial {
        Trial::scored(TrialPoint::new(vec![satisfaction]), satisfaction, Origin::Initial)
    }

    #[test]
    fn test_best_only_replaced_by_strictly_better() {
        let board = ScoreBoard::new();

        assert!(board.record(trial(0.3)).1);
        assert!(!board.record(trial(0.3)).1);
        assert!(!board.record(trial(0.1)).1);
        assert!(board.record(trial(0.6)).1);

        assert_eq!(board.best_satisfaction(), 0.6);
        assert_eq!(board.evaluations(), 4);
        assert_eq!(board.optimal_solutions_found(), 2);
        let sequences: Vec<usize> = board
            .optimal_solutions()
            .iter()
            .map(|trial| trial.sequence())
            .collect();
        assert_eq!(sequences, vec![1, 4]);
    }

    #[test]
    fn test_nan_satisfaction_folds_to_zero() {
        let board = ScoreBoard::new();
        board.record(trial(f64::NAN));
        board.record(trial(f64::NAN));

        let best = board.best_solution().unwrap();
        assert_eq!(best.satisfaction(), 0.0);
        assert!(best.is_failed());
        assert_eq!(board.best_satisfaction(), 0.0);
    }

    #[test]
    fn test_vetoed_trial_never_becomes_best() {
        let board = ScoreBoard::new();
        let vetoed = Trial::vetoed(TrialPoint::new(vec![1.0]), "no".into(), Origin::Initial);

        assert!(!board.record(vetoed).1);
        assert!(board.best_solution().is_none());
        assert_eq!(board.vetoes(), 1);
        assert_eq!(board.evaluations(), 1);
    }

    #[test]
    fn test_history_and_log() {
        let board = ScoreBoard::new();
        board.reset(true, Some(2));
        board.record(trial(0.1));
        board.record(trial(0.2));
        board.record(trial(0.3));

        assert_eq!(board.history().map(|history| history.len()), Some(3));
        assert_eq!(
            board.evaluations_log().get("Initial Algorithm").copied(),
            Some(3)
        );
    }

    #[test]
    fn test_reset_clears_state() {
        let board = ScoreBoard::new();
        board.record(trial(0.5));
        board.record_run_execution();
        board.reset(false, None);

        assert!(board.best_solution().is_none());
        assert_eq!(board.evaluations(), 0);
        assert_eq!(board.algorithm_executions(), 0);
        assert!(board.history().is_none());
    }

    #[test]
    fn test_display_summary() {
        let board = ScoreBoard::new();
        assert!(board.to_string().contains("No solution yet"));
        board.record(trial(0.25));
        let summary = board.to_string();
        assert!(summary.contains("Best satisfaction: 0.25"));
        assert!(summary.contains("Initial Algorithm"));
    }
}

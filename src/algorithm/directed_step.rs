//! Accelerated steepest ascent in the manner of Forsythe and Motzkin.
//!
//! A run takes two gradient steps from the current best point, each followed by
//! a bounded line search. If the second step still improved, one more line
//! search follows the net displacement of both steps.

use log::debug;

use crate::algorithm::{Context, SearchAlgorithm};
use crate::problem::{ExcursionHint, Problem, Trial, TrialPoint};
use crate::schedule::{AlgorithmRun, RunTermination};

/// Samples taken by each line search.
const LINE_SEARCH_STEPS: usize = 10;

/// Golden-section fraction, `(3 - sqrt(5)) / 2`.
const GOLDEN_FRACTION: f64 = 0.381_966;

/// Fits a parabola through three `(scale, satisfaction)` samples and returns
/// its vertex when the parabola opens downward.
pub fn fit_vertex(samples: [(f64, f64); 3]) -> Option<f64> {
    let [(t1, s1), (t2, s2), (t3, s3)] = samples;
    let denominator = (t1 - t2) * (t1 - t3) * (t2 - t3);
    if denominator == 0.0 || !denominator.is_finite() {
        return None;
    }
    let a = (t3 * (s2 - s1) + t2 * (s1 - s3) + t1 * (s3 - s2)) / denominator;
    let b = (t3 * t3 * (s1 - s2) + t2 * t2 * (s3 - s1) + t1 * t1 * (s2 - s3)) / denominator;
    if a >= 0.0 || a.is_nan() {
        return None;
    }
    let vertex = -b / (2.0 * a);
    vertex.is_finite().then_some(vertex)
}

/// Largest scale `t` such that `start + t * direction` stays inside every
/// variable's limits. `None` when the direction is zero.
pub fn max_scale(problem: &Problem, start: &TrialPoint, direction: &[f64]) -> Option<f64> {
    problem
        .variables()
        .iter()
        .zip(direction)
        .filter(|(_, component)| **component != 0.0)
        .map(|(variable, &component)| {
            let value = start.value(variable);
            let limit = if component > 0.0 {
                variable.upper_limit()
            } else {
                variable.lower_limit()
            };
            ((limit - value) / component).max(0.0)
        })
        .min_by(f64::total_cmp)
}

fn displaced(problem: &Problem, start: &TrialPoint, direction: &[f64], scale: f64) -> TrialPoint {
    let values = start
        .values()
        .iter()
        .zip(direction)
        .map(|(value, component)| value + scale * component)
        .collect();
    problem.clamped_point(values)
}

/// Bracketed search along one direction.
struct LineSearch {
    samples: Vec<(f64, f64)>,
    lower: f64,
    upper: f64,
    best_scale: f64,
    best_satisfaction: f64,
}

impl LineSearch {
    fn new(satisfaction: f64, max_scale: f64) -> Self {
        Self {
            samples: vec![(0.0, satisfaction)],
            lower: 0.0,
            upper: max_scale,
            best_scale: 0.0,
            best_satisfaction: satisfaction,
        }
    }

    /// Probes the quadratic vertex when it is usable, otherwise the golden
    /// section of the larger side of the bracket around the best sample.
    fn next_scale(&self) -> f64 {
        if let [.., a, b, c] = self.samples[..] {
            if let Some(vertex) = fit_vertex([a, b, c]) {
                let fresh = self.samples.iter().all(|&(scale, _)| scale != vertex);
                if vertex > self.lower && vertex < self.upper && fresh {
                    return vertex;
                }
            }
        }
        let above = self.upper - self.best_scale;
        let below = self.best_scale - self.lower;
        if above >= below {
            self.best_scale + GOLDEN_FRACTION * above
        } else {
            self.best_scale - GOLDEN_FRACTION * below
        }
    }

    /// Returns true when the sample is the new best.
    fn record(&mut self, scale: f64, satisfaction: f64) -> bool {
        self.samples.push((scale, satisfaction));
        if satisfaction > self.best_satisfaction {
            if scale > self.best_scale {
                self.lower = self.best_scale;
            } else {
                self.upper = self.best_scale;
            }
            self.best_scale = scale;
            self.best_satisfaction = satisfaction;
            true
        } else {
            if scale > self.best_scale {
                self.upper = scale;
            } else {
                self.lower = scale;
            }
            false
        }
    }
}

/// Gradient search with quadratic-fit line searches.
///
/// Finite differences are taken over the problem's excursion hint, or 0.1% of
/// each variable's range without one. A variable whose excursion collapses
/// gets a NaN gradient component and does not move.
#[derive(Debug, Clone, Default)]
pub struct DirectedStep {
    dimension: usize,
    best_point: Option<TrialPoint>,
    last_origin: Option<TrialPoint>,
}

impl DirectedStep {
    pub fn new() -> Self {
        Self::default()
    }

    /// Finite-difference gradient of the satisfaction at `point`.
    fn gradient(
        &self,
        run: &mut AlgorithmRun<'_>,
        problem: &Problem,
        point: &TrialPoint,
    ) -> Result<Vec<f64>, RunTermination> {
        let fallback = ExcursionHint::default();
        let excursion = problem.excursion().unwrap_or(&fallback);

        let mut spans = Vec::new();
        let mut samples = Vec::new();
        for variable in problem.variables() {
            let [lower, upper] = excursion.range(variable, point.value(variable));
            if upper > lower {
                let mut values = point.values().to_vec();
                values[variable.index()] = lower;
                samples.push(problem.clamped_point(values.clone()));
                values[variable.index()] = upper;
                samples.push(problem.clamped_point(values));
            }
            spans.push(upper - lower);
        }

        let trials = run.evaluate_batch(samples)?;
        let mut pairs = trials.chunks(2);
        Ok(spans
            .into_iter()
            .map(|span| {
                if span <= 0.0 {
                    return f64::NAN;
                }
                match pairs.next() {
                    Some([below, above]) => (above.satisfaction() - below.satisfaction()) / span,
                    _ => f64::NAN,
                }
            })
            .collect())
    }

    /// Searches along `direction` from `start` and returns the best point found.
    fn line_search(
        &self,
        run: &mut AlgorithmRun<'_>,
        problem: &Problem,
        start: &TrialPoint,
        satisfaction: f64,
        direction: &[f64],
    ) -> Result<(TrialPoint, f64), RunTermination> {
        let Some(limit) = max_scale(problem, start, direction).filter(|&limit| limit > 0.0) else {
            return Ok((start.clone(), satisfaction));
        };

        let mut search = LineSearch::new(satisfaction, limit);
        let mut best = start.clone();
        for _ in 0..LINE_SEARCH_STEPS {
            let scale = search.next_scale();
            let point = displaced(problem, start, direction, scale);
            let trial = run.evaluate(point)?;
            if search.record(scale, trial.satisfaction()) {
                best = trial.point().clone();
            }
        }
        Ok((best, search.best_satisfaction))
    }

    fn step(
        &self,
        run: &mut AlgorithmRun<'_>,
        problem: &Problem,
        start: &TrialPoint,
        satisfaction: f64,
    ) -> Result<(TrialPoint, f64), RunTermination> {
        let gradient = self.gradient(run, problem, start)?;
        self.line_search(run, problem, start, satisfaction, &ascent_direction(gradient))
    }
}

/// Gradient components that could not be measured do not move.
fn ascent_direction(gradient: Vec<f64>) -> Vec<f64> {
    gradient
        .into_iter()
        .map(|component| if component.is_nan() { 0.0 } else { component })
        .collect()
}

impl SearchAlgorithm for DirectedStep {
    fn label(&self) -> &str {
        "Directed Step"
    }

    fn reset(&mut self, problem: &Problem, _start: &TrialPoint) {
        self.dimension = problem.dimension();
        self.best_point = None;
        self.last_origin = None;
    }

    fn perform_run(&mut self, run: &mut AlgorithmRun<'_>) -> Result<(), RunTermination> {
        let problem = run.problem();
        let (origin, satisfaction) = match run.best_solution() {
            Some(best) => (best.point().clone(), best.satisfaction()),
            None => (problem.generate_initial_trial_point(), 0.0),
        };
        if self.last_origin.as_ref() == Some(&origin) {
            debug!("directed step skipped, best point unchanged since its last run");
            return Ok(());
        }

        // The origin only counts as used once its gradient was measured.
        let gradient = self.gradient(run, &problem, &origin)?;
        self.last_origin = Some(origin.clone());

        let (second, second_satisfaction) = self.line_search(
            run,
            &problem,
            &origin,
            satisfaction,
            &ascent_direction(gradient),
        )?;
        let (third, third_satisfaction) =
            self.step(run, &problem, &second, second_satisfaction)?;
        if third_satisfaction > second_satisfaction {
            let direction: Vec<f64> = third
                .values()
                .iter()
                .zip(origin.values())
                .map(|(end, start)| end - start)
                .collect();
            self.line_search(run, &problem, &third, third_satisfaction, &direction)?;
        }
        Ok(())
    }

    fn min_evaluations_per_run(&self) -> usize {
        4 * self.dimension + 6 * LINE_SEARCH_STEPS
    }

    fn max_evaluations_per_run(&self) -> usize {
        2 * self.min_evaluations_per_run()
    }

    fn global_rating(&self) -> u8 {
        5
    }

    fn local_rating(&self) -> u8 {
        5
    }

    /// Unavailable until the best point moves away from where the previous
    /// run started.
    fn is_available(&self) -> bool {
        match (&self.best_point, &self.last_origin) {
            (Some(best), Some(origin)) => best != origin,
            _ => true,
        }
    }

    fn found_new_optimal_solution(&mut self, _context: &Context<'_>, solution: &Trial) {
        self.best_point = Some(solution.point().clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schedule::stopper::{StopReason, Stopper};
    use crate::schedule::{AlgorithmSchedule, ScheduleConfig};
    use approx::assert_relative_eq;

    fn problem() -> Problem {
        Problem::builder()
            .variable("x", 1.0, 0.0, 4.0)
            .variable("y", 2.0, 2.0, 2.0)
            .evaluator(|point: &TrialPoint| point.values()[0] / 4.0)
            .build()
            .unwrap()
    }

    #[test]
    fn test_fit_vertex_of_concave_parabola() {
        let s = |t: f64| -(t - 1.5).powi(2) + 3.0;
        let vertex = fit_vertex([(0.0, s(0.0)), (1.0, s(1.0)), (4.0, s(4.0))]).unwrap();
        assert_relative_eq!(vertex, 1.5, epsilon = 1e-12);
    }

    #[test]
    fn test_fit_vertex_rejects_convex_and_linear() {
        assert_eq!(fit_vertex([(0.0, 1.0), (1.0, 0.0), (2.0, 1.0)]), None);
        assert_eq!(fit_vertex([(0.0, 0.0), (1.0, 1.0), (2.0, 2.0)]), None);
        assert_eq!(fit_vertex([(1.0, 0.0), (1.0, 1.0), (2.0, 2.0)]), None);
    }

    #[test]
    fn test_max_scale_respects_both_limits() {
        let problem = problem();
        let start = TrialPoint::new(vec![1.0, 2.0]);

        assert_eq!(max_scale(&problem, &start, &[0.5, 0.0]), Some(6.0));
        assert_eq!(max_scale(&problem, &start, &[-2.0, 0.0]), Some(0.5));
        assert_eq!(max_scale(&problem, &start, &[0.0, 0.0]), None);
    }

    #[test]
    fn test_line_search_walks_toward_better_end() {
        let mut search = LineSearch::new(0.0, 1.0);
        let mut scale = 0.0;
        for _ in 0..LINE_SEARCH_STEPS {
            scale = search.next_scale();
            assert!(scale > 0.0 && scale <= 1.0);
            // satisfaction increases with the scale
            search.record(scale, scale);
        }
        assert!(search.best_scale > 0.9);
        assert_eq!(search.best_scale, scale);
    }

    #[test]
    fn test_line_search_brackets_a_peak() {
        let s = |t: f64| 1.0 - (t - 0.3).powi(2);
        let mut search = LineSearch::new(s(0.0), 1.0);
        for _ in 0..LINE_SEARCH_STEPS {
            let scale = search.next_scale();
            search.record(scale, s(scale));
        }
        assert_relative_eq!(search.best_scale, 0.3, epsilon = 1e-6);
    }

    #[test]
    fn test_availability_follows_best_point() {
        let mut step = DirectedStep::new();
        step.reset(&problem(), &TrialPoint::new(vec![1.0, 2.0]));
        assert!(step.is_available());

        let point = TrialPoint::new(vec![1.0, 2.0]);
        step.best_point = Some(point.clone());
        step.last_origin = Some(point);
        assert!(!step.is_available());

        step.best_point = Some(TrialPoint::new(vec![1.5, 2.0]));
        assert!(step.is_available());
        assert_eq!(step.min_evaluations_per_run(), 68);
        assert_eq!(step.max_evaluations_per_run(), 136);
    }

    #[test]
    fn test_unmeasurable_dimensions_stay_put() {
        // y has collapsed limits and z a zero excursion, so neither gradient
        // component can be measured.
        let problem = Problem::builder()
            .variable("x", 2.0, 0.0, 10.0)
            .variable("y", 3.0, 3.0, 3.0)
            .variable("z", 4.0, 0.0, 10.0)
            .hint(ExcursionHint::new().with_excursion("z", 0.0))
            .evaluator(|point: &TrialPoint| {
                let values = point.values();
                (values[0] + values[2]) / 20.0
            })
            .build()
            .unwrap();
        let config = ScheduleConfig {
            record_history: true,
            ..ScheduleConfig::default()
        };
        let mut schedule =
            AlgorithmSchedule::new(problem, Stopper::max_evaluations(300)).with_config(config);
        schedule.add_algorithm(DirectedStep::new());
        let solution = schedule.solve().unwrap();

        let history = solution.history.as_ref().unwrap();
        assert!(history.len() > 1);
        assert!(history.iter().all(|trial| {
            let values = trial.point().values();
            values[1] == 3.0 && values[2] == 4.0
        }));
        assert!(solution.best_point().unwrap().values()[0] > 9.9);
    }

    #[test]
    fn test_short_run_keeps_origin_available() {
        let problem = Problem::builder()
            .variable("x", 2.0, 0.0, 10.0)
            .evaluator(|point: &TrialPoint| point.values()[0] / 10.0)
            .build()
            .unwrap();
        // one evaluation left after the initial point, too few for a gradient
        let mut schedule = AlgorithmSchedule::new(problem, Stopper::max_evaluations(2));
        schedule.add_algorithm(DirectedStep::new());
        let solution = schedule.solve().unwrap();

        assert_eq!(solution.evaluations, 1);
        assert_eq!(solution.stop_reason, StopReason::Exhausted);
        assert_eq!(solution.algorithms[0].evaluations, 0);
        assert!(solution.algorithms[0].available);
    }
}

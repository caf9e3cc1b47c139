//! Nelder-Mead simplex search.
//!
//! Vertices live in an arena indexed by slot; the best-to-worst ordering is an
//! index sort over their scores. A vertex's score is `1 / satisfaction`, so
//! minimizing the score maximizes satisfaction.

use log::debug;

use crate::algorithm::{Context, SearchAlgorithm};
use crate::error::{Error, Result};
use crate::problem::{Problem, Trial, TrialPoint};
use crate::schedule::{AlgorithmRun, RunTermination};

/// Nelder-Mead coefficients.
#[derive(Debug, Clone, PartialEq)]
pub struct SimplexConfig {
    /// Reflection coefficient (rho)
    pub reflection: f64,
    /// Expansion coefficient (chi)
    pub expansion: f64,
    /// Contraction coefficient (gamma)
    pub contraction: f64,
    /// Shrinkage coefficient (sigma)
    pub shrinkage: f64,
    /// Consecutive shrinks after which the search gives up
    pub max_shrinks: usize,
}

impl Default for SimplexConfig {
    fn default() -> Self {
        Self {
            reflection: 1.0,
            expansion: 2.0,
            contraction: 0.5,
            shrinkage: 0.5,
            max_shrinks: 20,
        }
    }
}

impl SimplexConfig {
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] unless reflection is positive,
    /// expansion exceeds 1, contraction and shrinkage lie strictly between 0
    /// and 1, and at least one shrink is allowed.
    pub fn validate(&self) -> Result<()> {
        let valid = self.reflection > 0.0
            && self.reflection.is_finite()
            && self.expansion > 1.0
            && self.expansion.is_finite()
            && self.contraction > 0.0
            && self.contraction < 1.0
            && self.shrinkage > 0.0
            && self.shrinkage < 1.0
            && self.max_shrinks > 0;
        if valid {
            Ok(())
        } else {
            Err(Error::InvalidConfig(format!(
                "invalid simplex coefficients {self:?}"
            )))
        }
    }
}

/// Score of a satisfaction; lower is better.
pub fn vertex_score(satisfaction: f64) -> f64 {
    if satisfaction > 0.0 {
        1.0 / satisfaction
    } else {
        f64::MAX
    }
}

/// Scores a vertex, or returns `None` when the vertex is unusable: outside the
/// variable limits or vetoed.
fn score_vertex(
    run: &mut AlgorithmRun<'_>,
    problem: &Problem,
    coords: &[f64],
) -> std::result::Result<Option<f64>, RunTermination> {
    let point = TrialPoint::new(coords.to_vec());
    if !point.is_within_limits(problem) {
        debug!("simplex vertex {coords:?} is outside the variable limits");
        return Ok(None);
    }
    let trial = run.evaluate(point)?;
    if trial.is_vetoed() {
        debug!("simplex vertex {coords:?} was vetoed");
        return Ok(None);
    }
    Ok(Some(vertex_score(trial.satisfaction())))
}

/// Nelder-Mead search around the best point.
///
/// The search stops itself, and becomes unavailable, when a vertex leaves the
/// variable limits, a vertex is vetoed, or too many consecutive shrinks fail to
/// make progress. A new best point from another algorithm rebuilds the simplex
/// around that point.
#[derive(Debug, Clone)]
pub struct SimplexSearchAlgorithm {
    config: SimplexConfig,
    dimension: usize,
    vertices: Vec<Vec<f64>>,
    scores: Vec<f64>,
    order: Vec<usize>,
    ready: bool,
    want_to_stop: bool,
    shrink_count: usize,
    best_point: Option<TrialPoint>,
    algorithm_changed: bool,
}

impl Default for SimplexSearchAlgorithm {
    fn default() -> Self {
        Self::new()
    }
}

impl SimplexSearchAlgorithm {
    pub fn new() -> Self {
        Self {
            config: SimplexConfig::default(),
            dimension: 0,
            vertices: Vec::new(),
            scores: Vec::new(),
            order: Vec::new(),
            ready: false,
            want_to_stop: true,
            shrink_count: 0,
            best_point: None,
            algorithm_changed: false,
        }
    }

    /// # Errors
    ///
    /// Returns an error if the coefficients are invalid.
    pub fn with_config(config: SimplexConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            ..Self::new()
        })
    }

    pub fn config(&self) -> &SimplexConfig {
        &self.config
    }

    pub fn wants_to_stop(&self) -> bool {
        self.want_to_stop
    }

    /// Vertex coordinates, in arena order.
    pub fn vertices(&self) -> &[Vec<f64>] {
        &self.vertices
    }

    /// Best vertex score so far; `f64::MAX` until the simplex is scored.
    pub fn best_score(&self) -> f64 {
        match (self.ready, self.order.first()) {
            (true, Some(&best)) => self.scores[best],
            _ => f64::MAX,
        }
    }

    /// Builds a fresh simplex with its first vertex at `center`.
    ///
    /// Each further vertex `k` is the mean of the vertices before it, offset
    /// along variable `k - 1` by the initial delta hint or a twentieth of the
    /// variable's range. Offsets that would cross the upper limit point inward.
    fn rebuild(&mut self, problem: &Problem, center: &TrialPoint) {
        let variables = problem.variables();
        let n = variables.len();
        self.dimension = n;
        self.ready = false;
        self.shrink_count = 0;
        self.algorithm_changed = false;
        self.scores = vec![f64::MAX; n + 1];
        self.order = (0..=n).collect();
        self.vertices = Vec::with_capacity(n + 1);
        self.vertices.push(center.values().to_vec());

        for k in 1..=n {
            let mut vertex = vec![0.0; n];
            for previous in &self.vertices {
                for (coord, value) in vertex.iter_mut().zip(previous) {
                    *coord += value / k as f64;
                }
            }
            let variable = &variables[k - 1];
            let step = problem
                .initial_delta()
                .and_then(|hint| hint.delta(variable))
                .unwrap_or(variable.range() / 20.0);
            let forward = vertex[k - 1] + step;
            vertex[k - 1] = if forward > variable.upper_limit() {
                variable.clamp(vertex[k - 1] - step)
            } else {
                forward
            };
            self.vertices.push(vertex);
        }

        self.want_to_stop = n == 0 || center.len() != n;
    }

    fn sort(&mut self) {
        let scores = &self.scores;
        self.order.sort_by(|&a, &b| scores[a].total_cmp(&scores[b]));
    }

    /// `centroid + coefficient * (centroid - worst)`, the centroid taken over
    /// every vertex but the worst.
    fn reflect(&self, coefficient: f64) -> Vec<f64> {
        let n = self.dimension;
        let worst = &self.vertices[self.order[n]];
        (0..n)
            .map(|i| {
                let centroid = self.order[..n]
                    .iter()
                    .map(|&slot| self.vertices[slot][i])
                    .sum::<f64>()
                    / n as f64;
                centroid + coefficient * (centroid - worst[i])
            })
            .collect()
    }

    fn replace_worst(&mut self, coords: Vec<f64>, score: f64) {
        let worst = self.order[self.dimension];
        self.vertices[worst] = coords;
        self.scores[worst] = score;
    }

    /// Pulls every vertex toward the best one.
    fn shrink(&mut self) {
        let sigma = self.config.shrinkage;
        let best = self.vertices[self.order[0]].clone();
        for &slot in &self.order[1..] {
            for (coord, anchor) in self.vertices[slot].iter_mut().zip(&best) {
                *coord = sigma * *coord + (1.0 - sigma) * anchor;
            }
        }
    }

    /// Rebuilds around the best point once another algorithm has outscored
    /// the simplex.
    fn follow_best(&mut self, problem: &Problem) {
        if !self.algorithm_changed {
            return;
        }
        if let Some(best) = self.best_point.clone() {
            self.rebuild(problem, &best);
        }
        self.algorithm_changed = false;
    }

    /// One Nelder-Mead iteration. Returns `Ok(false)` when the search should
    /// stop.
    fn make_step(
        &mut self,
        run: &mut AlgorithmRun<'_>,
        problem: &Problem,
    ) -> std::result::Result<bool, RunTermination> {
        if self.want_to_stop {
            return Ok(false);
        }
        if !self.ready {
            for slot in 0..self.vertices.len() {
                match score_vertex(run, problem, &self.vertices[slot])? {
                    Some(score) => self.scores[slot] = score,
                    None => return Ok(false),
                }
            }
            self.ready = true;
        }
        self.sort();

        let n = self.dimension;
        let SimplexConfig {
            reflection: rho,
            expansion: chi,
            contraction: gamma,
            ..
        } = self.config;
        let best_score = self.scores[self.order[0]];
        let second_worst_score = self.scores[self.order[n - 1]];
        let worst_score = self.scores[self.order[n]];

        let reflected = self.reflect(rho);
        let Some(reflected_score) = score_vertex(run, problem, &reflected)? else {
            return Ok(false);
        };

        if reflected_score < second_worst_score {
            let expanded = self.reflect(rho * chi);
            let Some(expanded_score) = score_vertex(run, problem, &expanded)? else {
                return Ok(false);
            };
            if reflected_score < best_score && expanded_score <= reflected_score {
                self.replace_worst(expanded, expanded_score);
            } else {
                self.replace_worst(reflected, reflected_score);
            }
            self.shrink_count = 0;
        } else {
            let contracted = if reflected_score < worst_score {
                let outside = self.reflect(rho * gamma);
                let Some(score) = score_vertex(run, problem, &outside)? else {
                    return Ok(false);
                };
                (score < reflected_score).then_some((outside, score))
            } else {
                let inside = self.reflect(-gamma);
                let Some(score) = score_vertex(run, problem, &inside)? else {
                    return Ok(false);
                };
                (score < worst_score).then_some((inside, score))
            };

            match contracted {
                Some((coords, score)) => {
                    self.replace_worst(coords, score);
                    self.shrink_count = 0;
                }
                None => {
                    self.shrink();
                    self.shrink_count += 1;
                    self.ready = false;
                    let others = self.order[1..].to_vec();
                    for slot in others {
                        match score_vertex(run, problem, &self.vertices[slot])? {
                            Some(score) => self.scores[slot] = score,
                            None => return Ok(false),
                        }
                    }
                    self.ready = true;
                }
            }
        }

        self.sort();
        if self.shrink_count >= self.config.max_shrinks {
            debug!(
                "simplex stops after {} consecutive shrinks",
                self.shrink_count
            );
            return Ok(false);
        }
        Ok(true)
    }
}

impl SearchAlgorithm for SimplexSearchAlgorithm {
    fn label(&self) -> &str {
        "Simplex Search"
    }

    fn reset(&mut self, problem: &Problem, start: &TrialPoint) {
        self.rebuild(problem, start);
    }

    fn perform_run(&mut self, run: &mut AlgorithmRun<'_>) -> std::result::Result<(), RunTermination> {
        let problem = run.problem();
        while !run.should_stop() {
            self.follow_best(&problem);
            if self.want_to_stop {
                break;
            }

            let before = run.evaluations_left();
            if !self.make_step(run, &problem)? {
                debug!("simplex search wants to stop");
                self.want_to_stop = true;
            }
            if run.evaluations_left() == before {
                break;
            }
        }
        Ok(())
    }

    fn min_evaluations_per_run(&self) -> usize {
        if self.want_to_stop {
            0
        } else {
            5 * (self.dimension + 1) + 40
        }
    }

    fn max_evaluations_per_run(&self) -> usize {
        if self.want_to_stop {
            0
        } else {
            8 * (self.dimension + 40)
        }
    }

    fn global_rating(&self) -> u8 {
        3
    }

    fn local_rating(&self) -> u8 {
        5
    }

    fn is_available(&self) -> bool {
        !self.want_to_stop
    }

    fn trial_scored(&mut self, context: &Context<'_>, trial: &Trial) {
        if !trial.is_from(context.id()) && vertex_score(trial.satisfaction()) < self.best_score() {
            self.algorithm_changed = true;
        }
    }

    fn trial_vetoed(&mut self, context: &Context<'_>, trial: &Trial) {
        if trial.is_from(context.id()) {
            self.want_to_stop = true;
        }
    }

    fn found_new_optimal_solution(&mut self, context: &Context<'_>, solution: &Trial) {
        self.best_point = Some(solution.point().clone());
        if !solution.is_from(context.id()) {
            self.rebuild(context.problem(), solution.point());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algorithm::AlgorithmId;
    use crate::problem::{InitialDelta, Origin};
    use crate::schedule::event::{Action, Event};
    use crate::schedule::score_board::ScoreBoard;
    use crate::schedule::stopper::{StopReason, Stopper};
    use crate::schedule::AlgorithmSchedule;
    use approx::assert_relative_eq;
    use std::sync::Arc;

    fn problem() -> Problem {
        Problem::builder()
            .variable("x", 5.0, 0.0, 10.0)
            .variable("y", 5.0, 0.0, 10.0)
            .evaluator(|_: &TrialPoint| 0.5)
            .build()
            .unwrap()
    }

    fn stop_when_unavailable(event: &Event) -> Option<Action> {
        matches!(event, Event::AlgorithmUnavailable { .. }).then_some(Action::StopEarly)
    }

    fn trial(point: Vec<f64>, satisfaction: f64, id: usize) -> Trial {
        Trial::scored(
            TrialPoint::new(point),
            satisfaction,
            Origin::Algorithm {
                id: AlgorithmId::new(id),
                label: Arc::from("Test"),
            },
        )
    }

    #[test]
    fn test_initial_simplex() {
        let mut simplex = SimplexSearchAlgorithm::new();
        assert!(simplex.wants_to_stop());

        simplex.reset(&problem(), &TrialPoint::new(vec![5.0, 5.0]));
        assert!(!simplex.wants_to_stop());
        assert!(simplex.is_available());

        let vertices = simplex.vertices();
        assert_eq!(vertices.len(), 3);
        assert_eq!(vertices[0], vec![5.0, 5.0]);
        assert_eq!(vertices[1], vec![5.5, 5.0]);
        assert_relative_eq!(vertices[2][0], 5.25);
        assert_relative_eq!(vertices[2][1], 5.5);
    }

    #[test]
    fn test_initial_step_points_inward_at_upper_limit() {
        let problem = Problem::builder()
            .variable("x", 10.0, 0.0, 10.0)
            .hint(InitialDelta::new().with_delta("x", 2.0))
            .evaluator(|_: &TrialPoint| 0.5)
            .build()
            .unwrap();
        let mut simplex = SimplexSearchAlgorithm::new();
        simplex.reset(&problem, &TrialPoint::new(vec![10.0]));
        assert_eq!(simplex.vertices()[1], vec![8.0]);
    }

    #[test]
    fn test_reflection_through_centroid() {
        let mut simplex = SimplexSearchAlgorithm::new();
        simplex.reset(&problem(), &TrialPoint::new(vec![5.0, 5.0]));
        simplex.vertices = vec![vec![0.0, 0.0], vec![2.0, 0.0], vec![1.0, 3.0]];
        simplex.scores = vec![1.0, 2.0, 3.0];
        simplex.sort();

        // centroid (1, 0), worst (1, 3)
        assert_eq!(simplex.reflect(1.0), vec![1.0, -3.0]);
        assert_eq!(simplex.reflect(2.0), vec![1.0, -6.0]);
        assert_eq!(simplex.reflect(-0.5), vec![1.0, 1.5]);
    }

    #[test]
    fn test_index_sort_orders_by_score() {
        let mut simplex = SimplexSearchAlgorithm::new();
        simplex.reset(&problem(), &TrialPoint::new(vec![5.0, 5.0]));
        simplex.scores = vec![3.0, f64::MAX, 1.5];
        simplex.sort();
        assert_eq!(simplex.order, vec![2, 0, 1]);

        simplex.replace_worst(vec![9.0, 9.0], 1.0);
        assert_eq!(simplex.vertices()[1], vec![9.0, 9.0]);
        simplex.sort();
        assert_eq!(simplex.order, vec![1, 2, 0]);
    }

    #[test]
    fn test_shrink_toward_best() {
        let mut simplex = SimplexSearchAlgorithm::new();
        simplex.reset(&problem(), &TrialPoint::new(vec![5.0, 5.0]));
        simplex.vertices = vec![vec![0.0, 0.0], vec![2.0, 0.0], vec![0.0, 4.0]];
        simplex.scores = vec![1.0, 2.0, 3.0];
        simplex.sort();
        simplex.shrink();
        assert_eq!(
            simplex.vertices(),
            &[vec![0.0, 0.0], vec![1.0, 0.0], vec![0.0, 2.0]]
        );
    }

    #[test]
    fn test_vertex_score() {
        assert_eq!(vertex_score(0.5), 2.0);
        assert_eq!(vertex_score(1.0), 1.0);
        assert_eq!(vertex_score(0.0), f64::MAX);
    }

    #[test]
    fn test_evaluation_limits() {
        let mut simplex = SimplexSearchAlgorithm::new();
        assert_eq!(simplex.min_evaluations_per_run(), 0);
        assert_eq!(simplex.max_evaluations_per_run(), 0);

        simplex.reset(&problem(), &TrialPoint::new(vec![5.0, 5.0]));
        assert_eq!(simplex.min_evaluations_per_run(), 55);
        assert_eq!(simplex.max_evaluations_per_run(), 336);
    }

    #[test]
    fn test_config_validation() {
        assert!(SimplexConfig::default().validate().is_ok());
        let config = SimplexConfig {
            contraction: 1.5,
            ..SimplexConfig::default()
        };
        assert!(SimplexSearchAlgorithm::with_config(config).is_err());
    }

    #[test]
    fn test_stops_after_consecutive_shrinks() {
        let mut schedule = AlgorithmSchedule::new(problem(), Stopper::max_evaluations(1_000));
        schedule.add_algorithm(SimplexSearchAlgorithm::new());
        schedule.add_observer(stop_when_unavailable);
        let solution = schedule.solve().unwrap();

        assert_eq!(solution.stop_reason, StopReason::Requested);
        assert_eq!(solution.algorithms[0].runs, 1);
        assert!(!solution.algorithms[0].available);
        // a flat surface never accepts a move: three vertices, then twenty steps
        // of reflection, contraction and two rescored vertices
        assert_eq!(solution.evaluations, 1 + 3 + 20 * 4);
    }

    #[test]
    fn test_stops_when_reflection_leaves_limits() {
        let problem = Problem::builder()
            .variable("x", 0.0, 0.0, 10.0)
            .evaluator(|point: &TrialPoint| 1.0 - point.values()[0] / 10.0)
            .build()
            .unwrap();
        let mut schedule = AlgorithmSchedule::new(problem, Stopper::max_evaluations(1_000));
        schedule.add_algorithm(SimplexSearchAlgorithm::new());
        schedule.add_observer(stop_when_unavailable);
        let solution = schedule.solve().unwrap();

        // vertices 0 and 0.5 are scored, the reflection to -0.5 is rejected
        assert_eq!(solution.evaluations, 3);
        assert_eq!(solution.stop_reason, StopReason::Requested);
        assert!(!solution.algorithms[0].available);
        assert_eq!(solution.best_point(), Some(&TrialPoint::new(vec![0.0])));
    }

    #[test]
    fn test_rebuilds_around_foreign_optimum() {
        let problem = problem();
        let board = ScoreBoard::new();
        let context = Context::new(AlgorithmId::new(0), &problem, &board);
        let mut simplex = SimplexSearchAlgorithm::new();
        simplex.reset(&problem, &TrialPoint::new(vec![5.0, 5.0]));

        simplex.found_new_optimal_solution(&context, &trial(vec![6.0, 6.0], 0.7, 0));
        assert_eq!(simplex.vertices()[0], vec![5.0, 5.0]);
        assert_eq!(simplex.best_point, Some(TrialPoint::new(vec![6.0, 6.0])));

        simplex.want_to_stop = true;
        simplex.found_new_optimal_solution(&context, &trial(vec![2.0, 8.0], 0.8, 1));
        assert_eq!(simplex.vertices()[0], vec![2.0, 8.0]);
        assert_eq!(simplex.vertices()[1], vec![2.5, 8.0]);
        assert!(!simplex.wants_to_stop());
        assert!(simplex.is_available());
    }

    #[test]
    fn test_better_foreign_trial_rebuilds_at_best_point() {
        let problem = problem();
        let board = ScoreBoard::new();
        let context = Context::new(AlgorithmId::new(0), &problem, &board);
        let mut simplex = SimplexSearchAlgorithm::new();
        simplex.reset(&problem, &TrialPoint::new(vec![5.0, 5.0]));
        simplex.scores = vec![2.0, 3.0, 4.0];
        simplex.ready = true;
        simplex.sort();
        simplex.found_new_optimal_solution(&context, &trial(vec![6.0, 6.0], 0.5, 0));

        simplex.trial_scored(&context, &trial(vec![1.0, 1.0], 0.9, 0));
        assert!(!simplex.algorithm_changed);
        simplex.trial_scored(&context, &trial(vec![1.0, 1.0], 0.4, 1));
        assert!(!simplex.algorithm_changed);
        simplex.trial_scored(&context, &trial(vec![1.0, 1.0], 0.8, 1));
        assert!(simplex.algorithm_changed);

        simplex.follow_best(&problem);
        assert!(!simplex.algorithm_changed);
        assert_eq!(simplex.vertices()[0], vec![6.0, 6.0]);
        assert_eq!(simplex.best_score(), f64::MAX);
    }

    #[test]
    fn test_own_veto_stops_search() {
        let problem = problem();
        let board = ScoreBoard::new();
        let context = Context::new(AlgorithmId::new(0), &problem, &board);
        let mut simplex = SimplexSearchAlgorithm::new();
        simplex.reset(&problem, &TrialPoint::new(vec![5.0, 5.0]));
        let vetoed = |id| {
            Trial::vetoed(
                TrialPoint::new(vec![1.0, 1.0]),
                "no".into(),
                Origin::Algorithm {
                    id: AlgorithmId::new(id),
                    label: Arc::from("Test"),
                },
            )
        };

        simplex.trial_vetoed(&context, &vetoed(1));
        assert!(!simplex.wants_to_stop());
        simplex.trial_vetoed(&context, &vetoed(0));
        assert!(simplex.wants_to_stop());
        assert!(!simplex.is_available());
    }
}

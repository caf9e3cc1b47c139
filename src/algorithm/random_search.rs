use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha20Rng;

use crate::algorithm::SearchAlgorithm;
use crate::problem::{Problem, TrialPoint};
use crate::schedule::{AlgorithmRun, RunTermination};

/// Seed used when none is given, so default runs are reproducible.
pub const DEFAULT_SEED: u64 = 0x5eed_0001;

/// Draws every variable independently and uniformly from its full range.
#[derive(Debug, Clone)]
pub struct RandomSearch {
    seed: u64,
    rng: ChaCha20Rng,
}

impl Default for RandomSearch {
    fn default() -> Self {
        Self::new()
    }
}

impl RandomSearch {
    pub fn new() -> Self {
        Self {
            seed: DEFAULT_SEED,
            rng: ChaCha20Rng::seed_from_u64(DEFAULT_SEED),
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

    fn next_trial_point(&mut self, problem: &Problem) -> TrialPoint {
        let values = problem
            .variables()
            .iter()
            .map(|variable| {
                let lower = variable.lower_limit();
                lower + self.rng.gen::<f64>() * variable.range()
            })
            .collect();
        problem.clamped_point(values)
    }
}

impl SearchAlgorithm for RandomSearch {
    fn label(&self) -> &str {
        "Random Search"
    }

    fn reset(&mut self, _problem: &Problem, _start: &TrialPoint) {}

    fn perform_run(&mut self, run: &mut AlgorithmRun<'_>) -> Result<(), RunTermination> {
        let problem = run.problem();
        while !run.should_stop() {
            let point = self.next_trial_point(&problem);
            run.evaluate(point)?;
        }
        Ok(())
    }

    fn global_rating(&self) -> u8 {
        10
    }

    fn local_rating(&self) -> u8 {
        0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn problem() -> Problem {
        Problem::builder()
            .variable("x", 0.0, -2.0, 3.0)
            .variable("y", 5.0, 5.0, 5.0)
            .evaluator(|_: &TrialPoint| 0.5)
            .build()
            .unwrap()
    }

    #[test]
    fn test_points_stay_within_limits() {
        let problem = problem();
        let mut search = RandomSearch::new();
        for _ in 0..1000 {
            let point = search.next_trial_point(&problem);
            assert!(point.is_within_limits(&problem));
            assert_eq!(point.values()[1], 5.0);
        }
    }

    #[test]
    fn test_same_seed_same_points() {
        let problem = problem();
        let mut a = RandomSearch::new().with_seed(42);
        let mut b = RandomSearch::new().with_seed(42);
        let mut c = RandomSearch::new().with_seed(43);

        let first = a.next_trial_point(&problem);
        assert_eq!(first, b.next_trial_point(&problem));
        assert_ne!(first, c.next_trial_point(&problem));
    }

    #[test]
    fn test_ratings() {
        let search = RandomSearch::default();
        assert_eq!(search.global_rating(), 10);
        assert_eq!(search.local_rating(), 0);
        assert_eq!(search.seed(), DEFAULT_SEED);
    }
}

//! The optimization problem handed to every search algorithm.

pub mod hint;
mod trial;
mod trial_point;
mod variable;

use std::collections::{HashMap, HashSet};
use std::fmt;

pub use hint::{DomainHint, ExcursionHint, Hint, HintKind, InitialDelta, InitialDomain};
pub use trial::{fold_satisfaction, Origin, Trial};
pub use trial_point::{TrialPoint, TrialPointBuilder};
pub use variable::Variable;

use crate::error::{Error, Result};

/// Scores trial points.
///
/// Satisfaction lies in `[0, 1]` with 1 meaning fully satisfied. Returning NaN
/// signals a failed evaluation; it is treated as "no useful score" rather than
/// an error. The evaluator may be called from several threads at once.
pub trait Evaluator: Send + Sync {
    /// Evaluates the satisfaction at the given point.
    fn evaluate(&self, point: &TrialPoint) -> f64;

    /// Rejects an infeasible point before it is evaluated.
    /// Returns the reason for the veto, or `None` to accept the point.
    fn veto(&self, _point: &TrialPoint) -> Option<String> {
        None
    }
}

impl<F> Evaluator for F
where
    F: Fn(&TrialPoint) -> f64 + Send + Sync,
{
    fn evaluate(&self, point: &TrialPoint) -> f64 {
        self(point)
    }
}

/// Ordered variables, an evaluator and optional search hints.
///
/// # Examples
///
/// ```
/// use multisolve::{InitialDelta, Problem, TrialPoint};
///
/// let problem = Problem::builder()
///     .variable("x", 0.0, -5.0, 5.0)
///     .variable("y", 0.0, -5.0, 5.0)
///     .hint(InitialDelta::new().with_delta("x", 1.0))
///     .evaluator(|point: &TrialPoint| {
///         let error: f64 = point.values().iter().map(|v| (v - 1.0).powi(2)).sum();
///         1.0 / (1.0 + error)
///     })
///     .build()
///     .unwrap();
///
/// let start = problem.generate_initial_trial_point();
/// assert_eq!(problem.evaluate(&start), 1.0 / 3.0);
/// ```
pub struct Problem {
    variables: Vec<Variable>,
    evaluator: Box<dyn Evaluator>,
    hints: HashMap<HintKind, Hint>,
}

impl Problem {
    pub fn builder() -> ProblemBuilder {
        ProblemBuilder::default()
    }

    pub fn variables(&self) -> &[Variable] {
        &self.variables
    }

    pub fn variable(&self, name: &str) -> Option<&Variable> {
        self.variables.iter().find(|variable| variable.name() == name)
    }

    pub fn dimension(&self) -> usize {
        self.variables.len()
    }

    /// The point made of every variable's initial value.
    pub fn generate_initial_trial_point(&self) -> TrialPoint {
        TrialPoint::new(
            self.variables
                .iter()
                .map(Variable::initial_value)
                .collect(),
        )
    }

    /// Builds a point from raw values, clamping each into its variable's limits.
    pub fn clamped_point(&self, values: Vec<f64>) -> TrialPoint {
        TrialPoint::new(values).clamped(self)
    }

    /// Raw satisfaction at `point`; NaN when evaluation failed.
    pub fn evaluate(&self, point: &TrialPoint) -> f64 {
        self.evaluator.evaluate(point)
    }

    pub fn veto(&self, point: &TrialPoint) -> Option<String> {
        self.evaluator.veto(point)
    }

    pub fn hint(&self, kind: HintKind) -> Option<&Hint> {
        self.hints.get(&kind)
    }

    pub fn initial_domain(&self) -> Option<&InitialDomain> {
        match self.hint(HintKind::InitialDomain) {
            Some(Hint::InitialDomain(hint)) => Some(hint),
            _ => None,
        }
    }

    pub fn initial_delta(&self) -> Option<&InitialDelta> {
        match self.hint(HintKind::InitialDelta) {
            Some(Hint::InitialDelta(hint)) => Some(hint),
            _ => None,
        }
    }

    pub fn excursion(&self) -> Option<&ExcursionHint> {
        match self.hint(HintKind::Excursion) {
            Some(Hint::Excursion(hint)) => Some(hint),
            _ => None,
        }
    }
}

impl fmt::Debug for Problem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Problem")
            .field("variables", &self.variables)
            .field("hints", &self.hints)
            .finish_non_exhaustive()
    }
}

/// Builder for [`Problem`]. Variables keep the order in which they are added.
#[derive(Default)]
pub struct ProblemBuilder {
    variables: Vec<(String, f64, f64, f64)>,
    evaluator: Option<Box<dyn Evaluator>>,
    hints: HashMap<HintKind, Hint>,
}

impl ProblemBuilder {
    /// Adds a variable; it is validated when the problem is built.
    pub fn variable(
        mut self,
        name: impl Into<String>,
        initial_value: f64,
        lower_limit: f64,
        upper_limit: f64,
    ) -> Self {
        self.variables
            .push((name.into(), initial_value, lower_limit, upper_limit));
        self
    }

    pub fn evaluator(mut self, evaluator: impl Evaluator + 'static) -> Self {
        self.evaluator = Some(Box::new(evaluator));
        self
    }

    /// Attaches a hint, replacing any earlier hint of the same kind.
    pub fn hint(mut self, hint: impl Into<Hint>) -> Self {
        let hint = hint.into();
        self.hints.insert(hint.kind(), hint);
        self
    }

    /// Validates the variables and assembles the problem.
    ///
    /// # Errors
    ///
    /// Returns an error if there are no variables, a variable is invalid or
    /// duplicated, or no evaluator was supplied.
    pub fn build(self) -> Result<Problem> {
        if self.variables.is_empty() {
            return Err(Error::EmptyProblem);
        }

        let mut names = HashSet::new();
        let mut variables = Vec::with_capacity(self.variables.len());
        for (index, (name, initial, lower, upper)) in self.variables.into_iter().enumerate() {
            if !names.insert(name.clone()) {
                return Err(Error::DuplicateVariable(name));
            }
            variables.push(Variable::new(name, initial, lower, upper)?.with_index(index));
        }

        let evaluator = self.evaluator.ok_or(Error::MissingEvaluator)?;

        Ok(Problem {
            variables,
            evaluator,
            hints: self.hints,
        })
    }
}

use std::collections::HashMap;

use crate::error::{Error, Result};
use crate::problem::{Problem, Variable};

/// An immutable assignment of one value to every variable of a problem.
///
/// Values are stored in the problem's variable order. They are kept exactly as
/// given; keeping them inside the variable limits is up to whoever proposes the
/// point.
#[derive(Debug, Clone, PartialEq)]
pub struct TrialPoint {
    values: Vec<f64>,
}

impl TrialPoint {
    /// Creates a trial point from values listed in variable order.
    pub fn new(values: Vec<f64>) -> Self {
        Self { values }
    }

    /// Creates a trial point from values keyed by variable name.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownVariable`] for a name the problem does not define
    /// and [`Error::MissingValue`] when a problem variable has no value.
    pub fn from_map(problem: &Problem, values: &HashMap<String, f64>) -> Result<Self> {
        if let Some(name) = values.keys().find(|name| problem.variable(name).is_none()) {
            return Err(Error::UnknownVariable(name.clone()));
        }

        let mut builder = TrialPointBuilder::new(problem.dimension());
        for variable in problem.variables() {
            if let Some(&value) = values.get(variable.name()) {
                builder.set(variable, value);
            }
        }
        builder.build(problem)
    }

    /// Value assigned to `variable`.
    ///
    /// # Panics
    ///
    /// Panics if the variable belongs to a problem with more variables than this
    /// point holds.
    pub fn value(&self, variable: &Variable) -> f64 {
        self.values[variable.index()]
    }

    pub fn get(&self, variable: &Variable) -> Option<f64> {
        self.values.get(variable.index()).copied()
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Values keyed by variable name.
    pub fn value_map(&self, problem: &Problem) -> HashMap<String, f64> {
        problem
            .variables()
            .iter()
            .filter_map(|variable| {
                self.get(variable)
                    .map(|value| (variable.name().to_string(), value))
            })
            .collect()
    }

    /// Copy of this point with each value clamped into its variable's limits.
    pub fn clamped(&self, problem: &Problem) -> Self {
        let values = problem
            .variables()
            .iter()
            .zip(self.values.iter())
            .map(|(variable, &value)| variable.clamp(value))
            .collect();
        Self { values }
    }

    /// True when every value lies within its variable's limits.
    pub fn is_within_limits(&self, problem: &Problem) -> bool {
        self.values.len() == problem.dimension()
            && problem
                .variables()
                .iter()
                .zip(self.values.iter())
                .all(|(variable, &value)| variable.contains(value))
    }

    /// Euclidean distance to another point of the same dimension.
    pub fn distance(&self, other: &TrialPoint) -> f64 {
        self.values
            .iter()
            .zip(other.values.iter())
            .map(|(a, b)| (a - b) * (a - b))
            .sum::<f64>()
            .sqrt()
    }
}

/// Mutable builder used while a trial point is being assembled.
#[derive(Debug, Clone)]
pub struct TrialPointBuilder {
    values: Vec<Option<f64>>,
}

impl TrialPointBuilder {
    pub fn new(dimension: usize) -> Self {
        Self {
            values: vec![None; dimension],
        }
    }

    /// Starts from an existing point; every value is already set.
    pub fn from_point(point: &TrialPoint) -> Self {
        Self {
            values: point.values.iter().copied().map(Some).collect(),
        }
    }

    pub fn set(&mut self, variable: &Variable, value: f64) -> &mut Self {
        if let Some(slot) = self.values.get_mut(variable.index()) {
            *slot = Some(value);
        }
        self
    }

    /// Freezes the builder into a trial point.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DimensionMismatch`] if the builder was sized for a
    /// different problem and [`Error::MissingValue`] if a variable was never set.
    pub fn build(self, problem: &Problem) -> Result<TrialPoint> {
        if self.values.len() != problem.dimension() {
            return Err(Error::DimensionMismatch {
                expected: problem.dimension(),
                found: self.values.len(),
            });
        }

        let mut values = Vec::with_capacity(self.values.len());
        for (variable, value) in problem.variables().iter().zip(self.values) {
            match value {
                Some(value) => values.push(value),
                None => return Err(Error::MissingValue(variable.name().to_string())),
            }
        }
        Ok(TrialPoint { values })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn problem() -> Problem {
        Problem::builder()
            .variable("x", 1.0, 0.0, 10.0)
            .variable("y", -2.0, -5.0, 5.0)
            .evaluator(|_: &TrialPoint| 0.5)
            .build()
            .unwrap()
    }

    #[test]
    fn test_from_map_reads_back_exact_values() {
        let problem = problem();
        let values = HashMap::from([("x".to_string(), 0.1 + 0.2), ("y".to_string(), -1e-300)]);

        let point = TrialPoint::from_map(&problem, &values).unwrap();

        for variable in problem.variables() {
            assert_eq!(point.value(variable), values[variable.name()]);
        }
        assert_eq!(point.value_map(&problem), values);
    }

    #[test]
    fn test_from_map_keeps_out_of_range_values() {
        let problem = problem();
        let values = HashMap::from([("x".to_string(), 42.0), ("y".to_string(), 0.0)]);

        let point = TrialPoint::from_map(&problem, &values).unwrap();

        assert_eq!(point.values(), &[42.0, 0.0]);
        assert!(!point.is_within_limits(&problem));
        assert_eq!(point.clamped(&problem).values(), &[10.0, 0.0]);
    }

    #[test]
    fn test_from_map_errors() {
        let problem = problem();

        let missing = HashMap::from([("x".to_string(), 1.0)]);
        assert_eq!(
            TrialPoint::from_map(&problem, &missing),
            Err(Error::MissingValue("y".to_string()))
        );

        let unknown = HashMap::from([
            ("x".to_string(), 1.0),
            ("y".to_string(), 1.0),
            ("z".to_string(), 1.0),
        ]);
        assert_eq!(
            TrialPoint::from_map(&problem, &unknown),
            Err(Error::UnknownVariable("z".to_string()))
        );
    }

    #[test]
    fn test_builder_from_point() {
        let problem = problem();
        let base = problem.generate_initial_trial_point();
        let mut builder = TrialPointBuilder::from_point(&base);
        builder.set(&problem.variables()[1], 3.0);

        let point = builder.build(&problem).unwrap();

        assert_eq!(point.values(), &[1.0, 3.0]);
        assert_eq!(base.values(), &[1.0, -2.0]);
    }

    #[test]
    fn test_builder_dimension_mismatch() {
        let problem = problem();
        let builder = TrialPointBuilder::new(3);
        assert_eq!(
            builder.build(&problem),
            Err(Error::DimensionMismatch {
                expected: 2,
                found: 3
            })
        );
    }

    #[test]
    fn test_distance() {
        let a = TrialPoint::new(vec![0.0, 0.0]);
        let b = TrialPoint::new(vec![3.0, 4.0]);
        assert_eq!(a.distance(&b), 5.0);
    }
}

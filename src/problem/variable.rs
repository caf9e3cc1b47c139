use crate::error::{Error, Result};

/// A bounded scalar parameter of a [`Problem`](crate::Problem).
///
/// Variables are immutable once the problem is built. Algorithms and trial
/// points refer to a variable through its position in the problem's ordered
/// variable list, see [`Variable::index`].
#[derive(Debug, Clone, PartialEq)]
pub struct Variable {
    name: String,
    initial_value: f64,
    lower_limit: f64,
    upper_limit: f64,
    index: usize,
}

impl Variable {
    /// Creates a variable with the given initial value and limits.
    ///
    /// # Arguments
    ///
    /// * `name` - Unique name of the variable within its problem
    /// * `initial_value` - Starting value, must lie within the limits
    /// * `lower_limit` - Finite lower limit
    /// * `upper_limit` - Finite upper limit, not less than `lower_limit`
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidVariable`] if a value is not finite, the limits are
    /// inverted, or the initial value lies outside the limits.
    pub fn new(
        name: impl Into<String>,
        initial_value: f64,
        lower_limit: f64,
        upper_limit: f64,
    ) -> Result<Self> {
        let name = name.into();
        let invalid = |reason: &str| Error::InvalidVariable {
            name: name.clone(),
            reason: reason.to_string(),
        };

        if !lower_limit.is_finite() || !upper_limit.is_finite() {
            return Err(invalid("limits must be finite"));
        }
        if lower_limit > upper_limit {
            return Err(invalid("lower limit exceeds upper limit"));
        }
        if !initial_value.is_finite() {
            return Err(invalid("initial value must be finite"));
        }
        if initial_value < lower_limit || initial_value > upper_limit {
            return Err(invalid("initial value lies outside the limits"));
        }

        Ok(Self {
            name,
            initial_value,
            lower_limit,
            upper_limit,
            index: 0,
        })
    }

    pub(crate) fn with_index(mut self, index: usize) -> Self {
        self.index = index;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn initial_value(&self) -> f64 {
        self.initial_value
    }

    pub fn lower_limit(&self) -> f64 {
        self.lower_limit
    }

    pub fn upper_limit(&self) -> f64 {
        self.upper_limit
    }

    /// Position of this variable in its problem's variable list.
    pub fn index(&self) -> usize {
        self.index
    }

    /// Width of the allowed interval.
    pub fn range(&self) -> f64 {
        self.upper_limit - self.lower_limit
    }

    /// True when the limits collapse to a single value.
    pub fn is_degenerate(&self) -> bool {
        self.upper_limit <= self.lower_limit
    }

    pub fn contains(&self, value: f64) -> bool {
        value >= self.lower_limit && value <= self.upper_limit
    }

    /// Clamps `value` into the variable's limits. NaN maps to the initial value.
    pub fn clamp(&self, value: f64) -> f64 {
        if value.is_nan() {
            self.initial_value
        } else {
            value.clamp(self.lower_limit, self.upper_limit)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_variable_accessors() {
        let variable = Variable::new("x", 2.0, -1.0, 5.0).unwrap();
        assert_eq!(variable.name(), "x");
        assert_eq!(variable.initial_value(), 2.0);
        assert_eq!(variable.range(), 6.0);
        assert!(!variable.is_degenerate());
    }

    #[test]
    fn test_variable_rejects_bad_limits() {
        assert!(matches!(
            Variable::new("x", 0.0, 1.0, -1.0),
            Err(Error::InvalidVariable { .. })
        ));
        assert!(Variable::new("x", 0.0, f64::NEG_INFINITY, 1.0).is_err());
        assert!(Variable::new("x", 3.0, 0.0, 1.0).is_err());
        assert!(Variable::new("x", f64::NAN, 0.0, 1.0).is_err());
    }

    #[test]
    fn test_variable_clamp() {
        let variable = Variable::new("x", 0.5, 0.0, 1.0).unwrap();
        assert_eq!(variable.clamp(-3.0), 0.0);
        assert_eq!(variable.clamp(3.0), 1.0);
        assert_eq!(variable.clamp(0.25), 0.25);
        assert_eq!(variable.clamp(f64::NAN), 0.5);
    }

    #[test]
    fn test_degenerate_variable() {
        let variable = Variable::new("fixed", 4.0, 4.0, 4.0).unwrap();
        assert!(variable.is_degenerate());
        assert_eq!(variable.clamp(10.0), 4.0);
    }
}

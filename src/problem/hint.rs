//! Optional search hints attached to a problem.
//!
//! Hints narrow the default search ranges an algorithm would otherwise derive
//! from a variable's limits. Every range a hint hands out is clipped to the
//! variable's limits.

use std::collections::HashMap;

use crate::problem::Variable;

/// Default excursion as a fraction of a variable's range.
pub const DEFAULT_EXCURSION_FRACTION: f64 = 0.001;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HintKind {
    InitialDomain,
    InitialDelta,
    Excursion,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Hint {
    InitialDomain(InitialDomain),
    InitialDelta(InitialDelta),
    Excursion(ExcursionHint),
}

impl Hint {
    pub fn kind(&self) -> HintKind {
        match self {
            Self::InitialDomain(_) => HintKind::InitialDomain,
            Self::InitialDelta(_) => HintKind::InitialDelta,
            Self::Excursion(_) => HintKind::Excursion,
        }
    }
}

impl From<InitialDomain> for Hint {
    fn from(hint: InitialDomain) -> Self {
        Self::InitialDomain(hint)
    }
}

impl From<InitialDelta> for Hint {
    fn from(hint: InitialDelta) -> Self {
        Self::InitialDelta(hint)
    }
}

impl From<ExcursionHint> for Hint {
    fn from(hint: ExcursionHint) -> Self {
        Self::Excursion(hint)
    }
}

/// A hint that supplies an initial search range per variable.
pub trait DomainHint {
    /// Returns `[lower, upper]` for the variable, inside its limits.
    fn range(&self, variable: &Variable) -> [f64; 2];
}

fn full_range(variable: &Variable) -> [f64; 2] {
    [variable.lower_limit(), variable.upper_limit()]
}

fn clip(variable: &Variable, lower: f64, upper: f64) -> [f64; 2] {
    let lower = lower.max(variable.lower_limit());
    let upper = upper.min(variable.upper_limit());
    if lower > upper {
        full_range(variable)
    } else {
        [lower, upper]
    }
}

/// Explicit, possibly asymmetric, initial search ranges keyed by variable name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InitialDomain {
    ranges: HashMap<String, [f64; 2]>,
}

impl InitialDomain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_range(mut self, name: impl Into<String>, lower: f64, upper: f64) -> Self {
        self.ranges
            .insert(name.into(), [lower.min(upper), lower.max(upper)]);
        self
    }
}

impl DomainHint for InitialDomain {
    fn range(&self, variable: &Variable) -> [f64; 2] {
        match self.ranges.get(variable.name()) {
            Some(&[lower, upper]) => clip(variable, lower, upper),
            None => full_range(variable),
        }
    }
}

/// Symmetric initial search deltas around each variable's initial value.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InitialDelta {
    deltas: HashMap<String, f64>,
}

impl InitialDelta {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_delta(mut self, name: impl Into<String>, delta: f64) -> Self {
        self.deltas.insert(name.into(), delta.abs());
        self
    }

    pub fn delta(&self, variable: &Variable) -> Option<f64> {
        self.deltas.get(variable.name()).copied()
    }
}

impl DomainHint for InitialDelta {
    fn range(&self, variable: &Variable) -> [f64; 2] {
        match self.delta(variable) {
            Some(delta) => {
                let center = variable.initial_value();
                clip(variable, center - delta, center + delta)
            }
            None => full_range(variable),
        }
    }
}

/// Excursion used to sample a variable around a point, e.g. for finite
/// differences.
#[derive(Debug, Clone, PartialEq)]
pub struct ExcursionHint {
    excursions: HashMap<String, f64>,
    fraction: f64,
}

impl Default for ExcursionHint {
    fn default() -> Self {
        Self {
            excursions: HashMap::new(),
            fraction: DEFAULT_EXCURSION_FRACTION,
        }
    }
}

impl ExcursionHint {
    pub fn new() -> Self {
        Self::default()
    }

    /// Excursion for variables without an explicit one, as a fraction of range.
    pub fn with_fraction(mut self, fraction: f64) -> Self {
        self.fraction = fraction.abs();
        self
    }

    pub fn with_excursion(mut self, name: impl Into<String>, excursion: f64) -> Self {
        self.excursions.insert(name.into(), excursion.abs());
        self
    }

    pub fn excursion(&self, variable: &Variable) -> f64 {
        self.excursions
            .get(variable.name())
            .copied()
            .unwrap_or(self.fraction * variable.range())
    }

    /// `[value - excursion, value + excursion]` clipped to the variable's limits.
    pub fn range(&self, variable: &Variable, value: f64) -> [f64; 2] {
        let excursion = self.excursion(variable);
        let lower = (value - excursion).max(variable.lower_limit());
        let upper = (value + excursion).min(variable.upper_limit());
        [lower.min(upper), upper.max(lower)]
    }
}

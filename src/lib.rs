pub mod algorithm;
pub mod error;
pub mod problem;
pub mod schedule;

pub use algorithm::{
    directed_step::DirectedStep, random_search::RandomSearch, random_shrink::RandomShrinkSearch,
    simplex::SimplexConfig, simplex::SimplexSearchAlgorithm, AlgorithmId, Context, Efficiency,
    SearchAlgorithm,
};
pub use error::{Error, Result};
pub use problem::{
    hint::{DomainHint, ExcursionHint, Hint, HintKind, InitialDelta, InitialDomain},
    Evaluator, Origin, Problem, ProblemBuilder, Trial, TrialPoint, TrialPointBuilder, Variable,
};
pub use schedule::{
    event::{Action, Event, Observer},
    score_board::ScoreBoard,
    solve,
    stopper::{StopHandle, StopReason, Stopper},
    AlgorithmRun, AlgorithmSchedule, AlgorithmSummary, RunTermination, ScheduleConfig, Solution,
};

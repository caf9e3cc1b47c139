use std::sync::mpsc::Sender;
use std::sync::Arc;

use crate::algorithm::AlgorithmId;
use crate::problem::Trial;

/// Events the schedule publishes while solving.
///
/// Trial events are published in evaluation order, so a sequence of
/// [`Event::NewOptimalSolution`] events always has strictly increasing
/// satisfaction.
#[derive(Debug, Clone)]
pub enum Event {
    /// The algorithm may be granted runs again.
    AlgorithmAvailable { id: AlgorithmId, label: Arc<str> },

    /// The algorithm will not be granted runs until it becomes available.
    AlgorithmUnavailable { id: AlgorithmId, label: Arc<str> },

    /// A run is about to start with the given evaluation budget.
    RunWillExecute {
        id: AlgorithmId,
        label: Arc<str>,
        evaluations: usize,
    },

    /// A run finished after using `evaluations` evaluations.
    RunExecuted {
        id: AlgorithmId,
        label: Arc<str>,
        evaluations: usize,
        efficiency: f64,
    },

    TrialScored(Arc<Trial>),

    TrialVetoed(Arc<Trial>),

    NewOptimalSolution(Arc<Trial>),
}

/// Actions an observer can request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// Stop the solve and return the best solution found so far.
    StopEarly,
}

/// Receives schedule events and optionally asks the schedule to stop.
///
/// Closures automatically implement `Observer`, `()` is a no-op observer, and an
/// [`mpsc::Sender<Event>`](std::sync::mpsc::Sender) forwards every event to
/// another thread.
pub trait Observer: Send {
    fn observe(&mut self, event: &Event) -> Option<Action>;
}

impl<F> Observer for F
where
    F: FnMut(&Event) -> Option<Action> + Send,
{
    fn observe(&mut self, event: &Event) -> Option<Action> {
        self(event)
    }
}

impl Observer for () {
    fn observe(&mut self, _event: &Event) -> Option<Action> {
        None
    }
}

impl Observer for Sender<Event> {
    fn observe(&mut self, event: &Event) -> Option<Action> {
        // A dropped receiver just means nobody is listening any more.
        let _ = self.send(event.clone());
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::problem::{Origin, TrialPoint};
    use std::sync::mpsc;

    fn trial() -> Arc<Trial> {
        Arc::new(Trial::scored(
            TrialPoint::new(vec![1.0]),
            0.5,
            Origin::Initial,
        ))
    }

    #[test]
    fn test_closure_observer() {
        let mut count = 0;
        {
            let mut observer = |event: &Event| -> Option<Action> {
                if matches!(event, Event::TrialScored(_)) {
                    count += 1;
                }
                None
            };
            observer.observe(&Event::TrialScored(trial()));
            observer.observe(&Event::NewOptimalSolution(trial()));
        }
        assert_eq!(count, 1);
    }

    #[test]
    fn test_sender_observer_forwards_events() {
        let (mut sender, receiver) = mpsc::channel::<Event>();
        assert_eq!(sender.observe(&Event::TrialScored(trial())), None);
        assert!(matches!(receiver.try_recv(), Ok(Event::TrialScored(_))));

        drop(receiver);
        assert_eq!(sender.observe(&Event::TrialScored(trial())), None);
    }

    #[test]
    fn test_unit_observer() {
        let mut observer = ();
        assert_eq!(observer.observe(&Event::TrialScored(trial())), None);
    }
}

//! Core traits for Porter
//!
//! The observer boundary between the engine and whatever presents task
//! state. The engine calls the observer directly and synchronously from
//! the executor's task.

use crate::{TaskEvent, TaskId};

/// Receiver for task lifecycle events
///
/// `on_event` is invoked synchronously from the executor for every emitted
/// event and must not block on presentation work. For
/// [`TaskEvent::QueryOverwrite`] a typical implementation only records
/// that a query is pending and returns quickly, leaving a separate poller
/// to present the choice and call `answer_overwrite` later.
///
/// The return value is advisory: `false` instructs the executor to abort
/// after handling the current item.
pub trait TaskObserver: Send + Sync {
    /// Handle an event for the given task
    fn on_event(&self, task: TaskId, event: &TaskEvent) -> bool;
}

/// Observer that ignores every event
#[derive(Debug, Clone, Copy, Default)]
pub struct NullObserver;

impl TaskObserver for NullObserver {
    fn on_event(&self, _task: TaskId, _event: &TaskEvent) -> bool {
        true
    }
}

/// Adapter implementing [`TaskObserver`] for a closure
pub struct FnObserver<F>(pub F);

impl<F> TaskObserver for FnObserver<F>
where
    F: Fn(TaskId, &TaskEvent) -> bool + Send + Sync,
{
    fn on_event(&self, task: TaskId, event: &TaskEvent) -> bool {
        (self.0)(task, event)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::FinishSummary;

    #[test]
    fn test_null_observer() {
        let observer = NullObserver;
        assert!(observer.on_event(TaskId::new(), &TaskEvent::Progress));
    }

    #[test]
    fn test_closure_observer() {
        let observer =
            FnObserver(|_: TaskId, event: &TaskEvent| !matches!(event, TaskEvent::Finish(_)));
        assert!(observer.on_event(TaskId::new(), &TaskEvent::Progress));
        assert!(!observer.on_event(
            TaskId::new(),
            &TaskEvent::Finish(FinishSummary::default())
        ));
    }
}

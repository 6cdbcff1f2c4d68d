//! Pause controller and executor checkpoints
//!
//! Commands mutate a watch channel; the executor honors them at
//! well-defined checkpoints between items and between payload chunks,
//! never mid-syscall. Cancellation is raced against every wait so
//! `cancel()` always wakes a suspended executor.

use porter_types::{Error, Result, TaskState};
use tracing::debug;

use crate::task::Task;

/// What the executor should be doing, as commanded from outside
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunDirective {
    /// Keep issuing operations
    Run,
    /// Idle until resumed by the user
    Pause,
    /// Idle until promoted by the scheduler
    Queue,
}

impl Task {
    /// Executor checkpoint: honor pause/queue directives and aborts
    ///
    /// Returns `Err(Error::Cancelled)` when an abort is requested, which
    /// unwinds the executor to its single finish emission. Otherwise the
    /// call returns once the directive is `Run`, restoring the running
    /// state if the task was idling.
    pub(crate) async fn checkpoint(&self) -> Result<()> {
        if self.aborted() {
            return Err(Error::Cancelled);
        }
        if self.directive() == RunDirective::Run {
            return Ok(());
        }

        let mut rx = self.directive_rx();
        loop {
            let directive = *rx.borrow_and_update();
            match directive {
                RunDirective::Run => {
                    if self.aborted() {
                        return Err(Error::Cancelled);
                    }
                    let mut shared = self.lock();
                    if matches!(shared.state, TaskState::Paused | TaskState::Queued) {
                        shared.transition(TaskState::Running);
                    }
                    return Ok(());
                }
                RunDirective::Pause | RunDirective::Queue => {
                    {
                        let mut shared = self.lock();
                        let idle = if directive == RunDirective::Pause {
                            TaskState::Paused
                        } else {
                            TaskState::Queued
                        };
                        if !shared.state.is_terminal() && shared.state != idle {
                            shared.transition(idle);
                        }
                    }
                    debug!("Task {} idling on {:?}", self.id(), directive);
                    tokio::select! {
                        changed = rx.changed() => {
                            if changed.is_err() {
                                // Directive channel gone; treat as abort.
                                return Err(Error::Cancelled);
                            }
                        }
                        () = self.cancel_token().cancelled() => {
                            return Err(Error::Cancelled);
                        }
                    }
                }
            }
        }
    }

    /// Check the abort flag without waiting
    pub(crate) fn aborted(&self) -> bool {
        self.cancel_token().is_cancelled() || self.lock().abort_requested
    }
}

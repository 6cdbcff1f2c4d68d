//! Core data types for Porter
//!
//! This module provides the fundamental data types used throughout the
//! Porter ecosystem: task identity, task and conflict enums, event
//! payloads, and finish summaries.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use uuid::Uuid;

/// Unique identifier for a task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct TaskId(Uuid);

impl TaskId {
    /// Create a new task ID
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Get the inner UUID
    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for TaskId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The operation a task performs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum TaskKind {
    /// Copy sources into the destination directory
    Copy,
    /// Move sources into the destination directory
    Move,
    /// Permanently remove sources
    Delete,
    /// Move sources to the platform trash
    Trash,
    /// Create symbolic links to sources inside the destination directory
    Link,
    /// Change mode and/or ownership of sources
    Permissions,
    /// Run a single external command
    Exec,
}

impl TaskKind {
    /// Check whether this kind of task writes into a destination directory
    pub fn has_destination(self) -> bool {
        matches!(self, Self::Copy | Self::Move | Self::Link)
    }

    /// Check whether byte counters are meaningful for this kind
    ///
    /// Exec has no byte cost; its progress is indeterminate.
    pub fn transfers_bytes(self) -> bool {
        matches!(self, Self::Copy | Self::Move)
    }

    /// Human-readable verb for display
    pub fn verb(self) -> &'static str {
        match self {
            Self::Copy => "copying",
            Self::Move => "moving",
            Self::Delete => "deleting",
            Self::Trash => "trashing",
            Self::Link => "linking",
            Self::Permissions => "changing permissions",
            Self::Exec => "running",
        }
    }
}

impl std::fmt::Display for TaskKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Copy => "copy",
            Self::Move => "move",
            Self::Delete => "delete",
            Self::Trash => "trash",
            Self::Link => "link",
            Self::Permissions => "permissions",
            Self::Exec => "exec",
        };
        write!(f, "{}", name)
    }
}

/// State of a task
///
/// Mutated only by the task's state machine; observers read it from
/// snapshots.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum TaskState {
    /// Task is performing work
    Running,
    /// Task is suspended by a user command
    Paused,
    /// Task is runnable but held back by the scheduler
    Queued,
    /// Task is blocked waiting for a conflict resolution
    QueryingConflict,
    /// Size estimation exceeded its budget; totals are unknown
    SizeTimeoutPending,
    /// Task is delivering an error event
    Erroring,
    /// Task has finished (completed, aborted, or completed with errors)
    Finished,
}

impl TaskState {
    /// Check if the task is in its terminal state
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Finished)
    }

    /// Check if the task counts against the scheduler's live limit
    pub fn is_live(self) -> bool {
        !matches!(self, Self::Finished)
    }

    /// Check if the executor is blocked on an external decision
    pub fn is_querying(self) -> bool {
        matches!(self, Self::QueryingConflict)
    }
}

/// Sticky policy applied when a destination path collides
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum OverwritePolicy {
    /// Raise a rendezvous for every collision
    #[default]
    Ask,
    /// Overwrite the next colliding item only
    Overwrite,
    /// Overwrite all remaining colliding items
    OverwriteAll,
    /// Skip the next colliding item only
    Skip,
    /// Skip all remaining colliding items
    SkipAll,
    /// Auto-rename the next colliding item only
    AutoRename,
    /// Auto-rename all remaining colliding items
    AutoRenameAll,
}

impl OverwritePolicy {
    /// Resolve a collision without asking, if the policy allows it
    ///
    /// Returns `None` for `Ask`, which requires a rendezvous. One-shot
    /// policies decay back to `Ask` after use; the caller is responsible
    /// for applying [`OverwritePolicy::after_use`].
    pub fn resolve(self) -> Option<ConflictResolution> {
        match self {
            Self::Ask => None,
            Self::Overwrite | Self::OverwriteAll => Some(ConflictResolution::Overwrite),
            Self::Skip | Self::SkipAll => Some(ConflictResolution::Skip),
            Self::AutoRename | Self::AutoRenameAll => Some(ConflictResolution::AutoRename),
        }
    }

    /// The policy that remains in effect after one collision was resolved
    pub fn after_use(self) -> Self {
        match self {
            Self::Overwrite | Self::Skip | Self::AutoRename => Self::Ask,
            sticky => sticky,
        }
    }
}

/// Answer to an overwrite query
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum ConflictResolution {
    /// Replace the existing destination item
    Overwrite,
    /// Replace this and all remaining colliding items
    OverwriteAll,
    /// Leave the destination untouched and skip the source item
    Skip,
    /// Skip this and all remaining colliding items
    SkipAll,
    /// Write the item under the supplied file name instead
    Rename(String),
    /// Pick a non-colliding name automatically
    AutoRename,
    /// Auto-rename this and all remaining colliding items
    AutoRenameAll,
    /// Pause the task; the query is asked again after resume
    Pause,
    /// Abort the task
    Cancel,
}

impl ConflictResolution {
    /// The sticky policy this resolution installs for remaining items
    pub fn sticky_policy(&self) -> Option<OverwritePolicy> {
        match self {
            Self::OverwriteAll => Some(OverwritePolicy::OverwriteAll),
            Self::SkipAll => Some(OverwritePolicy::SkipAll),
            Self::AutoRenameAll => Some(OverwritePolicy::AutoRenameAll),
            _ => None,
        }
    }
}

/// Abort-vs-continue decision applied after each per-item error
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum ErrorPolicy {
    /// Abort as soon as the first item of the task errors
    StopOnFirst,
    /// Abort on any error at any point
    StopOnAny,
    /// Never abort on error; tally and proceed
    #[default]
    Continue,
}

impl ErrorPolicy {
    /// Decide whether the task must abort after an error was recorded
    pub fn should_abort(self, error_count: u64, first_item_errored: bool) -> bool {
        match self {
            Self::StopOnFirst => first_item_errored,
            Self::StopOnAny => error_count > 0,
            Self::Continue => false,
        }
    }
}

/// Total byte count for a task, possibly unknown
///
/// Estimation walks the full source tree under a time budget; when the
/// budget is exceeded the task proceeds with `Unknown` rather than
/// blocking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum ByteEstimate {
    /// Total size in bytes
    Known(u64),
    /// Estimation timed out before completing
    #[default]
    Unknown,
}

impl ByteEstimate {
    /// The known total, if any
    pub fn known(self) -> Option<u64> {
        match self {
            Self::Known(total) => Some(total),
            Self::Unknown => None,
        }
    }

    /// Check whether the total is unknown
    pub fn is_unknown(self) -> bool {
        matches!(self, Self::Unknown)
    }
}

/// A single per-item failure, with enough context for policy and display
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ItemError {
    /// Path the failing operation was applied to
    pub path: PathBuf,
    /// Short verb for the failing operation ("copy", "stat", "remove", ...)
    pub operation: String,
    /// Message from the underlying OS error
    pub message: String,
    /// Whether the failure was a permission error
    pub permission_denied: bool,
}

impl ItemError {
    /// Build an item error from an `io::Error`
    pub fn new<P: Into<PathBuf>, S: Into<String>>(
        path: P,
        operation: S,
        error: &std::io::Error,
    ) -> Self {
        Self {
            path: path.into(),
            operation: operation.into(),
            message: error.to_string(),
            permission_denied: error.kind() == std::io::ErrorKind::PermissionDenied,
        }
    }

    /// Build an item error from a plain message
    pub fn message<P: Into<PathBuf>, S: Into<String>, M: Into<String>>(
        path: P,
        operation: S,
        message: M,
    ) -> Self {
        Self {
            path: path.into(),
            operation: operation.into(),
            message: message.into(),
            permission_denied: false,
        }
    }
}

impl std::fmt::Display for ItemError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} '{}': {}",
            self.operation,
            self.path.display(),
            self.message
        )
    }
}

/// Outcome of a finished task
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum TaskOutcome {
    /// All items processed, no errors
    Completed,
    /// All items processed, some items errored
    CompletedWithErrors,
    /// Aborted before processing all items, no errors recorded
    Stopped,
    /// Aborted before processing all items, some items errored
    StoppedWithErrors,
}

/// Terminal summary carried by the finish event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct FinishSummary {
    /// Whether the task was aborted (by command, policy, or observer)
    pub aborted: bool,
    /// Number of per-item errors recorded
    pub error_count: u64,
}

impl FinishSummary {
    /// Derive the user-visible outcome from the flags
    pub fn outcome(self) -> TaskOutcome {
        match (self.aborted, self.error_count) {
            (false, 0) => TaskOutcome::Completed,
            (false, _) => TaskOutcome::CompletedWithErrors,
            (true, 0) => TaskOutcome::Stopped,
            (true, _) => TaskOutcome::StoppedWithErrors,
        }
    }
}

/// Event emitted by a task executor, in program order per task
#[derive(Debug, Clone)]
pub enum TaskEvent {
    /// Counters advanced; read the task snapshot for details
    Progress,
    /// A destination collision needs a resolution
    QueryOverwrite {
        /// Source item being written
        source: PathBuf,
        /// Colliding destination path
        dest: PathBuf,
    },
    /// A per-item error was recorded
    Error(ItemError),
    /// The task reached its terminal state; emitted exactly once
    Finish(FinishSummary),
}

impl TaskEvent {
    /// Short name for logging
    pub fn name(&self) -> &'static str {
        match self {
            Self::Progress => "progress",
            Self::QueryOverwrite { .. } => "query_overwrite",
            Self::Error(_) => "error",
            Self::Finish(_) => "finish",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_task_id_creation() {
        let id1 = TaskId::new();
        let id2 = TaskId::new();
        assert_ne!(id1, id2);
    }

    #[test]
    fn test_task_state() {
        assert!(TaskState::Finished.is_terminal());
        assert!(!TaskState::Running.is_terminal());

        assert!(TaskState::Running.is_live());
        assert!(TaskState::Queued.is_live());
        assert!(!TaskState::Finished.is_live());

        assert!(TaskState::QueryingConflict.is_querying());
    }

    #[test]
    fn test_task_kind_destinations() {
        assert!(TaskKind::Copy.has_destination());
        assert!(TaskKind::Move.has_destination());
        assert!(TaskKind::Link.has_destination());
        assert!(!TaskKind::Delete.has_destination());
        assert!(!TaskKind::Trash.has_destination());
        assert!(!TaskKind::Exec.has_destination());

        assert!(TaskKind::Copy.transfers_bytes());
        assert!(!TaskKind::Exec.transfers_bytes());
    }

    #[test]
    fn test_overwrite_policy_resolution() {
        assert_eq!(OverwritePolicy::Ask.resolve(), None);
        assert_eq!(
            OverwritePolicy::SkipAll.resolve(),
            Some(ConflictResolution::Skip)
        );
        assert_eq!(
            OverwritePolicy::OverwriteAll.resolve(),
            Some(ConflictResolution::Overwrite)
        );

        // One-shot policies decay, sticky ones persist.
        assert_eq!(OverwritePolicy::Overwrite.after_use(), OverwritePolicy::Ask);
        assert_eq!(OverwritePolicy::Skip.after_use(), OverwritePolicy::Ask);
        assert_eq!(
            OverwritePolicy::SkipAll.after_use(),
            OverwritePolicy::SkipAll
        );
    }

    #[test]
    fn test_resolution_sticky_policies() {
        assert_eq!(
            ConflictResolution::OverwriteAll.sticky_policy(),
            Some(OverwritePolicy::OverwriteAll)
        );
        assert_eq!(
            ConflictResolution::SkipAll.sticky_policy(),
            Some(OverwritePolicy::SkipAll)
        );
        assert_eq!(ConflictResolution::Skip.sticky_policy(), None);
        assert_eq!(
            ConflictResolution::Rename("x".into()).sticky_policy(),
            None
        );
    }

    #[test]
    fn test_error_policy() {
        assert!(ErrorPolicy::StopOnFirst.should_abort(1, true));
        assert!(!ErrorPolicy::StopOnFirst.should_abort(3, false));
        assert!(ErrorPolicy::StopOnAny.should_abort(1, false));
        assert!(!ErrorPolicy::Continue.should_abort(10, true));
    }

    #[test]
    fn test_finish_outcomes() {
        let completed = FinishSummary {
            aborted: false,
            error_count: 0,
        };
        assert_eq!(completed.outcome(), TaskOutcome::Completed);

        let with_errors = FinishSummary {
            aborted: false,
            error_count: 2,
        };
        assert_eq!(with_errors.outcome(), TaskOutcome::CompletedWithErrors);

        let stopped = FinishSummary {
            aborted: true,
            error_count: 0,
        };
        assert_eq!(stopped.outcome(), TaskOutcome::Stopped);

        let stopped_errors = FinishSummary {
            aborted: true,
            error_count: 1,
        };
        assert_eq!(stopped_errors.outcome(), TaskOutcome::StoppedWithErrors);
    }

    #[test]
    fn test_item_error_permission_flag() {
        let denied = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "nope");
        let error = ItemError::new("/x", "chmod", &denied);
        assert!(error.permission_denied);

        let other = std::io::Error::new(std::io::ErrorKind::Other, "boom");
        let error = ItemError::new("/x", "copy", &other);
        assert!(!error.permission_denied);
    }

    proptest! {
        #[test]
        fn test_error_policy_consistency(error_count in 1u64..100, first in any::<bool>()) {
            // StopOnAny aborts whenever at least one error was recorded.
            prop_assert!(ErrorPolicy::StopOnAny.should_abort(error_count, first));
            // Continue never aborts.
            prop_assert!(!ErrorPolicy::Continue.should_abort(error_count, first));
            // StopOnFirst keys on the first-item flag alone.
            prop_assert_eq!(
                ErrorPolicy::StopOnFirst.should_abort(error_count, first),
                first
            );
        }

        #[test]
        fn test_outcome_matches_flags(aborted in any::<bool>(), errors in 0u64..50) {
            let outcome = FinishSummary { aborted, error_count: errors }.outcome();
            match outcome {
                TaskOutcome::Completed => prop_assert!(!aborted && errors == 0),
                TaskOutcome::CompletedWithErrors => prop_assert!(!aborted && errors > 0),
                TaskOutcome::Stopped => prop_assert!(aborted && errors == 0),
                TaskOutcome::StoppedWithErrors => prop_assert!(aborted && errors > 0),
            }
        }
    }
}

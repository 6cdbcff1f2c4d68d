//! Task descriptors and the shared task handle
//!
//! A [`TaskSpec`] is the immutable identity of a task: what to do, to
//! which paths. A [`Task`] is the live handle shared between the
//! executor, the scheduler, and observers: commands are callable from any
//! thread, and all mutable run-time state sits behind one per-task mutex
//! that is never held across an await point.

use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use porter_types::{
    ByteEstimate, ConflictResolution, Error, ErrorPolicy, FinishSummary, OverwritePolicy, Result,
    TaskId, TaskKind, TaskState,
};
use tokio::sync::{oneshot, watch};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::control::RunDirective;
use crate::progress::SpeedSampler;

/// Immutable description of a task
#[derive(Debug, Clone)]
pub struct TaskSpec {
    /// The operation to perform
    pub kind: TaskKind,
    /// Ordered absolute source paths
    pub sources: Vec<PathBuf>,
    /// Destination directory for kinds that have one
    pub dest_dir: Option<PathBuf>,
    /// Initial collision policy
    pub overwrite_policy: OverwritePolicy,
    /// Abort-vs-continue policy for per-item errors
    pub error_policy: ErrorPolicy,
    /// Apply to directory contents as well (Permissions only)
    pub recursive: bool,
    /// Mode bits to apply (Permissions only)
    pub mode: Option<u32>,
    /// Owner uid to apply (Permissions only)
    pub owner: Option<u32>,
    /// Group gid to apply (Permissions only)
    pub group: Option<u32>,
    /// Command argv (Exec only)
    pub command: Vec<String>,
}

impl TaskSpec {
    fn new(kind: TaskKind, sources: Vec<PathBuf>, dest_dir: Option<PathBuf>) -> Self {
        Self {
            kind,
            sources,
            dest_dir,
            overwrite_policy: OverwritePolicy::default(),
            error_policy: ErrorPolicy::default(),
            recursive: false,
            mode: None,
            owner: None,
            group: None,
            command: Vec::new(),
        }
    }

    /// Describe a copy of `sources` into `dest_dir`
    pub fn copy<I, P>(sources: I, dest_dir: P) -> Self
    where
        I: IntoIterator<Item = PathBuf>,
        P: Into<PathBuf>,
    {
        Self::new(
            TaskKind::Copy,
            sources.into_iter().collect(),
            Some(dest_dir.into()),
        )
    }

    /// Describe a move of `sources` into `dest_dir`
    pub fn move_into<I, P>(sources: I, dest_dir: P) -> Self
    where
        I: IntoIterator<Item = PathBuf>,
        P: Into<PathBuf>,
    {
        Self::new(
            TaskKind::Move,
            sources.into_iter().collect(),
            Some(dest_dir.into()),
        )
    }

    /// Describe permanent removal of `sources`
    pub fn delete<I: IntoIterator<Item = PathBuf>>(sources: I) -> Self {
        Self::new(TaskKind::Delete, sources.into_iter().collect(), None)
    }

    /// Describe moving `sources` to the platform trash
    pub fn trash<I: IntoIterator<Item = PathBuf>>(sources: I) -> Self {
        Self::new(TaskKind::Trash, sources.into_iter().collect(), None)
    }

    /// Describe symlinking `sources` into `dest_dir`
    pub fn link_into<I, P>(sources: I, dest_dir: P) -> Self
    where
        I: IntoIterator<Item = PathBuf>,
        P: Into<PathBuf>,
    {
        Self::new(
            TaskKind::Link,
            sources.into_iter().collect(),
            Some(dest_dir.into()),
        )
    }

    /// Describe a mode/ownership change on `sources`
    pub fn permissions<I: IntoIterator<Item = PathBuf>>(sources: I) -> Self {
        Self::new(TaskKind::Permissions, sources.into_iter().collect(), None)
    }

    /// Describe running an external command
    pub fn exec<I, S>(command: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut spec = Self::new(TaskKind::Exec, Vec::new(), None);
        spec.command = command.into_iter().map(Into::into).collect();
        spec
    }

    /// Set the initial overwrite policy
    pub fn with_overwrite_policy(mut self, policy: OverwritePolicy) -> Self {
        self.overwrite_policy = policy;
        self
    }

    /// Set the error policy
    pub fn with_error_policy(mut self, policy: ErrorPolicy) -> Self {
        self.error_policy = policy;
        self
    }

    /// Apply permissions recursively
    pub fn with_recursive(mut self, recursive: bool) -> Self {
        self.recursive = recursive;
        self
    }

    /// Set the mode bits to apply
    pub fn with_mode(mut self, mode: u32) -> Self {
        self.mode = Some(mode);
        self
    }

    /// Set the owner/group to apply
    pub fn with_owner(mut self, owner: Option<u32>, group: Option<u32>) -> Self {
        self.owner = owner;
        self.group = group;
        self
    }

    /// Check the spec for internal consistency
    pub fn validate(&self) -> Result<()> {
        if self.kind == TaskKind::Exec {
            if self.command.is_empty() {
                return Err(Error::config("Exec task requires a command"));
            }
            return Ok(());
        }
        if self.sources.is_empty() {
            return Err(Error::config("Task requires at least one source path"));
        }
        if self.kind.has_destination() && self.dest_dir.is_none() {
            return Err(Error::config(format!(
                "{} task requires a destination directory",
                self.kind
            )));
        }
        if self.kind == TaskKind::Permissions
            && self.mode.is_none()
            && self.owner.is_none()
            && self.group.is_none()
        {
            return Err(Error::config(
                "Permissions task requires a mode, owner, or group",
            ));
        }
        Ok(())
    }
}

/// Engine knobs a task carries with it
#[derive(Debug, Clone)]
pub struct TaskSettings {
    /// Chunk size for payload copies
    pub chunk_size: usize,
    /// Throughput sampling interval
    pub sample_interval: Duration,
    /// Budget for the pre-run total-size walk
    pub estimate_budget: Duration,
    /// Preserve timestamps on copy
    pub preserve_timestamps: bool,
}

impl Default for TaskSettings {
    fn default() -> Self {
        Self::from(&porter_config::Config::default())
    }
}

impl From<&porter_config::Config> for TaskSettings {
    fn from(config: &porter_config::Config) -> Self {
        Self {
            chunk_size: config.execution.chunk_size.get(),
            sample_interval: config.progress.sample_interval.get(),
            estimate_budget: config.execution.estimate_budget.get(),
            preserve_timestamps: config.execution.preserve_timestamps,
        }
    }
}

/// A pending overwrite query waiting for an external answer
pub(crate) struct PendingQuery {
    pub(crate) source: PathBuf,
    pub(crate) dest: PathBuf,
    pub(crate) reply: oneshot::Sender<ConflictResolution>,
}

/// Mutable task state, guarded by the single per-task mutex
pub(crate) struct TaskShared {
    pub(crate) state: TaskState,
    pub(crate) overwrite_policy: OverwritePolicy,
    pub(crate) current_index: usize,
    pub(crate) current_source: Option<PathBuf>,
    pub(crate) current_dest: Option<PathBuf>,
    pub(crate) bytes_transferred: u64,
    pub(crate) total_bytes: ByteEstimate,
    pub(crate) files_done: u64,
    pub(crate) total_files: Option<u64>,
    pub(crate) error_count: u64,
    pub(crate) first_item_errored: bool,
    pub(crate) abort_requested: bool,
    pub(crate) started_at: Option<Instant>,
    pub(crate) sampler: SpeedSampler,
    pub(crate) pending_query: Option<PendingQuery>,
    pub(crate) log: Vec<String>,
    pub(crate) finished: Option<FinishSummary>,
}

impl TaskShared {
    fn new(spec: &TaskSpec, settings: &TaskSettings) -> Self {
        Self {
            state: TaskState::Running,
            overwrite_policy: spec.overwrite_policy,
            current_index: 0,
            current_source: None,
            current_dest: None,
            bytes_transferred: 0,
            total_bytes: ByteEstimate::Unknown,
            files_done: 0,
            total_files: None,
            error_count: 0,
            first_item_errored: false,
            abort_requested: false,
            started_at: None,
            sampler: SpeedSampler::new(settings.sample_interval),
            pending_query: None,
            log: Vec::new(),
            finished: None,
        }
    }

    /// Move to a new state, invalidating cached speed samples
    ///
    /// Every transition resets the sampler so throughput does not read as
    /// a stall or spike across a pause boundary.
    pub(crate) fn transition(&mut self, state: TaskState) {
        if self.state != state {
            self.sampler.reset();
            self.state = state;
        }
    }
}

/// Read-only copy of task state for the polling surface
#[derive(Debug, Clone)]
pub struct TaskSnapshot {
    /// Task identity
    pub id: TaskId,
    /// Task kind
    pub kind: TaskKind,
    /// Current state
    pub state: TaskState,
    /// Index of the source item being processed
    pub current_index: usize,
    /// Source path being processed
    pub current_source: Option<PathBuf>,
    /// Destination path being written
    pub current_dest: Option<PathBuf>,
    /// Bytes transferred so far
    pub bytes_transferred: u64,
    /// Estimated total bytes
    pub total_bytes: ByteEstimate,
    /// Files completed
    pub files_done: u64,
    /// Total files, when known
    pub total_files: Option<u64>,
    /// Per-item errors recorded
    pub error_count: u64,
    /// Whether the first item errored
    pub first_item_errored: bool,
    /// Whether an abort has been requested
    pub abort_requested: bool,
    /// Time since the executor started, if it has
    pub elapsed: Option<Duration>,
    /// Outstanding overwrite query, if any: (source, destination)
    pub pending_query: Option<(PathBuf, PathBuf)>,
    /// Finish summary once the task is terminal
    pub finished: Option<FinishSummary>,
}

impl TaskSnapshot {
    /// Check whether the task reached its terminal state
    pub fn is_finished(&self) -> bool {
        self.finished.is_some()
    }
}

/// Shared handle for one background file-operation task
pub struct Task {
    id: TaskId,
    spec: TaskSpec,
    settings: TaskSettings,
    shared: Mutex<TaskShared>,
    directive: watch::Sender<RunDirective>,
    cancel: CancellationToken,
}

impl Task {
    /// Create a task with default settings
    pub fn new(spec: TaskSpec) -> Result<Arc<Self>> {
        Self::with_settings(spec, TaskSettings::default())
    }

    /// Create a task with explicit settings
    pub fn with_settings(spec: TaskSpec, settings: TaskSettings) -> Result<Arc<Self>> {
        spec.validate()?;
        let (directive, _) = watch::channel(RunDirective::Run);
        let shared = TaskShared::new(&spec, &settings);
        Ok(Arc::new(Self {
            id: TaskId::new(),
            spec,
            settings,
            shared: Mutex::new(shared),
            directive,
            cancel: CancellationToken::new(),
        }))
    }

    /// Task identity
    pub fn id(&self) -> TaskId {
        self.id
    }

    /// Immutable task description
    pub fn spec(&self) -> &TaskSpec {
        &self.spec
    }

    /// Task kind shorthand
    pub fn kind(&self) -> TaskKind {
        self.spec.kind
    }

    /// Engine knobs for this task
    pub(crate) fn settings(&self) -> &TaskSettings {
        &self.settings
    }

    /// Lock the shared state
    ///
    /// Critical sections are short and never cross an await point; a
    /// poisoned lock is recovered rather than propagated.
    pub(crate) fn lock(&self) -> MutexGuard<'_, TaskShared> {
        self.shared.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Subscribe to run directives (executor side)
    pub(crate) fn directive_rx(&self) -> watch::Receiver<RunDirective> {
        self.directive.subscribe()
    }

    /// Current run directive
    pub(crate) fn directive(&self) -> RunDirective {
        *self.directive.borrow()
    }

    /// Cancellation token (executor side)
    pub(crate) fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Suspend the task at the executor's next checkpoint
    pub fn pause(&self) {
        let mut shared = self.lock();
        if shared.state.is_terminal() {
            return;
        }
        if matches!(shared.state, TaskState::Running | TaskState::Queued) {
            shared.transition(TaskState::Paused);
        }
        drop(shared);
        debug!("Task {} pause requested", self.id);
        self.directive.send_replace(RunDirective::Pause);
    }

    /// Hold the task back on behalf of the scheduler
    ///
    /// Semantically a pause whose resume is scheduler-driven.
    pub fn queue(&self) {
        let mut shared = self.lock();
        if shared.state.is_terminal() {
            return;
        }
        if matches!(shared.state, TaskState::Running | TaskState::Paused) {
            shared.transition(TaskState::Queued);
        }
        drop(shared);
        debug!("Task {} queued", self.id);
        self.directive.send_replace(RunDirective::Queue);
    }

    /// Wake a paused or queued task
    pub fn resume(&self) {
        let mut shared = self.lock();
        if shared.state.is_terminal() {
            return;
        }
        if matches!(shared.state, TaskState::Paused | TaskState::Queued) {
            shared.transition(TaskState::Running);
        }
        drop(shared);
        debug!("Task {} resumed", self.id);
        self.directive.send_replace(RunDirective::Run);
    }

    /// Request an abort and wake every suspension point
    ///
    /// Idempotent. An outstanding overwrite query is answered with
    /// [`ConflictResolution::Cancel`] so the executor unwinds instead of
    /// deadlocking.
    pub fn cancel(&self) {
        let pending = {
            let mut shared = self.lock();
            if shared.state.is_terminal() {
                return;
            }
            shared.abort_requested = true;
            shared.pending_query.take()
        };
        if let Some(query) = pending {
            let _ = query.reply.send(ConflictResolution::Cancel);
        }
        debug!("Task {} cancel requested", self.id);
        self.cancel.cancel();
        // Wake a pause-wait as well; the executor observes the abort flag.
        self.directive.send_replace(RunDirective::Run);
    }

    /// Request an abort without answering a pending query
    ///
    /// Used internally when the abort originates from the rendezvous
    /// itself or from an observer returning `false`.
    pub(crate) fn request_abort(&self) {
        self.lock().abort_requested = true;
        self.cancel.cancel();
        self.directive.send_replace(RunDirective::Run);
    }

    /// Answer an outstanding overwrite query
    ///
    /// Called from any thread once a human or automated policy has
    /// decided. Fails when no query is outstanding.
    pub fn answer_overwrite(&self, resolution: ConflictResolution) -> Result<()> {
        let query = self
            .lock()
            .pending_query
            .take()
            .ok_or_else(|| Error::other("No overwrite query is outstanding"))?;
        debug!("Task {} conflict answered: {:?}", self.id, resolution);
        query
            .reply
            .send(resolution)
            .map_err(|_| Error::other("Conflict waiter is gone"))
    }

    /// Take a read-only snapshot of the task state
    pub fn snapshot(&self) -> TaskSnapshot {
        let shared = self.lock();
        TaskSnapshot {
            id: self.id,
            kind: self.spec.kind,
            state: shared.state,
            current_index: shared.current_index,
            current_source: shared.current_source.clone(),
            current_dest: shared.current_dest.clone(),
            bytes_transferred: shared.bytes_transferred,
            total_bytes: shared.total_bytes,
            files_done: shared.files_done,
            total_files: shared.total_files,
            error_count: shared.error_count,
            first_item_errored: shared.first_item_errored,
            abort_requested: shared.abort_requested,
            elapsed: shared.started_at.map(|t| t.elapsed()),
            pending_query: shared
                .pending_query
                .as_ref()
                .map(|q| (q.source.clone(), q.dest.clone())),
            finished: shared.finished,
        }
    }

    /// Check whether the task reached its terminal state
    pub fn is_finished(&self) -> bool {
        self.lock().finished.is_some()
    }

    /// Copy of the task's append-only log lines
    pub fn log_lines(&self) -> Vec<String> {
        self.lock().log.clone()
    }

    /// Wait until the task reaches its terminal state
    ///
    /// Polls the finish summary on a short interval, the same way the
    /// observer surface is consumed.
    pub async fn wait_finished(&self) -> FinishSummary {
        loop {
            if let Some(summary) = self.lock().finished {
                return summary;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    }
}

impl std::fmt::Debug for Task {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Task")
            .field("id", &self.id)
            .field("kind", &self.spec.kind)
            .field("state", &self.lock().state)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_spec_validation() {
        assert!(TaskSpec::copy(vec![PathBuf::from("/a")], "/b").validate().is_ok());
        assert!(TaskSpec::copy(Vec::new(), "/b").validate().is_err());
        assert!(TaskSpec::delete(vec![PathBuf::from("/a")]).validate().is_ok());
        assert!(TaskSpec::exec(["true"]).validate().is_ok());
        assert!(TaskSpec::exec(Vec::<String>::new()).validate().is_err());
        assert!(TaskSpec::permissions(vec![PathBuf::from("/a")])
            .validate()
            .is_err());
        assert!(TaskSpec::permissions(vec![PathBuf::from("/a")])
            .with_mode(0o644)
            .validate()
            .is_ok());
    }

    #[test]
    fn test_spec_builder() {
        let spec = TaskSpec::copy(vec![PathBuf::from("/a")], "/b")
            .with_overwrite_policy(OverwritePolicy::SkipAll)
            .with_error_policy(ErrorPolicy::StopOnAny);

        assert_eq!(spec.kind, TaskKind::Copy);
        assert_eq!(spec.overwrite_policy, OverwritePolicy::SkipAll);
        assert_eq!(spec.error_policy, ErrorPolicy::StopOnAny);
        assert_eq!(spec.dest_dir, Some(PathBuf::from("/b")));
    }

    #[test]
    fn test_command_lifecycle() {
        let task = Task::new(TaskSpec::delete(vec![PathBuf::from("/a")])).unwrap();
        assert_eq!(task.snapshot().state, TaskState::Running);

        task.pause();
        assert_eq!(task.snapshot().state, TaskState::Paused);
        assert_eq!(task.directive(), RunDirective::Pause);

        task.queue();
        assert_eq!(task.snapshot().state, TaskState::Queued);

        task.resume();
        assert_eq!(task.snapshot().state, TaskState::Running);

        task.cancel();
        assert!(task.snapshot().abort_requested);
        // cancel is idempotent
        task.cancel();
        assert!(task.snapshot().abort_requested);
    }

    #[test]
    fn test_commands_after_finish_are_noops() {
        let task = Task::new(TaskSpec::delete(vec![PathBuf::from("/a")])).unwrap();
        {
            let mut shared = task.lock();
            shared.transition(TaskState::Finished);
            shared.finished = Some(FinishSummary::default());
        }

        task.pause();
        assert_eq!(task.snapshot().state, TaskState::Finished);
        task.queue();
        assert_eq!(task.snapshot().state, TaskState::Finished);
    }

    #[test]
    fn test_answer_without_query_fails() {
        let task = Task::new(TaskSpec::delete(vec![PathBuf::from("/a")])).unwrap();
        assert!(task
            .answer_overwrite(ConflictResolution::Skip)
            .is_err());
    }

    #[tokio::test]
    async fn test_cancel_answers_pending_query() {
        let task = Task::new(TaskSpec::copy(vec![PathBuf::from("/a")], "/b")).unwrap();
        let (tx, rx) = oneshot::channel();
        task.lock().pending_query = Some(PendingQuery {
            source: PathBuf::from("/a/f"),
            dest: PathBuf::from("/b/f"),
            reply: tx,
        });

        task.cancel();
        assert_eq!(rx.await, Ok(ConflictResolution::Cancel));
        assert!(task.snapshot().pending_query.is_none());
    }
}

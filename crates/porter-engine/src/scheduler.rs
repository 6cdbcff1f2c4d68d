//! Task scheduler: registry and queue policy for concurrent tasks
//!
//! The scheduler owns every live task sharing one observer surface. New
//! tasks are auto-queued while others are active unless smart queueing
//! finds no volume conflict; when a task finishes or is paused the most
//! recently queued task is promoted. A task that aborts on error pauses
//! the remaining queued tasks so parallel failures do not compound.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use porter_config::Config;
use porter_device::{Volume, VolumeInspector};
use porter_types::{Error, FinishSummary, Result, TaskId, TaskObserver, TaskState};
use tracing::{debug, info, warn};

use crate::executor::TaskExecutor;
use crate::task::{Task, TaskSettings, TaskSnapshot, TaskSpec};

struct Entry {
    task: Arc<Task>,
    submitted_seq: u64,
}

/// Registry and queue policy for concurrently active tasks
pub struct Scheduler {
    config: Config,
    settings: TaskSettings,
    executor: TaskExecutor,
    inspector: VolumeInspector,
    entries: Mutex<Vec<Entry>>,
    seq: AtomicU64,
}

impl Scheduler {
    /// Create a scheduler with the given configuration and observer
    pub fn new(config: Config, observer: Arc<dyn TaskObserver>) -> Arc<Self> {
        let settings = TaskSettings::from(&config);
        Arc::new(Self {
            config,
            settings,
            executor: TaskExecutor::new(observer),
            inspector: VolumeInspector::new(),
            entries: Mutex::new(Vec::new()),
            seq: AtomicU64::new(0),
        })
    }

    /// Submit a task for execution
    ///
    /// The task starts immediately or queued, per the queueing policy.
    /// The returned handle outlives the registry entry: it stays valid
    /// after the task finishes and is removed.
    pub async fn submit(self: &Arc<Self>, spec: TaskSpec) -> Result<Arc<Task>> {
        let task = Task::with_settings(spec, self.settings.clone())?;

        if self.should_queue(&task).await {
            task.queue();
        }

        let submitted_seq = self.seq.fetch_add(1, Ordering::Relaxed);
        self.lock_entries().push(Entry {
            task: Arc::clone(&task),
            submitted_seq,
        });
        info!(
            "Task {} submitted ({}, {})",
            task.id(),
            task.kind(),
            if task.snapshot().state == TaskState::Queued {
                "queued"
            } else {
                "running"
            }
        );

        let scheduler = Arc::clone(self);
        let running = Arc::clone(&task);
        tokio::spawn(async move {
            let summary = scheduler.executor.run(Arc::clone(&running)).await;
            scheduler.on_task_finished(&running, summary).await;
        });

        Ok(task)
    }

    /// Look up a live task by id
    pub fn get(&self, id: TaskId) -> Option<Arc<Task>> {
        self.lock_entries()
            .iter()
            .find(|entry| entry.task.id() == id)
            .map(|entry| Arc::clone(&entry.task))
    }

    /// Snapshot handles of every live task
    pub fn tasks(&self) -> Vec<Arc<Task>> {
        self.lock_entries()
            .iter()
            .map(|entry| Arc::clone(&entry.task))
            .collect()
    }

    /// Number of live tasks
    pub fn len(&self) -> usize {
        self.lock_entries().len()
    }

    /// Check whether no tasks are live
    pub fn is_empty(&self) -> bool {
        self.lock_entries().is_empty()
    }

    /// Pause a live task, then re-evaluate the queue
    pub async fn pause(&self, id: TaskId) -> Result<()> {
        let task = self
            .get(id)
            .ok_or_else(|| Error::other(format!("Task {} not found", id)))?;
        task.pause();
        self.start_next_queued().await;
        Ok(())
    }

    /// Resume a paused or queued task
    pub fn resume(&self, id: TaskId) -> Result<()> {
        let task = self
            .get(id)
            .ok_or_else(|| Error::other(format!("Task {} not found", id)))?;
        task.resume();
        Ok(())
    }

    /// Queue a live task
    pub fn queue(&self, id: TaskId) -> Result<()> {
        let task = self
            .get(id)
            .ok_or_else(|| Error::other(format!("Task {} not found", id)))?;
        task.queue();
        Ok(())
    }

    /// Cancel a live task
    ///
    /// The registry entry is removed when its executor unwinds and the
    /// queue is re-evaluated then.
    pub fn cancel(&self, id: TaskId) -> Result<()> {
        let task = self
            .get(id)
            .ok_or_else(|| Error::other(format!("Task {} not found", id)))?;
        task.cancel();
        Ok(())
    }

    /// Pause every queued task, except one
    ///
    /// Called when an error propagates in `except`: queued work is held
    /// back rather than silently failing in parallel.
    pub fn pause_all_queued(&self, except: Option<TaskId>) {
        let queued: Vec<Arc<Task>> = self
            .lock_entries()
            .iter()
            .filter(|entry| Some(entry.task.id()) != except)
            .filter(|entry| entry.task.snapshot().state == TaskState::Queued)
            .map(|entry| Arc::clone(&entry.task))
            .collect();
        for task in queued {
            debug!("Pausing queued task {}", task.id());
            task.pause();
        }
    }

    /// Promote queued tasks according to the queueing policy
    pub async fn start_next_queued(&self) {
        let (mut queued, mut active) = {
            let entries = self.lock_entries();
            let mut queued: Vec<(u64, Arc<Task>)> = Vec::new();
            let mut active: Vec<Arc<Task>> = Vec::new();
            for entry in entries.iter() {
                match entry.task.snapshot().state {
                    TaskState::Queued => {
                        queued.push((entry.submitted_seq, Arc::clone(&entry.task)));
                    }
                    state if is_active(state) => active.push(Arc::clone(&entry.task)),
                    _ => {}
                }
            }
            (queued, active)
        };

        if queued.is_empty() {
            return;
        }
        // Most recently queued first.
        queued.sort_by(|a, b| b.0.cmp(&a.0));

        if self.config.queueing.smart {
            for (_, task) in queued {
                match self.volume_conflict(&task, &active).await {
                    Ok(false) => {
                        debug!("Promoting queued task {} (no volume conflict)", task.id());
                        task.resume();
                        active.push(task);
                    }
                    Ok(true) => {}
                    Err(e) => {
                        // Lookup failure degrades to "conflict".
                        warn!("Volume lookup failed for task {}: {}", task.id(), e);
                    }
                }
            }
        } else {
            let limit = self.config.queueing.live_task_limit.get();
            let slots = limit.saturating_sub(active.len());
            for (_, task) in queued.into_iter().take(slots) {
                debug!("Promoting queued task {}", task.id());
                task.resume();
            }
        }
    }

    async fn should_queue(&self, task: &Task) -> bool {
        if !self.config.queueing.auto_queue {
            return false;
        }

        let active: Vec<Arc<Task>> = self
            .lock_entries()
            .iter()
            .filter(|entry| is_active(entry.task.snapshot().state))
            .map(|entry| Arc::clone(&entry.task))
            .collect();
        if active.is_empty() {
            return false;
        }

        if self.config.queueing.smart {
            !matches!(self.volume_conflict(task, &active).await, Ok(false))
        } else {
            active.len() >= self.config.queueing.live_task_limit.get()
        }
    }

    /// Check whether a task's volume set intersects any of `others`
    async fn volume_conflict(&self, task: &Task, others: &[Arc<Task>]) -> Result<bool> {
        let mine = self.task_volumes(task).await?;
        for other in others {
            let theirs = self.task_volumes(other).await?;
            let conflict = mine
                .iter()
                .any(|a| theirs.iter().any(|b| a.conflicts_with(*b)));
            if conflict {
                return Ok(true);
            }
        }
        Ok(false)
    }

    async fn task_volumes(&self, task: &Task) -> Result<Vec<Volume>> {
        let mut paths = task.spec().sources.clone();
        if let Some(dest) = &task.spec().dest_dir {
            paths.push(dest.clone());
        }
        self.inspector.volumes_of(&paths).await
    }

    async fn on_task_finished(&self, task: &Arc<Task>, summary: FinishSummary) {
        info!(
            "Task {} left the registry: {:?} ({} errors)",
            task.id(),
            summary.outcome(),
            summary.error_count
        );
        self.lock_entries()
            .retain(|entry| entry.task.id() != task.id());

        let error_abort = summary.aborted && summary.error_count > 0;
        if error_abort && self.config.queueing.pause_queued_on_error {
            self.pause_all_queued(Some(task.id()));
        } else {
            self.start_next_queued().await;
        }
    }

    fn lock_entries(&self) -> MutexGuard<'_, Vec<Entry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Snapshots of every live task, for the polling surface
    pub fn snapshots(&self) -> Vec<TaskSnapshot> {
        self.lock_entries()
            .iter()
            .map(|entry| entry.task.snapshot())
            .collect()
    }
}

impl std::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler")
            .field("tasks", &self.len())
            .finish_non_exhaustive()
    }
}

/// States that count as actively using the disk
fn is_active(state: TaskState) -> bool {
    matches!(
        state,
        TaskState::Running
            | TaskState::QueryingConflict
            | TaskState::SizeTimeoutPending
            | TaskState::Erroring
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use porter_types::{NullObserver, OverwritePolicy};
    use std::time::Duration;
    use tempfile::TempDir;

    fn scheduler_with(config: Config) -> Arc<Scheduler> {
        Scheduler::new(config, Arc::new(NullObserver))
    }

    async fn wait_for<F: Fn() -> bool>(what: &str, predicate: F) {
        for _ in 0..200 {
            if predicate() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("timed out waiting for {}", what);
    }

    /// A copy task that parks in the conflict rendezvous
    async fn blocking_copy_spec(temp: &TempDir, tag: &str) -> TaskSpec {
        let source_dir = temp.path().join(format!("src-{}", tag));
        let dest_dir = temp.path().join(format!("dst-{}", tag));
        tokio::fs::create_dir_all(&source_dir).await.unwrap();
        tokio::fs::create_dir_all(&dest_dir).await.unwrap();
        tokio::fs::write(source_dir.join("f"), b"new").await.unwrap();
        tokio::fs::write(dest_dir.join("f"), b"old").await.unwrap();
        TaskSpec::copy(vec![source_dir.join("f")], dest_dir)
            .with_overwrite_policy(OverwritePolicy::Ask)
    }

    #[tokio::test]
    async fn test_submit_runs_and_removes() {
        let temp = TempDir::new().unwrap();
        tokio::fs::write(temp.path().join("f"), b"x").await.unwrap();

        let scheduler = scheduler_with(Config::default());
        let task = scheduler
            .submit(TaskSpec::copy(
                vec![temp.path().join("f")],
                temp.path().join("out"),
            ))
            .await
            .unwrap();

        let summary = task.wait_finished().await;
        assert!(!summary.aborted);
        wait_for("registry removal", || scheduler.is_empty()).await;
    }

    #[tokio::test]
    async fn test_second_task_is_queued_and_promoted() {
        let temp = TempDir::new().unwrap();
        let scheduler = scheduler_with(Config::default());

        // First task parks on an unanswered overwrite query.
        let first = scheduler
            .submit(blocking_copy_spec(&temp, "a").await)
            .await
            .unwrap();
        wait_for("first task querying", || {
            first.snapshot().state == TaskState::QueryingConflict
        })
        .await;

        // Second task must be held back.
        tokio::fs::write(temp.path().join("g"), b"x").await.unwrap();
        let second = scheduler
            .submit(TaskSpec::copy(
                vec![temp.path().join("g")],
                temp.path().join("out"),
            ))
            .await
            .unwrap();
        assert_eq!(second.snapshot().state, TaskState::Queued);

        // Cancelling the first promotes the second.
        first.cancel();
        let summary = second.wait_finished().await;
        assert!(!summary.aborted);
        assert!(temp.path().join("out/g").exists());
    }

    #[tokio::test]
    async fn test_auto_queue_disabled_runs_immediately() {
        let temp = TempDir::new().unwrap();
        let mut config = Config::default();
        config.queueing.auto_queue = false;
        let scheduler = scheduler_with(config);

        let first = scheduler
            .submit(blocking_copy_spec(&temp, "a").await)
            .await
            .unwrap();
        wait_for("first task querying", || {
            first.snapshot().state == TaskState::QueryingConflict
        })
        .await;

        tokio::fs::write(temp.path().join("g"), b"x").await.unwrap();
        let second = scheduler
            .submit(TaskSpec::copy(
                vec![temp.path().join("g")],
                temp.path().join("out"),
            ))
            .await
            .unwrap();

        let summary = second.wait_finished().await;
        assert!(!summary.aborted);

        first.cancel();
        first.wait_finished().await;
    }

    #[tokio::test]
    async fn test_pause_all_queued_except() {
        let temp = TempDir::new().unwrap();
        let scheduler = scheduler_with(Config::default());

        let first = scheduler
            .submit(blocking_copy_spec(&temp, "a").await)
            .await
            .unwrap();
        wait_for("first task querying", || {
            first.snapshot().state == TaskState::QueryingConflict
        })
        .await;

        tokio::fs::write(temp.path().join("g"), b"x").await.unwrap();
        let second = scheduler
            .submit(TaskSpec::copy(
                vec![temp.path().join("g")],
                temp.path().join("out"),
            ))
            .await
            .unwrap();
        assert_eq!(second.snapshot().state, TaskState::Queued);

        scheduler.pause_all_queued(None);
        assert_eq!(second.snapshot().state, TaskState::Paused);

        second.cancel();
        first.cancel();
        first.wait_finished().await;
        second.wait_finished().await;
    }

    #[tokio::test]
    async fn test_command_on_unknown_task_fails() {
        let scheduler = scheduler_with(Config::default());
        assert!(scheduler.resume(TaskId::new()).is_err());
        assert!(scheduler.cancel(TaskId::new()).is_err());
        assert!(scheduler.pause(TaskId::new()).await.is_err());
    }
}

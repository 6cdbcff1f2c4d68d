//! Conflict rendezvous: blocking handshake for overwrite decisions
//!
//! When the executor finds an existing destination it publishes the
//! colliding paths, notifies the observer, and parks until someone calls
//! `answer_overwrite` on the task. The wait is raced against the task's
//! cancellation token, so `cancel()` always releases the waiter. At most
//! one query is outstanding per task.

use std::path::{Path, PathBuf};

use porter_types::{ConflictResolution, Error, Result, TaskEvent, TaskObserver, TaskState};
use tokio::sync::oneshot;
use tracing::debug;

use crate::task::{PendingQuery, Task};

/// How the executor should proceed with a colliding item
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum CollisionOutcome {
    /// Leave the destination untouched and move on
    Skip,
    /// Remove the existing destination, then write to it
    Overwrite,
    /// Write to this alternative path instead
    WriteTo(PathBuf),
}

/// Resolve a destination collision, asking the observer when needed
///
/// Applies the task's sticky overwrite policy first; only `Ask` raises a
/// query. A `Pause` answer suspends the task and re-queries after resume.
/// A `Cancel` answer (or task cancellation) aborts via `Err(Cancelled)`.
pub(crate) async fn resolve_collision(
    task: &Task,
    observer: &dyn TaskObserver,
    source: &Path,
    dest: &Path,
) -> Result<CollisionOutcome> {
    loop {
        // Sticky or one-shot policy set earlier may already decide.
        let decided = {
            let mut shared = task.lock();
            let policy = shared.overwrite_policy;
            let decided = policy.resolve();
            if decided.is_some() {
                shared.overwrite_policy = policy.after_use();
            }
            decided
        };

        let resolution = match decided {
            Some(resolution) => resolution,
            None => ask_overwrite(task, observer, source, dest).await?,
        };

        if let Some(sticky) = resolution.sticky_policy() {
            task.lock().overwrite_policy = sticky;
        }

        match resolution {
            ConflictResolution::Skip | ConflictResolution::SkipAll => {
                return Ok(CollisionOutcome::Skip);
            }
            ConflictResolution::Overwrite | ConflictResolution::OverwriteAll => {
                return Ok(CollisionOutcome::Overwrite);
            }
            ConflictResolution::Rename(name) => {
                let parent = dest.parent().unwrap_or_else(|| Path::new(""));
                return Ok(CollisionOutcome::WriteTo(parent.join(name)));
            }
            ConflictResolution::AutoRename | ConflictResolution::AutoRenameAll => {
                return Ok(CollisionOutcome::WriteTo(auto_rename_path(dest)));
            }
            ConflictResolution::Pause => {
                // Idle until resumed, then ask again.
                task.pause();
                task.checkpoint().await?;
            }
            ConflictResolution::Cancel => {
                task.request_abort();
                return Err(Error::Cancelled);
            }
        }
    }
}

/// Publish a query and park until a resolution arrives
async fn ask_overwrite(
    task: &Task,
    observer: &dyn TaskObserver,
    source: &Path,
    dest: &Path,
) -> Result<ConflictResolution> {
    let rx = {
        let mut shared = task.lock();
        // Invariant: at most one outstanding rendezvous per task.
        debug_assert!(shared.pending_query.is_none());
        let (tx, rx) = oneshot::channel();
        shared.pending_query = Some(PendingQuery {
            source: source.to_path_buf(),
            dest: dest.to_path_buf(),
            reply: tx,
        });
        shared.transition(TaskState::QueryingConflict);
        rx
    };

    debug!(
        "Task {} querying overwrite: '{}' -> '{}'",
        task.id(),
        source.display(),
        dest.display()
    );

    // Notify outside the lock; the observer must not block here.
    let event = TaskEvent::QueryOverwrite {
        source: source.to_path_buf(),
        dest: dest.to_path_buf(),
    };
    if !observer.on_event(task.id(), &event) {
        task.request_abort();
    }

    let resolution = tokio::select! {
        answer = rx => answer.unwrap_or(ConflictResolution::Cancel),
        () = task.cancel_token().cancelled() => {
            // Drop the query so no stale waiter hint survives the abort.
            task.lock().pending_query.take();
            ConflictResolution::Cancel
        }
    };

    let mut shared = task.lock();
    if !shared.state.is_terminal() {
        shared.transition(TaskState::Running);
    }
    drop(shared);

    Ok(resolution)
}

/// Generate a non-colliding sibling path
///
/// For "file.txt", tries "file (1).txt", "file (2).txt", and so on, with
/// a timestamp fallback if a thousand probes all collide.
pub fn auto_rename_path(path: &Path) -> PathBuf {
    let parent = path.parent().unwrap_or_else(|| Path::new(""));
    let stem = path.file_stem().and_then(|s| s.to_str()).unwrap_or("");
    let extension = path.extension().and_then(|e| e.to_str());

    for i in 1..1000 {
        let new_name = if let Some(ext) = extension {
            format!("{} ({}).{}", stem, i, ext)
        } else {
            format!("{} ({})", stem, i)
        };

        let new_path = parent.join(&new_name);
        if !new_path.exists() {
            return new_path;
        }
    }

    let timestamp = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);

    let new_name = if let Some(ext) = extension {
        format!("{}_{}.{}", stem, timestamp, ext)
    } else {
        format!("{}_{}", stem, timestamp)
    };

    parent.join(&new_name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::TaskSpec;
    use porter_types::{FnObserver, NullObserver, OverwritePolicy, TaskId};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    fn copy_task(policy: OverwritePolicy) -> Arc<Task> {
        Task::new(
            TaskSpec::copy(vec![PathBuf::from("/src/f")], "/dst").with_overwrite_policy(policy),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_sticky_policy_skips_rendezvous() {
        let task = copy_task(OverwritePolicy::SkipAll);
        let outcome = resolve_collision(
            &task,
            &NullObserver,
            Path::new("/src/f"),
            Path::new("/dst/f"),
        )
        .await
        .unwrap();

        assert_eq!(outcome, CollisionOutcome::Skip);
        assert!(task.snapshot().pending_query.is_none());
    }

    #[tokio::test]
    async fn test_one_shot_policy_decays_to_ask() {
        let task = copy_task(OverwritePolicy::Overwrite);
        let outcome = resolve_collision(
            &task,
            &NullObserver,
            Path::new("/src/f"),
            Path::new("/dst/f"),
        )
        .await
        .unwrap();

        assert_eq!(outcome, CollisionOutcome::Overwrite);
        assert_eq!(
            task.snapshot().pending_query, None
        );
        assert_eq!(task.lock().overwrite_policy, OverwritePolicy::Ask);
    }

    #[tokio::test]
    async fn test_ask_waits_for_answer() {
        let task = copy_task(OverwritePolicy::Ask);
        let queries = Arc::new(AtomicUsize::new(0));

        let observer = {
            let queries = Arc::clone(&queries);
            FnObserver(move |_: TaskId, event: &TaskEvent| {
                if matches!(event, TaskEvent::QueryOverwrite { .. }) {
                    queries.fetch_add(1, Ordering::SeqCst);
                }
                true
            })
        };

        let answerer = {
            let task = Arc::clone(&task);
            tokio::spawn(async move {
                // Wait for the query to be published, then answer it.
                loop {
                    if task.snapshot().pending_query.is_some() {
                        break;
                    }
                    tokio::time::sleep(Duration::from_millis(5)).await;
                }
                assert_eq!(task.snapshot().state, TaskState::QueryingConflict);
                task.answer_overwrite(ConflictResolution::OverwriteAll)
                    .unwrap();
            })
        };

        let outcome = resolve_collision(
            &task,
            &observer,
            Path::new("/src/f"),
            Path::new("/dst/f"),
        )
        .await
        .unwrap();
        answerer.await.unwrap();

        assert_eq!(outcome, CollisionOutcome::Overwrite);
        assert_eq!(queries.load(Ordering::SeqCst), 1);
        // The *All answer installed a sticky policy.
        assert_eq!(
            task.lock().overwrite_policy,
            OverwritePolicy::OverwriteAll
        );
        assert_eq!(task.snapshot().state, TaskState::Running);
    }

    #[tokio::test]
    async fn test_rename_answer_redirects() {
        let task = copy_task(OverwritePolicy::Ask);

        let answerer = {
            let task = Arc::clone(&task);
            tokio::spawn(async move {
                loop {
                    if task.snapshot().pending_query.is_some() {
                        break;
                    }
                    tokio::time::sleep(Duration::from_millis(5)).await;
                }
                task.answer_overwrite(ConflictResolution::Rename("f-copy".into()))
                    .unwrap();
            })
        };

        let outcome = resolve_collision(
            &task,
            &NullObserver,
            Path::new("/src/f"),
            Path::new("/dst/f"),
        )
        .await
        .unwrap();
        answerer.await.unwrap();

        assert_eq!(outcome, CollisionOutcome::WriteTo(PathBuf::from("/dst/f-copy")));
    }

    #[tokio::test]
    async fn test_cancel_releases_waiter() {
        let task = copy_task(OverwritePolicy::Ask);

        let canceller = {
            let task = Arc::clone(&task);
            tokio::spawn(async move {
                loop {
                    if task.snapshot().pending_query.is_some() {
                        break;
                    }
                    tokio::time::sleep(Duration::from_millis(5)).await;
                }
                task.cancel();
            })
        };

        let result = resolve_collision(
            &task,
            &NullObserver,
            Path::new("/src/f"),
            Path::new("/dst/f"),
        )
        .await;
        canceller.await.unwrap();

        assert!(matches!(result, Err(Error::Cancelled)));
        assert!(task.snapshot().abort_requested);
    }

    #[test]
    fn test_auto_rename_path() {
        let path = PathBuf::from("/tmp/porter-test-nonexistent/test.txt");
        let renamed = auto_rename_path(&path);
        assert!(renamed.to_string_lossy().contains("test (1).txt"));
    }

    #[test]
    fn test_auto_rename_no_extension() {
        let path = PathBuf::from("/tmp/porter-test-nonexistent/testfile");
        let renamed = auto_rename_path(&path);
        assert!(renamed.to_string_lossy().contains("testfile (1)"));
    }
}

//! Task executor: performs the requested operation item by item
//!
//! One executor run per task, on its own tokio task. The executor walks
//! the source list (recursively for directories), performs the syscalls,
//! and emits progress/query/error events through the observer. Aborts,
//! pauses, and queue directives are honored at checkpoints between items
//! and between payload chunks, never mid-syscall. Every run emits exactly
//! one finish event.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::Arc;
use std::time::Instant;

use porter_types::{
    ByteEstimate, Error, FinishSummary, ItemError, Result, TaskEvent, TaskKind, TaskObserver,
    TaskState,
};
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tracing::{debug, info, warn};

use crate::estimate::{estimate_totals, Totals};
use crate::rendezvous::{resolve_collision, CollisionOutcome};
use crate::task::Task;

/// Runs tasks against the file system
pub struct TaskExecutor {
    observer: Arc<dyn TaskObserver>,
}

impl TaskExecutor {
    /// Create an executor reporting to the given observer
    pub fn new(observer: Arc<dyn TaskObserver>) -> Self {
        Self { observer }
    }

    /// Run a task to completion
    ///
    /// Consumes pause/queue/cancel directives along the way and emits
    /// exactly one finish event, regardless of abort or error history.
    pub async fn run(&self, task: Arc<Task>) -> FinishSummary {
        info!(
            "Task {} started: {} ({} sources)",
            task.id(),
            task.kind(),
            task.spec().sources.len()
        );
        task.lock().started_at = Some(Instant::now());

        let result = self.run_inner(&task).await;

        let summary = {
            let mut shared = task.lock();
            if result.is_err() {
                shared.abort_requested = true;
            }
            let summary = FinishSummary {
                aborted: shared.abort_requested,
                error_count: shared.error_count,
            };
            shared.finished = Some(summary);
            shared.transition(TaskState::Finished);
            shared.current_source = None;
            shared.current_dest = None;
            summary
        };

        self.observer
            .on_event(task.id(), &TaskEvent::Finish(summary));
        info!("Task {} finished: {:?}", task.id(), summary.outcome());
        summary
    }

    async fn run_inner(&self, task: &Task) -> Result<()> {
        // Honor an initial queue directive before touching the disk.
        task.checkpoint().await?;
        self.prepare_totals(task).await?;

        match task.kind() {
            TaskKind::Copy => self.run_copy(task).await,
            TaskKind::Move => self.run_move(task).await,
            TaskKind::Delete => self.run_delete(task).await,
            TaskKind::Trash => self.run_trash(task).await,
            TaskKind::Link => self.run_link(task).await,
            TaskKind::Permissions => self.run_permissions(task).await,
            TaskKind::Exec => self.run_exec(task).await,
        }
    }

    /// Establish byte/file totals before real work begins
    async fn prepare_totals(&self, task: &Task) -> Result<()> {
        match task.kind() {
            TaskKind::Copy | TaskKind::Move | TaskKind::Delete | TaskKind::Permissions => {
                let budget = task.settings().estimate_budget;
                let sources = task.spec().sources.clone();
                match estimate_totals(sources, budget).await {
                    Some(Totals { files, bytes }) => {
                        let mut shared = task.lock();
                        shared.total_files = Some(files);
                        shared.total_bytes = ByteEstimate::Known(bytes);
                    }
                    None => {
                        let mut shared = task.lock();
                        shared.total_bytes = ByteEstimate::Unknown;
                        shared.transition(TaskState::SizeTimeoutPending);
                    }
                }
            }
            TaskKind::Trash | TaskKind::Link => {
                task.lock().total_files = Some(task.spec().sources.len() as u64);
            }
            TaskKind::Exec => {}
        }
        task.checkpoint().await
    }

    /// Record the item currently being worked on
    fn set_current(&self, task: &Task, index: usize, source: &Path, dest: Option<&Path>) {
        let mut shared = task.lock();
        shared.current_index = index;
        shared.current_source = Some(source.to_path_buf());
        shared.current_dest = dest.map(Path::to_path_buf);
        if shared.state == TaskState::SizeTimeoutPending {
            shared.transition(TaskState::Running);
        }
    }

    /// Emit a progress event; an observer veto requests an abort
    fn emit_progress(&self, task: &Task) {
        if !self.observer.on_event(task.id(), &TaskEvent::Progress) {
            task.request_abort();
        }
    }

    /// Record a per-item error and escalate through the error policy
    ///
    /// Returns `Err(Cancelled)` when the policy (or the observer) demands
    /// an abort, which unwinds the run to its finish emission.
    fn record_error(&self, task: &Task, error: ItemError) -> Result<()> {
        let policy_abort = {
            let mut shared = task.lock();
            shared.error_count += 1;
            if shared.current_index == 0 {
                shared.first_item_errored = true;
            }
            shared.log.push(format!("error: {}", error));
            shared.transition(TaskState::Erroring);
            task.spec()
                .error_policy
                .should_abort(shared.error_count, shared.first_item_errored)
        };
        warn!("Task {} item error: {}", task.id(), error);

        let keep_going = self
            .observer
            .on_event(task.id(), &TaskEvent::Error(error));

        {
            let mut shared = task.lock();
            if shared.state == TaskState::Erroring {
                shared.transition(TaskState::Running);
            }
        }

        if policy_abort || !keep_going {
            task.request_abort();
            return Err(Error::Cancelled);
        }
        Ok(())
    }

    fn record_io_error(
        &self,
        task: &Task,
        path: &Path,
        operation: &str,
        error: &std::io::Error,
    ) -> Result<()> {
        self.record_error(task, ItemError::new(path, operation, error))
    }

    /// Destination directory for kinds that have one
    fn dest_dir(task: &Task) -> Result<PathBuf> {
        task.spec()
            .dest_dir
            .clone()
            .ok_or_else(|| Error::config("Task has no destination directory"))
    }

    async fn ensure_dest_dir(&self, task: &Task, dest_dir: &Path) -> Result<()> {
        if let Err(e) = tokio::fs::create_dir_all(dest_dir).await {
            self.record_io_error(task, dest_dir, "create destination", &e)?;
        }
        Ok(())
    }

    // ---- copy ----------------------------------------------------------

    async fn run_copy(&self, task: &Task) -> Result<()> {
        let dest_dir = Self::dest_dir(task)?;
        self.ensure_dest_dir(task, &dest_dir).await?;

        for (index, source) in task.spec().sources.iter().enumerate() {
            task.checkpoint().await?;
            let Some(name) = source.file_name() else {
                self.record_error(
                    task,
                    ItemError::message(source, "copy", "Source has no file name"),
                )?;
                continue;
            };
            let dest = dest_dir.join(name);
            self.set_current(task, index, source, Some(&dest));
            self.copy_item(task, source, &dest).await?;
            self.emit_progress(task);
        }
        Ok(())
    }

    /// Copy one item, file or directory
    async fn copy_item(&self, task: &Task, source: &Path, dest: &Path) -> Result<()> {
        let metadata = match tokio::fs::symlink_metadata(source).await {
            Ok(metadata) => metadata,
            Err(e) => {
                self.record_io_error(task, source, "stat", &e)?;
                return Ok(());
            }
        };

        if metadata.is_dir() {
            self.copy_dir(task, source, dest).await
        } else {
            self.copy_file(task, source, dest).await
        }
    }

    /// Recursively copy a directory, merging into existing destinations
    fn copy_dir<'a>(
        &'a self,
        task: &'a Task,
        source: &'a Path,
        dest: &'a Path,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>> {
        Box::pin(async move {
            let mut dest = dest.to_path_buf();

            match tokio::fs::symlink_metadata(&dest).await {
                Ok(existing) if existing.is_dir() => {
                    // Existing directory: merge into it.
                }
                Ok(_) => {
                    // A non-directory stands where the directory would go.
                    match resolve_collision(task, self.observer.as_ref(), source, &dest).await? {
                        CollisionOutcome::Skip => return Ok(()),
                        CollisionOutcome::Overwrite => {
                            if let Err(e) = tokio::fs::remove_file(&dest).await {
                                self.record_io_error(task, &dest, "remove", &e)?;
                                return Ok(());
                            }
                        }
                        CollisionOutcome::WriteTo(alternative) => dest = alternative,
                    }
                }
                Err(_) => {}
            }

            if tokio::fs::symlink_metadata(&dest).await.is_err() {
                if let Err(e) = tokio::fs::create_dir_all(&dest).await {
                    self.record_io_error(task, &dest, "create directory", &e)?;
                    return Ok(());
                }
            }

            let mut entries = match tokio::fs::read_dir(source).await {
                Ok(entries) => entries,
                Err(e) => {
                    self.record_io_error(task, source, "read directory", &e)?;
                    return Ok(());
                }
            };

            loop {
                task.checkpoint().await?;
                let entry = match entries.next_entry().await {
                    Ok(Some(entry)) => entry,
                    Ok(None) => break,
                    Err(e) => {
                        self.record_io_error(task, source, "read directory", &e)?;
                        break;
                    }
                };

                let child_source = entry.path();
                let child_dest = dest.join(entry.file_name());
                let file_type = match entry.file_type().await {
                    Ok(file_type) => file_type,
                    Err(e) => {
                        self.record_io_error(task, &child_source, "stat", &e)?;
                        continue;
                    }
                };

                if file_type.is_dir() {
                    self.copy_dir(task, &child_source, &child_dest).await?;
                } else {
                    self.copy_file(task, &child_source, &child_dest).await?;
                }
            }
            Ok(())
        })
    }

    /// Copy one file, resolving a destination collision first
    async fn copy_file(&self, task: &Task, source: &Path, dest: &Path) -> Result<()> {
        let mut dest = dest.to_path_buf();

        if tokio::fs::symlink_metadata(&dest).await.is_ok() {
            match resolve_collision(task, self.observer.as_ref(), source, &dest).await? {
                CollisionOutcome::Skip => return Ok(()),
                CollisionOutcome::Overwrite => {
                    if let Err(e) = remove_any(&dest).await {
                        self.record_io_error(task, &dest, "remove", &e)?;
                        return Ok(());
                    }
                }
                CollisionOutcome::WriteTo(alternative) => dest = alternative,
            }
        }

        {
            let mut shared = task.lock();
            shared.current_source = Some(source.to_path_buf());
            shared.current_dest = Some(dest.clone());
        }

        match self.copy_payload(task, source, &dest).await {
            Ok(()) => {
                task.lock().files_done += 1;
                Ok(())
            }
            Err(Error::Cancelled) => Err(Error::Cancelled),
            Err(error) => {
                let mut item = ItemError::message(source, "copy", error.to_string());
                item.permission_denied = error.is_permission_denied();
                self.record_error(task, item)?;
                Ok(())
            }
        }
    }

    /// Copy file contents in bounded chunks with checkpoints in between
    async fn copy_payload(&self, task: &Task, source: &Path, dest: &Path) -> Result<()> {
        let chunk_size = task.settings().chunk_size;

        let mut reader = tokio::fs::File::open(source)
            .await
            .map_err(|e| Error::io(source, &e))?;
        let mut writer = tokio::fs::File::create(dest)
            .await
            .map_err(|e| Error::io(dest, &e))?;

        let mut buffer = vec![0u8; chunk_size];
        loop {
            task.checkpoint().await?;
            let read = reader
                .read(&mut buffer)
                .await
                .map_err(|e| Error::io(source, &e))?;
            if read == 0 {
                break;
            }
            writer
                .write_all(&buffer[..read])
                .await
                .map_err(|e| Error::io(dest, &e))?;
            task.lock().bytes_transferred += read as u64;
        }
        writer.flush().await.map_err(|e| Error::io(dest, &e))?;
        drop(writer);

        if task.settings().preserve_timestamps {
            preserve_metadata(source, dest).await;
        }
        Ok(())
    }

    // ---- move ----------------------------------------------------------

    async fn run_move(&self, task: &Task) -> Result<()> {
        let dest_dir = Self::dest_dir(task)?;
        self.ensure_dest_dir(task, &dest_dir).await?;

        for (index, source) in task.spec().sources.iter().enumerate() {
            task.checkpoint().await?;
            let Some(name) = source.file_name() else {
                self.record_error(
                    task,
                    ItemError::message(source, "move", "Source has no file name"),
                )?;
                continue;
            };
            let dest = dest_dir.join(name);
            self.set_current(task, index, source, Some(&dest));
            self.move_item(task, source, &dest).await?;
            self.emit_progress(task);
        }
        Ok(())
    }

    async fn move_item(&self, task: &Task, source: &Path, dest: &Path) -> Result<()> {
        let mut dest = dest.to_path_buf();

        if tokio::fs::symlink_metadata(&dest).await.is_ok() {
            match resolve_collision(task, self.observer.as_ref(), source, &dest).await? {
                CollisionOutcome::Skip => return Ok(()),
                CollisionOutcome::Overwrite => {
                    if let Err(e) = remove_any(&dest).await {
                        self.record_io_error(task, &dest, "remove", &e)?;
                        return Ok(());
                    }
                }
                CollisionOutcome::WriteTo(alternative) => dest = alternative,
            }
        }

        match tokio::fs::rename(source, &dest).await {
            Ok(()) => {
                // A pure rename is instant; account for the moved payload
                // so percent still converges on the estimate.
                let moved = dest.clone();
                let totals =
                    tokio::task::spawn_blocking(move || crate::estimate::walk_path_totals(&moved))
                        .await
                        .unwrap_or_default();
                let mut shared = task.lock();
                shared.files_done += totals.files;
                shared.bytes_transferred += totals.bytes;
                Ok(())
            }
            Err(e) if is_cross_device(&e) => {
                debug!(
                    "Task {} crossing devices for '{}'; falling back to copy+delete",
                    task.id(),
                    source.display()
                );
                let errors_before = task.lock().error_count;
                self.copy_item(task, source, &dest).await?;
                if task.lock().error_count == errors_before {
                    if let Err(e) = remove_any(source).await {
                        self.record_io_error(task, source, "remove source", &e)?;
                    }
                } else {
                    // Keep the source when the copy half had failures.
                    warn!(
                        "Task {} kept '{}' after partial cross-device copy",
                        task.id(),
                        source.display()
                    );
                }
                Ok(())
            }
            Err(e) => {
                self.record_io_error(task, source, "move", &e)?;
                Ok(())
            }
        }
    }

    // ---- delete / trash ------------------------------------------------

    async fn run_delete(&self, task: &Task) -> Result<()> {
        for (index, source) in task.spec().sources.iter().enumerate() {
            task.checkpoint().await?;
            self.set_current(task, index, source, None);
            self.delete_item(task, source).await?;
            self.emit_progress(task);
        }
        Ok(())
    }

    /// Recursively delete, bottom-up, counting each removed file
    fn delete_item<'a>(
        &'a self,
        task: &'a Task,
        path: &'a Path,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>> {
        Box::pin(async move {
            let metadata = match tokio::fs::symlink_metadata(path).await {
                Ok(metadata) => metadata,
                Err(e) => {
                    self.record_io_error(task, path, "stat", &e)?;
                    return Ok(());
                }
            };

            if metadata.is_dir() {
                let mut entries = match tokio::fs::read_dir(path).await {
                    Ok(entries) => entries,
                    Err(e) => {
                        self.record_io_error(task, path, "read directory", &e)?;
                        return Ok(());
                    }
                };
                loop {
                    task.checkpoint().await?;
                    match entries.next_entry().await {
                        Ok(Some(entry)) => self.delete_item(task, &entry.path()).await?,
                        Ok(None) => break,
                        Err(e) => {
                            self.record_io_error(task, path, "read directory", &e)?;
                            break;
                        }
                    }
                }
                if let Err(e) = tokio::fs::remove_dir(path).await {
                    self.record_io_error(task, path, "remove directory", &e)?;
                }
            } else {
                match tokio::fs::remove_file(path).await {
                    Ok(()) => task.lock().files_done += 1,
                    Err(e) => self.record_io_error(task, path, "remove", &e)?,
                }
            }
            Ok(())
        })
    }

    async fn run_trash(&self, task: &Task) -> Result<()> {
        for (index, source) in task.spec().sources.iter().enumerate() {
            task.checkpoint().await?;
            self.set_current(task, index, source, None);

            let path = source.clone();
            let result = tokio::task::spawn_blocking(move || trash::delete(&path)).await;
            match result {
                Ok(Ok(())) => task.lock().files_done += 1,
                Ok(Err(e)) => {
                    self.record_error(
                        task,
                        ItemError::message(source, "trash", e.to_string()),
                    )?;
                }
                Err(join_error) => {
                    self.record_error(
                        task,
                        ItemError::message(source, "trash", join_error.to_string()),
                    )?;
                }
            }
            self.emit_progress(task);
        }
        Ok(())
    }

    // ---- link ----------------------------------------------------------

    async fn run_link(&self, task: &Task) -> Result<()> {
        let dest_dir = Self::dest_dir(task)?;
        self.ensure_dest_dir(task, &dest_dir).await?;

        for (index, source) in task.spec().sources.iter().enumerate() {
            task.checkpoint().await?;
            let Some(name) = source.file_name() else {
                self.record_error(
                    task,
                    ItemError::message(source, "link", "Source has no file name"),
                )?;
                continue;
            };
            let mut dest = dest_dir.join(name);
            self.set_current(task, index, source, Some(&dest));

            if tokio::fs::symlink_metadata(&dest).await.is_ok() {
                match resolve_collision(task, self.observer.as_ref(), source, &dest).await? {
                    CollisionOutcome::Skip => {
                        self.emit_progress(task);
                        continue;
                    }
                    CollisionOutcome::Overwrite => {
                        if let Err(e) = remove_any(&dest).await {
                            self.record_io_error(task, &dest, "remove", &e)?;
                            self.emit_progress(task);
                            continue;
                        }
                    }
                    CollisionOutcome::WriteTo(alternative) => dest = alternative,
                }
            }

            match symlink(source, &dest).await {
                Ok(()) => task.lock().files_done += 1,
                Err(e) => self.record_io_error(task, &dest, "link", &e)?,
            }
            self.emit_progress(task);
        }
        Ok(())
    }

    // ---- permissions ---------------------------------------------------

    async fn run_permissions(&self, task: &Task) -> Result<()> {
        for (index, source) in task.spec().sources.iter().enumerate() {
            task.checkpoint().await?;
            self.set_current(task, index, source, None);
            self.apply_permissions(task, source, task.spec().recursive)
                .await?;
            self.emit_progress(task);
        }
        Ok(())
    }

    /// Apply mode/ownership to one path, recursing when requested
    fn apply_permissions<'a>(
        &'a self,
        task: &'a Task,
        path: &'a Path,
        recursive: bool,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>> {
        Box::pin(async move {
            if let Err(e) = chmod_chown(task, path).await {
                let mut item = ItemError::message(path, "chmod/chown", e.to_string());
                item.permission_denied = e.is_permission_denied();
                self.record_error(task, item)?;
                return Ok(());
            }
            task.lock().files_done += 1;

            let is_dir = tokio::fs::symlink_metadata(path)
                .await
                .map(|m| m.is_dir())
                .unwrap_or(false);
            if recursive && is_dir {
                let mut entries = match tokio::fs::read_dir(path).await {
                    Ok(entries) => entries,
                    Err(e) => {
                        self.record_io_error(task, path, "read directory", &e)?;
                        return Ok(());
                    }
                };
                loop {
                    task.checkpoint().await?;
                    match entries.next_entry().await {
                        Ok(Some(entry)) => {
                            self.apply_permissions(task, &entry.path(), true).await?;
                        }
                        Ok(None) => break,
                        Err(e) => {
                            self.record_io_error(task, path, "read directory", &e)?;
                            break;
                        }
                    }
                }
            }
            Ok(())
        })
    }

    // ---- exec ----------------------------------------------------------

    async fn run_exec(&self, task: &Task) -> Result<()> {
        let command = task.spec().command.clone();
        {
            let mut shared = task.lock();
            shared.current_source = Some(PathBuf::from(command.join(" ")));
            shared.log.push(format!("$ {}", command.join(" ")));
        }

        let mut child = match tokio::process::Command::new(&command[0])
            .args(&command[1..])
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::piped())
            .spawn()
        {
            Ok(child) => child,
            Err(e) => return self.exec_failure(task, &command[0], &e.to_string()),
        };

        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        let mut stdout_lines = stdout.map(|out| BufReader::new(out).lines());
        let mut stderr_lines = stderr.map(|err| BufReader::new(err).lines());
        let mut stdout_done = stdout_lines.is_none();
        let mut stderr_done = stderr_lines.is_none();

        while !(stdout_done && stderr_done) {
            tokio::select! {
                line = next_line(&mut stdout_lines), if !stdout_done => match line {
                    Some(line) => task.lock().log.push(line),
                    None => stdout_done = true,
                },
                line = next_line(&mut stderr_lines), if !stderr_done => match line {
                    Some(line) => task.lock().log.push(line),
                    None => stderr_done = true,
                },
                () = task.cancel_token().cancelled() => {
                    let _ = child.kill().await;
                    return Err(Error::Cancelled);
                }
            }
        }

        let status = tokio::select! {
            status = child.wait() => status,
            () = task.cancel_token().cancelled() => {
                let _ = child.kill().await;
                return Err(Error::Cancelled);
            }
        };

        match status {
            Ok(status) if status.success() => {
                task.lock().files_done += 1;
                self.emit_progress(task);
                Ok(())
            }
            Ok(status) => self.exec_failure(task, &command[0], &format!("exited with {}", status)),
            Err(e) => self.exec_failure(task, &command[0], &e.to_string()),
        }
    }

    /// Any exec failure is fatal to the task regardless of error policy
    fn exec_failure(&self, task: &Task, command: &str, message: &str) -> Result<()> {
        let _ = self.record_error(
            task,
            ItemError::message(PathBuf::from(command), "exec", message),
        );
        task.request_abort();
        Err(Error::Cancelled)
    }
}

impl std::fmt::Debug for TaskExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskExecutor").finish_non_exhaustive()
    }
}

/// Next line from an optional line reader; `None` signals end of stream
async fn next_line<R: tokio::io::AsyncRead + Unpin>(
    lines: &mut Option<tokio::io::Lines<BufReader<R>>>,
) -> Option<String> {
    match lines {
        Some(lines) => lines.next_line().await.ok().flatten(),
        None => None,
    }
}

/// Remove a path whatever it is
async fn remove_any(path: &Path) -> std::io::Result<()> {
    let metadata = tokio::fs::symlink_metadata(path).await?;
    if metadata.is_dir() {
        tokio::fs::remove_dir_all(path).await
    } else {
        tokio::fs::remove_file(path).await
    }
}

/// Create a symbolic link to `source` at `dest`
#[cfg(unix)]
async fn symlink(source: &Path, dest: &Path) -> std::io::Result<()> {
    tokio::fs::symlink(source, dest).await
}

/// Create a symbolic link to `source` at `dest`
#[cfg(windows)]
async fn symlink(source: &Path, dest: &Path) -> std::io::Result<()> {
    if tokio::fs::metadata(source).await.map(|m| m.is_dir()).unwrap_or(false) {
        tokio::fs::symlink_dir(source, dest).await
    } else {
        tokio::fs::symlink_file(source, dest).await
    }
}

/// Apply the task's mode/owner/group to one path
async fn chmod_chown(task: &Task, path: &Path) -> Result<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;

        let spec = task.spec();
        if let Some(mode) = spec.mode {
            tokio::fs::set_permissions(path, std::fs::Permissions::from_mode(mode))
                .await
                .map_err(|e| Error::io(path, &e))?;
        }
        if spec.owner.is_some() || spec.group.is_some() {
            std::os::unix::fs::chown(path, spec.owner, spec.group)
                .map_err(|e| Error::io(path, &e))?;
        }
        Ok(())
    }
    #[cfg(not(unix))]
    {
        let _ = task;
        Err(Error::other(format!(
            "Permission changes are not supported on this platform: {}",
            path.display()
        )))
    }
}

/// Best-effort timestamp and permission-bit preservation after a copy
async fn preserve_metadata(source: &Path, dest: &Path) {
    let metadata = match tokio::fs::metadata(source).await {
        Ok(metadata) => metadata,
        Err(e) => {
            debug!("Skipping metadata for '{}': {}", source.display(), e);
            return;
        }
    };

    let accessed = metadata
        .accessed()
        .unwrap_or_else(|_| std::time::SystemTime::now());
    let modified = metadata
        .modified()
        .unwrap_or_else(|_| std::time::SystemTime::now());
    if let Err(e) = filetime::set_file_times(
        dest,
        filetime::FileTime::from_system_time(accessed),
        filetime::FileTime::from_system_time(modified),
    ) {
        debug!("Failed to set times on '{}': {}", dest.display(), e);
    }

    #[cfg(unix)]
    {
        if let Err(e) = tokio::fs::set_permissions(dest, metadata.permissions()).await {
            debug!("Failed to set permissions on '{}': {}", dest.display(), e);
        }
    }
}

/// Check for a rename that failed because it crossed devices
fn is_cross_device(error: &std::io::Error) -> bool {
    #[cfg(unix)]
    {
        error.raw_os_error() == Some(libc::EXDEV)
    }
    #[cfg(windows)]
    {
        // ERROR_NOT_SAME_DEVICE
        error.raw_os_error() == Some(17)
    }
    #[cfg(not(any(unix, windows)))]
    {
        let _ = error;
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::TaskSpec;
    use porter_types::NullObserver;
    use tempfile::TempDir;

    fn executor() -> TaskExecutor {
        TaskExecutor::new(Arc::new(NullObserver))
    }

    #[tokio::test]
    async fn test_copy_single_file() {
        let temp = TempDir::new().unwrap();
        let source = temp.path().join("source.txt");
        let dest_dir = temp.path().join("dest");
        tokio::fs::write(&source, b"test content").await.unwrap();

        let task = Task::new(TaskSpec::copy(vec![source.clone()], &dest_dir)).unwrap();
        let summary = executor().run(Arc::clone(&task)).await;

        assert!(!summary.aborted);
        assert_eq!(summary.error_count, 0);
        let copied = tokio::fs::read(dest_dir.join("source.txt")).await.unwrap();
        assert_eq!(copied, b"test content");

        let snapshot = task.snapshot();
        assert_eq!(snapshot.bytes_transferred, 12);
        assert_eq!(snapshot.total_bytes, ByteEstimate::Known(12));
        assert_eq!(snapshot.state, TaskState::Finished);
    }

    #[tokio::test]
    async fn test_copy_directory_tree() {
        let temp = TempDir::new().unwrap();
        let source_dir = temp.path().join("source");
        let dest_dir = temp.path().join("dest");
        tokio::fs::create_dir_all(source_dir.join("subdir")).await.unwrap();
        tokio::fs::write(source_dir.join("file1.txt"), b"content1")
            .await
            .unwrap();
        tokio::fs::write(source_dir.join("subdir/file2.txt"), b"content2")
            .await
            .unwrap();

        let task = Task::new(TaskSpec::copy(vec![source_dir], &dest_dir)).unwrap();
        let summary = executor().run(Arc::clone(&task)).await;

        assert_eq!(summary.error_count, 0);
        assert!(dest_dir.join("source/file1.txt").exists());
        assert!(dest_dir.join("source/subdir/file2.txt").exists());
        assert_eq!(task.snapshot().files_done, 2);
    }

    #[tokio::test]
    async fn test_missing_source_records_error() {
        let temp = TempDir::new().unwrap();
        let dest_dir = temp.path().join("dest");

        let task = Task::new(TaskSpec::copy(
            vec![temp.path().join("missing.txt")],
            &dest_dir,
        ))
        .unwrap();
        let summary = executor().run(task).await;

        assert!(!summary.aborted);
        assert_eq!(summary.error_count, 1);
    }

    #[tokio::test]
    async fn test_move_within_volume() {
        let temp = TempDir::new().unwrap();
        let source = temp.path().join("a.txt");
        let dest_dir = temp.path().join("dest");
        tokio::fs::write(&source, b"payload").await.unwrap();

        let task = Task::new(TaskSpec::move_into(vec![source.clone()], &dest_dir)).unwrap();
        let summary = executor().run(Arc::clone(&task)).await;

        assert_eq!(summary.error_count, 0);
        assert!(!source.exists());
        assert!(dest_dir.join("a.txt").exists());
        assert_eq!(task.snapshot().files_done, 1);
    }

    #[tokio::test]
    async fn test_delete_tree() {
        let temp = TempDir::new().unwrap();
        let victim = temp.path().join("victim");
        tokio::fs::create_dir_all(victim.join("sub")).await.unwrap();
        tokio::fs::write(victim.join("a"), b"1").await.unwrap();
        tokio::fs::write(victim.join("sub/b"), b"2").await.unwrap();

        let task = Task::new(TaskSpec::delete(vec![victim.clone()])).unwrap();
        let summary = executor().run(Arc::clone(&task)).await;

        assert_eq!(summary.error_count, 0);
        assert!(!victim.exists());
        assert_eq!(task.snapshot().files_done, 2);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_link_sources() {
        let temp = TempDir::new().unwrap();
        let source = temp.path().join("orig.txt");
        let dest_dir = temp.path().join("links");
        tokio::fs::write(&source, b"data").await.unwrap();

        let task = Task::new(TaskSpec::link_into(vec![source.clone()], &dest_dir)).unwrap();
        let summary = executor().run(task).await;

        assert_eq!(summary.error_count, 0);
        let link = dest_dir.join("orig.txt");
        let target = tokio::fs::read_link(&link).await.unwrap();
        assert_eq!(target, source);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_permissions_recursive() {
        use std::os::unix::fs::PermissionsExt;

        let temp = TempDir::new().unwrap();
        let dir = temp.path().join("tree");
        tokio::fs::create_dir_all(&dir).await.unwrap();
        tokio::fs::write(dir.join("f"), b"x").await.unwrap();

        let task = Task::new(
            TaskSpec::permissions(vec![dir.clone()])
                .with_mode(0o700)
                .with_recursive(true),
        )
        .unwrap();
        let summary = executor().run(task).await;

        assert_eq!(summary.error_count, 0);
        let mode = tokio::fs::metadata(dir.join("f"))
            .await
            .unwrap()
            .permissions()
            .mode();
        assert_eq!(mode & 0o777, 0o700);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_exec_captures_output() {
        let task = Task::new(TaskSpec::exec(["sh", "-c", "echo one; echo two 1>&2"])).unwrap();
        let summary = executor().run(Arc::clone(&task)).await;

        assert!(!summary.aborted);
        assert_eq!(summary.error_count, 0);
        let log = task.log_lines();
        assert!(log.iter().any(|line| line == "one"));
        assert!(log.iter().any(|line| line == "two"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_exec_failure_is_fatal() {
        let task = Task::new(TaskSpec::exec(["sh", "-c", "exit 3"])).unwrap();
        let summary = executor().run(task).await;

        assert!(summary.aborted);
        assert_eq!(summary.error_count, 1);
    }

    #[tokio::test]
    async fn test_observer_veto_aborts() {
        let temp = TempDir::new().unwrap();
        let dest_dir = temp.path().join("dest");
        for i in 0..3 {
            tokio::fs::write(temp.path().join(format!("f{}", i)), b"x")
                .await
                .unwrap();
        }

        // Refuse to continue after the first progress event.
        let observer = porter_types::FnObserver(|_: porter_types::TaskId, event: &TaskEvent| {
            !matches!(event, TaskEvent::Progress)
        });
        let sources = (0..3).map(|i| temp.path().join(format!("f{}", i))).collect::<Vec<_>>();
        let task = Task::new(TaskSpec::copy(sources, &dest_dir)).unwrap();
        let summary = TaskExecutor::new(Arc::new(observer)).run(task).await;

        assert!(summary.aborted);
    }
}

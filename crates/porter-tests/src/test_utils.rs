//! Fixtures and observers for integration tests

use std::path::Path;
use std::sync::{Arc, Mutex};

use porter_engine::Task;
use porter_types::{TaskEvent, TaskId, TaskObserver};

/// Create a test file with repeated content of a specific size
pub fn create_test_file(path: &Path, size: usize) -> std::io::Result<()> {
    let content = "A".repeat(size);
    std::fs::write(path, content)
}

/// Create a test file with deterministic pseudo-random content
pub fn create_random_test_file(path: &Path, size: usize) -> std::io::Result<()> {
    use std::collections::hash_map::DefaultHasher;
    use std::hash::{Hash, Hasher};

    let mut content = Vec::with_capacity(size);
    let mut hasher = DefaultHasher::new();

    for i in 0..size {
        i.hash(&mut hasher);
        content.push((hasher.finish() % 256) as u8);
    }

    std::fs::write(path, content)
}

/// One recorded event: name plus the task's byte counter at that moment
#[derive(Debug, Clone)]
pub struct RecordedEvent {
    /// Event name (`progress`, `query_overwrite`, `error`, `finish`)
    pub name: String,
    /// `bytes_transferred` at emission time
    pub bytes: u64,
}

/// Observer that records every event with the task's byte counter
///
/// Attach the task handle after creation so the recorder can snapshot
/// counters when events arrive.
#[derive(Default)]
pub struct RecordingObserver {
    events: Mutex<Vec<RecordedEvent>>,
    task: Mutex<Option<Arc<Task>>>,
}

impl RecordingObserver {
    /// Create an empty recorder
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Attach the task whose counters should be sampled
    pub fn attach(&self, task: Arc<Task>) {
        *self.task.lock().unwrap() = Some(task);
    }

    /// All recorded events, in emission order
    pub fn events(&self) -> Vec<RecordedEvent> {
        self.events.lock().unwrap().clone()
    }

    /// Names of recorded events matching `name`
    pub fn count(&self, name: &str) -> usize {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter(|event| event.name == name)
            .count()
    }
}

impl TaskObserver for RecordingObserver {
    fn on_event(&self, _task: TaskId, event: &TaskEvent) -> bool {
        let bytes = self
            .task
            .lock()
            .unwrap()
            .as_ref()
            .map(|task| task.snapshot().bytes_transferred)
            .unwrap_or(0);
        self.events.lock().unwrap().push(RecordedEvent {
            name: event.name().to_string(),
            bytes,
        });
        true
    }
}

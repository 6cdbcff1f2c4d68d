//! Asynchronous file-operation task engine for Porter
//!
//! This crate provides the background task engine behind Porter:
//! copy/move/delete/trash/link/permissions/exec tasks that run on their
//! own tokio task, report live progress, honor pause/queue/resume/cancel
//! from any thread, and stop mid-operation to ask an external
//! decision-maker how to resolve a destination collision.
//!
//! # Features
//!
//! - **Task management**: One executor per task with a thread-safe
//!   command surface
//! - **Conflict rendezvous**: Blocking overwrite queries that cancel
//!   cleanly
//! - **Progress tracking**: Sampled throughput, ETA, and percent
//! - **Scheduling**: Auto-queueing with optional volume-aware promotion
//!
//! # Examples
//!
//! ```rust
//! use porter_engine::{Scheduler, TaskSpec};
//! use porter_types::NullObserver;
//! use std::sync::Arc;
//!
//! # async fn example() -> porter_types::Result<()> {
//! let scheduler = Scheduler::new(porter_config::Config::default(), Arc::new(NullObserver));
//! let task = scheduler
//!     .submit(TaskSpec::copy(vec!["a.txt".into()], "/backup"))
//!     .await?;
//! let summary = task.wait_finished().await;
//! println!("{:?}: {} errors", summary.outcome(), summary.error_count);
//! # Ok(())
//! # }
//! ```

#![deny(missing_docs)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

pub mod control;
mod estimate;
pub mod executor;
pub mod progress;
pub mod rendezvous;
pub mod scheduler;
pub mod task;

pub use control::RunDirective;
pub use executor::TaskExecutor;
pub use progress::{ProgressReport, INDETERMINATE_PERCENT};
pub use rendezvous::auto_rename_path;
pub use scheduler::Scheduler;
pub use task::{Task, TaskSettings, TaskSnapshot, TaskSpec};

//! Core type system and error handling for Porter
//!
//! This crate provides the foundational types, error handling, and shared
//! data structures used throughout the Porter ecosystem. It includes:
//!
//! - **Error handling**: Structured error types with path context
//! - **Core types**: Task identity, states, policies, events, and finish
//!   summaries
//! - **Traits**: The observer boundary between engine and presentation
//! - **Configuration**: Validated value newtypes
//!
//! # Features
//!
//! - `serde`: Enable serialization support
//!
//! # Examples
//!
//! ```rust
//! use porter_types::{ErrorPolicy, FinishSummary, TaskOutcome};
//!
//! let summary = FinishSummary { aborted: false, error_count: 0 };
//! assert_eq!(summary.outcome(), TaskOutcome::Completed);
//! assert!(!ErrorPolicy::Continue.should_abort(summary.error_count, false));
//! ```

#![deny(missing_docs)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod error;
pub mod result;
pub mod traits;
pub mod types;

// Re-export commonly used types
pub use config::{CopyChunkSize, EstimateBudget, LiveTaskLimit, SampleInterval};
pub use error::{Error, ErrorKind};
pub use result::Result;
pub use traits::{FnObserver, NullObserver, TaskObserver};
pub use types::{
    ByteEstimate, ConflictResolution, ErrorPolicy, FinishSummary, ItemError, OverwritePolicy,
    TaskEvent, TaskId, TaskKind, TaskOutcome, TaskState,
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_byte_estimate() {
        let known = ByteEstimate::Known(1024);
        assert_eq!(known.known(), Some(1024));
        assert!(!known.is_unknown());

        let unknown = ByteEstimate::Unknown;
        assert_eq!(unknown.known(), None);
        assert!(unknown.is_unknown());
    }

    #[test]
    fn test_event_names() {
        assert_eq!(TaskEvent::Progress.name(), "progress");
        assert_eq!(
            TaskEvent::Finish(FinishSummary::default()).name(),
            "finish"
        );
    }
}

//! Result type alias for Porter operations

/// Result type used throughout the Porter ecosystem
pub type Result<T> = std::result::Result<T, crate::Error>;

//! Configuration newtypes for Porter
//!
//! Validated value types shared between the configuration crate and the
//! engine.

// Serde is imported conditionally through cfg_attr
use std::time::Duration;

/// Chunk size for file payload copies with validation
///
/// The executor checks for pause/cancel between chunks, so the chunk size
/// bounds the checkpoint granularity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CopyChunkSize(usize);

impl CopyChunkSize {
    /// Minimum chunk size (4KB)
    pub const MIN: usize = 4 * 1024;
    /// Maximum chunk size (64MB)
    pub const MAX: usize = 64 * 1024 * 1024;
    /// Default chunk size (1MB)
    pub const DEFAULT: usize = 1024 * 1024;

    /// Create a new chunk size with validation
    pub fn new(size: usize) -> Result<Self, String> {
        if size < Self::MIN {
            Err(format!("Chunk size {} is below minimum {}", size, Self::MIN))
        } else if size > Self::MAX {
            Err(format!("Chunk size {} exceeds maximum {}", size, Self::MAX))
        } else if !size.is_power_of_two() {
            Err(format!("Chunk size {} must be a power of two", size))
        } else {
            Ok(Self(size))
        }
    }

    /// Get the chunk size value
    pub fn get(self) -> usize {
        self.0
    }
}

impl Default for CopyChunkSize {
    fn default() -> Self {
        Self(Self::DEFAULT)
    }
}

/// Maximum number of live (non-finished) tasks allowed to run unqueued
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct LiveTaskLimit(usize);

impl LiveTaskLimit {
    /// Minimum number of running tasks
    pub const MIN: usize = 1;
    /// Maximum number of running tasks
    pub const MAX: usize = 64;

    /// Create a new live task limit with validation
    pub fn new(limit: usize) -> Result<Self, String> {
        if limit < Self::MIN {
            Err(format!("Task limit {} is below minimum {}", limit, Self::MIN))
        } else if limit > Self::MAX {
            Err(format!("Task limit {} exceeds maximum {}", limit, Self::MAX))
        } else {
            Ok(Self(limit))
        }
    }

    /// Get the limit value
    pub fn get(self) -> usize {
        self.0
    }
}

impl Default for LiveTaskLimit {
    fn default() -> Self {
        // One unthrottled task at a time unless smart queueing says otherwise
        Self(1)
    }
}

/// Sampling interval for throughput measurements
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SampleInterval(Duration);

impl SampleInterval {
    /// Minimum sampling interval
    pub const MIN: Duration = Duration::from_millis(100);
    /// Default sampling interval for speed/ETA
    pub const DEFAULT: Duration = Duration::from_secs(2);

    /// Create a new sampling interval with validation
    pub fn new(interval: Duration) -> Result<Self, String> {
        if interval < Self::MIN {
            Err(format!(
                "Sampling interval {:?} is below minimum {:?}",
                interval,
                Self::MIN
            ))
        } else {
            Ok(Self(interval))
        }
    }

    /// Get the interval value
    pub fn get(self) -> Duration {
        self.0
    }
}

impl Default for SampleInterval {
    fn default() -> Self {
        Self(Self::DEFAULT)
    }
}

/// Time budget for the pre-run total-size walk
///
/// When the walk does not finish within the budget the task proceeds with
/// an unknown total instead of blocking.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct EstimateBudget(Duration);

impl EstimateBudget {
    /// Maximum budget
    pub const MAX: Duration = Duration::from_secs(60);
    /// Default budget
    pub const DEFAULT: Duration = Duration::from_secs(2);

    /// Create a new estimate budget with validation
    pub fn new(budget: Duration) -> Result<Self, String> {
        if budget > Self::MAX {
            Err(format!(
                "Estimate budget {:?} exceeds maximum {:?}",
                budget,
                Self::MAX
            ))
        } else if budget.is_zero() {
            Err("Estimate budget must be non-zero".to_string())
        } else {
            Ok(Self(budget))
        }
    }

    /// Get the budget value
    pub fn get(self) -> Duration {
        self.0
    }
}

impl Default for EstimateBudget {
    fn default() -> Self {
        Self(Self::DEFAULT)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chunk_size_validation() {
        assert!(CopyChunkSize::new(4096).is_ok());
        assert!(CopyChunkSize::new(1024 * 1024).is_ok());
        assert!(CopyChunkSize::new(1024).is_err()); // Too small
        assert!(CopyChunkSize::new(5000).is_err()); // Not power of two
        assert!(CopyChunkSize::new(128 * 1024 * 1024).is_err()); // Too large
    }

    #[test]
    fn test_live_task_limit_validation() {
        assert!(LiveTaskLimit::new(1).is_ok());
        assert!(LiveTaskLimit::new(8).is_ok());
        assert!(LiveTaskLimit::new(0).is_err());
        assert!(LiveTaskLimit::new(1000).is_err());
        assert_eq!(LiveTaskLimit::default().get(), 1);
    }

    #[test]
    fn test_interval_validation() {
        assert!(SampleInterval::new(Duration::from_millis(100)).is_ok());
        assert!(SampleInterval::new(Duration::from_millis(50)).is_err());
        assert_eq!(SampleInterval::default().get(), Duration::from_secs(2));
    }

    #[test]
    fn test_estimate_budget_validation() {
        assert!(EstimateBudget::new(Duration::from_secs(2)).is_ok());
        assert!(EstimateBudget::new(Duration::ZERO).is_err());
        assert!(EstimateBudget::new(Duration::from_secs(120)).is_err());
    }
}

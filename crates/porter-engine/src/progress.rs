//! Progress aggregation: speed, ETA, and percent math
//!
//! Raw counters become display-ready numbers here. Throughput is sampled
//! on a fixed interval and the previous value is reused between samples,
//! so sub-interval bursts do not jitter the display.

use std::time::{Duration, Instant};

use porter_types::{ByteEstimate, TaskKind, TaskState};

use crate::task::Task;

/// Percent value reported while the total is unknown
///
/// A mid-scale placeholder avoids implying false completion (100) or
/// false non-progress (0).
pub const INDETERMINATE_PERCENT: u8 = 50;

/// Interval-gated throughput sampler
#[derive(Debug)]
pub(crate) struct SpeedSampler {
    interval: Duration,
    last_time: Option<Instant>,
    last_bytes: u64,
    last_speed: f64,
}

impl SpeedSampler {
    pub(crate) fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_time: None,
            last_bytes: 0,
            last_speed: 0.0,
        }
    }

    /// Sample the current speed in bytes per second
    ///
    /// Recomputes only when the sampling interval has elapsed; otherwise
    /// the previous value is returned unchanged.
    pub(crate) fn sample(&mut self, now: Instant, bytes: u64) -> f64 {
        match self.last_time {
            None => {
                self.last_time = Some(now);
                self.last_bytes = bytes;
                self.last_speed = 0.0;
                0.0
            }
            Some(last) => {
                let dt = now.saturating_duration_since(last);
                if dt >= self.interval {
                    let delta = bytes.saturating_sub(self.last_bytes);
                    self.last_speed = delta as f64 / dt.as_secs_f64();
                    self.last_time = Some(now);
                    self.last_bytes = bytes;
                }
                self.last_speed
            }
        }
    }

    /// Invalidate the sample baseline
    ///
    /// Called on every state transition so a pause does not read as a
    /// stall and a resume does not read as a spike.
    pub(crate) fn reset(&mut self) {
        self.last_time = None;
        self.last_bytes = 0;
        self.last_speed = 0.0;
    }
}

/// Display-ready progress values for one task
#[derive(Debug, Clone)]
pub struct ProgressReport {
    /// Current state
    pub state: TaskState,
    /// Bytes transferred so far
    pub bytes_transferred: u64,
    /// Estimated total bytes
    pub total_bytes: ByteEstimate,
    /// Files completed
    pub files_done: u64,
    /// Total files, when known
    pub total_files: Option<u64>,
    /// Sampled current throughput in bytes per second
    pub current_speed: f64,
    /// Average throughput since start in bytes per second
    pub average_speed: f64,
    /// Remaining time at current speed; `None` when speed is zero or the
    /// total is unknown
    pub eta_current: Option<Duration>,
    /// Remaining time at average speed
    pub eta_average: Option<Duration>,
    /// Percent complete in [0,100]; `None` for kinds with no measurable
    /// progress (Exec)
    pub percent: Option<u8>,
    /// Time since the executor started
    pub elapsed: Duration,
}

/// Remaining-time estimate for a known total at a given speed
pub(crate) fn eta(total: ByteEstimate, done: u64, speed: f64) -> Option<Duration> {
    let total = total.known()?;
    if speed <= 0.0 {
        return None;
    }
    let remaining = total.saturating_sub(done);
    Some(Duration::from_secs_f64(remaining as f64 / speed))
}

/// Percent complete, clamped to [0,100]
pub(crate) fn percent_complete(done: u64, total: ByteEstimate) -> u8 {
    match total {
        ByteEstimate::Known(0) => 100,
        ByteEstimate::Known(total) => ((done * 100) / total).min(100) as u8,
        ByteEstimate::Unknown => INDETERMINATE_PERCENT,
    }
}

impl Task {
    /// Compute the current progress report
    ///
    /// Takes the task lock once; safe to call from any polling thread.
    pub fn progress(&self) -> ProgressReport {
        let mut shared = self.lock();
        let now = Instant::now();
        let elapsed = shared
            .started_at
            .map(|t| now.saturating_duration_since(t))
            .unwrap_or_default();

        let bytes = shared.bytes_transferred;
        let current_speed = shared.sampler.sample(now, bytes);
        let average_speed = if elapsed.as_secs_f64() > 0.0 {
            bytes as f64 / elapsed.as_secs_f64()
        } else {
            0.0
        };

        let percent = match self.kind() {
            TaskKind::Exec => None,
            kind if kind.transfers_bytes() => Some(percent_complete(bytes, shared.total_bytes)),
            _ => {
                // Item-counted kinds measure progress in files
                let total = match shared.total_files {
                    Some(total) => ByteEstimate::Known(total),
                    None => ByteEstimate::Unknown,
                };
                Some(percent_complete(shared.files_done, total))
            }
        };

        ProgressReport {
            state: shared.state,
            bytes_transferred: bytes,
            total_bytes: shared.total_bytes,
            files_done: shared.files_done,
            total_files: shared.total_files,
            current_speed,
            average_speed,
            eta_current: eta(shared.total_bytes, bytes, current_speed),
            eta_average: eta(shared.total_bytes, bytes, average_speed),
            percent,
            elapsed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sampler_reuses_value_between_samples() {
        let mut sampler = SpeedSampler::new(Duration::from_secs(2));
        let start = Instant::now();

        assert_eq!(sampler.sample(start, 0), 0.0);

        // Within the interval the previous speed is reused, not recomputed.
        let speed = sampler.sample(start + Duration::from_millis(500), 10_000);
        assert_eq!(speed, 0.0);

        // After the interval a new sample is taken.
        let speed = sampler.sample(start + Duration::from_secs(2), 20_000);
        assert!((speed - 10_000.0).abs() < 1.0);

        // And reused again until the next interval boundary.
        let speed = sampler.sample(start + Duration::from_millis(2500), 1_000_000);
        assert!((speed - 10_000.0).abs() < 1.0);
    }

    #[test]
    fn test_sampler_reset_clears_baseline() {
        let mut sampler = SpeedSampler::new(Duration::from_secs(1));
        let start = Instant::now();

        sampler.sample(start, 0);
        sampler.sample(start + Duration::from_secs(1), 5_000);
        sampler.reset();

        // First sample after a reset re-establishes the baseline.
        assert_eq!(sampler.sample(start + Duration::from_secs(2), 100_000), 0.0);
    }

    #[test]
    fn test_eta() {
        assert_eq!(eta(ByteEstimate::Unknown, 0, 100.0), None);
        assert_eq!(eta(ByteEstimate::Known(1000), 0, 0.0), None);

        let remaining = eta(ByteEstimate::Known(1000), 500, 100.0).unwrap();
        assert_eq!(remaining, Duration::from_secs(5));

        // Past the total, remaining time saturates at zero.
        let done = eta(ByteEstimate::Known(1000), 2000, 100.0).unwrap();
        assert_eq!(done, Duration::ZERO);
    }

    #[test]
    fn test_percent_complete() {
        assert_eq!(percent_complete(0, ByteEstimate::Known(100)), 0);
        assert_eq!(percent_complete(50, ByteEstimate::Known(100)), 50);
        assert_eq!(percent_complete(100, ByteEstimate::Known(100)), 100);
        // Clamped above 100.
        assert_eq!(percent_complete(300, ByteEstimate::Known(100)), 100);
        // Empty task counts as done.
        assert_eq!(percent_complete(0, ByteEstimate::Known(0)), 100);
        // Unknown totals report the indeterminate placeholder.
        assert_eq!(
            percent_complete(10, ByteEstimate::Unknown),
            INDETERMINATE_PERCENT
        );
    }

    #[test]
    fn test_report_for_fresh_task() {
        use crate::task::{Task, TaskSpec};
        use std::path::PathBuf;

        let task = Task::new(TaskSpec::copy(vec![PathBuf::from("/a")], "/b")).unwrap();
        let report = task.progress();
        assert_eq!(report.bytes_transferred, 0);
        assert_eq!(report.percent, Some(INDETERMINATE_PERCENT));
        assert_eq!(report.eta_current, None);

        let exec = Task::new(TaskSpec::exec(["true"])).unwrap();
        assert_eq!(exec.progress().percent, None);
    }
}

//! Live progress rendering for the Porter CLI
//!
//! A polling tracker: the main loop reads task snapshots on a fixed tick
//! and pushes them into an indicatif bar. Nothing here ever blocks the
//! engine; prompts suspend the bar around themselves.

use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use porter_engine::{ProgressReport, TaskSnapshot};
use porter_types::{TaskKind, TaskState};
use std::time::Duration;

use crate::display::{format_bytes, format_duration};

/// Polling progress display for one task
pub struct ProgressTracker {
    bar: Option<ProgressBar>,
}

impl ProgressTracker {
    /// Create a tracker; a byte-transferring kind gets a bar, others a
    /// spinner
    pub fn new(quiet: bool, kind: TaskKind) -> Self {
        if quiet {
            return Self { bar: None };
        }

        let bar = if kind.transfers_bytes() {
            let bar = ProgressBar::new(100);
            bar.set_style(
                ProgressStyle::default_bar()
                    .template("{spinner:.green} {msg} [{wide_bar:.cyan/blue}] {pos}%")
                    .unwrap()
                    .progress_chars("█▉▊▋▌▍▎▏  "),
            );
            bar
        } else {
            let bar = ProgressBar::new_spinner();
            bar.set_style(
                ProgressStyle::default_spinner()
                    .template("{spinner:.green} {msg}")
                    .unwrap(),
            );
            bar
        };
        bar.enable_steady_tick(Duration::from_millis(100));

        Self { bar: Some(bar) }
    }

    /// Push the latest snapshot and report into the display
    pub fn update(&self, snapshot: &TaskSnapshot, report: &ProgressReport) {
        let Some(bar) = &self.bar else {
            return;
        };

        if let Some(percent) = report.percent {
            bar.set_position(u64::from(percent));
        }

        let current = snapshot
            .current_source
            .as_deref()
            .and_then(|p| p.file_name())
            .and_then(|n| n.to_str())
            .unwrap_or("")
            .to_string();

        let mut message = format!("{} {}", snapshot.kind.verb(), current);
        if report.current_speed > 0.0 {
            message.push_str(&format!(
                " - {}/s",
                format_bytes(report.current_speed as u64)
            ));
        }
        if let Some(eta) = report.eta_current {
            message.push_str(&format!(" - ETA {}", format_duration(eta)));
        }
        match snapshot.state {
            TaskState::Paused => message.push_str(" [paused]"),
            TaskState::Queued => message.push_str(" [queued]"),
            TaskState::QueryingConflict => message.push_str(" [conflict]"),
            TaskState::SizeTimeoutPending => message.push_str(" [sizing]"),
            _ => {}
        }
        bar.set_message(message);
    }

    /// Show an error line without disturbing the bar
    pub fn display_error(&self, message: &str) {
        match &self.bar {
            Some(bar) => bar.suspend(|| {
                println!("{} {}", style("✗").red().bold(), style(message).red());
            }),
            None => eprintln!("{} {}", style("✗").red().bold(), style(message).red()),
        }
    }

    /// Run a blocking prompt with the bar suspended
    pub fn with_suspended<T>(&self, prompt: impl FnOnce() -> T) -> T {
        match &self.bar {
            Some(bar) => bar.suspend(prompt),
            None => prompt(),
        }
    }

    /// Stop the display
    pub fn finish_and_clear(&self) {
        if let Some(bar) = &self.bar {
            bar.finish_and_clear();
        }
    }
}

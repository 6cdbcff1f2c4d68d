//! Terminal output helpers for the Porter CLI

use console::style;
use porter_engine::{ProgressReport, Task};
use porter_types::{FinishSummary, TaskOutcome};
use std::time::Duration;

/// Format bytes in human-readable form
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
    let mut size = bytes as f64;
    let mut unit_index = 0;

    while size >= 1024.0 && unit_index < UNITS.len() - 1 {
        size /= 1024.0;
        unit_index += 1;
    }

    format!("{:.2} {}", size, UNITS[unit_index])
}

/// Format a duration in human-readable form
pub fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    if secs < 60 {
        format!("{:.0}s", duration.as_secs_f64())
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    }
}

/// Print the final task summary
pub fn print_summary(task: &Task, summary: FinishSummary, report: &ProgressReport) {
    let headline = match summary.outcome() {
        TaskOutcome::Completed => style("Completed").green().bold().to_string(),
        TaskOutcome::CompletedWithErrors => format!(
            "{} with {} error(s)",
            style("Completed").yellow().bold(),
            summary.error_count
        ),
        TaskOutcome::Stopped => style("Stopped").red().bold().to_string(),
        TaskOutcome::StoppedWithErrors => format!(
            "{} with {} error(s)",
            style("Stopped").red().bold(),
            summary.error_count
        ),
    };

    println!();
    println!("{} ({})", headline, task.kind());
    println!(
        "  Files processed: {}",
        style(report.files_done).green()
    );
    if report.bytes_transferred > 0 {
        println!(
            "  Bytes transferred: {}",
            style(format_bytes(report.bytes_transferred)).green()
        );
        println!(
            "  Average rate: {}/s",
            style(format_bytes(report.average_speed as u64)).blue()
        );
    }
    println!(
        "  Elapsed: {}",
        style(format_duration(report.elapsed)).blue()
    );

    if summary.error_count > 0 {
        println!();
        println!("{}", style("Log:").bold().underlined());
        for line in task.log_lines() {
            println!("  {}", style(line).dim());
        }
    }
}

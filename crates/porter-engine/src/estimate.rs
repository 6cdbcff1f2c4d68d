//! Bounded pre-run totals estimation
//!
//! Walking a large source tree to sum sizes can itself take a while, so
//! the walk runs under a time budget. On timeout the task proceeds with
//! unknown totals instead of blocking the start of real work.

use std::path::PathBuf;
use std::time::Duration;

use tracing::{debug, warn};
use walkdir::WalkDir;

/// Summed cost of a source list
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct Totals {
    /// Number of files (directories excluded)
    pub(crate) files: u64,
    /// Summed file sizes in bytes
    pub(crate) bytes: u64,
}

/// Estimate totals for a source list within a time budget
///
/// Returns `None` when the walk did not finish in time. Unreadable
/// entries are skipped; estimation is best-effort and per-item errors are
/// reported later by the executor itself.
pub(crate) async fn estimate_totals(sources: Vec<PathBuf>, budget: Duration) -> Option<Totals> {
    let walk = tokio::task::spawn_blocking(move || walk_totals(&sources));

    match tokio::time::timeout(budget, walk).await {
        Ok(Ok(totals)) => {
            debug!(
                "Estimated totals: {} files, {} bytes",
                totals.files, totals.bytes
            );
            Some(totals)
        }
        Ok(Err(join_error)) => {
            warn!("Totals walk failed: {}", join_error);
            None
        }
        Err(_) => {
            warn!("Totals walk exceeded its {:?} budget", budget);
            None
        }
    }
}

fn walk_totals(sources: &[PathBuf]) -> Totals {
    let mut totals = Totals::default();
    for source in sources {
        let per_source = walk_path_totals(source);
        totals.files += per_source.files;
        totals.bytes += per_source.bytes;
    }
    totals
}

/// Totals for a single path, walked synchronously
///
/// Also used by the move executor to account for a renamed tree after
/// the fact.
pub(crate) fn walk_path_totals(source: &std::path::Path) -> Totals {
    let mut totals = Totals::default();

    for entry in WalkDir::new(source).follow_links(false) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(_) => continue,
        };
        if entry.file_type().is_dir() {
            continue;
        }
        totals.files += 1;
        if let Ok(metadata) = entry.metadata() {
            if metadata.is_file() {
                totals.bytes += metadata.len();
            }
        }
    }

    totals
}

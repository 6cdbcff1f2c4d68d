//! Interactive conflict prompts
//!
//! Presents the choices of the conflict rendezvous. These run blocking on
//! a worker thread while the engine stays parked on the query.

use dialoguer::{theme::ColorfulTheme, Input, Select};
use porter_types::ConflictResolution;
use std::path::Path;

/// Ask the user how to resolve a destination collision
///
/// A closed prompt (EOF, interrupt) maps to `Cancel` so a dead terminal
/// never leaves the engine parked.
pub fn ask_conflict(source: &Path, dest: &Path) -> ConflictResolution {
    println!();
    println!("'{}' already exists", dest.display());
    println!("  (copying '{}')", source.display());

    let choices = [
        "Overwrite",
        "Overwrite all",
        "Skip",
        "Skip all",
        "Rename",
        "Auto-rename all",
        "Pause task",
        "Cancel task",
    ];

    let selection = Select::with_theme(&ColorfulTheme::default())
        .with_prompt("Resolve conflict")
        .items(&choices)
        .default(2)
        .interact_opt();

    match selection {
        Ok(Some(0)) => ConflictResolution::Overwrite,
        Ok(Some(1)) => ConflictResolution::OverwriteAll,
        Ok(Some(2)) => ConflictResolution::Skip,
        Ok(Some(3)) => ConflictResolution::SkipAll,
        Ok(Some(4)) => ask_new_name(dest),
        Ok(Some(5)) => ConflictResolution::AutoRenameAll,
        Ok(Some(6)) => ConflictResolution::Pause,
        _ => ConflictResolution::Cancel,
    }
}

fn ask_new_name(dest: &Path) -> ConflictResolution {
    let current = dest
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("")
        .to_string();

    let name = Input::<String>::with_theme(&ColorfulTheme::default())
        .with_prompt("New name")
        .with_initial_text(current)
        .interact_text();

    match name {
        Ok(name) if !name.is_empty() => ConflictResolution::Rename(name),
        _ => ConflictResolution::Cancel,
    }
}

/// Ask whether to resume a paused task
pub fn ask_resume() -> bool {
    dialoguer::Confirm::with_theme(&ColorfulTheme::default())
        .with_prompt("Task paused - resume?")
        .default(true)
        .interact_opt()
        .ok()
        .flatten()
        .unwrap_or(false)
}

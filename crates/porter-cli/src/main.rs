//! Porter - background file-operation tasks from the command line
//!
//! A reference consumer for the Porter task engine: it submits one task,
//! polls its snapshots for a progress display, prompts on conflicts, and
//! renders the finish summary. Ctrl-C cancels the running task.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};
use console::style;
use porter_config::{Config, ConfigLoader};
use porter_engine::{Scheduler, Task, TaskSpec};
use porter_types::{
    ConflictResolution, ErrorPolicy, OverwritePolicy, TaskEvent, TaskId, TaskObserver, TaskState,
};
use tracing::info;

mod display;
mod progress;
mod prompt;

use progress::ProgressTracker;

/// Porter - background file-operation tasks from the command line
#[derive(Parser)]
#[command(
    name = "porter",
    version = env!("CARGO_PKG_VERSION"),
    about = "Background file-operation tasks from the command line",
    long_about = "Porter runs file operations as observable background tasks:\n\
                  live progress with speed and ETA, pause/resume, and\n\
                  interactive conflict resolution."
)]
struct Cli {
    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,

    /// Quiet mode - minimal output
    #[arg(short, long)]
    quiet: bool,

    /// Verbose mode - detailed output
    #[arg(short, long)]
    verbose: bool,

    /// Configuration file path
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// How to handle destination collisions
    #[arg(long, value_enum, default_value = "ask")]
    on_conflict: ConflictArg,

    /// When to abort on per-item errors
    #[arg(long, value_enum, default_value = "continue")]
    on_error: ErrorArg,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Copy files and directories into a destination directory
    Cp {
        /// Source paths
        #[arg(required = true)]
        sources: Vec<PathBuf>,
        /// Destination directory
        dest: PathBuf,
    },
    /// Move files and directories into a destination directory
    Mv {
        /// Source paths
        #[arg(required = true)]
        sources: Vec<PathBuf>,
        /// Destination directory
        dest: PathBuf,
    },
    /// Permanently remove files and directories
    Rm {
        /// Paths to remove
        #[arg(required = true)]
        sources: Vec<PathBuf>,
    },
    /// Move files and directories to the trash
    Trash {
        /// Paths to trash
        #[arg(required = true)]
        sources: Vec<PathBuf>,
    },
    /// Create symbolic links in a destination directory
    Ln {
        /// Link targets
        #[arg(required = true)]
        sources: Vec<PathBuf>,
        /// Destination directory
        dest: PathBuf,
    },
    /// Change mode and/or ownership
    Chmod {
        /// Octal mode, e.g. 644
        #[arg(short, long)]
        mode: Option<String>,
        /// Owner uid to set
        #[arg(long)]
        owner: Option<u32>,
        /// Group gid to set
        #[arg(long)]
        group: Option<u32>,
        /// Apply recursively
        #[arg(short, long)]
        recursive: bool,
        /// Paths to change
        #[arg(required = true)]
        sources: Vec<PathBuf>,
    },
    /// Run an external command as a task
    Exec {
        /// Command and arguments
        #[arg(required = true, trailing_var_arg = true)]
        command: Vec<String>,
    },
    /// Show or generate configuration
    Config {
        /// Write a default configuration file to this path
        #[arg(long)]
        init: Option<PathBuf>,
    },
}

#[derive(clap::ValueEnum, Clone, Copy)]
enum ConflictArg {
    Ask,
    Overwrite,
    OverwriteAll,
    Skip,
    SkipAll,
    AutoRename,
    AutoRenameAll,
}

impl From<ConflictArg> for OverwritePolicy {
    fn from(arg: ConflictArg) -> Self {
        match arg {
            ConflictArg::Ask => OverwritePolicy::Ask,
            ConflictArg::Overwrite => OverwritePolicy::Overwrite,
            ConflictArg::OverwriteAll => OverwritePolicy::OverwriteAll,
            ConflictArg::Skip => OverwritePolicy::Skip,
            ConflictArg::SkipAll => OverwritePolicy::SkipAll,
            ConflictArg::AutoRename => OverwritePolicy::AutoRename,
            ConflictArg::AutoRenameAll => OverwritePolicy::AutoRenameAll,
        }
    }
}

#[derive(clap::ValueEnum, Clone, Copy)]
enum ErrorArg {
    Continue,
    StopFirst,
    StopAny,
}

impl From<ErrorArg> for ErrorPolicy {
    fn from(arg: ErrorArg) -> Self {
        match arg {
            ErrorArg::Continue => ErrorPolicy::Continue,
            ErrorArg::StopFirst => ErrorPolicy::StopOnFirst,
            ErrorArg::StopAny => ErrorPolicy::StopOnAny,
        }
    }
}

/// Routes engine events into the live display
struct CliObserver {
    tracker: Arc<ProgressTracker>,
}

impl TaskObserver for CliObserver {
    fn on_event(&self, _task: TaskId, event: &TaskEvent) -> bool {
        if let TaskEvent::Error(error) = event {
            self.tracker.display_error(&error.to_string());
        }
        true
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => ConfigLoader::load_from_file(path)?,
        None => ConfigLoader::load_default()?,
    };
    init_logging(&cli, &config)?;

    info!("Porter v{} starting", env!("CARGO_PKG_VERSION"));

    let overwrite_policy = OverwritePolicy::from(cli.on_conflict);
    let error_policy = ErrorPolicy::from(cli.on_error);

    let spec = match cli.command {
        Commands::Cp { sources, dest } => TaskSpec::copy(sources, dest),
        Commands::Mv { sources, dest } => TaskSpec::move_into(sources, dest),
        Commands::Rm { sources } => TaskSpec::delete(sources),
        Commands::Trash { sources } => TaskSpec::trash(sources),
        Commands::Ln { sources, dest } => TaskSpec::link_into(sources, dest),
        Commands::Chmod {
            mode,
            owner,
            group,
            recursive,
            sources,
        } => {
            let mut spec = TaskSpec::permissions(sources)
                .with_recursive(recursive)
                .with_owner(owner, group);
            if let Some(mode) = mode {
                let bits = u32::from_str_radix(&mode, 8)
                    .map_err(|_| anyhow::anyhow!("Invalid octal mode '{}'", mode))?;
                spec = spec.with_mode(bits);
            }
            spec
        }
        Commands::Exec { command } => TaskSpec::exec(command),
        Commands::Config { init } => {
            return config_command(init);
        }
    };

    let spec = spec
        .with_overwrite_policy(overwrite_policy)
        .with_error_policy(error_policy);

    run_task(spec, config, cli.quiet).await
}

fn init_logging(cli: &Cli, config: &Config) -> Result<()> {
    use tracing_subscriber::{fmt, EnvFilter};

    let level = if cli.debug {
        "debug"
    } else if cli.verbose {
        "info"
    } else if cli.quiet {
        "error"
    } else {
        config.logging.level.as_str()
    };

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new("warn"));

    if config.logging.enable_file_logging {
        if let Some(path) = &config.logging.log_file {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)?;
            fmt()
                .with_env_filter(filter)
                .with_target(false)
                .with_ansi(false)
                .with_writer(Arc::new(file))
                .init();
            return Ok(());
        }
    }

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    Ok(())
}

/// Submit one task and drive it to completion from a polling loop
async fn run_task(spec: TaskSpec, config: Config, quiet: bool) -> Result<()> {
    let tracker = Arc::new(ProgressTracker::new(quiet, spec.kind));
    let observer = Arc::new(CliObserver {
        tracker: Arc::clone(&tracker),
    });
    let poll_interval = config.progress.poll_interval;

    let scheduler = Scheduler::new(config, observer);
    let task = scheduler.submit(spec).await?;

    // Ctrl-C cancels the task; the engine unwinds to its finish event.
    {
        let task = Arc::clone(&task);
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                task.cancel();
            }
        });
    }

    let summary = loop {
        let snapshot = task.snapshot();
        if let Some(summary) = snapshot.finished {
            break summary;
        }

        if let Some((source, dest)) = snapshot.pending_query.clone() {
            answer_conflict(&task, &tracker, source, dest).await;
        } else if snapshot.state == TaskState::Paused {
            let prompt_tracker = Arc::clone(&tracker);
            let resume =
                tokio::task::spawn_blocking(move || prompt_tracker.with_suspended(prompt::ask_resume))
                    .await
                    .unwrap_or(false);
            if resume {
                task.resume();
            } else {
                task.cancel();
            }
        } else {
            tracker.update(&snapshot, &task.progress());
        }

        tokio::time::sleep(poll_interval).await;
    };

    tracker.finish_and_clear();
    if !quiet {
        display::print_summary(&task, summary, &task.progress());
    }

    if summary.aborted {
        std::process::exit(1);
    }
    Ok(())
}

/// Present the conflict prompt off the async loop and answer the task
async fn answer_conflict(
    task: &Arc<Task>,
    tracker: &Arc<ProgressTracker>,
    source: PathBuf,
    dest: PathBuf,
) {
    let prompt_tracker = Arc::clone(tracker);
    let resolution = tokio::task::spawn_blocking(move || {
        prompt_tracker.with_suspended(|| prompt::ask_conflict(&source, &dest))
    })
    .await
    .unwrap_or(ConflictResolution::Cancel);

    // The query can already be gone if the task was cancelled meanwhile.
    let _ = task.answer_overwrite(resolution);
}

fn config_command(init: Option<PathBuf>) -> Result<()> {
    if let Some(path) = init {
        ConfigLoader::generate_default_config(&path)?;
        println!(
            "{} Wrote default configuration to {}",
            style("✓").green(),
            style(path.display()).cyan()
        );
        return Ok(());
    }

    match ConfigLoader::config_exists() {
        Some(path) => println!("Using configuration file: {}", style(path.display()).cyan()),
        None => println!("No configuration file found; built-in defaults apply"),
    }

    let config = ConfigLoader::load_default()?;
    println!("  auto_queue: {}", config.queueing.auto_queue);
    println!("  smart queueing: {}", config.queueing.smart);
    println!(
        "  live task limit: {}",
        config.queueing.live_task_limit.get()
    );
    println!("  chunk size: {}", config.execution.chunk_size.get());
    println!(
        "  sample interval: {:?}",
        config.progress.sample_interval.get()
    );
    println!("  error policy: {:?}", config.errors.policy);
    Ok(())
}

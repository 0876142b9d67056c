use std::{
    io::BufRead,
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};

use clap::Parser;
use history_cleaner::{
    config::{CleanerConfig, JobConfig},
    events::{EventBus, LifecycleEvent},
    jobs::{self, CleaningJob},
    lifecycle::CleanerDaemon,
    observability,
    policy::PolicyTable,
    store::{Repository, memory::MemoryRepository},
};
use tokio_util::{sync::CancellationToken, task::TaskTracker};

/// CLI arguments for the history cleaner
#[derive(Parser, Debug)]
#[command(version, about = "Revision history cleaner", long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Command,

    /// Path to config file (defaults to built-in settings)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Path to the content store snapshot (JSON)
    #[arg(short, long, global = true)]
    store: Option<PathBuf>,
}

#[derive(clap::Subcommand, Debug)]
enum Command {
    /// Prune stale revisions below `cleanup.path` once
    Revisions,
    /// Purge deleted items past their grace period once
    Deleted,
    /// Delete expired never-published items once
    Unpublished,
    /// Print the effective retention policy for a content type
    Policy {
        /// Content type, e.g. "ns:news"
        content_type: String,
    },
    /// Run the enabled job workers and the lifecycle listener until stopped
    ///
    /// Lifecycle events are read from stdin, one JSON object per line.
    Daemon,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => match CleanerConfig::from_file(path) {
            Ok(c) => c,
            Err(e) => {
                eprintln!("Failed to load config from {}: {}", path.display(), e);
                std::process::exit(1);
            }
        },
        None => CleanerConfig::default(),
    };

    if let Err(e) = observability::init_tracing(&config.logging) {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }

    if let Err(e) = observability::metrics::init_metrics(&config.metrics) {
        tracing::warn!(error = %e, "Failed to initialize metrics: {e}");
    }

    let store = args.store.as_deref();
    match args.command {
        Command::Policy { content_type } => print_policy(&config, &content_type),
        Command::Revisions => run_once(&config, store, CleaningJob::Revisions).await,
        Command::Deleted => run_once(&config, store, CleaningJob::DeletedItems).await,
        Command::Unpublished => run_once(&config, store, CleaningJob::UnpublishedItems).await,
        Command::Daemon => run_daemon(&config, store).await,
    }
}

fn print_policy(config: &CleanerConfig, content_type: &str) {
    let table = PolicyTable::resolve(&config.listener.attributes);
    match serde_json::to_string_pretty(&table.policy_for(content_type)) {
        Ok(json) => println!("{json}"),
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    }
}

fn open_store(path: Option<&Path>) -> (PathBuf, MemoryRepository) {
    let Some(path) = path else {
        eprintln!("Error: --store is required for this command");
        std::process::exit(1);
    };
    match MemoryRepository::load(path) {
        Ok(repo) => (path.to_path_buf(), repo),
        Err(e) => {
            eprintln!("Failed to load store from {}: {}", path.display(), e);
            std::process::exit(1);
        }
    }
}

fn job_config(config: &CleanerConfig, job: CleaningJob) -> &JobConfig {
    match job {
        CleaningJob::Revisions => &config.jobs.revisions,
        CleaningJob::DeletedItems => &config.jobs.deleted,
        CleaningJob::UnpublishedItems => &config.jobs.unpublished,
    }
}

fn persist(repo: &MemoryRepository, path: &Path) {
    match repo.persist(path) {
        Ok(()) => tracing::info!(path = %path.display(), "Store snapshot written"),
        Err(e) => {
            tracing::error!(path = %path.display(), error = %e, "Failed to write store snapshot");
            std::process::exit(1);
        }
    }
}

/// Run a single pass of one job and write the store back.
async fn run_once(config: &CleanerConfig, store: Option<&Path>, job: CleaningJob) {
    let (path, repo) = open_store(store);
    let attrs = &job_config(config, job).attributes;

    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            shutdown_signal().await;
            cancel.cancel();
        });
    }

    match jobs::run_job(job, &repo, attrs, &cancel).await {
        Ok(result) => {
            println!(
                "{job}: {} found, {} cleaned, {} failed, {} skipped in {} ms{}",
                result.report.total,
                result.report.cleaned(),
                result.report.failed,
                result.report.skipped,
                result.duration_ms,
                if result.report.interrupted {
                    " (interrupted)"
                } else {
                    ""
                }
            );
        }
        Err(e) => {
            tracing::error!(job = %job, error = %e, "Unable to execute job");
            std::process::exit(1);
        }
    }

    persist(&repo, &path);
}

/// Run the enabled job workers and the lifecycle listener until a shutdown
/// signal arrives.
async fn run_daemon(config: &CleanerConfig, store: Option<&Path>) {
    let (path, repo) = open_store(store);
    let repository: Arc<dyn Repository> = Arc::new(repo.clone());

    let cancel = CancellationToken::new();
    let task_tracker = TaskTracker::new();

    for job in [
        CleaningJob::Revisions,
        CleaningJob::DeletedItems,
        CleaningJob::UnpublishedItems,
    ] {
        let job_config = job_config(config, job);
        if !job_config.enabled {
            tracing::info!(job = %job, "Cleaning job disabled by configuration");
            continue;
        }
        task_tracker.spawn(jobs::start_cleaning_worker(
            job,
            repository.clone(),
            job_config.attributes.clone(),
            job_config.interval(),
            cancel.clone(),
        ));
    }

    if config.listener.enabled {
        let bus = EventBus::new();
        let daemon = CleanerDaemon::new(repository.clone(), &config.listener.attributes);
        let rx = bus.subscribe();
        {
            let cancel = cancel.clone();
            task_tracker.spawn(async move { daemon.run(rx, cancel).await });
        }
        std::thread::spawn(move || read_events(bus));
    } else {
        tracing::info!("Lifecycle listener disabled by configuration");
    }

    shutdown_signal().await;
    tracing::info!("Shutdown signal received, waiting for background tasks to complete...");

    cancel.cancel();
    task_tracker.close();

    match tokio::time::timeout(Duration::from_secs(30), task_tracker.wait()).await {
        Ok(()) => tracing::info!("All background tasks completed"),
        Err(_) => {
            tracing::warn!("Timeout waiting for background tasks, some may not have completed")
        }
    }

    persist(&repo, &path);
}

/// Publish lifecycle events read from stdin, one JSON object per line.
///
/// Runs on its own thread since stdin reads block. The bus is dropped at end
/// of input, which also stops the listener.
fn read_events(bus: EventBus) {
    tracing::debug!(subscribers = bus.subscriber_count(), "Reading lifecycle events");
    for line in std::io::stdin().lock().lines() {
        let line = match line {
            Ok(line) => line,
            Err(e) => {
                tracing::error!(error = %e, "Failed to read lifecycle events");
                return;
            }
        };
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<LifecycleEvent>(&line) {
            Ok(event) => {
                bus.publish(event);
            }
            Err(e) => tracing::warn!(error = %e, "Ignoring malformed lifecycle event"),
        }
    }
    tracing::info!(
        published = bus.events_published(),
        dropped = bus.events_dropped(),
        "Event input closed"
    );
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install signal handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

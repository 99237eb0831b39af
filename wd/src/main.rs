//! warmd - cache warming and purge daemon
//!
//! CLI entry point for the daemon and its maintenance commands.

use std::fs;
use std::sync::Arc;

use clap::Parser;
use colored::Colorize;
use eyre::{Context, Result};
use tokio::sync::broadcast;
use tracing::{info, warn};

use warmd::cli::{Cli, Command, OutputFormat, UrlArgs, collect_urls, get_log_path};
use warmd::config::{Config, SharedConfig};
use warmd::daemon::Daemon;
use warmd::dispatch::{DispatchReport, Dispatcher};
use warmd::domain::QueueKind;
use warmd::fetch::HttpFetcher;
use warmd::queue::QueueManager;
use warmd::trigger::Trigger;
use warmd::worker::BatchReport;

fn setup_logging(verbose: bool) -> Result<()> {
    let log_path = get_log_path();
    if let Some(log_dir) = log_path.parent() {
        fs::create_dir_all(log_dir).context("Failed to create log directory")?;
    }

    // Write to log file, not stdout/stderr; several wd processes may share it
    let level = if verbose { tracing::Level::DEBUG } else { tracing::Level::INFO };
    let log_file = fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)
        .context("Failed to open log file")?;

    tracing_subscriber::fmt()
        .with_writer(log_file)
        .with_ansi(false)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()))
        .init();

    info!("Logging initialized (verbose: {})", verbose);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.verbose).context("Failed to setup logging")?;

    let config = Config::load(cli.config.as_ref()).context("Failed to load configuration")?;
    info!(store = %config.store.path.display(), "warmd loaded config");
    let config = SharedConfig::new(config, cli.config.clone());

    match cli.command {
        Command::Start => cmd_start(config).await,
        Command::Preload { urls } => cmd_dispatch(config, QueueKind::Preload, &urls).await,
        Command::Purge { urls } => cmd_dispatch(config, QueueKind::Purge, &urls).await,
        Command::Run { queue } => cmd_run(config, queue).await,
        Command::Stats { format } => cmd_stats(config, format).await,
        Command::List { queue, limit } => cmd_list(config, queue, limit).await,
        Command::ResetStale { queue } => cmd_reset_stale(config, queue).await,
        Command::Requeue { queue } => cmd_requeue(config, queue).await,
        Command::Clear { queue } => cmd_clear(config, queue).await,
    }
}

fn open_manager(config: &SharedConfig) -> Result<QueueManager> {
    let current = config.current();
    QueueManager::open(&current).context(format!("Failed to open queue store {}", current.store.path.display()))
}

fn local_daemon(config: &SharedConfig) -> Result<Daemon> {
    let manager = open_manager(config)?;
    let fetcher = HttpFetcher::new(config.current().preload.request_timeout())?;
    Ok(Daemon::new(config.clone(), manager, Arc::new(fetcher)))
}

async fn cmd_start(config: SharedConfig) -> Result<()> {
    let daemon = local_daemon(&config)?;
    let bind = config.current().server.bind.clone();
    let listener = tokio::net::TcpListener::bind(&bind)
        .await
        .context(format!("Failed to bind {}", bind))?;

    println!("{} listening on {}", "warmd".bold(), bind);
    println!("Logs: {}", get_log_path().display());

    let (shutdown_tx, _) = broadcast::channel(1);
    tokio::spawn(handle_signals(config, shutdown_tx.clone()));

    daemon.run(listener, shutdown_tx).await
}

/// Reload config on SIGHUP, shut down on SIGINT/SIGTERM
#[cfg(unix)]
async fn handle_signals(config: SharedConfig, shutdown_tx: broadcast::Sender<()>) {
    use tokio::signal::unix::{SignalKind, signal};

    let (mut hangup, mut terminate) = match (signal(SignalKind::hangup()), signal(SignalKind::terminate())) {
        (Ok(hangup), Ok(terminate)) => (hangup, terminate),
        (Err(e), _) | (_, Err(e)) => {
            warn!(error = %e, "Failed to install signal handlers, only Ctrl-C is handled");
            let _ = tokio::signal::ctrl_c().await;
            let _ = shutdown_tx.send(());
            return;
        }
    };

    loop {
        tokio::select! {
            _ = hangup.recv() => {
                if let Err(e) = config.reload() {
                    warn!(error = %e, "Config reload failed, keeping previous config");
                }
            }
            _ = terminate.recv() => break,
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    info!("Shutdown requested");
    let _ = shutdown_tx.send(());
}

#[cfg(not(unix))]
async fn handle_signals(_config: SharedConfig, shutdown_tx: broadcast::Sender<()>) {
    let _ = tokio::signal::ctrl_c().await;
    info!("Shutdown requested");
    let _ = shutdown_tx.send(());
}

async fn cmd_dispatch(config: SharedConfig, queue: QueueKind, args: &UrlArgs) -> Result<()> {
    let urls = collect_urls(args).context("Failed to read URL file")?;
    if urls.is_empty() {
        eyre::bail!("No URLs given");
    }

    if args.run {
        let daemon = local_daemon(&config)?;
        let report = dispatch(daemon.dispatcher(), queue, &urls, args.priority).await?;
        print_dispatch(&report);

        let report = daemon.runner().drain(queue).await?;
        print_batch(queue.as_str(), &report);
        // Purges may have queued follow-up preloads
        if queue == QueueKind::Purge {
            let preloads = daemon.runner().drain(QueueKind::Preload).await?;
            print_batch(QueueKind::Preload.as_str(), &preloads);
        }
        return Ok(());
    }

    let manager = open_manager(&config)?;
    let dispatcher = Dispatcher::new(manager, Trigger::Disabled, config.clone());
    let report = dispatch(&dispatcher, queue, &urls, args.priority).await?;
    print_dispatch(&report);

    let current = config.current();
    match &current.trigger.remote_url {
        Some(url) => {
            let trigger = Trigger::remote(url, std::time::Duration::from_millis(current.trigger.timeout_ms))?;
            if let Some(handle) = trigger.fire(queue) {
                let _ = handle.await;
            }
        }
        None => println!(
            "{}",
            "No trigger.remote-url configured; a running daemon will pick this up on its next sweep".dimmed()
        ),
    }
    Ok(())
}

async fn dispatch(dispatcher: &Dispatcher, queue: QueueKind, urls: &[String], priority: i64) -> Result<DispatchReport> {
    let report = match queue {
        QueueKind::Preload => dispatcher.preload(urls, priority).await?,
        QueueKind::Purge => dispatcher.purge(urls, priority).await?,
    };
    Ok(report)
}

fn print_dispatch(report: &DispatchReport) {
    println!(
        "{}: {} queued, {} revived, {} bumped, {} unchanged",
        report.queue.bold(),
        report.enqueued.inserted.to_string().green(),
        report.enqueued.revived,
        report.enqueued.bumped,
        report.enqueued.unchanged
    );
    for url in &report.rejected {
        println!("  {} {}", "rejected".red(), url);
    }
}

fn print_batch(queue: &str, report: &BatchReport) {
    println!(
        "{}: {} batches, {} done, {} retrying, {} dropped, {} exhausted, {} gone",
        queue.bold(),
        report.batches,
        report.done.to_string().green(),
        report.retried.to_string().yellow(),
        report.dropped.to_string().red(),
        report.exhausted.to_string().red(),
        report.gone
    );
}

async fn cmd_run(config: SharedConfig, queue: QueueKind) -> Result<()> {
    let daemon = local_daemon(&config)?;
    let report = daemon.runner().drain(queue).await?;
    if report.batches == 0 {
        let stats = daemon.manager().stats(queue).await?;
        if stats.processing > 0 {
            println!("{}: a batch is already in progress", queue.as_str().bold());
            return Ok(());
        }
    }
    print_batch(queue.as_str(), &report);
    Ok(())
}

async fn cmd_stats(config: SharedConfig, format: OutputFormat) -> Result<()> {
    let manager = open_manager(&config)?;
    let mut all = Vec::with_capacity(QueueKind::ALL.len());
    for queue in QueueKind::ALL {
        all.push(manager.stats(queue).await?);
    }

    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&all)?);
        }
        OutputFormat::Text => {
            println!("{:<10} {:>8} {:>8} {:>11} {:>7}", "QUEUE", "PENDING", "DELAYED", "PROCESSING", "FAILED");
            for stats in &all {
                println!(
                    "{:<10} {:>8} {:>8} {:>11} {:>7}",
                    stats.queue, stats.pending, stats.delayed, stats.processing, stats.failed
                );
            }
        }
    }
    Ok(())
}

async fn cmd_list(config: SharedConfig, queue: QueueKind, limit: usize) -> Result<()> {
    let manager = open_manager(&config)?;
    let tasks = manager.list(queue, limit).await?;
    if tasks.is_empty() {
        println!("{}: empty", queue.as_str().bold());
        return Ok(());
    }

    for task in tasks {
        let status = match task.status {
            queuestore::TaskStatus::Pending => task.status.to_string().normal(),
            queuestore::TaskStatus::Processing => task.status.to_string().yellow(),
            queuestore::TaskStatus::Failed => task.status.to_string().red(),
        };
        let created = chrono::DateTime::from_timestamp_millis(task.created_at)
            .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
            .unwrap_or_default();
        println!(
            "{:>6} {:<10} p={:<4} r={} {} {}",
            task.id,
            status,
            task.priority,
            task.retries,
            created.dimmed(),
            serde_json::to_string(&task.payload)?
        );
    }
    Ok(())
}

async fn cmd_reset_stale(config: SharedConfig, queue: Option<QueueKind>) -> Result<()> {
    let manager = open_manager(&config)?;
    let timeout = config.current().queue.stale_timeout();
    let queues: Vec<QueueKind> = queue.map(|q| vec![q]).unwrap_or_else(|| QueueKind::ALL.to_vec());
    for queue in queues {
        let reset = manager.reset_stale(queue, timeout).await?;
        println!("{}: {} reset", queue.as_str().bold(), reset);
    }
    Ok(())
}

async fn cmd_requeue(config: SharedConfig, queue: QueueKind) -> Result<()> {
    let manager = open_manager(&config)?;
    let requeued = manager.requeue_failed(queue).await?;
    println!("{}: {} requeued", queue.as_str().bold(), requeued);
    Ok(())
}

async fn cmd_clear(config: SharedConfig, queue: QueueKind) -> Result<()> {
    let manager = open_manager(&config)?;
    let cleared = manager.clear(queue).await?;
    println!("{}: {} cleared", queue.as_str().bold(), cleared);
    Ok(())
}

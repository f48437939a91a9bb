//! lifeline: incremental health and screen-time sync to webhooks.
//!
//! `lifeline run` keeps periodic sync loops going until Ctrl+C or SIGTERM.
//! The other commands run one sync or preview, inspect the attempt log, or
//! edit user settings stored in the settings database.

mod config;

use std::{collections::BTreeSet, path::PathBuf, sync::Arc, time::Duration};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use lifeline_core::{
    storage::Storage, Category, RealClock, Settings, SourceKind, SyncOutcome,
};
use lifeline_delivery::{DeliveryClient, WebhookDispatcher};
use lifeline_sources::{FileHealthPlatform, FileUsageSource, HealthAdapter, LocalZone, UsageAdapter};
use lifeline_sync::{export_csv, export_json, pretty_payload, Scheduler, SyncService};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::config::Config;

#[derive(Debug, Parser)]
#[command(name = "lifeline", version, about = "Sync health and screen-time data to webhooks")]
struct Cli {
    /// Path to the configuration file.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run periodic syncs until interrupted.
    Run,
    /// Run one sync now.
    Sync { source: SourceKind },
    /// Print the payload the next sync would send.
    Preview { source: SourceKind },
    /// Inspect or export the webhook attempt log.
    Logs {
        #[command(subcommand)]
        action: LogsCommand,
    },
    /// Show or edit user settings.
    Settings {
        #[command(subcommand)]
        action: SettingsCommand,
    },
}

#[derive(Debug, Subcommand)]
enum LogsCommand {
    /// List attempts, newest first.
    List {
        #[arg(long)]
        source: Option<SourceKind>,
    },
    /// Export attempts as CSV or their payloads as JSON.
    Export {
        #[arg(long, value_enum)]
        format: ExportFormat,
        #[arg(long)]
        source: Option<SourceKind>,
        /// Write to this file instead of stdout.
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Delete attempts.
    Clear {
        #[arg(long)]
        source: Option<SourceKind>,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ExportFormat {
    Csv,
    Json,
}

#[derive(Debug, Subcommand)]
enum SettingsCommand {
    /// Print every stored setting.
    Show,
    /// Replace the webhook URLs of a source.
    SetUrls { source: SourceKind, urls: Vec<String> },
    /// Add or replace a custom header sent to a source's webhooks.
    SetHeader { source: SourceKind, name: String, value: String },
    /// Replace the enabled health categories.
    SetCategories { names: Vec<String> },
    /// Set the periodic sync interval of a source.
    SetInterval { source: SourceKind, minutes: u32 },
    /// Set the hour at which a screen-time day starts.
    SetDayBoundary {
        hour: u32,
        /// Use midnight instead of the boundary hour.
        #[arg(long)]
        disable: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = Config::load(cli.config.as_deref())?;
    init_tracing(&config.rust_log);

    let storage = Storage::connect(&config.database_url, config.database_max_connections)
        .await
        .context("Failed to open settings database")?;
    let settings = Settings::new(storage.settings.clone());

    let result = dispatch(cli.command, &config, &settings).await;
    storage.close().await;
    result
}

async fn dispatch(command: Command, config: &Config, settings: &Settings) -> Result<()> {
    match command {
        Command::Run => run_daemon(config, settings).await,
        Command::Sync { source } => {
            let service = build_service(config, settings).await?;
            match service.run(source).await {
                SyncOutcome::Failure { reason } => Err(reason.into()),
                outcome => {
                    println!("{outcome}");
                    Ok(())
                },
            }
        },
        Command::Preview { source } => {
            let service = build_service(config, settings).await?;
            let preview = match source {
                SourceKind::Health => service.preview_health().await,
                SourceKind::Usage => service.preview_usage().await,
            };
            println!("{}", preview?);
            Ok(())
        },
        Command::Logs { action } => logs(action, settings).await,
        Command::Settings { action } => edit_settings(action, settings).await,
    }
}

/// Initializes tracing; `RUST_LOG` wins over the configured filter.
fn init_tracing(default_filter: &str) {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_filter))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let fmt_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true);

    tracing_subscriber::registry().with(filter).with(fmt_layer).init();
}

async fn build_service(config: &Config, settings: &Settings) -> Result<SyncService> {
    let health = FileHealthPlatform::open(&config.health_records_path)
        .await
        .with_context(|| format!("Failed to open {}", config.health_records_path.display()))?;
    let usage = FileUsageSource::open(&config.usage_events_path)
        .await
        .with_context(|| format!("Failed to open {}", config.usage_events_path.display()))?;

    let clock = Arc::new(RealClock::new());
    let client = DeliveryClient::new(config.to_client_config())
        .context("Failed to build webhook client")?;
    let dispatcher = WebhookDispatcher::new(
        client,
        config.to_retry_policy(),
        Arc::new(settings.clone()),
        clock.clone(),
    );

    Ok(SyncService::new(
        settings.clone(),
        HealthAdapter::new(Arc::new(health)),
        UsageAdapter::new(Arc::new(usage), LocalZone::System),
        dispatcher,
        clock,
        config.to_payload_meta(),
    ))
}

async fn run_daemon(config: &Config, settings: &Settings) -> Result<()> {
    if !config.scheduler_enabled {
        anyhow::bail!("scheduler is disabled in the configuration; use `lifeline sync` instead");
    }

    let service = Arc::new(build_service(config, settings).await?);
    let mut scheduler =
        Scheduler::new(service, Arc::new(RealClock::new()), CancellationToken::new());
    scheduler.start();
    info!(loops = scheduler.loop_count(), "lifeline is running");

    shutdown_signal().await;
    info!("Shutdown signal received, waiting for in-flight syncs");

    let grace = Duration::from_secs(config.shutdown_grace_seconds);
    if let Err(e) = scheduler.shutdown_graceful(grace).await {
        warn!(error = %e, "sync loops did not stop cleanly");
    }

    info!("lifeline shutdown complete");
    Ok(())
}

/// Waits for shutdown signal (CTRL+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            },
            Err(e) => {
                error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            },
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            info!("Received CTRL+C signal");
        },
        () = terminate => {
            info!("Received SIGTERM signal");
        },
    }
}

async fn logs(action: LogsCommand, settings: &Settings) -> Result<()> {
    match action {
        LogsCommand::List { source } => {
            for entry in settings.attempt_log(source).await? {
                let status = entry.status_code.map_or_else(|| "-".to_string(), |c| c.to_string());
                let verdict = if entry.success { "OK" } else { "FAILED" };
                println!(
                    "{} {:<14} {verdict:<6} {status:>3} {} records={} {}",
                    entry.timestamp.with_timezone(&chrono::Local).format("%Y-%m-%d %H:%M:%S"),
                    entry.source,
                    entry.url,
                    entry.record_count.unwrap_or_default(),
                    entry.error_message.as_deref().unwrap_or_default(),
                );
                if let Some(raw) = entry.raw_payload.as_deref().filter(|_| !entry.success) {
                    println!("{}", pretty_payload(raw));
                }
            }
            Ok(())
        },
        LogsCommand::Export { format, source, output } => {
            let entries = settings.attempt_log(source).await?;
            let rendered = match format {
                ExportFormat::Csv => export_csv(&entries, &chrono::Local),
                ExportFormat::Json => export_json(&entries),
            };
            match output {
                Some(path) => tokio::fs::write(&path, rendered)
                    .await
                    .with_context(|| format!("Failed to write {}", path.display()))?,
                None => print!("{rendered}"),
            }
            Ok(())
        },
        LogsCommand::Clear { source } => {
            settings.clear_attempt_log(source).await?;
            Ok(())
        },
    }
}

async fn edit_settings(action: SettingsCommand, settings: &Settings) -> Result<()> {
    match action {
        SettingsCommand::Show => {
            for (key, value) in settings.dump().await? {
                println!("{key} = {value}");
            }
        },
        SettingsCommand::SetUrls { source, urls } => {
            settings.set_webhook_urls(source, &urls).await?;
        },
        SettingsCommand::SetHeader { source, name, value } => {
            let mut headers = settings.webhook_headers(source).await?;
            headers.insert(name, value);
            settings.set_webhook_headers(source, &headers).await?;
        },
        SettingsCommand::SetCategories { names } => {
            let mut categories = BTreeSet::new();
            for name in &names {
                let category: Category = name.parse()?;
                if category.source() != SourceKind::Health {
                    anyhow::bail!("{category} is not a health category");
                }
                categories.insert(category);
            }
            settings.set_enabled_categories(&categories).await?;
        },
        SettingsCommand::SetInterval { source, minutes } => {
            if minutes == 0 {
                anyhow::bail!("sync interval must be at least one minute");
            }
            settings.set_sync_interval_minutes(source, minutes).await?;
        },
        SettingsCommand::SetDayBoundary { hour, disable } => {
            if hour > 23 {
                anyhow::bail!("day boundary hour must be between 0 and 23");
            }
            settings.set_day_boundary_hour(hour).await?;
            settings.set_use_day_boundary(!disable).await?;
        },
    }
    Ok(())
}

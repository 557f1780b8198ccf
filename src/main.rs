//! HealthTrail - host health telemetry that lives on disk.
//!
//! Samples CPU, memory, disk and GPU readings, appends them to per-metric
//! daily CSV files and prunes files past the retention window. With
//! `--report` it prints recent readings from those files instead.

use anyhow::{Context, Result};
use clap::Parser;
use healthtrail::{
    cli::Cli,
    config::Config,
    internal_metrics::LoggingRecorder,
    sources::{LocalHostProbe, NvidiaSmi},
    storage::HealthQuery,
    Pipeline,
};
use std::{sync::Arc, time::Duration};
use tokio::sync::watch;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load configuration by layering sources: defaults, file, environment, and CLI args.
    let config = Config::load(&cli).context("failed to load configuration")?;

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_level))
        .context("invalid log level")?;
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let settings = config.pipeline_settings()?;

    if let Some(minutes) = cli.report {
        let query = HealthQuery::new(&settings.data_dir, settings.sample_interval);
        let report = query.report(cli.metric.as_deref(), minutes)?;
        println!("{report}");
        return Ok(());
    }

    info!("HealthTrail starting up...");
    info!("-------------------- Configuration --------------------");
    info!("Log Level: {}", config.log_level);
    info!("Data Directory: {}", settings.data_dir.display());
    info!("Retention: {} days", settings.retention_days);
    info!("Sample Interval: {}s", config.sampling.interval_seconds);
    info!("Flush Interval: {}s", config.batching.flush_interval_seconds);
    info!("Queue Capacity: {}", settings.queue_capacity);
    info!("Disk Mount: {}", config.sampling.disk_mount);
    info!(
        "GPU Sampling: {}",
        if config.sampling.gpu_enabled {
            "Enabled"
        } else {
            "Disabled"
        }
    );
    info!("Log Metrics: {}", config.metrics.log_metrics);
    info!("-------------------------------------------------------");

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let mut metrics_task = None;
    if config.metrics.log_metrics {
        info!(
            "Logging recorder enabled. Metrics will be printed every {} seconds.",
            config.metrics.log_aggregation_seconds
        );
        let (recorder, handle) = LoggingRecorder::new(
            Duration::from_secs(config.metrics.log_aggregation_seconds),
            shutdown_rx.clone(),
        );
        metrics::set_global_recorder(recorder)
            .map_err(|e| anyhow::anyhow!("failed to install logging recorder: {e}"))?;
        metrics_task = Some(handle);
    }

    let gpu = config.sampling.gpu_enabled.then(NvidiaSmi::new);
    let probe = Arc::new(LocalHostProbe::new(config.sampling.disk_mount.clone(), gpu));
    let pipeline = Pipeline::start(settings, probe, shutdown_rx);

    info!("HealthTrail initialized successfully. Sampling...");

    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received. Shutting down gracefully...");
    shutdown_tx.send_replace(true);

    pipeline.stop().await;

    if let Some(handle) = metrics_task {
        if let Err(e) = handle.await {
            error!("Metrics task panicked: {:?}", e);
        }
    }

    info!("All tasks shut down. Exiting.");
    Ok(())
}

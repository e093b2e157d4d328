//! snowplay: build the song-play star schema from catalog and event-log JSON.
//!
//! Reads the song catalog and app event logs from S3-compatible storage or
//! the local filesystem and overwrites five partitioned Parquet tables under
//! the configured output root.

use clap::Parser;
use snafu::prelude::*;
use std::path::PathBuf;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use snowplay::config::Config;
use snowplay::error::{ConfigSnafu, MetricsSnafu, PipelineError};
use snowplay::metrics;
use snowplay::pipeline::{Pipeline, PipelineStats, Stage};
use snowplay::transform::{ArtistRow, SongRow, SongplayRow, Table, TimeRow, UserRow};

/// Song-play star schema ETL.
#[derive(Parser, Debug)]
#[command(name = "snowplay")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the configuration file.
    #[arg(short, long)]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Dry run - validate configuration and print the plan without reading
    /// or writing anything.
    #[arg(long)]
    dry_run: bool,

    /// Run a single stage instead of the whole job.
    #[arg(long, value_enum)]
    only: Option<Stage>,
}

#[snafu::report]
#[tokio::main]
async fn main() -> Result<(), PipelineError> {
    let args = Args::parse();

    // Initialize logging
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    info!("snowplay starting");

    let config = Config::from_file(&args.config).context(ConfigSnafu)?;

    if args.dry_run {
        print_plan(&config, args.only);
        return Ok(());
    }

    let exporter = match &config.metrics.textfile_path {
        Some(path) => {
            let exporter = metrics::init(path).context(MetricsSnafu)?;
            debug!("Metrics will be written to {}", path);
            Some(exporter)
        }
        None => None,
    };

    let result = match Pipeline::new(config).await {
        Ok(pipeline) => pipeline.run(args.only).await,
        Err(e) => Err(e),
    };

    // Export even when the run failed, so the failure is visible to collectors
    if let Some(exporter) = &exporter {
        exporter.export().context(MetricsSnafu)?;
    }

    let stats = result?;
    log_summary(&stats);
    Ok(())
}

fn print_plan(config: &Config, only: Option<Stage>) {
    info!("Dry run mode - validating configuration");
    info!("Song data: {}", config.song_data_location());
    info!("Log data: {}", config.log_data_location());
    info!("Output: {}", config.output.root);
    info!(
        "Timezone: {}, weekday format: {:?}",
        config.transform.timezone, config.transform.weekday_format
    );

    let tables: [(&str, &[&str]); 5] = [
        (SongRow::NAME, SongRow::PARTITION_COLUMNS),
        (ArtistRow::NAME, ArtistRow::PARTITION_COLUMNS),
        (UserRow::NAME, UserRow::PARTITION_COLUMNS),
        (TimeRow::NAME, TimeRow::PARTITION_COLUMNS),
        (SongplayRow::NAME, SongplayRow::PARTITION_COLUMNS),
    ];
    let selected: Vec<&str> = match only {
        Some(stage) => stage.tables().to_vec(),
        None => tables.iter().map(|(name, _)| *name).collect(),
    };

    for (name, partitions) in tables {
        if !selected.contains(&name) {
            continue;
        }
        if partitions.is_empty() {
            info!("  - {}/{}", config.output.root, name);
        } else {
            info!(
                "  - {}/{} partitioned by ({})",
                config.output.root,
                name,
                partitions.join(", ")
            );
        }
    }
    info!("Configuration is valid");
}

fn log_summary(stats: &PipelineStats) {
    info!("Pipeline completed successfully");
    info!(
        "  Song records read: {} from {} files",
        stats.song_records_read, stats.song_files_read
    );
    info!(
        "  Log records read: {} from {} files ({} song plays)",
        stats.log_records_read, stats.log_files_read, stats.song_plays
    );
    info!("  Records skipped: {}", stats.records_skipped);
    info!(
        "  Songplays matched: {}, unmatched: {}",
        stats.join.matched, stats.join.missed
    );
    for table in &stats.tables {
        info!(
            "  {}: {} rows in {} files across {} partitions",
            table.table, table.rows, table.files, table.partitions
        );
    }
    info!("  Bytes written: {}", stats.bytes_written());
}

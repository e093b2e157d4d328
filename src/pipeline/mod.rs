//! Batch pipeline.
//!
//! Connects the record reader, the transforms and the partitioned writer
//! into a single full-refresh run:
//!
//! 1. Read the song catalog once, and the event logs when the log stage runs.
//! 2. Song stage: derive songs and artists, write both concurrently.
//! 3. Log stage: keep song plays, derive users, time and songplays, write all
//!    three concurrently.
//!
//! CPU-bound work runs on Tokio's blocking pool; inside it the transforms use
//! rayon. A failed table write aborts the run and leaves tables written
//! before it in place. Re-running overwrites everything.

use clap::ValueEnum;
use snafu::prelude::*;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

use crate::config::Config;
use crate::emit;
use crate::error::{
    ConfigSnafu, PipelineError, PipelineStorageSnafu, ReadSnafu, SinkWriteFailureSnafu,
    SkipThresholdExceededSnafu, TaskJoinSnafu, TransformError, TransformSnafu,
};
use crate::metrics::events::{SongplaysJoined, StageCompleted};
use crate::sink::{PartitionedWriter, PartitionedWriterConfig, ParquetWriterConfig, TableWriteStats};
use crate::source::{LogRecord, ReadResult, RecordReader, RecordReaderConfig, SongRecord};
use crate::storage::StorageProvider;
use crate::transform::{
    JoinStats, SongCatalogIndex, TableBatch, TemporalDecomposer, assemble_songplays,
    extract_artists, extract_songs, extract_users, song_plays, time_table,
};

/// A group of tables written together.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, ValueEnum)]
pub enum Stage {
    /// songs and artists, from the catalog.
    Songs,
    /// users, time and songplays, from the event logs joined to the catalog.
    Logs,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Songs => "songs",
            Stage::Logs => "logs",
        }
    }

    /// Tables this stage writes.
    pub fn tables(&self) -> &'static [&'static str] {
        match self {
            Stage::Songs => &["songs", "artists"],
            Stage::Logs => &["users", "time", "songplays"],
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Statistics about the pipeline run.
#[derive(Debug, Clone, Default)]
pub struct PipelineStats {
    pub song_files_read: usize,
    pub song_records_read: usize,
    pub log_files_read: usize,
    pub log_records_read: usize,
    pub song_plays: usize,
    pub records_skipped: usize,
    pub join: JoinStats,
    /// One entry per table written, in completion order of the stages.
    pub tables: Vec<TableWriteStats>,
}

impl PipelineStats {
    pub fn table(&self, name: &str) -> Option<&TableWriteStats> {
        self.tables.iter().find(|t| t.table == name)
    }

    pub fn rows_written(&self) -> usize {
        self.tables.iter().map(|t| t.rows).sum()
    }

    pub fn files_written(&self) -> usize {
        self.tables.iter().map(|t| t.files).sum()
    }

    pub fn bytes_written(&self) -> usize {
        self.tables.iter().map(|t| t.bytes).sum()
    }
}

/// Tables derived by the log stage.
struct LogTables {
    users: TableBatch,
    time: TableBatch,
    songplays: TableBatch,
    plays: usize,
    join: JoinStats,
}

/// Main processing pipeline.
pub struct Pipeline {
    config: Config,
    reader: RecordReader,
    writer: PartitionedWriter,
    decomposer: TemporalDecomposer,
}

impl Pipeline {
    /// Create a new pipeline from configuration.
    ///
    /// The output root is opened (and created when local) here; inputs are
    /// only touched by [`run`](Self::run).
    pub async fn new(config: Config) -> Result<Self, PipelineError> {
        let timezone = config.timezone().context(ConfigSnafu)?;
        let decomposer = TemporalDecomposer::new(timezone, config.transform.weekday_format);
        let storage_options = config.storage.to_options();

        let reader = RecordReader::new(
            RecordReaderConfig::new(config.source.compression, config.source.max_concurrent_files)
                .with_storage_options(storage_options.clone()),
        );

        let sink_storage = Arc::new(
            StorageProvider::for_url_with_options(&config.output.root, storage_options)
                .await
                .context(PipelineStorageSnafu)?,
        );
        let writer = PartitionedWriter::new(
            sink_storage,
            PartitionedWriterConfig {
                parquet: ParquetWriterConfig::default()
                    .with_compression(config.sink.compression)
                    .with_max_rows_per_file(config.sink.max_rows_per_file),
                max_concurrent_uploads: config.sink.max_concurrent_uploads,
            },
        );

        Ok(Self {
            config,
            reader,
            writer,
            decomposer,
        })
    }

    /// Run the selected stages, or both when `only` is `None`.
    pub async fn run(&self, only: Option<Stage>) -> Result<PipelineStats, PipelineError> {
        let run_songs = only.is_none_or(|s| s == Stage::Songs);
        let run_logs = only.is_none_or(|s| s == Stage::Logs);
        let mut stats = PipelineStats::default();

        info!(
            songs = run_songs,
            logs = run_logs,
            "Starting pipeline, output {}",
            self.config.output.root
        );

        // The catalog feeds both stages, so it is always read
        let catalog = self.read::<SongRecord>(&self.config.song_data_location()).await?;
        stats.song_files_read = catalog.files_read;
        stats.song_records_read = catalog.records.len();
        stats.records_skipped += catalog.records_skipped;

        let logs = if run_logs {
            let logs = self.read::<LogRecord>(&self.config.log_data_location()).await?;
            stats.log_files_read = logs.files_read;
            stats.log_records_read = logs.records.len();
            stats.records_skipped += logs.records_skipped;
            Some(logs.records)
        } else {
            None
        };

        let max = self.config.error_handling.max_skipped_records;
        ensure!(
            max == 0 || stats.records_skipped <= max,
            SkipThresholdExceededSnafu {
                skipped: stats.records_skipped,
                max,
            }
        );
        if stats.records_skipped > 0 {
            warn!(
                "Skipped {} records that did not match their schema",
                stats.records_skipped
            );
        }

        let catalog = Arc::new(catalog.records);

        if run_songs {
            stats.tables.extend(self.songs_stage(Arc::clone(&catalog)).await?);
        }

        if let Some(logs) = logs {
            let (tables, plays, join) = self.logs_stage(catalog, logs).await?;
            stats.song_plays = plays;
            stats.join = join;
            stats.tables.extend(tables);
        }

        info!(
            rows = stats.rows_written(),
            files = stats.files_written(),
            bytes = stats.bytes_written(),
            "Pipeline completed"
        );
        Ok(stats)
    }

    async fn read<R: crate::source::Record>(
        &self,
        location: &str,
    ) -> Result<ReadResult<R>, PipelineError> {
        self.reader
            .read::<R>(location)
            .await
            .context(ReadSnafu { family: R::FAMILY })
    }

    async fn songs_stage(
        &self,
        catalog: Arc<Vec<SongRecord>>,
    ) -> Result<Vec<TableWriteStats>, PipelineError> {
        let start = Instant::now();

        let (songs, artists) = tokio::task::spawn_blocking(move || {
            let songs = TableBatch::from_rows(&extract_songs(&catalog))?;
            let artists = TableBatch::from_rows(&extract_artists(&catalog))?;
            Ok::<_, TransformError>((songs, artists))
        })
        .await
        .context(TaskJoinSnafu)?
        .context(TransformSnafu {
            stage: Stage::Songs.as_str(),
        })?;

        let (songs, artists) = tokio::try_join!(self.write(songs), self.write(artists))?;

        emit!(StageCompleted {
            stage: Stage::Songs.as_str(),
            duration: start.elapsed(),
        });
        Ok(vec![songs, artists])
    }

    async fn logs_stage(
        &self,
        catalog: Arc<Vec<SongRecord>>,
        logs: Vec<LogRecord>,
    ) -> Result<(Vec<TableWriteStats>, usize, JoinStats), PipelineError> {
        let start = Instant::now();
        let decomposer = self.decomposer;

        let derived = tokio::task::spawn_blocking(move || {
            let plays = song_plays(&logs);
            let times = time_table(&plays, &decomposer)?;
            let index = SongCatalogIndex::build(&catalog);
            let (songplays, join) = assemble_songplays(&plays, &times, &index);

            Ok::<_, TransformError>(LogTables {
                users: TableBatch::from_rows(&extract_users(&plays))?,
                time: TableBatch::from_rows(&times)?,
                songplays: TableBatch::from_rows(&songplays)?,
                plays: plays.len(),
                join,
            })
        })
        .await
        .context(TaskJoinSnafu)?
        .context(TransformSnafu {
            stage: Stage::Logs.as_str(),
        })?;

        emit!(SongplaysJoined {
            matched: derived.join.matched as u64,
            missed: derived.join.missed as u64,
        });
        info!(
            plays = derived.plays,
            matched = derived.join.matched,
            missed = derived.join.missed,
            "Joined song plays to the catalog"
        );

        let (users, time, songplays) = tokio::try_join!(
            self.write(derived.users),
            self.write(derived.time),
            self.write(derived.songplays)
        )?;

        emit!(StageCompleted {
            stage: Stage::Logs.as_str(),
            duration: start.elapsed(),
        });
        Ok((vec![users, time, songplays], derived.plays, derived.join))
    }

    async fn write(&self, table: TableBatch) -> Result<TableWriteStats, PipelineError> {
        let name = table.name;
        self.writer
            .write(table)
            .await
            .context(SinkWriteFailureSnafu { table: name })
    }
}

/// Build a pipeline from `config` and run every stage.
pub async fn run_pipeline(config: Config) -> Result<PipelineStats, PipelineError> {
    Pipeline::new(config).await?.run(None).await
}

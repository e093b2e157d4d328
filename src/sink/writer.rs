//! Overwriting, partitioned table writer.

use bytes::Bytes;
use futures::stream::{self, StreamExt, TryStreamExt};
use object_store::path::Path;
use snafu::prelude::*;
use std::sync::Arc;
use tracing::{debug, info};

use super::parquet::{ParquetWriter, ParquetWriterConfig, encode_partitions};
use super::partition::partition_batch;
use crate::emit;
use crate::error::{ClearTableSnafu, EncodeTaskSnafu, ObjectPathSnafu, SinkError, UploadSnafu};
use crate::metrics::events::{ParquetFileWritten, TableCleared, TablePartitions};
use crate::storage::StorageProviderRef;
use crate::transform::TableBatch;

/// Name of the empty object marking a completed table write.
pub const SUCCESS_MARKER: &str = "_SUCCESS";

/// Configuration for the partitioned writer.
#[derive(Debug, Clone)]
pub struct PartitionedWriterConfig {
    pub parquet: ParquetWriterConfig,
    /// Maximum number of uploads in flight per table.
    pub max_concurrent_uploads: usize,
}

impl Default for PartitionedWriterConfig {
    fn default() -> Self {
        Self {
            parquet: ParquetWriterConfig::default(),
            max_concurrent_uploads: 8,
        }
    }
}

/// What one table write produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TableWriteStats {
    pub table: &'static str,
    pub rows: usize,
    pub partitions: usize,
    pub files: usize,
    pub bytes: usize,
    /// Objects removed from the previous run.
    pub cleared: usize,
}

/// Writes whole tables under an output root, replacing whatever was there.
pub struct PartitionedWriter {
    storage: StorageProviderRef,
    config: PartitionedWriterConfig,
    parquet: Arc<ParquetWriter>,
}

impl PartitionedWriter {
    pub fn new(storage: StorageProviderRef, config: PartitionedWriterConfig) -> Self {
        let parquet = Arc::new(ParquetWriter::new(config.parquet.clone()));
        Self {
            storage,
            config,
            parquet,
        }
    }

    /// Replace the contents of `<root>/<table>/` with `table`.
    ///
    /// The old contents are deleted first, then one directory per partition
    /// is written, then the `_SUCCESS` marker. Nothing is rolled back on
    /// failure.
    pub async fn write(&self, table: TableBatch) -> Result<TableWriteStats, SinkError> {
        let name = table.name;
        let rows = table.num_rows();

        let cleared = self
            .storage
            .delete_prefix(name)
            .await
            .context(ClearTableSnafu { table: name })?;
        if cleared > 0 {
            emit!(TableCleared {
                table: name,
                objects: cleared as u64,
            });
            debug!("Cleared {} objects from previous {} output", cleared, name);
        }

        let parquet = Arc::clone(&self.parquet);
        let (partitions, files) = tokio::task::spawn_blocking(move || {
            let slices = partition_batch(&table.batch, table.partition_columns)?;
            let files = encode_partitions(name, &parquet, &slices)?;
            Ok::<_, SinkError>((slices.len(), files))
        })
        .await
        .context(EncodeTaskSnafu)??;

        emit!(TablePartitions {
            table: name,
            count: partitions,
        });

        let file_count = files.len();
        let bytes: usize = stream::iter(files)
            .map(|(path, file)| {
                let storage = Arc::clone(&self.storage);
                async move {
                    let size = file.size();
                    // Partition segments are already Hive-escaped and must not be encoded again
                    let location =
                        Path::parse(&path).context(ObjectPathSnafu { path: path.clone() })?;
                    storage
                        .put(location, file.bytes)
                        .await
                        .context(UploadSnafu { path: path.clone() })?;
                    emit!(ParquetFileWritten {
                        table: name,
                        rows: file.record_count as u64,
                        bytes: size as u64,
                    });
                    debug!("Wrote {} ({} rows, {} bytes)", path, file.record_count, size);
                    Ok::<_, SinkError>(size)
                }
            })
            .buffer_unordered(self.config.max_concurrent_uploads.max(1))
            .try_fold(0, |total, size| async move { Ok(total + size) })
            .await?;

        let marker = format!("{name}/{SUCCESS_MARKER}");
        self.storage
            .put(marker.as_str(), Bytes::new())
            .await
            .context(UploadSnafu { path: marker })?;

        info!(
            table = name,
            rows,
            partitions,
            files = file_count,
            bytes,
            "Wrote table to {}/{}",
            self.storage.canonical_url(),
            name
        );

        Ok(TableWriteStats {
            table: name,
            rows,
            partitions,
            files: file_count,
            bytes,
            cleared,
        })
    }
}

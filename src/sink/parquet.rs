//! Parquet encoding.
//!
//! Encodes Arrow RecordBatches into in-memory Parquet files with a
//! configurable codec, rolling to a new file after a fixed number of rows.
//! File names are derived from the position of the file within its
//! partition, so encoding the same rows twice yields the same names and
//! the same bytes.

use arrow::array::RecordBatch;
use bytes::Bytes;
use parquet::arrow::ArrowWriter;
use parquet::basic::{Compression, GzipLevel, ZstdLevel};
use parquet::file::properties::WriterProperties;
use snafu::prelude::*;
use std::time::Instant;

use crate::config::ParquetCompression;
use crate::emit;
use crate::error::{ParquetEncodeSnafu, SinkError};
use crate::metrics::events::ParquetEncodeCompleted;

/// Configuration for the Parquet encoder.
#[derive(Debug, Clone)]
pub struct ParquetWriterConfig {
    /// Compression codec.
    pub compression: ParquetCompression,
    /// Rows per file before rolling to the next one.
    pub max_rows_per_file: usize,
}

impl Default for ParquetWriterConfig {
    fn default() -> Self {
        Self {
            compression: ParquetCompression::Snappy,
            max_rows_per_file: 1_000_000,
        }
    }
}

impl ParquetWriterConfig {
    /// Set the compression codec.
    pub fn with_compression(mut self, compression: ParquetCompression) -> Self {
        self.compression = compression;
        self
    }

    /// Set the number of rows after which a file is rolled.
    pub fn with_max_rows_per_file(mut self, rows: usize) -> Self {
        self.max_rows_per_file = rows.max(1);
        self
    }

    fn writer_properties(&self) -> WriterProperties {
        let compression = match self.compression {
            ParquetCompression::Uncompressed => Compression::UNCOMPRESSED,
            ParquetCompression::Snappy => Compression::SNAPPY,
            ParquetCompression::Gzip => Compression::GZIP(GzipLevel::default()),
            ParquetCompression::Zstd => Compression::ZSTD(ZstdLevel::default()),
            ParquetCompression::Lz4 => Compression::LZ4,
        };

        WriterProperties::builder()
            .set_compression(compression)
            .set_max_row_group_size(self.max_rows_per_file)
            .build()
    }
}

/// Codec segment of a data file name, Spark style.
pub fn codec_suffix(compression: ParquetCompression) -> Option<&'static str> {
    match compression {
        ParquetCompression::Uncompressed => None,
        ParquetCompression::Snappy => Some("snappy"),
        ParquetCompression::Gzip => Some("gz"),
        ParquetCompression::Zstd => Some("zstd"),
        ParquetCompression::Lz4 => Some("lz4"),
    }
}

/// Name of the `index`th data file in a directory.
pub fn part_file_name(index: usize, compression: ParquetCompression) -> String {
    match codec_suffix(compression) {
        Some(codec) => format!("part-{index:05}.{codec}.parquet"),
        None => format!("part-{index:05}.parquet"),
    }
}

/// An encoded file waiting to be uploaded.
#[derive(Debug, Clone)]
pub struct FinishedFile {
    /// File name within its partition directory.
    pub filename: String,
    pub record_count: usize,
    pub bytes: Bytes,
}

impl FinishedFile {
    pub fn size(&self) -> usize {
        self.bytes.len()
    }
}

/// Encodes batches into rolled Parquet files.
pub struct ParquetWriter {
    config: ParquetWriterConfig,
    properties: WriterProperties,
}

impl ParquetWriter {
    pub fn new(config: ParquetWriterConfig) -> Self {
        let properties = config.writer_properties();
        Self { config, properties }
    }

    pub fn config(&self) -> &ParquetWriterConfig {
        &self.config
    }

    /// Encode `batch` into one or more files of at most `max_rows_per_file`
    /// rows each.
    ///
    /// An empty batch still produces one file so the schema is recorded.
    pub fn encode(&self, batch: &RecordBatch) -> Result<Vec<FinishedFile>, SinkError> {
        let rows = batch.num_rows();
        let chunk = self.config.max_rows_per_file.max(1);

        if rows == 0 {
            return Ok(vec![self.encode_file(0, batch)?]);
        }

        (0..rows)
            .step_by(chunk)
            .enumerate()
            .map(|(index, offset)| {
                let len = chunk.min(rows - offset);
                self.encode_file(index, &batch.slice(offset, len))
            })
            .collect()
    }

    fn encode_file(&self, index: usize, batch: &RecordBatch) -> Result<FinishedFile, SinkError> {
        let mut buffer = Vec::new();
        let mut writer = ArrowWriter::try_new(
            &mut buffer,
            batch.schema(),
            Some(self.properties.clone()),
        )
        .context(ParquetEncodeSnafu)?;
        writer.write(batch).context(ParquetEncodeSnafu)?;
        writer.close().context(ParquetEncodeSnafu)?;

        Ok(FinishedFile {
            filename: part_file_name(index, self.config.compression),
            record_count: batch.num_rows(),
            bytes: Bytes::from(buffer),
        })
    }
}

/// Encode every partition slice of a table, timing the whole table.
pub fn encode_partitions(
    table: &'static str,
    writer: &ParquetWriter,
    slices: &[super::partition::PartitionSlice],
) -> Result<Vec<(String, FinishedFile)>, SinkError> {
    let start = Instant::now();
    let mut files = Vec::new();

    for slice in slices {
        for file in writer.encode(&slice.batch)? {
            let path = if slice.path.is_empty() {
                format!("{table}/{}", file.filename)
            } else {
                format!("{table}/{}/{}", slice.path, file.filename)
            };
            files.push((path, file));
        }
    }

    emit!(ParquetEncodeCompleted {
        table,
        duration: start.elapsed(),
    });
    Ok(files)
}

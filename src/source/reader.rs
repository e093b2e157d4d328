//! Glob-driven NDJSON record reader.
//!
//! Lists every object matching a source pattern, fetches them with bounded
//! concurrency in sorted path order, and parses each non-blank line into a
//! typed record. Lines that do not fit the record shape are skipped and
//! counted rather than failing the read.

use bytes::Bytes;
use futures::stream::{self, StreamExt, TryStreamExt};
use snafu::prelude::*;
use std::collections::HashMap;
use std::io::Read;
use std::sync::Arc;
use tracing::{debug, info};

use super::records::Record;
use crate::config::CompressionFormat;
use crate::emit;
use crate::error::{
    DecompressionSnafu, ParseTaskSnafu, ReaderError, SourceFetchSnafu, SourceListingSnafu,
    SourceNotFoundSnafu,
};
use crate::metrics::events::{BytesRead, FilesRead, RecordsRead, RecordsSkipped};
use crate::storage::{PathPattern, StorageProvider};

/// Configuration for the record reader.
#[derive(Debug, Clone)]
pub struct RecordReaderConfig {
    /// Compression format of input files.
    pub compression: CompressionFormat,
    /// Maximum number of files fetched at once.
    pub max_concurrent_files: usize,
    /// Options passed to the storage backend.
    pub storage_options: HashMap<String, String>,
}

impl RecordReaderConfig {
    pub fn new(compression: CompressionFormat, max_concurrent_files: usize) -> Self {
        Self {
            compression,
            max_concurrent_files,
            storage_options: HashMap::new(),
        }
    }

    pub fn with_storage_options(mut self, options: HashMap<String, String>) -> Self {
        self.storage_options = options;
        self
    }
}

/// A line that could not be parsed into its record family.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaMismatch {
    pub path: String,
    /// 1-based line number within the decompressed file.
    pub line: usize,
    pub message: String,
}

/// Records parsed from one file.
#[derive(Debug)]
pub struct ParsedFile<R> {
    pub records: Vec<R>,
    pub mismatches: Vec<SchemaMismatch>,
}

/// Result of reading every file matching a pattern.
#[derive(Debug)]
pub struct ReadResult<R> {
    /// Records in file order, then line order.
    pub records: Vec<R>,
    pub files_read: usize,
    pub records_skipped: usize,
    /// Compressed bytes fetched from storage.
    pub bytes_read: u64,
}

/// Reads typed records from every object matching a glob pattern.
pub struct RecordReader {
    config: RecordReaderConfig,
}

impl RecordReader {
    pub fn new(config: RecordReaderConfig) -> Self {
        Self { config }
    }

    /// Read every record of family `R` matching `location`.
    ///
    /// Fails with [`ReaderError::SourceNotFound`] when the base location is
    /// missing or nothing under it matches.
    pub async fn read<R: Record>(&self, location: &str) -> Result<ReadResult<R>, ReaderError> {
        let pattern = PathPattern::parse(location).context(SourceListingSnafu {
            pattern: location.to_string(),
        })?;

        let storage =
            match StorageProvider::open_existing(pattern.base(), self.config.storage_options.clone())
                .await
            {
                Ok(storage) => Arc::new(storage),
                Err(e) if e.is_not_found() => {
                    return SourceNotFoundSnafu {
                        pattern: location.to_string(),
                    }
                    .fail();
                }
                Err(source) => {
                    return Err(ReaderError::SourceListing {
                        pattern: location.to_string(),
                        source,
                    });
                }
            };

        let files = storage
            .list_matching(&pattern)
            .await
            .context(SourceListingSnafu {
                pattern: location.to_string(),
            })?;
        ensure!(
            !files.is_empty(),
            SourceNotFoundSnafu {
                pattern: location.to_string(),
            }
        );

        info!(
            "Reading {} {} files from {}",
            files.len(),
            R::FAMILY,
            storage.canonical_url()
        );

        let compression = self.config.compression;
        let files_read = files.len();

        // `buffered` keeps results in the sorted listing order
        let parsed: Vec<(u64, ParsedFile<R>)> = stream::iter(files)
            .map(|location| {
                let storage = Arc::clone(&storage);
                async move {
                    let path = location.to_string();
                    let bytes = storage
                        .get(location)
                        .await
                        .context(SourceFetchSnafu { path: path.clone() })?;
                    let size = bytes.len() as u64;
                    let file = tokio::task::spawn_blocking(move || {
                        parse_file::<R>(&path, bytes, compression)
                    })
                    .await
                    .context(ParseTaskSnafu)??;
                    Ok::<_, ReaderError>((size, file))
                }
            })
            .buffered(self.config.max_concurrent_files.max(1))
            .try_collect()
            .await?;

        let mut result = ReadResult {
            records: Vec::new(),
            files_read,
            records_skipped: 0,
            bytes_read: 0,
        };
        for (size, file) in parsed {
            result.bytes_read += size;
            result.records_skipped += file.mismatches.len();
            for mismatch in &file.mismatches {
                debug!(
                    "Skipping {} record at {}:{}: {}",
                    R::FAMILY,
                    mismatch.path,
                    mismatch.line,
                    mismatch.message
                );
            }
            result.records.extend(file.records);
        }

        emit!(FilesRead {
            family: R::FAMILY,
            count: result.files_read as u64,
        });
        emit!(BytesRead {
            family: R::FAMILY,
            bytes: result.bytes_read,
        });
        emit!(RecordsRead {
            family: R::FAMILY,
            count: result.records.len() as u64,
        });
        if result.records_skipped > 0 {
            emit!(RecordsSkipped {
                family: R::FAMILY,
                count: result.records_skipped as u64,
            });
        }

        info!(
            "Read {} {} records from {} files ({} skipped)",
            result.records.len(),
            R::FAMILY,
            result.files_read,
            result.records_skipped
        );

        Ok(result)
    }
}

/// Decompress and parse one fetched file.
pub fn parse_file<R: Record>(
    path: &str,
    raw: Bytes,
    compression: CompressionFormat,
) -> Result<ParsedFile<R>, ReaderError> {
    let data = decompress(path, raw, compression)?;
    Ok(parse_records(path, &data))
}

fn decompress(
    path: &str,
    raw: Bytes,
    compression: CompressionFormat,
) -> Result<Bytes, ReaderError> {
    match compression {
        CompressionFormat::None => Ok(raw),
        CompressionFormat::Gzip => {
            let mut decoder = flate2::read::GzDecoder::new(&raw[..]);
            let mut buf = Vec::new();
            decoder.read_to_end(&mut buf).context(DecompressionSnafu {
                path: path.to_string(),
            })?;
            Ok(Bytes::from(buf))
        }
        CompressionFormat::Zstd => {
            let buf = zstd::decode_all(&raw[..]).context(DecompressionSnafu {
                path: path.to_string(),
            })?;
            Ok(Bytes::from(buf))
        }
    }
}

/// Parse newline-delimited JSON into records of family `R`.
///
/// Blank lines are ignored. Every other line is one record.
pub fn parse_records<R: Record>(path: &str, data: &[u8]) -> ParsedFile<R> {
    let mut records = Vec::new();
    let mut mismatches = Vec::new();

    for (idx, line) in data.split(|&b| b == b'\n').enumerate() {
        if line.iter().all(|b| b.is_ascii_whitespace()) {
            continue;
        }

        let outcome = serde_json::from_slice::<R>(line)
            .map_err(|e| e.to_string())
            .and_then(|record| record.validate().map(|()| record));

        match outcome {
            Ok(record) => records.push(record),
            Err(message) => mismatches.push(SchemaMismatch {
                path: path.to_string(),
                line: idx + 1,
                message,
            }),
        }
    }

    ParsedFile {
        records,
        mismatches,
    }
}

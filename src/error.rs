//! Error types for snowplay using snafu.
//!
//! This module defines structured error types with context selectors for
//! all error conditions in the codebase.

use snafu::prelude::*;

// ============ Storage Errors ============

/// Errors that can occur during storage operations.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum StorageError {
    /// Invalid storage URL format.
    #[snafu(display("Invalid storage URL: {url}"))]
    InvalidUrl { url: String },

    /// Object store operation failed.
    #[snafu(display("Storage operation failed"))]
    ObjectStore { source: object_store::Error },

    /// IO error during storage operations.
    #[snafu(display("IO error"))]
    Io { source: std::io::Error },

    /// S3 configuration error.
    #[snafu(display("S3 configuration error"))]
    S3Config { source: object_store::Error },

    /// A location that must already exist is missing.
    #[snafu(display("Location does not exist: {path}"))]
    LocationNotFound { path: String },

    /// Glob pattern could not be compiled.
    #[snafu(display("Invalid path pattern: {pattern}"))]
    InvalidPattern {
        pattern: String,
        source: regex::Error,
    },
}

impl StorageError {
    /// Check if this error represents a "not found" condition (404, NoSuchKey, etc.)
    pub fn is_not_found(&self) -> bool {
        match self {
            StorageError::ObjectStore { source } => {
                matches!(source, object_store::Error::NotFound { .. })
            }
            StorageError::LocationNotFound { .. } => true,
            _ => false,
        }
    }
}

// ============ Config Errors ============

/// Errors that can occur during configuration parsing and validation.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum ConfigError {
    /// Input root is empty.
    #[snafu(display("Input root cannot be empty"))]
    EmptyInputRoot,

    /// Output root is empty.
    #[snafu(display("Output root cannot be empty"))]
    EmptyOutputRoot,

    /// One of the input patterns is empty.
    #[snafu(display("Input pattern '{name}' cannot be empty"))]
    EmptyPattern { name: String },

    /// Timezone name is not a known IANA zone.
    #[snafu(display("Unknown timezone: {name}"))]
    UnknownTimezone { name: String },

    /// A concurrency limit was configured as zero.
    #[snafu(display("'{name}' must be greater than zero"))]
    ZeroLimit { name: String },

    /// Environment variable interpolation failed.
    #[snafu(display("Environment variable interpolation failed:\n{message}"))]
    EnvInterpolation { message: String },

    /// Failed to parse YAML configuration.
    #[snafu(display("Failed to parse YAML configuration"))]
    YamlParse { source: serde_yaml::Error },

    /// Failed to read configuration file.
    #[snafu(display("Failed to read configuration file"))]
    ReadFile { source: std::io::Error },
}

// ============ Reader Errors ============

/// Errors that can occur while reading source records.
///
/// Records that fail to parse are not errors; the reader skips and counts them.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum ReaderError {
    /// No object matched the source pattern.
    #[snafu(display("No source files match {pattern}"))]
    SourceNotFound { pattern: String },

    /// Listing the source location failed.
    #[snafu(display("Failed to list source {pattern}"))]
    SourceListing {
        pattern: String,
        source: StorageError,
    },

    /// Fetching a source object failed.
    #[snafu(display("Failed to fetch source file {path}"))]
    SourceFetch { path: String, source: StorageError },

    /// Decompression failed.
    #[snafu(display("Decompression failed for {path}"))]
    Decompression {
        path: String,
        source: std::io::Error,
    },

    /// The blocking parse task panicked or was cancelled.
    #[snafu(display("Parse task failed"))]
    ParseTask { source: tokio::task::JoinError },
}

// ============ Transform Errors ============

/// Errors that can occur while deriving tables.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum TransformError {
    /// A timestamp is outside the representable calendar range.
    #[snafu(display("Timestamp {ts} ms is out of range"))]
    TimestampOutOfRange { ts: i64 },

    /// Building the Arrow batch for a table failed.
    #[snafu(display("Failed to build record batch for table {table}"))]
    BatchBuild {
        table: String,
        source: arrow::error::ArrowError,
    },
}

// ============ Sink Errors ============

/// Errors that can occur during partitioned Parquet writes.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum SinkError {
    /// Removing the previous table contents failed.
    #[snafu(display("Failed to clear existing output for table {table}"))]
    ClearTable { table: String, source: StorageError },

    /// Uploading an encoded file failed.
    #[snafu(display("Failed to upload {path}"))]
    Upload { path: String, source: StorageError },

    /// An encoded file's location is not a valid object path.
    #[snafu(display("Invalid object path {path}"))]
    ObjectPath {
        path: String,
        source: object_store::path::Error,
    },

    /// Parquet encoding failed.
    #[snafu(display("Parquet encoding failed"))]
    ParquetEncode {
        source: parquet::errors::ParquetError,
    },

    /// The blocking encode task panicked or was cancelled.
    #[snafu(display("Encode task failed"))]
    EncodeTask { source: tokio::task::JoinError },

    /// A partition column is not part of the table schema.
    #[snafu(display("Partition column '{column}' not found in schema"))]
    MissingPartitionColumn { column: String },

    /// Slicing or projecting a partition failed.
    #[snafu(display("Failed to split batch into partitions"))]
    PartitionSplit { source: arrow::error::ArrowError },

    /// A partition value could not be rendered.
    #[snafu(display("Failed to render partition value for column '{column}'"))]
    PartitionValue {
        column: String,
        source: arrow::error::ArrowError,
    },
}

// ============ Metrics Errors ============

/// Errors that can occur during metrics initialization and export.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum MetricsError {
    /// Failed to initialize Prometheus recorder.
    #[snafu(display("Failed to initialize Prometheus recorder"))]
    PrometheusInit {
        source: metrics_exporter_prometheus::BuildError,
    },

    /// Failed to write the metrics text file.
    #[snafu(display("Failed to write metrics to {path}"))]
    MetricsTextfile {
        path: String,
        source: std::io::Error,
    },
}

// ============ Pipeline Error (top-level) ============

/// Top-level pipeline errors that aggregate all error types.
///
/// Each variant names the stage or table that failed so a failed run can be
/// diagnosed and re-run.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum PipelineError {
    /// Configuration error.
    #[snafu(display("Configuration error"))]
    Config { source: ConfigError },

    /// Storage error.
    #[snafu(display("Storage error"))]
    PipelineStorage { source: StorageError },

    /// Reading one of the record families failed.
    #[snafu(display("Failed to read {family} records"))]
    Read { family: String, source: ReaderError },

    /// Deriving tables failed.
    #[snafu(display("Transform failed during {stage}"))]
    Transform {
        stage: String,
        source: TransformError,
    },

    /// Writing a table failed. Tables written before this one are left in place.
    #[snafu(display("Write failed for table {table}"))]
    SinkWriteFailure { table: String, source: SinkError },

    /// Task join error.
    #[snafu(display("Task join error"))]
    TaskJoin { source: tokio::task::JoinError },

    /// Too many records were skipped while reading.
    #[snafu(display("Skipped {skipped} records, more than the allowed {max}"))]
    SkipThresholdExceeded { skipped: usize, max: usize },

    /// Metrics error.
    #[snafu(display("Metrics error"))]
    Metrics { source: MetricsError },
}

impl PipelineError {
    /// The table whose write failed, if this is a sink failure.
    pub fn failed_table(&self) -> Option<&str> {
        match self {
            PipelineError::SinkWriteFailure { table, .. } => Some(table),
            _ => None,
        }
    }

    /// Check if this error represents a missing source.
    pub fn is_source_not_found(&self) -> bool {
        matches!(
            self,
            PipelineError::Read {
                source: ReaderError::SourceNotFound { .. },
                ..
            }
        )
    }
}

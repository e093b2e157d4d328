//! Internal events for metrics emission.
//!
//! Each event struct represents a measurable occurrence in a run. Events
//! implement the `InternalEvent` trait which records the corresponding
//! metric through the `metrics` facade. Without an installed recorder the
//! calls are no-ops.

use metrics::{counter, gauge, histogram};
use std::time::Duration;
use tracing::trace;

/// Trait for internal events that can be emitted as metrics.
pub trait InternalEvent {
    /// Emit this event as a metric.
    fn emit(self);
}

// ============================================================================
// Source events
// ============================================================================

/// Event emitted when source files have been read.
pub struct FilesRead {
    pub family: &'static str,
    pub count: u64,
}

impl InternalEvent for FilesRead {
    fn emit(self) {
        trace!(family = self.family, count = self.count, "Files read");
        counter!("snowplay_files_read_total", "family" => self.family).increment(self.count);
    }
}

/// Event emitted when source bytes are read (before decompression).
pub struct BytesRead {
    pub family: &'static str,
    pub bytes: u64,
}

impl InternalEvent for BytesRead {
    fn emit(self) {
        trace!(family = self.family, bytes = self.bytes, "Bytes read");
        counter!("snowplay_bytes_read_total", "family" => self.family).increment(self.bytes);
    }
}

/// Event emitted when records parse successfully.
pub struct RecordsRead {
    pub family: &'static str,
    pub count: u64,
}

impl InternalEvent for RecordsRead {
    fn emit(self) {
        trace!(family = self.family, count = self.count, "Records read");
        counter!("snowplay_records_read_total", "family" => self.family).increment(self.count);
    }
}

/// Event emitted when records fail to parse and are skipped.
pub struct RecordsSkipped {
    pub family: &'static str,
    pub count: u64,
}

impl InternalEvent for RecordsSkipped {
    fn emit(self) {
        trace!(family = self.family, count = self.count, "Records skipped");
        counter!("snowplay_records_skipped_total", "family" => self.family)
            .increment(self.count);
    }
}

// ============================================================================
// Transform events
// ============================================================================

/// Event emitted once the songplays join has run.
pub struct SongplaysJoined {
    pub matched: u64,
    pub missed: u64,
}

impl InternalEvent for SongplaysJoined {
    fn emit(self) {
        trace!(
            matched = self.matched,
            missed = self.missed,
            "Songplays joined"
        );
        counter!("snowplay_join_events_total", "outcome" => "matched").increment(self.matched);
        counter!("snowplay_join_events_total", "outcome" => "missed").increment(self.missed);
    }
}

/// Event emitted when a pipeline stage finishes.
pub struct StageCompleted {
    pub stage: &'static str,
    pub duration: Duration,
}

impl InternalEvent for StageCompleted {
    fn emit(self) {
        trace!(
            stage = self.stage,
            duration_ms = self.duration.as_millis(),
            "Stage completed"
        );
        histogram!("snowplay_stage_duration_seconds", "stage" => self.stage)
            .record(self.duration.as_secs_f64());
    }
}

// ============================================================================
// Sink events
// ============================================================================

/// Event emitted when a table's previous output is removed.
pub struct TableCleared {
    pub table: &'static str,
    pub objects: u64,
}

impl InternalEvent for TableCleared {
    fn emit(self) {
        trace!(table = self.table, objects = self.objects, "Table cleared");
        counter!("snowplay_objects_deleted_total", "table" => self.table).increment(self.objects);
    }
}

/// Event emitted when a Parquet file has been uploaded.
pub struct ParquetFileWritten {
    pub table: &'static str,
    pub rows: u64,
    pub bytes: u64,
}

impl InternalEvent for ParquetFileWritten {
    fn emit(self) {
        trace!(
            table = self.table,
            rows = self.rows,
            bytes = self.bytes,
            "Parquet file written"
        );
        counter!("snowplay_files_written_total", "table" => self.table).increment(1);
        counter!("snowplay_rows_written_total", "table" => self.table).increment(self.rows);
        counter!("snowplay_bytes_written_total", "table" => self.table).increment(self.bytes);
    }
}

/// Event emitted with the number of partitions a table was split into.
pub struct TablePartitions {
    pub table: &'static str,
    pub count: usize,
}

impl InternalEvent for TablePartitions {
    fn emit(self) {
        trace!(table = self.table, count = self.count, "Table partitions");
        gauge!("snowplay_table_partitions", "table" => self.table).set(self.count as f64);
    }
}

/// Event emitted when Parquet encoding of a table completes.
pub struct ParquetEncodeCompleted {
    pub table: &'static str,
    pub duration: Duration,
}

impl InternalEvent for ParquetEncodeCompleted {
    fn emit(self) {
        trace!(
            table = self.table,
            duration_ms = self.duration.as_millis(),
            "Parquet encode completed"
        );
        histogram!("snowplay_parquet_encode_duration_seconds", "table" => self.table)
            .record(self.duration.as_secs_f64());
    }
}

// ============================================================================
// Storage operation events
// ============================================================================

/// Storage operation types.
#[derive(Debug, Clone, Copy)]
pub enum StorageOperation {
    Get,
    Put,
    List,
    Delete,
}

impl StorageOperation {
    pub fn as_str(&self) -> &'static str {
        match self {
            StorageOperation::Get => "get",
            StorageOperation::Put => "put",
            StorageOperation::List => "list",
            StorageOperation::Delete => "delete",
        }
    }
}

/// Status of a storage request.
#[derive(Debug, Clone, Copy)]
pub enum RequestStatus {
    Success,
    Error,
}

impl RequestStatus {
    pub fn from_result<T, E>(result: &Result<T, E>) -> Self {
        if result.is_ok() {
            RequestStatus::Success
        } else {
            RequestStatus::Error
        }
    }

    fn as_str(&self) -> &'static str {
        match self {
            RequestStatus::Success => "success",
            RequestStatus::Error => "error",
        }
    }
}

/// Event emitted when a storage request completes.
pub struct StorageRequest {
    pub operation: StorageOperation,
    pub status: RequestStatus,
}

impl InternalEvent for StorageRequest {
    fn emit(self) {
        trace!(
            operation = self.operation.as_str(),
            status = self.status.as_str(),
            "Storage request"
        );
        counter!(
            "snowplay_storage_requests_total",
            "operation" => self.operation.as_str(),
            "status" => self.status.as_str()
        )
        .increment(1);
    }
}

/// Event emitted when a storage request completes with duration.
pub struct StorageRequestDuration {
    pub operation: StorageOperation,
    pub duration: Duration,
}

impl InternalEvent for StorageRequestDuration {
    fn emit(self) {
        histogram!(
            "snowplay_storage_request_duration_seconds",
            "operation" => self.operation.as_str()
        )
        .record(self.duration.as_secs_f64());
    }
}

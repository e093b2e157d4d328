//! Sink side of the job: partitioning, Parquet encoding and the overwriting
//! table writer.

pub mod parquet;
pub mod partition;
pub mod writer;

pub use parquet::{FinishedFile, ParquetWriter, ParquetWriterConfig, part_file_name};
pub use partition::{HIVE_DEFAULT_PARTITION, PartitionSlice, escape_partition_value, partition_batch};
pub use writer::{PartitionedWriter, PartitionedWriterConfig, SUCCESS_MARKER, TableWriteStats};

//! snowplay: a batch ETL that turns a song catalog and app event logs into a
//! partitioned Parquet star schema.
//!
//! The run reads newline-delimited JSON from S3-compatible storage or the
//! local filesystem, derives the songs, artists, users and time dimensions
//! plus the songplays fact table, and overwrites each table under the output
//! root.
//!
//! # Example
//!
//! ```ignore
//! use snowplay::{Config, run_pipeline, error::PipelineError};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), PipelineError> {
//!     let config = Config::from_file("snowplay.yaml")?;
//!     let stats = run_pipeline(config).await?;
//!     println!("Wrote {} rows", stats.rows_written());
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod metrics;
pub mod pipeline;
pub mod sink;
pub mod source;
pub mod storage;
pub mod transform;

// Re-export main types
pub use config::Config;
pub use pipeline::{Pipeline, PipelineStats, Stage, run_pipeline};
pub use storage::{StorageProvider, StorageProviderRef};

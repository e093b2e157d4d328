//! Derivation of the star schema from parsed records.
//!
//! Every transform here is a pure function over in-memory records. Row-wise
//! work runs on rayon parallel iterators, which keep input order, so the
//! same input always yields the same rows in the same order.

pub mod dimensions;
pub mod songplays;
pub mod tables;
pub mod time;

pub use dimensions::{extract_artists, extract_songs, extract_users, song_plays};
pub use songplays::{JoinStats, SongCatalogIndex, assemble_songplays};
pub use tables::{ArtistRow, SongRow, SongplayRow, TimeRow, UserRow};
pub use time::{TemporalDecomposer, WeekdayFormat, epoch_seconds, time_table};

use arrow::array::RecordBatch;
use arrow::datatypes::SchemaRef;
use arrow::error::ArrowError;
use snafu::prelude::*;

use crate::error::{BatchBuildSnafu, TransformError};

/// An output table of the star schema.
pub trait Table: Sized {
    /// Sub-path of the table under the output root.
    const NAME: &'static str;
    /// Columns encoded in the directory layout, outermost first.
    const PARTITION_COLUMNS: &'static [&'static str];

    fn schema() -> SchemaRef;

    fn to_record_batch(rows: &[Self]) -> Result<RecordBatch, ArrowError>;
}

/// A table's rows in columnar form, ready for the writer.
#[derive(Debug, Clone)]
pub struct TableBatch {
    pub name: &'static str,
    pub partition_columns: &'static [&'static str],
    pub batch: RecordBatch,
}

impl TableBatch {
    pub fn from_rows<T: Table>(rows: &[T]) -> Result<Self, TransformError> {
        let batch = T::to_record_batch(rows).context(BatchBuildSnafu { table: T::NAME })?;
        Ok(Self {
            name: T::NAME,
            partition_columns: T::PARTITION_COLUMNS,
            batch,
        })
    }

    pub fn num_rows(&self) -> usize {
        self.batch.num_rows()
    }
}

//! Hive-style partitioning of record batches.
//!
//! Rows are grouped by the values of the partition columns and each group is
//! addressed by a `col=value/col=value` directory. The partition columns are
//! dropped from the grouped batches since their values live in the path.

use arrow::array::{Array, RecordBatch, UInt32Array};
use arrow::compute::take_record_batch;
use arrow::util::display::array_value_to_string;
use snafu::prelude::*;
use std::collections::BTreeMap;

use crate::error::{
    MissingPartitionColumnSnafu, PartitionSplitSnafu, PartitionValueSnafu, SinkError,
};

/// Directory value used for null or empty partition values.
pub const HIVE_DEFAULT_PARTITION: &str = "__HIVE_DEFAULT_PARTITION__";

/// Rows of one partition.
#[derive(Debug, Clone)]
pub struct PartitionSlice {
    /// Relative directory such as `year=2018/month=11`, empty when the table
    /// is not partitioned.
    pub path: String,
    pub batch: RecordBatch,
}

fn needs_escape(c: char) -> bool {
    matches!(
        c,
        '\u{01}'..='\u{1F}'
            | '"'
            | '#'
            | '%'
            | '\''
            | '*'
            | '/'
            | ':'
            | '='
            | '?'
            | '\\'
            | '\u{7F}'
            | '{'
            | '['
            | ']'
            | '^'
    )
}

/// Escape a value for use in a partition directory name.
pub fn escape_partition_value(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        if needs_escape(c) {
            escaped.push_str(&format!("%{:02X}", c as u32));
        } else {
            escaped.push(c);
        }
    }
    escaped
}

/// Split `batch` by the values of `columns`.
///
/// Slices come back ordered by path and keep the input row order inside each
/// slice. An unpartitioned table yields a single slice holding the whole
/// batch, even when it is empty.
pub fn partition_batch(
    batch: &RecordBatch,
    columns: &[&str],
) -> Result<Vec<PartitionSlice>, SinkError> {
    if columns.is_empty() {
        return Ok(vec![PartitionSlice {
            path: String::new(),
            batch: batch.clone(),
        }]);
    }

    let schema = batch.schema();
    let partition_indices = columns
        .iter()
        .map(|column| {
            schema.index_of(column).ok().context(MissingPartitionColumnSnafu {
                column: column.to_string(),
            })
        })
        .collect::<Result<Vec<usize>, SinkError>>()?;

    let data_indices: Vec<usize> = (0..schema.fields().len())
        .filter(|i| !partition_indices.contains(i))
        .collect();

    let mut groups: BTreeMap<String, Vec<u32>> = BTreeMap::new();
    for row in 0..batch.num_rows() {
        let mut segments = Vec::with_capacity(columns.len());
        for (column, &index) in columns.iter().zip(&partition_indices) {
            let array = batch.column(index);
            let value = if array.is_null(row) {
                HIVE_DEFAULT_PARTITION.to_string()
            } else {
                let rendered = array_value_to_string(array, row).context(PartitionValueSnafu {
                    column: column.to_string(),
                })?;
                if rendered.is_empty() {
                    HIVE_DEFAULT_PARTITION.to_string()
                } else {
                    escape_partition_value(&rendered)
                }
            };
            segments.push(format!("{column}={value}"));
        }
        groups.entry(segments.join("/")).or_default().push(row as u32);
    }

    groups
        .into_iter()
        .map(|(path, rows)| {
            let taken = take_record_batch(batch, &UInt32Array::from(rows))
                .context(PartitionSplitSnafu)?;
            let projected = taken.project(&data_indices).context(PartitionSplitSnafu)?;
            Ok(PartitionSlice {
                path,
                batch: projected,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::array::{Int32Array, StringArray};
    use arrow::datatypes::{DataType, Field, Schema};
    use std::sync::Arc;

    fn batch() -> RecordBatch {
        let schema = Arc::new(Schema::new(vec![
            Field::new("song_id", DataType::Utf8, false),
            Field::new("year", DataType::Int32, true),
            Field::new("artist_id", DataType::Utf8, true),
        ]));
        RecordBatch::try_new(
            schema,
            vec![
                Arc::new(StringArray::from(vec!["SO1", "SO2", "SO3", "SO4"])),
                Arc::new(Int32Array::from(vec![Some(2018), Some(0), Some(2018), None])),
                Arc::new(StringArray::from(vec![
                    Some("AR1"),
                    Some("AR2"),
                    Some("AR1"),
                    Some("AR/3"),
                ])),
            ],
        )
        .unwrap()
    }

    fn ids(batch: &RecordBatch) -> Vec<String> {
        let array = batch
            .column(0)
            .as_any()
            .downcast_ref::<StringArray>()
            .unwrap();
        array.iter().map(|v| v.unwrap().to_string()).collect()
    }

    #[test]
    fn test_groups_by_partition_columns_in_order() {
        let slices = partition_batch(&batch(), &["year", "artist_id"]).unwrap();
        let paths: Vec<&str> = slices.iter().map(|s| s.path.as_str()).collect();

        assert_eq!(
            paths,
            vec![
                "year=0/artist_id=AR2",
                "year=2018/artist_id=AR1",
                "year=__HIVE_DEFAULT_PARTITION__/artist_id=AR%2F3",
            ]
        );
        assert_eq!(ids(&slices[1].batch), vec!["SO1", "SO3"]);
    }

    #[test]
    fn test_partition_columns_are_dropped() {
        let slices = partition_batch(&batch(), &["year", "artist_id"]).unwrap();
        for slice in &slices {
            assert_eq!(slice.batch.num_columns(), 1);
            assert_eq!(slice.batch.schema().field(0).name(), "song_id");
        }
    }

    #[test]
    fn test_unpartitioned_is_one_slice() {
        let slices = partition_batch(&batch(), &[]).unwrap();
        assert_eq!(slices.len(), 1);
        assert_eq!(slices[0].path, "");
        assert_eq!(slices[0].batch.num_columns(), 3);
    }

    #[test]
    fn test_empty_partitioned_batch_has_no_slices() {
        let slices = partition_batch(&batch().slice(0, 0), &["year"]).unwrap();
        assert!(slices.is_empty());
    }

    #[test]
    fn test_unknown_column() {
        let err = partition_batch(&batch(), &["month"]).unwrap_err();
        assert!(matches!(err, SinkError::MissingPartitionColumn { .. }));
    }

    #[test]
    fn test_escape_partition_value() {
        assert_eq!(escape_partition_value("AR1"), "AR1");
        assert_eq!(escape_partition_value("a/b"), "a%2Fb");
        assert_eq!(escape_partition_value("x=y:z"), "x%3Dy%3Az");
        assert_eq!(escape_partition_value("100%"), "100%25");
        assert_eq!(escape_partition_value("Björk"), "Björk");
    }
}

//! Row types of the five output tables and their Arrow layouts.

use arrow::array::{ArrayRef, Float64Array, Int32Array, Int64Array, RecordBatch, StringArray};
use arrow::datatypes::{DataType, Field, Schema, SchemaRef};
use arrow::error::ArrowError;
use std::sync::{Arc, LazyLock};

use super::Table;
use crate::source::{Gender, Level};

#[derive(Debug, Clone, PartialEq)]
pub struct SongRow {
    pub song_id: String,
    pub title: String,
    pub artist_id: String,
    pub year: i64,
    pub duration: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ArtistRow {
    pub artist_id: String,
    pub artist_name: String,
    pub artist_location: Option<String>,
    pub artist_latitude: Option<f64>,
    pub artist_longitude: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserRow {
    pub user_id: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub gender: Option<Gender>,
    pub level: Option<Level>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimeRow {
    /// Epoch seconds.
    pub timestamp: i64,
    pub hour: i32,
    pub day: i32,
    /// ISO week number.
    pub week: i32,
    pub month: i32,
    pub year: i32,
    pub weekday: String,
}

/// A song play joined against the catalog. `song_id` and `artist_id` are
/// `None` when nothing in the catalog matched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SongplayRow {
    pub timestamp: i64,
    pub user_id: Option<String>,
    pub level: Option<Level>,
    pub song_id: Option<String>,
    pub artist_id: Option<String>,
    pub session_id: Option<i64>,
    pub location: Option<String>,
    pub user_agent: Option<String>,
    pub year: i32,
    pub month: i32,
}

fn strings<'a, T: 'a>(rows: &'a [T], f: impl Fn(&'a T) -> &'a str) -> ArrayRef {
    Arc::new(rows.iter().map(f).map(Some).collect::<StringArray>())
}

fn nullable_strings<'a, T: 'a>(rows: &'a [T], f: impl Fn(&'a T) -> Option<&'a str>) -> ArrayRef {
    Arc::new(rows.iter().map(f).collect::<StringArray>())
}

static SONGS_SCHEMA: LazyLock<SchemaRef> = LazyLock::new(|| {
    Arc::new(Schema::new(vec![
        Field::new("song_id", DataType::Utf8, false),
        Field::new("title", DataType::Utf8, false),
        Field::new("artist_id", DataType::Utf8, false),
        Field::new("year", DataType::Int64, false),
        Field::new("duration", DataType::Float64, false),
    ]))
});

impl Table for SongRow {
    const NAME: &'static str = "songs";
    const PARTITION_COLUMNS: &'static [&'static str] = &["year", "artist_id"];

    fn schema() -> SchemaRef {
        Arc::clone(&SONGS_SCHEMA)
    }

    fn to_record_batch(rows: &[Self]) -> Result<RecordBatch, ArrowError> {
        RecordBatch::try_new(
            Self::schema(),
            vec![
                strings(rows, |r| r.song_id.as_str()),
                strings(rows, |r| r.title.as_str()),
                strings(rows, |r| r.artist_id.as_str()),
                Arc::new(rows.iter().map(|r| r.year).collect::<Int64Array>()),
                Arc::new(rows.iter().map(|r| r.duration).collect::<Float64Array>()),
            ],
        )
    }
}

static ARTISTS_SCHEMA: LazyLock<SchemaRef> = LazyLock::new(|| {
    Arc::new(Schema::new(vec![
        Field::new("artist_id", DataType::Utf8, false),
        Field::new("artist_name", DataType::Utf8, false),
        Field::new("artist_location", DataType::Utf8, true),
        Field::new("artist_latitude", DataType::Float64, true),
        Field::new("artist_longitude", DataType::Float64, true),
    ]))
});

impl Table for ArtistRow {
    const NAME: &'static str = "artists";
    const PARTITION_COLUMNS: &'static [&'static str] = &[];

    fn schema() -> SchemaRef {
        Arc::clone(&ARTISTS_SCHEMA)
    }

    fn to_record_batch(rows: &[Self]) -> Result<RecordBatch, ArrowError> {
        RecordBatch::try_new(
            Self::schema(),
            vec![
                strings(rows, |r| r.artist_id.as_str()),
                strings(rows, |r| r.artist_name.as_str()),
                nullable_strings(rows, |r| r.artist_location.as_deref()),
                Arc::new(
                    rows.iter()
                        .map(|r| r.artist_latitude)
                        .collect::<Float64Array>(),
                ),
                Arc::new(
                    rows.iter()
                        .map(|r| r.artist_longitude)
                        .collect::<Float64Array>(),
                ),
            ],
        )
    }
}

static USERS_SCHEMA: LazyLock<SchemaRef> = LazyLock::new(|| {
    Arc::new(Schema::new(vec![
        Field::new("user_id", DataType::Utf8, true),
        Field::new("first_name", DataType::Utf8, true),
        Field::new("last_name", DataType::Utf8, true),
        Field::new("gender", DataType::Utf8, true),
        Field::new("level", DataType::Utf8, true),
    ]))
});

impl Table for UserRow {
    const NAME: &'static str = "users";
    const PARTITION_COLUMNS: &'static [&'static str] = &[];

    fn schema() -> SchemaRef {
        Arc::clone(&USERS_SCHEMA)
    }

    fn to_record_batch(rows: &[Self]) -> Result<RecordBatch, ArrowError> {
        RecordBatch::try_new(
            Self::schema(),
            vec![
                nullable_strings(rows, |r| r.user_id.as_deref()),
                nullable_strings(rows, |r| r.first_name.as_deref()),
                nullable_strings(rows, |r| r.last_name.as_deref()),
                nullable_strings(rows, |r| r.gender.map(|g| g.as_str())),
                nullable_strings(rows, |r| r.level.map(|l| l.as_str())),
            ],
        )
    }
}

static TIME_SCHEMA: LazyLock<SchemaRef> = LazyLock::new(|| {
    Arc::new(Schema::new(vec![
        Field::new("timestamp", DataType::Int64, false),
        Field::new("hour", DataType::Int32, false),
        Field::new("day", DataType::Int32, false),
        Field::new("week", DataType::Int32, false),
        Field::new("month", DataType::Int32, false),
        Field::new("year", DataType::Int32, false),
        Field::new("weekday", DataType::Utf8, false),
    ]))
});

impl Table for TimeRow {
    const NAME: &'static str = "time";
    const PARTITION_COLUMNS: &'static [&'static str] = &["year", "month"];

    fn schema() -> SchemaRef {
        Arc::clone(&TIME_SCHEMA)
    }

    fn to_record_batch(rows: &[Self]) -> Result<RecordBatch, ArrowError> {
        let ints = |f: fn(&TimeRow) -> i32| -> ArrayRef {
            Arc::new(rows.iter().map(f).collect::<Int32Array>())
        };

        RecordBatch::try_new(
            Self::schema(),
            vec![
                Arc::new(rows.iter().map(|r| r.timestamp).collect::<Int64Array>()),
                ints(|r| r.hour),
                ints(|r| r.day),
                ints(|r| r.week),
                ints(|r| r.month),
                ints(|r| r.year),
                strings(rows, |r| r.weekday.as_str()),
            ],
        )
    }
}

static SONGPLAYS_SCHEMA: LazyLock<SchemaRef> = LazyLock::new(|| {
    Arc::new(Schema::new(vec![
        Field::new("timestamp", DataType::Int64, false),
        Field::new("user_id", DataType::Utf8, true),
        Field::new("level", DataType::Utf8, true),
        Field::new("song_id", DataType::Utf8, true),
        Field::new("artist_id", DataType::Utf8, true),
        Field::new("session_id", DataType::Int64, true),
        Field::new("location", DataType::Utf8, true),
        Field::new("user_agent", DataType::Utf8, true),
        Field::new("year", DataType::Int32, false),
        Field::new("month", DataType::Int32, false),
    ]))
});

impl Table for SongplayRow {
    const NAME: &'static str = "songplays";
    const PARTITION_COLUMNS: &'static [&'static str] = &["year", "month"];

    fn schema() -> SchemaRef {
        Arc::clone(&SONGPLAYS_SCHEMA)
    }

    fn to_record_batch(rows: &[Self]) -> Result<RecordBatch, ArrowError> {
        RecordBatch::try_new(
            Self::schema(),
            vec![
                Arc::new(rows.iter().map(|r| r.timestamp).collect::<Int64Array>()),
                nullable_strings(rows, |r| r.user_id.as_deref()),
                nullable_strings(rows, |r| r.level.map(|l| l.as_str())),
                nullable_strings(rows, |r| r.song_id.as_deref()),
                nullable_strings(rows, |r| r.artist_id.as_deref()),
                Arc::new(rows.iter().map(|r| r.session_id).collect::<Int64Array>()),
                nullable_strings(rows, |r| r.location.as_deref()),
                nullable_strings(rows, |r| r.user_agent.as_deref()),
                Arc::new(rows.iter().map(|r| r.year).collect::<Int32Array>()),
                Arc::new(rows.iter().map(|r| r.month).collect::<Int32Array>()),
            ],
        )
    }
}

//! Calendar decomposition of event timestamps.

use chrono::{DateTime, Datelike, Timelike};
use chrono_tz::Tz;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use snafu::prelude::*;

use super::tables::TimeRow;
use crate::error::{TimestampOutOfRangeSnafu, TransformError};
use crate::source::LogRecord;

/// How the weekday column is rendered.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WeekdayFormat {
    /// Abbreviated English name, `Mon` to `Sun`.
    #[default]
    ShortName,
    /// ISO day number, Monday is `1`.
    IsoNumber,
    /// Occurrence of the weekday within its month, `1` to `5`.
    DayOfWeekInMonth,
}

/// Whole seconds since the epoch, flooring toward negative infinity.
pub fn epoch_seconds(ts_millis: i64) -> i64 {
    ts_millis.div_euclid(1000)
}

/// Splits epoch-millisecond timestamps into calendar fields in one timezone.
#[derive(Debug, Clone, Copy)]
pub struct TemporalDecomposer {
    timezone: Tz,
    weekday_format: WeekdayFormat,
}

impl Default for TemporalDecomposer {
    fn default() -> Self {
        Self::new(Tz::UTC, WeekdayFormat::default())
    }
}

impl TemporalDecomposer {
    pub fn new(timezone: Tz, weekday_format: WeekdayFormat) -> Self {
        Self {
            timezone,
            weekday_format,
        }
    }

    pub fn timezone(&self) -> Tz {
        self.timezone
    }

    /// Derive the time row for one event.
    pub fn decompose(&self, ts_millis: i64) -> Result<TimeRow, TransformError> {
        let instant = DateTime::from_timestamp_millis(ts_millis)
            .context(TimestampOutOfRangeSnafu { ts: ts_millis })?
            .with_timezone(&self.timezone);

        let weekday = match self.weekday_format {
            WeekdayFormat::ShortName => instant.format("%a").to_string(),
            WeekdayFormat::IsoNumber => instant.weekday().number_from_monday().to_string(),
            WeekdayFormat::DayOfWeekInMonth => ((instant.day() - 1) / 7 + 1).to_string(),
        };

        Ok(TimeRow {
            timestamp: epoch_seconds(ts_millis),
            hour: instant.hour() as i32,
            day: instant.day() as i32,
            week: instant.iso_week().week() as i32,
            month: instant.month() as i32,
            year: instant.year(),
            weekday,
        })
    }
}

/// One time row per song play, in input order. Rows are not deduplicated.
pub fn time_table(
    plays: &[&LogRecord],
    decomposer: &TemporalDecomposer,
) -> Result<Vec<TimeRow>, TransformError> {
    plays
        .par_iter()
        .map(|play| decomposer.decompose(play.ts))
        .collect()
}

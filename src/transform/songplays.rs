//! Songplays fact assembly: a left outer join of song plays against the
//! catalog on exact (title, artist name, duration).

use rayon::prelude::*;
use std::collections::HashMap;

use super::tables::{SongplayRow, TimeRow};
use crate::source::{LogRecord, SongRecord};

/// Bit pattern used to compare durations.
///
/// Equality follows relational key semantics rather than IEEE: `-0.0`
/// equals `0.0` and every NaN equals every other NaN.
fn duration_key(duration: f64) -> u64 {
    if duration == 0.0 {
        0.0f64.to_bits()
    } else if duration.is_nan() {
        f64::NAN.to_bits()
    } else {
        duration.to_bits()
    }
}

/// Hash index over the song catalog.
///
/// Catalog rows are bucketed by title; artist name and duration are then
/// compared exactly within the bucket.
#[derive(Debug, Default)]
pub struct SongCatalogIndex<'a> {
    by_title: HashMap<&'a str, Vec<(&'a str, u64, &'a SongRecord)>>,
    len: usize,
}

impl<'a> SongCatalogIndex<'a> {
    pub fn build(catalog: &'a [SongRecord]) -> Self {
        let mut by_title: HashMap<&'a str, Vec<_>> = HashMap::with_capacity(catalog.len());
        for song in catalog {
            by_title.entry(song.title.as_str()).or_default().push((
                song.artist_name.as_str(),
                duration_key(song.duration),
                song,
            ));
        }
        Self {
            by_title,
            len: catalog.len(),
        }
    }

    /// Number of catalog rows indexed.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Every catalog row matching all three keys, in catalog order.
    pub fn lookup(
        &self,
        title: &str,
        artist_name: &str,
        duration: f64,
    ) -> impl Iterator<Item = &'a SongRecord> {
        let key = duration_key(duration);
        self.by_title
            .get(title)
            .map(Vec::as_slice)
            .unwrap_or_default()
            .iter()
            .filter(move |(artist, bits, _)| *bits == key && *artist == artist_name)
            .map(|(_, _, song)| *song)
    }
}

/// Outcome counts of a join.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct JoinStats {
    /// Plays that found at least one catalog row.
    pub matched: usize,
    /// Plays that found none and were kept with null song and artist ids.
    pub missed: usize,
}

/// Join each play against the catalog.
///
/// `times` holds the time row derived from each play, position for position.
/// Every play yields one row per matching catalog entry, or a single row with
/// null `song_id` and `artist_id` when nothing matches. A play missing its
/// song, artist or length never matches.
///
/// A (title, artist name, duration) key that appears more than once in the
/// catalog yields more rows than there are plays.
pub fn assemble_songplays(
    plays: &[&LogRecord],
    times: &[TimeRow],
    index: &SongCatalogIndex<'_>,
) -> (Vec<SongplayRow>, JoinStats) {
    debug_assert_eq!(plays.len(), times.len());

    let per_play: Vec<Vec<SongplayRow>> = plays
        .par_iter()
        .zip(times.par_iter())
        .map(|(play, time)| {
            let row = |song: Option<&SongRecord>| SongplayRow {
                timestamp: time.timestamp,
                user_id: play.user_id.clone(),
                level: play.level,
                song_id: song.map(|s| s.song_id.clone()),
                artist_id: song.map(|s| s.artist_id.clone()),
                session_id: play.session_id,
                location: play.location.clone(),
                user_agent: play.user_agent.clone(),
                year: time.year,
                month: time.month,
            };

            let matches: Vec<SongplayRow> = match (&play.song, &play.artist, play.length) {
                (Some(title), Some(artist), Some(length)) => index
                    .lookup(title, artist, length)
                    .map(|song| row(Some(song)))
                    .collect(),
                _ => Vec::new(),
            };

            if matches.is_empty() {
                vec![row(None)]
            } else {
                matches
            }
        })
        .collect();

    let mut stats = JoinStats::default();
    let mut rows = Vec::with_capacity(plays.len());
    for play_rows in per_play {
        if play_rows.first().is_some_and(|r| r.song_id.is_some()) {
            stats.matched += 1;
        } else {
            stats.missed += 1;
        }
        rows.extend(play_rows);
    }

    (rows, stats)
}

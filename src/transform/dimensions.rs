//! Dimension tables projected from the catalog and the play events.

use rayon::prelude::*;

use super::tables::{ArtistRow, SongRow, UserRow};
use crate::source::{LogRecord, SongRecord};

/// Keep only song-play events, preserving order.
pub fn song_plays(logs: &[LogRecord]) -> Vec<&LogRecord> {
    logs.par_iter().filter(|r| r.is_song_play()).collect()
}

pub fn extract_songs(catalog: &[SongRecord]) -> Vec<SongRow> {
    catalog
        .par_iter()
        .map(|r| SongRow {
            song_id: r.song_id.clone(),
            title: r.title.clone(),
            artist_id: r.artist_id.clone(),
            year: r.year,
            duration: r.duration,
        })
        .collect()
}

/// One artist row per catalog record. Artists repeated across songs are
/// repeated here.
pub fn extract_artists(catalog: &[SongRecord]) -> Vec<ArtistRow> {
    catalog
        .par_iter()
        .map(|r| ArtistRow {
            artist_id: r.artist_id.clone(),
            artist_name: r.artist_name.clone(),
            artist_location: r.artist_location.clone(),
            artist_latitude: r.artist_latitude,
            artist_longitude: r.artist_longitude,
        })
        .collect()
}

/// One user row per song play, without deduplication.
pub fn extract_users(plays: &[&LogRecord]) -> Vec<UserRow> {
    plays
        .par_iter()
        .map(|r| UserRow {
            user_id: r.user_id.clone(),
            first_name: r.first_name.clone(),
            last_name: r.last_name.clone(),
            gender: r.gender,
            level: r.level,
        })
        .collect()
}

//! Typed shapes of the two input record families.
//!
//! Fields the tables never use are accepted and ignored. A line that does not
//! fit the declared shape (missing required field, wrong type, unknown enum
//! value) is a schema mismatch for that single record.

use serde::{Deserialize, Deserializer, Serialize};

/// Page value marking a song play in the event log.
pub const NEXT_SONG: &str = "NextSong";

/// A family of source records that the reader can parse.
pub trait Record: serde::de::DeserializeOwned + Send + 'static {
    /// Family name used in logs, metrics and errors.
    const FAMILY: &'static str;

    /// Checks beyond what deserialization enforces.
    fn validate(&self) -> Result<(), String> {
        Ok(())
    }
}

/// One entry of the song catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SongRecord {
    pub song_id: String,
    pub title: String,
    pub artist_id: String,
    pub artist_name: String,
    #[serde(default)]
    pub artist_location: Option<String>,
    #[serde(default)]
    pub artist_latitude: Option<f64>,
    #[serde(default)]
    pub artist_longitude: Option<f64>,
    /// Release year, 0 when unknown.
    pub year: i64,
    /// Track length in seconds.
    pub duration: f64,
    #[serde(default)]
    pub num_songs: Option<i64>,
}

impl Record for SongRecord {
    const FAMILY: &'static str = "song";
}

/// Subscription level of a user at the time of an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    Free,
    Paid,
}

impl Level {
    pub fn as_str(&self) -> &'static str {
        match self {
            Level::Free => "free",
            Level::Paid => "paid",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Gender {
    #[serde(rename = "M")]
    Male,
    #[serde(rename = "F")]
    Female,
}

impl Gender {
    pub fn as_str(&self) -> &'static str {
        match self {
            Gender::Male => "M",
            Gender::Female => "F",
        }
    }
}

/// One application event from the usage log.
///
/// Field names follow the log's camelCase keys.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogRecord {
    #[serde(default)]
    pub page: Option<String>,
    /// Numeric ids are normalised to their decimal string; anonymous events
    /// carry an empty string.
    #[serde(default, deserialize_with = "string_or_integer")]
    pub user_id: Option<String>,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub gender: Option<Gender>,
    #[serde(default)]
    pub level: Option<Level>,
    /// Event time in epoch milliseconds.
    pub ts: i64,
    /// Track title as logged.
    #[serde(default)]
    pub song: Option<String>,
    /// Artist name as logged.
    #[serde(default)]
    pub artist: Option<String>,
    /// Track length in seconds as logged.
    #[serde(default)]
    pub length: Option<f64>,
    #[serde(default)]
    pub session_id: Option<i64>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub user_agent: Option<String>,
}

impl LogRecord {
    /// Whether this event is a song play.
    pub fn is_song_play(&self) -> bool {
        self.page.as_deref() == Some(NEXT_SONG)
    }
}

impl Record for LogRecord {
    const FAMILY: &'static str = "log";

    fn validate(&self) -> Result<(), String> {
        match chrono::DateTime::from_timestamp_millis(self.ts) {
            Some(_) => Ok(()),
            None => Err(format!("ts {} is outside the supported range", self.ts)),
        }
    }
}

fn string_or_integer<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Text(String),
        Integer(i64),
    }

    Ok(Option::<Raw>::deserialize(deserializer)?.map(|raw| match raw {
        Raw::Text(text) => text,
        Raw::Integer(n) => n.to_string(),
    }))
}

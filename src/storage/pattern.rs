//! Glob-style source path patterns.
//!
//! A pattern such as `s3a://bucket/song_data/*/*/*/*.json` is split into a
//! literal base location (`s3a://bucket/song_data`) that is opened as a
//! storage root, and a glob (`*/*/*/*.json`) matched against listed paths
//! relative to that root.
//!
//! - `*` matches any run of characters inside one path segment, so the
//!   number of `*` segments fixes the directory depth.
//! - `?` matches a single character inside a segment.
//! - `**` as a whole segment matches zero or more segments.
//!
//! A pattern without wildcards names a directory; every file under it matches.

use regex::Regex;
use snafu::prelude::*;
use std::fmt;

use crate::error::{InvalidPatternSnafu, StorageError};

/// A location split into its literal base and glob suffix.
#[derive(Debug, Clone)]
pub struct PathPattern {
    base: String,
    glob: String,
    regex: Regex,
}

impl PathPattern {
    /// Split `location` at the first segment containing a wildcard.
    pub fn parse(location: &str) -> Result<Self, StorageError> {
        let segments: Vec<&str> = location.split('/').collect();
        let first_wild = segments
            .iter()
            .position(|s| s.contains(['*', '?']))
            .unwrap_or(segments.len());

        let base = segments[..first_wild].join("/");
        let glob = segments[first_wild..].join("/");
        let regex = Regex::new(&glob_to_regex(&glob)).context(InvalidPatternSnafu {
            pattern: location.to_string(),
        })?;

        Ok(Self { base, glob, regex })
    }

    /// The literal location to open as a storage root.
    pub fn base(&self) -> &str {
        &self.base
    }

    /// The glob matched against paths relative to [`base`](Self::base).
    pub fn glob(&self) -> &str {
        &self.glob
    }

    /// Check a path relative to the base.
    pub fn matches(&self, relative_path: &str) -> bool {
        self.regex.is_match(relative_path)
    }
}

impl fmt::Display for PathPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.glob.is_empty() {
            write!(f, "{}", self.base)
        } else {
            write!(f, "{}/{}", self.base, self.glob)
        }
    }
}

fn glob_to_regex(glob: &str) -> String {
    if glob.is_empty() {
        return "^.+$".to_string();
    }

    let segments: Vec<&str> = glob.split('/').collect();
    let mut out = String::from("^");

    for (i, segment) in segments.iter().enumerate() {
        let last = i + 1 == segments.len();

        if *segment == "**" {
            out.push_str(if last { ".*" } else { "(?:[^/]+/)*" });
            continue;
        }

        let mut literal = String::new();
        for c in segment.chars() {
            match c {
                '*' | '?' => {
                    out.push_str(&regex::escape(&literal));
                    literal.clear();
                    out.push_str(if c == '*' { "[^/]*" } else { "[^/]" });
                }
                _ => literal.push(c),
            }
        }
        out.push_str(&regex::escape(&literal));

        if !last {
            out.push('/');
        }
    }

    out.push('$');
    out
}

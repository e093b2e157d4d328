//! Configuration parsing and validation.
//!
//! Handles loading the run configuration from a YAML file, with environment
//! variable interpolation applied before parsing.

mod vars;

use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use snafu::prelude::*;
use std::collections::HashMap;
use std::path::Path;

use crate::error::{
    ConfigError, EmptyInputRootSnafu, EmptyOutputRootSnafu, EmptyPatternSnafu,
    EnvInterpolationSnafu, ReadFileSnafu, UnknownTimezoneSnafu, YamlParseSnafu, ZeroLimitSnafu,
};
use crate::transform::WeekdayFormat;

pub use vars::{Expansion, interpolate, interpolate_with};

/// Main configuration structure for a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub input: InputConfig,
    pub output: OutputConfig,
    /// Connection parameters for object storage.
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub source: SourceConfig,
    #[serde(default)]
    pub sink: SinkConfig,
    #[serde(default)]
    pub transform: TransformConfig,
    #[serde(default)]
    pub error_handling: ErrorHandlingConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
}

/// Where the two record families live.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InputConfig {
    /// Root URL or path, e.g. "s3a://udacity-dend" or "/data/input".
    pub root: String,

    /// Glob for song catalog files, relative to `root` unless absolute.
    #[serde(default = "default_song_data")]
    pub song_data: String,

    /// Glob for event log files, relative to `root` unless absolute.
    #[serde(default = "default_log_data")]
    pub log_data: String,
}

fn default_song_data() -> String {
    "song_data/*/*/*/*.json".to_string()
}

fn default_log_data() -> String {
    "log_data/*/*/*.json".to_string()
}

/// Where the star schema tables are written.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Root URL or path. Each table lands in a sub-path named after it.
    pub root: String,
}

/// Explicit object storage credentials and endpoint settings.
///
/// These are handed to the storage provider when it is built.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default)]
    pub aws_access_key_id: Option<String>,
    #[serde(default)]
    pub aws_secret_access_key: Option<String>,
    #[serde(default)]
    pub aws_session_token: Option<String>,
    #[serde(default)]
    pub region: Option<String>,
    /// Custom endpoint for S3-compatible stores (MinIO, LocalStack, ...).
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default)]
    pub allow_http: bool,
    /// Extra `object_store` options, passed through untouched.
    #[serde(default)]
    pub options: HashMap<String, String>,
}

impl StorageConfig {
    /// Flatten into `object_store` configuration keys.
    pub fn to_options(&self) -> HashMap<String, String> {
        let mut options = self.options.clone();
        let explicit = [
            ("aws_access_key_id", &self.aws_access_key_id),
            ("aws_secret_access_key", &self.aws_secret_access_key),
            ("aws_session_token", &self.aws_session_token),
            ("aws_region", &self.region),
            ("aws_endpoint", &self.endpoint),
        ];
        for (key, value) in explicit {
            if let Some(value) = value {
                options.insert(key.to_string(), value.clone());
            }
        }
        if self.allow_http {
            options.insert("aws_allow_http".to_string(), "true".to_string());
        }
        options
    }
}

/// Settings for reading source records.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    /// Compression format of input files.
    #[serde(default)]
    pub compression: CompressionFormat,

    /// Maximum number of files fetched concurrently (default: 16).
    #[serde(default = "default_max_concurrent_files")]
    pub max_concurrent_files: usize,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            compression: CompressionFormat::default(),
            max_concurrent_files: default_max_concurrent_files(),
        }
    }
}

fn default_max_concurrent_files() -> usize {
    16
}

/// Settings for writing Parquet tables.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SinkConfig {
    /// Parquet compression codec.
    #[serde(default)]
    pub compression: ParquetCompression,

    /// Rows per Parquet file before rolling to the next part (default: 1,000,000).
    #[serde(default = "default_max_rows_per_file")]
    pub max_rows_per_file: usize,

    /// Maximum concurrent file uploads per table (default: 8).
    #[serde(default = "default_max_concurrent_uploads")]
    pub max_concurrent_uploads: usize,
}

impl Default for SinkConfig {
    fn default() -> Self {
        Self {
            compression: ParquetCompression::default(),
            max_rows_per_file: default_max_rows_per_file(),
            max_concurrent_uploads: default_max_concurrent_uploads(),
        }
    }
}

fn default_max_rows_per_file() -> usize {
    1_000_000
}

fn default_max_concurrent_uploads() -> usize {
    8
}

/// Settings for calendar decomposition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransformConfig {
    /// IANA timezone used to derive hour/day/week/month/year (default: "UTC").
    #[serde(default = "default_timezone")]
    pub timezone: String,

    /// How the weekday column is rendered.
    #[serde(default)]
    pub weekday_format: WeekdayFormat,
}

impl Default for TransformConfig {
    fn default() -> Self {
        Self {
            timezone: default_timezone(),
            weekday_format: WeekdayFormat::default(),
        }
    }
}

fn default_timezone() -> String {
    "UTC".to_string()
}

/// Error handling configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ErrorHandlingConfig {
    /// Abort after reading if more records than this were skipped (0 = unlimited).
    #[serde(default)]
    pub max_skipped_records: usize,
}

/// Metrics configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MetricsConfig {
    /// When set, Prometheus text output is written here at the end of the run.
    #[serde(default)]
    pub textfile_path: Option<String>,
}

/// Compression format for source files.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CompressionFormat {
    #[default]
    None,
    Gzip,
    Zstd,
}

/// Parquet compression codec.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ParquetCompression {
    Uncompressed,
    #[default]
    Snappy,
    Gzip,
    Zstd,
    Lz4,
}

impl Config {
    /// Load configuration from a YAML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        Self::from_file_with_options(path, true)
    }

    /// Load configuration from a YAML file with optional environment variable interpolation.
    pub fn from_file_with_options(
        path: impl AsRef<Path>,
        interpolate_env: bool,
    ) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref()).context(ReadFileSnafu)?;

        let content = if interpolate_env {
            let expansion = vars::interpolate(&content);
            if !expansion.is_ok() {
                return EnvInterpolationSnafu {
                    message: expansion.errors.join("\n"),
                }
                .fail();
            }
            expansion.text
        } else {
            content
        };

        Self::from_yaml(&content)
    }

    /// Parse and validate configuration from YAML text.
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        let config: Config = serde_yaml::from_str(yaml).context(YamlParseSnafu)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        ensure!(!self.input.root.trim().is_empty(), EmptyInputRootSnafu);
        ensure!(!self.output.root.trim().is_empty(), EmptyOutputRootSnafu);
        ensure!(
            !self.input.song_data.trim().is_empty(),
            EmptyPatternSnafu { name: "song_data" }
        );
        ensure!(
            !self.input.log_data.trim().is_empty(),
            EmptyPatternSnafu { name: "log_data" }
        );
        ensure!(
            self.source.max_concurrent_files > 0,
            ZeroLimitSnafu {
                name: "source.max_concurrent_files"
            }
        );
        ensure!(
            self.sink.max_rows_per_file > 0,
            ZeroLimitSnafu {
                name: "sink.max_rows_per_file"
            }
        );
        ensure!(
            self.sink.max_concurrent_uploads > 0,
            ZeroLimitSnafu {
                name: "sink.max_concurrent_uploads"
            }
        );
        self.timezone()?;
        Ok(())
    }

    /// The configured timezone.
    pub fn timezone(&self) -> Result<Tz, ConfigError> {
        self.transform
            .timezone
            .parse::<Tz>()
            .ok()
            .context(UnknownTimezoneSnafu {
                name: self.transform.timezone.clone(),
            })
    }

    /// Full location pattern of the song catalog.
    pub fn song_data_location(&self) -> String {
        resolve(&self.input.root, &self.input.song_data)
    }

    /// Full location pattern of the event logs.
    pub fn log_data_location(&self) -> String {
        resolve(&self.input.root, &self.input.log_data)
    }
}

/// Join a pattern onto a root unless the pattern is already absolute.
fn resolve(root: &str, pattern: &str) -> String {
    if pattern.contains("://") || pattern.starts_with('/') {
        return pattern.to_string();
    }
    format!(
        "{}/{}",
        root.trim_end_matches('/'),
        pattern.trim_start_matches("./")
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
input:
  root: "s3a://udacity-dend/"
output:
  root: "s3a://analytics-lake/star"
"#;

    #[test]
    fn test_defaults() {
        let config = Config::from_yaml(MINIMAL).unwrap();

        assert_eq!(config.input.song_data, "song_data/*/*/*/*.json");
        assert_eq!(config.input.log_data, "log_data/*/*/*.json");
        assert_eq!(config.source.compression, CompressionFormat::None);
        assert_eq!(config.source.max_concurrent_files, 16);
        assert_eq!(config.sink.compression, ParquetCompression::Snappy);
        assert_eq!(config.sink.max_rows_per_file, 1_000_000);
        assert_eq!(config.transform.timezone, "UTC");
        assert_eq!(config.transform.weekday_format, WeekdayFormat::ShortName);
        assert_eq!(config.error_handling.max_skipped_records, 0);
        assert!(config.metrics.textfile_path.is_none());
    }

    #[test]
    fn test_locations_resolve_against_root() {
        let config = Config::from_yaml(MINIMAL).unwrap();

        assert_eq!(
            config.song_data_location(),
            "s3a://udacity-dend/song_data/*/*/*/*.json"
        );
        assert_eq!(
            config.log_data_location(),
            "s3a://udacity-dend/log_data/*/*/*.json"
        );
    }

    #[test]
    fn test_absolute_pattern_ignores_root() {
        assert_eq!(
            resolve("/data/in", "/elsewhere/log_data/*.json"),
            "/elsewhere/log_data/*.json"
        );
        assert_eq!(
            resolve("/data/in", "s3://other/log_data/*.json"),
            "s3://other/log_data/*.json"
        );
        assert_eq!(resolve("/data/in/", "./song_data"), "/data/in/song_data");
    }

    #[test]
    fn test_full_config() {
        let yaml = r#"
input:
  root: /data/in
  song_data: "song-data/*/*/*/*.json.gz"
output:
  root: /data/out
storage:
  aws_access_key_id: AKIAEXAMPLE
  aws_secret_access_key: secret
  region: us-west-2
  endpoint: http://localhost:9000
  allow_http: true
source:
  compression: gzip
  max_concurrent_files: 4
sink:
  compression: zstd
  max_rows_per_file: 500
transform:
  timezone: America/Los_Angeles
  weekday_format: iso_number
error_handling:
  max_skipped_records: 10
metrics:
  textfile_path: /var/lib/node_exporter/snowplay.prom
"#;
        let config = Config::from_yaml(yaml).unwrap();

        assert_eq!(config.source.compression, CompressionFormat::Gzip);
        assert_eq!(config.sink.compression, ParquetCompression::Zstd);
        assert_eq!(config.sink.max_rows_per_file, 500);
        assert_eq!(config.transform.weekday_format, WeekdayFormat::IsoNumber);
        assert_eq!(config.timezone().unwrap(), chrono_tz::America::Los_Angeles);
        assert_eq!(config.error_handling.max_skipped_records, 10);

        let options = config.storage.to_options();
        assert_eq!(options["aws_access_key_id"], "AKIAEXAMPLE");
        assert_eq!(options["aws_secret_access_key"], "secret");
        assert_eq!(options["aws_region"], "us-west-2");
        assert_eq!(options["aws_endpoint"], "http://localhost:9000");
        assert_eq!(options["aws_allow_http"], "true");
        assert!(!options.contains_key("aws_session_token"));
    }

    #[test]
    fn test_unknown_timezone_rejected() {
        let yaml = format!("{MINIMAL}transform:\n  timezone: Mars/Olympus_Mons\n");
        let err = Config::from_yaml(&yaml).unwrap_err();
        assert!(matches!(err, ConfigError::UnknownTimezone { .. }));
    }

    #[test]
    fn test_empty_roots_rejected() {
        let yaml = r#"
input:
  root: ""
output:
  root: /out
"#;
        assert!(matches!(
            Config::from_yaml(yaml).unwrap_err(),
            ConfigError::EmptyInputRoot
        ));

        let yaml = r#"
input:
  root: /in
output:
  root: " "
"#;
        assert!(matches!(
            Config::from_yaml(yaml).unwrap_err(),
            ConfigError::EmptyOutputRoot
        ));
    }

    #[test]
    fn test_zero_limits_rejected() {
        let yaml = format!("{MINIMAL}sink:\n  max_rows_per_file: 0\n");
        let err = Config::from_yaml(&yaml).unwrap_err();
        assert!(matches!(err, ConfigError::ZeroLimit { .. }));
    }

    #[test]
    fn test_from_file_interpolates_environment() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("snowplay.yaml");
        std::fs::write(
            &path,
            "input:\n  root: ${SNOWPLAY_CONFIG_TEST_ROOT:-/fallback/in}\noutput:\n  root: /out\n",
        )
        .unwrap();

        let config = Config::from_file(&path).unwrap();
        assert_eq!(config.input.root, "/fallback/in");
    }

    #[test]
    fn test_from_file_reports_missing_variables() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("snowplay.yaml");
        std::fs::write(
            &path,
            "input:\n  root: ${SNOWPLAY_CONFIG_TEST_UNSET_ROOT}\noutput:\n  root: /out\n",
        )
        .unwrap();

        let err = Config::from_file(&path).unwrap_err();
        assert!(matches!(err, ConfigError::EnvInterpolation { .. }));
    }
}

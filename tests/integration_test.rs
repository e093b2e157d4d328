//! Integration tests for snowplay

use arrow::array::{Array, Int64Array, RecordBatch, StringArray};
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

use snowplay::config::Config;
use snowplay::pipeline::{Pipeline, Stage, run_pipeline};

const SONGS: &[(&str, &str)] = &[
    (
        "song_data/A/A/A/TRAAAEXODUS128F.json",
        r#"{"num_songs": 1, "artist_id": "ARMARLEY1187B9", "artist_latitude": 18.01, "artist_longitude": -76.79, "artist_location": "Jamaica", "artist_name": "Bob Marley", "song_id": "SOEXODUS12A6D4", "title": "Exodus", "duration": 118.07, "year": 1977}"#,
    ),
    (
        "song_data/A/A/B/TRAABRENAUD128F.json",
        r#"{"num_songs": 1, "artist_id": "ARJIE2Y1187B994AB7", "artist_latitude": null, "artist_longitude": null, "artist_location": "", "artist_name": "Line Renaud", "song_id": "SOUPIRU12A6D4FA1E1", "title": "Der Kleine Dompfaff", "duration": 152.92036, "year": 0}"#,
    ),
    (
        "song_data/A/B/A/TRABAELENA128F.json",
        r#"{"num_songs": 1, "artist_id": "AR5KOSW1187FB35FF4", "artist_latitude": 49.80388, "artist_longitude": 15.47491, "artist_location": "Dubai UAE", "artist_name": "Elena", "song_id": "SOZCTXZ12AB0182364", "title": "Setanta matins", "duration": 269.58322, "year": 0}"#,
    ),
];

const LOG_FILE: &str = "log_data/2018/11/2018-11-22-events.json";

fn log_lines() -> String {
    [
        // Exact catalog match
        r#"{"artist":"Bob Marley","auth":"Logged In","firstName":"Jayden","gender":"M","itemInSession":2,"lastName":"Graves","length":118.07,"level":"paid","location":"Marinette, WI-MI","method":"PUT","page":"NextSong","registration":1540664184796.0,"sessionId":984,"song":"Exodus","status":200,"ts":1542845032796,"userAgent":"\"Mozilla\/5.0 (Windows NT 6.1; WOW64)\"","userId":"25"}"#,
        // Off by 0.01s, must not match
        r#"{"artist":"Bob Marley","auth":"Logged In","firstName":"Jayden","gender":"M","itemInSession":3,"lastName":"Graves","length":118.08,"level":"paid","location":"Marinette, WI-MI","method":"PUT","page":"NextSong","registration":1540664184796.0,"sessionId":984,"song":"Exodus","status":200,"ts":1542845150796,"userAgent":"\"Mozilla\/5.0 (Windows NT 6.1; WOW64)\"","userId":25}"#,
        // Not a song play
        r#"{"artist":null,"auth":"Logged In","firstName":"Jayden","gender":"M","itemInSession":0,"lastName":"Graves","length":null,"level":"paid","location":"Marinette, WI-MI","method":"GET","page":"Home","registration":1540664184796.0,"sessionId":984,"song":null,"status":200,"ts":1542844990796,"userAgent":"\"Mozilla\/5.0 (Windows NT 6.1; WOW64)\"","userId":"25"}"#,
        // Wrongly typed ts
        r#"{"page":"NextSong","ts":"yesterday","userId":"7"}"#,
        "",
    ]
    .join("\n")
}

struct Fixture {
    _dir: TempDir,
    input: PathBuf,
    output: PathBuf,
}

impl Fixture {
    fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let input = dir.path().join("input");
        let output = dir.path().join("output");

        for (path, content) in SONGS {
            write_file(&input, path, content);
        }
        write_file(&input, LOG_FILE, &log_lines());

        Self {
            _dir: dir,
            input,
            output,
        }
    }

    fn config(&self, extra: &str) -> Config {
        let yaml = format!(
            "input:\n  root: {}\noutput:\n  root: {}\n{}",
            self.input.display(),
            self.output.display(),
            extra
        );
        Config::from_yaml(&yaml).unwrap()
    }

    fn table(&self, name: &str) -> PathBuf {
        self.output.join(name)
    }
}

fn write_file(root: &Path, rel: &str, content: &str) {
    let path = root.join(rel);
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, content).unwrap();
}

/// Every file under `dir`, keyed by path relative to `dir`.
fn snapshot(dir: &Path) -> BTreeMap<String, Vec<u8>> {
    fn walk(root: &Path, dir: &Path, out: &mut BTreeMap<String, Vec<u8>>) {
        for entry in std::fs::read_dir(dir).unwrap() {
            let path = entry.unwrap().path();
            if path.is_dir() {
                walk(root, &path, out);
            } else {
                let rel = path.strip_prefix(root).unwrap().to_string_lossy().into_owned();
                out.insert(rel, std::fs::read(&path).unwrap());
            }
        }
    }

    let mut out = BTreeMap::new();
    walk(dir, dir, &mut out);
    out
}

/// Relative paths of the Parquet data files of a table.
fn data_files(table_dir: &Path) -> Vec<String> {
    snapshot(table_dir)
        .into_keys()
        .filter(|k| k.ends_with(".parquet"))
        .collect()
}

fn read_table(table_dir: &Path) -> Vec<RecordBatch> {
    let mut batches = Vec::new();
    for rel in data_files(table_dir) {
        let file = std::fs::File::open(table_dir.join(rel)).unwrap();
        let reader = ParquetRecordBatchReaderBuilder::try_new(file)
            .unwrap()
            .build()
            .unwrap();
        for batch in reader {
            batches.push(batch.unwrap());
        }
    }
    batches
}

fn row_count(table_dir: &Path) -> usize {
    read_table(table_dir).iter().map(|b| b.num_rows()).sum()
}

fn strings(batches: &[RecordBatch], column: &str) -> Vec<Option<String>> {
    batches
        .iter()
        .flat_map(|batch| {
            let array = batch
                .column_by_name(column)
                .unwrap()
                .as_any()
                .downcast_ref::<StringArray>()
                .unwrap()
                .clone();
            (0..array.len())
                .map(|i| (!array.is_null(i)).then(|| array.value(i).to_string()))
                .collect::<Vec<_>>()
        })
        .collect()
}

mod config_tests {
    use super::*;

    #[test]
    fn test_config_yaml_parsing() {
        let yaml = r#"
input:
  root: "s3a://udacity-dend/"
output:
  root: "s3://my-lake/star"
storage:
  region: us-west-2
source:
  max_concurrent_files: 32
sink:
  compression: zstd
  max_rows_per_file: 50000
transform:
  timezone: America/New_York
  weekday_format: iso_number
error_handling:
  max_skipped_records: 10
"#;
        let config = Config::from_yaml(yaml).unwrap();

        assert_eq!(
            config.song_data_location(),
            "s3a://udacity-dend/song_data/*/*/*/*.json"
        );
        assert_eq!(
            config.log_data_location(),
            "s3a://udacity-dend/log_data/*/*/*.json"
        );
        assert_eq!(config.source.max_concurrent_files, 32);
        assert_eq!(config.sink.max_rows_per_file, 50000);
        assert_eq!(config.error_handling.max_skipped_records, 10);
        assert_eq!(
            config.timezone().unwrap(),
            chrono_tz::America::New_York
        );
    }

    #[test]
    fn test_config_defaults() {
        let config = Config::from_yaml("input:\n  root: /in\noutput:\n  root: /out\n").unwrap();

        assert_eq!(config.source.max_concurrent_files, 16);
        assert_eq!(config.sink.max_rows_per_file, 1_000_000);
        assert_eq!(config.error_handling.max_skipped_records, 0);
        assert!(config.metrics.textfile_path.is_none());
    }
}

mod pipeline_tests {
    use super::*;

    #[tokio::test]
    async fn test_full_run_builds_star_schema() {
        let fixture = Fixture::new();
        let stats = run_pipeline(fixture.config("")).await.unwrap();

        assert_eq!(stats.song_files_read, 3);
        assert_eq!(stats.song_records_read, 3);
        assert_eq!(stats.log_files_read, 1);
        assert_eq!(stats.log_records_read, 3);
        assert_eq!(stats.records_skipped, 1);
        assert_eq!(stats.song_plays, 2);
        assert_eq!(stats.join.matched, 1);
        assert_eq!(stats.join.missed, 1);
        assert_eq!(stats.tables.len(), 5);

        for table in ["songs", "artists", "users", "time", "songplays"] {
            assert!(
                fixture.table(table).join("_SUCCESS").exists(),
                "missing marker for {table}"
            );
        }

        assert_eq!(row_count(&fixture.table("songs")), 3);
        assert_eq!(row_count(&fixture.table("artists")), 3);
        // One user row per play, no dedup
        assert_eq!(row_count(&fixture.table("users")), 2);
        assert_eq!(row_count(&fixture.table("time")), 2);
        assert_eq!(row_count(&fixture.table("songplays")), 2);
    }

    #[tokio::test]
    async fn test_partition_directories() {
        let fixture = Fixture::new();
        run_pipeline(fixture.config("")).await.unwrap();

        assert_eq!(
            data_files(&fixture.table("songs")),
            vec![
                "year=0/artist_id=AR5KOSW1187FB35FF4/part-00000.snappy.parquet",
                "year=0/artist_id=ARJIE2Y1187B994AB7/part-00000.snappy.parquet",
                "year=1977/artist_id=ARMARLEY1187B9/part-00000.snappy.parquet",
            ]
        );
        assert_eq!(
            data_files(&fixture.table("artists")),
            vec!["part-00000.snappy.parquet"]
        );
        assert_eq!(
            data_files(&fixture.table("songplays")),
            vec!["year=2018/month=11/part-00000.snappy.parquet"]
        );
        assert_eq!(
            data_files(&fixture.table("time")),
            vec!["year=2018/month=11/part-00000.snappy.parquet"]
        );

        // Partition columns live only in the path
        let songs = read_table(&fixture.table("songs"));
        let schema = songs[0].schema();
        let columns: Vec<&str> = schema.fields().iter().map(|f| f.name().as_str()).collect();
        assert_eq!(columns, vec!["song_id", "title", "duration"]);
    }

    #[tokio::test]
    async fn test_exact_duration_join() {
        let fixture = Fixture::new();
        run_pipeline(fixture.config("")).await.unwrap();

        let songplays = read_table(&fixture.table("songplays"));
        assert_eq!(
            strings(&songplays, "song_id"),
            vec![Some("SOEXODUS12A6D4".to_string()), None]
        );
        assert_eq!(
            strings(&songplays, "artist_id"),
            vec![Some("ARMARLEY1187B9".to_string()), None]
        );
        // Numeric and string user ids land as the same value
        assert_eq!(
            strings(&songplays, "user_id"),
            vec![Some("25".to_string()), Some("25".to_string())]
        );
        assert_eq!(
            strings(&songplays, "user_agent")[0].as_deref(),
            Some("\"Mozilla/5.0 (Windows NT 6.1; WOW64)\"")
        );

        let timestamps = songplays[0]
            .column_by_name("timestamp")
            .unwrap()
            .as_any()
            .downcast_ref::<Int64Array>()
            .unwrap()
            .clone();
        assert_eq!(timestamps.value(0), 1_542_845_032);
    }

    #[tokio::test]
    async fn test_time_columns() {
        let fixture = Fixture::new();
        run_pipeline(fixture.config("")).await.unwrap();

        let time = read_table(&fixture.table("time"));
        assert_eq!(
            strings(&time, "weekday"),
            vec![Some("Thu".to_string()), Some("Thu".to_string())]
        );
        let schema = time[0].schema();
        let columns: Vec<&str> = schema.fields().iter().map(|f| f.name().as_str()).collect();
        assert_eq!(columns, vec!["timestamp", "hour", "day", "week", "weekday"]);
    }

    #[tokio::test]
    async fn test_rerun_is_byte_identical() {
        let fixture = Fixture::new();

        run_pipeline(fixture.config("")).await.unwrap();
        let first = snapshot(&fixture.output);

        run_pipeline(fixture.config("")).await.unwrap();
        let second = snapshot(&fixture.output);

        assert!(!first.is_empty());
        assert_eq!(
            first.keys().collect::<Vec<_>>(),
            second.keys().collect::<Vec<_>>()
        );
        assert!(first == second, "re-run changed output bytes");
    }

    #[tokio::test]
    async fn test_rerun_removes_stale_partitions() {
        let fixture = Fixture::new();
        let stale = fixture
            .table("songplays")
            .join("year=2017/month=1/part-00000.snappy.parquet");
        write_file(&fixture.output, "songplays/year=2017/month=1/part-00000.snappy.parquet", "old");
        assert!(stale.exists());

        run_pipeline(fixture.config("")).await.unwrap();
        assert!(!stale.exists());
    }

    #[tokio::test]
    async fn test_timezone_moves_partitions() {
        let fixture = Fixture::new();
        // 2018-12-01 02:00 UTC is still November on the US west coast
        write_file(
            &fixture.input,
            "log_data/2018/12/2018-12-01-events.json",
            r#"{"artist":"Elena","firstName":"Ann","gender":"F","lastName":"Lee","length":269.58322,"level":"free","page":"NextSong","sessionId":1,"song":"Setanta matins","ts":1543629600000,"userId":"3"}"#,
        );

        run_pipeline(fixture.config("")).await.unwrap();
        assert_eq!(
            data_files(&fixture.table("time")),
            vec![
                "year=2018/month=11/part-00000.snappy.parquet",
                "year=2018/month=12/part-00000.snappy.parquet",
            ]
        );

        run_pipeline(fixture.config("transform:\n  timezone: America/Los_Angeles\n"))
            .await
            .unwrap();
        assert_eq!(
            data_files(&fixture.table("time")),
            vec!["year=2018/month=11/part-00000.snappy.parquet"]
        );
        assert_eq!(row_count(&fixture.table("songplays")), 3);
    }

    #[tokio::test]
    async fn test_only_songs_stage() {
        let fixture = Fixture::new();
        let pipeline = Pipeline::new(fixture.config("")).await.unwrap();
        let stats = pipeline.run(Some(Stage::Songs)).await.unwrap();

        assert_eq!(stats.tables.len(), 2);
        assert_eq!(stats.log_files_read, 0);
        assert!(fixture.table("songs").join("_SUCCESS").exists());
        assert!(fixture.table("artists").join("_SUCCESS").exists());
        assert!(!fixture.table("users").exists());
        assert!(!fixture.table("songplays").exists());
    }

    #[tokio::test]
    async fn test_only_logs_stage_still_joins() {
        let fixture = Fixture::new();
        let pipeline = Pipeline::new(fixture.config("")).await.unwrap();
        let stats = pipeline.run(Some(Stage::Logs)).await.unwrap();

        assert_eq!(stats.join.matched, 1);
        assert!(!fixture.table("songs").exists());
        assert!(fixture.table("songplays").join("_SUCCESS").exists());
    }

    #[tokio::test]
    async fn test_gzip_input() {
        use flate2::{Compression, write::GzEncoder};
        use std::io::Write;

        let dir = TempDir::new().unwrap();
        let input = dir.path().join("input");
        let output = dir.path().join("output");
        let gzip = |content: &str| {
            let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
            encoder.write_all(content.as_bytes()).unwrap();
            encoder.finish().unwrap()
        };
        for (path, content) in SONGS {
            let path = input.join(format!("{path}.gz"));
            std::fs::create_dir_all(path.parent().unwrap()).unwrap();
            std::fs::write(path, gzip(content)).unwrap();
        }
        let log = input.join(format!("{LOG_FILE}.gz"));
        std::fs::create_dir_all(log.parent().unwrap()).unwrap();
        std::fs::write(log, gzip(&log_lines())).unwrap();

        let yaml = format!(
            r#"
input:
  root: {}
  song_data: song_data/*/*/*/*.json.gz
  log_data: log_data/*/*/*.json.gz
output:
  root: {}
source:
  compression: gzip
"#,
            input.display(),
            output.display()
        );
        let stats = run_pipeline(Config::from_yaml(&yaml).unwrap()).await.unwrap();

        assert_eq!(stats.song_records_read, 3);
        assert_eq!(stats.song_plays, 2);
        assert_eq!(row_count(&output.join("songplays")), 2);
    }
}

mod failure_tests {
    use super::*;

    #[tokio::test]
    async fn test_missing_logs_is_source_not_found() {
        let fixture = Fixture::new();
        std::fs::remove_dir_all(fixture.input.join("log_data")).unwrap();

        let err = run_pipeline(fixture.config("")).await.unwrap_err();
        assert!(err.is_source_not_found());
        assert!(err.to_string().contains("log"));
    }

    #[tokio::test]
    async fn test_empty_song_catalog_is_source_not_found() {
        let fixture = Fixture::new();
        std::fs::remove_dir_all(fixture.input.join("song_data/A")).unwrap();

        let err = run_pipeline(fixture.config("")).await.unwrap_err();
        assert!(err.is_source_not_found());
    }

    #[tokio::test]
    async fn test_failed_table_write_stops_run_and_keeps_earlier_tables() {
        let fixture = Fixture::new();
        // A regular file where the songplays directory should go
        write_file(&fixture.output, "songplays", "not a directory");

        let err = run_pipeline(fixture.config("")).await.unwrap_err();

        assert_eq!(err.failed_table(), Some("songplays"));
        assert!(err.to_string().contains("songplays"));
        assert!(fixture.table("songs").join("_SUCCESS").exists());
        assert!(fixture.table("artists").join("_SUCCESS").exists());
        assert_eq!(row_count(&fixture.table("songs")), 3);
        assert!(!fixture.table("songplays").join("_SUCCESS").exists());
    }

    #[tokio::test]
    async fn test_skip_threshold() {
        let fixture = Fixture::new();

        let err = run_pipeline(fixture.config("error_handling:\n  max_skipped_records: 0\n"))
            .await
            .map(|_| ())
            .map_err(|e| e.to_string());
        assert!(err.is_ok(), "0 means unlimited");

        let fixture = Fixture::new();
        write_file(
            &fixture.input,
            "log_data/2018/11/2018-11-23-events.json",
            "not json\nstill not json\n",
        );
        let err = run_pipeline(fixture.config("error_handling:\n  max_skipped_records: 2\n"))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            snowplay::error::PipelineError::SkipThresholdExceeded { skipped: 3, max: 2 }
        ));
        // Nothing is written when reading already failed
        assert!(!fixture.table("songs").exists());
    }
}

//! Source side of the job: typed record families and the glob reader that
//! loads them from storage.

pub mod reader;
pub mod records;

pub use reader::{
    ParsedFile, ReadResult, RecordReader, RecordReaderConfig, SchemaMismatch, parse_file,
    parse_records,
};
pub use records::{Gender, Level, LogRecord, NEXT_SONG, Record, SongRecord};

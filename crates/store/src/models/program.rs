use exn::ResultExt;
use time::UtcDateTime;

use crate::error::{Error, ErrorKind};

#[derive(sqlx::FromRow)]
pub(crate) struct ProgramRow {
    id: String,
    stream_id: String,
    source_id: String,
    title: String,
    description: Option<String>,
    start_ts: i64,
    end_ts: i64,
}

/// A guide entry for one channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Program {
    pub id: String,
    pub stream_id: String,
    pub source_id: String,
    pub title: String,
    pub description: Option<String>,
    pub start: UtcDateTime,
    pub end: UtcDateTime,
}

impl TryFrom<ProgramRow> for Program {
    type Error = Error;
    fn try_from(row: ProgramRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.id,
            stream_id: row.stream_id,
            source_id: row.source_id,
            title: row.title,
            description: row.description,
            start: UtcDateTime::from_unix_timestamp(row.start_ts)
                .or_raise(|| ErrorKind::InvalidData("program start"))?,
            end: UtcDateTime::from_unix_timestamp(row.end_ts).or_raise(|| ErrorKind::InvalidData("program end"))?,
        })
    }
}

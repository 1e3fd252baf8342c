use exn::ResultExt;
use time::UtcDateTime;

use crate::error::{Error, ErrorKind};
use crate::models::parse_json_list;

#[derive(sqlx::FromRow)]
pub(crate) struct MovieRow {
    stream_id: String,
    source_id: String,
    category_ids: Option<String>,
    name: String,
    year: Option<i64>,
    external_id: Option<i64>,
    external_id_tagged_at: Option<i64>,
}

/// A video-on-demand movie. `external_id` is the durable tag written back
/// by the metadata reconciler; once set, matching for this row takes the
/// indexed fast path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Movie {
    pub id: String,
    pub source_id: String,
    pub category_ids: Vec<String>,
    pub name: String,
    pub year: Option<i64>,
    pub external_id: Option<i64>,
    pub external_id_tagged_at: Option<UtcDateTime>,
}

impl TryFrom<MovieRow> for Movie {
    type Error = Error;
    fn try_from(row: MovieRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.stream_id,
            source_id: row.source_id,
            category_ids: parse_json_list(row.category_ids.as_deref(), "category ids")?,
            name: row.name,
            year: row.year,
            external_id: row.external_id,
            external_id_tagged_at: row
                .external_id_tagged_at
                .map(UtcDateTime::from_unix_timestamp)
                .transpose()
                .or_raise(|| ErrorKind::InvalidData("tag timestamp"))?,
        })
    }
}

#[derive(sqlx::FromRow)]
pub(crate) struct SeriesRow {
    series_id: String,
    source_id: String,
    category_ids: Option<String>,
    name: String,
    year: Option<i64>,
    external_id: Option<i64>,
    external_id_tagged_at: Option<i64>,
}

/// A video-on-demand series, tagged the same way as [`Movie`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeriesEntry {
    pub id: String,
    pub source_id: String,
    pub category_ids: Vec<String>,
    pub name: String,
    pub year: Option<i64>,
    pub external_id: Option<i64>,
    pub external_id_tagged_at: Option<UtcDateTime>,
}

impl TryFrom<SeriesRow> for SeriesEntry {
    type Error = Error;
    fn try_from(row: SeriesRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.series_id,
            source_id: row.source_id,
            category_ids: parse_json_list(row.category_ids.as_deref(), "category ids")?,
            name: row.name,
            year: row.year,
            external_id: row.external_id,
            external_id_tagged_at: row
                .external_id_tagged_at
                .map(UtcDateTime::from_unix_timestamp)
                .transpose()
                .or_raise(|| ErrorKind::InvalidData("tag timestamp"))?,
        })
    }
}

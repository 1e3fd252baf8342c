#[derive(sqlx::FromRow)]
pub(crate) struct SourceRow {
    source_id: String,
    name: String,
    enabled: i64,
    display_order: Option<i64>,
}

/// A content provider. Disabled sources hide all of their content from
/// every view.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Source {
    pub id: String,
    pub name: String,
    pub enabled: bool,
    pub display_order: Option<i64>,
}

impl From<SourceRow> for Source {
    fn from(row: SourceRow) -> Self {
        Self {
            id: row.source_id,
            name: row.name,
            enabled: row.enabled != 0,
            display_order: row.display_order,
        }
    }
}

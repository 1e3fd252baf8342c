use crate::error::Error;
use crate::models::parse_json_list;

#[derive(sqlx::FromRow)]
pub(crate) struct CategoryRow {
    category_id: String,
    source_id: String,
    name: String,
    enabled: i64,
    display_order: Option<i64>,
    filter_words: Option<String>,
}

/// A persisted category belonging to one source. Channels reference
/// categories through their many-valued `category_ids` membership list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Category {
    pub id: String,
    pub source_id: String,
    pub name: String,
    pub enabled: bool,
    pub display_order: Option<i64>,
    /// Substrings stripped from member channel display names before sorting.
    pub filter_words: Vec<String>,
}

impl TryFrom<CategoryRow> for Category {
    type Error = Error;
    fn try_from(row: CategoryRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.category_id,
            source_id: row.source_id,
            name: row.name,
            enabled: row.enabled != 0,
            display_order: row.display_order,
            filter_words: parse_json_list(row.filter_words.as_deref(), "filter words")?,
        })
    }
}

use crate::error::Error;
use crate::models::parse_json_list;

#[derive(sqlx::FromRow)]
pub(crate) struct ChannelRow {
    stream_id: String,
    source_id: String,
    category_ids: Option<String>,
    name: String,
    channel_num: Option<i64>,
    enabled: i64,
    is_favorite: i64,
    favorite_position: Option<i64>,
    logo_url: Option<String>,
}

/// A live channel. Visibility requires the owning source to be enabled and
/// the channel itself not to be individually disabled; the repository's
/// listing queries enforce both.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Channel {
    pub id: String,
    pub source_id: String,
    /// Many-valued category membership.
    pub category_ids: Vec<String>,
    pub name: String,
    /// Provider-assigned channel number, when the provider supplies one.
    pub number: Option<i64>,
    pub enabled: bool,
    pub favorite: bool,
    /// Explicit ordering within the favorites view; `None` falls back to
    /// the requested sort.
    pub favorite_position: Option<i64>,
    pub logo_url: Option<String>,
}

impl TryFrom<ChannelRow> for Channel {
    type Error = Error;
    fn try_from(row: ChannelRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.stream_id,
            source_id: row.source_id,
            category_ids: parse_json_list(row.category_ids.as_deref(), "category ids")?,
            name: row.name,
            number: row.channel_num,
            enabled: row.enabled != 0,
            favorite: row.is_favorite != 0,
            favorite_position: row.favorite_position,
            logo_url: row.logo_url,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_row_to_model() {
        let row = ChannelRow {
            stream_id: "ch-1".to_string(),
            source_id: "src-1".to_string(),
            category_ids: Some(r#"["news","uk"]"#.to_string()),
            name: "BBC One HD".to_string(),
            channel_num: Some(101),
            enabled: 1,
            is_favorite: 0,
            favorite_position: None,
            logo_url: None,
        };
        let model = Channel::try_from(row).unwrap();
        assert_eq!(model.category_ids, vec!["news".to_string(), "uk".to_string()]);
        assert_eq!(model.number, Some(101));
        assert!(!model.favorite);
    }

    #[test]
    fn test_missing_membership_is_empty() {
        let row = ChannelRow {
            stream_id: "ch-2".to_string(),
            source_id: "src-1".to_string(),
            category_ids: None,
            name: "Orphan".to_string(),
            channel_num: None,
            enabled: 1,
            is_favorite: 1,
            favorite_position: Some(2),
            logo_url: None,
        };
        let model = Channel::try_from(row).unwrap();
        assert!(model.category_ids.is_empty());
        assert_eq!(model.favorite_position, Some(2));
    }
}

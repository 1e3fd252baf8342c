#[derive(sqlx::FromRow)]
pub(crate) struct CustomGroupRow {
    group_id: String,
    name: String,
    display_order: Option<i64>,
}

/// A user-defined channel grouping, surfaced alongside real categories as a
/// virtual category. Membership lives in `custom_group_members`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CustomGroup {
    pub id: String,
    pub name: String,
    pub display_order: Option<i64>,
}

impl From<CustomGroupRow> for CustomGroup {
    fn from(row: CustomGroupRow) -> Self {
        Self {
            id: row.group_id,
            name: row.name,
            display_order: row.display_order,
        }
    }
}

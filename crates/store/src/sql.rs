//! Chunk-safe dynamic SQL assembly.
//!
//! SQLite enforces a ceiling on bound parameters per statement. Every
//! dynamically sized `IN (...)` list in this workspace is built here, so
//! the chunking rule lives in exactly one place: callers split id lists
//! with [`chunked`], build one statement per chunk, and union the partial
//! results in memory.
//!
//! Exceeding the ceiling is a programming defect (a missed chunking), not
//! a runtime condition, so the builder asserts rather than returning an
//! error.

use sqlx::Sqlite;
use sqlx::query::QueryAs;
use sqlx::sqlite::SqliteArguments;

/// Maximum bound parameters per statement. SQLite's own default ceiling is
/// 999; staying well under it leaves headroom for the fixed predicates that
/// accompany an id list.
pub const MAX_BOUND_PARAMS: usize = 500;

/// Split an id list into sub-batches that each fit under the ceiling.
///
/// An empty list yields no chunks.
pub fn chunked<T>(ids: &[T]) -> std::slice::Chunks<'_, T> {
    ids.chunks(MAX_BOUND_PARAMS)
}

/// `?, ?, ?` for an `IN (...)` list of `n` values.
pub fn placeholders(n: usize) -> String {
    let mut out = String::with_capacity(n * 3);
    for i in 0..n {
        if i > 0 {
            out.push_str(", ");
        }
        out.push('?');
    }
    out
}

/// A single bound parameter value.
#[derive(Debug, Clone, PartialEq)]
pub enum Bind {
    Text(String),
    Int(i64),
    Null,
}

impl From<&str> for Bind {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}
impl From<String> for Bind {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}
impl From<i64> for Bind {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}
impl From<Option<i64>> for Bind {
    fn from(value: Option<i64>) -> Self {
        value.map_or(Self::Null, Self::Int)
    }
}

/// Accumulates predicates and their parameters for one SELECT statement.
///
/// All predicates are ANDed. The builder owns its parameter list so the
/// assembled SQL and its binds can never drift apart.
#[derive(Debug)]
pub struct SelectBuilder {
    columns: String,
    from: String,
    predicates: Vec<String>,
    binds: Vec<Bind>,
    order_by: Option<String>,
    limit_offset: Option<(i64, i64)>,
}

impl SelectBuilder {
    pub fn new(columns: impl Into<String>, from: impl Into<String>) -> Self {
        Self {
            columns: columns.into(),
            from: from.into(),
            predicates: Vec::new(),
            binds: Vec::new(),
            order_by: None,
            limit_offset: None,
        }
    }

    /// Add a predicate with its bound parameters. The condition must use
    /// `?` placeholders matching `binds` in order.
    pub fn predicate(mut self, condition: impl Into<String>, binds: impl IntoIterator<Item = Bind>) -> Self {
        self.predicates.push(condition.into());
        self.binds.extend(binds);
        self
    }

    /// Add an `IN (...)` predicate over a pre-chunked value slice.
    ///
    /// # Panics
    /// Panics if `values` exceeds [`MAX_BOUND_PARAMS`]; the caller missed
    /// a [`chunked`] split.
    pub fn in_list(mut self, column: &str, values: &[String]) -> Self {
        assert!(
            values.len() <= MAX_BOUND_PARAMS,
            "IN list of {} values exceeds the bound-parameter ceiling; chunk it first",
            values.len(),
        );
        self.predicates.push(format!("{column} IN ({})", placeholders(values.len())));
        self.binds.extend(values.iter().map(|v| Bind::Text(v.clone())));
        self
    }

    /// Integer-keyed variant of [`in_list`](Self::in_list).
    ///
    /// # Panics
    /// Panics if `values` exceeds [`MAX_BOUND_PARAMS`]; the caller missed
    /// a [`chunked`] split.
    pub fn in_list_ints(mut self, column: &str, values: &[i64]) -> Self {
        assert!(
            values.len() <= MAX_BOUND_PARAMS,
            "IN list of {} values exceeds the bound-parameter ceiling; chunk it first",
            values.len(),
        );
        self.predicates.push(format!("{column} IN ({})", placeholders(values.len())));
        self.binds.extend(values.iter().copied().map(Bind::Int));
        self
    }

    pub fn order_by(mut self, clause: impl Into<String>) -> Self {
        self.order_by = Some(clause.into());
        self
    }

    pub fn limit_offset(mut self, limit: i64, offset: i64) -> Self {
        self.limit_offset = Some((limit, offset));
        self
    }

    /// Assemble the SELECT statement.
    pub fn build(&self) -> String {
        let mut sql = format!("SELECT {} FROM {}", self.columns, self.from);
        if !self.predicates.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&self.predicates.join(" AND "));
        }
        if let Some(order) = &self.order_by {
            sql.push_str(" ORDER BY ");
            sql.push_str(order);
        }
        if self.limit_offset.is_some() {
            sql.push_str(" LIMIT ? OFFSET ?");
        }
        sql
    }

    /// Assemble the matching `COUNT(*)` statement (no ordering or paging).
    pub fn build_count(&self) -> String {
        let mut sql = format!("SELECT COUNT(*) FROM {}", self.from);
        if !self.predicates.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&self.predicates.join(" AND "));
        }
        sql
    }

    /// Parameters for [`build`](Self::build), in placeholder order.
    pub fn binds(&self) -> Vec<Bind> {
        let mut binds = self.binds.clone();
        if let Some((limit, offset)) = self.limit_offset {
            binds.push(Bind::Int(limit));
            binds.push(Bind::Int(offset));
        }
        binds
    }

    /// Parameters for [`build_count`](Self::build_count).
    pub fn count_binds(&self) -> Vec<Bind> {
        self.binds.clone()
    }
}

pub(crate) fn bind_all<'q, O>(
    mut query: QueryAs<'q, Sqlite, O, SqliteArguments<'q>>,
    binds: Vec<Bind>,
) -> QueryAs<'q, Sqlite, O, SqliteArguments<'q>> {
    for bind in binds {
        query = match bind {
            Bind::Text(value) => query.bind(value),
            Bind::Int(value) => query.bind(value),
            Bind::Null => query.bind(Option::<i64>::None),
        };
    }
    query
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(0, "")]
    #[case(1, "?")]
    #[case(3, "?, ?, ?")]
    fn test_placeholders(#[case] n: usize, #[case] expected: &str) {
        assert_eq!(placeholders(n), expected);
    }

    #[rstest]
    #[case(0, 0)]
    #[case(10, 1)]
    #[case(500, 1)]
    #[case(501, 2)]
    #[case(1500, 3)]
    fn test_chunk_counts(#[case] len: usize, #[case] expected_chunks: usize) {
        let ids: Vec<u32> = (0..len as u32).collect();
        assert_eq!(chunked(&ids).count(), expected_chunks);
        // No id is lost or duplicated across chunks.
        let total: usize = chunked(&ids).map(<[u32]>::len).sum();
        assert_eq!(total, len);
    }

    #[test]
    fn test_builder_assembles_predicates_in_order() {
        let builder = SelectBuilder::new("stream_id, name", "channels")
            .predicate("enabled = ?", [Bind::Int(1)])
            .in_list("stream_id", &["a".to_string(), "b".to_string()])
            .order_by("name COLLATE NOCASE")
            .limit_offset(100, 50);
        assert_eq!(
            builder.build(),
            "SELECT stream_id, name FROM channels \
             WHERE enabled = ? AND stream_id IN (?, ?) \
             ORDER BY name COLLATE NOCASE LIMIT ? OFFSET ?",
        );
        assert_eq!(
            builder.binds(),
            vec![
                Bind::Int(1),
                Bind::Text("a".into()),
                Bind::Text("b".into()),
                Bind::Int(100),
                Bind::Int(50),
            ],
        );
    }

    #[test]
    fn test_builder_count_variant_drops_paging() {
        let builder = SelectBuilder::new("*", "channels")
            .predicate("enabled = ?", [Bind::Int(1)])
            .limit_offset(10, 0);
        assert_eq!(builder.build_count(), "SELECT COUNT(*) FROM channels WHERE enabled = ?");
        assert_eq!(builder.count_binds(), vec![Bind::Int(1)]);
    }

    #[test]
    #[should_panic(expected = "bound-parameter ceiling")]
    fn test_unchunked_in_list_is_a_defect() {
        let ids: Vec<String> = (0..MAX_BOUND_PARAMS + 1).map(|i| i.to_string()).collect();
        let _ = SelectBuilder::new("*", "channels").in_list("stream_id", &ids);
    }
}

//! Composable WHERE clauses with positional parameters.

use rusqlite::types::Value;

/// AND-combined SQL predicates and the parameters they bind, in placeholder order.
#[derive(Debug, Clone, Default)]
pub struct WhereClause {
    conditions: Vec<String>,
    params: Vec<Value>,
}

impl WhereClause {
    /// Empty clause; renders as `1=1`.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a predicate with no parameters.
    pub fn condition(&mut self, sql: impl Into<String>) -> &mut Self {
        self.conditions.push(sql.into());
        self
    }

    /// Add a predicate together with the values for its `?` placeholders.
    pub fn condition_with<I>(&mut self, sql: impl Into<String>, params: I) -> &mut Self
    where
        I: IntoIterator,
        I::Item: Into<Value>,
    {
        let sql = sql.into();
        let params: Vec<Value> = params.into_iter().map(Into::into).collect();
        debug_assert_eq!(sql.matches('?').count(), params.len());
        self.conditions.push(sql);
        self.params.extend(params);
        self
    }

    /// `column = ?`
    pub fn eq(&mut self, column: &str, value: impl Into<Value>) -> &mut Self {
        self.condition_with(format!("{} = ?", column), [value.into()])
    }

    /// Case-insensitive substring match on one column.
    pub fn contains(&mut self, column: &str, needle: &str) -> &mut Self {
        self.contains_any(&[column], needle)
    }

    /// Case-insensitive substring match on any of the columns.
    pub fn contains_any(&mut self, columns: &[&str], needle: &str) -> &mut Self {
        let pattern = like_pattern(needle);
        let sql = columns
            .iter()
            .map(|c| format!("{} LIKE ? ESCAPE '\\'", c))
            .collect::<Vec<_>>()
            .join(" OR ");
        let sql = if columns.len() > 1 {
            format!("({})", sql)
        } else {
            sql
        };
        self.condition_with(sql, columns.iter().map(|_| pattern.clone()))
    }

    /// Whether no predicate has been added.
    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }

    /// SQL text to place after `WHERE`.
    pub fn sql(&self) -> String {
        if self.conditions.is_empty() {
            "1=1".to_string()
        } else {
            self.conditions.join(" AND ")
        }
    }

    /// Bound values, in placeholder order.
    pub fn params(&self) -> &[Value] {
        &self.params
    }

    /// Bound values followed by extra trailing values (e.g. LIMIT/OFFSET).
    pub fn params_with(&self, trailing: impl IntoIterator<Item = Value>) -> Vec<Value> {
        self.params.iter().cloned().chain(trailing).collect()
    }
}

/// Wrap `needle` in `%` for LIKE, escaping LIKE wildcards and the escape char.
pub fn like_pattern(needle: &str) -> String {
    let mut pattern = String::with_capacity(needle.len() + 2);
    pattern.push('%');
    for c in needle.chars() {
        if matches!(c, '%' | '_' | '\\') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern.push('%');
    pattern
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_clause_matches_everything() {
        let clause = WhereClause::new();
        assert!(clause.is_empty());
        assert_eq!(clause.sql(), "1=1");
        assert!(clause.params().is_empty());
    }

    #[test]
    fn conditions_are_and_combined_in_order() {
        let mut clause = WhereClause::new();
        clause
            .condition("b.is_active = 1")
            .eq("b.category_id", 7i64)
            .contains("b.author", "tolkien");

        assert_eq!(
            clause.sql(),
            "b.is_active = 1 AND b.category_id = ? AND b.author LIKE ? ESCAPE '\\'"
        );
        assert_eq!(
            clause.params(),
            &[Value::Integer(7), Value::Text("%tolkien%".to_string())]
        );
    }

    #[test]
    fn multi_column_search_is_parenthesized() {
        let mut clause = WhereClause::new();
        clause.contains_any(&["b.title", "b.author"], "ring");

        assert_eq!(
            clause.sql(),
            "(b.title LIKE ? ESCAPE '\\' OR b.author LIKE ? ESCAPE '\\')"
        );
        assert_eq!(clause.params().len(), 2);
    }

    #[test]
    fn trailing_params_come_last() {
        let mut clause = WhereClause::new();
        clause.eq("r.book_id", 3i64);
        let params = clause.params_with([Value::Integer(10), Value::Integer(20)]);
        assert_eq!(
            params,
            vec![Value::Integer(3), Value::Integer(10), Value::Integer(20)]
        );
    }

    #[test]
    fn like_pattern_escapes_wildcards() {
        assert_eq!(like_pattern("50%_off\\"), "%50\\%\\_off\\\\%");
        assert_eq!(like_pattern(""), "%%");
    }
}

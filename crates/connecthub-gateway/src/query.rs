//! Query-string construction for the backend's row filter grammar.
//!
//! The builder is pure: it renders a list of query parameters and never
//! touches the network, so every filter form is unit-testable.

use std::fmt::Display;

/// Sort direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Order {
    Asc,
    Desc,
}

impl Order {
    fn suffix(self) -> &'static str {
        match self {
            Order::Asc => "asc",
            Order::Desc => "desc",
        }
    }
}

/// Render a `column.eq.value` condition for use inside [`QueryBuilder::or`].
pub fn cond_eq(column: &str, value: impl Display) -> String {
    format!("{column}.eq.{value}")
}

/// Render a `column.in.(values...)` condition for use inside
/// [`QueryBuilder::or`].
pub fn cond_in<I, V>(column: &str, values: I) -> String
where
    I: IntoIterator<Item = V>,
    V: Display,
{
    let joined: Vec<String> = values.into_iter().map(|v| v.to_string()).collect();
    format!("{column}.in.({})", joined.join(","))
}

/// Render an `and(...)` group for use inside [`QueryBuilder::or`].
pub fn cond_and<I, S>(conditions: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let joined: Vec<String> = conditions
        .into_iter()
        .map(|c| c.as_ref().to_string())
        .collect();
    format!("and({})", joined.join(","))
}

/// Builder for a single select/update/delete filter set.
#[derive(Debug, Clone, Default)]
pub struct QueryBuilder {
    select: Option<String>,
    filters: Vec<(String, String)>,
    order: Option<String>,
    limit: Option<u32>,
    offset: Option<u32>,
}

impl QueryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Columns (and embedded relations) to return.
    pub fn select(mut self, columns: &str) -> Self {
        self.select = Some(columns.to_string());
        self
    }

    /// `column = value`
    pub fn eq(mut self, column: &str, value: impl Display) -> Self {
        self.filters.push((column.to_string(), format!("eq.{value}")));
        self
    }

    /// `column >= value`
    pub fn gte(mut self, column: &str, value: impl Display) -> Self {
        self.filters
            .push((column.to_string(), format!("gte.{value}")));
        self
    }

    /// `column IS NULL`
    pub fn is_null(mut self, column: &str) -> Self {
        self.filters.push((column.to_string(), "is.null".to_string()));
        self
    }

    /// `column IN (values...)`
    pub fn in_list<I, V>(mut self, column: &str, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Display,
    {
        let joined: Vec<String> = values.into_iter().map(|v| v.to_string()).collect();
        self.filters
            .push((column.to_string(), format!("in.({})", joined.join(","))));
        self
    }

    /// Disjunction of conditions rendered by [`cond_eq`] / [`cond_and`].
    pub fn or<I, S>(mut self, conditions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let joined: Vec<String> = conditions
            .into_iter()
            .map(|c| c.as_ref().to_string())
            .collect();
        self.filters
            .push(("or".to_string(), format!("({})", joined.join(","))));
        self
    }

    pub fn order(mut self, column: &str, direction: Order) -> Self {
        self.order = Some(format!("{column}.{}", direction.suffix()));
        self
    }

    pub fn limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: u32) -> Self {
        self.offset = Some(offset);
        self
    }

    /// Render the final query parameters, select first, filters in
    /// insertion order.
    pub fn into_params(self) -> Vec<(String, String)> {
        let mut params = Vec::new();
        if let Some(select) = self.select {
            params.push(("select".to_string(), select));
        }
        params.extend(self.filters);
        if let Some(order) = self.order {
            params.push(("order".to_string(), order));
        }
        if let Some(limit) = self.limit {
            params.push(("limit".to_string(), limit.to_string()));
        }
        if let Some(offset) = self.offset {
            params.push(("offset".to_string(), offset.to_string()));
        }
        params
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rendered(q: QueryBuilder) -> Vec<(String, String)> {
        q.into_params()
    }

    #[test]
    fn eq_and_select() {
        let params = rendered(QueryBuilder::new().select("*").eq("id", "abc"));
        assert_eq!(
            params,
            vec![
                ("select".to_string(), "*".to_string()),
                ("id".to_string(), "eq.abc".to_string()),
            ]
        );
    }

    #[test]
    fn either_side_of_a_connection() {
        // The shape used to fetch all connections involving one user.
        let params = rendered(
            QueryBuilder::new()
                .select("*")
                .or([cond_eq("user1_id", "u1"), cond_eq("user2_id", "u1")]),
        );
        assert_eq!(params[1].0, "or");
        assert_eq!(params[1].1, "(user1_id.eq.u1,user2_id.eq.u1)");
    }

    #[test]
    fn pairwise_connection_lookup() {
        // Both directions of a single unordered pair.
        let cond = [
            cond_and([cond_eq("user1_id", "a"), cond_eq("user2_id", "b")]),
            cond_and([cond_eq("user1_id", "b"), cond_eq("user2_id", "a")]),
        ];
        let params = rendered(QueryBuilder::new().or(cond));
        assert_eq!(
            params[0].1,
            "(and(user1_id.eq.a,user2_id.eq.b),and(user1_id.eq.b,user2_id.eq.a))"
        );
    }

    #[test]
    fn in_list_renders_parenthesised() {
        let params = rendered(QueryBuilder::new().in_list("post_id", ["p1", "p2", "p3"]));
        assert_eq!(params[0].1, "in.(p1,p2,p3)");
    }

    #[test]
    fn order_limit_offset_come_last() {
        let params = rendered(
            QueryBuilder::new()
                .eq("community_id", "c")
                .order("created_at", Order::Desc)
                .limit(50)
                .offset(100),
        );
        assert_eq!(
            params[1..],
            [
                ("order".to_string(), "created_at.desc".to_string()),
                ("limit".to_string(), "50".to_string()),
                ("offset".to_string(), "100".to_string()),
            ]
        );
    }
}

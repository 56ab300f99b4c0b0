//! Query handles and pagination results
//!
//! A [`Query`] is an unexecuted description of a filtered, ordered and
//! optionally sliced read over one table. It is a plain value: builder
//! methods consume it and return a new one, clones are independent, and two
//! queries can be compared structurally.
//!
//! # Example
//! ```rust,ignore
//! let query = descriptor
//!     .new_query()
//!     .where_eq("status", 1)
//!     .where_op("price", Operator::Gt, 100)
//!     .order_by("created_at", SortDirection::Desc)
//!     .for_page(2, 10);
//! ```

use crate::core::error::{RepoError, RepoResult};
use crate::core::model::RelationDef;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

/// Comparison operator of a where clause
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operator {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Like,
    NotLike,
}

impl Operator {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operator::Eq => "=",
            Operator::Ne => "!=",
            Operator::Lt => "<",
            Operator::Le => "<=",
            Operator::Gt => ">",
            Operator::Ge => ">=",
            Operator::Like => "like",
            Operator::NotLike => "not like",
        }
    }
}

impl FromStr for Operator {
    type Err = RepoError;

    fn from_str(s: &str) -> RepoResult<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "=" | "==" => Ok(Operator::Eq),
            "!=" | "<>" => Ok(Operator::Ne),
            "<" => Ok(Operator::Lt),
            "<=" => Ok(Operator::Le),
            ">" => Ok(Operator::Gt),
            ">=" => Ok(Operator::Ge),
            "like" => Ok(Operator::Like),
            "not like" => Ok(Operator::NotLike),
            other => Err(RepoError::invalid_argument(format!(
                "unknown operator '{}'",
                other
            ))),
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a where clause joins onto the clauses before it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Boolean {
    And,
    Or,
}

/// Sort direction of an order clause
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

impl SortDirection {
    /// Parse a request-supplied direction; only `asc` and `desc` are accepted
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "asc" => Some(SortDirection::Asc),
            "desc" => Some(SortDirection::Desc),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SortDirection::Asc => "asc",
            SortDirection::Desc => "desc",
        }
    }
}

/// A single filter condition
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Condition {
    Compare {
        column: String,
        operator: Operator,
        value: Value,
    },
    In {
        column: String,
        values: Vec<Value>,
        negated: bool,
    },
    Between {
        column: String,
        low: Value,
        high: Value,
        negated: bool,
    },
    Null {
        columns: Vec<String>,
        negated: bool,
    },
    Raw {
        sql: String,
        bindings: Vec<Value>,
    },
    Nested {
        clauses: Vec<WhereClause>,
    },
    /// Count of related rows (optionally constrained) compared against `count`
    Has {
        relation: String,
        operator: Operator,
        count: u64,
        constraint: Vec<WhereClause>,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WhereClause {
    pub boolean: Boolean,
    pub condition: Condition,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OrderClause {
    pub column: String,
    pub direction: SortDirection,
}

/// An unexecuted query over one table
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Query {
    table: String,
    key_name: String,
    wheres: Vec<WhereClause>,
    orders: Vec<OrderClause>,
    eager: Vec<String>,
    offset: Option<usize>,
    limit: Option<usize>,
    remember_secs: Option<u64>,
    #[serde(skip)]
    relation_defs: Vec<RelationDef>,
}

impl Query {
    /// A bare query over `table`
    pub fn table(table: &str, key_name: &str) -> Self {
        Self {
            table: table.to_string(),
            key_name: key_name.to_string(),
            wheres: Vec::new(),
            orders: Vec::new(),
            eager: Vec::new(),
            offset: None,
            limit: None,
            remember_secs: None,
            relation_defs: Vec::new(),
        }
    }

    /// An empty query used to collect a nested group of clauses
    pub fn nested() -> Self {
        Self::table("", "")
    }

    pub(crate) fn with_relation_defs(mut self, relation_defs: Vec<RelationDef>) -> Self {
        self.relation_defs = relation_defs;
        self
    }

    // === Accessors ===

    pub fn table_name(&self) -> &str {
        &self.table
    }

    pub fn key_name(&self) -> &str {
        &self.key_name
    }

    pub fn wheres(&self) -> &[WhereClause] {
        &self.wheres
    }

    pub fn orders(&self) -> &[OrderClause] {
        &self.orders
    }

    pub fn eager(&self) -> &[String] {
        &self.eager
    }

    pub fn offset(&self) -> Option<usize> {
        self.offset
    }

    pub fn limit(&self) -> Option<usize> {
        self.limit
    }

    pub fn cache_ttl(&self) -> Option<Duration> {
        self.remember_secs.map(Duration::from_secs)
    }

    pub fn relation(&self, name: &str) -> Option<&RelationDef> {
        self.relation_defs.iter().find(|r| r.name == name)
    }

    // === Where clauses ===

    pub fn push_where(mut self, boolean: Boolean, condition: Condition) -> Self {
        self.wheres.push(WhereClause { boolean, condition });
        self
    }

    pub fn where_op(self, column: &str, operator: Operator, value: impl Into<Value>) -> Self {
        self.push_where(Boolean::And, compare(column, operator, value.into()))
    }

    pub fn or_where_op(self, column: &str, operator: Operator, value: impl Into<Value>) -> Self {
        self.push_where(Boolean::Or, compare(column, operator, value.into()))
    }

    pub fn where_eq(self, column: &str, value: impl Into<Value>) -> Self {
        self.where_op(column, Operator::Eq, value)
    }

    pub fn or_where_eq(self, column: &str, value: impl Into<Value>) -> Self {
        self.or_where_op(column, Operator::Eq, value)
    }

    pub fn where_in(self, column: &str, values: Vec<Value>) -> Self {
        self.push_where(Boolean::And, in_list(column, values, false))
    }

    pub fn or_where_in(self, column: &str, values: Vec<Value>) -> Self {
        self.push_where(Boolean::Or, in_list(column, values, false))
    }

    pub fn where_not_in(self, column: &str, values: Vec<Value>) -> Self {
        self.push_where(Boolean::And, in_list(column, values, true))
    }

    pub fn where_between(self, column: &str, low: impl Into<Value>, high: impl Into<Value>) -> Self {
        self.push_where(Boolean::And, between(column, low.into(), high.into(), false))
    }

    pub fn where_not_between(
        self,
        column: &str,
        low: impl Into<Value>,
        high: impl Into<Value>,
    ) -> Self {
        self.push_where(Boolean::And, between(column, low.into(), high.into(), true))
    }

    pub fn where_null(self, columns: &[&str]) -> Self {
        self.push_where(
            Boolean::And,
            Condition::Null {
                columns: columns.iter().map(|c| c.to_string()).collect(),
                negated: false,
            },
        )
    }

    pub fn where_not_null(self, columns: &[&str]) -> Self {
        self.push_where(
            Boolean::And,
            Condition::Null {
                columns: columns.iter().map(|c| c.to_string()).collect(),
                negated: true,
            },
        )
    }

    pub fn where_raw(self, sql: &str, bindings: Vec<Value>, boolean: Boolean) -> Self {
        self.push_where(
            boolean,
            Condition::Raw {
                sql: sql.to_string(),
                bindings,
            },
        )
    }

    /// Group the clauses built by `build` in parentheses
    pub fn where_nested<F>(self, boolean: Boolean, build: F) -> Self
    where
        F: FnOnce(Query) -> Query,
    {
        let clauses = build(Query::nested()).wheres;
        if clauses.is_empty() {
            return self;
        }
        self.push_where(boolean, Condition::Nested { clauses })
    }

    /// Relation count filter, with an optional constraint on the related rows
    pub fn has(
        self,
        relation: &str,
        operator: Operator,
        count: u64,
        boolean: Boolean,
        constraint: Option<&(dyn Fn(Query) -> Query + Send + Sync)>,
    ) -> Self {
        let constraint = constraint
            .map(|build| build(Query::nested()).wheres)
            .unwrap_or_default();
        self.push_where(
            boolean,
            Condition::Has {
                relation: relation.to_string(),
                operator,
                count,
                constraint,
            },
        )
    }

    pub fn where_has<F>(self, relation: &str, constraint: F) -> Self
    where
        F: Fn(Query) -> Query + Send + Sync,
    {
        self.has(relation, Operator::Ge, 1, Boolean::And, Some(&constraint))
    }

    pub fn or_where_has<F>(self, relation: &str, constraint: F) -> Self
    where
        F: Fn(Query) -> Query + Send + Sync,
    {
        self.has(relation, Operator::Ge, 1, Boolean::Or, Some(&constraint))
    }

    // === Eager loading, ordering, slicing, caching ===

    pub fn with(mut self, relations: &[&str]) -> Self {
        for relation in relations {
            if !self.eager.iter().any(|r| r == relation) {
                self.eager.push(relation.to_string());
            }
        }
        self
    }

    pub fn order_by(mut self, column: &str, direction: SortDirection) -> Self {
        self.orders.push(OrderClause {
            column: column.to_string(),
            direction,
        });
        self
    }

    pub fn latest(self, column: &str) -> Self {
        self.order_by(column, SortDirection::Desc)
    }

    pub fn oldest(self, column: &str) -> Self {
        self.order_by(column, SortDirection::Asc)
    }

    pub fn skip(mut self, offset: usize) -> Self {
        self.offset = Some(offset);
        self
    }

    pub fn take(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Slice out page `page` (1-based) of `per_page` rows
    ///
    /// Offsets past `usize::MAX` saturate, which yields an empty page.
    pub fn for_page(self, page: usize, per_page: usize) -> Self {
        self.skip(page_offset(page, per_page)).take(per_page)
    }

    /// Drop any offset/limit, e.g. to count all matching rows
    pub fn without_slice(mut self) -> Self {
        self.offset = None;
        self.limit = None;
        self
    }

    /// Cache the result of this query for `ttl`
    pub fn remember(mut self, ttl: Duration) -> Self {
        self.remember_secs = Some(ttl.as_secs());
        self
    }
}

fn compare(column: &str, operator: Operator, value: Value) -> Condition {
    Condition::Compare {
        column: column.to_string(),
        operator,
        value,
    }
}

fn in_list(column: &str, values: Vec<Value>, negated: bool) -> Condition {
    Condition::In {
        column: column.to_string(),
        values,
        negated,
    }
}

fn between(column: &str, low: Value, high: Value, negated: bool) -> Condition {
    Condition::Between {
        column: column.to_string(),
        low,
        high,
        negated,
    }
}

/// One entry of a `find_where` condition list
#[derive(Clone)]
pub enum WhereCondition {
    /// `field = value`
    Equals(String, Value),
    /// `field <operator> value`
    Compare(String, Operator, Value),
    /// A parenthesized group built by a callback
    Sub(Arc<dyn Fn(Query) -> Query + Send + Sync>),
}

impl WhereCondition {
    pub fn eq(field: &str, value: impl Into<Value>) -> Self {
        WhereCondition::Equals(field.to_string(), value.into())
    }

    pub fn compare(field: &str, operator: Operator, value: impl Into<Value>) -> Self {
        WhereCondition::Compare(field.to_string(), operator, value.into())
    }

    pub fn sub<F>(build: F) -> Self
    where
        F: Fn(Query) -> Query + Send + Sync + 'static,
    {
        WhereCondition::Sub(Arc::new(build))
    }

    /// Append this condition to `query`, joined with `boolean`
    pub fn apply_to(&self, query: Query, boolean: Boolean) -> Query {
        match self {
            WhereCondition::Equals(field, value) => {
                query.push_where(boolean, compare(field, Operator::Eq, value.clone()))
            }
            WhereCondition::Compare(field, operator, value) => {
                query.push_where(boolean, compare(field, *operator, value.clone()))
            }
            WhereCondition::Sub(build) => query.where_nested(boolean, |q| build(q)),
        }
    }
}

impl fmt::Debug for WhereCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WhereCondition::Equals(field, value) => {
                f.debug_tuple("Equals").field(field).field(value).finish()
            }
            WhereCondition::Compare(field, operator, value) => f
                .debug_tuple("Compare")
                .field(field)
                .field(operator)
                .field(value)
                .finish(),
            WhereCondition::Sub(_) => f.write_str("Sub(<callback>)"),
        }
    }
}

/// Paginated result with total count
#[derive(Debug, Serialize)]
pub struct Paginator<T> {
    /// The paginated data
    pub data: Vec<T>,

    /// Pagination metadata
    pub pagination: PaginationMeta,
}

/// Pagination metadata
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PaginationMeta {
    /// Current page number (starts at 1)
    pub page: usize,

    /// Number of items per page
    pub limit: usize,

    /// Total number of items (after filters)
    pub total: usize,

    /// Total number of pages
    pub total_pages: usize,

    /// Whether there is a next page
    pub has_next: bool,

    /// Whether there is a previous page
    pub has_prev: bool,
}

impl PaginationMeta {
    pub fn new(page: usize, limit: usize, total: usize) -> Self {
        let page = page.max(1);
        let limit = limit.max(1);
        let total_pages = if total == 0 { 0 } else { total.div_ceil(limit) };
        let start = page_offset(page, limit);

        Self {
            page,
            limit,
            total,
            total_pages,
            has_next: start.saturating_add(limit) < total,
            has_prev: page > 1,
        }
    }
}

/// Row offset of a 1-based page
fn page_offset(page: usize, per_page: usize) -> usize {
    (page.max(1) - 1).saturating_mul(per_page)
}

/// Paginated result without a total count
#[derive(Debug, Serialize)]
pub struct SimplePaginator<T> {
    pub data: Vec<T>,
    pub page: usize,
    pub limit: usize,
    pub has_more: bool,
}

//! Single-column criteria

use super::{Criterion, RepositoryContext};
use crate::core::error::RepoResult;
use crate::core::query::{Operator, Query, SortDirection};
use async_trait::async_trait;
use serde_json::Value;

macro_rules! comparison_criterion {
    ($(#[$meta:meta])* $name:ident, $operator:expr) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq)]
        pub struct $name {
            field: String,
            value: Value,
        }

        impl $name {
            pub fn new(field: &str, value: impl Into<Value>) -> Self {
                Self {
                    field: field.to_string(),
                    value: value.into(),
                }
            }
        }

        #[async_trait]
        impl Criterion for $name {
            async fn apply(
                &self,
                query: Query,
                _repository: &dyn RepositoryContext,
            ) -> RepoResult<Query> {
                Ok(query.where_op(&self.field, $operator, self.value.clone()))
            }
        }
    };
}

comparison_criterion!(
    /// `field = value`
    FieldIsValue,
    Operator::Eq
);
comparison_criterion!(
    /// `field != value`
    NotEqual,
    Operator::Ne
);
comparison_criterion!(LessThan, Operator::Lt);
comparison_criterion!(LessThanOrEqual, Operator::Le);
comparison_criterion!(GreaterThan, Operator::Gt);
comparison_criterion!(GreaterThanOrEqual, Operator::Ge);

fn contains_pattern(value: &Value) -> String {
    match value {
        Value::String(s) => format!("%{}%", s),
        other => format!("%{}%", other),
    }
}

/// `field LIKE %value%`
#[derive(Debug, Clone, PartialEq)]
pub struct FieldLikeValue {
    field: String,
    value: Value,
}

impl FieldLikeValue {
    pub fn new(field: &str, value: impl Into<Value>) -> Self {
        Self {
            field: field.to_string(),
            value: value.into(),
        }
    }
}

#[async_trait]
impl Criterion for FieldLikeValue {
    async fn apply(&self, query: Query, _repository: &dyn RepositoryContext) -> RepoResult<Query> {
        Ok(query.where_op(&self.field, Operator::Like, contains_pattern(&self.value)))
    }
}

/// `OR field LIKE %value%`
#[derive(Debug, Clone, PartialEq)]
pub struct FieldOrLikeValue {
    field: String,
    value: Value,
}

impl FieldOrLikeValue {
    pub fn new(field: &str, value: impl Into<Value>) -> Self {
        Self {
            field: field.to_string(),
            value: value.into(),
        }
    }
}

#[async_trait]
impl Criterion for FieldOrLikeValue {
    async fn apply(&self, query: Query, _repository: &dyn RepositoryContext) -> RepoResult<Query> {
        Ok(query.or_where_op(&self.field, Operator::Like, contains_pattern(&self.value)))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Between {
    field: String,
    low: Value,
    high: Value,
}

impl Between {
    pub fn new(field: &str, low: impl Into<Value>, high: impl Into<Value>) -> Self {
        Self {
            field: field.to_string(),
            low: low.into(),
            high: high.into(),
        }
    }
}

#[async_trait]
impl Criterion for Between {
    async fn apply(&self, query: Query, _repository: &dyn RepositoryContext) -> RepoResult<Query> {
        Ok(query.where_between(&self.field, self.low.clone(), self.high.clone()))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct NotBetween {
    field: String,
    low: Value,
    high: Value,
}

impl NotBetween {
    pub fn new(field: &str, low: impl Into<Value>, high: impl Into<Value>) -> Self {
        Self {
            field: field.to_string(),
            low: low.into(),
            high: high.into(),
        }
    }
}

#[async_trait]
impl Criterion for NotBetween {
    async fn apply(&self, query: Query, _repository: &dyn RepositoryContext) -> RepoResult<Query> {
        Ok(query.where_not_between(&self.field, self.low.clone(), self.high.clone()))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct OrderBy {
    field: String,
    direction: SortDirection,
}

impl OrderBy {
    pub fn new(field: &str, direction: SortDirection) -> Self {
        Self {
            field: field.to_string(),
            direction,
        }
    }

    pub fn asc(field: &str) -> Self {
        Self::new(field, SortDirection::Asc)
    }

    pub fn desc(field: &str) -> Self {
        Self::new(field, SortDirection::Desc)
    }
}

#[async_trait]
impl Criterion for OrderBy {
    async fn apply(&self, query: Query, _repository: &dyn RepositoryContext) -> RepoResult<Query> {
        Ok(query.order_by(&self.field, self.direction))
    }
}

/// `field IN (values)`; an empty list leaves the query untouched
#[derive(Debug, Clone, PartialEq)]
pub struct WhereIn {
    field: String,
    values: Vec<Value>,
}

impl WhereIn {
    pub fn new<V: Into<Value>>(field: &str, values: impl IntoIterator<Item = V>) -> Self {
        Self {
            field: field.to_string(),
            values: values.into_iter().map(Into::into).collect(),
        }
    }
}

#[async_trait]
impl Criterion for WhereIn {
    async fn apply(&self, query: Query, _repository: &dyn RepositoryContext) -> RepoResult<Query> {
        if self.values.is_empty() {
            return Ok(query);
        }
        Ok(query.where_in(&self.field, self.values.clone()))
    }
}

/// `column IS NULL` for every column; no columns leaves the query untouched
#[derive(Debug, Clone, PartialEq)]
pub struct WhereNull {
    columns: Vec<String>,
}

impl WhereNull {
    pub fn new(columns: &[&str]) -> Self {
        Self {
            columns: columns.iter().map(|c| c.to_string()).collect(),
        }
    }
}

#[async_trait]
impl Criterion for WhereNull {
    async fn apply(&self, query: Query, _repository: &dyn RepositoryContext) -> RepoResult<Query> {
        if self.columns.is_empty() {
            return Ok(query);
        }
        let columns: Vec<&str> = self.columns.iter().map(String::as_str).collect();
        Ok(query.where_null(&columns))
    }
}

/// Only rows whose active flag is set
#[derive(Debug, Clone, PartialEq)]
pub struct IsActive {
    column: String,
}

impl IsActive {
    pub fn new(column: &str) -> Self {
        Self {
            column: column.to_string(),
        }
    }
}

#[async_trait]
impl Criterion for IsActive {
    async fn apply(&self, query: Query, _repository: &dyn RepositoryContext) -> RepoResult<Query> {
        Ok(query.where_eq(&self.column, true))
    }
}

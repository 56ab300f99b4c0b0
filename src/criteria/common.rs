//! Scope, relation, raw, eager-loading and caching criteria

use super::{Criterion, RepositoryContext};
use crate::core::error::{RepoError, RepoResult};
use crate::core::query::{Boolean, Operator, Query};
use async_trait::async_trait;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Builds the constraint applied to related rows
pub type ConstraintFn = Arc<dyn Fn(Query) -> Query + Send + Sync>;

/// Invoke a named scope registered on the model
#[derive(Debug, Clone, PartialEq)]
pub struct Scope {
    name: String,
    params: Vec<Value>,
}

impl Scope {
    pub fn new(name: &str, params: Vec<Value>) -> Self {
        Self {
            name: name.to_string(),
            params,
        }
    }
}

fn apply_scope(
    query: Query,
    repository: &dyn RepositoryContext,
    name: &str,
    params: &[Value],
) -> RepoResult<Query> {
    let descriptor = repository.descriptor();
    let scope = descriptor.find_scope(name).ok_or_else(|| {
        RepoError::invalid_argument(format!(
            "model '{}' has no scope named '{}'",
            descriptor.table(),
            name
        ))
    })?;
    scope(query, params)
}

#[async_trait]
impl Criterion for Scope {
    async fn apply(&self, query: Query, repository: &dyn RepositoryContext) -> RepoResult<Query> {
        apply_scope(query, repository, &self.name, &self.params)
    }
}

/// A scope name with its parameters
#[derive(Debug, Clone, PartialEq)]
pub struct ScopeSet {
    pub name: String,
    pub params: Vec<Value>,
}

impl ScopeSet {
    pub fn new(name: &str, params: Vec<Value>) -> Self {
        Self {
            name: name.to_string(),
            params,
        }
    }
}

/// Several scopes applied in order
#[derive(Debug, Clone, PartialEq)]
pub struct Scopes {
    scopes: Vec<ScopeSet>,
}

impl Scopes {
    pub fn new(scopes: Vec<ScopeSet>) -> RepoResult<Self> {
        if let Some(position) = scopes.iter().position(|s| s.name.trim().is_empty()) {
            return Err(RepoError::invalid_argument(format!(
                "scope set {} has no scope name",
                position
            )));
        }
        Ok(Self { scopes })
    }

    /// Sets whose names were already checked
    pub(crate) fn from_sets(scopes: Vec<ScopeSet>) -> Self {
        Self { scopes }
    }

    pub fn scopes(&self) -> &[ScopeSet] {
        &self.scopes
    }
}

#[async_trait]
impl Criterion for Scopes {
    async fn apply(&self, query: Query, repository: &dyn RepositoryContext) -> RepoResult<Query> {
        let mut query = query;
        for set in &self.scopes {
            query = apply_scope(query, repository, &set.name, &set.params)?;
        }
        Ok(query)
    }
}

/// Raw SQL fragment joined with AND
#[derive(Debug, Clone, PartialEq)]
pub struct WhereRaw {
    sql: String,
    bindings: Vec<Value>,
}

impl WhereRaw {
    pub fn new(sql: &str, bindings: Vec<Value>) -> Self {
        Self {
            sql: sql.to_string(),
            bindings,
        }
    }
}

#[async_trait]
impl Criterion for WhereRaw {
    async fn apply(&self, query: Query, _repository: &dyn RepositoryContext) -> RepoResult<Query> {
        Ok(query.where_raw(&self.sql, self.bindings.clone(), Boolean::And))
    }
}

/// Raw SQL fragment joined with OR
#[derive(Debug, Clone, PartialEq)]
pub struct OrWhereRaw {
    sql: String,
    bindings: Vec<Value>,
}

impl OrWhereRaw {
    pub fn new(sql: &str, bindings: Vec<Value>) -> Self {
        Self {
            sql: sql.to_string(),
            bindings,
        }
    }
}

#[async_trait]
impl Criterion for OrWhereRaw {
    async fn apply(&self, query: Query, _repository: &dyn RepositoryContext) -> RepoResult<Query> {
        Ok(query.where_raw(&self.sql, self.bindings.clone(), Boolean::Or))
    }
}

/// Relation count check, `>= 1` by default
#[derive(Clone)]
pub struct Has {
    relation: String,
    operator: Operator,
    count: u64,
    boolean: Boolean,
    constraint: Option<ConstraintFn>,
}

impl Has {
    pub fn new(relation: &str) -> Self {
        Self {
            relation: relation.to_string(),
            operator: Operator::Ge,
            count: 1,
            boolean: Boolean::And,
            constraint: None,
        }
    }

    pub fn count(mut self, operator: Operator, count: u64) -> Self {
        self.operator = operator;
        self.count = count;
        self
    }

    pub fn or(mut self) -> Self {
        self.boolean = Boolean::Or;
        self
    }

    pub fn constraint<F>(mut self, constraint: F) -> Self
    where
        F: Fn(Query) -> Query + Send + Sync + 'static,
    {
        self.constraint = Some(Arc::new(constraint));
        self
    }
}

impl fmt::Debug for Has {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Has")
            .field("relation", &self.relation)
            .field("operator", &self.operator)
            .field("count", &self.count)
            .field("boolean", &self.boolean)
            .field("constrained", &self.constraint.is_some())
            .finish()
    }
}

#[async_trait]
impl Criterion for Has {
    async fn apply(&self, query: Query, _repository: &dyn RepositoryContext) -> RepoResult<Query> {
        Ok(query.has(
            &self.relation,
            self.operator,
            self.count,
            self.boolean,
            self.constraint.as_deref(),
        ))
    }
}

/// At least one related row matching the constraint
#[derive(Clone)]
pub struct WhereHas {
    relation: String,
    constraint: ConstraintFn,
}

impl WhereHas {
    pub fn new<F>(relation: &str, constraint: F) -> Self
    where
        F: Fn(Query) -> Query + Send + Sync + 'static,
    {
        Self {
            relation: relation.to_string(),
            constraint: Arc::new(constraint),
        }
    }
}

impl fmt::Debug for WhereHas {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WhereHas")
            .field("relation", &self.relation)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Criterion for WhereHas {
    async fn apply(&self, query: Query, _repository: &dyn RepositoryContext) -> RepoResult<Query> {
        let constraint = self.constraint.clone();
        Ok(query.where_has(&self.relation, move |q| constraint(q)))
    }
}

/// Like [`WhereHas`], joined with OR
#[derive(Clone)]
pub struct OrWhereHas {
    relation: String,
    constraint: ConstraintFn,
}

impl OrWhereHas {
    pub fn new<F>(relation: &str, constraint: F) -> Self
    where
        F: Fn(Query) -> Query + Send + Sync + 'static,
    {
        Self {
            relation: relation.to_string(),
            constraint: Arc::new(constraint),
        }
    }
}

impl fmt::Debug for OrWhereHas {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OrWhereHas")
            .field("relation", &self.relation)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Criterion for OrWhereHas {
    async fn apply(&self, query: Query, _repository: &dyn RepositoryContext) -> RepoResult<Query> {
        let constraint = self.constraint.clone();
        Ok(query.or_where_has(&self.relation, move |q| constraint(q)))
    }
}

/// Eager-load relations
#[derive(Debug, Clone, PartialEq)]
pub struct WithRelations {
    relations: Vec<String>,
}

impl WithRelations {
    pub fn new(relations: &[&str]) -> Self {
        Self {
            relations: relations.iter().map(|r| r.to_string()).collect(),
        }
    }
}

#[async_trait]
impl Criterion for WithRelations {
    async fn apply(&self, query: Query, _repository: &dyn RepositoryContext) -> RepoResult<Query> {
        let relations: Vec<&str> = self.relations.iter().map(String::as_str).collect();
        Ok(query.with(&relations))
    }
}

/// Cache query results; without an explicit TTL the configured one is used
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UseCache {
    ttl: Option<Duration>,
}

impl UseCache {
    pub fn new(ttl: Option<Duration>) -> Self {
        Self {
            ttl: ttl.filter(|ttl| !ttl.is_zero()),
        }
    }
}

#[async_trait]
impl Criterion for UseCache {
    async fn apply(&self, query: Query, repository: &dyn RepositoryContext) -> RepoResult<Query> {
        let ttl = self.ttl.unwrap_or_else(|| repository.config().cache.ttl());
        Ok(query.remember(ttl))
    }
}

type CustomFn = Arc<dyn Fn(Query, &dyn RepositoryContext) -> RepoResult<Query> + Send + Sync>;

/// Arbitrary query transformation supplied as a closure
#[derive(Clone)]
pub struct Custom {
    apply: CustomFn,
}

impl Custom {
    pub fn new<F>(apply: F) -> Self
    where
        F: Fn(Query, &dyn RepositoryContext) -> RepoResult<Query> + Send + Sync + 'static,
    {
        Self {
            apply: Arc::new(apply),
        }
    }
}

impl fmt::Debug for Custom {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Custom(<closure>)")
    }
}

#[async_trait]
impl Criterion for Custom {
    async fn apply(&self, query: Query, repository: &dyn RepositoryContext) -> RepoResult<Query> {
        (self.apply)(query, repository)
    }
}

/// Rows having a translation whose `attribute` matches `value` in a locale
///
/// Exact matches compare with `=`; otherwise the value is matched with
/// `LIKE %value%` unless it is already wrapped in `%`.
#[derive(Debug, Clone, PartialEq)]
pub struct WhereHasTranslation {
    attribute: String,
    value: String,
    locale: Option<String>,
    exact: bool,
}

impl WhereHasTranslation {
    pub const RELATION: &'static str = "translations";

    pub fn new(attribute: &str, value: &str, locale: Option<&str>, exact: bool) -> Self {
        let wrapped = value.len() > 2 && value.starts_with('%') && value.ends_with('%');
        let value = if exact || wrapped {
            value.to_string()
        } else {
            format!("%{}%", value)
        };
        Self {
            attribute: attribute.to_string(),
            value,
            locale: locale.map(str::to_string),
            exact,
        }
    }
}

#[async_trait]
impl Criterion for WhereHasTranslation {
    async fn apply(&self, query: Query, repository: &dyn RepositoryContext) -> RepoResult<Query> {
        let locale = self
            .locale
            .clone()
            .unwrap_or_else(|| repository.config().translation.locale.clone());
        let attribute = self.attribute.clone();
        let value = self.value.clone();
        let operator = if self.exact {
            Operator::Eq
        } else {
            Operator::Like
        };

        Ok(query.where_has(Self::RELATION, move |q| {
            q.where_op(&attribute, operator, value.clone())
                .where_eq("locale", locale.clone())
        }))
    }
}

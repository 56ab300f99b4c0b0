//! Repository binding a model to its store and criteria
//!
//! Every read goes through [`Repository::apply_criteria`], which decides from
//! the criteria pools whether the cached query can be reused or must be
//! rebuilt from a bare query.
//!
//! # Example
//! ```rust,ignore
//! let store = Arc::new(InMemoryStore::new());
//! let mut products = Repository::<Product>::new(store, RepositoryConfig::default())?
//!     .with_default_criteria(|| {
//!         CriteriaPool::new().with(Some("active"), IsActive::new("active"))
//!     });
//!
//! let cheap = products
//!     .find_where(&[WhereCondition::compare("price", Operator::Lt, 10)], &["*"], false)
//!     .await?;
//! ```

pub mod extended;

use crate::config::RepositoryConfig;
use crate::core::error::{RepoError, RepoResult};
use crate::core::model::{Model, ModelDescriptor};
use crate::core::query::{
    Boolean, PaginationMeta, Paginator, Query, SimplePaginator, WhereCondition,
};
use crate::core::store::{Aggregate, Record, Store};
use crate::criteria::pool::CriteriaPool;
use crate::criteria::registry::{CriteriaRegistry, Resolution};
use crate::criteria::{Criterion, CriterionRef, RepositoryContext};
use async_trait::async_trait;
use indexmap::IndexMap;
use serde_json::Value;
use std::marker::PhantomData;
use std::sync::Arc;

pub use extended::{ExtendedRepository, ExtendedSettings};

/// Produces the standing criteria a repository starts with
pub type DefaultCriteria = Arc<dyn Fn() -> CriteriaPool + Send + Sync>;

/// Repository for one model type
///
/// Not meant to be shared between concurrent requests: build one per unit
/// of work.
pub struct Repository<M: Model> {
    store: Arc<dyn Store>,
    config: RepositoryConfig,
    descriptor: ModelDescriptor,
    built: Option<Query>,
    registry: CriteriaRegistry,
    defaults: DefaultCriteria,
    per_page: Option<usize>,
    _model: PhantomData<fn() -> M>,
}

impl<M: Model> Repository<M> {
    /// Create a repository over `store`
    ///
    /// # Errors
    /// `RepoError::Configuration` when the model description cannot back a query
    pub fn new(store: Arc<dyn Store>, config: RepositoryConfig) -> RepoResult<Self> {
        let descriptor = M::describe();
        descriptor.validate(model_name::<M>())?;

        Ok(Self {
            store,
            config,
            descriptor,
            built: None,
            registry: CriteriaRegistry::default(),
            defaults: Arc::new(CriteriaPool::new),
            per_page: None,
            _model: PhantomData,
        })
    }

    /// Declare the default criteria and install them as the standing pool
    pub fn with_default_criteria<F>(mut self, defaults: F) -> Self
    where
        F: Fn() -> CriteriaPool + Send + Sync + 'static,
    {
        self.registry.replace_standing(defaults());
        self.defaults = Arc::new(defaults);
        self
    }

    /// Page size used by `paginate` when the caller passes none
    pub fn with_per_page(mut self, per_page: usize) -> Self {
        self.per_page = Some(per_page);
        self
    }

    pub fn model_name(&self) -> &'static str {
        model_name::<M>()
    }

    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    // === Criteria ===

    pub fn push_criteria(
        &mut self,
        criterion: impl Criterion + 'static,
        key: Option<&str>,
    ) -> &mut Self {
        self.push_criteria_ref(Arc::new(criterion), key)
    }

    pub fn push_criteria_ref(&mut self, criterion: CriterionRef, key: Option<&str>) -> &mut Self {
        self.registry.push(criterion, key);
        self
    }

    /// Apply `criterion` to the next query only
    pub fn push_once_criteria(
        &mut self,
        criterion: impl Criterion + 'static,
        key: Option<&str>,
    ) -> &mut Self {
        self.registry.push_once(Arc::new(criterion), key);
        self
    }

    pub fn remove_criteria(&mut self, key: &str) -> &mut Self {
        self.registry.remove(key);
        self
    }

    /// Skip the standing criterion under `key` for the next query only
    pub fn remove_once_criteria(&mut self, key: &str) -> &mut Self {
        self.registry.remove_once(key);
        self
    }

    pub fn ignore_criteria(&mut self, ignore: bool) -> &mut Self {
        self.registry.set_ignore(ignore);
        self
    }

    pub fn restore_default_criteria(&mut self) -> &mut Self {
        self.registry.replace_standing((self.defaults)());
        self
    }

    pub fn clear_criteria(&mut self) -> &mut Self {
        self.registry.clear();
        self
    }

    pub fn get_criteria(&self) -> CriteriaPool {
        self.registry.standing().clone()
    }

    pub fn get_once_criteria(&self) -> CriteriaPool {
        self.registry.once().clone()
    }

    /// Criteria the next query would apply
    pub fn get_all_criteria(&self) -> CriteriaPool {
        self.registry.effective()
    }

    /// Resolve the criteria pools into an executable query
    pub async fn apply_criteria(&mut self) -> RepoResult<Query> {
        let pool = match self.registry.plan() {
            Resolution::Bare { reset } => {
                if reset {
                    tracing::debug!(
                        model = %self.descriptor.table(),
                        "criteria ignored, dropping built query"
                    );
                    self.registry.reset_active();
                }
                self.built = None;
                return Ok(self.descriptor.new_query());
            }
            Resolution::Unchanged => match &self.built {
                Some(query) => {
                    tracing::debug!(
                        model = %self.descriptor.table(),
                        "criteria unchanged, reusing query"
                    );
                    return Ok(query.clone());
                }
                None => self.registry.effective(),
            },
            Resolution::Rebuild(pool) => pool,
        };

        tracing::debug!(
            model = %self.descriptor.table(),
            criteria = pool.len(),
            "rebuilding query"
        );
        match self.fold(&pool).await {
            Ok(query) => {
                self.registry.mark_applied(pool);
                self.built = Some(query.clone());
                Ok(query)
            }
            Err(e) => {
                self.registry.reset_active();
                self.built = None;
                Err(e)
            }
        }
    }

    async fn fold(&self, pool: &CriteriaPool) -> RepoResult<Query> {
        let mut query = self.descriptor.new_query();
        for criterion in pool.criteria() {
            query = criterion.apply(query, self).await?;
        }
        Ok(query)
    }

    /// The resolved, unexecuted query
    pub async fn query(&mut self) -> RepoResult<Query> {
        self.apply_criteria().await
    }

    // === Reads ===

    /// Build a model from attributes without saving it
    pub fn make(&self, data: Record) -> RepoResult<M> {
        self.to_model(data)
    }

    pub async fn first(&mut self, columns: &[&str]) -> RepoResult<Option<M>> {
        let query = self.apply_criteria().await?;
        self.fetch_one(query, columns).await
    }

    /// Newest row by `sort` (the key when `None`), skipping `skip` rows
    pub async fn first_latest(
        &mut self,
        columns: &[&str],
        sort: Option<&str>,
        skip: usize,
    ) -> RepoResult<Option<M>> {
        let query = self.apply_criteria().await?;
        let sort = sort.unwrap_or(self.descriptor.key_name()).to_string();
        self.fetch_one(query.latest(&sort).skip(skip), columns).await
    }

    pub async fn first_oldest(
        &mut self,
        columns: &[&str],
        sort: Option<&str>,
        skip: usize,
    ) -> RepoResult<Option<M>> {
        let query = self.apply_criteria().await?;
        let sort = sort.unwrap_or(self.descriptor.key_name()).to_string();
        self.fetch_one(query.oldest(&sort).skip(skip), columns).await
    }

    pub async fn first_or_fail(&mut self, columns: &[&str]) -> RepoResult<M> {
        self.first(columns)
            .await?
            .ok_or_else(|| RepoError::not_found(self.model_name(), None))
    }

    /// Find by primary key, or by `attribute` when given
    pub async fn find(
        &mut self,
        id: impl Into<Value>,
        columns: &[&str],
        attribute: Option<&str>,
    ) -> RepoResult<Option<M>> {
        let query = self.apply_criteria().await?;
        let column = attribute.unwrap_or(self.descriptor.key_name()).to_string();
        self.fetch_one(query.where_eq(&column, id), columns).await
    }

    pub async fn find_or_fail(
        &mut self,
        id: impl Into<Value>,
        columns: &[&str],
        attribute: Option<&str>,
    ) -> RepoResult<M> {
        let id = id.into();
        let label = value_label(&id);
        self.find(id, columns, attribute)
            .await?
            .ok_or_else(|| RepoError::not_found(self.model_name(), Some(label)))
    }

    pub async fn find_or_new(&mut self, id: impl Into<Value>, columns: &[&str]) -> RepoResult<M>
    where
        M: Default,
    {
        Ok(self.find(id, columns, None).await?.unwrap_or_default())
    }

    pub async fn find_by(
        &mut self,
        attribute: &str,
        value: impl Into<Value>,
        columns: &[&str],
    ) -> RepoResult<Option<M>> {
        let query = self.apply_criteria().await?;
        self.fetch_one(query.where_eq(attribute, value), columns).await
    }

    pub async fn find_all_by(
        &mut self,
        attribute: &str,
        value: impl Into<Value>,
        columns: &[&str],
    ) -> RepoResult<Vec<M>> {
        let query = self.apply_criteria().await?;
        self.fetch(query.where_eq(attribute, value), columns).await
    }

    /// Rows matching every condition, or any of them when `or` is set
    ///
    /// OR-joined conditions are grouped so that they cannot widen the
    /// repository's criteria.
    pub async fn find_where(
        &mut self,
        conditions: &[WhereCondition],
        columns: &[&str],
        or: bool,
    ) -> RepoResult<Vec<M>> {
        let query = self.apply_criteria().await?;
        let query = if or {
            query.where_nested(Boolean::And, |group| {
                conditions
                    .iter()
                    .fold(group, |q, condition| condition.apply_to(q, Boolean::Or))
            })
        } else {
            conditions
                .iter()
                .fold(query, |q, condition| condition.apply_to(q, Boolean::And))
        };
        self.fetch(query, columns).await
    }

    pub async fn find_where_in(
        &mut self,
        field: &str,
        values: Vec<Value>,
        columns: &[&str],
    ) -> RepoResult<Vec<M>> {
        let query = self.apply_criteria().await?;
        self.fetch(query.where_in(field, values), columns).await
    }

    pub async fn find_where_not_in(
        &mut self,
        field: &str,
        values: Vec<Value>,
        columns: &[&str],
    ) -> RepoResult<Vec<M>> {
        let query = self.apply_criteria().await?;
        self.fetch(query.where_not_in(field, values), columns).await
    }

    pub async fn find_where_between(
        &mut self,
        field: &str,
        low: impl Into<Value>,
        high: impl Into<Value>,
        columns: &[&str],
    ) -> RepoResult<Vec<M>> {
        let query = self.apply_criteria().await?;
        self.fetch(query.where_between(field, low, high), columns).await
    }

    pub async fn all(&mut self, columns: &[&str]) -> RepoResult<Vec<M>> {
        let query = self.apply_criteria().await?;
        self.fetch(query, columns).await
    }

    pub async fn get(&mut self, columns: &[&str]) -> RepoResult<Vec<M>> {
        self.all(columns).await
    }

    /// Run `callback` on the resolved query and fetch what it returns
    ///
    /// # Errors
    /// `RepoError::InvalidArgument` when the returned query targets another table
    pub async fn all_callback<F>(&mut self, callback: F, columns: &[&str]) -> RepoResult<Vec<M>>
    where
        F: FnOnce(Query) -> Query + Send,
    {
        let query = self.callback_query(callback).await?;
        self.fetch(query, columns).await
    }

    pub async fn find_callback<F>(
        &mut self,
        callback: F,
        columns: &[&str],
    ) -> RepoResult<Option<M>>
    where
        F: FnOnce(Query) -> Query + Send,
    {
        let query = self.callback_query(callback).await?;
        self.fetch_one(query, columns).await
    }

    pub async fn pluck(&mut self, column: &str) -> RepoResult<Vec<Value>> {
        let query = self.apply_criteria().await?;
        let rows = self.store.select(&query, &[column]).await?;
        Ok(rows
            .into_iter()
            .map(|mut row| row.remove(column).unwrap_or(Value::Null))
            .collect())
    }

    /// `column` values keyed by `key`; later rows win on duplicate keys
    pub async fn pluck_keyed(
        &mut self,
        column: &str,
        key: &str,
    ) -> RepoResult<IndexMap<String, Value>> {
        let query = self.apply_criteria().await?;
        let rows = self.store.select(&query, &[column, key]).await?;
        Ok(rows
            .into_iter()
            .map(|mut row| {
                let label = row.get(key).map(value_label).unwrap_or_default();
                (label, row.remove(column).unwrap_or(Value::Null))
            })
            .collect())
    }

    /// Nest rows under their parents; roots have an empty or zero parent
    pub async fn tree(
        &mut self,
        columns: &[&str],
        parent_key: &str,
        id_key: &str,
        children_key: &str,
    ) -> RepoResult<Vec<Record>> {
        let query = self.apply_criteria().await?;
        let rows = self.store.select(&query, columns).await?;
        Ok(build_tree(rows, parent_key, id_key, children_key))
    }

    pub async fn count(&mut self) -> RepoResult<u64> {
        let query = self.apply_criteria().await?;
        self.store.count(&query.without_slice()).await
    }

    pub async fn min(&mut self, column: &str) -> RepoResult<Value> {
        self.aggregate(Aggregate::Min, column).await
    }

    pub async fn max(&mut self, column: &str) -> RepoResult<Value> {
        self.aggregate(Aggregate::Max, column).await
    }

    pub async fn sum(&mut self, column: &str) -> RepoResult<Value> {
        self.aggregate(Aggregate::Sum, column).await
    }

    pub async fn avg(&mut self, column: &str) -> RepoResult<Value> {
        self.aggregate(Aggregate::Avg, column).await
    }

    pub async fn average(&mut self, column: &str) -> RepoResult<Value> {
        self.avg(column).await
    }

    async fn aggregate(&mut self, function: Aggregate, column: &str) -> RepoResult<Value> {
        let query = self.apply_criteria().await?;
        self.store.aggregate(&query.without_slice(), function, column).await
    }

    pub async fn paginate(
        &mut self,
        per_page: Option<usize>,
        columns: &[&str],
        page: Option<usize>,
    ) -> RepoResult<Paginator<M>> {
        let per_page = self.resolve_per_page(per_page);
        let page = page.unwrap_or(1).max(1);
        let query = self.apply_criteria().await?.without_slice();

        let total = self.store.count(&query).await?;
        let data = self.fetch(query.for_page(page, per_page), columns).await?;
        Ok(Paginator {
            data,
            pagination: PaginationMeta::new(page, per_page, total as usize),
        })
    }

    /// Paginate without counting; fetches one extra row to detect a next page
    pub async fn simple_paginate(
        &mut self,
        per_page: Option<usize>,
        columns: &[&str],
        page: Option<usize>,
    ) -> RepoResult<SimplePaginator<M>> {
        let per_page = self.resolve_per_page(per_page);
        let page = page.unwrap_or(1).max(1);
        let query = self
            .apply_criteria()
            .await?
            .without_slice()
            .for_page(page, per_page)
            .take(per_page + 1);

        let mut data = self.fetch(query, columns).await?;
        let has_more = data.len() > per_page;
        data.truncate(per_page);
        Ok(SimplePaginator {
            data,
            page,
            limit: per_page,
            has_more,
        })
    }

    /// Requested size, else the repository's, the configured, then the model's; capped
    fn resolve_per_page(&self, requested: Option<usize>) -> usize {
        let per_page = requested
            .filter(|n| *n > 0)
            .or(self.per_page)
            .or(self.config.pagination.limit)
            .unwrap_or_else(|| self.descriptor.default_per_page());
        per_page.min(self.config.pagination.page_max.max(1))
    }

    // === Writes ===

    /// Insert rows as-is; returns how many were inserted
    pub async fn insert(&self, rows: Vec<Record>) -> RepoResult<usize> {
        let keys = self
            .store
            .insert(self.descriptor.table(), self.descriptor.key_name(), rows)
            .await?;
        Ok(keys.len())
    }

    pub async fn insert_get_id(&self, row: Record) -> RepoResult<Value> {
        let mut keys = self
            .store
            .insert(self.descriptor.table(), self.descriptor.key_name(), vec![row])
            .await?;
        Ok(keys.pop().unwrap_or(Value::Null))
    }

    pub async fn create(&self, data: Record) -> RepoResult<M> {
        let mut data = data;
        let key = self.insert_get_id(data.clone()).await?;
        data.insert(self.descriptor.key_name().to_string(), key);
        self.to_model(data)
    }

    /// Update the stored row when the model has a key that exists, insert otherwise
    pub async fn save(&self, model: &M) -> RepoResult<M> {
        let record = to_record(model, self.descriptor.table())?;
        let key_name = self.descriptor.key_name();

        if let Some(key) = record.get(key_name).filter(|k| !k.is_null()) {
            let by_key = self.descriptor.new_query().where_eq(key_name, key.clone());
            if self.store.count(&by_key).await? > 0 {
                self.store.update(&by_key, &record).await?;
                return Ok(model.clone());
            }
        }
        self.create(record).await
    }

    /// Merge `data` into the row found by key (or `attribute`)
    ///
    /// Returns `false` when no such row is visible through the criteria.
    pub async fn update(
        &mut self,
        data: Record,
        id: impl Into<Value>,
        attribute: Option<&str>,
    ) -> RepoResult<bool> {
        let Some(model) = self.find(id, &["*"], attribute).await? else {
            return Ok(false);
        };
        let mut record = to_record(&model, self.descriptor.table())?;
        record.extend(data);
        self.save(&self.to_model(record)?).await?;
        Ok(true)
    }

    /// Find the row and merge `data` into it without saving
    pub async fn fill(
        &mut self,
        data: Record,
        id: impl Into<Value>,
        attribute: Option<&str>,
    ) -> RepoResult<M> {
        let model = self.find_or_fail(id, &["*"], attribute).await?;
        let mut record = to_record(&model, self.descriptor.table())?;
        record.extend(data);
        self.to_model(record)
    }

    /// Update the first row matching `attributes` with `values`, or create it
    ///
    /// Blank attributes (null, false, 0, empty string or list) are ignored;
    /// when none remain nothing happens and `None` is returned.
    pub async fn update_or_create(
        &mut self,
        attributes: Record,
        values: Record,
    ) -> RepoResult<Option<M>> {
        let attributes: Record = attributes
            .into_iter()
            .filter(|(_, value)| !is_blank(value))
            .collect();
        if attributes.is_empty() {
            return Ok(None);
        }

        let query = attributes
            .iter()
            .fold(self.apply_criteria().await?, |q, (column, value)| {
                q.where_eq(column, value.clone())
            });

        match self.store.select(&query.take(1), &["*"]).await?.pop() {
            Some(mut existing) => {
                existing.extend(values);
                Ok(Some(self.save(&self.to_model(existing)?).await?))
            }
            None => {
                let mut data = attributes;
                data.extend(values);
                Ok(Some(self.create(data).await?))
            }
        }
    }

    /// Set `data` on rows matching `conditions` (lists become `IN`) and,
    /// when given, any of `or_conditions`
    ///
    /// Returns 0 without touching the store when `conditions` or `data` is empty.
    pub async fn update_where(
        &mut self,
        conditions: &Record,
        data: &Record,
        or_conditions: Option<&Record>,
    ) -> RepoResult<u64> {
        if conditions.is_empty() || data.is_empty() {
            return Ok(0);
        }

        let mut query = self.apply_criteria().await?;
        for (column, value) in conditions {
            query = match value {
                Value::Array(values) => query.where_in(column, values.clone()),
                other => query.where_eq(column, other.clone()),
            };
        }

        if let Some(or_conditions) = or_conditions.filter(|c| !c.is_empty()) {
            query = query.where_nested(Boolean::And, |group| {
                or_conditions
                    .iter()
                    .fold(group, |q, (column, value)| match value {
                        Value::Array(values) => q.or_where_in(column, values.clone()),
                        other => q.or_where_eq(column, other.clone()),
                    })
            });
        }

        self.store.update(&query, data).await
    }

    pub async fn update_where_callback<F>(
        &mut self,
        callback: F,
        data: &Record,
    ) -> RepoResult<u64>
    where
        F: FnOnce(Query) -> Query + Send,
    {
        if data.is_empty() {
            return Ok(0);
        }
        let query = self.callback_query(callback).await?;
        self.store.update(&query, data).await
    }

    pub async fn update_by_ids(&mut self, ids: Vec<Value>, data: &Record) -> RepoResult<u64> {
        if ids.is_empty() || data.is_empty() {
            return Ok(0);
        }
        let key_name = self.descriptor.key_name().to_string();
        let query = self.apply_criteria().await?.where_in(&key_name, ids);
        self.store.update(&query, data).await
    }

    /// Delete rows by primary key, bypassing criteria
    pub async fn delete(&self, ids: Vec<Value>) -> RepoResult<u64> {
        if ids.is_empty() {
            return Ok(0);
        }
        let query = self
            .descriptor
            .new_query()
            .where_in(self.descriptor.key_name(), ids);
        self.store.delete(&query).await
    }

    /// Delete rows matching every condition, bypassing criteria
    ///
    /// An empty condition list deletes nothing.
    pub async fn delete_where(&self, conditions: &[WhereCondition]) -> RepoResult<u64> {
        if conditions.is_empty() {
            return Ok(0);
        }
        let query = conditions
            .iter()
            .fold(self.descriptor.new_query(), |q, c| c.apply_to(q, Boolean::And));
        self.store.delete(&query).await
    }

    /// Add `amount` to `column` on every row visible through the criteria
    pub async fn increment(&mut self, column: &str, amount: f64) -> RepoResult<u64> {
        let query = self.apply_criteria().await?;
        self.store.increment(&query, column, amount).await
    }

    pub async fn decrement(&mut self, column: &str, amount: f64) -> RepoResult<u64> {
        self.increment(column, -amount).await
    }

    // === Helpers ===

    async fn callback_query<F>(&mut self, callback: F) -> RepoResult<Query>
    where
        F: FnOnce(Query) -> Query + Send,
    {
        let query = callback(self.apply_criteria().await?);
        if query.table_name() != self.descriptor.table() {
            return Err(RepoError::invalid_argument(format!(
                "callback returned a query on '{}', expected '{}'",
                query.table_name(),
                self.descriptor.table()
            )));
        }
        Ok(query)
    }

    async fn fetch(&self, query: Query, columns: &[&str]) -> RepoResult<Vec<M>> {
        self.store
            .select(&query, columns)
            .await?
            .into_iter()
            .map(|row| self.to_model(row))
            .collect()
    }

    async fn fetch_one(&self, query: Query, columns: &[&str]) -> RepoResult<Option<M>> {
        let mut rows = self.store.select(&query.take(1), columns).await?;
        rows.pop().map(|row| self.to_model(row)).transpose()
    }

    fn to_model(&self, record: Record) -> RepoResult<M> {
        serde_json::from_value(Value::Object(record)).map_err(|e| RepoError::Serialization {
            entity_type: self.model_name().to_string(),
            message: e.to_string(),
        })
    }
}

#[async_trait]
impl<M: Model> RepositoryContext for Repository<M> {
    fn descriptor(&self) -> &ModelDescriptor {
        &self.descriptor
    }

    fn config(&self) -> &RepositoryConfig {
        &self.config
    }

    async fn count_query(&self, query: &Query) -> RepoResult<u64> {
        self.store.count(&query.clone().without_slice()).await
    }
}

fn model_name<M>() -> &'static str {
    let name = std::any::type_name::<M>();
    name.rsplit("::").next().unwrap_or(name)
}

fn to_record<M: Model>(model: &M, entity_type: &str) -> RepoResult<Record> {
    match serde_json::to_value(model)? {
        Value::Object(record) => Ok(record),
        other => Err(RepoError::Serialization {
            entity_type: entity_type.to_string(),
            message: format!("expected an object, got {}", other),
        }),
    }
}

fn value_label(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Bool(b) => !b,
        Value::Number(n) => n.as_f64() == Some(0.0),
        Value::String(s) => s.is_empty() || s == "0",
        Value::Array(a) => a.is_empty(),
        Value::Object(o) => o.is_empty(),
    }
}

fn tree_key(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => "0".to_string(),
        Some(Value::String(s)) if s.is_empty() => "0".to_string(),
        Some(other) => value_label(other),
    }
}

fn build_tree(
    rows: Vec<Record>,
    parent_key: &str,
    id_key: &str,
    children_key: &str,
) -> Vec<Record> {
    let mut groups: IndexMap<String, Vec<Record>> = IndexMap::new();
    for row in rows {
        groups
            .entry(tree_key(row.get(parent_key)))
            .or_default()
            .push(row);
    }
    attach_children(&mut groups, "0", id_key, children_key)
}

fn attach_children(
    groups: &mut IndexMap<String, Vec<Record>>,
    parent: &str,
    id_key: &str,
    children_key: &str,
) -> Vec<Record> {
    // each group is taken once, so cycles terminate
    let Some(rows) = groups.shift_remove(parent) else {
        return Vec::new();
    };

    let mut nodes = Vec::with_capacity(rows.len());
    for mut row in rows {
        let id = tree_key(row.get(id_key));
        let children = attach_children(groups, &id, id_key, children_key);
        row.insert(
            children_key.to_string(),
            Value::Array(children.into_iter().map(Value::Object).collect()),
        );
        nodes.push(row);
    }
    nodes
}

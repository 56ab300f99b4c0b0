//! Criteria built from request parameters
//!
//! Columns are declared once; each request's flat parameter map then decides
//! which filter and order criteria apply, and which page is sliced out.
//!
//! # Example
//! ```rust,ignore
//! let mut request = RequestCriteria::from_params(params, &config);
//! request.column("name").search(SearchOperator::Like).sort_by_asc();
//! request.column("price").search(SearchOperator::Between);
//!
//! let request = Arc::new(request);
//! repository.push_once_criteria(request.clone(), None);
//! let rows = repository.all(&["*"]).await?;
//! let pagination = request.get_paginate();
//! ```

use super::field::{
    Between, FieldIsValue, FieldLikeValue, GreaterThan, GreaterThanOrEqual, LessThan,
    LessThanOrEqual, NotBetween, NotEqual, OrderBy,
};
use super::{Criterion, CriterionRef, NullCriterion, RepositoryContext};
use crate::config::{RepositoryConfig, RequestConfig, SortPolicy};
use crate::core::error::{RepoError, RepoResult};
use crate::core::query::{Query, SortDirection};
use async_trait::async_trait;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Flat request parameters, e.g. a decoded query string
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestParams(HashMap<String, String>);

impl RequestParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_pairs<K, V>(pairs: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        Self(
            pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }

    pub fn insert(&mut self, key: &str, value: &str) {
        self.0.insert(key.to_string(), value.to_string());
    }

    pub fn has(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }
}

impl From<HashMap<String, String>> for RequestParams {
    fn from(params: HashMap<String, String>) -> Self {
        Self(params)
    }
}

/// How a searchable column turns its parameter into a criterion
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SearchOperator {
    Equal,
    NotEqual,
    LessThan,
    LessThanOrEqual,
    GreaterThan,
    GreaterThanOrEqual,
    #[default]
    Like,
    /// Value is `low,high`
    Between,
    NotBetween,
    /// Use the criterion bound with [`RequestColumn::search_by_criteria`]
    Custom,
}

impl FromStr for SearchOperator {
    type Err = RepoError;

    fn from_str(s: &str) -> RepoResult<Self> {
        match s.trim() {
            "=" => Ok(SearchOperator::Equal),
            "~=" | "!=" => Ok(SearchOperator::NotEqual),
            "<" => Ok(SearchOperator::LessThan),
            "<=" => Ok(SearchOperator::LessThanOrEqual),
            ">" => Ok(SearchOperator::GreaterThan),
            ">=" => Ok(SearchOperator::GreaterThanOrEqual),
            "like" => Ok(SearchOperator::Like),
            "between" => Ok(SearchOperator::Between),
            "not_between" => Ok(SearchOperator::NotBetween),
            "custom" => Ok(SearchOperator::Custom),
            other => Err(RepoError::invalid_argument(format!(
                "unknown search operator '{}'",
                other
            ))),
        }
    }
}

/// Search and sort behavior of one column
#[derive(Debug, Clone)]
pub struct RequestColumn {
    field: String,
    searchable: bool,
    operator: SearchOperator,
    criterion: Option<CriterionRef>,
    sortable: bool,
    direction: SortDirection,
}

impl RequestColumn {
    pub fn new(field: &str) -> Self {
        Self {
            field: field.to_string(),
            searchable: false,
            operator: SearchOperator::default(),
            criterion: None,
            sortable: false,
            direction: SortDirection::Asc,
        }
    }

    pub fn search(&mut self, operator: SearchOperator) -> &mut Self {
        self.searchable = true;
        self.operator = operator;
        self
    }

    pub fn searchable(&mut self, searchable: bool) -> &mut Self {
        self.searchable = searchable;
        self
    }

    /// Search with `criterion` whenever the column's parameter is present
    pub fn search_by_criteria(&mut self, criterion: impl Criterion + 'static) -> &mut Self {
        self.criterion = Some(Arc::new(criterion));
        self.operator = SearchOperator::Custom;
        self
    }

    pub fn sort_by_asc(&mut self) -> &mut Self {
        self.sortable = true;
        self.direction = SortDirection::Asc;
        self
    }

    pub fn sort_by_desc(&mut self) -> &mut Self {
        self.sortable = true;
        self.direction = SortDirection::Desc;
        self
    }

    pub fn field(&self) -> &str {
        &self.field
    }

    pub fn is_searchable(&self) -> bool {
        self.searchable
    }

    pub fn is_sortable(&self) -> bool {
        self.sortable
    }

    pub fn operator(&self) -> SearchOperator {
        self.operator
    }

    pub fn direction(&self) -> SortDirection {
        self.direction
    }

    /// Parameter carrying the search value, if the column is searchable
    pub fn search_field_name(&self, prefix: &str) -> Option<String> {
        self.searchable.then(|| format!("{}{}", prefix, self.field))
    }

    /// Parameter carrying the sort direction, if the column is sortable
    pub fn sort_field_name(&self, prefix: &str) -> Option<String> {
        self.sortable.then(|| format!("{}{}", prefix, self.field))
    }

    /// Criterion filtering this column by a raw request value
    pub fn match_criteria(&self, raw: &str) -> CriterionRef {
        let field = self.field.as_str();
        match self.operator {
            SearchOperator::Equal => Arc::new(FieldIsValue::new(field, raw)),
            SearchOperator::NotEqual => Arc::new(NotEqual::new(field, raw)),
            SearchOperator::LessThan => Arc::new(LessThan::new(field, raw)),
            SearchOperator::LessThanOrEqual => Arc::new(LessThanOrEqual::new(field, raw)),
            SearchOperator::GreaterThan => Arc::new(GreaterThan::new(field, raw)),
            SearchOperator::GreaterThanOrEqual => Arc::new(GreaterThanOrEqual::new(field, raw)),
            SearchOperator::Like => Arc::new(FieldLikeValue::new(field, raw)),
            SearchOperator::Between => match split_range(raw) {
                Some((low, high)) => Arc::new(Between::new(field, low, high)),
                None => NullCriterion::shared(),
            },
            SearchOperator::NotBetween => match split_range(raw) {
                Some((low, high)) => Arc::new(NotBetween::new(field, low, high)),
                None => NullCriterion::shared(),
            },
            SearchOperator::Custom => match &self.criterion {
                Some(criterion) => criterion.clone(),
                None => {
                    tracing::warn!(field = %self.field, "custom search column has no criterion, skipping");
                    NullCriterion::shared()
                }
            },
        }
    }
}

fn split_range(raw: &str) -> Option<(&str, &str)> {
    let (low, high) = raw.split_once(',')?;
    let (low, high) = (low.trim(), high.trim());
    if low.is_empty() || high.is_empty() || high.contains(',') {
        return None;
    }
    Some((low, high))
}

/// Pagination state after a request was applied
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaginationInfo {
    pub page_size: usize,
    pub page_index: usize,
    pub total: u64,
}

impl PaginationInfo {
    /// JSON object keyed with the configured parameter names
    pub fn to_json(&self, config: &RequestConfig) -> Value {
        let mut object = Map::new();
        object.insert(config.page_size_param.clone(), Value::from(self.page_size));
        object.insert(config.page_index_param.clone(), Value::from(self.page_index));
        object.insert(config.total_param.clone(), Value::from(self.total));
        Value::Object(object)
    }
}

/// Maps request parameters onto filter, order and page criteria
#[derive(Debug)]
pub struct RequestCriteria {
    params: RequestParams,
    config: RequestConfig,
    page: usize,
    page_size: usize,
    columns: IndexMap<String, RequestColumn>,
    global: Vec<CriterionRef>,
    paginate: bool,
    total: AtomicU64,
}

impl RequestCriteria {
    /// Columns every listing usually selects besides the declared ones
    pub const DEFAULT_COLUMNS: [&'static str; 3] = ["id", "created_at", "updated_at"];

    pub fn from_params(params: RequestParams, config: &RepositoryConfig) -> Self {
        let page_max = config.pagination.page_max.max(1);
        let config = config.request.clone();
        let page = page_param(&params, &config.page_index_param, 1);
        let page_size = page_param(&params, &config.page_size_param, config.default_page_size)
            .min(page_max);

        Self {
            params,
            config,
            page,
            page_size,
            columns: IndexMap::new(),
            global: Vec::new(),
            paginate: true,
            total: AtomicU64::new(0),
        }
    }

    /// Declare (or redeclare) a column
    pub fn column(&mut self, field: &str) -> &mut RequestColumn {
        let column = self
            .columns
            .entry(field.to_string())
            .or_insert_with(|| RequestColumn::new(field));
        *column = RequestColumn::new(field);
        column
    }

    /// Declared fields followed by `defaults`
    pub fn columns(&self, defaults: &[&str]) -> Vec<String> {
        self.columns
            .keys()
            .cloned()
            .chain(defaults.iter().map(|d| d.to_string()))
            .collect()
    }

    pub fn declared_columns(&self) -> impl Iterator<Item = &RequestColumn> {
        self.columns.values()
    }

    /// Criterion applied on every request, ahead of the column criteria
    pub fn global_criteria(&mut self, criterion: impl Criterion + 'static) -> &mut Self {
        self.global.push(Arc::new(criterion));
        self
    }

    pub fn disable_pagination(&mut self) -> &mut Self {
        self.paginate = false;
        self
    }

    pub fn has_query_field(&self, field: &str) -> bool {
        self.params.has(field)
    }

    pub fn query_field(&self, field: &str) -> Option<&str> {
        self.params.get(field)
    }

    /// The search value sent for `column`, or `default`
    pub fn search_field_value(&self, column: &RequestColumn, default: &str) -> String {
        column
            .search_field_name(&self.config.search_prefix)
            .and_then(|name| self.params.get(&name))
            .unwrap_or(default)
            .to_string()
    }

    /// Global criteria, then per column its filter and its order
    pub fn search_criteria_list(&self) -> Vec<CriterionRef> {
        let mut list = self.global.clone();

        for column in self.columns.values() {
            if let Some(value) = column
                .search_field_name(&self.config.search_prefix)
                .and_then(|name| self.params.get(&name))
            {
                let criterion = column.match_criteria(value);
                if !criterion.is_null() {
                    list.push(criterion);
                }
            }

            if let Some(name) = column.sort_field_name(&self.config.sort_prefix) {
                let requested = self.params.get(&name);
                if requested.is_none() && self.config.sort_policy == SortPolicy::WhenRequested {
                    continue;
                }
                let direction = requested
                    .and_then(SortDirection::parse)
                    .unwrap_or(column.direction());
                list.push(Arc::new(OrderBy::new(column.field(), direction)));
            }
        }

        list
    }

    pub fn total(&self) -> u64 {
        self.total.load(Ordering::Relaxed)
    }

    pub fn get_paginate(&self) -> PaginationInfo {
        PaginationInfo {
            page_size: self.page_size,
            page_index: self.page,
            total: self.total(),
        }
    }

    /// [`RequestCriteria::get_paginate`] keyed with the configured names
    pub fn paginate_json(&self) -> Value {
        self.get_paginate().to_json(&self.config)
    }
}

fn page_param(params: &RequestParams, name: &str, default: usize) -> usize {
    params
        .get(name)
        .and_then(|raw| raw.trim().parse::<usize>().ok())
        .unwrap_or(default)
        .max(1)
}

#[async_trait]
impl Criterion for RequestCriteria {
    async fn apply(&self, query: Query, repository: &dyn RepositoryContext) -> RepoResult<Query> {
        let mut query = query;
        for criterion in self.search_criteria_list() {
            query = criterion.apply(query, repository).await?;
        }

        if !self.paginate {
            return Ok(query);
        }

        let total = repository.count_query(&query).await?;
        self.total.store(total, Ordering::Relaxed);
        Ok(query.for_page(self.page, self.page_size))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::query::{Condition, Operator};
    use crate::criteria::testing::StaticContext;

    fn params(pairs: &[(&str, &str)]) -> RequestParams {
        RequestParams::from_pairs(pairs.iter().copied())
    }

    #[test]
    fn test_page_defaults_and_parsing() {
        let config = RepositoryConfig::default();
        let request = RequestCriteria::from_params(RequestParams::new(), &config);
        assert_eq!(request.get_paginate().page_index, 1);
        assert_eq!(request.get_paginate().page_size, 10);

        let request = RequestCriteria::from_params(
            params(&[("pageIndex", "3"), ("pageSize", "abc")]),
            &config,
        );
        assert_eq!(request.get_paginate().page_index, 3);
        assert_eq!(request.get_paginate().page_size, 10);

        let request = RequestCriteria::from_params(params(&[("pageIndex", "0")]), &config);
        assert_eq!(request.get_paginate().page_index, 1);
    }

    #[test]
    fn test_search_operator_parsing() {
        assert_eq!("~=".parse::<SearchOperator>().unwrap(), SearchOperator::NotEqual);
        assert_eq!(
            "not_between".parse::<SearchOperator>().unwrap(),
            SearchOperator::NotBetween
        );
        assert!("~~".parse::<SearchOperator>().is_err());
    }

    #[test]
    fn test_field_names_respect_flags_and_prefix() {
        let mut column = RequestColumn::new("name");
        assert_eq!(column.search_field_name("f_"), None);
        assert_eq!(column.sort_field_name("o_"), None);

        column.search(SearchOperator::Equal).sort_by_desc();
        assert_eq!(column.search_field_name("f_").as_deref(), Some("f_name"));
        assert_eq!(column.sort_field_name("").as_deref(), Some("name"));
        assert_eq!(column.direction(), SortDirection::Desc);
    }

    #[test]
    fn test_between_values() {
        let mut column = RequestColumn::new("price");
        column.search(SearchOperator::Between);

        assert!(!column.match_criteria("10, 20").is_null());
        assert!(column.match_criteria("10").is_null());
        assert!(column.match_criteria("10,").is_null());
        assert!(column.match_criteria("1,2,3").is_null());
    }

    #[test]
    fn test_custom_without_criterion_is_null() {
        let mut column = RequestColumn::new("tag");
        column.search(SearchOperator::Custom);
        assert!(column.match_criteria("x").is_null());

        column.search_by_criteria(FieldIsValue::new("tag_id", 9));
        assert!(!column.match_criteria("x").is_null());
    }

    #[tokio::test]
    async fn test_criteria_list_order() {
        let config = RepositoryConfig::default();
        let mut request = RequestCriteria::from_params(
            params(&[("name", "ann"), ("price", "desc"), ("status", "1")]),
            &config,
        );
        request.global_criteria(FieldIsValue::new("tenant", 7));
        request.column("name").search(SearchOperator::Like);
        request.column("price").sort_by_asc();
        request.column("status").search(SearchOperator::Equal).sort_by_desc();
        request.column("ignored");
        request.disable_pagination();

        let context = StaticContext::new("products");
        let query = request.apply(context.query(), &context).await.unwrap();

        let expected = context
            .query()
            .where_eq("tenant", 7)
            .where_op("name", Operator::Like, "%ann%")
            .order_by("price", SortDirection::Desc)
            .where_eq("status", "1")
            .order_by("status", SortDirection::Desc);
        assert_eq!(query, expected);
        assert_eq!(query.limit(), None);
    }

    #[tokio::test]
    async fn test_invalid_direction_keeps_default() {
        let config = RepositoryConfig::default();
        let mut request =
            RequestCriteria::from_params(params(&[("price", "sideways")]), &config);
        request.column("price").sort_by_desc();

        let list = request.search_criteria_list();
        let context = StaticContext::new("products");
        let query = list[0].apply(context.query(), &context).await.unwrap();
        assert_eq!(query.orders()[0].direction, SortDirection::Desc);
    }

    #[test]
    fn test_sort_only_when_requested() {
        let mut config = RepositoryConfig::default();
        config.request.sort_policy = SortPolicy::WhenRequested;

        let mut request = RequestCriteria::from_params(RequestParams::new(), &config);
        request.column("price").sort_by_asc();
        assert!(request.search_criteria_list().is_empty());

        let mut request = RequestCriteria::from_params(params(&[("price", "desc")]), &config);
        request.column("price").sort_by_asc();
        assert_eq!(request.search_criteria_list().len(), 1);
    }

    #[tokio::test]
    async fn test_pagination_counts_before_slicing() {
        let config = RepositoryConfig::default();
        let mut request = RequestCriteria::from_params(
            params(&[("pageIndex", "2"), ("pageSize", "10"), ("status", "1")]),
            &config,
        );
        request.column("status").search(SearchOperator::Equal);

        let mut context = StaticContext::new("products");
        context.total = 25;
        let query = request.apply(context.query(), &context).await.unwrap();

        assert_eq!(query.offset(), Some(10));
        assert_eq!(query.limit(), Some(10));
        assert!(matches!(query.wheres()[0].condition, Condition::Compare { .. }));
        assert_eq!(
            request.get_paginate(),
            PaginationInfo {
                page_size: 10,
                page_index: 2,
                total: 25
            }
        );
        assert_eq!(
            request.paginate_json(),
            serde_json::json!({"pageSize": 10, "pageIndex": 2, "total": 25})
        );
    }

    #[test]
    fn test_columns_and_query_fields() {
        let config = RepositoryConfig::default();
        let mut request = RequestCriteria::from_params(params(&[("name", "x")]), &config);
        request.column("name").search(SearchOperator::Like);
        request.column("name").sort_by_asc();

        assert_eq!(
            request.columns(&["id", "created_at"]),
            vec!["name", "id", "created_at"]
        );
        assert_eq!(
            request.columns(&RequestCriteria::DEFAULT_COLUMNS),
            vec!["name", "id", "created_at", "updated_at"]
        );
        assert!(request.has_query_field("name"));
        assert_eq!(request.query_field("missing"), None);

        // redeclaring replaced the searchable column
        let column = request.declared_columns().next().unwrap().clone();
        assert!(!column.is_searchable());
        assert_eq!(request.search_field_value(&column, "-"), "-");
    }
}

//! Composable query criteria
//!
//! A [`Criterion`] transforms a [`Query`] into another one. Repositories keep
//! criteria in keyed pools (see [`registry`]) and fold them over a fresh query
//! before every read.
//!
//! # Example
//! ```rust,ignore
//! repository.push_criteria(IsActive::new("active"), Some(CriteriaKey::Active.as_str()));
//! repository.push_once_criteria(OrderBy::desc("created_at"), Some(CriteriaKey::Order.as_str()));
//! let latest = repository.all(&["*"]).await?;
//! ```

pub mod common;
pub mod compose;
pub mod field;
pub mod pool;
pub mod registry;
pub mod request;

use crate::config::RepositoryConfig;
use crate::core::error::RepoResult;
use crate::core::model::ModelDescriptor;
use crate::core::query::Query;
use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;

pub use common::{
    Custom, Has, OrWhereHas, OrWhereRaw, Scope, ScopeSet, Scopes, UseCache, WhereHas,
    WhereHasTranslation, WhereRaw, WithRelations,
};
pub use compose::ComposeCriteria;
pub use field::{
    Between, FieldIsValue, FieldLikeValue, FieldOrLikeValue, GreaterThan, GreaterThanOrEqual,
    IsActive, LessThan, LessThanOrEqual, NotBetween, NotEqual, OrderBy, WhereIn, WhereNull,
};
pub use pool::{CriteriaPool, PoolKey};
pub use registry::{CriteriaRegistry, Resolution};
pub use request::{PaginationInfo, RequestColumn, RequestCriteria, RequestParams, SearchOperator};

/// What a criterion may see of the repository it is applied through
#[async_trait]
pub trait RepositoryContext: Send + Sync {
    fn descriptor(&self) -> &ModelDescriptor;

    fn config(&self) -> &RepositoryConfig;

    /// Count the rows matched by `query` without going through the criteria pools
    async fn count_query(&self, query: &Query) -> RepoResult<u64>;
}

/// A single query transformation rule
///
/// Applying a criterion must not touch the repository's criteria state; the
/// result depends only on the query and the context.
#[async_trait]
pub trait Criterion: Send + Sync + fmt::Debug {
    async fn apply(&self, query: Query, repository: &dyn RepositoryContext) -> RepoResult<Query>;

    /// Whether this is the identity criterion
    fn is_null(&self) -> bool {
        false
    }
}

/// Shared handle to a criterion held by a pool
pub type CriterionRef = Arc<dyn Criterion>;

#[async_trait]
impl<C: Criterion + ?Sized> Criterion for Arc<C> {
    async fn apply(&self, query: Query, repository: &dyn RepositoryContext) -> RepoResult<Query> {
        (**self).apply(query, repository).await
    }

    fn is_null(&self) -> bool {
        (**self).is_null()
    }
}

/// Identity criterion, also used to suppress a keyed criterion for one query
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NullCriterion;

impl NullCriterion {
    pub fn shared() -> CriterionRef {
        Arc::new(NullCriterion)
    }
}

#[async_trait]
impl Criterion for NullCriterion {
    async fn apply(&self, query: Query, _repository: &dyn RepositoryContext) -> RepoResult<Query> {
        Ok(query)
    }

    fn is_null(&self) -> bool {
        true
    }
}

/// Well-known pool keys used by the repositories
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CriteriaKey {
    Active,
    Cache,
    Order,
    Scope,
    With,
}

impl CriteriaKey {
    pub fn as_str(&self) -> &'static str {
        match self {
            CriteriaKey::Active => "active",
            CriteriaKey::Cache => "cache",
            CriteriaKey::Order => "order",
            CriteriaKey::Scope => "scope",
            CriteriaKey::With => "with",
        }
    }
}

impl fmt::Display for CriteriaKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use crate::core::query::Query;

    /// Context over a bare descriptor; counts nothing
    pub(crate) struct StaticContext {
        pub descriptor: ModelDescriptor,
        pub config: RepositoryConfig,
        pub total: u64,
    }

    impl StaticContext {
        pub(crate) fn new(table: &str) -> Self {
            Self {
                descriptor: ModelDescriptor::new(table),
                config: RepositoryConfig::default(),
                total: 0,
            }
        }

        pub(crate) fn query(&self) -> Query {
            self.descriptor.new_query()
        }
    }

    #[async_trait]
    impl RepositoryContext for StaticContext {
        fn descriptor(&self) -> &ModelDescriptor {
            &self.descriptor
        }

        fn config(&self) -> &RepositoryConfig {
            &self.config
        }

        async fn count_query(&self, _query: &Query) -> RepoResult<u64> {
            Ok(self.total)
        }
    }
}

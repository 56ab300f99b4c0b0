//! # Repo Criteria
//!
//! A repository-pattern layer for Rust services: composable query criteria,
//! a request-to-criteria column mapper and transactional service pipelines.
//!
//! ## Features
//!
//! - **Keyed Criteria Pools**: standing and one-shot criteria, overridable by key
//! - **Query Reuse**: the built query is reused until the criteria change
//! - **Request Mapping**: search, sort and page parameters turned into criteria
//! - **Extended Repositories**: active flag, result cache and scopes driven by settings
//! - **Service Pipelines**: ordered stages run inside one transaction
//! - **Configuration-Based**: page sizes, parameter names and cache TTL from YAML
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use repo::prelude::*;
//!
//! #[derive(Debug, Clone, Serialize, Deserialize)]
//! struct Product {
//!     id: i64,
//!     name: String,
//!     price: f64,
//!     active: bool,
//! }
//!
//! impl Model for Product {
//!     fn describe() -> ModelDescriptor {
//!         ModelDescriptor::new("products").per_page(20)
//!     }
//! }
//!
//! let store = Arc::new(InMemoryStore::new());
//! let mut products = Repository::<Product>::new(store, RepositoryConfig::default())?;
//!
//! products.push_criteria(IsActive::new("active"), Some("active"));
//! products.push_once_criteria(OrderBy::desc("price"), None);
//! let page = products.paginate(None, &["*"], Some(1)).await?;
//! ```

pub mod config;
pub mod core;
pub mod criteria;
#[cfg(feature = "http")]
pub mod http;
pub mod repository;
pub mod service;
pub mod storage;

/// Re-exports of commonly used types and traits
pub mod prelude {
    // === Core ===
    pub use crate::core::{
        Aggregate, Boolean, Condition, Model, ModelDescriptor, Operator, PaginationMeta,
        Paginator, PipelineError, Query, Record, RelationDef, RepoError, RepoResult,
        SimplePaginator, SortDirection, Store, StorageError, Transactional, WhereCondition,
    };

    // === Criteria ===
    pub use crate::criteria::{
        Between, ComposeCriteria, CriteriaKey, CriteriaPool, Criterion, CriterionRef, Custom,
        FieldIsValue, FieldLikeValue, FieldOrLikeValue, GreaterThan, GreaterThanOrEqual, Has,
        IsActive, LessThan, LessThanOrEqual, NotBetween, NotEqual, NullCriterion, OrWhereHas,
        OrWhereRaw, OrderBy, RepositoryContext, RequestColumn, RequestCriteria, RequestParams,
        Scope, ScopeSet, Scopes, SearchOperator, UseCache, WhereHas, WhereHasTranslation, WhereIn,
        WhereNull, WhereRaw, WithRelations,
    };

    // === Repositories ===
    pub use crate::repository::{ExtendedRepository, ExtendedSettings, Repository};

    // === Pipelines ===
    pub use crate::service::{Input, Service, ServiceData, ServiceRunner, Stage, StageRegistry};

    // === Storage ===
    pub use crate::storage::InMemoryStore;

    // === Config ===
    pub use crate::config::{RepositoryConfig, SortPolicy};

    // === External dependencies ===
    pub use async_trait::async_trait;
    pub use serde::{Deserialize, Serialize};
    pub use serde_json::{Value, json};
    pub use std::sync::Arc;
    pub use uuid::Uuid;
}

//! Core module containing the query handle, model and store abstractions

pub mod error;
pub mod model;
pub mod query;
pub mod store;

pub use error::{ErrorResponse, PipelineError, RepoError, RepoResult, StorageError};
pub use model::{Model, ModelDescriptor, RelationDef, ScopeFn};
pub use query::{
    Boolean, Condition, Operator, PaginationMeta, Paginator, Query, SimplePaginator,
    SortDirection, WhereCondition,
};
pub use store::{Aggregate, Record, Store, Transactional};

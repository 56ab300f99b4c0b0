//! Model trait and descriptors binding an entity type to its table
//!
//! A model describes itself once through [`Model::describe`]. The descriptor
//! carries everything the query layer needs: table and key names, the
//! default page size, relation definitions and named scopes.

use crate::core::error::{RepoError, RepoResult};
use crate::core::query::Query;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Page size used when a model declares none
pub const FALLBACK_PER_PAGE: usize = 50;

/// A named, parameterized query modifier registered on a model
pub type ScopeFn = Arc<dyn Fn(Query, &[Value]) -> RepoResult<Query> + Send + Sync>;

/// Base trait for all entity types managed by a repository.
///
/// Models are plain serde types; rows travel through the store as JSON
/// objects and are converted on the way in and out.
pub trait Model: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    /// Describe the table, key, relations and scopes of this model
    fn describe() -> ModelDescriptor;
}

/// How a related table joins onto the parent row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelationDef {
    /// Relation name used by `has`, `where_has` and `with`
    pub name: String,

    /// Table holding the related rows
    pub table: String,

    /// Column on the related row
    pub related_column: String,

    /// Column on the parent row that `related_column` must equal
    pub parent_column: String,

    /// Whether eager loading yields a list or a single row
    pub many: bool,
}

impl RelationDef {
    /// Parent has many related rows pointing back through `foreign_key`
    pub fn has_many(name: &str, table: &str, foreign_key: &str, local_key: &str) -> Self {
        Self {
            name: name.to_string(),
            table: table.to_string(),
            related_column: foreign_key.to_string(),
            parent_column: local_key.to_string(),
            many: true,
        }
    }

    /// Parent has at most one related row pointing back through `foreign_key`
    pub fn has_one(name: &str, table: &str, foreign_key: &str, local_key: &str) -> Self {
        Self {
            many: false,
            ..Self::has_many(name, table, foreign_key, local_key)
        }
    }

    /// Parent holds `foreign_key`, which references `owner_key` on the related table
    pub fn belongs_to(name: &str, table: &str, foreign_key: &str, owner_key: &str) -> Self {
        Self {
            name: name.to_string(),
            table: table.to_string(),
            related_column: owner_key.to_string(),
            parent_column: foreign_key.to_string(),
            many: false,
        }
    }
}

/// Static description of a model
#[derive(Clone)]
pub struct ModelDescriptor {
    table: String,
    key_name: String,
    per_page: usize,
    relations: Vec<RelationDef>,
    scopes: HashMap<String, ScopeFn>,
}

impl ModelDescriptor {
    pub fn new(table: &str) -> Self {
        Self {
            table: table.to_string(),
            key_name: "id".to_string(),
            per_page: 15,
            relations: Vec::new(),
            scopes: HashMap::new(),
        }
    }

    pub fn key(mut self, key_name: &str) -> Self {
        self.key_name = key_name.to_string();
        self
    }

    pub fn per_page(mut self, per_page: usize) -> Self {
        self.per_page = per_page;
        self
    }

    pub fn relation(mut self, relation: RelationDef) -> Self {
        self.relations.retain(|r| r.name != relation.name);
        self.relations.push(relation);
        self
    }

    /// Register a named scope
    ///
    /// ```rust,ignore
    /// ModelDescriptor::new("products")
    ///     .scope("cheaper_than", |q, params| {
    ///         let max = params.first().cloned().unwrap_or(Value::Null);
    ///         Ok(q.where_op("price", Operator::Lt, max))
    ///     });
    /// ```
    pub fn scope<F>(mut self, name: &str, scope: F) -> Self
    where
        F: Fn(Query, &[Value]) -> RepoResult<Query> + Send + Sync + 'static,
    {
        self.scopes.insert(name.to_string(), Arc::new(scope));
        self
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn key_name(&self) -> &str {
        &self.key_name
    }

    /// The model's own default page size, or the fallback when it declares 0
    pub fn default_per_page(&self) -> usize {
        if self.per_page == 0 {
            FALLBACK_PER_PAGE
        } else {
            self.per_page
        }
    }

    pub fn relations(&self) -> &[RelationDef] {
        &self.relations
    }

    pub fn find_scope(&self, name: &str) -> Option<&ScopeFn> {
        self.scopes.get(name)
    }

    /// Check that the descriptor can back a query
    pub fn validate(&self, model: &str) -> RepoResult<()> {
        if self.table.trim().is_empty() {
            return Err(RepoError::configuration(model, "table name is empty"));
        }
        if self.key_name.trim().is_empty() {
            return Err(RepoError::configuration(model, "primary key name is empty"));
        }
        Ok(())
    }

    /// A bare query over this model's table
    pub fn new_query(&self) -> Query {
        Query::table(&self.table, &self.key_name).with_relation_defs(self.relations.clone())
    }
}

impl fmt::Debug for ModelDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut scopes: Vec<&String> = self.scopes.keys().collect();
        scopes.sort();
        f.debug_struct("ModelDescriptor")
            .field("table", &self.table)
            .field("key_name", &self.key_name)
            .field("per_page", &self.per_page)
            .field("relations", &self.relations)
            .field("scopes", &scopes)
            .finish()
    }
}

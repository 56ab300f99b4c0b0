//! Shared fixtures for repository, criteria and pipeline integration tests
//!
//! Provides a `Product` model with `reviews` and `translations` relations and
//! two scopes, a `Review` model, seed helpers and a `CountingStore` that
//! forwards to an `InMemoryStore` while counting calls per operation.
//!
//! # Usage
//!
//! From any integration test file in `tests/`:
//! ```rust,ignore
//! mod repository_harness;
//! use repository_harness::*;
//! ```

#![allow(dead_code)]

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use repo::config::RepositoryConfig;
use repo::core::{
    Aggregate, Model, ModelDescriptor, Operator, Query, Record, RelationDef, RepoResult, Store,
    Transactional,
};
use repo::repository::Repository;
use repo::storage::InMemoryStore;

pub const CATEGORIES: [&str; 3] = ["books", "games", "tools"];

// ---------------------------------------------------------------------------
// Models
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Product {
    #[serde(default)]
    pub id: i64,
    pub name: String,
    pub category: String,
    pub price: f64,
    #[serde(default)]
    pub stock: i64,
    #[serde(default)]
    pub active: bool,
}

impl Model for Product {
    fn describe() -> ModelDescriptor {
        ModelDescriptor::new("products")
            .per_page(15)
            .relation(RelationDef::has_many("reviews", "reviews", "product_id", "id"))
            .relation(RelationDef::has_many(
                "translations",
                "product_translations",
                "product_id",
                "id",
            ))
            .scope("category", |query, params| {
                let category = params.first().cloned().unwrap_or(Value::Null);
                Ok(query.where_eq("category", category))
            })
            .scope("cheaper_than", |query, params| {
                let max = params.first().cloned().unwrap_or(Value::Null);
                Ok(query.where_op("price", Operator::Lt, max))
            })
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Review {
    #[serde(default)]
    pub id: i64,
    pub product_id: i64,
    pub rating: i64,
    pub body: String,
}

impl Model for Review {
    fn describe() -> ModelDescriptor {
        ModelDescriptor::new("reviews").relation(RelationDef::belongs_to(
            "product",
            "products",
            "product_id",
            "id",
        ))
    }
}

// ---------------------------------------------------------------------------
// Seeding
// ---------------------------------------------------------------------------

pub fn record(value: Value) -> Record {
    match value {
        Value::Object(map) => map,
        other => panic!("expected an object, got {}", other),
    }
}

/// Seed `count` products with ids 1..=count
///
/// - `name`: "Product {i}"
/// - `category`: cycles through `CATEGORIES`
/// - `price`: `i * 2.0`
/// - `stock`: 10
/// - `active`: false for every fifth product
pub fn seed_products(store: &InMemoryStore, count: i64) {
    let rows = (1..=count)
        .map(|i| {
            record(json!({
                "name": format!("Product {}", i),
                "category": CATEGORIES[((i - 1) % 3) as usize],
                "price": i as f64 * 2.0,
                "stock": 10,
                "active": i % 5 != 0,
            }))
        })
        .collect();
    store
        .seed("products", "id", rows)
        .expect("failed to seed products");
}

/// Two reviews for product 1, one for product 2
pub fn seed_reviews(store: &InMemoryStore) {
    let rows = vec![
        record(json!({"product_id": 1, "rating": 5, "body": "great"})),
        record(json!({"product_id": 1, "rating": 2, "body": "meh"})),
        record(json!({"product_id": 2, "rating": 4, "body": "good"})),
    ];
    store
        .seed("reviews", "id", rows)
        .expect("failed to seed reviews");
}

pub fn seed_translations(store: &InMemoryStore) {
    let rows = vec![
        record(json!({"product_id": 1, "locale": "en", "title": "Red Chair"})),
        record(json!({"product_id": 1, "locale": "fr", "title": "Chaise Rouge"})),
        record(json!({"product_id": 2, "locale": "en", "title": "Blue Table"})),
    ];
    store
        .seed("product_translations", "id", rows)
        .expect("failed to seed translations");
}

pub fn seeded_store(count: i64) -> InMemoryStore {
    let store = InMemoryStore::new();
    seed_products(&store, count);
    seed_reviews(&store);
    seed_translations(&store);
    store
}

pub fn product_repository(store: &InMemoryStore) -> Repository<Product> {
    Repository::new(Arc::new(store.clone()), RepositoryConfig::default())
        .expect("products repository")
}

pub fn ids(products: &[Product]) -> Vec<i64> {
    products.iter().map(|p| p.id).collect()
}

// ---------------------------------------------------------------------------
// CountingStore
// ---------------------------------------------------------------------------

/// Store wrapper counting calls per operation and forwarding to a real backend
#[derive(Clone, Default)]
pub struct CountingStore {
    pub inner: InMemoryStore,
    pub selects: Arc<AtomicUsize>,
    pub counts: Arc<AtomicUsize>,
    pub updates: Arc<AtomicUsize>,
    pub deletes: Arc<AtomicUsize>,
}

impl CountingStore {
    pub fn new(inner: InMemoryStore) -> Self {
        Self {
            inner,
            ..Self::default()
        }
    }

    pub fn selects(&self) -> usize {
        self.selects.load(Ordering::SeqCst)
    }

    pub fn counts(&self) -> usize {
        self.counts.load(Ordering::SeqCst)
    }

    pub fn updates(&self) -> usize {
        self.updates.load(Ordering::SeqCst)
    }

    pub fn deletes(&self) -> usize {
        self.deletes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Store for CountingStore {
    async fn select(&self, query: &Query, columns: &[&str]) -> RepoResult<Vec<Record>> {
        self.selects.fetch_add(1, Ordering::SeqCst);
        self.inner.select(query, columns).await
    }

    async fn count(&self, query: &Query) -> RepoResult<u64> {
        self.counts.fetch_add(1, Ordering::SeqCst);
        self.inner.count(query).await
    }

    async fn aggregate(
        &self,
        query: &Query,
        function: Aggregate,
        column: &str,
    ) -> RepoResult<Value> {
        self.inner.aggregate(query, function, column).await
    }

    async fn insert(
        &self,
        table: &str,
        key_name: &str,
        rows: Vec<Record>,
    ) -> RepoResult<Vec<Value>> {
        self.inner.insert(table, key_name, rows).await
    }

    async fn update(&self, query: &Query, data: &Record) -> RepoResult<u64> {
        self.updates.fetch_add(1, Ordering::SeqCst);
        self.inner.update(query, data).await
    }

    async fn delete(&self, query: &Query) -> RepoResult<u64> {
        self.deletes.fetch_add(1, Ordering::SeqCst);
        self.inner.delete(query).await
    }

    async fn increment(&self, query: &Query, column: &str, amount: f64) -> RepoResult<u64> {
        self.updates.fetch_add(1, Ordering::SeqCst);
        self.inner.increment(query, column, amount).await
    }
}

#[async_trait]
impl Transactional for CountingStore {
    async fn begin(&self) -> RepoResult<()> {
        self.inner.begin().await
    }

    async fn commit(&self) -> RepoResult<()> {
        self.inner.commit().await
    }

    async fn rollback(&self) -> RepoResult<()> {
        self.inner.rollback().await
    }
}

//! In-memory implementation of Store for testing and development
//!
//! Evaluates every [`Query`] clause except raw SQL fragments, which need a
//! real database and are rejected with [`StorageError::Unsupported`].
//! Comparisons are loose the way SQL drivers are: a numeric string equals
//! the number it spells, and `LIKE` is case-insensitive.

use crate::core::error::{RepoResult, StorageError};
use crate::core::model::RelationDef;
use crate::core::query::{Boolean, Condition, Operator, Query, SortDirection, WhereClause};
use crate::core::store::{Aggregate, Record, Store, Transactional};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use regex::RegexBuilder;
use serde_json::Value;
use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use uuid::Uuid;

const BACKEND: &str = "InMemoryStore";

#[derive(Debug, Clone, Default)]
struct Table {
    rows: Vec<Record>,
    next_id: i64,
}

#[derive(Debug)]
struct CacheEntry {
    expires_at: DateTime<Utc>,
    rows: Vec<Record>,
}

#[derive(Debug)]
struct Transaction {
    id: Uuid,
    snapshot: HashMap<String, Table>,
}

#[derive(Debug, Default)]
struct State {
    tables: HashMap<String, Table>,
    cache: HashMap<String, CacheEntry>,
    transaction: Option<Transaction>,
}

/// In-memory store implementation
///
/// Useful for testing and development. Uses RwLock for thread-safe access;
/// clones share the same tables.
#[derive(Debug, Clone, Default)]
pub struct InMemoryStore {
    state: Arc<RwLock<State>>,
}

impl InMemoryStore {
    /// Create a new, empty in-memory store
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert fixture rows without going through the async API
    pub fn seed(&self, table: &str, key_name: &str, rows: Vec<Record>) -> RepoResult<Vec<Value>> {
        let mut state = self.write()?;
        Ok(insert_rows(&mut state, table, key_name, rows))
    }

    /// Snapshot of every row currently stored in `table`
    pub fn rows(&self, table: &str) -> RepoResult<Vec<Record>> {
        let state = self.read()?;
        Ok(state
            .tables
            .get(table)
            .map(|t| t.rows.clone())
            .unwrap_or_default())
    }

    /// Id of the open transaction, if any
    pub fn transaction_id(&self) -> RepoResult<Option<Uuid>> {
        Ok(self.read()?.transaction.as_ref().map(|t| t.id))
    }

    fn read(&self) -> RepoResult<RwLockReadGuard<'_, State>> {
        self.state.read().map_err(|e| {
            StorageError::Lock {
                kind: "read",
                message: e.to_string(),
            }
            .into()
        })
    }

    fn write(&self) -> RepoResult<RwLockWriteGuard<'_, State>> {
        self.state.write().map_err(|e| {
            StorageError::Lock {
                kind: "write",
                message: e.to_string(),
            }
            .into()
        })
    }
}

#[async_trait]
impl Store for InMemoryStore {
    async fn select(&self, query: &Query, columns: &[&str]) -> RepoResult<Vec<Record>> {
        let Some(ttl) = query.cache_ttl() else {
            let state = self.read()?;
            return select_rows(&state, query, columns);
        };

        let cache_key = serde_json::to_string(&(query, columns))?;
        let mut state = self.write()?;
        let now = Utc::now();
        if let Some(entry) = state.cache.get(&cache_key)
            && entry.expires_at > now
        {
            return Ok(entry.rows.clone());
        }

        let rows = select_rows(&state, query, columns)?;
        let ttl = chrono::Duration::from_std(ttl).unwrap_or(chrono::Duration::MAX);
        state.cache.insert(
            cache_key,
            CacheEntry {
                expires_at: now.checked_add_signed(ttl).unwrap_or(DateTime::<Utc>::MAX_UTC),
                rows: rows.clone(),
            },
        );
        Ok(rows)
    }

    async fn count(&self, query: &Query) -> RepoResult<u64> {
        let state = self.read()?;
        Ok(matching_indices(&state, query)?.len() as u64)
    }

    async fn aggregate(
        &self,
        query: &Query,
        function: Aggregate,
        column: &str,
    ) -> RepoResult<Value> {
        let state = self.read()?;
        let values: Vec<&Value> = matching_rows(&state, query)?
            .into_iter()
            .filter_map(|row| row.get(column))
            .filter(|v| !v.is_null())
            .collect();

        Ok(match function {
            Aggregate::Min => values
                .into_iter()
                .min_by(|a, b| sort_order(a, b))
                .cloned()
                .unwrap_or(Value::Null),
            Aggregate::Max => values
                .into_iter()
                .max_by(|a, b| sort_order(a, b))
                .cloned()
                .unwrap_or(Value::Null),
            Aggregate::Sum => {
                let ints: Option<Vec<i64>> = values.iter().map(|v| v.as_i64()).collect();
                match ints {
                    Some(ints) => match ints.iter().try_fold(0i64, |acc, i| acc.checked_add(*i)) {
                        Some(sum) => Value::from(sum),
                        None => Value::from(ints.iter().map(|i| *i as f64).sum::<f64>()),
                    },
                    None => Value::from(values.iter().filter_map(|v| as_number(v)).sum::<f64>()),
                }
            }
            Aggregate::Avg => {
                let numbers: Vec<f64> = values.iter().filter_map(|v| as_number(v)).collect();
                if numbers.is_empty() {
                    Value::Null
                } else {
                    Value::from(numbers.iter().sum::<f64>() / numbers.len() as f64)
                }
            }
        })
    }

    async fn insert(
        &self,
        table: &str,
        key_name: &str,
        rows: Vec<Record>,
    ) -> RepoResult<Vec<Value>> {
        let mut state = self.write()?;
        Ok(insert_rows(&mut state, table, key_name, rows))
    }

    async fn update(&self, query: &Query, data: &Record) -> RepoResult<u64> {
        let mut state = self.write()?;
        let indices = matching_indices(&state, query)?;
        state.cache.clear();

        if let Some(table) = state.tables.get_mut(query.table_name()) {
            for index in &indices {
                let row = &mut table.rows[*index];
                for (column, value) in data {
                    row.insert(column.clone(), value.clone());
                }
            }
        }
        Ok(indices.len() as u64)
    }

    async fn delete(&self, query: &Query) -> RepoResult<u64> {
        let mut state = self.write()?;
        let indices: HashSet<usize> = matching_indices(&state, query)?.into_iter().collect();
        state.cache.clear();

        if let Some(table) = state.tables.get_mut(query.table_name()) {
            let mut index = 0;
            table.rows.retain(|_| {
                let keep = !indices.contains(&index);
                index += 1;
                keep
            });
        }
        Ok(indices.len() as u64)
    }

    async fn increment(&self, query: &Query, column: &str, amount: f64) -> RepoResult<u64> {
        let mut state = self.write()?;
        let indices = matching_indices(&state, query)?;
        let Some(table) = state.tables.get(query.table_name()) else {
            return Ok(0);
        };

        let mut updates = Vec::with_capacity(indices.len());
        for index in &indices {
            let current = table.rows[*index]
                .get(column)
                .cloned()
                .unwrap_or(Value::from(0));
            updates.push((*index, incremented(&current, column, amount)?));
        }

        state.cache.clear();
        if let Some(table) = state.tables.get_mut(query.table_name()) {
            for (index, next) in updates {
                table.rows[index].insert(column.to_string(), next);
            }
        }
        Ok(indices.len() as u64)
    }
}

fn incremented(current: &Value, column: &str, amount: f64) -> RepoResult<Value> {
    let whole = current
        .as_i64()
        .filter(|_| amount.fract() == 0.0)
        .and_then(|i| i.checked_add(amount as i64));
    if let Some(next) = whole {
        return Ok(Value::from(next));
    }
    let base = as_number(current).ok_or_else(|| StorageError::InvalidValue {
        column: column.to_string(),
        message: format!("cannot increment non-numeric value {}", current),
    })?;
    Ok(Value::from(base + amount))
}

#[async_trait]
impl Transactional for InMemoryStore {
    async fn begin(&self) -> RepoResult<()> {
        let mut state = self.write()?;
        if state.transaction.is_some() {
            return Err(StorageError::TransactionActive.into());
        }
        let id = Uuid::new_v4();
        let snapshot = state.tables.clone();
        state.transaction = Some(Transaction { id, snapshot });
        tracing::debug!(transaction = %id, "transaction started");
        Ok(())
    }

    async fn commit(&self) -> RepoResult<()> {
        let mut state = self.write()?;
        let transaction = state.transaction.take().ok_or(StorageError::NoTransaction)?;
        tracing::debug!(transaction = %transaction.id, "transaction committed");
        Ok(())
    }

    async fn rollback(&self) -> RepoResult<()> {
        let mut state = self.write()?;
        let transaction = state.transaction.take().ok_or(StorageError::NoTransaction)?;
        state.tables = transaction.snapshot;
        state.cache.clear();
        tracing::debug!(transaction = %transaction.id, "transaction rolled back");
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Query evaluation
// ---------------------------------------------------------------------------

fn insert_rows(state: &mut State, table: &str, key_name: &str, rows: Vec<Record>) -> Vec<Value> {
    state.cache.clear();
    let table = state.tables.entry(table.to_string()).or_default();
    let mut keys = Vec::with_capacity(rows.len());

    for mut row in rows {
        let key = match row.get(key_name) {
            Some(Value::Null) | None => {
                table.next_id += 1;
                let key = Value::from(table.next_id);
                row.insert(key_name.to_string(), key.clone());
                key
            }
            Some(key) => {
                if let Some(id) = key.as_i64() {
                    table.next_id = table.next_id.max(id);
                }
                key.clone()
            }
        };
        table.rows.push(row);
        keys.push(key);
    }
    keys
}

fn select_rows(state: &State, query: &Query, columns: &[&str]) -> RepoResult<Vec<Record>> {
    let mut rows: Vec<Record> = matching_rows(state, query)?.into_iter().cloned().collect();

    if !query.orders().is_empty() {
        rows.sort_by(|a, b| {
            for order in query.orders() {
                let left = a.get(&order.column).unwrap_or(&Value::Null);
                let right = b.get(&order.column).unwrap_or(&Value::Null);
                let ordering = match order.direction {
                    SortDirection::Asc => sort_order(left, right),
                    SortDirection::Desc => sort_order(right, left),
                };
                if ordering != Ordering::Equal {
                    return ordering;
                }
            }
            Ordering::Equal
        });
    }

    let rows = rows
        .into_iter()
        .skip(query.offset().unwrap_or(0))
        .take(query.limit().unwrap_or(usize::MAX));

    let mut result = Vec::new();
    for mut row in rows {
        for name in query.eager() {
            let relation = relation_for(query, name)?;
            let related: Vec<Value> = related_rows(state, relation, &row, &[])?
                .into_iter()
                .map(|r| Value::Object(r.clone()))
                .collect();
            let loaded = if relation.many {
                Value::Array(related)
            } else {
                related.into_iter().next().unwrap_or(Value::Null)
            };
            row.insert(name.clone(), loaded);
        }
        result.push(project(row, columns, query.eager()));
    }
    Ok(result)
}

fn project(row: Record, columns: &[&str], eager: &[String]) -> Record {
    if columns.is_empty() || columns.contains(&"*") {
        return row;
    }
    row.into_iter()
        .filter(|(key, _)| columns.contains(&key.as_str()) || eager.contains(key))
        .collect()
}

fn matching_indices(state: &State, query: &Query) -> RepoResult<Vec<usize>> {
    let Some(table) = state.tables.get(query.table_name()) else {
        return Ok(Vec::new());
    };
    let mut indices = Vec::new();
    for (index, row) in table.rows.iter().enumerate() {
        if matches_all(state, query, row, query.wheres())? {
            indices.push(index);
        }
    }
    Ok(indices)
}

fn matching_rows<'a>(state: &'a State, query: &Query) -> RepoResult<Vec<&'a Record>> {
    let indices = matching_indices(state, query)?;
    let Some(table) = state.tables.get(query.table_name()) else {
        return Ok(Vec::new());
    };
    Ok(indices.into_iter().map(|i| &table.rows[i]).collect())
}

/// AND binds tighter than OR: the clause list is a disjunction of AND-groups
fn matches_all(
    state: &State,
    query: &Query,
    row: &Record,
    clauses: &[WhereClause],
) -> RepoResult<bool> {
    if clauses.is_empty() {
        return Ok(true);
    }

    let mut any_group = false;
    let mut group = true;
    for (position, clause) in clauses.iter().enumerate() {
        if position > 0 && clause.boolean == Boolean::Or {
            any_group |= group;
            group = true;
        }
        let matched = matches_condition(state, query, row, &clause.condition)?;
        group = group && matched;
    }
    Ok(any_group || group)
}

fn matches_condition(
    state: &State,
    query: &Query,
    row: &Record,
    condition: &Condition,
) -> RepoResult<bool> {
    let field = |column: &str| row.get(column).unwrap_or(&Value::Null);

    Ok(match condition {
        Condition::Compare {
            column,
            operator,
            value,
        } => compare(field(column), *operator, value),
        Condition::In {
            column,
            values,
            negated,
        } => {
            let left = field(column);
            let found = !left.is_null() && values.iter().any(|v| loose_eq(left, v));
            found != *negated
        }
        Condition::Between {
            column,
            low,
            high,
            negated,
        } => {
            let left = field(column);
            let inside = matches!(
                compare_values(left, low),
                Some(Ordering::Greater | Ordering::Equal)
            ) && matches!(
                compare_values(left, high),
                Some(Ordering::Less | Ordering::Equal)
            );
            !left.is_null() && inside != *negated
        }
        Condition::Null { columns, negated } => columns
            .iter()
            .all(|column| field(column).is_null() != *negated),
        Condition::Raw { .. } => {
            return Err(StorageError::Unsupported {
                backend: BACKEND,
                feature: "raw SQL fragments".to_string(),
            }
            .into());
        }
        Condition::Nested { clauses } => matches_all(state, query, row, clauses)?,
        Condition::Has {
            relation,
            operator,
            count,
            constraint,
        } => {
            let relation = relation_for(query, relation)?;
            let related = related_rows(state, relation, row, constraint)?;
            compare(&Value::from(related.len() as u64), *operator, &Value::from(*count))
        }
    })
}

fn relation_for<'q>(query: &'q Query, name: &str) -> RepoResult<&'q RelationDef> {
    query.relation(name).ok_or_else(|| {
        StorageError::UnknownRelation {
            table: query.table_name().to_string(),
            relation: name.to_string(),
        }
        .into()
    })
}

fn related_rows<'a>(
    state: &'a State,
    relation: &RelationDef,
    parent: &Record,
    constraint: &[WhereClause],
) -> RepoResult<Vec<&'a Record>> {
    let Some(table) = state.tables.get(&relation.table) else {
        return Ok(Vec::new());
    };
    let parent_value = parent.get(&relation.parent_column).unwrap_or(&Value::Null);
    if parent_value.is_null() {
        return Ok(Vec::new());
    }

    // Constraints are evaluated against the related table, which has no relations of its own here
    let related_query = Query::table(&relation.table, "");
    let mut rows = Vec::new();
    for row in &table.rows {
        let linked = row
            .get(&relation.related_column)
            .is_some_and(|v| loose_eq(v, parent_value));
        if linked && matches_all(state, &related_query, row, constraint)? {
            rows.push(row);
        }
    }
    Ok(rows)
}

fn compare(left: &Value, operator: Operator, right: &Value) -> bool {
    match operator {
        Operator::Eq if right.is_null() => left.is_null(),
        Operator::Ne if right.is_null() => !left.is_null(),
        _ if left.is_null() => false,
        Operator::Eq => loose_eq(left, right),
        Operator::Ne => !loose_eq(left, right),
        Operator::Lt => compare_values(left, right) == Some(Ordering::Less),
        Operator::Le => matches!(
            compare_values(left, right),
            Some(Ordering::Less | Ordering::Equal)
        ),
        Operator::Gt => compare_values(left, right) == Some(Ordering::Greater),
        Operator::Ge => matches!(
            compare_values(left, right),
            Some(Ordering::Greater | Ordering::Equal)
        ),
        Operator::Like => like(left, right),
        Operator::NotLike => !like(left, right),
    }
}

fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        _ => None,
    }
}

fn loose_eq(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::String(a), Value::String(b)) => a == b,
        (Value::Null, Value::Null) => true,
        (Value::Null, _) | (_, Value::Null) => false,
        (Value::Array(_) | Value::Object(_), _) | (_, Value::Array(_) | Value::Object(_)) => {
            left == right
        }
        _ => match (as_number(left), as_number(right)) {
            (Some(a), Some(b)) => a == b,
            _ => left == right,
        },
    }
}

fn compare_values(left: &Value, right: &Value) -> Option<Ordering> {
    match (left, right) {
        (Value::String(a), Value::String(b)) => {
            match (a.trim().parse::<f64>(), b.trim().parse::<f64>()) {
                (Ok(x), Ok(y)) => x.partial_cmp(&y),
                _ => Some(a.cmp(b)),
            }
        }
        _ => match (as_number(left), as_number(right)) {
            (Some(a), Some(b)) => a.partial_cmp(&b),
            _ => None,
        },
    }
}

/// Total order used for sorting and min/max: nulls first, then by value
fn sort_order(left: &Value, right: &Value) -> Ordering {
    match (left.is_null(), right.is_null()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Less,
        (false, true) => Ordering::Greater,
        _ => compare_values(left, right).unwrap_or_else(|| left.to_string().cmp(&right.to_string())),
    }
}

fn like(value: &Value, pattern: &Value) -> bool {
    let text = match value {
        Value::String(s) => s.clone(),
        Value::Null => return false,
        other => other.to_string(),
    };
    let pattern = match pattern {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    };

    let mut regex = String::from("^");
    for c in pattern.chars() {
        match c {
            '%' => regex.push_str(".*"),
            '_' => regex.push('.'),
            other => regex.push_str(&regex::escape(&other.to_string())),
        }
    }
    regex.push('$');

    RegexBuilder::new(&regex)
        .case_insensitive(true)
        .dot_matches_new_line(true)
        .build()
        .is_ok_and(|re| re.is_match(&text))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error::RepoError;
    use serde_json::json;
    use std::time::Duration;

    fn record(value: Value) -> Record {
        value.as_object().cloned().unwrap()
    }

    fn products() -> Query {
        Query::table("products", "id").with_relation_defs(vec![RelationDef::has_many(
            "reviews",
            "reviews",
            "product_id",
            "id",
        )])
    }

    fn seeded() -> InMemoryStore {
        let store = InMemoryStore::new();
        store
            .seed(
                "products",
                "id",
                vec![
                    record(json!({"name": "Anvil", "price": 120, "status": 1})),
                    record(json!({"name": "Banana", "price": 2.5, "status": 0})),
                    record(json!({"name": "Cactus", "price": 40, "status": 1, "deleted_at": null})),
                ],
            )
            .unwrap();
        store
            .seed(
                "reviews",
                "id",
                vec![
                    record(json!({"product_id": 1, "stars": 5})),
                    record(json!({"product_id": 1, "stars": 2})),
                    record(json!({"product_id": 3, "stars": 4})),
                ],
            )
            .unwrap();
        store
    }

    async fn names(store: &InMemoryStore, query: &Query) -> Vec<String> {
        store
            .select(query, &["*"])
            .await
            .unwrap()
            .into_iter()
            .map(|r| r["name"].as_str().unwrap().to_string())
            .collect()
    }

    #[tokio::test]
    async fn test_insert_generates_keys() {
        let store = InMemoryStore::new();
        let keys = store
            .insert(
                "tags",
                "id",
                vec![record(json!({"id": 10, "name": "a"})), record(json!({"name": "b"}))],
            )
            .await
            .unwrap();
        assert_eq!(keys, vec![json!(10), json!(11)]);
    }

    #[tokio::test]
    async fn test_loose_equality_with_request_strings() {
        let store = seeded();
        let query = products().where_eq("status", "1");
        assert_eq!(names(&store, &query).await, vec!["Anvil", "Cactus"]);
    }

    #[tokio::test]
    async fn test_and_binds_tighter_than_or() {
        let store = seeded();
        // status = 0 OR (price > 100 AND status = 1)
        let query = products()
            .where_eq("status", 0)
            .or_where_op("price", Operator::Gt, 100)
            .where_eq("status", 1);
        assert_eq!(names(&store, &query).await, vec!["Anvil", "Banana"]);
    }

    #[tokio::test]
    async fn test_like_is_case_insensitive() {
        let store = seeded();
        let query = products().where_op("name", Operator::Like, "%AN%");
        assert_eq!(names(&store, &query).await, vec!["Anvil", "Banana"]);
    }

    #[tokio::test]
    async fn test_between_and_ordering() {
        let store = seeded();
        let query = products()
            .where_between("price", 2, 100)
            .order_by("price", SortDirection::Desc);
        assert_eq!(names(&store, &query).await, vec!["Cactus", "Banana"]);
    }

    #[tokio::test]
    async fn test_in_and_null_clauses() {
        let store = seeded();
        let query = products().where_in("id", vec![json!(1), json!(2)]);
        assert_eq!(store.count(&query).await.unwrap(), 2);

        let empty = products().where_in("id", vec![]);
        assert_eq!(store.count(&empty).await.unwrap(), 0);

        let null = products().where_null(&["deleted_at"]);
        assert_eq!(store.count(&null).await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_has_counts_constrained_relations() {
        let store = seeded();
        let two_reviews = products().has("reviews", Operator::Ge, 2, Boolean::And, None);
        assert_eq!(names(&store, &two_reviews).await, vec!["Anvil"]);

        let good = products().where_has("reviews", |q| q.where_op("stars", Operator::Ge, 4));
        assert_eq!(names(&store, &good).await, vec!["Anvil", "Cactus"]);
    }

    #[tokio::test]
    async fn test_unknown_relation_is_an_error() {
        let store = seeded();
        let query = products().with(&["owner"]);
        assert!(store.select(&query, &["*"]).await.is_err());
    }

    #[tokio::test]
    async fn test_eager_loading_and_projection() {
        let store = seeded();
        let query = products().where_eq("id", 1).with(&["reviews"]);
        let rows = store.select(&query, &["name"]).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].len(), 2);
        assert_eq!(rows[0]["reviews"].as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_raw_fragments_are_rejected() {
        let store = seeded();
        let query = products().where_raw("price > ?", vec![json!(1)], Boolean::And);
        assert!(store.count(&query).await.is_err());
    }

    #[tokio::test]
    async fn test_aggregates() {
        let store = seeded();
        let query = products().where_eq("status", 1);
        assert_eq!(
            store.aggregate(&query, Aggregate::Sum, "price").await.unwrap(),
            json!(160)
        );
        assert_eq!(
            store.aggregate(&query, Aggregate::Avg, "price").await.unwrap(),
            json!(80.0)
        );
        assert_eq!(
            store.aggregate(&products(), Aggregate::Min, "price").await.unwrap(),
            json!(2.5)
        );
        let none = products().where_eq("status", 9);
        assert_eq!(
            store.aggregate(&none, Aggregate::Max, "price").await.unwrap(),
            Value::Null
        );
    }

    #[tokio::test]
    async fn test_cached_select_is_invalidated_by_writes() {
        let store = seeded();
        let query = products().remember(Duration::from_secs(60));
        assert_eq!(store.select(&query, &["*"]).await.unwrap().len(), 3);

        store
            .insert("products", "id", vec![record(json!({"name": "Dune"}))])
            .await
            .unwrap();
        assert_eq!(store.select(&query, &["*"]).await.unwrap().len(), 4);
    }

    #[tokio::test]
    async fn test_update_delete_increment() {
        let store = seeded();
        let cheap = products().where_op("price", Operator::Lt, 50);

        let data = record(json!({"status": 2}));
        assert_eq!(store.update(&cheap, &data).await.unwrap(), 2);
        assert_eq!(store.increment(&cheap, "price", 1.0).await.unwrap(), 2);

        let rows = store.rows("products").unwrap();
        assert_eq!(rows[2]["price"], json!(41));
        assert_eq!(rows[1]["price"], json!(3.5));

        assert_eq!(store.delete(&cheap).await.unwrap(), 2);
        assert_eq!(store.rows("products").unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_failed_increment_writes_nothing() {
        let store = InMemoryStore::new();
        store
            .seed(
                "products",
                "id",
                vec![
                    record(json!({"stock": 1})),
                    record(json!({"stock": "lots"})),
                ],
            )
            .unwrap();
        let all = Query::table("products", "id");

        let err = store.increment(&all, "stock", 1.0).await.unwrap_err();
        assert!(matches!(
            err,
            RepoError::Storage(StorageError::InvalidValue { ref column, .. }) if column == "stock"
        ));

        let rows = store.rows("products").unwrap();
        assert_eq!(rows[0]["stock"], json!(1));
        assert_eq!(rows[1]["stock"], json!("lots"));
    }

    #[tokio::test]
    async fn test_integer_overflow_falls_back_to_float() {
        let store = InMemoryStore::new();
        store
            .seed(
                "counters",
                "id",
                vec![
                    record(json!({"hits": i64::MAX})),
                    record(json!({"hits": 1})),
                ],
            )
            .unwrap();
        let all = Query::table("counters", "id");

        let sum = store.aggregate(&all, Aggregate::Sum, "hits").await.unwrap();
        assert_eq!(sum.as_f64(), Some(i64::MAX as f64 + 1.0));

        store.increment(&all, "hits", 1.0).await.unwrap();
        let rows = store.rows("counters").unwrap();
        assert!(rows[0]["hits"].is_f64());
        assert_eq!(rows[1]["hits"], json!(2));
    }

    #[tokio::test]
    async fn test_rollback_restores_snapshot() {
        let store = seeded();
        store.begin().await.unwrap();
        assert!(store.transaction_id().unwrap().is_some());
        assert!(store.begin().await.is_err());

        store.delete(&products()).await.unwrap();
        assert!(store.rows("products").unwrap().is_empty());

        store.rollback().await.unwrap();
        assert_eq!(store.rows("products").unwrap().len(), 3);
        assert!(store.commit().await.is_err());
    }
}

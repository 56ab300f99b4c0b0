//! Ordered, keyed collections of criteria

use super::{Criterion, CriterionRef};
use indexmap::IndexMap;
use std::fmt;
use std::sync::Arc;

/// Position of a criterion in a pool
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PoolKey {
    /// Appended without a name
    Index(usize),
    /// Upserted under an explicit name
    Named(String),
}

impl PoolKey {
    pub fn name(&self) -> Option<&str> {
        match self {
            PoolKey::Named(name) => Some(name),
            PoolKey::Index(_) => None,
        }
    }
}

impl fmt::Display for PoolKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PoolKey::Index(index) => write!(f, "{}", index),
            PoolKey::Named(name) => f.write_str(name),
        }
    }
}

/// Criteria in application order
///
/// Appending assigns the next free index; putting under an existing name
/// replaces the criterion in place. Clones are independent snapshots.
#[derive(Debug, Clone, Default)]
pub struct CriteriaPool {
    entries: IndexMap<PoolKey, CriterionRef>,
    next_index: usize,
}

impl CriteriaPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder form of [`CriteriaPool::push`] / [`CriteriaPool::put`]
    pub fn with(mut self, key: Option<&str>, criterion: impl Criterion + 'static) -> Self {
        let criterion: CriterionRef = Arc::new(criterion);
        match key {
            Some(name) => self.put(name, criterion),
            None => {
                self.push(criterion);
            }
        }
        self
    }

    pub fn push(&mut self, criterion: CriterionRef) -> PoolKey {
        let key = PoolKey::Index(self.next_index);
        self.next_index += 1;
        self.entries.insert(key.clone(), criterion);
        key
    }

    pub fn put(&mut self, name: &str, criterion: CriterionRef) {
        self.entries.insert(PoolKey::Named(name.to_string()), criterion);
    }

    pub fn forget(&mut self, name: &str) -> Option<CriterionRef> {
        self.entries.shift_remove(&PoolKey::Named(name.to_string()))
    }

    pub fn get(&self, name: &str) -> Option<&CriterionRef> {
        self.entries.get(&PoolKey::Named(name.to_string()))
    }

    pub fn has(&self, name: &str) -> bool {
        self.entries.contains_key(&PoolKey::Named(name.to_string()))
    }

    pub fn iter(&self) -> impl Iterator<Item = (&PoolKey, &CriterionRef)> {
        self.entries.iter()
    }

    pub fn keys(&self) -> impl Iterator<Item = &PoolKey> {
        self.entries.keys()
    }

    pub fn criteria(&self) -> impl Iterator<Item = &CriterionRef> {
        self.entries.values()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.next_index = 0;
    }

    /// Same keys, in the same order, holding the very same criteria
    pub fn same_as(&self, other: &CriteriaPool) -> bool {
        self.entries.len() == other.entries.len()
            && self
                .entries
                .iter()
                .zip(other.entries.iter())
                .all(|((k1, c1), (k2, c2))| k1 == k2 && Arc::ptr_eq(c1, c2))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::criteria::{FieldIsValue, NullCriterion, OrderBy};

    fn names(pool: &CriteriaPool) -> Vec<String> {
        pool.keys().map(|k| k.to_string()).collect()
    }

    #[test]
    fn test_push_assigns_increasing_indices() {
        let mut pool = CriteriaPool::new();
        let first = pool.push(Arc::new(NullCriterion));
        let second = pool.push(Arc::new(NullCriterion));
        assert_eq!(first, PoolKey::Index(0));
        assert_eq!(second, PoolKey::Index(1));
    }

    #[test]
    fn test_put_replaces_in_place() {
        let mut pool = CriteriaPool::new()
            .with(Some("active"), FieldIsValue::new("active", true))
            .with(None, FieldIsValue::new("status", 1))
            .with(Some("order"), OrderBy::asc("name"));

        let replacement: CriterionRef = Arc::new(OrderBy::desc("name"));
        pool.put("active", replacement.clone());

        assert_eq!(names(&pool), vec!["active", "0", "order"]);
        assert!(Arc::ptr_eq(pool.get("active").unwrap(), &replacement));
    }

    #[test]
    fn test_forget_keeps_order() {
        let mut pool = CriteriaPool::new()
            .with(Some("a"), NullCriterion)
            .with(Some("b"), NullCriterion)
            .with(Some("c"), NullCriterion);

        assert!(pool.forget("b").is_some());
        assert!(pool.forget("missing").is_none());
        assert_eq!(names(&pool), vec!["a", "c"]);
    }

    #[test]
    fn test_snapshot_is_independent() {
        let mut pool = CriteriaPool::new().with(Some("a"), NullCriterion);
        let snapshot = pool.clone();
        pool.forget("a");

        assert!(snapshot.has("a"));
        assert!(pool.is_empty());
    }

    #[test]
    fn test_same_as_uses_identity_and_order() {
        let a: CriterionRef = Arc::new(NullCriterion);
        let b: CriterionRef = Arc::new(NullCriterion);

        let mut left = CriteriaPool::new();
        left.put("a", a.clone());
        left.put("b", b.clone());

        let mut right = left.clone();
        assert!(left.same_as(&right));

        right.put("b", Arc::new(NullCriterion));
        assert!(!left.same_as(&right));

        let mut reordered = CriteriaPool::new();
        reordered.put("b", b);
        reordered.put("a", a);
        assert!(!left.same_as(&reordered));
    }
}

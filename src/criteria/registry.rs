//! Criteria state owned by a repository
//!
//! Three pools are tracked:
//! - *standing* criteria apply to every query until changed,
//! - *once* criteria apply to the next query only (a [`NullCriterion`] under a
//!   key suppresses the standing criterion with that key),
//! - *active* criteria are what was applied last, used to tell whether the
//!   built query can be reused.
//!
//! [`NullCriterion`]: super::NullCriterion

use super::pool::{CriteriaPool, PoolKey};
use super::{CriterionRef, NullCriterion};

/// What the repository has to do before running the next query
#[derive(Debug, Clone)]
pub enum Resolution {
    /// Criteria are ignored: run the bare query. `reset` is set when criteria
    /// had been applied before and the built query must be dropped.
    Bare { reset: bool },
    /// Nothing changed since the last application
    Unchanged,
    /// Fold these criteria over a fresh query
    Rebuild(CriteriaPool),
}

#[derive(Debug, Clone, Default)]
pub struct CriteriaRegistry {
    standing: CriteriaPool,
    once: CriteriaPool,
    active: CriteriaPool,
    ignore: bool,
}

impl CriteriaRegistry {
    pub fn new(defaults: CriteriaPool) -> Self {
        Self {
            standing: defaults,
            ..Self::default()
        }
    }

    pub fn push(&mut self, criterion: CriterionRef, key: Option<&str>) {
        insert(&mut self.standing, criterion, key);
    }

    pub fn push_once(&mut self, criterion: CriterionRef, key: Option<&str>) {
        insert(&mut self.once, criterion, key);
    }

    pub fn remove(&mut self, key: &str) {
        self.standing.forget(key);
    }

    /// Suppress the standing criterion under `key` for the next query only
    pub fn remove_once(&mut self, key: &str) {
        if self.standing.has(key) {
            self.once.put(key, NullCriterion::shared());
        }
    }

    pub fn set_ignore(&mut self, ignore: bool) {
        self.ignore = ignore;
    }

    pub fn is_ignoring(&self) -> bool {
        self.ignore
    }

    pub fn replace_standing(&mut self, pool: CriteriaPool) {
        self.standing = pool;
    }

    /// Drop standing and pending one-shot criteria
    pub fn clear(&mut self) {
        self.standing.clear();
        self.once.clear();
    }

    pub fn standing(&self) -> &CriteriaPool {
        &self.standing
    }

    pub fn once(&self) -> &CriteriaPool {
        &self.once
    }

    pub fn active(&self) -> &CriteriaPool {
        &self.active
    }

    /// Standing criteria with the one-shot pool merged in
    pub fn effective(&self) -> CriteriaPool {
        let mut pool = self.standing.clone();
        for (key, criterion) in self.once.iter() {
            match key {
                PoolKey::Index(_) => {
                    pool.push(criterion.clone());
                }
                PoolKey::Named(name) if criterion.is_null() => {
                    pool.forget(name);
                }
                PoolKey::Named(name) => pool.put(name, criterion.clone()),
            }
        }
        pool
    }

    pub fn plan(&self) -> Resolution {
        if self.ignore {
            return Resolution::Bare {
                reset: !self.active.is_empty(),
            };
        }
        if self.once.is_empty() && self.standing.same_as(&self.active) {
            return Resolution::Unchanged;
        }
        Resolution::Rebuild(self.effective())
    }

    /// Record `applied` as the active pool and consume the one-shot criteria
    pub fn mark_applied(&mut self, applied: CriteriaPool) {
        self.active = applied;
        self.once.clear();
    }

    /// Forget what was applied so that the next resolution rebuilds
    pub fn reset_active(&mut self) {
        self.active.clear();
    }
}

fn insert(pool: &mut CriteriaPool, criterion: CriterionRef, key: Option<&str>) {
    match key {
        Some(name) => pool.put(name, criterion),
        None => {
            pool.push(criterion);
        }
    }
}

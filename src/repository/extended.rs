//! Repository with setting-driven standing criteria
//!
//! Three settings keep a standing criterion in sync under a well-known key:
//! the active flag (`active`), result caching (`cache`) and named scopes
//! (`scope`).

use super::Repository;
use crate::config::RepositoryConfig;
use crate::core::error::{RepoError, RepoResult};
use crate::core::model::Model;
use crate::core::store::{Record, Store};
use crate::criteria::common::{ScopeSet, Scopes, UseCache};
use crate::criteria::field::IsActive;
use crate::criteria::CriteriaKey;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;

/// Initial settings of an [`ExtendedRepository`]
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtendedSettings {
    /// Whether the model has an active flag column
    pub has_active: bool,
    pub active_column: String,
    pub enable_cache: bool,
}

impl Default for ExtendedSettings {
    fn default() -> Self {
        Self {
            has_active: true,
            active_column: "active".to_string(),
            enable_cache: false,
        }
    }
}

pub struct ExtendedRepository<M: Model> {
    inner: Repository<M>,
    settings: ExtendedSettings,
    include_inactive: bool,
    scopes: IndexMap<String, Vec<Value>>,
}

impl<M: Model> ExtendedRepository<M> {
    pub fn new(
        store: Arc<dyn Store>,
        config: RepositoryConfig,
        settings: ExtendedSettings,
    ) -> RepoResult<Self> {
        Ok(Self::wrap(Repository::new(store, config)?, settings))
    }

    /// Extend an already configured repository
    pub fn wrap(inner: Repository<M>, settings: ExtendedSettings) -> Self {
        let mut repository = Self {
            inner,
            settings,
            include_inactive: false,
            scopes: IndexMap::new(),
        };
        repository.refresh_setting_dependent_criteria();
        repository
    }

    pub fn settings(&self) -> &ExtendedSettings {
        &self.settings
    }

    /// Put or forget the `active`, `cache` and `scope` standing criteria
    pub fn refresh_setting_dependent_criteria(&mut self) {
        if self.settings.has_active {
            if self.include_inactive {
                self.inner.remove_criteria(CriteriaKey::Active.as_str());
            } else {
                self.inner.push_criteria(
                    IsActive::new(&self.settings.active_column),
                    Some(CriteriaKey::Active.as_str()),
                );
            }
        }

        if self.settings.enable_cache {
            self.inner
                .push_criteria(UseCache::new(None), Some(CriteriaKey::Cache.as_str()));
        } else {
            self.inner.remove_criteria(CriteriaKey::Cache.as_str());
        }

        if self.scopes.is_empty() {
            self.inner.remove_criteria(CriteriaKey::Scope.as_str());
        } else {
            let sets = self
                .scopes
                .iter()
                .map(|(name, params)| ScopeSet::new(name, params.clone()))
                .collect();
            self.inner
                .push_criteria(Scopes::from_sets(sets), Some(CriteriaKey::Scope.as_str()));
        }
    }

    pub fn restore_default_criteria(&mut self) -> &mut Self {
        self.inner.restore_default_criteria();
        self.refresh_setting_dependent_criteria();
        self
    }

    // === Scopes ===

    /// Apply the named scope to every query; re-adding replaces its parameters
    pub fn add_scope(&mut self, scope: &str, params: Vec<Value>) -> RepoResult<&mut Self> {
        if scope.trim().is_empty() {
            return Err(RepoError::invalid_argument("scope name must not be empty"));
        }
        self.scopes.insert(scope.to_string(), params);
        self.refresh_setting_dependent_criteria();
        Ok(self)
    }

    pub fn remove_scope(&mut self, scope: &str) -> &mut Self {
        self.scopes.shift_remove(scope);
        self.refresh_setting_dependent_criteria();
        self
    }

    pub fn clear_scopes(&mut self) -> &mut Self {
        self.scopes.clear();
        self.refresh_setting_dependent_criteria();
        self
    }

    pub fn scopes(&self) -> impl Iterator<Item = (&str, &[Value])> {
        self.scopes.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }

    // === Settings ===

    /// Include inactive rows and bypass the cache, or go back to normal
    pub fn maintenance(&mut self, enable: bool) -> &mut Self {
        self.include_inactive = enable;
        self.settings.enable_cache = !enable;
        self.refresh_setting_dependent_criteria();
        self
    }

    pub fn include_inactive(&mut self, enable: bool) -> &mut Self {
        self.include_inactive = enable;
        self.refresh_setting_dependent_criteria();
        self
    }

    pub fn exclude_inactive(&mut self) -> &mut Self {
        self.include_inactive(false)
    }

    pub fn is_inactive_included(&self) -> bool {
        self.include_inactive
    }

    pub fn enable_cache(&mut self, enable: bool) -> &mut Self {
        self.settings.enable_cache = enable;
        self.refresh_setting_dependent_criteria();
        self
    }

    pub fn disable_cache(&mut self) -> &mut Self {
        self.enable_cache(false)
    }

    pub fn is_cache_enabled(&self) -> bool {
        self.settings.enable_cache
    }

    // === Manipulation ===

    /// Set the active flag of one row
    ///
    /// Returns `false` when the model has no active column or the row does
    /// not exist. The row is looked up with the active criterion suspended,
    /// so inactive rows can be activated.
    pub async fn activate_record(
        &mut self,
        id: impl Into<Value>,
        active: bool,
    ) -> RepoResult<bool> {
        if !self.settings.has_active {
            return Ok(false);
        }

        let id = id.into();
        self.inner.remove_once_criteria(CriteriaKey::Active.as_str());
        if self.inner.find(id.clone(), &["*"], None).await?.is_none() {
            return Ok(false);
        }

        let mut data = Record::new();
        data.insert(self.settings.active_column.clone(), Value::Bool(active));
        let descriptor = &self.inner.descriptor;
        let query = descriptor
            .new_query()
            .where_eq(descriptor.key_name(), id);
        Ok(self.inner.store.update(&query, &data).await? > 0)
    }
}

impl<M: Model> Deref for ExtendedRepository<M> {
    type Target = Repository<M>;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

impl<M: Model> DerefMut for ExtendedRepository<M> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.inner
    }
}

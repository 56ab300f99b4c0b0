//! Configuration loading and management
//!
//! All settings are passed explicitly into repositories and request criteria;
//! nothing is looked up from global state.

use crate::core::error::RepoResult;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Complete configuration for repositories and request mapping
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RepositoryConfig {
    pub pagination: PaginationConfig,
    pub request: RequestConfig,
    pub cache: CacheConfig,
    pub translation: TranslationConfig,
}

/// Page size settings used by `Repository::paginate`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PaginationConfig {
    /// Global default page size; takes precedence over the model's own default
    pub limit: Option<usize>,

    /// Hard maximum for any page size
    pub page_max: usize,
}

impl Default for PaginationConfig {
    fn default() -> Self {
        Self {
            limit: None,
            page_max: 1000,
        }
    }
}

/// Whether sortable columns are ordered on every request or only when asked
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortPolicy {
    /// Sortable columns always contribute an order-by with their declared default
    #[default]
    Always,
    /// Sortable columns only contribute when the request carries their sort parameter
    WhenRequested,
}

/// Request parameter names and defaults for `RequestCriteria`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RequestConfig {
    pub page_index_param: String,
    pub page_size_param: String,
    pub total_param: String,
    pub default_page_size: usize,

    /// Prefix prepended to a column's field to form its search parameter
    pub search_prefix: String,

    /// Prefix prepended to a column's field to form its sort parameter
    pub sort_prefix: String,

    pub sort_policy: SortPolicy,
}

impl Default for RequestConfig {
    fn default() -> Self {
        Self {
            page_index_param: "pageIndex".to_string(),
            page_size_param: "pageSize".to_string(),
            total_param: "total".to_string(),
            default_page_size: 10,
            search_prefix: String::new(),
            sort_prefix: String::new(),
            sort_policy: SortPolicy::Always,
        }
    }
}

/// Settings for the `UseCache` criterion
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub ttl_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self { ttl_secs: 15 * 60 }
    }
}

impl CacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TranslationConfig {
    pub locale: String,
}

impl Default for TranslationConfig {
    fn default() -> Self {
        Self {
            locale: "en".to_string(),
        }
    }
}

impl RepositoryConfig {
    /// Load configuration from a YAML file
    pub fn from_yaml_file(path: &str) -> RepoResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&content)
    }

    /// Load configuration from a YAML string
    pub fn from_yaml_str(yaml: &str) -> RepoResult<Self> {
        let config: Self = serde_yaml::from_str(yaml)?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = RepositoryConfig::default();

        assert_eq!(config.pagination.page_max, 1000);
        assert_eq!(config.pagination.limit, None);
        assert_eq!(config.request.page_index_param, "pageIndex");
        assert_eq!(config.request.page_size_param, "pageSize");
        assert_eq!(config.request.default_page_size, 10);
        assert_eq!(config.request.sort_policy, SortPolicy::Always);
        assert_eq!(config.cache.ttl(), Duration::from_secs(900));
        assert_eq!(config.translation.locale, "en");
    }

    #[test]
    fn test_partial_yaml_keeps_defaults() {
        let yaml = r#"
pagination:
  limit: 25
request:
  search_prefix: "f_"
  sort_prefix: "o_"
  sort_policy: when_requested
"#;
        let config = RepositoryConfig::from_yaml_str(yaml).unwrap();

        assert_eq!(config.pagination.limit, Some(25));
        assert_eq!(config.pagination.page_max, 1000);
        assert_eq!(config.request.search_prefix, "f_");
        assert_eq!(config.request.sort_prefix, "o_");
        assert_eq!(config.request.sort_policy, SortPolicy::WhenRequested);
        assert_eq!(config.request.page_size_param, "pageSize");
    }

    #[test]
    fn test_yaml_serialization() {
        let config = RepositoryConfig::default();
        let yaml = serde_yaml::to_string(&config).unwrap();

        let parsed = RepositoryConfig::from_yaml_str(&yaml).unwrap();
        assert_eq!(parsed.cache.ttl_secs, config.cache.ttl_secs);
        assert_eq!(parsed.request.total_param, config.request.total_param);
    }

    #[test]
    fn test_from_yaml_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "cache:\n  ttl_secs: 60").unwrap();

        let config = RepositoryConfig::from_yaml_file(file.path().to_str().unwrap()).unwrap();
        assert_eq!(config.cache.ttl_secs, 60);
    }

    #[test]
    fn test_missing_file_is_configuration_error() {
        let err = RepositoryConfig::from_yaml_file("/nonexistent/repository.yaml").unwrap_err();
        assert_eq!(err.error_code(), "REPOSITORY_CONFIGURATION_ERROR");
    }
}

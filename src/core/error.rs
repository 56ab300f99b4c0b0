//! Typed error handling for repositories, criteria and service pipelines
//!
//! Every fallible operation in the crate returns [`RepoResult`]. Callers can
//! match on the category they care about instead of inspecting messages.
//!
//! # Error Categories
//!
//! - [`RepoError::Configuration`]: the model cannot be turned into a usable query
//! - [`RepoError::NotFound`]: fail-fast lookups with no matching row
//! - [`RepoError::InvalidArgument`]: bad callback results or malformed scope sets
//! - [`PipelineError`]: unresolvable stages, invalid stage results, stage failures
//! - [`StorageError`]: errors raised by a storage backend
//!
//! # Example
//!
//! ```rust,ignore
//! match repository.find_or_fail(42, &["*"]).await {
//!     Ok(product) => println!("Found: {:?}", product),
//!     Err(RepoError::NotFound { entity_type, id }) => {
//!         println!("{} {:?} not found", entity_type, id);
//!     }
//!     Err(e) => eprintln!("Other error: {}", e),
//! }
//! ```

use serde::Serialize;
use std::fmt;

/// The main error type for repository operations
#[derive(Debug)]
pub enum RepoError {
    /// The model type cannot be resolved to a usable entity (misconfiguration)
    Configuration { model: String, message: String },

    /// No row matched a lookup that requested fail-fast semantics
    NotFound {
        entity_type: String,
        id: Option<String>,
    },

    /// A callback or criterion received or produced a value of the wrong shape
    InvalidArgument { message: String },

    /// Service pipeline errors
    Pipeline(PipelineError),

    /// Storage backend errors
    Storage(StorageError),

    /// A row could not be converted to or from its model type
    Serialization {
        entity_type: String,
        message: String,
    },
}

impl RepoError {
    pub fn configuration(model: impl Into<String>, message: impl Into<String>) -> Self {
        RepoError::Configuration {
            model: model.into(),
            message: message.into(),
        }
    }

    pub fn not_found(entity_type: impl Into<String>, id: Option<String>) -> Self {
        RepoError::NotFound {
            entity_type: entity_type.into(),
            id,
        }
    }

    pub fn invalid_argument(message: impl Into<String>) -> Self {
        RepoError::InvalidArgument {
            message: message.into(),
        }
    }

    /// Get the error code for programmatic handling
    pub fn error_code(&self) -> &'static str {
        match self {
            RepoError::Configuration { .. } => "REPOSITORY_CONFIGURATION_ERROR",
            RepoError::NotFound { .. } => "NOT_FOUND",
            RepoError::InvalidArgument { .. } => "INVALID_ARGUMENT",
            RepoError::Pipeline(e) => e.error_code(),
            RepoError::Storage(_) => "STORAGE_ERROR",
            RepoError::Serialization { .. } => "SERIALIZATION_ERROR",
        }
    }

    /// Convert to an error response body
    pub fn to_response(&self) -> ErrorResponse {
        ErrorResponse {
            code: self.error_code().to_string(),
            message: self.to_string(),
            details: self.details(),
        }
    }

    fn details(&self) -> Option<serde_json::Value> {
        match self {
            RepoError::NotFound { entity_type, id } => Some(serde_json::json!({
                "entity_type": entity_type,
                "id": id,
            })),
            RepoError::Pipeline(PipelineError::StageNotFound { stage })
            | RepoError::Pipeline(PipelineError::InvalidResult { stage, .. })
            | RepoError::Pipeline(PipelineError::StageFailed { stage, .. }) => {
                Some(serde_json::json!({ "stage": stage }))
            }
            _ => None,
        }
    }
}

impl fmt::Display for RepoError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RepoError::Configuration { model, message } => {
                write!(f, "Model {} could not be instantiated: {}", model, message)
            }
            RepoError::NotFound { entity_type, id } => match id {
                Some(id) => write!(f, "No query results for model {} with id '{}'", entity_type, id),
                None => write!(f, "No query results for model {}", entity_type),
            },
            RepoError::InvalidArgument { message } => write!(f, "Invalid argument: {}", message),
            RepoError::Pipeline(e) => write!(f, "{}", e),
            RepoError::Storage(e) => write!(f, "{}", e),
            RepoError::Serialization {
                entity_type,
                message,
            } => write!(
                f,
                "Failed to serialize/deserialize {}: {}",
                entity_type, message
            ),
        }
    }
}

impl std::error::Error for RepoError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            RepoError::Pipeline(e) => Some(e),
            RepoError::Storage(e) => Some(e),
            _ => None,
        }
    }
}

/// Error response structure
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    /// Error code for programmatic handling
    pub code: String,
    /// Human-readable error message
    pub message: String,
    /// Optional additional details
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

// =============================================================================
// Pipeline Errors
// =============================================================================

/// Errors raised while running a service pipeline
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// A stage name is not registered with the stage registry
    #[error("Pipeline stage '{stage}' does not exist")]
    StageNotFound { stage: String },

    /// A stage returned something that is not a valid envelope for this run
    #[error("Pipeline stage '{stage}' returned an invalid envelope: {reason}")]
    InvalidResult { stage: String, reason: String },

    /// A run was started with an envelope that carries no input
    #[error("Service '{service}' was invoked without input")]
    MissingInput { service: String },

    /// A stage body failed
    #[error("Pipeline stage '{stage}' failed: {source}")]
    StageFailed {
        stage: String,
        #[source]
        source: anyhow::Error,
    },

    /// The before/behind hook of a service failed
    #[error("Pipeline hook '{hook}' failed: {source}")]
    HookFailed {
        hook: String,
        #[source]
        source: anyhow::Error,
    },
}

impl PipelineError {
    pub fn error_code(&self) -> &'static str {
        match self {
            PipelineError::StageNotFound { .. } => "PIPELINE_CLASS_NOT_FOUND",
            PipelineError::InvalidResult { .. } => "INVALID_PIPELINE_RESULT",
            PipelineError::MissingInput { .. } => "PIPELINE_MISSING_INPUT",
            PipelineError::StageFailed { .. } => "PIPELINE_STAGE_FAILED",
            PipelineError::HookFailed { .. } => "PIPELINE_HOOK_FAILED",
        }
    }
}

impl From<PipelineError> for RepoError {
    fn from(err: PipelineError) -> Self {
        RepoError::Pipeline(err)
    }
}

// =============================================================================
// Storage Errors
// =============================================================================

/// Errors raised by storage backends
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Failed to acquire {kind} lock: {message}")]
    Lock { kind: &'static str, message: String },

    #[error("Relation '{relation}' is not defined on table '{table}'")]
    UnknownRelation { table: String, relation: String },

    #[error("{backend} does not support {feature}")]
    Unsupported {
        backend: &'static str,
        feature: String,
    },

    #[error("A transaction is already active")]
    TransactionActive,

    #[error("No transaction is active")]
    NoTransaction,

    #[error("Invalid value for column '{column}': {message}")]
    InvalidValue { column: String, message: String },
}

impl From<StorageError> for RepoError {
    fn from(err: StorageError) -> Self {
        RepoError::Storage(err)
    }
}

// =============================================================================
// Conversions from external errors
// =============================================================================

impl From<serde_json::Error> for RepoError {
    fn from(err: serde_json::Error) -> Self {
        RepoError::Serialization {
            entity_type: "json".to_string(),
            message: err.to_string(),
        }
    }
}

impl From<serde_yaml::Error> for RepoError {
    fn from(err: serde_yaml::Error) -> Self {
        RepoError::configuration("config", err.to_string())
    }
}

impl From<std::io::Error> for RepoError {
    fn from(err: std::io::Error) -> Self {
        RepoError::configuration("config", err.to_string())
    }
}

// =============================================================================
// Result type alias
// =============================================================================

/// A specialized Result type for repository operations
pub type RepoResult<T> = Result<T, RepoError>;

// =============================================================================
// Tests
// =============================================================================

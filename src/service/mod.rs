//! Service pipelines
//!
//! A [`Service`] names three ordered lists of stages (`init`, `services`,
//! `end`) and two hooks around the main list. [`ServiceRunner`] threads a
//! [`ServiceData`] envelope through them:
//!
//! ```text
//! init stages -> before hook -> service stages -> behind hook -> end stages
//! ```
//!
//! [`ServiceRunner::run`] wraps the whole pipeline in one transaction.
//!
//! # Example
//! ```rust,ignore
//! struct PlaceOrder;
//!
//! impl Service for PlaceOrder {
//!     fn name(&self) -> &str { "place_order" }
//!     fn services(&self) -> &[&str] { &["reserve_stock", "create_order"] }
//! }
//!
//! let mut registry = StageRegistry::new();
//! registry.register("reserve_stock", move || ReserveStock::new(store.clone()));
//! registry.register("create_order", move || CreateOrder::new(store.clone()));
//!
//! let runner = ServiceRunner::new(registry, transactions);
//! let data = runner.run(&PlaceOrder, input).await?;
//! ```

use crate::core::error::{PipelineError, RepoError, RepoResult};
use crate::core::store::Transactional;
use async_trait::async_trait;
use indexmap::IndexMap;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

/// Request-like input of a pipeline run
pub type Input = IndexMap<String, Value>;

/// Envelope threaded through every stage of one run
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ServiceData {
    run_id: Uuid,
    input: Option<Input>,
    fields: IndexMap<String, Value>,
}

impl ServiceData {
    pub fn new(input: Input) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            input: Some(input),
            fields: IndexMap::new(),
        }
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    /// The input snapshot; `None` once the pipeline completed
    pub fn input(&self) -> Option<&Input> {
        self.input.as_ref()
    }

    pub fn input_value(&self, key: &str) -> Option<&Value> {
        self.input.as_ref().and_then(|input| input.get(key))
    }

    pub fn take_input(&mut self) -> Option<Input> {
        self.input.take()
    }

    pub fn set(&mut self, key: &str, value: impl Into<Value>) -> &mut Self {
        self.fields.insert(key.to_string(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    /// Deserialize an accumulated field
    pub fn get_as<T: DeserializeOwned>(&self, key: &str) -> RepoResult<Option<T>> {
        self.fields
            .get(key)
            .map(|value| serde_json::from_value(value.clone()))
            .transpose()
            .map_err(RepoError::from)
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.fields.shift_remove(key)
    }

    pub fn fields(&self) -> &IndexMap<String, Value> {
        &self.fields
    }
}

/// One unit of a pipeline
#[async_trait]
pub trait Stage: Send + Sync {
    async fn handle(&self, data: ServiceData) -> anyhow::Result<ServiceData>;
}

type StageFactory = Arc<dyn Fn() -> Box<dyn Stage> + Send + Sync>;

/// Registry resolving stage names to fresh stage instances
#[derive(Clone, Default)]
pub struct StageRegistry {
    factories: HashMap<String, StageFactory>,
}

impl StageRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a factory building the stage called `name`
    pub fn register<F, S>(&mut self, name: &str, factory: F)
    where
        F: Fn() -> S + Send + Sync + 'static,
        S: Stage + 'static,
    {
        self.factories.insert(
            name.to_string(),
            Arc::new(move || Box::new(factory()) as Box<dyn Stage>),
        );
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    pub fn resolve(&self, name: &str) -> Result<Box<dyn Stage>, PipelineError> {
        self.factories
            .get(name)
            .map(|factory| factory())
            .ok_or_else(|| PipelineError::StageNotFound {
                stage: name.to_string(),
            })
    }

    /// List all registered stage names
    pub fn list_stages(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.factories.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

/// A pipeline definition
#[async_trait]
pub trait Service: Send + Sync {
    fn name(&self) -> &str;

    fn init(&self) -> &[&str] {
        &[]
    }

    fn services(&self) -> &[&str] {
        &[]
    }

    fn end(&self) -> &[&str] {
        &[]
    }

    /// Runs between the init and service stages
    async fn before(&self, data: ServiceData) -> anyhow::Result<ServiceData> {
        Ok(data)
    }

    /// Runs between the service and end stages
    async fn behind(&self, data: ServiceData) -> anyhow::Result<ServiceData> {
        Ok(data)
    }
}

/// Executes services against a stage registry
pub struct ServiceRunner {
    registry: StageRegistry,
    transactions: Arc<dyn Transactional>,
}

impl ServiceRunner {
    pub fn new(registry: StageRegistry, transactions: Arc<dyn Transactional>) -> Self {
        Self {
            registry,
            transactions,
        }
    }

    pub fn registry(&self) -> &StageRegistry {
        &self.registry
    }

    /// Run the pipeline inside one transaction
    ///
    /// Commits when every stage succeeded; rolls back and returns the error
    /// otherwise.
    pub async fn run(&self, service: &dyn Service, input: Input) -> RepoResult<ServiceData> {
        self.transactions.begin().await?;
        let data = ServiceData::new(input);
        let run_id = data.run_id();

        let result = match self.invoke(service, data).await {
            Ok(data) => self.transactions.commit().await.map(|()| data),
            Err(e) => Err(e),
        };

        match result {
            Ok(data) => {
                tracing::info!(service = service.name(), run_id = %run_id, "pipeline committed");
                Ok(data)
            }
            Err(e) => {
                if let Err(rollback) = self.transactions.rollback().await {
                    tracing::error!(
                        service = service.name(),
                        run_id = %run_id,
                        error = %rollback,
                        "pipeline rollback failed"
                    );
                }
                tracing::error!(
                    service = service.name(),
                    run_id = %run_id,
                    error = %e,
                    "pipeline rolled back"
                );
                Err(e)
            }
        }
    }

    /// Run the pipeline without a transaction; the returned envelope has its
    /// input cleared
    pub async fn invoke(&self, service: &dyn Service, data: ServiceData) -> RepoResult<ServiceData> {
        let run_id = data.run_id();
        match self.execute(service, data).await {
            Ok(mut data) => {
                data.take_input();
                Ok(data)
            }
            Err(e) => {
                tracing::error!(
                    service = service.name(),
                    run_id = %run_id,
                    error = %e,
                    "pipeline failed"
                );
                Err(e)
            }
        }
    }

    async fn execute(&self, service: &dyn Service, data: ServiceData) -> RepoResult<ServiceData> {
        if data.input().is_none() {
            return Err(PipelineError::MissingInput {
                service: service.name().to_string(),
            }
            .into());
        }
        let run_id = data.run_id();

        let data = self.execute_stages(service.init(), data, run_id).await?;

        let data = service
            .before(data)
            .await
            .map_err(|source| PipelineError::HookFailed {
                hook: "before".to_string(),
                source,
            })?;
        check_envelope("before", &data, run_id)?;

        let data = self.execute_stages(service.services(), data, run_id).await?;

        let data = service
            .behind(data)
            .await
            .map_err(|source| PipelineError::HookFailed {
                hook: "behind".to_string(),
                source,
            })?;
        check_envelope("behind", &data, run_id)?;

        self.execute_stages(service.end(), data, run_id).await
    }

    async fn execute_stages(
        &self,
        stages: &[&str],
        data: ServiceData,
        run_id: Uuid,
    ) -> RepoResult<ServiceData> {
        let mut data = data;
        for name in stages {
            let stage = self.registry.resolve(name)?;
            tracing::debug!(stage = %name, run_id = %run_id, "executing stage");

            data = stage
                .handle(data)
                .await
                .map_err(|source| PipelineError::StageFailed {
                    stage: name.to_string(),
                    source,
                })?;
            check_envelope(name, &data, run_id)?;
        }
        Ok(data)
    }
}

/// A stage must hand back the envelope of this run, input intact
fn check_envelope(stage: &str, data: &ServiceData, run_id: Uuid) -> Result<(), PipelineError> {
    let reason = if data.run_id() != run_id {
        "envelope belongs to another run"
    } else if data.input().is_none() {
        "input was removed"
    } else {
        return Ok(());
    };

    Err(PipelineError::InvalidResult {
        stage: stage.to_string(),
        reason: reason.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Transactions recorded as events
    #[derive(Default)]
    struct RecordingTransactions {
        events: Mutex<Vec<&'static str>>,
    }

    impl RecordingTransactions {
        fn events(&self) -> Vec<&'static str> {
            self.events.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Transactional for RecordingTransactions {
        async fn begin(&self) -> RepoResult<()> {
            self.events.lock().unwrap().push("begin");
            Ok(())
        }

        async fn commit(&self) -> RepoResult<()> {
            self.events.lock().unwrap().push("commit");
            Ok(())
        }

        async fn rollback(&self) -> RepoResult<()> {
            self.events.lock().unwrap().push("rollback");
            Ok(())
        }
    }

    struct Append(&'static str);

    #[async_trait]
    impl Stage for Append {
        async fn handle(&self, mut data: ServiceData) -> anyhow::Result<ServiceData> {
            let mut trail: Vec<String> = data.get_as("trail")?.unwrap_or_default();
            trail.push(self.0.to_string());
            data.set("trail", trail);
            Ok(data)
        }
    }

    struct Forge;

    #[async_trait]
    impl Stage for Forge {
        async fn handle(&self, data: ServiceData) -> anyhow::Result<ServiceData> {
            Ok(ServiceData::new(data.input().cloned().unwrap_or_default()))
        }
    }

    struct DropInput;

    #[async_trait]
    impl Stage for DropInput {
        async fn handle(&self, mut data: ServiceData) -> anyhow::Result<ServiceData> {
            data.take_input();
            Ok(data)
        }
    }

    struct Ordered {
        services: Vec<&'static str>,
    }

    #[async_trait]
    impl Service for Ordered {
        fn name(&self) -> &str {
            "ordered"
        }

        fn init(&self) -> &[&str] {
            &["init"]
        }

        fn services(&self) -> &[&str] {
            &self.services
        }

        fn end(&self) -> &[&str] {
            &["end"]
        }

        async fn before(&self, mut data: ServiceData) -> anyhow::Result<ServiceData> {
            let mut trail: Vec<String> = data.get_as("trail")?.unwrap_or_default();
            trail.push("before".to_string());
            data.set("trail", trail);
            Ok(data)
        }

        async fn behind(&self, mut data: ServiceData) -> anyhow::Result<ServiceData> {
            let mut trail: Vec<String> = data.get_as("trail")?.unwrap_or_default();
            trail.push("behind".to_string());
            data.set("trail", trail);
            Ok(data)
        }
    }

    fn registry() -> StageRegistry {
        let mut registry = StageRegistry::new();
        registry.register("init", || Append("init"));
        registry.register("main", || Append("main"));
        registry.register("end", || Append("end"));
        registry.register("forge", || Forge);
        registry.register("drop_input", || DropInput);
        registry
    }

    fn input() -> Input {
        let mut input = Input::new();
        input.insert("customer".to_string(), Value::from(7));
        input
    }

    #[tokio::test]
    async fn test_stage_order_and_commit() {
        let transactions = Arc::new(RecordingTransactions::default());
        let runner = ServiceRunner::new(registry(), transactions.clone());
        let service = Ordered {
            services: vec!["main"],
        };

        let data = runner.run(&service, input()).await.unwrap();
        let trail: Vec<String> = data.get_as("trail").unwrap().unwrap();
        assert_eq!(trail, vec!["init", "before", "main", "behind", "end"]);
        assert!(data.input().is_none());
        assert_eq!(transactions.events(), vec!["begin", "commit"]);
    }

    #[tokio::test]
    async fn test_unknown_stage_rolls_back() {
        let transactions = Arc::new(RecordingTransactions::default());
        let runner = ServiceRunner::new(registry(), transactions.clone());
        let service = Ordered {
            services: vec!["main", "missing"],
        };

        let err = runner.run(&service, input()).await.unwrap_err();
        assert_eq!(err.error_code(), "PIPELINE_CLASS_NOT_FOUND");
        assert_eq!(transactions.events(), vec!["begin", "rollback"]);
    }

    #[tokio::test]
    async fn test_foreign_envelope_is_rejected() {
        let runner = ServiceRunner::new(registry(), Arc::new(RecordingTransactions::default()));
        let service = Ordered {
            services: vec!["forge"],
        };

        let err = runner
            .invoke(&service, ServiceData::new(input()))
            .await
            .unwrap_err();
        assert_eq!(err.error_code(), "INVALID_PIPELINE_RESULT");
    }

    #[tokio::test]
    async fn test_dropped_input_is_rejected() {
        let runner = ServiceRunner::new(registry(), Arc::new(RecordingTransactions::default()));
        let service = Ordered {
            services: vec!["drop_input"],
        };

        let err = runner
            .invoke(&service, ServiceData::new(input()))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            RepoError::Pipeline(PipelineError::InvalidResult { ref stage, .. }) if stage == "drop_input"
        ));
    }

    #[tokio::test]
    async fn test_missing_input_fails_before_any_stage() {
        let runner = ServiceRunner::new(registry(), Arc::new(RecordingTransactions::default()));
        let service = Ordered { services: vec![] };
        let mut data = ServiceData::new(input());
        data.take_input();

        let err = runner.invoke(&service, data).await.unwrap_err();
        assert_eq!(err.error_code(), "PIPELINE_MISSING_INPUT");
    }

    #[test]
    fn test_service_data_fields() {
        let mut data = ServiceData::new(input());
        data.set("total", 12.5).set("note", "gift");

        assert_eq!(data.input_value("customer"), Some(&Value::from(7)));
        assert_eq!(data.get_as::<f64>("total").unwrap(), Some(12.5));
        assert!(data.get_as::<u32>("note").is_err());
        assert_eq!(data.remove("note"), Some(Value::from("gift")));
        assert_eq!(data.get("note"), None);
    }

    #[test]
    fn test_registry_lists_stages() {
        let registry = registry();
        assert!(registry.contains("main"));
        assert!(registry.resolve("nope").is_err());
        assert_eq!(
            registry.list_stages(),
            vec!["drop_input", "end", "forge", "init", "main"]
        );
    }
}

//! Function definitions.
//!
//! A function is a setup closure that registers hooks and returns the body.
//! Creating a [`FunctionDefinition`] runs the setup once against recording
//! hooks to discover its states, signals, and queries; that body is discarded.

use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;

use fns_types::definition::{DefinitionSummary, Schema};
use futures_util::future::BoxFuture;
use schemars::JsonSchema;
use serde::Serialize;
use serde_json::Value;

use crate::engine::Execution;
use crate::engine::hooks::Hooks;
use crate::error::{DefinitionError, EngineError};

/// The function body produced by setup, ready to run once.
pub type Body = Box<dyn FnOnce(Execution) -> BoxFuture<'static, anyhow::Result<Value>> + Send>;

/// The setup closure: registers hooks, returns the body.
pub type Setup = Arc<dyn Fn(&mut Hooks) -> anyhow::Result<Body> + Send + Sync>;

/// Wrap an async closure as a [`Body`], serializing whatever it returns.
pub fn body<F, Fut, T>(f: F) -> Body
where
    F: FnOnce(Execution) -> Fut + Send + 'static,
    Fut: Future<Output = anyhow::Result<T>> + Send + 'static,
    T: Serialize + 'static,
{
    Box::new(move |execution| {
        Box::pin(async move {
            let output = f(execution).await?;
            let value = serde_json::to_value(output)
                .map_err(|e| EngineError::serialization("function result", e))?;
            Ok(value)
        })
    })
}

/// An immutable, registered function.
#[derive(Clone)]
pub struct FunctionDefinition {
    name: String,
    version: u32,
    setup: Setup,
    schema: Schema,
    states: BTreeMap<String, Value>,
    signals: Vec<String>,
    queries: Vec<String>,
}

impl FunctionDefinition {
    /// Build a definition, dry-running `setup` to discover its hooks.
    pub fn new<S>(name: impl Into<String>, version: u32, setup: S) -> Result<Self, DefinitionError>
    where
        S: Fn(&mut Hooks) -> anyhow::Result<Body> + Send + Sync + 'static,
    {
        let name = name.into();
        if name.is_empty() {
            return Err(DefinitionError::MissingName);
        }

        let mut hooks = Hooks::recording();
        if let Err(err) = setup(&mut hooks) {
            return Err(DefinitionError::Setup {
                name,
                version,
                message: err.to_string(),
            });
        }
        let discovered = hooks.into_discovered();

        tracing::debug!(
            function = %name,
            version,
            states = discovered.states.len(),
            signals = discovered.signals.len(),
            queries = discovered.queries.len(),
            "function defined"
        );

        Ok(Self {
            name,
            version,
            setup: Arc::new(setup),
            schema: Schema::default(),
            states: discovered.states,
            signals: discovered.signals,
            queries: discovered.queries,
        })
    }

    pub fn with_schema(mut self, schema: Schema) -> Self {
        self.schema = schema;
        self
    }

    /// Attach the JSON schema of `T` as the input payload schema.
    pub fn with_data_schema<T: JsonSchema>(mut self) -> Self {
        self.schema.data = serde_json::to_value(schemars::schema_for!(T)).ok();
        self
    }

    /// Attach the JSON schema of `T` as the payload schema of `signal`.
    pub fn with_signal_schema<T: JsonSchema>(mut self, signal: &str) -> Self {
        if let Ok(schema) = serde_json::to_value(schemars::schema_for!(T)) {
            self.schema.signals.insert(signal.to_string(), schema);
        }
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    pub(crate) fn setup(&self) -> &Setup {
        &self.setup
    }

    /// Declared state keys with their initial values.
    pub fn states(&self) -> &BTreeMap<String, Value> {
        &self.states
    }

    pub fn signals(&self) -> &[String] {
        &self.signals
    }

    pub fn queries(&self) -> &[String] {
        &self.queries
    }

    pub fn summary(&self) -> DefinitionSummary {
        DefinitionSummary {
            name: self.name.clone(),
            version: self.version,
            states: self.states.clone(),
            queries: self.queries.clone(),
            signals: self.signals.clone(),
            schema: self.schema.clone(),
        }
    }
}

impl std::fmt::Debug for FunctionDefinition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FunctionDefinition")
            .field("name", &self.name)
            .field("version", &self.version)
            .field("states", &self.states)
            .field("signals", &self.signals)
            .field("queries", &self.queries)
            .finish_non_exhaustive()
    }
}

//! Setup-phase hooks: `use_state`, `use_signal`, `use_query`.
//!
//! The same setup closure runs in two modes. At definition time it runs
//! against a recording `Hooks` that only harvests names and initial values.
//! On every invocation it runs against a live `Hooks` bound to that
//! invocation's state. `Hooks` is only lent to the setup closure, so no hook
//! can be registered once the body starts.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use super::invocation::{QueryBinding, Shared, lock};
use super::state::{State, StateKey};
use crate::error::EngineError;

/// Names and initial values collected by a definition-time dry run.
#[derive(Debug, Default, Clone)]
pub(crate) struct Discovered {
    pub states: BTreeMap<String, Value>,
    pub signals: Vec<String>,
    pub queries: Vec<String>,
}

enum Mode {
    Recording(Discovered),
    Live { shared: Shared, state: State },
}

/// Hook registry handed to a function's setup closure.
pub struct Hooks {
    mode: Mode,
}

impl Hooks {
    pub(crate) fn recording() -> Self {
        Self {
            mode: Mode::Recording(Discovered::default()),
        }
    }

    pub(crate) fn live(shared: Shared, state: State) -> Self {
        Self {
            mode: Mode::Live { shared, state },
        }
    }

    pub(crate) fn into_discovered(self) -> Discovered {
        match self.mode {
            Mode::Recording(discovered) => discovered,
            Mode::Live { .. } => Discovered::default(),
        }
    }

    /// Declare a state key with its initial value.
    ///
    /// When the caller supplied no value for `id`, the initial value is used.
    pub fn use_state<T>(&mut self, id: &str, initial: T) -> Result<StateKey<T>, EngineError>
    where
        T: Serialize + DeserializeOwned,
    {
        if id.is_empty() {
            return Err(EngineError::MissingId);
        }
        let initial = serde_json::to_value(initial)
            .map_err(|e| EngineError::serialization(format!("state '{id}'"), e))?;

        match &mut self.mode {
            Mode::Recording(discovered) => {
                discovered.states.insert(id.to_string(), initial);
            }
            Mode::Live { shared, .. } => lock(shared).seed_state(id, initial),
        }
        Ok(StateKey::new(id))
    }

    /// Bind a callback to signal records named `name`.
    ///
    /// The record's payload is decoded into `P` before the callback runs.
    pub fn use_signal<P, F>(&mut self, name: &str, callback: F) -> Result<(), EngineError>
    where
        P: DeserializeOwned + 'static,
        F: Fn(&State, P) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        if name.is_empty() {
            return Err(EngineError::MissingId);
        }

        match &mut self.mode {
            Mode::Recording(discovered) => {
                if discovered.signals.iter().any(|s| s == name) {
                    return Err(EngineError::DuplicateSignal(name.to_string()));
                }
                discovered.signals.push(name.to_string());
            }
            Mode::Live { shared, .. } => {
                let mut invocation = lock(shared);
                if invocation.signals.contains_key(name) {
                    return Err(EngineError::DuplicateSignal(name.to_string()));
                }
                let signal = name.to_string();
                invocation.signals.insert(
                    name.to_string(),
                    Arc::new(move |state: &State, payload: Value| -> anyhow::Result<()> {
                        let payload: P = serde_json::from_value(payload).map_err(|e| {
                            EngineError::serialization(format!("signal '{signal}' payload"), e)
                        })?;
                        callback(state, payload)
                    }),
                );
            }
        }
        Ok(())
    }

    /// Expose a read-only view of the state.
    ///
    /// The query is reported when `dependencies` is empty or when any listed
    /// state key changed during the invocation.
    pub fn use_query<R, F>(
        &mut self,
        name: &str,
        dependencies: &[&str],
        callback: F,
    ) -> Result<(), EngineError>
    where
        R: Serialize + 'static,
        F: Fn(&State) -> anyhow::Result<R> + Send + Sync + 'static,
    {
        if name.is_empty() {
            return Err(EngineError::MissingId);
        }

        match &mut self.mode {
            Mode::Recording(discovered) => {
                if discovered.queries.iter().any(|q| q == name) {
                    return Err(EngineError::DuplicateQuery(name.to_string()));
                }
                discovered.queries.push(name.to_string());
            }
            Mode::Live { shared, .. } => {
                let mut invocation = lock(shared);
                if invocation.queries.iter().any(|q| q.name == name) {
                    return Err(EngineError::DuplicateQuery(name.to_string()));
                }
                let query = name.to_string();
                invocation.queries.push(QueryBinding {
                    name: name.to_string(),
                    dependencies: dependencies.iter().map(|d| d.to_string()).collect(),
                    handler: Arc::new(move |state: &State| -> anyhow::Result<Value> {
                        let value = callback(state)?;
                        let value = serde_json::to_value(value)
                            .map_err(|e| EngineError::serialization(format!("query '{query}'"), e))?;
                        Ok(value)
                    }),
                });
            }
        }
        Ok(())
    }

    /// State handle for setup code that wants to read seeded values.
    ///
    /// `None` during the definition-time dry run.
    pub fn state(&self) -> Option<&State> {
        match &self.mode {
            Mode::Recording(_) => None,
            Mode::Live { state, .. } => Some(state),
        }
    }
}

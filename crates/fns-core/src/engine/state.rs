//! Typed access to the execution state map.

use std::marker::PhantomData;
use std::sync::Arc;

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use super::invocation::{Shared, lock};
use crate::error::EngineError;

/// A declared state key. Obtained from `Hooks::use_state`.
pub struct StateKey<T> {
    id: Arc<str>,
    _marker: PhantomData<fn() -> T>,
}

impl<T> StateKey<T> {
    pub(crate) fn new(id: &str) -> Self {
        Self {
            id: Arc::from(id),
            _marker: PhantomData,
        }
    }

    /// The key under which the value is stored; also the query dependency name.
    pub fn id(&self) -> &str {
        &self.id
    }
}

impl<T> Clone for StateKey<T> {
    fn clone(&self) -> Self {
        Self {
            id: Arc::clone(&self.id),
            _marker: PhantomData,
        }
    }
}

impl<T> std::fmt::Debug for StateKey<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("StateKey").field(&self.id).finish()
    }
}

/// Handle to the live state map of the current invocation.
///
/// Writes made while the history is still being replayed are dropped: the
/// caller already persisted their effect in the state it sent.
#[derive(Clone)]
pub struct State {
    shared: Shared,
}

impl State {
    pub(crate) fn new(shared: Shared) -> Self {
        Self { shared }
    }

    /// Read and decode the current value. A missing key decodes from `null`.
    pub fn get<T: DeserializeOwned>(&self, key: &StateKey<T>) -> Result<T, EngineError> {
        let raw = self.get_raw(key.id()).unwrap_or(Value::Null);
        serde_json::from_value(raw)
            .map_err(|e| EngineError::serialization(format!("state '{}'", key.id()), e))
    }

    /// The raw JSON value stored under `key`.
    pub fn get_raw(&self, key: &str) -> Option<Value> {
        lock(&self.shared).state.get(key).cloned()
    }

    pub fn set<T: Serialize>(&self, key: &StateKey<T>, value: T) -> Result<(), EngineError> {
        let value = serde_json::to_value(value)
            .map_err(|e| EngineError::serialization(format!("state '{}'", key.id()), e))?;
        lock(&self.shared).write_state(key.id(), value);
        Ok(())
    }

    /// Replace the value with `f(previous)`.
    pub fn update<T, F>(&self, key: &StateKey<T>, f: F) -> Result<(), EngineError>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce(T) -> T,
    {
        let next = f(self.get(key)?);
        self.set(key, next)
    }

    /// Whether the invocation is still consuming supplied history.
    pub fn is_replaying(&self) -> bool {
        lock(&self.shared).is_replaying()
    }
}

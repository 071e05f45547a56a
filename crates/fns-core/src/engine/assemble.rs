//! Response assembly and error classification.

use std::collections::BTreeMap;

use fns_types::error::NonRetriableError;
use fns_types::event::{ErrorInfo, Response, ResponseStatus};
use serde_json::Value;

use super::Outcome;
use super::invocation::{Shared, lock};
use super::state::State;
use super::unwind::guarded;
use crate::error::EngineError;

/// Map an error escaping user code onto the envelope's error fields.
///
/// The anyhow chain is searched, so `.context(..)` does not hide the type.
pub fn classify(err: &anyhow::Error) -> ErrorInfo {
    let (name, retryable) = if err.chain().any(|e| e.is::<NonRetriableError>()) {
        ("NonRetriableError", false)
    } else if err.chain().any(|e| e.is::<EngineError>()) {
        ("EngineError", false)
    } else {
        ("Error", true)
    };

    ErrorInfo {
        message: err.to_string(),
        stack: format!("{err:?}"),
        name: name.to_string(),
        retryable,
    }
}

/// Build the envelope for a settled body.
///
/// Queries run here, after the body, with the invocation lock released.
pub(crate) fn assemble(outcome: Outcome, shared: &Shared, state: &State, snapshot: bool) -> Response {
    let (status, result) = match outcome {
        Outcome::Completed(value) => (ResponseStatus::Completed, value),
        Outcome::Suspended => (ResponseStatus::Incomplete, Value::Null),
        Outcome::Errored(err) => return Response::failed(classify(&err)),
    };

    let (queries, changed) = {
        let invocation = lock(shared);
        (invocation.queries.clone(), invocation.changed.clone())
    };

    let mut reported = BTreeMap::new();
    for query in queries {
        let value = match guarded(|| (query.handler)(state)) {
            Ok(value) => value,
            Err(err) => {
                tracing::warn!(query = %query.name, error = %err, "query failed");
                return Response::failed(classify(&err));
            }
        };
        let relevant = query.dependencies.is_empty()
            || query.dependencies.iter().any(|dep| changed.contains(dep));
        if relevant {
            reported.insert(query.name, value);
        }
    }

    let mut invocation = lock(shared);
    let state = if snapshot {
        changed
            .iter()
            .map(|key| {
                let value = invocation.state.get(key).cloned().unwrap_or(Value::Null);
                (key.clone(), value)
            })
            .collect()
    } else {
        BTreeMap::new()
    };

    Response {
        status,
        mutations: std::mem::take(&mut invocation.mutations),
        state,
        queries: reported,
        error: None,
        result,
        logs: invocation.logs.take(),
    }
}

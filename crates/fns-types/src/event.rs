//! Invocation input (`Event`) and output (`Response`) envelopes.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::step::{Mutation, StepRecord};

// ---------------------------------------------------------------------------
// Event
// ---------------------------------------------------------------------------

/// One invocation request delivered by the orchestrator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// Execution id.
    pub id: String,
    /// Run id, distinct per retry of the same execution.
    pub run_id: String,
    /// Name of the registered function to invoke.
    pub name: String,
    /// Caller-supplied input payload.
    #[serde(default)]
    pub data: Value,
    /// Persisted step history, oldest first.
    ///
    /// Kept as raw JSON here; each entry is validated into a [`StepRecord`]
    /// when the invocation starts, so a bad record fails the invocation
    /// instead of the request.
    #[serde(default)]
    pub steps: Vec<Value>,
    /// Persisted execution state.
    #[serde(default)]
    pub state: Map<String, Value>,
    /// When true, the response echoes the state keys changed in this invocation.
    #[serde(default)]
    pub snapshot: bool,
    /// Function version the orchestrator expects.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<u32>,
    /// Registry checksum the orchestrator last saw.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checksum: Option<String>,
}

impl Event {
    /// A fresh event with no history.
    pub fn new(name: impl Into<String>, data: Value) -> Self {
        Self {
            id: String::new(),
            run_id: String::new(),
            name: name.into(),
            data,
            steps: Vec::new(),
            state: Map::new(),
            snapshot: false,
            version: None,
            checksum: None,
        }
    }

    pub fn with_ids(mut self, id: impl Into<String>, run_id: impl Into<String>) -> Self {
        self.id = id.into();
        self.run_id = run_id.into();
        self
    }

    pub fn with_steps(mut self, steps: Vec<StepRecord>) -> Self {
        self.steps = steps.into_iter().map(Value::from).collect();
        self
    }

    pub fn with_state(mut self, state: Map<String, Value>) -> Self {
        self.state = state;
        self
    }

    pub fn with_snapshot(mut self, snapshot: bool) -> Self {
        self.snapshot = snapshot;
        self
    }
}

// ---------------------------------------------------------------------------
// Response
// ---------------------------------------------------------------------------

/// Terminal status of one invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseStatus {
    /// The body returned; `result` holds its value.
    Completed,
    /// The body parked on a step; `mutations` holds the deltas to persist.
    Incomplete,
    /// The body (or a query) failed; see `error`.
    Error,
}

/// Classified failure carried in an error envelope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorInfo {
    pub message: String,
    pub stack: String,
    pub name: String,
    pub retryable: bool,
}

/// Severity of a captured user log entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

/// A log line emitted by user code through the execution logger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    pub level: LogLevel,
    pub message: String,
}

/// The envelope returned for every invocation that reached a function.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    pub status: ResponseStatus,
    pub mutations: Vec<Mutation>,
    pub state: BTreeMap<String, Value>,
    pub queries: BTreeMap<String, Value>,
    pub error: Option<ErrorInfo>,
    pub result: Value,
    #[serde(default)]
    pub logs: Vec<LogEntry>,
}

impl Response {
    /// An error envelope: everything but `error` is empty.
    pub fn failed(error: ErrorInfo) -> Self {
        Self {
            status: ResponseStatus::Error,
            mutations: Vec::new(),
            state: BTreeMap::new(),
            queries: BTreeMap::new(),
            error: Some(error),
            result: Value::Null,
            logs: Vec::new(),
        }
    }

    pub fn is_completed(&self) -> bool {
        self.status == ResponseStatus::Completed
    }
}

//! Step history records and mutations.
//!
//! A step record is one entry in the externally persisted history of an
//! execution. On the wire it looks like:
//!
//! ```json
//! { "id": "wait-10s", "type": "sleep", "params": { "timeout": 10000 },
//!   "status": "completed", "result": null }
//! ```
//!
//! The `type` + `params` pair is validated into a [`StepKind`] by
//! [`StepRecord::from_value`], so the engine never inspects untyped params on
//! the hot path. Events carry history as raw JSON; the engine validates it
//! and reports a bad record inside the response envelope.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

use crate::error::StepRecordError;

// ---------------------------------------------------------------------------
// StepType / StepStatus
// ---------------------------------------------------------------------------

/// The tag of a step kind, as it appears in the `type` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepType {
    Run,
    Sleep,
    Condition,
    Signal,
    Lock,
    Unlock,
}

impl std::fmt::Display for StepType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            StepType::Run => "run",
            StepType::Sleep => "sleep",
            StepType::Condition => "condition",
            StepType::Signal => "signal",
            StepType::Lock => "lock",
            StepType::Unlock => "unlock",
        };
        write!(f, "{s}")
    }
}

/// Lifecycle of a step record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepStatus {
    /// Emitted by the engine, not yet resolved by the caller.
    Pending,
    /// Resolved; `result` holds the recorded value.
    Completed,
}

// ---------------------------------------------------------------------------
// StepKind
// ---------------------------------------------------------------------------

/// How long a `sleep` step waits: relative or absolute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SleepParams {
    /// Relative duration in milliseconds.
    Timeout(u64),
    /// Absolute wake-up time.
    Until(DateTime<Utc>),
}

/// A step kind together with its kind-specific params.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepKind {
    Run,
    Sleep(SleepParams),
    Condition { timeout: Option<u64> },
    Signal { signal: String },
    Lock { keys: Vec<String>, timeout: Option<u64> },
    /// `keys = None` releases every held key.
    Unlock { keys: Option<Vec<String>> },
}

#[derive(Deserialize)]
struct TimeoutWire {
    #[serde(default)]
    timeout: Option<u64>,
}

#[derive(Deserialize)]
struct SleepWire {
    #[serde(default)]
    timeout: Option<u64>,
    #[serde(default)]
    until: Option<DateTime<Utc>>,
}

#[derive(Deserialize)]
struct SignalWire {
    signal: String,
}

#[derive(Deserialize)]
struct LockWire {
    keys: Vec<String>,
    #[serde(default)]
    timeout: Option<u64>,
}

#[derive(Deserialize)]
struct UnlockWire {
    #[serde(default)]
    keys: Option<Vec<String>>,
}

impl StepKind {
    /// The wire tag for this kind.
    pub fn step_type(&self) -> StepType {
        match self {
            StepKind::Run => StepType::Run,
            StepKind::Sleep(_) => StepType::Sleep,
            StepKind::Condition { .. } => StepType::Condition,
            StepKind::Signal { .. } => StepType::Signal,
            StepKind::Lock { .. } => StepType::Lock,
            StepKind::Unlock { .. } => StepType::Unlock,
        }
    }

    /// Render the params object for the wire (`null` when the kind has none).
    pub fn params(&self) -> Value {
        match self {
            StepKind::Run => Value::Null,
            StepKind::Sleep(SleepParams::Timeout(ms)) => json!({ "timeout": ms }),
            StepKind::Sleep(SleepParams::Until(at)) => json!({ "until": at }),
            StepKind::Condition { timeout: None } => Value::Null,
            StepKind::Condition { timeout: Some(ms) } => json!({ "timeout": ms }),
            StepKind::Signal { signal } => json!({ "signal": signal }),
            StepKind::Lock { keys, timeout } => {
                let mut map = Map::new();
                map.insert("keys".to_string(), json!(keys));
                if let Some(ms) = timeout {
                    map.insert("timeout".to_string(), json!(ms));
                }
                Value::Object(map)
            }
            StepKind::Unlock { keys: None } => Value::Null,
            StepKind::Unlock { keys: Some(keys) } => json!({ "keys": keys }),
        }
    }

    /// Validate a `type` + `params` pair from the wire.
    pub fn from_parts(step_type: StepType, params: Value) -> Result<Self, StepRecordError> {
        let invalid = |reason: String| StepRecordError::InvalidParams { step_type, reason };

        match step_type {
            StepType::Run => match params {
                Value::Null => Ok(StepKind::Run),
                Value::Object(map) if map.is_empty() => Ok(StepKind::Run),
                other => Err(invalid(format!("run takes no params, got {other}"))),
            },
            StepType::Sleep => {
                let wire: SleepWire = parse_params(params, step_type)?;
                match (wire.timeout, wire.until) {
                    (Some(ms), None) => Ok(StepKind::Sleep(SleepParams::Timeout(ms))),
                    (None, Some(at)) => Ok(StepKind::Sleep(SleepParams::Until(at))),
                    (Some(_), Some(_)) => Err(invalid("timeout and until are exclusive".into())),
                    (None, None) => Err(invalid("timeout or until is required".into())),
                }
            }
            StepType::Condition => {
                if params.is_null() {
                    return Ok(StepKind::Condition { timeout: None });
                }
                let wire: TimeoutWire = parse_params(params, step_type)?;
                Ok(StepKind::Condition { timeout: wire.timeout })
            }
            StepType::Signal => {
                let wire: SignalWire = parse_params(params, step_type)?;
                if wire.signal.is_empty() {
                    return Err(invalid("signal is required".into()));
                }
                Ok(StepKind::Signal { signal: wire.signal })
            }
            StepType::Lock => {
                let wire: LockWire = parse_params(params, step_type)?;
                if wire.keys.is_empty() {
                    return Err(invalid("keys must not be empty".into()));
                }
                Ok(StepKind::Lock {
                    keys: wire.keys,
                    timeout: wire.timeout,
                })
            }
            StepType::Unlock => {
                if params.is_null() {
                    return Ok(StepKind::Unlock { keys: None });
                }
                let wire: UnlockWire = parse_params(params, step_type)?;
                if wire.keys.as_ref().is_some_and(|k| k.is_empty()) {
                    return Err(invalid("keys must be omitted or non-empty".into()));
                }
                Ok(StepKind::Unlock { keys: wire.keys })
            }
        }
    }
}

fn parse_params<T: serde::de::DeserializeOwned>(
    params: Value,
    step_type: StepType,
) -> Result<T, StepRecordError> {
    if params.is_null() {
        return Err(StepRecordError::InvalidParams {
            step_type,
            reason: "params is required".to_string(),
        });
    }
    serde_json::from_value(params).map_err(|e| StepRecordError::InvalidParams {
        step_type,
        reason: e.to_string(),
    })
}

// ---------------------------------------------------------------------------
// StepRecord
// ---------------------------------------------------------------------------

/// One entry in the caller-supplied execution history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "StepRecordWire", into = "StepRecordWire")]
pub struct StepRecord {
    /// Stable identifier chosen by user code at the call site.
    pub id: String,
    /// Kind and its params.
    pub kind: StepKind,
    /// Pending or completed.
    pub status: StepStatus,
    /// Recorded value; `null` until completed.
    pub result: Value,
}

impl StepRecord {
    /// A completed record.
    pub fn completed(id: impl Into<String>, kind: StepKind, result: Value) -> Self {
        Self {
            id: id.into(),
            kind,
            status: StepStatus::Completed,
            result,
        }
    }

    /// A pending record (the echo of an engine-emitted pending mutation).
    pub fn pending(id: impl Into<String>, kind: StepKind) -> Self {
        Self {
            id: id.into(),
            kind,
            status: StepStatus::Pending,
            result: Value::Null,
        }
    }

    /// A delivered signal carrying `payload`.
    pub fn signal(id: impl Into<String>, signal: impl Into<String>, payload: Value) -> Self {
        Self::completed(
            id,
            StepKind::Signal {
                signal: signal.into(),
            },
            payload,
        )
    }

    pub fn is_signal(&self) -> bool {
        matches!(self.kind, StepKind::Signal { .. })
    }

    /// Validate one raw history entry.
    pub fn from_value(value: Value) -> Result<Self, StepRecordError> {
        let wire: StepRecordWire =
            serde_json::from_value(value).map_err(|e| StepRecordError::Malformed(e.to_string()))?;
        Self::try_from(wire)
    }
}

impl From<StepRecord> for Value {
    fn from(record: StepRecord) -> Self {
        let wire = StepRecordWire::from(record);
        json!({
            "id": wire.id,
            "type": wire.step_type,
            "params": wire.params,
            "status": wire.status,
            "result": wire.result,
        })
    }
}

#[derive(Serialize, Deserialize)]
struct StepRecordWire {
    id: String,
    #[serde(rename = "type")]
    step_type: StepType,
    #[serde(default)]
    params: Value,
    status: StepStatus,
    #[serde(default)]
    result: Value,
}

impl TryFrom<StepRecordWire> for StepRecord {
    type Error = StepRecordError;

    fn try_from(wire: StepRecordWire) -> Result<Self, Self::Error> {
        if wire.id.is_empty() {
            return Err(StepRecordError::MissingId);
        }
        Ok(Self {
            id: wire.id,
            kind: StepKind::from_parts(wire.step_type, wire.params)?,
            status: wire.status,
            result: wire.result,
        })
    }
}

impl From<StepRecord> for StepRecordWire {
    fn from(record: StepRecord) -> Self {
        Self {
            id: record.id,
            step_type: record.kind.step_type(),
            params: record.kind.params(),
            status: record.status,
            result: record.result,
        }
    }
}

// ---------------------------------------------------------------------------
// Mutation
// ---------------------------------------------------------------------------

/// A delta the caller must durably record before the next invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "MutationWire", into = "MutationWire")]
pub enum Mutation {
    /// A brand-new step that has not started yet.
    Pending { id: String, kind: StepKind },
    /// A step that resolved during this invocation.
    Completed {
        id: String,
        result: Value,
        /// Wall time spent in the step's perform callback, in milliseconds.
        elapsed: u64,
    },
}

impl Mutation {
    pub fn id(&self) -> &str {
        match self {
            Mutation::Pending { id, .. } | Mutation::Completed { id, .. } => id,
        }
    }

    pub fn is_pending(&self) -> bool {
        matches!(self, Mutation::Pending { .. })
    }
}

#[derive(Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
enum MutationWire {
    Pending {
        id: String,
        #[serde(rename = "type")]
        step_type: StepType,
        #[serde(default)]
        params: Value,
    },
    Completed {
        id: String,
        #[serde(default)]
        result: Value,
        elapsed: u64,
    },
}

impl TryFrom<MutationWire> for Mutation {
    type Error = StepRecordError;

    fn try_from(wire: MutationWire) -> Result<Self, Self::Error> {
        Ok(match wire {
            MutationWire::Pending {
                id,
                step_type,
                params,
            } => Mutation::Pending {
                id,
                kind: StepKind::from_parts(step_type, params)?,
            },
            MutationWire::Completed {
                id,
                result,
                elapsed,
            } => Mutation::Completed {
                id,
                result,
                elapsed,
            },
        })
    }
}

impl From<Mutation> for MutationWire {
    fn from(mutation: Mutation) -> Self {
        match mutation {
            Mutation::Pending { id, kind } => MutationWire::Pending {
                id,
                step_type: kind.step_type(),
                params: kind.params(),
            },
            Mutation::Completed {
                id,
                result,
                elapsed,
            } => MutationWire::Completed {
                id,
                result,
                elapsed,
            },
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

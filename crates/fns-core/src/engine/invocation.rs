//! Per-invocation shared state.
//!
//! Every handle given to user code (`Step`, `State`, `Logger`, the live
//! `Hooks`) points at one `Invocation` behind an `Arc<Mutex<_>>`. The lock is
//! only taken for short bookkeeping sections: never across an `.await`, and
//! never while a user callback runs.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use fns_types::config::LogLimits;
use fns_types::step::{Mutation, StepKind, StepRecord};
use serde_json::{Map, Value};

use super::logger::LogBuffer;
use super::state::State;
use super::unwind::guarded;
use crate::error::EngineError;

pub(crate) type Shared = Arc<Mutex<Invocation>>;

/// Signal callback with its payload already decoded by the hook wrapper.
pub(crate) type SignalHandler = Arc<dyn Fn(&State, Value) -> anyhow::Result<()> + Send + Sync>;

/// Query callback returning its already-serialized value.
pub(crate) type QueryHandler = Arc<dyn Fn(&State) -> anyhow::Result<Value> + Send + Sync>;

#[derive(Clone)]
pub(crate) struct QueryBinding {
    pub name: String,
    pub dependencies: Vec<String>,
    pub handler: QueryHandler,
}

pub(crate) struct Invocation {
    history: Vec<StepRecord>,
    /// Position of the next record to consume.
    cursor: usize,
    /// Set once a step suspends; later step calls suspend without consuming.
    pub parked: bool,
    /// Number of step `perform` futures currently being driven.
    pub in_flight: usize,
    pub state: Map<String, Value>,
    pub changed: BTreeSet<String>,
    pub mutations: Vec<Mutation>,
    pub signals: BTreeMap<String, SignalHandler>,
    pub queries: Vec<QueryBinding>,
    pub mutexes: BTreeSet<String>,
    pub logs: LogBuffer,
}

impl Invocation {
    pub fn new(history: Vec<StepRecord>, state: Map<String, Value>, limits: LogLimits) -> Self {
        Self {
            history,
            cursor: 0,
            parked: false,
            in_flight: 0,
            state,
            changed: BTreeSet::new(),
            mutations: Vec::new(),
            signals: BTreeMap::new(),
            queries: Vec::new(),
            mutexes: BTreeSet::new(),
            logs: LogBuffer::new(limits),
        }
    }

    pub fn into_shared(self) -> Shared {
        Arc::new(Mutex::new(self))
    }

    /// True while the cursor is still behind the end of the supplied history.
    pub fn is_replaying(&self) -> bool {
        self.cursor < self.history.len()
    }

    /// Consume the record at the cursor (if any), returning it with its position.
    pub fn advance(&mut self) -> (usize, Option<StepRecord>) {
        let position = self.cursor;
        let record = self.history.get(position).cloned();
        self.cursor += 1;
        (position, record)
    }

    /// If the record at the cursor is a signal, consume it.
    fn next_signal(&mut self) -> Option<(String, Value)> {
        let record = self.history.get(self.cursor)?;
        let StepKind::Signal { signal } = &record.kind else {
            return None;
        };
        let delivery = (signal.clone(), record.result.clone());
        self.cursor += 1;
        Some(delivery)
    }

    /// Write `value` under `key` and mark it changed, unless replaying.
    pub fn write_state(&mut self, key: &str, value: Value) {
        if self.is_replaying() {
            return;
        }
        self.state.insert(key.to_string(), value);
        self.changed.insert(key.to_string());
    }

    /// Fill `key` with its initial value if the caller did not supply one.
    pub fn seed_state(&mut self, key: &str, initial: Value) {
        if self.state.contains_key(key) {
            return;
        }
        self.state.insert(key.to_string(), initial);
        if !self.is_replaying() {
            self.changed.insert(key.to_string());
        }
    }

    pub fn park(&mut self) {
        self.parked = true;
    }
}

/// Lock the invocation, recovering the guard if a user callback panicked.
pub(crate) fn lock(shared: &Shared) -> MutexGuard<'_, Invocation> {
    shared.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Deliver every consecutive signal record at the cursor.
///
/// The lock is released before each callback so handlers can use `State`.
pub(crate) fn drain_signals(shared: &Shared, state: &State) -> anyhow::Result<()> {
    loop {
        let (name, payload, handler) = {
            let mut invocation = lock(shared);
            let Some((name, payload)) = invocation.next_signal() else {
                return Ok(());
            };
            let handler = invocation
                .signals
                .get(&name)
                .cloned()
                .ok_or_else(|| EngineError::SignalNotFound(name.clone()))?;
            (name, payload, handler)
        };

        tracing::debug!(signal = %name, "delivering signal");
        guarded(|| handler(state, payload))?;
    }
}

/// Marks a step `perform` as in flight for as long as the guard lives.
///
/// The tick race only abandons the body when no perform is running.
pub(crate) struct InFlight {
    shared: Shared,
}

impl InFlight {
    pub fn enter(shared: &Shared) -> Self {
        lock(shared).in_flight += 1;
        Self {
            shared: Arc::clone(shared),
        }
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        let mut invocation = lock(&self.shared);
        invocation.in_flight = invocation.in_flight.saturating_sub(1);
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn invocation(history: Vec<StepRecord>) -> Invocation {
        Invocation::new(history, Map::new(), LogLimits::default())
    }

    #[test]
    fn test_writes_are_ignored_while_replaying() {
        let mut inv = invocation(vec![StepRecord::completed("a", StepKind::Run, json!(1))]);
        inv.write_state("counter", json!(5));
        assert!(inv.state.is_empty());
        assert!(inv.changed.is_empty());

        inv.advance();
        inv.write_state("counter", json!(5));
        assert_eq!(inv.state.get("counter"), Some(&json!(5)));
        assert!(inv.changed.contains("counter"));
    }

    #[test]
    fn test_seed_fills_hole_but_only_marks_changed_when_live() {
        let mut replaying = invocation(vec![StepRecord::completed("a", StepKind::Run, json!(1))]);
        replaying.seed_state("counter", json!(0));
        assert_eq!(replaying.state.get("counter"), Some(&json!(0)));
        assert!(replaying.changed.is_empty());

        let mut live = invocation(vec![]);
        live.seed_state("counter", json!(0));
        assert!(live.changed.contains("counter"));
    }

    #[test]
    fn test_seed_keeps_supplied_value() {
        let mut state = Map::new();
        state.insert("counter".into(), json!(3));
        let mut inv = Invocation::new(vec![], state, LogLimits::default());
        inv.seed_state("counter", json!(0));
        assert_eq!(inv.state.get("counter"), Some(&json!(3)));
        assert!(inv.changed.is_empty());
    }

    #[test]
    fn test_advance_moves_past_end_of_history() {
        let mut inv = invocation(vec![StepRecord::completed("a", StepKind::Run, json!(1))]);
        let (position, record) = inv.advance();
        assert_eq!(position, 0);
        assert_eq!(record.map(|r| r.id), Some("a".to_string()));
        let (position, record) = inv.advance();
        assert_eq!(position, 1);
        assert!(record.is_none());
        assert!(!inv.is_replaying());
    }

    #[test]
    fn test_in_flight_guard_balances() {
        let shared = invocation(vec![]).into_shared();
        {
            let _a = InFlight::enter(&shared);
            let _b = InFlight::enter(&shared);
            assert_eq!(lock(&shared).in_flight, 2);
        }
        assert_eq!(lock(&shared).in_flight, 0);
    }

    #[test]
    fn test_unknown_signal_is_an_engine_error() {
        let shared = invocation(vec![StepRecord::signal("s", "unlock", Value::Null)]).into_shared();
        let state = State::new(Arc::clone(&shared));
        let err = drain_signals(&shared, &state).unwrap_err();
        assert_eq!(err.to_string(), "Signal unlock not found");
        assert!(err.downcast_ref::<EngineError>().is_some());
    }

    #[test]
    fn test_drains_consecutive_signals_only() {
        let shared = invocation(vec![
            StepRecord::signal("s1", "bump", json!(1)),
            StepRecord::signal("s2", "bump", json!(2)),
            StepRecord::completed("a", StepKind::Run, json!(null)),
            StepRecord::signal("s3", "bump", json!(3)),
        ])
        .into_shared();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        lock(&shared).signals.insert(
            "bump".into(),
            Arc::new(move |_state: &State, payload: Value| -> anyhow::Result<()> {
                sink.lock().unwrap().push(payload);
                Ok(())
            }),
        );
        let state = State::new(Arc::clone(&shared));

        drain_signals(&shared, &state).unwrap();
        assert_eq!(*seen.lock().unwrap(), vec![json!(1), json!(2)]);
        assert_eq!(lock(&shared).advance().0, 2);
    }
}

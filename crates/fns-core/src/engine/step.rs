//! Step primitives and the memoization core they share.
//!
//! Every primitive goes through `Step::memo`, which consumes one history
//! position per call:
//!
//! 1. If an earlier step already parked this invocation, suspend.
//! 2. Take the record at the cursor, then deliver any signals behind it.
//! 3. No record: emit a pending mutation and suspend.
//! 4. Id mismatch: replay divergence (fatal).
//! 5. Completed record: return its result.
//! 6. Pending record: run `perform`; if it produced a value, emit a completed
//!    mutation. Suspend either way so the caller persists it first.
//!
//! A step started from inside another step's `perform` could never resolve,
//! so it fails the invocation instead.

use std::collections::BTreeSet;
use std::future::Future;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use fns_types::step::{Mutation, SleepParams, StepKind, StepStatus};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use super::invocation::{InFlight, Invocation, Shared, drain_signals, lock};
use super::state::State;
use super::suspend::suspend;
use crate::clock::{Clock, elapsed_ms};
use crate::duration::Duration;
use crate::error::EngineError;

tokio::task_local! {
    /// Id of the step whose `perform` is being polled.
    static PERFORMING: String;
}

/// Step handle given to the function body.
#[derive(Clone)]
pub struct Step {
    shared: Shared,
    state: State,
    clock: Arc<dyn Clock>,
}

impl Step {
    pub(crate) fn new(shared: Shared, state: State, clock: Arc<dyn Clock>) -> Self {
        Self {
            shared,
            state,
            clock,
        }
    }

    async fn memo<P, Fut, R>(
        &self,
        id: &str,
        kind: StepKind,
        perform: P,
        on_result: R,
    ) -> anyhow::Result<Value>
    where
        P: FnOnce() -> Fut,
        Fut: Future<Output = anyhow::Result<Option<Value>>>,
        R: FnOnce(&mut Invocation, &Value),
    {
        if id.is_empty() {
            return Err(EngineError::MissingId.into());
        }
        if let Ok(outer) = PERFORMING.try_with(String::clone) {
            return Err(EngineError::NestedStep {
                inner: id.to_string(),
                outer,
            }
            .into());
        }

        let taken = {
            let mut invocation = lock(&self.shared);
            (!invocation.parked).then(|| invocation.advance())
        };
        let Some((position, record)) = taken else {
            return suspend().await;
        };

        drain_signals(&self.shared, &self.state)?;

        let Some(record) = record else {
            {
                let mut invocation = lock(&self.shared);
                tracing::debug!(step_id = %id, step_type = %kind.step_type(), "step pending");
                invocation.mutations.push(Mutation::Pending {
                    id: id.to_string(),
                    kind,
                });
                invocation.park();
            }
            return suspend().await;
        };

        if record.id != id {
            return Err(EngineError::ReplayDivergence {
                position,
                expected: id.to_string(),
                found: record.id,
            }
            .into());
        }

        if record.status == StepStatus::Completed {
            on_result(&mut lock(&self.shared), &record.result);
            return Ok(record.result);
        }

        let start = self.clock.now();
        let produced = {
            let _in_flight = InFlight::enter(&self.shared);
            PERFORMING.scope(id.to_string(), perform()).await?
        };

        {
            let mut invocation = lock(&self.shared);
            if let Some(result) = produced {
                let elapsed = elapsed_ms(start, self.clock.now());
                tracing::debug!(step_id = %id, elapsed, "step completed");
                on_result(&mut invocation, &result);
                invocation.mutations.push(Mutation::Completed {
                    id: id.to_string(),
                    result,
                    elapsed,
                });
            }
            invocation.park();
        }
        suspend().await
    }

    /// Run `f` once and memoize its result.
    pub async fn run<T, F, Fut>(&self, id: &str, f: F) -> anyhow::Result<T>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = anyhow::Result<T>>,
    {
        let value = self
            .memo(
                id,
                StepKind::Run,
                || async move {
                    let output = f().await?;
                    let value = serde_json::to_value(output)
                        .map_err(|e| EngineError::serialization(format!("step '{id}' result"), e))?;
                    anyhow::Ok(Some(value))
                },
                |_, _| {},
            )
            .await?;
        decode(id, value)
    }

    /// Wait for `duration`. The scheduler completes the step; the engine never waits.
    pub async fn sleep(&self, id: &str, duration: impl Into<Duration>) -> anyhow::Result<()> {
        let ms = duration.into().as_millis()?;
        tracing::trace!(step_id = %id, duration = %crate::duration::format(ms as f64, true), "sleep requested");
        self.wait(id, StepKind::Sleep(SleepParams::Timeout(ms))).await
    }

    /// Wait until an absolute point in time.
    pub async fn sleep_until(&self, id: &str, until: DateTime<Utc>) -> anyhow::Result<()> {
        self.wait(id, StepKind::Sleep(SleepParams::Until(until))).await
    }

    async fn wait(&self, id: &str, kind: StepKind) -> anyhow::Result<()> {
        self.memo(id, kind, external, |_, _| {}).await?;
        Ok(())
    }

    /// Complete once `predicate` holds, re-checking on every invocation.
    ///
    /// With a timeout the scheduler may complete the step with `false`.
    pub async fn condition<F>(
        &self,
        id: &str,
        predicate: F,
        timeout: Option<Duration>,
    ) -> anyhow::Result<bool>
    where
        F: FnOnce(&State) -> anyhow::Result<bool>,
    {
        let timeout = timeout.map(|t| t.as_millis()).transpose()?;
        let state = self.state.clone();
        let value = self
            .memo(
                id,
                StepKind::Condition { timeout },
                || async move {
                    let holds = predicate(&state)?;
                    anyhow::Ok(holds.then_some(Value::Bool(true)))
                },
                |_, _| {},
            )
            .await?;
        Ok(is_truthy(&value))
    }

    /// Record intent to hold `keys`. Completed by the orchestrator.
    pub async fn lock(
        &self,
        id: &str,
        keys: &[&str],
        timeout: Option<Duration>,
    ) -> anyhow::Result<bool> {
        if keys.is_empty() {
            return Err(EngineError::EmptyLockKeys.into());
        }
        let timeout = timeout.map(|t| t.as_millis()).transpose()?;
        let keys: Vec<String> = keys.iter().map(|k| k.to_string()).collect();
        let acquired = keys.clone();
        let value = self
            .memo(
                id,
                StepKind::Lock { keys, timeout },
                external,
                move |invocation, result| {
                    if is_truthy(result) {
                        invocation.mutexes.extend(acquired);
                    }
                },
            )
            .await?;
        Ok(is_truthy(&value))
    }

    /// Release `keys`, or every held key when `None`.
    pub async fn unlock(&self, id: &str, keys: Option<&[&str]>) -> anyhow::Result<()> {
        let keys: Option<Vec<String>> = match keys {
            Some([]) => return Err(EngineError::EmptyLockKeys.into()),
            Some(keys) => Some(keys.iter().map(|k| k.to_string()).collect()),
            None => None,
        };
        let released = keys.clone();
        self.memo(
            id,
            StepKind::Unlock { keys },
            external,
            move |invocation, _| match released {
                Some(keys) => {
                    for key in &keys {
                        invocation.mutexes.remove(key);
                    }
                }
                None => invocation.mutexes.clear(),
            },
        )
        .await?;
        Ok(())
    }

    /// Iterate `1, 2, ...`, sleeping `every` between items on steps `"{id}-{n}"`.
    pub fn repeat(&self, id: &str, every: impl Into<Duration>, times: Option<u64>) -> Repeat {
        Repeat {
            step: self.clone(),
            id: id.to_string(),
            every: every.into(),
            times,
            count: 0,
        }
    }

    /// Keys currently held according to replayed lock/unlock steps.
    pub fn held_locks(&self) -> BTreeSet<String> {
        lock(&self.shared).mutexes.clone()
    }
}

/// Perform for steps the orchestrator completes: nothing happens in-engine.
fn external() -> std::future::Ready<anyhow::Result<Option<Value>>> {
    std::future::ready(Ok(None))
}

fn decode<T: DeserializeOwned>(id: &str, value: Value) -> anyhow::Result<T> {
    serde_json::from_value(value)
        .map_err(|e| EngineError::serialization(format!("step '{id}' result"), e).into())
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

// ---------------------------------------------------------------------------
// Repeat
// ---------------------------------------------------------------------------

/// Handle returned by [`Step::repeat`].
pub struct Repeat {
    step: Step,
    id: String,
    every: Duration,
    times: Option<u64>,
    count: u64,
}

impl Repeat {
    /// The next iteration number, or `None` once `times` iterations ran.
    pub async fn next(&mut self) -> anyhow::Result<Option<u64>> {
        if self.count > 0 {
            if self.times.is_some_and(|times| self.count >= times) {
                return Ok(None);
            }
            let id = format!("{}-{}", self.id, self.count);
            self.step.sleep(&id, self.every.clone()).await?;
        }
        self.count += 1;
        Ok(Some(self.count))
    }
}

#[cfg(test)]
mod tests {
    use fns_types::config::LogLimits;
    use fns_types::step::{StepRecord, StepStatus};
    use futures_util::FutureExt;
    use serde_json::{Map, json};

    use super::*;
    use crate::clock::FixedClock;

    fn step_for(history: Vec<StepRecord>) -> (Shared, Step) {
        let shared = Invocation::new(history, Map::new(), LogLimits::default()).into_shared();
        let step = Step::new(
            shared.clone(),
            State::new(shared.clone()),
            Arc::new(FixedClock::default()),
        );
        (shared, step)
    }

    #[tokio::test]
    async fn test_completed_run_returns_recorded_value() {
        let (shared, step) = step_for(vec![StepRecord::completed("a", StepKind::Run, json!("lucas"))]);
        let name: String = step
            .run("a", || async { anyhow::Ok("ignored".to_string()) })
            .await
            .unwrap();
        assert_eq!(name, "lucas");
        assert!(lock(&shared).mutations.is_empty());
    }

    #[tokio::test]
    async fn test_new_step_parks_with_pending_mutation() {
        let (shared, step) = step_for(vec![]);
        let parked = step
            .run("a", || async { anyhow::Ok(1) })
            .now_or_never();
        assert!(parked.is_none());
        let invocation = lock(&shared);
        assert!(invocation.parked);
        assert_eq!(
            invocation.mutations,
            vec![Mutation::Pending {
                id: "a".into(),
                kind: StepKind::Run
            }]
        );
    }

    #[tokio::test]
    async fn test_pending_run_completes_then_parks() {
        let (shared, step) = step_for(vec![StepRecord::pending("a", StepKind::Run)]);
        let parked = step
            .run("a", || async { anyhow::Ok(7) })
            .now_or_never();
        assert!(parked.is_none());
        assert_eq!(
            lock(&shared).mutations,
            vec![Mutation::Completed {
                id: "a".into(),
                result: json!(7),
                elapsed: 0
            }]
        );
    }

    #[tokio::test]
    async fn test_divergent_id_is_fatal() {
        let (_, step) = step_for(vec![StepRecord::completed("a", StepKind::Run, json!(1))]);
        let err = step
            .run("b", || async { anyhow::Ok(1) })
            .await
            .map(|_: i32| ())
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<EngineError>(),
            Some(EngineError::ReplayDivergence { position: 0, .. })
        ));
    }

    #[tokio::test]
    async fn test_step_inside_perform_is_rejected() {
        let (shared, step) = step_for(vec![StepRecord::pending("outer", StepKind::Run)]);
        let nested = step.clone();
        let err = step
            .run("outer", || async move {
                nested.run("inner", || async { anyhow::Ok(1) }).await
            })
            .await
            .map(|_: i32| ())
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<EngineError>(),
            Some(EngineError::NestedStep { inner, outer }) if inner == "inner" && outer == "outer"
        ));
        assert_eq!(lock(&shared).in_flight, 0);
    }

    #[tokio::test]
    async fn test_parked_invocation_suspends_later_steps() {
        let (shared, step) = step_for(vec![]);
        assert!(step.sleep("first", "1s").now_or_never().is_none());
        assert!(step.sleep("second", "1s").now_or_never().is_none());
        assert_eq!(lock(&shared).mutations.len(), 1);
    }

    #[tokio::test]
    async fn test_sleep_emits_timeout_in_millis() {
        let (shared, step) = step_for(vec![]);
        assert!(step.sleep("wait-10s", "10s").now_or_never().is_none());
        assert_eq!(
            lock(&shared).mutations[0],
            Mutation::Pending {
                id: "wait-10s".into(),
                kind: StepKind::Sleep(SleepParams::Timeout(10_000))
            }
        );
    }

    #[tokio::test]
    async fn test_invalid_duration_is_rejected() {
        let (_, step) = step_for(vec![]);
        let err = step.sleep("wait", "soon").await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<EngineError>(),
            Some(EngineError::InvalidDuration(_))
        ));
    }

    #[tokio::test]
    async fn test_false_condition_parks_without_mutation() {
        let (shared, step) = step_for(vec![StepRecord::pending(
            "wait",
            StepKind::Condition { timeout: None },
        )]);
        assert!(step.condition("wait", |_| Ok(false), None).now_or_never().is_none());
        assert!(lock(&shared).mutations.is_empty());
    }

    #[tokio::test]
    async fn test_lock_and_unlock_track_mutexes() {
        let (_, step) = step_for(vec![
            StepRecord::completed(
                "lock",
                StepKind::Lock {
                    keys: vec!["k".into(), "j".into()],
                    timeout: None,
                },
                json!(true),
            ),
            StepRecord::completed(
                "unlock-k",
                StepKind::Unlock {
                    keys: Some(vec!["k".into()]),
                },
                Value::Null,
            ),
        ]);
        assert!(step.lock("lock", &["k", "j"], None).await.unwrap());
        assert_eq!(step.held_locks().len(), 2);
        step.unlock("unlock-k", Some(&["k"][..])).await.unwrap();
        assert_eq!(step.held_locks().into_iter().collect::<Vec<_>>(), vec!["j"]);
    }

    #[tokio::test]
    async fn test_empty_lock_keys_are_rejected() {
        let (_, step) = step_for(vec![]);
        assert!(step.lock("lock", &[], None).await.is_err());
        assert!(step.unlock("unlock", Some(&[][..])).await.is_err());
    }

    #[tokio::test]
    async fn test_repeat_sleeps_between_iterations() {
        let (shared, step) = step_for(vec![StepRecord::completed(
            "tick-1",
            StepKind::Sleep(SleepParams::Timeout(1000)),
            Value::Null,
        )]);
        let mut ticks = step.repeat("tick", "1s", Some(3));
        assert_eq!(ticks.next().await.unwrap(), Some(1));
        assert_eq!(ticks.next().await.unwrap(), Some(2));
        assert!(ticks.next().now_or_never().is_none());

        let invocation = lock(&shared);
        assert_eq!(invocation.mutations[0].id(), "tick-2");
        assert!(invocation.mutations[0].is_pending());
    }

    #[tokio::test]
    async fn test_repeat_stops_after_times() {
        let (_, step) = step_for(vec![]);
        let mut once = step.repeat("once", 1000u64, Some(1));
        assert_eq!(once.next().await.unwrap(), Some(1));
        assert_eq!(once.next().await.unwrap(), None);
    }

    #[test]
    fn test_truthiness_matches_json_semantics() {
        assert!(!is_truthy(&Value::Null));
        assert!(!is_truthy(&json!(false)));
        assert!(!is_truthy(&json!(0)));
        assert!(!is_truthy(&json!("")));
        assert!(is_truthy(&json!(true)));
        assert!(is_truthy(&json!({})));
    }

    #[test]
    fn test_record_status_is_read_from_history() {
        let record = StepRecord::pending("a", StepKind::Run);
        assert_eq!(record.status, StepStatus::Pending);
    }
}

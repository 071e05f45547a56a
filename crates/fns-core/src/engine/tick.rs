//! Execute-within-tick race.
//!
//! Polls the body until it either returns or is left waiting on nothing but
//! suspensions. Each poll is one scheduling turn. When the body is pending and
//! no step `perform` is running, nothing can wake it in this invocation, so it
//! is abandoned. When a perform is running (real async work inside `run`),
//! the race waits for its waker instead. No timers are involved.
//!
//! A panic while polling the body settles the race with a [`Panicked`] error.

use std::future::poll_fn;
use std::panic::AssertUnwindSafe;
use std::task::Poll;

use futures_util::FutureExt;
use futures_util::future::BoxFuture;
use serde_json::Value;

use super::invocation::{Shared, lock};
use super::unwind::Panicked;

/// How the body left the race.
pub(crate) enum Settled {
    Returned(anyhow::Result<Value>),
    Parked,
}

pub(crate) async fn race(shared: &Shared, body: BoxFuture<'static, anyhow::Result<Value>>) -> Settled {
    let mut body = AssertUnwindSafe(body).catch_unwind();
    poll_fn(|cx| match body.poll_unpin(cx) {
        Poll::Ready(Ok(result)) => Poll::Ready(Settled::Returned(result)),
        Poll::Ready(Err(payload)) => {
            let panicked = Panicked::from_payload(payload);
            tracing::warn!(error = %panicked, "function body panicked");
            Poll::Ready(Settled::Returned(Err(panicked.into())))
        }
        Poll::Pending if lock(shared).in_flight == 0 => Poll::Ready(Settled::Parked),
        Poll::Pending => Poll::Pending,
    })
    .await
}

#[cfg(test)]
mod tests {
    use fns_types::config::LogLimits;
    use serde_json::{Map, json};

    use super::*;
    use crate::engine::invocation::{InFlight, Invocation};
    use crate::engine::suspend::suspend;

    fn shared() -> Shared {
        Invocation::new(vec![], Map::new(), LogLimits::default()).into_shared()
    }

    #[tokio::test]
    async fn test_ready_body_returns() {
        let shared = shared();
        let settled = race(&shared, Box::pin(async { Ok::<_, anyhow::Error>(json!("done")) })).await;
        assert!(matches!(settled, Settled::Returned(Ok(v)) if v == json!("done")));
    }

    #[tokio::test]
    async fn test_suspended_body_parks() {
        let shared = shared();
        let settled = race(
            &shared,
            Box::pin(async {
                suspend::<()>().await;
                Ok::<_, anyhow::Error>(Value::Null)
            }),
        )
        .await;
        assert!(matches!(settled, Settled::Parked));
    }

    #[tokio::test]
    async fn test_in_flight_work_is_awaited() {
        let shared = shared();
        let inner = shared.clone();
        let settled = race(
            &shared,
            Box::pin(async move {
                let value = {
                    let _guard = InFlight::enter(&inner);
                    tokio::time::sleep(std::time::Duration::from_millis(5)).await;
                    json!(42)
                };
                Ok::<_, anyhow::Error>(value)
            }),
        )
        .await;
        assert!(matches!(settled, Settled::Returned(Ok(v)) if v == json!(42)));
    }

    #[tokio::test]
    async fn test_panicking_body_settles_with_error() {
        let shared = shared();
        let settled = race(
            &shared,
            Box::pin(async {
                let missing: Option<u32> = None;
                let n = missing.unwrap();
                Ok::<_, anyhow::Error>(json!(n))
            }),
        )
        .await;
        match settled {
            Settled::Returned(Err(err)) => assert!(err.downcast_ref::<Panicked>().is_some()),
            _ => panic!("expected a panic error"),
        }
    }

    #[tokio::test]
    async fn test_body_error_is_returned() {
        let shared = shared();
        let settled = race(&shared, Box::pin(async { Err::<Value, _>(anyhow::anyhow!("boom")) })).await;
        assert!(matches!(settled, Settled::Returned(Err(e)) if e.to_string() == "boom"));
    }
}

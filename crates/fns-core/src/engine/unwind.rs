//! Panics in user code become ordinary (retryable) errors.

use std::any::Any;
use std::panic::{AssertUnwindSafe, catch_unwind};

/// A panic raised by a function body, hook callback, or step perform.
#[derive(Debug, thiserror::Error)]
#[error("function panicked: {0}")]
pub struct Panicked(pub String);

impl Panicked {
    pub(crate) fn from_payload(payload: Box<dyn Any + Send>) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&str>() {
            (*s).to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "unknown panic payload".to_string()
        };
        Self(message)
    }
}

/// Run a synchronous user callback, turning a panic into an error.
///
/// Shared invocation state stays usable afterwards: the lock is never held
/// across user callbacks and poisoning is recovered in `invocation::lock`.
pub(crate) fn guarded<T>(f: impl FnOnce() -> anyhow::Result<T>) -> anyhow::Result<T> {
    catch_unwind(AssertUnwindSafe(f)).unwrap_or_else(|payload| {
        let panicked = Panicked::from_payload(payload);
        tracing::warn!(error = %panicked, "user callback panicked");
        Err(panicked.into())
    })
}

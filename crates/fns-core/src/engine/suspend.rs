//! The suspension primitive: a future that never completes.
//!
//! A step that cannot make progress in this invocation returns a
//! `Suspension`. The body stays parked on it until the tick race drops the
//! whole body future, so nothing after the suspension point ever runs.

use std::future::Future;
use std::marker::PhantomData;
use std::pin::Pin;
use std::task::{Context, Poll};

pub(crate) struct Suspension<T> {
    _marker: PhantomData<fn() -> T>,
}

pub(crate) fn suspend<T>() -> Suspension<T> {
    Suspension {
        _marker: PhantomData,
    }
}

impl<T> Future for Suspension<T> {
    type Output = T;

    fn poll(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<T> {
        Poll::Pending
    }
}

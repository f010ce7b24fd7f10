/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 *
 * This source code is licensed under both the MIT license found in the
 * LICENSE-MIT file in the root directory of this source tree and the Apache
 * License, Version 2.0 found in the LICENSE-APACHE file in the root directory
 * of this source tree.
 */

//! One-shot future with JS promise settlement semantics.
//!
//! A `Deferred<T>` is settled exactly once, by `resolve` or `reject`, from
//! anywhere that holds a handle. The consumer either awaits it (the handle is
//! a `Future`) or registers at most one `then` and at most one `catch`
//! continuation; the two consumption styles are mutually exclusive on one
//! instance.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::Context;
use std::task::Poll;

use dupe::Clone_;
use dupe::Dupe_;
use parking_lot::Mutex;

use crate::details::shared_state::DeferredState;
use crate::details::shared_state::Delivery;
use crate::error::Error;

/// Handle to a one-shot settlement slot, shared by producer, consumer and any
/// stored continuations. All handles are equal; dropping one does not settle
/// or cancel anything.
#[derive(Clone_, Dupe_)]
pub struct Deferred<T> {
    state: Arc<Mutex<DeferredState<T>>>,
}

impl<T> std::fmt::Debug for Deferred<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Deferred").finish_non_exhaustive()
    }
}

impl<T> Deferred<T>
where
    T: Send + 'static,
{
    /// An unsettled Deferred, to be settled later through any handle.
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(DeferredState::new())),
        }
    }

    /// Settle with a value. If a consumer is parked it is woken and will take
    /// the value; if a `then` continuation is registered it runs right here,
    /// on the caller's stack; otherwise the value is stored for the eventual
    /// consumer. Settling an already-settled Deferred is a no-op.
    pub fn resolve(&self, value: T) {
        let delivery = self.state.lock().resolve(value);
        run_delivery(delivery);
    }

    /// Settle with a failure, accepting either a prebuilt [`Error`] or a
    /// message string. The parked awaiter observes it as `Err` from the
    /// await; a registered `catch` continuation runs on the caller's stack.
    pub fn reject(&self, error: impl Into<Error>) {
        let delivery = self.state.lock().reject(error.into());
        run_delivery(delivery);
    }

    /// Register the single-shot value continuation. Runs immediately if the
    /// value is already stored. Fails once a consumer has awaited this
    /// Deferred; continuations and awaiting cannot be combined.
    pub fn then(&self, callback: impl FnOnce(T) + Send + 'static) -> Result<(), Error> {
        let immediate = self.state.lock().then(Box::new(callback))?;
        if let Some((callback, value)) = immediate {
            callback(value);
        }
        Ok(())
    }

    /// Register the single-shot failure continuation, symmetric to [`then`].
    ///
    /// [`then`]: Deferred::then
    pub fn catch(&self, callback: impl FnOnce(Error) + Send + 'static) -> Result<(), Error> {
        let immediate = self.state.lock().catch(Box::new(callback))?;
        if let Some((callback, error)) = immediate {
            callback(error);
        }
        Ok(())
    }

    /// Whether the first resolve or reject has happened. Useful for wrappers
    /// that must decide whether external work still needs cancelling.
    pub fn is_settled(&self) -> bool {
        self.state.lock().is_settled()
    }
}

impl<T> Default for Deferred<T>
where
    T: Send + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

/// Run the continuation or wake the parked consumer. Called with the state
/// lock already released; continuations execute arbitrary user code.
fn run_delivery<T>(delivery: Option<Delivery<T>>) {
    match delivery {
        None => {}
        Some(Delivery::Wake(waker)) => waker.wake(),
        Some(Delivery::Value(callback, value)) => callback(value),
        Some(Delivery::Error(callback, error)) => callback(error),
    }
}

/// The awaitable contract. Ready iff a settlement is stored; a failure is
/// re-raised as `Err`, a value is moved out as `Ok`. The first pending poll
/// parks the consumer; settlement wakes it and the next poll delivers.
///
/// A Deferred must not be awaited more than once: after the settlement is
/// delivered the slot is empty and a second await parks forever.
impl<T> Future for Deferred<T> {
    type Output = Result<T, Error>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        self.state.lock().poll(cx)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicBool;
    use std::sync::atomic::AtomicI32;
    use std::sync::atomic::Ordering;
    use std::sync::Arc;

    use assert_matches::assert_matches;
    use dupe::Dupe;
    use futures::pin_mut;
    use futures::poll;

    use super::*;

    #[tokio::test]
    async fn test_resolve_before_await() {
        let deferred = Deferred::new();
        deferred.resolve(42);
        assert_eq!(deferred.await, Ok(42));
    }

    #[tokio::test]
    async fn test_resolve_after_park() {
        let deferred = Deferred::new();
        let settler = deferred.dupe();
        let fut = deferred;
        pin_mut!(fut);
        assert_matches!(poll!(&mut fut), Poll::Pending);
        settler.resolve(42);
        assert_matches!(poll!(&mut fut), Poll::Ready(Ok(42)));
    }

    #[tokio::test]
    async fn test_reject_before_await() {
        let deferred: Deferred<i32> = Deferred::new();
        deferred.reject("boom");
        assert_eq!(deferred.await, Err(Error::User("boom".to_owned())));
    }

    #[tokio::test]
    async fn test_reject_after_park() {
        let deferred: Deferred<i32> = Deferred::new();
        let settler = deferred.dupe();
        let fut = deferred;
        pin_mut!(fut);
        assert_matches!(poll!(&mut fut), Poll::Pending);
        settler.reject("boom");
        assert_matches!(poll!(&mut fut), Poll::Ready(Err(Error::User(m))) => {
            assert_eq!(m, "boom");
        });
    }

    #[test]
    fn test_then_after_resolve_runs_immediately() {
        let deferred = Deferred::new();
        deferred.resolve(42);
        let seen = Arc::new(AtomicI32::new(0));
        let seen2 = seen.dupe();
        deferred.then(move |v| seen2.store(v, Ordering::SeqCst)).unwrap();
        assert_eq!(seen.load(Ordering::SeqCst), 42);
    }

    #[test]
    fn test_then_before_resolve_runs_on_settlement() {
        let deferred = Deferred::new();
        let seen = Arc::new(AtomicI32::new(0));
        let seen2 = seen.dupe();
        deferred.then(move |v| seen2.store(v, Ordering::SeqCst)).unwrap();
        assert_eq!(seen.load(Ordering::SeqCst), 0);
        deferred.resolve(42);
        assert_eq!(seen.load(Ordering::SeqCst), 42);
    }

    #[test]
    fn test_catch_both_orders() {
        let immediate: Deferred<i32> = Deferred::new();
        immediate.reject("first");
        let seen = Arc::new(Mutex::new(None));
        let seen2 = seen.dupe();
        immediate.catch(move |e| *seen2.lock() = Some(e)).unwrap();
        assert_eq!(*seen.lock(), Some(Error::User("first".to_owned())));

        let delayed: Deferred<i32> = Deferred::new();
        let seen = Arc::new(Mutex::new(None));
        let seen2 = seen.dupe();
        delayed.catch(move |e| *seen2.lock() = Some(e)).unwrap();
        assert_eq!(*seen.lock(), None);
        delayed.reject("second");
        assert_eq!(*seen.lock(), Some(Error::User("second".to_owned())));
    }

    #[tokio::test]
    async fn test_settle_is_one_shot() {
        let deferred = Deferred::new();
        deferred.resolve(1);
        deferred.resolve(2);
        deferred.reject("late");
        assert_eq!(deferred.await, Ok(1));
    }

    #[test]
    fn test_reject_then_resolve_is_ignored() {
        let deferred: Deferred<i32> = Deferred::new();
        deferred.reject("boom");
        deferred.resolve(1);
        let seen = Arc::new(AtomicBool::new(false));
        let seen2 = seen.dupe();
        deferred.catch(move |_| seen2.store(true, Ordering::SeqCst)).unwrap();
        assert!(seen.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_then_after_await_fails() {
        let deferred: Deferred<i32> = Deferred::new();
        let other = deferred.dupe();
        let fut = deferred;
        pin_mut!(fut);
        assert_matches!(poll!(&mut fut), Poll::Pending);
        assert_matches!(other.then(|_| {}), Err(Error::Precondition(_)));
        assert_matches!(other.catch(|_| {}), Err(Error::Precondition(_)));
        // The parked awaiter is unaffected by the failed registrations.
        other.resolve(7);
        assert_matches!(poll!(&mut fut), Poll::Ready(Ok(7)));
    }

    #[tokio::test]
    async fn test_await_after_then_fails() {
        let deferred: Deferred<i32> = Deferred::new();
        deferred.then(|_| {}).unwrap();
        assert_matches!(deferred.await, Err(Error::Precondition(_)));
    }

    #[tokio::test]
    async fn test_move_only_value() {
        let deferred: Deferred<Box<i32>> = Deferred::new();
        deferred.resolve(Box::new(42));
        assert_eq!(*deferred.await.unwrap(), 42);
    }

    #[tokio::test]
    async fn test_unit_deferred() {
        let deferred: Deferred<()> = Deferred::new();
        let settler = deferred.dupe();
        let fut = deferred;
        pin_mut!(fut);
        assert_matches!(poll!(&mut fut), Poll::Pending);
        settler.resolve(());
        assert_matches!(poll!(&mut fut), Poll::Ready(Ok(())));
    }

    #[test]
    fn test_is_settled() {
        let deferred = Deferred::new();
        assert!(!deferred.is_settled());
        deferred.resolve(1);
        assert!(deferred.is_settled());
    }

    #[test]
    fn test_second_then_replaces_first() {
        let deferred = Deferred::new();
        let first = Arc::new(AtomicBool::new(false));
        let second = Arc::new(AtomicI32::new(0));
        let first2 = first.dupe();
        let second2 = second.dupe();
        deferred.then(move |_| first2.store(true, Ordering::SeqCst)).unwrap();
        deferred.then(move |v| second2.store(v, Ordering::SeqCst)).unwrap();
        deferred.resolve(5);
        assert!(!first.load(Ordering::SeqCst));
        assert_eq!(second.load(Ordering::SeqCst), 5);
    }
}

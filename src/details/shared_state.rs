/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 *
 * This source code is licensed under both the MIT license found in the
 * LICENSE-MIT file in the root directory of this source tree and the Apache
 * License, Version 2.0 found in the LICENSE-APACHE file in the root directory
 * of this source tree.
 */

use std::task::Context;
use std::task::Poll;
use std::task::Waker;

use crate::error::Error;

pub(crate) type ValueCallback<T> = Box<dyn FnOnce(T) + Send + 'static>;
pub(crate) type ErrorCallback = Box<dyn FnOnce(Error) + Send + 'static>;

/// Action a settlement decided on while the state lock was held. The caller
/// runs it after releasing the lock, so user code never executes under it.
pub(crate) enum Delivery<T> {
    /// A consumer is parked on this Deferred; the settlement was stored and
    /// the consumer must be resumed to take it.
    Wake(Waker),
    /// A `then` continuation consumes the value right now.
    Value(ValueCallback<T>, T),
    /// A `catch` continuation consumes the failure right now.
    Error(ErrorCallback, Error),
}

/// Settlement state shared by the producer and consumer ends of a Deferred.
///
/// At most one of the parked waker and the continuation slots is populated at
/// any time; `awaited` latches once a consumer has parked and stays set after
/// resumption, which is what makes later continuation registration fail.
pub(crate) struct DeferredState<T> {
    value: Option<T>,
    error: Option<Error>,
    waker: Option<Waker>,
    awaited: bool,
    settled: bool,
    on_value: Option<ValueCallback<T>>,
    on_error: Option<ErrorCallback>,
}

impl<T> DeferredState<T> {
    pub(crate) fn new() -> Self {
        Self {
            value: None,
            error: None,
            waker: None,
            awaited: false,
            settled: false,
            on_value: None,
            on_error: None,
        }
    }

    /// Settle with a value. Settling twice is a no-op. Both continuation
    /// slots are cleared on settlement so a fired callback drops its closure
    /// and the one that lost can never fire.
    pub(crate) fn resolve(&mut self, value: T) -> Option<Delivery<T>> {
        if self.settled {
            return None;
        }
        self.settled = true;
        let on_value = self.on_value.take();
        self.on_error = None;
        if let Some(waker) = self.waker.take() {
            self.value = Some(value);
            Some(Delivery::Wake(waker))
        } else if let Some(callback) = on_value {
            Some(Delivery::Value(callback, value))
        } else {
            self.value = Some(value);
            None
        }
    }

    /// Settle with a failure. Same one-shot and slot-clearing rules as
    /// `resolve`.
    pub(crate) fn reject(&mut self, error: Error) -> Option<Delivery<T>> {
        if self.settled {
            return None;
        }
        self.settled = true;
        let on_error = self.on_error.take();
        self.on_value = None;
        if let Some(waker) = self.waker.take() {
            self.error = Some(error);
            Some(Delivery::Wake(waker))
        } else if let Some(callback) = on_error {
            Some(Delivery::Error(callback, error))
        } else {
            self.error = Some(error);
            None
        }
    }

    /// Register the value continuation. If the value is already stored it is
    /// taken and handed back for immediate delivery.
    pub(crate) fn then(
        &mut self,
        callback: ValueCallback<T>,
    ) -> Result<Option<(ValueCallback<T>, T)>, Error> {
        if self.awaited {
            return Err(Error::Precondition("deferred is already awaited"));
        }
        match self.value.take() {
            Some(value) => Ok(Some((callback, value))),
            None => {
                self.on_value = Some(callback);
                Ok(None)
            }
        }
    }

    /// Register the failure continuation, symmetric to `then`.
    pub(crate) fn catch(
        &mut self,
        callback: ErrorCallback,
    ) -> Result<Option<(ErrorCallback, Error)>, Error> {
        if self.awaited {
            return Err(Error::Precondition("deferred is already awaited"));
        }
        match self.error.take() {
            Some(error) => Ok(Some((callback, error))),
            None => {
                self.on_error = Some(callback);
                Ok(None)
            }
        }
    }

    /// The awaitable contract: ready when a settlement is stored, otherwise
    /// park the caller. A stored failure wins over a stored value. Awaiting a
    /// Deferred that already has a continuation registered is rejected, the
    /// mirror image of the continuation-after-await rule.
    pub(crate) fn poll(&mut self, cx: &mut Context<'_>) -> Poll<Result<T, Error>> {
        if let Some(error) = self.error.take() {
            return Poll::Ready(Err(error));
        }
        if let Some(value) = self.value.take() {
            return Poll::Ready(Ok(value));
        }
        if self.on_value.is_some() || self.on_error.is_some() {
            return Poll::Ready(Err(Error::Precondition(
                "deferred already has a continuation",
            )));
        }
        self.waker = Some(cx.waker().clone());
        self.awaited = true;
        Poll::Pending
    }

    /// Whether the first resolve or reject has happened.
    pub(crate) fn is_settled(&self) -> bool {
        self.settled
    }
}

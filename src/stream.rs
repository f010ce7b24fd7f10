/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 *
 * This source code is licensed under both the MIT license found in the
 * LICENSE-MIT file in the root directory of this source tree and the Apache
 * License, Version 2.0 found in the LICENSE-APACHE file in the root directory
 * of this source tree.
 */

//! Asynchronous sequence of values with an optional typed return.
//!
//! An `AsyncStream<T, R>` carries `T` items from one producer to one
//! consumer, then a terminal settlement: `finish(r)` stores a return value
//! and ends the stream, `reject(e)` ends it with a failure. The consumer
//! calls [`next`](AsyncStream::next) and awaits the returned Deferred;
//! `Ok(None)` marks the end. Items buffer while nobody is waiting and an
//! awaiting consumer is always served before the buffer refills.
//!
//! There is no backpressure: `feed` never suspends the producer.

use std::collections::VecDeque;
use std::sync::Arc;

use dupe::Clone_;
use dupe::Dupe;
use dupe::Dupe_;
use parking_lot::Mutex;

use crate::deferred::Deferred;
use crate::error::Error;

struct StreamState<T, R> {
    buffer: VecDeque<T>,
    pending_error: Option<Error>,
    waiter: Option<Deferred<Option<T>>>,
    finished: bool,
    return_value: Option<R>,
}

/// Handle to the shared stream state. Producer and consumer sides hold
/// duplicates of the same handle; the `R = ()` default is the unit-return
/// stream.
#[derive(Clone_, Dupe_)]
pub struct AsyncStream<T, R = ()> {
    state: Arc<Mutex<StreamState<T, R>>>,
}

impl<T, R> AsyncStream<T, R>
where
    T: Send + 'static,
    R: Send + 'static,
{
    /// An open stream with nothing buffered.
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(StreamState {
                buffer: VecDeque::new(),
                pending_error: None,
                waiter: None,
                finished: false,
                return_value: None,
            })),
        }
    }

    /// The next item as a Deferred: `Some(item)` while the stream is live,
    /// `None` once it has finished, a failure if the producer rejected.
    ///
    /// The Deferred is already settled whenever an item is buffered, an error
    /// is pending, or the stream has finished; otherwise the caller parks on
    /// it until the producer's next `feed`/`finish`/`reject`. At most one
    /// `next` may be outstanding: a second call while the first is unsettled
    /// returns an already-rejected Deferred.
    pub fn next(&self) -> Deferred<Option<T>> {
        let deferred = Deferred::new();
        let mut state = self.state.lock();
        if let Some(item) = state.buffer.pop_front() {
            drop(state);
            deferred.resolve(Some(item));
        } else if let Some(error) = state.pending_error.take() {
            drop(state);
            deferred.reject(error);
        } else if state.finished {
            drop(state);
            deferred.resolve(None);
        } else if state.waiter.is_some() {
            drop(state);
            deferred.reject(Error::OverlappingNext);
        } else {
            state.waiter = Some(deferred.dupe());
        }
        deferred
    }

    /// Produce one item. A parked consumer receives it directly; otherwise
    /// it is appended to the buffer. Items fed after the stream finished are
    /// discarded.
    pub fn feed(&self, item: T) {
        let mut state = self.state.lock();
        if state.finished {
            tracing::debug!("discarding item fed to a finished stream");
            return;
        }
        match state.waiter.take() {
            Some(waiter) => {
                drop(state);
                waiter.resolve(Some(item));
            }
            None => state.buffer.push_back(item),
        }
    }

    /// End the stream, storing the return value. The value is stored before
    /// any parked consumer is resumed, so code running off the terminal
    /// `None` can already read it. Finishing a finished stream is a no-op.
    pub fn finish(&self, return_value: R) {
        let mut state = self.state.lock();
        if state.finished {
            return;
        }
        state.finished = true;
        state.return_value = Some(return_value);
        if let Some(waiter) = state.waiter.take() {
            drop(state);
            waiter.resolve(None);
        }
    }

    /// End the stream with a failure. A parked consumer observes it on its
    /// pending `next`; otherwise the next `next()` call delivers it. The
    /// failure is delivered once; `next()` after that resolves with `None`.
    pub fn reject(&self, error: impl Into<Error>) {
        let mut state = self.state.lock();
        if state.finished {
            return;
        }
        state.finished = true;
        match state.waiter.take() {
            Some(waiter) => {
                drop(state);
                waiter.reject(error.into());
            }
            None => state.pending_error = Some(error.into()),
        }
    }

    /// Take the return value. Only available once the stream has finished
    /// with a typed return, and only once: the value is moved out.
    pub fn return_value(&self) -> Result<R, Error> {
        let mut state = self.state.lock();
        if !state.finished {
            return Err(Error::ReturnValueUnset);
        }
        state.return_value.take().ok_or(Error::ReturnValueUnset)
    }
}

impl<T, R> Default for AsyncStream<T, R>
where
    T: Send + 'static,
    R: Send + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

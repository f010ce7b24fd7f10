/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 *
 * This source code is licensed under both the MIT license found in the
 * LICENSE-MIT file in the root directory of this source tree and the Apache
 * License, Version 2.0 found in the LICENSE-APACHE file in the root directory
 * of this source tree.
 */

//! Aggregation over collections of Deferreds.
//!
//! All three combinators are built on `then`/`catch`, never on awaiting, so
//! they tolerate inputs that are already settled at call time. Each takes its
//! inputs by value and drops the handles once the continuations are
//! registered; the continuations are single-shot and drop their captures on
//! invocation, which is what breaks the cycle between an input's state and
//! the result handle they close over.

use std::sync::Arc;

use dupe::Dupe;
use parking_lot::Mutex;

use crate::deferred::Deferred;
use crate::error::Error;

const EMPTY_INPUT: &str = "empty deferred list";

struct AllState<T> {
    values: Vec<Option<T>>,
    pending: usize,
    rejected: bool,
}

struct AnyState {
    pending: usize,
    resolved: bool,
}

struct RaceState {
    finished: bool,
}

impl<T> Deferred<T>
where
    T: Send + 'static,
{
    /// Resolves with every input's value in positional order once all inputs
    /// have resolved. The first rejection rejects the aggregate with that
    /// failure, and every later settlement of the other inputs is ignored;
    /// once rejected, no value is written into the result vector.
    pub fn all(deferreds: Vec<Deferred<T>>) -> Result<Deferred<Vec<T>>, Error> {
        if deferreds.is_empty() {
            return Err(Error::Precondition(EMPTY_INPUT));
        }
        let result: Deferred<Vec<T>> = Deferred::new();
        let state = Arc::new(Mutex::new(AllState {
            values: (0..deferreds.len()).map(|_| None).collect(),
            pending: deferreds.len(),
            rejected: false,
        }));
        for (index, deferred) in deferreds.into_iter().enumerate() {
            let on_value_state = state.dupe();
            let on_value_result = result.dupe();
            deferred.then(move |value| {
                let mut state = on_value_state.lock();
                if state.rejected {
                    return;
                }
                state.values[index] = Some(value);
                state.pending -= 1;
                if state.pending == 0 {
                    let values = state
                        .values
                        .iter_mut()
                        .map(|slot| slot.take().unwrap())
                        .collect();
                    drop(state);
                    on_value_result.resolve(values);
                }
            })?;
            let on_error_state = state.dupe();
            let on_error_result = result.dupe();
            deferred.catch(move |error| {
                let mut state = on_error_state.lock();
                if state.rejected {
                    return;
                }
                state.rejected = true;
                drop(state);
                on_error_result.reject(error);
            })?;
        }
        Ok(result)
    }

    /// Resolves with the value of the first input to resolve, in settlement
    /// order. Rejects only when every input has rejected, with a fixed
    /// failure; the individual messages are deliberately not aggregated.
    pub fn any(deferreds: Vec<Deferred<T>>) -> Result<Deferred<T>, Error> {
        if deferreds.is_empty() {
            return Err(Error::Precondition(EMPTY_INPUT));
        }
        let result: Deferred<T> = Deferred::new();
        let state = Arc::new(Mutex::new(AnyState {
            pending: deferreds.len(),
            resolved: false,
        }));
        for deferred in deferreds {
            let on_value_state = state.dupe();
            let on_value_result = result.dupe();
            deferred.then(move |value| {
                let mut state = on_value_state.lock();
                if state.resolved {
                    return;
                }
                state.resolved = true;
                drop(state);
                on_value_result.resolve(value);
            })?;
            let on_error_state = state.dupe();
            let on_error_result = result.dupe();
            deferred.catch(move |_error| {
                let mut state = on_error_state.lock();
                if state.resolved {
                    return;
                }
                state.pending -= 1;
                if state.pending == 0 {
                    drop(state);
                    on_error_result.reject(Error::AllRejected);
                }
            })?;
        }
        Ok(result)
    }

    /// Settles with the outcome of the first input to settle, in either
    /// direction; the failure is forwarded verbatim. Later settlements of
    /// the other inputs are ignored.
    pub fn race(deferreds: Vec<Deferred<T>>) -> Result<Deferred<T>, Error> {
        if deferreds.is_empty() {
            return Err(Error::Precondition(EMPTY_INPUT));
        }
        let result: Deferred<T> = Deferred::new();
        let state = Arc::new(Mutex::new(RaceState { finished: false }));
        for deferred in deferreds {
            let on_value_state = state.dupe();
            let on_value_result = result.dupe();
            deferred.then(move |value| {
                let mut state = on_value_state.lock();
                if state.finished {
                    return;
                }
                state.finished = true;
                drop(state);
                on_value_result.resolve(value);
            })?;
            let on_error_state = state.dupe();
            let on_error_result = result.dupe();
            deferred.catch(move |error| {
                let mut state = on_error_state.lock();
                if state.finished {
                    return;
                }
                state.finished = true;
                drop(state);
                on_error_result.reject(error);
            })?;
        }
        Ok(result)
    }
}

/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 *
 * This source code is licensed under both the MIT license found in the
 * LICENSE-MIT file in the root directory of this source tree and the Apache
 * License, Version 2.0 found in the LICENSE-APACHE file in the root directory
 * of this source tree.
 */

//! Adapters from async bodies to the primitives.
//!
//! `async fn`s returning `Result` are the natural way to write asynchronous
//! code against this crate; these functions run such a body as a task on the
//! event loop and surface its completion as a [`Deferred`] or an
//! [`AsyncStream`]. Both poll the body once on the caller's stack, so it runs
//! up to its first genuine suspension before the adapter returns; an
//! immediately completing body yields an already-settled handle.

use std::future::Future;

use dupe::Dupe;

use crate::deferred::Deferred;
use crate::error::Error;
use crate::event_loop::EventLoop;
use crate::stream::AsyncStream;

/// Run `future` as a task; its `Ok` resolves the returned Deferred, its
/// `Err` rejects it.
pub fn spawn_deferred<T, F>(event_loop: &EventLoop, future: F) -> Deferred<T>
where
    T: Send + 'static,
    F: Future<Output = Result<T, Error>> + Send + 'static,
{
    let deferred = Deferred::new();
    let settler = deferred.dupe();
    event_loop.spawn(async move {
        match future.await {
            Ok(value) => settler.resolve(value),
            Err(error) => settler.reject(error),
        }
    });
    deferred
}

/// Run a producer body as a task feeding the returned stream.
///
/// The body receives a duplicate of the stream handle and yields by calling
/// [`feed`](AsyncStream::feed), which never suspends it. Returning `Ok(r)`
/// finishes the stream with `r` (for `R = ()` this means even an empty body
/// delivers the terminal `None`) and `Err(e)` rejects it.
pub fn spawn_stream<T, R, F, Fut>(event_loop: &EventLoop, producer: F) -> AsyncStream<T, R>
where
    T: Send + 'static,
    R: Send + 'static,
    F: FnOnce(AsyncStream<T, R>) -> Fut,
    Fut: Future<Output = Result<R, Error>> + Send + 'static,
{
    let stream = AsyncStream::new();
    let body = producer(stream.dupe());
    let terminal = stream.dupe();
    event_loop.spawn(async move {
        match body.await {
            Ok(return_value) => terminal.finish(return_value),
            Err(error) => terminal.reject(error),
        }
    });
    stream
}

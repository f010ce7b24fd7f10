/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 *
 * This source code is licensed under both the MIT license found in the
 * LICENSE-MIT file in the root directory of this source tree and the Apache
 * License, Version 2.0 found in the LICENSE-APACHE file in the root directory
 * of this source tree.
 */

//! JS-semantics asynchronous primitives for single-threaded event loops.
//!
//! Two abstractions, both plain `Future`s under the hood:
//!
//! * [`deferred::Deferred`] is a one-shot future settled exactly once with a
//!   value or a failure, consumed either by awaiting or through `then`/`catch`
//!   continuations, with `all`/`any`/`race` combinators over collections.
//! * [`stream::AsyncStream`] is an asynchronous sequence of values with an
//!   optional typed return value, produced by `feed`/`finish`/`reject` and
//!   consumed by awaiting successive [`next`](stream::AsyncStream::next)
//!   calls.
//!
//! [`event_loop::EventLoop`] is the reference executor-and-timer loop the
//! primitives' callers run on; [`spawn`] adapts `async` bodies into either
//! primitive. Everything is cooperative and single-threaded: settlement runs
//! continuations on the settler's stack and resumes parked awaiters through
//! their wakers.

mod combinators;
pub mod deferred;
pub(crate) mod details;
pub mod error;
pub mod event_loop;
pub mod spawn;
pub mod stream;

/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 *
 * This source code is licensed under both the MIT license found in the
 * LICENSE-MIT file in the root directory of this source tree and the Apache
 * License, Version 2.0 found in the LICENSE-APACHE file in the root directory
 * of this source tree.
 */

use thiserror::Error;

/// Failure carried by a rejected [`Deferred`](crate::deferred::Deferred) or
/// [`AsyncStream`](crate::stream::AsyncStream).
///
/// Errors settle through a Deferred exactly like values: stored once,
/// delivered to one awaiter or one `catch` continuation, never duplicated.
/// The enum is `Clone` so combinators can forward an input's failure to their
/// result verbatim.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum Error {
    /// A failure raised by user code: `reject("msg")` or a failing task body.
    #[error("{0}")]
    User(String),

    /// An API contract was violated at call time, e.g. a combinator invoked
    /// with no inputs or a continuation registered on an awaited Deferred.
    #[error("{0}")]
    Precondition(&'static str),

    /// A second `next()` was issued while a previous one was still parked.
    #[error("overlapping next() calls are not allowed")]
    OverlappingNext,

    /// `return_value()` was called before the stream finished with a typed
    /// return, or after the value was already taken.
    #[error("stream has not finished or no return value was set")]
    ReturnValueUnset,

    /// Every input to `Deferred::any` rejected. Individual messages are
    /// deliberately not aggregated.
    #[error("all promises rejected")]
    AllRejected,

    /// Sentinel used by wrappers that cancel external work; nothing in this
    /// crate raises it.
    #[error("cancelled")]
    Cancelled,
}

impl From<String> for Error {
    fn from(message: String) -> Self {
        Error::User(message)
    }
}

impl From<&str> for Error {
    fn from(message: &str) -> Self {
        Error::User(message.to_owned())
    }
}

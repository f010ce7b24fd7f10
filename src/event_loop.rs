/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 *
 * This source code is licensed under both the MIT license found in the
 * LICENSE-MIT file in the root directory of this source tree and the Apache
 * License, Version 2.0 found in the LICENSE-APACHE file in the root directory
 * of this source tree.
 */

//! Reference single-threaded event loop.
//!
//! The primitives in this crate only need a `Waker`-honouring executor; this
//! loop is the batteries-included one their callers (and this crate's tests)
//! run on. It owns a set of spawned tasks and a one-shot timer queue and
//! drives both from [`run_until_idle`](EventLoop::run_until_idle): ready
//! tasks first, then the nearest timer. Everything runs on the calling
//! thread; wakers may fire from other threads but only enqueue work.
//!
//! A task is polled once, eagerly, on the stack of the `spawn` caller, so a
//! spawned body runs up to its first genuine suspension before `spawn`
//! returns.

use std::cmp::Ordering;
use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::collections::HashMap;
use std::collections::VecDeque;
use std::future::Future;
use std::sync::Arc;
use std::sync::Weak;
use std::task::Context;
use std::task::Poll;
use std::time::Duration;
use std::time::Instant;

use dupe::Clone_;
use dupe::Dupe;
use dupe::Dupe_;
use futures::future::BoxFuture;
use futures::task::ArcWake;
use futures::task::waker_ref;
use futures::FutureExt;
use parking_lot::Condvar;
use parking_lot::Mutex;

/// Identifies a pending timeout for [`clear_timeout`](EventLoop::clear_timeout).
#[derive(Clone, Copy, Dupe, Debug, Eq, PartialEq)]
pub struct TimeoutHandle {
    id: u64,
}

type TimerCallback = Box<dyn FnOnce() + Send + 'static>;

#[derive(Eq, PartialEq)]
struct TimerEntry {
    deadline: Instant,
    id: u64,
}

impl Ord for TimerEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.deadline, self.id).cmp(&(other.deadline, other.id))
    }
}

impl PartialOrd for TimerEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

struct Task {
    id: u64,
    event_loop: Weak<Shared>,
    /// Empty while the task is being polled and after it completes.
    future: Mutex<Option<BoxFuture<'static, ()>>>,
}

impl ArcWake for Task {
    fn wake_by_ref(task: &Arc<Self>) {
        if let Some(event_loop) = task.event_loop.upgrade() {
            event_loop.state.lock().ready.push_back(task.id);
            event_loop.idle_wakeup.notify_one();
        }
    }
}

struct LoopState {
    tasks: HashMap<u64, Arc<Task>>,
    ready: VecDeque<u64>,
    /// Deadline order with registration order breaking ties. Entries whose
    /// callback was cleared stay in the heap and are discarded on pop.
    timers: BinaryHeap<Reverse<TimerEntry>>,
    timer_callbacks: HashMap<u64, TimerCallback>,
    next_id: u64,
}

struct Shared {
    state: Mutex<LoopState>,
    idle_wakeup: Condvar,
}

/// Single-threaded executor and timer queue. Handles are cheap duplicates of
/// the same loop.
#[derive(Clone_, Dupe_)]
pub struct EventLoop {
    shared: Arc<Shared>,
}

impl EventLoop {
    pub fn new() -> Self {
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(LoopState {
                    tasks: HashMap::new(),
                    ready: VecDeque::new(),
                    timers: BinaryHeap::new(),
                    timer_callbacks: HashMap::new(),
                    next_id: 0,
                }),
                idle_wakeup: Condvar::new(),
            }),
        }
    }

    /// Register a task and poll it once on this stack. The task is re-polled
    /// from [`run_until_idle`](EventLoop::run_until_idle) whenever its waker
    /// fires. Tasks must be spawned from the loop thread.
    pub fn spawn(&self, future: impl Future<Output = ()> + Send + 'static) {
        let task = {
            let mut state = self.shared.state.lock();
            let id = state.next_id;
            state.next_id += 1;
            let task = Arc::new(Task {
                id,
                event_loop: Arc::downgrade(&self.shared),
                future: Mutex::new(Some(future.boxed())),
            });
            state.tasks.insert(id, task.dupe());
            tracing::trace!(task = id, "spawned");
            task
        };
        self.poll_task(&task);
    }

    /// Run `callback` on the loop thread once `ms` milliseconds have passed.
    pub fn set_timeout(
        &self,
        callback: impl FnOnce() + Send + 'static,
        ms: u64,
    ) -> TimeoutHandle {
        let mut state = self.shared.state.lock();
        let id = state.next_id;
        state.next_id += 1;
        state.timers.push(Reverse(TimerEntry {
            deadline: Instant::now() + Duration::from_millis(ms),
            id,
        }));
        state.timer_callbacks.insert(id, Box::new(callback));
        tracing::trace!(timer = id, ms, "timeout set");
        // A loop sleeping towards a later deadline must recompute.
        self.shared.idle_wakeup.notify_one();
        TimeoutHandle { id }
    }

    /// Drop a pending timeout. Clearing a fired or already-cleared timeout
    /// is a no-op.
    pub fn clear_timeout(&self, handle: TimeoutHandle) {
        let cleared = self.shared.state.lock().timer_callbacks.remove(&handle.id);
        if cleared.is_some() {
            tracing::trace!(timer = handle.id, "timeout cleared");
        }
    }

    /// Drive tasks and timers until no task is runnable and no timer is
    /// pending. Parked tasks whose wakeup can no longer arrive do not keep
    /// the loop alive.
    pub fn run_until_idle(&self) {
        loop {
            while let Some(task) = self.next_ready_task() {
                self.poll_task(&task);
            }
            let mut state = self.shared.state.lock();
            if !state.ready.is_empty() {
                continue;
            }
            let next_timer = loop {
                let (deadline, id) = match state.timers.peek() {
                    None => break None,
                    Some(Reverse(entry)) => (entry.deadline, entry.id),
                };
                if state.timer_callbacks.contains_key(&id) {
                    break Some((deadline, id));
                }
                // Cleared while queued.
                state.timers.pop();
            };
            let Some((deadline, id)) = next_timer else { return };
            if deadline <= Instant::now() {
                state.timers.pop();
                let callback = state.timer_callbacks.remove(&id).unwrap();
                drop(state);
                tracing::trace!(timer = id, "timeout fired");
                callback();
            } else {
                // Sleep towards the deadline; a waker or a newly set timer
                // interrupts the wait.
                self.shared.idle_wakeup.wait_until(&mut state, deadline);
            }
        }
    }

    /// No runnable task and no pending timer.
    pub fn is_idle(&self) -> bool {
        let state = self.shared.state.lock();
        state.ready.is_empty() && state.timer_callbacks.is_empty()
    }

    fn next_ready_task(&self) -> Option<Arc<Task>> {
        let mut state = self.shared.state.lock();
        while let Some(id) = state.ready.pop_front() {
            // Wakeups may outlive their task; skip those.
            if let Some(task) = state.tasks.get(&id) {
                return Some(task.dupe());
            }
        }
        None
    }

    /// Poll one task with its own waker. The future is taken out of its slot
    /// for the duration of the poll so a waker firing mid-poll only enqueues
    /// the id again.
    fn poll_task(&self, task: &Arc<Task>) {
        let Some(mut future) = task.future.lock().take() else {
            return;
        };
        let waker = waker_ref(task);
        let mut cx = Context::from_waker(&waker);
        match future.as_mut().poll(&mut cx) {
            Poll::Ready(()) => {
                self.shared.state.lock().tasks.remove(&task.id);
                tracing::trace!(task = task.id, "completed");
            }
            Poll::Pending => {
                *task.future.lock() = Some(future);
            }
        }
    }
}

impl Default for EventLoop {
    fn default() -> Self {
        Self::new()
    }
}

// Copyright 2024 Saptak Santra
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Blocking hand-off queue between producer and consumer threads.
//!
//! [`HandoffQueue`] is a FIFO guarded by one lock and two condition
//! variables: consumers sleep on "became non-empty", producers on "dropped
//! below the bound". A bound of `0` means unbounded. A full bounded queue
//! blocks producers instead of dropping or growing.
//!
//! Ordinary transitions wake at most one waiter. [`HandoffQueue::close`] wakes
//! everyone: producers get their value back in [`PushError::Closed`],
//! consumers drain what is left and then see [`PopError::Closed`].
//!
//! # Liveness
//!
//! [`HandoffQueue::push`] and [`HandoffQueue::pop`] block with no deadline
//! until a counterpart operation or `close()`. Use the `*_timeout` or `try_*`
//! variants where that is not acceptable.
//!
//! # Example
//!
//! ```
//! use pvcore::HandoffQueue;
//! use std::thread;
//!
//! let queue = HandoffQueue::new(4);
//! thread::scope(|s| {
//!     s.spawn(|| {
//!         for i in 0..10 {
//!             queue.push(i).unwrap();
//!         }
//!         queue.close();
//!     });
//!     let received: Vec<i32> = queue.iter().collect();
//!     assert_eq!(received, (0..10).collect::<Vec<_>>());
//! });
//! ```

use parking_lot::{Condvar, Mutex, MutexGuard};
use std::collections::VecDeque;
use std::fmt;
use std::iter::FusedIterator;
use std::time::{Duration, Instant};

use crate::error::PvError;
use crate::fmt::{Describe, IndentWriter};
use crate::instance::HANDOFF_QUEUES;

/// Lifecycle of a queue
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum QueueState {
    /// Accepting pushes
    Open,
    /// Closed with elements still queued; pops drain them
    Closing,
    /// Closed and drained
    Closed,
}

/// Failed push, carrying the rejected value
pub enum PushError<T> {
    /// Bounded queue at capacity (`try_push` only)
    Full(T),
    /// Queue closed
    Closed(T),
    /// Deadline passed while waiting for capacity
    Timeout(T),
}

impl<T> PushError<T> {
    /// Recover the value that was not queued
    pub fn into_inner(self) -> T {
        match self {
            PushError::Full(value) | PushError::Closed(value) | PushError::Timeout(value) => value,
        }
    }

    pub fn is_closed(&self) -> bool {
        matches!(self, PushError::Closed(_))
    }
}

impl<T> fmt::Debug for PushError<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PushError::Full(_) => f.write_str("Full(..)"),
            PushError::Closed(_) => f.write_str("Closed(..)"),
            PushError::Timeout(_) => f.write_str("Timeout(..)"),
        }
    }
}

impl<T> fmt::Display for PushError<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PushError::Full(_) => write!(f, "Push to full queue"),
            PushError::Closed(_) => write!(f, "Push to closed queue"),
            PushError::Timeout(_) => write!(f, "Push timed out"),
        }
    }
}

impl<T> std::error::Error for PushError<T> {}

impl<T> From<PushError<T>> for PvError {
    fn from(err: PushError<T>) -> Self {
        match err {
            PushError::Full(_) => PvError::Full,
            PushError::Closed(_) => PvError::Closed,
            PushError::Timeout(_) => PvError::Timeout,
        }
    }
}

/// Failed pop
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PopError {
    /// Nothing queued (`try_pop` only)
    Empty,
    /// Queue closed and drained
    Closed,
    /// Deadline passed while waiting for an element
    Timeout,
}

impl fmt::Display for PopError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PopError::Empty => write!(f, "Pop from empty queue"),
            PopError::Closed => write!(f, "Pop from closed queue"),
            PopError::Timeout => write!(f, "Pop timed out"),
        }
    }
}

impl std::error::Error for PopError {}

impl From<PopError> for PvError {
    fn from(err: PopError) -> Self {
        match err {
            PopError::Empty => PvError::Empty,
            PopError::Closed => PvError::Closed,
            PopError::Timeout => PvError::Timeout,
        }
    }
}

#[derive(Clone, Copy)]
enum Wait {
    Never,
    Forever,
    Until(Instant),
}

#[derive(Clone, Copy)]
enum Waiter {
    Writer,
    Reader,
}

struct Inner<T> {
    items: VecDeque<T>,
    state: QueueState,
    waiting_writers: usize,
    waiting_readers: usize,
}

impl<T> Inner<T> {
    fn waiters(&mut self, waiter: Waiter) -> &mut usize {
        match waiter {
            Waiter::Writer => &mut self.waiting_writers,
            Waiter::Reader => &mut self.waiting_readers,
        }
    }
}

/// Thread safe multi-producer, multi-consumer FIFO with optional bound
pub struct HandoffQueue<T> {
    inner: Mutex<Inner<T>>,
    not_empty: Condvar,
    not_full: Condvar,
    bound: usize,
}

impl<T> HandoffQueue<T> {
    /// Create a queue holding at most `bound` elements, `0` for unbounded
    pub fn new(bound: usize) -> Self {
        HANDOFF_QUEUES.acquire();
        Self {
            inner: Mutex::new(Inner {
                items: VecDeque::new(),
                state: QueueState::Open,
                waiting_writers: 0,
                waiting_readers: 0,
            }),
            not_empty: Condvar::new(),
            not_full: Condvar::new(),
            bound,
        }
    }

    pub fn unbounded() -> Self {
        Self::new(0)
    }

    /// Capacity limit, `0` when unbounded
    pub fn bound(&self) -> usize {
        self.bound
    }

    pub fn len(&self) -> usize {
        self.inner.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().items.is_empty()
    }

    pub fn state(&self) -> QueueState {
        self.inner.lock().state
    }

    /// True once `close()` has been called
    pub fn is_closed(&self) -> bool {
        self.state() != QueueState::Open
    }

    /// Producers currently blocked on a full queue
    pub fn waiting_writers(&self) -> usize {
        self.inner.lock().waiting_writers
    }

    #[inline]
    fn has_room(&self, len: usize) -> bool {
        self.bound == 0 || len < self.bound
    }

    /// Append `value`, blocking while the queue is full.
    pub fn push(&self, value: T) -> Result<(), PushError<T>> {
        self.push_inner(value, Wait::Forever)
    }

    /// Append `value` only if there is room right now
    pub fn try_push(&self, value: T) -> Result<(), PushError<T>> {
        self.push_inner(value, Wait::Never)
    }

    pub fn push_timeout(&self, value: T, timeout: Duration) -> Result<(), PushError<T>> {
        self.push_inner(value, Wait::Until(Instant::now() + timeout))
    }

    /// Remove the oldest element, blocking while the queue is empty.
    pub fn pop(&self) -> Result<T, PopError> {
        self.pop_inner(Wait::Forever)
    }

    pub fn try_pop(&self) -> Result<T, PopError> {
        self.pop_inner(Wait::Never)
    }

    pub fn pop_timeout(&self, timeout: Duration) -> Result<T, PopError> {
        self.pop_inner(Wait::Until(Instant::now() + timeout))
    }

    fn push_inner(&self, value: T, wait: Wait) -> Result<(), PushError<T>> {
        let mut inner = self.inner.lock();
        loop {
            if inner.state != QueueState::Open {
                return Err(PushError::Closed(value));
            }
            if self.has_room(inner.items.len()) {
                break;
            }
            match wait {
                Wait::Never => return Err(PushError::Full(value)),
                Wait::Forever => {
                    #[cfg(feature = "profiling")]
                    tracing::trace!(bound = self.bound, "push blocked on full queue");
                    Self::wait_on(&self.not_full, &mut inner, None, Waiter::Writer);
                }
                Wait::Until(deadline) => {
                    if Instant::now() >= deadline {
                        return Err(PushError::Timeout(value));
                    }
                    Self::wait_on(&self.not_full, &mut inner, Some(deadline), Waiter::Writer);
                }
            }
        }

        let was_empty = inner.items.is_empty();
        inner.items.push_back(value);
        let pass_writer = inner.waiting_writers > 0 && self.has_room(inner.items.len());
        drop(inner);

        if was_empty {
            self.not_empty.notify_one();
        }
        if pass_writer {
            self.not_full.notify_one();
        }
        Ok(())
    }

    fn pop_inner(&self, wait: Wait) -> Result<T, PopError> {
        let mut inner = self.inner.lock();
        let value = loop {
            if let Some(value) = inner.items.pop_front() {
                break value;
            }
            if inner.state != QueueState::Open {
                inner.state = QueueState::Closed;
                return Err(PopError::Closed);
            }
            match wait {
                Wait::Never => return Err(PopError::Empty),
                Wait::Forever => {
                    Self::wait_on(&self.not_empty, &mut inner, None, Waiter::Reader);
                }
                Wait::Until(deadline) => {
                    if Instant::now() >= deadline {
                        return Err(PopError::Timeout);
                    }
                    Self::wait_on(&self.not_empty, &mut inner, Some(deadline), Waiter::Reader);
                }
            }
        };

        if inner.state == QueueState::Closing && inner.items.is_empty() {
            inner.state = QueueState::Closed;
        }
        let wake_writer = inner.waiting_writers > 0 && self.has_room(inner.items.len());
        // Another consumer may have missed the empty to non-empty signal
        let pass_reader = inner.waiting_readers > 0 && !inner.items.is_empty();
        drop(inner);

        if wake_writer {
            self.not_full.notify_one();
        }
        if pass_reader {
            self.not_empty.notify_one();
        }
        Ok(value)
    }

    /// Sleep on `cv` as a counted waiter. The lock is released while asleep.
    fn wait_on(
        cv: &Condvar,
        inner: &mut MutexGuard<'_, Inner<T>>,
        deadline: Option<Instant>,
        waiter: Waiter,
    ) {
        *inner.waiters(waiter) += 1;
        match deadline {
            Some(deadline) => {
                let _ = cv.wait_until(inner, deadline);
            }
            None => cv.wait(inner),
        }
        *inner.waiters(waiter) -= 1;
    }

    /// Refuse further pushes and wake every blocked thread.
    ///
    /// Elements already queued can still be popped. Calling `close()` again
    /// has no effect.
    pub fn close(&self) {
        let mut inner = self.inner.lock();
        if inner.state != QueueState::Open {
            return;
        }
        inner.state = if inner.items.is_empty() {
            QueueState::Closed
        } else {
            QueueState::Closing
        };
        #[cfg(feature = "profiling")]
        tracing::debug!(
            remaining = inner.items.len(),
            waiting_writers = inner.waiting_writers,
            waiting_readers = inner.waiting_readers,
            "handoff queue closed"
        );
        drop(inner);

        self.not_empty.notify_all();
        self.not_full.notify_all();
    }

    /// Consume the queue as a sequence of `pop()` calls.
    ///
    /// Blocks between elements while the queue is open and ends once it is
    /// closed and drained.
    pub fn iter(&self) -> Iter<'_, T> {
        Iter { queue: self }
    }
}

impl<T> Default for HandoffQueue<T> {
    fn default() -> Self {
        Self::unbounded()
    }
}

impl<T> Drop for HandoffQueue<T> {
    fn drop(&mut self) {
        HANDOFF_QUEUES.release();
    }
}

impl<T> fmt::Debug for HandoffQueue<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("HandoffQueue")
            .field("state", &inner.state)
            .field("len", &inner.items.len())
            .field("bound", &self.bound)
            .finish()
    }
}

impl<T> Describe for HandoffQueue<T> {
    fn describe<W: fmt::Write>(&self, out: &mut IndentWriter<W>) -> fmt::Result {
        use std::fmt::Write;

        let (state, len, writers, readers) = {
            let inner = self.inner.lock();
            (
                inner.state,
                inner.items.len(),
                inner.waiting_writers,
                inner.waiting_readers,
            )
        };
        writeln!(out, "HandoffQueue {state:?} len={len} bound={}", self.bound)?;
        if out.level() > 0 {
            let mut waiters = out.indent();
            writeln!(waiters, "waiting writers: {writers}")?;
            writeln!(waiters, "waiting readers: {readers}")?;
        }
        Ok(())
    }
}

/// Blocking consumer iterator, see [`HandoffQueue::iter`]
pub struct Iter<'a, T> {
    queue: &'a HandoffQueue<T>,
}

impl<T> Iterator for Iter<'_, T> {
    type Item = T;

    fn next(&mut self) -> Option<T> {
        self.queue.pop().ok()
    }
}

impl<T> FusedIterator for Iter<'_, T> {}

impl<'a, T> IntoIterator for &'a HandoffQueue<T> {
    type Item = T;
    type IntoIter = Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fmt::describe_to_string;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::thread;

    fn wait_for(mut cond: impl FnMut() -> bool) {
        while !cond() {
            thread::yield_now();
        }
    }

    fn fill(bound: usize) {
        let queue = HandoffQueue::new(bound);
        for i in 0..4 {
            queue.push(i).unwrap();
        }
        assert_eq!(queue.pop(), Ok(0));
        assert_eq!(queue.pop(), Ok(1));
        assert_eq!(queue.pop(), Ok(2));
        assert_eq!(queue.pop(), Ok(3));
    }

    #[test]
    fn test_fill_unbounded() {
        fill(0);
    }

    #[test]
    fn test_fill_bounded() {
        fill(4);
    }

    #[test]
    fn test_cross_thread_round_trip() {
        let queue = HandoffQueue::new(4);
        thread::scope(|s| {
            s.spawn(|| {
                for i in 0..4 {
                    queue.push(i).unwrap();
                }
            });
            let got: Vec<i32> = (0..4).map(|_| queue.pop().unwrap()).collect();
            assert_eq!(got, vec![0, 1, 2, 3]);
        });
    }

    #[test]
    fn test_bound_blocks_second_push() {
        let queue = HandoffQueue::new(1);
        let pushed = AtomicBool::new(false);
        queue.push(0).unwrap();

        thread::scope(|s| {
            s.spawn(|| {
                queue.push(1).unwrap();
                pushed.store(true, Ordering::SeqCst);
            });

            wait_for(|| queue.waiting_writers() == 1);
            assert!(!pushed.load(Ordering::SeqCst));
            assert_eq!(queue.len(), 1);

            assert_eq!(queue.pop(), Ok(0));
            assert_eq!(queue.pop(), Ok(1));
        });
        assert!(pushed.load(Ordering::SeqCst));
    }

    #[test]
    fn test_try_variants_never_block() {
        let queue = HandoffQueue::new(1);
        assert_eq!(queue.try_pop(), Err(PopError::Empty));
        queue.try_push("a").unwrap();
        let err = queue.try_push("b").unwrap_err();
        assert!(matches!(err, PushError::Full(_)));
        assert_eq!(err.into_inner(), "b");
        assert_eq!(queue.try_pop(), Ok("a"));
    }

    #[test]
    fn test_timeouts_elapse() {
        let queue = HandoffQueue::new(1);
        assert_eq!(
            queue.pop_timeout(Duration::from_millis(10)),
            Err(PopError::Timeout)
        );
        queue.push(1u8).unwrap();
        let err = queue.push_timeout(2, Duration::from_millis(10)).unwrap_err();
        assert!(matches!(err, PushError::Timeout(2)));
        assert_eq!(queue.waiting_writers(), 0);
        assert_eq!(queue.pop_timeout(Duration::from_millis(10)), Ok(1));
    }

    #[test]
    fn test_close_wakes_blocked_consumer() {
        let queue: HandoffQueue<u32> = HandoffQueue::unbounded();
        thread::scope(|s| {
            let consumer = s.spawn(|| queue.pop());
            wait_for(|| queue.inner.lock().waiting_readers == 1);
            queue.close();
            assert_eq!(consumer.join().unwrap(), Err(PopError::Closed));
        });
        assert_eq!(queue.state(), QueueState::Closed);
    }

    #[test]
    fn test_close_wakes_blocked_producer() {
        let queue = HandoffQueue::new(1);
        queue.push(10).unwrap();
        thread::scope(|s| {
            let producer = s.spawn(|| queue.push(11));
            wait_for(|| queue.waiting_writers() == 1);
            queue.close();
            let err = producer.join().unwrap().unwrap_err();
            assert!(err.is_closed());
            assert_eq!(err.into_inner(), 11);
        });
        // Queued element survives the close
        assert_eq!(queue.state(), QueueState::Closing);
        assert_eq!(queue.pop(), Ok(10));
        assert_eq!(queue.state(), QueueState::Closed);
        assert_eq!(queue.pop(), Err(PopError::Closed));
    }

    #[test]
    fn test_iter_drains_then_ends() {
        let queue = HandoffQueue::new(0);
        for i in 0..3 {
            queue.push(i).unwrap();
        }
        queue.close();
        assert!(queue.push(99).is_err());
        let drained: Vec<_> = queue.iter().collect();
        assert_eq!(drained, vec![0, 1, 2]);
        assert_eq!((&queue).into_iter().next(), None);
    }

    #[test]
    fn test_multiple_consumers_share_work() {
        let queue = HandoffQueue::new(2);
        let total = 1000;
        thread::scope(|s| {
            let consumers: Vec<_> = (0..3)
                .map(|_| s.spawn(|| queue.iter().count()))
                .collect();
            for i in 0..total {
                queue.push(i).unwrap();
            }
            queue.close();
            let consumed: usize = consumers.into_iter().map(|h| h.join().unwrap()).sum();
            assert_eq!(consumed, total);
        });
    }

    #[test]
    fn test_error_conversion() {
        let err: PvError = PushError::Closed(5).into();
        assert_eq!(err, PvError::Closed);
        let err: PvError = PopError::Timeout.into();
        assert_eq!(err, PvError::Timeout);
    }

    #[test]
    fn test_describe() {
        let queue = HandoffQueue::new(8);
        queue.push(1).unwrap();
        assert_eq!(
            describe_to_string(&queue, 0),
            "HandoffQueue Open len=1 bound=8\n"
        );
        assert_eq!(
            describe_to_string(&queue, 1),
            "HandoffQueue Open len=1 bound=8\n    waiting writers: 0\n    waiting readers: 0\n"
        );
    }
}

//! Bounded byte channel
//!
//! A FIFO of byte spans with a fixed capacity in bytes. One producer and one
//! consumer per direction; both blocking (thread) and async (task) callers
//! are supported on either end.
//!
//! Received spans are handed out as [`Chunk`]s. A chunk keeps its bytes
//! counted against the capacity until it is released (or dropped), so a
//! producer can never run ahead of a consumer that is still working on
//! what it took.

use bytes::Bytes;
use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::ops::Deref;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::Notify;

/// Default capacity of each direction, in bytes
pub const DEFAULT_CAPACITY: usize = 1024;

/// How long a channel operation may wait
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Wait {
    /// Do not wait at all
    Poll,
    /// Wait up to the given duration; one too long to represent waits
    /// without limit
    For(Duration),
    /// Wait until the operation can complete
    Forever,
}

/// Channel error types
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ChannelError {
    /// Not enough free space and the caller asked not to wait
    #[error("Channel full")]
    Full,

    /// Not enough free space before the wait expired
    #[error("Timed out after {0:?} waiting for channel space")]
    Timeout(Duration),

    /// Span can never fit
    #[error("Span of {len} bytes exceeds channel capacity of {capacity} bytes")]
    TooLarge {
        /// Span length
        len: usize,
        /// Channel capacity
        capacity: usize,
    },

    /// Capacity of zero requested at creation
    #[error("Channel capacity must be non-zero")]
    ZeroCapacity,
}

#[derive(Debug, Default)]
struct State {
    spans: VecDeque<Bytes>,
    /// Bytes still in `spans`
    queued: usize,
    /// Bytes handed out in chunks not yet released
    in_flight: usize,
}

impl State {
    fn occupancy(&self) -> usize {
        self.queued + self.in_flight
    }

    fn take_front(&mut self, max: usize) -> Option<Bytes> {
        let front = self.spans.front_mut()?;
        let data = if front.len() > max {
            front.split_to(max)
        } else {
            self.spans.pop_front()?
        };
        self.queued -= data.len();
        self.in_flight += data.len();
        Some(data)
    }
}

#[derive(Debug)]
struct Shared {
    capacity: usize,
    state: Mutex<State>,
    not_empty: Condvar,
    not_full: Condvar,
    data_ready: Notify,
    space_ready: Notify,
}

impl Shared {
    fn wake_receivers(&self) {
        self.not_empty.notify_all();
        self.data_ready.notify_waiters();
    }

    fn wake_senders(&self) {
        self.not_full.notify_all();
        self.space_ready.notify_waiters();
    }
}

/// Bounded FIFO byte queue
///
/// Cloning yields another handle to the same queue.
#[derive(Debug, Clone)]
pub struct ByteChannel {
    shared: Arc<Shared>,
}

impl ByteChannel {
    /// Create a channel holding at most `capacity` bytes
    pub fn new(capacity: usize) -> Result<Self, ChannelError> {
        if capacity == 0 {
            return Err(ChannelError::ZeroCapacity);
        }

        Ok(Self {
            shared: Arc::new(Shared {
                capacity,
                state: Mutex::new(State::default()),
                not_empty: Condvar::new(),
                not_full: Condvar::new(),
                data_ready: Notify::new(),
                space_ready: Notify::new(),
            }),
        })
    }

    /// Capacity in bytes
    pub fn capacity(&self) -> usize {
        self.shared.capacity
    }

    /// Bytes held: queued plus handed out and not yet released
    pub fn pending_bytes(&self) -> usize {
        self.shared.state.lock().occupancy()
    }

    /// Bytes that a receive could return right now
    pub fn available_bytes(&self) -> usize {
        self.shared.state.lock().queued
    }

    /// Bytes a send could enqueue right now
    pub fn free_bytes(&self) -> usize {
        self.shared.capacity - self.pending_bytes()
    }

    /// Enqueue `data` as one span
    ///
    /// Either the whole span is queued or nothing is.
    pub fn send(&self, data: &[u8], wait: Wait) -> Result<(), ChannelError> {
        let shared = &*self.shared;
        if data.len() > shared.capacity {
            return Err(ChannelError::TooLarge {
                len: data.len(),
                capacity: shared.capacity,
            });
        }
        if data.is_empty() {
            return Ok(());
        }

        let started = Instant::now();
        let mut state = shared.state.lock();
        while shared.capacity - state.occupancy() < data.len() {
            match wait {
                Wait::Poll => return Err(ChannelError::Full),
                Wait::Forever => shared.not_full.wait(&mut state),
                Wait::For(timeout) => match started.checked_add(timeout) {
                    Some(deadline) => {
                        if shared.not_full.wait_until(&mut state, deadline).timed_out()
                            && shared.capacity - state.occupancy() < data.len()
                        {
                            return Err(ChannelError::Timeout(timeout));
                        }
                    }
                    // Past the end of the clock: no limit
                    None => shared.not_full.wait(&mut state),
                },
            }
        }

        state.spans.push_back(Bytes::copy_from_slice(data));
        state.queued += data.len();
        drop(state);

        shared.wake_receivers();
        Ok(())
    }

    /// Dequeue the oldest span
    pub fn receive(&self, wait: Wait) -> Option<Chunk> {
        self.receive_upto(usize::MAX, wait)
    }

    /// Dequeue at most `max` bytes of the oldest span
    ///
    /// The rest of a longer span stays at the head of the queue.
    pub fn receive_upto(&self, max: usize, wait: Wait) -> Option<Chunk> {
        if max == 0 {
            return None;
        }

        let shared = &self.shared;
        let started = Instant::now();
        let mut state = shared.state.lock();
        loop {
            if let Some(data) = state.take_front(max) {
                return Some(Chunk {
                    data,
                    shared: Arc::clone(shared),
                });
            }
            match wait {
                Wait::Poll => return None,
                Wait::Forever => shared.not_empty.wait(&mut state),
                Wait::For(timeout) => match started.checked_add(timeout) {
                    Some(deadline) => {
                        if shared.not_empty.wait_until(&mut state, deadline).timed_out()
                            && state.spans.is_empty()
                        {
                            return None;
                        }
                    }
                    None => shared.not_empty.wait(&mut state),
                },
            }
        }
    }

    /// Block until at least one byte is queued or `timeout` passes
    ///
    /// Returns whether data is available. Nothing is consumed.
    pub fn wait_available(&self, timeout: Duration) -> bool {
        let shared = &*self.shared;
        let deadline = Instant::now().checked_add(timeout);
        let mut state = shared.state.lock();
        while state.queued == 0 {
            match deadline {
                Some(deadline) => {
                    if shared.not_empty.wait_until(&mut state, deadline).timed_out() {
                        return state.queued > 0;
                    }
                }
                None => shared.not_empty.wait(&mut state),
            }
        }
        true
    }

    /// Enqueue `data`, awaiting free space for as long as it takes
    pub async fn send_async(&self, data: &[u8]) -> Result<(), ChannelError> {
        loop {
            let notified = self.shared.space_ready.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            match self.send(data, Wait::Poll) {
                Err(ChannelError::Full) => notified.await,
                other => return other,
            }
        }
    }

    /// Resolve once at least one byte is queued
    pub async fn readable(&self) {
        loop {
            let notified = self.shared.data_ready.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if self.available_bytes() > 0 {
                return;
            }
            notified.await;
        }
    }
}

/// A received span
///
/// Its bytes count against the channel capacity until released.
#[derive(Debug)]
pub struct Chunk {
    data: Bytes,
    shared: Arc<Shared>,
}

impl Chunk {
    /// Give the space back to the channel
    pub fn release(self) {
        drop(self);
    }

    /// View the bytes
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }
}

impl Deref for Chunk {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.data
    }
}

impl Drop for Chunk {
    fn drop(&mut self) {
        self.shared.state.lock().in_flight -= self.data.len();
        self.shared.wake_senders();
    }
}

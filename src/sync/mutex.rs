//! FIFO-fair mutual exclusion with blocking and suspending acquisition.

use std::collections::VecDeque;
use std::future::Future;
use std::ops::{Deref, DerefMut};
use std::pin::Pin;
use std::sync::{Condvar, Mutex, RwLock, RwLockWriteGuard};
use std::task::{Context, Poll, Waker};

use tracing::trace;

/// Acquisition state, guarded by the lock's own mutex.
#[derive(Debug)]
struct LockState {
    locked: bool,
    /// Tickets in arrival order; only the front ticket may acquire.
    waiters: VecDeque<u64>,
    /// Wakers for suspending tickets. Blocking tickets have no entry and are
    /// reached through the condvar instead.
    wakers: Vec<(u64, Waker)>,
    next_ticket: u64,
}

impl LockState {
    /// Returns the waker of the front ticket, if that ticket is suspending.
    fn front_waker(&self) -> Option<Waker> {
        let front = *self.waiters.front()?;
        self.wakers
            .iter()
            .find(|(ticket, _)| *ticket == front)
            .map(|(_, waker)| waker.clone())
    }
}

/// A FIFO-fair mutex.
///
/// Waiters are ticketed and serviced strictly in arrival order, so a stream
/// of writers queues rather than interleaves. Acquisition blocks the thread
/// ([`lock`](Self::lock)) or suspends the task
/// ([`lock_async`](Self::lock_async)); both forms contend in one queue.
///
/// # Cancel Safety
///
/// Dropping a [`LockFuture`] mid-wait abandons its ticket cleanly and, if
/// that ticket was next in line, passes the turn to the new front waiter.
#[derive(Debug)]
pub struct FairMutex<T> {
    data: RwLock<T>,
    state: Mutex<LockState>,
    available: Condvar,
}

impl<T> FairMutex<T> {
    /// Creates the mutex in an unlocked state.
    #[must_use]
    pub fn new(value: T) -> Self {
        Self {
            data: RwLock::new(value),
            state: Mutex::new(LockState {
                locked: false,
                waiters: VecDeque::new(),
                wakers: Vec::new(),
                next_ticket: 0,
            }),
            available: Condvar::new(),
        }
    }

    /// Returns true if the mutex is currently held.
    #[must_use]
    pub fn is_locked(&self) -> bool {
        self.state.lock().expect("fair mutex lock poisoned").locked
    }

    /// Returns the number of waiters queued for the lock.
    #[must_use]
    pub fn waiters(&self) -> usize {
        self.state
            .lock()
            .expect("fair mutex lock poisoned")
            .waiters
            .len()
    }

    /// Acquires the mutex, blocking the calling thread until it is this
    /// caller's turn.
    pub fn lock(&self) -> FairMutexGuard<'_, T> {
        let mut state = self.state.lock().expect("fair mutex lock poisoned");
        let ticket = state.next_ticket;
        state.next_ticket += 1;
        state.waiters.push_back(ticket);
        loop {
            if !state.locked && state.waiters.front() == Some(&ticket) {
                state.locked = true;
                state.waiters.pop_front();
                drop(state);
                trace!("fair_mutex::lock acquired");
                let data = self.data.write().expect("fair mutex data poisoned");
                return FairMutexGuard { lock: self, data };
            }
            state = self
                .available
                .wait(state)
                .expect("fair mutex lock poisoned");
        }
    }

    /// Suspending variant of [`lock`](Self::lock).
    pub fn lock_async(&self) -> LockFuture<'_, T> {
        LockFuture {
            lock: self,
            ticket: None,
        }
    }

    /// Releases the mutex and hands the turn to the front waiter.
    fn unlock(&self) {
        let mut state = self.state.lock().expect("fair mutex lock poisoned");
        state.locked = false;
        let waker = state.front_waker();
        drop(state);
        trace!("fair_mutex::unlock handing off");
        self.available.notify_all();
        if let Some(waker) = waker {
            waker.wake();
        }
    }
}

impl<T: Default> Default for FairMutex<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

/// Guard returned by [`FairMutex::lock`] and [`FairMutex::lock_async`].
///
/// Releases the lock and wakes the next ticket when dropped.
#[must_use = "guard releases the lock immediately if not held"]
pub struct FairMutexGuard<'a, T> {
    lock: &'a FairMutex<T>,
    data: RwLockWriteGuard<'a, T>,
}

impl<T: std::fmt::Debug> std::fmt::Debug for FairMutexGuard<'_, T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FairMutexGuard")
            .field("data", &*self.data)
            .finish()
    }
}

impl<T> Deref for FairMutexGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.data
    }
}

impl<T> DerefMut for FairMutexGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.data
    }
}

impl<T> Drop for FairMutexGuard<'_, T> {
    fn drop(&mut self) {
        self.lock.unlock();
    }
}

/// Future returned by [`FairMutex::lock_async`].
pub struct LockFuture<'a, T> {
    lock: &'a FairMutex<T>,
    /// The queued ticket; taken on acquisition so `Drop` only cleans up an
    /// abandoned wait.
    ticket: Option<u64>,
}

impl<T> std::fmt::Debug for LockFuture<'_, T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LockFuture")
            .field("ticket", &self.ticket)
            .finish_non_exhaustive()
    }
}

impl<T> Unpin for LockFuture<'_, T> {}

impl<'a, T> Future for LockFuture<'a, T> {
    type Output = FairMutexGuard<'a, T>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        let mut state = this.lock.state.lock().expect("fair mutex lock poisoned");

        let ticket = match this.ticket {
            Some(ticket) => ticket,
            None => {
                let ticket = state.next_ticket;
                state.next_ticket += 1;
                state.waiters.push_back(ticket);
                this.ticket = Some(ticket);
                ticket
            }
        };

        if !state.locked && state.waiters.front() == Some(&ticket) {
            state.locked = true;
            state.waiters.pop_front();
            state.wakers.retain(|(t, _)| *t != ticket);
            this.ticket = None;
            drop(state);
            trace!("fair_mutex::lock_async acquired");
            let data = this.lock.data.write().expect("fair mutex data poisoned");
            Poll::Ready(FairMutexGuard {
                lock: this.lock,
                data,
            })
        } else {
            if let Some((_, slot)) = state.wakers.iter_mut().find(|(t, _)| *t == ticket) {
                *slot = cx.waker().clone();
            } else {
                state.wakers.push((ticket, cx.waker().clone()));
            }
            Poll::Pending
        }
    }
}

impl<T> Drop for LockFuture<'_, T> {
    fn drop(&mut self) {
        let Some(ticket) = self.ticket.take() else {
            return;
        };
        let mut state = self.lock.state.lock().expect("fair mutex lock poisoned");
        if let Some(pos) = state.waiters.iter().position(|&t| t == ticket) {
            state.waiters.remove(pos);
        }
        state.wakers.retain(|(t, _)| *t != ticket);
        // If this ticket was abandoned while holding the turn, pass it on.
        let waker = if state.locked {
            None
        } else {
            state.front_waker()
        };
        drop(state);
        self.lock.available.notify_all();
        if let Some(waker) = waker {
            waker.wake();
        }
    }
}

//! The rendezvous channel core.

use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Condvar, Mutex};
use std::task::{Context, Poll, Waker};

use tracing::trace;

/// Registered suspending waiters for one side of the protocol.
///
/// Every state transition on this channel wakes the whole interested side
/// (the handoff is notify-all on each step), so entries carry no notified
/// flag; woken futures re-check state and re-register if they lost the
/// race. Tickets exist only so a cancelled future can remove itself.
#[derive(Debug, Default)]
struct Waiters {
    entries: Vec<(u64, Waker)>,
}

impl Waiters {
    /// Insert or refresh the waker for `ticket`.
    fn register(&mut self, ticket: u64, waker: &Waker) {
        if let Some((_, slot)) = self.entries.iter_mut().find(|(t, _)| *t == ticket) {
            *slot = waker.clone();
        } else {
            self.entries.push((ticket, waker.clone()));
        }
    }

    fn deregister(&mut self, ticket: u64) {
        self.entries.retain(|(t, _)| *t != ticket);
    }

    /// Take every registered waker; the caller wakes them after releasing
    /// the state lock.
    fn drain(&mut self) -> Vec<Waker> {
        self.entries.drain(..).map(|(_, waker)| waker).collect()
    }
}

/// Protocol state, guarded by the channel's one lock.
#[derive(Debug)]
struct State<T> {
    /// Receivers currently committed to receiving. A sender may deposit only
    /// while this is positive.
    receivers_ready: usize,
    /// The logical slot. The readiness protocol, not this queue's capacity,
    /// bounds the number of undelivered items: with a single paired
    /// sender/receiver it holds at most one.
    queue: VecDeque<T>,
    /// Suspending senders waiting for readiness.
    send_waiters: Waiters,
    /// Suspending receivers waiting for an item.
    recv_waiters: Waiters,
    next_ticket: u64,
}

struct Shared<T> {
    state: Mutex<State<T>>,
    /// Blocking senders wait here for a receiver to publish readiness.
    readiness: Condvar,
    /// Blocking receivers wait here for an item to be deposited.
    items: Condvar,
}

impl<T> std::fmt::Debug for Shared<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Shared").finish_non_exhaustive()
    }
}

/// A strict rendezvous (unbuffered) handoff channel.
///
/// A handle is cheaply clonable; all clones share one protocol state, so
/// both ends of an exchange hold the same channel. The channel does not
/// serialize concurrent senders: callers needing single-writer semantics
/// must serialize externally (the pipe does, with its write lock).
///
/// # Cancel Safety
///
/// Blocking operations have no timeout or cancellation. Suspending
/// operations cancel by dropping the future, which aborts only the waiting
/// state: a value already deposited by a matching sender is not retracted
/// and stays available to the next receive.
#[derive(Debug)]
pub struct RendezvousChannel<T> {
    shared: Arc<Shared<T>>,
}

impl<T> Clone for RendezvousChannel<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T> Default for RendezvousChannel<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> RendezvousChannel<T> {
    /// Creates a new channel with no waiting receivers and an empty slot.
    #[must_use]
    pub fn new() -> Self {
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(State {
                    receivers_ready: 0,
                    queue: VecDeque::new(),
                    send_waiters: Waiters::default(),
                    recv_waiters: Waiters::default(),
                    next_ticket: 0,
                }),
                readiness: Condvar::new(),
                items: Condvar::new(),
            }),
        }
    }

    /// Returns the number of receivers currently committed to receiving.
    #[must_use]
    pub fn waiting_receivers(&self) -> usize {
        self.shared
            .state
            .lock()
            .expect("rendezvous lock poisoned")
            .receivers_ready
    }

    /// Sends a value, blocking the calling thread until a receiver is
    /// committed to receiving it.
    ///
    /// Returning means a receiver was waiting and the value was deposited
    /// for it; it does not mean the receiver has finished consuming the
    /// value. Callers that need completion feedback layer their own ack
    /// exchange on top, as the pipe does.
    pub fn send(&self, value: T) {
        let mut state = self.shared.state.lock().expect("rendezvous lock poisoned");
        while state.receivers_ready == 0 {
            trace!("rendezvous::send waiting for receiver");
            state = self
                .shared
                .readiness
                .wait(state)
                .expect("rendezvous lock poisoned");
        }
        state.queue.push_back(value);
        let wakers = state.recv_waiters.drain();
        drop(state);
        trace!("rendezvous::send deposited item");
        self.shared.items.notify_all();
        for waker in wakers {
            waker.wake();
        }
    }

    /// Receives a value, blocking the calling thread until one is deposited.
    ///
    /// Readiness is published (and blocked senders are woken) before this
    /// thread waits for an item, so a receive that begins before any send
    /// legitimately blocks on an empty channel rather than missing the
    /// sender's signal.
    pub fn recv(&self) -> T {
        let mut state = self.shared.state.lock().expect("rendezvous lock poisoned");
        state.receivers_ready += 1;
        let wakers = state.send_waiters.drain();
        self.shared.readiness.notify_all();
        for waker in wakers {
            waker.wake();
        }
        trace!("rendezvous::recv published readiness");
        loop {
            if let Some(value) = state.queue.pop_front() {
                state.receivers_ready -= 1;
                trace!("rendezvous::recv took item");
                return value;
            }
            state = self
                .shared
                .items
                .wait(state)
                .expect("rendezvous lock poisoned");
        }
    }

    /// Suspending variant of [`send`](Self::send).
    ///
    /// The returned future resolves once the value has been deposited for a
    /// committed receiver. Dropping it before completion aborts the wait;
    /// the value is dropped with the future, never half-sent.
    pub fn send_async(&self, value: T) -> SendValue<'_, T> {
        SendValue {
            channel: self,
            value: Some(value),
            ticket: None,
        }
    }

    /// Suspending variant of [`recv`](Self::recv).
    ///
    /// The future publishes readiness on its first poll and resolves with
    /// the received value. Dropping it mid-wait retracts the readiness
    /// claim; an item a sender deposited in the meantime stays queued for
    /// the next receive.
    pub fn recv_async(&self) -> RecvValue<'_, T> {
        RecvValue {
            channel: self,
            ticket: None,
            announced: false,
            done: false,
        }
    }

    fn allocate_ticket(state: &mut State<T>) -> u64 {
        let ticket = state.next_ticket;
        state.next_ticket += 1;
        ticket
    }
}

/// Future returned by [`RendezvousChannel::send_async`].
pub struct SendValue<'a, T> {
    channel: &'a RendezvousChannel<T>,
    /// Taken when the value is deposited; `None` marks completion.
    value: Option<T>,
    ticket: Option<u64>,
}

impl<T> std::fmt::Debug for SendValue<'_, T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SendValue")
            .field("ticket", &self.ticket)
            .finish_non_exhaustive()
    }
}

// No field is ever pinned; the future is a plain state machine over borrows.
impl<T> Unpin for SendValue<'_, T> {}

impl<T> Future for SendValue<'_, T> {
    type Output = ();

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        let this = self.get_mut();
        if this.value.is_none() {
            return Poll::Ready(());
        }

        let mut state = this
            .channel
            .shared
            .state
            .lock()
            .expect("rendezvous lock poisoned");
        if state.receivers_ready > 0 {
            if let Some(value) = this.value.take() {
                state.queue.push_back(value);
            }
            if let Some(ticket) = this.ticket.take() {
                state.send_waiters.deregister(ticket);
            }
            let wakers = state.recv_waiters.drain();
            drop(state);
            trace!("rendezvous::send_async deposited item");
            this.channel.shared.items.notify_all();
            for waker in wakers {
                waker.wake();
            }
            Poll::Ready(())
        } else {
            let ticket = match this.ticket {
                Some(ticket) => ticket,
                None => {
                    let ticket = RendezvousChannel::allocate_ticket(&mut state);
                    this.ticket = Some(ticket);
                    ticket
                }
            };
            state.send_waiters.register(ticket, cx.waker());
            trace!("rendezvous::send_async waiting for receiver");
            Poll::Pending
        }
    }
}

impl<T> Drop for SendValue<'_, T> {
    fn drop(&mut self) {
        if let Some(ticket) = self.ticket.take() {
            let mut state = self
                .channel
                .shared
                .state
                .lock()
                .expect("rendezvous lock poisoned");
            state.send_waiters.deregister(ticket);
        }
    }
}

/// Future returned by [`RendezvousChannel::recv_async`].
pub struct RecvValue<'a, T> {
    channel: &'a RendezvousChannel<T>,
    ticket: Option<u64>,
    /// Whether this future has published readiness that it has not yet
    /// consumed (by taking an item) or retracted (by being dropped).
    announced: bool,
    done: bool,
}

impl<T> std::fmt::Debug for RecvValue<'_, T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecvValue")
            .field("announced", &self.announced)
            .field("done", &self.done)
            .finish_non_exhaustive()
    }
}

impl<T> Unpin for RecvValue<'_, T> {}

impl<T> Future for RecvValue<'_, T> {
    type Output = T;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<T> {
        let this = self.get_mut();
        assert!(!this.done, "RecvValue polled after completion");

        let mut state = this
            .channel
            .shared
            .state
            .lock()
            .expect("rendezvous lock poisoned");

        let mut sender_wakers = Vec::new();
        if !this.announced {
            state.receivers_ready += 1;
            this.announced = true;
            sender_wakers = state.send_waiters.drain();
            this.channel.shared.readiness.notify_all();
            trace!("rendezvous::recv_async published readiness");
        }

        let result = if let Some(value) = state.queue.pop_front() {
            state.receivers_ready -= 1;
            this.announced = false;
            this.done = true;
            if let Some(ticket) = this.ticket.take() {
                state.recv_waiters.deregister(ticket);
            }
            trace!("rendezvous::recv_async took item");
            Poll::Ready(value)
        } else {
            let ticket = match this.ticket {
                Some(ticket) => ticket,
                None => {
                    let ticket = RendezvousChannel::allocate_ticket(&mut state);
                    this.ticket = Some(ticket);
                    ticket
                }
            };
            state.recv_waiters.register(ticket, cx.waker());
            Poll::Pending
        };
        drop(state);

        for waker in sender_wakers {
            waker.wake();
        }
        result
    }
}

impl<T> Drop for RecvValue<'_, T> {
    fn drop(&mut self) {
        if !self.announced && self.ticket.is_none() {
            return;
        }
        let mut state = self
            .channel
            .shared
            .state
            .lock()
            .expect("rendezvous lock poisoned");
        if self.announced {
            // Retract only the readiness claim. An item deposited against it
            // stays queued for the next receive.
            state.receivers_ready -= 1;
        }
        if let Some(ticket) = self.ticket.take() {
            state.recv_waiters.deregister(ticket);
        }
    }
}

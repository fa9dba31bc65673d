//! Rendezvous (unbuffered) handoff channel.
//!
//! A send on this channel cannot complete until a receiver has committed to
//! receiving. The handoff protocol:
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────────────┐
//! │                      RENDEZVOUS HANDOFF                            │
//! │                                                                    │
//! │   Sender                                  Receiver                 │
//! │     │                                        │                     │
//! │     │                                        │── ready += 1 ──►    │
//! │     │◄─── woken: ready > 0 ──────────────────│                     │
//! │     │                                        │                     │
//! │     │─── deposit item ──────────────────────►│── take item         │
//! │     │                                        │── ready -= 1        │
//! │   (returns)                               (returns)                │
//! └────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The receiver always publishes readiness before waiting for an item, and
//! the sender only deposits after observing readiness under the same lock.
//! That ordering is what rules out the lost-wakeup failure: neither side can
//! miss a signal published by the other.
//!
//! # Blocking and Suspending
//!
//! Each operation has a thread-blocking form ([`RendezvousChannel::send`],
//! [`RendezvousChannel::recv`]) and a future-returning form
//! ([`RendezvousChannel::send_async`], [`RendezvousChannel::recv_async`]).
//! All four run the same protocol over the same state, so the two scheduling
//! models interoperate freely on one channel instance.

mod rendezvous;

pub use rendezvous::{RecvValue, RendezvousChannel, SendValue};

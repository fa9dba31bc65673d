//! Rendsync: strict rendezvous handoff between one producer and one consumer.
//!
//! # Overview
//!
//! Rendsync provides an unbuffered handoff channel: a send cannot complete
//! until a receiver has actively committed to receiving, and no data is ever
//! parked beyond the single in-flight item. On top of it sits a byte pipe
//! that turns arbitrary-sized read/write requests into sequences of
//! single-item exchanges, reporting partial-copy counts back to the writer.
//!
//! # Core Guarantees
//!
//! - **No unreceived deposits**: a sender deposits only while at least one
//!   receiver is registered as waiting
//! - **At most one in-flight item**: with a single producer/consumer pair,
//!   exactly one undelivered item exists between a send and its receive
//! - **Dual scheduling models**: blocking and future-based entry points run
//!   the same locked protocol and are observably identical apart from how
//!   the caller yields
//! - **No spinning**: every wait is condvar- or waker-signal-driven
//!
//! # Module Structure
//!
//! - [`channel`]: The rendezvous handoff channel
//! - [`pipe`]: Byte pipe built from two rendezvous channels (data + ack)
//! - [`sync`]: FIFO-fair write-serialization lock
//! - [`error`]: Error types
//! - [`test_utils`]: Logging bootstrap and future-driving helpers for tests

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::module_name_repetitions)]

pub mod channel;
pub mod error;
pub mod pipe;
pub mod sync;
pub mod test_utils;

pub use channel::{RecvValue, RendezvousChannel, SendValue};
pub use error::PipeError;
pub use pipe::{ReadPipe, RendezvousPipe, TransferDescriptor, WritePipe};
pub use sync::{FairMutex, FairMutexGuard, LockFuture};

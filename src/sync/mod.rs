//! Synchronization support for the pipe's writer side.
//!
//! The pipe serializes writers with a FIFO-fair lock whose acquisition has
//! both a blocking and a suspending form, matching the channel's dual API.
//!
//! - [`FairMutex`]: Ticketed mutual exclusion; waiters acquire in arrival
//!   order, whether they wait on a thread or on a waker.

mod mutex;

pub use mutex::{FairMutex, FairMutexGuard, LockFuture};

//! Byte pipe built from two rendezvous channels.
//!
//! A writer offers descriptors of its remaining bytes on the data channel;
//! a reader consumes one descriptor per read, copies the overlap into its
//! own buffer, and reports the copied count back on the ack channel, which
//! is what lets the writer resume with the unconsumed remainder:
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────────────┐
//! │                        ONE EXCHANGE PAIR                           │
//! │                                                                    │
//! │   Writer                                   Reader                  │
//! │     │                                        │                     │
//! │     │── descriptor[offset..] ── data ──────► │ copy min(len, buf)  │
//! │     │                                        │                     │
//! │     │ ◄──────── ack ───────── copied count ──│                     │
//! │     │ offset += copied                    (read returns)           │
//! │     │ count  -= copied                                             │
//! │     └─ loop while count > 0                                        │
//! └────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! No bytes are buffered beyond one exchange: the pipe holds no position, no
//! length, and no EOF state, and rejects every operation that would imply
//! one. A single write may be fragmented across arbitrarily many reads; a
//! single read never spans two writer offers.

mod descriptor;
mod stream;

pub use descriptor::TransferDescriptor;
pub use stream::{ReadPipe, RendezvousPipe, WritePipe};

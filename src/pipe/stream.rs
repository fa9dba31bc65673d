//! The pipe stream surface.

use std::future::Future;
use std::io;
use std::mem;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use tracing::trace;

use crate::channel::{RecvValue, RendezvousChannel, SendValue};
use crate::error::PipeError;
use crate::pipe::TransferDescriptor;
use crate::sync::{FairMutex, FairMutexGuard, LockFuture};

struct PipeShared {
    /// Writer → reader: descriptors of the writer's remaining bytes.
    data: RendezvousChannel<TransferDescriptor>,
    /// Reader → writer: how many bytes the reader actually copied.
    ack: RendezvousChannel<usize>,
    /// Serializes writers; concurrent writes queue rather than interleave
    /// their descriptors.
    write_lock: FairMutex<()>,
}

/// A byte pipe with strict rendezvous semantics.
///
/// Handles are cheaply clonable and share one pipe; put one clone on the
/// writing side and one on the reading side. The pipe implements
/// [`io::Read`], [`io::Write`], and [`io::Seek`] for both `RendezvousPipe`
/// and `&RendezvousPipe` (the `&TcpStream` convention), plus suspending
/// forms as futures.
///
/// Every write is delivered in full before the call returns, fragmented
/// across as many reads as the readers' buffer sizes dictate. Every read
/// consumes exactly one writer offer. Nothing is buffered between the two:
/// seek, length, and position are structurally unsupported and `flush` has
/// nothing to do.
#[derive(Debug, Clone)]
pub struct RendezvousPipe {
    shared: Arc<PipeShared>,
}

impl std::fmt::Debug for PipeShared {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipeShared").finish_non_exhaustive()
    }
}

impl Default for RendezvousPipe {
    fn default() -> Self {
        Self::new()
    }
}

/// Copies the overlap between the reader's buffer and the offered slice.
fn copy_overlap(dst: &mut [u8], descriptor: &TransferDescriptor) -> usize {
    let count = descriptor.len().min(dst.len());
    dst[..count].copy_from_slice(&descriptor.remaining()[..count]);
    count
}

impl RendezvousPipe {
    /// Creates a new, empty pipe.
    #[must_use]
    pub fn new() -> Self {
        Self {
            shared: Arc::new(PipeShared {
                data: RendezvousChannel::new(),
                ack: RendezvousChannel::new(),
                write_lock: FairMutex::new(()),
            }),
        }
    }

    /// Reads from the pipe, blocking until a writer offers bytes.
    ///
    /// Consumes exactly one writer offer: copies
    /// `min(offered len, buf.len())` bytes into `buf`, reports that count
    /// back to the writer, and returns it. A read never spans two offers,
    /// even if `buf` has room for more.
    pub fn read(&self, buf: &mut [u8]) -> io::Result<usize> {
        let descriptor = self.shared.data.recv();
        let copied = copy_overlap(buf, &descriptor);
        self.shared.ack.send(copied);
        trace!(copied, "pipe::read exchanged");
        Ok(copied)
    }

    /// Writes to the pipe, blocking until every byte has been handed to a
    /// reader.
    ///
    /// Takes the pipe's write lock for the whole call, then repeatedly
    /// offers the remaining slice and advances by each reader's reported
    /// copy count. The call may be fragmented across arbitrarily many
    /// reads; it returns `buf.len()` once all bytes are delivered.
    pub fn write(&self, buf: &[u8]) -> io::Result<usize> {
        let _guard = self.shared.write_lock.lock();
        if buf.is_empty() {
            return Ok(0);
        }
        let data: Arc<[u8]> = Arc::from(buf);
        let mut offset = 0;
        let mut remaining = buf.len();
        while remaining > 0 {
            self.shared
                .data
                .send(TransferDescriptor::new(Arc::clone(&data), offset, remaining));
            let copied = self.shared.ack.recv();
            offset += copied;
            remaining -= copied;
            trace!(copied, remaining, "pipe::write advanced");
        }
        Ok(buf.len())
    }

    /// Suspending variant of [`read`](Self::read).
    ///
    /// # Caller Hazard
    ///
    /// Dropping the future after it has consumed a writer's offer but
    /// before the ack is delivered leaves that writer waiting forever; the
    /// pipe does not detect or recover this.
    pub fn read_async<'a>(&'a self, buf: &'a mut [u8]) -> ReadPipe<'a> {
        ReadPipe {
            state: ReadState::Receiving(self.shared.data.recv_async()),
            pipe: self,
            buf,
        }
    }

    /// Suspending variant of [`write`](Self::write).
    ///
    /// # Caller Hazard
    ///
    /// Dropping the future between depositing an offer and receiving its
    /// ack leaves the protocol inconsistent: the reader's copy count is
    /// never consumed and the bytes already handed over stay delivered.
    /// Cancellation before the first offer is clean.
    pub fn write_async(&self, buf: &[u8]) -> WritePipe<'_> {
        WritePipe {
            state: WriteState::Locking(self.shared.write_lock.lock_async()),
            pipe: self,
            data: Arc::from(buf),
            offset: 0,
            remaining: buf.len(),
        }
    }

    /// Does nothing: the pipe never buffers bytes, so there is nothing to
    /// flush.
    pub fn flush(&self) -> io::Result<()> {
        Ok(())
    }

    /// Always fails: the pipe has no persisted length.
    pub fn length(&self) -> Result<u64, PipeError> {
        Err(PipeError::Unsupported("length query"))
    }

    /// Always fails: the pipe has no persisted length.
    pub fn set_length(&self, _length: u64) -> Result<(), PipeError> {
        Err(PipeError::Unsupported("length change"))
    }

    /// Always fails: the pipe has no addressable position.
    pub fn position(&self) -> Result<u64, PipeError> {
        Err(PipeError::Unsupported("position query"))
    }

    /// Always fails: the pipe has no addressable position.
    pub fn set_position(&self, _position: u64) -> Result<(), PipeError> {
        Err(PipeError::Unsupported("position change"))
    }
}

impl io::Read for RendezvousPipe {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        RendezvousPipe::read(self, buf)
    }
}

impl io::Read for &RendezvousPipe {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        RendezvousPipe::read(*self, buf)
    }
}

impl io::Write for RendezvousPipe {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        RendezvousPipe::write(self, buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        RendezvousPipe::flush(self)
    }
}

impl io::Write for &RendezvousPipe {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        RendezvousPipe::write(*self, buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        RendezvousPipe::flush(*self)
    }
}

impl io::Seek for RendezvousPipe {
    fn seek(&mut self, _pos: io::SeekFrom) -> io::Result<u64> {
        Err(PipeError::Unsupported("seek").into())
    }
}

impl io::Seek for &RendezvousPipe {
    fn seek(&mut self, _pos: io::SeekFrom) -> io::Result<u64> {
        Err(PipeError::Unsupported("seek").into())
    }
}

enum ReadState<'a> {
    /// Waiting for a writer's offer.
    Receiving(RecvValue<'a, TransferDescriptor>),
    /// Offer consumed and copied; delivering the count back to the writer.
    Acking {
        send: SendValue<'a, usize>,
        copied: usize,
    },
    Done,
}

/// Future returned by [`RendezvousPipe::read_async`].
pub struct ReadPipe<'a> {
    pipe: &'a RendezvousPipe,
    buf: &'a mut [u8],
    state: ReadState<'a>,
}

impl std::fmt::Debug for ReadPipe<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReadPipe").finish_non_exhaustive()
    }
}

impl Future for ReadPipe<'_> {
    type Output = io::Result<usize>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        loop {
            match &mut this.state {
                ReadState::Receiving(recv) => match Pin::new(recv).poll(cx) {
                    Poll::Pending => return Poll::Pending,
                    Poll::Ready(descriptor) => {
                        let copied = copy_overlap(this.buf, &descriptor);
                        this.state = ReadState::Acking {
                            send: this.pipe.shared.ack.send_async(copied),
                            copied,
                        };
                    }
                },
                ReadState::Acking { send, copied } => match Pin::new(send).poll(cx) {
                    Poll::Pending => return Poll::Pending,
                    Poll::Ready(()) => {
                        let copied = *copied;
                        this.state = ReadState::Done;
                        trace!(copied, "pipe::read_async exchanged");
                        return Poll::Ready(Ok(copied));
                    }
                },
                ReadState::Done => panic!("ReadPipe polled after completion"),
            }
        }
    }
}

enum WriteState<'a> {
    /// Queued for the write lock.
    Locking(LockFuture<'a, ()>),
    /// Offering the remaining slice on the data channel.
    Offering {
        guard: FairMutexGuard<'a, ()>,
        send: SendValue<'a, TransferDescriptor>,
    },
    /// Waiting for the reader's copy count.
    Acking {
        guard: FairMutexGuard<'a, ()>,
        recv: RecvValue<'a, usize>,
    },
    Done,
}

/// Future returned by [`RendezvousPipe::write_async`].
pub struct WritePipe<'a> {
    pipe: &'a RendezvousPipe,
    /// The staged copy of the caller's buffer, shared with every descriptor
    /// this write offers.
    data: Arc<[u8]>,
    offset: usize,
    remaining: usize,
    state: WriteState<'a>,
}

impl std::fmt::Debug for WritePipe<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WritePipe")
            .field("offset", &self.offset)
            .field("remaining", &self.remaining)
            .finish_non_exhaustive()
    }
}

impl Future for WritePipe<'_> {
    type Output = io::Result<usize>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        loop {
            match mem::replace(&mut this.state, WriteState::Done) {
                WriteState::Locking(mut lock) => match Pin::new(&mut lock).poll(cx) {
                    Poll::Pending => {
                        this.state = WriteState::Locking(lock);
                        return Poll::Pending;
                    }
                    Poll::Ready(guard) => {
                        if this.remaining == 0 {
                            return Poll::Ready(Ok(0));
                        }
                        let descriptor = TransferDescriptor::new(
                            Arc::clone(&this.data),
                            this.offset,
                            this.remaining,
                        );
                        this.state = WriteState::Offering {
                            guard,
                            send: this.pipe.shared.data.send_async(descriptor),
                        };
                    }
                },
                WriteState::Offering { guard, mut send } => match Pin::new(&mut send).poll(cx) {
                    Poll::Pending => {
                        this.state = WriteState::Offering { guard, send };
                        return Poll::Pending;
                    }
                    Poll::Ready(()) => {
                        this.state = WriteState::Acking {
                            guard,
                            recv: this.pipe.shared.ack.recv_async(),
                        };
                    }
                },
                WriteState::Acking { guard, mut recv } => match Pin::new(&mut recv).poll(cx) {
                    Poll::Pending => {
                        this.state = WriteState::Acking { guard, recv };
                        return Poll::Pending;
                    }
                    Poll::Ready(copied) => {
                        this.offset += copied;
                        this.remaining -= copied;
                        trace!(copied, remaining = this.remaining, "pipe::write_async advanced");
                        if this.remaining == 0 {
                            drop(guard);
                            return Poll::Ready(Ok(this.data.len()));
                        }
                        let descriptor = TransferDescriptor::new(
                            Arc::clone(&this.data),
                            this.offset,
                            this.remaining,
                        );
                        this.state = WriteState::Offering {
                            guard,
                            send: this.pipe.shared.data.send_async(descriptor),
                        };
                    }
                },
                WriteState::Done => panic!("WritePipe polled after completion"),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::block_on;
    use std::io::{Seek, SeekFrom};

    fn init_test(name: &str) {
        crate::test_utils::init_test_logging();
        crate::test_phase!(name);
    }

    #[test]
    fn unsupported_operations_always_fail() {
        init_test("unsupported_operations_always_fail");
        let pipe = RendezvousPipe::new();

        assert_eq!(pipe.length(), Err(PipeError::Unsupported("length query")));
        assert_eq!(
            pipe.set_length(16),
            Err(PipeError::Unsupported("length change"))
        );
        assert_eq!(
            pipe.position(),
            Err(PipeError::Unsupported("position query"))
        );
        assert_eq!(
            pipe.set_position(4),
            Err(PipeError::Unsupported("position change"))
        );

        let mut handle = &pipe;
        let err = handle
            .seek(SeekFrom::Start(0))
            .expect_err("seek must fail");
        crate::assert_with_log!(
            err.kind() == io::ErrorKind::Unsupported,
            "seek error kind",
            io::ErrorKind::Unsupported,
            err.kind()
        );
        crate::test_complete!("unsupported_operations_always_fail");
    }

    #[test]
    fn flush_is_a_no_op() {
        init_test("flush_is_a_no_op");
        let pipe = RendezvousPipe::new();
        let flushed = pipe.flush().is_ok();
        crate::assert_with_log!(flushed, "flush ok", true, flushed);
        crate::test_complete!("flush_is_a_no_op");
    }

    #[test]
    fn empty_write_completes_without_reader() {
        init_test("empty_write_completes_without_reader");
        let pipe = RendezvousPipe::new();

        let written = pipe.write(b"").expect("empty write failed");
        crate::assert_with_log!(written == 0, "blocking empty write", 0usize, written);

        let written = block_on(pipe.write_async(b"")).expect("empty async write failed");
        crate::assert_with_log!(written == 0, "suspending empty write", 0usize, written);
        crate::test_complete!("empty_write_completes_without_reader");
    }
}

//! Descriptors exchanged over the pipe's data channel.

use std::sync::Arc;

/// An immutable view of the bytes a writer currently offers.
///
/// The descriptor does not own a buffer of its own: it shares the staging
/// allocation the writer made for the duration of its call, narrowed to the
/// still-unwritten `[offset, offset + len)` slice. It is valid for exactly
/// one exchange and is never retained by the channel past the matching
/// receive.
#[derive(Clone)]
pub struct TransferDescriptor {
    data: Arc<[u8]>,
    offset: usize,
    len: usize,
}

impl std::fmt::Debug for TransferDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransferDescriptor")
            .field("offset", &self.offset)
            .field("len", &self.len)
            .finish_non_exhaustive()
    }
}

impl TransferDescriptor {
    pub(crate) fn new(data: Arc<[u8]>, offset: usize, len: usize) -> Self {
        debug_assert!(offset + len <= data.len(), "descriptor out of bounds");
        Self { data, offset, len }
    }

    /// The offset of the remaining slice within the writer's buffer.
    #[must_use]
    pub const fn offset(&self) -> usize {
        self.offset
    }

    /// Number of bytes the writer still offers.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.len
    }

    /// Returns true if the descriptor offers no bytes.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// The offered bytes.
    #[must_use]
    pub fn remaining(&self) -> &[u8] {
        &self.data[self.offset..self.offset + self.len]
    }
}

//! Error types for the pipe surface.
//!
//! The channel itself is infallible: blocking operations always complete and
//! suspending operations cancel by being dropped. The only structured failure
//! in this crate is the pipe rejecting an operation it has no semantics for.

use std::io;

use thiserror::Error;

/// Error returned by pipe operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum PipeError {
    /// The pipe has no addressable position or persisted length, so seek,
    /// length, and position operations are structurally unsupported. The
    /// failure is deterministic and independent of concurrent traffic.
    #[error("pipe does not support {0}")]
    Unsupported(&'static str),
}

impl From<PipeError> for io::Error {
    fn from(err: PipeError) -> Self {
        Self::new(io::ErrorKind::Unsupported, err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unsupported_display() {
        let err = PipeError::Unsupported("seek");
        assert_eq!(err.to_string(), "pipe does not support seek");
    }

    #[test]
    fn maps_to_io_unsupported() {
        let err: io::Error = PipeError::Unsupported("length").into();
        assert_eq!(err.kind(), io::ErrorKind::Unsupported);
    }
}

//! Closed error taxonomy for the PSA protocol core (spec §7).

use std::time::Duration;

use crate::constants::ErrorCode;

/// Every fallible operation in this crate returns `Result<T, PsaError>`.
#[derive(Debug, thiserror::Error)]
pub enum PsaError {
    /// The underlying byte stream failed (I/O error, device
    /// disappeared). Not retried here; surfaced to the caller.
    #[error("transport error: {0}")]
    Transport(#[from] std::io::Error),

    /// The deadline expired without a correlated reply.
    #[error("{operation} timed out after {elapsed:?}")]
    Timeout {
        operation: &'static str,
        elapsed: Duration,
    },

    /// A frame arrived with a bad CRC and no good frame followed
    /// before the deadline. CRC errors encountered with time still
    /// remaining are logged and parsing continues; this variant is
    /// only ever returned once the deadline is already gone.
    #[error("CRC mismatch: expected {expected:#04x}, got {actual:#04x}")]
    Crc { expected: u8, actual: u8 },

    /// A structural violation (bad LEN, missing ETX, truncated
    /// payload) with no good frame following before the deadline.
    #[error("frame format error: {0}")]
    Format(String),

    /// A well-formed frame whose command code or payload shape does
    /// not match the outstanding request. Surfaced immediately, not
    /// retried.
    #[error("protocol violation: {0}")]
    Protocol(String),

    /// The device rejected the request.
    #[error("device NAK: {}", .code.name())]
    Nak { code: ErrorCode },

    /// Caller supplied an invalid sensor id, an out-of-range spec
    /// field, or a payload exceeding `MAX_PAYLOAD`. Raised before any
    /// bytes are written.
    #[error("invalid argument: {0}")]
    Argument(String),
}

impl PsaError {
    /// Convenience constructor mirroring the NAK payload's error-code
    /// byte, used by the request pipeline when classifying replies.
    pub fn nak(code_byte: u8) -> Self {
        PsaError::Nak {
            code: ErrorCode::from_u8(code_byte),
        }
    }
}

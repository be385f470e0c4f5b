//! Wire protocol error types.

use thiserror::Error;

/// Highway wire protocol errors
#[derive(Error, Debug)]
pub enum WireError {
    /// Size limit exceeded
    #[error("size limit exceeded: {0}")]
    Size(usize),

    /// Frame marker byte did not match
    #[error("bad frame marker: expected {expected}, found {found}")]
    Marker {
        /// Marker required at this position
        expected: u8,
        /// Byte actually present
        found: u8,
    },

    /// Chunk header could not be parsed
    #[error("chunk header invalid: {0}")]
    Header(#[from] prost::DecodeError),

    /// A required chunk header field was absent
    #[error("chunk header missing field: {0}")]
    MissingField(&'static str),

    /// Malformed frame structure
    #[error("malformed frame")]
    Malformed,
}

//! Directory client error types.

use msf_wire::{JceError, TeaError};
use std::time::Duration;
use thiserror::Error;

/// Directory lookup errors
#[derive(Error, Debug)]
pub enum DirectoryError {
    /// HTTP transport failure
    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Non-success HTTP status
    #[error("directory server returned status {0}")]
    Status(u16),

    /// No answer within the deadline
    #[error("directory request timed out after {0:?}")]
    Timeout(Duration),

    /// Response could not be decrypted
    #[error("cipher error: {0}")]
    Cipher(#[from] TeaError),

    /// Response could not be decoded
    #[error("decode error: {0}")]
    Decode(#[from] JceError),

    /// Response decoded but did not have the expected shape
    #[error("malformed response: {0}")]
    Malformed(&'static str),
}

//! Service-directory client for msf-transfer.
//!
//! The directory answers an encrypted server-list request with the transfer
//! servers a client should upload to. Requests and responses are JCE request
//! envelopes behind a 4-byte length prefix, TEA-encrypted with a key shared by
//! all clients, and carried in an HTTP POST.
//!
//! ## Example
//!
//! ```rust,no_run
//! use msf_directory::{DirectoryClient, DirectoryConfig};
//! use msf_wire::ClientIdentity;
//!
//! # async fn example() -> Result<(), msf_directory::DirectoryError> {
//! let client = DirectoryClient::new(DirectoryConfig::default())?;
//! for server in client.fetch_servers(&ClientIdentity::default()).await? {
//!     println!("{}", server);
//! }
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod address;
pub mod client;
pub mod error;
pub mod request;

// Re-export main types
pub use address::{packed_ipv4, IpField, ServerEntry};
pub use client::{DirectoryClient, DirectoryConfig, DEFAULT_TIMEOUT_MS, DIRECTORY_KEY, DIRECTORY_URL};
pub use error::DirectoryError;
pub use request::{encrypt_request, encrypt_response, parse_response};

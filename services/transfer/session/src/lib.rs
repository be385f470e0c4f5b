//! TCP transport and the send/acknowledge highway upload pump for msf-transfer.
//!
//! This crate delivers the frames produced by `msf-wire` to a transfer
//! server. Exactly one frame is in flight at a time: a frame is written, then
//! the pump waits for any reply before writing the next. Replies are not
//! parsed.
//!
//! ## Example
//!
//! ```rust,no_run
//! use bytes::Bytes;
//! use msf_session::{HighwaySession, SessionConfig};
//! use msf_wire::{ClientIdentity, UploadObject};
//! use std::time::Duration;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let identity = ClientIdentity::default();
//! let object = UploadObject::new(std::fs::read("photo.jpg")?, Bytes::from_static(b"ticket"));
//! let session = HighwaySession::new(SessionConfig::default());
//! let addr: std::net::SocketAddr = "183.3.235.62:80".parse()?;
//!
//! // The pump has no timeout of its own
//! let report = tokio::time::timeout(
//!     Duration::from_secs(60),
//!     session.upload(addr, object.packets(&identity, 2)),
//! )
//! .await?;
//!
//! if !report.is_complete() {
//!     eprintln!("upload {}", report.outcome);
//! }
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod session;
pub mod transport;

// Re-export main types
pub use session::{
    HighwaySession, PumpEvent, PumpState, SessionConfig, UploadOutcome, UploadReport,
};
pub use transport::{connect_tcp, listen_tcp};

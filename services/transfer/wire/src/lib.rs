//! Highway framing, chunk headers, JCE serialization and TEA cipher for msf-transfer.
//!
//! This crate provides the byte-level pieces shared by the highway upload pump
//! and the service-directory client: the marker-delimited highway frame, the
//! protobuf chunk header, the chunk packet builder, the positional JCE
//! tag/value format and the TEA block cipher used by the directory protocol.
//!
//! ## Features
//!
//! - **Exact Framing**: 9-byte preamble, header, chunk and trailing marker
//! - **Lazy Chunking**: frames are built one at a time from a borrowed buffer
//! - **Zero-Copy Slicing**: chunks are `Bytes` views into the upload buffer
//! - **Bounded Decoding**: the JCE decoder caps container nesting depth
//!
//! ## Wire Format
//!
//! ```text
//! +----------------------+----------------------------+
//! | u8  marker = 40      | frame start                |
//! +----------------------+----------------------------+
//! | u32 header_len (BE)  | length of serialized head  |
//! +----------------------+----------------------------+
//! | u32 chunk_len (BE)   | length of payload chunk    |
//! +----------------------+----------------------------+
//! | header               | protobuf HighwayHead       |
//! +----------------------+----------------------------+
//! | chunk                | <= 3,000,000 payload bytes |
//! +----------------------+----------------------------+
//! | u8  marker = 41      | frame end                  |
//! +----------------------+----------------------------+
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod chunk;
pub mod error;
pub mod frame;
pub mod header;
pub mod identity;
pub mod jce;
pub mod tea;

// Re-export main types
pub use chunk::{md5, ChunkPackets, Digest, UploadObject, CHUNK_SIZE_LIMIT};
pub use error::WireError;
pub use frame::{
    Frame, FrameDecoder, FRAME_END, FRAME_START, HARD_MAX_FRAME_SIZE, PREAMBLE_SIZE,
};
pub use header::{
    BaseHead, ChunkHeader, HighwayHead, SegHead, DATA_FLAG, HIGHWAY_VERSION, LOCALE_ID,
    RETRY_TIMES, UPLOAD_COMMAND_NAME,
};
pub use identity::ClientIdentity;
pub use jce::{
    decode_struct, decode_wrapper, encode_struct, encode_wrapper, JceError, JceStruct, JceValue,
    WrapperMeta, MAX_DEPTH,
};
pub use tea::{TeaError, TeaKey, KEY_SIZE};

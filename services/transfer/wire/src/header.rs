//! Chunk header carried in every highway frame.
//!
//! The header is a protobuf message with a base head describing the request
//! and a segment head describing where this chunk sits inside the file. Every
//! field is declared `optional` so that zero values are still written to the
//! wire, which the transfer server expects.

use crate::chunk::Digest;
use crate::WireError;
use bytes::Bytes;
use prost::Message;

/// Highway protocol version
pub const HIGHWAY_VERSION: u32 = 1;

/// Command string for chunk upload requests
pub const UPLOAD_COMMAND_NAME: &str = "PicUp.DataUp";

/// Retry counter sent with every chunk
pub const RETRY_TIMES: u32 = 0;

/// Data flag constant
pub const DATA_FLAG: u32 = 4096;

/// Locale identifier (zh-CN)
pub const LOCALE_ID: u32 = 2052;

/// Outer protobuf message of a chunk header
#[derive(Clone, PartialEq, Message)]
pub struct HighwayHead {
    /// Request description
    #[prost(message, optional, tag = "1")]
    pub base: Option<BaseHead>,
    /// Chunk placement
    #[prost(message, optional, tag = "2")]
    pub seg: Option<SegHead>,
}

/// Per-request part of the chunk header
#[derive(Clone, PartialEq, Message)]
pub struct BaseHead {
    /// Protocol version
    #[prost(uint32, optional, tag = "1")]
    pub version: Option<u32>,
    /// Account id as a decimal string
    #[prost(string, optional, tag = "2")]
    pub account: Option<String>,
    /// Command name
    #[prost(string, optional, tag = "3")]
    pub command: Option<String>,
    /// Wrapping 16-bit sequence number
    #[prost(uint32, optional, tag = "4")]
    pub seq: Option<u32>,
    /// Retry counter
    #[prost(uint32, optional, tag = "5")]
    pub retry_times: Option<u32>,
    /// Application sub-id
    #[prost(uint32, optional, tag = "6")]
    pub app_id: Option<u32>,
    /// Data flag
    #[prost(uint32, optional, tag = "7")]
    pub data_flag: Option<u32>,
    /// Numeric upload command
    #[prost(uint32, optional, tag = "8")]
    pub command_id: Option<u32>,
    /// Locale identifier
    #[prost(uint32, optional, tag = "10")]
    pub locale_id: Option<u32>,
}

/// Per-chunk part of the chunk header
#[derive(Clone, PartialEq, Message)]
pub struct SegHead {
    /// Total size of the uploaded object
    #[prost(uint64, optional, tag = "2")]
    pub file_size: Option<u64>,
    /// Offset of this chunk
    #[prost(uint64, optional, tag = "3")]
    pub data_offset: Option<u64>,
    /// Length of this chunk
    #[prost(uint32, optional, tag = "4")]
    pub data_length: Option<u32>,
    /// Per-object upload key
    #[prost(bytes = "vec", optional, tag = "6")]
    pub service_ticket: Option<Vec<u8>>,
    /// MD5 of this chunk
    #[prost(bytes = "vec", optional, tag = "8")]
    pub md5: Option<Vec<u8>>,
    /// MD5 of the whole object
    #[prost(bytes = "vec", optional, tag = "9")]
    pub file_md5: Option<Vec<u8>>,
}

/// Logical view of a chunk header
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkHeader {
    /// Account id
    pub account: String,
    /// Sequence number of this chunk
    pub sequence: u16,
    /// Application sub-id
    pub sub_app_id: u32,
    /// Numeric upload command
    pub command_id: u32,
    /// Total size of the uploaded object
    pub file_size: u64,
    /// Offset of this chunk
    pub offset: u64,
    /// Length of this chunk
    pub chunk_len: u32,
    /// Per-object upload key
    pub key: Bytes,
    /// MD5 of this chunk
    pub chunk_md5: Digest,
    /// MD5 of the whole object
    pub file_md5: Digest,
}

impl ChunkHeader {
    /// Build the protobuf message, filling in the protocol constants
    pub fn to_head(&self) -> HighwayHead {
        HighwayHead {
            base: Some(BaseHead {
                version: Some(HIGHWAY_VERSION),
                account: Some(self.account.clone()),
                command: Some(UPLOAD_COMMAND_NAME.to_string()),
                seq: Some(u32::from(self.sequence)),
                retry_times: Some(RETRY_TIMES),
                app_id: Some(self.sub_app_id),
                data_flag: Some(DATA_FLAG),
                command_id: Some(self.command_id),
                locale_id: Some(LOCALE_ID),
            }),
            seg: Some(SegHead {
                file_size: Some(self.file_size),
                data_offset: Some(self.offset),
                data_length: Some(self.chunk_len),
                service_ticket: Some(self.key.to_vec()),
                md5: Some(self.chunk_md5.to_vec()),
                file_md5: Some(self.file_md5.to_vec()),
            }),
        }
    }

    /// Serialize to protobuf bytes
    pub fn encode(&self) -> Bytes {
        Bytes::from(self.to_head().encode_to_vec())
    }

    /// Parse a serialized header
    pub fn decode(raw: &[u8]) -> Result<Self, WireError> {
        let head = HighwayHead::decode(raw)?;
        let base = head.base.ok_or(WireError::MissingField("base"))?;
        let seg = head.seg.ok_or(WireError::MissingField("seg"))?;

        let sequence = base.seq.ok_or(WireError::MissingField("seq"))?;

        Ok(Self {
            account: base.account.ok_or(WireError::MissingField("account"))?,
            sequence: u16::try_from(sequence).map_err(|_| WireError::Malformed)?,
            sub_app_id: base.app_id.ok_or(WireError::MissingField("app_id"))?,
            command_id: base.command_id.ok_or(WireError::MissingField("command_id"))?,
            file_size: seg.file_size.ok_or(WireError::MissingField("file_size"))?,
            offset: seg.data_offset.ok_or(WireError::MissingField("data_offset"))?,
            chunk_len: seg.data_length.ok_or(WireError::MissingField("data_length"))?,
            key: Bytes::from(seg.service_ticket.unwrap_or_default()),
            chunk_md5: digest_field(seg.md5, "md5")?,
            file_md5: digest_field(seg.file_md5, "file_md5")?,
        })
    }
}

fn digest_field(raw: Option<Vec<u8>>, name: &'static str) -> Result<Digest, WireError> {
    let raw = raw.ok_or(WireError::MissingField(name))?;
    raw.as_slice().try_into().map_err(|_| WireError::Malformed)
}

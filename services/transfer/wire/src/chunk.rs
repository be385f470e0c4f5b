//! Chunk packet builder for highway uploads.
//!
//! This module splits an upload buffer into bounded chunks and wraps each one
//! in a frame whose header describes both the whole object and the chunk.

use crate::frame::Frame;
use crate::header::ChunkHeader;
use crate::identity::ClientIdentity;
use bytes::Bytes;
use ::md5::{Digest as _, Md5};
use tracing::trace;

/// Largest payload carried by a single frame
pub const CHUNK_SIZE_LIMIT: usize = 3_000_000;

/// 16-byte MD5 digest
pub type Digest = [u8; 16];

/// Compute the MD5 digest of a buffer
pub fn md5(data: &[u8]) -> Digest {
    Md5::digest(data).into()
}

/// Object queued for a highway upload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadObject {
    buffer: Bytes,
    key: Bytes,
    digest: Digest,
}

impl UploadObject {
    /// Create an upload object, computing the whole-object digest
    pub fn new(buffer: impl Into<Bytes>, key: impl Into<Bytes>) -> Self {
        let buffer = buffer.into();
        let digest = md5(&buffer);
        Self {
            buffer,
            key: key.into(),
            digest,
        }
    }

    /// Create an upload object with a digest the caller already holds
    pub fn with_digest(buffer: impl Into<Bytes>, key: impl Into<Bytes>, digest: Digest) -> Self {
        Self {
            buffer: buffer.into(),
            key: key.into(),
            digest,
        }
    }

    /// Payload bytes
    pub fn buffer(&self) -> &Bytes {
        &self.buffer
    }

    /// Per-object upload key
    pub fn key(&self) -> &Bytes {
        &self.key
    }

    /// Whole-object MD5
    pub fn digest(&self) -> &Digest {
        &self.digest
    }

    /// Payload length in bytes
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// Whether the payload is empty
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Number of frames needed to carry the payload
    pub fn chunk_count(&self) -> usize {
        self.buffer.len().div_ceil(CHUNK_SIZE_LIMIT)
    }

    /// Frames for this object starting at a random sequence number
    pub fn packets<'a>(&'a self, identity: &ClientIdentity, command_id: u32) -> ChunkPackets<'a> {
        ChunkPackets::new(self, identity, command_id, rand::random())
    }
}

/// Lazy, ordered sequence of frames covering an [`UploadObject`]
#[derive(Debug, Clone)]
pub struct ChunkPackets<'a> {
    object: &'a UploadObject,
    account: String,
    sub_app_id: u32,
    command_id: u32,
    offset: usize,
    sequence: u16,
}

impl<'a> ChunkPackets<'a> {
    /// Create a builder starting at the given sequence number
    pub fn new(
        object: &'a UploadObject,
        identity: &ClientIdentity,
        command_id: u32,
        start_sequence: u16,
    ) -> Self {
        Self {
            object,
            account: identity.uin.to_string(),
            sub_app_id: identity.sub_app_id,
            command_id,
            offset: 0,
            sequence: start_sequence,
        }
    }

    /// Sequence number the next frame will carry
    pub fn next_sequence(&self) -> u16 {
        self.sequence
    }
}

impl Iterator for ChunkPackets<'_> {
    type Item = Frame;

    fn next(&mut self) -> Option<Frame> {
        let buffer = self.object.buffer();
        if self.offset >= buffer.len() {
            return None;
        }

        let end = std::cmp::min(self.offset + CHUNK_SIZE_LIMIT, buffer.len());
        let chunk = buffer.slice(self.offset..end);

        let header = ChunkHeader {
            account: self.account.clone(),
            sequence: self.sequence,
            sub_app_id: self.sub_app_id,
            command_id: self.command_id,
            file_size: buffer.len() as u64,
            offset: self.offset as u64,
            chunk_len: chunk.len() as u32,
            key: self.object.key().clone(),
            chunk_md5: md5(&chunk),
            file_md5: *self.object.digest(),
        };

        trace!(
            "Built chunk frame seq={} offset={} len={}",
            header.sequence,
            header.offset,
            header.chunk_len
        );

        self.sequence = self.sequence.wrapping_add(1);
        self.offset = end;

        Some(Frame::new(header.encode(), chunk))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self
            .object
            .len()
            .saturating_sub(self.offset)
            .div_ceil(CHUNK_SIZE_LIMIT);
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for ChunkPackets<'_> {}

//! Highway frame encoding and decoding.
//!
//! A frame is one marker-delimited wire unit carrying a serialized chunk
//! header and a slice of the upload payload. The transfer server parses it
//! strictly by offset, so the layout here must stay byte exact.

use crate::header::ChunkHeader;
use crate::WireError;
use bytes::{Buf, BufMut, Bytes, BytesMut};

/// First byte of every frame
pub const FRAME_START: u8 = 40;
/// Last byte of every frame
pub const FRAME_END: u8 = 41;

/// Marker plus the two big-endian length fields
pub const PREAMBLE_SIZE: usize = 9;

/// Hard maximum encoded frame size (64 MiB)
pub const HARD_MAX_FRAME_SIZE: usize = 64 * 1024 * 1024;

/// Complete highway frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Serialized `HighwayHead`
    pub header: Bytes,
    /// Payload slice
    pub chunk: Bytes,
}

impl Frame {
    /// Create a frame from a serialized header and a chunk
    pub fn new(header: Bytes, chunk: Bytes) -> Self {
        Self { header, chunk }
    }

    /// Get the total frame size when encoded
    pub fn encoded_size(&self) -> usize {
        PREAMBLE_SIZE + self.header.len() + self.chunk.len() + 1
    }

    /// Encode frame to a contiguous buffer
    pub fn encode(&self) -> Result<Bytes, WireError> {
        let total_size = self.encoded_size();
        if total_size > HARD_MAX_FRAME_SIZE {
            return Err(WireError::Size(total_size));
        }

        let mut buf = BytesMut::with_capacity(total_size);
        buf.put_u8(FRAME_START);
        buf.put_u32(self.header.len() as u32);
        buf.put_u32(self.chunk.len() as u32);
        buf.put_slice(&self.header);
        buf.put_slice(&self.chunk);
        buf.put_u8(FRAME_END);

        Ok(buf.freeze())
    }

    /// Parse the chunk header carried by this frame
    pub fn chunk_header(&self) -> Result<ChunkHeader, WireError> {
        ChunkHeader::decode(&self.header)
    }
}

/// Frame decoder for parsing frames out of a byte stream
#[derive(Debug)]
pub struct FrameDecoder {
    max_frame_size: usize,
}

impl FrameDecoder {
    /// Create a new frame decoder
    pub fn new() -> Self {
        Self {
            max_frame_size: HARD_MAX_FRAME_SIZE,
        }
    }

    /// Create a decoder with a custom size ceiling
    pub fn with_max_frame_size(max_frame_size: usize) -> Self {
        Self { max_frame_size }
    }

    /// Decode one frame from a buffer.
    ///
    /// Returns `Ok(None)` until the buffer holds a complete frame; the frame's
    /// bytes are consumed from `buf` only once it is complete.
    pub fn decode(&mut self, buf: &mut BytesMut) -> Result<Option<Frame>, WireError> {
        if buf.is_empty() {
            return Ok(None);
        }

        if buf[0] != FRAME_START {
            return Err(WireError::Marker {
                expected: FRAME_START,
                found: buf[0],
            });
        }

        if buf.len() < PREAMBLE_SIZE {
            return Ok(None);
        }

        let header_len = u32::from_be_bytes([buf[1], buf[2], buf[3], buf[4]]) as usize;
        let chunk_len = u32::from_be_bytes([buf[5], buf[6], buf[7], buf[8]]) as usize;
        let total = PREAMBLE_SIZE + header_len + chunk_len + 1;

        if total > self.max_frame_size {
            return Err(WireError::Size(total));
        }

        if buf.len() < total {
            return Ok(None);
        }

        let found = buf[total - 1];
        if found != FRAME_END {
            return Err(WireError::Marker {
                expected: FRAME_END,
                found,
            });
        }

        buf.advance(PREAMBLE_SIZE);
        let header = buf.split_to(header_len).freeze();
        let chunk = buf.split_to(chunk_len).freeze();
        buf.advance(1);

        Ok(Some(Frame { header, chunk }))
    }
}

impl Default for FrameDecoder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_layout() {
        let frame = Frame::new(Bytes::from_static(b"head"), Bytes::from_static(b"payload!"));
        let encoded = frame.encode().unwrap();

        assert_eq!(encoded.len(), PREAMBLE_SIZE + 4 + 8 + 1);
        assert_eq!(encoded[0], FRAME_START);
        assert_eq!(&encoded[1..5], &4u32.to_be_bytes());
        assert_eq!(&encoded[5..9], &8u32.to_be_bytes());
        assert_eq!(&encoded[9..13], b"head");
        assert_eq!(&encoded[13..21], b"payload!");
        assert_eq!(encoded[21], FRAME_END);
    }

    #[test]
    fn test_decode_partial_then_complete() {
        let frame = Frame::new(Bytes::from_static(b"hh"), Bytes::from_static(b"cccc"));
        let encoded = frame.encode().unwrap();
        let mut decoder = FrameDecoder::new();

        let mut buf = BytesMut::from(&encoded[..5]);
        assert!(decoder.decode(&mut buf).unwrap().is_none());
        assert_eq!(buf.len(), 5);

        buf.extend_from_slice(&encoded[5..]);
        buf.extend_from_slice(&encoded);
        assert_eq!(decoder.decode(&mut buf).unwrap(), Some(frame.clone()));
        assert_eq!(decoder.decode(&mut buf).unwrap(), Some(frame));
        assert!(buf.is_empty());
    }

    #[test]
    fn test_decode_rejects_bad_markers() {
        let mut decoder = FrameDecoder::new();

        let mut buf = BytesMut::from(&[0x29u8, 0, 0][..]);
        assert!(matches!(
            decoder.decode(&mut buf),
            Err(WireError::Marker { expected: FRAME_START, found: 0x29 })
        ));

        let encoded = Frame::new(Bytes::new(), Bytes::from_static(b"x")).encode().unwrap();
        let mut corrupt = BytesMut::from(&encoded[..]);
        let last = corrupt.len() - 1;
        corrupt[last] = 0;
        assert!(matches!(
            decoder.decode(&mut corrupt),
            Err(WireError::Marker { expected: FRAME_END, found: 0 })
        ));
    }

    #[test]
    fn test_decode_enforces_size_ceiling() {
        let mut decoder = FrameDecoder::with_max_frame_size(64);
        let encoded = Frame::new(Bytes::new(), Bytes::from(vec![7u8; 100])).encode().unwrap();
        let mut buf = BytesMut::from(&encoded[..PREAMBLE_SIZE]);
        assert!(matches!(decoder.decode(&mut buf), Err(WireError::Size(110))));
    }
}

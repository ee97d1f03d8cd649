//! Complete frames: header plus payload bytes.

use bytes::{BufMut, Bytes, BytesMut};

use crate::{
    errors::{ProtocolError, Result},
    header::FrameHeader,
};

/// A header and its opaque payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Routing and correlation header.
    pub header: FrameHeader,
    /// CBOR-encoded payload.
    pub payload: Bytes,
}

impl Frame {
    /// Maximum payload accepted on the wire.
    pub const MAX_PAYLOAD_SIZE: usize = 16 * 1024 * 1024;

    /// Build a frame, stamping the payload length into the header.
    pub fn new(mut header: FrameHeader, payload: impl Into<Bytes>) -> Self {
        let payload = payload.into();
        header.set_payload_size(payload.len() as u32);
        Self { header, payload }
    }

    /// Total encoded length.
    pub fn encoded_len(&self) -> usize {
        FrameHeader::SIZE + self.payload.len()
    }

    /// Append the encoded frame to `dst`.
    pub fn encode(&self, dst: &mut BytesMut) -> Result<()> {
        if self.payload.len() > Self::MAX_PAYLOAD_SIZE {
            return Err(ProtocolError::PayloadTooLarge {
                size: self.payload.len(),
                max: Self::MAX_PAYLOAD_SIZE,
            });
        }

        dst.reserve(self.encoded_len());
        dst.put_slice(&self.header.to_bytes());
        dst.put_slice(&self.payload);
        Ok(())
    }

    /// Encode into a fresh buffer.
    pub fn to_bytes(&self) -> Result<Bytes> {
        let mut buf = BytesMut::with_capacity(self.encoded_len());
        self.encode(&mut buf)?;
        Ok(buf.freeze())
    }

    /// Decode exactly one frame from the start of `bytes`.
    ///
    /// Trailing bytes beyond the declared payload are ignored; callers
    /// reading from a stream use [`Self::payload_len_from_header`] to size
    /// their reads.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let header = FrameHeader::from_bytes(bytes)?;
        let payload_len = Self::payload_len_from_header(&header)?;

        let end = FrameHeader::SIZE + payload_len;
        let Some(payload) = bytes.get(FrameHeader::SIZE..end) else {
            return Err(ProtocolError::FrameTooShort { expected: end, actual: bytes.len() });
        };

        Ok(Self { header, payload: Bytes::copy_from_slice(payload) })
    }

    /// Validated payload length declared by `header`.
    pub fn payload_len_from_header(header: &FrameHeader) -> Result<usize> {
        let size = header.payload_size() as usize;
        if size > Self::MAX_PAYLOAD_SIZE {
            return Err(ProtocolError::PayloadTooLarge { size, max: Self::MAX_PAYLOAD_SIZE });
        }
        Ok(size)
    }
}

//! Fixed-size frame header.
//!
//! ```text
//! offset  size  field
//! 0       4     magic ("PNBD")
//! 4       1     version
//! 5       1     flags
//! 6       2     opcode
//! 8       8     request_id
//! 16      16    board_id
//! 32      8     sender_id
//! 40      4     payload_size
//! 44      20    reserved (zero)
//! ```
//!
//! All integers are big-endian.

use std::fmt;

use zerocopy::{
    FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned,
    byteorder::network_endian::{U16, U32, U64, U128},
};

use crate::{
    errors::{ProtocolError, Result},
    flags::FrameFlags,
    ids::{BoardId, UserId},
    opcodes::Opcode,
};

/// Fixed 64-byte frame header.
#[derive(Clone, Copy, PartialEq, Eq, FromBytes, IntoBytes, KnownLayout, Immutable, Unaligned)]
#[repr(C)]
pub struct FrameHeader {
    magic: U32,
    version: u8,
    flags: u8,
    opcode: U16,
    request_id: U64,
    board_id: U128,
    sender_id: U64,
    payload_size: U32,
    reserved: [u8; 20],
}

const _: () = assert!(size_of::<FrameHeader>() == FrameHeader::SIZE);

impl FrameHeader {
    /// Encoded header size in bytes.
    pub const SIZE: usize = 64;

    /// Magic bytes identifying a Pinboard frame.
    pub const MAGIC: u32 = 0x504E_4244;

    /// Current protocol version.
    pub const VERSION: u8 = 1;

    /// Create a header for `opcode` with every other field zeroed.
    pub fn new(opcode: Opcode) -> Self {
        Self {
            magic: U32::new(Self::MAGIC),
            version: Self::VERSION,
            flags: 0,
            opcode: U16::new(opcode.to_u16()),
            request_id: U64::new(0),
            board_id: U128::new(0),
            sender_id: U64::new(0),
            payload_size: U32::new(0),
            reserved: [0; 20],
        }
    }

    /// Parse and validate a header from the first [`Self::SIZE`] bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let Some(raw) = bytes.get(..Self::SIZE) else {
            return Err(ProtocolError::FrameTooShort { expected: Self::SIZE, actual: bytes.len() });
        };

        let header = Self::read_from_bytes(raw).map_err(|_| ProtocolError::FrameTooShort {
            expected: Self::SIZE,
            actual: bytes.len(),
        })?;

        if header.magic.get() != Self::MAGIC {
            return Err(ProtocolError::InvalidMagic(header.magic.get()));
        }
        if header.version != Self::VERSION {
            return Err(ProtocolError::UnsupportedVersion(header.version));
        }

        Ok(header)
    }

    /// Encode to bytes.
    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let mut out = [0u8; Self::SIZE];
        out.copy_from_slice(self.as_bytes());
        out
    }

    /// Raw opcode value.
    pub fn opcode(&self) -> u16 {
        self.opcode.get()
    }

    /// Opcode, if recognized.
    pub fn opcode_enum(&self) -> Option<Opcode> {
        Opcode::from_u16(self.opcode.get())
    }

    /// Overwrite the opcode.
    pub fn set_opcode(&mut self, opcode: Opcode) {
        self.opcode = U16::new(opcode.to_u16());
    }

    /// Header flags. Unknown bits are dropped.
    pub fn flags(&self) -> FrameFlags {
        FrameFlags::from_bits_truncate(self.flags)
    }

    /// Set header flags.
    pub fn set_flags(&mut self, flags: FrameFlags) {
        self.flags = flags.bits();
    }

    /// Client-chosen request correlation id. Zero for unsolicited frames.
    pub fn request_id(&self) -> u64 {
        self.request_id.get()
    }

    /// Set the request correlation id.
    pub fn set_request_id(&mut self, request_id: u64) {
        self.request_id = U64::new(request_id);
    }

    /// Board this frame is routed to.
    pub fn board_id(&self) -> BoardId {
        BoardId::new(self.board_id.get())
    }

    /// Set the board this frame is routed to.
    pub fn set_board_id(&mut self, board_id: BoardId) {
        self.board_id = U128::new(board_id.get());
    }

    /// User that produced the frame.
    pub fn sender_id(&self) -> UserId {
        UserId::new(self.sender_id.get())
    }

    /// Set the producing user.
    pub fn set_sender_id(&mut self, sender_id: UserId) {
        self.sender_id = U64::new(sender_id.get());
    }

    /// Declared payload length.
    pub fn payload_size(&self) -> u32 {
        self.payload_size.get()
    }

    pub(crate) fn set_payload_size(&mut self, size: u32) {
        self.payload_size = U32::new(size);
    }
}

impl fmt::Debug for FrameHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FrameHeader")
            .field("opcode", &self.opcode_enum())
            .field("flags", &self.flags())
            .field("request_id", &self.request_id())
            .field("board_id", &self.board_id())
            .field("sender_id", &self.sender_id())
            .field("payload_size", &self.payload_size())
            .finish()
    }
}

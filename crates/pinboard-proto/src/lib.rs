//! Wire format for the Pinboard protocol.
//!
//! Frames consist of a fixed 64-byte header (zero-copy binary) followed by a
//! variable-length CBOR payload. The header carries routing and correlation
//! information (opcode, board, sender, request id) so the server can route a
//! frame to a board's subscribers without decoding the payload.
//!
//! Payloads describe board mutations in terms of full id sequences rather
//! than per-item positions: a move carries the complete resulting order of
//! every list it touched, so receivers can replace their local order
//! wholesale.
//!
//! # Security
//!
//! Header parsing uses compile-time verified layouts via `zerocopy`. Payloads
//! are capped at 16 MiB.
#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod errors;
pub mod flags;
pub mod frame;
pub mod header;
pub mod ids;
pub mod opcodes;
pub mod payloads;

pub use errors::{ProtocolError, Result};
pub use flags::FrameFlags;
pub use frame::Frame;
pub use header::FrameHeader;
pub use ids::{
    BoardId, CardId, ChecklistId, ChecklistItemId, ListId, NotificationId, UserId, WorkspaceId,
};
pub use opcodes::Opcode;
pub use payloads::Payload;

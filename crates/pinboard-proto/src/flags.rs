//! Header flag bits.

use bitflags::bitflags;

bitflags! {
    /// Flags carried in the frame header.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct FrameFlags: u8 {
        /// Frame was fanned out to every subscriber of a board.
        const BROADCAST = 0b0000_0001;
        /// Frame answers a request; `request_id` identifies which one.
        const RESPONSE = 0b0000_0010;
    }
}

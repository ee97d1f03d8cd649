//! Pinboard core logic
//!
//! Pure, synchronous logic for ordered board mutation, completely decoupled
//! from I/O. Server and client both run the same resolver, which is what
//! lets a client's optimistic update match the authoritative result.
//!
//! # Ordering model
//!
//! A list's card order is an explicit [`Sequence`] of card ids and is the
//! only source of truth for position. There are no per-card position fields
//! and no fractional indices: every move replaces whole sequences. A card's
//! `list_id` and its presence in that list's sequence must always agree.
//!
//! # Components
//!
//! - [`sequence`]: Immutable-update ordered id sequences
//! - [`ordering`]: Ordering store abstraction and in-memory implementation
//! - [`resolver`]: Drag-and-drop move resolution
//! - [`card`]: Card field updates and checklist sub-documents
//! - [`mod@env`]: Environment abstraction (time, RNG)
//! - [`error`]: Resolution and card errors

pub mod card;
pub mod env;
pub mod error;
pub mod ordering;
pub mod resolver;
pub mod sequence;

pub use env::Environment;
pub use error::{CardError, ResolveError};
pub use ordering::{MemoryOrdering, OrderingStore};
pub use resolver::{MoveOutcome, MoveRequest, Resolution};
pub use sequence::Sequence;

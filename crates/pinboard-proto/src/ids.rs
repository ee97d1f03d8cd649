//! Strongly typed identifiers.
//!
//! Every entity id is a distinct newtype so a list id can never be passed
//! where a card id is expected. Ids serialize transparently as integers.

use std::fmt;

use serde::{Deserialize, Serialize};

macro_rules! define_id {
    ($(#[$meta:meta])* $name:ident($inner:ty), $prefix:literal) => {
        $(#[$meta])*
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(pub $inner);

        impl $name {
            /// Wrap a raw id.
            pub const fn new(raw: $inner) -> Self {
                Self(raw)
            }

            /// Raw id value.
            pub const fn get(self) -> $inner {
                self.0
            }
        }

        impl From<$inner> for $name {
            fn from(raw: $inner) -> Self {
                Self(raw)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!($prefix, ":{:x}"), self.0)
            }
        }
    };
}

define_id!(
    /// Workspace that owns boards. Workspace CRUD lives outside this protocol.
    WorkspaceId(u128),
    "ws"
);
define_id!(
    /// Board identifier; also the broadcast group key.
    BoardId(u128),
    "board"
);
define_id!(
    /// List identifier.
    ListId(u128),
    "list"
);
define_id!(
    /// Card identifier.
    CardId(u128),
    "card"
);
define_id!(
    /// Checklist identifier, unique within its card.
    ChecklistId(u128),
    "checklist"
);
define_id!(
    /// Checklist item identifier, unique within its checklist.
    ChecklistItemId(u128),
    "item"
);
define_id!(
    /// Notification identifier.
    NotificationId(u128),
    "notification"
);
define_id!(
    /// Authenticated user.
    UserId(u64),
    "user"
);

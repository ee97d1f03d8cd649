//! Pinboard client.
//!
//! An action-based state machine: feed it [`ClientEvent`]s, perform the
//! [`ClientAction`]s it returns. The local board view lives in
//! [`reconciler::BoardView`] and is only ever changed by replacing whole
//! per-list card arrays with the server's authoritative sequences.
//!
//! Enable the `transport` feature for a tokio TCP transport.
#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod client;
pub mod error;
pub mod reconciler;
#[cfg(feature = "transport")]
pub mod transport;

pub use client::{
    Client, ClientAction, ClientEvent, ClientIdentity, KEEPALIVE_INTERVAL, REQUEST_TIMEOUT,
};
pub use error::ClientError;
pub use reconciler::{BoardView, ListView};

//! Sotto client library.
//!
//! Mirrors the relay's wire contract: connect over TCP, send one framed
//! handshake carrying our public key and display name, parse the hub public
//! key from the reply, then exchange RSA blocks: outbound sealed under the
//! hub key, inbound opened with our own private key.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod connection;
mod error;

pub use connection::{Connection, RecvHalf, SendHalf};
pub use error::ClientError;

//! Sotto wire protocol.
//!
//! The relay speaks a deliberately small protocol over a raw TCP stream:
//!
//! 1. **Handshake** (once per connection): the client sends a single framed
//!    [`HandshakeRequest`] carrying its public key and display name; the
//!    server answers with a [`HandshakeReply`] carrying the hub public key.
//!
//! 2. **Steady state**: every subsequent frame is exactly one RSA ciphertext
//!    block (the modulus byte length of the receiving key). Blocks are
//!    independently decryptable; there is no inter-block chaining and no
//!    length prefix, because the block size is fixed by the key.
//!
//! This crate owns only the handshake framing. Block encryption lives in
//! `sotto-crypto`; the framing here never inspects key material.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod handshake;

pub use handshake::{
    FIELD_DELIMITER, HANDSHAKE_PREFIX, HandshakeReply, HandshakeRequest, MAX_USERNAME_BYTES,
    ProtocolError,
};

//! Sotto cryptographic primitives.
//!
//! The relay uses plain RSA with PKCS#1 v1.5 padding in two distinct key
//! roles that are never interchanged:
//!
//! - **Hub key pair**: owned by the relay process. Every client encrypts
//!   client-to-hub traffic under the hub public half; only the hub can read
//!   it. Compromise of the hub private key exposes all inbound traffic.
//!
//! - **Per-client key pair**: owned by one client. The hub encrypts
//!   hub-to-client traffic (broadcasts, history replay, assistant answers)
//!   under that client's registered public half; only that client can read
//!   it.
//!
//! Each ciphertext is exactly one RSA block (the modulus byte length), which
//! is what makes the relay's fixed-size steady-state framing possible.
//!
//! # Security
//!
//! This scheme is not TLS and is not meant to be: there is no forward
//! secrecy and no authentication beyond "known public key = known
//! identity".

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod keys;
mod registry;

pub use keys::{CryptoError, DEFAULT_RSA_BITS, KeyPair, PeerKey};
pub use registry::KeyRegistry;

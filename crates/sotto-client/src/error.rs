//! Client error types.

use sotto_crypto::CryptoError;
use sotto_proto::ProtocolError;
use thiserror::Error;

/// Errors from client operations.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Network failure.
    #[error("transport: {0}")]
    Transport(#[from] std::io::Error),

    /// The hub's handshake reply did not parse.
    #[error("protocol: {0}")]
    Protocol(#[from] ProtocolError),

    /// Key handling or block encryption failure.
    #[error("crypto: {0}")]
    Crypto(#[from] CryptoError),

    /// The hub closed the connection during the handshake.
    #[error("server closed the connection during handshake")]
    ServerClosed,

    /// Message exceeds one hub-key block.
    #[error("message of {len} bytes exceeds the {max} byte block capacity")]
    MessageTooLarge {
        /// Rejected message length.
        len: usize,
        /// Block capacity under the hub key.
        max: usize,
    },

    /// An inbound block decrypted to non-UTF-8 bytes.
    #[error("received message is not valid UTF-8")]
    InvalidUtf8,
}

impl ClientError {
    /// True if the connection is unusable after this error.
    ///
    /// `MessageTooLarge` is the caller's input being rejected, and the
    /// connection itself is fine; everything else means reconnect.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Self::MessageTooLarge { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn oversized_message_is_not_fatal() {
        let err = ClientError::MessageTooLarge { len: 500, max: 245 };
        assert!(!err.is_fatal());
        assert_eq!(err.to_string(), "message of 500 bytes exceeds the 245 byte block capacity");
    }

    #[test]
    fn handshake_failures_are_fatal() {
        assert!(ClientError::ServerClosed.is_fatal());
        assert!(ClientError::from(ProtocolError::MissingPrefix).is_fatal());
    }
}

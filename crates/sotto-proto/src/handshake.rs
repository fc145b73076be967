//! Handshake framing.
//!
//! Wire layout (bit-exact):
//!
//! ```text
//! request: PUBLIC_KEY:<escaped client PEM>:<username>
//! reply:   PUBLIC_KEY:<escaped hub PEM>
//! ```
//!
//! PEM bodies contain raw newlines, which would make the frame ambiguous to
//! scan, so every newline is escaped to the two bytes backslash + `n` on the
//! wire and restored on decode. PEM text and usernames never contain
//! `:` themselves, so after the prefix the delimiter splits the request into
//! exactly two fields.

use thiserror::Error;

/// Fixed marker that opens every handshake frame, delimiter included.
pub const HANDSHAKE_PREFIX: &[u8] = b"PUBLIC_KEY:";

/// Byte separating the key field from the username field.
pub const FIELD_DELIMITER: u8 = b':';

/// Upper bound on a display name, in bytes.
pub const MAX_USERNAME_BYTES: usize = 32;

/// Errors from handshake frame parsing.
///
/// Any of these rejects the connection: no session is created and nothing is
/// persisted.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ProtocolError {
    /// Frame does not start with [`HANDSHAKE_PREFIX`].
    #[error("handshake frame missing PUBLIC_KEY prefix")]
    MissingPrefix,

    /// Frame body does not split into exactly key + name.
    #[error("malformed handshake frame: expected key and username fields")]
    MalformedFrame,

    /// A text field is not valid UTF-8.
    #[error("handshake field is not valid UTF-8")]
    InvalidUtf8,

    /// Username field is empty.
    #[error("empty username")]
    EmptyUsername,

    /// Username exceeds [`MAX_USERNAME_BYTES`].
    #[error("username too long: {len} bytes (max {MAX_USERNAME_BYTES})")]
    UsernameTooLong {
        /// Length of the rejected name in bytes.
        len: usize,
    },
}

/// First frame on a connection, client to server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandshakeRequest {
    /// Client public key, PKCS#1 PEM text.
    pub public_key_pem: String,
    /// Display name chosen by the client. Uniqueness is NOT enforced:
    /// identity is always by key, never by name.
    pub username: String,
}

/// Server answer to a [`HandshakeRequest`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandshakeReply {
    /// Hub public key, PKCS#1 PEM text.
    pub public_key_pem: String,
}

/// Escape PEM newlines for the wire.
fn escape(pem: &str) -> Vec<u8> {
    let mut out = Vec::with_capacity(pem.len() + 32);
    for byte in pem.bytes() {
        if byte == b'\n' {
            out.extend_from_slice(b"\\n");
        } else {
            out.push(byte);
        }
    }
    out
}

/// Restore escaped newlines. Inverse of [`escape`] for PEM input.
fn unescape(field: &[u8]) -> Result<String, ProtocolError> {
    let mut out = Vec::with_capacity(field.len());
    let mut iter = field.iter().copied().peekable();
    while let Some(byte) = iter.next() {
        if byte == b'\\' && iter.peek() == Some(&b'n') {
            iter.next();
            out.push(b'\n');
        } else {
            out.push(byte);
        }
    }
    String::from_utf8(out).map_err(|_| ProtocolError::InvalidUtf8)
}

impl HandshakeRequest {
    /// Create a request. The PEM is taken as-is; validation that it parses
    /// to a usable key happens on the receiving side.
    pub fn new(public_key_pem: impl Into<String>, username: impl Into<String>) -> Self {
        Self { public_key_pem: public_key_pem.into(), username: username.into() }
    }

    /// Serialize to the wire form.
    pub fn encode(&self) -> Vec<u8> {
        let mut frame = Vec::from(HANDSHAKE_PREFIX);
        frame.extend_from_slice(&escape(&self.public_key_pem));
        frame.push(FIELD_DELIMITER);
        frame.extend_from_slice(self.username.as_bytes());
        frame
    }

    /// Parse a frame received from a freshly accepted connection.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::MissingPrefix`] if the marker is absent and
    /// [`ProtocolError::MalformedFrame`] unless the body splits into exactly
    /// key + name on the delimiter.
    pub fn decode(frame: &[u8]) -> Result<Self, ProtocolError> {
        let body = frame.strip_prefix(HANDSHAKE_PREFIX).ok_or(ProtocolError::MissingPrefix)?;

        let mut fields = body.splitn(2, |&b| b == FIELD_DELIMITER);
        let key_field = fields.next().ok_or(ProtocolError::MalformedFrame)?;
        let name_field = fields.next().ok_or(ProtocolError::MalformedFrame)?;
        if name_field.contains(&FIELD_DELIMITER) {
            return Err(ProtocolError::MalformedFrame);
        }

        let public_key_pem = unescape(key_field)?;
        let username =
            String::from_utf8(name_field.to_vec()).map_err(|_| ProtocolError::InvalidUtf8)?;

        if username.is_empty() {
            return Err(ProtocolError::EmptyUsername);
        }
        if username.len() > MAX_USERNAME_BYTES {
            return Err(ProtocolError::UsernameTooLong { len: username.len() });
        }

        Ok(Self { public_key_pem, username })
    }
}

impl HandshakeReply {
    /// Create a reply carrying the hub public key.
    pub fn new(public_key_pem: impl Into<String>) -> Self {
        Self { public_key_pem: public_key_pem.into() }
    }

    /// Serialize to the wire form.
    pub fn encode(&self) -> Vec<u8> {
        let mut frame = Vec::from(HANDSHAKE_PREFIX);
        frame.extend_from_slice(&escape(&self.public_key_pem));
        frame
    }

    /// Parse the server's handshake answer.
    pub fn decode(frame: &[u8]) -> Result<Self, ProtocolError> {
        let body = frame.strip_prefix(HANDSHAKE_PREFIX).ok_or(ProtocolError::MissingPrefix)?;
        let public_key_pem = unescape(body)?;
        Ok(Self { public_key_pem })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    const PEM: &str = "-----BEGIN RSA PUBLIC KEY-----\nMIIBCgKCAQEA\n-----END RSA PUBLIC KEY-----\n";

    #[test]
    fn request_roundtrip() {
        let req = HandshakeRequest::new(PEM, "alice");
        let decoded = HandshakeRequest::decode(&req.encode()).unwrap();
        assert_eq!(decoded, req);
    }

    #[test]
    fn reply_roundtrip() {
        let reply = HandshakeReply::new(PEM);
        let decoded = HandshakeReply::decode(&reply.encode()).unwrap();
        assert_eq!(decoded, reply);
    }

    #[test]
    fn encoded_request_has_no_raw_newlines() {
        let frame = HandshakeRequest::new(PEM, "alice").encode();
        assert!(!frame.contains(&b'\n'));
    }

    #[test]
    fn missing_prefix_rejected() {
        let result = HandshakeRequest::decode(b"KEY:whatever:alice");
        assert_eq!(result, Err(ProtocolError::MissingPrefix));
    }

    #[test]
    fn missing_username_field_rejected() {
        let result = HandshakeRequest::decode(b"PUBLIC_KEY:just-a-key-no-delimiter");
        assert_eq!(result, Err(ProtocolError::MalformedFrame));
    }

    #[test]
    fn extra_delimiter_rejected() {
        let result = HandshakeRequest::decode(b"PUBLIC_KEY:key:alice:extra");
        assert_eq!(result, Err(ProtocolError::MalformedFrame));
    }

    #[test]
    fn empty_username_rejected() {
        let result = HandshakeRequest::decode(b"PUBLIC_KEY:key:");
        assert_eq!(result, Err(ProtocolError::EmptyUsername));
    }

    #[test]
    fn oversized_username_rejected() {
        let name = "x".repeat(MAX_USERNAME_BYTES + 1);
        let frame = HandshakeRequest::new("key", name).encode();
        let result = HandshakeRequest::decode(&frame);
        assert!(matches!(result, Err(ProtocolError::UsernameTooLong { .. })));
    }

    #[test]
    fn username_at_limit_accepted() {
        let name = "x".repeat(MAX_USERNAME_BYTES);
        let frame = HandshakeRequest::new("key", name.clone()).encode();
        let decoded = HandshakeRequest::decode(&frame).unwrap();
        assert_eq!(decoded.username, name);
    }

    #[test]
    fn two_keys_may_share_a_name() {
        // Names are not identity. Both frames must parse fine.
        let a = HandshakeRequest::decode(&HandshakeRequest::new("key-a", "dave").encode()).unwrap();
        let b = HandshakeRequest::decode(&HandshakeRequest::new("key-b", "dave").encode()).unwrap();
        assert_eq!(a.username, b.username);
        assert_ne!(a.public_key_pem, b.public_key_pem);
    }

    proptest! {
        #[test]
        fn prop_request_roundtrip(
            pem in "[A-Za-z0-9+/=\n -]{0,200}",
            name in "[a-zA-Z0-9_]{1,32}",
        ) {
            let req = HandshakeRequest::new(pem, name);
            let decoded = HandshakeRequest::decode(&req.encode()).unwrap();
            prop_assert_eq!(decoded, req);
        }

        #[test]
        fn prop_reply_roundtrip(pem in "[A-Za-z0-9+/=\n -]{0,200}") {
            let reply = HandshakeReply::new(pem);
            let decoded = HandshakeReply::decode(&reply.encode()).unwrap();
            prop_assert_eq!(decoded, reply);
        }
    }
}

//! Persisted and in-flight record types.

use serde::{Deserialize, Serialize};

/// A known peer, created on first handshake from an unseen public key.
///
/// The public key uniquely determines the identity and lookup-by-key is the
/// sole authentication mechanism. Display names are NOT unique: two keys may
/// register the same name. Identities are never mutated or deleted.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    /// Store-assigned identifier.
    pub id: u64,
    /// Display name chosen at first handshake.
    pub name: String,
    /// Registered public key, PKCS#1 PEM text.
    pub public_key_pem: String,
}

impl std::fmt::Debug for Identity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Key material is not a secret (it is the public half) but it is
        // noisy; log a fingerprint-sized prefix instead.
        f.debug_struct("Identity")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("public_key_pem", &format!("<{} bytes>", self.public_key_pem.len()))
            .finish()
    }
}

/// One persisted chat message.
///
/// The ciphertext is the verbatim wire block, still encrypted under the hub
/// key; it is appended before the hub ever decrypts it, so history holds
/// exactly what was sent. Append-only; read in full on every join.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredMessage {
    /// Store-assigned identifier, ascending in storage order.
    pub id: u64,
    /// Identity id of the sender.
    pub sender_id: u64,
    /// Sender display name at the time of sending.
    pub sender_name: String,
    /// Hub-key-encrypted block as received on the wire.
    pub ciphertext: Vec<u8>,
}

impl std::fmt::Debug for StoredMessage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoredMessage")
            .field("id", &self.id)
            .field("sender_id", &self.sender_id)
            .field("sender_name", &self.sender_name)
            .field("ciphertext", &format!("<{} bytes>", self.ciphertext.len()))
            .finish()
    }
}

/// An in-flight, already-decrypted chat unit awaiting dispatch.
///
/// Produced by a session listener after hub-key decryption; `text` is
/// already formatted as `"<senderName>: <plaintext>"`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayMessage {
    /// Identity id of the originating sender.
    pub sender_id: u64,
    /// Display text delivered to recipients.
    pub text: String,
}

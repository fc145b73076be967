//! Live connection sessions.
//!
//! A session binds an authenticated [`Identity`] to one open socket. The
//! socket is split at handshake time: the read half is pumped by the
//! listener loop in the connection task, the write half is owned by a
//! dedicated writer task fed through the session's outbound channel. Exactly
//! one task reads each socket and exactly one writes it; the hub workers
//! only ever touch the channel.

use sotto_core::{Identity, MessageStore, RelayMessage};
use sotto_crypto::{CryptoError, KeyPair, PeerKey};
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::tcp::{OwnedReadHalf, OwnedWriteHalf},
    sync::mpsc,
};

use crate::hub::HubEvent;

/// Hub-side handle to one live session.
///
/// Cheap to clone; all clones deliver into the same writer task.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    /// Random per-connection identifier (distinct from the identity id: the
    /// same identity may hold several sessions at once).
    pub session_id: u64,
    /// The authenticated peer.
    pub identity: Identity,
    /// The peer's registered public key; everything the hub sends this
    /// session is encrypted under it.
    pub peer_key: PeerKey,
    outbound: mpsc::Sender<Vec<u8>>,
}

/// The session's writer task is gone; the connection is dead.
#[derive(Debug)]
pub struct SessionGone;

/// Outcome of a non-blocking delivery attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// Block queued for the writer task.
    Queued,
    /// Outbound channel full; block dropped for this session only.
    Dropped,
    /// Writer task gone; session should be removed.
    Closed,
}

impl SessionHandle {
    /// Create the handle and its outbound channel. The receiver half goes
    /// to [`run_writer`].
    pub fn new(
        session_id: u64,
        identity: Identity,
        peer_key: PeerKey,
        capacity: usize,
    ) -> (Self, mpsc::Receiver<Vec<u8>>) {
        let (outbound, rx) = mpsc::channel(capacity);
        (Self { session_id, identity, peer_key, outbound }, rx)
    }

    /// Queue one encrypted block, waiting for channel space.
    ///
    /// Used where ordering matters more than progress (history replay,
    /// assistant replies, which touch only this one session).
    pub async fn deliver(&self, block: Vec<u8>) -> Result<(), SessionGone> {
        self.outbound.send(block).await.map_err(|_| SessionGone)
    }

    /// Queue one encrypted block without waiting.
    ///
    /// Used by the broadcast fan-out: a slow or dead session must never
    /// block delivery to the rest.
    pub fn try_deliver(&self, block: Vec<u8>) -> Delivery {
        match self.outbound.try_send(block) {
            Ok(()) => Delivery::Queued,
            Err(mpsc::error::TrySendError::Full(_)) => Delivery::Dropped,
            Err(mpsc::error::TrySendError::Closed(_)) => Delivery::Closed,
        }
    }
}

/// Encrypt display text into one or more blocks under `peer`.
///
/// Text longer than one block's capacity is split at character boundaries;
/// each chunk becomes an independently decryptable block, delivered in
/// order.
pub fn seal_text(peer: &PeerKey, text: &str) -> Result<Vec<Vec<u8>>, CryptoError> {
    let max = peer.max_payload();
    let mut blocks = Vec::with_capacity(1);
    let mut chunk_start = 0;
    let mut chunk_len = 0;

    for (offset, ch) in text.char_indices() {
        if chunk_len + ch.len_utf8() > max {
            blocks.push(peer.encrypt(text[chunk_start..offset].as_bytes())?);
            chunk_start = offset;
            chunk_len = 0;
        }
        chunk_len += ch.len_utf8();
    }
    blocks.push(peer.encrypt(text[chunk_start..].as_bytes())?);
    Ok(blocks)
}

/// Drain the outbound channel into the socket.
///
/// Ends when either side goes away: a closed channel means the hub dropped
/// every handle, a write error means the peer is gone. Dropping the
/// receiver is what the hub workers observe as session death.
pub async fn run_writer(mut rx: mpsc::Receiver<Vec<u8>>, mut socket: OwnedWriteHalf) {
    while let Some(block) = rx.recv().await {
        if let Err(e) = socket.write_all(&block).await {
            tracing::debug!("session write failed, stopping writer: {e}");
            return;
        }
    }
}

/// Pump one connection's inbound traffic into the hub.
///
/// Blocks on fixed-size reads of exactly one hub-key ciphertext block. Each
/// block is persisted verbatim before decryption, so history holds exactly
/// what was sent on the wire; then it is decrypted, formatted as
/// `"<name>: <plaintext>"` and published to the broadcast queue.
///
/// Termination: EOF and reset-class errors are the expected
/// connection-closed condition; a store failure or an unexpected I/O error
/// is logged and the loop fail-stops. Either way the hub is sent a leave
/// event so the session is retired without waiting for a failed write. A
/// block that fails to decrypt (or is not UTF-8) is dropped and the loop
/// continues.
pub async fn run_listener(
    session: SessionHandle,
    mut socket: OwnedReadHalf,
    hub_key: &KeyPair,
    messages: &dyn MessageStore,
    hub_tx: mpsc::Sender<HubEvent>,
) {
    let mut block = vec![0u8; hub_key.block_size()];

    loop {
        match socket.read_exact(&mut block).await {
            Ok(_) => {},
            Err(e)
                if matches!(
                    e.kind(),
                    std::io::ErrorKind::UnexpectedEof | std::io::ErrorKind::ConnectionReset
                ) =>
            {
                tracing::info!(
                    session_id = session.session_id,
                    user = %session.identity.name,
                    "session closed"
                );
                break;
            },
            Err(e) => {
                tracing::error!(session_id = session.session_id, "listener read error: {e}");
                break;
            },
        }

        // Store-before-decrypt: the append must land even if the block turns
        // out to be garbage.
        if let Err(e) =
            messages.append(session.identity.id, &session.identity.name, &block).await
        {
            tracing::error!(session_id = session.session_id, "history append failed: {e}");
            break;
        }

        let plaintext = match hub_key.decrypt(&block) {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::warn!(session_id = session.session_id, "dropping block: {e}");
                continue;
            },
        };
        let plaintext = match String::from_utf8(plaintext) {
            Ok(text) => text,
            Err(_) => {
                tracing::warn!(session_id = session.session_id, "dropping non-UTF-8 block");
                continue;
            },
        };

        let text = format!("{}: {}", session.identity.name, plaintext);
        let event = HubEvent::Publish {
            origin_session_id: session.session_id,
            message: RelayMessage { sender_id: session.identity.id, text },
        };
        if hub_tx.send(event).await.is_err() {
            // Broadcast worker gone; nothing left to publish to (and
            // nobody left to tell about the departure).
            tracing::error!(session_id = session.session_id, "hub is down, closing listener");
            return;
        }
    }

    // Retire the session eagerly instead of leaving it in the active set
    // until the next fan-out write fails.
    let _ = hub_tx.send(HubEvent::Leave { session_id: session.session_id }).await;
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::OnceLock;

    use super::*;

    fn test_pair() -> &'static KeyPair {
        static PAIR: OnceLock<KeyPair> = OnceLock::new();
        PAIR.get_or_init(|| KeyPair::generate(1024).unwrap())
    }

    fn decrypt_all(pair: &KeyPair, blocks: &[Vec<u8>]) -> String {
        let mut out = String::new();
        for block in blocks {
            out.push_str(&String::from_utf8(pair.decrypt(block).unwrap()).unwrap());
        }
        out
    }

    #[test]
    fn short_text_seals_to_one_block() {
        let pair = test_pair();
        let blocks = seal_text(&pair.peer_key(), "alice: hi").unwrap();
        assert_eq!(blocks.len(), 1);
        assert_eq!(decrypt_all(pair, &blocks), "alice: hi");
    }

    #[test]
    fn long_text_splits_and_reassembles() {
        let pair = test_pair();
        let text = "x".repeat(pair.max_payload() * 2 + 5);
        let blocks = seal_text(&pair.peer_key(), &text).unwrap();
        assert_eq!(blocks.len(), 3);
        assert_eq!(decrypt_all(pair, &blocks), text);
    }

    #[test]
    fn multibyte_text_splits_on_char_boundaries() {
        let pair = test_pair();
        // 3 bytes per char; capacity is not a multiple of 3.
        let text = "\u{65e5}".repeat(pair.max_payload());
        let blocks = seal_text(&pair.peer_key(), &text).unwrap();
        assert!(blocks.len() > 1);
        assert_eq!(decrypt_all(pair, &blocks), text);
    }

    #[test]
    fn empty_text_still_produces_a_block() {
        let pair = test_pair();
        let blocks = seal_text(&pair.peer_key(), "").unwrap();
        assert_eq!(blocks.len(), 1);
        assert_eq!(decrypt_all(pair, &blocks), "");
    }

    #[tokio::test]
    async fn try_deliver_reports_full_and_closed() {
        let identity = Identity { id: 1, name: "a".into(), public_key_pem: String::new() };
        let (session, mut rx) = SessionHandle::new(7, identity, test_pair().peer_key(), 1);

        assert_eq!(session.try_deliver(vec![1]), Delivery::Queued);
        assert_eq!(session.try_deliver(vec![2]), Delivery::Dropped);

        rx.close();
        while rx.try_recv().is_ok() {}
        assert_eq!(session.try_deliver(vec![3]), Delivery::Closed);
    }
}

//! History replay for joining sessions.

use std::time::Duration;

use sotto_core::{MessageStore, StoreError};
use sotto_crypto::KeyPair;
use tokio::time::timeout;

use crate::session::{SessionHandle, seal_text};

/// How long one replay block may wait for outbound channel space.
///
/// Replay runs inline in the broadcast worker, so a joiner that never
/// drains its socket must not hold the whole room hostage. One expired
/// wait abandons the rest of that joiner's replay; it bounds the worker's
/// stall per join to this duration.
const REPLAY_BLOCK_TIMEOUT: Duration = Duration::from_secs(1);

/// Replay the entire persisted history to one newly joined session.
///
/// Runs once per join, before the session is added to the active set, so a
/// new client sees the full backlog in storage order before any live
/// broadcast can reach it. Each stored ciphertext is decrypted with the hub
/// private key and re-sealed under the joining session's own key.
///
/// Cost is O(total historical messages) with no pagination or cap, a known
/// limitation, kept deliberately.
///
/// Rows that no longer decrypt (for instance anything recorded under a
/// previous hub key, since history stores hub-key ciphertext) are skipped
/// with a warning rather than failing the join.
///
/// Delivery waits are bounded by a per-block timeout: a joiner that stops
/// draining its outbound queue gets the rest of its replay abandoned
/// instead of stalling the broadcast worker for the whole room.
pub async fn replay_history(
    messages: &dyn MessageStore,
    hub_key: &KeyPair,
    session: &SessionHandle,
) -> Result<(), StoreError> {
    let backlog = messages.read_all().await?;
    let total = backlog.len();
    let mut replayed = 0usize;

    for row in backlog {
        let plaintext = match hub_key.decrypt(&row.ciphertext) {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::warn!(message_id = row.id, "skipping undecryptable history row: {e}");
                continue;
            },
        };
        let Ok(plaintext) = String::from_utf8(plaintext) else {
            tracing::warn!(message_id = row.id, "skipping non-UTF-8 history row");
            continue;
        };

        let line = format!("{}: {plaintext}", row.sender_name);
        let blocks = match seal_text(&session.peer_key, &line) {
            Ok(blocks) => blocks,
            Err(e) => {
                tracing::warn!(message_id = row.id, "skipping history row, encrypt failed: {e}");
                continue;
            },
        };
        for block in blocks {
            match timeout(REPLAY_BLOCK_TIMEOUT, session.deliver(block)).await {
                Ok(Ok(())) => {},
                Ok(Err(_)) => {
                    // Joiner already gone; the rest of the backlog is moot.
                    tracing::debug!(session_id = session.session_id, "join died during replay");
                    return Ok(());
                },
                Err(_) => {
                    tracing::warn!(
                        session_id = session.session_id,
                        "joiner not draining its outbound queue, abandoning replay"
                    );
                    return Ok(());
                },
            }
        }
        replayed += 1;
    }

    tracing::debug!(session_id = session.session_id, replayed, total, "history replayed");
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use sotto_core::{Identity, MemoryMessageStore};
    use sotto_crypto::KeyPair;

    use super::*;
    use crate::session::SessionHandle;

    fn make_session(pair: &KeyPair) -> (SessionHandle, tokio::sync::mpsc::Receiver<Vec<u8>>) {
        let identity =
            Identity { id: 1, name: "carol".into(), public_key_pem: pair.public_pem().unwrap() };
        SessionHandle::new(99, identity, pair.peer_key(), 64)
    }

    #[tokio::test]
    async fn replays_full_backlog_in_storage_order() {
        let hub = KeyPair::generate(1024).unwrap();
        let store = MemoryMessageStore::new();
        for (id, sender) in [(1u64, "alice"), (2, "bob"), (3, "alice")] {
            let block = hub.peer_key().encrypt(format!("msg-{id}").as_bytes()).unwrap();
            store.append(id, sender, &block).await.unwrap();
        }

        let client = KeyPair::generate(1024).unwrap();
        let (session, mut rx) = make_session(&client);
        replay_history(&store, &hub, &session).await.unwrap();

        let expected = ["alice: msg-1", "bob: msg-2", "alice: msg-3"];
        for line in expected {
            let block = rx.recv().await.unwrap();
            assert_eq!(String::from_utf8(client.decrypt(&block).unwrap()).unwrap(), line);
        }
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn empty_history_sends_nothing() {
        let hub = KeyPair::generate(1024).unwrap();
        let store = MemoryMessageStore::new();
        let client = KeyPair::generate(1024).unwrap();
        let (session, mut rx) = make_session(&client);

        replay_history(&store, &hub, &session).await.unwrap();
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn undecryptable_rows_are_skipped_not_fatal() {
        let hub = KeyPair::generate(1024).unwrap();
        let rotated_away = KeyPair::generate(1024).unwrap();
        let store = MemoryMessageStore::new();

        // One row sealed under a key the hub no longer holds, one good row.
        let stale = rotated_away.peer_key().encrypt(b"lost forever").unwrap();
        store.append(1, "alice", &stale).await.unwrap();
        let good = hub.peer_key().encrypt(b"still here").unwrap();
        store.append(2, "bob", &good).await.unwrap();

        let client = KeyPair::generate(1024).unwrap();
        let (session, mut rx) = make_session(&client);
        replay_history(&store, &hub, &session).await.unwrap();

        let block = rx.recv().await.unwrap();
        assert_eq!(
            String::from_utf8(client.decrypt(&block).unwrap()).unwrap(),
            "bob: still here"
        );
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn joiner_that_never_drains_does_not_stall_replay() {
        let hub = KeyPair::generate(1024).unwrap();
        let store = MemoryMessageStore::new();
        for id in 1u64..=4 {
            let block = hub.peer_key().encrypt(format!("msg-{id}").as_bytes()).unwrap();
            store.append(id, "alice", &block).await.unwrap();
        }

        // Outbound capacity of one, and nothing ever reads from it: the
        // first block fills the channel and every later delivery waits.
        let client = KeyPair::generate(1024).unwrap();
        let identity = Identity {
            id: 1,
            name: "carol".into(),
            public_key_pem: client.public_pem().unwrap(),
        };
        let (session, _rx) = SessionHandle::new(99, identity, client.peer_key(), 1);

        // Replay must give up on the stalled joiner, not wait forever.
        let result =
            timeout(Duration::from_secs(60), replay_history(&store, &hub, &session)).await;
        assert!(result.is_ok());
        result.unwrap().unwrap();
    }
}

//! Persistence collaborator traits and the bundled in-memory stores.

use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use thiserror::Error;

use crate::model::{Identity, StoredMessage};

/// Errors from a persistence backend.
///
/// A storage failure during handshake or append aborts the operation rather
/// than continuing with unpersisted state.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The backend failed.
    #[error("store backend: {0}")]
    Backend(String),

    /// The requested record does not exist.
    #[error("record not found")]
    NotFound,
}

impl StoreError {
    fn poisoned<T>(_: PoisonError<T>) -> Self {
        Self::Backend("store mutex poisoned".to_string())
    }
}

/// Maps public keys to persisted identities.
///
/// Implementations must provide application-level uniqueness on the public
/// key: `find_or_create` is the atomic upsert the handshake uses, avoiding
/// the read-then-create race of calling the two primitive operations in
/// sequence.
#[async_trait]
pub trait IdentityStore: Send + Sync {
    /// Look up an identity by its registered public key.
    async fn find_by_public_key(&self, pem: &str) -> Result<Option<Identity>, StoreError>;

    /// Persist a new identity. Callers should prefer [`Self::find_or_create`].
    async fn create(&self, name: &str, pem: &str) -> Result<Identity, StoreError>;

    /// Return the identity for `pem`, creating it with `name` on first
    /// sight. Must be atomic with respect to concurrent handshakes of the
    /// same key.
    async fn find_or_create(&self, name: &str, pem: &str) -> Result<Identity, StoreError>;
}

/// Append-only message history.
#[async_trait]
pub trait MessageStore: Send + Sync {
    /// Append one wire block verbatim. Returns the stored record.
    async fn append(
        &self,
        sender_id: u64,
        sender_name: &str,
        ciphertext: &[u8],
    ) -> Result<StoredMessage, StoreError>;

    /// Full history, oldest first.
    async fn read_all(&self) -> Result<Vec<StoredMessage>, StoreError>;
}

/// In-memory [`IdentityStore`]. `Clone` shares state.
#[derive(Debug, Clone, Default)]
pub struct MemoryIdentityStore {
    inner: Arc<Mutex<IdentityTable>>,
}

#[derive(Debug, Default)]
struct IdentityTable {
    next_id: u64,
    rows: Vec<Identity>,
}

impl IdentityTable {
    fn find(&self, pem: &str) -> Option<Identity> {
        self.rows.iter().find(|row| row.public_key_pem == pem).cloned()
    }

    fn insert(&mut self, name: &str, pem: &str) -> Identity {
        self.next_id += 1;
        let identity =
            Identity { id: self.next_id, name: name.to_string(), public_key_pem: pem.to_string() };
        self.rows.push(identity.clone());
        identity
    }
}

impl MemoryIdentityStore {
    /// Empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl IdentityStore for MemoryIdentityStore {
    async fn find_by_public_key(&self, pem: &str) -> Result<Option<Identity>, StoreError> {
        let table = self.inner.lock().map_err(StoreError::poisoned)?;
        Ok(table.find(pem))
    }

    async fn create(&self, name: &str, pem: &str) -> Result<Identity, StoreError> {
        let mut table = self.inner.lock().map_err(StoreError::poisoned)?;
        Ok(table.insert(name, pem))
    }

    async fn find_or_create(&self, name: &str, pem: &str) -> Result<Identity, StoreError> {
        // One lock across lookup and insert: concurrent handshakes of the
        // same key cannot produce duplicate rows.
        let mut table = self.inner.lock().map_err(StoreError::poisoned)?;
        if let Some(existing) = table.find(pem) {
            return Ok(existing);
        }
        Ok(table.insert(name, pem))
    }
}

/// In-memory [`MessageStore`]. `Clone` shares state.
#[derive(Debug, Clone, Default)]
pub struct MemoryMessageStore {
    inner: Arc<Mutex<MessageLog>>,
}

#[derive(Debug, Default)]
struct MessageLog {
    next_id: u64,
    rows: Vec<StoredMessage>,
}

impl MemoryMessageStore {
    /// Empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of persisted messages.
    pub fn len(&self) -> usize {
        self.inner.lock().map(|log| log.rows.len()).unwrap_or(0)
    }

    /// True when no messages have been appended.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl MessageStore for MemoryMessageStore {
    async fn append(
        &self,
        sender_id: u64,
        sender_name: &str,
        ciphertext: &[u8],
    ) -> Result<StoredMessage, StoreError> {
        let mut log = self.inner.lock().map_err(StoreError::poisoned)?;
        log.next_id += 1;
        let message = StoredMessage {
            id: log.next_id,
            sender_id,
            sender_name: sender_name.to_string(),
            ciphertext: ciphertext.to_vec(),
        };
        log.rows.push(message.clone());
        Ok(message)
    }

    async fn read_all(&self) -> Result<Vec<StoredMessage>, StoreError> {
        let log = self.inner.lock().map_err(StoreError::poisoned)?;
        Ok(log.rows.clone())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn find_or_create_is_idempotent_per_key() {
        let store = MemoryIdentityStore::new();

        let first = store.find_or_create("alice", "pem-a").await.unwrap();
        let second = store.find_or_create("alice", "pem-a").await.unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(store.find_by_public_key("pem-a").await.unwrap().unwrap().id, first.id);
    }

    #[tokio::test]
    async fn find_or_create_keeps_first_registered_name() {
        let store = MemoryIdentityStore::new();

        let first = store.find_or_create("alice", "pem-a").await.unwrap();
        // Same key handshaking with a different display name: identity wins.
        let again = store.find_or_create("impostor", "pem-a").await.unwrap();

        assert_eq!(again.id, first.id);
        assert_eq!(again.name, "alice");
    }

    #[tokio::test]
    async fn distinct_keys_may_share_a_name() {
        let store = MemoryIdentityStore::new();

        let a = store.find_or_create("dave", "pem-a").await.unwrap();
        let b = store.find_or_create("dave", "pem-b").await.unwrap();

        assert_ne!(a.id, b.id);
        assert_eq!(a.name, b.name);
    }

    #[tokio::test]
    async fn clone_shares_identity_state() {
        let store = MemoryIdentityStore::new();
        let view = store.clone();

        store.find_or_create("alice", "pem-a").await.unwrap();
        assert!(view.find_by_public_key("pem-a").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn history_is_append_only_and_ordered() {
        let store = MemoryMessageStore::new();

        for i in 0..5u64 {
            store.append(1, "alice", &[i as u8]).await.unwrap();
        }

        let history = store.read_all().await.unwrap();
        assert_eq!(history.len(), 5);
        for (position, row) in history.iter().enumerate() {
            assert_eq!(row.id, position as u64 + 1);
            assert_eq!(row.ciphertext, vec![position as u8]);
        }
    }

    #[tokio::test]
    async fn append_stores_ciphertext_verbatim() {
        let store = MemoryMessageStore::new();
        let block = vec![0xDE, 0xAD, 0xBE, 0xEF];

        let stored = store.append(9, "bob", &block).await.unwrap();

        assert_eq!(stored.ciphertext, block);
        assert_eq!(stored.sender_name, "bob");
        assert_eq!(store.read_all().await.unwrap()[0].ciphertext, block);
    }
}

//! Sotto relay server.
//!
//! An encrypted, persistent group-chat relay: clients connect over raw TCP,
//! perform a public-key handshake, and exchange RSA-block messages through
//! the hub, which persists every inbound block and can forward flagged
//! questions to an answering service.
//!
//! ## Architecture
//!
//! ```text
//! sotto-server
//!   ├─ Server              (accept loop, one task per connection)
//!   ├─ perform_handshake   (key exchange + identity lookup/create)
//!   ├─ run_listener        (per-session inbound pump: persist, decrypt, publish)
//!   ├─ run_writer          (per-session outbound pump, sole socket writer)
//!   ├─ run_broadcast_worker(owns the active-session set, fan-out + joins)
//!   ├─ run_assistant_worker(question queue -> AnswerService -> asker only)
//!   └─ replay_history      (full backlog to each joining session)
//! ```
//!
//! ## Concurrency
//!
//! One listener task per connection, two dispatch workers, the accept loop.
//! The active-session set is owned exclusively by the broadcast worker; the
//! accept loop hands new sessions over the hub event channel instead of
//! mutating shared state. The hub event channel and the assistant queue are
//! the only cross-task communication; their capacity is a configuration
//! knob. Sessions terminate on I/O error or process exit; there is no idle
//! timeout and no graceful drain.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod assistant;
mod error;
mod handshake;
mod history;
mod hub;
mod session;

use std::{net::SocketAddr, path::PathBuf, sync::Arc};

pub use assistant::HttpAnswerService;
pub use error::ServerError;
pub use handshake::perform_handshake;
pub use history::replay_history;
pub use hub::{AssistantQuestion, HubEvent, run_assistant_worker, run_broadcast_worker};
pub use session::{Delivery, SessionHandle, run_listener, run_writer, seal_text};
use sotto_core::{AnswerService, DEFAULT_TRIGGER_TOKEN, IdentityStore, MessageStore};
use sotto_crypto::{DEFAULT_RSA_BITS, KeyPair, KeyRegistry};
use tokio::{net::TcpListener, sync::mpsc};

/// Server configuration, consumed at startup only.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind to (e.g. "0.0.0.0:7878").
    pub bind_address: String,
    /// Directory holding (or receiving) the hub key pair.
    pub key_dir: PathBuf,
    /// Modulus size for a freshly generated hub key.
    pub rsa_bits: usize,
    /// Read buffer for the single handshake frame.
    pub handshake_buffer: usize,
    /// Capacity of the hub event channel, the assistant queue and each
    /// session's outbound channel. Producers wait for space on the hub
    /// queues; the broadcast fan-out drops blocks for a session whose
    /// outbound channel is full rather than stall the others.
    pub queue_capacity: usize,
    /// Literal substring that routes a message to the assistant.
    pub trigger_token: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:7878".to_string(),
            key_dir: PathBuf::from(".sotto/keys"),
            rsa_bits: DEFAULT_RSA_BITS,
            handshake_buffer: 2048,
            queue_capacity: 1024,
            trigger_token: DEFAULT_TRIGGER_TOKEN.to_string(),
        }
    }
}

/// The relay process: hub key, TCP listener, collaborator handles.
pub struct Server {
    listener: TcpListener,
    hub_key: Arc<KeyPair>,
    hub_public_pem: String,
    config: ServerConfig,
    identities: Arc<dyn IdentityStore>,
    messages: Arc<dyn MessageStore>,
    answers: Arc<dyn AnswerService>,
}

impl Server {
    /// Load (or create) the hub key pair and bind the listener.
    ///
    /// # Errors
    ///
    /// Returns an error if the stored hub key exists but cannot be read or
    /// parsed (never silently regenerated), or if binding fails. Both are
    /// fatal startup errors.
    pub async fn bind(
        config: ServerConfig,
        identities: Arc<dyn IdentityStore>,
        messages: Arc<dyn MessageStore>,
        answers: Arc<dyn AnswerService>,
    ) -> Result<Self, ServerError> {
        let registry = KeyRegistry::new(&config.key_dir);
        let hub_key = registry.load_or_generate(config.rsa_bits)?;
        let hub_public_pem = hub_key.public_pem()?;
        tracing::info!(
            key_dir = %config.key_dir.display(),
            block_size = hub_key.block_size(),
            "hub key ready"
        );

        let listener = TcpListener::bind(&config.bind_address).await?;

        Ok(Self {
            listener,
            hub_key: Arc::new(hub_key),
            hub_public_pem,
            config,
            identities,
            messages,
            answers,
        })
    }

    /// Address the server is bound to.
    pub fn local_addr(&self) -> Result<SocketAddr, ServerError> {
        Ok(self.listener.local_addr()?)
    }

    /// Run the relay: spawn both dispatch workers, then accept connections
    /// until the process exits.
    ///
    /// Per-connection failures are logged and isolated; they never abort
    /// the hub or other sessions.
    pub async fn run(self) -> Result<(), ServerError> {
        tracing::info!("relay listening on {}", self.listener.local_addr()?);

        let (hub_tx, hub_rx) = mpsc::channel(self.config.queue_capacity);
        let (assistant_tx, assistant_rx) = mpsc::channel(self.config.queue_capacity);

        tokio::spawn(run_broadcast_worker(
            hub_rx,
            assistant_tx,
            Arc::clone(&self.hub_key),
            Arc::clone(&self.messages),
            self.config.trigger_token.clone(),
        ));
        tokio::spawn(run_assistant_worker(assistant_rx, Arc::clone(&self.answers)));

        loop {
            match self.listener.accept().await {
                Ok((stream, addr)) => {
                    let ctx = ConnectionContext {
                        hub_key: Arc::clone(&self.hub_key),
                        hub_public_pem: self.hub_public_pem.clone(),
                        identities: Arc::clone(&self.identities),
                        messages: Arc::clone(&self.messages),
                        hub_tx: hub_tx.clone(),
                        handshake_buffer: self.config.handshake_buffer,
                        queue_capacity: self.config.queue_capacity,
                    };
                    tokio::spawn(async move {
                        match handle_connection(stream, ctx).await {
                            Ok(()) | Err(ServerError::ConnectionClosed) => {},
                            Err(e) => tracing::warn!(%addr, "connection error: {e}"),
                        }
                    });
                },
                Err(e) => {
                    tracing::error!("accept error: {e}");
                },
            }
        }
    }
}

/// Everything one connection task needs from the server.
struct ConnectionContext {
    hub_key: Arc<KeyPair>,
    hub_public_pem: String,
    identities: Arc<dyn IdentityStore>,
    messages: Arc<dyn MessageStore>,
    hub_tx: mpsc::Sender<HubEvent>,
    handshake_buffer: usize,
    queue_capacity: usize,
}

/// Handle a single accepted connection: handshake, hand the session to the
/// hub (which replays history before the session goes live), then pump
/// inbound traffic until the connection dies.
async fn handle_connection(
    mut stream: tokio::net::TcpStream,
    ctx: ConnectionContext,
) -> Result<(), ServerError> {
    let (identity, peer_key) = perform_handshake(
        &mut stream,
        ctx.handshake_buffer,
        &*ctx.identities,
        &ctx.hub_public_pem,
    )
    .await?;

    let session_id = {
        let mut buf = [0u8; 8];
        getrandom::fill(&mut buf)
            .map_err(|e| std::io::Error::other(e.to_string()))?;
        u64::from_le_bytes(buf)
    };

    tracing::info!(session_id, user = %identity.name, identity_id = identity.id, "handshake complete");

    let (read_half, write_half) = stream.into_split();
    let (session, outbound_rx) =
        SessionHandle::new(session_id, identity, peer_key, ctx.queue_capacity);
    tokio::spawn(run_writer(outbound_rx, write_half));

    // The broadcast worker replays history before inserting the session, so
    // the backlog always lands ahead of any live broadcast.
    ctx.hub_tx
        .send(HubEvent::Join(session.clone()))
        .await
        .map_err(|_| ServerError::HubUnavailable)?;

    run_listener(session, read_half, &ctx.hub_key, &*ctx.messages, ctx.hub_tx).await;

    Ok(())
}

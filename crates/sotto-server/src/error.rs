//! Server error types.

use sotto_core::StoreError;
use sotto_crypto::CryptoError;
use sotto_proto::ProtocolError;
use thiserror::Error;

/// Errors that can occur in the relay.
///
/// Per-session failures never carry past the session that caused them: a
/// handshake or listener error tears down that connection only. Errors from
/// `Server::bind`/`Server::run` themselves are fatal to the process.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Malformed handshake. The connection is rejected; no session is
    /// created and nothing is persisted.
    #[error("protocol: {0}")]
    Protocol(#[from] ProtocolError),

    /// Key handling failure. Fatal at startup (hub key registry), per-frame
    /// recoverable inside the listener loop.
    #[error("crypto: {0}")]
    Crypto(#[from] CryptoError),

    /// Persistence failure. The operation that needed the store aborts
    /// rather than continuing with unpersisted state.
    #[error("store: {0}")]
    Store(#[from] StoreError),

    /// Transport/network error.
    #[error("transport: {0}")]
    Transport(#[from] std::io::Error),

    /// The peer went away before or during the handshake. Expected terminal
    /// condition, not logged as an error.
    #[error("connection closed")]
    ConnectionClosed,

    /// A hub dispatch worker is gone. There is no supervisor to restart
    /// workers, so this is fatal to the process.
    #[error("hub worker unavailable")]
    HubUnavailable,
}

//! Server side of the connection handshake.

use sotto_core::{Identity, IdentityStore};
use sotto_crypto::PeerKey;
use sotto_proto::{HandshakeReply, HandshakeRequest};
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::TcpStream,
};

use crate::error::ServerError;

/// Run the handshake on a freshly accepted connection.
///
/// Reads one framed [`HandshakeRequest`], authenticates the peer purely by
/// its public key (looking up or creating the [`Identity`] atomically), and
/// answers with the hub public key. Any failure rejects the connection with
/// no session created; a store failure aborts before the reply so the peer
/// never believes it is registered when it is not.
///
/// Idempotent on identity creation: the same public key handshaking twice
/// yields the same identity id, never a duplicate row.
pub async fn perform_handshake(
    stream: &mut TcpStream,
    buffer_size: usize,
    identities: &dyn IdentityStore,
    hub_public_pem: &str,
) -> Result<(Identity, PeerKey), ServerError> {
    let mut buf = vec![0u8; buffer_size];
    let n = stream.read(&mut buf).await?;
    if n == 0 {
        return Err(ServerError::ConnectionClosed);
    }

    let request = HandshakeRequest::decode(&buf[..n])?;
    tracing::debug!(user = %request.username, "handshake request");

    let peer_key = PeerKey::from_pem(&request.public_key_pem)?;
    // Key material is stored in canonical PEM form so that a client
    // re-serializing the same key can never register twice.
    let canonical_pem = peer_key.to_pem()?;

    let identity = identities.find_or_create(&request.username, &canonical_pem).await?;

    stream.write_all(&HandshakeReply::new(hub_public_pem).encode()).await?;

    Ok((identity, peer_key))
}

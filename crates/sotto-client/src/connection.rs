//! Hub connection: handshake, sealed sends, block-framed receives.
//!
//! A [`Connection`] owns a TCP stream to the hub. The constructor runs
//! the key-exchange handshake, after which every outbound message is
//! encrypted under the hub's public key and every inbound block is
//! decrypted with the caller's private key. [`Connection::split`]
//! yields independent send/receive halves for full-duplex use.

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tracing::debug;

use sotto_crypto::{KeyPair, PeerKey};
use sotto_proto::{HandshakeReply, HandshakeRequest};

use crate::error::ClientError;

/// Upper bound on the hub's handshake reply frame.
const REPLY_BUFFER: usize = 2048;

/// An authenticated, encrypted connection to a hub.
pub struct Connection {
    read: RecvHalf,
    write: SendHalf,
}

impl Connection {
    /// Connects to `addr` and performs the key-exchange handshake.
    ///
    /// Sends this client's public key and `username`, then waits for
    /// the hub's public key in reply. Returns [`ClientError::ServerClosed`]
    /// if the hub hangs up before replying.
    pub async fn connect(
        addr: &str,
        username: &str,
        keys: KeyPair,
    ) -> Result<Self, ClientError> {
        let mut stream = TcpStream::connect(addr).await?;

        let request = HandshakeRequest::new(keys.public_pem()?, username);
        stream.write_all(&request.encode()).await?;

        let mut buf = vec![0u8; REPLY_BUFFER];
        let n = stream.read(&mut buf).await?;
        if n == 0 {
            return Err(ClientError::ServerClosed);
        }
        let reply = HandshakeReply::decode(&buf[..n])?;
        let hub_key = PeerKey::from_pem(&reply.public_key_pem)?;
        debug!(block_size = hub_key.block_size(), "handshake complete");

        let (read, write) = stream.into_split();
        Ok(Self {
            read: RecvHalf { socket: read, keys },
            write: SendHalf { socket: write, hub_key },
        })
    }

    /// Largest message, in bytes, that [`Connection::send`] accepts.
    pub fn max_message_len(&self) -> usize {
        self.write.max_message_len()
    }

    /// Encrypts `text` under the hub key and sends it as one block.
    pub async fn send(&mut self, text: &str) -> Result<(), ClientError> {
        self.write.send(text).await
    }

    /// Receives and decrypts the next message from the hub.
    ///
    /// Returns `Ok(None)` once the hub closes the connection.
    pub async fn recv(&mut self) -> Result<Option<String>, ClientError> {
        self.read.recv().await
    }

    /// Splits into independently usable send and receive halves.
    pub fn split(self) -> (SendHalf, RecvHalf) {
        (self.write, self.read)
    }
}

/// Outbound half: encrypts under the hub's public key.
pub struct SendHalf {
    socket: OwnedWriteHalf,
    hub_key: PeerKey,
}

impl SendHalf {
    /// Largest message, in bytes, that [`SendHalf::send`] accepts.
    pub fn max_message_len(&self) -> usize {
        self.hub_key.max_payload()
    }

    /// Encrypts `text` under the hub key and sends it as one block.
    ///
    /// Messages longer than [`Self::max_message_len`] are rejected with
    /// [`ClientError::MessageTooLarge`] without touching the socket.
    pub async fn send(&mut self, text: &str) -> Result<(), ClientError> {
        let max = self.hub_key.max_payload();
        if text.len() > max {
            return Err(ClientError::MessageTooLarge { len: text.len(), max });
        }
        let block = self.hub_key.encrypt(text.as_bytes())?;
        self.socket.write_all(&block).await?;
        Ok(())
    }
}

/// Inbound half: decrypts blocks with this client's private key.
pub struct RecvHalf {
    socket: OwnedReadHalf,
    keys: KeyPair,
}

impl RecvHalf {
    /// Receives and decrypts the next message from the hub.
    ///
    /// Reads exactly one ciphertext block sized by this client's own
    /// key modulus. Returns `Ok(None)` once the hub closes the
    /// connection.
    pub async fn recv(&mut self) -> Result<Option<String>, ClientError> {
        let mut block = vec![0u8; self.keys.block_size()];
        match self.socket.read_exact(&mut block).await {
            Ok(_) => {}
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
            Err(e) => return Err(e.into()),
        }
        let plaintext = self.keys.decrypt(&block)?;
        String::from_utf8(plaintext).map(Some).map_err(|_| ClientError::InvalidUtf8)
    }
}

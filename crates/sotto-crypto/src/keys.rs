//! RSA key pairs and single-block encryption.

use rsa::{
    Pkcs1v15Encrypt, RsaPrivateKey, RsaPublicKey,
    pkcs1::{
        DecodeRsaPrivateKey, DecodeRsaPublicKey, EncodeRsaPrivateKey, EncodeRsaPublicKey,
        LineEnding,
    },
    traits::PublicKeyParts,
};
use thiserror::Error;

/// Default modulus size for generated keys.
pub const DEFAULT_RSA_BITS: usize = 2048;

/// PKCS#1 v1.5 padding overhead per block.
const PADDING_OVERHEAD: usize = 11;

/// Errors from key handling and block encryption.
#[derive(Debug, Error)]
pub enum CryptoError {
    /// Key generation failed.
    #[error("key generation failed: {0}")]
    KeyGen(rsa::Error),

    /// Encryption failed.
    #[error("encrypt failed: {0}")]
    Encrypt(rsa::Error),

    /// Decryption failed. For inbound traffic this means the block was not
    /// produced under our public key (or was corrupted in transit).
    #[error("decrypt failed: {0}")]
    Decrypt(rsa::Error),

    /// PEM text did not parse as a key.
    #[error("invalid PEM key material: {0}")]
    Pem(#[from] rsa::pkcs1::Error),

    /// Reading or writing stored key material failed.
    #[error("key storage I/O: {0}")]
    Io(#[from] std::io::Error),

    /// Plaintext does not fit in one block.
    #[error("payload of {len} bytes exceeds block capacity of {max}")]
    PayloadTooLarge {
        /// Rejected payload length.
        len: usize,
        /// Capacity of one block for this key.
        max: usize,
    },
}

/// An encrypt-only public key handle.
///
/// This is how the hub holds a client's registered key and how a client
/// holds the hub key: either side can seal one-block messages to the owner
/// of the private half, nothing more.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerKey(RsaPublicKey);

impl PeerKey {
    /// Parse a PKCS#1 PEM public key.
    pub fn from_pem(pem: &str) -> Result<Self, CryptoError> {
        Ok(Self(RsaPublicKey::from_pkcs1_pem(pem)?))
    }

    /// PKCS#1 PEM form of this key.
    pub fn to_pem(&self) -> Result<String, CryptoError> {
        Ok(self.0.to_pkcs1_pem(LineEnding::LF)?)
    }

    /// Ciphertext block length for this key, in bytes.
    pub fn block_size(&self) -> usize {
        self.0.size()
    }

    /// Largest plaintext that fits in one block.
    pub fn max_payload(&self) -> usize {
        self.block_size() - PADDING_OVERHEAD
    }

    /// Seal one plaintext into exactly one ciphertext block.
    pub fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>, CryptoError> {
        if plaintext.len() > self.max_payload() {
            return Err(CryptoError::PayloadTooLarge {
                len: plaintext.len(),
                max: self.max_payload(),
            });
        }
        let mut rng = rand::rngs::OsRng;
        self.0.encrypt(&mut rng, Pkcs1v15Encrypt, plaintext).map_err(CryptoError::Encrypt)
    }
}

/// A full key pair: the identity of one peer (the hub, or one client).
#[derive(Debug, Clone)]
pub struct KeyPair {
    private: RsaPrivateKey,
    public: RsaPublicKey,
}

impl KeyPair {
    /// Generate a fresh pair from OS entropy.
    pub fn generate(bits: usize) -> Result<Self, CryptoError> {
        let mut rng = rand::rngs::OsRng;
        let private = RsaPrivateKey::new(&mut rng, bits).map_err(CryptoError::KeyGen)?;
        let public = RsaPublicKey::from(&private);
        Ok(Self { private, public })
    }

    /// Rebuild a pair from a stored PKCS#1 PEM private key.
    pub fn from_private_pem(pem: &str) -> Result<Self, CryptoError> {
        let private = RsaPrivateKey::from_pkcs1_pem(pem)?;
        let public = RsaPublicKey::from(&private);
        Ok(Self { private, public })
    }

    /// PKCS#1 PEM of the private half.
    pub fn private_pem(&self) -> Result<String, CryptoError> {
        Ok(self.private.to_pkcs1_pem(LineEnding::LF)?.to_string())
    }

    /// PKCS#1 PEM of the public half. This is what goes over the wire in
    /// the handshake and into the identity store.
    pub fn public_pem(&self) -> Result<String, CryptoError> {
        Ok(self.public.to_pkcs1_pem(LineEnding::LF)?)
    }

    /// Encrypt-only handle to the public half.
    pub fn peer_key(&self) -> PeerKey {
        PeerKey(self.public.clone())
    }

    /// Ciphertext block length, in bytes. Every inbound read on a socket
    /// whose sender encrypts to this pair is exactly this long.
    pub fn block_size(&self) -> usize {
        self.public.size()
    }

    /// Largest plaintext that fits in one block.
    pub fn max_payload(&self) -> usize {
        self.block_size() - PADDING_OVERHEAD
    }

    /// Open one ciphertext block.
    pub fn decrypt(&self, block: &[u8]) -> Result<Vec<u8>, CryptoError> {
        self.private.decrypt(Pkcs1v15Encrypt, block).map_err(CryptoError::Decrypt)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::OnceLock;

    use proptest::prelude::*;

    use super::*;

    /// Small test key: generation is the slow part, share one.
    fn test_pair() -> &'static KeyPair {
        static PAIR: OnceLock<KeyPair> = OnceLock::new();
        PAIR.get_or_init(|| KeyPair::generate(1024).unwrap())
    }

    #[test]
    fn roundtrip_via_peer_key() {
        let pair = test_pair();
        let block = pair.peer_key().encrypt(b"hello relay").unwrap();
        assert_eq!(block.len(), pair.block_size());
        assert_eq!(pair.decrypt(&block).unwrap(), b"hello relay");
    }

    #[test]
    fn roundtrip_via_pem_exchange() {
        // The role-crossing path: key travels as PEM, peer encrypts, owner
        // decrypts. This is exactly what the handshake sets up.
        let pair = test_pair();
        let peer = PeerKey::from_pem(&pair.public_pem().unwrap()).unwrap();
        let block = peer.encrypt(b"over the wire").unwrap();
        assert_eq!(pair.decrypt(&block).unwrap(), b"over the wire");
    }

    #[test]
    fn oversized_payload_rejected() {
        let pair = test_pair();
        let payload = vec![0u8; pair.max_payload() + 1];
        let result = pair.peer_key().encrypt(&payload);
        assert!(matches!(result, Err(CryptoError::PayloadTooLarge { .. })));
    }

    #[test]
    fn payload_at_capacity_fits() {
        let pair = test_pair();
        let payload = vec![7u8; pair.max_payload()];
        let block = pair.peer_key().encrypt(&payload).unwrap();
        assert_eq!(pair.decrypt(&block).unwrap(), payload);
    }

    #[test]
    fn wrong_key_fails_to_decrypt() {
        let pair = test_pair();
        let other = KeyPair::generate(1024).unwrap();
        let block = pair.peer_key().encrypt(b"for the hub only").unwrap();
        assert!(matches!(other.decrypt(&block), Err(CryptoError::Decrypt(_))));
    }

    #[test]
    fn private_pem_roundtrip() {
        let pair = test_pair();
        let restored = KeyPair::from_private_pem(&pair.private_pem().unwrap()).unwrap();
        let block = restored.peer_key().encrypt(b"persisted").unwrap();
        assert_eq!(pair.decrypt(&block).unwrap(), b"persisted");
    }

    #[test]
    fn garbage_pem_rejected() {
        assert!(matches!(PeerKey::from_pem("not a key"), Err(CryptoError::Pem(_))));
        assert!(matches!(KeyPair::from_private_pem("not a key"), Err(CryptoError::Pem(_))));
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(16))]

        #[test]
        fn prop_roundtrip_arbitrary_payload(payload in proptest::collection::vec(any::<u8>(), 0..117)) {
            let pair = test_pair();
            prop_assume!(payload.len() <= pair.max_payload());
            let block = pair.peer_key().encrypt(&payload).unwrap();
            prop_assert_eq!(block.len(), pair.block_size());
            prop_assert_eq!(pair.decrypt(&block).unwrap(), payload);
        }
    }
}

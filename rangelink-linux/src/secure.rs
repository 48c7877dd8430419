//! Channel crypto: X25519 key agreement, pairwise session keys,
//! ChaCha20-Poly1305 frame encryption.

use chacha20poly1305::aead::{Aead, KeyInit};
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use x25519_dalek::{PublicKey as X25519PublicKey, StaticSecret};

/// Channel public key (32 bytes, X25519). Travels in announce beacons and in
/// the TCP handshake.
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub struct PublicKey(#[serde(with = "bytes_32")] [u8; 32]);

mod bytes_32 {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    pub fn serialize<S: Serializer>(v: &[u8; 32], serializer: S) -> Result<S::Ok, S::Error> {
        v.as_slice().serialize(serializer)
    }
    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<[u8; 32], D::Error> {
        let buf: Vec<u8> = Deserialize::deserialize(d)?;
        buf.try_into()
            .map_err(|_| serde::de::Error::custom("expected 32 bytes"))
    }
}

impl PublicKey {
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        PublicKey(bytes)
    }
}

/// X25519 keypair for the encrypted channel. The secret never leaves this
/// type.
pub struct Keypair {
    secret: StaticSecret,
    public: PublicKey,
}

impl Keypair {
    pub fn generate() -> Self {
        let secret = StaticSecret::random_from_rng(OsRng);
        let public = PublicKey(X25519PublicKey::from(&secret).to_bytes());
        Self { secret, public }
    }

    pub fn public_key(&self) -> &PublicKey {
        &self.public
    }

    /// Shared secret with another device's public key.
    pub fn shared_secret(&self, other_public: &PublicKey) -> [u8; 32] {
        let other = X25519PublicKey::from(other_public.0);
        self.secret.diffie_hellman(&other).to_bytes()
    }
}

/// Derive the pairwise 32-byte session key from a shared secret.
pub fn derive_session_key(shared_secret: &[u8; 32]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(b"rangelink-channel-v1");
    hasher.update(shared_secret);
    hasher.finalize().into()
}

/// Nonce layout: direction byte + 64-bit LE counter. Each direction of a
/// connection keeps its own counter, so nonces never repeat under one key.
fn nonce_bytes(direction: u8, counter: u64) -> [u8; 12] {
    let mut nonce = [0u8; 12];
    nonce[0] = direction;
    nonce[4..12].copy_from_slice(&counter.to_le_bytes());
    nonce
}

/// Encrypt one frame payload.
pub fn encrypt_frame(
    key: &[u8; 32],
    direction: u8,
    counter: u64,
    plaintext: &[u8],
) -> Result<Vec<u8>, ChannelCryptoError> {
    let cipher = chacha20poly1305::ChaCha20Poly1305::new_from_slice(key)
        .map_err(|_| ChannelCryptoError::Key)?;
    let nonce = nonce_bytes(direction, counter);
    let nonce = chacha20poly1305::aead::Nonce::<chacha20poly1305::ChaCha20Poly1305>::from_slice(
        &nonce,
    );
    cipher
        .encrypt(nonce, plaintext)
        .map_err(|_| ChannelCryptoError::Encrypt)
}

/// Decrypt one frame payload.
pub fn decrypt_frame(
    key: &[u8; 32],
    direction: u8,
    counter: u64,
    ciphertext: &[u8],
) -> Result<Vec<u8>, ChannelCryptoError> {
    let cipher = chacha20poly1305::ChaCha20Poly1305::new_from_slice(key)
        .map_err(|_| ChannelCryptoError::Key)?;
    let nonce = nonce_bytes(direction, counter);
    let nonce = chacha20poly1305::aead::Nonce::<chacha20poly1305::ChaCha20Poly1305>::from_slice(
        &nonce,
    );
    cipher
        .decrypt(nonce, ciphertext)
        .map_err(|_| ChannelCryptoError::Decrypt)
}

#[derive(Debug, thiserror::Error)]
pub enum ChannelCryptoError {
    #[error("invalid key")]
    Key,
    #[error("encryption failed")]
    Encrypt,
    #[error("decryption failed")]
    Decrypt,
}

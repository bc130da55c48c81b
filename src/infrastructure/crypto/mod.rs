//! Encryption at rest for message content.
//!
//! ChaCha20-Poly1305 with a random 96-bit nonce per message. Stored blob
//! layout: `nonce (12 bytes) || ciphertext || tag (16 bytes)`.

use chacha20poly1305::{
    aead::{Aead, AeadCore, KeyInit, OsRng},
    ChaCha20Poly1305, Nonce,
};

const KEY_LEN: usize = 32;
const NONCE_LEN: usize = 12;
const TAG_LEN: usize = 16;

/// Encryption errors. Never carry plaintext.
#[derive(Debug, thiserror::Error)]
pub enum CryptoError {
    #[error("encryption key must be {expected} hex characters, got {actual}")]
    KeyLength { expected: usize, actual: usize },

    #[error("encryption key is not valid hex: {0}")]
    KeyEncoding(#[from] hex::FromHexError),

    #[error("encryption failed")]
    Encrypt,

    #[error("ciphertext too short: {0} bytes")]
    Truncated(usize),

    #[error("decryption failed: wrong key or tampered ciphertext")]
    Decrypt,

    #[error("decrypted content is not valid UTF-8")]
    Utf8,
}

/// Symmetric cipher for message content, built once at startup and shared.
#[derive(Clone)]
pub struct ContentCipher {
    cipher: ChaCha20Poly1305,
}

impl ContentCipher {
    pub fn new(key: &[u8; KEY_LEN]) -> Self {
        Self {
            cipher: ChaCha20Poly1305::new(key.into()),
        }
    }

    /// Create from a hex-encoded 32-byte key.
    pub fn from_hex(hex_key: &str) -> Result<Self, CryptoError> {
        let hex_key = hex_key.trim();
        if hex_key.len() != KEY_LEN * 2 {
            return Err(CryptoError::KeyLength {
                expected: KEY_LEN * 2,
                actual: hex_key.len(),
            });
        }

        let mut key = [0u8; KEY_LEN];
        hex::decode_to_slice(hex_key, &mut key)?;
        Ok(Self::new(&key))
    }

    /// Generate a fresh random key, hex encoded.
    pub fn generate_key_hex() -> String {
        hex::encode(ChaCha20Poly1305::generate_key(&mut OsRng))
    }

    pub fn encrypt(&self, plaintext: &str) -> Result<Vec<u8>, CryptoError> {
        let nonce = ChaCha20Poly1305::generate_nonce(&mut OsRng);
        let ciphertext = self
            .cipher
            .encrypt(&nonce, plaintext.as_bytes())
            .map_err(|_| CryptoError::Encrypt)?;

        let mut blob = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        blob.extend_from_slice(&nonce);
        blob.extend_from_slice(&ciphertext);
        Ok(blob)
    }

    pub fn decrypt(&self, blob: &[u8]) -> Result<String, CryptoError> {
        if blob.len() < NONCE_LEN + TAG_LEN {
            return Err(CryptoError::Truncated(blob.len()));
        }

        let (nonce, ciphertext) = blob.split_at(NONCE_LEN);
        let plaintext = self
            .cipher
            .decrypt(Nonce::from_slice(nonce), ciphertext)
            .map_err(|_| CryptoError::Decrypt)?;

        String::from_utf8(plaintext).map_err(|_| CryptoError::Utf8)
    }
}

impl std::fmt::Debug for ContentCipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("ContentCipher(..)")
    }
}

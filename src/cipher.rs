//! Encryption of private key material at rest.
//!
//! Keys are sealed as `base64(iv || aes256_cfb(plaintext))` with a key
//! derived from the operator secret by SHA-256, so secrets of any length are
//! accepted. The scheme carries no authentication tag: opening with the wrong
//! secret succeeds and yields garbage.

use aes::Aes256;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use cfb_mode::cipher::{AsyncStreamCipher, KeyIvInit};
use rand_core::{OsRng, RngCore};
use sha2::{Digest, Sha256};

use crate::error::CaError;

type Aes256CfbEnc = cfb_mode::Encryptor<Aes256>;
type Aes256CfbDec = cfb_mode::Decryptor<Aes256>;

/// AES block size, also the IV length.
pub const IV_SIZE: usize = 16;

/// Symmetric cipher for private keys. Cheap to share, holds only the key.
#[derive(Clone)]
pub struct KeyCipher {
    key: [u8; 32],
}

impl KeyCipher {
    pub fn new(secret: &str) -> Self {
        Self {
            key: Sha256::digest(secret.as_bytes()).into(),
        }
    }

    /// Encrypt `plaintext` under a fresh random IV.
    pub fn seal(&self, plaintext: &str) -> String {
        let mut iv = [0u8; IV_SIZE];
        OsRng.fill_bytes(&mut iv);

        let mut buffer = plaintext.as_bytes().to_vec();
        Aes256CfbEnc::new(&self.key.into(), &iv.into()).encrypt(&mut buffer);

        let mut combined = Vec::with_capacity(IV_SIZE + buffer.len());
        combined.extend_from_slice(&iv);
        combined.extend_from_slice(&buffer);
        STANDARD.encode(combined)
    }

    /// Reverse [`KeyCipher::seal`].
    pub fn open(&self, ciphertext: &str) -> Result<String, CaError> {
        let combined = STANDARD
            .decode(ciphertext)
            .map_err(|e| CaError::InvalidCiphertext(format!("base64 decode: {e}")))?;

        if combined.len() < IV_SIZE {
            return Err(CaError::InvalidCiphertext("encrypted text too small".into()));
        }

        let (iv, payload) = combined.split_at(IV_SIZE);
        let mut buffer = payload.to_vec();
        let iv: [u8; IV_SIZE] = iv
            .try_into()
            .map_err(|_| CaError::InvalidCiphertext("malformed IV".into()))?;
        Aes256CfbDec::new(&self.key.into(), &iv.into()).decrypt(&mut buffer);

        Ok(String::from_utf8_lossy(&buffer).into_owned())
    }
}

impl std::fmt::Debug for KeyCipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyCipher").finish_non_exhaustive()
    }
}

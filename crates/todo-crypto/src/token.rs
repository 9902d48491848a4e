use aes_gcm::{
    AesGcm, Key, Nonce, Tag,
    aead::{AeadInPlace, KeyInit, consts::U16},
    aes::Aes256,
};
use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use serde::{Serialize, de::DeserializeOwned};

use crate::error::{CryptoError, InvalidToken};
use crate::keys::{SECRET_KEY_LEN, fill_random};

/// AES-256-GCM with a 128-bit nonce.
type TokenAead = AesGcm<Aes256, U16>;

pub const NONCE_LEN: usize = 16;
pub const TAG_LEN: usize = 16;

/// Seals JSON payloads into opaque bearer tokens.
///
/// Wire format: `base64(nonce[16] || tag[16] || ciphertext)`.
pub struct TokenCipher {
    cipher: TokenAead,
}

impl TokenCipher {
    pub fn new(key: &[u8; SECRET_KEY_LEN]) -> Self {
        Self {
            cipher: TokenAead::new(Key::<TokenAead>::from_slice(key)),
        }
    }

    pub fn seal<T: Serialize>(&self, payload: &T) -> Result<String, CryptoError> {
        let mut buffer =
            serde_json::to_vec(payload).map_err(|e| CryptoError::Seal(e.to_string()))?;

        let mut nonce_bytes = [0u8; NONCE_LEN];
        fill_random(&mut nonce_bytes)?;
        let nonce = Nonce::<U16>::from_slice(&nonce_bytes);

        let tag = self
            .cipher
            .encrypt_in_place_detached(nonce, b"", &mut buffer)
            .map_err(|e| CryptoError::Seal(e.to_string()))?;

        let mut token = Vec::with_capacity(NONCE_LEN + TAG_LEN + buffer.len());
        token.extend_from_slice(&nonce_bytes);
        token.extend_from_slice(&tag);
        token.extend_from_slice(&buffer);
        Ok(BASE64.encode(token))
    }

    pub fn open<T: DeserializeOwned>(&self, token: &str) -> Result<T, InvalidToken> {
        let raw = BASE64.decode(token).map_err(|_| InvalidToken)?;
        if raw.len() < NONCE_LEN + TAG_LEN {
            return Err(InvalidToken);
        }

        let (nonce, rest) = raw.split_at(NONCE_LEN);
        let (tag, ciphertext) = rest.split_at(TAG_LEN);
        let mut buffer = ciphertext.to_vec();

        self.cipher
            .decrypt_in_place_detached(
                Nonce::<U16>::from_slice(nonce),
                b"",
                &mut buffer,
                Tag::from_slice(tag),
            )
            .map_err(|_| InvalidToken)?;

        serde_json::from_slice(&buffer).map_err(|_| InvalidToken)
    }
}

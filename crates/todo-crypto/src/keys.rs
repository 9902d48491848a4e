use aes_gcm::aead::OsRng;
use aes_gcm::aead::rand_core::RngCore;
use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};

use crate::error::CryptoError;

pub const SECRET_KEY_LEN: usize = 32;

/// Generate a random 256-bit server secret for the token cipher.
pub fn generate_secret_key() -> Result<[u8; SECRET_KEY_LEN], CryptoError> {
    let mut key = [0u8; SECRET_KEY_LEN];
    fill_random(&mut key)?;
    Ok(key)
}

/// Encode a key to base64 for configuration files.
pub fn key_to_base64(key: &[u8; SECRET_KEY_LEN]) -> String {
    BASE64.encode(key)
}

/// Decode a base64 key, rejecting anything that is not exactly 32 bytes.
pub fn key_from_base64(encoded: &str) -> Result<[u8; SECRET_KEY_LEN], CryptoError> {
    let bytes = BASE64
        .decode(encoded.trim())
        .map_err(|e| CryptoError::InvalidKey(format!("not base64: {e}")))?;
    bytes
        .try_into()
        .map_err(|_| CryptoError::InvalidKey(format!("expected {SECRET_KEY_LEN} bytes")))
}

pub(crate) fn fill_random(dest: &mut [u8]) -> Result<(), CryptoError> {
    OsRng
        .try_fill_bytes(dest)
        .map_err(|e| CryptoError::Random(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_base64_roundtrip() {
        let key = generate_secret_key().unwrap();
        let encoded = key_to_base64(&key);
        assert_eq!(key_from_base64(&encoded).unwrap(), key);
    }

    #[test]
    fn short_key_is_rejected() {
        let encoded = BASE64.encode([7u8; 16]);
        assert!(key_from_base64(&encoded).is_err());
        assert!(key_from_base64("not base64!").is_err());
    }
}

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("OS random number generator failed: {0}")]
    Random(String),

    #[error("Key derivation failed: {0}")]
    Kdf(String),

    #[error("Token sealing failed: {0}")]
    Seal(String),

    #[error("Invalid secret key: {0}")]
    InvalidKey(String),
}

/// The only failure `TokenCipher::open` reports. Callers cannot tell a bad
/// encoding from a failed tag check or an unexpected payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("invalid authentication token")]
pub struct InvalidToken;

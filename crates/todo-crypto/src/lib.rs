/// Todo Crypto Library
///
/// Two primitives back the authentication layer:
/// - `password`: Argon2id key derivation over a per-user salt, verified in constant time
/// - `token`: AES-256-GCM sealing of session identifiers into opaque bearer tokens
///
/// Neither module knows about users or sessions; callers own that mapping.

pub mod error;
pub mod keys;
pub mod password;
pub mod token;

pub use error::{CryptoError, InvalidToken};
pub use password::{HASH_LEN, HashParams, Hasher, SALT_LEN};
pub use token::TokenCipher;

use argon2::{Algorithm, Argon2, Params, Version};

use crate::error::CryptoError;
use crate::keys::fill_random;

pub const SALT_LEN: usize = 16;
pub const HASH_LEN: usize = 64;

/// Argon2id cost parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HashParams {
    /// Memory cost in KiB.
    pub memory_kib: u32,
    pub iterations: u32,
    pub parallelism: u32,
}

impl Default for HashParams {
    /// 16 MiB, matching the footprint of scrypt at N=16384, r=8.
    fn default() -> Self {
        Self {
            memory_kib: 16 * 1024,
            iterations: 2,
            parallelism: 1,
        }
    }
}

/// Derives and verifies fixed-size password digests.
#[derive(Debug, Clone)]
pub struct Hasher {
    params: Params,
}

impl Hasher {
    pub fn new(params: HashParams) -> Result<Self, CryptoError> {
        let params = Params::new(
            params.memory_kib,
            params.iterations,
            params.parallelism,
            Some(HASH_LEN),
        )
        .map_err(|e| CryptoError::Kdf(e.to_string()))?;
        Ok(Self { params })
    }

    /// Fresh random salt from the OS CSPRNG.
    pub fn salt(&self) -> Result<[u8; SALT_LEN], CryptoError> {
        let mut salt = [0u8; SALT_LEN];
        fill_random(&mut salt)?;
        Ok(salt)
    }

    pub fn hash(&self, password: &str, salt: &[u8; SALT_LEN]) -> Result<[u8; HASH_LEN], CryptoError> {
        let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, self.params.clone());
        let mut out = [0u8; HASH_LEN];
        argon2
            .hash_password_into(password.as_bytes(), salt, &mut out)
            .map_err(|e| CryptoError::Kdf(e.to_string()))?;
        Ok(out)
    }

    /// Recompute the digest for `password` and compare it to `expected`
    /// without early exit.
    pub fn verify(
        &self,
        password: &str,
        salt: &[u8; SALT_LEN],
        expected: &[u8],
    ) -> Result<bool, CryptoError> {
        let actual = self.hash(password, salt)?;
        Ok(constant_time_eq(&actual, expected))
    }
}

/// Constant-time byte comparison to prevent timing attacks.
pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut diff = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        diff |= x ^ y;
    }
    diff == 0
}

use argon2::{Algorithm, Argon2, Params, Version};
use zeroize::Zeroizing;

use super::Parameters;
use crate::error::{Error, Result};

/// Derives a key of `params.key_length()` bytes from a password and salt.
///
/// Implementations must be deterministic for fixed inputs.
pub trait KeyDerivation {
    fn derive_key(
        &self,
        password: &[u8],
        salt: &[u8],
        params: &Parameters,
    ) -> Result<Zeroizing<Vec<u8>>>;
}

impl<T: KeyDerivation + ?Sized> KeyDerivation for &T {
    fn derive_key(
        &self,
        password: &[u8],
        salt: &[u8],
        params: &Parameters,
    ) -> Result<Zeroizing<Vec<u8>>> {
        (**self).derive_key(password, salt, params)
    }
}

/// Argon2id, version 0x13, as specified by RFC 9106.
#[derive(Debug, Clone, Copy, Default)]
pub struct Argon2id;

impl KeyDerivation for Argon2id {
    fn derive_key(
        &self,
        password: &[u8],
        salt: &[u8],
        params: &Parameters,
    ) -> Result<Zeroizing<Vec<u8>>> {
        let key_len = params.key_length() as usize;

        let argon2_params = Params::new(
            params.memory_cost(),
            params.time_cost(),
            u32::from(params.parallelism()),
            Some(key_len),
        )
        .map_err(|e| Error::Kdf(format!("failed to construct Argon2 params: {e}")))?;

        let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, argon2_params);

        let mut key = Zeroizing::new(vec![0u8; key_len]);
        argon2
            .hash_password_into(password, salt, &mut key)
            .map_err(|e| Error::Kdf(e.to_string()))?;

        Ok(key)
    }
}

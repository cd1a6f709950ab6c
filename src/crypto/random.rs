use getrandom::fill;

use crate::error::{Error, Result};

/// A cryptographically secure byte source.
pub trait SecureRandom {
    /// Fills `dest` completely or reports why it could not.
    fn fill_bytes(&self, dest: &mut [u8]) -> Result<()>;

    fn random_bytes(&self, len: usize) -> Result<Vec<u8>> {
        let mut buf = vec![0u8; len];
        self.fill_bytes(&mut buf)?;
        Ok(buf)
    }
}

impl<T: SecureRandom + ?Sized> SecureRandom for &T {
    fn fill_bytes(&self, dest: &mut [u8]) -> Result<()> {
        (**self).fill_bytes(dest)
    }
}

/// The operating system CSPRNG.
#[derive(Debug, Clone, Copy, Default)]
pub struct OsRandom;

impl SecureRandom for OsRandom {
    fn fill_bytes(&self, dest: &mut [u8]) -> Result<()> {
        fill(dest).map_err(|e| Error::RandomSource(format!("OS random generator failed: {e}")))
    }
}

//! Self-describing Argon2id password hashes.
//!
//! A hash is stored as one opaque byte string: an 18 byte parameter header,
//! the random salt, and the derived key. Validation reads the parameters
//! back from the header, so stored hashes need no outside metadata and old
//! hashes keep working when the defaults change.
//!
//! ```no_run
//! use argon2_envelope::{Parameters, derive, validate};
//!
//! let hash = derive("correct horse", Parameters::DEFAULT)?;
//! assert!(validate("correct horse", hash.as_bytes()));
//! # Ok::<(), argon2_envelope::Error>(())
//! ```

pub mod crypto;
pub mod envelope;
mod error;
mod sql;
pub mod storage;

pub use crate::crypto::{
    Argon2id, HEADER_LEN, KeyDerivation, OsRandom, Parameters, SecureRandom,
};
pub use crate::envelope::{Envelope, HashEngine, check_structure, extract_key, extract_salt};
pub use crate::error::{Error, Result};
pub use crate::storage::Storage;

/// Hashes `password` with OS randomness and Argon2id.
///
/// # Errors
///
/// Fails if the OS random source is unavailable or Argon2id rejects
/// `params`.
pub fn derive(password: &str, params: Parameters) -> Result<Envelope> {
    HashEngine::new().derive(password, params)
}

/// Checks `password` against stored hash bytes.
///
/// Returns `false` for a wrong password and for empty, truncated or
/// otherwise malformed input alike; inputs too short to carry a header are
/// checked against a stand-in built from [`Parameters::DEFAULT`].
pub fn validate(password: &str, envelope: &[u8]) -> bool {
    HashEngine::new().validate(password, envelope)
}

use thiserror::Error;

/// Errors surfaced by hashing and by the storage boundary.
///
/// Validation never produces one of these: a malformed envelope is simply
/// a password that does not match.
#[derive(Debug, Error)]
pub enum Error {
    /// The secure random source could not fill the requested bytes.
    #[error("secure random source unavailable: {0}")]
    RandomSource(String),

    /// Stored bytes are too short for a header, or their length disagrees
    /// with the length the header declares.
    #[error("invalid Argon2 hash length, got: {got}, expected: {expected}")]
    StructuralMismatch { got: usize, expected: u64 },

    /// A stored value is neither raw bytes nor text.
    #[error("unable to read value of type {0} as an Argon2 hash")]
    UnsupportedInputType(String),

    /// Argon2id rejected the parameters.
    #[error("argon2 key derivation failed: {0}")]
    Kdf(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

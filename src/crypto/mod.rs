//! Cryptographic building blocks of the hash envelope.
//!
//! Provides the parameter header codec, the Argon2id key derivation and the
//! secure random source.

pub mod header;
pub mod kdf;
pub mod random;

pub use header::Parameters;
pub use kdf::{Argon2id, KeyDerivation};
pub use random::{OsRandom, SecureRandom};

/// Length of the memory cost field (4 bytes).
pub const MEM_LEN: usize = 4;
/// Length of the time cost field (4 bytes).
pub const TIME_LEN: usize = 4;
/// Length of the parallelism field (2 bytes, widened from 8 bits).
pub const PAR_LEN: usize = 2;
/// Length of the salt length field (4 bytes).
pub const SALT_LEN_LEN: usize = 4;
/// Length of the key length field (4 bytes).
pub const KEY_LEN_LEN: usize = 4;
/// Length of the serialized parameter header (18 bytes).
pub const HEADER_LEN: usize = MEM_LEN + TIME_LEN + PAR_LEN + SALT_LEN_LEN + KEY_LEN_LEN;

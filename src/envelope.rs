//! Self-describing password hashes.
//!
//! ```text
//! HEADER (18) | SALT (salt_length) | KEY (key_length)
//! ```
//!
//! The header carries every parameter needed to recompute the key, so a
//! stored hash can be checked without any outside metadata.

use subtle::{Choice, ConstantTimeEq};
use tracing::debug;
use zeroize::Zeroizing;

use crate::crypto::{Argon2id, HEADER_LEN, KeyDerivation, OsRandom, Parameters, SecureRandom};
use crate::error::{Error, Result};

/// Largest replacement material built for a header that disagrees with the
/// length of its envelope. Bigger claims are replaced by the fallback shape.
const MAX_DECOY_LEN: u64 = 1 << 20;

/// Whether a header known to be forged asks for more than the fallback
/// costs, or for more decoy material than [`MAX_DECOY_LEN`].
fn exceeds_fallback(claimed: &Parameters, fallback: &Parameters) -> bool {
    claimed.envelope_len() > MAX_DECOY_LEN
        || claimed.memory_cost() > fallback.memory_cost()
        || claimed.time_cost() > fallback.time_cost()
}

/// An immutable Argon2id hash: header, salt and derived key.
///
/// An empty envelope stands for "no hash stored"; it never validates.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Envelope {
    bytes: Vec<u8>,
}

impl Envelope {
    /// The absent envelope.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Accepts externally stored bytes after checking their structure.
    ///
    /// Empty input yields the absent envelope.
    ///
    /// # Errors
    ///
    /// Returns [`Error::StructuralMismatch`] if the bytes are shorter than a
    /// header or their length disagrees with the header.
    pub fn from_bytes(bytes: impl Into<Vec<u8>>) -> Result<Self> {
        let bytes = bytes.into();
        if !bytes.is_empty() {
            check_structure(&bytes)?;
        }
        Ok(Self { bytes })
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    /// Parameters embedded in the header, `None` for the absent envelope.
    pub fn header(&self) -> Option<Parameters> {
        parse_header(&self.bytes)
    }

    pub fn salt(&self) -> &[u8] {
        extract_salt(&self.bytes)
    }

    pub fn key(&self) -> &[u8] {
        extract_key(&self.bytes)
    }

    /// Checks `password` against this hash with the default engine.
    pub fn validate(&self, password: &str) -> bool {
        HashEngine::new().validate(password, &self.bytes)
    }
}

impl AsRef<[u8]> for Envelope {
    fn as_ref(&self) -> &[u8] {
        &self.bytes
    }
}

/// Verifies that `bytes` is exactly as long as its own header declares.
pub fn check_structure(bytes: &[u8]) -> Result<()> {
    let Some(params) = parse_header(bytes) else {
        return Err(Error::StructuralMismatch {
            got: bytes.len(),
            expected: HEADER_LEN as u64,
        });
    };

    if bytes.len() as u64 != params.envelope_len() {
        return Err(Error::StructuralMismatch {
            got: bytes.len(),
            expected: params.envelope_len(),
        });
    }

    Ok(())
}

/// Returns the salt of a raw envelope.
///
/// Empty if the input is shorter than a header; clamped if it is truncated.
pub fn extract_salt(bytes: &[u8]) -> &[u8] {
    let Some(params) = parse_header(bytes) else {
        return &[];
    };
    let end = HEADER_LEN
        .saturating_add(params.salt_length() as usize)
        .min(bytes.len());
    &bytes[HEADER_LEN..end]
}

/// Returns the derived key of a raw envelope.
///
/// Empty if the input is shorter than a header; clamped if it is truncated.
pub fn extract_key(bytes: &[u8]) -> &[u8] {
    let Some(params) = parse_header(bytes) else {
        return &[];
    };
    let start = HEADER_LEN
        .saturating_add(params.salt_length() as usize)
        .min(bytes.len());
    let end = start
        .saturating_add(params.key_length() as usize)
        .min(bytes.len());
    &bytes[start..end]
}

fn parse_header(bytes: &[u8]) -> Option<Parameters> {
    bytes
        .first_chunk::<HEADER_LEN>()
        .map(Parameters::from_header)
}

/// Creates and checks envelopes.
///
/// The random source and the key derivation are injected; `fallback`
/// shapes the stand-in envelope used when a stored value is too short to
/// describe itself.
#[derive(Debug, Clone)]
pub struct HashEngine<R = OsRandom, K = Argon2id> {
    rng: R,
    kdf: K,
    fallback: Parameters,
}

impl HashEngine {
    /// OS randomness, Argon2id and [`Parameters::DEFAULT`] as fallback.
    pub fn new() -> Self {
        Self::with_parts(OsRandom, Argon2id, Parameters::DEFAULT)
    }
}

impl Default for HashEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl<R: SecureRandom, K: KeyDerivation> HashEngine<R, K> {
    pub fn with_parts(rng: R, kdf: K, fallback: Parameters) -> Self {
        Self { rng, kdf, fallback }
    }

    pub fn fallback(&self) -> Parameters {
        self.fallback
    }

    /// Hashes `password` under `params` with a fresh random salt.
    ///
    /// # Errors
    ///
    /// Returns [`Error::RandomSource`] if no salt could be generated, or
    /// [`Error::Kdf`] if Argon2id rejects the parameters.
    pub fn derive(&self, password: &str, params: Parameters) -> Result<Envelope> {
        let salt = Zeroizing::new(self.rng.random_bytes(params.salt_length() as usize)?);
        let key = self.kdf.derive_key(password.as_bytes(), &salt, &params)?;

        if key.len() != params.key_length() as usize {
            return Err(Error::Kdf(format!(
                "expected {} key bytes, got {}",
                params.key_length(),
                key.len()
            )));
        }

        let mut bytes = Vec::with_capacity(params.envelope_len() as usize);
        bytes.extend_from_slice(&params.to_header());
        bytes.extend_from_slice(&salt);
        bytes.extend_from_slice(&key);

        debug!(
            memory_cost = params.memory_cost(),
            time_cost = params.time_cost(),
            parallelism = params.parallelism(),
            len = bytes.len(),
            "derived password hash"
        );

        Ok(Envelope { bytes })
    }

    /// Checks `password` against a stored envelope.
    ///
    /// Every input, however malformed, costs one key derivation and one
    /// full-length comparison, so the running time does not reveal whether
    /// the envelope was damaged or the password was wrong. Material that
    /// had to be synthesized never validates.
    pub fn validate(&self, password: &str, envelope: &[u8]) -> bool {
        let mut buf = Zeroizing::new(envelope.to_vec());
        let mut forged = Choice::from(0);

        let mut params = match parse_header(&buf) {
            Some(params) => params,
            None => {
                forged |= Choice::from(1);
                buf = self.decoy(&self.fallback);
                self.fallback
            }
        };

        if buf.len() as u64 != params.envelope_len() {
            forged |= Choice::from(1);
            if exceeds_fallback(&params, &self.fallback) {
                params = self.fallback;
            }
            buf = self.decoy(&params);
        }

        let (salt, stored) = buf[HEADER_LEN..].split_at(params.salt_length() as usize);

        let candidate = match self.kdf.derive_key(password.as_bytes(), salt, &params) {
            Ok(key) => key,
            Err(_) => {
                forged |= Choice::from(1);
                self.decoy_key(password)
            }
        };

        bool::from(fixed_time_eq(&candidate, stored) & !forged)
    }

    /// Header for `params` followed by random salt and key material.
    fn decoy(&self, params: &Parameters) -> Zeroizing<Vec<u8>> {
        let mut buf = Zeroizing::new(vec![0u8; params.envelope_len() as usize]);
        buf[..HEADER_LEN].copy_from_slice(&params.to_header());
        // on failure the caller's result is already forced to false
        let _ = self.rng.fill_bytes(&mut buf[HEADER_LEN..]);
        buf
    }

    /// Pays for one derivation under the fallback parameters.
    fn decoy_key(&self, password: &str) -> Zeroizing<Vec<u8>> {
        let decoy = self.decoy(&self.fallback);
        let salt_end = HEADER_LEN + self.fallback.salt_length() as usize;
        self.kdf
            .derive_key(password.as_bytes(), &decoy[HEADER_LEN..salt_end], &self.fallback)
            .unwrap_or_else(|_| Zeroizing::new(Vec::new()))
    }
}

/// Compares every byte of the longer input; a length difference only
/// flips the result after the full pass.
fn fixed_time_eq(a: &[u8], b: &[u8]) -> Choice {
    let same_len = (a.len() as u64).ct_eq(&(b.len() as u64));
    let mut acc = Choice::from(1);

    for i in 0..a.len().max(b.len()) {
        let x = a.get(i).copied().unwrap_or(0);
        let y = b.get(i).copied().unwrap_or(0);
        acc &= x.ct_eq(&y);
    }

    acc & same_len
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::{Cell, RefCell};

    const FAST: Parameters = Parameters::new(256, 1, 1, 16, 32);
    const PASSWORD: &str = "Sup3rS3cuReP4$.Phr4$e!";

    fn fast_engine() -> HashEngine {
        HashEngine::with_parts(OsRandom, Argon2id, FAST)
    }

    /// Cheap deterministic stand-in for Argon2id that records its calls.
    #[derive(Default)]
    struct CountingKdf {
        calls: Cell<usize>,
        seen: RefCell<Vec<Parameters>>,
    }

    impl KeyDerivation for CountingKdf {
        fn derive_key(
            &self,
            password: &[u8],
            salt: &[u8],
            params: &Parameters,
        ) -> Result<Zeroizing<Vec<u8>>> {
            self.calls.set(self.calls.get() + 1);
            self.seen.borrow_mut().push(*params);
            if params.memory_cost() == 0 {
                return Err(Error::Kdf("memory cost is too small".into()));
            }

            let key = (0..params.key_length() as usize)
                .map(|i| {
                    let p = password.get(i % password.len().max(1)).copied().unwrap_or(0);
                    let s = salt.get(i % salt.len().max(1)).copied().unwrap_or(0);
                    p ^ s ^ i as u8
                })
                .collect();
            Ok(Zeroizing::new(key))
        }
    }

    /// Always returns the same key regardless of input.
    struct ConstantKdf(u8);

    impl KeyDerivation for ConstantKdf {
        fn derive_key(
            &self,
            _password: &[u8],
            _salt: &[u8],
            params: &Parameters,
        ) -> Result<Zeroizing<Vec<u8>>> {
            Ok(Zeroizing::new(vec![self.0; params.key_length() as usize]))
        }
    }

    struct FixedRandom(u8);

    impl SecureRandom for FixedRandom {
        fn fill_bytes(&self, dest: &mut [u8]) -> Result<()> {
            dest.fill(self.0);
            Ok(())
        }
    }

    /// Scribbles over the buffer, then reports failure.
    struct FailingRandom;

    impl SecureRandom for FailingRandom {
        fn fill_bytes(&self, dest: &mut [u8]) -> Result<()> {
            dest.fill(0x5a);
            Err(Error::RandomSource("entropy pool unavailable".into()))
        }
    }

    // --------------------------------------------------
    // DERIVE
    // --------------------------------------------------

    #[test]
    fn derive_layout_follows_params() {
        let envelope = fast_engine().derive(PASSWORD, FAST).unwrap();

        assert_eq!(envelope.len() as u64, FAST.envelope_len());
        assert_eq!(&envelope.as_bytes()[..HEADER_LEN], &FAST.to_header());
        assert_eq!(envelope.header(), Some(FAST));
        assert_eq!(envelope.salt().len(), 16);
        assert_eq!(envelope.key().len(), 32);
    }

    #[test]
    fn derive_uses_injected_salt() {
        let kdf = CountingKdf::default();
        let engine = HashEngine::with_parts(FixedRandom(0x11), &kdf, FAST);

        let envelope = engine.derive("pw", FAST).unwrap();

        assert_eq!(envelope.salt(), &[0x11; 16]);
        assert_eq!(kdf.calls.get(), 1);
    }

    #[test]
    fn derive_salts_differ() {
        let engine = fast_engine();
        let a = engine.derive("pw", FAST).unwrap();
        let b = engine.derive("pw", FAST).unwrap();

        assert_ne!(a.salt(), b.salt());
        assert_ne!(a.key(), b.key());
    }

    #[test]
    fn derive_fails_when_random_source_fails() {
        let kdf = CountingKdf::default();
        let engine = HashEngine::with_parts(FailingRandom, &kdf, FAST);

        assert!(matches!(
            engine.derive("pw", FAST),
            Err(Error::RandomSource(_))
        ));
        assert_eq!(kdf.calls.get(), 0);
    }

    #[test]
    fn derive_surfaces_rejected_params() {
        let degenerate = Parameters::new(0, 1, 1, 16, 32);
        assert!(matches!(
            fast_engine().derive("pw", degenerate),
            Err(Error::Kdf(_))
        ));
    }

    #[test]
    fn derive_with_default_params() {
        let envelope = crate::derive(PASSWORD, Parameters::DEFAULT).unwrap();

        assert_eq!(envelope.len(), 18 + 32 + 32);
        assert!(envelope.validate(PASSWORD));
    }

    // --------------------------------------------------
    // VALIDATE
    // --------------------------------------------------

    #[test]
    fn correct_password_validates() {
        let engine = fast_engine();
        let envelope = engine.derive(PASSWORD, FAST).unwrap();

        assert!(engine.validate(PASSWORD, envelope.as_bytes()));
    }

    #[test]
    fn wrong_password_fails() {
        let engine = fast_engine();
        let envelope = engine.derive("correct", FAST).unwrap();

        assert!(!engine.validate("wrong", envelope.as_bytes()));
    }

    #[test]
    fn empty_password_roundtrips() {
        let engine = fast_engine();
        let envelope = engine.derive("", FAST).unwrap();

        assert!(engine.validate("", envelope.as_bytes()));
        assert!(!engine.validate(" ", envelope.as_bytes()));
    }

    #[test]
    fn any_flipped_key_byte_fails() {
        let engine = fast_engine();
        let envelope = engine.derive(PASSWORD, FAST).unwrap();
        let key_start = HEADER_LEN + FAST.salt_length() as usize;

        for i in key_start..envelope.len() {
            let mut tampered = envelope.as_bytes().to_vec();
            tampered[i] ^= 0x01;
            assert!(!engine.validate(PASSWORD, &tampered), "byte {i} flipped");
        }
    }

    #[test]
    fn flipped_salt_byte_fails() {
        let engine = fast_engine();
        let envelope = engine.derive(PASSWORD, FAST).unwrap();

        let mut tampered = envelope.into_bytes();
        tampered[HEADER_LEN] ^= 0x80;
        assert!(!engine.validate(PASSWORD, &tampered));
    }

    #[test]
    fn malformed_input_returns_false() {
        let engine = fast_engine();
        let envelope = engine.derive(PASSWORD, FAST).unwrap();
        let bytes = envelope.as_bytes();

        assert!(!engine.validate(PASSWORD, &[]));
        assert!(!engine.validate(PASSWORD, &[0x00, 0x00, 0x00]));
        assert!(!engine.validate(PASSWORD, &bytes[..HEADER_LEN]));
        assert!(!engine.validate(PASSWORD, &bytes[..bytes.len() - 1]));

        let mut extended = bytes.to_vec();
        extended.push(0);
        assert!(!engine.validate(PASSWORD, &extended));
    }

    #[test]
    fn header_claiming_other_lengths_fails() {
        let engine = fast_engine();
        let envelope = engine.derive(PASSWORD, FAST).unwrap();

        let mut tampered = envelope.into_bytes();
        tampered[10] = 8; // salt length 16 -> 8
        assert!(!engine.validate(PASSWORD, &tampered));
    }

    #[test]
    fn header_with_huge_lengths_fails() {
        let kdf = CountingKdf::default();
        let engine = HashEngine::with_parts(OsRandom, &kdf, FAST);
        let claimed = Parameters::new(256, 1, 1, u32::MAX, u32::MAX);

        let mut bytes = claimed.to_header().to_vec();
        bytes.extend_from_slice(&[0xff; 4]);

        assert!(!engine.validate(PASSWORD, &bytes));
        assert_eq!(kdf.calls.get(), 1);
        assert_eq!(kdf.seen.borrow()[0], FAST);
    }

    #[test]
    fn huge_cost_claim_on_short_body_uses_fallback() {
        let kdf = CountingKdf::default();
        let engine = HashEngine::with_parts(OsRandom, &kdf, FAST);

        for claimed in [
            Parameters::new(u32::MAX, 1, 1, 1, 1),
            Parameters::new(256, u32::MAX, 1, 1, 1),
        ] {
            kdf.calls.set(0);
            kdf.seen.borrow_mut().clear();

            let mut bytes = claimed.to_header().to_vec();
            bytes.push(0x01);

            assert!(!engine.validate(PASSWORD, &bytes));
            assert_eq!(kdf.calls.get(), 1);
            assert_eq!(kdf.seen.borrow()[0], FAST);
        }
    }

    #[test]
    fn huge_cost_claim_runs_real_argon2_with_fallback() {
        let claimed = Parameters::new(u32::MAX, u32::MAX, 1, 1, 1);
        let mut bytes = claimed.to_header().to_vec();
        bytes.push(0x01);

        assert!(!fast_engine().validate(PASSWORD, &bytes));
    }

    #[test]
    fn params_rejected_by_argon2_fail() {
        let degenerate = Parameters::new(0, 0, 0, 16, 32);
        let mut bytes = degenerate.to_header().to_vec();
        bytes.extend_from_slice(&[7u8; 48]);

        assert!(!fast_engine().validate(PASSWORD, &bytes));
    }

    #[test]
    fn short_input_pays_one_derivation_with_fallback() {
        let kdf = CountingKdf::default();
        let engine = HashEngine::with_parts(OsRandom, &kdf, FAST);

        assert!(!engine.validate("pw", &[]));

        assert_eq!(kdf.calls.get(), 1);
        assert_eq!(kdf.seen.borrow()[0], FAST);
    }

    #[test]
    fn wrong_password_pays_one_derivation() {
        let kdf = CountingKdf::default();
        let engine = HashEngine::with_parts(OsRandom, &kdf, FAST);
        let envelope = engine.derive("right", FAST).unwrap();
        kdf.calls.set(0);

        assert!(!engine.validate("wrong", envelope.as_bytes()));
        assert!(engine.validate("right", envelope.as_bytes()));

        assert_eq!(kdf.calls.get(), 2);
    }

    #[test]
    fn length_mismatch_pays_one_derivation_with_parsed_params() {
        let kdf = CountingKdf::default();
        let engine = HashEngine::with_parts(OsRandom, &kdf, FAST);
        let claimed = Parameters::new(128, 1, 1, 8, 24);

        let mut bytes = claimed.to_header().to_vec();
        bytes.extend_from_slice(&[1u8; 5]);

        assert!(!engine.validate("pw", &bytes));
        assert_eq!(kdf.calls.get(), 1);
        assert_eq!(kdf.seen.borrow()[0], claimed);
    }

    #[test]
    fn rejected_params_still_pay_fallback_derivation() {
        let kdf = CountingKdf::default();
        let engine = HashEngine::with_parts(OsRandom, &kdf, FAST);
        let degenerate = Parameters::new(0, 1, 1, 16, 32);

        let mut bytes = degenerate.to_header().to_vec();
        bytes.extend_from_slice(&[3u8; 48]);

        assert!(!engine.validate("pw", &bytes));
        assert_eq!(kdf.seen.borrow().last(), Some(&FAST));
    }

    #[test]
    fn synthesized_material_never_validates() {
        // The decoy key equals what the KDF returns, yet validation must fail.
        let engine = HashEngine::with_parts(FixedRandom(0xab), ConstantKdf(0xab), FAST);

        assert!(!engine.validate("pw", &[]));
        assert!(!engine.validate("pw", &FAST.to_header()));
    }

    #[test]
    fn failing_random_source_never_validates() {
        let kdf = CountingKdf::default();
        let engine = HashEngine::with_parts(FailingRandom, &kdf, FAST);

        assert!(!engine.validate("pw", &[1, 2, 3]));
        assert_eq!(kdf.calls.get(), 1);
    }

    #[test]
    fn validate_does_not_touch_input() {
        let engine = fast_engine();
        let envelope = engine.derive(PASSWORD, FAST).unwrap();
        let before = envelope.clone();

        engine.validate("other", envelope.as_bytes());
        assert_eq!(envelope, before);
    }

    // --------------------------------------------------
    // STRUCTURE AND ACCESSORS
    // --------------------------------------------------

    #[test]
    fn from_bytes_accepts_empty_as_absent() {
        let envelope = Envelope::from_bytes(Vec::new()).unwrap();

        assert!(envelope.is_empty());
        assert_eq!(envelope.header(), None);
        assert!(!envelope.validate(PASSWORD));
    }

    #[test]
    fn from_bytes_rejects_short_input() {
        match Envelope::from_bytes(vec![0u8; 3]) {
            Err(Error::StructuralMismatch { got, expected }) => {
                assert_eq!(got, 3);
                assert_eq!(expected, 18);
            }
            other => panic!("expected StructuralMismatch, got: {other:?}"),
        }
    }

    #[test]
    fn from_bytes_rejects_truncated_input() {
        let envelope = fast_engine().derive(PASSWORD, FAST).unwrap();
        let bytes = envelope.as_bytes();

        match Envelope::from_bytes(&bytes[..bytes.len() - 1]) {
            Err(Error::StructuralMismatch { got, expected }) => {
                assert_eq!(got, bytes.len() - 1);
                assert_eq!(expected, FAST.envelope_len());
            }
            other => panic!("expected StructuralMismatch, got: {other:?}"),
        }
    }

    #[test]
    fn from_bytes_accepts_consistent_input() {
        let envelope = fast_engine().derive(PASSWORD, FAST).unwrap();
        let parsed = Envelope::from_bytes(envelope.as_bytes()).unwrap();

        assert_eq!(parsed, envelope);
    }

    #[test]
    fn extractors_on_short_input_are_empty() {
        assert!(extract_salt(&[1, 2, 3]).is_empty());
        assert!(extract_key(&[1, 2, 3]).is_empty());
        assert!(Envelope::empty().salt().is_empty());
        assert!(Envelope::empty().key().is_empty());
    }

    #[test]
    fn extractors_clamp_truncated_input() {
        let mut bytes = Parameters::new(8, 1, 1, 4, 4).to_header().to_vec();
        bytes.extend_from_slice(&[1, 2, 3, 4, 5, 6]);

        assert_eq!(extract_salt(&bytes), &[1, 2, 3, 4]);
        assert_eq!(extract_key(&bytes), &[5, 6]);
        assert!(extract_key(&bytes[..HEADER_LEN + 2]).is_empty());
    }

    // --------------------------------------------------
    // FIXED-TIME COMPARE
    // --------------------------------------------------

    #[test]
    fn fixed_time_eq_matches_plain_equality() {
        assert!(bool::from(fixed_time_eq(b"abc", b"abc")));
        assert!(bool::from(fixed_time_eq(b"", b"")));
        assert!(!bool::from(fixed_time_eq(b"abc", b"abd")));
        assert!(!bool::from(fixed_time_eq(b"abc", b"ab")));
        assert!(!bool::from(fixed_time_eq(b"ab\0", b"ab")));
    }
}

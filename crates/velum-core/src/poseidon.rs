//! Two-input Poseidon hashing over BN254, circom-parameterized.
//!
//! The membership circuit, the contract verifier and this crate must agree
//! on the exact Poseidon instantiation; `light-poseidon` with circom
//! parameters is the same construction the circuit toolchain uses.

use ark_bn254::Fr;
use ark_ff::{BigInteger, PrimeField};
use light_poseidon::{Poseidon, PoseidonHasher};

use crate::constants::DIGEST_LEN;
use crate::types::{CoreError, Digest};

/// Interprets a digest as a BN254 scalar, reducing modulo the field order.
pub fn digest_to_fr(digest: &Digest) -> Fr {
    Fr::from_be_bytes_mod_order(digest.as_bytes())
}

/// Encodes a BN254 scalar as a 32-byte big-endian digest.
pub fn fr_to_digest(value: Fr) -> Digest {
    let bytes = value.into_bigint().to_bytes_be();
    let mut arr = [0u8; DIGEST_LEN];
    arr[DIGEST_LEN - bytes.len()..].copy_from_slice(&bytes);
    Digest(arr)
}

/// A reusable two-input Poseidon hasher.
///
/// Parameter setup is not free; callers hashing in a loop (tree builds)
/// should construct one instance and reuse it.
pub struct Poseidon2 {
    inner: Poseidon<Fr>,
}

impl Poseidon2 {
    /// Creates a hasher with the circom parameter set for arity 2.
    pub fn new() -> Result<Self, CoreError> {
        let inner = Poseidon::<Fr>::new_circom(2).map_err(|e| CoreError::Hashing(e.to_string()))?;
        Ok(Self { inner })
    }

    /// Hashes two field elements.
    pub fn hash_fr(&mut self, left: Fr, right: Fr) -> Result<Fr, CoreError> {
        self.inner
            .hash(&[left, right])
            .map_err(|e| CoreError::Hashing(e.to_string()))
    }

    /// Hashes two digests, reducing each into the field first.
    pub fn hash(&mut self, left: &Digest, right: &Digest) -> Result<Digest, CoreError> {
        let out = self.hash_fr(digest_to_fr(left), digest_to_fr(right))?;
        Ok(fr_to_digest(out))
    }
}

/// One-shot convenience for `Poseidon(left, right)`.
pub fn hash2(left: &Digest, right: &Digest) -> Result<Digest, CoreError> {
    Poseidon2::new()?.hash(left, right)
}

/// Computes an eligibility-tree leaf: `Poseidon(identitySecret, pollId)`.
///
/// Binding the secret to the poll id is what makes the same voter's leaf
/// (and nullifier) unrelated across polls, preventing cross-poll
/// correlation.
pub fn leaf_hash(identity_secret: &Digest, poll_id: &Digest) -> Result<Digest, CoreError> {
    hash2(identity_secret, poll_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matches_circom_test_vector() {
        // poseidon([1, 2]) from circomlibjs.
        let out = hash2(&Digest::from_u64(1), &Digest::from_u64(2)).unwrap();
        assert_eq!(
            out.to_decimal_string(),
            "7853200120776062878684798364095072458815029376092732009249414926327459813530"
        );
    }

    #[test]
    fn order_matters() {
        let a = Digest::from_u64(10);
        let b = Digest::from_u64(11);
        assert_ne!(hash2(&a, &b).unwrap(), hash2(&b, &a).unwrap());
    }

    #[test]
    fn fr_round_trip() {
        let d = Digest::from_u64(42);
        assert_eq!(fr_to_digest(digest_to_fr(&d)), d);
    }

    #[test]
    fn leaf_binds_poll_id() {
        let secret = Digest::from_u64(99);
        let leaf_a = leaf_hash(&secret, &Digest::from_u64(1)).unwrap();
        let leaf_b = leaf_hash(&secret, &Digest::from_u64(2)).unwrap();
        assert_ne!(leaf_a, leaf_b);
    }
}

//! Canonical data model for the velum relay.
//!
//! All types here cross at least one crate boundary (tree, store, relay,
//! server) and must stay backward-compatible once records are persisted.

use core::fmt;
use core::str::FromStr;

use borsh::{BorshDeserialize, BorshSerialize};
use num_bigint::BigUint;
use serde::de::Error as DeError;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::constants::{DIGEST_LEN, PUBLIC_SIGNAL_COUNT, SIGNAL_COMMITMENT, SIGNAL_NULLIFIER, SIGNAL_POLL_ID, SIGNAL_ROOT};

/// Errors related to parsing, validation, or construction of core types.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    /// Hex string had an unexpected byte length.
    #[error("invalid digest length: expected {expected} bytes, got {got} bytes")]
    InvalidLength {
        /// Expected number of bytes.
        expected: usize,
        /// Actual number of bytes provided.
        got: usize,
    },

    /// Hex decoding failed.
    #[error("invalid hex: {0}")]
    InvalidHex(#[from] hex::FromHexError),

    /// A decimal string did not parse as an unsigned integer.
    #[error("invalid decimal value: {0}")]
    InvalidDecimal(String),

    /// A numeric value exceeds 256 bits.
    #[error("value does not fit in 256 bits")]
    Overflow,

    /// A proof or signal tuple had the wrong shape.
    #[error("invalid tuple shape: {0}")]
    InvalidShape(&'static str),

    /// Poseidon hashing failed.
    #[error("poseidon: {0}")]
    Hashing(String),
}

/// A 256-bit value in big-endian byte order.
///
/// Used for eligibility roots, nullifiers, vote commitments, transaction
/// hashes and BN254 field elements alike. Values destined for the circuit
/// are reduced modulo the field order at the Poseidon boundary, not here.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, BorshSerialize, BorshDeserialize)]
pub struct Digest(pub [u8; DIGEST_LEN]);

impl Digest {
    /// Returns the all-zero digest.
    ///
    /// As an eligibility root this denotes an open poll: any prover is
    /// admitted and the membership check is bypassed.
    pub const fn zero() -> Self {
        Self([0u8; DIGEST_LEN])
    }

    /// Returns `true` if every byte is zero.
    pub fn is_zero(&self) -> bool {
        self.0.iter().all(|b| *b == 0)
    }

    /// Returns the underlying byte array.
    pub const fn as_bytes(&self) -> &[u8; DIGEST_LEN] {
        &self.0
    }

    /// Builds a digest from a u64, big-endian aligned.
    pub fn from_u64(value: u64) -> Self {
        let mut bytes = [0u8; DIGEST_LEN];
        bytes[DIGEST_LEN - 8..].copy_from_slice(&value.to_be_bytes());
        Self(bytes)
    }

    /// Parses a digest from either a `0x`-prefixed hex string or a decimal
    /// string, the two encodings the proof toolchain emits.
    ///
    /// Hex input may be shorter than 64 nibbles and is left-padded; decimal
    /// input is parsed as an arbitrary-precision integer and must fit in
    /// 256 bits.
    pub fn from_numeric_str(s: &str) -> Result<Self, CoreError> {
        let trimmed = s.trim();
        if let Some(hex_str) = trimmed
            .strip_prefix("0x")
            .or_else(|| trimmed.strip_prefix("0X"))
        {
            let padded = if hex_str.len() % 2 == 1 {
                format!("0{hex_str}")
            } else {
                hex_str.to_string()
            };
            let bytes = hex::decode(padded)?;
            return Self::from_be_slice(&bytes);
        }
        let value = BigUint::from_str(trimmed)
            .map_err(|_| CoreError::InvalidDecimal(trimmed.to_string()))?;
        Self::from_be_slice(&value.to_bytes_be())
    }

    /// Builds a digest from up to 32 big-endian bytes, left-padding with
    /// zeros.
    pub fn from_be_slice(bytes: &[u8]) -> Result<Self, CoreError> {
        if bytes.len() > DIGEST_LEN {
            return Err(CoreError::Overflow);
        }
        let mut arr = [0u8; DIGEST_LEN];
        arr[DIGEST_LEN - bytes.len()..].copy_from_slice(bytes);
        Ok(Self(arr))
    }

    /// Renders the digest as a decimal string, the encoding the circuit
    /// toolchain consumes.
    pub fn to_decimal_string(&self) -> String {
        BigUint::from_bytes_be(&self.0).to_str_radix(10)
    }
}

impl fmt::Debug for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Digest({})", hex::encode(self.0))
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl From<[u8; DIGEST_LEN]> for Digest {
    fn from(value: [u8; DIGEST_LEN]) -> Self {
        Self(value)
    }
}

impl From<Digest> for [u8; DIGEST_LEN] {
    fn from(value: Digest) -> Self {
        value.0
    }
}

impl FromStr for Digest {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.strip_prefix("0x").unwrap_or(s);
        let bytes = hex::decode(s)?;
        if bytes.len() != DIGEST_LEN {
            return Err(CoreError::InvalidLength {
                expected: DIGEST_LEN,
                got: bytes.len(),
            });
        }
        let mut arr = [0u8; DIGEST_LEN];
        arr.copy_from_slice(&bytes);
        Ok(Self(arr))
    }
}

impl Serialize for Digest {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&format!("0x{self}"))
    }
}

impl<'de> Deserialize<'de> for Digest {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = <String as Deserialize>::deserialize(deserializer)?;
        Self::from_str(&s).map_err(DeError::custom)
    }
}

/// Nullifier revealed on submission, derived from the voter secret and the
/// poll id. Detects repeat submissions without identifying the voter.
pub type Nullifier = Digest;

/// The fixed 4-tuple of public signals accompanying a vote proof.
///
/// Order: `[eligibilityRoot, pollId, nullifier, voteCommitment]`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
pub struct PublicSignals(pub [Digest; PUBLIC_SIGNAL_COUNT]);

impl PublicSignals {
    /// Parses the wire representation: exactly four decimal or hex strings.
    pub fn parse(values: &[String]) -> Result<Self, CoreError> {
        if values.len() != PUBLIC_SIGNAL_COUNT {
            return Err(CoreError::InvalidShape("public signals must have 4 entries"));
        }
        let mut out = [Digest::zero(); PUBLIC_SIGNAL_COUNT];
        for (slot, value) in out.iter_mut().zip(values) {
            *slot = Digest::from_numeric_str(value)?;
        }
        Ok(Self(out))
    }

    /// Eligibility root the proof was generated against.
    pub fn eligibility_root(&self) -> Digest {
        self.0[SIGNAL_ROOT]
    }

    /// Numeric poll id the proof is bound to.
    pub fn poll_id(&self) -> Digest {
        self.0[SIGNAL_POLL_ID]
    }

    /// Nullifier for this (voter, poll) pair.
    pub fn nullifier(&self) -> Digest {
        self.0[SIGNAL_NULLIFIER]
    }

    /// Commitment to the cast vote.
    pub fn vote_commitment(&self) -> Digest {
        self.0[SIGNAL_COMMITMENT]
    }
}

/// A Groth16 proof tuple, consumed opaquely from the proving toolchain.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Groth16Proof {
    /// G1 point `a`.
    pub a: [Digest; 2],
    /// G2 point `b`.
    pub b: [[Digest; 2]; 2],
    /// G1 point `c`.
    pub c: [Digest; 2],
}

impl Groth16Proof {
    /// Parses the wire shape emitted by the prover: `a` and `c` as pairs,
    /// `b` as a pair of pairs, all decimal or hex strings.
    pub fn parse(a: &[String], b: &[Vec<String>], c: &[String]) -> Result<Self, CoreError> {
        if a.len() != 2 || c.len() != 2 || b.len() != 2 || b.iter().any(|row| row.len() != 2) {
            return Err(CoreError::InvalidShape("proof must be (a[2], b[2][2], c[2])"));
        }
        let pair = |values: &[String]| -> Result<[Digest; 2], CoreError> {
            Ok([
                Digest::from_numeric_str(&values[0])?,
                Digest::from_numeric_str(&values[1])?,
            ])
        };
        Ok(Self {
            a: pair(a)?,
            b: [pair(&b[0])?, pair(&b[1])?],
            c: pair(c)?,
        })
    }
}

/// An election as recorded on the ledger.
///
/// Immutable once created; "ended" is derived from `end_time`, never a
/// field write.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Election {
    /// Merkle root committing to the eligible voter set; all-zero admits
    /// any prover.
    pub eligibility_root: Digest,
    /// Voting window start, unix seconds.
    pub start_time: u64,
    /// Voting window end, unix seconds.
    pub end_time: u64,
    /// Address that created the election (the relayer).
    pub creator: String,
    /// Number of candidates.
    pub candidate_count: u32,
    /// Running total of submissions, as counted by the contract.
    pub total_votes: u64,
}

/// Off-ledger poll definition: the canonical source for election creation
/// and eligibility proofs.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
pub struct PollDefinition {
    /// Application-level poll id (a UUID string).
    pub poll_id: String,
    /// Human-readable title.
    pub title: String,
    /// Candidate labels, in ballot order.
    pub candidates: Vec<String>,
    /// Voting window start, unix seconds.
    pub start_time: u64,
    /// Voting window end, unix seconds.
    pub end_time: u64,
    /// Eligibility root; zero for open polls.
    pub eligibility_root: Digest,
    /// Identity secrets of registered voters, in registration order.
    ///
    /// Leaf `i` of the eligibility tree is
    /// `Poseidon(registered_voters[i], pollIdNumeric)`.
    pub registered_voters: Vec<Digest>,
}

/// Confirmation status of a cached vote receipt.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
#[serde(rename_all = "snake_case")]
pub enum VoteStatus {
    /// The transaction reached the required confirmation depth.
    Confirmed,
    /// The transaction was broadcast but its receipt was never observed
    /// before the wait deadline. Finality must be verified out-of-band.
    SentUnconfirmed,
}

/// Off-ledger cache of one submission event.
///
/// One row per submission, not per voter: the logical vote for a voter is
/// the row with the greatest `confirmed_at_ms` among rows sharing a
/// nullifier within a poll.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
pub struct VoteRecord {
    /// Application-level poll id.
    pub poll_id: String,
    /// Candidate index the ballot selected.
    pub candidate_index: u32,
    /// Nullifier this record is keyed by. Absent only in legacy rows,
    /// which tally as their own singleton group.
    pub nullifier: Option<Digest>,
    /// Hash of the submitting transaction.
    pub tx_hash: Digest,
    /// Eligibility root the proof was generated against.
    pub eligibility_root: Digest,
    /// Commitment to the cast vote.
    pub vote_commitment: Digest,
    /// Confirmation status at the time the record was written.
    pub status: VoteStatus,
    /// When the record was written, unix milliseconds.
    pub confirmed_at_ms: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn digest_hex_round_trip() {
        let d = Digest::from_u64(0xdead_beef);
        let s = d.to_string();
        assert_eq!(s.len(), 64);
        assert_eq!(Digest::from_str(&s).unwrap(), d);
        assert_eq!(Digest::from_str(&format!("0x{s}")).unwrap(), d);
    }

    #[test]
    fn digest_numeric_parsing() {
        assert_eq!(Digest::from_numeric_str("255").unwrap(), Digest::from_u64(255));
        assert_eq!(Digest::from_numeric_str("0xff").unwrap(), Digest::from_u64(255));
        // Odd-length hex is left-padded.
        assert_eq!(Digest::from_numeric_str("0xf").unwrap(), Digest::from_u64(15));
        assert!(Digest::from_numeric_str("not a number").is_err());
        // 2^256 does not fit.
        let too_big = format!("1{}", "0".repeat(78));
        assert!(matches!(
            Digest::from_numeric_str(&too_big),
            Err(CoreError::Overflow)
        ));
    }

    #[test]
    fn digest_decimal_round_trip() {
        let d = Digest::from_u64(1_234_567);
        assert_eq!(d.to_decimal_string(), "1234567");
        assert_eq!(Digest::from_numeric_str(&d.to_decimal_string()).unwrap(), d);
    }

    #[test]
    fn digest_serde_as_prefixed_hex() {
        let d = Digest::from_u64(7);
        let json = serde_json::to_string(&d).unwrap();
        assert!(json.starts_with("\"0x"));
        let back: Digest = serde_json::from_str(&json).unwrap();
        assert_eq!(back, d);
    }

    #[test]
    fn public_signals_require_four_entries() {
        let three = vec!["1".into(), "2".into(), "3".into()];
        assert!(PublicSignals::parse(&three).is_err());

        let four: Vec<String> = (1..=4).map(|n| n.to_string()).collect();
        let signals = PublicSignals::parse(&four).unwrap();
        assert_eq!(signals.eligibility_root(), Digest::from_u64(1));
        assert_eq!(signals.poll_id(), Digest::from_u64(2));
        assert_eq!(signals.nullifier(), Digest::from_u64(3));
        assert_eq!(signals.vote_commitment(), Digest::from_u64(4));
    }

    #[test]
    fn proof_shape_is_validated() {
        let pair = vec!["1".to_string(), "2".to_string()];
        let b = vec![pair.clone(), pair.clone()];
        assert!(Groth16Proof::parse(&pair, &b, &pair).is_ok());
        assert!(Groth16Proof::parse(&pair[..1].to_vec(), &b, &pair).is_err());
        assert!(Groth16Proof::parse(&pair, &b[..1].to_vec(), &pair).is_err());
    }
}

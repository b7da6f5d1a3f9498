//! Protocol-wide constants for velum v0.

/// Length in bytes of a field-element digest.
pub const DIGEST_LEN: usize = 32;

/// Depth of the eligibility Merkle tree.
///
/// Must match the membership circuit exactly; a proof with the wrong number
/// of path elements is rejected by the verifier.
pub const TREE_DEPTH: usize = 14;

/// Maximum number of registered voters per poll (2^TREE_DEPTH).
pub const MAX_VOTERS: usize = 1 << TREE_DEPTH;

/// Number of public signals in the proof tuple.
///
/// The ordering `[eligibilityRoot, pollId, nullifier, voteCommitment]` is a
/// wire contract shared with the circuit and the contract event log. It must
/// never be reordered.
pub const PUBLIC_SIGNAL_COUNT: usize = 4;

/// Index of the eligibility root within the public signals.
pub const SIGNAL_ROOT: usize = 0;

/// Index of the numeric poll id within the public signals.
pub const SIGNAL_POLL_ID: usize = 1;

/// Index of the nullifier within the public signals.
pub const SIGNAL_NULLIFIER: usize = 2;

/// Index of the vote commitment within the public signals.
pub const SIGNAL_COMMITMENT: usize = 3;

/// Maximum number of candidates per poll accepted by the contract.
pub const MAX_CANDIDATES: usize = 8;

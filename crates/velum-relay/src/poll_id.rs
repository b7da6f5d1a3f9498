//! Mapping from application poll ids to contract poll ids.
//!
//! The API keys polls by UUID strings; the contract keys elections by
//! uint256. The bridge is `keccak256(utf8(pollId))` interpreted as a
//! big-endian uint256. All 32 bytes are kept, so distinct UUIDs cannot
//! collide short of a keccak collision.

use ethers::core::types::U256;
use ethers::core::utils::keccak256;

use velum_core::Digest;

/// Numeric contract-side id for an application poll id.
pub fn numeric_poll_id(poll_id: &str) -> U256 {
    U256::from_big_endian(&keccak256(poll_id.as_bytes()))
}

/// Same mapping as a digest, for circuit inputs and persistence.
pub fn poll_id_digest(poll_id: &str) -> Digest {
    Digest(keccak256(poll_id.as_bytes()))
}

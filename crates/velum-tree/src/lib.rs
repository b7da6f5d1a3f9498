#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]

//! Fixed-depth Poseidon Merkle tree over registered voters.
//!
//! The tree proves set membership of an anonymous voter without revealing
//! which member it is. Semantics match the membership circuit:
//! - depth is fixed at [`TREE_DEPTH`] (2^14 = 16,384 leaf slots)
//! - unfilled leaf slots are zero
//! - `parent = Poseidon(left, right)` at every internal level
//!
//! Levels are stored sparsely: only the populated prefix of each level is
//! materialized, and absent nodes are read from a precomputed per-level
//! zero cache (`zeros[l+1] = Poseidon(zeros[l], zeros[l])`). The resulting
//! root is identical to building over a fully zero-padded leaf array.

use ark_bn254::Fr;
use ark_ff::Zero;
use serde::{Deserialize, Serialize};

use velum_core::{digest_to_fr, fr_to_digest, CoreError, Digest, Poseidon2, MAX_VOTERS, TREE_DEPTH};

/// Errors produced when building trees or proofs.
#[derive(Debug, thiserror::Error)]
pub enum TreeError {
    /// More leaves than the fixed depth supports.
    #[error("too many leaves: {got} exceeds capacity {max}")]
    TooManyLeaves {
        /// Number of leaves provided.
        got: usize,
        /// Tree capacity (2^depth).
        max: usize,
    },

    /// Proof requested for an index outside the populated range.
    #[error("leaf index {0} out of range")]
    IndexOutOfRange(usize),

    /// Proof requested for a leaf value not present in the tree.
    ///
    /// Fatal for the caller: the identity is not registered for this poll.
    #[error("leaf not found in tree")]
    LeafNotFound,

    /// Proof had the wrong number of elements or indices.
    #[error("malformed proof: {0}")]
    MalformedProof(&'static str),

    /// Poseidon hashing failed.
    #[error(transparent)]
    Hashing(#[from] CoreError),
}

/// Inclusion proof for one leaf: sibling digests from leaf to root, plus
/// the left/right orientation at each level (0 = node is the left child).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EligibilityProof {
    /// Sibling digest at each level, leaf level first.
    pub path_elements: Vec<Digest>,
    /// 0 if the node is a left child at that level, 1 if right.
    pub path_indices: Vec<u8>,
}

impl EligibilityProof {
    /// A structurally valid all-zero proof of the fixed depth.
    ///
    /// Returned for open polls (zero eligibility root), where the
    /// membership check is bypassed but the proof system still expects
    /// arguments of the usual shape.
    pub fn placeholder() -> Self {
        Self {
            path_elements: vec![Digest::zero(); TREE_DEPTH],
            path_indices: vec![0u8; TREE_DEPTH],
        }
    }
}

/// Poseidon Merkle tree of fixed depth over voter leaves.
pub struct EligibilityTree {
    /// `levels[0]` holds the populated leaves; `levels[l]` the populated
    /// prefix of level `l`. Nodes beyond each prefix equal `zeros[l]`.
    levels: Vec<Vec<Fr>>,
    /// Root digest of the zero-subtree at each height.
    zeros: Vec<Fr>,
    root: Fr,
}

impl EligibilityTree {
    /// Builds the tree over the given leaves, in registration order.
    ///
    /// Leaves must already be hashed (`Poseidon(identitySecret, pollId)`);
    /// slots beyond `leaves.len()` are implicitly zero.
    pub fn build(leaves: &[Digest]) -> Result<Self, TreeError> {
        if leaves.len() > MAX_VOTERS {
            return Err(TreeError::TooManyLeaves {
                got: leaves.len(),
                max: MAX_VOTERS,
            });
        }

        let mut hasher = Poseidon2::new().map_err(TreeError::Hashing)?;

        let mut zeros = Vec::with_capacity(TREE_DEPTH + 1);
        zeros.push(Fr::zero());
        for level in 0..TREE_DEPTH {
            let z = zeros[level];
            zeros.push(hasher.hash_fr(z, z)?);
        }

        let mut levels: Vec<Vec<Fr>> = Vec::with_capacity(TREE_DEPTH + 1);
        levels.push(leaves.iter().map(digest_to_fr).collect());

        for level in 0..TREE_DEPTH {
            let current = &levels[level];
            let mut next = Vec::with_capacity(current.len().div_ceil(2));
            for pair in current.chunks(2) {
                let left = pair[0];
                let right = if pair.len() == 2 { pair[1] } else { zeros[level] };
                next.push(hasher.hash_fr(left, right)?);
            }
            levels.push(next);
        }

        let root = levels[TREE_DEPTH].first().copied().unwrap_or(zeros[TREE_DEPTH]);
        Ok(Self { levels, zeros, root })
    }

    /// Number of populated leaves.
    pub fn leaf_count(&self) -> usize {
        self.levels[0].len()
    }

    /// Root of the tree as a digest.
    pub fn root(&self) -> Digest {
        fr_to_digest(self.root)
    }

    /// Produces an inclusion proof for the leaf at `index`.
    ///
    /// At each level the sibling sits at `index XOR 1`; siblings outside
    /// the populated prefix are the zero-subtree root for that level.
    pub fn prove(&self, index: usize) -> Result<EligibilityProof, TreeError> {
        if index >= self.leaf_count() {
            return Err(TreeError::IndexOutOfRange(index));
        }

        let mut path_elements = Vec::with_capacity(TREE_DEPTH);
        let mut path_indices = Vec::with_capacity(TREE_DEPTH);
        let mut cursor = index;

        for level in 0..TREE_DEPTH {
            let sibling = self.levels[level]
                .get(cursor ^ 1)
                .copied()
                .unwrap_or(self.zeros[level]);
            path_elements.push(fr_to_digest(sibling));
            path_indices.push((cursor & 1) as u8);
            cursor >>= 1;
        }

        Ok(EligibilityProof {
            path_elements,
            path_indices,
        })
    }

    /// Locates `leaf` by linear scan and proves its inclusion.
    pub fn prove_by_leaf(&self, leaf: &Digest) -> Result<EligibilityProof, TreeError> {
        let target = digest_to_fr(leaf);
        let index = self.levels[0]
            .iter()
            .position(|l| *l == target)
            .ok_or(TreeError::LeafNotFound)?;
        self.prove(index)
    }
}

/// Replays the hash chain from a leaf along a proof, producing the root it
/// commits to. Any single altered path element produces a different root.
pub fn recompute_root(leaf: &Digest, proof: &EligibilityProof) -> Result<Digest, TreeError> {
    if proof.path_elements.len() != TREE_DEPTH || proof.path_indices.len() != TREE_DEPTH {
        return Err(TreeError::MalformedProof("expected TREE_DEPTH path entries"));
    }

    let mut hasher = Poseidon2::new().map_err(TreeError::Hashing)?;
    let mut node = digest_to_fr(leaf);
    for (sibling, bit) in proof.path_elements.iter().zip(&proof.path_indices) {
        let sibling = digest_to_fr(sibling);
        node = if *bit == 0 {
            hasher.hash_fr(node, sibling)?
        } else {
            hasher.hash_fr(sibling, node)?
        };
    }
    Ok(fr_to_digest(node))
}

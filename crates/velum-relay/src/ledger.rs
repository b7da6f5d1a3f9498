//! The ledger seam: everything the relay asks of the chain.
//!
//! Keeping this behind a trait lets the orchestration logic be exercised
//! against a scripted double; [`crate::EthersLedger`] is the JSON-RPC
//! implementation.

use async_trait::async_trait;
use ethers::core::types::{Address, TransactionReceipt, H256, U256};
use std::time::Duration;

use velum_core::{Digest, Election, Groth16Proof, PublicSignals};

use crate::error::{LedgerError, SubmitError};

/// Which transaction count to read for the relayer account.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CountTag {
    /// Count over mined transactions only.
    Latest,
    /// Count including mempool transactions.
    Pending,
}

/// An EIP-1559 fee pair, in wei.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FeeEstimate {
    /// Cap on total fee per gas.
    pub max_fee_per_gas: U256,
    /// Tip per gas.
    pub max_priority_fee_per_gas: U256,
}

impl FeeEstimate {
    /// Scales both fees by `pct` percent, rounding down.
    pub fn scaled(&self, pct: u32) -> Self {
        let pct = U256::from(pct);
        let hundred = U256::from(100u64);
        Self {
            max_fee_per_gas: self.max_fee_per_gas * pct / hundred,
            max_priority_fee_per_gas: self.max_priority_fee_per_gas * pct / hundred,
        }
    }
}

/// Fully resolved parameters for one broadcast attempt.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TxParams {
    /// Nonce reserved for this attempt.
    pub nonce: u64,
    /// Gas limit, margin already applied.
    pub gas_limit: u64,
    /// Fees, escalation already applied.
    pub fees: FeeEstimate,
}

/// Calldata for a `vote` transaction.
#[derive(Clone, Debug)]
pub struct VoteCall {
    /// Numeric poll id the contract keys elections by.
    pub poll_id: U256,
    /// Candidate index the ballot selected.
    pub candidate_index: u8,
    /// The Groth16 proof tuple.
    pub proof: Groth16Proof,
    /// The four public signals, in circuit order.
    pub signals: PublicSignals,
}

/// Calldata for a `createElection` transaction.
#[derive(Clone, Debug)]
pub struct CreateElectionCall {
    /// Numeric poll id.
    pub poll_id: U256,
    /// Eligibility root; zero for open polls.
    pub eligibility_root: Digest,
    /// Voting window start, unix seconds.
    pub start_time: u64,
    /// Voting window end, unix seconds.
    pub end_time: u64,
    /// Candidate labels, in ballot order.
    pub candidates: Vec<String>,
}

/// Chain access as the relay sees it.
#[async_trait]
pub trait Ledger: Send + Sync {
    /// Address of the voting contract. Receipt logs from any other
    /// emitter are not ours, whatever their topics claim.
    fn contract_address(&self) -> Address;

    /// Relayer account balance in wei.
    async fn balance(&self) -> Result<U256, LedgerError>;

    /// Relayer account transaction count at the given tag.
    async fn transaction_count(&self, tag: CountTag) -> Result<u64, LedgerError>;

    /// Current EIP-1559 fee estimate.
    async fn fee_estimate(&self) -> Result<FeeEstimate, LedgerError>;

    /// Simulates the vote and returns its gas estimate. A revert here is
    /// the earliest signal that the proof is invalid.
    async fn estimate_vote_gas(&self, call: &VoteCall) -> Result<u64, SubmitError>;

    /// Broadcasts a vote with the given parameters, returning the
    /// transaction hash without waiting for inclusion.
    async fn submit_vote(&self, call: &VoteCall, params: &TxParams) -> Result<H256, SubmitError>;

    /// Broadcasts an election creation, returning the transaction hash
    /// without waiting for inclusion.
    async fn submit_create_election(
        &self,
        call: &CreateElectionCall,
        params: &TxParams,
    ) -> Result<H256, SubmitError>;

    /// Waits until `tx` has `confirmations` confirmations or `timeout`
    /// elapses. `Ok(None)` means the deadline passed without a receipt;
    /// it is a verdict, not an error.
    async fn wait_for_confirmations(
        &self,
        tx: H256,
        confirmations: usize,
        timeout: Duration,
    ) -> Result<Option<TransactionReceipt>, LedgerError>;

    /// Fetches the receipt for `tx` if one exists right now.
    async fn transaction_receipt(
        &self,
        tx: H256,
    ) -> Result<Option<TransactionReceipt>, LedgerError>;

    /// Whether an election exists under the numeric poll id.
    async fn election_exists(&self, poll_id: U256) -> Result<bool, LedgerError>;

    /// Election state, or `None` if the contract knows no such poll.
    async fn get_election(&self, poll_id: U256) -> Result<Option<Election>, LedgerError>;

    /// Candidate labels for the election.
    async fn get_candidates(&self, poll_id: U256) -> Result<Vec<String>, LedgerError>;

    /// Whether the contract has seen this nullifier for this poll.
    /// Diagnostic only; the contract itself is the enforcement point.
    async fn has_voted(&self, poll_id: U256, nullifier: U256) -> Result<bool, LedgerError>;
}

/// Converts a digest to the U256 the contract ABI wants.
pub fn digest_to_u256(d: &Digest) -> U256 {
    U256::from_big_endian(d.as_bytes())
}

/// Converts a U256 back into a digest.
pub fn u256_to_digest(v: U256) -> Digest {
    let mut bytes = [0u8; 32];
    v.to_big_endian(&mut bytes);
    Digest(bytes)
}

/// Converts a transaction hash to a digest.
pub fn h256_to_digest(h: H256) -> Digest {
    Digest(h.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fee_scaling_is_per_cent() {
        let base = FeeEstimate {
            max_fee_per_gas: U256::from(1_000u64),
            max_priority_fee_per_gas: U256::from(100u64),
        };
        let up = base.scaled(150);
        assert_eq!(up.max_fee_per_gas, U256::from(1_500u64));
        assert_eq!(up.max_priority_fee_per_gas, U256::from(150u64));
        assert_eq!(base.scaled(100), base);
    }

    #[test]
    fn digest_u256_round_trip() {
        let d = Digest::from_u64(0x1234_5678);
        assert_eq!(u256_to_digest(digest_to_u256(&d)), d);
        assert_eq!(digest_to_u256(&Digest::zero()), U256::zero());
    }
}

//! JSON-RPC implementation of the ledger seam.

use async_trait::async_trait;
use ethers::contract::ContractError;
use ethers::core::types::transaction::eip2718::TypedTransaction;
use ethers::core::types::{BlockNumber, TransactionReceipt, H160, H256, U256};
use ethers::middleware::SignerMiddleware;
use ethers::providers::{Http, Middleware, PendingTransaction, Provider};
use ethers::signers::{LocalWallet, Signer};
use std::sync::Arc;
use std::time::Duration;

use velum_core::Election;

use crate::error::{LedgerError, RelayError, SubmitError};
use crate::ledger::{
    digest_to_u256, u256_to_digest, CountTag, CreateElectionCall, FeeEstimate, Ledger, TxParams,
    VoteCall,
};

/// Generated contract bindings.
#[allow(missing_docs, clippy::unwrap_used, clippy::expect_used)]
pub mod abi {
    use ethers::contract::abigen;

    abigen!(
        Voting,
        r#"[
            function createElection(uint256 pollId, bytes32 eligibilityRoot, uint256 startTime, uint256 endTime, string[] candidates)
            function vote(uint256 pollId, uint8 candidateIndex, uint256[2] a, uint256[2][2] b, uint256[2] c, uint256[4] publicSignals)
            function electionExists(uint256 pollId) view returns (bool)
            function getElection(uint256 pollId) view returns (uint256 eligibilityRoot, uint256 startTime, uint256 endTime, address creator, uint256 candidateCount, uint256 totalVotes)
            function getCandidates(uint256 pollId) view returns (string[])
            function hasVoted(uint256 pollId, uint256 nullifier) view returns (bool)
            event PollCreated(uint256 indexed pollId, address indexed creator, uint256 startTime, uint256 endTime, uint256 candidateCount)
            event VoteCast(uint256 indexed pollId, uint256 indexed nullifier, uint8 candidate, uint256 voteCommitment, bool isUpdate)
        ]"#
    );
}

pub use abi::{PollCreatedFilter, VoteCastFilter, Voting};

type Client = SignerMiddleware<Provider<Http>, LocalWallet>;

/// [`Ledger`] over a JSON-RPC node, signing with a local relayer key.
pub struct EthersLedger {
    client: Arc<Client>,
    contract: Voting<Client>,
    address: H160,
}

impl EthersLedger {
    /// Connects to `rpc_url`, binds the signing key to the node's chain
    /// id, and attaches the contract at `contract_address`.
    pub async fn connect(
        rpc_url: &str,
        private_key: &str,
        contract_address: H160,
    ) -> Result<Self, RelayError> {
        let provider = Provider::<Http>::try_from(rpc_url)
            .map_err(|e| RelayError::NotConfigured(format!("invalid rpc url: {e}")))?;
        let chain_id = provider
            .get_chainid()
            .await
            .map_err(|e| LedgerError::Rpc(e.to_string()))?;
        let wallet = private_key
            .parse::<LocalWallet>()
            .map_err(|e| RelayError::NotConfigured(format!("invalid relayer key: {e}")))?
            .with_chain_id(chain_id.as_u64());
        let address = wallet.address();
        let client = Arc::new(SignerMiddleware::new(provider, wallet));
        let contract = Voting::new(contract_address, client.clone());
        Ok(Self {
            client,
            contract,
            address,
        })
    }

    /// The relayer account address.
    pub fn address(&self) -> H160 {
        self.address
    }
}

/// Maps a contract error onto the retry-loop taxonomy. Decoded reverts
/// take priority; otherwise the node's message text is the only signal.
fn classify<M: Middleware>(err: ContractError<M>) -> SubmitError {
    if let Some(reason) = err.decode_revert::<String>() {
        return SubmitError::Reverted(reason);
    }
    let message = err.to_string();
    let lowered = message.to_lowercase();
    if lowered.contains("nonce too low") {
        SubmitError::NonceTooLow
    } else if lowered.contains("replacement transaction underpriced")
        || lowered.contains("already known")
    {
        SubmitError::ReplacementUnderpriced
    } else if lowered.contains("insufficient funds") {
        SubmitError::InsufficientFunds
    } else if lowered.contains("revert") {
        SubmitError::Reverted(message)
    } else {
        SubmitError::Rpc(message)
    }
}

fn is_revert<M: Middleware>(err: &ContractError<M>) -> bool {
    err.decode_revert::<String>().is_some() || err.to_string().to_lowercase().contains("revert")
}

fn apply_params(tx: &mut TypedTransaction, params: &TxParams) {
    tx.set_nonce(params.nonce);
    tx.set_gas(params.gas_limit);
    if let TypedTransaction::Eip1559(inner) = tx {
        inner.max_fee_per_gas = Some(params.fees.max_fee_per_gas);
        inner.max_priority_fee_per_gas = Some(params.fees.max_priority_fee_per_gas);
    }
}

fn vote_arguments(call: &VoteCall) -> ([U256; 2], [[U256; 2]; 2], [U256; 2], [U256; 4]) {
    let a = [digest_to_u256(&call.proof.a[0]), digest_to_u256(&call.proof.a[1])];
    let b = [
        [
            digest_to_u256(&call.proof.b[0][0]),
            digest_to_u256(&call.proof.b[0][1]),
        ],
        [
            digest_to_u256(&call.proof.b[1][0]),
            digest_to_u256(&call.proof.b[1][1]),
        ],
    ];
    let c = [digest_to_u256(&call.proof.c[0]), digest_to_u256(&call.proof.c[1])];
    let signals = [
        digest_to_u256(&call.signals.0[0]),
        digest_to_u256(&call.signals.0[1]),
        digest_to_u256(&call.signals.0[2]),
        digest_to_u256(&call.signals.0[3]),
    ];
    (a, b, c, signals)
}

#[async_trait]
impl Ledger for EthersLedger {
    fn contract_address(&self) -> H160 {
        self.contract.address()
    }

    async fn balance(&self) -> Result<U256, LedgerError> {
        self.client
            .get_balance(self.address, None)
            .await
            .map_err(|e| LedgerError::Rpc(e.to_string()))
    }

    async fn transaction_count(&self, tag: CountTag) -> Result<u64, LedgerError> {
        let block = match tag {
            CountTag::Latest => BlockNumber::Latest,
            CountTag::Pending => BlockNumber::Pending,
        };
        let count = self
            .client
            .get_transaction_count(self.address, Some(block.into()))
            .await
            .map_err(|e| LedgerError::Rpc(e.to_string()))?;
        Ok(count.as_u64())
    }

    async fn fee_estimate(&self) -> Result<FeeEstimate, LedgerError> {
        let (max_fee_per_gas, max_priority_fee_per_gas) = self
            .client
            .estimate_eip1559_fees(None)
            .await
            .map_err(|e| LedgerError::Rpc(e.to_string()))?;
        Ok(FeeEstimate {
            max_fee_per_gas,
            max_priority_fee_per_gas,
        })
    }

    async fn estimate_vote_gas(&self, call: &VoteCall) -> Result<u64, SubmitError> {
        let (a, b, c, signals) = vote_arguments(call);
        let contract_call =
            self.contract
                .vote(call.poll_id, call.candidate_index, a, b, c, signals);
        let gas = contract_call.estimate_gas().await.map_err(classify)?;
        Ok(gas.as_u64())
    }

    async fn submit_vote(&self, call: &VoteCall, params: &TxParams) -> Result<H256, SubmitError> {
        let (a, b, c, signals) = vote_arguments(call);
        let mut contract_call =
            self.contract
                .vote(call.poll_id, call.candidate_index, a, b, c, signals);
        apply_params(&mut contract_call.tx, params);
        let pending = contract_call.send().await.map_err(classify)?;
        Ok(*pending)
    }

    async fn submit_create_election(
        &self,
        call: &CreateElectionCall,
        params: &TxParams,
    ) -> Result<H256, SubmitError> {
        let mut contract_call = self.contract.create_election(
            call.poll_id,
            call.eligibility_root.0,
            U256::from(call.start_time),
            U256::from(call.end_time),
            call.candidates.clone(),
        );
        apply_params(&mut contract_call.tx, params);
        let pending = contract_call.send().await.map_err(classify)?;
        Ok(*pending)
    }

    async fn wait_for_confirmations(
        &self,
        tx: H256,
        confirmations: usize,
        timeout: Duration,
    ) -> Result<Option<TransactionReceipt>, LedgerError> {
        let pending =
            PendingTransaction::new(tx, self.client.provider()).confirmations(confirmations);
        match tokio::time::timeout(timeout, pending).await {
            Ok(result) => result.map_err(|e| LedgerError::Rpc(e.to_string())),
            Err(_) => Ok(None),
        }
    }

    async fn transaction_receipt(
        &self,
        tx: H256,
    ) -> Result<Option<TransactionReceipt>, LedgerError> {
        self.client
            .get_transaction_receipt(tx)
            .await
            .map_err(|e| LedgerError::Rpc(e.to_string()))
    }

    async fn election_exists(&self, poll_id: U256) -> Result<bool, LedgerError> {
        match self.contract.election_exists(poll_id).call().await {
            Ok(exists) => Ok(exists),
            Err(err) if is_revert(&err) => Ok(false),
            Err(err) => Err(LedgerError::Rpc(err.to_string())),
        }
    }

    async fn get_election(&self, poll_id: U256) -> Result<Option<Election>, LedgerError> {
        match self.contract.get_election(poll_id).call().await {
            Ok((root, start, end, creator, candidate_count, total_votes)) => Ok(Some(Election {
                eligibility_root: u256_to_digest(root),
                start_time: start.as_u64(),
                end_time: end.as_u64(),
                creator: format!("{creator:?}"),
                candidate_count: candidate_count.as_u32(),
                total_votes: total_votes.as_u64(),
            })),
            Err(err) if is_revert(&err) => Ok(None),
            Err(err) => Err(LedgerError::Rpc(err.to_string())),
        }
    }

    async fn get_candidates(&self, poll_id: U256) -> Result<Vec<String>, LedgerError> {
        self.contract
            .get_candidates(poll_id)
            .call()
            .await
            .map_err(|e| LedgerError::Rpc(e.to_string()))
    }

    async fn has_voted(&self, poll_id: U256, nullifier: U256) -> Result<bool, LedgerError> {
        self.contract
            .has_voted(poll_id, nullifier)
            .call()
            .await
            .map_err(|e| LedgerError::Rpc(e.to_string()))
    }
}

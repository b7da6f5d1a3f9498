//! End-to-end relay flow: request validation, balance gate, lazy election
//! creation, submission, event verification and receipt caching.

use ethers::core::types::U256;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use velum_core::{
    leaf_hash, Digest, Groth16Proof, PollDefinition, PublicSignals, VoteRecord, VoteStatus,
    MAX_CANDIDATES,
};
use velum_store::{tally, valid_votes, PollStore, VoteStore};
use velum_tree::{EligibilityProof, EligibilityTree};

use crate::config::RelayConfig;
use crate::election::ElectionEnsurer;
use crate::error::RelayError;
use crate::events::parse_vote_cast;
use crate::ledger::{h256_to_digest, u256_to_digest, Ledger, VoteCall};
use crate::nonce::NonceCoordinator;
use crate::poll_id::{numeric_poll_id, poll_id_digest};
use crate::submit::{SubmitOutcome, VoteSubmitter};

/// A relay request as the API surface receives it, already parsed into
/// core types.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RelayRequest {
    /// Application poll id.
    pub poll_id: String,
    /// Candidate index the ballot selects.
    pub candidate_index: u8,
    /// The Groth16 proof tuple.
    pub proof: Groth16Proof,
    /// The four public signals, in circuit order.
    pub public_signals: PublicSignals,
}

/// What the relay tells the voter after a submission.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RelayReceipt {
    /// Hash of the vote transaction.
    pub tx_hash: Digest,
    /// Confirmation status at response time.
    pub status: VoteStatus,
    /// Whether this submission replaced an earlier vote.
    pub is_update: bool,
    /// Nullifier the vote was recorded under.
    pub nullifier: Digest,
}

/// Per-candidate tally for a poll.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PollResults {
    /// Application poll id.
    pub poll_id: String,
    /// Candidate labels, in ballot order.
    pub candidates: Vec<String>,
    /// One count per candidate.
    pub counts: Vec<u64>,
    /// Number of logical votes after last-submission-wins reduction.
    pub total_votes: u64,
}

/// Ties the submission pipeline to persistence and exposes the operations
/// the API surface calls.
pub struct Relayer<L, S> {
    ledger: Arc<L>,
    store: Arc<S>,
    elections: ElectionEnsurer<L>,
    submitter: VoteSubmitter<L>,
    config: RelayConfig,
}

fn now_ms() -> i64 {
    match SystemTime::now().duration_since(UNIX_EPOCH) {
        Ok(elapsed) => elapsed.as_millis() as i64,
        Err(_) => 0,
    }
}

impl<L, S> Relayer<L, S>
where
    L: Ledger,
    S: PollStore + VoteStore,
{
    /// Wires the pipeline over a shared ledger and store.
    pub fn new(ledger: Arc<L>, store: Arc<S>, config: RelayConfig) -> Self {
        let nonces = Arc::new(NonceCoordinator::new(config.nonce_ttl));
        Self {
            elections: ElectionEnsurer::new(ledger.clone(), nonces.clone(), config.clone()),
            submitter: VoteSubmitter::new(ledger.clone(), nonces, config.clone()),
            ledger,
            store,
            config,
        }
    }

    /// Relays one vote end to end and caches the resulting receipt.
    pub async fn relay_vote(&self, request: RelayRequest) -> Result<RelayReceipt, RelayError> {
        let poll = self
            .store
            .get_poll(&request.poll_id)
            .await?
            .ok_or_else(|| RelayError::PollNotFound(request.poll_id.clone()))?;

        let balance = self.ledger.balance().await?;
        if balance < self.config.min_balance_wei {
            tracing::error!(%balance, floor = %self.config.min_balance_wei, "relayer balance below operating floor");
            return Err(RelayError::InsufficientFunds {
                balance_wei: balance,
                required_wei: self.config.min_balance_wei,
            });
        }

        let numeric_id = numeric_poll_id(&request.poll_id);
        let bound_id = self.signals_poll_id(&request.public_signals);
        if bound_id != numeric_id {
            return Err(RelayError::ProofRejected(
                "proof is bound to a different poll".to_string(),
            ));
        }

        self.elections.ensure(&poll, numeric_id).await?;

        let nullifier = request.public_signals.nullifier();
        let previous = self
            .store
            .find_by_nullifier(&request.poll_id, &nullifier)
            .await?;

        // Diagnostic only; the contract enforces nullifier semantics.
        match self
            .ledger
            .has_voted(numeric_id, crate::ledger::digest_to_u256(&nullifier))
            .await
        {
            Ok(seen) => tracing::debug!(seen, "contract nullifier check"),
            Err(err) => tracing::debug!(error = %err, "contract nullifier check unavailable"),
        }

        let call = VoteCall {
            poll_id: numeric_id,
            candidate_index: request.candidate_index,
            proof: request.proof.clone(),
            signals: request.public_signals,
        };
        let outcome = self.submitter.submit(&call).await?;

        let receipt = self
            .build_receipt(&request, &poll, nullifier, previous.is_some(), &outcome)
            .await?;

        let record = VoteRecord {
            poll_id: request.poll_id.clone(),
            candidate_index: u32::from(request.candidate_index),
            nullifier: Some(nullifier),
            tx_hash: receipt.tx_hash,
            eligibility_root: request.public_signals.eligibility_root(),
            vote_commitment: request.public_signals.vote_commitment(),
            status: receipt.status,
            confirmed_at_ms: now_ms(),
        };
        self.store.upsert_by_nullifier(record).await?;

        Ok(receipt)
    }

    async fn build_receipt(
        &self,
        request: &RelayRequest,
        poll: &PollDefinition,
        nullifier: Digest,
        seen_before: bool,
        outcome: &SubmitOutcome,
    ) -> Result<RelayReceipt, RelayError> {
        let tx_hash = h256_to_digest(outcome.tx_hash());
        match outcome {
            SubmitOutcome::Confirmed { receipt, .. } => {
                let parsed = parse_vote_cast(receipt, self.ledger.contract_address());
                let is_update = match parsed {
                    Some(event) => {
                        let claimed = u256_to_digest(event.vote_commitment);
                        if claimed != request.public_signals.vote_commitment()
                            || event.candidate_index != request.candidate_index
                            || event.poll_id != self.signals_poll_id(&request.public_signals)
                            || u256_to_digest(event.nullifier) != nullifier
                        {
                            // The contract's log is authoritative; a
                            // mismatch is surfaced, not fatal.
                            tracing::warn!(
                                poll = %poll.poll_id,
                                "vote event disagrees with submitted request"
                            );
                        }
                        event.is_update
                    }
                    // No decodable event: fall back to our own cache.
                    None => seen_before,
                };
                Ok(RelayReceipt {
                    tx_hash,
                    status: VoteStatus::Confirmed,
                    is_update,
                    nullifier,
                })
            }
            SubmitOutcome::SentUnconfirmed { .. } => Ok(RelayReceipt {
                tx_hash,
                status: VoteStatus::SentUnconfirmed,
                is_update: seen_before,
                nullifier,
            }),
        }
    }

    fn signals_poll_id(&self, signals: &PublicSignals) -> U256 {
        crate::ledger::digest_to_u256(&signals.poll_id())
    }

    /// Stores a new poll definition, computing its eligibility root from
    /// any pre-registered voters. On-ledger creation stays lazy; the first
    /// vote triggers it.
    pub async fn create_poll(&self, mut poll: PollDefinition) -> Result<PollDefinition, RelayError> {
        if poll.candidates.is_empty() || poll.candidates.len() > MAX_CANDIDATES {
            return Err(RelayError::InvalidRequest(format!(
                "candidate count {} outside 1..={MAX_CANDIDATES}",
                poll.candidates.len()
            )));
        }
        poll.eligibility_root = self.root_for(&poll)?;
        self.store.put_poll(poll.clone()).await?;
        tracing::info!(poll = %poll.poll_id, voters = poll.registered_voters.len(), "poll stored");
        Ok(poll)
    }

    /// Registers a voter identity and returns the poll with its refreshed
    /// eligibility root.
    pub async fn register_voter(
        &self,
        poll_id: &str,
        identity: Digest,
    ) -> Result<PollDefinition, RelayError> {
        let mut poll = self.store.register_voter(poll_id, identity).await?;
        poll.eligibility_root = self.root_for(&poll)?;
        self.store.put_poll(poll.clone()).await?;
        Ok(poll)
    }

    /// Builds the membership proof for one registered identity.
    ///
    /// Open polls (no registered voters) get the placeholder proof; the
    /// circuit skips the membership check when the root is zero.
    pub async fn eligibility_proof(
        &self,
        poll_id: &str,
        identity: &Digest,
    ) -> Result<(Digest, EligibilityProof), RelayError> {
        let poll = self
            .store
            .get_poll(poll_id)
            .await?
            .ok_or_else(|| RelayError::PollNotFound(poll_id.to_string()))?;
        if poll.registered_voters.is_empty() {
            return Ok((Digest::zero(), EligibilityProof::placeholder()));
        }
        let tree = self.tree_for(&poll)?;
        let leaf = leaf_hash(identity, &poll_id_digest(poll_id))?;
        let proof = tree.prove_by_leaf(&leaf).map_err(|err| match err {
            velum_tree::TreeError::LeafNotFound => {
                RelayError::VoterNotRegistered(poll_id.to_string())
            }
            other => RelayError::Tree(other),
        })?;
        Ok((tree.root(), proof))
    }

    /// Tallies a poll from the receipt cache.
    pub async fn poll_results(&self, poll_id: &str) -> Result<PollResults, RelayError> {
        let poll = self
            .store
            .get_poll(poll_id)
            .await?
            .ok_or_else(|| RelayError::PollNotFound(poll_id.to_string()))?;
        let records = self.store.find_all_for_poll(poll_id).await?;
        let counts = tally(&records, poll.candidates.len());
        let total_votes = valid_votes(&records).len() as u64;
        Ok(PollResults {
            poll_id: poll.poll_id,
            candidates: poll.candidates,
            counts,
            total_votes,
        })
    }

    /// Fetches a stored poll definition.
    pub async fn get_poll(&self, poll_id: &str) -> Result<PollDefinition, RelayError> {
        self.store
            .get_poll(poll_id)
            .await?
            .ok_or_else(|| RelayError::PollNotFound(poll_id.to_string()))
    }

    fn tree_for(&self, poll: &PollDefinition) -> Result<EligibilityTree, RelayError> {
        let id_digest = poll_id_digest(&poll.poll_id);
        let leaves = poll
            .registered_voters
            .iter()
            .map(|identity| leaf_hash(identity, &id_digest))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(EligibilityTree::build(&leaves)?)
    }

    fn root_for(&self, poll: &PollDefinition) -> Result<Digest, RelayError> {
        if poll.registered_voters.is_empty() {
            return Ok(Digest::zero());
        }
        Ok(self.tree_for(poll)?.root())
    }
}

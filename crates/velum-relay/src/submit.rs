//! Vote broadcast with escalating fees and a degrading confirmation wait.

use ethers::core::types::{TransactionReceipt, H256, U64};
use std::sync::Arc;

use crate::config::RelayConfig;
use crate::error::{RelayError, SubmitError};
use crate::ledger::{Ledger, TxParams, VoteCall};
use crate::nonce::{wait_for_pending_settled, NonceCoordinator};

/// What became of a vote submission.
///
/// Both variants mean the transaction left this process; the difference is
/// whether its inclusion was observed before the deadline.
#[derive(Clone, Debug)]
pub enum SubmitOutcome {
    /// The transaction reached the required confirmation depth.
    Confirmed {
        /// Hash of the mined transaction.
        tx_hash: H256,
        /// Its receipt, for event parsing.
        receipt: TransactionReceipt,
    },
    /// Broadcast succeeded but no receipt appeared before the deadline.
    /// The vote may still land; finality must be checked out-of-band.
    SentUnconfirmed {
        /// Hash of the broadcast transaction.
        tx_hash: H256,
    },
}

impl SubmitOutcome {
    /// The transaction hash regardless of confirmation state.
    pub fn tx_hash(&self) -> H256 {
        match self {
            Self::Confirmed { tx_hash, .. } | Self::SentUnconfirmed { tx_hash } => *tx_hash,
        }
    }
}

/// Broadcasts votes: per-attempt gas estimation, fee escalation across
/// attempts, nonce reservation last so the reservation window stays small.
pub struct VoteSubmitter<L> {
    ledger: Arc<L>,
    nonces: Arc<NonceCoordinator>,
    config: RelayConfig,
}

impl<L: Ledger> VoteSubmitter<L> {
    /// Creates a submitter over the shared ledger and nonce coordinator.
    pub fn new(ledger: Arc<L>, nonces: Arc<NonceCoordinator>, config: RelayConfig) -> Self {
        Self {
            ledger,
            nonces,
            config,
        }
    }

    /// Broadcasts the vote and waits for confirmations.
    ///
    /// Terminal per-attempt failures (revert, insufficient funds) abort the
    /// retry loop immediately; everything else retries with backed-off
    /// timing and escalated fees until the budget runs out.
    pub async fn submit(&self, call: &VoteCall) -> Result<SubmitOutcome, RelayError> {
        // Earlier broadcasts still in the mempool skew the pending count;
        // let them settle before reserving a nonce on top of them.
        wait_for_pending_settled(self.ledger.as_ref(), &self.config).await?;
        let tx_hash = self.broadcast_with_retries(call).await?;
        self.await_confirmation(tx_hash).await
    }

    async fn broadcast_with_retries(&self, call: &VoteCall) -> Result<H256, RelayError> {
        let attempts = self.config.vote_max_retries + 1;
        let mut last_error = String::new();
        for attempt in 0..attempts {
            if attempt > 0 {
                tokio::time::sleep(self.config.vote_backoff_for(attempt - 1)).await;
            }
            match self.attempt(call, attempt).await {
                Ok(tx_hash) => {
                    tracing::info!(tx = %tx_hash, attempt, "vote broadcast");
                    return Ok(tx_hash);
                }
                Err(err) => {
                    match &err {
                        SubmitError::Reverted(reason) => {
                            return Err(RelayError::ProofRejected(reason.clone()));
                        }
                        SubmitError::InsufficientFunds => {
                            let balance_wei = self.ledger.balance().await.unwrap_or_default();
                            return Err(RelayError::InsufficientFunds {
                                balance_wei,
                                required_wei: self.config.min_balance_wei,
                            });
                        }
                        _ => {
                            tracing::warn!(attempt, error = %err, "vote broadcast attempt failed");
                            last_error = err.to_string();
                        }
                    }
                }
            }
        }
        Err(RelayError::SubmissionFailed(last_error))
    }

    async fn attempt(&self, call: &VoteCall, attempt: u32) -> Result<H256, SubmitError> {
        let gas = self.ledger.estimate_vote_gas(call).await?;
        let gas_limit = gas
            .saturating_mul(u64::from(self.config.gas_margin_pct))
            / 100;
        let fees = self
            .ledger
            .fee_estimate()
            .await
            .map_err(|e| SubmitError::Rpc(e.to_string()))?
            .scaled(self.config.fee_pct_for_attempt(attempt));
        let lease = self
            .nonces
            .reserve(self.ledger.as_ref())
            .await
            .map_err(|e| SubmitError::Rpc(e.to_string()))?;
        let params = TxParams {
            nonce: lease.nonce(),
            gas_limit,
            fees,
        };
        match self.ledger.submit_vote(call, &params).await {
            Ok(tx_hash) => {
                lease.commit();
                Ok(tx_hash)
            }
            Err(err) => {
                if err.invalidates_nonce() {
                    lease.clear();
                }
                Err(err)
            }
        }
    }

    /// Waits for the configured confirmation depth, logging a heartbeat so
    /// long waits are visibly alive. A timed-out wait falls back to one
    /// direct receipt lookup before degrading the outcome.
    pub async fn await_confirmation(&self, tx_hash: H256) -> Result<SubmitOutcome, RelayError> {
        let wait = self.ledger.wait_for_confirmations(
            tx_hash,
            self.config.vote_confirmations,
            self.config.confirmation_timeout,
        );
        tokio::pin!(wait);
        let mut heartbeat = tokio::time::interval(self.config.heartbeat_interval);
        heartbeat.tick().await;
        let waited = loop {
            tokio::select! {
                res = &mut wait => break res?,
                _ = heartbeat.tick() => {
                    tracing::info!(tx = %tx_hash, "still waiting for confirmations");
                }
            }
        };

        let receipt = match waited {
            Some(receipt) => Some(receipt),
            // The wait can time out while the receipt already exists on a
            // node we have not polled; one direct lookup rescues that case.
            None => self.ledger.transaction_receipt(tx_hash).await?,
        };

        match receipt {
            Some(receipt) => {
                if receipt.status == Some(U64::zero()) {
                    return Err(RelayError::ProofRejected(
                        "transaction reverted on chain".to_string(),
                    ));
                }
                Ok(SubmitOutcome::Confirmed { tx_hash, receipt })
            }
            None => {
                tracing::warn!(tx = %tx_hash, "confirmation deadline passed; reporting sent-unconfirmed");
                Ok(SubmitOutcome::SentUnconfirmed { tx_hash })
            }
        }
    }
}

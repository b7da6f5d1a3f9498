//! Lazy, exactly-once election creation.
//!
//! Elections are created the first time anything references them. Two
//! guards keep that single-flight: a process-wide creation lock, and a
//! re-check of existence after acquiring it so the loser of a race
//! observes the winner's work instead of double-creating.

use ethers::core::types::{H256, U256, U64};
use std::sync::Arc;
use std::time::Instant;

use velum_core::PollDefinition;

use crate::config::RelayConfig;
use crate::error::{RelayError, SubmitError};
use crate::ledger::{CreateElectionCall, Ledger, TxParams};
use crate::nonce::{wait_for_pending_settled, NonceCoordinator};

/// Ensures an on-ledger election exists before votes reference it.
pub struct ElectionEnsurer<L> {
    ledger: Arc<L>,
    nonces: Arc<NonceCoordinator>,
    config: RelayConfig,
    create_lock: tokio::sync::Mutex<()>,
}

impl<L: Ledger> ElectionEnsurer<L> {
    /// Creates an ensurer over the shared ledger and nonce coordinator.
    pub fn new(ledger: Arc<L>, nonces: Arc<NonceCoordinator>, config: RelayConfig) -> Self {
        Self {
            ledger,
            nonces,
            config,
            create_lock: tokio::sync::Mutex::new(()),
        }
    }

    /// Makes sure the election for `poll` exists under `poll_id`, creating
    /// it if needed and waiting until reads can see it.
    pub async fn ensure(&self, poll: &PollDefinition, poll_id: U256) -> Result<(), RelayError> {
        if self.ledger.election_exists(poll_id).await? {
            return Ok(());
        }

        let _guard = self.create_lock.lock().await;
        // A concurrent caller may have created it while we queued.
        if self.ledger.election_exists(poll_id).await? {
            return Ok(());
        }

        wait_for_pending_settled(self.ledger.as_ref(), &self.config).await?;

        let call = CreateElectionCall {
            poll_id,
            eligibility_root: poll.eligibility_root,
            start_time: poll.start_time,
            end_time: poll.end_time,
            candidates: poll.candidates.clone(),
        };
        let tx_hash = self.create_with_retries(&call).await?;
        self.wait_creation_confirmed(tx_hash).await?;
        self.wait_until_visible(poll_id).await
    }

    async fn create_with_retries(&self, call: &CreateElectionCall) -> Result<H256, RelayError> {
        let attempts = self.config.create_max_retries + 1;
        let mut last_error = String::new();
        for attempt in 0..attempts {
            if attempt > 0 {
                tokio::time::sleep(self.config.create_backoff_for(attempt - 1)).await;
            }
            match self.attempt(call, attempt).await {
                Ok(tx_hash) => {
                    tracing::info!(tx = %tx_hash, poll_id = %call.poll_id, "election creation broadcast");
                    return Ok(tx_hash);
                }
                Err(err) => {
                    if !err.is_retryable() {
                        return Err(RelayError::ElectionCreationFailed(err.to_string()));
                    }
                    tracing::warn!(attempt, error = %err, "election creation attempt failed");
                    last_error = err.to_string();
                }
            }
        }
        Err(RelayError::ElectionCreationFailed(last_error))
    }

    async fn attempt(&self, call: &CreateElectionCall, attempt: u32) -> Result<H256, SubmitError> {
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
            // Creation cost scales with the candidate list, not with proof
            // verification; a flat margin over a round base covers it.
            gas_limit: 500_000u64
                .saturating_mul(u64::from(self.config.gas_margin_pct))
                / 100,
            fees,
        };
        match self.ledger.submit_create_election(call, &params).await {
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

    async fn wait_creation_confirmed(&self, tx_hash: H256) -> Result<(), RelayError> {
        let receipt = self
            .ledger
            .wait_for_confirmations(
                tx_hash,
                self.config.create_confirmations,
                self.config.create_confirmation_timeout,
            )
            .await?;
        match receipt {
            Some(receipt) if receipt.status == Some(U64::zero()) => Err(
                RelayError::ElectionCreationFailed("creation transaction reverted".to_string()),
            ),
            Some(_) => Ok(()),
            // Visibility polling below decides whether the creation landed.
            None => {
                tracing::warn!(tx = %tx_hash, "creation confirmation deadline passed");
                Ok(())
            }
        }
    }

    /// Polls existence until reads observe the new election. A confirmed
    /// creation can still be invisible to a lagging read node for a while.
    async fn wait_until_visible(&self, poll_id: U256) -> Result<(), RelayError> {
        let deadline = Instant::now() + self.config.visibility_timeout;
        loop {
            if self.ledger.election_exists(poll_id).await? {
                return Ok(());
            }
            if Instant::now() >= deadline {
                return Err(RelayError::ElectionCreationFailed(
                    "election not visible after creation".to_string(),
                ));
            }
            tokio::time::sleep(self.config.visibility_poll_interval).await;
        }
    }
}

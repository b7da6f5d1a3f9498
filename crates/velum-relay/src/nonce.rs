//! Nonce coordination for the single relayer account.
//!
//! Concurrent submissions must never reuse a nonce, and lagging RPC nodes
//! must never hand out a stale one. A [`NonceLease`] holds the account
//! mutex from reservation until the broadcast resolves, so sends are
//! serialized while confirmation waits stay concurrent. The coordinator
//! remembers the last committed nonce briefly: while that memory is fresh
//! it outranks the network's pending count, which can lag right after a
//! broadcast.

use std::time::{Duration, Instant};
use tokio::sync::{Mutex, MutexGuard};

use crate::config::RelayConfig;
use crate::error::LedgerError;
use crate::ledger::{CountTag, Ledger};

#[derive(Default)]
struct Slot {
    last_committed: Option<u64>,
    committed_at: Option<Instant>,
}

/// Serializes nonce assignment for the relayer account.
pub struct NonceCoordinator {
    slot: Mutex<Slot>,
    ttl: Duration,
}

/// An exclusive claim on the next nonce, held across one broadcast.
///
/// Dropping the lease without [`commit`](Self::commit) leaves the cache
/// untouched, so a failed broadcast does not strand a nonce gap.
pub struct NonceLease<'a> {
    guard: MutexGuard<'a, Slot>,
    nonce: u64,
}

impl NonceLease<'_> {
    /// The reserved nonce.
    pub fn nonce(&self) -> u64 {
        self.nonce
    }

    /// Records the nonce as spent. Call only after the node accepted the
    /// transaction.
    pub fn commit(mut self) {
        self.guard.last_committed = Some(self.nonce);
        self.guard.committed_at = Some(Instant::now());
    }

    /// Drops the cached state entirely. Call after the node reported a
    /// nonce conflict, so the next reservation trusts the pending count.
    pub fn clear(mut self) {
        self.guard.last_committed = None;
        self.guard.committed_at = None;
    }
}

impl NonceCoordinator {
    /// Creates a coordinator whose cache stays authoritative for `ttl`.
    pub fn new(ttl: Duration) -> Self {
        Self {
            slot: Mutex::new(Slot::default()),
            ttl,
        }
    }

    /// Reserves the next nonce, holding the account lock until the
    /// returned lease is resolved.
    ///
    /// The pending count is always fetched; a fresh committed nonce wins
    /// only when it is at or ahead of the network, so an externally
    /// consumed nonce (another process, a manual transaction) resyncs
    /// automatically once the cache ages out or the network catches up.
    pub async fn reserve(&self, ledger: &dyn Ledger) -> Result<NonceLease<'_>, LedgerError> {
        let guard = self.slot.lock().await;
        let pending = ledger.transaction_count(CountTag::Pending).await?;
        let nonce = match (guard.last_committed, guard.committed_at) {
            (Some(committed), Some(at)) if at.elapsed() < self.ttl && committed + 1 >= pending => {
                committed + 1
            }
            _ => pending,
        };
        tracing::debug!(nonce, pending, "reserved nonce");
        Ok(NonceLease { guard, nonce })
    }
}

/// Waits until the account has no transactions in flight, or the deadline
/// passes. Pending ahead of latest means earlier broadcasts are still
/// unmined; stacking more nonces on top of them makes conflicts likelier,
/// so both the vote and the election-creation paths wait here before
/// broadcasting.
pub async fn wait_for_pending_settled(
    ledger: &dyn Ledger,
    config: &RelayConfig,
) -> Result<(), LedgerError> {
    let deadline = Instant::now() + config.pending_settle_timeout;
    loop {
        let pending = ledger.transaction_count(CountTag::Pending).await?;
        let latest = ledger.transaction_count(CountTag::Latest).await?;
        if pending <= latest {
            return Ok(());
        }
        if Instant::now() >= deadline {
            tracing::warn!(pending, latest, "proceeding with transactions still in flight");
            return Ok(());
        }
        tokio::time::sleep(config.pending_settle_poll).await;
    }
}

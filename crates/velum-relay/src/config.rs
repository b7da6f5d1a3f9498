//! Retry, fee and timing policy for the relay.

use ethers::core::types::U256;
use std::time::Duration;

/// All tunable policy in one place. Defaults match the values the relay
/// runs with in production; tests shrink the durations.
#[derive(Clone, Debug)]
pub struct RelayConfig {
    /// Fee multipliers per attempt, in percent. Attempt `n` uses entry
    /// `min(n, len - 1)`, so the last entry is the ceiling.
    pub fee_escalation_pct: Vec<u32>,
    /// Safety margin applied to the node's gas estimate, in percent.
    pub gas_margin_pct: u32,

    /// Vote retries after the first attempt.
    pub vote_max_retries: u32,
    /// Sleep before vote retry `n` (clamped to the last entry).
    pub vote_backoff: Vec<Duration>,
    /// Confirmation depth a vote must reach.
    pub vote_confirmations: usize,
    /// How long to wait for vote confirmations before degrading the
    /// outcome to sent-unconfirmed.
    pub confirmation_timeout: Duration,
    /// Progress log cadence during the confirmation wait.
    pub heartbeat_interval: Duration,

    /// Election-creation retries after the first attempt.
    pub create_max_retries: u32,
    /// Sleep before creation retry `n` (clamped to the last entry).
    pub create_backoff: Vec<Duration>,
    /// Confirmation depth for the creation transaction.
    pub create_confirmations: usize,
    /// How long to wait for the creation transaction to confirm.
    pub create_confirmation_timeout: Duration,

    /// Poll interval while waiting for a created election to become
    /// visible to reads.
    pub visibility_poll_interval: Duration,
    /// Deadline for election visibility after a confirmed creation.
    pub visibility_timeout: Duration,

    /// How long a handed-out nonce stays authoritative over the
    /// network's pending count.
    pub nonce_ttl: Duration,
    /// Poll interval while waiting for in-flight transactions to settle.
    pub pending_settle_poll: Duration,
    /// Deadline for the pending-settle wait; after this the relay
    /// proceeds with whatever the network reports.
    pub pending_settle_timeout: Duration,

    /// Hard floor on the relayer balance; below this every request is
    /// refused before any transaction is attempted.
    pub min_balance_wei: U256,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            fee_escalation_pct: vec![100, 150, 200],
            gas_margin_pct: 120,
            vote_max_retries: 2,
            vote_backoff: vec![
                Duration::from_secs(3),
                Duration::from_secs(5),
                Duration::from_secs(10),
            ],
            vote_confirmations: 2,
            confirmation_timeout: Duration::from_secs(300),
            heartbeat_interval: Duration::from_secs(30),
            create_max_retries: 2,
            create_backoff: vec![Duration::from_secs(5), Duration::from_secs(10)],
            create_confirmations: 1,
            create_confirmation_timeout: Duration::from_secs(30),
            visibility_poll_interval: Duration::from_secs(2),
            visibility_timeout: Duration::from_secs(120),
            nonce_ttl: Duration::from_secs(10),
            pending_settle_poll: Duration::from_secs(2),
            pending_settle_timeout: Duration::from_secs(20),
            // 0.001 ETH
            min_balance_wei: U256::exp10(15),
        }
    }
}

impl RelayConfig {
    /// Fee multiplier (percent) for attempt `attempt`, zero-based.
    pub fn fee_pct_for_attempt(&self, attempt: u32) -> u32 {
        let idx = (attempt as usize).min(self.fee_escalation_pct.len().saturating_sub(1));
        self.fee_escalation_pct.get(idx).copied().unwrap_or(100)
    }

    /// Backoff before retry `retry` of a vote, zero-based.
    pub fn vote_backoff_for(&self, retry: u32) -> Duration {
        Self::clamped(&self.vote_backoff, retry)
    }

    /// Backoff before retry `retry` of an election creation, zero-based.
    pub fn create_backoff_for(&self, retry: u32) -> Duration {
        Self::clamped(&self.create_backoff, retry)
    }

    fn clamped(schedule: &[Duration], retry: u32) -> Duration {
        match schedule.last() {
            Some(last) => *schedule
                .get(retry as usize)
                .unwrap_or(last),
            None => Duration::ZERO,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escalation_clamps_to_last_entry() {
        let cfg = RelayConfig::default();
        assert_eq!(cfg.fee_pct_for_attempt(0), 100);
        assert_eq!(cfg.fee_pct_for_attempt(1), 150);
        assert_eq!(cfg.fee_pct_for_attempt(2), 200);
        assert_eq!(cfg.fee_pct_for_attempt(9), 200);
    }

    #[test]
    fn backoff_clamps_to_last_entry() {
        let cfg = RelayConfig::default();
        assert_eq!(cfg.vote_backoff_for(0), Duration::from_secs(3));
        assert_eq!(cfg.vote_backoff_for(2), Duration::from_secs(10));
        assert_eq!(cfg.vote_backoff_for(7), Duration::from_secs(10));
        assert_eq!(cfg.create_backoff_for(5), Duration::from_secs(10));
    }

    #[test]
    fn default_floor_is_a_milliether() {
        let cfg = RelayConfig::default();
        assert_eq!(cfg.min_balance_wei, U256::from(1_000_000_000_000_000u64));
    }
}

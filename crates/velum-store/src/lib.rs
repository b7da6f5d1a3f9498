#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]

//! Persistence collaborators for the velum relay.
//!
//! Two contracts, deliberately narrow:
//! - [`PollStore`]: canonical poll definitions and the voter registry
//! - [`VoteStore`]: keyed-upsert cache of vote receipts, one row per
//!   submission event, keyed by nullifier within a poll
//!
//! [`SledStore`] is the production implementation; [`MemoryStore`] backs
//! tests and local development. [`aggregate`] holds the last-submission-wins
//! reduction that is the sole admissible input to tallying.

pub mod aggregate;
pub mod memory;
pub mod sled_store;

use async_trait::async_trait;

use velum_core::{Digest, PollDefinition, VoteRecord};

pub use aggregate::{tally, valid_votes};
pub use memory::MemoryStore;
pub use sled_store::SledStore;

/// Errors produced by the persistence layer.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Underlying storage engine failure.
    #[error("storage backend: {0}")]
    Backend(String),

    /// Value failed to (de)serialize.
    #[error("serialization: {0}")]
    Serialization(String),

    /// No poll definition exists under the given id.
    #[error("poll not found: {0}")]
    PollNotFound(String),
}

impl From<sled::Error> for StoreError {
    fn from(err: sled::Error) -> Self {
        Self::Backend(err.to_string())
    }
}

impl From<std::io::Error> for StoreError {
    fn from(err: std::io::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

/// Canonical poll definitions.
#[async_trait]
pub trait PollStore: Send + Sync {
    /// Fetches a poll definition by its application-level id.
    async fn get_poll(&self, poll_id: &str) -> Result<Option<PollDefinition>, StoreError>;

    /// Inserts or replaces a poll definition.
    async fn put_poll(&self, poll: PollDefinition) -> Result<(), StoreError>;

    /// Appends an identity secret to the poll's voter registry.
    ///
    /// Idempotent: re-registering a known identity is a no-op. Returns the
    /// updated definition so callers can recompute the eligibility root.
    async fn register_voter(
        &self,
        poll_id: &str,
        identity: Digest,
    ) -> Result<PollDefinition, StoreError>;
}

/// Keyed-upsert cache of vote receipts.
#[async_trait]
pub trait VoteStore: Send + Sync {
    /// Inserts or replaces the record keyed by its nullifier within its
    /// poll. Records without a nullifier are keyed by transaction hash.
    async fn upsert_by_nullifier(&self, record: VoteRecord) -> Result<(), StoreError>;

    /// All records for a poll, newest first by `confirmed_at_ms`.
    async fn find_all_for_poll(&self, poll_id: &str) -> Result<Vec<VoteRecord>, StoreError>;

    /// The record currently stored under a nullifier, if any.
    async fn find_by_nullifier(
        &self,
        poll_id: &str,
        nullifier: &Digest,
    ) -> Result<Option<VoteRecord>, StoreError>;
}

/// Storage key for a vote record: nullifier when present, otherwise the
/// transaction hash. Keeps legacy rows addressable without colliding.
pub(crate) fn record_key(record: &VoteRecord) -> String {
    match &record.nullifier {
        Some(n) => n.to_string(),
        None => record.tx_hash.to_string(),
    }
}

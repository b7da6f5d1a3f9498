//! In-memory store for tests and local development.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;

use velum_core::{Digest, PollDefinition, VoteRecord};

use crate::{record_key, PollStore, StoreError, VoteStore};

/// Hash-map backed store with the same semantics as the sled backend.
#[derive(Default)]
pub struct MemoryStore {
    polls: Mutex<HashMap<String, PollDefinition>>,
    // Outer key: poll id. Inner key: nullifier hex or tx hash hex.
    votes: Mutex<HashMap<String, HashMap<String, VoteRecord>>>,
}

impl MemoryStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock_poisoned() -> StoreError {
        StoreError::Backend("store mutex poisoned".to_string())
    }
}

#[async_trait]
impl PollStore for MemoryStore {
    async fn get_poll(&self, poll_id: &str) -> Result<Option<PollDefinition>, StoreError> {
        let polls = self.polls.lock().map_err(|_| Self::lock_poisoned())?;
        Ok(polls.get(poll_id).cloned())
    }

    async fn put_poll(&self, poll: PollDefinition) -> Result<(), StoreError> {
        let mut polls = self.polls.lock().map_err(|_| Self::lock_poisoned())?;
        polls.insert(poll.poll_id.clone(), poll);
        Ok(())
    }

    async fn register_voter(
        &self,
        poll_id: &str,
        identity: Digest,
    ) -> Result<PollDefinition, StoreError> {
        let mut polls = self.polls.lock().map_err(|_| Self::lock_poisoned())?;
        let poll = polls
            .get_mut(poll_id)
            .ok_or_else(|| StoreError::PollNotFound(poll_id.to_string()))?;
        if !poll.registered_voters.contains(&identity) {
            poll.registered_voters.push(identity);
        }
        Ok(poll.clone())
    }
}

#[async_trait]
impl VoteStore for MemoryStore {
    async fn upsert_by_nullifier(&self, record: VoteRecord) -> Result<(), StoreError> {
        let mut votes = self.votes.lock().map_err(|_| Self::lock_poisoned())?;
        votes
            .entry(record.poll_id.clone())
            .or_default()
            .insert(record_key(&record), record);
        Ok(())
    }

    async fn find_all_for_poll(&self, poll_id: &str) -> Result<Vec<VoteRecord>, StoreError> {
        let votes = self.votes.lock().map_err(|_| Self::lock_poisoned())?;
        let mut records: Vec<VoteRecord> = votes
            .get(poll_id)
            .map(|by_key| by_key.values().cloned().collect())
            .unwrap_or_default();
        records.sort_by(|a, b| b.confirmed_at_ms.cmp(&a.confirmed_at_ms));
        Ok(records)
    }

    async fn find_by_nullifier(
        &self,
        poll_id: &str,
        nullifier: &Digest,
    ) -> Result<Option<VoteRecord>, StoreError> {
        let votes = self.votes.lock().map_err(|_| Self::lock_poisoned())?;
        Ok(votes
            .get(poll_id)
            .and_then(|by_key| by_key.get(&nullifier.to_string()))
            .cloned())
    }
}

//! Sled-backed persistence.
//!
//! Two trees: `polls` keyed by the application poll id, `votes` keyed by
//! `"{poll_id}/{key}"` where `key` is the nullifier hex (or the transaction
//! hash hex for legacy rows). Values are borsh-encoded. The composite key
//! makes upsert-by-nullifier a single tree insert and lets a poll's records
//! be scanned as one prefix range.

use async_trait::async_trait;
use borsh::BorshDeserialize;
use std::path::Path;

use velum_core::{Digest, PollDefinition, VoteRecord};

use crate::{record_key, PollStore, StoreError, VoteStore};

const POLLS_TREE: &str = "polls";
const VOTES_TREE: &str = "votes";

/// Persistent store backed by an embedded sled database.
pub struct SledStore {
    polls: sled::Tree,
    votes: sled::Tree,
}

impl SledStore {
    /// Opens (or creates) the database at `path`.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        let db = sled::open(path)?;
        Ok(Self {
            polls: db.open_tree(POLLS_TREE)?,
            votes: db.open_tree(VOTES_TREE)?,
        })
    }

    fn vote_key(poll_id: &str, key: &str) -> Vec<u8> {
        format!("{poll_id}/{key}").into_bytes()
    }

    fn vote_prefix(poll_id: &str) -> Vec<u8> {
        format!("{poll_id}/").into_bytes()
    }
}

#[async_trait]
impl PollStore for SledStore {
    async fn get_poll(&self, poll_id: &str) -> Result<Option<PollDefinition>, StoreError> {
        match self.polls.get(poll_id.as_bytes())? {
            Some(bytes) => {
                let poll = PollDefinition::try_from_slice(&bytes)?;
                Ok(Some(poll))
            }
            None => Ok(None),
        }
    }

    async fn put_poll(&self, poll: PollDefinition) -> Result<(), StoreError> {
        let bytes = borsh::to_vec(&poll)?;
        self.polls.insert(poll.poll_id.as_bytes(), bytes)?;
        self.polls.flush_async().await?;
        Ok(())
    }

    async fn register_voter(
        &self,
        poll_id: &str,
        identity: Digest,
    ) -> Result<PollDefinition, StoreError> {
        let mut poll = self
            .get_poll(poll_id)
            .await?
            .ok_or_else(|| StoreError::PollNotFound(poll_id.to_string()))?;
        if !poll.registered_voters.contains(&identity) {
            poll.registered_voters.push(identity);
            self.put_poll(poll.clone()).await?;
        }
        Ok(poll)
    }
}

#[async_trait]
impl VoteStore for SledStore {
    async fn upsert_by_nullifier(&self, record: VoteRecord) -> Result<(), StoreError> {
        let key = Self::vote_key(&record.poll_id, &record_key(&record));
        let bytes = borsh::to_vec(&record)?;
        self.votes.insert(key, bytes)?;
        self.votes.flush_async().await?;
        Ok(())
    }

    async fn find_all_for_poll(&self, poll_id: &str) -> Result<Vec<VoteRecord>, StoreError> {
        let mut records = Vec::new();
        for item in self.votes.scan_prefix(Self::vote_prefix(poll_id)) {
            let (_, bytes) = item?;
            records.push(VoteRecord::try_from_slice(&bytes)?);
        }
        records.sort_by(|a, b| b.confirmed_at_ms.cmp(&a.confirmed_at_ms));
        Ok(records)
    }

    async fn find_by_nullifier(
        &self,
        poll_id: &str,
        nullifier: &Digest,
    ) -> Result<Option<VoteRecord>, StoreError> {
        let key = Self::vote_key(poll_id, &nullifier.to_string());
        match self.votes.get(key)? {
            Some(bytes) => {
                let record = VoteRecord::try_from_slice(&bytes)?;
                Ok(Some(record))
            }
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use velum_core::VoteStatus;

    fn sample_poll(id: &str) -> PollDefinition {
        PollDefinition {
            poll_id: id.to_string(),
            title: "Municipal budget".to_string(),
            candidates: vec!["Yes".into(), "No".into()],
            start_time: 1_700_000_000,
            end_time: 1_700_086_400,
            eligibility_root: Digest::zero(),
            registered_voters: Vec::new(),
        }
    }

    fn sample_record(poll_id: &str, nullifier: u64, at_ms: i64) -> VoteRecord {
        VoteRecord {
            poll_id: poll_id.to_string(),
            candidate_index: 0,
            nullifier: Some(Digest::from_u64(nullifier)),
            tx_hash: Digest::from_u64(0xabc + nullifier),
            eligibility_root: Digest::zero(),
            vote_commitment: Digest::from_u64(9),
            status: VoteStatus::Confirmed,
            confirmed_at_ms: at_ms,
        }
    }

    #[tokio::test]
    async fn poll_round_trip_and_reopen() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = SledStore::open(dir.path()).unwrap();
            store.put_poll(sample_poll("p1")).await.unwrap();
        }
        let store = SledStore::open(dir.path()).unwrap();
        let poll = store.get_poll("p1").await.unwrap().unwrap();
        assert_eq!(poll.title, "Municipal budget");
        assert!(store.get_poll("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn register_voter_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let store = SledStore::open(dir.path()).unwrap();
        store.put_poll(sample_poll("p1")).await.unwrap();

        let identity = Digest::from_u64(42);
        let poll = store.register_voter("p1", identity).await.unwrap();
        assert_eq!(poll.registered_voters, vec![identity]);
        let poll = store.register_voter("p1", identity).await.unwrap();
        assert_eq!(poll.registered_voters.len(), 1);

        assert!(matches!(
            store.register_voter("absent", identity).await,
            Err(StoreError::PollNotFound(_))
        ));
    }

    #[tokio::test]
    async fn upsert_replaces_record_under_same_nullifier() {
        let dir = tempfile::tempdir().unwrap();
        let store = SledStore::open(dir.path()).unwrap();

        store.upsert_by_nullifier(sample_record("p1", 7, 100)).await.unwrap();
        let mut newer = sample_record("p1", 7, 200);
        newer.candidate_index = 1;
        store.upsert_by_nullifier(newer).await.unwrap();

        let records = store.find_all_for_poll("p1").await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].candidate_index, 1);
        assert_eq!(records[0].confirmed_at_ms, 200);

        let found = store
            .find_by_nullifier("p1", &Digest::from_u64(7))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.candidate_index, 1);
    }

    #[tokio::test]
    async fn find_all_is_newest_first_and_poll_scoped() {
        let dir = tempfile::tempdir().unwrap();
        let store = SledStore::open(dir.path()).unwrap();

        store.upsert_by_nullifier(sample_record("p1", 1, 300)).await.unwrap();
        store.upsert_by_nullifier(sample_record("p1", 2, 100)).await.unwrap();
        store.upsert_by_nullifier(sample_record("p1", 3, 200)).await.unwrap();
        store.upsert_by_nullifier(sample_record("p2", 4, 999)).await.unwrap();

        let records = store.find_all_for_poll("p1").await.unwrap();
        let times: Vec<i64> = records.iter().map(|r| r.confirmed_at_ms).collect();
        assert_eq!(times, vec![300, 200, 100]);
    }

    #[tokio::test]
    async fn legacy_record_without_nullifier_keys_by_tx_hash() {
        let dir = tempfile::tempdir().unwrap();
        let store = SledStore::open(dir.path()).unwrap();

        let mut legacy = sample_record("p1", 0, 50);
        legacy.nullifier = None;
        store.upsert_by_nullifier(legacy.clone()).await.unwrap();
        store.upsert_by_nullifier(legacy).await.unwrap();

        let records = store.find_all_for_poll("p1").await.unwrap();
        assert_eq!(records.len(), 1);
        assert!(records[0].nullifier.is_none());
    }
}

//! Scripted ledger double shared by the relay flow tests.

use async_trait::async_trait;
use ethers::core::types::{Bytes, Log, TransactionReceipt, H256, U256, U64};
use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use velum_core::Election;
use velum_relay::eth::VoteCastFilter;
use velum_relay::{
    CountTag, CreateElectionCall, FeeEstimate, Ledger, LedgerError, RelayConfig, SubmitError,
    TxParams, VoteCall,
};

/// What one queued confirmation wait resolves to.
pub enum ConfirmBehavior {
    Receipt(TransactionReceipt),
    Timeout,
}

/// Ledger double: counters and queues the tests script, recorded
/// parameters the tests assert on.
pub struct MockLedger {
    pub balance: Mutex<U256>,
    pub pending_count: AtomicU64,
    pub latest_count: AtomicU64,
    /// How many times the latest count was read; only the settle wait
    /// reads it.
    pub latest_queries: AtomicU64,
    /// Errors to yield from `submit_vote`, in order, before succeeding.
    pub vote_errors: Mutex<VecDeque<SubmitError>>,
    /// Errors to yield from `estimate_vote_gas`, in order.
    pub gas_errors: Mutex<VecDeque<SubmitError>>,
    /// Errors to yield from `submit_create_election`, in order.
    pub create_errors: Mutex<VecDeque<SubmitError>>,
    /// Parameters of every vote broadcast attempt, including failed ones.
    pub vote_params: Mutex<Vec<TxParams>>,
    /// Parameters of every creation broadcast attempt.
    pub create_params: Mutex<Vec<TxParams>>,
    /// Scripted confirmation outcomes; empty means a clean success
    /// receipt with no logs.
    pub confirmations: Mutex<VecDeque<ConfirmBehavior>>,
    /// Receipt returned by the direct lookup fallback.
    pub manual_receipt: Mutex<Option<TransactionReceipt>>,
    pub elections: Mutex<HashSet<U256>>,
    next_tx: AtomicU64,
}

impl Default for MockLedger {
    fn default() -> Self {
        Self {
            balance: Mutex::new(U256::exp10(18)),
            pending_count: AtomicU64::new(0),
            latest_count: AtomicU64::new(0),
            latest_queries: AtomicU64::new(0),
            vote_errors: Mutex::new(VecDeque::new()),
            gas_errors: Mutex::new(VecDeque::new()),
            create_errors: Mutex::new(VecDeque::new()),
            vote_params: Mutex::new(Vec::new()),
            create_params: Mutex::new(Vec::new()),
            confirmations: Mutex::new(VecDeque::new()),
            manual_receipt: Mutex::new(None),
            elections: Mutex::new(HashSet::new()),
            next_tx: AtomicU64::new(1),
        }
    }
}

impl MockLedger {
    pub fn new() -> Self {
        Self::default()
    }

    fn next_tx_hash(&self) -> H256 {
        H256::from_low_u64_be(self.next_tx.fetch_add(1, Ordering::SeqCst))
    }
}

pub fn success_receipt(logs: Vec<Log>) -> TransactionReceipt {
    TransactionReceipt {
        status: Some(U64::one()),
        logs,
        ..Default::default()
    }
}

/// A well-formed `VoteCast` log.
pub fn vote_cast_log(
    poll_id: U256,
    nullifier: U256,
    candidate: u8,
    commitment: U256,
    is_update: bool,
) -> Log {
    let mut data = vec![0u8; 96];
    data[31] = candidate;
    commitment.to_big_endian(&mut data[32..64]);
    if is_update {
        data[95] = 1;
    }
    let mut topic1 = [0u8; 32];
    poll_id.to_big_endian(&mut topic1);
    let mut topic2 = [0u8; 32];
    nullifier.to_big_endian(&mut topic2);
    Log {
        topics: vec![
            <VoteCastFilter as ethers::contract::EthEvent>::signature(),
            H256(topic1),
            H256(topic2),
        ],
        data: Bytes::from(data),
        ..Default::default()
    }
}

/// Policy with real ratios but millisecond timing.
pub fn test_config() -> RelayConfig {
    RelayConfig {
        vote_backoff: vec![Duration::from_millis(1)],
        create_backoff: vec![Duration::from_millis(1)],
        confirmation_timeout: Duration::from_millis(50),
        heartbeat_interval: Duration::from_millis(10),
        create_confirmation_timeout: Duration::from_millis(50),
        visibility_poll_interval: Duration::from_millis(1),
        visibility_timeout: Duration::from_millis(50),
        pending_settle_poll: Duration::from_millis(1),
        pending_settle_timeout: Duration::from_millis(10),
        ..RelayConfig::default()
    }
}

#[async_trait]
impl Ledger for MockLedger {
    fn contract_address(&self) -> ethers::core::types::Address {
        ethers::core::types::Address::zero()
    }

    async fn balance(&self) -> Result<U256, LedgerError> {
        Ok(*self.balance.lock().unwrap())
    }

    async fn transaction_count(&self, tag: CountTag) -> Result<u64, LedgerError> {
        Ok(match tag {
            CountTag::Pending => self.pending_count.load(Ordering::SeqCst),
            CountTag::Latest => {
                self.latest_queries.fetch_add(1, Ordering::SeqCst);
                self.latest_count.load(Ordering::SeqCst)
            }
        })
    }

    async fn fee_estimate(&self) -> Result<FeeEstimate, LedgerError> {
        Ok(FeeEstimate {
            max_fee_per_gas: U256::from(1_000u64),
            max_priority_fee_per_gas: U256::from(100u64),
        })
    }

    async fn estimate_vote_gas(&self, _call: &VoteCall) -> Result<u64, SubmitError> {
        if let Some(err) = self.gas_errors.lock().unwrap().pop_front() {
            return Err(err);
        }
        Ok(100_000)
    }

    async fn submit_vote(&self, _call: &VoteCall, params: &TxParams) -> Result<H256, SubmitError> {
        self.vote_params.lock().unwrap().push(*params);
        if let Some(err) = self.vote_errors.lock().unwrap().pop_front() {
            return Err(err);
        }
        self.pending_count.fetch_add(1, Ordering::SeqCst);
        Ok(self.next_tx_hash())
    }

    async fn submit_create_election(
        &self,
        call: &CreateElectionCall,
        params: &TxParams,
    ) -> Result<H256, SubmitError> {
        self.create_params.lock().unwrap().push(*params);
        if let Some(err) = self.create_errors.lock().unwrap().pop_front() {
            return Err(err);
        }
        self.elections.lock().unwrap().insert(call.poll_id);
        Ok(self.next_tx_hash())
    }

    async fn wait_for_confirmations(
        &self,
        _tx: H256,
        _confirmations: usize,
        _timeout: Duration,
    ) -> Result<Option<TransactionReceipt>, LedgerError> {
        match self.confirmations.lock().unwrap().pop_front() {
            Some(ConfirmBehavior::Receipt(receipt)) => Ok(Some(receipt)),
            Some(ConfirmBehavior::Timeout) => Ok(None),
            None => Ok(Some(success_receipt(Vec::new()))),
        }
    }

    async fn transaction_receipt(
        &self,
        _tx: H256,
    ) -> Result<Option<TransactionReceipt>, LedgerError> {
        Ok(self.manual_receipt.lock().unwrap().clone())
    }

    async fn election_exists(&self, poll_id: U256) -> Result<bool, LedgerError> {
        Ok(self.elections.lock().unwrap().contains(&poll_id))
    }

    async fn get_election(&self, _poll_id: U256) -> Result<Option<Election>, LedgerError> {
        Ok(None)
    }

    async fn get_candidates(&self, _poll_id: U256) -> Result<Vec<String>, LedgerError> {
        Ok(Vec::new())
    }

    async fn has_voted(&self, _poll_id: U256, _nullifier: U256) -> Result<bool, LedgerError> {
        Ok(false)
    }
}

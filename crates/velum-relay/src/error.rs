//! Error taxonomy for the relay.
//!
//! Three layers, coarsest last: [`SubmitError`] classifies a single
//! broadcast attempt (it drives the retry loop), [`LedgerError`] covers
//! plain RPC reads, and [`RelayError`] is the surface the API maps to a
//! response, each variant carrying a stable machine-readable code.

use ethers::core::types::U256;

use velum_core::CoreError;
use velum_store::StoreError;

/// Failure of a plain ledger read (balance, counts, receipts, views).
#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    /// The RPC node returned an error or the transport failed.
    #[error("rpc: {0}")]
    Rpc(String),
}

/// Classified failure of one broadcast or gas-estimation attempt.
///
/// Classification decides the retry loop's next move, so each variant
/// answers two questions: is another attempt worthwhile, and is the
/// reserved nonce now suspect.
#[derive(Debug, thiserror::Error)]
pub enum SubmitError {
    /// The node simulated the call and it reverted. Not retryable: the
    /// same calldata will revert again.
    #[error("execution reverted: {0}")]
    Reverted(String),

    /// The reserved nonce was already consumed on the network.
    #[error("nonce too low")]
    NonceTooLow,

    /// A transaction with this nonce is already in the mempool and the
    /// new fees do not outbid it.
    #[error("replacement transaction underpriced")]
    ReplacementUnderpriced,

    /// The sender cannot cover gas for this transaction.
    #[error("insufficient funds for gas")]
    InsufficientFunds,

    /// Transport or node failure with no known classification.
    #[error("rpc: {0}")]
    Rpc(String),
}

impl SubmitError {
    /// Whether another attempt with fresh nonce and higher fees can
    /// plausibly succeed.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, Self::Reverted(_) | Self::InsufficientFunds)
    }

    /// Whether the nonce cache must be dropped before the next attempt.
    pub fn invalidates_nonce(&self) -> bool {
        matches!(self, Self::NonceTooLow | Self::ReplacementUnderpriced)
    }
}

/// Top-level relay failure, one variant per API-visible outcome.
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    /// The relay is missing required configuration (key, RPC URL,
    /// contract address).
    #[error("relayer not configured: {0}")]
    NotConfigured(String),

    /// The relayer account balance is below the operating floor.
    #[error("relayer balance {balance_wei} wei below operating floor {required_wei} wei")]
    InsufficientFunds {
        /// Current balance in wei.
        balance_wei: U256,
        /// Configured floor in wei.
        required_wei: U256,
    },

    /// No poll definition exists under the requested id.
    #[error("poll not found: {0}")]
    PollNotFound(String),

    /// The identity is not in the poll's voter registry.
    #[error("identity not registered for poll {0}")]
    VoterNotRegistered(String),

    /// The request payload failed a local validity check.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// The proof was rejected by contract simulation or failed a local
    /// consistency check.
    #[error("proof rejected: {0}")]
    ProofRejected(String),

    /// The election could not be created or did not become visible.
    #[error("election creation failed: {0}")]
    ElectionCreationFailed(String),

    /// The vote transaction exhausted its retries without a broadcast.
    #[error("submission failed: {0}")]
    SubmissionFailed(String),

    /// A ledger read failed outside any retry loop.
    #[error(transparent)]
    Ledger(#[from] LedgerError),

    /// The persistence layer failed.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// A request payload failed to parse into core types.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// Eligibility tree construction or proving failed.
    #[error(transparent)]
    Tree(#[from] velum_tree::TreeError),
}

impl RelayError {
    /// Stable machine-readable code for API responses. Codes never change
    /// once published; clients dispatch on them.
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotConfigured(_) => "RELAYER_NOT_CONFIGURED",
            Self::InsufficientFunds { .. } => "INSUFFICIENT_FUNDS",
            Self::PollNotFound(_) => "POLL_NOT_FOUND",
            Self::VoterNotRegistered(_) => "VOTER_NOT_REGISTERED",
            Self::ProofRejected(_) => "PROOF_REJECTED",
            Self::ElectionCreationFailed(_) => "ELECTION_CREATION_FAILED",
            Self::SubmissionFailed(_) | Self::Ledger(_) => "SUBMISSION_FAILED",
            Self::Store(_) => "STORAGE_ERROR",
            Self::InvalidRequest(_) | Self::Core(_) | Self::Tree(_) => "INVALID_REQUEST",
        }
    }
}

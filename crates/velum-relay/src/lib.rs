#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]

//! Transaction orchestration for the velum relay.
//!
//! The relay is the sole transaction sender for the voting contract, so
//! everything here is built around one account's nonce stream:
//!
//! - [`NonceCoordinator`] serializes nonce assignment across concurrent
//!   submissions and caches the last handout briefly to ride out lagging
//!   RPC nodes.
//! - [`ElectionEnsurer`] creates on-ledger elections lazily, exactly once,
//!   and waits for them to become visible before any vote references them.
//! - [`VoteSubmitter`] broadcasts votes with escalating fees, bounded
//!   retries and a confirmation wait that degrades to a sent-unconfirmed
//!   verdict rather than failing.
//! - [`Relayer`] ties the above to the persistence layer and produces the
//!   receipt the API surface returns.
//!
//! All ledger access goes through the [`Ledger`] trait; [`EthersLedger`]
//! is the JSON-RPC implementation.

pub mod config;
pub mod election;
pub mod error;
pub mod eth;
pub mod events;
pub mod ledger;
pub mod nonce;
pub mod orchestrator;
pub mod poll_id;
pub mod submit;

pub use config::RelayConfig;
pub use election::ElectionEnsurer;
pub use error::{LedgerError, RelayError, SubmitError};
pub use eth::EthersLedger;
pub use events::ParsedVoteCast;
pub use ledger::{CountTag, CreateElectionCall, FeeEstimate, Ledger, TxParams, VoteCall};
pub use nonce::{NonceCoordinator, NonceLease};
pub use orchestrator::{PollResults, RelayReceipt, RelayRequest, Relayer};
pub use submit::{SubmitOutcome, VoteSubmitter};

//! Vote receipt log parsing.
//!
//! The authoritative record of what the contract did is the `VoteCast`
//! log, not the request we sent. Only logs emitted by the voting contract
//! itself are considered. Decoding is layered: the typed decoder handles
//! well-formed logs, and a loose ABI decode catches logs whose data words
//! do not match the generated shape. The `isUpdate` flag is always read
//! from its raw word, so any nonzero value counts as true no matter which
//! decoder ran.

use ethers::contract::EthEvent;
use ethers::core::abi::{self, ParamType, RawLog, Token};
use ethers::core::types::{Address, Log, TransactionReceipt, U256};

use crate::eth::VoteCastFilter;

/// A decoded `VoteCast` event.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ParsedVoteCast {
    /// Numeric poll id the vote landed in.
    pub poll_id: U256,
    /// Nullifier the contract recorded.
    pub nullifier: U256,
    /// Candidate index the contract recorded.
    pub candidate_index: u8,
    /// Vote commitment the contract recorded.
    pub vote_commitment: U256,
    /// Whether this submission replaced an earlier vote.
    pub is_update: bool,
}

/// Extracts the `VoteCast` event from a receipt, if one is present and
/// decodable. Logs from other contracts are skipped even when their topic
/// collides. `None` is not an error: callers fall back to their cached
/// view of the vote.
pub fn parse_vote_cast(receipt: &TransactionReceipt, contract: Address) -> Option<ParsedVoteCast> {
    let signature = VoteCastFilter::signature();
    receipt
        .logs
        .iter()
        .filter(|log| log.address == contract && log.topics.first() == Some(&signature))
        .find_map(|log| decode_typed(log).or_else(|| decode_loose(log)))
}

fn decode_typed(log: &Log) -> Option<ParsedVoteCast> {
    let raw = RawLog {
        topics: log.topics.clone(),
        data: log.data.to_vec(),
    };
    let event = VoteCastFilter::decode_log(&raw).ok()?;
    // The generated decoder folds a non-canonical bool word to a plain
    // bool without erroring; the raw word is the ground truth.
    let is_update = update_word(log).unwrap_or(event.is_update);
    Some(ParsedVoteCast {
        poll_id: event.poll_id,
        nullifier: event.nullifier,
        candidate_index: event.candidate,
        vote_commitment: event.vote_commitment,
        is_update,
    })
}

/// The `isUpdate` flag straight from its data word, nonzero meaning true.
fn update_word(log: &Log) -> Option<bool> {
    let word = log.data.get(64..96)?;
    Some(!U256::from_big_endian(word).is_zero())
}

fn decode_loose(log: &Log) -> Option<ParsedVoteCast> {
    let poll_id = topic_u256(log, 1)?;
    let nullifier = topic_u256(log, 2)?;

    let shape = [
        ParamType::Uint(8),
        ParamType::Uint(256),
        ParamType::Uint(256),
    ];
    let tokens = abi::decode(&shape, &log.data).ok()?;
    tokens_to_event(poll_id, nullifier, &tokens)
}

fn topic_u256(log: &Log, index: usize) -> Option<U256> {
    log.topics
        .get(index)
        .map(|topic| U256::from_big_endian(topic.as_bytes()))
}

fn tokens_to_event(poll_id: U256, nullifier: U256, tokens: &[Token]) -> Option<ParsedVoteCast> {
    let candidate = match tokens.first()? {
        Token::Uint(v) => u8::try_from(v.low_u64()).ok()?,
        _ => return None,
    };
    let vote_commitment = match tokens.get(1)? {
        Token::Uint(v) => *v,
        _ => return None,
    };
    let is_update = match tokens.get(2)? {
        Token::Uint(v) => !v.is_zero(),
        _ => return None,
    };
    Some(ParsedVoteCast {
        poll_id,
        nullifier,
        candidate_index: candidate,
        vote_commitment,
        is_update,
    })
}

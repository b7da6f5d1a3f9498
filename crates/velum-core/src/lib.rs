#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]

//! Velum protocol types (v0).
//!
//! This crate defines the data model shared by the eligibility tree, the
//! persistence layer, and the relay: field-element digests, the fixed
//! 4-tuple of public signals, proof tuples, election and vote records, and
//! the two-input Poseidon hash that binds them together.
//!
//! Nothing in here performs I/O; all network and storage concerns live in
//! the downstream crates.

pub mod constants;
pub mod poseidon;
pub mod types;

pub use constants::*;
pub use poseidon::*;
pub use types::*;

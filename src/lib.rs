//! Vote-extension price oracle
//!
//! Validators attest to off-chain prices through vote extensions; the next
//! proposer folds them into stake-weighted prices that every validator
//! recomputes before committing.

pub mod abci;
pub mod config;
pub mod error;
pub mod logging;
pub mod oracle;
pub mod state;
pub mod types;

pub use error::{OracleError, Result};

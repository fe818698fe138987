//! Crate-level errors

use thiserror::Error;
use transitive::Transitive;

use crate::{
    collateral::CollateralError,
    config::ConfigError,
    ledger::LedgerError,
    math::{Fixed, LmsrError, MathError},
    state::MarketError,
};

#[derive(Debug, Error, Transitive)]
#[transitive(from(MathError, LmsrError))]
pub enum Error {
    #[error("market is already initialized")]
    AlreadyInitialized,
    #[error(transparent)]
    Collateral(#[from] CollateralError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("insufficient shares: {required} required, {available} available")]
    InsufficientShares { required: u128, available: u128 },
    #[error("invalid amount {amount}")]
    InvalidAmount { amount: Fixed },
    #[error("trade has non-positive cost {cost}")]
    InvalidTrade { cost: Fixed },
    #[error(transparent)]
    Ledger(#[from] LedgerError),
    #[error(transparent)]
    Lmsr(#[from] LmsrError),
    #[error(transparent)]
    Market(#[from] MarketError),
    #[error("market is not initialized")]
    NotInitialized,
    #[error("market is not resolved")]
    NotResolved,
    #[error("only the market creator may withdraw")]
    Unauthorized,
}

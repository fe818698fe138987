//! Market state errors

use thiserror::Error;
use transitive::Transitive;

use crate::math::{LmsrError, MathError};

#[derive(Clone, Debug, Eq, Error, PartialEq, Transitive)]
#[transitive(from(MathError, LmsrError))]
pub enum MarketError {
    #[error("invalid outcome index {index}: market has {count} outcomes")]
    InvalidOutcome { index: usize, count: usize },
    #[error(transparent)]
    Lmsr(#[from] LmsrError),
    #[error("Market already resolved")]
    MarketResolved,
    #[error("unknown market state version {0}")]
    UnknownVersion(u64),
}

//! Market state and its audit history

pub mod error;
pub mod market;

pub use error::MarketError;
pub use market::{MarketState, MarketStateHash, MarketStateVersion, StateTransition};

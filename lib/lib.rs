//! Liquidity-sensitive LMSR automated market maker for multi-outcome
//! prediction markets.
//!
//! [`LsLmsrMarket`] prices trades with a fixed-point LS-LMSR cost function
//! and settles them against a [`CollateralToken`] and a [`PositionLedger`].

pub mod amm;
pub mod collateral;
pub mod config;
pub mod error;
pub mod ledger;
pub mod math;
pub mod state;
pub mod types;

pub use amm::{LsLmsrMarket, TradeReceipt, TradeSide};
pub use collateral::{CollateralError, CollateralToken, InMemoryCollateral};
pub use config::{ConfigError, MarketConfig};
pub use error::Error;
pub use ledger::{InMemoryLedger, LedgerError, LedgerEvent, PositionLedger};
pub use math::{Fixed, LmsrError, LsLmsr, MathError};
pub use state::{MarketError, MarketState};

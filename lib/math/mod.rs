//! Fixed-point arithmetic and the LS-LMSR cost function

pub mod fixed;
pub mod ls_lmsr;
pub mod units;
mod wide;

pub use fixed::{Fixed, MathError};
pub use ls_lmsr::{LmsrError, LsLmsr, TradeCost};

//! Compensation journal for multi-step market operations.
//!
//! State is committed before any external call. Every external effect that
//! succeeds records its inverse here; if a later step fails the entries are
//! replayed newest first.

use crate::{
    amm::LsLmsrMarket,
    collateral::CollateralToken,
    error::Error,
    ledger::PositionLedger,
    types::{Address, PositionId},
};

#[derive(Clone, Debug, Eq, PartialEq)]
pub(super) enum Compensation {
    /// Send back collateral the market pulled from `to`
    RefundCollateral { to: Address, amount: u128 },
    /// Merge full sets the market split
    MergeFullSets { amount: u128 },
    /// Re-split full sets the market merged
    SplitFullSets { amount: u128 },
    /// Send back outcome shares the market pulled from `to`
    ReturnPosition {
        to: Address,
        position_id: PositionId,
        amount: u128,
    },
}

#[derive(Debug, Default)]
pub(super) struct Journal(Vec<Compensation>);

impl Journal {
    pub(super) fn new() -> Self {
        Self::default()
    }

    pub(super) fn record(&mut self, compensation: Compensation) {
        self.0.push(compensation)
    }

    pub(super) fn len(&self) -> usize {
        self.0.len()
    }

    /// Most recent entry first
    fn pop(&mut self) -> Option<Compensation> {
        self.0.pop()
    }
}

impl<C, L> LsLmsrMarket<C, L>
where
    C: CollateralToken,
    L: PositionLedger,
{
    fn compensate(&self, compensation: &Compensation) -> Result<(), Error> {
        match *compensation {
            Compensation::RefundCollateral { to, amount } => {
                self.collateral.transfer(self.address, to, amount)?
            }
            Compensation::MergeFullSets { amount } => self.merge_full_sets(amount)?,
            Compensation::SplitFullSets { amount } => self.split_full_sets(amount)?,
            Compensation::ReturnPosition {
                to,
                position_id,
                amount,
            } => self.ledger.transfer_position(
                self.address,
                to,
                position_id,
                amount,
            )?,
        }
        Ok(())
    }

    pub(super) fn unwind(&self, mut journal: Journal) {
        while let Some(compensation) = journal.pop() {
            if let Err(err) = self.compensate(&compensation) {
                tracing::error!(
                    "Market {} failed to compensate {:?}: {}",
                    self.address,
                    compensation,
                    err
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_journal_pops_newest_first() {
        let trader = Address::from_seed(b"trader");
        let mut journal = Journal::new();
        journal.record(Compensation::RefundCollateral {
            to: trader,
            amount: 5,
        });
        journal.record(Compensation::MergeFullSets { amount: 2 });
        assert_eq!(journal.len(), 2);

        assert_eq!(journal.pop(), Some(Compensation::MergeFullSets { amount: 2 }));
        assert_eq!(
            journal.pop(),
            Some(Compensation::RefundCollateral {
                to: trader,
                amount: 5
            })
        );
        assert_eq!(journal.pop(), None);
    }
}

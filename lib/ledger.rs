//! Outcome-position ledger interface and an in-memory implementation.
//!
//! Collateral is split into outcome-indexed positions, merged back, and
//! redeemed once the oracle has reported payouts for the condition.

use std::{collections::HashMap, sync::Arc};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{
    collateral::{CollateralError, CollateralToken},
    types::{
        self, Address, CollectionId, ConditionId, IndexSet, PositionId,
        QuestionId,
    },
};

#[derive(Clone, Debug, Eq, Error, PartialEq)]
pub enum LedgerError {
    #[error(transparent)]
    Collateral(#[from] CollateralError),
    #[error("condition {0} is already prepared")]
    ConditionAlreadyPrepared(ConditionId),
    #[error("condition {0} is already resolved")]
    ConditionAlreadyResolved(ConditionId),
    #[error("condition {0} not found")]
    ConditionNotFound(ConditionId),
    #[error(
        "insufficient position balance for {owner}: holds {balance}, {required} required"
    )]
    InsufficientPositionBalance {
        owner: Address,
        position: PositionId,
        balance: u128,
        required: u128,
    },
    #[error("invalid outcome slot count {0}")]
    InvalidOutcomeSlotCount(usize),
    #[error("partition must be disjoint, non-empty and cover every outcome")]
    InvalidPartition,
    #[error("payouts must match the outcome slot count and not all be zero")]
    InvalidPayouts,
    #[error("condition {0} has not been resolved")]
    NotResolved(ConditionId),
    #[error("position balance overflow")]
    Overflow,
    #[error("collateral {0} is not supported by this ledger")]
    UnsupportedCollateral(Address),
    #[error("only root collections are supported as split/merge parents")]
    UnsupportedParent,
}

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub enum LedgerEvent {
    ConditionPreparation {
        condition_id: ConditionId,
        oracle: Address,
        question_id: QuestionId,
        outcome_slot_count: usize,
    },
    PositionSplit {
        stakeholder: Address,
        collateral: Address,
        parent_collection_id: CollectionId,
        condition_id: ConditionId,
        partition: Vec<IndexSet>,
        amount: u128,
    },
    PositionsMerge {
        stakeholder: Address,
        collateral: Address,
        parent_collection_id: CollectionId,
        condition_id: ConditionId,
        partition: Vec<IndexSet>,
        amount: u128,
    },
    ConditionResolution {
        condition_id: ConditionId,
        oracle: Address,
        question_id: QuestionId,
        outcome_slot_count: usize,
        payout_numerators: Vec<u128>,
    },
    PayoutRedemption {
        redeemer: Address,
        collateral: Address,
        parent_collection_id: CollectionId,
        condition_id: ConditionId,
        index_sets: Vec<IndexSet>,
        payout: u128,
    },
}

/// Conditional outcome-token ledger.
///
/// `caller` arguments identify the account on whose behalf the ledger acts.
pub trait PositionLedger {
    fn address(&self) -> Address;

    fn prepare_condition(
        &self,
        oracle: Address,
        question_id: QuestionId,
        outcome_slot_count: usize,
    ) -> Result<ConditionId, LedgerError>;

    fn outcome_slot_count(
        &self,
        condition_id: ConditionId,
    ) -> Result<usize, LedgerError>;

    fn collection_id(
        &self,
        parent_collection_id: CollectionId,
        condition_id: ConditionId,
        index_set: IndexSet,
    ) -> CollectionId {
        types::collection_id(parent_collection_id, condition_id, index_set)
    }

    fn position_id(
        &self,
        collateral: Address,
        collection_id: CollectionId,
    ) -> PositionId {
        types::position_id(collateral, collection_id)
    }

    /// Pull `amount` of collateral from `caller` and credit `amount` of every
    /// position in `partition`.
    fn split_position(
        &self,
        caller: Address,
        collateral: Address,
        parent_collection_id: CollectionId,
        condition_id: ConditionId,
        partition: &[IndexSet],
        amount: u128,
    ) -> Result<(), LedgerError>;

    /// Burn `amount` of every position in `partition` and return `amount` of
    /// collateral to `caller`.
    fn merge_positions(
        &self,
        caller: Address,
        collateral: Address,
        parent_collection_id: CollectionId,
        condition_id: ConditionId,
        partition: &[IndexSet],
        amount: u128,
    ) -> Result<(), LedgerError>;

    /// Burn the caller's positions for `index_sets` and pay out collateral
    /// according to the reported payouts. Returns the payout.
    fn redeem_positions(
        &self,
        caller: Address,
        collateral: Address,
        parent_collection_id: CollectionId,
        condition_id: ConditionId,
        index_sets: &[IndexSet],
    ) -> Result<u128, LedgerError>;

    /// Oracle-only: resolves the condition prepared for `(oracle,
    /// question_id, payouts.len())`.
    fn report_payouts(
        &self,
        oracle: Address,
        question_id: QuestionId,
        payouts: &[u128],
    ) -> Result<(), LedgerError>;

    /// Zero until the condition is resolved
    fn payout_denominator(
        &self,
        condition_id: ConditionId,
    ) -> Result<u128, LedgerError>;

    fn balance_of(&self, owner: Address, position_id: PositionId) -> u128;

    fn transfer_position(
        &self,
        from: Address,
        to: Address,
        position_id: PositionId,
        amount: u128,
    ) -> Result<(), LedgerError>;
}

#[derive(Clone, Debug)]
struct Condition {
    oracle: Address,
    question_id: QuestionId,
    outcome_slot_count: usize,
    payout_numerators: Vec<u128>,
    payout_denominator: u128,
}

#[derive(Debug, Default)]
struct LedgerInner {
    conditions: HashMap<ConditionId, Condition>,
    balances: HashMap<(PositionId, Address), u128>,
    events: Vec<LedgerEvent>,
}

impl LedgerInner {
    fn condition(
        &self,
        condition_id: ConditionId,
    ) -> Result<&Condition, LedgerError> {
        self.conditions
            .get(&condition_id)
            .ok_or(LedgerError::ConditionNotFound(condition_id))
    }

    fn balance(&self, position_id: PositionId, owner: Address) -> u128 {
        self.balances
            .get(&(position_id, owner))
            .copied()
            .unwrap_or(0)
    }

    fn credit(
        &mut self,
        position_id: PositionId,
        owner: Address,
        amount: u128,
    ) -> Result<(), LedgerError> {
        let balance = self
            .balance(position_id, owner)
            .checked_add(amount)
            .ok_or(LedgerError::Overflow)?;
        self.balances.insert((position_id, owner), balance);
        Ok(())
    }

    fn debit(
        &mut self,
        position_id: PositionId,
        owner: Address,
        amount: u128,
    ) -> Result<(), LedgerError> {
        let balance = self.balance(position_id, owner);
        if balance < amount {
            return Err(LedgerError::InsufficientPositionBalance {
                owner,
                position: position_id,
                balance,
                required: amount,
            });
        }
        self.balances.insert((position_id, owner), balance - amount);
        Ok(())
    }
}

/// Shared in-memory ledger over a single collateral token. Clones refer to
/// the same conditions and balances.
///
/// Only full partitions of root collections are supported, which is all an
/// LS-LMSR market needs. No lock is held while calling into the collateral.
#[derive(Clone, Debug)]
pub struct InMemoryLedger<C> {
    address: Address,
    collateral: C,
    inner: Arc<Mutex<LedgerInner>>,
}

impl<C> InMemoryLedger<C>
where
    C: CollateralToken,
{
    pub fn new(address: Address, collateral: C) -> Self {
        Self {
            address,
            collateral,
            inner: Arc::new(Mutex::new(LedgerInner::default())),
        }
    }

    pub fn events(&self) -> Vec<LedgerEvent> {
        self.inner.lock().events.clone()
    }

    pub fn payout_numerators(
        &self,
        condition_id: ConditionId,
    ) -> Result<Vec<u128>, LedgerError> {
        Ok(self.inner.lock().condition(condition_id)?.payout_numerators.clone())
    }

    fn check_collateral(&self, collateral: Address) -> Result<(), LedgerError> {
        if collateral != self.collateral.address() {
            return Err(LedgerError::UnsupportedCollateral(collateral));
        }
        Ok(())
    }

    /// Validate a full partition of a root collection and return the
    /// position of each member.
    fn partition_positions(
        &self,
        collateral: Address,
        parent_collection_id: CollectionId,
        condition_id: ConditionId,
        partition: &[IndexSet],
    ) -> Result<Vec<PositionId>, LedgerError> {
        self.check_collateral(collateral)?;
        if parent_collection_id != CollectionId::ROOT {
            return Err(LedgerError::UnsupportedParent);
        }
        let outcome_slot_count = self.outcome_slot_count(condition_id)?;
        let full = types::full_index_set(outcome_slot_count);
        let mut covered: IndexSet = 0;
        for &index_set in partition {
            if index_set == 0 || index_set & !full != 0 || index_set & covered != 0
            {
                return Err(LedgerError::InvalidPartition);
            }
            covered |= index_set;
        }
        if covered != full {
            return Err(LedgerError::InvalidPartition);
        }
        Ok(partition
            .iter()
            .map(|&index_set| {
                let collection = self.collection_id(
                    parent_collection_id,
                    condition_id,
                    index_set,
                );
                self.position_id(collateral, collection)
            })
            .collect())
    }
}

impl<C> PositionLedger for InMemoryLedger<C>
where
    C: CollateralToken,
{
    fn address(&self) -> Address {
        self.address
    }

    fn prepare_condition(
        &self,
        oracle: Address,
        question_id: QuestionId,
        outcome_slot_count: usize,
    ) -> Result<ConditionId, LedgerError> {
        if !(2..=IndexSet::BITS as usize).contains(&outcome_slot_count) {
            return Err(LedgerError::InvalidOutcomeSlotCount(outcome_slot_count));
        }
        let condition_id =
            types::condition_id(oracle, question_id, outcome_slot_count);
        let mut inner = self.inner.lock();
        if inner.conditions.contains_key(&condition_id) {
            return Err(LedgerError::ConditionAlreadyPrepared(condition_id));
        }
        inner.conditions.insert(
            condition_id,
            Condition {
                oracle,
                question_id,
                outcome_slot_count,
                payout_numerators: vec![0; outcome_slot_count],
                payout_denominator: 0,
            },
        );
        inner.events.push(LedgerEvent::ConditionPreparation {
            condition_id,
            oracle,
            question_id,
            outcome_slot_count,
        });
        Ok(condition_id)
    }

    fn outcome_slot_count(
        &self,
        condition_id: ConditionId,
    ) -> Result<usize, LedgerError> {
        Ok(self.inner.lock().condition(condition_id)?.outcome_slot_count)
    }

    fn split_position(
        &self,
        caller: Address,
        collateral: Address,
        parent_collection_id: CollectionId,
        condition_id: ConditionId,
        partition: &[IndexSet],
        amount: u128,
    ) -> Result<(), LedgerError> {
        let positions = self.partition_positions(
            collateral,
            parent_collection_id,
            condition_id,
            partition,
        )?;
        self.collateral
            .transfer_from(self.address, caller, self.address, amount)?;

        let mut inner = self.inner.lock();
        for position_id in positions {
            inner.credit(position_id, caller, amount)?;
        }
        inner.events.push(LedgerEvent::PositionSplit {
            stakeholder: caller,
            collateral,
            parent_collection_id,
            condition_id,
            partition: partition.to_vec(),
            amount,
        });
        tracing::debug!(
            "{} split {} into {} positions of condition {}",
            caller,
            amount,
            partition.len(),
            condition_id
        );
        Ok(())
    }

    fn merge_positions(
        &self,
        caller: Address,
        collateral: Address,
        parent_collection_id: CollectionId,
        condition_id: ConditionId,
        partition: &[IndexSet],
        amount: u128,
    ) -> Result<(), LedgerError> {
        let positions = self.partition_positions(
            collateral,
            parent_collection_id,
            condition_id,
            partition,
        )?;
        {
            let mut inner = self.inner.lock();
            // Check every balance before burning any of them
            for &position_id in &positions {
                let balance = inner.balance(position_id, caller);
                if balance < amount {
                    return Err(LedgerError::InsufficientPositionBalance {
                        owner: caller,
                        position: position_id,
                        balance,
                        required: amount,
                    });
                }
            }
            for &position_id in &positions {
                inner.debit(position_id, caller, amount)?;
            }
        }

        if let Err(err) = self.collateral.transfer(self.address, caller, amount) {
            let mut inner = self.inner.lock();
            for &position_id in &positions {
                inner.credit(position_id, caller, amount)?;
            }
            return Err(err.into());
        }

        self.inner.lock().events.push(LedgerEvent::PositionsMerge {
            stakeholder: caller,
            collateral,
            parent_collection_id,
            condition_id,
            partition: partition.to_vec(),
            amount,
        });
        tracing::debug!(
            "{} merged {} of condition {} back into collateral",
            caller,
            amount,
            condition_id
        );
        Ok(())
    }

    fn redeem_positions(
        &self,
        caller: Address,
        collateral: Address,
        parent_collection_id: CollectionId,
        condition_id: ConditionId,
        index_sets: &[IndexSet],
    ) -> Result<u128, LedgerError> {
        self.check_collateral(collateral)?;
        if parent_collection_id != CollectionId::ROOT {
            return Err(LedgerError::UnsupportedParent);
        }

        let mut burned = Vec::with_capacity(index_sets.len());
        let payout = {
            let mut inner = self.inner.lock();
            let condition = inner.condition(condition_id)?.clone();
            if condition.payout_denominator == 0 {
                return Err(LedgerError::NotResolved(condition_id));
            }
            let full = types::full_index_set(condition.outcome_slot_count);

            let mut payout: u128 = 0;
            for &index_set in index_sets {
                if index_set == 0 || index_set & !full != 0 {
                    return Err(LedgerError::InvalidPartition);
                }
                let numerator: u128 = condition
                    .payout_numerators
                    .iter()
                    .enumerate()
                    .filter(|(outcome, _)| index_set & types::index_set(*outcome) != 0)
                    .map(|(_, numerator)| *numerator)
                    .sum();
                let collection = self.collection_id(
                    parent_collection_id,
                    condition_id,
                    index_set,
                );
                let position_id = self.position_id(collateral, collection);
                let stake = inner.balance(position_id, caller);
                if stake == 0 {
                    continue;
                }
                let share = stake
                    .checked_mul(numerator)
                    .ok_or(LedgerError::Overflow)?
                    / condition.payout_denominator;
                payout = payout.checked_add(share).ok_or(LedgerError::Overflow)?;
                burned.push((position_id, stake));
            }
            for &(position_id, stake) in &burned {
                inner.debit(position_id, caller, stake)?;
            }
            payout
        };

        if payout > 0 {
            if let Err(err) = self.collateral.transfer(self.address, caller, payout)
            {
                let mut inner = self.inner.lock();
                for &(position_id, stake) in &burned {
                    inner.credit(position_id, caller, stake)?;
                }
                return Err(err.into());
            }
        }

        self.inner.lock().events.push(LedgerEvent::PayoutRedemption {
            redeemer: caller,
            collateral,
            parent_collection_id,
            condition_id,
            index_sets: index_sets.to_vec(),
            payout,
        });
        tracing::debug!(
            "{} redeemed {} from condition {}",
            caller,
            payout,
            condition_id
        );
        Ok(payout)
    }

    fn report_payouts(
        &self,
        oracle: Address,
        question_id: QuestionId,
        payouts: &[u128],
    ) -> Result<(), LedgerError> {
        let condition_id = types::condition_id(oracle, question_id, payouts.len());
        let mut inner = self.inner.lock();
        let condition = inner
            .conditions
            .get_mut(&condition_id)
            .ok_or(LedgerError::ConditionNotFound(condition_id))?;
        if condition.payout_denominator != 0 {
            return Err(LedgerError::ConditionAlreadyResolved(condition_id));
        }
        let denominator = payouts
            .iter()
            .try_fold(0u128, |acc, payout| acc.checked_add(*payout))
            .ok_or(LedgerError::Overflow)?;
        if denominator == 0 {
            return Err(LedgerError::InvalidPayouts);
        }
        condition.payout_numerators = payouts.to_vec();
        condition.payout_denominator = denominator;
        let event = LedgerEvent::ConditionResolution {
            condition_id,
            oracle: condition.oracle,
            question_id: condition.question_id,
            outcome_slot_count: condition.outcome_slot_count,
            payout_numerators: payouts.to_vec(),
        };
        inner.events.push(event);
        tracing::info!("Condition {} resolved with payouts {:?}", condition_id, payouts);
        Ok(())
    }

    fn payout_denominator(
        &self,
        condition_id: ConditionId,
    ) -> Result<u128, LedgerError> {
        Ok(self.inner.lock().condition(condition_id)?.payout_denominator)
    }

    fn balance_of(&self, owner: Address, position_id: PositionId) -> u128 {
        self.inner.lock().balance(position_id, owner)
    }

    fn transfer_position(
        &self,
        from: Address,
        to: Address,
        position_id: PositionId,
        amount: u128,
    ) -> Result<(), LedgerError> {
        let mut inner = self.inner.lock();
        inner.debit(position_id, from, amount)?;
        if let Err(err) = inner.credit(position_id, to, amount) {
            inner.credit(position_id, from, amount)?;
            return Err(err);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collateral::InMemoryCollateral;

    struct Fixture {
        collateral: InMemoryCollateral,
        ledger: InMemoryLedger<InMemoryCollateral>,
        oracle: Address,
        question: QuestionId,
        alice: Address,
    }

    fn fixture() -> Fixture {
        let collateral = InMemoryCollateral::new(Address::from_seed(b"dai"), 18);
        let ledger =
            InMemoryLedger::new(Address::from_seed(b"ledger"), collateral.clone());
        let alice = Address::from_seed(b"alice");
        collateral.mint(alice, 1_000).unwrap();
        collateral.approve(alice, ledger.address(), u128::MAX).unwrap();
        Fixture {
            collateral,
            ledger,
            oracle: Address::from_seed(b"oracle"),
            question: QuestionId::from_label("q"),
            alice,
        }
    }

    fn position(f: &Fixture, condition: ConditionId, outcome: usize) -> PositionId {
        let collection = f.ledger.collection_id(
            CollectionId::ROOT,
            condition,
            types::index_set(outcome),
        );
        f.ledger.position_id(f.collateral.address(), collection)
    }

    #[test]
    fn test_prepare_condition_once() {
        let f = fixture();
        let condition = f.ledger.prepare_condition(f.oracle, f.question, 3).unwrap();
        assert_eq!(f.ledger.outcome_slot_count(condition).unwrap(), 3);
        assert_eq!(f.ledger.payout_denominator(condition).unwrap(), 0);
        assert_eq!(
            f.ledger.prepare_condition(f.oracle, f.question, 3),
            Err(LedgerError::ConditionAlreadyPrepared(condition))
        );
        assert_eq!(
            f.ledger.prepare_condition(f.oracle, f.question, 1),
            Err(LedgerError::InvalidOutcomeSlotCount(1))
        );
    }

    #[test]
    fn test_split_and_merge() {
        let f = fixture();
        let condition = f.ledger.prepare_condition(f.oracle, f.question, 3).unwrap();
        let partition = types::basic_partition(3);
        let dai = f.collateral.address();

        f.ledger
            .split_position(f.alice, dai, CollectionId::ROOT, condition, &partition, 100)
            .unwrap();
        assert_eq!(f.collateral.balance_of(f.alice), 900);
        assert_eq!(f.collateral.balance_of(f.ledger.address()), 100);
        for outcome in 0..3 {
            assert_eq!(f.ledger.balance_of(f.alice, position(&f, condition, outcome)), 100);
        }

        f.ledger
            .merge_positions(f.alice, dai, CollectionId::ROOT, condition, &partition, 60)
            .unwrap();
        assert_eq!(f.collateral.balance_of(f.alice), 960);
        assert_eq!(f.ledger.balance_of(f.alice, position(&f, condition, 2)), 40);

        let err = f
            .ledger
            .merge_positions(f.alice, dai, CollectionId::ROOT, condition, &partition, 41)
            .unwrap_err();
        assert!(matches!(err, LedgerError::InsufficientPositionBalance { .. }));
        assert_eq!(f.ledger.balance_of(f.alice, position(&f, condition, 0)), 40);

        let events = f.ledger.events();
        assert!(matches!(events[1], LedgerEvent::PositionSplit { amount: 100, .. }));
        assert!(matches!(events[2], LedgerEvent::PositionsMerge { amount: 60, .. }));
    }

    #[test]
    fn test_invalid_partitions() {
        let f = fixture();
        let condition = f.ledger.prepare_condition(f.oracle, f.question, 3).unwrap();
        let dai = f.collateral.address();
        for partition in [vec![1, 2], vec![1, 3, 4], vec![1, 2, 8], vec![0, 7]] {
            assert_eq!(
                f.ledger.split_position(
                    f.alice,
                    dai,
                    CollectionId::ROOT,
                    condition,
                    &partition,
                    1
                ),
                Err(LedgerError::InvalidPartition)
            );
        }
        assert_eq!(f.collateral.balance_of(f.alice), 1_000);
    }

    #[test]
    fn test_split_without_allowance() {
        let f = fixture();
        f.collateral.approve(f.alice, f.ledger.address(), 0).unwrap();
        let condition = f.ledger.prepare_condition(f.oracle, f.question, 2).unwrap();
        let err = f
            .ledger
            .split_position(
                f.alice,
                f.collateral.address(),
                CollectionId::ROOT,
                condition,
                &[1, 2],
                10,
            )
            .unwrap_err();
        assert!(matches!(
            err,
            LedgerError::Collateral(CollateralError::InsufficientAllowance { .. })
        ));
        assert_eq!(f.ledger.balance_of(f.alice, position(&f, condition, 0)), 0);
    }

    #[test]
    fn test_report_and_redeem() {
        let f = fixture();
        let condition = f.ledger.prepare_condition(f.oracle, f.question, 3).unwrap();
        let partition = types::basic_partition(3);
        let dai = f.collateral.address();
        f.ledger
            .split_position(f.alice, dai, CollectionId::ROOT, condition, &partition, 100)
            .unwrap();

        assert_eq!(
            f.ledger
                .redeem_positions(f.alice, dai, CollectionId::ROOT, condition, &partition),
            Err(LedgerError::NotResolved(condition))
        );
        assert_eq!(
            f.ledger.report_payouts(f.oracle, f.question, &[0, 0, 0]),
            Err(LedgerError::InvalidPayouts)
        );
        f.ledger.report_payouts(f.oracle, f.question, &[0, 1, 0]).unwrap();
        assert_eq!(f.ledger.payout_denominator(condition).unwrap(), 1);
        assert_eq!(
            f.ledger.report_payouts(f.oracle, f.question, &[1, 0, 0]),
            Err(LedgerError::ConditionAlreadyResolved(condition))
        );

        let payout = f
            .ledger
            .redeem_positions(f.alice, dai, CollectionId::ROOT, condition, &partition)
            .unwrap();
        assert_eq!(payout, 100);
        assert_eq!(f.collateral.balance_of(f.alice), 1_000);
        assert_eq!(f.ledger.balance_of(f.alice, position(&f, condition, 1)), 0);

        // Nothing left to redeem
        let again = f
            .ledger
            .redeem_positions(f.alice, dai, CollectionId::ROOT, condition, &partition)
            .unwrap();
        assert_eq!(again, 0);
    }

    #[test]
    fn test_transfer_position() {
        let f = fixture();
        let condition = f.ledger.prepare_condition(f.oracle, f.question, 2).unwrap();
        f.ledger
            .split_position(
                f.alice,
                f.collateral.address(),
                CollectionId::ROOT,
                condition,
                &[1, 2],
                10,
            )
            .unwrap();
        let bob = Address::from_seed(b"bob");
        let yes = position(&f, condition, 0);

        f.ledger.transfer_position(f.alice, bob, yes, 4).unwrap();
        assert_eq!(f.ledger.balance_of(bob, yes), 4);
        assert_eq!(f.ledger.balance_of(f.alice, yes), 6);
        assert!(f.ledger.transfer_position(bob, f.alice, yes, 5).is_err());
    }
}

//! LS-LMSR automated market maker over a position ledger

use crate::{
    collateral::CollateralToken,
    config::MarketConfig,
    error::Error,
    ledger::PositionLedger,
    math::{Fixed, LsLmsr, units},
    state::MarketState,
    types::{self, Address, CollectionId, ConditionId, PositionId},
};

mod journal;
mod settlement;
mod trade;

use journal::{Compensation, Journal};
pub use trade::{TradeReceipt, TradeSide};

/// One market instance: its own address, the collateral it trades against,
/// the ledger holding its outcome positions, and its state once set up.
#[derive(Debug)]
pub struct LsLmsrMarket<C, L> {
    address: Address,
    collateral: C,
    ledger: L,
    state: Option<MarketState>,
}

impl<C, L> LsLmsrMarket<C, L>
where
    C: CollateralToken,
    L: PositionLedger,
{
    pub fn new(address: Address, collateral: C, ledger: L) -> Self {
        Self {
            address,
            collateral,
            ledger,
            state: None,
        }
    }

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn collateral(&self) -> &C {
        &self.collateral
    }

    pub fn ledger(&self) -> &L {
        &self.ledger
    }

    /// `None` until [`Self::setup`] succeeds
    pub fn state(&self) -> Option<&MarketState> {
        self.state.as_ref()
    }

    fn state_ref(&self) -> Result<&MarketState, Error> {
        self.state.as_ref().ok_or(Error::NotInitialized)
    }

    fn state_mut(&mut self) -> Result<&mut MarketState, Error> {
        self.state.as_mut().ok_or(Error::NotInitialized)
    }

    /// One-time initializer.
    ///
    /// Pulls `config.funding` from `caller`, prepares the condition and lets
    /// the ledger pull collateral for splits. `caller` becomes the creator.
    pub fn setup(
        &mut self,
        caller: Address,
        config: MarketConfig,
    ) -> Result<ConditionId, Error> {
        if self.state.is_some() {
            return Err(Error::AlreadyInitialized);
        }
        config.validate()?;
        let funding =
            units::from_base_units(config.funding, self.collateral.decimals())?;
        let engine =
            LsLmsr::new(config.outcome_count, funding, config.overround)?;

        let mut journal = Journal::new();
        let condition_id = match self.fund_and_prepare(caller, &config, &mut journal)
        {
            Ok(condition_id) => condition_id,
            Err(err) => {
                tracing::warn!("Market setup by {} failed: {}", caller, err);
                self.unwind(journal);
                return Err(err);
            }
        };

        self.state = Some(MarketState::new(
            caller,
            condition_id,
            engine,
            config.overround,
        ));
        tracing::info!(
            "Market {} set up by {}: {} outcomes, funding {}, overround {}bp, condition {}",
            self.address,
            caller,
            config.outcome_count,
            config.funding,
            config.overround,
            condition_id
        );
        Ok(condition_id)
    }

    fn fund_and_prepare(
        &self,
        caller: Address,
        config: &MarketConfig,
        journal: &mut Journal,
    ) -> Result<ConditionId, Error> {
        self.collateral.transfer_from(
            self.address,
            caller,
            self.address,
            config.funding,
        )?;
        journal.record(Compensation::RefundCollateral {
            to: caller,
            amount: config.funding,
        });

        let condition_id = self.ledger.prepare_condition(
            config.oracle,
            config.question_id,
            config.outcome_count,
        )?;
        self.collateral.approve(
            self.address,
            self.ledger.address(),
            u128::MAX,
        )?;
        Ok(condition_id)
    }

    pub fn condition(&self) -> Result<ConditionId, Error> {
        Ok(self.state_ref()?.condition_id())
    }

    /// Current value of the cost function
    pub fn cost(&self) -> Result<Fixed, Error> {
        Ok(self.state_ref()?.snapshot_cost()?)
    }

    /// Marginal price of every outcome
    pub fn prices(&self) -> Result<Vec<Fixed>, Error> {
        Ok(self.state_ref()?.snapshot_prices()?)
    }

    pub fn position_id(&self, outcome: usize) -> Result<PositionId, Error> {
        let state = self.state_ref()?;
        state.check_outcome(outcome)?;
        let collection = self.ledger.collection_id(
            CollectionId::ROOT,
            state.condition_id(),
            types::index_set(outcome),
        );
        Ok(self.ledger.position_id(self.collateral.address(), collection))
    }

    /// Outcome shares held by the market itself
    pub fn inventory(&self, outcome: usize) -> Result<u128, Error> {
        let position_id = self.position_id(outcome)?;
        Ok(self.ledger.balance_of(self.address, position_id))
    }

    /// Split `amount` of the market's collateral into a full set
    fn split_full_sets(&self, amount: u128) -> Result<(), Error> {
        let state = self.state_ref()?;
        self.ledger.split_position(
            self.address,
            self.collateral.address(),
            CollectionId::ROOT,
            state.condition_id(),
            &types::basic_partition(state.outcome_count()),
            amount,
        )?;
        Ok(())
    }

    /// Merge `amount` full sets from inventory back into collateral
    fn merge_full_sets(&self, amount: u128) -> Result<(), Error> {
        let state = self.state_ref()?;
        self.ledger.merge_positions(
            self.address,
            self.collateral.address(),
            CollectionId::ROOT,
            state.condition_id(),
            &types::basic_partition(state.outcome_count()),
            amount,
        )?;
        Ok(())
    }

    /// Undo the journal and restore the state version a failed operation
    /// superseded.
    fn abort(&mut self, journal: Journal, superseded: u64, err: Error) -> Error {
        tracing::warn!(
            "Market {} operation failed, compensating {} effects: {}",
            self.address,
            journal.len(),
            err
        );
        self.unwind(journal);
        if let Some(state) = self.state.as_mut() {
            if let Err(rollback_err) = state.rollback_to(superseded) {
                tracing::error!(
                    "Market {} could not roll back to version {}: {}",
                    self.address,
                    superseded,
                    rollback_err
                );
            }
        }
        err
    }
}

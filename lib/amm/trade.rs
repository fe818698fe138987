//! Buying and selling outcome shares

use serde::{Deserialize, Serialize};

use crate::{
    amm::{Compensation, Journal, LsLmsrMarket},
    collateral::CollateralToken,
    error::Error,
    ledger::PositionLedger,
    math::{
        Fixed,
        units::{self, Rounding},
    },
    types::{Address, PositionId},
};

#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub enum TradeSide {
    Buy,
    Sell,
}

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct TradeReceipt {
    pub side: TradeSide,
    pub outcome: usize,
    /// Executed size, rounded down to whole share base units
    pub amount: Fixed,
    /// Change in the cost function; negative for sells
    pub cost: Fixed,
    /// Collateral base units charged (buy) or paid out (sell)
    pub collateral: u128,
    /// Outcome share base units delivered (buy) or taken (sell)
    pub shares: u128,
}

impl<C, L> LsLmsrMarket<C, L>
where
    C: CollateralToken,
    L: PositionLedger,
{
    /// Round `amount` down to whole share base units. Returns the quantity
    /// the cost function moves by and the shares the ledger moves.
    fn trade_size(&self, amount: Fixed) -> Result<(Fixed, u128), Error> {
        if !amount.is_positive() {
            return Err(Error::InvalidAmount { amount });
        }
        let decimals = self.collateral.decimals();
        let shares = units::to_base_units(amount, decimals, Rounding::Down)?;
        let quantity = units::from_base_units(shares, decimals)?;
        if shares == 0 || !quantity.is_positive() {
            return Err(Error::InvalidAmount { amount });
        }
        Ok((quantity, shares))
    }

    /// Collateral cost of buying `amount` shares of `outcome`.
    ///
    /// Quotes remain available after resolution.
    pub fn price(&self, outcome: usize, amount: Fixed) -> Result<Fixed, Error> {
        let state = self.state_ref()?;
        let (quantity, _) = self.trade_size(amount)?;
        state.check_outcome(outcome)?;
        let quote = state.quote(outcome, quantity)?;
        if !quote.cost.is_positive() {
            return Err(Error::InvalidTrade { cost: quote.cost });
        }
        Ok(quote.cost)
    }

    /// Collateral refunded for selling `amount` shares of `outcome`
    pub fn sell_price(&self, outcome: usize, amount: Fixed) -> Result<Fixed, Error> {
        let state = self.state_ref()?;
        let (quantity, _) = self.trade_size(amount)?;
        state.check_outcome(outcome)?;
        let quote = state.quote(outcome, quantity.checked_neg()?)?;
        let refund = quote.cost.checked_neg()?;
        if !refund.is_positive() {
            return Err(Error::InvalidTrade { cost: quote.cost });
        }
        Ok(refund)
    }

    pub fn buy(
        &mut self,
        trader: Address,
        outcome: usize,
        amount: Fixed,
    ) -> Result<TradeReceipt, Error> {
        self.reconcile_resolution()?;
        let decimals = self.collateral.decimals();
        let state = self.state_ref()?;
        state.ensure_trading()?;
        let (quantity, shares) = self.trade_size(amount)?;
        state.check_outcome(outcome)?;

        let quote = state.quote(outcome, quantity)?;
        if !quote.cost.is_positive() {
            return Err(Error::InvalidTrade { cost: quote.cost });
        }
        let charge = units::to_base_units(quote.cost, decimals, Rounding::Up)?;
        let position_id = self.position_id(outcome)?;

        let superseded = self.state_mut()?.apply_delta(outcome, quantity)?;
        let mut journal = Journal::new();
        if let Err(err) =
            self.settle_buy(trader, position_id, charge, shares, &mut journal)
        {
            return Err(self.abort(journal, superseded, err));
        }

        tracing::debug!(
            "{} bought {} of outcome {} for {} ({} base units)",
            trader,
            quantity,
            outcome,
            quote.cost,
            charge
        );
        Ok(TradeReceipt {
            side: TradeSide::Buy,
            outcome,
            amount: quantity,
            cost: quote.cost,
            collateral: charge,
            shares,
        })
    }

    /// Take payment, top up inventory with full sets if needed, deliver
    fn settle_buy(
        &self,
        trader: Address,
        position_id: PositionId,
        charge: u128,
        shares: u128,
        journal: &mut Journal,
    ) -> Result<(), Error> {
        self.collateral
            .transfer_from(self.address, trader, self.address, charge)?;
        journal.record(Compensation::RefundCollateral {
            to: trader,
            amount: charge,
        });

        let inventory = self.ledger.balance_of(self.address, position_id);
        if inventory < shares {
            let shortfall = shares - inventory;
            self.split_full_sets(shortfall)?;
            journal.record(Compensation::MergeFullSets { amount: shortfall });
        }

        self.ledger
            .transfer_position(self.address, trader, position_id, shares)?;
        Ok(())
    }

    pub fn sell(
        &mut self,
        trader: Address,
        outcome: usize,
        amount: Fixed,
    ) -> Result<TradeReceipt, Error> {
        self.reconcile_resolution()?;
        let decimals = self.collateral.decimals();
        let state = self.state_ref()?;
        state.ensure_trading()?;
        let (quantity, shares) = self.trade_size(amount)?;
        state.check_outcome(outcome)?;

        let position_id = self.position_id(outcome)?;
        let available = self.ledger.balance_of(trader, position_id);
        if available < shares {
            return Err(Error::InsufficientShares {
                required: shares,
                available,
            });
        }

        let delta = quantity.checked_neg()?;
        let quote = state.quote(outcome, delta)?;
        let refund_value = quote.cost.checked_neg()?;
        if !refund_value.is_positive() {
            return Err(Error::InvalidTrade { cost: quote.cost });
        }
        let refund = units::to_base_units(refund_value, decimals, Rounding::Down)?;

        let superseded = self.state_mut()?.apply_delta(outcome, delta)?;
        let mut journal = Journal::new();
        if let Err(err) =
            self.settle_sell(trader, position_id, refund, shares, &mut journal)
        {
            return Err(self.abort(journal, superseded, err));
        }

        tracing::debug!(
            "{} sold {} of outcome {} for {} ({} base units)",
            trader,
            quantity,
            outcome,
            refund_value,
            refund
        );
        Ok(TradeReceipt {
            side: TradeSide::Sell,
            outcome,
            amount: quantity,
            cost: quote.cost,
            collateral: refund,
            shares,
        })
    }

    /// Take the shares into inventory, free collateral if needed, pay out
    fn settle_sell(
        &self,
        trader: Address,
        position_id: PositionId,
        refund: u128,
        shares: u128,
        journal: &mut Journal,
    ) -> Result<(), Error> {
        self.ledger
            .transfer_position(trader, self.address, position_id, shares)?;
        journal.record(Compensation::ReturnPosition {
            to: trader,
            position_id,
            amount: shares,
        });

        let free = self.collateral.balance_of(self.address);
        if free < refund {
            let shortfall = refund - free;
            self.merge_full_sets(shortfall)?;
            journal.record(Compensation::SplitFullSets { amount: shortfall });
        }

        if refund > 0 {
            self.collateral.transfer(self.address, trader, refund)?;
        }
        Ok(())
    }
}

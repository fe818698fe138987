//! Resolution and residual withdrawal

use crate::{
    amm::LsLmsrMarket,
    collateral::CollateralToken,
    error::Error,
    ledger::PositionLedger,
    types::{self, Address, CollectionId, IndexSet},
};

impl<C, L> LsLmsrMarket<C, L>
where
    C: CollateralToken,
    L: PositionLedger,
{
    /// Mark the market resolved if the ledger has payouts for its condition.
    /// Returns whether the market is resolved.
    pub(super) fn reconcile_resolution(&mut self) -> Result<bool, Error> {
        let state = self.state_ref()?;
        if state.is_resolved() {
            return Ok(true);
        }
        let condition_id = state.condition_id();
        if self.ledger.payout_denominator(condition_id)? == 0 {
            return Ok(false);
        }
        self.state_mut()?.mark_resolved();
        tracing::info!(
            "Market {} resolved, condition {} has reported payouts",
            self.address,
            condition_id
        );
        Ok(true)
    }

    /// Settlement notification: picks up a resolution reported to the ledger.
    pub fn notify_resolution(&mut self) -> Result<bool, Error> {
        self.reconcile_resolution()
    }

    /// Redeem the market's positions and send its whole collateral balance
    /// to the creator. Returns the amount sent, zero once nothing is left.
    pub fn withdraw(&mut self, caller: Address) -> Result<u128, Error> {
        self.reconcile_resolution()?;
        let state = self.state_ref()?;
        if caller != state.creator() {
            tracing::warn!(
                "Withdrawal from market {} by non-creator {} rejected",
                self.address,
                caller
            );
            return Err(Error::Unauthorized);
        }
        if !state.is_resolved() {
            return Err(Error::NotResolved);
        }

        let mut held: Vec<IndexSet> = Vec::new();
        for outcome in 0..state.outcome_count() {
            if self.inventory(outcome)? > 0 {
                held.push(types::index_set(outcome));
            }
        }
        // Redemption cannot be undone. If the transfer below fails the payout
        // stays in the market's balance and the next call sends it.
        if !held.is_empty() {
            let payout = self.ledger.redeem_positions(
                self.address,
                self.collateral.address(),
                CollectionId::ROOT,
                state.condition_id(),
                &held,
            )?;
            tracing::debug!(
                "Market {} redeemed {} from {} positions",
                self.address,
                payout,
                held.len()
            );
        }

        let residual = self.collateral.balance_of(self.address);
        if residual == 0 {
            tracing::debug!("Market {} has nothing left to withdraw", self.address);
            return Ok(0);
        }
        self.collateral.transfer(self.address, caller, residual)?;
        self.state_mut()?.record_withdrawal(residual)?;
        tracing::info!(
            "Market {} paid residual {} to creator {}",
            self.address,
            residual,
            caller
        );
        Ok(residual)
    }
}

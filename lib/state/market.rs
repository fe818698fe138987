use borsh::{BorshDeserialize, BorshSerialize};
use serde::{Deserialize, Serialize};

use crate::math::{Fixed, LsLmsr, TradeCost};
use crate::state::error::MarketError;
use crate::types::{Address, ConditionId};

#[derive(
    BorshDeserialize,
    BorshSerialize,
    Clone,
    Copy,
    Debug,
    Deserialize,
    Eq,
    Hash,
    PartialEq,
    Serialize,
)]
pub struct MarketStateHash(#[serde(with = "hex::serde")] [u8; 32]);

impl MarketStateHash {
    pub fn new(data: [u8; 32]) -> Self {
        Self(data)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl std::fmt::Display for MarketStateHash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

/// What produced a market state version
#[derive(
    BorshDeserialize,
    BorshSerialize,
    Clone,
    Debug,
    Deserialize,
    Eq,
    PartialEq,
    Serialize,
)]
pub enum StateTransition {
    Setup,
    Trade { outcome: usize, delta: Fixed },
    Resolved,
    Withdrawal { amount: u128 },
}

impl StateTransition {
    fn hash_into(&self, hasher: &mut blake3::Hasher) {
        match self {
            Self::Setup => {
                hasher.update(&[0]);
            }
            Self::Trade { outcome, delta } => {
                hasher.update(&[1]);
                hasher.update(&(*outcome as u64).to_le_bytes());
                hasher.update(&delta.to_bits().to_le_bytes());
            }
            Self::Resolved => {
                hasher.update(&[2]);
            }
            Self::Withdrawal { amount } => {
                hasher.update(&[3]);
                hasher.update(&amount.to_le_bytes());
            }
        }
    }
}

/// Immutable record of the market after one committed transition.
///
/// Each version's hash covers its contents and the previous version's hash.
#[derive(
    BorshDeserialize,
    BorshSerialize,
    Clone,
    Debug,
    Deserialize,
    Eq,
    PartialEq,
    Serialize,
)]
pub struct MarketStateVersion {
    pub version: u64,
    pub previous_state_hash: Option<MarketStateHash>,
    pub state_hash: MarketStateHash,
    pub transition: StateTransition,
    pub quantities: Vec<Fixed>,
    pub resolved: bool,
    pub withdrawn: u128,
}

impl MarketStateVersion {
    pub fn new(
        version: u64,
        previous_state_hash: Option<MarketStateHash>,
        transition: StateTransition,
        quantities: Vec<Fixed>,
        resolved: bool,
        withdrawn: u128,
    ) -> Self {
        let state_hash = Self::compute_hash(
            version,
            previous_state_hash.as_ref(),
            &transition,
            &quantities,
            resolved,
            withdrawn,
        );
        Self {
            version,
            previous_state_hash,
            state_hash,
            transition,
            quantities,
            resolved,
            withdrawn,
        }
    }

    fn compute_hash(
        version: u64,
        previous_state_hash: Option<&MarketStateHash>,
        transition: &StateTransition,
        quantities: &[Fixed],
        resolved: bool,
        withdrawn: u128,
    ) -> MarketStateHash {
        let mut hasher = blake3::Hasher::new();
        hasher.update(&version.to_le_bytes());
        match previous_state_hash {
            Some(hash) => {
                hasher.update(&[1]);
                hasher.update(hash.as_bytes());
            }
            None => {
                hasher.update(&[0]);
            }
        }
        transition.hash_into(&mut hasher);
        hasher.update(&(quantities.len() as u64).to_le_bytes());
        for quantity in quantities {
            hasher.update(&quantity.to_bits().to_le_bytes());
        }
        hasher.update(&[u8::from(resolved)]);
        hasher.update(&withdrawn.to_le_bytes());
        MarketStateHash(*hasher.finalize().as_bytes())
    }

    /// Recompute the hash from the version's contents
    pub fn verify_hash(&self) -> bool {
        Self::compute_hash(
            self.version,
            self.previous_state_hash.as_ref(),
            &self.transition,
            &self.quantities,
            self.resolved,
            self.withdrawn,
        ) == self.state_hash
    }

    pub fn is_genesis(&self) -> bool {
        self.previous_state_hash.is_none() && self.version == 0
    }
}

/// Quantities, flags and configuration of one LS-LMSR market.
///
/// Every committed change appends a [`MarketStateVersion`].
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct MarketState {
    creator: Address,
    condition_id: ConditionId,
    engine: LsLmsr,
    overround: u64,
    quantities: Vec<Fixed>,
    resolved: bool,
    withdrawn: u128,
    history: Vec<MarketStateVersion>,
}

impl MarketState {
    pub fn new(
        creator: Address,
        condition_id: ConditionId,
        engine: LsLmsr,
        overround: u64,
    ) -> Self {
        let quantities = vec![Fixed::ZERO; engine.outcome_count()];
        let genesis = MarketStateVersion::new(
            0,
            None,
            StateTransition::Setup,
            quantities.clone(),
            false,
            0,
        );
        Self {
            creator,
            condition_id,
            engine,
            overround,
            quantities,
            resolved: false,
            withdrawn: 0,
            history: vec![genesis],
        }
    }

    pub fn creator(&self) -> Address {
        self.creator
    }

    pub fn condition_id(&self) -> ConditionId {
        self.condition_id
    }

    pub fn engine(&self) -> &LsLmsr {
        &self.engine
    }

    pub fn outcome_count(&self) -> usize {
        self.engine.outcome_count()
    }

    pub fn funding(&self) -> Fixed {
        self.engine.funding()
    }

    /// Basis points
    pub fn overround(&self) -> u64 {
        self.overround
    }

    pub fn quantities(&self) -> &[Fixed] {
        &self.quantities
    }

    pub fn is_resolved(&self) -> bool {
        self.resolved
    }

    pub fn allows_trading(&self) -> bool {
        !self.resolved
    }

    /// Total collateral paid out to the creator
    pub fn withdrawn(&self) -> u128 {
        self.withdrawn
    }

    pub fn history(&self) -> &[MarketStateVersion] {
        &self.history
    }

    pub fn current_version(&self) -> u64 {
        self.history.len() as u64 - 1
    }

    pub fn ensure_trading(&self) -> Result<(), MarketError> {
        if !self.allows_trading() {
            return Err(MarketError::MarketResolved);
        }
        Ok(())
    }

    pub fn check_outcome(&self, outcome: usize) -> Result<(), MarketError> {
        let count = self.outcome_count();
        if outcome >= count {
            return Err(MarketError::InvalidOutcome {
                index: outcome,
                count,
            });
        }
        Ok(())
    }

    /// Cost delta of a hypothetical trade. Does not check resolution.
    pub fn quote(
        &self,
        outcome: usize,
        delta: Fixed,
    ) -> Result<TradeCost, MarketError> {
        self.check_outcome(outcome)?;
        Ok(self.engine.trade_cost(&self.quantities, outcome, delta)?)
    }

    /// `quantities[outcome] += delta`, returning the superseded version.
    ///
    /// Fails without mutation if the market is resolved, the outcome is out
    /// of range, or the new quantities would leave `b <= 0`.
    pub fn apply_delta(
        &mut self,
        outcome: usize,
        delta: Fixed,
    ) -> Result<u64, MarketError> {
        self.ensure_trading()?;
        self.check_outcome(outcome)?;

        let mut quantities = self.quantities.clone();
        quantities[outcome] = quantities[outcome].checked_add(delta)?;
        self.engine.liquidity_parameter(&quantities)?;

        let superseded = self.current_version();
        self.quantities = quantities;
        self.push_version(StateTransition::Trade { outcome, delta });
        tracing::debug!(
            "Market {} outcome {} moved by {} at version {}",
            self.condition_id,
            outcome,
            delta,
            superseded + 1
        );
        Ok(superseded)
    }

    pub fn snapshot_cost(&self) -> Result<Fixed, MarketError> {
        Ok(self.engine.cost_function(&self.quantities)?)
    }

    pub fn snapshot_price(&self, outcome: usize) -> Result<Fixed, MarketError> {
        self.check_outcome(outcome)?;
        Ok(self.engine.price(outcome, &self.quantities)?)
    }

    pub fn snapshot_prices(&self) -> Result<Vec<Fixed>, MarketError> {
        Ok(self.engine.calculate_prices(&self.quantities)?)
    }

    /// Returns `false` if the market was already resolved
    pub fn mark_resolved(&mut self) -> bool {
        if self.resolved {
            return false;
        }
        self.resolved = true;
        self.push_version(StateTransition::Resolved);
        true
    }

    pub fn record_withdrawal(&mut self, amount: u128) -> Result<u64, MarketError> {
        let withdrawn = self
            .withdrawn
            .checked_add(amount)
            .ok_or(crate::math::MathError::ArithmeticOverflow)?;
        let superseded = self.current_version();
        self.withdrawn = withdrawn;
        self.push_version(StateTransition::Withdrawal { amount });
        Ok(superseded)
    }

    /// Discard every version after `version` and restore its contents
    pub fn rollback_to(&mut self, version: u64) -> Result<(), MarketError> {
        let index = usize::try_from(version)
            .map_err(|_| MarketError::UnknownVersion(version))?;
        let target = self
            .history
            .get(index)
            .ok_or(MarketError::UnknownVersion(version))?;
        self.quantities = target.quantities.clone();
        self.resolved = target.resolved;
        self.withdrawn = target.withdrawn;
        self.history.truncate(index + 1);
        tracing::warn!(
            "Market {} rolled back to version {}",
            self.condition_id,
            version
        );
        Ok(())
    }

    fn push_version(&mut self, transition: StateTransition) {
        let previous = self.history.last().map(|v| v.state_hash);
        let version = MarketStateVersion::new(
            self.history.len() as u64,
            previous,
            transition,
            self.quantities.clone(),
            self.resolved,
            self.withdrawn,
        );
        self.history.push(version);
    }
}

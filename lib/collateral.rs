//! Collateral token interface and an in-memory implementation

use std::{collections::HashMap, sync::Arc};

use parking_lot::Mutex;
use thiserror::Error;

use crate::types::Address;

#[derive(Clone, Debug, Eq, Error, PartialEq)]
pub enum CollateralError {
    #[error(
        "insufficient allowance: {spender} may spend {allowance} of {owner}'s balance, {required} required"
    )]
    InsufficientAllowance {
        owner: Address,
        spender: Address,
        allowance: u128,
        required: u128,
    },
    #[error("insufficient balance: {owner} holds {balance}, {required} required")]
    InsufficientBalance {
        owner: Address,
        balance: u128,
        required: u128,
    },
    #[error("collateral supply overflow")]
    Overflow,
}

/// Fungible collateral with transfer/allowance semantics.
///
/// Amounts are in the token's base units. Methods take `&self` so that a
/// single token can be shared between the market, the ledger and traders.
pub trait CollateralToken {
    fn address(&self) -> Address;

    fn decimals(&self) -> u8;

    fn balance_of(&self, owner: Address) -> u128;

    fn allowance(&self, owner: Address, spender: Address) -> u128;

    fn approve(
        &self,
        owner: Address,
        spender: Address,
        amount: u128,
    ) -> Result<(), CollateralError>;

    fn transfer(
        &self,
        from: Address,
        to: Address,
        amount: u128,
    ) -> Result<(), CollateralError>;

    /// Move `amount` from `from` to `to` on behalf of `spender`, consuming
    /// allowance. An allowance of `u128::MAX` is never consumed.
    fn transfer_from(
        &self,
        spender: Address,
        from: Address,
        to: Address,
        amount: u128,
    ) -> Result<(), CollateralError>;
}

#[derive(Debug, Default)]
struct Balances {
    balances: HashMap<Address, u128>,
    allowances: HashMap<(Address, Address), u128>,
    total_supply: u128,
}

impl Balances {
    fn balance(&self, owner: &Address) -> u128 {
        self.balances.get(owner).copied().unwrap_or(0)
    }

    fn move_balance(
        &mut self,
        from: Address,
        to: Address,
        amount: u128,
    ) -> Result<(), CollateralError> {
        let balance = self.balance(&from);
        if balance < amount {
            return Err(CollateralError::InsufficientBalance {
                owner: from,
                balance,
                required: amount,
            });
        }
        if from == to {
            return Ok(());
        }
        let to_balance = self
            .balance(&to)
            .checked_add(amount)
            .ok_or(CollateralError::Overflow)?;
        self.balances.insert(from, balance - amount);
        self.balances.insert(to, to_balance);
        Ok(())
    }
}

/// Shared in-memory collateral token. Clones refer to the same balances.
#[derive(Clone, Debug)]
pub struct InMemoryCollateral {
    address: Address,
    decimals: u8,
    inner: Arc<Mutex<Balances>>,
}

impl InMemoryCollateral {
    pub fn new(address: Address, decimals: u8) -> Self {
        Self {
            address,
            decimals,
            inner: Arc::new(Mutex::new(Balances::default())),
        }
    }

    pub fn mint(&self, to: Address, amount: u128) -> Result<(), CollateralError> {
        let mut inner = self.inner.lock();
        let total_supply = inner
            .total_supply
            .checked_add(amount)
            .ok_or(CollateralError::Overflow)?;
        let balance = inner.balance(&to) + amount;
        inner.total_supply = total_supply;
        inner.balances.insert(to, balance);
        Ok(())
    }

    pub fn total_supply(&self) -> u128 {
        self.inner.lock().total_supply
    }
}

impl CollateralToken for InMemoryCollateral {
    fn address(&self) -> Address {
        self.address
    }

    fn decimals(&self) -> u8 {
        self.decimals
    }

    fn balance_of(&self, owner: Address) -> u128 {
        self.inner.lock().balance(&owner)
    }

    fn allowance(&self, owner: Address, spender: Address) -> u128 {
        self.inner
            .lock()
            .allowances
            .get(&(owner, spender))
            .copied()
            .unwrap_or(0)
    }

    fn approve(
        &self,
        owner: Address,
        spender: Address,
        amount: u128,
    ) -> Result<(), CollateralError> {
        self.inner.lock().allowances.insert((owner, spender), amount);
        tracing::debug!("{} approved {} to spend {}", owner, spender, amount);
        Ok(())
    }

    fn transfer(
        &self,
        from: Address,
        to: Address,
        amount: u128,
    ) -> Result<(), CollateralError> {
        self.inner.lock().move_balance(from, to, amount)
    }

    fn transfer_from(
        &self,
        spender: Address,
        from: Address,
        to: Address,
        amount: u128,
    ) -> Result<(), CollateralError> {
        let mut inner = self.inner.lock();
        let allowance = inner.allowances.get(&(from, spender)).copied().unwrap_or(0);
        if allowance < amount {
            return Err(CollateralError::InsufficientAllowance {
                owner: from,
                spender,
                allowance,
                required: amount,
            });
        }
        inner.move_balance(from, to, amount)?;
        if allowance != u128::MAX {
            inner.allowances.insert((from, spender), allowance - amount);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn token() -> (InMemoryCollateral, Address, Address) {
        let token = InMemoryCollateral::new(Address::from_seed(b"dai"), 18);
        let alice = Address::from_seed(b"alice");
        let bob = Address::from_seed(b"bob");
        token.mint(alice, 100).unwrap();
        (token, alice, bob)
    }

    #[test]
    fn test_transfer() {
        let (token, alice, bob) = token();
        token.transfer(alice, bob, 40).unwrap();
        assert_eq!(token.balance_of(alice), 60);
        assert_eq!(token.balance_of(bob), 40);
        assert_eq!(token.total_supply(), 100);

        assert_eq!(
            token.transfer(bob, alice, 41),
            Err(CollateralError::InsufficientBalance {
                owner: bob,
                balance: 40,
                required: 41
            })
        );
    }

    #[test]
    fn test_transfer_from_consumes_allowance() {
        let (token, alice, bob) = token();
        token.approve(alice, bob, 30).unwrap();
        token.transfer_from(bob, alice, bob, 20).unwrap();
        assert_eq!(token.allowance(alice, bob), 10);

        let err = token.transfer_from(bob, alice, bob, 20).unwrap_err();
        assert!(matches!(
            err,
            CollateralError::InsufficientAllowance {
                allowance: 10,
                required: 20,
                ..
            }
        ));
        // Failed transfers leave balances untouched
        assert_eq!(token.balance_of(alice), 80);
    }

    #[test]
    fn test_unlimited_allowance() {
        let (token, alice, bob) = token();
        token.approve(alice, bob, u128::MAX).unwrap();
        token.transfer_from(bob, alice, bob, 100).unwrap();
        assert_eq!(token.allowance(alice, bob), u128::MAX);
        assert_eq!(token.balance_of(bob), 100);
    }

    #[test]
    fn test_clones_share_balances() {
        let (token, alice, bob) = token();
        let handle = token.clone();
        handle.transfer(alice, bob, 1).unwrap();
        assert_eq!(token.balance_of(bob), 1);
    }
}

//! Liquidity-sensitive LMSR cost function over 64.64 fixed point.
//!
//! The cost function is evaluated on *seeded* quantities `Q_i = funding + q_i`,
//! where `q_i` is the net number of shares issued for outcome `i`:
//!
//! - `b = alpha * Σ Q_i` with `alpha = overround / (n * ln n)`
//! - `C(Q) = b * ln(Σ exp(Q_i / b))`
//! - `p_i = exp(Q_i / b) / Σ_j exp(Q_j / b)`
//!
//! At `q = 0` this gives `C = funding * (1 + overround)`. Exponential sums are
//! always evaluated relative to `max_j Q_j / b`, so no term exceeds `exp(0)`.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::math::fixed::{self, Fixed, MathError};

pub const MIN_OUTCOMES: usize = 2;
/// Outcomes are addressed by bits of a `u128` index set
pub const MAX_OUTCOMES: usize = 128;
/// Overround is given in basis points
pub const OVERROUND_SCALE: i64 = 10_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum LmsrError {
    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },
    #[error("Funding must be positive, got {0}")]
    InvalidFunding(Fixed),
    #[error("Invalid outcome {index}: market has {count} outcomes")]
    InvalidOutcome { index: usize, count: usize },
    #[error("Invalid outcome count {count}: must be between {min} and {max}")]
    InvalidOutcomeCount {
        count: usize,
        min: usize,
        max: usize,
    },
    #[error("Overround must be positive")]
    InvalidOverround,
    #[error(transparent)]
    Math(#[from] MathError),
    #[error("Liquidity parameter must be positive, got {0}")]
    NonPositiveLiquidity(Fixed),
}

/// Result of pricing a change to one outcome's quantity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TradeCost {
    /// `C(q') - C(q)`: positive for buys, negative for sells
    pub cost: Fixed,
    pub new_quantities: Vec<Fixed>,
}

fn check_outcome_count(count: usize) -> Result<(), LmsrError> {
    if !(MIN_OUTCOMES..=MAX_OUTCOMES).contains(&count) {
        return Err(LmsrError::InvalidOutcomeCount {
            count,
            min: MIN_OUTCOMES,
            max: MAX_OUTCOMES,
        });
    }
    Ok(())
}

/// `alpha = (overround / 10_000) / (n * ln n)`
pub fn alpha(outcome_count: usize, overround: u64) -> Result<Fixed, LmsrError> {
    check_outcome_count(outcome_count)?;
    if overround == 0 {
        return Err(LmsrError::InvalidOverround);
    }
    let overround = i64::try_from(overround)
        .map_err(|_| MathError::ArithmeticOverflow)?;
    let overround = Fixed::from_ratio(overround, OVERROUND_SCALE)?;
    // check_outcome_count bounds n by MAX_OUTCOMES
    let n = Fixed::from_int(outcome_count as i64);
    let alpha = overround.checked_div(n.checked_mul(fixed::ln(n)?)?)?;
    if !alpha.is_positive() {
        return Err(LmsrError::InvalidOverround);
    }
    Ok(alpha)
}

/// `b = alpha * Σ Q_i`, which must be positive.
pub fn liquidity_parameter(
    quantities: &[Fixed],
    alpha: Fixed,
) -> Result<Fixed, LmsrError> {
    let b = alpha.checked_mul(Fixed::checked_sum(quantities)?)?;
    if !b.is_positive() {
        return Err(LmsrError::NonPositiveLiquidity(b));
    }
    Ok(b)
}

/// `exp(Q_i / b - m)` for every outcome, with `m = max_j Q_j / b`.
fn shifted_exponentials(
    quantities: &[Fixed],
    b: Fixed,
) -> Result<(Vec<Fixed>, Fixed), LmsrError> {
    if !b.is_positive() {
        return Err(LmsrError::NonPositiveLiquidity(b));
    }
    let scaled = quantities
        .iter()
        .map(|q| q.checked_div(b))
        .collect::<Result<Vec<_>, _>>()?;
    let max = scaled.iter().copied().max().ok_or(
        LmsrError::InvalidOutcomeCount {
            count: 0,
            min: MIN_OUTCOMES,
            max: MAX_OUTCOMES,
        },
    )?;
    let exponentials = scaled
        .iter()
        .map(|s| s.checked_sub(max).and_then(fixed::exp))
        .collect::<Result<Vec<_>, _>>()?;
    Ok((exponentials, max))
}

/// `C = b * ln(Σ exp(Q_i / b))`, evaluated as `b * (m + ln Σ exp(Q_i / b - m))`.
pub fn cost(quantities: &[Fixed], b: Fixed) -> Result<Fixed, LmsrError> {
    let (exponentials, max) = shifted_exponentials(quantities, b)?;
    // The maximal term is exp(0) = 1, so the sum is at least 1
    let sum = Fixed::checked_sum(&exponentials)?;
    let log_sum = fixed::ln(sum)?;
    Ok(b.checked_mul(max.checked_add(log_sum)?)?)
}

/// Price vector `p_i = exp(Q_i / b) / Σ_j exp(Q_j / b)`.
///
/// Every entry is truncated, so the sum lies within `n` ulps below one.
pub fn prices(quantities: &[Fixed], b: Fixed) -> Result<Vec<Fixed>, LmsrError> {
    let (exponentials, _) = shifted_exponentials(quantities, b)?;
    let sum = Fixed::checked_sum(&exponentials)?;
    exponentials
        .iter()
        .map(|e| e.checked_div(sum).map_err(LmsrError::from))
        .collect()
}

pub fn price(
    outcome: usize,
    quantities: &[Fixed],
    b: Fixed,
) -> Result<Fixed, LmsrError> {
    if outcome >= quantities.len() {
        return Err(LmsrError::InvalidOutcome {
            index: outcome,
            count: quantities.len(),
        });
    }
    let (exponentials, _) = shifted_exponentials(quantities, b)?;
    let sum = Fixed::checked_sum(&exponentials)?;
    Ok(exponentials[outcome].checked_div(sum)?)
}

/// LS-LMSR engine for one market configuration.
///
/// All methods take the market's *net* quantities and seed them with the
/// funding internally.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LsLmsr {
    outcome_count: usize,
    funding: Fixed,
    alpha: Fixed,
}

impl LsLmsr {
    pub fn new(
        outcome_count: usize,
        funding: Fixed,
        overround: u64,
    ) -> Result<Self, LmsrError> {
        check_outcome_count(outcome_count)?;
        if !funding.is_positive() {
            return Err(LmsrError::InvalidFunding(funding));
        }
        let alpha = alpha(outcome_count, overround)?;
        Ok(Self {
            outcome_count,
            funding,
            alpha,
        })
    }

    pub fn outcome_count(&self) -> usize {
        self.outcome_count
    }

    pub fn funding(&self) -> Fixed {
        self.funding
    }

    pub fn alpha(&self) -> Fixed {
        self.alpha
    }

    /// Cost-function state `Q_i = funding + q_i`.
    pub fn seeded_quantities(
        &self,
        quantities: &[Fixed],
    ) -> Result<Vec<Fixed>, LmsrError> {
        if quantities.len() != self.outcome_count {
            return Err(LmsrError::DimensionMismatch {
                expected: self.outcome_count,
                actual: quantities.len(),
            });
        }
        Ok(quantities
            .iter()
            .map(|q| q.checked_add(self.funding))
            .collect::<Result<Vec<_>, _>>()?)
    }

    pub fn liquidity_parameter(
        &self,
        quantities: &[Fixed],
    ) -> Result<Fixed, LmsrError> {
        let seeded = self.seeded_quantities(quantities)?;
        liquidity_parameter(&seeded, self.alpha)
    }

    /// Core LS-LMSR cost function
    pub fn cost_function(&self, quantities: &[Fixed]) -> Result<Fixed, LmsrError> {
        let seeded = self.seeded_quantities(quantities)?;
        let b = liquidity_parameter(&seeded, self.alpha)?;
        cost(&seeded, b)
    }

    pub fn calculate_prices(
        &self,
        quantities: &[Fixed],
    ) -> Result<Vec<Fixed>, LmsrError> {
        let seeded = self.seeded_quantities(quantities)?;
        let b = liquidity_parameter(&seeded, self.alpha)?;
        prices(&seeded, b)
    }

    pub fn price(
        &self,
        outcome: usize,
        quantities: &[Fixed],
    ) -> Result<Fixed, LmsrError> {
        let seeded = self.seeded_quantities(quantities)?;
        let b = liquidity_parameter(&seeded, self.alpha)?;
        price(outcome, &seeded, b)
    }

    /// Cost of moving `quantities[outcome]` by `delta`.
    pub fn trade_cost(
        &self,
        quantities: &[Fixed],
        outcome: usize,
        delta: Fixed,
    ) -> Result<TradeCost, LmsrError> {
        if outcome >= self.outcome_count {
            return Err(LmsrError::InvalidOutcome {
                index: outcome,
                count: self.outcome_count,
            });
        }
        let cost_before = self.cost_function(quantities)?;

        let mut new_quantities = quantities.to_vec();
        new_quantities[outcome] = new_quantities[outcome].checked_add(delta)?;
        let cost_after = self.cost_function(&new_quantities)?;

        Ok(TradeCost {
            cost: cost_after.checked_sub(cost_before)?,
            new_quantities,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use proptest::prelude::*;

    /// 1000 units of funding, three outcomes, 5.01% overround
    fn fixture_engine() -> LsLmsr {
        LsLmsr::new(3, Fixed::from_int(1000), 501).unwrap()
    }

    #[test]
    fn test_initial_cost_matches_overround_subsidy() {
        let engine = fixture_engine();
        let cost = engine.cost_function(&[Fixed::ZERO; 3]).unwrap();

        assert_eq!(cost.floor_int(), 1050);
        assert_relative_eq!(cost.to_f64(), 1050.1, max_relative = 1e-13);
    }

    #[test]
    fn test_price_at_baseline_fixture() {
        let engine = fixture_engine();
        let trade = engine
            .trade_cost(&[Fixed::ZERO; 3], 1, Fixed::from_int(10))
            .unwrap();

        let expected = Fixed::from_bits(69_151_762_028_953_803_591);
        assert!(
            trade.cost.abs_diff(expected) < 1 << 8,
            "quote {} too far from {}",
            trade.cost.to_bits(),
            expected.to_bits()
        );
        assert_eq!(
            trade.new_quantities,
            vec![Fixed::ZERO, Fixed::from_int(10), Fixed::ZERO]
        );
    }

    #[test]
    fn test_liquidity_scales_with_exposure() {
        let engine = fixture_engine();
        let b0 = engine.liquidity_parameter(&[Fixed::ZERO; 3]).unwrap();
        let b1 = engine
            .liquidity_parameter(&[Fixed::from_int(500), Fixed::ZERO, Fixed::ZERO])
            .unwrap();

        // b = alpha * 3000 at setup
        assert_relative_eq!(
            b0.to_f64(),
            0.0501 / (3.0 * 3.0f64.ln()) * 3000.0,
            max_relative = 1e-13
        );
        assert!(b1 > b0);
    }

    #[test]
    fn test_uniform_prices_at_baseline() {
        let engine = fixture_engine();
        let prices = engine.calculate_prices(&[Fixed::ZERO; 3]).unwrap();

        for price in &prices {
            assert_relative_eq!(price.to_f64(), 1.0 / 3.0, max_relative = 1e-15);
        }
        let single = engine.price(2, &[Fixed::ZERO; 3]).unwrap();
        assert_eq!(single, prices[2]);
    }

    #[test]
    fn test_buy_costs_and_sell_refunds() {
        let engine = fixture_engine();
        let quantities = [Fixed::from_int(25), Fixed::ZERO, Fixed::from_int(5)];

        let buy = engine
            .trade_cost(&quantities, 0, Fixed::from_int(3))
            .unwrap();
        let sell = engine
            .trade_cost(&buy.new_quantities, 0, Fixed::from_int(-3))
            .unwrap();

        assert!(buy.cost.is_positive());
        assert_eq!(sell.cost.checked_neg().unwrap(), buy.cost);
        assert_eq!(sell.new_quantities, quantities.to_vec());
    }

    /// Without the shift, exp(Q_0 / b) would exceed the 64.64 range
    #[test]
    fn test_numerical_stability_with_skewed_quantities() {
        let engine = LsLmsr::new(3, Fixed::ONE, 501).unwrap();
        let quantities = [Fixed::from_int(1_000_000), Fixed::ZERO, Fixed::ZERO];

        let seeded = engine.seeded_quantities(&quantities).unwrap();
        let b = engine.liquidity_parameter(&quantities).unwrap();
        let ratio = seeded[0].checked_div(b).unwrap();
        assert!(fixed::exp(ratio).is_err());

        let cost = engine.cost_function(&quantities).unwrap();
        assert_relative_eq!(cost.to_f64(), seeded[0].to_f64(), max_relative = 1e-12);
        let prices = engine.calculate_prices(&quantities).unwrap();
        assert!(prices.iter().all(|p| !p.is_negative() && *p <= Fixed::ONE));
        assert!(prices[0] > prices[1]);
    }

    #[test]
    fn test_non_positive_liquidity() {
        let engine = fixture_engine();
        let drained = [Fixed::from_int(-1000); 3];
        assert!(matches!(
            engine.cost_function(&drained),
            Err(LmsrError::NonPositiveLiquidity(_))
        ));
        assert!(matches!(
            cost(&[Fixed::ONE; 3], Fixed::ZERO),
            Err(LmsrError::NonPositiveLiquidity(_))
        ));
    }

    #[test]
    fn test_invalid_configuration() {
        assert!(matches!(
            LsLmsr::new(1, Fixed::ONE, 501),
            Err(LmsrError::InvalidOutcomeCount { count: 1, .. })
        ));
        assert!(matches!(
            LsLmsr::new(MAX_OUTCOMES + 1, Fixed::ONE, 501),
            Err(LmsrError::InvalidOutcomeCount { .. })
        ));
        assert!(matches!(
            LsLmsr::new(2, Fixed::ZERO, 501),
            Err(LmsrError::InvalidFunding(_))
        ));
        assert_eq!(
            LsLmsr::new(2, Fixed::ONE, 0),
            Err(LmsrError::InvalidOverround)
        );
    }

    #[test]
    fn test_dimension_and_outcome_checks() {
        let engine = fixture_engine();
        assert_eq!(
            engine.cost_function(&[Fixed::ZERO; 2]),
            Err(LmsrError::DimensionMismatch {
                expected: 3,
                actual: 2
            })
        );
        assert_eq!(
            engine.trade_cost(&[Fixed::ZERO; 3], 3, Fixed::ONE),
            Err(LmsrError::InvalidOutcome { index: 3, count: 3 })
        );
        assert_eq!(
            engine.price(7, &[Fixed::ZERO; 3]),
            Err(LmsrError::InvalidOutcome { index: 7, count: 3 })
        );
    }

    #[test]
    fn test_deterministic_evaluation() {
        let engine = fixture_engine();
        let quantities = [Fixed::from_ratio(1234, 7).unwrap(), Fixed::ONE, Fixed::ZERO];
        let first = engine.cost_function(&quantities).unwrap();
        let second = engine.clone().cost_function(&quantities).unwrap();
        assert_eq!(first, second);
    }

    fn quantities_strategy() -> impl Strategy<Value = Vec<Fixed>> {
        prop::collection::vec(0i64..50_000, 2..6).prop_map(|hundredths| {
            hundredths
                .into_iter()
                .map(|h| Fixed::from_ratio(h, 100).unwrap())
                .collect()
        })
    }

    proptest! {
        #[test]
        fn test_cost_strictly_increasing(
            quantities in quantities_strategy(),
            outcome_seed in 0usize..128,
            increment in 1i64..1_000,
            overround in 400u64..2_000,
        ) {
            let engine = LsLmsr::new(
                quantities.len(),
                Fixed::from_int(1000),
                overround,
            ).unwrap();
            let outcome = outcome_seed % quantities.len();
            let delta = Fixed::from_ratio(increment, 100).unwrap();

            let trade = engine.trade_cost(&quantities, outcome, delta).unwrap();
            prop_assert!(trade.cost.is_positive());
        }

        #[test]
        fn test_prices_sum_to_one(
            quantities in quantities_strategy(),
            overround in 400u64..2_000,
        ) {
            let engine = LsLmsr::new(
                quantities.len(),
                Fixed::from_int(1000),
                overround,
            ).unwrap();
            let prices = engine.calculate_prices(&quantities).unwrap();
            let total = Fixed::checked_sum(&prices).unwrap();

            prop_assert!(total <= Fixed::ONE);
            prop_assert!(total.abs_diff(Fixed::ONE) <= prices.len() as u128);
            prop_assert!(prices.iter().all(|p| p.is_positive() && *p < Fixed::ONE));
        }
    }
}

//! Market configuration

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::math::ls_lmsr::{MAX_OUTCOMES, MIN_OUTCOMES, OVERROUND_SCALE};
use crate::types::{Address, QuestionId};

/// 5%
pub const DEFAULT_OVERROUND: u64 = 500;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("funding must be positive")]
    ZeroFunding,
    #[error("invalid outcome count {count}: must be between {min} and {max}")]
    InvalidOutcomeCount {
        count: usize,
        min: usize,
        max: usize,
    },
    #[error("invalid overround {0}: must be between 1 and {OVERROUND_SCALE} basis points")]
    InvalidOverround(u64),
    #[error("failed to parse market config")]
    Json(#[from] serde_json::Error),
}

/// Parameters fixed when a market is set up.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(deny_unknown_fields)]
pub struct MarketConfig {
    pub oracle: Address,
    pub question_id: QuestionId,
    pub outcome_count: usize,
    /// Initial subsidy in collateral base units
    pub funding: u128,
    /// Basis points; `501` is 5.01%
    #[serde(default = "default_overround")]
    pub overround: u64,
}

fn default_overround() -> u64 {
    DEFAULT_OVERROUND
}

impl MarketConfig {
    pub fn new(
        oracle: Address,
        question_id: QuestionId,
        outcome_count: usize,
        funding: u128,
    ) -> Self {
        Self {
            oracle,
            question_id,
            outcome_count,
            funding,
            overround: DEFAULT_OVERROUND,
        }
    }

    pub fn with_overround(mut self, overround: u64) -> Self {
        self.overround = overround;
        self
    }

    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(MIN_OUTCOMES..=MAX_OUTCOMES).contains(&self.outcome_count) {
            return Err(ConfigError::InvalidOutcomeCount {
                count: self.outcome_count,
                min: MIN_OUTCOMES,
                max: MAX_OUTCOMES,
            });
        }
        if self.funding == 0 {
            return Err(ConfigError::ZeroFunding);
        }
        if self.overround == 0 || self.overround > OVERROUND_SCALE as u64 {
            return Err(ConfigError::InvalidOverround(self.overround));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config_json(extra: &str) -> String {
        format!(
            r#"{{
                "oracle": "{}",
                "question_id": "{}",
                "outcome_count": 3,
                "funding": 1000000000000000000000{extra}
            }}"#,
            "11".repeat(20),
            "22".repeat(32),
        )
    }

    #[test]
    fn test_from_json_with_default_overround() {
        let config = MarketConfig::from_json(&config_json("")).unwrap();
        assert_eq!(config.outcome_count, 3);
        assert_eq!(config.funding, 1_000 * 10u128.pow(18));
        assert_eq!(config.overround, DEFAULT_OVERROUND);
        assert_eq!(config.oracle, Address::new([0x11; 20]));
    }

    #[test]
    fn test_from_json_explicit_overround() {
        let config =
            MarketConfig::from_json(&config_json(r#", "overround": 501"#)).unwrap();
        assert_eq!(config.overround, 501);
    }

    #[test]
    fn test_unknown_fields_rejected() {
        let err = MarketConfig::from_json(&config_json(r#", "fee": 1"#)).unwrap_err();
        assert!(matches!(err, ConfigError::Json(_)));
    }

    #[test]
    fn test_validate() {
        let base = MarketConfig::new(
            Address::from_seed(b"oracle"),
            QuestionId::from_label("q"),
            2,
            1,
        );
        assert!(base.validate().is_ok());
        assert!(matches!(
            MarketConfig { outcome_count: 1, ..base.clone() }.validate(),
            Err(ConfigError::InvalidOutcomeCount { count: 1, .. })
        ));
        assert!(matches!(
            MarketConfig { funding: 0, ..base.clone() }.validate(),
            Err(ConfigError::ZeroFunding)
        ));
        assert!(matches!(
            base.clone().with_overround(0).validate(),
            Err(ConfigError::InvalidOverround(0))
        ));
        assert!(matches!(
            base.with_overround(10_001).validate(),
            Err(ConfigError::InvalidOverround(10_001))
        ));
    }
}

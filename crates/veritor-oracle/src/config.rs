use crate::error::{OracleError, Result};
use chrono::Duration;
use serde::{Deserialize, Serialize};
use veritor_economics::VeriAmount;

/// Shortest dispute window an admin may configure.
pub const MIN_DISPUTE_WINDOW_SECS: u64 = 3600;

/// Owner-tunable oracle parameters, read by every core operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OracleConfig {
    /// Minimum stake a requester must attach to an inference request
    pub min_requester_stake: VeriAmount,
    /// Minimum bond for prover registration, and the exact amount locked
    /// from the bond when a result is posted
    pub min_prover_stake: VeriAmount,
    /// Seconds after posting during which a challenge is accepted
    pub dispute_window_secs: u64,
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self {
            min_requester_stake: VeriAmount::from_veri(0.1),
            min_prover_stake: VeriAmount::from_veri(0.5),
            dispute_window_secs: 24 * 60 * 60,
        }
    }
}

impl OracleConfig {
    pub fn with_min_requester_stake(mut self, stake: VeriAmount) -> Self {
        self.min_requester_stake = stake;
        self
    }

    pub fn with_min_prover_stake(mut self, stake: VeriAmount) -> Self {
        self.min_prover_stake = stake;
        self
    }

    pub fn with_dispute_window_secs(mut self, secs: u64) -> Self {
        self.dispute_window_secs = secs;
        self
    }

    pub fn dispute_window(&self) -> Duration {
        Duration::seconds(self.dispute_window_secs as i64)
    }

    pub fn validate(&self) -> Result<()> {
        if self.min_requester_stake.is_zero() {
            return Err(OracleError::InvalidConfiguration(
                "min_requester_stake must be non-zero".to_string(),
            ));
        }
        if self.min_prover_stake.is_zero() {
            return Err(OracleError::InvalidConfiguration(
                "min_prover_stake must be non-zero".to_string(),
            ));
        }
        if self.dispute_window_secs < MIN_DISPUTE_WINDOW_SECS {
            return Err(OracleError::InvalidConfiguration(format!(
                "dispute window {}s is below the {}s floor",
                self.dispute_window_secs, MIN_DISPUTE_WINDOW_SECS
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(OracleConfig::default().validate().is_ok());
    }

    #[test]
    fn test_zero_stake_rejected() {
        let config = OracleConfig::default().with_min_requester_stake(VeriAmount::ZERO);
        assert!(matches!(
            config.validate(),
            Err(OracleError::InvalidConfiguration(_))
        ));

        let config = OracleConfig::default().with_min_prover_stake(VeriAmount::ZERO);
        assert!(matches!(
            config.validate(),
            Err(OracleError::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn test_window_floor() {
        // Half an hour is below the floor
        let config = OracleConfig::default().with_dispute_window_secs(30 * 60);
        assert!(matches!(
            config.validate(),
            Err(OracleError::InvalidConfiguration(_))
        ));

        // Exactly one hour is accepted
        let config = OracleConfig::default().with_dispute_window_secs(MIN_DISPUTE_WINDOW_SECS);
        assert!(config.validate().is_ok());
    }
}

//! Scheduler configuration
//!
//! Policy coefficients with environment-based overrides. Coefficients are
//! strictly context-local: every telemetry and fitness read goes through
//! the context's copy, never a process global.

use crate::error::{SchedResult, SchedulerError};
use serde::{Deserialize, Serialize};

/// Default weight of the expected-completion term.
pub const DEFAULT_ALPHA: f64 = 1.0;
/// Default weight of the data-transfer term.
pub const DEFAULT_BETA: f64 = 1.0;
/// Default weight of the energy term.
pub const DEFAULT_GAMMA: f64 = 1000.0;
/// Default idle power draw, in watts.
pub const DEFAULT_IDLE_POWER: f64 = 0.0;

/// Scheduler coefficients and diagnostics switches.
///
/// The fitness of a candidate placement is
/// `alpha * T_completion + beta * T_communication + gamma * consumption`,
/// with an idle-power surcharge when the placement extends the critical
/// path.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Weight of the expected-completion term
    pub alpha: f64,
    /// Weight of the data-transfer term
    pub beta: f64,
    /// Weight of the energy term
    pub gamma: f64,
    /// Idle power drawn by workers kept waiting, in watts
    pub idle_power: f64,
    /// Suppress diagnostic output
    pub silent: bool,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            alpha: DEFAULT_ALPHA,
            beta: DEFAULT_BETA,
            gamma: DEFAULT_GAMMA,
            idle_power: DEFAULT_IDLE_POWER,
            silent: false,
        }
    }
}

impl SchedulerConfig {
    /// Load the default configuration with environment overrides applied.
    ///
    /// Recognized variables: `SCHED_ALPHA`, `SCHED_BETA`, `SCHED_GAMMA`,
    /// `IDLE_POWER` (floats) and `SSILENT` (presence suppresses
    /// diagnostics). Unparsable values keep the default and log a warning.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        config.alpha = env_float("SCHED_ALPHA", config.alpha);
        config.beta = env_float("SCHED_BETA", config.beta);
        config.gamma = env_float("SCHED_GAMMA", config.gamma);
        config.idle_power = env_float("IDLE_POWER", config.idle_power);
        config.silent = std::env::var_os("SSILENT").is_some();

        config
    }

    /// Validate the configuration.
    pub fn validate(&self) -> SchedResult<()> {
        for (name, value) in [
            ("alpha", self.alpha),
            ("beta", self.beta),
            ("gamma", self.gamma),
            ("idle_power", self.idle_power),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(SchedulerError::Validation(format!(
                    "coefficient {} must be finite and non-negative, got {}",
                    name, value
                )));
            }
        }
        Ok(())
    }
}

fn env_float(name: &str, default: f64) -> f64 {
    match std::env::var(name) {
        Ok(raw) => match raw.parse::<f64>() {
            Ok(value) => value,
            Err(_) => {
                tracing::warn!(
                    "ignoring unparsable value {:?} for {}, keeping {}",
                    raw,
                    name,
                    default
                );
                default
            }
        },
        Err(_) => default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn test_default_coefficients() {
        let config = SchedulerConfig::default();
        assert_eq!(config.alpha, 1.0);
        assert_eq!(config.beta, 1.0);
        assert_eq!(config.gamma, 1000.0);
        assert_eq!(config.idle_power, 0.0);
        assert!(!config.silent);
    }

    #[test]
    #[serial]
    fn test_env_overrides() {
        // Arrange
        std::env::set_var("SCHED_ALPHA", "2.5");
        std::env::set_var("SCHED_BETA", "0.5");
        std::env::set_var("SSILENT", "1");

        // Act
        let config = SchedulerConfig::from_env();

        // Assert
        assert_eq!(config.alpha, 2.5);
        assert_eq!(config.beta, 0.5);
        assert_eq!(config.gamma, DEFAULT_GAMMA);
        assert!(config.silent);

        std::env::remove_var("SCHED_ALPHA");
        std::env::remove_var("SCHED_BETA");
        std::env::remove_var("SSILENT");
    }

    #[test]
    #[serial]
    fn test_unparsable_override_keeps_default() {
        std::env::set_var("SCHED_GAMMA", "not-a-float");

        let config = SchedulerConfig::from_env();
        assert_eq!(config.gamma, DEFAULT_GAMMA);

        std::env::remove_var("SCHED_GAMMA");
    }

    #[test]
    fn test_validate_rejects_negative_coefficient() {
        let config = SchedulerConfig {
            alpha: -1.0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_non_finite_coefficient() {
        let config = SchedulerConfig {
            gamma: f64::NAN,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}

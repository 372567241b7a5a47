use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

// Rates in ticks per second. The base rate is the expected setpoint arrival rate.
const DEFAULT_BASE_RATE_HZ: u32 = 10;
const DEFAULT_PERTURBATION_RATE_HZ: u32 = 5;
const DEFAULT_TELEMETRY_RATE_HZ: u32 = 5;
const DEFAULT_LOG_RATE_HZ: u32 = 10;
const DEFAULT_PERTURBATION_MAGNITUDE: f64 = 0.01;

// Physical constants of the test vehicle
const DEFAULT_SETPOINT_SCALER: f64 = 290.0;
const DEFAULT_ROLLING_RESISTANCE: f64 = 0.001;
const DEFAULT_DRAG_COEFFICIENT: f64 = 0.117;
const DEFAULT_MASS_KG: f64 = 310.0;
const DEFAULT_FRONTAL_AREA_M2: f64 = 0.91;
const DEFAULT_AIR_DENSITY: f64 = 1.225;
const DEFAULT_WHEEL_DIAMETER_M: f64 = 0.5588;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("base rate must be non-zero")]
    ZeroBaseRate,
    #[error("{name} rate {rate} Hz exceeds base rate {base} Hz")]
    RateAboveBase { name: &'static str, rate: u32, base: u32 },
    #[error("{name} rate {rate} Hz does not evenly divide base rate {base} Hz")]
    RateNotDivisor { name: &'static str, rate: u32, base: u32 },
    #[error("vehicle mass must be positive, got {0}")]
    InvalidMass(f64),
    #[error("perturbation magnitude must be a finite non-negative fraction, got {0}")]
    InvalidMagnitude(f64),
    #[error("wheel diameter must be positive, got {0}")]
    InvalidWheelDiameter(f64),
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Force-balance constants of the simulated vehicle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VehicleParams {
    /// Newtons of tractive force per unit of setpoint
    pub setpoint_scaler: f64,
    pub rolling_resistance: f64,
    pub drag_coefficient: f64,
    pub mass_kg: f64,
    pub frontal_area_m2: f64,
    pub air_density: f64,
}

impl Default for VehicleParams {
    fn default() -> Self {
        Self {
            setpoint_scaler: DEFAULT_SETPOINT_SCALER,
            rolling_resistance: DEFAULT_ROLLING_RESISTANCE,
            drag_coefficient: DEFAULT_DRAG_COEFFICIENT,
            mass_kg: DEFAULT_MASS_KG,
            frontal_area_m2: DEFAULT_FRONTAL_AREA_M2,
            air_density: DEFAULT_AIR_DENSITY,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WheelParams {
    pub diameter_m: f64,
}

impl Default for WheelParams {
    fn default() -> Self {
        Self { diameter_m: DEFAULT_WHEEL_DIAMETER_M }
    }
}

/// Simulator configuration. Every sub-rate must evenly divide the base rate;
/// a sub-rate of zero disables that action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulatorConfig {
    pub base_rate_hz: u32,
    pub perturbation_rate_hz: u32,
    pub telemetry_rate_hz: u32,
    pub log_rate_hz: u32,
    /// Fraction of current velocity, e.g. 0.01 for +/-1%
    pub perturbation_magnitude: f64,
    pub vehicle: VehicleParams,
    pub wheel: WheelParams,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            base_rate_hz: DEFAULT_BASE_RATE_HZ,
            perturbation_rate_hz: DEFAULT_PERTURBATION_RATE_HZ,
            telemetry_rate_hz: DEFAULT_TELEMETRY_RATE_HZ,
            log_rate_hz: DEFAULT_LOG_RATE_HZ,
            perturbation_magnitude: DEFAULT_PERTURBATION_MAGNITUDE,
            vehicle: VehicleParams::default(),
            wheel: WheelParams::default(),
        }
    }
}

impl SimulatorConfig {
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path.as_ref())?;
        Self::from_json_str(&contents)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.base_rate_hz == 0 {
            return Err(ConfigError::ZeroBaseRate);
        }

        validate_sub_rate("perturbation", self.perturbation_rate_hz, self.base_rate_hz)?;
        validate_sub_rate("telemetry", self.telemetry_rate_hz, self.base_rate_hz)?;
        validate_sub_rate("log", self.log_rate_hz, self.base_rate_hz)?;
        validate_magnitude(self.perturbation_magnitude)?;

        if self.vehicle.mass_kg.is_nan() || self.vehicle.mass_kg <= 0.0 {
            return Err(ConfigError::InvalidMass(self.vehicle.mass_kg));
        }
        if self.wheel.diameter_m.is_nan() || self.wheel.diameter_m <= 0.0 {
            return Err(ConfigError::InvalidWheelDiameter(self.wheel.diameter_m));
        }

        Ok(())
    }

    /// Fixed integration step in seconds.
    pub fn step_seconds(&self) -> f64 {
        1.0 / f64::from(self.base_rate_hz)
    }
}

/// Check that `rate` is zero (disabled) or an exact divisor of `base`.
pub fn validate_sub_rate(name: &'static str, rate: u32, base: u32) -> Result<(), ConfigError> {
    if base == 0 {
        return Err(ConfigError::ZeroBaseRate);
    }
    if rate == 0 {
        return Ok(());
    }
    if rate > base {
        return Err(ConfigError::RateAboveBase { name, rate, base });
    }
    if base % rate != 0 {
        return Err(ConfigError::RateNotDivisor { name, rate, base });
    }
    Ok(())
}

pub fn validate_magnitude(magnitude: f64) -> Result<(), ConfigError> {
    if magnitude.is_finite() && magnitude >= 0.0 {
        Ok(())
    } else {
        Err(ConfigError::InvalidMagnitude(magnitude))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = SimulatorConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.base_rate_hz, 10);
        assert_eq!(config.perturbation_rate_hz, 5);
        assert_eq!(config.telemetry_rate_hz, 5);
        assert_eq!(config.log_rate_hz, 10);
        assert_eq!(config.vehicle.mass_kg, 310.0);
        assert!((config.step_seconds() - 0.1).abs() < 1e-15);
    }

    #[test]
    fn test_zero_sub_rate_is_disabled_not_error() {
        assert!(validate_sub_rate("log", 0, 10).is_ok());
    }

    #[test]
    fn test_non_divisor_rate_rejected() {
        let config = SimulatorConfig { telemetry_rate_hz: 3, ..SimulatorConfig::default() };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::RateNotDivisor { name: "telemetry", rate: 3, base: 10 })
        ));
    }

    #[test]
    fn test_rate_above_base_rejected() {
        let config = SimulatorConfig { log_rate_hz: 20, ..SimulatorConfig::default() };
        assert!(matches!(config.validate(), Err(ConfigError::RateAboveBase { .. })));
    }

    #[test]
    fn test_zero_base_rate_rejected() {
        let config = SimulatorConfig { base_rate_hz: 0, ..SimulatorConfig::default() };
        assert!(matches!(config.validate(), Err(ConfigError::ZeroBaseRate)));
    }

    #[test]
    fn test_invalid_physical_values_rejected() {
        let mut config = SimulatorConfig::default();
        config.vehicle.mass_kg = 0.0;
        assert!(matches!(config.validate(), Err(ConfigError::InvalidMass(_))));

        let config = SimulatorConfig { perturbation_magnitude: f64::NAN, ..SimulatorConfig::default() };
        assert!(matches!(config.validate(), Err(ConfigError::InvalidMagnitude(_))));
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config = SimulatorConfig::from_json_str(r#"{"base_rate_hz": 20, "vehicle": {"mass_kg": 250.0}}"#)
            .unwrap();
        assert_eq!(config.base_rate_hz, 20);
        assert_eq!(config.vehicle.mass_kg, 250.0);
        assert_eq!(config.vehicle.setpoint_scaler, 290.0);
        assert_eq!(config.log_rate_hz, 10);
    }

    #[test]
    fn test_json_with_bad_rate_fails_fast() {
        let result = SimulatorConfig::from_json_str(r#"{"perturbation_rate_hz": 4}"#);
        assert!(matches!(result, Err(ConfigError::RateNotDivisor { name: "perturbation", .. })));
    }

    #[test]
    fn test_load_errors_keep_their_source() {
        use std::error::Error as _;

        let parse = SimulatorConfig::from_json_str("{not json").unwrap_err();
        assert!(matches!(parse, ConfigError::Parse(_)));
        assert!(parse.source().is_some());

        let io = SimulatorConfig::from_json_file("/nonexistent/cruisesim.json").unwrap_err();
        match io {
            ConfigError::Io(ref e) => assert_eq!(e.kind(), std::io::ErrorKind::NotFound),
            ref other => panic!("expected io error, got {:?}", other),
        }
        assert!(io.source().is_some());
    }
}

//! Longitudinal force-balance model with a single explicit Euler step.
//!
//! The step size is `1 / base_rate`: one step per expected setpoint frame,
//! independent of wall-clock time. Velocity is never clamped, so a sustained
//! negative net force drives it below zero.

use crate::config::VehicleParams;
use tracing::trace;

pub const GRAVITY_M_S2: f64 = 9.8;

/// Forces acting on the vehicle for one step, in newtons.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ForceBreakdown {
    pub tractive: f64,
    pub rolling: f64,
    pub drag: f64,
    pub net: f64,
}

impl ForceBreakdown {
    pub fn compute(setpoint: f64, velocity: f64, params: &VehicleParams) -> Self {
        let tractive = setpoint * params.setpoint_scaler;

        // A stationary vehicle has no rolling resistance to push it backwards
        let rolling = if velocity == 0.0 {
            0.0
        } else {
            params.mass_kg * GRAVITY_M_S2 * params.rolling_resistance
        };

        let drag = 0.5
            * params.frontal_area_m2
            * params.drag_coefficient
            * params.air_density
            * velocity
            * velocity;

        Self {
            tractive,
            rolling,
            drag,
            net: tractive - (rolling + drag),
        }
    }

    pub fn acceleration(&self, mass_kg: f64) -> f64 {
        self.net / mass_kg
    }
}

/// Advance `velocity` by one step under `setpoint`.
pub fn step_velocity(setpoint: f64, velocity: f64, params: &VehicleParams, base_rate_hz: u32) -> f64 {
    let forces = ForceBreakdown::compute(setpoint, velocity, params);
    let acceleration = forces.acceleration(params.mass_kg);
    let delta = acceleration * (1.0 / f64::from(base_rate_hz));

    trace!(
        setpoint,
        velocity,
        tractive = forces.tractive,
        rolling = forces.rolling,
        drag = forces.drag,
        delta,
        "force step"
    );

    velocity + delta
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rolling_resistance_zero_when_stationary() {
        let params = VehicleParams::default();
        let forces = ForceBreakdown::compute(0.7, 0.0, &params);
        assert_eq!(forces.rolling, 0.0);
        assert_eq!(forces.drag, 0.0);
        assert_eq!(forces.net, forces.tractive);
    }

    #[test]
    fn test_rolling_resistance_when_moving() {
        let params = VehicleParams::default();
        let forces = ForceBreakdown::compute(0.0, 1.0, &params);
        assert!((forces.rolling - 3.038).abs() < 1e-12);
        // 0.5 * 0.91 * 0.117 * 1.225
        assert!((forces.drag - 0.065_212_875).abs() < 1e-12);
    }

    #[test]
    fn test_first_step_from_rest() {
        let params = VehicleParams::default();
        let velocity = step_velocity(0.5, 0.0, &params, 10);
        // 0.5 * 290 N over 310 kg for 0.1 s
        assert!((velocity - 0.046_774_193_548_387).abs() < 1e-12);
    }

    #[test]
    fn test_velocity_goes_negative_without_clamp() {
        let params = VehicleParams::default();
        let velocity = step_velocity(-1.0, 0.0, &params, 10);
        assert!(velocity < 0.0);

        let next = step_velocity(0.0, 0.0005, &params, 10);
        // Rolling resistance alone pulls a slow vehicle through zero
        assert!(next < 0.0);
    }

    #[test]
    fn test_step_scales_with_base_rate() {
        let params = VehicleParams::default();
        let slow = step_velocity(1.0, 0.0, &params, 10);
        let fast = step_velocity(1.0, 0.0, &params, 20);
        assert!((slow - 2.0 * fast).abs() < 1e-12);
    }
}

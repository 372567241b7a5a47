use crate::config::{validate_sub_rate, ConfigError, SimulatorConfig};
use heapless::Vec;
use serde::{Deserialize, Serialize};

/// Number of periodic actions driven by the tick counter.
pub const MAX_SCHEDULED_ACTIONS: usize = 3;

/// Value of the tick counter before the first setpoint frame arrives.
pub const INITIAL_TICK: u64 = 1;

/// Periodic actions, declared in firing order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScheduledAction {
    Perturbation,
    Telemetry,
    Log,
}

impl ScheduledAction {
    pub const ALL: [ScheduledAction; MAX_SCHEDULED_ACTIONS] =
        [ScheduledAction::Perturbation, ScheduledAction::Telemetry, ScheduledAction::Log];

    pub fn name(self) -> &'static str {
        match self {
            ScheduledAction::Perturbation => "perturbation",
            ScheduledAction::Telemetry => "telemetry",
            ScheduledAction::Log => "log",
        }
    }
}

/// Fires on every tick divisible by `base_rate / rate`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateGate {
    rate_hz: u32,
    divisor: Option<u64>,
}

impl RateGate {
    pub fn new(name: &'static str, base_rate_hz: u32, rate_hz: u32) -> Result<Self, ConfigError> {
        validate_sub_rate(name, rate_hz, base_rate_hz)?;

        let divisor = if rate_hz == 0 {
            None
        } else {
            Some(u64::from(base_rate_hz / rate_hz))
        };

        Ok(Self { rate_hz, divisor })
    }

    pub const fn disabled() -> Self {
        Self { rate_hz: 0, divisor: None }
    }

    pub fn fires(&self, tick: u64) -> bool {
        self.divisor.is_some_and(|divisor| tick % divisor == 0)
    }

    pub fn rate_hz(&self) -> u32 {
        self.rate_hz
    }

    pub fn is_enabled(&self) -> bool {
        self.divisor.is_some()
    }
}

#[derive(Debug, Clone)]
pub struct RateScheduler {
    base_rate_hz: u32,
    gates: [RateGate; MAX_SCHEDULED_ACTIONS],
}

impl RateScheduler {
    pub fn from_config(config: &SimulatorConfig) -> Result<Self, ConfigError> {
        let mut scheduler = Self {
            base_rate_hz: config.base_rate_hz,
            gates: [RateGate::disabled(); MAX_SCHEDULED_ACTIONS],
        };
        scheduler.set_rate(ScheduledAction::Perturbation, config.perturbation_rate_hz)?;
        scheduler.set_rate(ScheduledAction::Telemetry, config.telemetry_rate_hz)?;
        scheduler.set_rate(ScheduledAction::Log, config.log_rate_hz)?;
        Ok(scheduler)
    }

    /// Replace the rate of one action. The previous gate is kept on error.
    pub fn set_rate(&mut self, action: ScheduledAction, rate_hz: u32) -> Result<(), ConfigError> {
        let gate = RateGate::new(action.name(), self.base_rate_hz, rate_hz)?;
        self.gates[action as usize] = gate;
        Ok(())
    }

    pub fn gate(&self, action: ScheduledAction) -> &RateGate {
        &self.gates[action as usize]
    }

    /// Actions due on `tick`, in firing order.
    pub fn due(&self, tick: u64) -> Vec<ScheduledAction, MAX_SCHEDULED_ACTIONS> {
        let mut due = Vec::new();
        for action in ScheduledAction::ALL {
            if self.gate(action).fires(tick) {
                // Capacity equals the number of actions
                let _ = due.push(action);
            }
        }
        due
    }

    pub fn base_rate_hz(&self) -> u32 {
        self.base_rate_hz
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_half_rate_fires_on_even_ticks() {
        let gate = RateGate::new("telemetry", 10, 5).unwrap();
        for tick in 1..=20u64 {
            assert_eq!(gate.fires(tick), tick % 2 == 0, "tick {}", tick);
        }
    }

    #[test]
    fn test_full_rate_fires_every_tick() {
        let gate = RateGate::new("log", 10, 10).unwrap();
        assert!((0..50u64).all(|tick| gate.fires(tick)));
    }

    #[test]
    fn test_zero_rate_never_fires() {
        let gate = RateGate::new("perturbation", 10, 0).unwrap();
        assert!(!gate.is_enabled());
        assert!(!gate.fires(0));
        assert!((0..100u64).all(|tick| !gate.fires(tick)));
    }

    #[test]
    fn test_non_divisor_rejected_at_construction() {
        assert!(matches!(
            RateGate::new("telemetry", 10, 3),
            Err(ConfigError::RateNotDivisor { .. })
        ));
    }

    #[test]
    fn test_due_actions_in_firing_order() {
        let scheduler = RateScheduler::from_config(&SimulatorConfig::default()).unwrap();

        let odd = scheduler.due(3);
        assert_eq!(odd.as_slice(), &[ScheduledAction::Log]);

        let even = scheduler.due(4);
        assert_eq!(
            even.as_slice(),
            &[ScheduledAction::Perturbation, ScheduledAction::Telemetry, ScheduledAction::Log]
        );
    }

    #[test]
    fn test_rejected_rate_change_keeps_previous_gate() {
        let mut scheduler = RateScheduler::from_config(&SimulatorConfig::default()).unwrap();
        assert!(scheduler.set_rate(ScheduledAction::Perturbation, 4).is_err());
        assert_eq!(scheduler.gate(ScheduledAction::Perturbation).rate_hz(), 5);

        scheduler.set_rate(ScheduledAction::Perturbation, 2).unwrap();
        assert!(scheduler.gate(ScheduledAction::Perturbation).fires(5));
        assert!(!scheduler.gate(ScheduledAction::Perturbation).fires(4));
    }
}

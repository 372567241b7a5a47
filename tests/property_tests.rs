//! Property-based tests for the physics, scheduling and perturbation core.

use cruisesim::config::{SimulatorConfig, VehicleParams};
use cruisesim::perturbation::{perturb, FixedSource, RngSource};
use cruisesim::physics::ForceBreakdown;
use cruisesim::scheduler::RateGate;
use cruisesim::simulator::{frames, Simulator};
use cruisesim::telemetry::{MemorySink, WheelRpm};
use proptest::prelude::*;

const BASE_RATES: [u32; 6] = [1, 10, 12, 20, 50, 100];

fn base_and_divisor() -> impl Strategy<Value = (u32, u32)> {
    proptest::sample::select(BASE_RATES.to_vec()).prop_flat_map(|base| {
        let divisors: Vec<u32> = (1..=base).filter(|rate| base % rate == 0).collect();
        (Just(base), proptest::sample::select(divisors))
    })
}

proptest! {
    #[test]
    fn perturbation_stays_within_bound(
        seed in any::<u64>(),
        velocity in -500.0f64..500.0,
        magnitude in 0.0f64..0.5,
    ) {
        let mut source = RngSource::seeded(seed);
        for _ in 0..16 {
            let perturbed = perturb(velocity, magnitude, &mut source);
            let bound = velocity.abs() * magnitude;
            prop_assert!(
                (perturbed - velocity).abs() <= bound + 1e-12,
                "moved {} with bound {}",
                (perturbed - velocity).abs(),
                bound
            );
        }
    }

    #[test]
    fn fixed_draws_stay_within_bound(
        draw in -1.0f64..=1.0,
        velocity in -500.0f64..500.0,
        magnitude in 0.0f64..0.5,
    ) {
        let perturbed = perturb(velocity, magnitude, &mut FixedSource::new(draw));
        prop_assert!((perturbed - velocity).abs() <= velocity.abs() * magnitude + 1e-12);
    }

    #[test]
    fn rolling_resistance_zero_at_rest(
        setpoint in -2.0f64..2.0,
        mass in 1.0f64..5000.0,
        crr in 0.0f64..0.1,
        cd in 0.0f64..1.0,
    ) {
        let params = VehicleParams {
            mass_kg: mass,
            rolling_resistance: crr,
            drag_coefficient: cd,
            ..VehicleParams::default()
        };
        let forces = ForceBreakdown::compute(setpoint, 0.0, &params);
        prop_assert_eq!(forces.rolling, 0.0);
        prop_assert_eq!(forces.net, forces.tractive);
    }

    #[test]
    fn gate_fires_on_divisor_ticks((base, rate) in base_and_divisor(), tick in 0u64..10_000) {
        let gate = RateGate::new("telemetry", base, rate).unwrap();
        let step = u64::from(base / rate);
        prop_assert_eq!(gate.fires(tick), tick % step == 0);
    }

    #[test]
    fn disabled_gate_never_fires(base in 1u32..1000, tick in any::<u64>()) {
        let gate = RateGate::new("log", base, 0).unwrap();
        prop_assert!(!gate.fires(tick));
    }

    #[test]
    fn non_divisor_rates_rejected(base in 1u32..200, rate in 1u32..200) {
        let result = RateGate::new("perturbation", base, rate);
        prop_assert_eq!(result.is_ok(), rate <= base && base % rate == 0);
    }

    #[test]
    fn diagnostics_never_move_the_vehicle(
        setpoints in proptest::collection::vec(-1.0f32..1.0, 1..20),
        integral in any::<i32>(),
        proportional in any::<i32>(),
        error in any::<i32>(),
        target in any::<i16>(),
        status in any::<u8>(),
    ) {
        let mut sim = Simulator::new(
            SimulatorConfig::default(),
            RngSource::seeded(1),
            MemorySink::new(),
            WheelRpm::default(),
        )
        .unwrap();

        for setpoint in setpoints {
            sim.handle(&frames::setpoint(setpoint)).unwrap();
            let before = *sim.state();

            sim.handle(&frames::diagnostic_one(integral, proportional)).unwrap();
            sim.handle(&frames::diagnostic_two(error, target, status)).unwrap();

            let after = sim.state();
            prop_assert_eq!(after.velocity, before.velocity);
            prop_assert_eq!(after.setpoint, before.setpoint);
            prop_assert_eq!(after.tick, before.tick);
            prop_assert_eq!(after.diagnostics.target_speed, target);
            prop_assert_eq!(after.diagnostics.status, status);
        }
    }
}

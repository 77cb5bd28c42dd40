//! State smoother (Buffer D)
//!
//! Low-pass filters the raw steering axis and manages the relax-phase step
//! budget. The position integrator consults the budget, not the wall clock,
//! which decouples "phase of the duty cycle" from "simulation steps actually
//! taken". The buffer written this frame is consumed by the *next* frame's
//! integrator; the one-frame lag is intentional.

use glam::Vec3;
use rayon::prelude::*;

use crate::config::{SimConfig, SimParams};
use crate::pipeline::FrameClock;
use crate::sites::BOOTSTRAP_FRAMES;
use crate::steering::SteeringField;

/// Fixed low-pass damping factor for the steering vector
pub const STEERING_DAMPING: f32 = 0.1;

/// Smoothed steering and remaining relax budget for one site
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct SteeringEntry {
    /// Damped steering vector
    pub smoothed: Vec3,
    /// Relax displacements still to apply; counts down once per frame
    ///
    /// Stored as a float but treated as an integer countdown.
    pub relax_steps_remaining: f32,
}

/// Per-site smoothed steering state (Buffer D)
#[derive(Debug, Clone)]
pub struct SteeringState {
    entries: Vec<SteeringEntry>,
}

impl SteeringState {
    /// Allocate a zeroed state
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: vec![SteeringEntry::default(); capacity],
        }
    }

    /// State entry for a site; zeroed for out-of-range ids
    #[inline]
    pub fn entry(&self, id: usize) -> SteeringEntry {
        self.entries.get(id).copied().unwrap_or_default()
    }
}

/// Smoothing pass: new C + previous D → new D
///
/// The relax→steer transition is detected by comparing the current and
/// previous positions of simulated time within the duty cycle. If a single
/// frame's delta exceeds the whole cycle the transition for that cycle is
/// missed; accepted as an approximation at extreme frame times.
pub fn smooth(
    raw: &SteeringField,
    prev: &SteeringState,
    params: &SimParams,
    config: &SimConfig,
    clock: &FrameClock,
    out: &mut SteeringState,
) {
    let bootstrap = clock.frame < BOOTSTRAP_FRAMES;
    let active = config.site_count;

    let cycle = params.cycle_duration();
    let (in_relax, entering_relax) = if cycle > 0.0 && params.relax_duration > 0.0 {
        let phase = clock.time.rem_euclid(cycle);
        let prev_phase = (clock.time - clock.dt).rem_euclid(cycle);
        let in_relax = phase < params.relax_duration;
        // time < dt means there is no previous frame; the wrapped prev_phase
        // would fake a cycle transition at the very start of a run
        let entering = in_relax && clock.time >= clock.dt && prev_phase >= params.relax_duration;
        (in_relax, entering)
    } else {
        (false, false)
    };
    let full_budget = (params.relax_duration * params.relax_steps_per_second).floor();

    out.entries
        .par_iter_mut()
        .enumerate()
        .for_each(|(id, entry)| {
            if bootstrap || id >= active {
                *entry = SteeringEntry::default();
                return;
            }
            let p = prev.entry(id);
            let smoothed = p.smoothed.lerp(raw.axis(id), STEERING_DAMPING);
            let mut steps = p.relax_steps_remaining;
            if entering_relax {
                steps = full_budget;
            } else if in_relax && steps > 0.0 {
                steps -= 1.0;
            }
            *entry = SteeringEntry {
                smoothed,
                relax_steps_remaining: steps,
            };
        });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SimConfigBuilder;
    use crate::pipeline::FrameClock;

    fn test_config(count: usize) -> SimConfig {
        SimConfigBuilder::new()
            .seed(1)
            .site_count(count)
            .unwrap()
            .voxel_dim(8)
            .unwrap()
            .build()
            .unwrap()
    }

    fn clock(frame: u64, time: f32, dt: f32) -> FrameClock {
        FrameClock { frame, time, dt }
    }

    #[test]
    fn test_bootstrap_frames_emit_zero_state() {
        let config = test_config(4);
        let params = SimParams::default();
        let raw = SteeringField::new(config.site_capacity());
        let mut prev = SteeringState::new(config.site_capacity());
        prev.entries[1] = SteeringEntry {
            smoothed: Vec3::ONE,
            relax_steps_remaining: 9.0,
        };
        let mut out = SteeringState::new(config.site_capacity());
        smooth(&raw, &prev, &params, &config, &clock(3, 0.05, 0.016), &mut out);
        for e in &out.entries {
            assert_eq!(*e, SteeringEntry::default());
        }
    }

    #[test]
    fn test_budget_resets_on_relax_entry() {
        let config = test_config(2);
        let params = SimParams::default(); // relax 4s, steer 6s, 30 steps/s
        let raw = SteeringField::new(config.site_capacity());
        let prev = SteeringState::new(config.site_capacity());
        let mut out = SteeringState::new(config.site_capacity());

        // Crossing from t=9.99 (steer) to t=10.01 (relax of the next cycle)
        let c = clock(600, 10.01, 0.02);
        smooth(&raw, &prev, &params, &config, &c, &mut out);
        assert_eq!(out.entry(0).relax_steps_remaining, 120.0); // floor(4 * 30)
    }

    #[test]
    fn test_no_budget_grant_at_run_start() {
        let config = test_config(2);
        let params = SimParams::default();
        let raw = SteeringField::new(config.site_capacity());
        let prev = SteeringState::new(config.site_capacity());
        let mut out = SteeringState::new(config.site_capacity());

        // First frame after a position override: time has not advanced yet,
        // so the wrapped previous phase must not count as a relax entry
        smooth(&raw, &prev, &params, &config, &clock(5, 0.0, 0.016), &mut out);
        assert_eq!(out.entry(0).relax_steps_remaining, 0.0);
    }

    #[test]
    fn test_budget_decrements_while_relaxing() {
        let config = test_config(2);
        let params = SimParams::default();
        let raw = SteeringField::new(config.site_capacity());
        let mut prev = SteeringState::new(config.site_capacity());
        prev.entries[0].relax_steps_remaining = 5.0;
        let mut out = SteeringState::new(config.site_capacity());

        // Mid-relax, no transition
        let c = clock(100, 2.0, 0.016);
        smooth(&raw, &prev, &params, &config, &c, &mut out);
        assert_eq!(out.entry(0).relax_steps_remaining, 4.0);
    }

    #[test]
    fn test_budget_floors_at_zero_and_freezes_in_steer() {
        let config = test_config(2);
        let params = SimParams::default();
        let raw = SteeringField::new(config.site_capacity());
        let mut prev = SteeringState::new(config.site_capacity());
        prev.entries[0].relax_steps_remaining = 0.0;
        prev.entries[1].relax_steps_remaining = 3.0;
        let mut out = SteeringState::new(config.site_capacity());

        // Exhausted budget stays at zero inside relax
        smooth(&raw, &prev, &params, &config, &clock(100, 2.0, 0.016), &mut out);
        assert_eq!(out.entry(0).relax_steps_remaining, 0.0);

        // Steer phase never decrements
        smooth(&raw, &prev, &params, &config, &clock(400, 7.0, 0.016), &mut out);
        assert_eq!(out.entry(1).relax_steps_remaining, 3.0);
    }

    #[test]
    fn test_smoothing_converges_toward_raw() {
        let config = test_config(1);
        let params = SimParams::default();
        // Zero raw axis: any previous vector decays geometrically
        let raw = SteeringField::new(config.site_capacity());
        let mut state = SteeringState::new(config.site_capacity());
        state.entries[0].smoothed = Vec3::new(1.0, 0.0, 0.0);
        let mut out = SteeringState::new(config.site_capacity());

        let c = clock(100, 7.0, 0.016); // steer phase, past bootstrap
        smooth(&raw, &state, &params, &config, &c, &mut out);
        let after_one = out.entry(0).smoothed.x;
        assert!((after_one - (1.0 - STEERING_DAMPING)).abs() < 1e-6);

        std::mem::swap(&mut state, &mut out);
        smooth(&raw, &state, &params, &config, &c, &mut out);
        let after_two = out.entry(0).smoothed.x;
        assert!(after_two < after_one);
    }

    #[test]
    fn test_inert_entries_stay_zeroed() {
        let config = test_config(2);
        let params = SimParams::default();
        let raw = SteeringField::new(config.site_capacity());
        let mut prev = SteeringState::new(config.site_capacity());
        // Garbage beyond the active count must not survive
        prev.entries[10] = SteeringEntry {
            smoothed: Vec3::ONE,
            relax_steps_remaining: 7.0,
        };
        let mut out = SteeringState::new(config.site_capacity());
        smooth(&raw, &prev, &params, &config, &clock(100, 7.0, 0.016), &mut out);
        assert_eq!(out.entry(10), SteeringEntry::default());
    }
}

//! Site store (Buffer A) and the position integrator
//!
//! One position per site in a fixed-capacity array indexed by id. The
//! integrator produces a full new store every frame: a deterministic hash
//! scatter while the pipeline bootstraps, then either a relax displacement
//! (driven by the remaining relax-step budget) or a steer integration
//! (driven by the smoothed steering vector).

use glam::Vec3;
use rayon::prelude::*;

use crate::config::{SimConfig, SimParams};
use crate::grid::{OwnershipGrid, NO_SITE};
use crate::math::{boundary_delta, confine, scatter_position, SENTINEL_POSITION};
use crate::pipeline::FrameClock;
use crate::smoother::SteeringState;

/// Frames spent re-emitting the hash scatter before steady state begins
///
/// The scatter depends only on `(seed, id)`, so repeating it while the
/// other buffers warm up costs nothing and keeps every stage's bootstrap
/// branch aligned on the same frame window.
pub const BOOTSTRAP_FRAMES: u64 = 5;

/// Forces below this magnitude are treated as no net force
const FORCE_EPSILON: f32 = 1.0e-5;

/// Speeds below this magnitude have no direction to preserve
const SPEED_EPSILON: f32 = 1.0e-6;

/// Positions of up to `capacity` sites, indexed by id (Buffer A)
///
/// Slots at or past the active count are inert: kept zeroed, never read as
/// neighbors. Out-of-range lookups return a sentinel far outside the cube,
/// which loses every distance comparison harmlessly.
#[derive(Debug, Clone)]
pub struct SiteStore {
    positions: Vec<Vec3>,
    active: usize,
}

impl SiteStore {
    /// Allocate a zeroed store
    ///
    /// `capacity` must be at least `active`.
    pub fn new(capacity: usize, active: usize) -> Self {
        debug_assert!(capacity >= active);
        Self {
            positions: vec![Vec3::ZERO; capacity],
            active,
        }
    }

    /// Number of active sites
    #[inline]
    pub fn active_count(&self) -> usize {
        self.active
    }

    /// Allocated slots, including inert ones
    #[inline]
    pub fn capacity(&self) -> usize {
        self.positions.len()
    }

    /// Position of a site by id
    ///
    /// Ids outside `[0, active_count)` return [`SENTINEL_POSITION`].
    #[inline]
    pub fn position(&self, id: i32) -> Vec3 {
        if id < 0 || id as usize >= self.active {
            return SENTINEL_POSITION;
        }
        self.positions[id as usize]
    }

    /// Positions of all active sites
    #[inline]
    pub fn active_positions(&self) -> &[Vec3] {
        &self.positions[..self.active]
    }

    pub(crate) fn set_position(&mut self, id: usize, position: Vec3) {
        self.positions[id] = position;
    }
}

/// Position integration pass: previous A + latest D + latest B → new A
///
/// Every output slot is a pure function of the committed inputs, so slots
/// are evaluated in parallel.
pub fn integrate(
    prev: &SiteStore,
    state: &SteeringState,
    grid: &OwnershipGrid,
    params: &SimParams,
    config: &SimConfig,
    clock: &FrameClock,
    out: &mut SiteStore,
) {
    let active = config.site_count.min(out.capacity());
    out.active = active;
    let frame = clock.frame;

    out.positions
        .par_iter_mut()
        .enumerate()
        .for_each(|(id, slot)| {
            if id >= active {
                *slot = Vec3::ZERO;
                return;
            }
            if frame < BOOTSTRAP_FRAMES {
                *slot = scatter_position(id, config.seed, params.cube_size);
                return;
            }

            let p = prev.position(id as i32);
            let entry = state.entry(id);
            let neighbors = grid.nearest_at(p, params.cube_size);

            let moved = if entry.relax_steps_remaining > 0.0 {
                relax_step(p, id, &neighbors, prev, params)
            } else {
                steer_step(p, id, entry.smoothed, &neighbors, prev, params)
            };

            *slot = confine(moved, params.cube_size, params.periodic);
        });
}

/// Net relax-phase repulsion at `p` and the distance to the closest neighbor
///
/// Each valid neighbor contributes an inverse-distance-weighted push away
/// from it; `-1` entries and the site itself are skipped.
pub fn relax_force(
    p: Vec3,
    id: usize,
    neighbors: &[i32; 4],
    sites: &SiteStore,
    params: &SimParams,
) -> (Vec3, f32) {
    let mut force = Vec3::ZERO;
    let mut closest = f32::INFINITY;

    for &nid in neighbors {
        if nid == NO_SITE || nid as usize == id {
            continue;
        }
        let toward = boundary_delta(
            sites.position(nid),
            p,
            params.cube_size,
            params.periodic,
        );
        let dist = toward.length();
        if dist <= FORCE_EPSILON {
            continue;
        }
        force -= (toward / dist) * (params.relax_repulsion_strength / dist);
        closest = closest.min(dist);
    }

    (force, closest)
}

/// One relax displacement: move toward the net force by a fraction of the
/// breathing room (distance to the single closest neighbor)
///
/// Scaling by breathing room instead of a fixed step prevents overshoot
/// when neighbors are far apart.
fn relax_step(
    p: Vec3,
    id: usize,
    neighbors: &[i32; 4],
    sites: &SiteStore,
    params: &SimParams,
) -> Vec3 {
    let (force, closest) = relax_force(p, id, neighbors, sites, params);
    if force.length_squared() <= FORCE_EPSILON * FORCE_EPSILON || !closest.is_finite() {
        return p;
    }
    p + force.normalize() * closest * params.movement_factor
}

/// One steer integration: smoothed steering velocity, short-range
/// penetration repulsion, friction, then a speed clamp that preserves
/// direction
fn steer_step(
    p: Vec3,
    id: usize,
    smoothed: Vec3,
    neighbors: &[i32; 4],
    sites: &SiteStore,
    params: &SimParams,
) -> Vec3 {
    let sign = if params.invert_steering { -1.0 } else { 1.0 };
    let mut velocity = smoothed * sign * params.steer_strength;

    for &nid in neighbors {
        if nid == NO_SITE || nid as usize == id {
            continue;
        }
        let away = boundary_delta(
            p,
            sites.position(nid),
            params.cube_size,
            params.periodic,
        );
        let dist = away.length();
        if dist <= FORCE_EPSILON || dist >= params.min_repulsion_radius {
            continue;
        }
        let penetration = params.min_repulsion_radius - dist;
        velocity += (away / dist) * penetration * params.repulsion_strength;
    }

    velocity *= 1.0 - params.friction;

    let speed = velocity.length();
    if speed > SPEED_EPSILON {
        let clamped = speed.clamp(params.min_speed, params.max_speed);
        velocity = velocity * (clamped / speed);
    }

    p + velocity
}

//! Voxel ownership grid (Buffer B) and the jump-flood voxelizer
//!
//! Each voxel stores the ids of its 4 nearest active sites, ranked by
//! ascending boundary-aware distance, with `-1` filling unresolved slots.
//! The grid is an approximation of the Voronoi/Delaunay neighborhood, not
//! an exact decomposition: a rebuild seeds each voxel with a capped
//! brute-force scan and then folds in candidates propagated from the
//! previous committed grid at geometrically halving step sizes.

use glam::Vec3;
use rayon::prelude::*;
use std::time::Instant;

use crate::config::{SimConfig, SimParams};
use crate::math::{boundary_distance_sq, pack_voxel, unpack_voxel};
use crate::pipeline::FrameClock;
use crate::sites::SiteStore;

/// Sentinel id meaning "no site resolved for this slot"
///
/// Consumers must treat this as "no answer", never as site 0.
pub const NO_SITE: i32 = -1;

/// Running top-4-by-distance list with strict ascending order and
/// duplicate rejection
#[derive(Debug, Clone, Copy)]
pub struct NearestFour {
    ids: [i32; 4],
    dist_sq: [f32; 4],
}

impl NearestFour {
    /// Empty list: all slots unresolved
    pub fn new() -> Self {
        Self {
            ids: [NO_SITE; 4],
            dist_sq: [f32::INFINITY; 4],
        }
    }

    /// Fold a candidate into the list
    ///
    /// Rejects invalid ids and ids already present (a site folded in from a
    /// neighbor's list may be the one being evaluated). Keeps distances
    /// strictly non-decreasing across the 4 slots.
    pub fn insert(&mut self, id: i32, dist_sq: f32) {
        if id < 0 || self.ids.contains(&id) {
            return;
        }
        for slot in 0..4 {
            if dist_sq < self.dist_sq[slot] {
                // Shift the tail down to make room
                for k in (slot + 1..4).rev() {
                    self.ids[k] = self.ids[k - 1];
                    self.dist_sq[k] = self.dist_sq[k - 1];
                }
                self.ids[slot] = id;
                self.dist_sq[slot] = dist_sq;
                return;
            }
        }
    }

    /// The ranked ids, `-1` in unfilled slots
    #[inline]
    pub fn ids(&self) -> [i32; 4] {
        self.ids
    }

    /// Number of resolved slots
    #[inline]
    pub fn valid_count(&self) -> usize {
        self.ids.iter().filter(|&&id| id != NO_SITE).count()
    }
}

impl Default for NearestFour {
    fn default() -> Self {
        Self::new()
    }
}

/// Per-voxel nearest-4 site ids over a cubic grid (Buffer B)
#[derive(Debug, Clone, PartialEq)]
pub struct OwnershipGrid {
    dim: usize,
    cells: Vec<[i32; 4]>,
}

impl OwnershipGrid {
    /// Allocate an unresolved grid (`-1` everywhere)
    pub fn new(dim: usize) -> Self {
        Self {
            dim,
            cells: vec![[NO_SITE; 4]; dim * dim * dim],
        }
    }

    /// Grid resolution per axis
    #[inline]
    pub fn dim(&self) -> usize {
        self.dim
    }

    /// All voxel entries in linear order
    #[inline]
    pub fn cells(&self) -> &[[i32; 4]] {
        &self.cells
    }

    /// Entry at integer voxel coordinates
    #[inline]
    pub fn entry(&self, x: usize, y: usize, z: usize) -> [i32; 4] {
        self.cells[pack_voxel(x, y, z, self.dim)]
    }

    /// Voxel coordinates containing a world-space point
    ///
    /// Points outside the cube clamp to the boundary voxels.
    #[inline]
    pub fn voxel_of(&self, p: Vec3, cube_size: f32) -> (usize, usize, usize) {
        let max = (self.dim - 1) as f32;
        let to_index = |c: f32| -> usize {
            let t = (c + cube_size) / (2.0 * cube_size) * self.dim as f32;
            t.clamp(0.0, max) as usize
        };
        (to_index(p.x), to_index(p.y), to_index(p.z))
    }

    /// World-space center of a voxel
    #[inline]
    pub fn voxel_center(&self, x: usize, y: usize, z: usize, cube_size: f32) -> Vec3 {
        let half_voxel = cube_size / self.dim as f32;
        let to_world = |i: usize| (i as f32 / self.dim as f32) * 2.0 * cube_size - cube_size;
        Vec3::new(to_world(x), to_world(y), to_world(z)) + Vec3::splat(half_voxel)
    }

    /// Ranked nearest-4 ids for the voxel containing `p`
    #[inline]
    pub fn nearest_at(&self, p: Vec3, cube_size: f32) -> [i32; 4] {
        let (x, y, z) = self.voxel_of(p, cube_size);
        self.entry(x, y, z)
    }

    /// Owner (single nearest site) of the voxel containing `p`
    #[inline]
    pub fn owner_at(&self, p: Vec3, cube_size: f32) -> i32 {
        self.nearest_at(p, cube_size)[0]
    }

    fn copy_from(&mut self, other: &OwnershipGrid) {
        debug_assert_eq!(self.dim, other.dim);
        self.cells.copy_from_slice(&other.cells);
    }
}

/// Jump-flood step schedule for a grid resolution: `dim/2, dim/4, .., 1`
fn step_schedule(dim: usize) -> Vec<usize> {
    let mut steps = Vec::new();
    let mut s = dim / 2;
    while s >= 1 {
        steps.push(s);
        s /= 2;
    }
    steps
}

/// The 26 offsets of a voxel's full neighborhood
fn neighborhood_offsets() -> Vec<(isize, isize, isize)> {
    let mut offsets = Vec::with_capacity(26);
    for dz in -1..=1isize {
        for dy in -1..=1isize {
            for dx in -1..=1isize {
                if (dx, dy, dz) != (0, 0, 0) {
                    offsets.push((dx, dy, dz));
                }
            }
        }
    }
    offsets
}

/// Voxelization pass: new A + previous B → new B
///
/// Rebuilds only every `grid_update_interval` frames; other frames copy the
/// previous grid forward unchanged. A rebuild seeds each voxel from the
/// first `min(active, brute_force_cap)` sites, then (except on frame 0,
/// which has no committed grid to propagate from) folds in every id found
/// in the 26-neighborhood of the previous grid at each step size.
pub fn voxelize(
    sites: &SiteStore,
    prev: &OwnershipGrid,
    params: &SimParams,
    config: &SimConfig,
    clock: &FrameClock,
    out: &mut OwnershipGrid,
) {
    debug_assert_eq!(prev.dim, out.dim);

    if clock.frame % config.grid_update_interval as u64 != 0 {
        out.copy_from(prev);
        return;
    }

    let start = Instant::now();
    let dim = out.dim;
    let cube = params.cube_size;
    let periodic = params.periodic;
    let seed_limit = sites.active_count().min(config.brute_force_cap);
    let propagate = clock.frame > 0;
    let steps = step_schedule(dim);
    let offsets = neighborhood_offsets();

    out.cells.par_iter_mut().enumerate().for_each(|(idx, cell)| {
        let (x, y, z) = unpack_voxel(idx, dim);
        let center = prev.voxel_center(x, y, z, cube);

        let mut best = NearestFour::new();
        for id in 0..seed_limit {
            let d = boundary_distance_sq(center, sites.position(id as i32), cube, periodic);
            best.insert(id as i32, d);
        }

        if propagate {
            for &step in &steps {
                let step = step as isize;
                for &(dx, dy, dz) in &offsets {
                    let nx = x as isize + dx * step;
                    let ny = y as isize + dy * step;
                    let nz = z as isize + dz * step;
                    let (nx, ny, nz) = if periodic {
                        (
                            nx.rem_euclid(dim as isize) as usize,
                            ny.rem_euclid(dim as isize) as usize,
                            nz.rem_euclid(dim as isize) as usize,
                        )
                    } else {
                        let inside = |v: isize| (0..dim as isize).contains(&v);
                        if !inside(nx) || !inside(ny) || !inside(nz) {
                            continue;
                        }
                        (nx as usize, ny as usize, nz as usize)
                    };
                    for id in prev.entry(nx, ny, nz) {
                        if id == NO_SITE {
                            continue;
                        }
                        let d = boundary_distance_sq(center, sites.position(id), cube, periodic);
                        best.insert(id, d);
                    }
                }
            }
        }

        *cell = best.ids();
    });

    log::debug!(
        "[voxelizer] rebuilt {}^3 grid ({} sites seeded, propagate={}) in {:?}",
        dim,
        seed_limit,
        propagate,
        start.elapsed()
    );
}

/// Capped brute-force nearest-4 at an arbitrary point
///
/// Renderer fallback for voxels the grid has not resolved yet (warm-up).
pub fn brute_force_nearest(
    p: Vec3,
    sites: &SiteStore,
    cap: usize,
    cube_size: f32,
    periodic: bool,
) -> [i32; 4] {
    let mut best = NearestFour::new();
    for id in 0..sites.active_count().min(cap) {
        let d = boundary_distance_sq(p, sites.position(id as i32), cube_size, periodic);
        best.insert(id as i32, d);
    }
    best.ids()
}

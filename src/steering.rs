//! Steering estimator (Buffer C)
//!
//! Estimates, per site, the dominant elongation axis of its own Voronoi
//! cell by sampling where rays from the site exit the cell. The output
//! vector points from the cell's narrow extreme toward its wide lobe;
//! its magnitude encodes how elongated the cell is. Steering every site
//! along this axis relaxes the decomposition toward isotropy without any
//! global coordination.

use glam::{Mat3, Vec3};
use rayon::prelude::*;
use std::f32::consts::PI;

use crate::config::{SimConfig, SimParams};
use crate::grid::OwnershipGrid;
use crate::math::{boundary_delta, confine};
use crate::pipeline::FrameClock;
use crate::sites::SiteStore;

/// Golden ratio φ = (1 + √5) / 2
const PHI: f32 = 1.618_034;

/// Base ray directions; opposites are appended, for 24 rays total
const RAY_BASE: usize = 12;

/// Minimum boundary samples for a stable axis estimate
const MIN_BOUNDARY_SAMPLES: usize = 10;

/// Bisection iterations refining each boundary crossing
const BISECTION_ITERS: usize = 5;

/// Backoff retries when the ray's first sample is already misowned
const MISOWNED_RETRIES: usize = 2;

/// Fixed power-iteration seed; no axis-aligned bias
const SEED_AXIS: Vec3 = Vec3::new(0.577_350_3, 0.577_350_3, 0.577_350_3);

/// Per-site steering axis vectors (Buffer C)
#[derive(Debug, Clone)]
pub struct SteeringField {
    axes: Vec<Vec3>,
}

impl SteeringField {
    /// Allocate a zeroed field
    pub fn new(capacity: usize) -> Self {
        Self {
            axes: vec![Vec3::ZERO; capacity],
        }
    }

    /// Steering axis for a site; zero for out-of-range ids
    #[inline]
    pub fn axis(&self, id: usize) -> Vec3 {
        self.axes.get(id).copied().unwrap_or(Vec3::ZERO)
    }
}

/// Fixed ray table: golden-angle spiral over the sphere plus opposites
///
/// The spiral follows the same golden-angle construction used for
/// near-uniform sphere scattering; appending each direction's opposite
/// guarantees the boundary is probed symmetrically even when a ray on one
/// side fails.
pub fn ray_directions() -> Vec<Vec3> {
    let n = RAY_BASE as f32;
    let mut dirs = Vec::with_capacity(RAY_BASE * 2);
    for i in 0..RAY_BASE {
        let i_f = i as f32;
        let theta = 2.0 * PI * i_f / PHI;
        let cos_phi = 1.0 - 2.0 * (i_f + 0.5) / n;
        let sin_phi = (1.0 - cos_phi * cos_phi).max(0.0).sqrt();
        dirs.push(Vec3::new(
            sin_phi * theta.cos(),
            sin_phi * theta.sin(),
            cos_phi,
        ));
    }
    for i in 0..RAY_BASE {
        let d = dirs[i];
        dirs.push(-d);
    }
    dirs
}

/// Find where a ray from a site exits the site's own cell
///
/// Marches outward by one voxel per step until the grid owner at the sample
/// differs from `id`, then bisects between the last owned and first
/// disowned radii. A misowned start backs off and retries closer in; rays
/// that never leave the cell (or never enter it) report `None`.
fn boundary_exit(
    p: Vec3,
    dir: Vec3,
    id: i32,
    grid: &OwnershipGrid,
    cube_size: f32,
    periodic: bool,
) -> Option<Vec3> {
    let step = 2.0 * cube_size / grid.dim() as f32;
    let max_radius = 2.0 * cube_size * 1.732_050_8; // cube diagonal
    let sample = |r: f32| confine(p + dir * r, cube_size, periodic);
    let owned = |r: f32| grid.owner_at(sample(r), cube_size) == id;

    let mut inside: Option<f32> = None;
    let mut backoffs = 0;
    let mut r = step;
    // Generous cap: the march is one voxel per step across the diagonal
    for _ in 0..4 * grid.dim() {
        if r > max_radius {
            return None;
        }
        if owned(r) {
            inside = Some(r);
            r += step;
            continue;
        }
        let Some(mut lo) = inside else {
            // Start sample misowned (grid too coarse at the site itself)
            backoffs += 1;
            if backoffs > MISOWNED_RETRIES {
                return None;
            }
            r *= 0.5;
            continue;
        };
        let mut hi = r;
        for _ in 0..BISECTION_ITERS {
            let mid = 0.5 * (lo + hi);
            if owned(mid) {
                lo = mid;
            } else {
                hi = mid;
            }
        }
        return Some(sample(0.5 * (lo + hi)));
    }
    None
}

/// Recover the signed elongation axis from a cloud of boundary samples
///
/// Returns `None` below [`MIN_BOUNDARY_SAMPLES`] (insufficient data for a
/// stable estimate). Otherwise: boundary-aware centroid, 3×3 covariance of
/// the recentered cloud, two power iterations for the dominant eigenvector,
/// skewness to orient it toward the wider lobe, and the delta between the
/// extreme projections as the output.
pub fn axis_from_samples(
    site: Vec3,
    samples: &[Vec3],
    cube_size: f32,
    periodic: bool,
) -> Option<Vec3> {
    if samples.len() < MIN_BOUNDARY_SAMPLES {
        return None;
    }
    let n = samples.len() as f32;

    // Raw subtraction would corrupt the centroid across a periodic wall
    let deltas: Vec<Vec3> = samples
        .iter()
        .map(|&s| boundary_delta(s, site, cube_size, periodic))
        .collect();
    let centroid = deltas.iter().copied().sum::<Vec3>() / n;

    let mut xx = 0.0;
    let mut xy = 0.0;
    let mut xz = 0.0;
    let mut yy = 0.0;
    let mut yz = 0.0;
    let mut zz = 0.0;
    for d in &deltas {
        let q = *d - centroid;
        xx += q.x * q.x;
        xy += q.x * q.y;
        xz += q.x * q.z;
        yy += q.y * q.y;
        yz += q.y * q.z;
        zz += q.z * q.z;
    }
    let cov = Mat3::from_cols(
        Vec3::new(xx, xy, xz),
        Vec3::new(xy, yy, yz),
        Vec3::new(xz, yz, zz),
    ) * (1.0 / n);

    let mut axis = SEED_AXIS;
    for _ in 0..2 {
        let next = cov * axis;
        if next.length_squared() < 1.0e-12 {
            return None; // degenerate cloud
        }
        axis = next.normalize();
    }

    // Third moment along the axis orients it toward the wider lobe
    let skew: f32 = deltas.iter().map(|d| (*d - centroid).dot(axis).powi(3)).sum();
    if skew < 0.0 {
        axis = -axis;
    }

    let mut lo_idx = 0;
    let mut hi_idx = 0;
    let mut lo_proj = f32::INFINITY;
    let mut hi_proj = f32::NEG_INFINITY;
    for (i, d) in deltas.iter().enumerate() {
        let proj = (*d - centroid).dot(axis);
        if proj < lo_proj {
            lo_proj = proj;
            lo_idx = i;
        }
        if proj > hi_proj {
            hi_proj = proj;
            hi_idx = i;
        }
    }

    Some(boundary_delta(
        samples[hi_idx],
        samples[lo_idx],
        cube_size,
        periodic,
    ))
}

/// Steering estimation pass: new A + new B + previous C → new C
///
/// Runs on even frames only; odd frames pass the previous field through
/// unchanged, halving the cost. A site whose rays fail to collect enough
/// boundary samples keeps its previous axis.
pub fn estimate(
    sites: &SiteStore,
    grid: &OwnershipGrid,
    prev: &SteeringField,
    params: &SimParams,
    config: &SimConfig,
    clock: &FrameClock,
    out: &mut SteeringField,
) {
    if clock.frame % 2 == 1 {
        out.axes.copy_from_slice(&prev.axes);
        return;
    }

    let active = config.site_count;
    let dirs = ray_directions();
    let cube = params.cube_size;
    let periodic = params.periodic;

    out.axes.par_iter_mut().enumerate().for_each(|(id, slot)| {
        if id >= active {
            *slot = Vec3::ZERO;
            return;
        }
        let p = sites.position(id as i32);
        let mut samples = Vec::with_capacity(dirs.len());
        for &dir in &dirs {
            if let Some(hit) = boundary_exit(p, dir, id as i32, grid, cube, periodic) {
                samples.push(hit);
            }
        }
        *slot = match axis_from_samples(p, &samples, cube, periodic) {
            Some(axis) => axis,
            None => prev.axis(id),
        };
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SimConfigBuilder;
    use crate::grid::{voxelize, OwnershipGrid};
    use crate::pipeline::FrameClock;

    fn clock_at(frame: u64) -> FrameClock {
        FrameClock {
            frame,
            time: frame as f32 / 60.0,
            dt: 1.0 / 60.0,
        }
    }

    /// Boundary cloud of a prolate ellipsoid with semi-axes (a, b, b)
    fn ellipsoid_samples(center: Vec3, a: f32, b: f32, count: usize) -> Vec<Vec3> {
        let n = count as f32;
        (0..count)
            .map(|i| {
                let i_f = i as f32;
                let theta = 2.0 * PI * i_f / PHI;
                let cos_phi = 1.0 - 2.0 * (i_f + 0.5) / n;
                let sin_phi = (1.0 - cos_phi * cos_phi).max(0.0).sqrt();
                let u = Vec3::new(sin_phi * theta.cos(), sin_phi * theta.sin(), cos_phi);
                center + Vec3::new(a * u.x, b * u.y, b * u.z)
            })
            .collect()
    }

    #[test]
    fn test_ray_table_has_opposites() {
        let dirs = ray_directions();
        assert_eq!(dirs.len(), RAY_BASE * 2);
        for i in 0..RAY_BASE {
            assert!((dirs[i].length() - 1.0).abs() < 1e-5);
            assert!((dirs[i] + dirs[RAY_BASE + i]).length() < 1e-5);
        }
    }

    #[test]
    fn test_prolate_ellipsoid_recovers_long_axis() {
        let site = Vec3::new(0.1, -0.05, 0.2);
        let samples = ellipsoid_samples(site, 0.5, 0.2, 40);
        let axis = axis_from_samples(site, &samples, 1.0, false).unwrap();

        // Parallel to x up to overall sign
        let alignment = axis.normalize().dot(Vec3::X).abs();
        assert!(alignment > 0.99, "alignment {} too low", alignment);
        // Magnitude spans the long diameter
        assert!(
            (axis.length() - 1.0).abs() < 0.1,
            "length {} should be near 2a = 1.0",
            axis.length()
        );
    }

    #[test]
    fn test_axis_recovery_across_periodic_wall() {
        // Cell straddles the +x face; raw subtraction would tear the cloud
        let cube = 1.0;
        let site = Vec3::new(0.95, 0.0, 0.0);
        let samples: Vec<Vec3> = ellipsoid_samples(site, 0.4, 0.15, 40)
            .into_iter()
            .map(|s| confine(s, cube, true))
            .collect();
        let axis = axis_from_samples(site, &samples, cube, true).unwrap();
        let alignment = axis.normalize().dot(Vec3::X).abs();
        assert!(alignment > 0.99, "alignment {} too low", alignment);
    }

    #[test]
    fn test_too_few_samples_yields_none() {
        let site = Vec3::ZERO;
        let samples = ellipsoid_samples(site, 0.5, 0.2, MIN_BOUNDARY_SAMPLES - 1);
        assert!(axis_from_samples(site, &samples, 1.0, false).is_none());
    }

    #[test]
    fn test_odd_frames_copy_previous_field() {
        let config = SimConfigBuilder::new()
            .seed(2)
            .site_count(4)
            .unwrap()
            .voxel_dim(8)
            .unwrap()
            .build()
            .unwrap();
        let params = SimParams::default();
        let sites = SiteStore::new(config.site_capacity(), config.site_count);
        let grid = OwnershipGrid::new(config.voxel_dim);

        let mut prev = SteeringField::new(config.site_capacity());
        prev.axes[2] = Vec3::new(0.3, -0.1, 0.7);
        let mut out = SteeringField::new(config.site_capacity());
        estimate(&sites, &grid, &prev, &params, &config, &clock_at(7), &mut out);
        assert_eq!(out.axes, prev.axes);
    }

    #[test]
    fn test_lone_site_keeps_previous_axis() {
        // One site owns the whole cube: no ray ever exits the cell, so the
        // estimator must fall back to the previous (zero) axis
        let config = SimConfigBuilder::new()
            .seed(3)
            .site_count(1)
            .unwrap()
            .voxel_dim(16)
            .unwrap()
            .grid_update_interval(1)
            .unwrap()
            .build()
            .unwrap();
        let params = SimParams::default();
        let mut sites = SiteStore::new(config.site_capacity(), 1);
        sites.set_position(0, Vec3::new(0.2, 0.1, -0.3));
        let empty = OwnershipGrid::new(config.voxel_dim);
        let mut grid = OwnershipGrid::new(config.voxel_dim);
        voxelize(&sites, &empty, &params, &config, &clock_at(0), &mut grid);

        let prev = SteeringField::new(config.site_capacity());
        let mut out = SteeringField::new(config.site_capacity());
        estimate(&sites, &grid, &prev, &params, &config, &clock_at(6), &mut out);
        assert_eq!(out.axis(0), Vec3::ZERO);
    }

    #[test]
    fn test_elongated_pair_produces_axis_along_separation() {
        // Two sites side by side on x: each cell is a half-cube slab, widest
        // across y/z, so the recovered axis should be orthogonal to x
        let config = SimConfigBuilder::new()
            .seed(4)
            .site_count(2)
            .unwrap()
            .voxel_dim(32)
            .unwrap()
            .grid_update_interval(1)
            .unwrap()
            .build()
            .unwrap();
        let params = SimParams::default();
        let mut sites = SiteStore::new(config.site_capacity(), 2);
        sites.set_position(0, Vec3::new(-0.5, 0.0, 0.0));
        sites.set_position(1, Vec3::new(0.5, 0.0, 0.0));
        let empty = OwnershipGrid::new(config.voxel_dim);
        let mut grid = OwnershipGrid::new(config.voxel_dim);
        voxelize(&sites, &empty, &params, &config, &clock_at(0), &mut grid);

        let prev = SteeringField::new(config.site_capacity());
        let mut out = SteeringField::new(config.site_capacity());
        estimate(&sites, &grid, &prev, &params, &config, &clock_at(6), &mut out);

        let axis = out.axis(0);
        assert!(axis.length() > 0.1, "slab cell should produce a real axis");
        let x_alignment = axis.normalize().dot(Vec3::X).abs();
        assert!(
            x_alignment < 0.5,
            "slab axis should be orthogonal-ish to x, got alignment {}",
            x_alignment
        );
    }
}

//! Boundary-aware geometry utilities
//!
//! Every distance in the pipeline goes through [`boundary_delta`], which
//! understands both boundary modes of the bounding cube: closed box
//! (plain subtraction) and periodic wrap (shortest image per axis).
//! The cube is `[-cube_size, cube_size]^3`, so the full extent of one axis
//! is `2 * cube_size`.

use glam::Vec3;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

/// Position returned for out-of-range site lookups
///
/// Far enough outside any reasonable cube that the sentinel loses every
/// distance comparison instead of corrupting a nearest-neighbor list.
pub const SENTINEL_POSITION: Vec3 = Vec3::splat(1.0e9);

/// Delta from `b` to `a`, aware of the cube's boundary mode
///
/// In closed mode this is exactly `a - b`. In periodic mode each component
/// is wrapped to the shortest image, so no component ever exceeds
/// `cube_size` in magnitude.
///
/// # Example
///
/// ```
/// use glam::Vec3;
/// use voronoi_relax::math::boundary_delta;
///
/// let a = Vec3::new(0.9, 0.0, 0.0);
/// let b = Vec3::new(-0.9, 0.0, 0.0);
/// // Closed: the long way across the cube
/// assert_eq!(boundary_delta(a, b, 1.0, false).x, 1.8);
/// // Periodic: the short way through the wall
/// assert!((boundary_delta(a, b, 1.0, true).x + 0.2).abs() < 1e-6);
/// ```
#[inline]
pub fn boundary_delta(a: Vec3, b: Vec3, cube_size: f32, periodic: bool) -> Vec3 {
    let raw = a - b;
    if !periodic {
        return raw;
    }
    Vec3::new(
        wrapped_component(raw.x, cube_size),
        wrapped_component(raw.y, cube_size),
        wrapped_component(raw.z, cube_size),
    )
}

/// Boundary-aware squared distance between two points
#[inline]
pub fn boundary_distance_sq(a: Vec3, b: Vec3, cube_size: f32, periodic: bool) -> f32 {
    boundary_delta(a, b, cube_size, periodic).length_squared()
}

/// Boundary-aware distance between two points
#[inline]
pub fn boundary_distance(a: Vec3, b: Vec3, cube_size: f32, periodic: bool) -> f32 {
    boundary_delta(a, b, cube_size, periodic).length()
}

/// Wrap one delta component to its shortest periodic image
#[inline]
fn wrapped_component(delta: f32, half_extent: f32) -> f32 {
    let extent = 2.0 * half_extent;
    if delta > half_extent {
        delta - extent
    } else if delta < -half_extent {
        delta + extent
    } else {
        delta
    }
}

/// Bring a position back into the cube after integration
///
/// Periodic mode wraps each component into `[-cube_size, cube_size)`;
/// closed mode clamps to the cube faces.
#[inline]
pub fn confine(p: Vec3, cube_size: f32, periodic: bool) -> Vec3 {
    if periodic {
        let extent = 2.0 * cube_size;
        Vec3::new(
            (p.x + cube_size).rem_euclid(extent) - cube_size,
            (p.y + cube_size).rem_euclid(extent) - cube_size,
            (p.z + cube_size).rem_euclid(extent) - cube_size,
        )
    } else {
        p.clamp(Vec3::splat(-cube_size), Vec3::splat(cube_size))
    }
}

/// Pack integer voxel coordinates into a linear index
#[inline]
pub fn pack_voxel(x: usize, y: usize, z: usize, dim: usize) -> usize {
    (z * dim + y) * dim + x
}

/// Recover integer voxel coordinates from a linear index
#[inline]
pub fn unpack_voxel(index: usize, dim: usize) -> (usize, usize, usize) {
    let x = index % dim;
    let y = (index / dim) % dim;
    let z = index / (dim * dim);
    (x, y, z)
}

/// Deterministic bootstrap position for a site id
///
/// Hashes `(seed, id)` into a ChaCha stream and draws one point uniformly
/// inside the cube. The scatter has no dependency on prior frames, so two
/// runs with the same seed start from identical configurations.
pub fn scatter_position(id: usize, seed: u32, cube_size: f32) -> Vec3 {
    // SplitMix-style mix keeps adjacent ids from producing adjacent streams.
    let mut h = (seed as u64) ^ ((id as u64).wrapping_mul(0x9e37_79b9_7f4a_7c15));
    h ^= h >> 30;
    h = h.wrapping_mul(0xbf58_476d_1ce4_e5b9);
    let mut rng = ChaCha8Rng::seed_from_u64(h);
    Vec3::new(
        rng.gen_range(-cube_size..cube_size),
        rng.gen_range(-cube_size..cube_size),
        rng.gen_range(-cube_size..cube_size),
    )
}

// 4x4 Bayer matrix for ordered-dither translucency, normalized on lookup.
const BAYER4: [u8; 16] = [0, 8, 2, 10, 12, 4, 14, 6, 3, 11, 1, 9, 15, 7, 13, 5];

/// Ordered-dither threshold in `(0, 1)` for a pixel coordinate
///
/// Uses the half-step convention, so an opacity of 0 always falls below the
/// threshold and an opacity of 1 never does. The coordinates may carry a
/// per-frame jitter offset; the pattern tiles, so any offset is valid.
#[inline]
pub fn dither_threshold(x: u32, y: u32) -> f32 {
    let idx = ((y & 3) * 4 + (x & 3)) as usize;
    (BAYER4[idx] as f32 + 0.5) / 16.0
}

/// Hermite smoothstep between two edges
#[inline]
pub fn smoothstep(edge0: f32, edge1: f32, x: f32) -> f32 {
    if edge1 <= edge0 {
        return if x < edge0 { 0.0 } else { 1.0 };
    }
    let t = ((x - edge0) / (edge1 - edge0)).clamp(0.0, 1.0);
    t * t * (3.0 - 2.0 * t)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_closed_delta_is_plain_subtraction() {
        let a = Vec3::new(0.7, -0.4, 0.9);
        let b = Vec3::new(-0.8, 0.3, -0.2);
        assert_eq!(boundary_delta(a, b, 1.0, false), a - b);
    }

    #[test]
    fn test_periodic_delta_never_exceeds_half_extent() {
        let cube = 1.5;
        // Deterministic scatter doubles as a point source for the law check
        for i in 0..200 {
            let a = scatter_position(i, 7, cube);
            let b = scatter_position(i + 1000, 7, cube);
            let d = boundary_delta(a, b, cube, true);
            assert!(d.x.abs() <= cube + 1e-5);
            assert!(d.y.abs() <= cube + 1e-5);
            assert!(d.z.abs() <= cube + 1e-5);
        }
    }

    #[test]
    fn test_periodic_delta_picks_short_image() {
        let a = Vec3::new(0.95, 0.0, 0.0);
        let b = Vec3::new(-0.95, 0.0, 0.0);
        let d = boundary_delta(a, b, 1.0, true);
        assert!((d.x + 0.1).abs() < 1e-6, "expected -0.1, got {}", d.x);
    }

    #[test]
    fn test_confine_periodic_wraps() {
        let p = Vec3::new(1.3, -1.7, 0.5);
        let c = confine(p, 1.0, true);
        assert!((c.x + 0.7).abs() < 1e-6);
        assert!((c.y - 0.3).abs() < 1e-6);
        assert!((c.z - 0.5).abs() < 1e-6);
        assert!(c.max_element() < 1.0 && c.min_element() >= -1.0);
    }

    #[test]
    fn test_confine_closed_clamps() {
        let p = Vec3::new(5.0, -5.0, 0.25);
        let c = confine(p, 1.0, false);
        assert_eq!(c, Vec3::new(1.0, -1.0, 0.25));
    }

    #[test]
    fn test_voxel_pack_roundtrip() {
        let dim = 32;
        for &(x, y, z) in &[(0, 0, 0), (31, 0, 0), (5, 17, 29), (31, 31, 31)] {
            let idx = pack_voxel(x, y, z, dim);
            assert_eq!(unpack_voxel(idx, dim), (x, y, z));
        }
        assert_eq!(pack_voxel(31, 31, 31, dim), dim * dim * dim - 1);
    }

    #[test]
    fn test_scatter_determinism() {
        for id in [0, 1, 17, 49_999] {
            assert_eq!(scatter_position(id, 42, 2.0), scatter_position(id, 42, 2.0));
        }
        // Different seeds move the scatter
        assert_ne!(scatter_position(3, 42, 2.0), scatter_position(3, 43, 2.0));
    }

    #[test]
    fn test_scatter_stays_in_cube() {
        let cube = 3.0;
        for id in 0..500 {
            let p = scatter_position(id, 9, cube);
            assert!(p.abs().max_element() <= cube);
        }
    }

    #[test]
    fn test_dither_covers_sixteen_levels() {
        let mut seen = std::collections::HashSet::new();
        for y in 0..4 {
            for x in 0..4 {
                let t = dither_threshold(x, y);
                assert!((0.0..1.0).contains(&t));
                seen.insert((t * 16.0) as u32);
            }
        }
        assert_eq!(seen.len(), 16);
    }

    #[test]
    fn test_dither_tiles() {
        assert_eq!(dither_threshold(1, 2), dither_threshold(5, 6));
    }

    #[test]
    fn test_smoothstep_endpoints() {
        assert_eq!(smoothstep(0.0, 1.0, -0.5), 0.0);
        assert_eq!(smoothstep(0.0, 1.0, 1.5), 1.0);
        assert!((smoothstep(0.0, 1.0, 0.5) - 0.5).abs() < 1e-6);
    }
}

//! Raymarched renderer
//!
//! Renders the implicit Voronoi cell-boundary surface by sphere-tracing a
//! bisector field through the bounding cube. Each pixel is independent and
//! reads only the committed site store, ownership grid, and steering field,
//! so rows are evaluated in parallel.
//!
//! The bisector field at a point, for candidate sites `p1..p4` (ranked by
//! the ownership grid), is `max_k 0.5 * (dist(p, p1) - dist(p, pk))`: zero
//! exactly on the boundary between the closest site and a tied runner-up,
//! negative inside `p1`'s cell, positive outside. Its magnitude doubles as
//! a safe march step.

pub mod camera;

use glam::Vec3;
use rayon::prelude::*;

use crate::config::{SimConfig, SimParams};
use crate::grid::{brute_force_nearest, OwnershipGrid, NO_SITE};
use crate::math::{boundary_distance, dither_threshold, smoothstep};
use crate::pipeline::FrameClock;
use crate::sites::SiteStore;
use crate::steering::SteeringField;

use self::camera::OrbitCamera;

/// Hit tolerance as a fraction of the cube half-size
const HIT_EPSILON_FACTOR: f32 = 0.002;

/// Minimum march step as a fraction of the cube half-size
const MIN_STEP_FACTOR: f32 = 0.004;

/// Probe step through unresolved regions, fraction of the cube half-size
const PROBE_STEP_FACTOR: f32 = 0.02;

/// Distance to push past a dithered-through surface
const SURFACE_SKIP_FACTOR: f32 = 0.01;

/// Finite-difference epsilon for surface normals
const NORMAL_EPSILON_FACTOR: f32 = 0.003;

/// Fraction of the background blended in at full march depth
const FOG_STRENGTH: f32 = 0.55;

/// Radius of the steering overlay capsule, fraction of the cube half-size
const OVERLAY_RADIUS_FACTOR: f32 = 0.012;

/// Renderer parameters
///
/// Colors are linear RGB in `[0, 1]`; lengths are in cube-space units.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RenderOptions {
    /// Color emitted where no surface is hit
    pub background: Vec3,
    /// Cell color when `random_colors` is off
    pub base_color: Vec3,
    /// Color blended in near cell edges
    pub edge_color: Vec3,
    /// Hash each site id to its own color instead of using `base_color`
    pub random_colors: bool,
    /// Opacity of cell faces, in `[0, 1]`
    pub cell_opacity: f32,
    /// Opacity of cell edges, in `[0, 1]`
    pub edge_opacity: f32,
    /// Distance band (in cube units) classified as "edge"
    pub edge_thickness: f32,
    /// Sharpness of the smooth edge falloff, in `[0, 1]`
    pub edge_sharpness: f32,
    /// Smoothstep edge blend (true) or hard boolean threshold (false)
    pub smooth_edges: bool,
    /// Jitter the dither pattern each frame (cheap temporal dithering)
    pub temporal_dither: bool,
    /// Pixel scale of the dither pattern (1 = per-pixel)
    pub dither_scale: f32,
    /// Draw a dot at each site position
    pub show_sites: bool,
    /// Radius of site dots in cube units
    pub site_radius: f32,
    /// Draw each cell's steering axis as a line segment (debug overlay)
    pub show_steering: bool,
    /// March step budget per pixel
    pub max_steps: usize,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            background: Vec3::new(0.04, 0.05, 0.08),
            base_color: Vec3::new(0.35, 0.55, 0.75),
            edge_color: Vec3::new(0.92, 0.95, 1.0),
            random_colors: true,
            cell_opacity: 1.0,
            edge_opacity: 1.0,
            edge_thickness: 0.08,
            edge_sharpness: 0.5,
            smooth_edges: true,
            temporal_dither: false,
            dither_scale: 1.0,
            show_sites: false,
            site_radius: 0.02,
            show_steering: false,
            max_steps: 192,
        }
    }
}

/// Everything a pixel needs, borrowed once per frame
struct Scene<'a> {
    sites: &'a SiteStore,
    grid: &'a OwnershipGrid,
    steering: &'a SteeringField,
    params: &'a SimParams,
    config: &'a SimConfig,
    options: &'a RenderOptions,
    dither_offset: (u32, u32),
}

/// Render pass: new A + new B (+ C for the overlay) → RGBA8 image
///
/// Returns `width * height * 4` bytes in row-major order. Pixels are pure
/// functions of the committed buffers, evaluated row-parallel.
#[allow(clippy::too_many_arguments)]
pub fn render_frame(
    sites: &SiteStore,
    grid: &OwnershipGrid,
    steering: &SteeringField,
    camera: &OrbitCamera,
    options: &RenderOptions,
    params: &SimParams,
    config: &SimConfig,
    clock: &FrameClock,
    width: u32,
    height: u32,
) -> Vec<u8> {
    let scene = Scene {
        sites,
        grid,
        steering,
        params,
        config,
        options,
        dither_offset: if options.temporal_dither {
            frame_jitter(clock.frame)
        } else {
            (0, 0)
        },
    };

    let mut pixels = vec![0u8; (width * height * 4) as usize];
    pixels
        .par_chunks_mut((width * 4) as usize)
        .enumerate()
        .for_each(|(y, row)| {
            for x in 0..width {
                let color = march_pixel(&scene, camera, x, y as u32, width, height);
                let base = (x * 4) as usize;
                row[base..base + 4].copy_from_slice(&to_rgba(color));
            }
        });
    pixels
}

/// Pseudo-random dither offset for a frame counter
fn frame_jitter(frame: u64) -> (u32, u32) {
    let mut h = frame.wrapping_mul(0x9e37_79b9_7f4a_7c15);
    h ^= h >> 29;
    ((h & 3) as u32, ((h >> 2) & 3) as u32)
}

/// Hash a site id to a stable, reasonably bright color
fn site_color(id: i32, options: &RenderOptions) -> Vec3 {
    if !options.random_colors {
        return options.base_color;
    }
    let mut h = (id as u32).wrapping_mul(0x9e37_79b9);
    h ^= h >> 16;
    h = h.wrapping_mul(0x85eb_ca6b);
    h ^= h >> 13;
    let channel = |shift: u32| 0.25 + 0.7 * ((h >> shift) & 0xff) as f32 / 255.0;
    Vec3::new(channel(0), channel(8), channel(16))
}

/// Slab test against the axis-aligned cube `[-half, half]^3`
///
/// Returns the entry/exit ray parameters, or `None` for a miss.
fn slab_intersect(origin: Vec3, dir: Vec3, half: f32) -> Option<(f32, f32)> {
    let mut t_near = f32::NEG_INFINITY;
    let mut t_far = f32::INFINITY;
    for axis in 0..3 {
        let o = origin[axis];
        let d = dir[axis];
        if d.abs() < 1.0e-8 {
            if o.abs() > half {
                return None;
            }
            continue;
        }
        let inv = 1.0 / d;
        let mut t0 = (-half - o) * inv;
        let mut t1 = (half - o) * inv;
        if t0 > t1 {
            std::mem::swap(&mut t0, &mut t1);
        }
        t_near = t_near.max(t0);
        t_far = t_far.min(t1);
        if t_near > t_far {
            return None;
        }
    }
    if t_far < 0.0 {
        return None;
    }
    Some((t_near, t_far))
}

/// Bisector field at `p` for the ranked candidate list
fn bisector_field(p: Vec3, ids: &[i32; 4], scene: &Scene<'_>) -> f32 {
    let cube = scene.params.cube_size;
    let periodic = scene.params.periodic;
    let d1 = boundary_distance(p, scene.sites.position(ids[0]), cube, periodic);
    let mut field = f32::NEG_INFINITY;
    for &id in &ids[1..] {
        let dk = boundary_distance(p, scene.sites.position(id), cube, periodic);
        field = field.max(0.5 * (d1 - dk));
    }
    field
}

/// Surface normal via central finite differences of the field
///
/// The candidate list is held fixed across the six taps so the differences
/// sample one continuous branch of the field.
fn field_normal(p: Vec3, ids: &[i32; 4], scene: &Scene<'_>) -> Vec3 {
    let e = scene.params.cube_size * NORMAL_EPSILON_FACTOR;
    let dx = bisector_field(p + Vec3::X * e, ids, scene) - bisector_field(p - Vec3::X * e, ids, scene);
    let dy = bisector_field(p + Vec3::Y * e, ids, scene) - bisector_field(p - Vec3::Y * e, ids, scene);
    let dz = bisector_field(p + Vec3::Z * e, ids, scene) - bisector_field(p - Vec3::Z * e, ids, scene);
    let n = Vec3::new(dx, dy, dz);
    if n.length_squared() < 1.0e-12 {
        Vec3::Y
    } else {
        n.normalize()
    }
}

/// Two fixed directional lights, ambient, and a rim term
fn shade(color: Vec3, normal: Vec3, view_dir: Vec3) -> Vec3 {
    let key = Vec3::new(0.55, 0.7, 0.45).normalize();
    let fill = Vec3::new(-0.5, 0.25, -0.8).normalize();
    let diffuse = 0.6 * normal.dot(key).max(0.0) + 0.25 * normal.dot(fill).max(0.0);
    let rim = (1.0 - normal.dot(-view_dir).abs()).powi(3) * 0.25;
    color * (0.25 + diffuse) + Vec3::splat(rim)
}

/// Distance from a point to a line segment (capsule axis)
fn segment_distance(p: Vec3, a: Vec3, b: Vec3) -> f32 {
    let ab = b - a;
    let len_sq = ab.length_squared();
    if len_sq < 1.0e-12 {
        return (p - a).length();
    }
    let t = ((p - a).dot(ab) / len_sq).clamp(0.0, 1.0);
    (p - (a + ab * t)).length()
}

/// March one pixel's ray and composite its final color
fn march_pixel(
    scene: &Scene<'_>,
    camera: &OrbitCamera,
    x: u32,
    y: u32,
    width: u32,
    height: u32,
) -> Vec3 {
    let params = scene.params;
    let options = scene.options;
    let cube = params.cube_size;

    let (origin, dir) = camera.ray(x, y, width, height, cube);
    let Some((t_near, t_far)) = slab_intersect(origin, dir, cube) else {
        return options.background;
    };

    let hit_eps = cube * HIT_EPSILON_FACTOR;
    let min_step = cube * MIN_STEP_FACTOR;
    let probe_step = cube * PROBE_STEP_FACTOR;
    let surface_skip = cube * SURFACE_SKIP_FACTOR;
    let span = (t_far - t_near).max(1.0e-6);

    let scale = options.dither_scale.max(1.0e-3);
    let threshold = dither_threshold(
        (x as f32 / scale) as u32 + scene.dither_offset.0,
        (y as f32 / scale) as u32 + scene.dither_offset.1,
    );

    let mut t = t_near.max(0.0);
    for _ in 0..options.max_steps {
        if t > t_far {
            break;
        }
        let p = origin + dir * t;

        let mut ids = scene.grid.nearest_at(p, cube);
        if ids[0] == NO_SITE {
            // Grid not warmed up here yet: degrade to a capped direct scan
            ids = brute_force_nearest(
                p,
                scene.sites,
                scene.config.brute_force_cap,
                cube,
                params.periodic,
            );
        }

        if let Some(color) = overlay_color(p, &ids, scene) {
            return color;
        }

        if ids.iter().any(|&id| id == NO_SITE) {
            // No full candidate set: not a hit, keep probing forward
            t += probe_step;
            continue;
        }

        let field = bisector_field(p, &ids, scene);
        if field.abs() < hit_eps {
            let edge_weight = edge_weight(p, &ids, scene);
            let opacity = options.cell_opacity
                + (options.edge_opacity - options.cell_opacity) * edge_weight;
            if opacity < threshold {
                // Dithered through: keep marching behind the surface
                t += surface_skip;
                continue;
            }
            let normal = field_normal(p, &ids, scene);
            let cell = site_color(ids[0], options);
            let surface = cell.lerp(options.edge_color, edge_weight);
            let lit = shade(surface, normal, dir);
            let fog = ((t - t_near) / span).clamp(0.0, 1.0) * FOG_STRENGTH;
            return lit.lerp(options.background, fog);
        }

        t += field.abs().max(min_step);
    }

    options.background
}

/// Edge weight in `[0, 1]` from pairwise candidate distances
///
/// On the surface the two closest candidates are tied; the gap to the third
/// closest says how far the sample is from a cell edge (where three cells
/// meet).
fn edge_weight(p: Vec3, ids: &[i32; 4], scene: &Scene<'_>) -> f32 {
    let cube = scene.params.cube_size;
    let periodic = scene.params.periodic;
    let options = scene.options;

    let mut dists = [0.0f32; 4];
    for (slot, &id) in ids.iter().enumerate() {
        dists[slot] = boundary_distance(p, scene.sites.position(id), cube, periodic);
    }
    dists.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let gap = 0.5 * (dists[2] - dists[0]);

    if options.smooth_edges {
        let hi = options.edge_thickness.max(1.0e-6);
        let lo = hi * (1.0 - options.edge_sharpness.clamp(0.0, 1.0));
        1.0 - smoothstep(lo, hi, gap)
    } else if gap < options.edge_thickness {
        1.0
    } else {
        0.0
    }
}

/// Site dots and the steering-axis debug capsule
fn overlay_color(p: Vec3, ids: &[i32; 4], scene: &Scene<'_>) -> Option<Vec3> {
    let options = scene.options;
    if !options.show_sites && !options.show_steering {
        return None;
    }
    let cube = scene.params.cube_size;
    let periodic = scene.params.periodic;

    if options.show_sites {
        for &id in ids {
            if id == NO_SITE {
                continue;
            }
            if boundary_distance(p, scene.sites.position(id), cube, periodic)
                < options.site_radius
            {
                return Some(site_color(id, options) * 1.4 + Vec3::splat(0.1));
            }
        }
    }

    if options.show_steering && ids[0] != NO_SITE {
        let a = scene.sites.position(ids[0]);
        let b = a + scene.steering.axis(ids[0] as usize);
        if segment_distance(p, a, b) < cube * OVERLAY_RADIUS_FACTOR {
            return Some(Vec3::new(1.0, 0.3, 0.9));
        }
    }

    None
}

#[inline]
fn to_rgba(color: Vec3) -> [u8; 4] {
    let q = |c: f32| (c.clamp(0.0, 1.0) * 255.0 + 0.5) as u8;
    [q(color.x), q(color.y), q(color.z), 255]
}

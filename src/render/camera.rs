//! Orbit camera
//!
//! Orbits the bounding cube's center. Orientation comes from pointer drag
//! (azimuth/elevation mapped from normalized pointer position, elevation
//! clamped to a small range) or from auto-rotation; zoom is the camera
//! distance along the view axis in units of the cube half-size.

use glam::Vec3;

/// Minimum zoom (camera distance in cube half-sizes)
pub const MIN_ZOOM: f32 = 1.0;

/// Maximum zoom
pub const MAX_ZOOM: f32 = 5.0;

/// Elevation clamp in radians; the orbit never crosses the poles
pub const MAX_ELEVATION: f32 = 0.9;

/// Orbit camera around the cube center
///
/// # Example
///
/// ```
/// use voronoi_relax::render::camera::OrbitCamera;
///
/// let mut camera = OrbitCamera::new();
/// camera.set_drag(0.75, 0.5); // pointer in normalized [0, 1] coordinates
/// camera.set_zoom(2.0);
/// let (origin, dir) = camera.ray(160, 90, 320, 180, 1.0);
/// assert!((dir.length() - 1.0).abs() < 1e-5);
/// # let _ = origin;
/// ```
#[derive(Debug, Clone, Copy)]
pub struct OrbitCamera {
    /// Orbit angle around the vertical axis, radians
    pub azimuth: f32,
    /// Orbit angle above the horizontal plane, radians, clamped
    pub elevation: f32,
    /// Camera distance in cube half-sizes, clamped to `[MIN_ZOOM, MAX_ZOOM]`
    pub zoom: f32,
    /// Vertical field of view, radians
    pub fov_y: f32,
}

impl OrbitCamera {
    /// Camera with a pleasant three-quarter default view
    pub fn new() -> Self {
        Self {
            azimuth: 0.6,
            elevation: 0.35,
            zoom: 2.4,
            fov_y: 50f32.to_radians(),
        }
    }

    /// Map a normalized pointer position (`[0, 1]` each axis) to orientation
    ///
    /// A full horizontal drag is one revolution; the vertical drag covers
    /// the clamped elevation range.
    pub fn set_drag(&mut self, nx: f32, ny: f32) {
        self.azimuth = nx * std::f32::consts::TAU;
        self.elevation = ((ny - 0.5) * 2.0 * MAX_ELEVATION).clamp(-MAX_ELEVATION, MAX_ELEVATION);
    }

    /// Set zoom (clamped into `[MIN_ZOOM, MAX_ZOOM]`)
    pub fn set_zoom(&mut self, zoom: f32) {
        self.zoom = zoom.clamp(MIN_ZOOM, MAX_ZOOM);
    }

    /// Drive the azimuth from the simulated clock
    pub fn auto_rotate(&mut self, time: f32, rate: f32) {
        self.azimuth = time * rate;
    }

    /// World-space camera position for a cube half-size
    pub fn position(&self, cube_size: f32) -> Vec3 {
        let d = self.zoom.clamp(MIN_ZOOM, MAX_ZOOM) * cube_size * 1.6;
        let (sin_az, cos_az) = self.azimuth.sin_cos();
        let (sin_el, cos_el) = self
            .elevation
            .clamp(-MAX_ELEVATION, MAX_ELEVATION)
            .sin_cos();
        Vec3::new(d * cos_el * cos_az, d * sin_el, d * cos_el * sin_az)
    }

    /// World-space ray through a pixel center
    ///
    /// Returns `(origin, direction)` with a unit direction. Y is flipped so
    /// pixel row 0 is the top of the image.
    pub fn ray(&self, px: u32, py: u32, width: u32, height: u32, cube_size: f32) -> (Vec3, Vec3) {
        let origin = self.position(cube_size);
        let forward = (-origin).normalize_or_zero();
        let right = forward.cross(Vec3::Y).normalize_or_zero();
        let up = right.cross(forward).normalize_or_zero();

        let aspect = width as f32 / height.max(1) as f32;
        let tan_half = (self.fov_y * 0.5).tan();
        let nx = ((px as f32 + 0.5) / width as f32) * 2.0 - 1.0;
        let ny = 1.0 - ((py as f32 + 0.5) / height as f32) * 2.0;
        let dir = (forward + right * (nx * tan_half * aspect) + up * (ny * tan_half)).normalize();
        (origin, dir)
    }
}

impl Default for OrbitCamera {
    fn default() -> Self {
        Self::new()
    }
}

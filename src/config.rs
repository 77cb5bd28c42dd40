//! Simulation configuration
//!
//! Two kinds of parameters feed the pipeline:
//!
//! - [`SimConfig`]: structural values fixed at allocation time (site count,
//!   grid resolution, seed). Changing the site count is a full reset.
//! - [`SimParams`]: per-frame values read by every pass (cube size, boundary
//!   mode, all physics tunables). These may change between frames without
//!   any reallocation.
//!
//! The embedding application is responsible for clamping user input into the
//! documented ranges before handing it to the core.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::error::{Result, SimulationError};

/// Upper bound on the active site count
pub const MAX_SITE_COUNT: usize = 50_000;

/// Structural configuration, fixed once buffers are allocated
///
/// The same configuration (with the same parameters and frame timings)
/// always produces the identical site trajectory.
///
/// # Example
///
/// ```
/// use voronoi_relax::*;
///
/// let config = SimConfigBuilder::new()
///     .seed(42)
///     .site_count(2_000).unwrap()
///     .voxel_dim(64).unwrap()
///     .build().unwrap();
///
/// let sim = Simulation::new(config).unwrap();
/// assert_eq!(sim.config().site_count, 2_000);
/// ```
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SimConfig {
    /// Random seed for the deterministic bootstrap scatter
    pub seed: u32,

    /// Number of active sites, in `[1, MAX_SITE_COUNT]`
    ///
    /// Storage is allocated for slightly more slots (rounded capacity);
    /// slots past this count are kept zeroed and inert.
    pub site_count: usize,

    /// Ownership grid resolution per axis (power of two, 8 to 128)
    ///
    /// 64 gives a good cost/fidelity balance; 32 is noticeably coarser but
    /// four times cheaper per rebuild.
    pub voxel_dim: usize,

    /// Rebuild the ownership grid every this many frames
    ///
    /// On other frames the previous grid is carried forward unchanged. This
    /// temporal throttle bounds the per-frame cost of the heaviest pass.
    pub grid_update_interval: u32,

    /// Cap on the brute-force seeding scan per voxel
    ///
    /// The jump-flood propagation recovers sites the capped scan misses;
    /// a full scan per voxel would be infeasible at 50,000 sites.
    pub brute_force_cap: usize,
}

impl SimConfig {
    /// Check a configuration against the documented ranges
    ///
    /// The builder validates eagerly, but the fields are public, so a
    /// hand-constructed configuration is re-checked before any buffer is
    /// allocated from it.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` naming the offending field.
    pub fn validate(&self) -> Result<()> {
        if self.site_count == 0 || self.site_count > MAX_SITE_COUNT {
            return Err(SimulationError::InvalidConfig(format!(
                "site count must be in [1, {}] (got {})",
                MAX_SITE_COUNT, self.site_count
            )));
        }
        if !self.voxel_dim.is_power_of_two() || !(8..=128).contains(&self.voxel_dim) {
            return Err(SimulationError::InvalidConfig(format!(
                "voxel dim must be a power of two in [8, 128] (got {})",
                self.voxel_dim
            )));
        }
        if self.grid_update_interval == 0 {
            return Err(SimulationError::InvalidConfig(
                "grid update interval must be at least 1 frame".to_string(),
            ));
        }
        if self.brute_force_cap < 4 {
            return Err(SimulationError::InvalidConfig(format!(
                "brute-force cap must be at least 4 (got {})",
                self.brute_force_cap
            )));
        }
        Ok(())
    }

    /// Allocated site slots: the count rounded up to a multiple of 64
    ///
    /// Slots in `[site_count, capacity)` exist but stay zeroed.
    #[inline]
    pub fn site_capacity(&self) -> usize {
        self.site_count.div_ceil(64) * 64
    }

    /// Total voxel count of the ownership grid
    #[inline]
    pub fn voxel_count(&self) -> usize {
        self.voxel_dim * self.voxel_dim * self.voxel_dim
    }
}

impl Default for SimConfig {
    fn default() -> Self {
        SimConfigBuilder::new().build().unwrap()
    }
}

/// Builder for [`SimConfig`] with validation
///
/// # Example
///
/// ```
/// use voronoi_relax::*;
///
/// let config = SimConfigBuilder::new()
///     .seed(7)
///     .site_count(500).unwrap()
///     .grid_update_interval(8).unwrap()
///     .build().unwrap();
/// assert_eq!(config.grid_update_interval, 8);
/// ```
#[derive(Debug, Clone)]
pub struct SimConfigBuilder {
    seed: Option<u32>,
    site_count: usize,
    voxel_dim: usize,
    grid_update_interval: u32,
    brute_force_cap: usize,
}

impl SimConfigBuilder {
    /// Create a builder with defaults
    ///
    /// Defaults: random seed, 1,500 sites, 64³ grid rebuilt every 6 frames,
    /// brute-force seeding capped at 64 sites per voxel.
    pub fn new() -> Self {
        Self {
            seed: None,
            site_count: 1_500,
            voxel_dim: 64,
            grid_update_interval: 6,
            brute_force_cap: 64,
        }
    }

    /// Set the bootstrap seed
    pub fn seed(mut self, seed: u32) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Set the active site count
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` if the count is 0 or exceeds [`MAX_SITE_COUNT`].
    pub fn site_count(mut self, count: usize) -> Result<Self> {
        if count == 0 || count > MAX_SITE_COUNT {
            return Err(SimulationError::InvalidConfig(format!(
                "site count must be in [1, {}] (got {})",
                MAX_SITE_COUNT, count
            )));
        }
        self.site_count = count;
        Ok(self)
    }

    /// Set the ownership grid resolution per axis
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` unless the resolution is a power of two in
    /// `[8, 128]` (the jump-flood step schedule halves from `dim / 2`).
    pub fn voxel_dim(mut self, dim: usize) -> Result<Self> {
        if !dim.is_power_of_two() || !(8..=128).contains(&dim) {
            return Err(SimulationError::InvalidConfig(format!(
                "voxel dim must be a power of two in [8, 128] (got {})",
                dim
            )));
        }
        self.voxel_dim = dim;
        Ok(self)
    }

    /// Set the grid rebuild interval in frames
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` if the interval is 0.
    pub fn grid_update_interval(mut self, frames: u32) -> Result<Self> {
        if frames == 0 {
            return Err(SimulationError::InvalidConfig(
                "grid update interval must be at least 1 frame".to_string(),
            ));
        }
        self.grid_update_interval = frames;
        Ok(self)
    }

    /// Set the brute-force seeding cap
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` if the cap is smaller than 4 (a voxel could
    /// never seed a full nearest-4 list).
    pub fn brute_force_cap(mut self, cap: usize) -> Result<Self> {
        if cap < 4 {
            return Err(SimulationError::InvalidConfig(format!(
                "brute-force cap must be at least 4 (got {})",
                cap
            )));
        }
        self.brute_force_cap = cap;
        Ok(self)
    }

    /// Build the configuration
    ///
    /// Generates a random seed if none was provided.
    pub fn build(self) -> Result<SimConfig> {
        Ok(SimConfig {
            seed: self.seed.unwrap_or_else(rand::random),
            site_count: self.site_count,
            voxel_dim: self.voxel_dim,
            grid_update_interval: self.grid_update_interval,
            brute_force_cap: self.brute_force_cap,
        })
    }
}

impl Default for SimConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Per-frame simulation parameters, read by every pass
///
/// All values are in cube-space units unless noted. The defaults are a
/// stable, visually interesting tuning for a cube of half-size 1.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SimParams {
    /// Half-size of the bounding cube (> 0)
    ///
    /// Changing this between frames only re-interprets voxel centers; it
    /// never requires reallocation.
    pub cube_size: f32,

    /// Periodic wrap (true) or closed box clamp (false)
    pub periodic: bool,

    /// Scale applied to the smoothed steering vector during the steer phase
    pub steer_strength: f32,

    /// Velocity damping per frame, in `[0, 1)`
    pub friction: f32,

    /// Minimum speed during the steer phase (0 disables the floor)
    pub min_speed: f32,

    /// Maximum speed during the steer phase
    pub max_speed: f32,

    /// Neighbor distance below which short-range repulsion kicks in
    pub min_repulsion_radius: f32,

    /// Scale of the short-range repulsion (steer phase)
    pub repulsion_strength: f32,

    /// Fraction of the breathing room a relax step may travel, in `(0, 1]`
    pub movement_factor: f32,

    /// Inverse-distance weight of the relax-phase repulsion
    pub relax_repulsion_strength: f32,

    /// Seconds of the duty cycle spent relaxing
    pub relax_duration: f32,

    /// Seconds of the duty cycle spent steering
    pub steer_duration: f32,

    /// Relax displacements granted per second of relax phase
    pub relax_steps_per_second: f32,

    /// Steer along the narrow axis instead of the wide one
    pub invert_steering: bool,
}

impl SimParams {
    /// Length of one relax + steer duty cycle in seconds
    #[inline]
    pub fn cycle_duration(&self) -> f32 {
        self.relax_duration + self.steer_duration
    }
}

impl Default for SimParams {
    fn default() -> Self {
        Self {
            cube_size: 1.0,
            periodic: false,
            steer_strength: 0.02,
            friction: 0.1,
            min_speed: 0.0,
            max_speed: 0.05,
            min_repulsion_radius: 0.06,
            repulsion_strength: 0.5,
            movement_factor: 0.25,
            relax_repulsion_strength: 1.0,
            relax_duration: 4.0,
            steer_duration: 6.0,
            relax_steps_per_second: 30.0,
            invert_steering: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_defaults() {
        let config = SimConfigBuilder::new().seed(1).build().unwrap();
        assert_eq!(config.site_count, 1_500);
        assert_eq!(config.voxel_dim, 64);
        assert_eq!(config.grid_update_interval, 6);
        assert_eq!(config.brute_force_cap, 64);
    }

    #[test]
    fn test_builder_custom() {
        let config = SimConfigBuilder::new()
            .seed(42)
            .site_count(10_000)
            .unwrap()
            .voxel_dim(32)
            .unwrap()
            .grid_update_interval(10)
            .unwrap()
            .brute_force_cap(128)
            .unwrap()
            .build()
            .unwrap();
        assert_eq!(config.seed, 42);
        assert_eq!(config.site_count, 10_000);
        assert_eq!(config.voxel_dim, 32);
        assert_eq!(config.grid_update_interval, 10);
        assert_eq!(config.brute_force_cap, 128);
    }

    #[test]
    fn test_builder_rejects_bad_site_counts() {
        assert!(SimConfigBuilder::new().site_count(0).is_err());
        assert!(SimConfigBuilder::new().site_count(MAX_SITE_COUNT + 1).is_err());
        assert!(SimConfigBuilder::new().site_count(1).is_ok());
        assert!(SimConfigBuilder::new().site_count(MAX_SITE_COUNT).is_ok());
    }

    #[test]
    fn test_builder_rejects_bad_voxel_dims() {
        assert!(SimConfigBuilder::new().voxel_dim(0).is_err());
        assert!(SimConfigBuilder::new().voxel_dim(48).is_err());
        assert!(SimConfigBuilder::new().voxel_dim(4).is_err());
        assert!(SimConfigBuilder::new().voxel_dim(256).is_err());
        assert!(SimConfigBuilder::new().voxel_dim(8).is_ok());
        assert!(SimConfigBuilder::new().voxel_dim(128).is_ok());
    }

    #[test]
    fn test_builder_rejects_zero_interval() {
        assert!(SimConfigBuilder::new().grid_update_interval(0).is_err());
    }

    #[test]
    fn test_builder_rejects_tiny_cap() {
        assert!(SimConfigBuilder::new().brute_force_cap(3).is_err());
        assert!(SimConfigBuilder::new().brute_force_cap(4).is_ok());
    }

    #[test]
    fn test_validate_catches_hand_built_configs() {
        let mut config = SimConfigBuilder::new().seed(1).build().unwrap();
        assert!(config.validate().is_ok());
        config.voxel_dim = 48;
        assert!(config.validate().is_err());
        config.voxel_dim = 64;
        config.site_count = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_site_capacity_rounds_up() {
        let config = SimConfigBuilder::new().seed(1).site_count(100).unwrap().build().unwrap();
        assert_eq!(config.site_capacity(), 128);
        let config = SimConfigBuilder::new().seed(1).site_count(64).unwrap().build().unwrap();
        assert_eq!(config.site_capacity(), 64);
    }

    #[test]
    fn test_cycle_duration() {
        let params = SimParams::default();
        assert!((params.cycle_duration() - 10.0).abs() < 1e-6);
    }

    #[cfg(feature = "serde")]
    #[test]
    fn test_config_serialization() {
        let config = SimConfigBuilder::new().seed(12345).site_count(99).unwrap().build().unwrap();
        let json = serde_json::to_string(&config).unwrap();
        let restored: SimConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(config, restored);

        let params = SimParams::default();
        let json = serde_json::to_string(&params).unwrap();
        let restored: SimParams = serde_json::from_str(&json).unwrap();
        assert_eq!(params, restored);
    }
}

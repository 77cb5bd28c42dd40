//! Frame pipeline
//!
//! Owns the four double-buffered stage outputs and drives the fixed pass
//! order each frame:
//!
//! 1. integrate: previous positions + latest smoothed steering → new positions
//! 2. voxelize: new positions + previous grid → new ownership grid
//! 3. estimate: new positions + new grid → new raw steering (even frames)
//! 4. smooth: new raw steering + previous smoothed state → new smoothed state
//!
//! Each pass commits (one buffer swap) before the next pass runs, so within
//! a frame every pass sees exactly the mix of this-frame and last-frame data
//! it was designed for. The smoothed state produced in step 4 is first read
//! by step 1 of the *next* frame.

use glam::Vec3;

use crate::buffer::PingPong;
use crate::config::{SimConfig, SimParams};
use crate::error::{Result, SimulationError};
use crate::grid::{voxelize, OwnershipGrid};
use crate::render::camera::OrbitCamera;
use crate::render::{render_frame, RenderOptions};
use crate::sites::{integrate, SiteStore, BOOTSTRAP_FRAMES};
use crate::smoother::{smooth, SteeringState};
use crate::steering::{estimate, SteeringField};

/// Frame counter and simulated time, advanced once per [`Simulation::step`]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameClock {
    /// Completed frames since the last structural reset
    pub frame: u64,
    /// Simulated seconds accumulated from per-step deltas
    pub time: f32,
    /// Delta of the frame currently being computed
    pub dt: f32,
}

impl FrameClock {
    fn start() -> Self {
        Self {
            frame: 0,
            time: 0.0,
            dt: 0.0,
        }
    }
}

/// The complete simulation: configuration, clock, and all stage buffers
///
/// # Example
///
/// ```
/// use voronoi_relax::*;
///
/// let config = SimConfigBuilder::new()
///     .seed(7)
///     .site_count(200).unwrap()
///     .voxel_dim(16).unwrap()
///     .build().unwrap();
/// let mut sim = Simulation::new(config).unwrap();
///
/// let params = SimParams::default();
/// for _ in 0..10 {
///     sim.step(&params, 1.0 / 60.0);
/// }
/// assert_eq!(sim.clock().frame, 10);
/// ```
pub struct Simulation {
    config: SimConfig,
    clock: FrameClock,
    sites: PingPong<SiteStore>,
    grid: PingPong<OwnershipGrid>,
    steering: PingPong<SteeringField>,
    state: PingPong<SteeringState>,
}

impl Simulation {
    /// Allocate a simulation for a validated configuration
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` if the configuration is out of range.
    pub fn new(config: SimConfig) -> Result<Self> {
        config.validate()?;
        let capacity = config.site_capacity();
        let dim = config.voxel_dim;
        log::info!(
            "[pipeline] allocating {} site slots ({} active), {}^3 grid",
            capacity,
            config.site_count,
            dim
        );
        Ok(Self {
            config,
            clock: FrameClock::start(),
            sites: PingPong::new(
                SiteStore::new(capacity, config.site_count),
                SiteStore::new(capacity, config.site_count),
            ),
            grid: PingPong::new(OwnershipGrid::new(dim), OwnershipGrid::new(dim)),
            steering: PingPong::new(
                SteeringField::new(capacity),
                SteeringField::new(capacity),
            ),
            state: PingPong::new(
                SteeringState::new(capacity),
                SteeringState::new(capacity),
            ),
        })
    }

    /// Advance the simulation by one frame
    ///
    /// `dt` is the simulated delta in seconds. The same configuration,
    /// parameters, and sequence of deltas always produce the identical
    /// trajectory.
    pub fn step(&mut self, params: &SimParams, dt: f32) {
        self.clock.dt = dt;

        {
            let (prev, next) = self.sites.split();
            integrate(
                prev,
                self.state.read(),
                self.grid.read(),
                params,
                &self.config,
                &self.clock,
                next,
            );
        }
        self.sites.swap();

        {
            let (prev, next) = self.grid.split();
            voxelize(
                self.sites.read(),
                prev,
                params,
                &self.config,
                &self.clock,
                next,
            );
        }
        self.grid.swap();

        {
            let (prev, next) = self.steering.split();
            estimate(
                self.sites.read(),
                self.grid.read(),
                prev,
                params,
                &self.config,
                &self.clock,
                next,
            );
        }
        self.steering.swap();

        {
            let (prev, next) = self.state.split();
            smooth(
                self.steering.read(),
                prev,
                params,
                &self.config,
                &self.clock,
                next,
            );
        }
        self.state.swap();

        self.clock.frame += 1;
        self.clock.time += dt;
    }

    /// Render the committed buffers to an RGBA8 image
    ///
    /// Reads only; safe to call any number of times between steps (or never).
    pub fn render(
        &self,
        camera: &OrbitCamera,
        options: &RenderOptions,
        params: &SimParams,
        width: u32,
        height: u32,
    ) -> Vec<u8> {
        render_frame(
            self.sites.read(),
            self.grid.read(),
            self.steering.read(),
            camera,
            options,
            params,
            &self.config,
            &self.clock,
            width,
            height,
        )
    }

    /// Change the active site count (full reset)
    ///
    /// Every buffer is reallocated and the clock restarts at frame 0, so the
    /// bootstrap scatter runs again with the existing seed.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` if the count is out of range.
    pub fn set_site_count(&mut self, count: usize) -> Result<()> {
        let mut config = self.config;
        config.site_count = count;
        config.validate()?;

        let capacity = config.site_capacity();
        log::info!(
            "[pipeline] resizing {} -> {} active sites; full reset",
            self.config.site_count,
            count
        );
        self.config = config;
        self.clock = FrameClock::start();
        self.sites.reset_both(
            SiteStore::new(capacity, count),
            SiteStore::new(capacity, count),
        );
        self.grid.reset_both(
            OwnershipGrid::new(config.voxel_dim),
            OwnershipGrid::new(config.voxel_dim),
        );
        self.steering
            .reset_both(SteeringField::new(capacity), SteeringField::new(capacity));
        self.state
            .reset_both(SteeringState::new(capacity), SteeringState::new(capacity));
        Ok(())
    }

    /// Replace every active position and skip the bootstrap scatter
    ///
    /// Both physical site buffers receive the positions, the derived buffers
    /// restart zeroed, and the clock jumps past the bootstrap window so the
    /// next step integrates from exactly these positions.
    ///
    /// # Errors
    ///
    /// Returns `SiteCountMismatch` unless exactly one position per active
    /// site is provided.
    pub fn override_positions(&mut self, positions: &[Vec3]) -> Result<()> {
        if positions.len() != self.config.site_count {
            return Err(SimulationError::SiteCountMismatch {
                expected: self.config.site_count,
                provided: positions.len(),
            });
        }
        self.sites.for_both(|store| {
            for (id, &p) in positions.iter().enumerate() {
                store.set_position(id, p);
            }
        });
        let capacity = self.config.site_capacity();
        self.grid.reset_both(
            OwnershipGrid::new(self.config.voxel_dim),
            OwnershipGrid::new(self.config.voxel_dim),
        );
        self.steering
            .reset_both(SteeringField::new(capacity), SteeringField::new(capacity));
        self.state
            .reset_both(SteeringState::new(capacity), SteeringState::new(capacity));
        self.clock.frame = BOOTSTRAP_FRAMES;
        Ok(())
    }

    /// The active configuration
    #[inline]
    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    /// The clock as of the last completed frame
    #[inline]
    pub fn clock(&self) -> &FrameClock {
        &self.clock
    }

    /// Committed site positions
    #[inline]
    pub fn sites(&self) -> &SiteStore {
        self.sites.read()
    }

    /// Committed ownership grid
    #[inline]
    pub fn grid(&self) -> &OwnershipGrid {
        self.grid.read()
    }

    /// Committed raw steering field
    #[inline]
    pub fn steering_field(&self) -> &SteeringField {
        self.steering.read()
    }

    /// Committed smoothed steering state
    #[inline]
    pub fn steering_state(&self) -> &SteeringState {
        self.state.read()
    }
}

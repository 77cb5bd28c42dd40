//! Approximate dynamic 3D Voronoi decomposition with self-relaxing sites.
//!
//! A bounded cube holds up to 50,000 moving sites. Every frame the pipeline
//! rebuilds an approximate Voronoi ownership grid over the cube (jump
//! flooding over a voxel lattice), estimates how elongated each site's cell
//! is, and steers the sites so the decomposition relaxes toward evenly
//! shaped cells. A raymarcher renders the cell boundary surfaces directly
//! from the same buffers.
//!
//! Everything is double buffered: each pass reads committed state and
//! writes a fresh buffer, so passes are pure and parallel, and a rendered
//! frame is always a consistent snapshot.
//!
//! The cube supports two boundary modes, selected per frame through
//! [`SimParams::periodic`]: a closed box (positions clamp at the faces) or
//! a periodic torus (distances and positions wrap).
//!
//! # Quickstart
//!
//! ```rust,no_run
//! use voronoi_relax::*;
//! use voronoi_relax::render::camera::OrbitCamera;
//!
//! let config = SimConfigBuilder::new()
//!     .seed(42)
//!     .site_count(1_500)?
//!     .voxel_dim(64)?
//!     .build()?;
//! let mut sim = Simulation::new(config)?;
//!
//! let params = SimParams::default();
//! let camera = OrbitCamera::new();
//! let options = RenderOptions::default();
//!
//! loop {
//!     sim.step(&params, 1.0 / 60.0);
//!     let frame = sim.render(&camera, &options, &params, 1280, 720);
//!     // hand `frame` (RGBA8, row-major) to the display surface
//!     # let _ = frame; break;
//! }
//! # Ok::<(), SimulationError>(())
//! ```

pub mod buffer;
pub mod config;
pub mod error;
pub mod grid;
pub mod math;
pub mod pipeline;
pub mod render;
pub mod sites;
pub mod smoother;
pub mod steering;

pub use config::{SimConfig, SimConfigBuilder, SimParams, MAX_SITE_COUNT};
pub use error::{Result, SimulationError};
pub use grid::{OwnershipGrid, NO_SITE};
pub use pipeline::{FrameClock, Simulation};
pub use render::RenderOptions;
pub use sites::SiteStore;
pub use smoother::{SteeringEntry, SteeringState};
pub use steering::SteeringField;

//! Adaptive circle packing over a live raster.
//!
//! The crate fills a canvas with circles colored from a source image, then
//! keeps the arrangement alive frame by frame: circles grow into place, react
//! to color changes in the raster, and new circles spawn into regions that
//! open up. Everything is driven by an explicit `f64` sim clock, so a given
//! seed and frame schedule always reproduces the same layout.
//!
//! # Basic usage
//! ```no_run
//! use {
//!   circle_mosaic::{
//!     config::PackingConfig,
//!     geometry::Size,
//!     orchestrator::Orchestrator
//!   },
//!   anyhow::Result
//! };
//!
//! fn main() -> Result<()> {
//!   let raster = image::open("source.png")?.to_rgba8();
//!   let bounds = Size::new(raster.width() as f32, raster.height() as f32);
//!
//!   let mut sim = Orchestrator::new(PackingConfig::default(), bounds, 0)?;
//!   // initial placement runs on a background thread
//!   sim.request_generation(&raster);
//!
//!   loop {
//!     sim.step(&raster, 1.0 / 60.0);
//!     for c in sim.render_list() {
//!       // hand (c.x, c.y, c.radius, c.color) to your renderer
//!     }
//!     # break;
//!   }
//!   Ok(())
//! }
//! ```
//!
//! For a one-shot layout without the live simulation, use
//! [`placement::PlacementEngine`] directly; it returns a plain `Vec` of
//! [`geometry::Circle`].

pub mod geometry;
pub mod config;
pub mod index;
pub mod sampler;
pub mod change_map;
pub mod physics;
pub mod placement;
pub mod growth;
pub mod spawner;
pub mod orchestrator;

pub use {
  config::PackingConfig,
  geometry::{Circle, Lifecycle, Rgb},
  orchestrator::{CircleRecord, Orchestrator}
};

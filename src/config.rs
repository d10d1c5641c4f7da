//! Recognized simulation options. Unknown values are clamped, not rejected;
//! a bad config degrades to a tamer simulation rather than failing.

#[derive(Debug, Clone, PartialEq)]
pub struct PackingConfig {
  /// Fraction of the locally available space a committed circle takes.
  pub packing_density: f32,
  pub total_circles: usize,
  pub min_circle_size: f32,
  pub max_circle_size: f32,
  /// Spacing between circles: subtracted as a pixel gap when measuring
  /// available radius, applied as a multiplier on radius sums when resolving
  /// collisions.
  pub circle_spacing: f32,

  pub use_verlet_physics: bool,
  pub use_physics_placement: bool,
  pub enable_progressive_growth: bool,
  pub enable_color_monitoring: bool,
  pub enable_color_change_map: bool,
  pub enable_dynamic_spawning: bool,

  pub gravity: f32,
  pub damping: f32,
  pub substeps: u32,
  pub physics_iterations: u32,

  /// Radius increment per frame for dynamically spawned circles, px.
  pub growth_rate: f32,
  /// Starting radius of progressive growth, as a fraction of the target.
  pub start_size_multiplier: f32,
  pub color_similarity_threshold: f32,
  /// Base color-similarity polling interval, milliseconds.
  pub color_update_interval: f64,
  /// Dynamic-spawn check interval, milliseconds.
  pub spawn_interval: f64,
  pub max_spawns_per_check: usize,
  /// Minimum flood-filled region size, in grid cells.
  pub min_empty_area_size: usize
}

impl Default for PackingConfig {
  fn default() -> Self {
    PackingConfig {
      packing_density: 0.9,
      total_circles: 200,
      min_circle_size: 2.0,
      max_circle_size: 60.0,
      circle_spacing: 1.0,

      use_verlet_physics: true,
      use_physics_placement: false,
      enable_progressive_growth: true,
      enable_color_monitoring: true,
      enable_color_change_map: true,
      enable_dynamic_spawning: true,

      gravity: 0.3,
      damping: 0.98,
      substeps: 4,
      physics_iterations: 3,

      growth_rate: 0.5,
      start_size_multiplier: 0.3,
      color_similarity_threshold: 0.75,
      color_update_interval: 500.0,
      spawn_interval: 1000.0,
      max_spawns_per_check: 4,
      min_empty_area_size: 3
    }
  }
}

impl PackingConfig {
  /// Clamp every option into its recognized range.
  pub fn sanitized(mut self) -> Self {
    self.packing_density = self.packing_density.clamp(0.05, 1.0);
    self.total_circles = self.total_circles.max(1);
    self.min_circle_size = self.min_circle_size.max(f32::EPSILON);
    self.max_circle_size = self.max_circle_size.max(self.min_circle_size);
    self.circle_spacing = self.circle_spacing.max(f32::EPSILON);
    self.gravity = self.gravity.clamp(0.0, 1.0);
    self.damping = self.damping.clamp(0.0, 1.0);
    self.substeps = self.substeps.max(1);
    self.physics_iterations = self.physics_iterations.max(1);
    self.growth_rate = self.growth_rate.max(f32::EPSILON);
    self.start_size_multiplier = self.start_size_multiplier.clamp(0.1, 1.0);
    self.color_similarity_threshold = self.color_similarity_threshold.clamp(0.1, 1.0);
    self.color_update_interval = self.color_update_interval.max(1.0);
    self.spawn_interval = self.spawn_interval.max(1.0);
    self.max_spawns_per_check = self.max_spawns_per_check.max(1);
    self.min_empty_area_size = self.min_empty_area_size.max(1);
    self
  }
}

#[cfg(test)] mod tests {
  use super::*;

  #[test] fn sanitize_clamps_ranges() {
    let config = PackingConfig {
      packing_density: -1.0,
      min_circle_size: 50.0,
      max_circle_size: 10.0,
      damping: 2.0,
      substeps: 0,
      start_size_multiplier: 0.0,
      color_similarity_threshold: 7.0,
      ..Default::default()
    }.sanitized();
    assert_eq!(config.packing_density, 0.05);
    assert!(config.max_circle_size >= config.min_circle_size);
    assert_eq!(config.damping, 1.0);
    assert_eq!(config.substeps, 1);
    assert_eq!(config.start_size_multiplier, 0.1);
    assert_eq!(config.color_similarity_threshold, 1.0);
  }

  #[test] fn default_is_already_sane() {
    let config = PackingConfig::default();
    assert_eq!(config.clone().sanitized(), config);
  }
}

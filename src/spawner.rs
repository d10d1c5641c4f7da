//! Interval-driven injection of new growing circles into empty regions.

use {
  crate::{
    config::PackingConfig,
    geometry::{Circle, Lifecycle, Point, Rgb, V2},
    index::{HashGrid, SpatialIndex}
  },
  image::RgbaImage,
  rand::Rng
};

/// Lifetime cap on dynamically spawned circles.
pub const SPAWN_CAP: usize = 2000;
/// A candidate point must have at least this much available radius.
pub const MIN_AVAILABLE_RADIUS: f32 = 2.0;
/// Spawned circles start small but visible.
pub const START_RADIUS: f32 = 5.0;
/// Seconds of spawn protection, exempting the circle from color adaptation.
pub const PROTECTION_SECS: f64 = 2.0;

const TOP_AREAS: usize = 3;
const POINTS_PER_AREA: usize = 2;
const PLACEMENT_ATTEMPTS: u32 = 20;
/// Same-cycle spawn points keep 3 max-circle radii apart.
const SEPARATION_FACTOR: f32 = 3.0;

pub struct DynamicSpawner {
  /// Seconds between checks.
  interval: f64,
  last_check: f64,
  total_spawned: usize
}

impl DynamicSpawner {
  pub fn new(interval_ms: f64) -> Self {
    DynamicSpawner {
      interval: interval_ms.max(1.0) / 1000.0,
      last_check: f64::NEG_INFINITY,
      total_spawned: 0
    }
  }

  pub fn total_spawned(&self) -> usize {
    self.total_spawned
  }

  /// Skip the upcoming cycle; called right after the index was rebuilt from
  /// a freshly generated circle list.
  pub fn defer(&mut self, now: f64) {
    self.last_check = now;
  }

  /// Run one spawn check if the interval elapsed. Returns how many circles
  /// were appended.
  pub fn maybe_spawn(
    &mut self,
    circles: &mut Vec<Circle>,
    grid: &HashGrid,
    raster: &RgbaImage,
    config: &PackingConfig,
    now: f64,
    rng: &mut impl Rng
  ) -> usize {
    if now - self.last_check < self.interval { return 0; }
    self.last_check = now;

    let budget = config.max_spawns_per_check
      .min(SPAWN_CAP.saturating_sub(self.total_spawned));
    if budget == 0 { return 0; }

    let bounds = grid.bounds();
    let areas = grid.find_empty_areas(config.min_empty_area_size);
    let mut chosen: Vec<(Point, f32)> = vec![];

    if areas.is_empty() {
      // grid-based detection came up dry; fall back to blind sampling
      log::debug!("no empty areas found, falling back to random spawn points");
      while chosen.len() < budget {
        let found = (0..PLACEMENT_ATTEMPTS).find_map(|_| {
          let p = Point::new(
            rng.gen_range(0.0..bounds.width),
            rng.gen_range(0.0..bounds.height)
          );
          self.admit(p, grid, config, &chosen)
        });
        match found {
          Some(pick) => chosen.push(pick),
          None => break
        }
      }
    } else {
      'areas: for area in areas.iter().take(TOP_AREAS) {
        for _ in 0..POINTS_PER_AREA {
          if chosen.len() >= budget { break 'areas; }
          let found = (0..PLACEMENT_ATTEMPTS).find_map(|_| {
            let p = area.center + V2::new(
              rng.gen_range(-0.5..0.5) * area.extent.width,
              rng.gen_range(-0.5..0.5) * area.extent.height
            );
            self.admit(p, grid, config, &chosen)
          });
          if let Some(pick) = found {
            chosen.push(pick);
          }
        }
      }
    }

    for &(p, available) in &chosen {
      let target = (available * rng.gen_range(0.3..0.8))
        .clamp(config.min_circle_size, config.max_circle_size)
        .max(START_RADIUS);
      let mut c = Circle::new(p, START_RADIUS, Rgb::sample(raster, p).boosted());
      c.target_radius = target;
      c.lifecycle = Lifecycle::DynamicSpawning { target_radius: target };
      c.protected_until = now + PROTECTION_SECS;
      circles.push(c);
    }

    self.total_spawned += chosen.len();
    chosen.len()
  }

  /// Accept a candidate point if enough space is available and it keeps its
  /// distance from the other points picked this cycle.
  fn admit(
    &self,
    p: Point,
    grid: &HashGrid,
    config: &PackingConfig,
    chosen: &[(Point, f32)]
  ) -> Option<(Point, f32)> {
    let bounds = grid.bounds();
    if p.x < 0.0 || p.y < 0.0 || p.x >= bounds.width || p.y >= bounds.height {
      return None;
    }
    let available = grid.max_radius_at(p, config.circle_spacing);
    if available < MIN_AVAILABLE_RADIUS {
      return None;
    }
    let min_separation = SEPARATION_FACTOR * config.max_circle_size;
    chosen.iter()
      .all(|(q, _)| (*q - p).length() >= min_separation)
      .then(|| (p, available))
  }
}

#[cfg(test)] mod tests {
  use {
    super::*,
    crate::geometry::Size,
    image::Rgba,
    rand::prelude::*
  };

  fn raster() -> RgbaImage {
    RgbaImage::from_pixel(400, 400, Rgba([120, 80, 40, 255]))
  }

  fn config() -> PackingConfig {
    PackingConfig { max_spawns_per_check: 2, ..Default::default() }
  }

  #[test] fn spawns_into_empty_regions() {
    let mut rng = rand_pcg::Pcg64::seed_from_u64(0);
    let grid = HashGrid::new(Size::new(400.0, 400.0), 20.0);
    let mut spawner = DynamicSpawner::new(1000.0);
    let mut circles = vec![];

    let spawned = spawner.maybe_spawn(&mut circles, &grid, &raster(), &config(), 0.0, &mut rng);
    assert!(spawned >= 1);
    assert_eq!(circles.len(), spawned);
    for c in &circles {
      assert_eq!(c.radius, START_RADIUS);
      assert!(matches!(c.lifecycle, Lifecycle::DynamicSpawning { target_radius } if target_radius >= START_RADIUS));
      assert_eq!(c.protected_until, PROTECTION_SECS);
      // color sampled from the raster, already bright enough to skip boost
      assert!((c.color.r - 120.0 / 255.0).abs() < 1e-3);
    }
  }

  #[test] fn same_cycle_points_keep_their_distance() {
    let mut rng = rand_pcg::Pcg64::seed_from_u64(5);
    let grid = HashGrid::new(Size::new(1000.0, 1000.0), 25.0);
    let mut spawner = DynamicSpawner::new(1000.0);
    let mut circles = vec![];
    let config = config();

    spawner.maybe_spawn(&mut circles, &grid, &raster(), &config, 0.0, &mut rng);
    for i in 0..circles.len() {
      for j in i + 1..circles.len() {
        let dist = (circles[i].center - circles[j].center).length();
        assert!(dist >= SEPARATION_FACTOR * config.max_circle_size - 1e-3);
      }
    }
  }

  #[test] fn interval_throttles_checks() {
    let mut rng = rand_pcg::Pcg64::seed_from_u64(1);
    let grid = HashGrid::new(Size::new(400.0, 400.0), 20.0);
    let mut spawner = DynamicSpawner::new(1000.0);
    let mut circles = vec![];

    assert!(spawner.maybe_spawn(&mut circles, &grid, &raster(), &config(), 0.0, &mut rng) > 0);
    assert_eq!(spawner.maybe_spawn(&mut circles, &grid, &raster(), &config(), 0.5, &mut rng), 0);
    assert!(spawner.maybe_spawn(&mut circles, &grid, &raster(), &config(), 1.01, &mut rng) > 0);
  }

  #[test] fn defer_skips_one_cycle() {
    let mut rng = rand_pcg::Pcg64::seed_from_u64(2);
    let grid = HashGrid::new(Size::new(400.0, 400.0), 20.0);
    let mut spawner = DynamicSpawner::new(1000.0);
    let mut circles = vec![];

    spawner.defer(0.0);
    assert_eq!(spawner.maybe_spawn(&mut circles, &grid, &raster(), &config(), 0.9, &mut rng), 0);
    assert!(spawner.maybe_spawn(&mut circles, &grid, &raster(), &config(), 1.01, &mut rng) > 0);
  }

  #[test] fn lifetime_cap_holds() {
    let mut rng = rand_pcg::Pcg64::seed_from_u64(3);
    let grid = HashGrid::new(Size::new(400.0, 400.0), 20.0);
    let mut spawner = DynamicSpawner::new(1.0);
    let config = PackingConfig { max_spawns_per_check: 100, ..Default::default() };

    let mut now = 0.0;
    for _ in 0..4000 {
      let mut circles = vec![];
      spawner.maybe_spawn(&mut circles, &grid, &raster(), &config, now, &mut rng);
      now += 0.01;
      if spawner.total_spawned() == SPAWN_CAP { break; }
    }
    assert_eq!(spawner.total_spawned(), SPAWN_CAP);
    let mut circles = vec![];
    assert_eq!(spawner.maybe_spawn(&mut circles, &grid, &raster(), &config, now + 1.0, &mut rng), 0);
  }
}

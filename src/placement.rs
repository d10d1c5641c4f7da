//! Initial circle set construction: weighted-random placement against a
//! quad-tree, or a bouncing-ball drop that lets gravity do the packing.

use {
  crate::{
    change_map::ColorChangeMap,
    config::PackingConfig,
    geometry::{Circle, Lifecycle, Point, Rgb, Size, V2},
    index::{Entry, QuadTree, SpatialIndex},
    physics::{self, RelaxParams, FRAME_DT, GRAVITY_SCALE},
    sampler::PoissonSampler
  },
  image::RgbaImage,
  rand::Rng
};

/// Attempt budgets scale with canvas area relative to a full-screen target.
pub const REFERENCE_AREA: f32 = 1920.0 * 1080.0;
/// Share of placement attempts drawn from the change-map weighting.
const WEIGHTED_SHARE: f32 = 0.6;
/// Radius shrink at full change intensity.
const HIGH_CHANGE_SHRINK: f32 = 0.7;
/// The minimum radius relaxes to half in high-change areas.
const RELAXED_MIN: f32 = 0.5;
/// Bouncing-ball settle budget.
const SETTLE_STEPS: u32 = 200;
const SETTLE_SPEED: f32 = 0.5;
/// Gravity reduction during the bouncing-ball drop.
const DROP_GRAVITY: f32 = 0.25;
/// Progressive-growth start stagger, seconds.
const MAX_STAGGER: f64 = 0.6;

#[derive(Debug, Clone, PartialEq)]
pub struct Progress {
  pub phase: &'static str,
  pub percent: f32
}

pub struct PlacementEngine {
  config: PackingConfig,
  bounds: Size
}

impl PlacementEngine {
  pub fn new(config: PackingConfig, bounds: Size) -> Self {
    PlacementEngine { config: config.sanitized(), bounds }
  }

  /// Build and relax the initial circle set. `progress` receives phase
  /// labels with a 0–100 percentage.
  pub fn generate(
    &self,
    raster: &RgbaImage,
    rng: &mut impl Rng,
    progress: &mut dyn FnMut(Progress)
  ) -> Vec<Circle> {
    let change_map = self.config.enable_color_change_map.then(|| {
      let mut map = ColorChangeMap::new();
      map.update(raster, 0.0);
      map
    });

    let mut circles = if self.config.use_physics_placement {
      self.place_bouncing(raster, rng, progress)
    } else {
      self.place_weighted(raster, change_map.as_ref(), rng, progress)
    };

    let params = RelaxParams {
      gravity: 0.0,
      damping: self.config.damping,
      substeps: self.config.substeps,
      iterations: 1,
      spacing_factor: self.config.circle_spacing
    };
    for i in 0..self.config.physics_iterations {
      if self.config.use_verlet_physics {
        physics::relax(&mut circles, self.bounds, params, rng);
      } else {
        physics::relax_forces(&mut circles, self.bounds, self.config.substeps, self.config.circle_spacing);
      }
      progress(Progress {
        phase: "relaxation",
        percent: (i + 1) as f32 / self.config.physics_iterations as f32 * 100.0
      });
    }
    circles
  }

  /// Sample positions (weighted toward high-change regions), take the
  /// largest collision-free radius at each, and commit until the canvas
  /// saturates or the population target is met.
  fn place_weighted(
    &self,
    raster: &RgbaImage,
    change_map: Option<&ColorChangeMap>,
    rng: &mut impl Rng,
    progress: &mut dyn FnMut(Progress)
  ) -> Vec<Circle> {
    let config = &self.config;
    let area_ratio = self.bounds.area() / REFERENCE_AREA;
    let attempts = ((config.total_circles as f32 * area_ratio * 10.0) as usize)
      .max(config.total_circles);
    let max_consecutive_failures = (attempts / 10).max(1);

    let mut tree = QuadTree::new(self.bounds);
    let mut poisson = PoissonSampler::new(self.bounds, config.min_circle_size * 2.0);
    poisson.generate(rng, 0);
    let mut circles: Vec<Circle> = vec![];
    let mut consecutive_failures = 0usize;

    for attempt in 0..attempts {
      if circles.len() >= config.total_circles { break; }
      if attempt % 64 == 0 {
        progress(Progress {
          phase: "placement",
          percent: circles.len() as f32 / config.total_circles as f32 * 100.0
        });
      }

      let position = match change_map {
        Some(map) if rng.gen_range(0.0..1.0f32) < WEIGHTED_SHARE =>
          map.weighted_point(rng),
        _ => poisson.next(rng).unwrap_or_else(|| Point::new(
          rng.gen_range(0.0..self.bounds.width),
          rng.gen_range(0.0..self.bounds.height)
        ))
      };

      let intensity = change_map
        .map_or(0.0, |map| map.intensity_at(position));
      let available = tree.max_radius_at(position, config.circle_spacing);
      let radius = (available * config.packing_density
        * (1.0 - HIGH_CHANGE_SHRINK * intensity))
        .min(config.max_circle_size);
      // busy areas accept smaller circles than the global minimum
      let min_allowed = config.min_circle_size * (1.0 - RELAXED_MIN * intensity);

      if radius < min_allowed {
        consecutive_failures += 1;
        if consecutive_failures >= max_consecutive_failures {
          // saturation: a designed early exit, not an error
          log::debug!(
            "placement saturated after {} circles ({} attempts)",
            circles.len(), attempt + 1
          );
          break;
        }
        continue;
      }
      consecutive_failures = 0;

      tree.insert(Entry::new(circles.len(), position, radius));
      circles.push(self.commit(position, radius, raster, rng));
    }

    progress(Progress { phase: "placement", percent: 100.0 });
    circles
  }

  /// Drop circles from above the canvas under reduced gravity and keep the
  /// ones that settle within the step budget.
  fn place_bouncing(
    &self,
    raster: &RgbaImage,
    rng: &mut impl Rng,
    progress: &mut dyn FnMut(Progress)
  ) -> Vec<Circle> {
    let config = &self.config;
    let mut balls = (0..config.total_circles).map(|_| {
      let radius = rng.gen_range(config.min_circle_size..=config.max_circle_size);
      let center = Point::new(
        rng.gen_range(0.0..self.bounds.width) + rng.gen_range(-5.0..5.0f32),
        -radius - rng.gen_range(0.0..self.bounds.height * 0.5)
      );
      let mut c = Circle::new(center, radius, Rgb::BLACK);
      // near-zero initial velocity, tiny downward bias
      c.prev = center - V2::new(rng.gen_range(-0.5..0.5f32), rng.gen_range(0.0..0.1f32));
      c
    }).collect::<Vec<_>>();

    let dt = FRAME_DT;
    let gravity = config.gravity * DROP_GRAVITY * GRAVITY_SCALE * dt * dt;
    for step in 0..SETTLE_STEPS {
      for c in balls.iter_mut() {
        let velocity = c.velocity();
        c.prev = c.center;
        c.center += velocity * config.damping + V2::new(0.0, gravity);
      }
      physics::resolve_collisions(&mut balls, config.circle_spacing);
      for c in balls.iter_mut() {
        self.contain_open_top(c);
      }

      if step % 16 == 0 {
        progress(Progress {
          phase: "placement",
          percent: step as f32 / SETTLE_STEPS as f32 * 100.0
        });
      }
      if (0..balls.len()).all(|i| self.settled(i, &balls)) { break; }
    }

    let settled = (0..balls.len())
      .filter(|&i| self.settled(i, &balls))
      .map(|i| balls[i].clone())
      .collect::<Vec<_>>();
    progress(Progress { phase: "placement", percent: 100.0 });

    settled.into_iter()
      .map(|c| self.commit(c.center, c.radius, raster, rng))
      .collect()
  }

  /// Side walls and floor only; balls enter through the open top. Reflection
  /// only applies to velocity pointing into the wall, as in
  /// [`physics::contain`].
  fn contain_open_top(&self, c: &mut Circle) {
    let velocity = c.velocity();
    if c.center.x < c.radius {
      c.center.x = c.radius;
      c.prev.x = c.center.x - if velocity.x < 0.0 { -velocity.x * 0.8 } else { velocity.x };
    } else if c.center.x > self.bounds.width - c.radius {
      c.center.x = self.bounds.width - c.radius;
      c.prev.x = c.center.x - if velocity.x > 0.0 { -velocity.x * 0.8 } else { velocity.x };
    }
    if c.center.y > self.bounds.height - c.radius {
      c.center.y = self.bounds.height - c.radius;
      c.prev.y = c.center.y - if velocity.y > 0.0 { -velocity.y * 0.8 } else { velocity.y };
    }
  }

  /// Slow, and resting on the floor or on another circle.
  fn settled(&self, i: usize, all: &[Circle]) -> bool {
    let c = &all[i];
    if c.velocity().length() >= SETTLE_SPEED { return false; }
    let on_floor = c.center.y >= self.bounds.height - c.radius - 1.0;
    on_floor || all.iter().enumerate().any(|(j, other)| {
      j != i && (other.center - c.center).length() <= c.radius + other.radius + 1.0
    })
  }

  /// Final circle record at a position: sampled boosted color, and the
  /// progressive-growth ramp when enabled. `start_time` is a stagger offset
  /// from zero; the simulation rebases it onto its own clock when the
  /// generated set is installed.
  fn commit(&self, position: Point, radius: f32, raster: &RgbaImage, rng: &mut impl Rng) -> Circle {
    let color = Rgb::sample(raster, position).boosted();
    let mut c = Circle::new(position, radius, color);
    c.target_radius = radius;
    if self.config.enable_progressive_growth {
      c.set_radius(radius * self.config.start_size_multiplier);
      c.start_radius = c.radius;
      c.lifecycle = Lifecycle::Growing {
        target_radius: radius,
        start_time: rng.gen_range(0.0..MAX_STAGGER)
      };
    }
    c
  }
}

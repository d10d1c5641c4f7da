//! Per-circle lifecycle driver: progressive growth ramps, collision-probed
//! growth of dynamically spawned circles, and the color-adaptation cycle.
//!
//! Color-similarity checks go through an explicit request/response pair:
//! the request records the circle position, and a response for a circle that
//! moved more than [`STALE_DISTANCE`] meanwhile is discarded. The driver
//! fulfilling the requests (normally the orchestrator, from the raster)
//! stands in for an asynchronous GPU readback.

use {
  crate::{
    change_map::ColorChangeMap,
    config::PackingConfig,
    geometry::{AdaptPhase, Circle, Lifecycle, Point, Rgb, Size, V2},
    index::{HashGrid, SpatialIndex}
  },
  image::RgbaImage,
  rand::Rng
};

/// A response whose circle moved further than this since the request was
/// issued is stale and dropped.
pub const STALE_DISTANCE: f32 = 5.0;
/// Ring probes per resampling pass.
pub const RING_PROBES: usize = 16;
/// Ring probe distance beyond the circle's own radius, px.
pub const SEARCH_RADIUS: f32 = 30.0;
/// Seconds of the progressive growth ramp.
pub const GROWTH_DURATION: f64 = 1.5;
/// Purging more than this many circles in one sweep requests an index rebuild.
pub const PURGE_REBUILD_THRESHOLD: usize = 10;

/// Share of eligible circles polled per cycle, before weighting.
const SUBSET_FRACTION: f32 = 0.3;
/// Fraction of the measured clear distance a seeking circle moves per cycle.
const SEEK_STEP_FRACTION: f32 = 0.1;
const SEEK_MARCH_STEP: f32 = 2.0;

#[derive(Debug, Copy, Clone, PartialEq)]
pub struct SampleRequest {
  pub id: usize,
  /// Circle position at request time; staleness is checked against it.
  pub center: Point
}

#[derive(Debug, Copy, Clone, PartialEq)]
pub struct SampleResponse {
  pub request: SampleRequest,
  pub color: Rgb
}

#[derive(Debug, Default, Copy, Clone, PartialEq)]
pub struct GrowthOutcome {
  pub purged: usize,
  /// Set when a sweep removed enough circles to warrant a full index rebuild.
  pub rebuild_index: bool
}

pub struct GrowthController {
  last_poll: f64,
  /// Requests issued and not yet answered.
  pending: Vec<SampleRequest>,
  inbox: Vec<SampleResponse>
}

impl GrowthController {
  pub fn new() -> Self {
    GrowthController {
      last_poll: f64::NEG_INFINITY,
      pending: vec![],
      inbox: vec![]
    }
  }

  /// Drain the requests issued this cycle; the caller owes a
  /// [`submit_response`](Self::submit_response) (or a skip) for each.
  pub fn take_requests(&mut self) -> Vec<SampleRequest> {
    std::mem::take(&mut self.pending)
  }

  pub fn submit_response(&mut self, response: SampleResponse) {
    self.inbox.push(response);
  }

  pub fn update(
    &mut self,
    circles: &mut Vec<Circle>,
    grid: &HashGrid,
    raster: &RgbaImage,
    change_map: &ColorChangeMap,
    config: &PackingConfig,
    bounds: Size,
    now: f64,
    rng: &mut impl Rng
  ) -> GrowthOutcome {
    for id in 0..circles.len() {
      match circles[id].lifecycle {
        Lifecycle::Growing { target_radius, start_time } =>
          step_growth_ramp(&mut circles[id], target_radius, start_time, raster, config, now),
        Lifecycle::DynamicSpawning { target_radius } =>
          step_spawn_growth(circles, id, target_radius, grid, bounds, config),
        Lifecycle::Stable | Lifecycle::Adapting(_) => {}
      }
    }

    if config.enable_color_monitoring {
      self.apply_responses(circles, config);
      self.step_adaptation(circles, grid, raster, config, bounds);
      self.poll_similarity(circles, change_map, config, now, rng);
    }

    self.purge_dead(circles)
  }

  /// Answered checks: drop stale ones, flip mismatching circles into the
  /// adaptation cycle.
  fn apply_responses(&mut self, circles: &mut [Circle], config: &PackingConfig) {
    for response in std::mem::take(&mut self.inbox) {
      let Some(c) = circles.get_mut(response.request.id) else {
        continue;
      };
      if (c.center - response.request.center).length() > STALE_DISTANCE {
        log::debug!(
          "discarding stale color sample for circle {}", response.request.id
        );
        continue;
      }
      if c.lifecycle != Lifecycle::Stable { continue; }
      if c.color.similarity(response.color) < config.color_similarity_threshold {
        c.lifecycle = Lifecycle::Adapting(AdaptPhase::Resampling { original: c.color });
      }
    }
  }

  /// Issue similarity checks for a weighted ~30% subset of stable circles.
  /// The interval stretches up to 3x on calm frames and tightens to 0.2x on
  /// busy ones.
  fn poll_similarity(
    &mut self,
    circles: &[Circle],
    change_map: &ColorChangeMap,
    config: &PackingConfig,
    now: f64,
    rng: &mut impl Rng
  ) {
    let scale = (3.0 - 2.8 * change_map.average() as f64).clamp(0.2, 3.0);
    let interval = config.color_update_interval / 1000.0 * scale;
    if now - self.last_poll < interval { return; }
    self.last_poll = now;

    for (id, c) in circles.iter().enumerate() {
      if c.lifecycle != Lifecycle::Stable || c.is_dead() { continue; }
      if now < c.protected_until { continue; }
      if self.pending.iter().any(|r| r.id == id) { continue; }

      let weight = 0.5 + change_map.intensity_at(c.center) * 1.5;
      if rng.gen_range(0.0..1.0f32) < (SUBSET_FRACTION * weight).min(1.0) {
        self.pending.push(SampleRequest { id, center: c.center });
      }
    }
  }

  /// Advance every circle that is mid-adaptation by one phase.
  fn step_adaptation(
    &mut self,
    circles: &mut [Circle],
    grid: &HashGrid,
    raster: &RgbaImage,
    config: &PackingConfig,
    bounds: Size
  ) {
    for id in 0..circles.len() {
      let Lifecycle::Adapting(phase) = circles[id].lifecycle else {
        continue;
      };
      match phase {
        AdaptPhase::Resampling { .. } =>
          resample_ring(&mut circles[id], raster, config),
        AdaptPhase::Seeking { target, color } =>
          seek_toward(circles, id, target, color, grid, config, bounds)
      }
    }
  }

  /// Sweep dead circles. The spatial index keys circles by their slot, so a
  /// large sweep invalidates enough of it to warrant a rebuild; in-flight
  /// sample traffic is keyed the same way and is dropped with the sweep.
  fn purge_dead(&mut self, circles: &mut Vec<Circle>) -> GrowthOutcome {
    let before = circles.len();
    circles.retain(|c| !c.is_dead());
    let purged = before - circles.len();
    if purged > 0 {
      self.pending.clear();
      self.inbox.clear();
    }
    GrowthOutcome {
      purged,
      rebuild_index: purged > PURGE_REBUILD_THRESHOLD
    }
  }
}

impl Default for GrowthController {
  fn default() -> Self { Self::new() }
}

/// Ease-out cubic ramp from `target × start_fraction` to `target`, color
/// re-sampled whenever the radius crosses a whole pixel.
fn step_growth_ramp(
  c: &mut Circle,
  target_radius: f32,
  start_time: f64,
  raster: &RgbaImage,
  config: &PackingConfig,
  now: f64
) {
  let elapsed = now - start_time;
  if elapsed < 0.0 { return; }

  let duration = GROWTH_DURATION / config.growth_rate.max(0.1) as f64;
  let t = (elapsed / duration).clamp(0.0, 1.0) as f32;
  let eased = 1.0 - (1.0 - t).powi(3);

  let old = c.radius;
  c.set_radius(c.start_radius + (target_radius - c.start_radius) * eased);
  if c.radius.floor() > old.floor() {
    c.color = Rgb::sample(raster, c.center).boosted();
  }

  if t >= 1.0 {
    c.set_radius(target_radius);
    c.lifecycle = Lifecycle::Stable;
  }
}

/// Grow a spawned circle by fixed steps, probing each step against the index
/// and the canvas; the first blocked step freezes the radius and pins the
/// circle out of the physics simulation.
fn step_spawn_growth(
  circles: &mut [Circle],
  id: usize,
  target_radius: f32,
  grid: &HashGrid,
  bounds: Size,
  config: &PackingConfig
) {
  let c = &circles[id];
  let next = (c.radius + config.growth_rate).min(target_radius);

  let blocked = next > c.center.x
    || next > c.center.y
    || next > bounds.width - c.center.x
    || next > bounds.height - c.center.y
    || grid.check_collision(c.center, next, config.circle_spacing, Some(id));

  let c = &mut circles[id];
  if blocked {
    c.pinned = true;
    c.lifecycle = Lifecycle::Stable;
  } else if next >= target_radius {
    c.set_radius(target_radius);
    c.pinned = true;
    c.lifecycle = Lifecycle::Stable;
  } else {
    c.set_radius(next);
  }
}

/// Probe [`RING_PROBES`] points around the circle for a raster region whose
/// color still matches; no match above the threshold reverts to stable with
/// nothing changed.
fn resample_ring(c: &mut Circle, raster: &RgbaImage, config: &PackingConfig) {
  let ring = c.radius + SEARCH_RADIUS;
  let best = (0..RING_PROBES)
    .map(|i| {
      let angle = i as f32 / RING_PROBES as f32 * std::f32::consts::TAU;
      let p = c.center + V2::new(angle.cos(), angle.sin()) * ring;
      let color = Rgb::sample(raster, p);
      (c.color.similarity(color), p, color)
    })
    .max_by(|a, b| a.0.total_cmp(&b.0));

  c.lifecycle = match best {
    Some((similarity, target, color)) if similarity >= config.color_similarity_threshold =>
      Lifecycle::Adapting(AdaptPhase::Seeking { target, color }),
    _ => Lifecycle::Stable
  };
}

/// March a ray toward the seek target, then move a fraction of the clear
/// distance, blend color halfway, and nudge the radius after the local
/// clearance.
fn seek_toward(
  circles: &mut [Circle],
  id: usize,
  target: Point,
  color: Rgb,
  grid: &HashGrid,
  config: &PackingConfig,
  bounds: Size
) {
  let c = &circles[id];
  let to_target = target - c.center;
  let total = to_target.length();
  if total <= f32::EPSILON {
    circles[id].lifecycle = Lifecycle::Stable;
    return;
  }
  let dir = to_target / total;
  let radius = c.radius;
  let center = c.center;
  let margin = 3.0 * config.circle_spacing;

  let mut clear = 0.0f32;
  while clear < total {
    let step = SEEK_MARCH_STEP.min(total - clear);
    let p = center + dir * (clear + step);
    let outside = p.x < radius || p.y < radius
      || p.x > bounds.width - radius || p.y > bounds.height - radius;
    let crowded = grid.nearby(p, radius + margin).iter()
      .filter(|n| n.id != id)
      .any(|n| (n.center - p).length() < radius + n.radius + margin);
    if outside || crowded { break; }
    clear += step;
  }

  let c = &mut circles[id];
  let shift = dir * clear * SEEK_STEP_FRACTION;
  c.center += shift;
  c.prev += shift;
  c.color = c.color.blend(color, 0.5);

  if clear > 2.0 * c.radius {
    let r = (c.radius + 0.2).min(config.max_circle_size);
    c.set_radius(r);
  } else if clear < 0.8 * c.radius {
    let r = (c.radius * 0.95).max(config.min_circle_size);
    c.set_radius(r);
  }
  c.lifecycle = Lifecycle::Stable;
}

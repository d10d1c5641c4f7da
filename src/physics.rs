//! Verlet relaxation with mass-weighted collision resolution and boundary
//! containment, plus a simpler explicit-force fallback.
//!
//! Collision resolution is pairwise O(n²) per substep. Acceptable at the
//! expected population of a few hundred circles; the first thing to revisit
//! if counts ever grow by an order of magnitude.

use {
  crate::geometry::{Circle, Size, V2},
  rand::Rng
};

/// Base timestep; substeps divide it further.
pub const FRAME_DT: f32 = 1.0 / 60.0;
/// Config gravity lives in `[0, 1]`; this maps it to px/s².
pub const GRAVITY_SCALE: f32 = 2000.0;
/// How much lighter circles are pushed, relative to pure mass weighting.
const MASS_PUSH_AMPLIFY: f32 = 1.5;
/// Velocity retained along the wall normal after a bounce.
const WALL_RESTITUTION: f32 = 0.8;
/// Symmetry-breaking jitter amplitude, px per step.
const JITTER: f32 = 0.05;
/// Force-fallback early exit: max per-iteration movement below this settles.
const SETTLED_MOVEMENT: f32 = 0.1;

#[derive(Debug, Copy, Clone)]
pub struct RelaxParams {
  pub gravity: f32,
  pub damping: f32,
  pub substeps: u32,
  pub iterations: u32,
  pub spacing_factor: f32
}

impl Default for RelaxParams {
  fn default() -> Self {
    RelaxParams {
      gravity: 0.3,
      damping: 0.98,
      substeps: 4,
      iterations: 3,
      spacing_factor: 1.0
    }
  }
}

/// Run `iterations × substeps` Verlet steps over the circle list.
pub fn relax(circles: &mut [Circle], bounds: Size, params: RelaxParams, rng: &mut impl Rng) {
  let dt = FRAME_DT / params.substeps.max(1) as f32;
  for _ in 0..params.iterations.max(1) {
    for _ in 0..params.substeps.max(1) {
      verlet_step(circles, dt, params, rng);
      resolve_collisions(circles, params.spacing_factor);
      for c in circles.iter_mut() {
        contain(c, bounds);
      }
    }
  }
}

/// Velocity is implicit: derived from current minus previous position.
fn verlet_step(circles: &mut [Circle], dt: f32, params: RelaxParams, rng: &mut impl Rng) {
  for c in circles.iter_mut() {
    if c.pinned { continue; }
    let velocity = c.velocity();
    c.prev = c.center;
    c.center += velocity * params.damping
      + V2::new(0.0, params.gravity * GRAVITY_SCALE * dt * dt)
      + V2::new(
        rng.gen_range(-JITTER..JITTER),
        rng.gen_range(-JITTER..JITTER)
      );
  }
}

/// Separate every overlapping pair along the contact normal, weighted
/// inversely by mass so lighter circles move proportionally more.
pub fn resolve_collisions(circles: &mut [Circle], spacing_factor: f32) {
  for i in 0..circles.len() {
    for j in i + 1..circles.len() {
      let (a, b) = {
        let (left, right) = circles.split_at_mut(j);
        (&mut left[i], &mut right[0])
      };
      if a.is_dead() || b.is_dead() { continue; }
      if a.pinned && b.pinned { continue; }

      let delta = b.center - a.center;
      let dist = delta.length();
      let min_dist = (a.radius + b.radius) * spacing_factor;
      if dist >= min_dist { continue; }
      // coincident centers: no usable normal, skip rather than divide by zero
      if dist <= f32::EPSILON { continue; }

      let normal = delta / dist;
      let depth = min_dist - dist;
      let total = a.mass + b.mass;
      let (wa, wb) = if a.pinned {
        (0.0, 1.0)
      } else if b.pinned {
        (1.0, 0.0)
      } else if total <= f32::EPSILON {
        (0.5, 0.5)
      } else {
        // lighter side takes the larger share, amplified
        (
          (b.mass / total * MASS_PUSH_AMPLIFY).min(1.0),
          (a.mass / total * MASS_PUSH_AMPLIFY).min(1.0)
        )
      };
      a.center -= normal * depth * wa * 0.5;
      b.center += normal * depth * wb * 0.5;
    }
  }
}

/// Clamp to `[radius, dimension - radius]`; when moving into a wall, reflect
/// the stored previous position by 80% of the penetrating component, which
/// bounces with energy loss instead of zeroing the velocity. A circle pushed
/// past a wall while already moving away keeps its outward velocity.
pub fn contain(c: &mut Circle, bounds: Size) {
  let velocity = c.velocity();

  if c.center.x < c.radius {
    c.center.x = c.radius;
    c.prev.x = clamp_prev(c.center.x, velocity.x, velocity.x < 0.0);
  } else if c.center.x > bounds.width - c.radius {
    c.center.x = bounds.width - c.radius;
    c.prev.x = clamp_prev(c.center.x, velocity.x, velocity.x > 0.0);
  }

  if c.center.y < c.radius {
    c.center.y = c.radius;
    c.prev.y = clamp_prev(c.center.y, velocity.y, velocity.y < 0.0);
  } else if c.center.y > bounds.height - c.radius {
    c.center.y = bounds.height - c.radius;
    c.prev.y = clamp_prev(c.center.y, velocity.y, velocity.y > 0.0);
  }
}

/// Previous-position coordinate after a wall clamp: reflect with energy loss
/// when the velocity points into the wall, otherwise preserve it.
fn clamp_prev(pos: f32, v: f32, into_wall: bool) -> f32 {
  if into_wall { pos + v * WALL_RESTITUTION } else { pos - v }
}

/// Explicit-force fallback used when Verlet is disabled: pairwise repulsion
/// with linearly decaying damping, early exit once the layout settles.
pub fn relax_forces(circles: &mut [Circle], bounds: Size, iterations: u32, spacing_factor: f32) {
  let iterations = iterations.max(1);
  for iter in 0..iterations {
    let damping = 1.0 - iter as f32 / iterations as f32;
    let mut max_movement = 0.0f32;

    for i in 0..circles.len() {
      for j in i + 1..circles.len() {
        let (a, b) = {
          let (left, right) = circles.split_at_mut(j);
          (&mut left[i], &mut right[0])
        };
        if a.is_dead() || b.is_dead() { continue; }

        let delta = b.center - a.center;
        let dist = delta.length();
        let min_dist = (a.radius + b.radius) * spacing_factor;
        if dist >= min_dist || dist <= f32::EPSILON { continue; }

        let push = delta / dist * (min_dist - dist) * 0.5 * damping;
        if !a.pinned {
          a.center -= push;
          max_movement = max_movement.max(push.length());
        }
        if !b.pinned {
          b.center += push;
          max_movement = max_movement.max(push.length());
        }
      }
    }

    for c in circles.iter_mut() {
      c.center.x = c.center.x.clamp(c.radius, (bounds.width - c.radius).max(c.radius));
      c.center.y = c.center.y.clamp(c.radius, (bounds.height - c.radius).max(c.radius));
      c.prev = c.center;
    }

    if max_movement < SETTLED_MOVEMENT { break; }
  }
}

#[cfg(test)] mod tests {
  use {
    super::*,
    crate::geometry::{Circle, Point, Rgb},
    itertools::Itertools,
    rand::prelude::*
  };

  fn random_population(n: usize, bounds: Size, seed: u64) -> Vec<Circle> {
    let mut rng = rand_pcg::Pcg64::seed_from_u64(seed);
    (0..n).map(|_| Circle::new(
      Point::new(
        rng.gen_range(20.0..bounds.width - 20.0),
        rng.gen_range(20.0..bounds.height - 20.0)
      ),
      rng.gen_range(4.0..18.0),
      Rgb::BLACK
    )).collect()
  }

  fn assert_separated(circles: &[Circle], spacing: f32, eps: f32) {
    for (a, b) in circles.iter().tuple_combinations() {
      if a.pinned || b.pinned { continue; }
      let dist = (a.center - b.center).length();
      assert!(
        dist >= (a.radius + b.radius) * spacing - eps,
        "{} < {}", dist, (a.radius + b.radius) * spacing
      );
    }
  }

  #[test] fn verlet_relaxation_separates_pairs() {
    let bounds = Size::new(400.0, 300.0);
    let mut circles = random_population(40, bounds, 0);
    let mut rng = rand_pcg::Pcg64::seed_from_u64(1);
    let params = RelaxParams { gravity: 0.0, iterations: 40, ..Default::default() };
    relax(&mut circles, bounds, params, &mut rng);
    assert_separated(&circles, params.spacing_factor, 0.5);
  }

  #[test] fn circles_stay_in_bounds() {
    let bounds = Size::new(200.0, 200.0);
    let mut circles = random_population(20, bounds, 2);
    let mut rng = rand_pcg::Pcg64::seed_from_u64(3);
    relax(&mut circles, bounds, RelaxParams { gravity: 1.0, iterations: 30, ..Default::default() }, &mut rng);
    for c in &circles {
      assert!(c.center.x >= c.radius - 1e-3 && c.center.x <= bounds.width - c.radius + 1e-3);
      assert!(c.center.y >= c.radius - 1e-3 && c.center.y <= bounds.height - c.radius + 1e-3);
    }
  }

  #[test] fn wall_bounce_reflects_with_loss() {
    let bounds = Size::new(100.0, 100.0);
    let mut c = Circle::new(Point::new(4.0, 50.0), 5.0, Rgb::BLACK);
    // moving left into the wall at 2 px/step
    c.prev = Point::new(6.0, 50.0);
    contain(&mut c, bounds);
    assert_eq!(c.center.x, 5.0);
    // velocity flipped: prev sits left of center at 80% magnitude
    let vx = c.center.x - c.prev.x;
    assert!((vx - 2.0 * WALL_RESTITUTION).abs() < 1e-4);
  }

  #[test] fn wall_clamp_keeps_outward_velocity() {
    let bounds = Size::new(100.0, 100.0);
    let mut c = Circle::new(Point::new(4.0, 50.0), 5.0, Rgb::BLACK);
    // pushed past the left wall but already moving away at 2 px/step
    c.prev = Point::new(2.0, 50.0);
    contain(&mut c, bounds);
    assert_eq!(c.center.x, 5.0);
    let vx = c.center.x - c.prev.x;
    assert!((vx - 2.0).abs() < 1e-4, "outward velocity was reversed: {}", vx);
  }

  #[test] fn pinned_circles_do_not_move() {
    let mut circles = vec![
      Circle::new(Point::new(50.0, 50.0), 10.0, Rgb::BLACK),
      Circle::new(Point::new(55.0, 50.0), 10.0, Rgb::BLACK)
    ];
    circles[0].pinned = true;
    let before = circles[0].center;
    resolve_collisions(&mut circles, 1.0);
    assert_eq!(circles[0].center, before);
    assert!(circles[1].center.x > 55.0);
  }

  #[test] fn coincident_pair_is_skipped() {
    let mut circles = vec![
      Circle::new(Point::new(50.0, 50.0), 10.0, Rgb::BLACK),
      Circle::new(Point::new(50.0, 50.0), 10.0, Rgb::BLACK)
    ];
    resolve_collisions(&mut circles, 1.0);
    assert_eq!(circles[0].center, circles[1].center);
  }

  #[test] fn lighter_circle_moves_more() {
    let mut circles = vec![
      Circle::new(Point::new(50.0, 50.0), 20.0, Rgb::BLACK),
      Circle::new(Point::new(70.0, 50.0), 5.0, Rgb::BLACK)
    ];
    resolve_collisions(&mut circles, 1.0);
    let heavy_shift = (circles[0].center.x - 50.0).abs();
    let light_shift = (circles[1].center.x - 70.0).abs();
    assert!(light_shift > heavy_shift);
  }

  #[test] fn force_fallback_matches_constraints() {
    let bounds = Size::new(400.0, 300.0);
    let mut circles = random_population(40, bounds, 4);
    relax_forces(&mut circles, bounds, 200, 1.0);
    assert_separated(&circles, 1.0, 0.5);
    for c in &circles {
      assert!(c.center.x >= c.radius - 1e-3 && c.center.x <= bounds.width - c.radius + 1e-3);
    }
  }
}

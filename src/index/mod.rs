//! Neighbor queries behind one interface, two strategies.
//!
//! [`HashGrid`] is rebuilt every frame and backs all per-frame paths;
//! [`QuadTree`] only serves the one-shot initial generation. Both hold
//! non-owning snapshots of the circle list ([`Entry`]), so queries never
//! borrow against the circles being mutated.

use crate::geometry::{Point, Size};

pub mod hash_grid;
pub use hash_grid::{HashGrid, EmptyArea};

pub mod quadtree;
pub use quadtree::QuadTree;

/// Safety factor absorbing floating-point error in [`SpatialIndex::max_radius_at`].
pub const MAX_RADIUS_SAFETY: f32 = 0.8;
/// Margin keeping [`SpatialIndex::max_radius_at`] strictly off the canvas edge.
pub const BOUNDS_MARGIN: f32 = 0.95;

/// Non-owning snapshot of a circle: its slot in the circle list,
/// plus the position and radius at insertion time.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Entry {
  pub id: usize,
  pub center: Point,
  pub radius: f32
}

impl Entry {
  pub fn new(id: usize, center: Point, radius: f32) -> Self {
    Entry { id, center, radius }
  }
}

pub trait SpatialIndex {
  fn insert(&mut self, entry: Entry);
  /// Candidate entries near the disk `(center, radius)`. Cell-granular:
  /// may contain extra entries, never misses an overlapping one.
  fn nearby(&self, center: Point, radius: f32) -> Vec<Entry>;
  fn clear(&mut self);
  fn bounds(&self) -> Size;
  /// Largest radius inserted since the last `clear`; widens spacing-inflated
  /// collision queries so no distant large neighbor is missed.
  fn max_tracked_radius(&self) -> f32;

  /// Largest radius a new circle at `center` could take without touching
  /// the canvas edge or coming within `spacing` of a neighbor's disk.
  fn max_radius_at(&self, center: Point, spacing: f32) -> f32 {
    let bounds = self.bounds();
    let edge = center.x
      .min(center.y)
      .min(bounds.width - center.x)
      .min(bounds.height - center.y)
      * BOUNDS_MARGIN;
    if edge <= 0.0 { return 0.0; }

    let max_r = self.nearby(center, edge + spacing).iter()
      .fold(edge, |acc, n| {
        let dist = (n.center - center).length();
        acc.min(dist - n.radius - spacing)
      });
    max_r.max(0.0) * MAX_RADIUS_SAFETY
  }

  /// Would a circle `(center, radius)` violate the spacing constraint
  /// against any indexed neighbor? `exclude` skips the circle's own entry.
  fn check_collision(&self, center: Point, radius: f32, spacing: f32, exclude: Option<usize>) -> bool {
    // a violating neighbor satisfies dist < (radius + n.radius) × spacing,
    // so the query must reach (radius + max radius) × spacing
    self.nearby(center, (radius + self.max_tracked_radius()) * spacing).iter()
      .filter(|n| Some(n.id) != exclude)
      .any(|n| {
        let dist = (n.center - center).length();
        dist < (radius + n.radius) * spacing
      })
  }
}

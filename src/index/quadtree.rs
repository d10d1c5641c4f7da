//! Recursive quad-tree, used only during one-shot generation.
//!
//! Nodes split on overflow; a circle straddling a split stays at the parent.
//! That avoids duplicate references, at the cost of a linear scan over the
//! upper levels for boundary-straddling circles.

use {
  super::{Entry, SpatialIndex},
  crate::geometry::{CanvasSpace, Point, Size},
  euclid::Rect
};

pub const DEFAULT_CAPACITY: usize = 10;
const MAX_DEPTH: u8 = 8;

const QUADRANT_ORIGIN: [(f32, f32); 4] = [
  (0.0, 0.0),
  (0.5, 0.0),
  (0.0, 0.5),
  (0.5, 0.5)
];

pub struct QuadTree {
  rect: Rect<f32, CanvasSpace>,
  capacity: usize,
  depth: u8,
  /// Largest radius ever inserted; only meaningful at the root, where it
  /// widens query pruning so spacing-inflated queries stay covered.
  max_radius: f32,
  /// Node-local entries: leaves hold everything, inner nodes hold straddlers.
  entries: Vec<Entry>,
  children: Option<Box<[QuadTree; 4]>>
}

impl QuadTree {
  pub fn new(bounds: Size) -> Self {
    Self::with_capacity(bounds, DEFAULT_CAPACITY)
  }

  pub fn with_capacity(bounds: Size, capacity: usize) -> Self {
    QuadTree {
      rect: Rect::from_size(bounds),
      capacity: capacity.max(1),
      depth: 0,
      max_radius: 0.0,
      entries: vec![],
      children: None
    }
  }

  fn node(rect: Rect<f32, CanvasSpace>, capacity: usize, depth: u8) -> Self {
    QuadTree { rect, capacity, depth, max_radius: 0.0, entries: vec![], children: None }
  }

  /// Quadrant fully containing the entry's disk, if any.
  fn fitting_child(&self, entry: &Entry) -> Option<usize> {
    let children = self.children.as_ref()?;
    (0..4).find(|&i| contains_disk(children[i].rect, entry))
  }

  fn subdivide(&mut self) {
    let rect = self.rect;
    let children = QUADRANT_ORIGIN.map(|(ox, oy)| {
      let origin = Point::new(
        rect.origin.x + ox * rect.size.width,
        rect.origin.y + oy * rect.size.height
      );
      Self::node(
        Rect::new(origin, rect.size / 2.0),
        self.capacity,
        self.depth + 1
      )
    });
    self.children = Some(Box::new(children));

    // push down every entry that fits wholly in one child
    let entries = std::mem::take(&mut self.entries);
    for entry in entries {
      match self.fitting_child(&entry) {
        Some(i) => self.children.as_mut().unwrap()[i].insert(entry),
        None => self.entries.push(entry)
      }
    }
  }

  fn nearby_into(&self, center: Point, radius: f32, out: &mut Vec<Entry>) {
    if !disk_intersects_rect(self.rect, center, radius) { return; }
    out.extend(self.entries.iter().copied());
    if let Some(children) = &self.children {
      for child in children.iter() {
        child.nearby_into(center, radius, out);
      }
    }
  }

  pub fn len(&self) -> usize {
    self.entries.len()
      + self.children.as_ref()
        .map_or(0, |c| c.iter().map(QuadTree::len).sum())
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }

  #[cfg(test)]
  fn root_entries(&self) -> &[Entry] {
    &self.entries
  }
}

impl SpatialIndex for QuadTree {
  fn insert(&mut self, entry: Entry) {
    self.max_radius = self.max_radius.max(entry.radius);
    match self.fitting_child(&entry) {
      Some(i) => self.children.as_mut().unwrap()[i].insert(entry),
      None => {
        self.entries.push(entry);
        if self.children.is_none()
          && self.entries.len() > self.capacity
          && self.depth < MAX_DEPTH {
          self.subdivide();
        }
      }
    }
  }

  fn nearby(&self, center: Point, radius: f32) -> Vec<Entry> {
    let mut out = vec![];
    self.nearby_into(center, radius + 2.0 * self.max_radius, &mut out);
    out
  }

  fn clear(&mut self) {
    self.entries.clear();
    self.children = None;
    self.max_radius = 0.0;
  }

  fn bounds(&self) -> Size {
    self.rect.size
  }

  fn max_tracked_radius(&self) -> f32 {
    self.max_radius
  }
}

fn contains_disk(rect: Rect<f32, CanvasSpace>, entry: &Entry) -> bool {
  entry.center.x - entry.radius >= rect.min_x()
    && entry.center.x + entry.radius <= rect.max_x()
    && entry.center.y - entry.radius >= rect.min_y()
    && entry.center.y + entry.radius <= rect.max_y()
}

fn disk_intersects_rect(rect: Rect<f32, CanvasSpace>, center: Point, radius: f32) -> bool {
  let nearest = Point::new(
    center.x.clamp(rect.min_x(), rect.max_x()),
    center.y.clamp(rect.min_y(), rect.max_y())
  );
  (nearest - center).length() <= radius
}

#[cfg(test)] mod tests {
  use super::*;

  #[test] fn overflow_subdivides_and_straddler_stays_at_parent() {
    let mut tree = QuadTree::with_capacity(Size::new(100.0, 100.0), 4);
    // all in the top-left quadrant
    for id in 0..5 {
      tree.insert(Entry::new(id, Point::new(10.0 + id as f32 * 5.0, 10.0), 2.0));
    }
    // a circle across the vertical split line
    tree.insert(Entry::new(5, Point::new(50.0, 10.0), 5.0));

    assert_eq!(tree.len(), 6);
    assert_eq!(tree.root_entries().len(), 1);
    assert_eq!(tree.root_entries()[0].id, 5);
  }

  #[test] fn nearby_finds_deep_and_straddling_entries() {
    let mut tree = QuadTree::with_capacity(Size::new(100.0, 100.0), 2);
    for id in 0..8 {
      tree.insert(Entry::new(id, Point::new(5.0 + id as f32 * 2.0, 5.0), 1.0));
    }
    tree.insert(Entry::new(8, Point::new(50.0, 50.0), 10.0));

    let hits = tree.nearby(Point::new(8.0, 8.0), 20.0);
    for id in 0..8 {
      assert!(hits.iter().any(|e| e.id == id), "missing {}", id);
    }
  }

  #[test] fn clear_reinsert_is_identical() {
    use {rand::prelude::*, itertools::Itertools};
    let mut rng = rand_pcg::Pcg64::seed_from_u64(1);
    let mut tree = QuadTree::new(Size::new(400.0, 400.0));

    let entries = (0..50).map(|id| Entry::new(
      id,
      Point::new(rng.gen_range(0.0..400.0), rng.gen_range(0.0..400.0)),
      rng.gen_range(1.0..20.0)
    )).collect::<Vec<_>>();

    entries.iter().for_each(|&e| tree.insert(e));
    let ids = |tree: &QuadTree| tree
      .nearby(Point::new(200.0, 200.0), 80.0).iter()
      .map(|e| e.id).sorted().collect::<Vec<_>>();
    let before = ids(&tree);

    tree.clear();
    assert!(tree.is_empty());
    entries.iter().for_each(|&e| tree.insert(e));
    assert_eq!(before, ids(&tree));
  }

  #[test] fn max_radius_matches_grid_strategy() {
    use crate::index::HashGrid;
    let bounds = Size::new(400.0, 400.0);
    let mut tree = QuadTree::new(bounds);
    let mut grid = HashGrid::new(bounds, 20.0);
    for (id, e) in [
      Entry::new(0, Point::new(100.0, 100.0), 15.0),
      Entry::new(1, Point::new(300.0, 250.0), 30.0)
    ].iter().enumerate() {
      let e = Entry::new(id, e.center, e.radius);
      tree.insert(e);
      grid.insert(e);
    }
    let p = Point::new(180.0, 170.0);
    let (a, b) = (tree.max_radius_at(p, 2.0), grid.max_radius_at(p, 2.0));
    assert!((a - b).abs() < 1e-3, "{} vs {}", a, b);
  }
}

//! Uniform grid with clamped cell indices; near-O(1) insert and query.
//! A circle spanning several cells is referenced by every overlapped cell.

use {
  super::{Entry, SpatialIndex},
  crate::geometry::{Circle, Point, Size, V2},
  itertools::Itertools,
  std::collections::VecDeque
};

/// Cell size as a multiple of the average circle radius.
pub const CELL_RADIUS_FACTOR: f32 = 2.5;

/// A flood-filled connected region of unoccupied cells.
#[derive(Debug, Clone, PartialEq)]
pub struct EmptyArea {
  pub center: Point,
  pub extent: Size,
  pub cell_count: usize,
  /// `cell_count / total_cells`.
  pub score: f32
}

pub struct HashGrid {
  bounds: Size,
  cell_size: f32,
  cols: usize,
  rows: usize,
  cells: Vec<Vec<Entry>>,
  max_radius: f32
}

impl HashGrid {
  pub fn new(bounds: Size, cell_size: f32) -> Self {
    let cell_size = cell_size.max(1.0);
    let cols = (bounds.width / cell_size).ceil().max(1.0) as usize;
    let rows = (bounds.height / cell_size).ceil().max(1.0) as usize;
    HashGrid {
      bounds,
      cell_size,
      cols,
      rows,
      cells: vec![vec![]; cols * rows],
      max_radius: 0.0
    }
  }

  /// Grid sized for a population with the given average radius.
  pub fn sized_for(bounds: Size, avg_radius: f32) -> Self {
    Self::new(bounds, (avg_radius * CELL_RADIUS_FACTOR).max(1.0))
  }

  pub fn cell_size(&self) -> f32 { self.cell_size }

  fn cell_coord(&self, point: Point) -> (usize, usize) {
    let cx = (point.x / self.cell_size) as i64;
    let cy = (point.y / self.cell_size) as i64;
    (
      cx.clamp(0, self.cols as i64 - 1) as usize,
      cy.clamp(0, self.rows as i64 - 1) as usize
    )
  }

  /// Inclusive cell range overlapped by a disk.
  fn cell_range(&self, center: Point, radius: f32) -> (usize, usize, usize, usize) {
    let (x0, y0) = self.cell_coord(center - V2::splat(radius));
    let (x1, y1) = self.cell_coord(center + V2::splat(radius));
    (x0, y0, x1, y1)
  }

  /// Drop and re-insert the full circle list. Positions move every frame,
  /// so the grid is rebuilt rather than updated.
  pub fn rebuild(&mut self, circles: &[Circle]) {
    self.clear();
    for (id, c) in circles.iter().enumerate() {
      if !c.is_dead() {
        self.insert(Entry::new(id, c.center, c.radius));
      }
    }
  }

  /// Multi-source 4-connected flood fill over unoccupied cells. Regions of
  /// at least `min_cells`, largest first. Only the dynamic spawner calls this.
  pub fn find_empty_areas(&self, min_cells: usize) -> Vec<EmptyArea> {
    let total = self.cols * self.rows;
    let mut visited = vec![false; total];
    let mut areas = vec![];

    for seed in 0..total {
      if visited[seed] || !self.cells[seed].is_empty() { continue; }

      let mut queue = VecDeque::from([seed]);
      visited[seed] = true;
      let mut cells = vec![];
      while let Some(i) = queue.pop_front() {
        cells.push(i);
        let (x, y) = (i % self.cols, i / self.cols);
        let neighbors = [
          (x > 0).then(|| i - 1),
          (x + 1 < self.cols).then(|| i + 1),
          (y > 0).then(|| i - self.cols),
          (y + 1 < self.rows).then(|| i + self.cols)
        ];
        for n in neighbors.into_iter().flatten() {
          if !visited[n] && self.cells[n].is_empty() {
            visited[n] = true;
            queue.push_back(n);
          }
        }
      }

      if cells.len() < min_cells { continue; }

      let (mut min_x, mut min_y, mut max_x, mut max_y) = (usize::MAX, usize::MAX, 0, 0);
      let mut sum = V2::zero();
      for &i in &cells {
        let (x, y) = (i % self.cols, i / self.cols);
        min_x = min_x.min(x); max_x = max_x.max(x);
        min_y = min_y.min(y); max_y = max_y.max(y);
        sum += V2::new(
          (x as f32 + 0.5) * self.cell_size,
          (y as f32 + 0.5) * self.cell_size
        );
      }
      areas.push(EmptyArea {
        center: (sum / cells.len() as f32).to_point(),
        extent: Size::new(
          (max_x - min_x + 1) as f32 * self.cell_size,
          (max_y - min_y + 1) as f32 * self.cell_size
        ),
        cell_count: cells.len(),
        score: cells.len() as f32 / total as f32
      });
    }

    areas.into_iter()
      .sorted_by_key(|a| std::cmp::Reverse(a.cell_count))
      .collect()
  }
}

impl SpatialIndex for HashGrid {
  fn insert(&mut self, entry: Entry) {
    self.max_radius = self.max_radius.max(entry.radius);
    let (x0, y0, x1, y1) = self.cell_range(entry.center, entry.radius);
    for y in y0..=y1 {
      for x in x0..=x1 {
        self.cells[y * self.cols + x].push(entry);
      }
    }
  }

  fn nearby(&self, center: Point, radius: f32) -> Vec<Entry> {
    // one extra cell ring, so spacing-inflated queries stay covered
    let (x0, y0, x1, y1) = self.cell_range(center, radius + self.cell_size);
    (y0..=y1)
      .flat_map(|y| (x0..=x1).map(move |x| y * self.cols + x))
      .flat_map(|i| self.cells[i].iter().copied())
      .unique_by(|e| e.id)
      .collect()
  }

  fn clear(&mut self) {
    self.cells.iter_mut().for_each(Vec::clear);
    self.max_radius = 0.0;
  }

  fn bounds(&self) -> Size { self.bounds }

  fn max_tracked_radius(&self) -> f32 { self.max_radius }
}
